//! Blackbox tests for the gateway endpoints.
//!
//! These tests run the full server against filesystem storage in a temporary directory and talk
//! to it over HTTP.

use anyhow::Result;
use filegate_service::policy::DEFAULT_POLICY_TTL;
use filegate_service::{Policy, PolicyIssuer};
use filegate_test::server::{TEST_SECRET, TestServer};
use reqwest::StatusCode;
use reqwest::multipart::{Form, Part};
use serde_json::{Value, json};

fn upload_form(file_name: &str, contents: &'static [u8], remote_path: &str) -> Form {
    Form::new()
        .part("file", Part::bytes(contents).file_name(file_name.to_owned()))
        .text("remoteFilePath", remote_path.to_owned())
}

#[tokio::test]
async fn health_and_ready() -> Result<()> {
    let server = TestServer::new().await;
    let client = reqwest::Client::new();

    for path in ["/health", "/ready"] {
        let response = client.get(server.url(path)).send().await?;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.text().await?, "OK");
    }

    Ok(())
}

#[tokio::test]
async fn uploads_files() -> Result<()> {
    filegate_test::tracing::init();
    let server = TestServer::new().await;
    let client = reqwest::Client::new();

    let response = client
        .post(server.url("/upload"))
        .multipart(upload_form("photo.png", b"not really a png", "a/b.png"))
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await?;
    assert_eq!(body, json!({"status": "photo.png", "message": "success"}));

    let stored = tokio::fs::read(server.storage_path().join("a/b.png")).await?;
    assert_eq!(stored, b"not really a png");

    // Spooled files are removed once the request completes.
    let mut spooled = tokio::fs::read_dir(server.spool_path()).await?;
    assert!(spooled.next_entry().await?.is_none());

    Ok(())
}

#[tokio::test]
async fn upload_requires_fields() -> Result<()> {
    let server = TestServer::new().await;
    let client = reqwest::Client::new();

    let form = Form::new().text("remoteFilePath", "a/b.png");
    let response = client
        .post(server.url("/upload"))
        .multipart(form)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await?;
    assert!(body["error"].as_str().unwrap().contains("file"), "{body}");

    let form = Form::new().part("file", Part::bytes(&b"data"[..]).file_name("x.txt"));
    let response = client
        .post(server.url("/upload"))
        .multipart(form)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn upload_rejects_invalid_paths() -> Result<()> {
    let server = TestServer::new().await;
    let client = reqwest::Client::new();

    for remote_path in ["../escape.txt", "/absolute.txt", "a//b.txt", ""] {
        let response = client
            .post(server.url("/upload"))
            .multipart(upload_form("x.txt", b"data", remote_path))
            .send()
            .await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{remote_path:?}");
    }

    let mut stored = tokio::fs::read_dir(server.storage_path()).await;
    if let Ok(entries) = &mut stored {
        assert!(entries.next_entry().await?.is_none());
    }

    Ok(())
}

#[tokio::test]
async fn upload_enforces_size_limit() -> Result<()> {
    let server = TestServer::with_config(|config| config.upload.max_size = 1024).await;
    let client = reqwest::Client::new();

    static LARGE: [u8; 4096] = [b'x'; 4096];
    let response = client
        .post(server.url("/upload"))
        .multipart(upload_form("large.bin", &LARGE, "large.bin"))
        .send()
        .await?;

    assert!(!response.status().is_success());
    assert!(!server.storage_path().join("large.bin").exists());

    Ok(())
}

#[tokio::test]
async fn deletes_files() -> Result<()> {
    let server = TestServer::new().await;
    let client = reqwest::Client::new();

    let response = client
        .post(server.url("/upload"))
        .multipart(upload_form("x.txt", b"data", "dir/x.txt"))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = client
        .post(server.url("/delete"))
        .form(&[("remoteFilePath", "dir/x.txt")])
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await?;
    assert_eq!(body, json!({"status": 10000, "message": "success"}));
    assert!(!server.storage_path().join("dir/x.txt").exists());

    // Deleting again is not an error.
    let response = client
        .post(server.url("/delete"))
        .json(&json!({"remoteFilePath": "dir/x.txt"}))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn delete_requires_path() -> Result<()> {
    let server = TestServer::new().await;
    let client = reqwest::Client::new();

    let response = client
        .post(server.url("/delete"))
        .form(&[("somethingElse", "x")])
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await?;
    assert!(body["error"].is_string(), "{body}");

    Ok(())
}

#[tokio::test]
async fn copies_files() -> Result<()> {
    let server = TestServer::new().await;
    let client = reqwest::Client::new();

    let response = client
        .post(server.url("/upload"))
        .multipart(upload_form("src.txt", b"contents", "src.txt"))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = client
        .post(server.url("/copy"))
        .form(&[("srcFilePath", "src.txt"), ("dstFilePath", "copies/dst.txt")])
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await?;
    assert_eq!(body, json!({"status": 10000, "message": "success"}));

    let src = tokio::fs::read(server.storage_path().join("src.txt")).await?;
    let dst = tokio::fs::read(server.storage_path().join("copies/dst.txt")).await?;
    assert_eq!(src, b"contents");
    assert_eq!(dst, b"contents");

    Ok(())
}

#[tokio::test]
async fn copy_of_missing_file_is_not_found() -> Result<()> {
    let server = TestServer::new().await;
    let client = reqwest::Client::new();

    let response = client
        .post(server.url("/copy"))
        .json(&json!({"srcFilePath": "missing.txt", "dstFilePath": "dst.txt"}))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(!server.storage_path().join("dst.txt").exists());

    Ok(())
}

#[tokio::test]
async fn issues_upload_policies() -> Result<()> {
    let server = TestServer::new().await;
    let client = reqwest::Client::new();

    let response = client
        .post(server.url("/upload_policy"))
        .form(&[
            ("remoteFilePath", "a/b.png"),
            ("callbackURL", "https://cb.example/done"),
            ("callbackBody", "id=42"),
        ])
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[reqwest::header::CONTENT_TYPE].to_str()?;
    assert!(content_type.starts_with("text/plain"), "{content_type}");

    let policy = Policy::from(response.text().await?);
    let verifier = PolicyIssuer::new(TEST_SECRET.as_bytes(), DEFAULT_POLICY_TTL)?;
    let document = verifier.verify(&policy)?;

    assert_eq!(document.path, "a/b.png");
    assert_eq!(document.callback.url, "https://cb.example/done");
    assert_eq!(document.callback.body, "id=42");

    let other = PolicyIssuer::new(b"some other secret", DEFAULT_POLICY_TTL)?;
    assert!(other.verify(&policy).is_err());

    Ok(())
}

#[tokio::test]
async fn policy_requires_valid_callback() -> Result<()> {
    let server = TestServer::new().await;
    let client = reqwest::Client::new();

    for callback_url in ["", "not a url"] {
        let response = client
            .post(server.url("/upload_policy"))
            .json(&json!({
                "remoteFilePath": "a/b.png",
                "callbackURL": callback_url,
                "callbackBody": "id=42",
            }))
            .send()
            .await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{callback_url:?}");
    }

    Ok(())
}

#[tokio::test]
async fn accepts_multipart_forms() -> Result<()> {
    let server = TestServer::new().await;
    let client = reqwest::Client::new();

    let response = client
        .post(server.url("/upload"))
        .multipart(upload_form("src.txt", b"contents", "src.txt"))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let form = Form::new()
        .text("srcFilePath", "src.txt")
        .text("dstFilePath", "dst.txt");
    let response = client.post(server.url("/copy")).multipart(form).send().await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        tokio::fs::read(server.storage_path().join("dst.txt")).await?,
        b"contents"
    );

    let form = Form::new().text("remoteFilePath", "src.txt");
    let response = client
        .post(server.url("/delete"))
        .multipart(form)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await?;
    assert_eq!(body, json!({"status": 10000, "message": "success"}));
    assert!(!server.storage_path().join("src.txt").exists());

    let form = Form::new()
        .text("remoteFilePath", "a/b.png")
        .text("callbackURL", "https://cb.example/done")
        .text("callbackBody", "id=42");
    let response = client
        .post(server.url("/upload_policy"))
        .multipart(form)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let policy = Policy::from(response.text().await?);
    let document = PolicyIssuer::new(TEST_SECRET.as_bytes(), DEFAULT_POLICY_TTL)?.verify(&policy)?;
    assert_eq!(document.path, "a/b.png");
    assert_eq!(document.callback.body, "id=42");

    Ok(())
}
