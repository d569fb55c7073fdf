//! Exposes an in-process test server for use in integration tests.
//!
//! ```
//! use filegate_test::server::TestServer;
//!
//! #[tokio::main]
//! async fn main() {
//!    let server = TestServer::new().await;
//!    let url = server.url("/health");
//!    // use the URL in tests...
//! }
//! ```

use std::net::{SocketAddr, TcpListener};
use std::path::{Path, PathBuf};

use filegate_server::config::{Config, Storage};
use filegate_server::state::State;
use filegate_server::web::App;
use secrecy::SecretBox;
use tempfile::TempDir;

/// The upload policy secret configured on every test server.
pub const TEST_SECRET: &str = "filegate-test-secret";

/// An in-process test server for use in integration tests.
///
/// This server runs the full gateway using a temporary directory for storage, which is deleted
/// when the server is dropped. It listens on a random available port on localhost.
#[derive(Debug)]
pub struct TestServer {
    handle: tokio::task::JoinHandle<()>,
    socket: SocketAddr,
    storage: PathBuf,
    tempdir: TempDir,
}

impl TestServer {
    /// Starts a server with the default test configuration.
    pub async fn new() -> Self {
        Self::with_config(|_| ()).await
    }

    /// Starts a server after applying `configure` to the default test configuration.
    ///
    /// The storage backend is a filesystem directory below a fresh temporary directory, unless
    /// `configure` replaces it.
    pub async fn with_config(configure: impl FnOnce(&mut Config)) -> Self {
        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let listener = TcpListener::bind(addr).unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();

        let tempdir = tempfile::tempdir().unwrap();
        let storage = tempdir.path().join("storage");
        let spool = tempdir.path().join("spool");
        std::fs::create_dir_all(&spool).unwrap();

        let mut config = Config {
            storage: Storage::FileSystem {
                path: storage.clone(),
            },
            ..Default::default()
        };
        config.upload_policy.secret = Some(SecretBox::new(Box::new(TEST_SECRET.into())));
        config.upload.spool_dir = Some(spool);
        configure(&mut config);

        let state = State::new(config).await.unwrap();
        let app = App::new(state);

        let handle = tokio::spawn(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            app.serve(listener).await.unwrap();
        });

        Self {
            handle,
            socket,
            storage,
            tempdir,
        }
    }

    /// Returns a full URL pointing to the given path.
    ///
    /// This URL uses `localhost` as hostname.
    pub fn url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        format!("http://localhost:{}/{}", self.socket.port(), path)
    }

    /// The directory backing the default filesystem storage.
    pub fn storage_path(&self) -> &Path {
        &self.storage
    }

    /// The directory uploads are spooled to.
    pub fn spool_path(&self) -> PathBuf {
        self.tempdir.path().join("spool")
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
