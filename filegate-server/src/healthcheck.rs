use anyhow::Result;

use crate::config::Config;

/// Queries the health endpoint of a server running with the same configuration.
pub async fn healthcheck(config: Config) -> Result<()> {
    let client = reqwest::Client::new();
    let url = format!("http://{}/health", local_addr(&config));

    tracing::debug!("sending healthcheck request to {}", url);
    let response = client.get(&url).send().await?;
    if !response.status().is_success() {
        anyhow::bail!("Bad Status: {}", response.status());
    }

    tracing::info!("OK");
    Ok(())
}

/// The address to reach the server on, substituting loopback for an unspecified bind address.
fn local_addr(config: &Config) -> std::net::SocketAddr {
    let mut addr = config.http_addr;
    if addr.ip().is_unspecified() {
        match addr {
            std::net::SocketAddr::V4(_) => addr.set_ip(std::net::Ipv4Addr::LOCALHOST.into()),
            std::net::SocketAddr::V6(_) => addr.set_ip(std::net::Ipv6Addr::LOCALHOST.into()),
        }
    }
    addr
}
