use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::net::{TcpListener, TcpSocket};
use tokio::signal::unix::SignalKind;

use crate::config::Config;
use crate::state::State;
use crate::web::app::App;

/// The maximum backlog for TCP listen sockets before refusing connections.
const TCP_LISTEN_BACKLOG: u32 = 1024;

/// Runs the filegate HTTP gateway until it receives SIGTERM, SIGINT, SIGHUP, or SIGQUIT.
///
/// The storage backend and the upload policy signer are built before the listener is bound, so a
/// misconfigured backend or a missing signing secret stops the process without ever accepting a
/// request. On a signal, in-flight uploads are allowed to finish and their spool files are cleaned
/// up before this returns.
pub async fn server(config: Config) -> Result<()> {
    let state = State::new(config).await?;
    tracing::info!(
        backend = state.service.backend_name(),
        policy_ttl = ?state.config.upload_policy.ttl,
        "storage service ready"
    );

    let listener = listen(state.config.http_addr).context("failed to bind HTTP listener")?;
    let app = App::new(state).graceful_shutdown(true);
    let server_handle = tokio::spawn(app.serve(listener));

    tokio::spawn(async {
        elegant_departure::get_shutdown_guard().wait().await;
        tracing::info!("Draining in-flight requests");
    });

    elegant_departure::tokio::depart()
        .on_termination()
        .on_sigint()
        .on_signal(SignalKind::hangup())
        .on_signal(SignalKind::quit())
        .await;

    let server_result = server_handle.await.map_err(From::from).flatten();
    tracing::info!("Gateway stopped");
    server_result
}

/// Binds `addr` with `SO_REUSEPORT` so a replacement process can bind before this one exits.
fn listen(addr: SocketAddr) -> Result<TcpListener> {
    let socket = match addr {
        SocketAddr::V4(_) => TcpSocket::new_v4(),
        SocketAddr::V6(_) => TcpSocket::new_v6(),
    }?;

    #[cfg(all(unix, not(target_os = "solaris"), not(target_os = "illumos")))]
    socket.set_reuseport(true)?;
    socket.bind(addr)?;

    let listener = socket.listen(TCP_LISTEN_BACKLOG)?;
    tracing::info!("Gateway listening on {addr}");

    Ok(listener)
}
