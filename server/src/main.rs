use std::sync::Arc;

use clap::Parser;
use rescue_server::config::ServerConfig;
use rescue_server::world::World;
use rescue_server::{acceptor, dispatcher, spawner};
use tokio::net::{TcpListener, TcpSocket};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::parse();
    let listener = bind_listener(&config.bind_addr()).await?;
    info!(addr = %config.bind_addr(), width = config.width, height = config.height, "server listening");

    let world = Arc::new(World::new(config.width, config.height));
    let shutdown = CancellationToken::new();

    let acceptor_handle = tokio::spawn(acceptor::run_acceptor(
        listener,
        world.clone(),
        config.admission_cap,
        shutdown.clone(),
    ));
    let dispatcher_handle = tokio::spawn(dispatcher::run_dispatcher(world.clone(), shutdown.clone()));
    let spawner_handle = tokio::spawn(spawner::run_spawner(world.clone(), shutdown.clone()));

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    shutdown.cancel();

    let join_timeout = std::time::Duration::from_secs(10);
    let _ = tokio::time::timeout(
        join_timeout,
        join_all_tasks(vec![acceptor_handle, dispatcher_handle, spawner_handle]),
    )
    .await;

    info!("shutdown complete");
    Ok(())
}

async fn join_all_tasks(handles: Vec<tokio::task::JoinHandle<()>>) {
    for handle in handles {
        let _ = handle.await;
    }
}

/// Bind with `SO_REUSEADDR` so a restart doesn't fail while the previous
/// process's socket is still draining `TIME_WAIT`.
async fn bind_listener(addr: &str) -> anyhow::Result<TcpListener> {
    let addr: std::net::SocketAddr = addr.parse()?;
    let socket = TcpSocket::new_v4()?;
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    Ok(socket.listen(1024)?)
}
