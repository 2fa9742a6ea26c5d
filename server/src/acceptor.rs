//! TCP listen/accept loop with an admission-cap semaphore.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::session::run_session;
use crate::world::World;

/// Accept connections on `listener` until `shutdown` is cancelled. Each
/// accepted socket either gets a fresh session task, or — if the
/// admission cap is already full — is closed immediately.
pub async fn run_acceptor(
    listener: TcpListener,
    world: Arc<World>,
    admission_cap: usize,
    shutdown: CancellationToken,
) {
    let admission = Arc::new(Semaphore::new(admission_cap));

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, addr)) => {
                        match admission.clone().try_acquire_owned() {
                            Ok(permit) => {
                                info!(%addr, "drone connected");
                                let world = world.clone();
                                let shutdown = shutdown.clone();
                                tokio::spawn(async move {
                                    run_session(stream, addr, world, shutdown, permit).await;
                                });
                            }
                            Err(_) => {
                                warn!(%addr, "admission cap reached, closing connection");
                                drop(stream);
                            }
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                    }
                }
            }
        }
    }
    debug!("acceptor stopped");
}
