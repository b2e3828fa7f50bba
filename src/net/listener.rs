//! Accept worker for device connections

use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::session::{handle_connection, IngestContext};

/// Back-off after a failed accept so a persistent error does not spin
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Accept devices until shutdown, one ingestion task per connection
pub async fn run_device_listener(
    listener: TcpListener,
    ctx: IngestContext,
    mut shutdown: watch::Receiver<bool>,
) {
    match listener.local_addr() {
        Ok(addr) => info!(addr = %addr, "Device listener started"),
        Err(_) => info!("Device listener started"),
    }

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                info!("Device listener stopping");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(addr = %peer, "Accepted device connection");
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!(addr = %peer, error = %e, "Failed to set TCP_NODELAY");
                    }
                    tokio::spawn(handle_connection(stream, peer, ctx.clone()));
                }
                Err(e) => {
                    warn!(error = %e, "Accept failed");
                    sleep(ACCEPT_RETRY_DELAY).await;
                }
            },
        }
    }
}
