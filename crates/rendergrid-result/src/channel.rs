//! ResultChannel — the persistent artifact listener.
//!
//! Accepts connections, one frame per connection, one handler task per
//! connection. A full valid frame is routed by its result binding; a
//! malformed or truncated frame aborts its own connection and mutates
//! nothing.

use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{error, info, warn};

use rendergrid_state::{ResultSink, StateStore};

use crate::callback::deliver_callback;
use crate::protocol::read_frame;

/// Result channel tuning knobs.
#[derive(Debug, Clone)]
pub struct ResultChannelConfig {
    /// Bound on a single callback delivery attempt.
    pub callback_timeout: Duration,
}

impl Default for ResultChannelConfig {
    fn default() -> Self {
        Self {
            callback_timeout: Duration::from_secs(10),
        }
    }
}

/// Listens for framed artifacts and delivers them.
pub struct ResultChannel {
    state: StateStore,
    config: ResultChannelConfig,
}

impl ResultChannel {
    pub fn new(state: StateStore, config: ResultChannelConfig) -> Self {
        Self { state, config }
    }

    /// Accept connections until shutdown. Each connection gets its own
    /// handler task, so one slow sender only stalls itself.
    pub async fn run(&self, listener: TcpListener, mut shutdown: watch::Receiver<bool>) {
        match listener.local_addr() {
            Ok(addr) => info!(%addr, "result channel listening"),
            Err(_) => info!("result channel listening"),
        }

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let state = self.state.clone();
                        let config = self.config.clone();
                        tokio::spawn(async move {
                            handle_connection(state, config, stream, peer.to_string()).await;
                        });
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                },
                _ = shutdown.changed() => {
                    info!("result channel shutting down");
                    break;
                }
            }
        }
    }
}

/// Handle one connection: read the frame, route the artifact.
async fn handle_connection(
    state: StateStore,
    config: ResultChannelConfig,
    mut stream: TcpStream,
    peer: String,
) {
    let frame = match read_frame(&mut stream).await {
        Ok(frame) => frame,
        Err(e) => {
            warn!(%peer, error = %e, "discarding malformed result frame");
            return;
        }
    };

    let sink = match state.resolve_result(&frame.task_id) {
        Ok(Some(sink)) => sink,
        Ok(None) => {
            // The sender has no return channel; drop the payload quietly.
            warn!(id = %frame.task_id, %peer, "no result binding, payload discarded");
            return;
        }
        Err(e) => {
            error!(id = %frame.task_id, error = %e, "binding lookup failed");
            return;
        }
    };

    match sink {
        ResultSink::Stored => {
            if let Err(e) = state.store_artifact(&frame.task_id, &frame.payload) {
                error!(id = %frame.task_id, error = %e, "artifact store failed");
                return;
            }
            if let Err(e) = state.remove_binding(&frame.task_id) {
                error!(id = %frame.task_id, error = %e, "binding removal failed");
            }
            info!(id = %frame.task_id, len = frame.payload.len(), "artifact stored for pickup");
        }
        ResultSink::Callback { url } => {
            let delivered = deliver_callback(
                &url,
                &frame.task_id,
                frame.payload,
                config.callback_timeout,
            )
            .await;
            if delivered {
                info!(id = %frame.task_id, %url, "artifact delivered to callback");
            } else {
                // At most one attempt; the binding goes away regardless.
                warn!(id = %frame.task_id, %url, "callback delivery failed, not retrying");
            }
            if let Err(e) = state.remove_binding(&frame.task_id) {
                error!(id = %frame.task_id, error = %e, "binding removal failed");
            }
        }
    }
}
