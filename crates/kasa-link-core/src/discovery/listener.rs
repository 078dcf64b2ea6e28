//! Listener task: the only reader of the shared datagram socket.

use std::io;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::engine::Engine;
use crate::error::CoreError;

/// Read datagrams until shutdown or a transport failure.
///
/// Every datagram goes through [`Engine::handle_datagram`]; bad payloads are
/// dropped there and never end the loop. Any read error other than a
/// transient one cancels `cancel` so the Poller stops too, and is returned
/// to the coordinator.
pub async fn run(engine: Arc<Engine>, cancel: CancellationToken) -> Result<(), CoreError> {
    let socket = engine.socket();
    let mut buf = vec![0u8; engine.config().recv_buffer_size];

    info!(local = ?socket.local_addr().ok(), "listener started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("listener cancelled");
                return Ok(());
            }
            received = socket.recv_from(&mut buf) => match received {
                Ok((len, from)) => {
                    let outcome = engine.handle_datagram(&buf[..len], from.ip()).await;
                    debug!(%from, len, ?outcome, "datagram handled");
                }
                Err(e) if is_transient(&e) => {
                    debug!(error = %e, "ignoring transient read error");
                }
                Err(e) => {
                    error!(error = %e, "datagram socket read failed, shutting down");
                    cancel.cancel();
                    return Err(CoreError::Io(e));
                }
            },
        }
    }
}

/// Errors that report on an earlier send rather than on the socket itself.
///
/// Windows surfaces an ICMP port-unreachable for a unicast to a departed
/// device as `ConnectionReset` on the next read of an unconnected socket.
fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionRefused
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_side_errors_are_transient() {
        assert!(is_transient(&io::Error::from(io::ErrorKind::ConnectionReset)));
        assert!(is_transient(&io::Error::from(io::ErrorKind::ConnectionRefused)));
        assert!(!is_transient(&io::Error::from(io::ErrorKind::NotConnected)));
        assert!(!is_transient(&io::Error::new(io::ErrorKind::Other, "socket closed")));
    }
}
