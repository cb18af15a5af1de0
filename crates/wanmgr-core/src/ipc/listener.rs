// # Unix Datagram Endpoints
//
// Default IPC endpoints on unix datagram sockets.
//
// - `UnixDatagramSource`: binds the listen path and yields decoded messages
// - `UnixDatagramTransport`: sends health-check notifications to the
//   health-check process socket
//
// One datagram carries exactly one JSON message.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tokio::net::UnixDatagram;
use tokio_stream::Stream;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::ipc::{IhcNotification, IhcTransport, IpcMessage, IpcSource};

/// Largest accepted datagram
const MAX_DATAGRAM: usize = 64 * 1024;

/// Inbound endpoint bound to a unix datagram socket
#[derive(Debug)]
pub struct UnixDatagramSource {
    path: PathBuf,
    socket: std::sync::Mutex<Option<UnixDatagram>>,
}

impl UnixDatagramSource {
    /// Bind the socket, replacing a stale socket file
    pub fn bind<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        let socket = UnixDatagram::bind(&path)?;
        tracing::info!("IPC endpoint bound at {}", path.display());
        Ok(Self {
            path,
            socket: std::sync::Mutex::new(Some(socket)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl IpcSource for UnixDatagramSource {
    fn incoming(&self) -> Pin<Box<dyn Stream<Item = IpcMessage> + Send + 'static>> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        let socket = match self.socket.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };

        match socket {
            Some(socket) => {
                let path = self.path.clone();
                tokio::spawn(async move {
                    let mut buf = vec![0u8; MAX_DATAGRAM];
                    loop {
                        let len = match socket.recv(&mut buf).await {
                            Ok(len) => len,
                            Err(e) => {
                                tracing::error!("IPC receive on {} failed: {}", path.display(), e);
                                break;
                            }
                        };
                        match IpcMessage::decode(&buf[..len]) {
                            Ok(msg) => {
                                if tx.send(msg).is_err() {
                                    tracing::debug!("IPC consumer dropped, stopping receiver");
                                    break;
                                }
                            }
                            Err(e) => tracing::warn!("Invalid message sent to WAN manager: {}", e),
                        }
                    }
                });
            }
            None => {
                tracing::warn!("IPC endpoint {} already consumed", self.path.display());
            }
        }

        Box::pin(UnboundedReceiverStream::new(rx))
    }
}

impl Drop for UnixDatagramSource {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Outbound endpoint for health-check notifications
#[derive(Debug, Clone)]
pub struct UnixDatagramTransport {
    target: PathBuf,
}

impl UnixDatagramTransport {
    pub fn new<P: AsRef<Path>>(target: P) -> Self {
        Self {
            target: target.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl IhcTransport for UnixDatagramTransport {
    async fn send(&self, notification: &IhcNotification) -> Result<(), crate::Error> {
        let payload = serde_json::to_vec(notification)?;
        let socket = UnixDatagram::unbound()?;
        socket.send_to(&payload, &self.target).await.map_err(|e| {
            crate::Error::ipc(format!(
                "Failed to send to health check at {}: {}",
                self.target.display(),
                e
            ))
        })?;
        tracing::debug!("Sent {} bytes to {}", payload.len(), self.target.display());
        Ok(())
    }
}
