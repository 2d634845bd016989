//! Unix domain socket server for accepting node connections.
//!
//! Listens on the hub's socket and creates a [`NodeConn`] for each accepted
//! connection. Each connection is announced to the hub event loop via
//! `HubEvent::Connected`; the connection stays anonymous until its
//! `nodeInit` handshake.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::net::UnixListener;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use crate::hub::events::HubEvent;

use super::conn::NodeConn;

/// Unix domain socket server for hub IPC.
///
/// Binds a `UnixListener` and spawns an accept loop that creates
/// [`NodeConn`] instances for each connection.
#[derive(Debug)]
pub struct SocketServer {
    /// Path to the socket file (for cleanup).
    socket_path: PathBuf,
    /// Handle to the accept loop task.
    accept_handle: JoinHandle<()>,
}

impl SocketServer {
    /// Start the socket server at the given path.
    ///
    /// Removes any stale socket file, binds the listener, sets permissions
    /// to 0600, and spawns the accept loop.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be bound.
    pub(crate) fn start(
        socket_path: PathBuf,
        hub_event_tx: UnboundedSender<HubEvent>,
    ) -> Result<Self> {
        // sun_path is 104 bytes on macOS, 108 on Linux; use the conservative limit
        const MAX_SOCKET_PATH: usize = 104;
        let path_len = socket_path.as_os_str().len();
        if path_len >= MAX_SOCKET_PATH {
            anyhow::bail!(
                "Socket path too long ({path_len} bytes, max {}): {}",
                MAX_SOCKET_PATH - 1,
                socket_path.display()
            );
        }

        // Remove stale socket file if it exists
        if socket_path.exists() {
            std::fs::remove_file(&socket_path).with_context(|| {
                format!("Failed to remove stale socket: {}", socket_path.display())
            })?;
        }

        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = std::os::unix::net::UnixListener::bind(&socket_path)
            .with_context(|| format!("Failed to bind socket: {}", socket_path.display()))?;

        // Socket permissions: owner-only
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&socket_path, perms)?;
        }

        listener.set_nonblocking(true)?;
        let listener = UnixListener::from_std(listener)?;

        log::info!("[Socket] Hub listening on {}", socket_path.display());

        let path_clone = socket_path.clone();
        let accept_handle = tokio::spawn(Self::accept_loop(listener, hub_event_tx, path_clone));

        Ok(Self {
            socket_path,
            accept_handle,
        })
    }

    /// Accept loop — runs as a tokio task.
    async fn accept_loop(
        listener: UnixListener,
        hub_event_tx: UnboundedSender<HubEvent>,
        socket_path: PathBuf,
    ) {
        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    let conn_id = generate_conn_id();
                    log::info!("[Socket] Node connected: {conn_id}");

                    let conn = NodeConn::new(conn_id.clone(), stream, hub_event_tx.clone());

                    let sent = hub_event_tx.send(HubEvent::Connected { conn_id, conn });
                    if sent.is_err() {
                        log::warn!("[Socket] Hub event channel closed, stopping accept loop");
                        break;
                    }
                }
                Err(e) => {
                    // Socket file gone means the hub is shutting down
                    if !socket_path.exists() {
                        log::info!("[Socket] Socket file removed, stopping accept loop");
                        break;
                    }
                    log::error!("[Socket] Accept error: {e}");
                    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                }
            }
        }
    }

    /// Stop accepting and remove the socket file.
    pub fn shutdown(self) {
        self.accept_handle.abort();
        if let Err(e) = std::fs::remove_file(&self.socket_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!(
                    "[Socket] Failed to remove socket {}: {e}",
                    self.socket_path.display()
                );
            }
        }
    }

    /// Path to the socket file.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

/// Generate a unique connection ID using a monotonic counter + random suffix.
fn generate_conn_id() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let rand: u16 = rand::random();
    format!("conn:{seq:x}{rand:04x}")
}
