//! Per-connection state for socket clients (hub side).
//!
//! Each accepted socket connection gets a `NodeConn` that manages the
//! read/write tasks and translates between frames and `HubEvent`s. A
//! connection starts anonymous; the hub's registry binds a node name to it
//! after the `nodeInit` handshake.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use crate::hub::events::HubEvent;

use super::framing::{Frame, FrameDecoder};

/// Hub-side connection state for a single node socket.
///
/// Owns read/write tasks that bridge between the Unix socket and the hub
/// event loop. Dropping the value aborts both tasks.
pub struct NodeConn {
    /// Unique identifier for this connection.
    conn_id: String,
    /// Sender for outgoing encoded frames to this node.
    frame_tx: UnboundedSender<Vec<u8>>,
    /// Handle to the read task (for cleanup).
    read_handle: JoinHandle<()>,
    /// Handle to the write task (for cleanup).
    write_handle: JoinHandle<()>,
}

impl std::fmt::Debug for NodeConn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeConn")
            .field("conn_id", &self.conn_id)
            .finish_non_exhaustive()
    }
}

impl NodeConn {
    /// Create a connection handler for an accepted socket.
    ///
    /// Spawns read and write tasks:
    /// - Read task: decodes frames from the socket → `HubEvent::Frame`
    /// - Write task: receives encoded frames → writes to the socket
    pub(crate) fn new(
        conn_id: String,
        stream: UnixStream,
        hub_event_tx: UnboundedSender<HubEvent>,
    ) -> Self {
        let (read_half, write_half) = stream.into_split();
        let (frame_tx, frame_rx) = mpsc::unbounded_channel::<Vec<u8>>();

        let read_handle = tokio::spawn(Self::read_loop(
            conn_id.clone(),
            read_half,
            hub_event_tx,
        ));
        let write_handle = tokio::spawn(Self::write_loop(conn_id.clone(), write_half, frame_rx));

        Self {
            conn_id,
            frame_tx,
            read_handle,
            write_handle,
        }
    }

    /// Send a frame to this node.
    ///
    /// The frame is encoded and queued for the write task. Returns `false`
    /// if the write channel is closed (node disconnected) — the registry
    /// sweep uses this as its liveness signal.
    pub fn send_frame(&self, frame: &Frame) -> bool {
        self.frame_tx.send(frame.encode()).is_ok()
    }

    /// Connection identifier.
    pub fn conn_id(&self) -> &str {
        &self.conn_id
    }

    /// Read loop — decodes frames from the socket and sends hub events.
    async fn read_loop(
        conn_id: String,
        mut reader: tokio::net::unix::OwnedReadHalf,
        hub_event_tx: UnboundedSender<HubEvent>,
    ) {
        let mut decoder = FrameDecoder::new();
        let mut buf = [0u8; 64 * 1024];

        loop {
            match reader.read(&mut buf).await {
                Ok(0) => {
                    // EOF — node disconnected
                    log::info!("[Socket] Node disconnected: {conn_id}");
                    let _ = hub_event_tx.send(HubEvent::Disconnected {
                        conn_id: conn_id.clone(),
                    });
                    break;
                }
                Ok(n) => match decoder.feed(&buf[..n]) {
                    Ok(frames) => {
                        for frame in frames {
                            let sent = hub_event_tx.send(HubEvent::Frame {
                                conn_id: conn_id.clone(),
                                frame,
                            });
                            if sent.is_err() {
                                return; // Hub channel closed
                            }
                        }
                    }
                    Err(e) => {
                        log::error!("[Socket] Frame decode error for {conn_id}: {e}");
                        let _ = hub_event_tx.send(HubEvent::Disconnected {
                            conn_id: conn_id.clone(),
                        });
                        break;
                    }
                },
                Err(e) => {
                    log::error!("[Socket] Read error for {conn_id}: {e}");
                    let _ = hub_event_tx.send(HubEvent::Disconnected {
                        conn_id: conn_id.clone(),
                    });
                    break;
                }
            }
        }
    }

    /// Write loop — receives encoded frames and writes to the socket.
    async fn write_loop(
        conn_id: String,
        mut writer: tokio::net::unix::OwnedWriteHalf,
        mut frame_rx: UnboundedReceiver<Vec<u8>>,
    ) {
        while let Some(data) = frame_rx.recv().await {
            if let Err(e) = writer.write_all(&data).await {
                log::error!("[Socket] Write error for {conn_id}: {e}");
                break;
            }
        }
    }
}

impl Drop for NodeConn {
    fn drop(&mut self) {
        self.read_handle.abort();
        self.write_handle.abort();
    }
}
