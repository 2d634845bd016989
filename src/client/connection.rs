//! Client side of the hub socket.
//!
//! Mirrors the hub's per-connection plumbing: one read task decoding
//! frames into [`ClientEvent`]s, one write task draining an unbounded
//! channel of encoded frames. Connection establishment retries on a fixed
//! cadence until the hub appears.

use std::path::Path;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use crate::socket::{Frame, FrameDecoder};

/// Event from the connection tasks to the client dispatcher.
#[derive(Debug)]
pub(crate) enum ClientEvent {
    /// A decoded frame arrived from the hub.
    Frame(Frame),
    /// The hub connection hit EOF or an error.
    Disconnected,
}

/// Connect to the hub socket, retrying until it accepts.
pub(crate) async fn connect_with_retry(socket_path: &Path, retry: Duration) -> UnixStream {
    loop {
        match UnixStream::connect(socket_path).await {
            Ok(stream) => return stream,
            Err(e) => {
                log::debug!(
                    "[Client] Hub not reachable at {}: {e}; retrying in {retry:?}",
                    socket_path.display()
                );
                tokio::time::sleep(retry).await;
            }
        }
    }
}

/// A live client connection to the hub.
///
/// Dropping the value aborts both tasks.
pub(crate) struct Connection {
    frame_tx: UnboundedSender<Vec<u8>>,
    read_handle: JoinHandle<()>,
    write_handle: JoinHandle<()>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

impl Connection {
    /// Spawn read/write tasks over an established stream.
    pub(crate) fn new(stream: UnixStream, event_tx: UnboundedSender<ClientEvent>) -> Self {
        let (read_half, write_half) = stream.into_split();
        let (frame_tx, frame_rx) = mpsc::unbounded_channel::<Vec<u8>>();

        let read_handle = tokio::spawn(Self::read_loop(read_half, event_tx));
        let write_handle = tokio::spawn(Self::write_loop(write_half, frame_rx));

        Self {
            frame_tx,
            read_handle,
            write_handle,
        }
    }

    /// Queue a frame for the write task.
    ///
    /// Returns `false` if the connection has closed.
    pub(crate) fn send(&self, frame: &Frame) -> bool {
        self.frame_tx.send(frame.encode()).is_ok()
    }

    async fn read_loop(
        mut reader: tokio::net::unix::OwnedReadHalf,
        event_tx: UnboundedSender<ClientEvent>,
    ) {
        let mut decoder = FrameDecoder::new();
        let mut buf = [0u8; 64 * 1024];

        loop {
            match reader.read(&mut buf).await {
                Ok(0) => {
                    let _ = event_tx.send(ClientEvent::Disconnected);
                    break;
                }
                Ok(n) => match decoder.feed(&buf[..n]) {
                    Ok(frames) => {
                        for frame in frames {
                            if event_tx.send(ClientEvent::Frame(frame)).is_err() {
                                return; // dispatcher gone
                            }
                        }
                    }
                    Err(e) => {
                        log::error!("[Client] Frame decode error: {e}");
                        let _ = event_tx.send(ClientEvent::Disconnected);
                        break;
                    }
                },
                Err(e) => {
                    log::error!("[Client] Read error: {e}");
                    let _ = event_tx.send(ClientEvent::Disconnected);
                    break;
                }
            }
        }
    }

    async fn write_loop(
        mut writer: tokio::net::unix::OwnedWriteHalf,
        mut frame_rx: UnboundedReceiver<Vec<u8>>,
    ) {
        while let Some(data) = frame_rx.recv().await {
            if let Err(e) = writer.write_all(&data).await {
                log::error!("[Client] Write error: {e}");
                break;
            }
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.read_handle.abort();
        self.write_handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Packet;
    use serde_json::json;

    #[tokio::test]
    async fn test_connect_with_retry_waits_for_listener() {
        let tmp = tempfile::TempDir::new().unwrap();
        let sock_path = tmp.path().join("late.sock");

        // Bind the listener only after the client has started retrying.
        let bind_path = sock_path.clone();
        let binder = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            tokio::net::UnixListener::bind(&bind_path).unwrap()
        });

        let stream = tokio::time::timeout(
            Duration::from_secs(5),
            connect_with_retry(&sock_path, Duration::from_millis(20)),
        )
        .await
        .expect("client should connect once the listener appears");
        drop(stream);
        binder.await.unwrap();
    }

    #[tokio::test]
    async fn test_frames_and_disconnect_surface_as_events() {
        let (client_side, mut hub_side) = UnixStream::pair().unwrap();
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let conn = Connection::new(client_side, event_tx);

        // Hub → client frame.
        let frame = Frame::new("alice.echo", Packet::new("bob", "alice", "echo", json!({})));
        hub_side.write_all(&frame.encode()).await.unwrap();

        let event = tokio::time::timeout(Duration::from_secs(2), event_rx.recv())
            .await
            .expect("Timed out")
            .expect("Channel closed");
        match event {
            ClientEvent::Frame(received) => assert_eq!(received, frame),
            other => panic!("Expected Frame, got: {other:?}"),
        }

        // Client → hub frame.
        assert!(conn.send(&Frame::new("samcore.return", Packet::default())));
        let mut decoder = FrameDecoder::new();
        let mut buf = [0u8; 4096];
        let n = tokio::time::timeout(Duration::from_secs(2), hub_side.read(&mut buf))
            .await
            .expect("Timed out")
            .expect("Read failed");
        let frames = decoder.feed(&buf[..n]).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].key, "samcore.return");

        // Hub going away surfaces as Disconnected.
        drop(hub_side);
        let event = tokio::time::timeout(Duration::from_secs(2), event_rx.recv())
            .await
            .expect("Timed out")
            .expect("Channel closed");
        assert!(matches!(event, ClientEvent::Disconnected));
    }
}
