//! Pending-call table: returnCode → one-shot continuation.
//!
//! One entry per in-flight `callApi`. Entries are created when a call is
//! issued and consumed exactly once — by the reply, or by cancellation when
//! the caller's deadline fires first. Replies for already-cancelled codes
//! find no entry and are dropped by the dispatcher.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::oneshot;

use crate::packet::Packet;

#[derive(Debug, Default)]
pub(crate) struct PendingCalls {
    last_code: i64,
    waiters: HashMap<i64, oneshot::Sender<Packet>>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a correlation code unique within this client's connection
    /// lifetime: the current millisecond timestamp, bumped monotonically on
    /// collision (concurrent calls within the same millisecond).
    pub fn next_code(&mut self) -> i64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as i64)
            .unwrap_or(0);
        let code = if now <= self.last_code {
            self.last_code + 1
        } else {
            now
        };
        self.last_code = code;
        code
    }

    /// Register a one-shot waiter for `code`.
    pub fn register(&mut self, code: i64) -> oneshot::Receiver<Packet> {
        let (tx, rx) = oneshot::channel();
        self.waiters.insert(code, tx);
        rx
    }

    /// Resolve a pending call with its reply.
    ///
    /// Returns false when the code is unknown — a late reply for a call
    /// that already timed out, which the caller must silently drop.
    pub fn resolve(&mut self, code: i64, packet: Packet) -> bool {
        match self.waiters.remove(&code) {
            Some(tx) => tx.send(packet).is_ok(),
            None => false,
        }
    }

    /// Tear down a pending entry (deadline expiry).
    pub fn cancel(&mut self, code: i64) {
        self.waiters.remove(&code);
    }

    /// Number of in-flight calls.
    pub fn in_flight(&self) -> usize {
        self.waiters.len()
    }
}
