//! Unified event channel for the hub event loop.
//!
//! All background producers (the accept loop and every connection's read
//! task) send events through a single `mpsc::UnboundedSender<HubEvent>`.
//! The hub loop receives on the corresponding receiver and dispatches via
//! `Hub::handle_event()`. Keeping a single consumer means the registry,
//! settings store, and green-light flag never need locks.

use crate::socket::{Frame, NodeConn};

/// Event from a background producer delivered to the hub event loop.
#[derive(Debug)]
pub(crate) enum HubEvent {
    /// A node opened a socket connection. Anonymous until `nodeInit`.
    Connected {
        /// Transport-level connection id.
        conn_id: String,
        /// Handle for writing frames back to the node.
        conn: NodeConn,
    },

    /// A decoded frame arrived on a connection.
    Frame {
        /// Connection the frame arrived on.
        conn_id: String,
        /// The keyed packet.
        frame: Frame,
    },

    /// A connection hit EOF or a read error.
    Disconnected {
        /// Connection that went away.
        conn_id: String,
    },
}
