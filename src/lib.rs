//! SamCore - central message-routing hub for a local node network.
//!
//! Independent worker processes ("nodes") connect to the hub over a local
//! Unix socket and communicate exclusively by exchanging request/response
//! packets through it; nodes never address each other directly.
//!
//! # Architecture
//!
//! - **Hub** - accepts and names connections, routes packets, hosts the
//!   built-in API (presence, readiness gate, per-node settings), and
//!   supervises persistent child nodes
//! - **NodeClient** - the embeddable counterpart every node uses: startup
//!   barrier, correlated request/response calls, handler dispatch
//! - **Packet** - the single envelope carrying every request and reply
//! - **SettingsStore** - the hub's auto-saving settings document
//!
//! # Modules
//!
//! - [`hub`] - the router, its registry, built-ins, and child supervision
//! - [`client`] - the node client library
//! - [`packet`] / [`keys`] - the envelope and the routing-key contract
//! - [`settings`] - persistent package metadata and per-node settings
//! - [`socket`] - Unix-socket transport and frame codec

pub mod client;
pub mod constants;
pub mod hub;
pub mod keys;
pub mod packet;
pub mod settings;
pub mod socket;

// Re-export commonly used types
pub use client::{NodeClient, NodeConfig};
pub use hub::{Hub, HubConfig, HubState};
pub use packet::Packet;
pub use settings::{PackageRecord, SettingsStore};
