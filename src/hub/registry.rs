//! The hub's name → connection table.
//!
//! One entry per node name, created by `nodeInit` and destroyed on
//! disconnect. Re-registering a name replaces the prior handle — the hub
//! never holds two live connections under the same name.

use std::collections::HashMap;
use std::time::SystemTime;

/// Registration entry for one named node.
#[derive(Debug, Clone)]
pub struct NodeEntry {
    /// Transport connection currently bound to this name.
    pub conn_id: String,
    /// When the current registration happened.
    pub connected_at: SystemTime,
}

/// In-memory registry of named node connections.
#[derive(Debug, Default)]
pub struct NodeRegistry {
    entries: HashMap<String, NodeEntry>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to `conn_id`, replacing any prior binding.
    ///
    /// Returns the conn_id previously bound to this name, if any.
    pub fn register(&mut self, name: &str, conn_id: &str) -> Option<String> {
        self.entries
            .insert(
                name.to_string(),
                NodeEntry {
                    conn_id: conn_id.to_string(),
                    connected_at: SystemTime::now(),
                },
            )
            .map(|old| old.conn_id)
    }

    /// True iff a node with this name is currently registered.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Connection currently bound to `name`.
    pub fn conn_id_of(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(|entry| entry.conn_id.as_str())
    }

    /// Name currently bound to a connection, if it has registered.
    pub fn name_for_conn(&self, conn_id: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, entry)| entry.conn_id == conn_id)
            .map(|(name, _)| name.as_str())
    }

    /// Remove whatever name is bound to `conn_id`. Returns the name.
    pub fn remove_conn(&mut self, conn_id: &str) -> Option<String> {
        let name = self.name_for_conn(conn_id)?.to_string();
        self.entries.remove(&name);
        Some(name)
    }

    /// Remove a binding by name.
    pub fn remove(&mut self, name: &str) -> Option<NodeEntry> {
        self.entries.remove(name)
    }

    /// Iterate over `(name, entry)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &NodeEntry)> {
        self.entries.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    /// Registered node names, for sweep snapshots.
    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
