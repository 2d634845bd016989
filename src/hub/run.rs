//! Hub event loop.
//!
//! [`Hub::run`] drives the full lifecycle: bind the socket, run the open
//! hook, flip the green light, launch persistent children, then apply
//! events from the unified channel until shutdown is requested. No dispatch
//! decision is made while blocked on I/O — connection reads and writes
//! happen in their own tasks and only surface here as events.

use anyhow::{Context, Result};
use tokio::sync::watch;

use crate::hub::registry::NodeRegistry;
use crate::socket::SocketServer;

use super::{supervisor, Hub, HubState};

impl Hub {
    /// Run the hub until `shutdown_rx` flips true (or its sender drops).
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be bound or `run` is called
    /// more than once on the same hub.
    pub async fn run(&mut self, mut shutdown_rx: watch::Receiver<bool>) -> Result<()> {
        let mut event_rx = self
            .event_rx
            .take()
            .context("Hub::run may only be called once")?;

        self.state = HubState::Accepting;
        let server = SocketServer::start(self.config.socket_path(), self.event_tx.clone())?;
        self.server = Some(server);

        // Open transition: user hook first, then the green light, then the
        // persistent children — nodes gate on greenLight, so children
        // launched here can begin their own startup immediately.
        if let Some(hook) = self.on_open.take() {
            hook();
        }
        self.green_light = true;
        self.state = HubState::Open;
        log::info!("[Hub] Network operational (greenLight on)");

        supervisor::spawn_persistent_nodes(
            &self.settings,
            &self.config.hub_name,
            &self.config.node_root,
        );

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
                event = event_rx.recv() => {
                    match event {
                        Some(event) => self.handle_event(event),
                        None => break, // all producers gone
                    }
                }
            }
        }

        self.state = HubState::Draining;
        log::info!("[Hub] Draining: closing {} connection(s)", self.conns.len());
        if let Some(server) = self.server.take() {
            server.shutdown();
        }
        self.conns.clear();
        self.registry = NodeRegistry::new();
        self.green_light = false;
        self.state = HubState::Stopped;
        log::info!("[Hub] Stopped");
        Ok(())
    }
}
