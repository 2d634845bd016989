//! The routing hub.
//!
//! Accepts node connections on the hub socket, registers node names,
//! routes request and reply packets between nodes, hosts the built-in API
//! surface, and supervises persistent child nodes.
//!
//! # Architecture
//!
//! The hub is a single value driven by one event loop ([`Hub::run`]).
//! Background tasks (the accept loop, per-connection read tasks, child
//! output pumps) never touch hub state directly — they send [`events::HubEvent`]
//! through one unbounded channel and the loop applies each event in order.
//! That single-consumer design is what serializes access to the registry,
//! the settings store, and the green-light flag.

pub(crate) mod events;
pub mod registry;
pub mod supervisor;

mod dispatch;
mod run;

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Result;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::constants::{
    socket_dir, DEFAULT_HUB_NAME, HUB_NAME_ENV, SETTINGS_FILE_NAME, SETTINGS_PATH_ENV,
};
use crate::settings::{PackageRecord, SettingsStore};
use crate::socket::{NodeConn, SocketServer};

use events::HubEvent;
use registry::NodeRegistry;

/// Hook run once at the `Open` transition, before the green light flips.
pub type OpenHook = Box<dyn FnOnce() + Send>;

/// Hub configuration.
///
/// Defaults follow the conventions of the network: the hub is named
/// `samcore`, its socket lives in the OS temp dir (or `SAMCORE_SOCKET_DIR`),
/// and the settings file sits in the working directory.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// The hub's own node name; also names the socket.
    pub hub_name: String,
    /// Directory holding the hub socket.
    pub socket_dir: PathBuf,
    /// Path of the settings file.
    pub settings_path: PathBuf,
    /// Base directory under which persistent child nodes live.
    pub node_root: PathBuf,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            hub_name: DEFAULT_HUB_NAME.to_string(),
            socket_dir: socket_dir(),
            settings_path: PathBuf::from(SETTINGS_FILE_NAME),
            node_root: PathBuf::from("."),
        }
    }
}

impl HubConfig {
    /// Load the configuration: defaults overridden by environment variables.
    pub fn load() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(name) = std::env::var(HUB_NAME_ENV) {
            if !name.is_empty() {
                self.hub_name = name;
            }
        }
        if let Ok(path) = std::env::var(SETTINGS_PATH_ENV) {
            if !path.is_empty() {
                self.settings_path = PathBuf::from(path);
            }
        }
        // socket_dir() already honors SAMCORE_SOCKET_DIR
        self.socket_dir = socket_dir();
    }

    /// Full path of the hub socket.
    pub fn socket_path(&self) -> PathBuf {
        crate::constants::socket_path_in(&self.socket_dir, &self.hub_name)
    }
}

/// Hub lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubState {
    /// Constructed, not yet listening.
    Starting,
    /// Listening; green light still off.
    Accepting,
    /// Green light on; nodes may serve their own APIs.
    Open,
    /// Shutting down; no longer accepting.
    Draining,
    /// Fully stopped.
    Stopped,
}

/// The central router.
pub struct Hub {
    config: HubConfig,
    state: HubState,
    green_light: bool,
    settings: SettingsStore,
    registry: NodeRegistry,
    /// All live connections, anonymous or named, keyed by conn_id.
    conns: HashMap<String, NodeConn>,
    event_tx: UnboundedSender<HubEvent>,
    event_rx: Option<UnboundedReceiver<HubEvent>>,
    server: Option<SocketServer>,
    on_open: Option<OpenHook>,
}

impl Hub {
    /// Create a hub: open the settings store and seed the hub's own
    /// package record if the document doesn't have one yet.
    ///
    /// # Errors
    ///
    /// Fails when the settings file exists but cannot be parsed — user
    /// data is never silently discarded.
    pub fn new(config: HubConfig) -> Result<Self> {
        let mut settings = SettingsStore::open(&config.settings_path, true)?;
        if settings.ensure_package(&config.hub_name, PackageRecord::hub_default())? {
            log::info!(
                "[Hub] Seeded package record for \"{}\" in {}",
                config.hub_name,
                settings.path().display()
            );
        }

        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Ok(Self {
            config,
            state: HubState::Starting,
            green_light: false,
            settings,
            registry: NodeRegistry::new(),
            conns: HashMap::new(),
            event_tx,
            event_rx: Some(event_rx),
            server: None,
            on_open: None,
        })
    }

    /// Install a hook to run at the `Open` transition, right before the
    /// green light flips. This is the hub's "main".
    pub fn on_open(&mut self, hook: OpenHook) {
        self.on_open = Some(hook);
    }

    /// The hub's own node name.
    pub fn hub_name(&self) -> &str {
        &self.config.hub_name
    }

    /// Current lifecycle state.
    pub fn state(&self) -> HubState {
        self.state
    }

    /// Current readiness flag.
    pub fn green_light(&self) -> bool {
        self.green_light
    }

    /// The settings store (hub-private; nodes go through the API).
    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    /// Number of registered (named) nodes.
    pub fn registered_nodes(&self) -> usize {
        self.registry.len()
    }
}
