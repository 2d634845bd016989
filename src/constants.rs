//! Protocol constants shared by the hub and the node client library.
//!
//! The routing-key verbs and timing values here are a wire contract:
//! heterogeneous node implementations interoperate only if they agree on
//! these exact strings and cadences.

use std::path::PathBuf;

/// Default hub node name; also the socket identifier.
pub const DEFAULT_HUB_NAME: &str = "samcore";

/// Settings file name, resolved relative to the hub's working directory.
pub const SETTINGS_FILE_NAME: &str = "SamCoreSettings.json";

/// Env var overriding the directory that holds hub sockets.
pub const SOCKET_DIR_ENV: &str = "SAMCORE_SOCKET_DIR";

/// Env var overriding the settings file path.
pub const SETTINGS_PATH_ENV: &str = "SAMCORE_SETTINGS_PATH";

/// Env var overriding the hub name.
pub const HUB_NAME_ENV: &str = "SAMCORE_HUB_NAME";

/// Interval between connection attempts while a client waits for the hub.
pub const CONNECT_RETRY_MS: u64 = 1500;

/// Interval between greenLight polls during client startup.
pub const GREEN_LIGHT_POLL_MS: u64 = 1000;

/// Reserved hub verb: node registration handshake.
pub const API_NODE_INIT: &str = "nodeInit";

/// Reserved hub verb: readiness-gate query.
pub const API_GREEN_LIGHT: &str = "greenLight";

/// Reserved hub verb: forward a packet to the addressed receiver.
pub const API_SEND: &str = "send";

/// Reserved hub verb: deliver a reply back to the original caller.
pub const API_RETURN: &str = "return";

/// Debug channel suffix for human-readable messages to a node.
pub const API_MESSAGE: &str = "message";

/// Harmless liveness probe emitted during registry sweeps.
pub const API_WELLNESS_CHECK: &str = "wellnessCheck";

/// Synthetic error text used when a pending call's deadline expires.
pub const TIMEOUT_ERROR: &str = "API Timeout!";

/// Directory that holds hub sockets: env override or the OS temp dir.
pub fn socket_dir() -> PathBuf {
    std::env::var_os(SOCKET_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
}

/// Socket path for a hub, named after the hub itself.
pub fn socket_path_in(dir: &std::path::Path, hub_name: &str) -> PathBuf {
    dir.join(format!("{hub_name}.sock"))
}
