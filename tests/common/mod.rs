//! Shared helpers for integration tests.
//!
//! Each test runs a real hub on a Unix socket inside its own temp dir,
//! with the settings file alongside, so tests are fully isolated and can
//! run in parallel.

#![allow(dead_code)]

use std::path::Path;
use std::time::Duration;

use samcore::{Hub, HubConfig, NodeClient, NodeConfig};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// A hub running in a background task.
pub struct TestHub {
    pub config: HubConfig,
    pub shutdown_tx: watch::Sender<bool>,
    pub handle: JoinHandle<anyhow::Result<()>>,
}

impl TestHub {
    /// Stop the hub and wait for the event loop to exit.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        let result = tokio::time::timeout(Duration::from_secs(2), self.handle)
            .await
            .expect("hub should stop promptly")
            .expect("hub task should not panic");
        result.expect("hub run should exit cleanly");
    }
}

/// Start a hub named `samcore` with its socket and settings in `dir`.
pub async fn start_hub(dir: &Path) -> TestHub {
    let config = HubConfig {
        hub_name: "samcore".to_string(),
        socket_dir: dir.to_path_buf(),
        settings_path: dir.join("SamCoreSettings.json"),
        node_root: dir.to_path_buf(),
    };
    let mut hub = Hub::new(config.clone()).expect("hub should construct");
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(async move { hub.run(shutdown_rx).await });

    // Wait for the socket so clients connect on their first attempt.
    let socket_path = config.socket_path();
    for _ in 0..200 {
        if socket_path.exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(socket_path.exists(), "hub socket never appeared");

    TestHub {
        config,
        shutdown_tx,
        handle,
    }
}

/// A client for `name` pointed at the hub in `dir`, with a 2 s call
/// deadline so a broken hub fails tests instead of hanging them.
pub fn client(dir: &Path, name: &str) -> NodeClient {
    let mut config = NodeConfig::new(name);
    config.socket_dir = dir.to_path_buf();
    config.call_timeout = Some(Duration::from_secs(2));
    NodeClient::new(config)
}

/// A client with an explicit call deadline.
pub fn client_with_timeout(dir: &Path, name: &str, timeout: Option<Duration>) -> NodeClient {
    let mut config = NodeConfig::new(name);
    config.socket_dir = dir.to_path_buf();
    config.call_timeout = timeout;
    NodeClient::new(config)
}
