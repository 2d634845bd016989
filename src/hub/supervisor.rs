//! Persistent child-node supervision.
//!
//! At the `Open` transition the hub walks `packages.*` and launches every
//! enabled, persistent package other than itself. The convention: a node
//! named `X` ships its entry-point executable as `<node_root>/X/X` and runs
//! with `<node_root>/X` as its working directory; a non-empty `link` field
//! overrides the program to launch. No environment variables are injected.
//!
//! Child stdout/stderr stream to the hub log line by line, and the exit
//! status is logged on termination. Children are not restarted.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;

use crate::settings::{PackageRecord, SettingsStore};

/// Spawn every enabled persistent package except the hub itself.
///
/// Returns the watcher task handles (one per successfully spawned child);
/// the hub lets them run detached.
pub(crate) fn spawn_persistent_nodes(
    settings: &SettingsStore,
    hub_name: &str,
    node_root: &Path,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();
    let Some(packages) = settings.get("packages").and_then(|value| value.as_object()) else {
        return handles;
    };

    for (name, raw) in packages {
        if name == hub_name {
            continue;
        }
        let record: PackageRecord = match serde_json::from_value(raw.clone()) {
            Ok(record) => record,
            Err(e) => {
                log::warn!("[Supervisor] Skipping malformed package \"{name}\": {e}");
                continue;
            }
        };
        if !(record.enabled && record.persistent) {
            continue;
        }
        if let Some(handle) = spawn_node(name, &record.link, node_root) {
            handles.push(handle);
        }
    }
    handles
}

/// Entry-point program and working directory for a node.
pub(crate) fn resolve_entry(name: &str, link: &str, node_root: &Path) -> (PathBuf, PathBuf) {
    let dir = node_root.join(name);
    let program = if link.is_empty() {
        dir.join(name)
    } else {
        PathBuf::from(link)
    };
    (program, dir)
}

/// Spawn one child node and a watcher task that streams its output and
/// logs its exit status. Returns `None` when the spawn itself fails.
pub(crate) fn spawn_node(name: &str, link: &str, node_root: &Path) -> Option<JoinHandle<()>> {
    let (program, dir) = resolve_entry(name, link, node_root);
    log::info!(
        "[Supervisor] Launching node \"{name}\": {} (cwd {})",
        program.display(),
        dir.display()
    );

    let mut child = match Command::new(&program)
        .current_dir(&dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            log::error!(
                "[Supervisor] Failed to launch \"{name}\" ({}): {e}",
                program.display()
            );
            return None;
        }
    };

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let name = name.to_string();

    Some(tokio::spawn(async move {
        if let Some(stdout) = stdout {
            let node = name.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    log::info!("[{node}] {line}");
                }
            });
        }
        if let Some(stderr) = stderr {
            let node = name.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    log::warn!("[{node}] {line}");
                }
            });
        }

        match child.wait().await {
            Ok(status) => match status.code() {
                Some(code) => log::info!("[Supervisor] Node \"{name}\" exited with code {code}"),
                None => log::warn!("[Supervisor] Node \"{name}\" terminated by signal"),
            },
            Err(e) => log::error!("[Supervisor] Failed waiting on node \"{name}\": {e}"),
        }
    }))
}
