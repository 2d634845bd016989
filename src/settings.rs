//! Auto-saving settings document for the hub.
//!
//! A JSON-shaped tree persisted to disk, addressable by dotted paths
//! (`"packages.alice.settings"`) or explicit segment slices. The hub owns
//! the file exclusively; every node sees only its own
//! `packages.<name>.settings` sub-tree through the hub API.
//!
//! When opened with autosave (the hub always does), every mutation persists
//! before returning, so reads always reflect the last committed write even
//! across a hub restart.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Per-package metadata record stored under `packages.<name>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageRecord {
    pub version: String,
    pub development: bool,
    pub installed: bool,
    pub enabled: bool,
    pub persistent: bool,
    pub mandatory: bool,
    /// Optional override for the node's entry-point program.
    pub link: String,
    /// Opaque per-node settings; owned by the node itself.
    pub settings: Value,
}

impl Default for PackageRecord {
    fn default() -> Self {
        Self {
            version: "1.0.0".to_string(),
            development: false,
            installed: false,
            enabled: true,
            persistent: false,
            mandatory: false,
            link: String::new(),
            settings: json!({}),
        }
    }
}

impl PackageRecord {
    /// The record seeded for the hub's own package entry.
    pub fn hub_default() -> Self {
        Self {
            installed: true,
            persistent: true,
            mandatory: true,
            ..Self::default()
        }
    }
}

/// Mutable JSON document persisted to a file.
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    autosave: bool,
    doc: Value,
}

impl SettingsStore {
    /// Open the settings file at `path`.
    ///
    /// A missing or empty file yields an empty document. A parse failure on
    /// a non-empty file is an error — user data is never silently discarded.
    pub fn open(path: impl Into<PathBuf>, autosave: bool) -> Result<Self> {
        let path = path.into();
        let doc = Self::load_doc(&path)?;
        Ok(Self { path, autosave, doc })
    }

    fn load_doc(path: &Path) -> Result<Value> {
        match fs::read_to_string(path) {
            Ok(raw) if raw.trim().is_empty() => Ok(Value::Object(Map::new())),
            Ok(raw) => serde_json::from_str(&raw).with_context(|| {
                format!(
                    "Settings file {} is not valid JSON; refusing to discard it",
                    path.display()
                )
            }),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Value::Object(Map::new())),
            Err(err) => {
                Err(err).with_context(|| format!("Failed to read {}", path.display()))
            }
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Value at a dotted path, or `None` if no such path exists.
    ///
    /// The empty path addresses the whole document.
    pub fn get(&self, path: &str) -> Option<&Value> {
        self.get_at(&split_path(path))
    }

    /// Value at an explicit segment path.
    pub fn get_at<S: AsRef<str>>(&self, segments: &[S]) -> Option<&Value> {
        let mut cursor = &self.doc;
        for segment in segments {
            cursor = cursor.as_object()?.get(segment.as_ref())?;
        }
        Some(cursor)
    }

    /// Write `value` at a dotted path, creating missing intermediate objects.
    pub fn set(&mut self, path: &str, value: Value) -> Result<()> {
        self.set_at(&split_path(path), value)
    }

    /// Write `value` at an explicit segment path.
    ///
    /// # Errors
    ///
    /// Fails when an intermediate segment exists but is not an object, when
    /// the path is empty, or when autosave cannot persist the document.
    pub fn set_at<S: AsRef<str>>(&mut self, segments: &[S], value: Value) -> Result<()> {
        let Some((last, parents)) = segments.split_last() else {
            bail!("Cannot set the document root; use empty() instead");
        };
        let mut cursor = &mut self.doc;
        for segment in parents {
            let segment = segment.as_ref();
            let map = cursor
                .as_object_mut()
                .with_context(|| format!("Settings path segment \"{segment}\" is not an object"))?;
            cursor = map
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        let map = cursor.as_object_mut().with_context(|| {
            format!("Settings parent of \"{}\" is not an object", last.as_ref())
        })?;
        map.insert(last.as_ref().to_string(), value);
        self.autosave_if_enabled()
    }

    /// Remove the value at a dotted path. A missing path is a no-op.
    pub fn unset(&mut self, path: &str) -> Result<()> {
        let segments = split_path(path);
        let Some((last, parents)) = segments.split_last() else {
            bail!("Cannot unset the document root; use empty() instead");
        };
        let mut cursor = &mut self.doc;
        for segment in parents {
            match cursor.as_object_mut().and_then(|map| map.get_mut(segment)) {
                Some(next) => cursor = next,
                None => return Ok(()),
            }
        }
        if let Some(map) = cursor.as_object_mut() {
            map.remove(last);
        }
        self.autosave_if_enabled()
    }

    /// Append `value` to the array at a dotted path.
    ///
    /// # Errors
    ///
    /// Fails when the path is absent or holds anything but an array.
    pub fn append(&mut self, path: &str, value: Value) -> Result<()> {
        let array = self
            .get_mut(path)
            .with_context(|| format!("Settings path \"{path}\" does not exist"))?
            .as_array_mut()
            .with_context(|| format!("Settings path \"{path}\" is not an array"))?;
        array.push(value);
        self.autosave_if_enabled()
    }

    /// Remove and return the last element of the array at a dotted path.
    ///
    /// Returns `None` when the array is empty.
    ///
    /// # Errors
    ///
    /// Fails when the path is absent or holds anything but an array.
    pub fn pop(&mut self, path: &str) -> Result<Option<Value>> {
        let array = self
            .get_mut(path)
            .with_context(|| format!("Settings path \"{path}\" does not exist"))?
            .as_array_mut()
            .with_context(|| format!("Settings path \"{path}\" is not an array"))?;
        let popped = array.pop();
        self.autosave_if_enabled()?;
        Ok(popped)
    }

    /// Reset the whole document to an empty object.
    pub fn empty(&mut self) -> Result<()> {
        self.doc = Value::Object(Map::new());
        self.autosave_if_enabled()
    }

    /// Persist the document as 2-space-indented JSON.
    pub fn save(&self) -> Result<()> {
        let mut rendered = serde_json::to_string_pretty(&self.doc)?;
        rendered.push('\n');
        fs::write(&self.path, rendered)
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }

    /// Reload the document from disk, discarding in-memory state.
    pub fn read(&mut self) -> Result<()> {
        self.doc = Self::load_doc(&self.path)?;
        Ok(())
    }

    /// Clone of the whole document.
    pub fn to_object(&self) -> Value {
        self.doc.clone()
    }

    /// Ensure `packages.<name>` exists, seeding `record` when absent.
    ///
    /// Returns true when a new record was written.
    pub fn ensure_package(&mut self, name: &str, record: PackageRecord) -> Result<bool> {
        if self.get_at(&["packages", name]).is_some() {
            return Ok(false);
        }
        self.set_at(&["packages", name], serde_json::to_value(record)?)?;
        Ok(true)
    }

    /// Parsed `packages.<name>` record, if present and well-formed.
    pub fn package(&self, name: &str) -> Option<PackageRecord> {
        let raw = self.get_at(&["packages", name])?.clone();
        serde_json::from_value(raw).ok()
    }

    fn get_mut(&mut self, path: &str) -> Option<&mut Value> {
        let mut cursor = &mut self.doc;
        for segment in split_path(path) {
            cursor = cursor.as_object_mut()?.get_mut(&segment)?;
        }
        Some(cursor)
    }

    fn autosave_if_enabled(&self) -> Result<()> {
        if self.autosave {
            self.save()?;
        }
        Ok(())
    }
}

/// Split a dotted path into segments; the empty path has no segments.
fn split_path(path: &str) -> Vec<String> {
    if path.is_empty() {
        return Vec::new();
    }
    path.split('.').map(str::to_string).collect()
}
