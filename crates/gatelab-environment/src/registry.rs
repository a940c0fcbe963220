// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Durable environment registry.
//!
//! All provisioned environments live in one JSON document that is
//! rewritten atomically (write-to-temp-then-rename) on every mutation, so
//! readers only ever observe the previous or the new valid state. Loading
//! is defensive: an unreadable document degrades to an empty registry and
//! malformed entries are skipped, both with a logged warning.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use gatelab_core::config::{Mode, MountType};

use crate::error::Result;

/// Lifecycle status of a provisioned environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentStatus {
    /// Artifacts rendered, never started.
    #[default]
    Created,
    /// Bring-up in progress.
    Starting,
    /// Stack is up.
    Running,
    /// Tear-down in progress.
    Stopping,
    /// Stack is down.
    Stopped,
    /// Last start or stop failed; see `last_error`. Retry is allowed.
    Error,
}

impl std::fmt::Display for EnvironmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// One provisioned environment.
///
/// Optional fields default on deserialization so documents written by
/// older versions keep loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentRecord {
    /// Opaque unique identifier.
    pub id: String,
    /// Human-friendly label.
    pub display_name: String,
    /// Gateway system name.
    pub gateway_name: String,
    /// Provisioning mode.
    pub mode: Mode,
    /// When the environment was provisioned.
    pub created_at: DateTime<Utc>,
    /// Rendered topology descriptor.
    pub compose_file: PathBuf,
    /// Rendered environment file.
    pub env_file: PathBuf,
    /// Host HTTP port.
    pub http_port: u16,
    /// Host HTTPS port.
    pub https_port: u16,
    /// Gateway image repository.
    pub image_repo: String,
    /// Gateway image tag.
    pub image_tag: String,
    /// Data mount kind.
    pub data_mount_type: MountType,
    /// Data mount source (volume name or host path).
    pub data_mount_source: String,
    /// Sanitized configuration snapshot; secrets excluded.
    #[serde(default)]
    pub config: Value,
    /// Current lifecycle status.
    #[serde(default)]
    pub status: EnvironmentStatus,
    /// Timestamp of the last successful start.
    #[serde(default)]
    pub last_started_at: Option<DateTime<Utc>>,
    /// Timestamp of the last successful stop.
    #[serde(default)]
    pub last_stopped_at: Option<DateTime<Utc>>,
    /// Message of the last failed start/stop, cleared on success.
    #[serde(default)]
    pub last_error: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct RegistryDocument {
    environments: Vec<Value>,
}

/// Load/save access to the registry document.
#[derive(Debug, Clone)]
pub struct RegistryStore {
    path: PathBuf,
}

impl RegistryStore {
    /// A store over `path`. The file does not need to exist yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the persisted document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all records, degrading gracefully on damage.
    pub async fn load(&self) -> Vec<EnvironmentRecord> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "Failed to read registry");
                return Vec::new();
            }
        };

        let parsed: Value = match serde_json::from_str(&raw) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(
                    path = %self.path.display(),
                    error = %err,
                    "Registry document is corrupt; treating it as empty"
                );
                return Vec::new();
            }
        };

        // Current documents wrap the list; legacy ones were a bare array.
        let entries = match parsed {
            Value::Object(mut map) => match map.remove("environments") {
                Some(Value::Array(entries)) => entries,
                _ => {
                    warn!(path = %self.path.display(), "Unexpected registry payload shape");
                    return Vec::new();
                }
            },
            Value::Array(entries) => entries,
            _ => {
                warn!(path = %self.path.display(), "Unexpected registry payload shape");
                return Vec::new();
            }
        };

        let mut records = Vec::with_capacity(entries.len());
        for entry in entries {
            match serde_json::from_value::<EnvironmentRecord>(entry) {
                Ok(record) => records.push(record),
                Err(err) => {
                    warn!(error = %err, "Skipping malformed registry entry");
                }
            }
        }
        records
    }

    /// Persist all records atomically: write a sibling temp file, then
    /// rename it over the document.
    pub async fn save(&self, records: &[EnvironmentRecord]) -> Result<()> {
        let environments = records
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let document = RegistryDocument { environments };
        let payload = serde_json::to_string_pretty(&document)?;

        let tmp_path = self.path.with_extension("tmp");
        tokio::fs::write(&tmp_path, payload).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn record(id: &str) -> EnvironmentRecord {
        EnvironmentRecord {
            id: id.to_string(),
            display_name: "demo".into(),
            gateway_name: "demo-gateway".into(),
            mode: Mode::Clean,
            created_at: Utc::now(),
            compose_file: PathBuf::from(format!("/envs/{id}/docker-compose.yml")),
            env_file: PathBuf::from(format!("/envs/{id}/stack.env")),
            http_port: 8088,
            https_port: 8043,
            image_repo: "inductiveautomation/ignition".into(),
            image_tag: "latest".into(),
            data_mount_type: MountType::Volume,
            data_mount_source: "ignition-data".into(),
            config: json!({}),
            status: EnvironmentStatus::Created,
            last_started_at: None,
            last_stopped_at: None,
            last_error: None,
        }
    }

    #[tokio::test]
    async fn test_save_then_load_round_trips() {
        let tmp = TempDir::new().unwrap();
        let store = RegistryStore::new(tmp.path().join("registry.json"));

        store.save(&[record("a"), record("b")]).await.unwrap();
        let loaded = store.load().await;
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id, "a");
        assert_eq!(loaded[1].id, "b");
        // No temp file left behind.
        assert!(!tmp.path().join("registry.tmp").exists());
    }

    #[tokio::test]
    async fn test_missing_document_is_empty() {
        let tmp = TempDir::new().unwrap();
        let store = RegistryStore::new(tmp.path().join("registry.json"));
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_document_degrades_to_empty() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("registry.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = RegistryStore::new(&path);
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_entries_skipped_individually() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("registry.json");
        let store = RegistryStore::new(&path);
        store.save(&[record("good")]).await.unwrap();

        // Inject a broken entry next to the valid one.
        let mut doc: Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        doc["environments"]
            .as_array_mut()
            .unwrap()
            .push(json!({"id": "broken"}));
        std::fs::write(&path, doc.to_string()).unwrap();

        let loaded = store.load().await;
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "good");
    }

    #[tokio::test]
    async fn test_legacy_bare_array_accepted() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("registry.json");
        let entry = serde_json::to_value(record("legacy")).unwrap();
        std::fs::write(&path, Value::Array(vec![entry]).to_string()).unwrap();

        let store = RegistryStore::new(&path);
        let loaded = store.load().await;
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "legacy");
    }

    #[tokio::test]
    async fn test_unknown_fields_tolerated() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("registry.json");
        let mut entry = serde_json::to_value(record("future")).unwrap();
        entry["added_in_some_future_version"] = json!("ignored");
        std::fs::write(
            &path,
            json!({"environments": [entry]}).to_string(),
        )
        .unwrap();

        let store = RegistryStore::new(&path);
        assert_eq!(store.load().await.len(), 1);
    }

    #[tokio::test]
    async fn test_interrupted_write_leaves_previous_state() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("registry.json");
        let store = RegistryStore::new(&path);
        store.save(&[record("stable")]).await.unwrap();

        // Simulate a crash between writing the temp file and the rename.
        std::fs::write(path.with_extension("tmp"), "{partial").unwrap();

        let loaded = store.load().await;
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "stable");
    }

    #[tokio::test]
    async fn test_status_defaults_when_absent() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("registry.json");
        let mut entry = serde_json::to_value(record("old")).unwrap();
        let obj = entry.as_object_mut().unwrap();
        obj.remove("status");
        obj.remove("last_started_at");
        obj.remove("last_error");
        std::fs::write(&path, json!({"environments": [entry]}).to_string()).unwrap();

        let store = RegistryStore::new(&path);
        let loaded = store.load().await;
        assert_eq!(loaded[0].status, EnvironmentStatus::Created);
        assert!(loaded[0].last_started_at.is_none());
    }
}
