// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Serde model of the compose topology descriptor.
//!
//! The descriptor is a declarative multi-service document consumed by the
//! external `docker compose` CLI: exactly one primary gateway service plus,
//! conditionally, one sidecar service. `BTreeMap`s keep serialization
//! deterministic so re-rendering the same configuration is byte-identical.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use gatelab_core::config::MountType;

/// Service name of the primary gateway.
pub const GATEWAY_SERVICE: &str = "ignition-dev";

/// Service name of the Automation Gateway sidecar.
pub const SIDECAR_SERVICE: &str = "automation-gateway";

/// One storage mount in long syntax: explicit type, source and target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountSpec {
    /// `volume` or `bind`.
    #[serde(rename = "type")]
    pub mount_type: MountType,
    /// Volume name or absolute host path.
    pub source: String,
    /// In-container target path.
    pub target: String,
    /// Mount read-only; omitted when false.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub read_only: bool,
}

impl MountSpec {
    /// A writable volume mount.
    pub fn volume(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            mount_type: MountType::Volume,
            source: source.into(),
            target: target.into(),
            read_only: false,
        }
    }

    /// A writable bind mount.
    pub fn bind(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            mount_type: MountType::Bind,
            source: source.into(),
            target: target.into(),
            read_only: false,
        }
    }

    /// Flip the mount read-only.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }
}

/// One service in the topology.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    /// Image reference, `repo:tag`.
    pub image: String,
    /// Host:container port mappings.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,
    /// Environment block.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
    /// Storage mounts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<MountSpec>,
    /// Container entrypoint arguments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    /// Services that must be started first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    /// Restart policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart: Option<String>,
}

/// Document-scope declaration of a named volume.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSpec {}

/// The full topology descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeFile {
    /// Services keyed by name.
    pub services: BTreeMap<String, ServiceSpec>,
    /// Named volumes referenced by `volume`-type mounts.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub volumes: BTreeMap<String, VolumeSpec>,
}

impl ComposeFile {
    /// Serialize the descriptor to YAML.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mount_spec_serializes_long_syntax() {
        let mount = MountSpec::bind("/srv/backups/a.gwbk", "/restore.gwbk").read_only();
        let yaml = serde_yaml::to_string(&mount).unwrap();
        assert!(yaml.contains("type: bind"));
        assert!(yaml.contains("source: /srv/backups/a.gwbk"));
        assert!(yaml.contains("target: /restore.gwbk"));
        assert!(yaml.contains("read_only: true"));
    }

    #[test]
    fn test_read_only_false_omitted() {
        let mount = MountSpec::volume("ignition-data", "/data");
        let yaml = serde_yaml::to_string(&mount).unwrap();
        assert!(!yaml.contains("read_only"));
    }

    #[test]
    fn test_empty_volumes_section_omitted() {
        let mut compose = ComposeFile::default();
        compose
            .services
            .insert(GATEWAY_SERVICE.to_string(), ServiceSpec::default());
        let yaml = compose.to_yaml().unwrap();
        assert!(!yaml.contains("volumes:"));
    }

    #[test]
    fn test_deterministic_serialization() {
        let mut compose = ComposeFile::default();
        let mut service = ServiceSpec {
            image: "inductiveautomation/ignition:latest".into(),
            ..ServiceSpec::default()
        };
        service.environment.insert("B".into(), "2".into());
        service.environment.insert("A".into(), "1".into());
        compose.services.insert(GATEWAY_SERVICE.into(), service);
        compose
            .volumes
            .insert("ignition-data".into(), VolumeSpec::default());

        let first = compose.to_yaml().unwrap();
        let second = compose.to_yaml().unwrap();
        assert_eq!(first, second);
        // BTreeMap ordering puts A before B regardless of insertion order.
        assert!(first.find("A:").unwrap() < first.find("B:").unwrap());
    }

    #[test]
    fn test_round_trip() {
        let mut compose = ComposeFile::default();
        compose.services.insert(
            GATEWAY_SERVICE.into(),
            ServiceSpec {
                image: "inductiveautomation/ignition:8.1".into(),
                ports: vec!["8088:8088".into()],
                volumes: vec![MountSpec::volume("ignition-data", "/data")],
                restart: Some("unless-stopped".into()),
                ..ServiceSpec::default()
            },
        );
        compose
            .volumes
            .insert("ignition-data".into(), VolumeSpec::default());

        let yaml = compose.to_yaml().unwrap();
        let parsed: ComposeFile = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, compose);
    }
}
