// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The validated provisioning configuration model.
//!
//! Produced once by [`crate::builder::build_config`] and immutable
//! afterwards, except for renderer-assigned sidecar fields.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{ConfigError, Result};
use crate::paths::Paths;
use crate::resources::{Backup, Project, TagFile};
use crate::sidecar::AutomationGatewayConfig;

/// Default gateway image repository.
pub const DEFAULT_IMAGE_REPO: &str = "inductiveautomation/ignition";

/// Default gateway image tag.
pub const DEFAULT_IMAGE_TAG: &str = "latest";

/// Default logical name for the data volume.
pub const DEFAULT_DATA_MOUNT_SOURCE: &str = "ignition-data";

/// Default in-container data mount target.
pub const DEFAULT_DATA_MOUNT_TARGET: &str = "/data";

/// Provisioning mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Fresh gateway with no seed state.
    Clean,
    /// Restore the gateway from a `.gwbk` backup.
    Backup,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Clean => write!(f, "clean"),
            Self::Backup => write!(f, "backup"),
        }
    }
}

impl std::str::FromStr for Mode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "clean" => Ok(Self::Clean),
            "backup" => Ok(Self::Backup),
            other => Err(ConfigError::Invalid(format!(
                "Invalid mode: '{other}'. Must be 'clean' or 'backup'."
            ))),
        }
    }
}

/// Device connectivity mode for the provisioned gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnType {
    /// Ethernet-attached devices (optional IP + port).
    Ethernet,
    /// Serial-attached devices (COM port mandatory).
    Serial,
}

impl std::fmt::Display for ConnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ethernet => write!(f, "ethernet"),
            Self::Serial => write!(f, "serial"),
        }
    }
}

impl std::str::FromStr for ConnType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "ethernet" => Ok(Self::Ethernet),
            "serial" => Ok(Self::Serial),
            other => Err(ConfigError::Invalid(format!(
                "Invalid connection type '{other}'."
            ))),
        }
    }
}

/// Storage mount kind for the gateway data directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountType {
    /// Orchestration-tool-managed named volume.
    Volume,
    /// Bind mount backed by a host directory.
    Bind,
}

impl std::fmt::Display for MountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Volume => write!(f, "volume"),
            Self::Bind => write!(f, "bind"),
        }
    }
}

impl std::str::FromStr for MountType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "volume" => Ok(Self::Volume),
            "bind" => Ok(Self::Bind),
            other => Err(ConfigError::Invalid(format!(
                "Invalid data_mount_type '{other}'. Use 'volume' or 'bind'."
            ))),
        }
    }
}

/// The gateway data mount: a named volume or a host bind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataMount {
    /// Volume name, or the raw bind source as given in the request.
    pub source: String,
    /// Mount kind.
    pub mount_type: MountType,
    /// In-container target path.
    pub target: String,
    /// Resolved absolute host directory; set only for bind mounts.
    pub local: Option<PathBuf>,
}

impl Default for DataMount {
    fn default() -> Self {
        Self {
            source: DEFAULT_DATA_MOUNT_SOURCE.to_string(),
            mount_type: MountType::Volume,
            target: DEFAULT_DATA_MOUNT_TARGET.to_string(),
            local: None,
        }
    }
}

/// Fully validated provisioning configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Provisioning mode.
    pub mode: Mode,
    /// Backup descriptor; required in backup mode.
    pub backup: Option<Backup>,
    /// Project seed, optional in both modes.
    pub project: Option<Project>,
    /// Tag seed, optional.
    pub tag_file: Option<TagFile>,
    /// Host HTTP port.
    pub http_port: u16,
    /// Host HTTPS port.
    pub https_port: u16,
    /// Gateway admin user name.
    pub admin_user: String,
    /// Gateway admin password. Excluded from every snapshot.
    pub admin_password: String,
    /// Gateway system name.
    pub gateway_name: String,
    /// Ignition edition.
    pub edition: String,
    /// Container timezone.
    pub timezone: String,
    /// Device connectivity mode.
    pub conn_type: ConnType,
    /// Ethernet device IP, optional.
    pub device_ip: Option<String>,
    /// Ethernet device port, required when `device_ip` is set.
    pub device_port: Option<u16>,
    /// Serial COM port identifier, required in serial mode.
    pub com_port: Option<String>,
    /// Serial baud rate, optional.
    pub baud_rate: Option<u32>,
    /// Gateway image repository.
    pub image_repo: String,
    /// Gateway image tag.
    pub image_tag: String,
    /// Gateway data mount.
    pub data_mount: DataMount,
    /// Override directory for third-party modules.
    pub modules_dir: Option<PathBuf>,
    /// Override directory for JDBC drivers.
    pub jdbc_dir: Option<PathBuf>,
    /// `GATEWAY_MODULES_ENABLED` passthrough value.
    pub gateway_modules_enabled: Option<String>,
    /// Force the modules mount regardless of directory contents.
    pub gateway_module_relink: bool,
    /// Force the JDBC mount regardless of directory contents.
    pub gateway_jdbc_relink: bool,
    /// Container-side UID override.
    pub ignition_uid: Option<u32>,
    /// Container-side GID override.
    pub ignition_gid: Option<u32>,
    /// Activation token file, explicit or auto-detected.
    pub activation_token_file: Option<PathBuf>,
    /// License key file, explicit or auto-detected.
    pub license_key_file: Option<PathBuf>,
    /// Optional Automation Gateway sidecar.
    pub automation_gateway: Option<AutomationGatewayConfig>,
}

impl GatewayConfig {
    /// Gateway image reference, `repo:tag`.
    pub fn image(&self) -> String {
        format!("{}:{}", self.image_repo, self.image_tag)
    }

    /// Re-check every invariant the builder established.
    ///
    /// The builder validates as it goes; this is the final cross-field
    /// pass, and the one callers holding an already-built config can use.
    pub fn validate(&self, paths: &Paths) -> Result<()> {
        if self.mode == Mode::Backup {
            let Some(backup) = &self.backup else {
                return Err(ConfigError::Invalid(
                    "Backup mode requires a backup file.".into(),
                ));
            };
            backup.validate()?;
        }
        if let Some(project) = &self.project {
            project.validate()?;
        }
        if let Some(tag_file) = &self.tag_file {
            tag_file.validate()?;
        }

        for (port, name) in [(self.http_port, "HTTP"), (self.https_port, "HTTPS")] {
            if port == 0 {
                return Err(ConfigError::Invalid(format!(
                    "{name} port {port} is out of valid range (1-65535)"
                )));
            }
        }

        if self.admin_user.trim().is_empty() {
            return Err(ConfigError::Invalid("Admin username cannot be empty.".into()));
        }
        if self.admin_password.trim().is_empty() {
            return Err(ConfigError::Invalid("Admin password cannot be empty.".into()));
        }
        if self.gateway_name.trim().is_empty() {
            return Err(ConfigError::Invalid("Gateway name cannot be empty.".into()));
        }

        match self.conn_type {
            ConnType::Ethernet => {
                if self.device_ip.is_some() && self.device_port.is_none() {
                    return Err(ConfigError::Invalid(
                        "Device port must be provided when device IP is set.".into(),
                    ));
                }
            }
            ConnType::Serial => {
                if self.com_port.as_deref().unwrap_or("").is_empty() {
                    return Err(ConfigError::Invalid(
                        "Serial connections require a COM port to be specified.".into(),
                    ));
                }
            }
        }

        if self.data_mount.mount_type == MountType::Bind {
            let Some(local) = &self.data_mount.local else {
                return Err(ConfigError::Invalid(
                    "Data mount local path must be provided when using a bind mount.".into(),
                ));
            };
            if !local.exists() {
                return Err(ConfigError::NotFound {
                    what: "Data mount source",
                    path: local.clone(),
                });
            }
            if !local.is_dir() {
                return Err(ConfigError::Invalid(format!(
                    "Data mount source must be a directory: {}",
                    local.display()
                )));
            }
        }

        for (dir, label) in [
            (&self.modules_dir, "Modules directory"),
            (&self.jdbc_dir, "JDBC directory"),
        ] {
            if let Some(dir) = dir
                && !dir.exists()
            {
                return Err(ConfigError::NotFound {
                    what: label,
                    path: dir.clone(),
                });
            }
        }

        for (file, label) in [
            (&self.activation_token_file, "Activation token file"),
            (&self.license_key_file, "License key file"),
        ] {
            if let Some(file) = file
                && !file.is_file()
            {
                return Err(ConfigError::NotFound {
                    what: label,
                    path: file.clone(),
                });
            }
        }

        if let Some(sidecar) = &self.automation_gateway {
            sidecar.validate(&paths.automation_gateway_templates_dir)?;
        }

        Ok(())
    }

    /// Secret-free snapshot of the configuration for the registry.
    ///
    /// Deliberately omits `admin_password`; everything else an operator
    /// needs to audit the environment later is retained.
    pub fn sanitized_snapshot(&self) -> serde_json::Value {
        let stringify = |p: &Option<PathBuf>| {
            p.as_ref().map(|p| p.display().to_string())
        };

        json!({
            "mode": self.mode.to_string(),
            "http_port": self.http_port,
            "https_port": self.https_port,
            "admin_user": self.admin_user,
            "gateway_name": self.gateway_name,
            "edition": self.edition,
            "timezone": self.timezone,
            "conn_type": self.conn_type.to_string(),
            "device_ip": self.device_ip,
            "device_port": self.device_port,
            "com_port": self.com_port,
            "baud_rate": self.baud_rate,
            "image_repo": self.image_repo,
            "image_tag": self.image_tag,
            "data_mount_type": self.data_mount.mount_type.to_string(),
            "data_mount_source": self.data_mount.source,
            "data_mount_target": self.data_mount.target,
            "data_mount_local": stringify(&self.data_mount.local),
            "modules_dir": stringify(&self.modules_dir),
            "jdbc_dir": stringify(&self.jdbc_dir),
            "gateway_modules_enabled": self.gateway_modules_enabled,
            "gateway_module_relink": self.gateway_module_relink,
            "gateway_jdbc_relink": self.gateway_jdbc_relink,
            "ignition_uid": self.ignition_uid,
            "ignition_gid": self.ignition_gid,
            "activation_token_file": stringify(&self.activation_token_file),
            "license_key_file": stringify(&self.license_key_file),
            "project_name": self.project.as_ref().map(|p| p.name.clone()),
            "tag_name": self.tag_file.as_ref().map(|t| t.name.clone()),
            "backup_name": self.backup.as_ref().map(|b| b.name.clone()),
            "automation_gateway": self.automation_gateway.as_ref().map(|ag| json!({
                "enabled": ag.enabled,
                "image_repo": ag.image_repo,
                "image_tag": ag.image_tag,
                "graphql_port": ag.graphql_port,
                "mqtt_port": ag.mqtt_port,
                "mqtt_ws_port": ag.mqtt_ws_port,
                "opcua_port": ag.opcua_port,
                "log_level": ag.log_level,
                "ignition_endpoint": ag.ignition_endpoint,
                "config_template": ag.config_template,
                "config_source": stringify(&ag.config_source),
                "config_file": stringify(&ag.config_host_path),
                "config_container_path": ag.config_container_path,
            })),
        })
    }
}
