// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Builds a validated [`GatewayConfig`] from an untyped request.
//!
//! The request arrives as a flat JSON object from the API layer. Fields
//! are read leniently (numbers may arrive as strings), but every invariant
//! is enforced here: the builder is the single source of truth for
//! defaults and validation, and the first violated invariant wins.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::config::{
    ConnType, DataMount, DEFAULT_DATA_MOUNT_SOURCE, DEFAULT_DATA_MOUNT_TARGET,
    DEFAULT_IMAGE_REPO, DEFAULT_IMAGE_TAG, GatewayConfig, Mode, MountType,
};
use crate::error::{ConfigError, Result};
use crate::paths::{
    Paths, SECRET_ACTIVATION_TOKEN_BASE, SECRET_LICENSE_KEY_BASE, absolutize,
};
use crate::resources::{Backup, Project, TagFile};
use crate::sidecar::AutomationGatewayConfig;

/// Read a string field, trimmed; empty and non-scalar values become `None`.
fn raw_string(raw: &Value, key: &str) -> Option<String> {
    let value = raw.get(key)?;
    let s = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if s.is_empty() { None } else { Some(s) }
}

/// Read a boolean field; accepts JSON booleans and truthy strings.
fn raw_bool(raw: &Value, key: &str) -> bool {
    match raw.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => {
            matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
        }
        _ => false,
    }
}

/// Read an integer field, keeping the parse failure as the error cause.
fn raw_number<T>(raw: &Value, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr<Err = std::num::ParseIntError>,
{
    let Some(text) = raw_string(raw, key) else {
        return Ok(None);
    };
    text.parse::<T>()
        .map(Some)
        .map_err(|source| ConfigError::Parse {
            field: key.to_string(),
            source,
        })
}

/// True when a mount source reads as a host path rather than a volume name.
fn looks_path_like(source: &str) -> bool {
    Path::new(source).is_absolute()
        || source.starts_with("./")
        || source.starts_with("../")
        || source.contains('/')
        || source.contains('\\')
}

/// Directory override from the request, absolutized and created if missing.
fn resolve_dir(raw: &Value, key: &str) -> Result<Option<PathBuf>> {
    let Some(text) = raw_string(raw, key) else {
        return Ok(None);
    };
    let dir = absolutize(Path::new(&text))?;
    std::fs::create_dir_all(&dir)?;
    Ok(Some(dir))
}

/// Explicit secret path, or the first match of the secrets-directory probe.
fn resolve_secret(raw: &Value, key: &str, paths: &Paths, base: &str) -> Option<PathBuf> {
    if let Some(text) = raw_string(raw, key) {
        return Some(PathBuf::from(text));
    }
    paths.find_secret(base)
}

/// Build and validate a [`GatewayConfig`] from raw request fields.
///
/// Steps run in strict order and short-circuit on the first violated
/// invariant; every failure surfaces as a [`ConfigError`].
pub fn build_config(raw: &Value, paths: &Paths) -> Result<GatewayConfig> {
    tracing::debug!("Building gateway configuration from raw request");

    // Mode
    let mode: Mode = raw_string(raw, "mode").unwrap_or_default().parse()?;
    tracing::debug!(%mode, "Mode resolved");

    // Backup, only meaningful in backup mode
    let backup = if mode == Mode::Backup {
        let Some(backup_name) = raw_string(raw, "backup_name") else {
            return Err(ConfigError::Invalid(
                "Mode 'backup' selected, but no backup file provided.".into(),
            ));
        };
        let backups_dir = raw_string(raw, "backups_dir")
            .map(PathBuf::from)
            .unwrap_or_else(|| paths.backups_dir.clone());
        let backup = Backup {
            path: backups_dir.join(&backup_name),
            name: backup_name,
        };
        backup.validate()?;
        tracing::info!(path = %backup.path.display(), "Loaded backup");
        Some(backup)
    } else {
        None
    };

    // Project, optional in both modes
    let project = match raw_string(raw, "project_name") {
        Some(project_name) => {
            let projects_dir = raw_string(raw, "projects_dir")
                .map(PathBuf::from)
                .unwrap_or_else(|| paths.projects_dir.clone());
            let mut project = Project {
                path: projects_dir.join(&project_name),
                name: project_name,
            };
            project.resolve()?;
            tracing::info!(path = %project.path.display(), "Loaded project");
            Some(project)
        }
        None => None,
    };

    // Tag file, optional
    let tag_file = match raw_string(raw, "tag_name") {
        Some(tag_name) => {
            let tags_dir = raw_string(raw, "tags_dir")
                .map(PathBuf::from)
                .unwrap_or_else(|| paths.tags_dir.clone());
            let tag_file = TagFile::new(tag_name.clone(), tags_dir.join(&tag_name))?;
            tag_file.validate()?;
            tracing::info!(path = %tag_file.path.display(), "Loaded tag file");
            Some(tag_file)
        }
        None => None,
    };

    // Ports
    let http_port: u16 = raw_number(raw, "http_port")?.unwrap_or(8088);
    let https_port: u16 = raw_number(raw, "https_port")?.unwrap_or(8043);
    for (port, name) in [(http_port, "HTTP"), (https_port, "HTTPS")] {
        if port == 0 {
            return Err(ConfigError::Invalid(format!(
                "{name} port {port} is out of valid range (1-65535)"
            )));
        }
    }

    // Credentials and identity
    let admin_user = raw_string(raw, "admin_user").unwrap_or_default();
    let admin_password = raw_string(raw, "admin_pass").unwrap_or_default();
    if admin_user.is_empty() || admin_password.is_empty() {
        return Err(ConfigError::Invalid(
            "Admin username and password must be provided.".into(),
        ));
    }
    let Some(gateway_name) = raw_string(raw, "gateway_name") else {
        return Err(ConfigError::Invalid("Gateway name must be provided.".into()));
    };
    let edition = raw_string(raw, "edition").unwrap_or_else(|| "standard".into());
    let timezone = raw_string(raw, "timezone").unwrap_or_else(|| "America/Chicago".into());

    // Device connectivity
    let conn_type: ConnType = raw_string(raw, "conn_type")
        .unwrap_or_else(|| "ethernet".into())
        .parse()?;
    let device_ip = raw_string(raw, "device_ip");
    let device_port: Option<u16> = raw_number(raw, "device_port")?;
    let com_port = raw_string(raw, "com_port");
    let baud_rate: Option<u32> = raw_number(raw, "baud_rate")?;
    match conn_type {
        ConnType::Ethernet => {
            if device_ip.is_some() && device_port.is_none() {
                return Err(ConfigError::Invalid(
                    "Device port must be provided when device IP is set.".into(),
                ));
            }
        }
        ConnType::Serial => {
            if com_port.is_none() {
                return Err(ConfigError::Invalid(
                    "Serial connections require a COM port to be specified.".into(),
                ));
            }
        }
    }
    for (value, label) in [
        (device_port.map(u32::from), "device_port"),
        (baud_rate, "baud_rate"),
    ] {
        if value == Some(0) {
            return Err(ConfigError::Invalid(format!("{label} must be positive.")));
        }
    }

    // Image coordinates; empty strings fall back to defaults
    let image_repo = raw_string(raw, "image_repo").unwrap_or_else(|| DEFAULT_IMAGE_REPO.into());
    let image_tag = raw_string(raw, "image_tag").unwrap_or_else(|| DEFAULT_IMAGE_TAG.into());

    // Data mount normalization: explicit type wins, otherwise infer from
    // the shape of the source string.
    let data_source = raw_string(raw, "data_mount_source");
    let explicit_type: Option<MountType> = match raw_string(raw, "data_mount_type") {
        Some(text) => Some(text.parse()?),
        None => None,
    };
    let mount_type = explicit_type.unwrap_or_else(|| {
        match &data_source {
            Some(source) if looks_path_like(source) => MountType::Bind,
            _ => MountType::Volume,
        }
    });
    let target = raw_string(raw, "data_mount_target")
        .unwrap_or_else(|| DEFAULT_DATA_MOUNT_TARGET.into());
    let data_mount = match mount_type {
        MountType::Bind => {
            let Some(source) = data_source else {
                return Err(ConfigError::Invalid(
                    "Data mount local path must be provided when using a bind mount.".into(),
                ));
            };
            let local = absolutize(Path::new(&source))?;
            std::fs::create_dir_all(&local)?;
            DataMount {
                source: local.display().to_string(),
                mount_type: MountType::Bind,
                target,
                local: Some(local),
            }
        }
        MountType::Volume => DataMount {
            source: data_source.unwrap_or_else(|| DEFAULT_DATA_MOUNT_SOURCE.into()),
            mount_type: MountType::Volume,
            target,
            local: None,
        },
    };

    // Optional directory overrides, created when given
    let modules_dir = resolve_dir(raw, "modules_dir")?;
    let jdbc_dir = resolve_dir(raw, "jdbc_dir")?;

    // Secret auto-detection: explicit paths win, otherwise probe secrets/
    let activation_token_file =
        resolve_secret(raw, "activation_token_file", paths, SECRET_ACTIVATION_TOKEN_BASE);
    let license_key_file =
        resolve_secret(raw, "license_key_file", paths, SECRET_LICENSE_KEY_BASE);

    // Sidecar, only when explicitly enabled
    let automation_gateway = if raw_bool(raw, "automation_gateway_enabled") {
        Some(build_sidecar(raw, paths)?)
    } else {
        None
    };

    // Owner/group ids
    let ignition_uid: Option<u32> = raw_number(raw, "ignition_uid")?;
    let ignition_gid: Option<u32> = raw_number(raw, "ignition_gid")?;

    let cfg = GatewayConfig {
        mode,
        backup,
        project,
        tag_file,
        http_port,
        https_port,
        admin_user,
        admin_password,
        gateway_name,
        edition,
        timezone,
        conn_type,
        device_ip,
        device_port,
        com_port,
        baud_rate,
        image_repo,
        image_tag,
        data_mount,
        modules_dir,
        jdbc_dir,
        gateway_modules_enabled: raw_string(raw, "gateway_modules_enabled"),
        gateway_module_relink: raw_bool(raw, "gateway_module_relink"),
        gateway_jdbc_relink: raw_bool(raw, "gateway_jdbc_relink"),
        ignition_uid,
        ignition_gid,
        activation_token_file,
        license_key_file,
        automation_gateway,
    };

    // Final cross-field pass; both sides check every invariant.
    cfg.validate(paths)?;
    tracing::info!(gateway = %cfg.gateway_name, %mode, "Built gateway configuration");
    Ok(cfg)
}

fn build_sidecar(raw: &Value, paths: &Paths) -> Result<AutomationGatewayConfig> {
    let defaults = AutomationGatewayConfig::default();

    let config_source = match raw_string(raw, "automation_gateway_config_source") {
        Some(text) => {
            let path = PathBuf::from(&text);
            // Bare file names resolve against the canonical templates dir.
            Some(if path.is_absolute() {
                path
            } else {
                paths.automation_gateway_templates_dir.join(path)
            })
        }
        None => None,
    };

    Ok(AutomationGatewayConfig {
        enabled: true,
        image_repo: raw_string(raw, "automation_gateway_image_repo")
            .unwrap_or(defaults.image_repo),
        image_tag: raw_string(raw, "automation_gateway_image_tag").unwrap_or(defaults.image_tag),
        graphql_port: raw_number(raw, "automation_gateway_graphql_port")?
            .unwrap_or(defaults.graphql_port),
        mqtt_port: raw_number(raw, "automation_gateway_mqtt_port")?.unwrap_or(defaults.mqtt_port),
        mqtt_ws_port: raw_number(raw, "automation_gateway_mqtt_ws_port")?
            .unwrap_or(defaults.mqtt_ws_port),
        opcua_port: raw_number(raw, "automation_gateway_opcua_port")?
            .unwrap_or(defaults.opcua_port),
        log_level: raw_string(raw, "automation_gateway_log_level").unwrap_or(defaults.log_level),
        ignition_endpoint: raw_string(raw, "automation_gateway_ignition_endpoint")
            .unwrap_or(defaults.ignition_endpoint),
        config_template: raw_string(raw, "automation_gateway_config_template")
            .unwrap_or(defaults.config_template),
        config_source,
        config_host_path: None,
        config_container_path: defaults.config_container_path,
    })
}
