// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mount planning for the primary gateway service.
//!
//! Computes the full set of storage mounts from a validated configuration,
//! preparing host directories idempotently as it goes. Directories that
//! exist only as empty placeholders are not exposed into the container
//! unless an override or relink flag says otherwise.

use std::path::{Path, PathBuf};

use gatelab_core::GatewayConfig;
use gatelab_core::config::{Mode, MountType};
use gatelab_core::paths::{PLACEHOLDER_MARKER, Paths, absolutize};

use crate::error::{RenderError, Result};
use crate::topology::MountSpec;

/// In-container log directory.
pub const LOGS_TARGET: &str = "/usr/local/bin/ignition/logs";

/// In-container projects directory.
pub const PROJECTS_TARGET: &str = "/usr/local/bin/ignition/data/projects";

/// In-container directory tag seed files are mounted under.
pub const TAG_IMPORT_TARGET_DIR: &str = "/usr/local/bin/ignition/data/tag-import";

/// In-container restore path for a gateway backup.
pub const RESTORE_TARGET: &str = "/restore.gwbk";

/// In-container third-party modules directory.
pub const MODULES_TARGET: &str = "/modules";

/// In-container JDBC drivers directory.
pub const JDBC_TARGET: &str = "/jdbc";

/// In-container path of the activation token secret.
pub const ACTIVATION_TOKEN_TARGET: &str = "/run/secrets/ignition-activation-token";

/// In-container path of the license key secret.
pub const LICENSE_KEY_TARGET: &str = "/run/secrets/ignition-license-key";

/// The computed mount set for the gateway service.
#[derive(Debug, Clone, Default)]
pub struct MountPlan {
    /// Mounts in render order.
    pub mounts: Vec<MountSpec>,
    /// Named volumes that must be declared at document scope.
    pub volume_names: Vec<String>,
}

/// Decide whether a host directory should be bind-exposed.
///
/// A directory is mounted when an explicit override was given, when the
/// default directory carries payload beyond the placeholder marker, or
/// when the relink flag forces it regardless of contents.
pub fn should_mount(
    override_dir: Option<&Path>,
    default_dir: &Path,
    relink: bool,
) -> Result<bool> {
    if override_dir.is_some() || relink {
        return Ok(true);
    }
    dir_has_payload(default_dir)
}

/// True when the directory exists and holds anything but the marker file.
fn dir_has_payload(dir: &Path) -> Result<bool> {
    if !dir.is_dir() {
        return Ok(false);
    }
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_name() != PLACEHOLDER_MARKER {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Create a mount directory if missing and return its absolute path.
pub fn prepare_mount_dir(dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    Ok(absolutize(dir)?)
}

fn bind_source(path: &Path) -> Result<String> {
    Ok(absolutize(path)?.display().to_string())
}

/// Compute every mount of the primary gateway service.
pub fn plan_gateway_mounts(cfg: &GatewayConfig, paths: &Paths) -> Result<MountPlan> {
    let mut plan = MountPlan::default();

    // Data mount first; everything else layers on top of it.
    match cfg.data_mount.mount_type {
        MountType::Volume => {
            plan.volume_names.push(cfg.data_mount.source.clone());
            plan.mounts.push(MountSpec::volume(
                cfg.data_mount.source.clone(),
                cfg.data_mount.target.clone(),
            ));
        }
        MountType::Bind => {
            let local = cfg
                .data_mount
                .local
                .as_ref()
                .filter(|local| local.is_dir())
                .ok_or_else(|| {
                    RenderError::MissingBindSource(
                        cfg.data_mount
                            .local
                            .clone()
                            .unwrap_or_else(|| PathBuf::from(&cfg.data_mount.source)),
                    )
                })?;
            plan.mounts.push(MountSpec::bind(
                bind_source(local)?,
                cfg.data_mount.target.clone(),
            ));
        }
    }

    // Host-side log directory, always exposed.
    let logs_dir = prepare_mount_dir(&paths.logs_dir)?;
    plan.mounts
        .push(MountSpec::bind(logs_dir.display().to_string(), LOGS_TARGET));

    // Backup restore in backup mode; project sources otherwise.
    match cfg.mode {
        Mode::Backup => {
            // Validation guarantees the descriptor is present by now.
            if let Some(backup) = &cfg.backup {
                plan.mounts.push(
                    MountSpec::bind(bind_source(&backup.path)?, RESTORE_TARGET).read_only(),
                );
            }
        }
        Mode::Clean => {
            let source = match &cfg.project {
                Some(project) => project
                    .path
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| paths.projects_dir.clone()),
                None => prepare_mount_dir(&paths.projects_dir)?,
            };
            plan.mounts
                .push(MountSpec::bind(bind_source(&source)?, PROJECTS_TARGET));
        }
    }

    // Tag seed file.
    if let Some(tag_file) = &cfg.tag_file {
        plan.mounts.push(
            MountSpec::bind(
                bind_source(&tag_file.path)?,
                format!("{TAG_IMPORT_TARGET_DIR}/{}", tag_file.name),
            )
            .read_only(),
        );
    }

    // Modules and JDBC directories, gated by the mount policy.
    if should_mount(
        cfg.modules_dir.as_deref(),
        &paths.modules_dir,
        cfg.gateway_module_relink,
    )? {
        let dir = cfg.modules_dir.clone().unwrap_or_else(|| paths.modules_dir.clone());
        let dir = prepare_mount_dir(&dir)?;
        plan.mounts
            .push(MountSpec::bind(dir.display().to_string(), MODULES_TARGET).read_only());
    }
    if should_mount(
        cfg.jdbc_dir.as_deref(),
        &paths.jdbc_dir,
        cfg.gateway_jdbc_relink,
    )? {
        let dir = cfg.jdbc_dir.clone().unwrap_or_else(|| paths.jdbc_dir.clone());
        let dir = prepare_mount_dir(&dir)?;
        plan.mounts
            .push(MountSpec::bind(dir.display().to_string(), JDBC_TARGET).read_only());
    }

    // Drop-in secrets.
    if let Some(token) = &cfg.activation_token_file {
        plan.mounts
            .push(MountSpec::bind(bind_source(token)?, ACTIVATION_TOKEN_TARGET).read_only());
    }
    if let Some(key) = &cfg.license_key_file {
        plan.mounts
            .push(MountSpec::bind(bind_source(key)?, LICENSE_KEY_TARGET).read_only());
    }

    Ok(plan)
}
