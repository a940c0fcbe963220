// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Canonical directory layout used across the control plane.
//!
//! Every seed resource (backups, projects, tag exports, modules, JDBC
//! drivers, secrets) lives under a well-known directory derived from one
//! base directory, and all generated artifacts land under `generated/`.

use std::path::{Path, PathBuf};

/// Marker file that does not count as directory payload.
pub const PLACEHOLDER_MARKER: &str = ".gitkeep";

/// Base file name probed for an activation token under the secrets directory.
pub const SECRET_ACTIVATION_TOKEN_BASE: &str = "activation-token";

/// Base file name probed for a license key under the secrets directory.
pub const SECRET_LICENSE_KEY_BASE: &str = "license-key";

/// Extensions probed, in order, when auto-detecting a secret file.
pub const SECRET_PROBE_EXTENSIONS: &[&str] = &["", ".txt", ".key"];

/// Resolved repository directory layout.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory everything else hangs off.
    pub base_dir: PathBuf,
    /// Template files, including sidecar config templates.
    pub templates_dir: PathBuf,
    /// Automation Gateway config templates (`<name>.yaml.j2`).
    pub automation_gateway_templates_dir: PathBuf,
    /// Root for generated artifacts.
    pub generated_dir: PathBuf,
    /// Project exports, one directory per project.
    pub projects_dir: PathBuf,
    /// Tag export files (`.json` / `.xml`).
    pub tags_dir: PathBuf,
    /// Gateway backup files (`.gwbk`).
    pub backups_dir: PathBuf,
    /// Host-side log directory bind-mounted into the gateway.
    pub logs_dir: PathBuf,
    /// Third-party gateway modules.
    pub modules_dir: PathBuf,
    /// JDBC driver jars.
    pub jdbc_dir: PathBuf,
    /// Drop-in secret files (activation token, license key).
    pub secrets_dir: PathBuf,
}

impl Paths {
    /// Derive the full layout from a base directory.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        let templates_dir = base_dir.join("templates");
        Self {
            automation_gateway_templates_dir: templates_dir.join("automation-gateway"),
            generated_dir: base_dir.join("generated"),
            projects_dir: base_dir.join("projects"),
            tags_dir: base_dir.join("tags"),
            backups_dir: base_dir.join("backups"),
            logs_dir: base_dir.join("logs"),
            modules_dir: base_dir.join("modules"),
            jdbc_dir: base_dir.join("jdbc"),
            secrets_dir: base_dir.join("secrets"),
            templates_dir,
            base_dir,
        }
    }

    /// Load the layout from the `GATELAB_HOME` environment variable,
    /// falling back to the current directory.
    pub fn from_env() -> Self {
        let base = std::env::var("GATELAB_HOME").unwrap_or_else(|_| ".".to_string());
        Self::new(base)
    }

    /// Create all runtime directories. Idempotent.
    pub fn ensure_runtime_directories(&self) -> std::io::Result<()> {
        for dir in [
            &self.projects_dir,
            &self.tags_dir,
            &self.backups_dir,
            &self.logs_dir,
            &self.generated_dir,
            &self.modules_dir,
            &self.jdbc_dir,
            &self.secrets_dir,
            &self.automation_gateway_templates_dir,
        ] {
            std::fs::create_dir_all(dir)?;
        }
        tracing::debug!(base_dir = %self.base_dir.display(), "Ensured runtime directories");
        Ok(())
    }

    /// Probe the secrets directory for `base` with each known extension,
    /// returning the first existing file.
    ///
    /// Lets operators drop `secrets/activation-token.txt` without naming it
    /// in the request. An explicit path always wins over this probe.
    pub fn find_secret(&self, base: &str) -> Option<PathBuf> {
        for ext in SECRET_PROBE_EXTENSIONS {
            let candidate = self.secrets_dir.join(format!("{base}{ext}"));
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        None
    }
}

/// Resolve a path to an absolute one without requiring it to exist.
pub fn absolutize(path: &Path) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_layout_hangs_off_base() {
        let paths = Paths::new("/srv/gatelab");
        assert_eq!(paths.backups_dir, PathBuf::from("/srv/gatelab/backups"));
        assert_eq!(
            paths.automation_gateway_templates_dir,
            PathBuf::from("/srv/gatelab/templates/automation-gateway")
        );
    }

    #[test]
    fn test_ensure_runtime_directories_idempotent() {
        let tmp = TempDir::new().unwrap();
        let paths = Paths::new(tmp.path());

        paths.ensure_runtime_directories().unwrap();
        paths.ensure_runtime_directories().unwrap();

        assert!(paths.secrets_dir.is_dir());
        assert!(paths.generated_dir.is_dir());
    }

    #[test]
    fn test_find_secret_prefers_extensionless() {
        let tmp = TempDir::new().unwrap();
        let paths = Paths::new(tmp.path());
        paths.ensure_runtime_directories().unwrap();

        std::fs::write(paths.secrets_dir.join("activation-token.txt"), "t1").unwrap();
        let found = paths.find_secret(SECRET_ACTIVATION_TOKEN_BASE).unwrap();
        assert!(found.ends_with("activation-token.txt"));

        std::fs::write(paths.secrets_dir.join("activation-token"), "t2").unwrap();
        let found = paths.find_secret(SECRET_ACTIVATION_TOKEN_BASE).unwrap();
        assert!(found.ends_with("activation-token"));
    }

    #[test]
    fn test_find_secret_absent() {
        let tmp = TempDir::new().unwrap();
        let paths = Paths::new(tmp.path());
        paths.ensure_runtime_directories().unwrap();

        assert!(paths.find_secret(SECRET_LICENSE_KEY_BASE).is_none());
    }
}
