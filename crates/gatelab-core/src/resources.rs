// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Seed resource descriptors: backups, project exports, and tag files.
//!
//! Descriptors carry no business logic beyond "does this look like the
//! expected artifact"; each one validates its own existence and shape
//! before it is embedded in a [`crate::config::GatewayConfig`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// File name of the project manifest expected in an Ignition project export.
pub const PROJECT_MANIFEST: &str = "project.json";

/// A gateway backup (`.gwbk`) to restore from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backup {
    /// File name under the backups directory.
    pub name: String,
    /// Full path to the backup file.
    pub path: PathBuf,
}

impl Backup {
    /// Ensure the backup file exists and carries the `.gwbk` extension.
    pub fn validate(&self) -> Result<()> {
        if !self.path.is_file() {
            return Err(ConfigError::NotFound {
                what: "Backup file",
                path: self.path.clone(),
            });
        }
        let ext = self
            .path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if ext != "gwbk" {
            return Err(ConfigError::InvalidShape(format!(
                "Invalid backup extension for {}: expected .gwbk",
                self.path.display()
            )));
        }
        Ok(())
    }
}

/// Resolve the effective root of a project export.
///
/// Returns `path` itself when it directly contains `project.json`. Some
/// export tools wrap the project in one extra directory; when `path` holds
/// exactly one subdirectory and that subdirectory contains the manifest,
/// the nested directory is the root. Pure: never mutates anything.
pub fn project_root(name: &str, path: &Path) -> Result<PathBuf> {
    if path.join(PROJECT_MANIFEST).is_file() {
        return Ok(path.to_path_buf());
    }

    let mut subdirs = Vec::new();
    if path.is_dir() {
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                subdirs.push(entry.path());
            }
        }
    }
    if let [nested] = subdirs.as_slice()
        && nested.join(PROJECT_MANIFEST).is_file()
    {
        return Ok(nested.clone());
    }

    Err(ConfigError::InvalidShape(format!(
        "Project '{name}' missing {PROJECT_MANIFEST} manifest in {}",
        path.display()
    )))
}

/// An Ignition project export directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    /// Directory name under the projects directory.
    pub name: String,
    /// Resolved project root. Rewritten once by [`Project::resolve`] when
    /// the export nests the real root one directory down.
    pub path: PathBuf,
}

impl Project {
    /// Validate the export and store the resolved root.
    pub fn resolve(&mut self) -> Result<()> {
        self.path = project_root(&self.name, &self.path)?;
        Ok(())
    }

    /// Re-check the stored root without rewriting it.
    pub fn validate(&self) -> Result<()> {
        project_root(&self.name, &self.path).map(|_| ())
    }
}

/// Recognized tag export formats, derived from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagFormat {
    /// JSON tag export.
    Json,
    /// XML tag export.
    Xml,
}

impl std::fmt::Display for TagFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Xml => write!(f, "xml"),
        }
    }
}

/// A tag export file seeded into the gateway at first start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagFile {
    /// File name under the tags directory.
    pub name: String,
    /// Full path to the export file.
    pub path: PathBuf,
    /// Format derived from the extension at construction time.
    pub format: TagFormat,
}

impl TagFile {
    /// Build a descriptor, deriving the format from the file extension.
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let format = match ext.as_str() {
            "json" => TagFormat::Json,
            "xml" => TagFormat::Xml,
            _ => {
                return Err(ConfigError::InvalidShape(format!(
                    "Unsupported tag file format: {}",
                    path.display()
                )));
            }
        };
        Ok(Self {
            name: name.into(),
            path,
            format,
        })
    }

    /// Ensure the tag file exists.
    pub fn validate(&self) -> Result<()> {
        if !self.path.is_file() {
            return Err(ConfigError::NotFound {
                what: "Tag file",
                path: self.path.clone(),
            });
        }
        Ok(())
    }
}
