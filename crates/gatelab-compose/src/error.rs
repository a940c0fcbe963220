// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for gatelab-compose.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while rendering deployment artifacts.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RenderError {
    /// A bind-type data mount points at a host path that does not exist.
    #[error("Bind mount source missing for data mount: {}", .0.display())]
    MissingBindSource(PathBuf),

    /// Configuration-side failure surfaced during rendering.
    #[error("Configuration error: {0}")]
    Config(#[from] gatelab_core::ConfigError),

    /// YAML serialization failed.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type using [`RenderError`].
pub type Result<T> = std::result::Result<T, RenderError>;
