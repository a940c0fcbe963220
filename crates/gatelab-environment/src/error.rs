// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for gatelab-environment.

use thiserror::Error;

/// Environment lifecycle errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The environment identifier is unknown to the registry.
    #[error("Environment not found: {0}")]
    EnvironmentNotFound(String),

    /// Configuration building failed.
    #[error("Configuration error: {0}")]
    Config(#[from] gatelab_core::ConfigError),

    /// Artifact rendering failed.
    #[error("Render error: {0}")]
    Render(#[from] gatelab_compose::RenderError),

    /// The compose CLI failed.
    #[error("Compose error: {0}")]
    Compose(#[from] crate::compose::ComposeCliError),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type using Environment [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
