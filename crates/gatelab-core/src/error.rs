// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for gatelab-core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while building or validating a gateway configuration.
///
/// Every failure of the configuration builder is a `ConfigError`; no other
/// error type escapes `build_config`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A referenced file or directory does not exist.
    #[error("{what} not found: {}", path.display())]
    NotFound {
        /// Human-readable label for the missing resource.
        what: &'static str,
        /// Path that was probed.
        path: PathBuf,
    },

    /// A referenced resource exists but does not have the expected shape.
    #[error("{0}")]
    InvalidShape(String),

    /// A semantic invariant was violated.
    #[error("{0}")]
    Invalid(String),

    /// A numeric field could not be parsed.
    #[error("Invalid value for {field}: {source}")]
    Parse {
        /// Name of the offending request field.
        field: String,
        /// Underlying parse failure.
        #[source]
        source: std::num::ParseIntError,
    },

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type using [`ConfigError`].
pub type Result<T> = std::result::Result<T, ConfigError>;
