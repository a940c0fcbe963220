// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Gatelab Compose - Deployment Artifact Rendering
//!
//! Turns a validated [`gatelab_core::GatewayConfig`] into the artifacts one
//! environment needs on disk:
//!
//! | Artifact | File | Purpose |
//! |----------|------|---------|
//! | Topology descriptor | `docker-compose.yml` | service/mount/volume layout for the compose CLI |
//! | Environment file | `stack.env` | values substituted into the descriptor at bring-up |
//! | Sidecar config | `automation-gateway/config.yaml` | Automation Gateway runtime config |
//!
//! Rendering performs the filesystem side effects the configuration
//! implies (mount directory creation, payload probing) and is
//! deterministic: re-rendering the same configuration reproduces
//! byte-identical artifacts.

#![deny(missing_docs)]

/// Error types for artifact rendering.
pub mod error;

/// Mount planning and idempotent directory preparation.
pub mod mounts;

/// Serde model of the topology descriptor.
pub mod topology;

/// The three artifact render operations.
pub mod render;

pub use error::RenderError;
pub use render::{render_automation_gateway_config, render_compose, render_env};
