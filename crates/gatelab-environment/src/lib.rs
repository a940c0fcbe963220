// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Gatelab Environment - Environment Lifecycle Management
//!
//! This crate is the control plane for provisioned dev gateway
//! environments: it renders artifacts through `gatelab-compose`, drives
//! the external `docker compose` CLI, and tracks every environment in a
//! durable, atomically-rewritten JSON registry.
//!
//! # Environment Status State Machine
//!
//! ```text
//!  (none) --create--> CREATED --start--> STARTING --ok--> RUNNING
//!                        ^                   |                |
//!                        |                 fail             stop
//!                        |                   v                v
//!                        |                 ERROR <--fail-- STOPPING
//!                        |                   |                |
//!                        |        retry start/stop            ok
//!                        |                                    v
//!                        +------------------------------- STOPPED
//!
//!  any state --delete--> (removed)
//! ```
//!
//! Start/stop failures land in `ERROR` with the message recorded on the
//! record; the record itself stays intact and either operation may be
//! retried from there.
//!
//! # Concurrency
//!
//! One process-wide lock serializes every registry read-modify-persist
//! cycle across all environments. Compose invocations block the calling
//! task for the duration of the external process; run log tailing on its
//! own task when lifecycle operations must stay responsive.
//!
//! # Modules
//!
//! - [`compose`]: compose CLI driver, readiness polling, mock driver
//! - [`error`]: error types for lifecycle operations
//! - [`registry`]: environment records and the durable registry document
//! - [`service`]: create/start/stop/delete orchestration

#![deny(missing_docs)]

/// Compose CLI process driver and readiness polling.
pub mod compose;

/// Error types for lifecycle operations.
pub mod error;

/// Environment records and durable registry persistence.
pub mod registry;

/// Environment lifecycle orchestration.
pub mod service;

pub use compose::{ComposeCli, ComposeDriver, MockComposeDriver};
pub use error::Error;
pub use registry::{EnvironmentRecord, EnvironmentStatus};
pub use service::EnvironmentService;
