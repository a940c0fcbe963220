// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Environment lifecycle management.
//!
//! Coordinates configuration building, artifact rendering, compose
//! bring-up/tear-down and registry persistence. One coarse lock guards
//! every registry read-modify-persist cycle: simple and safe for one
//! operator acting on a handful of environments, a known limit for
//! high-fan-out concurrent provisioning.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use gatelab_compose::render::{
    render_automation_gateway_config, render_compose, render_env,
};
use gatelab_core::paths::Paths;
use gatelab_core::{GatewayConfig, build_config};

use crate::compose::{ComposeCli, ComposeCliError, ComposeDriver};
use crate::error::{Error, Result};
use crate::registry::{EnvironmentRecord, EnvironmentStatus, RegistryStore};

/// Builds the driver bound to one environment's artifacts.
pub type DriverFactory =
    Arc<dyn Fn(PathBuf, Option<PathBuf>) -> Arc<dyn ComposeDriver> + Send + Sync>;

/// Default readiness timeout for [`EnvironmentService::start`].
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(60);

/// Fields applied by one state transition.
#[derive(Default)]
struct Transition {
    status: Option<EnvironmentStatus>,
    last_started_at: Option<DateTime<Utc>>,
    last_stopped_at: Option<DateTime<Utc>>,
    /// `Some(None)` clears the error, `Some(Some(_))` records one.
    last_error: Option<Option<String>>,
}

/// Coordinates artifact rendering and persistence of environment metadata.
pub struct EnvironmentService {
    paths: Paths,
    root: PathBuf,
    store: RegistryStore,
    lock: Mutex<()>,
    driver_factory: DriverFactory,
}

impl EnvironmentService {
    /// Create a service rooted under `generated/environments/`.
    pub fn new(paths: Paths) -> Result<Self> {
        Self::with_driver_factory(
            paths,
            Arc::new(|compose_file, env_file| {
                Arc::new(ComposeCli::new(compose_file, env_file)) as Arc<dyn ComposeDriver>
            }),
        )
    }

    /// Create a service with an injected driver factory (tests).
    pub fn with_driver_factory(paths: Paths, driver_factory: DriverFactory) -> Result<Self> {
        let root = paths.generated_dir.join("environments");
        std::fs::create_dir_all(&root)?;
        let store = RegistryStore::new(root.join("registry.json"));
        tracing::debug!(root = %root.display(), "Environment service initialised");
        Ok(Self {
            paths,
            root,
            store,
            lock: Mutex::new(()),
            driver_factory,
        })
    }

    /// Root directory owning every environment's artifact directory.
    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    /// Return all known environments.
    pub async fn list(&self) -> Vec<EnvironmentRecord> {
        let _guard = self.lock.lock().await;
        self.store.load().await
    }

    /// Fetch a single environment by identifier.
    pub async fn get(&self, env_id: &str) -> Result<EnvironmentRecord> {
        let _guard = self.lock.lock().await;
        self.store
            .load()
            .await
            .into_iter()
            .find(|record| record.id == env_id)
            .ok_or_else(|| Error::EnvironmentNotFound(env_id.to_string()))
    }

    /// Render artifacts for the request and persist a new record.
    ///
    /// The record enters the registry only after all three artifacts
    /// rendered; a rendering failure removes the half-built directory and
    /// leaves the registry untouched.
    pub async fn create(&self, raw: &Value) -> Result<EnvironmentRecord> {
        let mut cfg = build_config(raw, &self.paths)?;

        let display_name = raw
            .get("display_name")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| cfg.gateway_name.clone());

        let env_id = Uuid::new_v4().simple().to_string();
        let env_dir = self.root.join(&env_id);

        let _guard = self.lock.lock().await;

        std::fs::create_dir_all(&env_dir)?;
        let rendered = self.render_artifacts(&mut cfg, &env_dir);
        let (compose_path, env_path) = match rendered {
            Ok(paths) => paths,
            Err(err) => {
                // Never leave a partial artifact set behind.
                if let Err(cleanup_err) = std::fs::remove_dir_all(&env_dir) {
                    warn!(
                        env_dir = %env_dir.display(),
                        error = %cleanup_err,
                        "Failed to clean up after rendering failure"
                    );
                }
                return Err(err);
            }
        };

        let record = EnvironmentRecord {
            id: env_id.clone(),
            display_name,
            gateway_name: cfg.gateway_name.clone(),
            mode: cfg.mode,
            created_at: Utc::now(),
            compose_file: compose_path.clone(),
            env_file: env_path,
            http_port: cfg.http_port,
            https_port: cfg.https_port,
            image_repo: cfg.image_repo.clone(),
            image_tag: cfg.image_tag.clone(),
            data_mount_type: cfg.data_mount.mount_type,
            data_mount_source: cfg.data_mount.source.clone(),
            config: cfg.sanitized_snapshot(),
            status: EnvironmentStatus::Created,
            last_started_at: None,
            last_stopped_at: None,
            last_error: None,
        };

        let mut records = self.store.load().await;
        records.push(record.clone());
        self.store.save(&records).await?;

        info!(env_id = %env_id, compose = %compose_path.display(), "Provisioned environment");
        Ok(record)
    }

    fn render_artifacts(
        &self,
        cfg: &mut GatewayConfig,
        env_dir: &std::path::Path,
    ) -> Result<(PathBuf, PathBuf)> {
        let compose_path = render_compose(cfg, &self.paths, env_dir)?;
        let env_path = render_env(cfg, env_dir)?;
        render_automation_gateway_config(cfg, &self.paths, env_dir)?;
        Ok((compose_path, env_path))
    }

    /// Remove an environment and its generated artifacts.
    ///
    /// The registry entry goes first; the artifact directory is then
    /// removed best-effort, and only when it is confirmed to live inside
    /// the service root.
    pub async fn delete(&self, env_id: &str) -> Result<()> {
        let target = {
            let _guard = self.lock.lock().await;
            let records = self.store.load().await;
            let mut remaining = Vec::with_capacity(records.len());
            let mut target = None;
            for record in records {
                if record.id == env_id {
                    target = Some(record);
                } else {
                    remaining.push(record);
                }
            }
            let Some(target) = target else {
                return Err(Error::EnvironmentNotFound(env_id.to_string()));
            };
            self.store.save(&remaining).await?;
            target
        };

        let env_dir = target
            .compose_file
            .parent()
            .map(PathBuf::from)
            .unwrap_or_default();
        if !env_dir.starts_with(&self.root) {
            warn!(
                env_dir = %env_dir.display(),
                "Refusing to delete environment directory outside the root"
            );
            return Ok(());
        }
        if let Err(err) = std::fs::remove_dir_all(&env_dir) {
            warn!(env_dir = %env_dir.display(), error = %err, "Failed to remove artifacts");
        }
        info!(env_id = %env_id, env_dir = %env_dir.display(), "Deleted environment");
        Ok(())
    }

    /// Start an environment and update its status.
    ///
    /// With `wait_for_ready`, readiness polling failure is a start
    /// failure: the record moves to `error` and the error is returned.
    pub async fn start(
        &self,
        env_id: &str,
        wait_for_ready: bool,
        wait_timeout: Duration,
    ) -> Result<EnvironmentRecord> {
        let record = self
            .transition(
                env_id,
                Transition {
                    status: Some(EnvironmentStatus::Starting),
                    last_error: Some(None),
                    ..Transition::default()
                },
            )
            .await?;

        let driver =
            (self.driver_factory)(record.compose_file.clone(), Some(record.env_file.clone()));
        info!(env_id = %env_id, "Starting environment");

        let outcome = async {
            driver.up_detached().await?;
            if wait_for_ready && !driver.wait_for_gateway(record.http_port, wait_timeout).await {
                return Err(ComposeCliError::NotReady(wait_timeout));
            }
            Ok(())
        }
        .await;

        if let Err(err) = outcome {
            error!(env_id = %env_id, error = %err, "Failed to start environment");
            self.transition(
                env_id,
                Transition {
                    status: Some(EnvironmentStatus::Error),
                    last_error: Some(Some(err.to_string())),
                    ..Transition::default()
                },
            )
            .await?;
            return Err(err.into());
        }

        self.transition(
            env_id,
            Transition {
                status: Some(EnvironmentStatus::Running),
                last_started_at: Some(Utc::now()),
                last_error: Some(None),
                ..Transition::default()
            },
        )
        .await
    }

    /// Stop an environment and update its status.
    pub async fn stop(&self, env_id: &str) -> Result<EnvironmentRecord> {
        let record = self
            .transition(
                env_id,
                Transition {
                    status: Some(EnvironmentStatus::Stopping),
                    ..Transition::default()
                },
            )
            .await?;

        let driver =
            (self.driver_factory)(record.compose_file.clone(), Some(record.env_file.clone()));
        info!(env_id = %env_id, "Stopping environment");

        if let Err(err) = driver.down().await {
            error!(env_id = %env_id, error = %err, "Failed to stop environment");
            self.transition(
                env_id,
                Transition {
                    status: Some(EnvironmentStatus::Error),
                    last_error: Some(Some(err.to_string())),
                    ..Transition::default()
                },
            )
            .await?;
            return Err(err.into());
        }

        self.transition(
            env_id,
            Transition {
                status: Some(EnvironmentStatus::Stopped),
                last_stopped_at: Some(Utc::now()),
                last_error: Some(None),
                ..Transition::default()
            },
        )
        .await
    }

    /// Apply one transition under the registry lock.
    ///
    /// A full read-modify-persist cycle; an unknown id fails without
    /// mutating anything.
    async fn transition(&self, env_id: &str, update: Transition) -> Result<EnvironmentRecord> {
        let _guard = self.lock.lock().await;
        let mut records = self.store.load().await;
        let Some(record) = records.iter_mut().find(|record| record.id == env_id) else {
            return Err(Error::EnvironmentNotFound(env_id.to_string()));
        };

        if let Some(status) = update.status {
            record.status = status;
        }
        if let Some(ts) = update.last_started_at {
            record.last_started_at = Some(ts);
        }
        if let Some(ts) = update.last_stopped_at {
            record.last_stopped_at = Some(ts);
        }
        if let Some(last_error) = update.last_error {
            record.last_error = last_error;
        }
        let updated = record.clone();

        self.store.save(&records).await?;
        Ok(updated)
    }
}
