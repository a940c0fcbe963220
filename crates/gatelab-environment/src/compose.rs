// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Compose CLI process driver.
//!
//! Wraps the external `docker compose` command bound to one topology
//! descriptor: bring-up (detached or streaming), tear-down, log tailing,
//! and HTTP readiness polling. Pure execution logic, no registry access.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, error, info, warn};

/// Health endpoint polled to decide whether the gateway is serving traffic.
pub const HEALTH_ENDPOINT: &str = "/StatusPing";

/// Interval between readiness probes.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Errors from compose CLI operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ComposeCliError {
    /// The compose command could not be launched.
    #[error("Failed to launch 'docker compose {verb}': {source}")]
    Launch {
        /// Compose verb that was being run.
        verb: &'static str,
        /// Underlying spawn failure.
        #[source]
        source: std::io::Error,
    },

    /// The compose command exited with a non-zero code.
    #[error("'docker compose {verb}' failed (exit code {exit_code}): {stderr}")]
    ExitCode {
        /// Compose verb that was being run.
        verb: &'static str,
        /// Exit code from the process.
        exit_code: i32,
        /// Captured standard error output.
        stderr: String,
    },

    /// The gateway did not become healthy within the allotted timeout.
    #[error("Gateway did not become healthy within {0:?}")]
    NotReady(Duration),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for compose driver operations.
pub type Result<T> = std::result::Result<T, ComposeCliError>;

/// Cancellation token for log streaming, checked once per emitted line.
pub type CancelToken = Arc<AtomicBool>;

/// Line sink for streaming operations.
pub type LineSink<'a> = &'a mut (dyn FnMut(&str) + Send);

/// Abstract compose driver.
///
/// The lifecycle manager drives environments through this seam; the real
/// implementation shells out to `docker compose`, and [`MockComposeDriver`]
/// stands in for tests. Drivers are pure execution engines - registry
/// updates are handled by the caller.
#[async_trait]
pub trait ComposeDriver: Send + Sync {
    /// Bring the stack up detached (`up -d`).
    async fn up_detached(&self) -> Result<()>;

    /// Bring the stack up in the foreground, forwarding every output line.
    ///
    /// Blocks until the process exits; a non-zero exit code is an error.
    async fn up_streaming(&self, on_line: LineSink<'_>) -> Result<()>;

    /// Tear the stack down, releasing its volumes (`down -v`). Idempotent.
    async fn down(&self) -> Result<()>;

    /// Tail service logs, forwarding every line until cancelled.
    ///
    /// The token is checked once per emitted line; on cancellation the
    /// underlying process is terminated and the call returns normally.
    async fn stream_logs(&self, on_line: LineSink<'_>, cancel: CancelToken) -> Result<()>;

    /// Poll the gateway health endpoint until it responds or `timeout`
    /// elapses. A timeout is not an error - the caller decides.
    async fn wait_for_gateway(&self, port: u16, timeout: Duration) -> bool;
}

/// Driver backed by the `docker compose` CLI.
pub struct ComposeCli {
    compose_file: PathBuf,
    env_file: Option<PathBuf>,
    service: String,
    working_dir: PathBuf,
}

impl ComposeCli {
    /// Bind a driver to a topology descriptor and optional env file.
    ///
    /// The working directory defaults to the descriptor's parent so
    /// relative mount paths resolve the same way they rendered.
    pub fn new(compose_file: impl Into<PathBuf>, env_file: Option<PathBuf>) -> Self {
        let compose_file = compose_file.into();
        let working_dir = compose_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            compose_file,
            env_file,
            service: gatelab_compose::topology::GATEWAY_SERVICE.to_string(),
            working_dir,
        }
    }

    /// Override the service whose logs are tailed.
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    fn base_command(&self) -> Command {
        let mut cmd = Command::new("docker");
        cmd.arg("compose").arg("-f").arg(&self.compose_file);
        if let Some(env_file) = &self.env_file {
            cmd.arg("--env-file").arg(env_file);
        }
        cmd.current_dir(&self.working_dir);
        cmd
    }

    async fn run_to_completion(&self, mut cmd: Command, verb: &'static str) -> Result<()> {
        debug!(verb, compose_file = %self.compose_file.display(), "Running compose command");
        let output = cmd
            .output()
            .await
            .map_err(|source| ComposeCliError::Launch { verb, source })?;

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !output.status.success() {
            let exit_code = output.status.code().unwrap_or(-1);
            error!(verb, exit_code, stderr = %stderr, "Compose command failed");
            return Err(ComposeCliError::ExitCode {
                verb,
                exit_code,
                stderr,
            });
        }
        debug!(verb, stderr = %stderr, "Compose command succeeded");
        Ok(())
    }
}

#[async_trait]
impl ComposeDriver for ComposeCli {
    async fn up_detached(&self) -> Result<()> {
        let mut cmd = self.base_command();
        cmd.arg("up").arg("-d");
        info!(compose_file = %self.compose_file.display(), "Starting stack (detached)");
        self.run_to_completion(cmd, "up").await
    }

    async fn up_streaming(&self, on_line: LineSink<'_>) -> Result<()> {
        let mut cmd = self.base_command();
        cmd.arg("up");
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());

        info!(compose_file = %self.compose_file.display(), "Starting stack (streaming)");
        let mut child = cmd
            .spawn()
            .map_err(|source| ComposeCliError::Launch { verb: "up", source })?;

        // Drain stderr concurrently so a chatty process cannot block on a
        // full pipe while we read stdout.
        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = String::new();
                let _ = stderr.read_to_string(&mut buf).await;
                buf
            })
        });

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines.next_line().await? {
                on_line(&line);
            }
        }

        let status = child.wait().await?;
        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };
        if !status.success() {
            return Err(ComposeCliError::ExitCode {
                verb: "up",
                exit_code: status.code().unwrap_or(-1),
                stderr: stderr.trim().to_string(),
            });
        }
        Ok(())
    }

    async fn down(&self) -> Result<()> {
        let mut cmd = self.base_command();
        cmd.arg("down").arg("-v");
        info!(compose_file = %self.compose_file.display(), "Tearing down stack");
        self.run_to_completion(cmd, "down").await
    }

    async fn stream_logs(&self, on_line: LineSink<'_>, cancel: CancelToken) -> Result<()> {
        let mut cmd = self.base_command();
        cmd.arg("logs").arg("-f").arg(&self.service);
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::null());

        info!(service = %self.service, "Streaming logs");
        let mut child = cmd.spawn().map_err(|source| ComposeCliError::Launch {
            verb: "logs",
            source,
        })?;

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines.next_line().await? {
                on_line(&line);
                if cancel.load(Ordering::Relaxed) {
                    info!("Log streaming cancelled, terminating process");
                    child.start_kill()?;
                    break;
                }
            }
        }

        let status = child.wait().await?;
        debug!(code = ?status.code(), "Log streaming process ended");
        Ok(())
    }

    async fn wait_for_gateway(&self, port: u16, timeout: Duration) -> bool {
        let Ok(client) = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
        else {
            return false;
        };
        let url = format!("http://localhost:{port}{HEALTH_ENDPOINT}");
        let start = std::time::Instant::now();

        loop {
            match client.get(&url).send().await {
                Ok(response) if response.status().is_success() => {
                    info!(%url, "Gateway is healthy");
                    return true;
                }
                Ok(response) => {
                    debug!(%url, status = %response.status(), "Gateway not ready yet");
                }
                Err(err) => {
                    // Connection refused just means the stack is still coming up.
                    debug!(%url, error = %err, "Gateway not reachable yet");
                }
            }
            if start.elapsed() >= timeout {
                warn!(%url, ?timeout, "Gateway did not become healthy in time");
                return false;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

/// Mock compose driver for testing.
///
/// Records every invocation and simulates success, failure and readiness
/// without touching a container runtime.
#[derive(Debug, Clone)]
pub struct MockComposeDriver {
    /// Fail `up_detached` / `up_streaming` with an exit-code error.
    pub fail_up: bool,
    /// Fail `down` with an exit-code error.
    pub fail_down: bool,
    /// Value returned by `wait_for_gateway`.
    pub ready: bool,
    /// Lines emitted by the streaming operations.
    pub log_lines: Vec<String>,
    /// Every compose verb invoked so far, in order.
    pub calls: Arc<std::sync::Mutex<Vec<String>>>,
}

impl Default for MockComposeDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MockComposeDriver {
    /// A driver where everything succeeds.
    pub fn new() -> Self {
        Self {
            fail_up: false,
            fail_down: false,
            ready: true,
            log_lines: Vec::new(),
            calls: Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    /// A driver whose bring-up fails.
    pub fn failing_up() -> Self {
        Self {
            fail_up: true,
            ..Self::new()
        }
    }

    /// A driver whose tear-down fails.
    pub fn failing_down() -> Self {
        Self {
            fail_down: true,
            ..Self::new()
        }
    }

    /// Every compose verb invoked so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn record(&self, call: &str) {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call.to_string());
    }
}

#[async_trait]
impl ComposeDriver for MockComposeDriver {
    async fn up_detached(&self) -> Result<()> {
        self.record("up -d");
        if self.fail_up {
            return Err(ComposeCliError::ExitCode {
                verb: "up",
                exit_code: 1,
                stderr: "mock bring-up failure".to_string(),
            });
        }
        Ok(())
    }

    async fn up_streaming(&self, on_line: LineSink<'_>) -> Result<()> {
        self.record("up");
        for line in &self.log_lines {
            on_line(line);
        }
        if self.fail_up {
            return Err(ComposeCliError::ExitCode {
                verb: "up",
                exit_code: 1,
                stderr: "mock bring-up failure".to_string(),
            });
        }
        Ok(())
    }

    async fn down(&self) -> Result<()> {
        self.record("down -v");
        if self.fail_down {
            return Err(ComposeCliError::ExitCode {
                verb: "down",
                exit_code: 1,
                stderr: "mock tear-down failure".to_string(),
            });
        }
        Ok(())
    }

    async fn stream_logs(&self, on_line: LineSink<'_>, cancel: CancelToken) -> Result<()> {
        self.record("logs -f");
        for line in &self.log_lines {
            on_line(line);
            if cancel.load(Ordering::Relaxed) {
                break;
            }
        }
        Ok(())
    }

    async fn wait_for_gateway(&self, _port: u16, _timeout: Duration) -> bool {
        self.record("wait");
        self.ready
    }
}
