// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Automation Gateway sidecar configuration.
//!
//! The sidecar is an optional auxiliary service deployed next to the
//! primary gateway, bridging it into GraphQL/MQTT/OPC UA clients. Its
//! config file is rendered from a named template unless the operator
//! points at an explicit source file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::templates::{available_templates, normalize_template_name};

/// Default sidecar image repository.
pub const DEFAULT_IMAGE_REPO: &str = "rocworks/automation-gateway";

/// Default sidecar image tag.
pub const DEFAULT_IMAGE_TAG: &str = "latest";

/// Default host port for the GraphQL server.
pub const DEFAULT_GRAPHQL_PORT: u16 = 4001;

/// Default host port for the plaintext MQTT broker.
pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// Default host port for MQTT over websocket.
pub const DEFAULT_MQTT_WS_PORT: u16 = 1884;

/// Default host port for OPC UA discovery.
pub const DEFAULT_OPCUA_PORT: u16 = 4841;

/// Default sidecar log verbosity.
pub const DEFAULT_LOG_LEVEL: &str = "INFO";

/// Default upstream Ignition endpoint, reachable over the stack network.
pub const DEFAULT_IGNITION_ENDPOINT: &str = "http://ignition-dev:8088";

/// Fixed path the sidecar reads its config from inside the container.
pub const CONFIG_CONTAINER_PATH: &str = "/app/config.yaml";

/// Automation Gateway sidecar settings.
///
/// `config_host_path` is assigned by the artifact renderer; everything
/// else is fixed once the configuration builder returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationGatewayConfig {
    /// Master switch; when false no sidecar service is rendered.
    pub enabled: bool,
    /// Sidecar image repository.
    pub image_repo: String,
    /// Sidecar image tag.
    pub image_tag: String,
    /// Host port for the GraphQL server.
    pub graphql_port: u16,
    /// Host port for the plaintext MQTT broker.
    pub mqtt_port: u16,
    /// Host port for MQTT over websocket.
    pub mqtt_ws_port: u16,
    /// Host port for OPC UA discovery.
    pub opcua_port: u16,
    /// Log verbosity handed to the sidecar.
    pub log_level: String,
    /// Upstream Ignition endpoint the sidecar connects to.
    pub ignition_endpoint: String,
    /// Named config template; ignored when `config_source` is set.
    pub config_template: String,
    /// Explicit config file copied verbatim instead of rendering a template.
    #[serde(default)]
    pub config_source: Option<PathBuf>,
    /// Host path of the rendered config artifact. Renderer-assigned.
    #[serde(default)]
    pub config_host_path: Option<PathBuf>,
    /// In-container config path, mirrored into the topology descriptor.
    pub config_container_path: String,
}

impl Default for AutomationGatewayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            image_repo: DEFAULT_IMAGE_REPO.to_string(),
            image_tag: DEFAULT_IMAGE_TAG.to_string(),
            graphql_port: DEFAULT_GRAPHQL_PORT,
            mqtt_port: DEFAULT_MQTT_PORT,
            mqtt_ws_port: DEFAULT_MQTT_WS_PORT,
            opcua_port: DEFAULT_OPCUA_PORT,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            ignition_endpoint: DEFAULT_IGNITION_ENDPOINT.to_string(),
            config_template: crate::templates::DEFAULT_TEMPLATE.to_string(),
            config_source: None,
            config_host_path: None,
            config_container_path: CONFIG_CONTAINER_PATH.to_string(),
        }
    }
}

impl AutomationGatewayConfig {
    /// Template file name, `<template>.yaml.j2`.
    pub fn template_filename(&self) -> String {
        format!(
            "{}{}",
            self.config_template,
            crate::templates::TEMPLATE_SUFFIX
        )
    }

    /// Sidecar image reference, `repo:tag`.
    pub fn image(&self) -> String {
        format!("{}:{}", self.image_repo, self.image_tag)
    }

    /// Check every sidecar invariant. No-op when disabled.
    ///
    /// An explicit `config_source` bypasses template validation entirely;
    /// otherwise the named template must be discoverable under
    /// `templates_dir` or among the built-ins.
    pub fn validate(&self, templates_dir: &Path) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        for (port, label) in [
            (self.graphql_port, "GraphQL"),
            (self.mqtt_port, "MQTT"),
            (self.mqtt_ws_port, "MQTT websocket"),
            (self.opcua_port, "OPC UA"),
        ] {
            if port == 0 {
                return Err(ConfigError::Invalid(format!(
                    "Automation Gateway {label} port is out of valid range (1-65535)"
                )));
            }
        }

        let name = normalize_template_name(&self.config_template)?;

        if let Some(source) = &self.config_source {
            if !source.is_file() {
                return Err(ConfigError::NotFound {
                    what: "Automation Gateway config source",
                    path: source.clone(),
                });
            }
            return Ok(());
        }

        let available = available_templates(templates_dir);
        if !available.contains(&name) {
            let choices: Vec<&str> = available.iter().map(String::as_str).collect();
            return Err(ConfigError::Invalid(format!(
                "Unsupported Automation Gateway config template '{name}'. \
                 Available templates: {}.",
                choices.join(", ")
            )));
        }
        Ok(())
    }

    /// Context handed to the config template renderer.
    pub fn template_context(&self, gateway_name: &str) -> serde_json::Value {
        serde_json::json!({
            "gateway_name": gateway_name,
            "ignition_endpoint": self.ignition_endpoint,
            "graphql_port": self.graphql_port,
            "mqtt_port": self.mqtt_port,
            "mqtt_ws_port": self.mqtt_ws_port,
            "opcua_port": self.opcua_port,
            "log_level": self.log_level,
        })
    }
}
