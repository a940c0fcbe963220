// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Renders the deployment artifacts for one environment.
//!
//! Three independent operations share one validated configuration: the
//! topology descriptor (`docker-compose.yml`), the environment file
//! (`stack.env`), and the optional Automation Gateway config. Rendering is
//! deterministic - the same configuration and output directory always
//! reproduce byte-identical artifacts.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use gatelab_core::GatewayConfig;
use gatelab_core::config::Mode;
use gatelab_core::paths::Paths;
use gatelab_core::templates::{load_template, render_template};

use crate::error::Result;
use crate::mounts::{
    ACTIVATION_TOKEN_TARGET, LICENSE_KEY_TARGET, RESTORE_TARGET, plan_gateway_mounts,
};
use crate::topology::{
    ComposeFile, GATEWAY_SERVICE, MountSpec, SIDECAR_SERVICE, ServiceSpec, VolumeSpec,
};

/// File name of the rendered topology descriptor.
pub const COMPOSE_FILE_NAME: &str = "docker-compose.yml";

/// File name of the rendered environment file.
pub const ENV_FILE_NAME: &str = "stack.env";

/// Host path of the sidecar config artifact under an output directory.
///
/// Deterministic so the topology descriptor and the config renderer agree
/// without talking to each other.
pub fn sidecar_config_host_path(output_dir: &Path) -> PathBuf {
    output_dir.join(SIDECAR_SERVICE).join("config.yaml")
}

/// Render the topology descriptor into `output_dir`.
///
/// Assigns the sidecar's resolved host config path when the sidecar is
/// enabled; that is the only field rendering writes back.
pub fn render_compose(
    cfg: &mut GatewayConfig,
    paths: &Paths,
    output_dir: &Path,
) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir)?;

    let plan = plan_gateway_mounts(cfg, paths)?;

    let mut compose = ComposeFile::default();
    compose.services.insert(
        GATEWAY_SERVICE.to_string(),
        ServiceSpec {
            image: cfg.image(),
            ports: vec![
                format!("{}:8088", cfg.http_port),
                format!("{}:8043", cfg.https_port),
            ],
            environment: gateway_environment(cfg),
            volumes: plan.mounts,
            command: match cfg.mode {
                Mode::Backup => Some(vec!["-r".to_string(), RESTORE_TARGET.to_string()]),
                Mode::Clean => None,
            },
            depends_on: Vec::new(),
            restart: Some("unless-stopped".to_string()),
        },
    );
    for name in plan.volume_names {
        compose.volumes.insert(name, VolumeSpec::default());
    }

    if let Some(sidecar) = cfg.automation_gateway.as_mut().filter(|ag| ag.enabled) {
        let host_path = sidecar_config_host_path(output_dir);
        sidecar.config_host_path = Some(host_path.clone());

        let mut environment = BTreeMap::new();
        environment.insert(
            "GATEWAY_CONFIG".to_string(),
            sidecar.config_container_path.clone(),
        );
        environment.insert("LOG_LEVEL".to_string(), sidecar.log_level.clone());

        compose.services.insert(
            SIDECAR_SERVICE.to_string(),
            ServiceSpec {
                image: sidecar.image(),
                ports: vec![
                    format!("{0}:{0}", sidecar.graphql_port),
                    format!("{0}:{0}", sidecar.mqtt_port),
                    format!("{0}:{0}", sidecar.mqtt_ws_port),
                    format!("{0}:{0}", sidecar.opcua_port),
                ],
                environment,
                volumes: vec![
                    MountSpec::bind(
                        host_path.display().to_string(),
                        sidecar.config_container_path.clone(),
                    )
                    .read_only(),
                ],
                command: None,
                depends_on: vec![GATEWAY_SERVICE.to_string()],
                restart: Some("unless-stopped".to_string()),
            },
        );
    }

    let compose_path = output_dir.join(COMPOSE_FILE_NAME);
    std::fs::write(&compose_path, compose.to_yaml()?)?;
    tracing::info!(path = %compose_path.display(), "Rendered topology descriptor");
    Ok(compose_path)
}

/// Environment block of the primary gateway service.
///
/// Secret-bearing values stay out of the descriptor; they are referenced
/// as `${VAR}` substitutions resolved from the environment file.
fn gateway_environment(cfg: &GatewayConfig) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    env.insert("ACCEPT_IGNITION_EULA".into(), "Y".into());
    env.insert(
        "GATEWAY_ADMIN_USERNAME".into(),
        "${GATEWAY_ADMIN_USERNAME}".into(),
    );
    env.insert(
        "GATEWAY_ADMIN_PASSWORD".into(),
        "${GATEWAY_ADMIN_PASSWORD}".into(),
    );
    env.insert("GATEWAY_SYSTEM_NAME".into(), cfg.gateway_name.clone());
    env.insert("IGNITION_EDITION".into(), cfg.edition.clone());
    env.insert("TZ".into(), cfg.timezone.clone());

    if let Some(modules) = &cfg.gateway_modules_enabled {
        env.insert("GATEWAY_MODULES_ENABLED".into(), modules.clone());
    }
    if cfg.gateway_module_relink {
        env.insert("GATEWAY_MODULE_RELINK".into(), "true".into());
    }
    if cfg.gateway_jdbc_relink {
        env.insert("GATEWAY_JDBC_RELINK".into(), "true".into());
    }
    if let Some(uid) = cfg.ignition_uid {
        env.insert("IGNITION_UID".into(), uid.to_string());
    }
    if let Some(gid) = cfg.ignition_gid {
        env.insert("IGNITION_GID".into(), gid.to_string());
    }
    if let Some(ip) = &cfg.device_ip {
        env.insert("DEVICE_IP".into(), ip.clone());
    }
    if let Some(port) = cfg.device_port {
        env.insert("DEVICE_PORT".into(), port.to_string());
    }
    if let Some(com) = &cfg.com_port {
        env.insert("COM_PORT".into(), com.clone());
    }
    if let Some(baud) = cfg.baud_rate {
        env.insert("BAUD_RATE".into(), baud.to_string());
    }
    if cfg.activation_token_file.is_some() {
        env.insert(
            "IGNITION_ACTIVATION_TOKEN_FILE".into(),
            ACTIVATION_TOKEN_TARGET.into(),
        );
    }
    if cfg.license_key_file.is_some() {
        env.insert(
            "IGNITION_LICENSE_KEY_FILE".into(),
            LICENSE_KEY_TARGET.into(),
        );
    }
    env
}

/// Render the environment file into `output_dir`.
///
/// Holds the values the descriptor references via `${VAR}` substitution,
/// including resolved in-container secret paths when secrets are present.
pub fn render_env(cfg: &GatewayConfig, output_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir)?;

    let mut lines = vec![
        format!("GATEWAY_ADMIN_USERNAME={}", cfg.admin_user),
        format!("GATEWAY_ADMIN_PASSWORD={}", cfg.admin_password),
    ];
    if cfg.activation_token_file.is_some() {
        lines.push(format!(
            "IGNITION_ACTIVATION_TOKEN_FILE={ACTIVATION_TOKEN_TARGET}"
        ));
    }
    if cfg.license_key_file.is_some() {
        lines.push(format!("IGNITION_LICENSE_KEY_FILE={LICENSE_KEY_TARGET}"));
    }

    let env_path = output_dir.join(ENV_FILE_NAME);
    std::fs::write(&env_path, lines.join("\n") + "\n")?;
    tracing::info!(path = %env_path.display(), "Rendered environment file");
    Ok(env_path)
}

/// Render the Automation Gateway config artifact into `output_dir`.
///
/// No-op when the sidecar is disabled. An explicit config source is copied
/// byte-for-byte; otherwise the named template is rendered with the
/// sidecar's runtime fields and the gateway identity. Idempotent.
pub fn render_automation_gateway_config(
    cfg: &mut GatewayConfig,
    paths: &Paths,
    output_dir: &Path,
) -> Result<Option<PathBuf>> {
    let gateway_name = cfg.gateway_name.clone();
    let Some(sidecar) = cfg.automation_gateway.as_mut().filter(|ag| ag.enabled) else {
        return Ok(None);
    };

    let host_path = sidecar_config_host_path(output_dir);
    if let Some(parent) = host_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if let Some(source) = &sidecar.config_source {
        std::fs::copy(source, &host_path)?;
        tracing::info!(
            source = %source.display(),
            path = %host_path.display(),
            "Copied Automation Gateway config"
        );
    } else {
        let source = load_template(
            &paths.automation_gateway_templates_dir,
            &sidecar.config_template,
        )?;
        let rendered = render_template(&source, &sidecar.template_context(&gateway_name))?;
        std::fs::write(&host_path, rendered)?;
        tracing::info!(
            template = %sidecar.config_template,
            path = %host_path.display(),
            "Rendered Automation Gateway config"
        );
    }

    sidecar.config_host_path = Some(host_path.clone());
    Ok(Some(host_path))
}
