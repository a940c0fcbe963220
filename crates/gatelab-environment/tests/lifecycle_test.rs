// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! End-to-end lifecycle tests driving the environment service with a mock
//! compose driver.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tempfile::TempDir;

use gatelab_core::paths::Paths;
use gatelab_environment::compose::{ComposeDriver, MockComposeDriver};
use gatelab_environment::service::DriverFactory;
use gatelab_environment::{EnvironmentService, EnvironmentStatus, Error};

fn test_paths() -> (TempDir, Paths) {
    let tmp = TempDir::new().unwrap();
    let paths = Paths::new(tmp.path());
    paths.ensure_runtime_directories().unwrap();
    (tmp, paths)
}

fn factory_for(driver: Arc<MockComposeDriver>) -> DriverFactory {
    Arc::new(move |_compose_file, _env_file| driver.clone() as Arc<dyn ComposeDriver>)
}

fn service_with(paths: Paths, driver: Arc<MockComposeDriver>) -> EnvironmentService {
    EnvironmentService::with_driver_factory(paths, factory_for(driver)).unwrap()
}

fn clean_request() -> Value {
    json!({
        "mode": "clean",
        "admin_user": "admin",
        "admin_pass": "StrongPass123!",
        "gateway_name": "qa-gateway",
        "http_port": 8090,
        "data_mount_type": "volume",
    })
}

#[tokio::test]
async fn test_create_clean_environment() {
    let (_tmp, paths) = test_paths();
    let service = service_with(paths.clone(), Arc::new(MockComposeDriver::new()));

    let record = service.create(&clean_request()).await.unwrap();

    assert_eq!(record.status, EnvironmentStatus::Created);
    assert_eq!(record.gateway_name, "qa-gateway");
    assert_eq!(record.http_port, 8090);
    assert!(record.compose_file.is_file());
    assert!(record.env_file.is_file());

    // The topology declares a volume-type data mount and a projects bind
    // pointing at the canonical projects directory.
    let yaml = std::fs::read_to_string(&record.compose_file).unwrap();
    let compose: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();
    let volumes = &compose["services"]["ignition-dev"]["volumes"];
    let data = volumes
        .as_sequence()
        .unwrap()
        .iter()
        .find(|m| m["target"] == "/data")
        .unwrap();
    assert_eq!(data["type"], "volume");
    let projects = volumes
        .as_sequence()
        .unwrap()
        .iter()
        .find(|m| m["target"] == "/usr/local/bin/ignition/data/projects")
        .unwrap();
    assert_eq!(
        projects["source"].as_str().unwrap(),
        paths.projects_dir.to_str().unwrap()
    );

    // Sanitized snapshot never carries the password.
    assert!(record.config.get("admin_password").is_none());
    assert!(!record.config.to_string().contains("StrongPass123!"));
}

#[tokio::test]
async fn test_create_with_sidecar_defaults() {
    let (_tmp, paths) = test_paths();
    let service = service_with(paths, Arc::new(MockComposeDriver::new()));

    let mut raw = clean_request();
    raw["automation_gateway_enabled"] = json!(true);
    let record = service.create(&raw).await.unwrap();

    let sidecar_config = record
        .compose_file
        .parent()
        .unwrap()
        .join("automation-gateway")
        .join("config.yaml");
    assert!(sidecar_config.is_file());
    let contents = std::fs::read_to_string(&sidecar_config).unwrap();
    assert!(contents.contains("GraphQL"));

    let yaml = std::fs::read_to_string(&record.compose_file).unwrap();
    let compose: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();
    let ports: Vec<&str> = compose["services"]["automation-gateway"]["ports"]
        .as_sequence()
        .unwrap()
        .iter()
        .map(|p| p.as_str().unwrap())
        .collect();
    assert_eq!(ports, vec!["4001:4001", "1883:1883", "1884:1884", "4841:4841"]);

    let snapshot = record.config["automation_gateway"].clone();
    assert_eq!(snapshot["graphql_port"], 4001);
    assert_eq!(snapshot["opcua_port"], 4841);
}

#[tokio::test]
async fn test_create_backup_without_name_leaves_nothing_behind() {
    let (_tmp, paths) = test_paths();
    let service = service_with(paths.clone(), Arc::new(MockComposeDriver::new()));

    let mut raw = clean_request();
    raw["mode"] = json!("backup");
    let err = service.create(&raw).await.unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert!(err.to_string().to_lowercase().contains("backup"));

    assert!(service.list().await.is_empty());
    // Only the registry root itself may exist; no stray artifact dirs.
    let leftovers: Vec<_> = std::fs::read_dir(service.root())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .collect();
    assert!(leftovers.is_empty());
}

#[tokio::test]
async fn test_list_and_get() {
    let (_tmp, paths) = test_paths();
    let service = service_with(paths, Arc::new(MockComposeDriver::new()));

    let first = service.create(&clean_request()).await.unwrap();
    let mut raw = clean_request();
    raw["gateway_name"] = json!("second-gateway");
    raw["http_port"] = json!(8091);
    let second = service.create(&raw).await.unwrap();

    let listed = service.list().await;
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id, first.id);
    assert_eq!(listed[1].id, second.id);

    let fetched = service.get(&second.id).await.unwrap();
    assert_eq!(fetched.gateway_name, "second-gateway");

    assert!(matches!(
        service.get("no-such-id").await,
        Err(Error::EnvironmentNotFound(_))
    ));
}

#[tokio::test]
async fn test_start_success_transitions_to_running() {
    let (_tmp, paths) = test_paths();
    let driver = Arc::new(MockComposeDriver::new());
    let service = service_with(paths, driver.clone());

    let record = service.create(&clean_request()).await.unwrap();
    let started = service
        .start(&record.id, true, Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(started.status, EnvironmentStatus::Running);
    assert!(started.last_started_at.is_some());
    assert!(started.last_error.is_none());
    assert_eq!(driver.calls(), vec!["up -d", "wait"]);
}

#[tokio::test]
async fn test_start_failure_records_error() {
    let (_tmp, paths) = test_paths();
    let service = service_with(paths, Arc::new(MockComposeDriver::failing_up()));

    let record = service.create(&clean_request()).await.unwrap();
    let err = service
        .start(&record.id, false, Duration::from_secs(5))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Compose(_)));

    let after = service.get(&record.id).await.unwrap();
    assert_eq!(after.status, EnvironmentStatus::Error);
    assert!(
        after
            .last_error
            .as_deref()
            .unwrap()
            .contains("mock bring-up failure")
    );
}

#[tokio::test]
async fn test_readiness_timeout_is_a_start_failure() {
    let (_tmp, paths) = test_paths();
    let driver = Arc::new(MockComposeDriver {
        ready: false,
        ..MockComposeDriver::new()
    });
    let service = service_with(paths, driver);

    let record = service.create(&clean_request()).await.unwrap();
    let err = service
        .start(&record.id, true, Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("did not become healthy"));

    let after = service.get(&record.id).await.unwrap();
    assert_eq!(after.status, EnvironmentStatus::Error);
}

#[tokio::test]
async fn test_retry_start_from_error_state() {
    let (_tmp, paths) = test_paths();
    // Swap the shared driver's behavior between attempts.
    let driver = Arc::new(std::sync::Mutex::new(Arc::new(
        MockComposeDriver::failing_up(),
    )));
    let factory_driver = driver.clone();
    let factory: DriverFactory = Arc::new(move |_c, _e| {
        factory_driver.lock().unwrap().clone() as Arc<dyn ComposeDriver>
    });
    let service = EnvironmentService::with_driver_factory(paths, factory).unwrap();

    let record = service.create(&clean_request()).await.unwrap();
    assert!(
        service
            .start(&record.id, false, Duration::from_secs(1))
            .await
            .is_err()
    );
    assert_eq!(
        service.get(&record.id).await.unwrap().status,
        EnvironmentStatus::Error
    );

    *driver.lock().unwrap() = Arc::new(MockComposeDriver::new());
    let retried = service
        .start(&record.id, false, Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(retried.status, EnvironmentStatus::Running);
    assert!(retried.last_error.is_none());
}

#[tokio::test]
async fn test_stop_from_running() {
    let (_tmp, paths) = test_paths();
    let driver = Arc::new(MockComposeDriver::new());
    let service = service_with(paths, driver.clone());

    let record = service.create(&clean_request()).await.unwrap();
    service
        .start(&record.id, false, Duration::from_secs(1))
        .await
        .unwrap();
    let stopped = service.stop(&record.id).await.unwrap();

    assert_eq!(stopped.status, EnvironmentStatus::Stopped);
    assert!(stopped.last_stopped_at.is_some());
    assert!(driver.calls().contains(&"down -v".to_string()));
}

#[tokio::test]
async fn test_stop_failure_records_error() {
    let (_tmp, paths) = test_paths();
    let service = service_with(paths, Arc::new(MockComposeDriver::failing_down()));

    let record = service.create(&clean_request()).await.unwrap();
    assert!(service.stop(&record.id).await.is_err());

    let after = service.get(&record.id).await.unwrap();
    assert_eq!(after.status, EnvironmentStatus::Error);
    assert!(
        after
            .last_error
            .as_deref()
            .unwrap()
            .contains("mock tear-down failure")
    );
}

#[tokio::test]
async fn test_stop_from_created_is_permissive() {
    // Tear-down is idempotent, so stopping a never-started environment
    // just lands it in `stopped` without corrupting anything.
    let (_tmp, paths) = test_paths();
    let service = service_with(paths, Arc::new(MockComposeDriver::new()));

    let record = service.create(&clean_request()).await.unwrap();
    let stopped = service.stop(&record.id).await.unwrap();
    assert_eq!(stopped.status, EnvironmentStatus::Stopped);

    let listed = service.list().await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].status, EnvironmentStatus::Stopped);
}

#[tokio::test]
async fn test_transitions_on_unknown_id_do_not_mutate() {
    let (_tmp, paths) = test_paths();
    let service = service_with(paths, Arc::new(MockComposeDriver::new()));
    let record = service.create(&clean_request()).await.unwrap();

    assert!(matches!(
        service.start("missing", false, Duration::from_secs(1)).await,
        Err(Error::EnvironmentNotFound(_))
    ));
    assert!(matches!(
        service.stop("missing").await,
        Err(Error::EnvironmentNotFound(_))
    ));

    let after = service.get(&record.id).await.unwrap();
    assert_eq!(after.status, EnvironmentStatus::Created);
}

#[tokio::test]
async fn test_delete_removes_record_and_artifacts() {
    let (_tmp, paths) = test_paths();
    let service = service_with(paths, Arc::new(MockComposeDriver::new()));

    let record = service.create(&clean_request()).await.unwrap();
    let env_dir = record.compose_file.parent().unwrap().to_path_buf();
    assert!(env_dir.is_dir());

    service.delete(&record.id).await.unwrap();

    assert!(!env_dir.exists());
    assert!(matches!(
        service.get(&record.id).await,
        Err(Error::EnvironmentNotFound(_))
    ));
    assert!(matches!(
        service.delete(&record.id).await,
        Err(Error::EnvironmentNotFound(_))
    ));
}

#[tokio::test]
async fn test_registry_survives_service_restart() {
    let (_tmp, paths) = test_paths();
    let service = service_with(paths.clone(), Arc::new(MockComposeDriver::new()));
    let record = service.create(&clean_request()).await.unwrap();
    service
        .start(&record.id, false, Duration::from_secs(1))
        .await
        .unwrap();
    drop(service);

    let reopened = service_with(paths, Arc::new(MockComposeDriver::new()));
    let listed = reopened.list().await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, record.id);
    assert_eq!(listed[0].status, EnvironmentStatus::Running);
}
