mod common;

use common::{harness, new_version};
use orbit_services::{service_endpoints, ServiceError};
use orbit_shared::{
    BuildCompletion, CreateVersion, DeployRequest, EndpointFilter, EndpointStatus, VersionStatus,
};
use sea_orm::{EntityTrait, PaginatorTrait};
use std::collections::HashMap;

#[tokio::test]
async fn test_duplicate_version_is_rejected() {
    let h = harness().await;
    let app = h.application("demo").await;
    let versions = &h.orchestrator.versions;

    versions.create_version(app.id, new_version("v1")).await.unwrap();
    let err = versions
        .create_version(app.id, new_version("v1"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::UniqueConstraintViolation(_)));

    // same label under another application is fine
    let other = h.application("other").await;
    versions.create_version(other.id, new_version("v1")).await.unwrap();
}

#[tokio::test]
async fn test_create_version_validation() {
    let h = harness().await;
    let app = h.application("demo").await;
    let versions = &h.orchestrator.versions;

    let err = versions
        .create_version(app.id, new_version("   "))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));

    let err = versions
        .create_version(
            app.id,
            CreateVersion {
                config: Some(serde_json::json!(["not", "an", "object"])),
                ..new_version("v1")
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));

    let err = versions
        .create_version(uuid::Uuid::new_v4(), new_version("v1"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound { .. }));
}

#[tokio::test]
async fn test_build_and_deploy_v1() {
    let h = harness().await;
    let app = h.application("demo").await;
    let versions = &h.orchestrator.versions;

    let v1 = versions.create_version(app.id, new_version("v1")).await.unwrap();
    assert_eq!(v1.status, VersionStatus::Building);

    let building = versions.build(v1.id).await.unwrap();
    assert_eq!(building.status, VersionStatus::Building);
    assert!(building.build_log.contains("build requested"));
    assert!(building.build_log.contains("accepted demo:v1"));

    let jobs = h.builder.jobs.lock().unwrap().clone();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].version_id, v1.id);
    assert_eq!(
        jobs[0].callback_path,
        format!("/api/versions/{}/build/complete", v1.id)
    );

    let ready = versions
        .complete_build(
            v1.id,
            BuildCompletion {
                success: true,
                log: "step 1/3\nstep 3/3 done".to_string(),
                image_url: Some("registry.local/demo:v1".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(ready.status, VersionStatus::Ready);
    assert_eq!(ready.image_url.as_deref(), Some("registry.local/demo:v1"));

    let logs = versions.logs(v1.id).await.unwrap();
    assert_eq!(logs.status, VersionStatus::Ready);
    assert!(logs.logs.contains("build requested"));
    assert!(logs.logs.contains("step 3/3 done"));

    assert_eq!(h.orchestrator.applications.find(app.id).await.unwrap().deployment_count, 0);

    let endpoint = versions
        .deploy(
            v1.id,
            DeployRequest {
                replicas: 2,
                env_vars: HashMap::from([("RUST_LOG".to_string(), "info".to_string())]),
            },
        )
        .await
        .unwrap();
    assert_eq!(endpoint.version_id, v1.id);
    assert_eq!(endpoint.replicas, 2);
    assert_eq!(endpoint.status, EndpointStatus::Starting);
    assert_eq!(endpoint.name, "demo-v1");
    assert_eq!(endpoint.env_vars["RUST_LOG"], "info");
    assert_eq!(h.backend.calls("start"), 1);

    assert_eq!(versions.find(v1.id).await.unwrap().status, VersionStatus::Deploying);
    assert_eq!(h.orchestrator.applications.find(app.id).await.unwrap().deployment_count, 1);
}

#[tokio::test]
async fn test_deploy_requires_ready_version() {
    let h = harness().await;
    let app = h.application("demo").await;
    let versions = &h.orchestrator.versions;
    let v1 = versions.create_version(app.id, new_version("v1")).await.unwrap();

    let err = versions.deploy(v1.id, DeployRequest::default()).await.unwrap_err();
    assert!(matches!(err, ServiceError::PreconditionFailed(_)));

    assert_eq!(versions.find(v1.id).await.unwrap().status, VersionStatus::Building);
    assert_eq!(service_endpoints::Entity::find().count(&h.db).await.unwrap(), 0);
    assert_eq!(h.orchestrator.applications.find(app.id).await.unwrap().deployment_count, 0);
    assert_eq!(h.backend.calls("start"), 0);
}

#[tokio::test]
async fn test_deploy_rejects_replicas_out_of_range() {
    let h = harness().await;
    let app = h.application("demo").await;
    let v1 = h.ready_version(app.id, "v1").await;

    for replicas in [0, 11] {
        let err = h
            .orchestrator
            .versions
            .deploy(
                v1.id,
                DeployRequest {
                    replicas,
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)), "replicas {}", replicas);
    }

    let err = h
        .orchestrator
        .versions
        .deploy(
            v1.id,
            DeployRequest {
                replicas: 1,
                env_vars: HashMap::from([(" ".to_string(), "x".to_string())]),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));

    assert_eq!(h.orchestrator.versions.find(v1.id).await.unwrap().status, VersionStatus::Ready);
    assert_eq!(service_endpoints::Entity::find().count(&h.db).await.unwrap(), 0);
}

#[tokio::test]
async fn test_build_is_rejected_while_deploying() {
    let h = harness().await;
    let endpoint = h.deployed("demo").await;
    let version_id = endpoint.version_id;

    let err = h.orchestrator.versions.build(version_id).await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidTransition { .. }));
    assert_eq!(
        h.orchestrator.versions.find(version_id).await.unwrap().status,
        VersionStatus::Deploying
    );
    assert_eq!(h.builder.submitted(), 0);
}

#[tokio::test]
async fn test_failed_submission_marks_build_failed_and_allows_rebuild() {
    let h = harness().await;
    let app = h.application("demo").await;
    let versions = &h.orchestrator.versions;
    let v1 = versions.create_version(app.id, new_version("v1")).await.unwrap();

    h.builder.set_failing(true);
    let err = versions.build(v1.id).await.unwrap_err();
    assert!(matches!(err, ServiceError::Backend(_)));

    let failed = versions.find(v1.id).await.unwrap();
    assert_eq!(failed.status, VersionStatus::BuildFailed);
    assert!(failed.build_log.contains("builder offline"));

    h.builder.set_failing(false);
    let rebuilt = versions.build(v1.id).await.unwrap();
    assert_eq!(rebuilt.status, VersionStatus::Building);
    assert_eq!(h.builder.submitted(), 1);
}

#[tokio::test]
async fn test_complete_build_requires_building() {
    let h = harness().await;
    let app = h.application("demo").await;
    let v1 = h.ready_version(app.id, "v1").await;

    let err = h
        .orchestrator
        .versions
        .complete_build(
            v1.id,
            BuildCompletion {
                success: false,
                log: String::new(),
                image_url: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidTransition { .. }));
    assert_eq!(h.orchestrator.versions.find(v1.id).await.unwrap().status, VersionStatus::Ready);
}

#[tokio::test]
async fn test_failed_build_callback() {
    let h = harness().await;
    let app = h.application("demo").await;
    let versions = &h.orchestrator.versions;
    let v1 = versions.create_version(app.id, new_version("v1")).await.unwrap();

    let failed = versions
        .complete_build(
            v1.id,
            BuildCompletion {
                success: false,
                log: "error: missing Cargo.lock".to_string(),
                image_url: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(failed.status, VersionStatus::BuildFailed);
    assert!(failed.build_log.contains("missing Cargo.lock"));

    let err = versions.deploy(v1.id, DeployRequest::default()).await.unwrap_err();
    assert!(matches!(err, ServiceError::PreconditionFailed(_)));
}

#[tokio::test]
async fn test_running_endpoint_marks_version_deployed() {
    let h = harness().await;
    let endpoint = h.running("demo").await;
    let versions = &h.orchestrator.versions;

    assert_eq!(
        versions.find(endpoint.version_id).await.unwrap().status,
        VersionStatus::Deployed
    );

    let deprecated = versions.deprecate(endpoint.version_id).await.unwrap();
    assert_eq!(deprecated.status, VersionStatus::Deprecated);

    let err = versions.deprecate(endpoint.version_id).await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_ready_version_cannot_be_deprecated() {
    let h = harness().await;
    let app = h.application("demo").await;
    let v1 = h.ready_version(app.id, "v1").await;

    let err = h.orchestrator.versions.deprecate(v1.id).await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_concurrent_deploys_create_one_endpoint() {
    let h = harness().await;
    let app = h.application("demo").await;
    let v1 = h.ready_version(app.id, "v1").await;
    let versions = &h.orchestrator.versions;

    let results = futures::future::join_all(
        (0..4).map(|_| versions.deploy(v1.id, DeployRequest::default())),
    )
    .await;

    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(succeeded, 1);
    for result in results.iter().filter(|r| r.is_err()) {
        assert!(matches!(result, Err(ServiceError::PreconditionFailed(_))));
    }

    assert_eq!(h.orchestrator.applications.find(app.id).await.unwrap().deployment_count, 1);
    let endpoints = h
        .orchestrator
        .endpoints
        .list(&EndpointFilter {
            application: Some(app.id),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(endpoints.len(), 1);
}

#[tokio::test]
async fn test_start_failure_leaves_endpoint_in_error() {
    let h = harness().await;
    let app = h.application("demo").await;
    let v1 = h.ready_version(app.id, "v1").await;

    h.backend.set_failing(true);
    let endpoint = h
        .orchestrator
        .versions
        .deploy(v1.id, DeployRequest::default())
        .await
        .unwrap();

    assert_eq!(endpoint.status, EndpointStatus::Error);
    assert_eq!(
        h.orchestrator.endpoints.find(endpoint.id).await.unwrap().status,
        EndpointStatus::Error
    );
    assert_eq!(
        h.orchestrator.versions.find(v1.id).await.unwrap().status,
        VersionStatus::Failed
    );
    assert_eq!(h.orchestrator.applications.find(app.id).await.unwrap().deployment_count, 1);
}

#[tokio::test]
async fn test_list_versions() {
    let h = harness().await;
    let app = h.application("demo").await;
    let versions = &h.orchestrator.versions;
    versions.create_version(app.id, new_version("v1")).await.unwrap();
    versions.create_version(app.id, new_version("v2")).await.unwrap();

    let listed = versions.list_versions(app.id).await.unwrap();
    assert_eq!(listed.len(), 2);
    assert!(listed.iter().all(|v| v.application_id == app.id));

    let err = versions.list_versions(uuid::Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound { .. }));
}
