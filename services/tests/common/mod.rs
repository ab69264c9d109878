//! Shared fixtures for the service integration tests: an in-memory SQLite
//! store migrated with the real schema, and recording collaborators.
#![allow(dead_code)]

use async_trait::async_trait;
use migration::{Migrator, MigratorTrait};
use orbit_services::{
    applications, application_versions, service_endpoints, BuildJob, BuildSystem, CacheService,
    EndpointSettings, IngestSettings, IngestWorker, Orchestrator, OrchestratorConfig,
    RuntimeBackend,
};
use orbit_shared::{
    AlertRule, AppType, BuildCompletion, CreateApplication, CreateVersion, DeployRequest,
    EndpointStatus, MonitoringSample,
};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

pub async fn setup_db() -> DatabaseConnection {
    let mut options = ConnectOptions::new("sqlite::memory:".to_string());
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);
    let db = Database::connect(options)
        .await
        .expect("Failed to open in-memory database");
    Migrator::up(&db, None).await.expect("Failed to run migrations");
    db
}

/// Runtime backend that records every command and answers probes from a
/// switch.
pub struct RecordingBackend {
    calls: Mutex<Vec<(&'static str, Uuid)>>,
    healthy: AtomicBool,
    fail_commands: AtomicBool,
    stop_observes_stopped: AtomicBool,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            healthy: AtomicBool::new(true),
            fail_commands: AtomicBool::new(false),
            stop_observes_stopped: AtomicBool::new(false),
        }
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_commands.store(failing, Ordering::SeqCst);
    }

    /// Makes `stop` report the container as already stopped.
    pub fn set_stop_is_synchronous(&self, synchronous: bool) {
        self.stop_observes_stopped.store(synchronous, Ordering::SeqCst);
    }

    pub fn calls(&self, command: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| *c == command)
            .count()
    }

    fn record(&self, command: &'static str, endpoint: &service_endpoints::Model) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push((command, endpoint.id));
        if self.fail_commands.load(Ordering::SeqCst) {
            anyhow::bail!("runtime refused {}", command);
        }
        Ok(())
    }
}

#[async_trait]
impl RuntimeBackend for RecordingBackend {
    async fn start(&self, endpoint: &service_endpoints::Model) -> anyhow::Result<Option<EndpointStatus>> {
        self.record("start", endpoint)?;
        Ok(None)
    }

    async fn stop(&self, endpoint: &service_endpoints::Model) -> anyhow::Result<Option<EndpointStatus>> {
        self.record("stop", endpoint)?;
        if self.stop_observes_stopped.load(Ordering::SeqCst) {
            Ok(Some(EndpointStatus::Stopped))
        } else {
            Ok(None)
        }
    }

    async fn restart(&self, endpoint: &service_endpoints::Model) -> anyhow::Result<Option<EndpointStatus>> {
        self.record("restart", endpoint)?;
        Ok(None)
    }

    async fn scale(&self, endpoint: &service_endpoints::Model, _replicas: i32) -> anyhow::Result<()> {
        self.record("scale", endpoint)
    }

    async fn probe(&self, endpoint: &service_endpoints::Model) -> anyhow::Result<bool> {
        self.calls.lock().unwrap().push(("probe", endpoint.id));
        Ok(self.healthy.load(Ordering::SeqCst))
    }
}

/// Build system that keeps submitted jobs.
pub struct RecordingBuildSystem {
    pub jobs: Mutex<Vec<BuildJob>>,
    fail: AtomicBool,
}

impl RecordingBuildSystem {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    pub fn submitted(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }
}

#[async_trait]
impl BuildSystem for RecordingBuildSystem {
    async fn submit(&self, job: &BuildJob) -> anyhow::Result<String> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("builder offline");
        }
        self.jobs.lock().unwrap().push(job.clone());
        Ok(format!("accepted {}:{}", job.application_name, job.version))
    }
}

pub struct Harness {
    pub db: DatabaseConnection,
    pub orchestrator: Orchestrator,
    pub worker: IngestWorker,
    pub backend: Arc<RecordingBackend>,
    pub builder: Arc<RecordingBuildSystem>,
}

pub fn test_config() -> OrchestratorConfig {
    OrchestratorConfig {
        endpoints: EndpointSettings {
            probe_interval: None,
            failure_threshold: 3,
            command_timeout: Duration::from_secs(2),
            ..EndpointSettings::default()
        },
        ingest: IngestSettings {
            buffer_capacity: 100,
            batch_size: 50,
            batch_timeout: Duration::from_millis(50),
            ..IngestSettings::default()
        },
        dashboard_cache_ttl: Duration::from_secs(5),
    }
}

pub async fn harness() -> Harness {
    harness_with(test_config(), AlertRule::defaults()).await
}

pub async fn harness_with(config: OrchestratorConfig, rules: Vec<AlertRule>) -> Harness {
    let db = setup_db().await;
    let backend = Arc::new(RecordingBackend::new());
    let builder = Arc::new(RecordingBuildSystem::new());
    let (orchestrator, worker) = Orchestrator::new(
        db.clone(),
        backend.clone(),
        builder.clone(),
        Arc::new(CacheService::disabled()),
        rules,
        config,
    );
    Harness {
        db,
        orchestrator,
        worker,
        backend,
        builder,
    }
}

pub fn new_application(name: &str, app_type: AppType) -> CreateApplication {
    CreateApplication {
        name: name.to_string(),
        display_name: None,
        description: format!("{} service", name),
        app_type,
        components: None,
        dependencies: Vec::new(),
        created_by: None,
    }
}

pub fn new_version(version: &str) -> CreateVersion {
    CreateVersion {
        version: version.to_string(),
        description: String::new(),
        config: None,
        dockerfile: "FROM scratch".to_string(),
        manifest: None,
        created_by: None,
    }
}

impl Harness {
    pub async fn application(&self, name: &str) -> applications::Model {
        self.orchestrator
            .applications
            .create(new_application(name, AppType::WebService))
            .await
            .unwrap()
    }

    /// Creates a version and reports a successful build for it.
    pub async fn ready_version(&self, application_id: Uuid, version: &str) -> application_versions::Model {
        let created = self
            .orchestrator
            .versions
            .create_version(application_id, new_version(version))
            .await
            .unwrap();
        self.orchestrator
            .versions
            .complete_build(
                created.id,
                BuildCompletion {
                    success: true,
                    log: "image built".to_string(),
                    image_url: Some(format!("registry.local/app:{}", version)),
                },
            )
            .await
            .unwrap()
    }

    /// Application, ready version and a freshly deployed endpoint.
    pub async fn deployed(&self, name: &str) -> service_endpoints::Model {
        let app = self.application(name).await;
        let version = self.ready_version(app.id, "v1").await;
        self.orchestrator
            .versions
            .deploy(version.id, DeployRequest::default())
            .await
            .unwrap()
    }

    /// Deployed endpoint promoted to `running` by a healthy probe.
    pub async fn running(&self, name: &str) -> service_endpoints::Model {
        let endpoint = self.deployed(name).await;
        self.backend.set_healthy(true);
        let report = self.orchestrator.endpoints.health(endpoint.id).await.unwrap();
        assert_eq!(report.status, EndpointStatus::Running);
        self.orchestrator.endpoints.find(endpoint.id).await.unwrap()
    }
}

pub fn sample(endpoint_id: Uuid) -> MonitoringSample {
    MonitoringSample {
        endpoint_id,
        timestamp: None,
        cpu_usage: 20.0,
        memory_usage: 30.0,
        response_time: 100.0,
        request_count: 100,
        error_count: 0,
        network_in: 1.0,
        network_out: 1.0,
        custom_metrics: HashMap::new(),
    }
}

pub fn hot_sample(endpoint_id: Uuid) -> MonitoringSample {
    MonitoringSample {
        cpu_usage: 97.5,
        ..sample(endpoint_id)
    }
}
