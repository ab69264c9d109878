use crate::alert_service::AlertService;
use crate::application_service::ApplicationService;
use crate::backend::{BuildSystem, RuntimeBackend};
use crate::cache_service::CacheService;
use crate::endpoint_service::{EndpointService, EndpointSettings};
use crate::monitoring_service::{IngestSettings, IngestWorker, MonitoringService};
use crate::version_service::VersionService;
use orbit_shared::AlertRule;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::Duration;

/// Policy knobs of the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub endpoints: EndpointSettings,
    pub ingest: IngestSettings,
    pub dashboard_cache_ttl: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            endpoints: EndpointSettings::default(),
            ingest: IngestSettings::default(),
            dashboard_cache_ttl: Duration::from_secs(5),
        }
    }
}

/// The five components wired together over one connection pool.
#[derive(Clone)]
pub struct Orchestrator {
    pub applications: Arc<ApplicationService>,
    pub versions: Arc<VersionService>,
    pub endpoints: Arc<EndpointService>,
    pub monitoring: Arc<MonitoringService>,
    pub alerts: Arc<AlertService>,
}

impl Orchestrator {
    /// Builds the services. The returned [`IngestWorker`] must be spawned
    /// (or drained by hand) for samples to be persisted.
    pub fn new(
        db: DatabaseConnection,
        backend: Arc<dyn RuntimeBackend>,
        builder: Arc<dyn BuildSystem>,
        cache: Arc<CacheService>,
        rules: Vec<AlertRule>,
        config: OrchestratorConfig,
    ) -> (Self, IngestWorker) {
        let alerts = Arc::new(AlertService::new(
            db.clone(),
            cache,
            rules,
            config.dashboard_cache_ttl,
        ));

        let (monitoring, receiver) = MonitoringService::new(db.clone(), &config.ingest);
        let monitoring = Arc::new(monitoring);
        let worker = IngestWorker::new(db.clone(), receiver, alerts.clone(), &config.ingest);

        let endpoints = EndpointService::new(
            db.clone(),
            backend,
            monitoring.clone(),
            config.endpoints.clone(),
        );
        let versions = Arc::new(VersionService::new(db.clone(), endpoints.clone(), builder));
        let applications = Arc::new(ApplicationService::new(db, endpoints.clone()));

        let orchestrator = Self {
            applications,
            versions,
            endpoints,
            monitoring,
            alerts,
        };
        (orchestrator, worker)
    }
}
