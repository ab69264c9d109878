pub mod alert_service;
pub mod application_service;
pub mod backend;
pub mod cache_service;
pub mod database;
pub mod docker_service;
pub mod endpoint_service;
pub mod entity;
pub mod error;
pub mod monitoring_service;
pub mod orchestrator;
pub mod version_service;

pub use alert_service::AlertService;
pub use application_service::ApplicationService;
pub use backend::{BuildJob, BuildSystem, LoggingBuildSystem, RuntimeBackend, WebhookBuildSystem};
pub use cache_service::CacheService;
pub use database::create_connection;
pub use docker_service::DockerRuntime;
pub use endpoint_service::{EndpointService, EndpointSettings, MAX_REPLICAS, MIN_REPLICAS};
pub use error::{Result, ServiceError};
pub use monitoring_service::{IngestSettings, IngestWorker, MonitoringService};
pub use orchestrator::{Orchestrator, OrchestratorConfig};
pub use version_service::VersionService;

// Re-export entities for convenience
pub use entity::application_versions;
pub use entity::applications;
pub use entity::service_alerts;
pub use entity::service_endpoints;
pub use entity::service_monitoring;
