pub mod application_versions;
pub mod applications;
pub mod service_alerts;
pub mod service_endpoints;
pub mod service_monitoring;
