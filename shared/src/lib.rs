pub mod components;
pub mod condition;
pub mod models;
pub mod status;

pub use components::validate_components;
pub use condition::{AlertCondition, AlertRule, Comparator, Metric};
pub use models::{
    AcknowledgeRequest, AlertDashboard, AlertFilter, ApplicationFilter, ApplicationStatistics,
    BuildCompletion, BuildLogs, ChangeStatus, CommandResult, CreateApplication, CreateVersion,
    DeployRequest, EndpointFilter, EndpointSnapshot, EndpointStatusReport, HealthReport,
    MonitoringSample, ProblemEndpoint, ScaleRequest, ScaleResult,
};
pub use status::{
    AlertLevel, AlertStatus, AppType, ApplicationStatus, EndpointCommand, EndpointStatus, Protocol,
    VersionStatus,
};
