use crate::status::{AlertLevel, AlertStatus, AppType, ApplicationStatus, EndpointCommand, EndpointStatus, VersionStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

// ---- applications ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateApplication {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: String,
    pub app_type: AppType,
    #[serde(default)]
    pub components: Option<serde_json::Value>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub created_by: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeStatus {
    pub status: ApplicationStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplicationFilter {
    #[serde(default, rename = "type")]
    pub app_type: Option<AppType>,
    #[serde(default)]
    pub status: Option<ApplicationStatus>,
    #[serde(default)]
    pub search: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationStatistics {
    pub application_id: Uuid,
    pub versions_count: u64,
    pub active_endpoints: u64,
    pub avg_response_time: f64,
    pub total_requests: i64,
    pub active_alerts: u64,
    pub view_count: i64,
    pub deployment_count: i64,
}

// ---- versions ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateVersion {
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub config: Option<serde_json::Value>,
    #[serde(default)]
    pub dockerfile: String,
    #[serde(default)]
    pub manifest: Option<serde_json::Value>,
    #[serde(default)]
    pub created_by: Option<Uuid>,
}

/// Builder callback payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildCompletion {
    pub success: bool,
    #[serde(default)]
    pub log: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

fn default_replicas() -> i32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployRequest {
    #[serde(default = "default_replicas")]
    pub replicas: i32,
    #[serde(default)]
    pub env_vars: HashMap<String, String>,
}

impl Default for DeployRequest {
    fn default() -> Self {
        Self {
            replicas: default_replicas(),
            env_vars: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildLogs {
    pub version_id: Uuid,
    pub status: VersionStatus,
    pub logs: String,
}

// ---- endpoints ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScaleRequest {
    pub replicas: i32,
}

/// Status observed by the runtime backend, delivered out of band.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointStatusReport {
    pub status: EndpointStatus,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointFilter {
    #[serde(default)]
    pub application: Option<Uuid>,
    #[serde(default)]
    pub status: Option<EndpointStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    pub endpoint_id: Uuid,
    pub command: EndpointCommand,
    pub status: EndpointStatus,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScaleResult {
    pub endpoint_id: Uuid,
    pub replicas: i32,
    pub status: EndpointStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub endpoint_id: Uuid,
    pub is_healthy: bool,
    pub status: EndpointStatus,
    pub last_check: DateTime<Utc>,
    pub consecutive_failures: u32,
}

// ---- monitoring ----

/// One telemetry sample as delivered by a producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringSample {
    pub endpoint_id: Uuid,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub response_time: f64,
    #[serde(default)]
    pub request_count: i64,
    #[serde(default)]
    pub error_count: i64,
    #[serde(default)]
    pub network_in: f64,
    #[serde(default)]
    pub network_out: f64,
    #[serde(default)]
    pub custom_metrics: HashMap<String, f64>,
}

impl MonitoringSample {
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("cpu_usage", self.cpu_usage),
            ("memory_usage", self.memory_usage),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(format!("{} must be a percentage in [0, 100], got {}", name, value));
            }
        }
        for (name, value) in [
            ("response_time", self.response_time),
            ("network_in", self.network_in),
            ("network_out", self.network_out),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("{} must be a non-negative number, got {}", name, value));
            }
        }
        if self.request_count < 0 || self.error_count < 0 {
            return Err("request_count and error_count must be non-negative".to_string());
        }
        if let Some((key, _)) = self.custom_metrics.iter().find(|(_, v)| !v.is_finite()) {
            return Err(format!("custom metric '{}' must be a finite number", key));
        }
        Ok(())
    }
}

/// Newest sample of one running endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointSnapshot {
    pub endpoint_id: Uuid,
    pub endpoint_name: String,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub response_time: f64,
    pub request_count: i64,
    pub error_count: i64,
    pub timestamp: DateTime<Utc>,
}

// ---- alerts ----

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertFilter {
    #[serde(default)]
    pub level: Option<AlertLevel>,
    #[serde(default)]
    pub status: Option<AlertStatus>,
    #[serde(default)]
    pub endpoint: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcknowledgeRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemEndpoint {
    pub endpoint_id: Uuid,
    pub endpoint_name: String,
    pub alert_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertDashboard {
    pub level_stats: BTreeMap<AlertLevel, u64>,
    pub recent_alerts_24h: u64,
    pub problem_endpoints: Vec<ProblemEndpoint>,
    pub generated_at: DateTime<Utc>,
}
