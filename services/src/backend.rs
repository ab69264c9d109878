//! Ports to the systems that actually run and build things.
//!
//! The orchestrator never schedules containers or compiles images itself; it
//! dispatches commands through these traits and records what comes back.

use crate::entity::service_endpoints;
use anyhow::{Context, Result};
use async_trait::async_trait;
use orbit_shared::EndpointStatus;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Runtime that hosts service endpoints.
///
/// Command methods return the status the backend observed synchronously, if
/// it knows one (e.g. a container that is already stopped when `stop`
/// returns). `None` leaves the endpoint in its pending state until a status
/// callback or a health probe reconciles it.
#[async_trait]
pub trait RuntimeBackend: Send + Sync {
    async fn start(&self, endpoint: &service_endpoints::Model) -> Result<Option<EndpointStatus>>;

    async fn stop(&self, endpoint: &service_endpoints::Model) -> Result<Option<EndpointStatus>>;

    async fn restart(&self, endpoint: &service_endpoints::Model) -> Result<Option<EndpointStatus>>;

    async fn scale(&self, endpoint: &service_endpoints::Model, replicas: i32) -> Result<()>;

    /// `Ok(true)` when the endpoint answered its health check.
    async fn probe(&self, endpoint: &service_endpoints::Model) -> Result<bool>;
}

/// Everything a builder needs to produce an image for one version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildJob {
    pub version_id: Uuid,
    pub application_id: Uuid,
    pub application_name: String,
    pub version: String,
    pub dockerfile: String,
    pub config: serde_json::Value,
    pub manifest: serde_json::Value,
    /// Relative path the builder POSTs its `BuildCompletion` to.
    pub callback_path: String,
}

#[async_trait]
pub trait BuildSystem: Send + Sync {
    /// Hands the job over. Returns a line for the build log.
    async fn submit(&self, job: &BuildJob) -> Result<String>;
}

/// Accepts every job and leaves it to an operator or an out-of-band builder
/// to report completion.
pub struct LoggingBuildSystem;

#[async_trait]
impl BuildSystem for LoggingBuildSystem {
    async fn submit(&self, job: &BuildJob) -> Result<String> {
        log::info!(
            "Build queued for {}:{} (version {}), awaiting callback on {}",
            job.application_name,
            job.version,
            job.version_id,
            job.callback_path
        );
        Ok(format!("queued build for {}:{}", job.application_name, job.version))
    }
}

/// Posts build jobs to an external builder over HTTP.
pub struct WebhookBuildSystem {
    client: reqwest::Client,
    url: String,
}

impl WebhookBuildSystem {
    pub fn new(url: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client for build webhook")?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl BuildSystem for WebhookBuildSystem {
    async fn submit(&self, job: &BuildJob) -> Result<String> {
        let response = self
            .client
            .post(&self.url)
            .json(job)
            .send()
            .await
            .with_context(|| format!("Build webhook {} unreachable", self.url))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Build webhook {} answered {}", self.url, status);
        }

        log::info!("Build for version {} submitted to {}", job.version_id, self.url);
        Ok(format!("submitted build to {} ({})", self.url, status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> BuildJob {
        BuildJob {
            version_id: Uuid::new_v4(),
            application_id: Uuid::new_v4(),
            application_name: "demo".to_string(),
            version: "v1".to_string(),
            dockerfile: "FROM scratch".to_string(),
            config: serde_json::json!({}),
            manifest: serde_json::json!({}),
            callback_path: "/api/versions/x/build/complete".to_string(),
        }
    }

    #[tokio::test]
    async fn test_logging_build_system_accepts_jobs() {
        let line = LoggingBuildSystem.submit(&job()).await.unwrap();
        assert!(line.contains("demo:v1"));
    }

    #[tokio::test]
    async fn test_webhook_reports_unreachable_builder() {
        let builder =
            WebhookBuildSystem::new("http://127.0.0.1:1/build".to_string(), Duration::from_millis(200))
                .unwrap();
        assert!(builder.submit(&job()).await.is_err());
    }
}
