use crate::backend::RuntimeBackend;
use crate::entity::service_endpoints;
use anyhow::{Context, Result};
use async_trait::async_trait;
use bollard::errors::Error as DockerError;
use bollard::query_parameters::{
    InspectContainerOptions, ListContainersOptions, RestartContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::Docker;
use orbit_shared::{EndpointStatus, Protocol};
use std::time::Duration;
use tokio::net::TcpStream;

/// Runs endpoints as Docker containers named after the endpoint.
///
/// Without a reachable daemon the runtime still answers health probes over
/// the network, and container commands are accepted and logged so the
/// lifecycle can be driven by status callbacks instead.
pub struct DockerRuntime {
    docker: Option<Docker>,
    http: reqwest::Client,
    probe_timeout: Duration,
    stop_grace_secs: i32,
}

impl DockerRuntime {
    pub async fn new(probe_timeout: Duration) -> Result<Self> {
        let docker = match Self::connect().await {
            Ok(docker) => Some(docker),
            Err(e) => {
                log::warn!("Docker unavailable, container commands will only be recorded: {}", e);
                None
            }
        };

        let http = reqwest::Client::builder()
            .timeout(probe_timeout)
            .build()
            .context("Failed to build HTTP probe client")?;

        Ok(Self {
            docker,
            http,
            probe_timeout,
            stop_grace_secs: 10,
        })
    }

    async fn connect() -> Result<Docker> {
        // DOCKER_HOST wins, then Docker Desktop's socket, then local defaults
        let docker = if let Ok(docker_host) = std::env::var("DOCKER_HOST") {
            log::info!("Using DOCKER_HOST: {}", docker_host);
            if let Some(socket_path) = docker_host.strip_prefix("unix://") {
                Docker::connect_with_socket(socket_path, 120, bollard::API_DEFAULT_VERSION)
                    .context(format!("Failed to connect to Docker socket: {}", socket_path))?
            } else {
                Docker::connect_with_http(&docker_host, 120, bollard::API_DEFAULT_VERSION)
                    .context(format!("Failed to connect to Docker host: {}", docker_host))?
            }
        } else {
            let desktop_path = std::env::var("HOME")
                .map(|home| format!("{}/.docker/desktop/docker.sock", home))
                .ok()
                .filter(|path| std::path::Path::new(path).exists());

            match desktop_path {
                Some(path) => {
                    log::info!("Connecting to Docker Desktop socket: {}", path);
                    Docker::connect_with_socket(&path, 120, bollard::API_DEFAULT_VERSION)
                        .context(format!("Failed to connect to Docker socket: {}", path))?
                }
                None => {
                    log::info!("Using Docker local defaults");
                    Docker::connect_with_local_defaults()
                        .context("Failed to connect to Docker daemon")?
                }
            }
        };

        let options = ListContainersOptions {
            all: true,
            ..Default::default()
        };
        let containers = docker
            .list_containers(Some(options))
            .await
            .context("Docker daemon did not answer")?;
        log::info!("Docker connection successful, {} containers visible", containers.len());

        Ok(docker)
    }

    pub fn is_connected(&self) -> bool {
        self.docker.is_some()
    }

    /// 304 means the container is already in the requested state.
    fn already_there(err: &DockerError) -> bool {
        matches!(err, DockerError::DockerResponseServerError { status_code: 304, .. })
    }

    async fn container_running(&self, name: &str) -> Result<bool> {
        let Some(docker) = &self.docker else {
            return Ok(false);
        };
        let info = docker
            .inspect_container(name, None::<InspectContainerOptions>)
            .await
            .with_context(|| format!("Failed to inspect container {}", name))?;
        Ok(info.state.and_then(|s| s.running).unwrap_or(false))
    }

    async fn probe_http(&self, url: &str) -> Result<bool> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("Health check request to {} failed", url))?;
        Ok(response.status().is_success())
    }

    async fn probe_tcp(&self, host: &str, port: i32) -> Result<bool> {
        let port = u16::try_from(port).context("Port out of range")?;
        match tokio::time::timeout(self.probe_timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(_)) => Ok(true),
            Ok(Err(e)) => {
                log::debug!("TCP probe to {}:{} failed: {}", host, port, e);
                Ok(false)
            }
            Err(_) => Ok(false),
        }
    }
}

#[async_trait]
impl RuntimeBackend for DockerRuntime {
    async fn start(&self, endpoint: &service_endpoints::Model) -> Result<Option<EndpointStatus>> {
        let Some(docker) = &self.docker else {
            log::info!("Start of {} recorded (no Docker daemon)", endpoint.name);
            return Ok(None);
        };
        match docker
            .start_container(&endpoint.name, None::<StartContainerOptions>)
            .await
        {
            Ok(()) => {}
            Err(e) if Self::already_there(&e) => {}
            Err(e) => return Err(anyhow::anyhow!("Failed to start container {}: {}", endpoint.name, e)),
        }
        // Running container is not the same as a healthy service; the probe decides
        Ok(None)
    }

    async fn stop(&self, endpoint: &service_endpoints::Model) -> Result<Option<EndpointStatus>> {
        let Some(docker) = &self.docker else {
            log::info!("Stop of {} recorded (no Docker daemon)", endpoint.name);
            return Ok(None);
        };
        let options = StopContainerOptions {
            t: Some(self.stop_grace_secs),
            ..Default::default()
        };
        match docker.stop_container(&endpoint.name, Some(options)).await {
            Ok(()) => Ok(Some(EndpointStatus::Stopped)),
            Err(e) if Self::already_there(&e) => Ok(Some(EndpointStatus::Stopped)),
            Err(e) => Err(anyhow::anyhow!("Failed to stop container {}: {}", endpoint.name, e)),
        }
    }

    async fn restart(&self, endpoint: &service_endpoints::Model) -> Result<Option<EndpointStatus>> {
        let Some(docker) = &self.docker else {
            log::info!("Restart of {} recorded (no Docker daemon)", endpoint.name);
            return Ok(None);
        };
        let options = RestartContainerOptions {
            t: Some(self.stop_grace_secs),
            ..Default::default()
        };
        docker
            .restart_container(&endpoint.name, Some(options))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to restart container {}: {}", endpoint.name, e))?;
        Ok(None)
    }

    async fn scale(&self, endpoint: &service_endpoints::Model, replicas: i32) -> Result<()> {
        // A single container has no replica primitive; the count is bookkeeping only
        log::info!("Recorded replica count {} for {}", replicas, endpoint.name);
        Ok(())
    }

    async fn probe(&self, endpoint: &service_endpoints::Model) -> Result<bool> {
        match endpoint.protocol {
            Protocol::Http | Protocol::Https => self.probe_http(&endpoint.health_url()).await,
            Protocol::Tcp | Protocol::Grpc => self.probe_tcp(&endpoint.host, endpoint.port).await,
            Protocol::Udp => self.container_running(&endpoint.name).await,
        }
    }
}
