use crate::backend::RuntimeBackend;
use crate::entity::{application_versions, applications, service_endpoints, service_monitoring};
use crate::error::{Result, ServiceError};
use crate::monitoring_service::MonitoringService;
use crate::version_service::reconcile_deployment;
use chrono::{DateTime, Utc};
use orbit_shared::{
    CommandResult, DeployRequest, EndpointCommand, EndpointFilter, EndpointStatus, HealthReport,
    Protocol, ScaleResult,
};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr,
    EntityTrait, QueryFilter, QueryOrder, QuerySelect,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

pub const MIN_REPLICAS: i32 = 1;
pub const MAX_REPLICAS: i32 = 10;
const MAX_CAS_ATTEMPTS: usize = 8;

#[derive(Debug, Clone)]
pub struct EndpointSettings {
    /// `None` disables background probing.
    pub probe_interval: Option<Duration>,
    pub failure_threshold: u32,
    pub command_timeout: Duration,
    pub default_host: String,
    pub default_port: i32,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            probe_interval: Some(Duration::from_secs(30)),
            failure_threshold: 3,
            command_timeout: Duration::from_secs(10),
            default_host: "cluster.local".to_string(),
            default_port: 8080,
        }
    }
}

/// Optional `endpoint` section of a version's config.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EndpointOverrides {
    protocol: Option<Protocol>,
    host: Option<String>,
    port: Option<i32>,
    path: Option<String>,
    health_check_path: Option<String>,
}

/// Lifecycle of deployed endpoints.
///
/// Commands on one endpoint are serialized by an in-process lock and each
/// status write is a compare-and-set on the status it was decided from, so
/// concurrent writers from other processes surface as `Conflict` instead of
/// lost updates.
pub struct EndpointService {
    db: DatabaseConnection,
    backend: Arc<dyn RuntimeBackend>,
    monitoring: Arc<MonitoringService>,
    settings: EndpointSettings,
    me: Weak<EndpointService>,
    locks: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
    failures: Mutex<HashMap<Uuid, u32>>,
    probes: Mutex<HashMap<Uuid, JoinHandle<()>>>,
}

impl EndpointService {
    pub fn new(
        db: DatabaseConnection,
        backend: Arc<dyn RuntimeBackend>,
        monitoring: Arc<MonitoringService>,
        settings: EndpointSettings,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            db,
            backend,
            monitoring,
            settings,
            me: me.clone(),
            locks: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            probes: Mutex::new(HashMap::new()),
        })
    }

    pub async fn find(&self, id: Uuid) -> Result<service_endpoints::Model> {
        service_endpoints::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("endpoint", id))
    }

    pub async fn list(&self, filter: &EndpointFilter) -> Result<Vec<service_endpoints::Model>> {
        let mut query = service_endpoints::Entity::find();

        if let Some(application_id) = filter.application {
            let version_ids: Vec<Uuid> = application_versions::Entity::find()
                .select_only()
                .column(application_versions::Column::Id)
                .filter(application_versions::Column::ApplicationId.eq(application_id))
                .into_tuple()
                .all(&self.db)
                .await?;
            if version_ids.is_empty() {
                return Ok(Vec::new());
            }
            query = query.filter(service_endpoints::Column::VersionId.is_in(version_ids));
        }
        if let Some(status) = filter.status {
            query = query.filter(service_endpoints::Column::Status.eq(status));
        }

        Ok(query
            .order_by_desc(service_endpoints::Column::CreatedAt)
            .all(&self.db)
            .await?)
    }

    pub(crate) async fn endpoint_ids_of_application<C: ConnectionTrait>(
        db: &C,
        application_id: Uuid,
    ) -> std::result::Result<Vec<Uuid>, DbErr> {
        let version_ids: Vec<Uuid> = application_versions::Entity::find()
            .select_only()
            .column(application_versions::Column::Id)
            .filter(application_versions::Column::ApplicationId.eq(application_id))
            .into_tuple()
            .all(db)
            .await?;
        if version_ids.is_empty() {
            return Ok(Vec::new());
        }

        service_endpoints::Entity::find()
            .select_only()
            .column(service_endpoints::Column::Id)
            .filter(service_endpoints::Column::VersionId.is_in(version_ids))
            .into_tuple()
            .all(db)
            .await
    }

    /// Inserts the endpoint row for a deployment in `starting`. Runs inside
    /// the deploy transaction; nothing is dispatched here.
    pub(crate) async fn create_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        version: &application_versions::Model,
        app: &applications::Model,
        request: &DeployRequest,
    ) -> Result<service_endpoints::Model> {
        let overrides: EndpointOverrides = match version.config.get("endpoint") {
            Some(section) => serde_json::from_value(section.clone()).map_err(|e| {
                ServiceError::Validation(format!("invalid endpoint section in version config: {}", e))
            })?,
            None => EndpointOverrides::default(),
        };

        let port = overrides.port.unwrap_or(self.settings.default_port);
        if !(1..=65535).contains(&port) {
            return Err(ServiceError::Validation(format!("port {} out of range", port)));
        }

        let now = Utc::now().fixed_offset();
        let model = service_endpoints::ActiveModel {
            id: Set(Uuid::new_v4()),
            version_id: Set(version.id),
            name: Set(format!("{}-{}", app.name, version.version)),
            protocol: Set(overrides.protocol.unwrap_or_default()),
            host: Set(overrides
                .host
                .unwrap_or_else(|| self.settings.default_host.clone())),
            port: Set(port),
            path: Set(normalize_path(overrides.path.as_deref().unwrap_or("/"))),
            status: Set(EndpointStatus::Starting),
            replicas: Set(request.replicas),
            env_vars: Set(serde_json::json!(request.env_vars)),
            health_check_path: Set(normalize_path(
                overrides.health_check_path.as_deref().unwrap_or("/health"),
            )),
            is_healthy: Set(false),
            last_health_check: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        Ok(model.insert(conn).await?)
    }

    /// Dispatches the initial start of a freshly deployed endpoint and
    /// returns its recorded state. A failed dispatch leaves the endpoint in
    /// `error` rather than failing the deployment that created it.
    pub(crate) async fn launch(&self, endpoint: service_endpoints::Model) -> service_endpoints::Model {
        let id = endpoint.id;
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let observed = match self.dispatch(self.backend.start(&endpoint)).await {
            Ok(observed) => {
                self.reset_failures(id);
                self.spawn_probe_loop(id);
                observed
            }
            Err(message) => {
                log::error!("Start of endpoint {} failed: {}", id, message);
                Some(EndpointStatus::Error)
            }
        };
        let Some(status) = observed else {
            return endpoint;
        };

        let recorded = self.observe(&endpoint, status).await;
        match recorded {
            Ok(updated) => updated,
            Err(e) => {
                log::error!("Could not record status of endpoint {}: {}", id, e);
                endpoint
            }
        }
    }

    pub async fn start(&self, id: Uuid) -> Result<CommandResult> {
        self.command(id, EndpointCommand::Start).await
    }

    pub async fn stop(&self, id: Uuid) -> Result<CommandResult> {
        self.command(id, EndpointCommand::Stop).await
    }

    pub async fn restart(&self, id: Uuid) -> Result<CommandResult> {
        self.command(id, EndpointCommand::Restart).await
    }

    async fn command(&self, id: Uuid, command: EndpointCommand) -> Result<CommandResult> {
        let _guard = self.lock_endpoint(id).await?;

        let target = command.target();
        let (from, endpoint) = self
            .swap_status(id, target, |current| {
                if command.permits(current) {
                    Ok(())
                } else {
                    log::warn!(
                        "Rejected {} on endpoint {} in {}",
                        command.as_str(),
                        id,
                        current.as_str()
                    );
                    Err(ServiceError::invalid_transition(
                        "endpoint",
                        current.as_str(),
                        target.as_str(),
                    ))
                }
            })
            .await?;
        log::info!(
            "Endpoint {} {} -> {} ({})",
            endpoint.name,
            from.as_str(),
            target.as_str(),
            command.as_str()
        );

        if command == EndpointCommand::Stop {
            self.cancel_probe(id);
        }

        let dispatched = match command {
            EndpointCommand::Start => self.dispatch(self.backend.start(&endpoint)).await,
            EndpointCommand::Stop => self.dispatch(self.backend.stop(&endpoint)).await,
            EndpointCommand::Restart => self.dispatch(self.backend.restart(&endpoint)).await,
        };

        match dispatched {
            Ok(observed) => {
                let endpoint = match observed {
                    Some(status) => self.observe(&endpoint, status).await?,
                    None => endpoint,
                };
                if command != EndpointCommand::Stop {
                    self.reset_failures(id);
                    self.spawn_probe_loop(id);
                }
                Ok(CommandResult {
                    endpoint_id: id,
                    command,
                    status: endpoint.status,
                    message: format!("{} dispatched", command.as_str()),
                })
            }
            Err(message) => {
                log::error!("{} of endpoint {} failed: {}", command.as_str(), id, message);
                self.cancel_probe(id);
                self.observe(&endpoint, EndpointStatus::Error).await?;
                Err(ServiceError::Backend(message))
            }
        }
    }

    pub async fn scale(&self, id: Uuid, replicas: i32) -> Result<ScaleResult> {
        if !(MIN_REPLICAS..=MAX_REPLICAS).contains(&replicas) {
            return Err(ServiceError::Validation(format!(
                "replicas must be between {} and {}, got {}",
                MIN_REPLICAS, MAX_REPLICAS, replicas
            )));
        }

        let _guard = self.lock_endpoint(id).await?;

        let endpoint = self.find(id).await?;
        self.dispatch(async { self.backend.scale(&endpoint, replicas).await.map(|_| None) })
            .await
            .map_err(ServiceError::Backend)?;

        let result = service_endpoints::Entity::update_many()
            .set(service_endpoints::ActiveModel {
                replicas: Set(replicas),
                updated_at: Set(Utc::now().fixed_offset()),
                ..Default::default()
            })
            .filter(service_endpoints::Column::Id.eq(id))
            .exec(&self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::not_found("endpoint", id));
        }

        log::info!("Endpoint {} scaled {} -> {}", endpoint.name, endpoint.replicas, replicas);
        Ok(ScaleResult {
            endpoint_id: id,
            replicas,
            status: endpoint.status,
        })
    }

    /// Status observed by the runtime backend, delivered out of band.
    pub async fn report_status(
        &self,
        id: Uuid,
        observed: EndpointStatus,
    ) -> Result<service_endpoints::Model> {
        let _guard = self.lock_endpoint(id).await?;

        let endpoint = self.find(id).await?;
        if endpoint.status == observed {
            return Ok(endpoint);
        }
        if !endpoint.status.can_transition_to(observed) {
            log::warn!(
                "Rejected reported status {} for endpoint {} in {}",
                observed.as_str(),
                id,
                endpoint.status.as_str()
            );
            return Err(ServiceError::invalid_transition(
                "endpoint",
                endpoint.status.as_str(),
                observed.as_str(),
            ));
        }

        let updated = self.observe(&endpoint, observed).await?;
        if updated.status == EndpointStatus::Stopped {
            self.cancel_probe(id);
        }
        Ok(updated)
    }

    /// Probes the endpoint once and records the outcome.
    ///
    /// A `starting` endpoint that answers becomes `running`; a `running`
    /// endpoint that fails `failure_threshold` probes in a row becomes
    /// `error`.
    pub async fn health(&self, id: Uuid) -> Result<HealthReport> {
        let _guard = self.lock_endpoint(id).await?;

        let endpoint = self.find(id).await?;
        let is_healthy = match tokio::time::timeout(
            self.settings.command_timeout,
            self.backend.probe(&endpoint),
        )
        .await
        {
            Ok(Ok(healthy)) => healthy,
            Ok(Err(e)) => {
                log::debug!("Probe of endpoint {} failed: {:#}", id, e);
                false
            }
            Err(_) => {
                log::debug!("Probe of endpoint {} timed out", id);
                false
            }
        };

        let consecutive_failures = self.record_probe(id, is_healthy);
        let next_status = match endpoint.status {
            EndpointStatus::Starting if is_healthy => Some(EndpointStatus::Running),
            EndpointStatus::Running
                if !is_healthy && consecutive_failures >= self.settings.failure_threshold =>
            {
                Some(EndpointStatus::Error)
            }
            _ => None,
        };

        let now = Utc::now();
        let mut changes = service_endpoints::ActiveModel {
            is_healthy: Set(is_healthy),
            last_health_check: Set(Some(now.fixed_offset())),
            ..Default::default()
        };
        let mut status = endpoint.status;

        if let Some(next) = next_status {
            changes.status = Set(next);
            changes.updated_at = Set(now.fixed_offset());
            let result = service_endpoints::Entity::update_many()
                .set(changes.clone())
                .filter(service_endpoints::Column::Id.eq(id))
                .filter(service_endpoints::Column::Status.eq(endpoint.status))
                .exec(&self.db)
                .await?;
            if result.rows_affected == 1 {
                status = next;
                if next == EndpointStatus::Error {
                    log::warn!(
                        "Endpoint {} failed {} consecutive probes, running -> error",
                        endpoint.name,
                        consecutive_failures
                    );
                } else {
                    log::info!("Endpoint {} healthy, starting -> running", endpoint.name);
                }
                reconcile_deployment(&self.db, endpoint.version_id, next).await?;
                return Ok(self.health_report(id, is_healthy, status, now, consecutive_failures));
            }
            changes.status = sea_orm::ActiveValue::NotSet;
            changes.updated_at = sea_orm::ActiveValue::NotSet;
        }

        service_endpoints::Entity::update_many()
            .set(changes)
            .filter(service_endpoints::Column::Id.eq(id))
            .exec(&self.db)
            .await?;
        log::debug!("Endpoint {} probe healthy={}", endpoint.name, is_healthy);

        Ok(self.health_report(id, is_healthy, status, now, consecutive_failures))
    }

    fn health_report(
        &self,
        endpoint_id: Uuid,
        is_healthy: bool,
        status: EndpointStatus,
        last_check: DateTime<Utc>,
        consecutive_failures: u32,
    ) -> HealthReport {
        HealthReport {
            endpoint_id,
            is_healthy,
            status,
            last_check,
            consecutive_failures,
        }
    }

    /// Samples of one endpoint in `[from, to]`, oldest first.
    pub async fn metrics(
        &self,
        id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: Option<u64>,
    ) -> Result<Vec<service_monitoring::Model>> {
        self.find(id).await?;
        self.monitoring.samples(Some(id), from, to, limit).await
    }

    /// Drops every in-memory trace of an endpoint that no longer exists.
    pub fn forget(&self, id: Uuid) {
        self.cancel_probe(id);
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }

    /// Number of endpoints with a command lock entry.
    pub fn guarded_endpoints(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Number of endpoints with a live probe loop.
    pub fn active_probes(&self) -> usize {
        self.probes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|handle| !handle.is_finished())
            .count()
    }

    /// Starts probe loops for every endpoint that should be watched. Called
    /// once at boot.
    pub async fn resume_probes(&self) -> Result<usize> {
        let ids: Vec<Uuid> = service_endpoints::Entity::find()
            .select_only()
            .column(service_endpoints::Column::Id)
            .filter(service_endpoints::Column::Status.is_in([
                EndpointStatus::Starting,
                EndpointStatus::Running,
                EndpointStatus::Error,
            ]))
            .into_tuple()
            .all(&self.db)
            .await?;

        for id in &ids {
            self.spawn_probe_loop(*id);
        }
        Ok(ids.len())
    }

    /// Serializes commands on one endpoint. Unknown ids fail before a lock
    /// entry is created for them.
    async fn lock_endpoint(&self, id: Uuid) -> Result<tokio::sync::OwnedMutexGuard<()>> {
        self.find(id).await?;
        Ok(self.lock_for(id).lock_owned().await)
    }

    fn lock_for(&self, id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(id)
            .or_default()
            .clone()
    }

    fn record_probe(&self, id: Uuid, healthy: bool) -> u32 {
        let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        let count = failures.entry(id).or_insert(0);
        if healthy {
            *count = 0;
        } else {
            *count = count.saturating_add(1);
        }
        *count
    }

    fn reset_failures(&self, id: Uuid) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }

    /// Runs one backend call bounded by the command timeout.
    async fn dispatch<F>(&self, call: F) -> std::result::Result<Option<EndpointStatus>, String>
    where
        F: Future<Output = anyhow::Result<Option<EndpointStatus>>>,
    {
        match tokio::time::timeout(self.settings.command_timeout, call).await {
            Ok(Ok(observed)) => Ok(observed),
            Ok(Err(e)) => Err(format!("{:#}", e)),
            Err(_) => Err(format!(
                "runtime backend did not answer within {:?}",
                self.settings.command_timeout
            )),
        }
    }

    /// Compare-and-set of the endpoint status. `allowed` is re-checked
    /// against the freshly read status on every attempt.
    async fn swap_status<F>(
        &self,
        id: Uuid,
        target: EndpointStatus,
        allowed: F,
    ) -> Result<(EndpointStatus, service_endpoints::Model)>
    where
        F: Fn(EndpointStatus) -> Result<()>,
    {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let current = self.find(id).await?;
            allowed(current.status)?;

            let now = Utc::now().fixed_offset();
            let result = service_endpoints::Entity::update_many()
                .set(service_endpoints::ActiveModel {
                    status: Set(target),
                    updated_at: Set(now),
                    ..Default::default()
                })
                .filter(service_endpoints::Column::Id.eq(id))
                .filter(service_endpoints::Column::Status.eq(current.status))
                .exec(&self.db)
                .await?;

            if result.rows_affected == 1 {
                let from = current.status;
                return Ok((
                    from,
                    service_endpoints::Model {
                        status: target,
                        updated_at: now,
                        ..current
                    },
                ));
            }
            log::debug!("Endpoint {} status moved underneath, retrying", id);
        }

        Err(ServiceError::Conflict(format!(
            "endpoint {} kept changing concurrently",
            id
        )))
    }

    /// Applies a status observed by the backend or a probe, if the table
    /// allows it, and follows it up to the owning version.
    async fn observe(
        &self,
        endpoint: &service_endpoints::Model,
        observed: EndpointStatus,
    ) -> Result<service_endpoints::Model> {
        if endpoint.status == observed || !endpoint.status.can_transition_to(observed) {
            return Ok(endpoint.clone());
        }

        let (from, updated) = self
            .swap_status(endpoint.id, observed, |current| {
                if current.can_transition_to(observed) {
                    Ok(())
                } else {
                    Err(ServiceError::invalid_transition(
                        "endpoint",
                        current.as_str(),
                        observed.as_str(),
                    ))
                }
            })
            .await?;
        log::info!(
            "Endpoint {} {} -> {}",
            updated.name,
            from.as_str(),
            observed.as_str()
        );

        if observed == EndpointStatus::Running {
            self.reset_failures(endpoint.id);
        }
        reconcile_deployment(&self.db, endpoint.version_id, observed).await?;
        Ok(updated)
    }

    fn spawn_probe_loop(&self, id: Uuid) {
        let Some(interval) = self.settings.probe_interval else {
            return;
        };
        let service = self.me.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // First tick completes immediately; give the runtime one interval
            ticker.tick().await;

            loop {
                ticker.tick().await;

                let Some(service) = service.upgrade() else {
                    break;
                };
                match service.find(id).await {
                    Ok(endpoint) if endpoint.status.is_probeable() => {}
                    Ok(endpoint) => {
                        log::debug!(
                            "Probe loop for {} exiting in {}",
                            endpoint.name,
                            endpoint.status.as_str()
                        );
                        break;
                    }
                    Err(ServiceError::NotFound { .. }) => break,
                    Err(e) => {
                        log::warn!("Probe loop for endpoint {} could not read it: {}", id, e);
                        continue;
                    }
                }
                if let Err(e) = service.health(id).await {
                    log::warn!("Health check of endpoint {} failed: {}", id, e);
                }
            }
        });

        let previous = self
            .probes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    fn cancel_probe(&self, id: Uuid) {
        let handle = self
            .probes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        if let Some(handle) = handle {
            handle.abort();
            log::debug!("Cancelled probe loop for endpoint {}", id);
        }
    }
}

impl Drop for EndpointService {
    fn drop(&mut self) {
        let probes = self.probes.get_mut().unwrap_or_else(PoisonError::into_inner);
        for (_, handle) in probes.drain() {
            handle.abort();
        }
    }
}

fn normalize_path(path: &str) -> String {
    let trimmed = path.trim();
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/predict"), "/predict");
        assert_eq!(normalize_path("health"), "/health");
        assert_eq!(normalize_path(""), "/");
    }

    #[test]
    fn test_overrides_parse_partial_sections() {
        let overrides: EndpointOverrides =
            serde_json::from_value(serde_json::json!({"protocol": "grpc", "port": 9000})).unwrap();
        assert_eq!(overrides.protocol, Some(Protocol::Grpc));
        assert_eq!(overrides.port, Some(9000));
        assert!(overrides.path.is_none());
    }
}
