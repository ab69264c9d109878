use crate::backend::{BuildJob, BuildSystem};
use crate::endpoint_service::{EndpointService, MAX_REPLICAS, MIN_REPLICAS};
use crate::entity::{application_versions, applications, service_endpoints};
use crate::error::{is_unique_violation, Result, ServiceError};
use chrono::Utc;
use orbit_shared::{BuildCompletion, BuildLogs, CreateVersion, DeployRequest, EndpointStatus, VersionStatus};
use sea_orm::sea_query::{Expr, ExprTrait};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr,
    EntityTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use std::sync::Arc;
use uuid::Uuid;

const MAX_VERSION_LEN: usize = 50;
const MAX_CAS_ATTEMPTS: usize = 8;

/// Build and deploy pipeline of application versions.
pub struct VersionService {
    db: DatabaseConnection,
    endpoints: Arc<EndpointService>,
    builder: Arc<dyn BuildSystem>,
}

impl VersionService {
    pub fn new(
        db: DatabaseConnection,
        endpoints: Arc<EndpointService>,
        builder: Arc<dyn BuildSystem>,
    ) -> Self {
        Self {
            db,
            endpoints,
            builder,
        }
    }

    pub async fn create_version(
        &self,
        application_id: Uuid,
        request: CreateVersion,
    ) -> Result<application_versions::Model> {
        let version = request.version.trim().to_string();
        if version.is_empty() || version.len() > MAX_VERSION_LEN {
            return Err(ServiceError::Validation(format!(
                "version must be 1..={} characters",
                MAX_VERSION_LEN
            )));
        }

        let config = request.config.unwrap_or_else(|| serde_json::json!({}));
        if !config.is_object() {
            return Err(ServiceError::Validation("config must be an object".to_string()));
        }
        let manifest = request.manifest.unwrap_or_else(|| serde_json::json!({}));

        // FK errors are opaque across backends, so check the owner up front
        applications::Entity::find_by_id(application_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("application", application_id))?;

        let model = application_versions::ActiveModel {
            id: Set(Uuid::new_v4()),
            application_id: Set(application_id),
            version: Set(version.clone()),
            description: Set(request.description),
            config: Set(config),
            dockerfile: Set(request.dockerfile),
            manifest: Set(manifest),
            image_url: Set(None),
            status: Set(VersionStatus::Building),
            build_log: Set(String::new()),
            created_by: Set(request.created_by),
            created_at: Set(Utc::now().fixed_offset()),
        };

        let created = model.insert(&self.db).await.map_err(|e| {
            if is_unique_violation(&e) {
                ServiceError::UniqueConstraintViolation(format!(
                    "version '{}' of application {}",
                    version, application_id
                ))
            } else {
                e.into()
            }
        })?;

        log::info!("Created version {} of application {}", created.version, application_id);
        Ok(created)
    }

    pub async fn list_versions(&self, application_id: Uuid) -> Result<Vec<application_versions::Model>> {
        applications::Entity::find_by_id(application_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("application", application_id))?;

        Ok(application_versions::Entity::find()
            .filter(application_versions::Column::ApplicationId.eq(application_id))
            .order_by_desc(application_versions::Column::CreatedAt)
            .all(&self.db)
            .await?)
    }

    pub async fn find(&self, id: Uuid) -> Result<application_versions::Model> {
        application_versions::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("version", id))
    }

    /// Moves the version to `building` and hands it to the build system.
    /// Completion arrives later through [`VersionService::complete_build`].
    pub async fn build(&self, id: Uuid) -> Result<application_versions::Model> {
        let version = self
            .update_with(id, |current| {
                if !current.status.can_transition_to(VersionStatus::Building) {
                    return Err(ServiceError::invalid_transition(
                        "version",
                        current.status.as_str(),
                        VersionStatus::Building.as_str(),
                    ));
                }
                Ok((VersionStatus::Building, Some("build requested".to_string()), None))
            })
            .await?;

        let app = applications::Entity::find_by_id(version.application_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("application", version.application_id))?;

        let job = BuildJob {
            version_id: version.id,
            application_id: app.id,
            application_name: app.name.clone(),
            version: version.version.clone(),
            dockerfile: version.dockerfile.clone(),
            config: version.config.clone(),
            manifest: version.manifest.clone(),
            callback_path: format!("/api/versions/{}/build/complete", version.id),
        };

        match self.builder.submit(&job).await {
            Ok(line) => {
                log::info!("Build submitted for {}:{}", app.name, version.version);
                self.update_with(id, |current| Ok((current.status, Some(line.clone()), None)))
                    .await
            }
            Err(e) => {
                log::error!("Build submission for version {} failed: {:#}", id, e);
                let message = format!("build submission failed: {:#}", e);
                self.update_with(id, |current| {
                    if current.status == VersionStatus::Building {
                        Ok((VersionStatus::BuildFailed, Some(message.clone()), None))
                    } else {
                        Ok((current.status, Some(message.clone()), None))
                    }
                })
                .await?;
                Err(ServiceError::Backend(message))
            }
        }
    }

    /// Builder callback: `building -> ready | build_failed` with a log tail.
    pub async fn complete_build(
        &self,
        id: Uuid,
        completion: BuildCompletion,
    ) -> Result<application_versions::Model> {
        let target = if completion.success {
            VersionStatus::Ready
        } else {
            VersionStatus::BuildFailed
        };
        let tail = completion.log.trim_end().to_string();

        let updated = self
            .update_with(id, |current| {
                if current.status != VersionStatus::Building || !current.status.can_transition_to(target) {
                    return Err(ServiceError::invalid_transition(
                        "version",
                        current.status.as_str(),
                        target.as_str(),
                    ));
                }
                let line = if tail.is_empty() {
                    format!("build finished: {}", target.as_str())
                } else {
                    tail.clone()
                };
                Ok((target, Some(line), completion.image_url.clone()))
            })
            .await?;

        log::info!("Version {} build completed: {}", id, target.as_str());
        Ok(updated)
    }

    /// Creates the endpoint, bumps the application's deployment counter and
    /// moves the version to `deploying`, all in one transaction. The start
    /// command is dispatched after commit.
    pub async fn deploy(&self, id: Uuid, request: DeployRequest) -> Result<service_endpoints::Model> {
        let version = self.find(id).await?;
        if version.status != VersionStatus::Ready {
            return Err(ServiceError::PreconditionFailed(format!(
                "version {} is {}, only ready versions can be deployed",
                version.version,
                version.status.as_str()
            )));
        }
        if !(MIN_REPLICAS..=MAX_REPLICAS).contains(&request.replicas) {
            return Err(ServiceError::Validation(format!(
                "replicas must be between {} and {}, got {}",
                MIN_REPLICAS, MAX_REPLICAS, request.replicas
            )));
        }
        if request.env_vars.keys().any(|k| k.trim().is_empty()) {
            return Err(ServiceError::Validation(
                "environment variable names must not be empty".to_string(),
            ));
        }

        let app = applications::Entity::find_by_id(version.application_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("application", version.application_id))?;

        let txn = self.db.begin().await?;

        let claimed = application_versions::Entity::update_many()
            .set(application_versions::ActiveModel {
                status: Set(VersionStatus::Deploying),
                ..Default::default()
            })
            .filter(application_versions::Column::Id.eq(id))
            .filter(application_versions::Column::Status.eq(VersionStatus::Ready))
            .exec(&txn)
            .await?;
        if claimed.rows_affected == 0 {
            txn.rollback().await?;
            return Err(ServiceError::PreconditionFailed(format!(
                "version {} is no longer ready",
                version.version
            )));
        }

        applications::Entity::update_many()
            .col_expr(
                applications::Column::DeploymentCount,
                Expr::col(applications::Column::DeploymentCount).add(1),
            )
            .filter(applications::Column::Id.eq(app.id))
            .exec(&txn)
            .await?;

        let endpoint = self.endpoints.create_in(&txn, &version, &app, &request).await?;

        txn.commit().await?;
        log::info!(
            "Deploying {}:{} as endpoint {} ({} replicas)",
            app.name,
            version.version,
            endpoint.id,
            endpoint.replicas
        );

        Ok(self.endpoints.launch(endpoint).await)
    }

    pub async fn deprecate(&self, id: Uuid) -> Result<application_versions::Model> {
        self.update_with(id, |current| {
            if !current.status.can_transition_to(VersionStatus::Deprecated) {
                return Err(ServiceError::invalid_transition(
                    "version",
                    current.status.as_str(),
                    VersionStatus::Deprecated.as_str(),
                ));
            }
            Ok((VersionStatus::Deprecated, None, None))
        })
        .await
    }

    pub async fn logs(&self, id: Uuid) -> Result<BuildLogs> {
        let version = self.find(id).await?;
        Ok(BuildLogs {
            version_id: version.id,
            status: version.status,
            logs: version.build_log,
        })
    }

    /// Optimistic read-check-write on one version. `decide` sees the current
    /// row and returns the new status, a line to append to the build log and
    /// an optional image url; the write only lands if neither status nor log
    /// changed in between.
    async fn update_with<F>(&self, id: Uuid, decide: F) -> Result<application_versions::Model>
    where
        F: Fn(&application_versions::Model) -> Result<(VersionStatus, Option<String>, Option<String>)>,
    {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let current = self.find(id).await?;
            let (status, line, image_url) = decide(&current)?;

            let build_log = match &line {
                Some(line) => append_log(&current.build_log, line),
                None => current.build_log.clone(),
            };
            let image_url = image_url.or_else(|| current.image_url.clone());

            let result = application_versions::Entity::update_many()
                .set(application_versions::ActiveModel {
                    status: Set(status),
                    build_log: Set(build_log.clone()),
                    image_url: Set(image_url.clone()),
                    ..Default::default()
                })
                .filter(application_versions::Column::Id.eq(id))
                .filter(application_versions::Column::Status.eq(current.status))
                .filter(application_versions::Column::BuildLog.eq(current.build_log.clone()))
                .exec(&self.db)
                .await?;

            if result.rows_affected == 1 {
                if status != current.status {
                    log::info!(
                        "Version {} status {} -> {}",
                        id,
                        current.status.as_str(),
                        status.as_str()
                    );
                }
                return Ok(application_versions::Model {
                    status,
                    build_log,
                    image_url,
                    ..current
                });
            }
            log::debug!("Version {} changed underneath update, retrying", id);
        }

        Err(ServiceError::Conflict(format!(
            "version {} kept changing concurrently",
            id
        )))
    }
}

fn append_log(log: &str, line: &str) -> String {
    let stamp = Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
    let mut out = String::with_capacity(log.len() + line.len() + 24);
    out.push_str(log);
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(&format!("[{}] {}\n", stamp, line));
    out
}

/// Follows an endpoint status change up to its version: the first endpoint
/// to reach `running` marks a deploying version `deployed`, one entering
/// `error` marks it `failed`.
pub(crate) async fn reconcile_deployment<C: ConnectionTrait>(
    db: &C,
    version_id: Uuid,
    observed: EndpointStatus,
) -> std::result::Result<(), DbErr> {
    let target = match observed {
        EndpointStatus::Running => VersionStatus::Deployed,
        EndpointStatus::Error => VersionStatus::Failed,
        _ => return Ok(()),
    };

    let result = application_versions::Entity::update_many()
        .set(application_versions::ActiveModel {
            status: Set(target),
            ..Default::default()
        })
        .filter(application_versions::Column::Id.eq(version_id))
        .filter(application_versions::Column::Status.eq(VersionStatus::Deploying))
        .exec(db)
        .await?;

    if result.rows_affected == 1 {
        log::info!("Version {} deploying -> {}", version_id, target.as_str());
    }
    Ok(())
}
