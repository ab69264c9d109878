use crate::endpoint_service::EndpointService;
use crate::entity::{applications, application_versions, service_alerts, service_endpoints, service_monitoring};
use crate::error::{is_unique_violation, Result, ServiceError};
use chrono::{Duration, Utc};
use orbit_shared::{
    validate_components, AlertStatus, ApplicationFilter, ApplicationStatistics,
    ApplicationStatus, CreateApplication, EndpointStatus,
};
use sea_orm::sea_query::{Expr, ExprTrait, Func};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
};
use std::sync::Arc;
use uuid::Uuid;

const MAX_NAME_LEN: usize = 200;
const STATISTICS_WINDOW_DAYS: i64 = 7;
const MAX_CLONE_ATTEMPTS: u32 = 50;

/// Owns the coarse application lifecycle and the per-application rollup.
pub struct ApplicationService {
    db: DatabaseConnection,
    endpoints: Arc<EndpointService>,
}

impl ApplicationService {
    pub fn new(db: DatabaseConnection, endpoints: Arc<EndpointService>) -> Self {
        Self { db, endpoints }
    }

    pub async fn create(&self, request: CreateApplication) -> Result<applications::Model> {
        let name = request.name.trim().to_string();
        validate_name(&name)?;

        let components = request
            .components
            .unwrap_or_else(|| serde_json::json!({}));
        validate_components(request.app_type, &components).map_err(ServiceError::Validation)?;

        if request.dependencies.iter().any(|d| d.trim().is_empty()) {
            return Err(ServiceError::Validation(
                "dependencies must not contain empty names".to_string(),
            ));
        }

        let now = Utc::now().fixed_offset();
        let model = applications::ActiveModel {
            id: Set(Uuid::new_v4()),
            display_name: Set(request
                .display_name
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(|| name.clone())),
            name: Set(name.clone()),
            description: Set(request.description),
            app_type: Set(request.app_type),
            status: Set(ApplicationStatus::Draft),
            components: Set(components),
            dependencies: Set(serde_json::json!(request.dependencies)),
            view_count: Set(0),
            deployment_count: Set(0),
            created_by: Set(request.created_by),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let app = model.insert(&self.db).await.map_err(|e| {
            if is_unique_violation(&e) {
                ServiceError::UniqueConstraintViolation(format!("application '{}'", name))
            } else {
                e.into()
            }
        })?;

        log::info!("Created application {} ({})", app.name, app.id);
        Ok(app)
    }

    pub async fn list(&self, filter: &ApplicationFilter) -> Result<Vec<applications::Model>> {
        let mut query = applications::Entity::find();

        if let Some(app_type) = filter.app_type {
            query = query.filter(applications::Column::AppType.eq(app_type));
        }
        if let Some(status) = filter.status {
            query = query.filter(applications::Column::Status.eq(status));
        }
        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = format!("%{}%", search.to_lowercase());
            let mut any = Condition::any();
            for column in [
                applications::Column::Name,
                applications::Column::DisplayName,
                applications::Column::Description,
            ] {
                any = any.add(Expr::expr(Func::lower(Expr::col(column))).like(pattern.clone()));
            }
            query = query.filter(any);
        }

        Ok(query
            .order_by_desc(applications::Column::CreatedAt)
            .all(&self.db)
            .await?)
    }

    /// Reads one application and counts the view.
    pub async fn get(&self, id: Uuid) -> Result<applications::Model> {
        let result = applications::Entity::update_many()
            .col_expr(
                applications::Column::ViewCount,
                Expr::col(applications::Column::ViewCount).add(1),
            )
            .filter(applications::Column::Id.eq(id))
            .exec(&self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::not_found("application", id));
        }
        self.find(id).await
    }

    /// Reads without touching counters.
    pub async fn find(&self, id: Uuid) -> Result<applications::Model> {
        applications::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("application", id))
    }

    /// Removes the application with every version, endpoint, sample and alert
    /// beneath it. Probe loops of the removed endpoints are cancelled.
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let endpoint_ids = EndpointService::endpoint_ids_of_application(&self.db, id).await?;

        let result = applications::Entity::delete_by_id(id).exec(&self.db).await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::not_found("application", id));
        }

        for endpoint_id in &endpoint_ids {
            self.endpoints.forget(*endpoint_id);
        }
        log::info!(
            "Deleted application {} with {} endpoint(s)",
            id,
            endpoint_ids.len()
        );
        Ok(())
    }

    pub async fn change_status(
        &self,
        id: Uuid,
        target: ApplicationStatus,
    ) -> Result<applications::Model> {
        let app = self.find(id).await?;

        if !app.status.can_transition_to(target) {
            log::warn!(
                "Rejected application {} transition {} -> {}",
                id,
                app.status.as_str(),
                target.as_str()
            );
            return Err(ServiceError::invalid_transition(
                "application",
                app.status.as_str(),
                target.as_str(),
            ));
        }

        let now = Utc::now().fixed_offset();
        let result = applications::Entity::update_many()
            .set(applications::ActiveModel {
                status: Set(target),
                updated_at: Set(now),
                ..Default::default()
            })
            .filter(applications::Column::Id.eq(id))
            .filter(applications::Column::Status.eq(app.status))
            .exec(&self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::Conflict(format!(
                "application {} changed status concurrently",
                id
            )));
        }

        log::info!(
            "Application {} status {} -> {}",
            app.name,
            app.status.as_str(),
            target.as_str()
        );
        Ok(applications::Model {
            status: target,
            updated_at: now,
            ..app
        })
    }

    /// Copies the definition of an application into a new draft. Versions,
    /// endpoints and counters are not copied.
    pub async fn clone_application(
        &self,
        id: Uuid,
        created_by: Option<Uuid>,
    ) -> Result<applications::Model> {
        let source = self.find(id).await?;
        let now = Utc::now().fixed_offset();

        for attempt in 1..=MAX_CLONE_ATTEMPTS {
            let name = clone_name(&source.name, attempt);
            validate_name(&name)?;

            let model = applications::ActiveModel {
                id: Set(Uuid::new_v4()),
                name: Set(name.clone()),
                display_name: Set(format!("{} (copy)", source.display_name)),
                description: Set(source.description.clone()),
                app_type: Set(source.app_type),
                status: Set(ApplicationStatus::Draft),
                components: Set(source.components.clone()),
                dependencies: Set(source.dependencies.clone()),
                view_count: Set(0),
                deployment_count: Set(0),
                created_by: Set(created_by.or(source.created_by)),
                created_at: Set(now),
                updated_at: Set(now),
            };

            match model.insert(&self.db).await {
                Ok(copy) => {
                    log::info!("Cloned application {} into {}", source.name, copy.name);
                    return Ok(copy);
                }
                Err(e) if is_unique_violation(&e) => {
                    log::debug!("Clone name {} taken, trying next", name);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ServiceError::UniqueConstraintViolation(format!(
            "no free clone name for '{}'",
            source.name
        )))
    }

    pub async fn statistics(&self, id: Uuid) -> Result<ApplicationStatistics> {
        let app = self.find(id).await?;

        let versions_count = application_versions::Entity::find()
            .filter(application_versions::Column::ApplicationId.eq(id))
            .count(&self.db)
            .await?;

        let endpoint_ids = EndpointService::endpoint_ids_of_application(&self.db, id).await?;

        let mut stats = ApplicationStatistics {
            application_id: id,
            versions_count,
            active_endpoints: 0,
            avg_response_time: 0.0,
            total_requests: 0,
            active_alerts: 0,
            view_count: app.view_count,
            deployment_count: app.deployment_count,
        };
        if endpoint_ids.is_empty() {
            return Ok(stats);
        }

        stats.active_endpoints = service_endpoints::Entity::find()
            .filter(service_endpoints::Column::Id.is_in(endpoint_ids.clone()))
            .filter(service_endpoints::Column::Status.eq(EndpointStatus::Running))
            .count(&self.db)
            .await?;

        let since = (Utc::now() - Duration::days(STATISTICS_WINDOW_DAYS)).fixed_offset();
        let window: Option<(Option<f64>, i64)> = service_monitoring::Entity::find()
            .select_only()
            .column_as(Expr::cust("AVG(response_time)"), "avg_response_time")
            .column_as(
                Expr::cust("CAST(COALESCE(SUM(request_count), 0) AS BIGINT)"),
                "total_requests",
            )
            .filter(service_monitoring::Column::EndpointId.is_in(endpoint_ids.clone()))
            .filter(service_monitoring::Column::Timestamp.gte(since))
            .into_tuple()
            .one(&self.db)
            .await?;
        if let Some((avg, total)) = window {
            stats.avg_response_time = round2(avg.unwrap_or(0.0));
            stats.total_requests = total;
        }

        stats.active_alerts = service_alerts::Entity::find()
            .filter(service_alerts::Column::EndpointId.is_in(endpoint_ids))
            .filter(service_alerts::Column::Status.eq(AlertStatus::Active))
            .count(&self.db)
            .await?;

        Ok(stats)
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ServiceError::Validation("name must not be empty".to_string()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(ServiceError::Validation(format!(
            "name must be at most {} characters",
            MAX_NAME_LEN
        )));
    }
    Ok(())
}

fn clone_name(name: &str, attempt: u32) -> String {
    if attempt <= 1 {
        format!("{}_copy", name)
    } else {
        format!("{}_copy_{}", name, attempt)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_names() {
        assert_eq!(clone_name("demo", 1), "demo_copy");
        assert_eq!(clone_name("demo", 2), "demo_copy_2");
        assert_eq!(clone_name("demo", 3), "demo_copy_3");
    }

    #[test]
    fn test_name_validation() {
        assert!(validate_name("demo").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name(&"x".repeat(201)).is_err());
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(12.345_6), 12.35);
        assert_eq!(round2(0.0), 0.0);
    }
}
