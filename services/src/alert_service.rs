use crate::cache_service::CacheService;
use crate::entity::{service_alerts, service_endpoints};
use crate::error::{is_unique_violation, Result, ServiceError};
use anyhow::Context;
use chrono::{Duration as ChronoDuration, Utc};
use orbit_shared::{
    AlertDashboard, AlertFilter, AlertLevel, AlertRule, AlertStatus, MonitoringSample,
    ProblemEndpoint,
};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use uuid::Uuid;

const DASHBOARD_CACHE_KEY: &str = "alerts:dashboard";
const PROBLEM_ENDPOINTS: usize = 5;

/// Alert rules, the per-(endpoint, rule) alert state machine and the
/// dashboard rollup.
///
/// At most one open alert exists per (endpoint, rule). The store enforces it
/// with a partial unique index, so two samples racing to open the same alert
/// end with one row and one ignored insert.
pub struct AlertService {
    db: DatabaseConnection,
    cache: Arc<CacheService>,
    dashboard_ttl: Duration,
    rules: RwLock<BTreeMap<String, AlertRule>>,
}

impl AlertService {
    pub fn new(
        db: DatabaseConnection,
        cache: Arc<CacheService>,
        rules: Vec<AlertRule>,
        dashboard_ttl: Duration,
    ) -> Self {
        let rules = rules.into_iter().map(|r| (r.name.clone(), r)).collect();
        Self {
            db,
            cache,
            dashboard_ttl,
            rules: RwLock::new(rules),
        }
    }

    /// Reads a JSON array of rules, validating each one.
    pub fn rules_from_file(path: &Path) -> anyhow::Result<Vec<AlertRule>> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read alert rules from {}", path.display()))?;
        let rules: Vec<AlertRule> = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse alert rules in {}", path.display()))?;
        for rule in &rules {
            rule.validate()
                .map_err(|e| anyhow::anyhow!("Rule '{}' is invalid: {}", rule.name, e))?;
        }
        Ok(rules)
    }

    pub fn rules(&self) -> Vec<AlertRule> {
        self.rules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Adds or replaces a rule by name.
    pub fn register_rule(&self, rule: AlertRule) -> Result<AlertRule> {
        rule.validate().map_err(ServiceError::Validation)?;
        let replaced = self
            .rules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(rule.name.clone(), rule.clone());
        log::info!(
            "{} alert rule {}: {}",
            if replaced.is_some() { "Replaced" } else { "Registered" },
            rule.name,
            rule.condition.describe()
        );
        Ok(rule)
    }

    /// Open alerts raised by a removed rule stay as they are.
    pub fn remove_rule(&self, name: &str) -> Result<()> {
        let removed = self
            .rules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
        match removed {
            Some(_) => {
                log::info!("Removed alert rule {}", name);
                Ok(())
            }
            None => Err(ServiceError::not_found("alert rule", name)),
        }
    }

    /// Evaluates a sample against the registered rules.
    pub async fn evaluate(&self, sample: &MonitoringSample) -> Result<Vec<service_alerts::Model>> {
        let rules = self.rules();
        self.evaluate_with(sample, &rules).await
    }

    /// Opens an alert for every enabled rule the sample breaches, unless one
    /// is already open for that (endpoint, rule). Returns the alerts opened
    /// by this call.
    pub async fn evaluate_with(
        &self,
        sample: &MonitoringSample,
        rules: &[AlertRule],
    ) -> Result<Vec<service_alerts::Model>> {
        let mut opened = Vec::new();

        for rule in rules.iter().filter(|r| r.enabled) {
            let Some(observed) = rule.condition.breached_by(sample) else {
                continue;
            };

            let model = service_alerts::ActiveModel {
                id: Set(Uuid::new_v4()),
                endpoint_id: Set(sample.endpoint_id),
                title: Set(rule.title()),
                message: Set(format!(
                    "{} (observed {:.2})",
                    rule.condition.describe(),
                    observed
                )),
                level: Set(rule.level),
                status: Set(AlertStatus::Active),
                rule_name: Set(rule.name.clone()),
                condition: Set(serde_json::to_value(&rule.condition)
                    .map_err(|e| ServiceError::Validation(e.to_string()))?),
                triggered_at: Set(Utc::now().fixed_offset()),
                resolved_at: Set(None),
                acknowledged_at: Set(None),
                acknowledged_by: Set(None),
            };

            match model.insert(&self.db).await {
                Ok(alert) => {
                    log::info!(
                        "Opened {} alert {} on endpoint {}: {}",
                        alert.level.as_str(),
                        alert.rule_name,
                        alert.endpoint_id,
                        alert.message
                    );
                    opened.push(alert);
                }
                Err(e) if is_unique_violation(&e) => {
                    log::debug!(
                        "Alert {} already open on endpoint {}",
                        rule.name,
                        sample.endpoint_id
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        if !opened.is_empty() {
            self.invalidate_dashboard().await;
        }
        Ok(opened)
    }

    pub async fn find(&self, id: Uuid) -> Result<service_alerts::Model> {
        service_alerts::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("alert", id))
    }

    pub async fn list(&self, filter: &AlertFilter) -> Result<Vec<service_alerts::Model>> {
        let mut query = service_alerts::Entity::find();
        if let Some(level) = filter.level {
            query = query.filter(service_alerts::Column::Level.eq(level));
        }
        if let Some(status) = filter.status {
            query = query.filter(service_alerts::Column::Status.eq(status));
        }
        if let Some(endpoint_id) = filter.endpoint {
            query = query.filter(service_alerts::Column::EndpointId.eq(endpoint_id));
        }

        Ok(query
            .order_by_desc(service_alerts::Column::TriggeredAt)
            .all(&self.db)
            .await?)
    }

    pub async fn acknowledge(&self, id: Uuid, user_id: Uuid) -> Result<service_alerts::Model> {
        let now = Utc::now().fixed_offset();
        self.transition(
            id,
            AlertStatus::Acknowledged,
            service_alerts::ActiveModel {
                acknowledged_at: Set(Some(now)),
                acknowledged_by: Set(Some(user_id)),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn resolve(&self, id: Uuid) -> Result<service_alerts::Model> {
        self.transition(
            id,
            AlertStatus::Resolved,
            service_alerts::ActiveModel {
                resolved_at: Set(Some(Utc::now().fixed_offset())),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn ignore(&self, id: Uuid) -> Result<service_alerts::Model> {
        self.transition(
            id,
            AlertStatus::Ignored,
            service_alerts::ActiveModel {
                ..Default::default()
            },
        )
        .await
    }

    async fn transition(
        &self,
        id: Uuid,
        target: AlertStatus,
        mut changes: service_alerts::ActiveModel,
    ) -> Result<service_alerts::Model> {
        let alert = self.find(id).await?;
        if !alert.status.can_transition_to(target) {
            log::warn!(
                "Rejected alert {} transition {} -> {}",
                id,
                alert.status.as_str(),
                target.as_str()
            );
            return Err(ServiceError::invalid_transition(
                "alert",
                alert.status.as_str(),
                target.as_str(),
            ));
        }

        changes.status = Set(target);
        let result = service_alerts::Entity::update_many()
            .set(changes)
            .filter(service_alerts::Column::Id.eq(id))
            .filter(service_alerts::Column::Status.eq(alert.status))
            .exec(&self.db)
            .await?;
        if result.rows_affected == 0 {
            // Lost to a concurrent transition; report against what won
            let current = self.find(id).await?;
            return Err(ServiceError::invalid_transition(
                "alert",
                current.status.as_str(),
                target.as_str(),
            ));
        }

        log::info!(
            "Alert {} ({}) {} -> {}",
            id,
            alert.rule_name,
            alert.status.as_str(),
            target.as_str()
        );
        self.invalidate_dashboard().await;
        self.find(id).await
    }

    /// Active alerts per level, alerts raised in the last 24 hours and the
    /// endpoints with the most active alerts.
    pub async fn dashboard(&self) -> Result<AlertDashboard> {
        match self.cache.get::<AlertDashboard>(DASHBOARD_CACHE_KEY).await {
            Ok(Some(cached)) => return Ok(cached),
            Ok(None) => {}
            Err(e) => log::warn!("Dashboard cache read failed: {}", e),
        }

        let dashboard = self.compute_dashboard().await?;

        if let Err(e) = self
            .cache
            .set(DASHBOARD_CACHE_KEY, &dashboard, self.dashboard_ttl)
            .await
        {
            log::warn!("Dashboard cache write failed: {}", e);
        }
        Ok(dashboard)
    }

    async fn compute_dashboard(&self) -> Result<AlertDashboard> {
        let active: Vec<(Uuid, AlertLevel)> = service_alerts::Entity::find()
            .select_only()
            .column(service_alerts::Column::EndpointId)
            .column(service_alerts::Column::Level)
            .filter(service_alerts::Column::Status.eq(AlertStatus::Active))
            .into_tuple()
            .all(&self.db)
            .await?;

        let mut level_stats: BTreeMap<AlertLevel, u64> =
            AlertLevel::ALL.iter().map(|level| (*level, 0)).collect();
        let mut per_endpoint: HashMap<Uuid, u64> = HashMap::new();
        for (endpoint_id, level) in &active {
            *level_stats.entry(*level).or_insert(0) += 1;
            *per_endpoint.entry(*endpoint_id).or_insert(0) += 1;
        }

        let mut ranked: Vec<(Uuid, u64)> = per_endpoint.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.truncate(PROBLEM_ENDPOINTS);

        let names: HashMap<Uuid, String> = if ranked.is_empty() {
            HashMap::new()
        } else {
            service_endpoints::Entity::find()
                .filter(service_endpoints::Column::Id.is_in(ranked.iter().map(|(id, _)| *id)))
                .all(&self.db)
                .await?
                .into_iter()
                .map(|e| (e.id, e.name))
                .collect()
        };

        let problem_endpoints = ranked
            .into_iter()
            .map(|(endpoint_id, alert_count)| ProblemEndpoint {
                endpoint_id,
                endpoint_name: names.get(&endpoint_id).cloned().unwrap_or_default(),
                alert_count,
            })
            .collect();

        let since = (Utc::now() - ChronoDuration::hours(24)).fixed_offset();
        let recent_alerts_24h = service_alerts::Entity::find()
            .filter(service_alerts::Column::TriggeredAt.gte(since))
            .count(&self.db)
            .await?;

        Ok(AlertDashboard {
            level_stats,
            recent_alerts_24h,
            problem_endpoints,
            generated_at: Utc::now(),
        })
    }

    async fn invalidate_dashboard(&self) {
        if let Err(e) = self.cache.delete(DASHBOARD_CACHE_KEY).await {
            log::warn!("Dashboard cache invalidation failed: {}", e);
        }
    }
}
