use crate::query_validation::{MetricsQuery, MetricsQueryValidator, MonitoringQuery};
use actix_web::{web, HttpResponse, HttpResponseBuilder, Responder};
use orbit_services::service_endpoints::EndpointView;
use orbit_services::{Orchestrator, ServiceError};
use orbit_shared::{
    AcknowledgeRequest, AlertFilter, AlertRule, ApplicationFilter, BuildCompletion, ChangeStatus,
    CreateApplication, CreateVersion, DeployRequest, EndpointFilter, EndpointStatusReport,
    MonitoringSample, ScaleRequest,
};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub struct AppState {
    pub db: DatabaseConnection,
    pub orchestrator: Orchestrator,
    pub metrics_validator: MetricsQueryValidator,
}

#[derive(Debug, Default, Deserialize)]
pub struct CloneRequest {
    #[serde(default)]
    pub created_by: Option<Uuid>,
}

/// Maps a service failure to its HTTP status with a `{error, kind}` body.
pub fn error_response(err: &ServiceError) -> HttpResponse {
    let mut builder: HttpResponseBuilder = match err {
        ServiceError::NotFound { .. } => HttpResponse::NotFound(),
        ServiceError::Validation(_) => HttpResponse::BadRequest(),
        ServiceError::InvalidTransition { .. }
        | ServiceError::UniqueConstraintViolation(_)
        | ServiceError::Conflict(_) => HttpResponse::Conflict(),
        ServiceError::PreconditionFailed(_) => HttpResponse::PreconditionFailed(),
        ServiceError::Backpressure { .. } => HttpResponse::ServiceUnavailable(),
        ServiceError::Backend(_) => HttpResponse::BadGateway(),
        ServiceError::Database(_) => HttpResponse::InternalServerError(),
    };

    match err {
        ServiceError::Database(_) | ServiceError::Backend(_) => log::error!("{}", err),
        _ => log::debug!("Request failed: {}", err),
    }

    builder.json(serde_json::json!({
        "error": err.to_string(),
        "kind": err.kind(),
    }))
}

fn invalid_query(err: anyhow::Error) -> HttpResponse {
    HttpResponse::BadRequest().json(serde_json::json!({
        "error": format!("Invalid query parameters: {}", err),
        "kind": "validation_error",
    }))
}

fn respond<T: Serialize>(result: Result<T, ServiceError>) -> HttpResponse {
    match result {
        Ok(body) => HttpResponse::Ok().json(body),
        Err(e) => error_response(&e),
    }
}

fn created<T: Serialize>(result: Result<T, ServiceError>) -> HttpResponse {
    match result {
        Ok(body) => HttpResponse::Created().json(body),
        Err(e) => error_response(&e),
    }
}

/// Liveness, with a database round-trip
pub async fn health(state: web::Data<AppState>) -> impl Responder {
    match state.db.ping().await {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({
            "status": "ok",
            "ingest_pending": state.orchestrator.monitoring.pending(),
            "probe_loops": state.orchestrator.endpoints.active_probes(),
        })),
        Err(e) => {
            log::error!("Database ping failed: {}", e);
            HttpResponse::ServiceUnavailable().json(serde_json::json!({
                "status": "unavailable",
                "error": format!("Database not available: {}", e),
            }))
        }
    }
}

// ---- applications ----

pub async fn create_application(
    state: web::Data<AppState>,
    body: web::Json<CreateApplication>,
) -> impl Responder {
    created(state.orchestrator.applications.create(body.into_inner()).await)
}

pub async fn list_applications(
    state: web::Data<AppState>,
    query: web::Query<ApplicationFilter>,
) -> impl Responder {
    respond(state.orchestrator.applications.list(&query).await)
}

pub async fn get_application(state: web::Data<AppState>, path: web::Path<Uuid>) -> impl Responder {
    respond(state.orchestrator.applications.get(path.into_inner()).await)
}

pub async fn delete_application(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> impl Responder {
    match state.orchestrator.applications.delete(path.into_inner()).await {
        Ok(()) => HttpResponse::NoContent().finish(),
        Err(e) => error_response(&e),
    }
}

pub async fn change_application_status(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    body: web::Json<ChangeStatus>,
) -> impl Responder {
    respond(
        state
            .orchestrator
            .applications
            .change_status(path.into_inner(), body.status)
            .await,
    )
}

pub async fn clone_application(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    body: Option<web::Json<CloneRequest>>,
) -> impl Responder {
    let created_by = body.and_then(|b| b.into_inner().created_by);
    created(
        state
            .orchestrator
            .applications
            .clone_application(path.into_inner(), created_by)
            .await,
    )
}

pub async fn application_statistics(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> impl Responder {
    respond(state.orchestrator.applications.statistics(path.into_inner()).await)
}

// ---- versions ----

pub async fn create_version(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    body: web::Json<CreateVersion>,
) -> impl Responder {
    created(
        state
            .orchestrator
            .versions
            .create_version(path.into_inner(), body.into_inner())
            .await,
    )
}

pub async fn list_versions(state: web::Data<AppState>, path: web::Path<Uuid>) -> impl Responder {
    respond(state.orchestrator.versions.list_versions(path.into_inner()).await)
}

pub async fn build_version(state: web::Data<AppState>, path: web::Path<Uuid>) -> impl Responder {
    respond(state.orchestrator.versions.build(path.into_inner()).await)
}

pub async fn complete_build(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    body: web::Json<BuildCompletion>,
) -> impl Responder {
    respond(
        state
            .orchestrator
            .versions
            .complete_build(path.into_inner(), body.into_inner())
            .await,
    )
}

pub async fn deploy_version(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    body: web::Json<DeployRequest>,
) -> impl Responder {
    created(
        state
            .orchestrator
            .versions
            .deploy(path.into_inner(), body.into_inner())
            .await
            .map(EndpointView::from),
    )
}

pub async fn deprecate_version(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> impl Responder {
    respond(state.orchestrator.versions.deprecate(path.into_inner()).await)
}

pub async fn version_logs(state: web::Data<AppState>, path: web::Path<Uuid>) -> impl Responder {
    respond(state.orchestrator.versions.logs(path.into_inner()).await)
}

// ---- endpoints ----

pub async fn list_endpoints(
    state: web::Data<AppState>,
    query: web::Query<EndpointFilter>,
) -> impl Responder {
    respond(
        state
            .orchestrator
            .endpoints
            .list(&query)
            .await
            .map(|endpoints| endpoints.into_iter().map(EndpointView::from).collect::<Vec<_>>()),
    )
}

pub async fn get_endpoint(state: web::Data<AppState>, path: web::Path<Uuid>) -> impl Responder {
    respond(
        state
            .orchestrator
            .endpoints
            .find(path.into_inner())
            .await
            .map(EndpointView::from),
    )
}

pub async fn start_endpoint(state: web::Data<AppState>, path: web::Path<Uuid>) -> impl Responder {
    respond(state.orchestrator.endpoints.start(path.into_inner()).await)
}

pub async fn stop_endpoint(state: web::Data<AppState>, path: web::Path<Uuid>) -> impl Responder {
    respond(state.orchestrator.endpoints.stop(path.into_inner()).await)
}

pub async fn restart_endpoint(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> impl Responder {
    respond(state.orchestrator.endpoints.restart(path.into_inner()).await)
}

pub async fn scale_endpoint(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    body: web::Json<ScaleRequest>,
) -> impl Responder {
    respond(
        state
            .orchestrator
            .endpoints
            .scale(path.into_inner(), body.replicas)
            .await,
    )
}

/// Status callback from the runtime backend
pub async fn report_endpoint_status(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    body: web::Json<EndpointStatusReport>,
) -> impl Responder {
    let id = path.into_inner();
    let report = body.into_inner();
    if let Some(message) = &report.message {
        log::info!("Endpoint {} reported {}: {}", id, report.status.as_str(), message);
    }
    respond(
        state
            .orchestrator
            .endpoints
            .report_status(id, report.status)
            .await
            .map(EndpointView::from),
    )
}

pub async fn endpoint_health(state: web::Data<AppState>, path: web::Path<Uuid>) -> impl Responder {
    respond(state.orchestrator.endpoints.health(path.into_inner()).await)
}

pub async fn endpoint_metrics(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    query: web::Query<MetricsQuery>,
) -> impl Responder {
    let window = match state.metrics_validator.validate(&query) {
        Ok(window) => window,
        Err(e) => return invalid_query(e),
    };

    respond(
        state
            .orchestrator
            .endpoints
            .metrics(path.into_inner(), window.from, window.to, Some(window.limit))
            .await,
    )
}

// ---- monitoring ----

pub async fn ingest_sample(
    state: web::Data<AppState>,
    body: web::Json<MonitoringSample>,
) -> impl Responder {
    let monitoring = &state.orchestrator.monitoring;
    match monitoring.ingest(body.into_inner()) {
        Ok(()) => HttpResponse::Accepted().json(serde_json::json!({
            "accepted": true,
            "pending": monitoring.pending(),
        })),
        Err(e) => error_response(&e),
    }
}

/// Stored samples, optionally narrowed to one endpoint
pub async fn list_samples(
    state: web::Data<AppState>,
    query: web::Query<MonitoringQuery>,
) -> impl Responder {
    let window = match state.metrics_validator.validate(&query.window()) {
        Ok(window) => window,
        Err(e) => return invalid_query(e),
    };

    respond(
        state
            .orchestrator
            .monitoring
            .samples(query.endpoint, window.from, window.to, Some(window.limit))
            .await,
    )
}

pub async fn monitoring_summary(state: web::Data<AppState>) -> impl Responder {
    respond(state.orchestrator.monitoring.latest_summary().await)
}

// ---- alerts ----

pub async fn list_alerts(
    state: web::Data<AppState>,
    query: web::Query<AlertFilter>,
) -> impl Responder {
    respond(state.orchestrator.alerts.list(&query).await)
}

pub async fn get_alert(state: web::Data<AppState>, path: web::Path<Uuid>) -> impl Responder {
    respond(state.orchestrator.alerts.find(path.into_inner()).await)
}

pub async fn alert_dashboard(state: web::Data<AppState>) -> impl Responder {
    respond(state.orchestrator.alerts.dashboard().await)
}

pub async fn acknowledge_alert(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    body: web::Json<AcknowledgeRequest>,
) -> impl Responder {
    respond(
        state
            .orchestrator
            .alerts
            .acknowledge(path.into_inner(), body.user_id)
            .await,
    )
}

pub async fn resolve_alert(state: web::Data<AppState>, path: web::Path<Uuid>) -> impl Responder {
    respond(state.orchestrator.alerts.resolve(path.into_inner()).await)
}

pub async fn ignore_alert(state: web::Data<AppState>, path: web::Path<Uuid>) -> impl Responder {
    respond(state.orchestrator.alerts.ignore(path.into_inner()).await)
}

pub async fn list_rules(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(state.orchestrator.alerts.rules())
}

pub async fn register_rule(
    state: web::Data<AppState>,
    body: web::Json<AlertRule>,
) -> impl Responder {
    created(state.orchestrator.alerts.register_rule(body.into_inner()))
}

pub async fn remove_rule(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    match state.orchestrator.alerts.remove_rule(&path.into_inner()) {
        Ok(()) => HttpResponse::NoContent().finish(),
        Err(e) => error_response(&e),
    }
}
