use crate::handlers;
use actix_web::web;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        .route("/health", web::get().to(handlers::health))

        // Application registry
        .route("/api/applications", web::post().to(handlers::create_application))
        .route("/api/applications", web::get().to(handlers::list_applications))
        .route("/api/applications/{id}", web::get().to(handlers::get_application))
        .route("/api/applications/{id}", web::delete().to(handlers::delete_application))
        .route(
            "/api/applications/{id}/status",
            web::post().to(handlers::change_application_status),
        )
        .route(
            "/api/applications/{id}/clone",
            web::post().to(handlers::clone_application),
        )
        .route(
            "/api/applications/{id}/statistics",
            web::get().to(handlers::application_statistics),
        )
        .route(
            "/api/applications/{id}/versions",
            web::post().to(handlers::create_version),
        )
        .route(
            "/api/applications/{id}/versions",
            web::get().to(handlers::list_versions),
        )

        // Version pipeline
        .route("/api/versions/{id}/build", web::post().to(handlers::build_version))
        .route(
            "/api/versions/{id}/build/complete",
            web::post().to(handlers::complete_build),
        )
        .route("/api/versions/{id}/deploy", web::post().to(handlers::deploy_version))
        .route(
            "/api/versions/{id}/deprecate",
            web::post().to(handlers::deprecate_version),
        )
        .route("/api/versions/{id}/logs", web::get().to(handlers::version_logs))

        // Endpoint runtime
        .route("/api/endpoints", web::get().to(handlers::list_endpoints))
        .route("/api/endpoints/{id}", web::get().to(handlers::get_endpoint))
        .route("/api/endpoints/{id}/start", web::post().to(handlers::start_endpoint))
        .route("/api/endpoints/{id}/stop", web::post().to(handlers::stop_endpoint))
        .route("/api/endpoints/{id}/restart", web::post().to(handlers::restart_endpoint))
        .route("/api/endpoints/{id}/scale", web::post().to(handlers::scale_endpoint))
        .route(
            "/api/endpoints/{id}/status",
            web::post().to(handlers::report_endpoint_status),
        )
        .route("/api/endpoints/{id}/health", web::get().to(handlers::endpoint_health))
        .route("/api/endpoints/{id}/metrics", web::get().to(handlers::endpoint_metrics))

        // Monitoring ingest
        .route("/api/monitoring", web::post().to(handlers::ingest_sample))
        .route("/api/monitoring", web::get().to(handlers::list_samples))
        .route("/api/monitoring/summary", web::get().to(handlers::monitoring_summary))

        // Alert engine; fixed paths before /{id}
        .route("/api/alerts", web::get().to(handlers::list_alerts))
        .route("/api/alerts/dashboard", web::get().to(handlers::alert_dashboard))
        .route("/api/alerts/rules", web::get().to(handlers::list_rules))
        .route("/api/alerts/rules", web::post().to(handlers::register_rule))
        .route("/api/alerts/rules/{name}", web::delete().to(handlers::remove_rule))
        .route("/api/alerts/{id}", web::get().to(handlers::get_alert))
        .route(
            "/api/alerts/{id}/acknowledge",
            web::post().to(handlers::acknowledge_alert),
        )
        .route("/api/alerts/{id}/resolve", web::post().to(handlers::resolve_alert))
        .route("/api/alerts/{id}/ignore", web::post().to(handlers::ignore_alert));
}
