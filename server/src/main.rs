mod config;
mod handlers;
mod query_validation;
mod routes;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use config::Config;
use handlers::AppState;
use orbit_services::{
    create_connection, AlertService, BuildSystem, CacheService, DockerRuntime, LoggingBuildSystem,
    Orchestrator, WebhookBuildSystem,
};
use orbit_shared::AlertRule;
use query_validation::MetricsQueryValidator;
use std::sync::Arc;
use std::time::Duration;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = Config::from_env();

    log::info!("Starting orbit server on {}:{}", config.server_host, config.server_port);

    let db = create_connection(&config.database_url)
        .await
        .expect("Failed to connect to database");
    log::info!("Database connection established");
    log::info!("Note: Run migrations with 'cargo run -p migration -- up' if not already done");

    // Redis is optional; the dashboard is computed on every request without it
    let cache_service = Arc::new(
        CacheService::new(config.redis_url.clone()).unwrap_or_else(|e| {
            log::warn!("Failed to initialize Redis cache: {}. Continuing without cache.", e);
            CacheService::disabled()
        }),
    );
    if cache_service.is_enabled() {
        log::info!("Redis cache enabled");
    }

    let command_timeout = Duration::from_secs(config.command_timeout);
    let runtime = Arc::new(
        DockerRuntime::new(command_timeout)
            .await
            .expect("Failed to initialize runtime backend"),
    );
    if runtime.is_connected() {
        log::info!("Docker runtime connected");
    }

    let builder: Arc<dyn BuildSystem> = match &config.build_webhook_url {
        Some(url) => {
            log::info!("Submitting builds to {}", url);
            Arc::new(
                WebhookBuildSystem::new(url.clone(), command_timeout)
                    .expect("Failed to initialize build webhook"),
            )
        }
        None => {
            log::info!("No BUILD_WEBHOOK_URL set, builds wait for external callbacks");
            Arc::new(LoggingBuildSystem)
        }
    };

    let rules = match &config.alert_rules_path {
        Some(path) => AlertService::rules_from_file(path).expect("Failed to load alert rules"),
        None => AlertRule::defaults(),
    };
    log::info!("Loaded {} alert rules", rules.len());

    let (orchestrator, ingest_worker) = Orchestrator::new(
        db.clone(),
        runtime,
        builder,
        cache_service,
        rules,
        config.orchestrator(),
    );

    tokio::spawn(ingest_worker.run());
    tokio::spawn(
        orchestrator
            .monitoring
            .clone()
            .run_retention(Duration::from_secs(config.retention_sweep_interval)),
    );

    match orchestrator.endpoints.resume_probes().await {
        Ok(count) => log::info!("Resumed health probes for {} endpoints", count),
        Err(e) => log::error!("Failed to resume health probes: {}", e),
    }

    let app_state = web::Data::new(AppState {
        db,
        orchestrator,
        metrics_validator: MetricsQueryValidator::new(
            config.max_query_range_days,
            config.max_query_results,
        ),
    });

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_method()
            .allow_any_origin()
            .allow_any_header();

        App::new()
            .wrap(cors)
            .app_data(app_state.clone())
            .configure(routes::configure)
    })
    .bind(format!("{}:{}", config.server_host, config.server_port))?
    .run()
    .await
}
