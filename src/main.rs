//! Anime Catalog API Server
//!
//! Main entry point for the anime catalog REST API service.

use std::io;
use std::time::Duration;

use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use anime_catalog::auth::AuthConfig;
use anime_catalog::config::Config;
use anime_catalog::db::Database;
use anime_catalog::email::EmailService;
use anime_catalog::routes::{configure_routes, ApiDoc, AppState};
use anime_catalog::service::{spawn_cleanup_task, UserCache, UserService};

/// Health check endpoint
async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Database health check endpoint
async fn db_health_check(data: web::Data<AppState>) -> impl Responder {
    match data.db.health_check().await {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({
            "status": "healthy",
            "database": "connected",
            "timestamp": chrono::Utc::now().to_rfc3339()
        })),
        Err(e) => {
            error!("Database health check failed: {}", e);
            HttpResponse::ServiceUnavailable().json(serde_json::json!({
                "status": "unhealthy",
                "database": "disconnected",
                "error": e.to_string(),
                "timestamp": chrono::Utc::now().to_rfc3339()
            }))
        }
    }
}

fn startup_error(context: &str, e: impl std::fmt::Display) -> io::Error {
    error!("{}: {}", context, e);
    io::Error::other(format!("{}: {}", context, e))
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().map_err(|e| startup_error("Invalid configuration", e))?;
    let bind_address = format!("{}:{}", config.host, config.port);

    info!("Connecting to database...");
    let db = Database::new(&config.database_url)
        .await
        .map_err(|e| startup_error("Failed to connect to database", e))?;

    info!("Running database migrations...");
    db.run_migrations()
        .await
        .map_err(|e| startup_error("Failed to run database migrations", e))?;

    info!("Database connected and migrations complete");

    let cache = UserCache::new(
        config.user_cache_capacity,
        Duration::from_secs(config.user_cache_ttl_seconds),
    );
    let user_service = UserService::new(db.clone(), cache);

    let email_service = match config.smtp.clone() {
        Some(smtp) => match EmailService::new(smtp, config.base_url.clone()) {
            Ok(service) => Some(service),
            Err(e) => {
                warn!("Email service could not be created, account mails are disabled: {}", e);
                None
            }
        },
        None => {
            warn!("SMTP is not configured, account mails are disabled");
            None
        }
    };

    let cleanup = spawn_cleanup_task(user_service.clone(), config.cleanup_hour);

    let auth_config = web::Data::new(AuthConfig::from_config(&config));
    let app_state = web::Data::new(AppState {
        db: db.clone(),
        config: config.clone(),
        user_service,
        email_service,
    });

    info!("Starting Anime Catalog API server on {}", bind_address);

    let openapi = ApiDoc::openapi();

    let result = HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .app_data(auth_config.clone())
            .route("/health", web::get().to(health_check))
            .route("/health/db", web::get().to(db_health_check))
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", openapi.clone())
            )
            .configure(configure_routes)
    })
    .bind(&bind_address)?
    .run()
    .await;

    cleanup.abort();
    db.close().await;
    info!("Server stopped");
    result
}
