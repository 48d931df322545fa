//! Libris Server - digital library management
//!
//! A Rust REST API server for lending libraries.

use anyhow::Context;
use axum::{
    routing::{delete, get, patch, post, put},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use libris_server::{
    api,
    config::{AppConfig, LogFormat, LoggingConfig},
    repository::Repository,
    services::{sweeper, Services},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;

    // Keep the guard alive so buffered file logs are flushed on exit
    let _log_guard = init_tracing(&config.logging);

    tracing::info!("Starting Libris Server v{}", env!("CARGO_PKG_VERSION"));

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect(&config.database.url)
        .await
        .context("Failed to connect to database")?;

    tracing::info!("Connected to database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    tracing::info!("Database migrations completed");

    let addr = SocketAddr::new(
        config.server.host.parse().context("Invalid host address")?,
        config.server.port,
    );

    let repository = Repository::new(pool);
    let services = Services::new(repository, &config);
    services
        .users
        .ensure_admin()
        .await
        .context("Failed to create bootstrap administrator")?;

    sweeper::spawn(services.borrowings.clone());

    let state = AppState {
        config: Arc::new(config),
        services: Arc::new(services),
    };

    let app = create_router(state);

    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Console output in the configured format, plus an optional daily file
fn init_tracing(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("libris_server={},tower_http=debug", config.level).into());

    let (file_layer, guard) = match config.directory {
        Some(ref directory) => {
            let appender = tracing_appender::rolling::daily(directory, "libris.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);
    match config.format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(fmt::layer()).init(),
    }

    guard
}

/// Create the application router with all routes
fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_v1 = Router::new()
        // Health check
        .route("/health", get(api::health::health_check))
        .route("/ready", get(api::health::readiness_check))
        // Authentication
        .route("/auth/login", post(api::auth::login))
        .route("/auth/register", post(api::auth::register))
        .route("/auth/me", get(api::auth::me))
        .route("/auth/profile", put(api::auth::update_profile))
        // Users
        .route("/users", get(api::users::list_users).post(api::users::create_user))
        .route("/users/:id", get(api::users::get_user))
        .route("/users/:id/role", put(api::users::update_role))
        .route("/users/:id/status", put(api::users::update_status))
        // Books
        .route("/books", get(api::books::list_books).post(api::books::create_book))
        .route("/books/categories", get(api::books::list_categories))
        .route(
            "/books/:id",
            get(api::books::get_book)
                .put(api::books::update_book)
                .delete(api::books::delete_book),
        )
        .route("/books/:id/favorite", post(api::books::toggle_favorite))
        .route(
            "/books/:id/reviews",
            get(api::reviews::list_reviews).post(api::reviews::create_review),
        )
        // Favorites
        .route("/favorites", get(api::books::list_favorites))
        // Reviews
        .route(
            "/reviews/:id",
            put(api::reviews::update_review).delete(api::reviews::delete_review),
        )
        // Borrowings
        .route(
            "/borrowings",
            get(api::borrowings::list_borrowings).post(api::borrowings::create_borrowing),
        )
        .route("/borrowings/mine", get(api::borrowings::my_borrowings))
        .route("/borrowings/overdue", get(api::borrowings::overdue_borrowings))
        .route("/borrowings/:id", get(api::borrowings::get_borrowing))
        .route("/borrowings/:id/cancel", post(api::borrowings::cancel))
        .route("/borrowings/:id/approve", post(api::borrowings::approve))
        .route("/borrowings/:id/reject", post(api::borrowings::reject))
        .route("/borrowings/:id/checkout", post(api::borrowings::checkout))
        .route("/borrowings/:id/request-return", post(api::borrowings::request_return))
        .route("/borrowings/:id/confirm-return", post(api::borrowings::confirm_return))
        .route("/borrowings/:id/pay-fine", post(api::borrowings::pay_fine))
        // Messages
        .route(
            "/messages",
            get(api::messages::list_messages).post(api::messages::send_message),
        )
        .route("/messages/unread-count", get(api::messages::unread_count))
        .route("/messages/read-all", post(api::messages::mark_all_read))
        .route("/messages/:id", delete(api::messages::delete_message))
        .route("/messages/:id/read", post(api::messages::mark_read))
        // Password resets
        .route(
            "/password-resets",
            get(api::password_resets::list_requests).post(api::password_resets::submit_request),
        )
        .route("/password-resets/complete", post(api::password_resets::complete_reset))
        .route("/password-resets/:id", patch(api::password_resets::decide_request))
        .route("/password-resets/:id/status", get(api::password_resets::request_status))
        // Dashboard
        .route("/dashboard/admin", get(api::dashboard::admin_dashboard))
        .route("/dashboard/me", get(api::dashboard::my_dashboard))
        .with_state(state);

    let openapi = api::openapi::create_openapi_router();

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(cors),
        )
}
