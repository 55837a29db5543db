//! Event check-in terminal
//!
//! Scans team QR codes, resolves them against the registry, and records
//! attendance and meals exactly once per team and meal slot.

mod api;
mod auth;
mod capture;
mod config;
mod db;
mod errors;
mod models;
mod registry;
mod terminal;
mod token;
mod watchdog;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use capture::{Decoder, SymbolTextDecoder};
use config::Config;
use db::Ledger;
use registry::RegistryClient;
use terminal::TerminalHandle;
use watchdog::LockWatchdog;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub terminal: TerminalHandle,
    pub decoder: Arc<dyn Decoder>,
    pub config: Arc<Config>,
    pub lock: watch::Receiver<bool>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting check-in terminal");
    tracing::info!("Registry: {}", config.registry_url);
    tracing::info!("Ledger path: {:?}", config.ledger_path);
    tracing::info!("Duplicate policy: {:?}", config.duplicate_policy);
    tracing::info!("Bind address: {}", config.bind_addr);

    if config.operator_key.is_none() {
        tracing::warn!("No operator key configured (CHECKIN_OPERATOR_KEY). Authentication is disabled!");
    }

    // Open the ledger
    let pool = db::init_database(&config.ledger_path).await?;
    let ledger = Ledger::open(pool, config.ledger_namespace.clone()).await?;

    let registry = RegistryClient::new(&config.registry_url, config.registry_timeout)?;
    let terminal = terminal::spawn(&config, ledger, registry);

    // Remote lock
    let lock = match &config.lock_status_url {
        Some(url) => {
            tracing::info!("Lock watchdog polling {} every {:?}", url, config.lock_poll);
            LockWatchdog::new(url, config.app_id.clone(), config.lock_poll)?.spawn()
        }
        None => watchdog::never_locked(),
    };

    let state = AppState {
        terminal,
        decoder: Arc::new(SymbolTextDecoder),
        config: Arc::new(config.clone()),
        lock,
    };

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Operator API listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let operator_key = state.config.operator_key.clone();
    let lock = state.lock.clone();

    let api_routes = Router::new()
        // Terminal
        .route("/terminal", get(api::get_terminal))
        .route("/terminal/mode", put(api::set_mode))
        .route("/terminal/meal", put(api::set_meal))
        // Capture
        .route("/capture/start", post(api::start_capture))
        .route("/capture/stop", post(api::stop_capture))
        .route("/capture/decode", post(api::decode_frame))
        .route("/capture/image", post(api::decode_image))
        // Review
        .route("/review/toggle", post(api::toggle_member))
        .route("/review/submit", post(api::submit))
        .route("/review/mark-all", post(api::mark_all))
        .route("/review/dismiss", post(api::dismiss))
        // Ledger
        .route("/ledger", get(api::list_ledger).delete(api::clear_ledger))
        .route("/ledger/{key}", get(api::get_ledger_entry))
        .route("/ledger/{key}/open", post(api::open_ledger_entry))
        .layer(middleware::from_fn(move |req, next| {
            auth::operator_auth_layer(operator_key.clone(), req, next)
        }))
        .layer(middleware::from_fn(move |req, next| {
            watchdog::lock_gate(lock.clone(), req, next)
        }));

    // Health check (no auth required)
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests;
