use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod assistant;
pub mod auth;
pub mod calendar;
pub mod config;
pub mod db;
pub mod dto;
pub mod error;
pub mod guard;
pub mod handlers;
pub mod models;
pub mod navigation;
pub mod repo;
pub mod store;

use assistant::{Assistant, AssistantClient};
use auth::rate_limit::RateLimitState;
use config::Config;
use guard::InFlight;
use repo::{LogRepository, ProfileRepository};
use store::{DocumentStore, LogStore, ProfileStore};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub logs: LogRepository,
    pub profiles: ProfileRepository,
    pub assistant: Assistant,
    pub config: Arc<Config>,
    pub rate_limiter: RateLimitState,
    pub in_flight: InFlight,
}

impl AppState {
    pub fn new<S>(store: Arc<S>, config: Arc<Config>) -> anyhow::Result<Self>
    where
        S: DocumentStore + 'static,
    {
        let log_store: Arc<dyn LogStore> = store.clone();
        let profile_store: Arc<dyn ProfileStore> = store.clone();
        let logs = LogRepository::new(log_store);
        let profiles = ProfileRepository::new(profile_store);
        let assistant = Assistant::new(
            AssistantClient::new(&config)?,
            logs.clone(),
            profiles.clone(),
        );
        let store: Arc<dyn DocumentStore> = store;

        Ok(Self {
            store,
            logs,
            profiles,
            assistant,
            config,
            rate_limiter: RateLimitState::default(),
            in_flight: InFlight::new(),
        })
    }
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = std::iter::once(&config.frontend_url)
        .chain(&config.cors_extra_origins)
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(hv) => Some(hv),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring unparsable CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true)
}

pub fn build_router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/api/auth/register", post(handlers::auth::register))
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/auth/refresh", post(handlers::auth::refresh))
        .route("/api/auth/guest", post(handlers::auth::guest))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::rate_limit::rate_limit_auth,
        ));

    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/readyz", get(handlers::health::readyz))
        .route("/ws", get(handlers::ws::ws_handler))
        .merge(auth_routes);

    let protected_routes = Router::new()
        .route("/api/me", get(handlers::auth::me))
        .route("/api/auth/logout", post(handlers::auth::logout))
        // Profile
        .route(
            "/api/profile",
            get(handlers::profile::get_profile).put(handlers::profile::update_profile),
        )
        // Logs
        .route(
            "/api/logs",
            get(handlers::logs::list_logs).post(handlers::logs::save_log),
        )
        .route("/api/logs/recent", get(handlers::logs::list_recent))
        .route("/api/logs/window", get(handlers::logs::list_window))
        .route("/api/logs/:id", delete(handlers::logs::delete_log))
        .route("/api/calendar", get(handlers::calendar::get_month))
        // Assistant
        .route("/api/assistant/chat", post(handlers::assistant::chat))
        .route("/api/assistant/report", post(handlers::assistant::report))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::middleware::require_auth,
        ));

    let cors = cors_layer(&state.config);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(cors),
        )
        .with_state(state)
}
