use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;

use health_companion_api::config::Config;
use health_companion_api::store::memory::MemoryStore;
use health_companion_api::store::postgres::PgStore;
use health_companion_api::{build_router, db, store, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "health_companion_api=debug,tower_http=debug".into()),
        )
        .json()
        .init();

    let config = Arc::new(Config::from_env());

    let state = match &config.database_url {
        Some(url) => {
            let pool = db::create_pool(url)
                .await
                .context("Failed to connect to the database")?;

            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .context("Failed to run database migrations")?;
            tracing::info!("Database migrations applied");

            let store = PgStore::connect(pool)
                .await
                .context("Failed to start the log change listener")?;
            AppState::new(Arc::new(store), config.clone())?
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store");
            AppState::new(Arc::new(MemoryStore::new()), config.clone())?
        }
    };

    if config.gemini_api_key.is_empty() {
        tracing::warn!("GEMINI_API_KEY not set, assistant replies will fall back");
    }

    state.rate_limiter.spawn_cleanup_worker();
    store::spawn_refresh_token_purge(state.store.clone());

    let app = build_router(state);

    let addr = config.listen_addr();
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    // Connect info feeds the per-IP rate limiter.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
