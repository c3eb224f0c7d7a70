mod cache;
mod config;
mod db;
mod discovery;
mod entities;
mod error;
mod extractor;
mod gemini;
mod models;
mod routes;
mod routing;
mod sync;

use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    cache::CacheManager, config::Config, extractor::MoveekExtractor, gemini::GeminiClient,
    routing::RoutingClient,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: DatabaseConnection,
    pub cache: CacheManager,
    pub routing: Arc<RoutingClient>,
    pub gemini: Arc<GeminiClient>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,cinepick=debug,sqlx=warn".to_string()),
        )
        .init();

    let config = Arc::new(Config::from_env()?);

    let http = reqwest::Client::builder()
        .user_agent("cinepick/0.1")
        .timeout(Duration::from_secs(30))
        .build()?;

    let db = db::connect_and_migrate(&config.database_url).await?;
    let cache = CacheManager::new(db.clone(), config.cache_ttl_hours);

    // `cinepick sync` runs one pipeline pass and exits; scheduling and
    // run serialization belong to an external scheduler.
    if std::env::args().nth(1).as_deref() == Some("sync") {
        let extractor = MoveekExtractor::new(http.clone(), config.moveek_base_url.clone());
        sync::run(
            &db,
            &cache,
            &http,
            &extractor,
            &config.city,
            config.sync_window_days,
            &config.tz,
        )
        .await?;
        return Ok(());
    }

    let routing = Arc::new(RoutingClient::new(
        http.clone(),
        config.osrm_base_url.clone(),
        config.osrm_rps,
    ));
    let gemini = Arc::new(GeminiClient::new(
        http,
        config.gemini_api_key.clone(),
        config.gemini_base_url.clone(),
        config.gemini_model.clone(),
    ));

    let state = Arc::new(AppState { config: config.clone(), db, cache, routing, gemini });

    let app = Router::new()
        .route("/api/choose", post(routes::choose))
        .route("/api/images/{key}", get(routes::image))
        .with_state(state)
        .layer(CorsLayer::new().allow_origin(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    tracing::info!(addr = %config.addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
