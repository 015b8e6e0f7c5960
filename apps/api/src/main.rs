use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tailor_api::config::Config;
use tailor_api::db::create_pool;
use tailor_api::llm_client::{self, AnthropicClient};
use tailor_api::repository::postgres::{PgProfileRepository, PgResumeRepository};
use tailor_api::routes::build_router;
use tailor_api::state::AppState;
use tailor_api::tailoring::cache::{InMemoryRewriteCache, RedisRewriteCache, RewriteCache};
use tailor_api::tailoring::engine::TailoringEngine;
use tailor_api::tailoring::orchestrator::RewriteOrchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Tailor API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url, config.db_max_connections).await?;

    // Initialize rewrite cache (Redis when configured, otherwise in-process)
    let cache: Arc<dyn RewriteCache> = match &config.redis_url {
        Some(url) => {
            let client = redis::Client::open(url.clone())?;
            info!("Rewrite cache: Redis (ttl={:?})", config.cache_ttl);
            Arc::new(RedisRewriteCache::new(client, config.cache_ttl))
        }
        None => {
            info!("Rewrite cache: in-memory");
            Arc::new(InMemoryRewriteCache::new())
        }
    };

    // Initialize LLM client
    let provider = AnthropicClient::new(config.anthropic_api_key.clone(), config.provider_timeout)?;
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    let orchestrator = RewriteOrchestrator::new(Arc::new(provider), cache, &config.tailoring.rewrite);
    info!(
        "Rewrite orchestrator: max_in_flight={}, max_attempts={}, breaker_threshold={}",
        config.tailoring.rewrite.max_in_flight,
        config.tailoring.rewrite.retry.max_attempts,
        config.tailoring.rewrite.breaker_threshold
    );

    let engine = TailoringEngine::new(
        Arc::new(PgProfileRepository::new(db.clone())),
        Some(orchestrator),
        config.tailoring.clone(),
    )?;

    // Build app state
    let state = AppState {
        engine: Arc::new(engine),
        resumes: Arc::new(PgResumeRepository::new(db)),
    };

    // Build router
    let app = build_router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()), // TODO: restrict CORS origins once the frontend host is fixed
    );

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
