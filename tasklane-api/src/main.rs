//! Tasklane API Server Entry Point
//!
//! Loads configuration, picks the store and cache backends, starts the rate
//! limiter and the notification listener, and serves the Axum router until
//! Ctrl-C.

use std::net::SocketAddr;
use std::sync::Arc;

use tasklane_api::{
    config::{store_backend_from_env, CacheBackend, CacheConfig, StoreBackend},
    create_router, jobs::notification_listener, run_migrations,
    telemetry::{init_tracer, TelemetryConfig},
    ApiConfig, ApiError, ApiResult, AppState, AuthConfig, DbClient, DbConfig, RateLimitConfig,
    RateLimiter, BcryptCredentialHasher,
};
use tasklane_storage::{
    CacheStore, InMemoryCacheStore, InMemoryTaskStore, InMemoryUserStore, RedisCacheStore,
    TaskCache, TaskCacheConfig, TaskStore, UserStore, NOTIFICATION_CHANNEL,
};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> ApiResult<()> {
    // A missing .env file is normal outside development.
    let _ = dotenvy::dotenv();

    let telemetry_config = TelemetryConfig::from_env();
    init_tracer(&telemetry_config)?;

    let api_config = ApiConfig::from_env();
    let rate_limit_config = RateLimitConfig::from_env();
    rate_limit_config.validate()?;
    let auth_config = AuthConfig::from_env();
    auth_config.validate_for_production(api_config.is_production())?;

    let (task_store, user_store) = build_stores().await?;
    let cache_config = CacheConfig::from_env()?;
    let cache = build_cache(&cache_config).await?;

    let tasks = Arc::new(TaskCache::new(
        task_store,
        cache.clone(),
        TaskCacheConfig::default().with_ttl(cache_config.entry_ttl),
    ));
    let limiter = Arc::new(RateLimiter::start(rate_limit_config));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let listener_handle = tokio::spawn(notification_listener(
        cache,
        NOTIFICATION_CHANNEL.to_string(),
        shutdown_rx,
    ));

    let addr = resolve_bind_addr(&api_config)?;
    let state = AppState {
        tasks,
        users: user_store,
        hasher: Arc::new(BcryptCredentialHasher::new(auth_config.bcrypt_cost)),
        auth: Arc::new(auth_config),
        limiter: limiter.clone(),
        config: Arc::new(api_config),
        start_time: std::time::Instant::now(),
    };
    let app = create_router(state);

    tracing::info!(%addr, "Starting Tasklane API server");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;

    limiter.shutdown().await;
    let _ = shutdown_tx.send(true);
    if let Err(e) = listener_handle.await {
        tracing::warn!(error = %e, "Notification listener ended abnormally");
    }

    served.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
    tracing::info!("Tasklane API server stopped");
    Ok(())
}

async fn build_stores() -> ApiResult<(Arc<dyn TaskStore>, Arc<dyn UserStore>)> {
    match store_backend_from_env()? {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory stores; data is lost on restart");
            let tasks: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
            let users: Arc<dyn UserStore> = Arc::new(InMemoryUserStore::new());
            Ok((tasks, users))
        }
        StoreBackend::Postgres => {
            let db = DbClient::from_config(&DbConfig::from_env())?;
            run_migrations(db.pool()).await?;
            let db = Arc::new(db);
            let tasks: Arc<dyn TaskStore> = db.clone();
            let users: Arc<dyn UserStore> = db;
            Ok((tasks, users))
        }
    }
}

async fn build_cache(config: &CacheConfig) -> ApiResult<Arc<dyn CacheStore>> {
    match config.backend {
        CacheBackend::Memory => Ok(Arc::new(InMemoryCacheStore::new())),
        CacheBackend::Redis => {
            let redis = RedisCacheStore::from_url(&config.redis_url).map_err(|e| {
                ApiError::internal_error(format!("Invalid Redis URL: {}", e))
            })?;
            match redis.ping().await {
                Ok(()) => {
                    tracing::info!("Connected to Redis cache");
                    Ok(Arc::new(redis))
                }
                Err(e) => {
                    // Reads still reach the store; only cross-replica sharing is lost.
                    tracing::warn!(error = %e, "Redis unreachable, falling back to in-process cache");
                    Ok(Arc::new(InMemoryCacheStore::new()))
                }
            }
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received");
}

fn resolve_bind_addr(config: &ApiConfig) -> ApiResult<SocketAddr> {
    let addr = format!("{}:{}", config.bind_host, config.port);
    addr.parse::<SocketAddr>().map_err(|e| {
        ApiError::invalid_input(format!("Invalid bind address {}: {}", addr, e))
    })
}
