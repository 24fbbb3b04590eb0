use actix_middleware::{
    AccessPolicyMiddleware, CounterStore, JwtAuthMiddleware, Logging, MetricsMiddleware,
    PrincipalStore, RateLimitMiddleware, RedisCounterStore,
};
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use content_gateway::config::Config;
use content_gateway::health::HealthState;
use content_gateway::principal_store::{seeded_store, PgPrincipalStore};
use content_gateway::{routes, Gateway};
use redis_utils::RedisPool;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,content_gateway=debug,actix_middleware=debug".into());

    let json = std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn principal_store(config: &Config) -> Result<Arc<dyn PrincipalStore>> {
    match &config.database.url {
        Some(url) => {
            let store = PgPrincipalStore::connect(url, config.database.max_connections).await?;
            info!("PostgreSQL principal store initialized");
            Ok(Arc::new(store))
        }
        None => {
            let store = seeded_store(&config.auth.seed_principals);
            if store.is_empty() {
                warn!("No database configured and no seed principals: every credential will be rejected");
            } else {
                info!(principals = store.len(), "In-memory principal store seeded");
            }
            Ok(Arc::new(store))
        }
    }
}

#[actix_web::main]
async fn main() -> Result<()> {
    init_tracing();
    info!("Starting content-gateway");

    let config = Config::from_env().context("Failed to load configuration")?;
    config
        .validate()
        .context("Configuration validation failed")?;
    info!(
        failure_mode = ?config.rate_limit.failure_mode,
        store_timeout_ms = config.rate_limit.store_timeout_ms,
        "Configuration loaded and validated"
    );

    let redis = RedisPool::connect(&config.redis.url, config.redis_connect_timeout())
        .await
        .context("Failed to create Redis pool")?;
    let counters: Arc<dyn CounterStore> = Arc::new(RedisCounterStore::new(redis.manager()));

    let principals = principal_store(&config).await?;
    let gateway = Gateway::new(&config, counters, principals)?;

    for policy in gateway.limiter.policies().categories() {
        info!(
            category = %policy.name,
            limit = policy.limit,
            window_seconds = policy.window.as_secs(),
            "Rate limit category"
        );
    }

    let health_state = web::Data::new(HealthState::new(redis));
    let bind_addr = (config.server.host.clone(), config.server.port);
    info!("Listening on {}:{}", bind_addr.0, bind_addr.1);

    HttpServer::new(move || {
        // Last registered runs first: rate limit → authenticate → authorize
        App::new()
            .app_data(health_state.clone())
            .wrap(AccessPolicyMiddleware::new(gateway.access.clone()))
            .wrap(JwtAuthMiddleware::new(gateway.auth.clone()))
            .wrap(RateLimitMiddleware::new(gateway.limiter.clone()))
            .wrap(MetricsMiddleware)
            .wrap(Logging)
            .wrap(tracing_actix_web::TracingLogger::default())
            .configure(routes::configure)
    })
    .bind(bind_addr)
    .context("Failed to bind HTTP server")?
    .workers(config.server.workers)
    .run()
    .await
    .context("HTTP server error")?;

    info!("content-gateway stopped");
    Ok(())
}
