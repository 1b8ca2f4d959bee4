//! Dashboard realtime server binary.

use std::error::Error;
use std::sync::Arc;

use sqlx::PgPool;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use dashboard_realtime::adapters::auth::{JwtSessionValidator, MockSessionValidator};
use dashboard_realtime::adapters::bus::BroadcastBus;
use dashboard_realtime::adapters::http::{app_router, OpsAppState};
use dashboard_realtime::adapters::postgres::{self, PostgresChangeFeed, PostgresDashboardResolver};
use dashboard_realtime::adapters::websocket::{ConnectionRegistry, WebSocketState};
use dashboard_realtime::application::{ChangeSource, EventCoordinator};
use dashboard_realtime::config::AppConfig;
use dashboard_realtime::ports::SessionValidator;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = AppConfig::load()?;
    init_tracing(&config);
    config.validate()?;

    let addr = config.server.socket_addr()?;
    tracing::info!(
        environment = ?config.server.environment,
        addr = %addr,
        "Starting dashboard realtime server"
    );

    let registry = Arc::new(ConnectionRegistry::new());
    let bus = Arc::new(
        BroadcastBus::connect(&config.redis, &config.events.channel_prefix, registry.clone()).await,
    );

    let mut coordinator = EventCoordinator::new(config.events.clone(), registry.clone(), bus);
    let pool = change_feed_pool(&config).await;
    if let Some(pool) = &pool {
        coordinator = coordinator.with_change_source(ChangeSource {
            feed: Arc::new(PostgresChangeFeed::new(pool.clone())),
            resolver: Arc::new(PostgresDashboardResolver::new(pool.clone())),
        });
    }
    let coordinator = Arc::new(coordinator);
    coordinator.start().await;

    let validator: Arc<dyn SessionValidator> = match JwtSessionValidator::from_config(&config.auth) {
        Some(jwt) => Arc::new(jwt),
        None => {
            tracing::warn!("No JWT secret configured, only anonymous connections are possible");
            Arc::new(MockSessionValidator::new())
        }
    };

    let ws_state = WebSocketState::new(registry, validator)
        .with_require_auth(config.auth.require_auth)
        .with_read_timeout(config.events.read_timeout())
        .with_queue_capacity(config.events.client_queue_capacity);
    let app = app_router(
        ws_state,
        OpsAppState::new(coordinator.clone()),
        &config.server.cors_origins_list(),
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "HTTP server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    coordinator.stop().await;
    if let Some(pool) = pool {
        pool.close().await;
    }
    tracing::info!("Server stopped");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    if config.is_production() {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().pretty()).init();
    }
}

/// Builds the change feed pool when the feed is enabled and a database is
/// configured. The pool connects lazily; an unreachable database is retried
/// by the watcher rather than failing startup.
async fn change_feed_pool(config: &AppConfig) -> Option<PgPool> {
    if !config.events.change_feed_enabled || !config.database.is_configured() {
        return None;
    }

    let pool = match postgres::lazy_pool(&config.database) {
        Ok(pool) => pool,
        Err(e) => {
            tracing::warn!(error = %e, "Invalid database settings, change feed disabled");
            return None;
        }
    };

    if config.database.run_migrations {
        match postgres::run_migrations(&pool).await {
            Ok(()) => tracing::info!("Database migrations applied"),
            Err(e) => tracing::warn!(error = %e, "Database migrations failed"),
        }
    }

    Some(pool)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
