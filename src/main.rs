use std::net::SocketAddr;
use std::sync::Arc;

use tokio::signal;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use module_access::api;
use module_access::clock::SystemClock;
use module_access::config::{Config, StoreBackend};
use module_access::store::memory::MemoryStore;
use module_access::store::postgres::PgStore;
use module_access::store::{AccessStore, AppState, bootstrap, pool};

const MAX_BODY_BYTES: usize = 64 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_env("ACCESS_LOG").unwrap_or_else(|_| "info".into()))
        .with(fmt::layer().json())
        .init();

    let cfg = Config::load()?;

    let store: Arc<dyn AccessStore> = match cfg.store {
        StoreBackend::Postgres => {
            // Connect to Postgres and run migrations
            let pool = pool::connect(&cfg.database_url).await?;
            if cfg.seed_catalog {
                bootstrap::run(&pool).await?;
            }
            Arc::new(PgStore::new(pool))
        }
        StoreBackend::Memory => {
            let store = MemoryStore::new();
            if cfg.seed_catalog {
                bootstrap::seed_memory(&store).await;
            }
            tracing::warn!("using in-memory store, state is lost on restart");
            Arc::new(store)
        }
    };

    let addr: SocketAddr = cfg.listen.parse()?;
    let state = AppState::new(store, Arc::new(SystemClock), cfg);

    let app = axum::Router::new()
        .route("/healthz", axum::routing::get(|| async { "ok" }))
        .merge(api::router())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    tracing::info!(%addr, "starting module-access");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("module-access stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
