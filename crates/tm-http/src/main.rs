//! REST + WebSocket surface: router/state construction, `TraceLayer`, and
//! graceful-shutdown wiring.

mod error;
mod pagination;
mod routes;
mod state;
mod ws;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use clap::Parser;
use tokio::signal;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tm_core::config::Settings;
use tm_enhance::RuleBasedEnhancer;
use tm_store::{MemoryStore, TaskStore};
use tm_watch::Watcher;

use crate::state::AppState;

#[derive(Parser, Debug)]
#[command(name = "tm-http")]
#[command(about = "REST and WebSocket surface over the project memory/task store")]
struct Cli {
    #[arg(long, env = "TM_HTTP_PORT")]
    port: Option<u16>,

    #[arg(long, env = "TM_HTTP_BIND")]
    bind: Option<String>,
}

const EXIT_USER_ERROR: i32 = 1;
const EXIT_FS_ERROR: i32 = 2;
const EXIT_CONFIG_ERROR: i32 = 3;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "tm_http=info,tower_http=info".into()))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!(error = %e, "failed to load configuration");
            std::process::exit(EXIT_CONFIG_ERROR);
        }
    };
    if let Some(bind) = cli.bind {
        settings.http_bind = bind;
    }
    if let Some(port) = cli.port {
        settings.http_port = port;
    }

    if let Err(e) = tm_store::safeguards::ensure_layout(&settings.store_root).await {
        tracing::error!(error = %e, "store root is not usable");
        std::process::exit(EXIT_FS_ERROR);
    }

    let memories = Arc::new(MemoryStore::new(settings.store_root.clone()));
    let tasks = Arc::new(TaskStore::new(settings.store_root.clone()));

    match tm_store::safeguards::migrate_legacy_json(&settings.store_root, &memories, &tasks).await {
        Ok(0) => {}
        Ok(migrated) => tracing::info!(migrated, "migrated legacy JSON export"),
        Err(e) => {
            tracing::error!(error = %e, "legacy migration failed");
            std::process::exit(EXIT_FS_ERROR);
        }
    }

    let addr: SocketAddr = match format!("{}:{}", settings.http_bind, settings.http_port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!(error = %e, "invalid bind address");
            std::process::exit(EXIT_USER_ERROR);
        }
    };

    let watcher = match Watcher::start(settings.store_root.clone(), tm_watch::DEFAULT_CHANNEL_CAPACITY) {
        Ok(watcher) => Arc::new(watcher),
        Err(e) => {
            tracing::error!(error = %e, "failed to start change bus watcher");
            std::process::exit(EXIT_FS_ERROR);
        }
    };

    #[cfg(feature = "http")]
    let http_enhancer = settings
        .enhance_url
        .clone()
        .map(|url| Arc::new(tm_enhance::http::HttpEnhancer::new(url, settings.enhance_model.clone().unwrap_or_else(|| "default".to_string()))));

    let state = AppState {
        memories,
        tasks,
        rule_enhancer: Arc::new(RuleBasedEnhancer),
        #[cfg(feature = "http")]
        http_enhancer,
        watcher,
    };

    let app = Router::new()
        .nest("/api/memories", routes::memories::router())
        .nest("/api/tasks", routes::tasks::router())
        .nest("/api/mcp-tools", routes::tools::router())
        .route("/ws", axum::routing::get(ws::upgrade))
        .fallback_service(ServeDir::new("dashboard"))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    tracing::info!(%addr, "starting tm-http");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    tracing::info!("tm-http shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
