use std::sync::Arc;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;

use plumb_dispatch::api::dispatch_routes;
use plumb_dispatch::classify::{ClassificationOracle, HttpOracle, KeywordOracle};
use plumb_dispatch::config::{DispatchConfig, ServiceConfig, default_roster, load_roster};
use plumb_dispatch::dispatch::{Dispatcher, spawn_dispatch_loop};
use plumb_dispatch::store::{DispatchStore, LibSqlBackend};

/// Log to a daily rolling file under `log_dir` when given, stderr otherwise.
/// The returned guard flushes the file writer on drop.
fn init_tracing(service: &ServiceConfig) -> Option<WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match &service.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "dispatch.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let service = ServiceConfig::from_env();
    let _log_guard = init_tracing(&service);

    let config = DispatchConfig::from_env()?;

    eprintln!("🔧 Plumb Dispatch v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: http://0.0.0.0:{}/api", service.http_port);
    eprintln!("   Database: {}", service.db_path.display());
    eprintln!("   Match policy: {}", config.match_policy);

    // ── Classifier ───────────────────────────────────────────────────────
    let oracle: Arc<dyn ClassificationOracle> = match &service.oracle_url {
        Some(url) => {
            eprintln!("   Classifier: {url}");
            Arc::new(HttpOracle::new(url, service.oracle_api_key.clone())?)
        }
        None => {
            eprintln!("   Classifier: offline keywords");
            Arc::new(KeywordOracle::new())
        }
    };

    // ── Database ─────────────────────────────────────────────────────────
    let store: Arc<dyn DispatchStore> = Arc::new(
        LibSqlBackend::new_local(&service.db_path)
            .await
            .with_context(|| format!("failed to open database at {}", service.db_path.display()))?,
    );

    let roster = match &service.roster_path {
        Some(path) => load_roster(path)?,
        None => default_roster(),
    };

    // ── Dispatcher ───────────────────────────────────────────────────────
    let sweep_interval = config.sweep_interval;
    let dispatcher = Arc::new(Dispatcher::restore(config, oracle, store, roster).await?);

    let summary = dispatcher.summary().await;
    eprintln!(
        "   Jobs: {} ({} pending), technicians: {}/{} available\n",
        summary.total_jobs,
        summary.by_status.pending,
        summary.technicians_available,
        summary.technicians_total
    );

    let _sweep_handle = spawn_dispatch_loop(Arc::clone(&dispatcher), sweep_interval);

    // ── HTTP ─────────────────────────────────────────────────────────────
    let app = dispatch_routes(Arc::clone(&dispatcher));
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", service.http_port))
        .await
        .with_context(|| format!("failed to bind port {}", service.http_port))?;
    tracing::info!(port = service.http_port, "Dispatch API started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutting down");
        })
        .await?;

    Ok(())
}
