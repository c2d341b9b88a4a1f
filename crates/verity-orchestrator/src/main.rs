use std::sync::Arc;
use std::time::Duration;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use verity_core::{AppConfig, Capabilities, FactStore, RetryPolicy};
use verity_orchestrator::stages::{default_stages, resolve_stage_bin};
use verity_orchestrator::state::AppState;
use verity_orchestrator::{routes, Orchestrator, ProcessRunner};
use verity_store::PgFactStore;

/// Fixed delay before the single retry of a failed task.
const TASK_RETRY_DELAY: Duration = Duration::from_secs(5);

async fn connect_store(config: &AppConfig) -> Option<Arc<dyn FactStore>> {
    let url = config.database_url.as_deref()?;
    match PgFactStore::connect(url).await {
        Ok(store) => Some(Arc::new(store)),
        Err(e) => {
            warn!(error = %e, "Relational store unreachable at startup, stages will report it");
            None
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("verity=info".parse().unwrap()))
        .init();

    let config = AppConfig::from_env();
    let missing = config.missing_env();
    if !missing.is_empty() {
        warn!(missing = ?missing, "Environment incomplete, pipeline will run degraded");
    }

    let store = connect_store(&config).await;
    let graph = verity_pipeline::bootstrap::connect_graph(&config).await;

    let stage_bin = resolve_stage_bin(&config);
    let stages = default_stages(&config, &stage_bin);
    let orchestrator = Arc::new(Orchestrator::new(
        stages,
        Arc::new(ProcessRunner::default()),
        RetryPolicy::fixed(2, TASK_RETRY_DELAY),
        Duration::from_secs(config.tick_secs.max(1)),
    ));

    let unusable = orchestrator.validate();
    if unusable.is_empty() {
        info!("All stage executables validated");
    } else {
        warn!(count = unusable.len(), "Some stage executables are missing, those stages will fail");
    }

    tokio::spawn(orchestrator.clone().run());

    let state = AppState {
        orchestrator: orchestrator.clone(),
        store,
        graph,
        capabilities: Capabilities::resolve(&config),
        runs: Default::default(),
    };

    let app = routes::create_router()
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", config.orchestrator_host, config.orchestrator_port);
    info!("Verity orchestrator listening on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Cannot listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            orchestrator.stop();
        })
        .await
        .unwrap();
}
