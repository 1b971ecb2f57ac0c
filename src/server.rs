/// Server setup and initialization
///
/// Wires together storage, the playbook registry, the action registry, the
/// orchestrator, the SLA monitor and the HTTP routes.

use crate::{
    api::{create_api_routes, AppState},
    config::Config,
    incident::MemoryIncidentGateway,
    orchestrator::Orchestrator,
    runtime::{executor::DryRunExecutor, policy::RetryPolicy, scheduler::SlaMonitorService},
    store::{sqlite, SqliteExecutionStore},
    workflow::{registry::WorkflowRegistry, storage::WorkflowStorage},
};
use anyhow::Result;
use axum::{routing::get, Router};
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Create the main Axum application with all routes
///
/// Opens the database, loads every published playbook, adopts executions a
/// previous process left unfinished, and starts the SLA monitor when enabled.
pub async fn create_app(config: Config) -> Result<Router> {
    ensure_database_dir(&config.database.url)?;

    tracing::info!("🗄️ Opening database {}", config.database.url);
    let pool = sqlite::connect(&config.database.url).await
        .map_err(|e| anyhow::anyhow!("Failed to open database {}: {}", config.database.url, e))?;

    let workflow_storage = WorkflowStorage::new(pool.clone());
    workflow_storage.init_schema().await?;
    let execution_store = SqliteExecutionStore::new(pool);
    execution_store.init_schema().await?;

    tracing::info!("📊 Initializing workflow registry");
    let registry = Arc::new(WorkflowRegistry::new(workflow_storage));
    registry.init_from_storage().await
        .map_err(|e| anyhow::anyhow!("Failed to load workflows from storage: {}", e))?;

    // Real integrations are registered by embedding applications
    tracing::info!("🧪 Registering dry-run executors for all action types");
    let actions = Arc::new(DryRunExecutor::registry());
    let incidents = Arc::new(MemoryIncidentGateway::new());

    let orchestrator = Arc::new(Orchestrator::new(
        registry,
        actions,
        incidents.clone(),
        Arc::new(execution_store),
        RetryPolicy::from_config(&config.engine),
    ));

    let recovered = orchestrator.recover().await?;
    if recovered > 0 {
        tracing::info!("♻️ Resumed {} executions from the previous run", recovered);
    }

    if config.engine.sla_monitor_enabled {
        let monitor = SlaMonitorService::new(Arc::clone(&orchestrator), config.engine.sla_schedule.clone()).await?;
        tokio::spawn(async move {
            if let Err(e) = monitor.start().await {
                tracing::error!("❌ Failed to start SLA monitor: {}", e);
            }
        });
    }

    let state = AppState { orchestrator, incidents };

    let app = Router::new()
        .route("/healthz", get(health_check))
        .merge(create_api_routes().with_state(state));

    tracing::info!("✅ Application initialized successfully");
    Ok(app)
}

/// Start the HTTP server with the given configuration
pub async fn start_server(config: Config) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    tracing::info!("Starting playbook engine...");

    let app = create_app(config.clone()).await?;

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server listening on http://{}", bind_addr);

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

/// Create the directory holding a file-backed SQLite database
fn ensure_database_dir(url: &str) -> Result<()> {
    let path = url.trim_start_matches("sqlite://").trim_start_matches("sqlite:");
    if path.starts_with(":memory:") {
        return Ok(());
    }
    let path = path.split('?').next().unwrap_or(path);
    if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| anyhow::anyhow!("Failed to create data directory {}: {}", parent.display(), e))?;
    }
    Ok(())
}

async fn health_check() -> &'static str {
    "ok"
}
