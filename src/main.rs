/// Playbook engine server entry point
///
/// Serves:
/// - Playbook publishing at /api/workflows/*
/// - Executions at /api/executions/*
/// - Incident snapshots and auto-trigger at /api/incidents/*
/// - Health check at /healthz

use playbook_engine::{config::Config, server::start_server};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Defaults to 0.0.0.0:3010 and sqlite://data/playbooks.db
    let config = Config::default();

    start_server(config).await?;

    Ok(())
}
