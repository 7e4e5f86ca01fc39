use std::process::ExitCode;

use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use riskgate::agents::build_agents;
use riskgate::agents::risk::{GATE_NAME, RiskGate};
use riskgate::artifacts::ArtifactWriter;
use riskgate::config::AppConfig;
use riskgate::exchange::build_exchange;
use riskgate::llm::LlmClient;
use riskgate::orchestrator::Orchestrator;

#[tokio::main]
async fn main() -> ExitCode {
    // Setup logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Secrets come from the environment, never from config or logs.
    let _ = dotenvy::dotenv();

    // Configuration errors are fatal and surface before the first cycle.
    let config = match AppConfig::load() {
        Ok(c) => c,
        Err(e) => {
            error!("configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };
    info!(
        exchange = %config.exchange,
        agents = ?config.enabled_agents(),
        interval_minutes = config.sleep_interval_minutes,
        "configuration loaded"
    );

    let exchange = match build_exchange(&config) {
        Ok(e) => e,
        Err(e) => {
            error!("configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let llm = match LlmClient::from_config(&config.llm) {
        Ok(c) => c,
        Err(e) => {
            error!("configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let agents = match build_agents(&config) {
        Ok(a) => a,
        Err(e) => {
            error!("configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let artifacts = ArtifactWriter::new(config.output_dir.clone());
    let gate = RiskGate::new(exchange.clone(), config.risk.clone(), artifacts.clone());
    info!(gate = GATE_NAME, "risk gate armed");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("stop requested, halting at the next state boundary");
            let _ = shutdown_tx.send(true);
        }
    });

    let mut orchestrator = Orchestrator::new(
        gate,
        agents,
        exchange,
        llm,
        config,
        artifacts,
        shutdown_rx,
    );
    orchestrator.run().await;

    ExitCode::SUCCESS
}
