pub mod funding;
pub mod risk;
pub mod trading;
pub mod volume;

use std::sync::Arc;

use async_trait::async_trait;

use crate::artifacts::ArtifactWriter;
use crate::config::AppConfig;
use crate::error::{AgentError, ConfigError};
use crate::exchange::TradingApi;
use crate::llm::LlmClient;

/// Everything an agent may touch during one cycle. Config is an immutable
/// snapshot; the exchange is the only shared mutable resource and lives
/// behind the adapter.
pub struct CycleContext {
    pub cycle: u64,
    pub exchange: Arc<dyn TradingApi>,
    pub llm: LlmClient,
    pub config: AppConfig,
    pub artifacts: ArtifactWriter,
}

/// Short human-readable result for the cycle log.
#[derive(Clone, Debug)]
pub struct AgentOutcome {
    pub summary: String,
}

impl AgentOutcome {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
        }
    }
}

/// An independently schedulable unit of work. One invocation per cycle,
/// one output artifact per invocation. Failures are isolated at this
/// boundary by the orchestrator.
#[async_trait]
pub trait Agent: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    async fn run(&self, cx: &CycleContext) -> Result<AgentOutcome, AgentError>;
}

/// Map configured agent names to implementations. An enabled name with no
/// implementation is a startup error, not a per-cycle surprise.
pub fn build_agents(config: &AppConfig) -> Result<Vec<Box<dyn Agent>>, ConfigError> {
    let mut agents: Vec<Box<dyn Agent>> = Vec::new();
    for name in config.enabled_agents() {
        match name {
            "trading" => agents.push(Box::new(trading::TradingAgent)),
            "funding" => agents.push(Box::new(funding::FundingAgent)),
            "volume" => agents.push(Box::new(volume::VolumeAgent)),
            other => return Err(ConfigError::UnknownAgent(other.to_string())),
        }
    }
    Ok(agents)
}
