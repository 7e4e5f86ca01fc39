//! riskgate - risk-gated multi-agent trading orchestrator
//!
//! Runs a risk check every cycle and, only when it passes, dispatches a set
//! of independent LLM/exchange agents. Uniform adapters cover the exchanges
//! and the model providers.

pub mod agents;
pub mod artifacts;
pub mod config;
pub mod error;
pub mod exchange;
pub mod llm;
pub mod orchestrator;

// Re-export commonly used types
pub use agents::risk::{RiskGate, RiskReason, RiskVerdict};
pub use agents::{Agent, AgentOutcome, CycleContext};
pub use artifacts::ArtifactWriter;
pub use config::AppConfig;
pub use error::{AgentError, ConfigError, ExchangeError, ProviderError};
pub use exchange::{build_exchange, TradingApi};
pub use llm::LlmClient;
pub use orchestrator::{LoopState, Orchestrator};
