//! Custom error types for the orchestrator
//!
//! Provides structured, typed errors instead of generic Box<dyn Error>

use thiserror::Error;

/// Configuration errors. These are fatal: they surface before the first
/// cycle and halt the process.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Missing or invalid threshold {name}: {reason}")]
    InvalidThreshold { name: String, reason: String },

    #[error("Invalid LLM setting {name}: {reason}")]
    InvalidLlmSetting { name: String, reason: String },

    #[error("Missing credential: set {env_var} in the environment")]
    MissingCredential { env_var: String },

    #[error("Unknown exchange '{0}' (expected hyperliquid|extended|paper)")]
    UnknownExchange(String),

    #[error("Unknown agent '{0}' in enabled agent set")]
    UnknownAgent(String),

    #[error("Duplicate agent name '{0}'")]
    DuplicateAgent(String),

    #[error("Missing config section '{0}' for the selected exchange")]
    MissingExchangeSection(String),
}

/// Exchange-level errors. An adapter must signal rejection explicitly and
/// never return a zero/empty position to mean failure.
#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Order rejected: {reason}")]
    Rejected { reason: String },

    #[error("Authentication failed: {reason}")]
    AuthFailed { reason: String },

    #[error("Invalid symbol: {symbol}")]
    InvalidSymbol { symbol: String },

    #[error("Invalid order size {usd_amount} USD for {symbol}")]
    InvalidOrderSize { symbol: String, usd_amount: f64 },

    #[error("Position not found: {symbol}")]
    PositionNotFound { symbol: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),
}

/// LLM provider errors. Distinct from an empty-but-valid response, which is
/// `Ok(String::new())` at the call site.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Provider rate limited: {0}")]
    RateLimited(String),

    #[error("Provider authentication failed: {0}")]
    AuthFailed(String),

    #[error("Provider request timed out: {0}")]
    Timeout(String),

    #[error("Provider API error: {0}")]
    Api(String),

    #[error("Malformed provider response: {0}")]
    Malformed(String),
}

/// Errors raised inside a single agent invocation. Caught at the agent
/// boundary by the orchestrator; one agent failing never stops the loop or
/// the other agents in the same cycle.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("LLM provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Exchange rejection: {0}")]
    Exchange(#[from] ExchangeError),

    #[error("Market data unavailable: {0}")]
    DataUnavailable(String),

    #[error("Failed to write output artifact: {0}")]
    Artifact(#[from] std::io::Error),

    #[error("Failed to parse model output: {0}")]
    Parse(String),

    #[error("Agent internal error: {0}")]
    Internal(String),
}
