use serde::Deserialize;
use std::fs;

use crate::error::ConfigError;

/// One schedulable unit of work. The set is loaded once at startup and is
/// immutable for the lifetime of the run; changing it means editing the
/// config and restarting.
#[derive(Clone, Debug, Deserialize)]
pub struct AgentSpec {
    pub name: String,
    pub enabled: bool,
}

/// Policy for positions that exceed `max_position_percentage` of equity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OversizedPolicy {
    /// Block new entries this cycle but leave the position open.
    BlockOnly,
    /// Close the oversized position along with blocking the cycle.
    ForceClose,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RiskConfig {
    pub max_loss_usd: f64,
    pub max_gain_usd: f64,
    pub minimum_balance_usd: f64,
    /// Fraction of equity a single position may occupy, e.g. 0.3 = 30%.
    pub max_position_percentage: f64,
    #[serde(default = "default_oversized_policy")]
    pub oversized_policy: OversizedPolicy,
}

fn default_oversized_policy() -> OversizedPolicy {
    OversizedPolicy::BlockOnly
}

#[derive(Clone, Debug, Deserialize)]
pub struct LlmConfig {
    /// Provider key: openai | openrouter | groq | deepseek | xai | ollama
    pub provider: String,
    pub model: String,
    /// Overrides the provider's environment key when set.
    pub api_key: Option<String>,
    /// Overrides the provider's default base URL when set.
    pub base_url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    1024
}

#[derive(Clone, Debug, Deserialize)]
pub struct HyperliquidConfig {
    /// Main wallet address whose clearinghouse state is read.
    pub wallet_address: String,
    #[serde(default = "default_hyperliquid_url")]
    pub base_url: String,
}

fn default_hyperliquid_url() -> String {
    "https://api.hyperliquid.xyz".to_string()
}

#[derive(Clone, Debug, Deserialize)]
pub struct ExtendedConfig {
    pub vault_id: u64,
    #[serde(default = "default_extended_url")]
    pub base_url: String,
}

fn default_extended_url() -> String {
    "https://api.starknet.extended.exchange".to_string()
}

#[derive(Clone, Debug, Deserialize)]
pub struct PaperConfig {
    pub starting_equity: f64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub exchange: String, // "hyperliquid", "extended", "paper"
    pub symbols: Vec<String>,
    pub sleep_interval_minutes: u64,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    #[serde(default = "default_leverage")]
    pub default_leverage: u32,
    /// Notional size for agent-initiated market orders, in USD.
    #[serde(default = "default_order_usd")]
    pub order_size_usd: f64,

    pub agents: Vec<AgentSpec>,
    pub risk: RiskConfig,
    pub llm: LlmConfig,

    pub hyperliquid: Option<HyperliquidConfig>,
    pub extended: Option<ExtendedConfig>,
    pub paper: Option<PaperConfig>,
}

fn default_output_dir() -> String {
    "output".to_string()
}

fn default_leverage() -> u32 {
    5
}

fn default_order_usd() -> f64 {
    25.0
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config.yaml")
    }

    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;

        // Strip BOM if present
        let content = content.strip_prefix('\u{feff}').unwrap_or(&content);

        let config: AppConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Full validation pass. Runs before the first cycle; any failure here
    /// halts the process.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let thresholds = [
            ("max_loss_usd", self.risk.max_loss_usd),
            ("max_gain_usd", self.risk.max_gain_usd),
            ("minimum_balance_usd", self.risk.minimum_balance_usd),
        ];
        for (name, value) in thresholds {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::InvalidThreshold {
                    name: name.to_string(),
                    reason: format!("must be a positive number, got {value}"),
                });
            }
        }
        let pct = self.risk.max_position_percentage;
        if !pct.is_finite() || pct <= 0.0 || pct > 1.0 {
            return Err(ConfigError::InvalidThreshold {
                name: "max_position_percentage".to_string(),
                reason: format!("must be in (0, 1], got {pct}"),
            });
        }

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::InvalidLlmSetting {
                name: "temperature".to_string(),
                reason: format!("must be in [0, 2], got {}", self.llm.temperature),
            });
        }
        if self.llm.max_tokens == 0 {
            return Err(ConfigError::InvalidLlmSetting {
                name: "max_tokens".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }

        let mut seen = std::collections::HashSet::new();
        for spec in &self.agents {
            if !seen.insert(spec.name.as_str()) {
                return Err(ConfigError::DuplicateAgent(spec.name.clone()));
            }
        }

        match self.exchange.to_lowercase().as_str() {
            "hyperliquid" => {
                if self.hyperliquid.is_none() {
                    return Err(ConfigError::MissingExchangeSection(
                        "hyperliquid".to_string(),
                    ));
                }
            }
            "extended" => {
                if self.extended.is_none() {
                    return Err(ConfigError::MissingExchangeSection("extended".to_string()));
                }
            }
            "paper" => {}
            other => return Err(ConfigError::UnknownExchange(other.to_string())),
        }

        Ok(())
    }

    /// Names of agents that should run each cycle, in configured order.
    pub fn enabled_agents(&self) -> Vec<&str> {
        self.agents
            .iter()
            .filter(|a| a.enabled)
            .map(|a| a.name.as_str())
            .collect()
    }
}
