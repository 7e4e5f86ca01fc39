use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::ConfigError;

use super::{
    extended::ExtendedExchange, hyperliquid::HyperliquidExchange, paper::PaperExchange,
    traits::TradingApi,
};

/// Select the exchange adapter once at startup. All call sites go through
/// the `TradingApi` trait from here on.
pub fn build_exchange(config: &AppConfig) -> Result<Arc<dyn TradingApi>, ConfigError> {
    match config.exchange.to_lowercase().as_str() {
        "hyperliquid" => {
            let section = config
                .hyperliquid
                .clone()
                .ok_or_else(|| ConfigError::MissingExchangeSection("hyperliquid".to_string()))?;
            Ok(Arc::new(HyperliquidExchange::new(section)))
        }
        "extended" => {
            let section = config
                .extended
                .clone()
                .ok_or_else(|| ConfigError::MissingExchangeSection("extended".to_string()))?;
            Ok(Arc::new(ExtendedExchange::new(section)?))
        }
        "paper" => {
            let starting_equity = config.paper.as_ref().map(|p| p.starting_equity).unwrap_or(1_000.0);
            Ok(Arc::new(PaperExchange::new(starting_equity)))
        }
        other => Err(ConfigError::UnknownExchange(other.to_string())),
    }
}
