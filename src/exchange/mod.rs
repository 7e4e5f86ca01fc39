pub mod extended;
pub mod factory;
pub mod hyperliquid;
pub mod paper;
pub mod traits;
pub mod types;

pub use factory::build_exchange;
pub use traits::{ExchangeResult, TradingApi};
pub use types::{AccountBalance, Candle, FundingRate, MarketStats, OrderAck, Position, Side};

#[cfg(test)]
mod types_tests;
