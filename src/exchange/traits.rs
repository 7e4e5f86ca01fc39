use async_trait::async_trait;

use crate::error::ExchangeError;

use super::types::{AccountBalance, Candle, FundingRate, MarketStats, OrderAck, Position};

pub type ExchangeResult<T> = Result<T, ExchangeError>;

/// Uniform trading-operation contract implemented per exchange.
///
/// Every implementation must report fetch failures as errors; returning an
/// empty position set or zero balance to mean "the call failed" is forbidden,
/// because the risk gate fails closed on errors and would otherwise read a
/// dead venue as a flat, healthy account.
#[async_trait]
pub trait TradingApi: Send + Sync {
    fn name(&self) -> &'static str;

    async fn get_account_balance(&self) -> ExchangeResult<AccountBalance>;

    /// `Ok(None)` means the venue reports no open position for the symbol.
    async fn get_position(&self, symbol: &str) -> ExchangeResult<Option<Position>>;

    async fn get_positions(&self) -> ExchangeResult<Vec<Position>>;

    async fn market_buy(
        &self,
        symbol: &str,
        usd_amount: f64,
        leverage: u32,
    ) -> ExchangeResult<OrderAck>;

    async fn market_sell(
        &self,
        symbol: &str,
        usd_amount: f64,
        leverage: u32,
    ) -> ExchangeResult<OrderAck>;

    async fn close_position(&self, symbol: &str) -> ExchangeResult<()>;

    /// Recent OHLCV history for prompt context. Optional; venues without a
    /// candle endpoint return an empty vec.
    async fn get_candles(&self, _symbol: &str, _interval: &str) -> ExchangeResult<Vec<Candle>> {
        Ok(vec![])
    }

    /// Current funding rates across markets. Optional.
    async fn get_funding_rates(&self) -> ExchangeResult<Vec<FundingRate>> {
        Ok(vec![])
    }

    /// 24h per-market stats (notional volume, mark, daily move). Optional.
    async fn get_market_stats(&self) -> ExchangeResult<Vec<MarketStats>> {
        Ok(vec![])
    }
}
