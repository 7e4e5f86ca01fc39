//! Hyperliquid perps adapter (REST).
//!
//! Reads go through the public `/info` endpoint (`clearinghouseState`,
//! `candleSnapshot`, `metaAndAssetCtxs`). Order actions go through
//! `/exchange`.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::config::HyperliquidConfig;
use crate::error::ExchangeError;

use super::traits::{ExchangeResult, TradingApi};
use super::types::{AccountBalance, Candle, FundingRate, MarketStats, OrderAck, Position, Side};

#[derive(Clone)]
pub struct HyperliquidExchange {
    client: Client,
    base_url: String,
    wallet_address: String,
    agent_key: Option<String>,
}

impl HyperliquidExchange {
    pub fn new(config: HyperliquidConfig) -> Self {
        // Order signing uses the agent wallet key; read-only mode works
        // without it.
        let agent_key = std::env::var("HYPERLIQUID_AGENT_KEY").ok();
        Self {
            client: Client::new(),
            base_url: config.base_url,
            wallet_address: config.wallet_address,
            agent_key,
        }
    }

    async fn info(&self, body: Value) -> ExchangeResult<Value> {
        let resp = self
            .client
            .post(format!("{}/info", self.base_url))
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(ExchangeError::Http {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(serde_json::from_str(&text)?)
    }

    async fn clearinghouse_state(&self) -> ExchangeResult<Value> {
        self.info(json!({
            "type": "clearinghouseState",
            "user": self.wallet_address,
        }))
        .await
    }

    fn parse_position(raw: &Value) -> Option<Position> {
        let pos = raw.get("position")?;
        let symbol = pos.get("coin")?.as_str()?.to_string();
        let amount: f64 = pos.get("szi")?.as_str()?.parse().ok()?;
        if amount == 0.0 {
            return None;
        }
        let entry_price: f64 = pos
            .get("entryPx")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.0);
        let position_value: f64 = pos
            .get("positionValue")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.0);
        let pnl: f64 = pos
            .get("unrealizedPnl")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.0);
        let leverage = pos
            .get("leverage")
            .and_then(|l| l.get("value"))
            .and_then(|v| v.as_f64())
            .unwrap_or(1.0);

        let mark_price = if amount.abs() > 0.0 {
            position_value / amount.abs()
        } else {
            entry_price
        };
        // P&L % against actual margin, matching the uniform adapter shape.
        let margin = if leverage > 0.0 {
            (amount.abs() * entry_price) / leverage
        } else {
            amount.abs() * entry_price
        };
        let pnl_percentage = if margin > 0.0 {
            (pnl / margin) * 100.0
        } else {
            0.0
        };

        Some(Position {
            symbol,
            amount,
            entry_price,
            mark_price,
            pnl,
            pnl_percentage,
            is_long: amount > 0.0,
        })
    }

    /// Resolve asset index, current mark and size rounding for a coin.
    async fn asset_meta(&self, symbol: &str) -> ExchangeResult<(u64, f64, u32)> {
        let meta = self.info(json!({"type": "metaAndAssetCtxs"})).await?;
        let universe = meta
            .get(0)
            .and_then(|m| m.get("universe"))
            .and_then(|u| u.as_array())
            .ok_or_else(|| ExchangeError::Rejected {
                reason: "metaAndAssetCtxs missing universe".to_string(),
            })?;
        let ctxs = meta
            .get(1)
            .and_then(|c| c.as_array())
            .ok_or_else(|| ExchangeError::Rejected {
                reason: "metaAndAssetCtxs missing asset contexts".to_string(),
            })?;

        for (idx, asset) in universe.iter().enumerate() {
            if asset.get("name").and_then(|n| n.as_str()) == Some(symbol) {
                let mark: f64 = ctxs
                    .get(idx)
                    .and_then(|c| c.get("markPx"))
                    .and_then(|v| v.as_str())
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0.0);
                let sz_decimals = asset
                    .get("szDecimals")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(4) as u32;
                return Ok((idx as u64, mark, sz_decimals));
            }
        }
        Err(ExchangeError::InvalidSymbol {
            symbol: symbol.to_string(),
        })
    }

    async fn submit_market_order(
        &self,
        symbol: &str,
        side: Side,
        usd_amount: f64,
        _leverage: u32,
    ) -> ExchangeResult<OrderAck> {
        if usd_amount <= 0.0 {
            return Err(ExchangeError::InvalidOrderSize {
                symbol: symbol.to_string(),
                usd_amount,
            });
        }

        let (asset, mark, sz_decimals) = self.asset_meta(symbol).await?;
        if mark <= 0.0 {
            return Err(ExchangeError::Rejected {
                reason: format!("no mark price for {symbol}"),
            });
        }

        let factor = 10f64.powi(sz_decimals as i32);
        let size = ((usd_amount / mark) * factor).round() / factor;
        if size <= 0.0 {
            return Err(ExchangeError::InvalidOrderSize {
                symbol: symbol.to_string(),
                usd_amount,
            });
        }

        self.place_order(symbol, asset, mark, side, size, false).await
    }

    /// Size is in base units, already conforming to the asset's szDecimals.
    async fn place_order(
        &self,
        symbol: &str,
        asset: u64,
        mark: f64,
        side: Side,
        size: f64,
        reduce_only: bool,
    ) -> ExchangeResult<OrderAck> {
        if self.agent_key.is_none() {
            return Err(ExchangeError::AuthFailed {
                reason: "HYPERLIQUID_AGENT_KEY not set".to_string(),
            });
        }

        // Market orders are IOC limits with 1% slippage allowance.
        let is_buy = matches!(side, Side::Buy);
        let limit_px = if is_buy { mark * 1.01 } else { mark * 0.99 };

        let action = json!({
            "type": "order",
            "orders": [{
                "a": asset,
                "b": is_buy,
                "p": format!("{limit_px:.6}"),
                "s": format!("{size}"),
                "r": reduce_only,
                "t": {"limit": {"tif": "Ioc"}},
            }],
            "grouping": "na",
        });

        // Proper Hyperliquid signing is an EIP-712 signature over the action
        // with the agent key. Placeholder header for compile-time wiring.
        let resp = self
            .client
            .post(format!("{}/exchange", self.base_url))
            .header("X-Agent-Key", self.agent_key.clone().unwrap_or_default())
            .json(&json!({
                "action": action,
                "nonce": chrono::Utc::now().timestamp_millis(),
            }))
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(ExchangeError::Http {
                status: status.as_u16(),
                body: text,
            });
        }
        let raw: Value = serde_json::from_str(&text)?;
        if raw.get("status").and_then(|s| s.as_str()) == Some("err") {
            return Err(ExchangeError::Rejected {
                reason: raw
                    .get("response")
                    .map(|r| r.to_string())
                    .unwrap_or_else(|| text.clone()),
            });
        }

        Ok(OrderAck {
            id: uuid::Uuid::new_v4().to_string(),
            symbol: symbol.to_string(),
            side,
            status: raw
                .get("status")
                .and_then(|s| s.as_str())
                .unwrap_or("ok")
                .to_string(),
            raw,
        })
    }
}

#[async_trait]
impl TradingApi for HyperliquidExchange {
    fn name(&self) -> &'static str {
        "hyperliquid"
    }

    async fn get_account_balance(&self) -> ExchangeResult<AccountBalance> {
        let state = self.clearinghouse_state().await?;
        let equity = state
            .get("marginSummary")
            .and_then(|m| m.get("accountValue"))
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| ExchangeError::Rejected {
                reason: "clearinghouseState missing accountValue".to_string(),
            })?;
        Ok(AccountBalance { equity })
    }

    async fn get_position(&self, symbol: &str) -> ExchangeResult<Option<Position>> {
        let positions = self.get_positions().await?;
        Ok(positions.into_iter().find(|p| p.symbol == symbol))
    }

    async fn get_positions(&self) -> ExchangeResult<Vec<Position>> {
        let state = self.clearinghouse_state().await?;
        let raw_positions = state
            .get("assetPositions")
            .and_then(|p| p.as_array())
            .ok_or_else(|| ExchangeError::Rejected {
                reason: "clearinghouseState missing assetPositions".to_string(),
            })?;
        Ok(raw_positions.iter().filter_map(Self::parse_position).collect())
    }

    async fn market_buy(
        &self,
        symbol: &str,
        usd_amount: f64,
        leverage: u32,
    ) -> ExchangeResult<OrderAck> {
        self.submit_market_order(symbol, Side::Buy, usd_amount, leverage)
            .await
    }

    async fn market_sell(
        &self,
        symbol: &str,
        usd_amount: f64,
        leverage: u32,
    ) -> ExchangeResult<OrderAck> {
        self.submit_market_order(symbol, Side::Sell, usd_amount, leverage)
            .await
    }

    async fn close_position(&self, symbol: &str) -> ExchangeResult<()> {
        let position = self.get_position(symbol).await?.ok_or_else(|| {
            ExchangeError::PositionNotFound {
                symbol: symbol.to_string(),
            }
        })?;

        // Reduce-only opposite order for the exact held size, so a price
        // move between fetches can neither leave a residual nor flip the
        // book the other way.
        let (side, size) = position.closing_order();
        let (asset, mark, _) = self.asset_meta(symbol).await?;
        if mark <= 0.0 {
            return Err(ExchangeError::Rejected {
                reason: format!("no mark price for {symbol}"),
            });
        }
        self.place_order(symbol, asset, mark, side, size, true).await?;
        Ok(())
    }

    async fn get_candles(&self, symbol: &str, interval: &str) -> ExchangeResult<Vec<Candle>> {
        let end = chrono::Utc::now().timestamp_millis();
        let start = end - 3 * 24 * 60 * 60 * 1000;
        let raw = self
            .info(json!({
                "type": "candleSnapshot",
                "req": {
                    "coin": symbol,
                    "interval": interval,
                    "startTime": start,
                    "endTime": end,
                },
            }))
            .await?;
        Ok(serde_json::from_value(raw)?)
    }

    async fn get_funding_rates(&self) -> ExchangeResult<Vec<FundingRate>> {
        let meta = self.info(json!({"type": "metaAndAssetCtxs"})).await?;
        let universe = meta
            .get(0)
            .and_then(|m| m.get("universe"))
            .and_then(|u| u.as_array())
            .ok_or_else(|| ExchangeError::Rejected {
                reason: "metaAndAssetCtxs missing universe".to_string(),
            })?;
        let ctxs = meta
            .get(1)
            .and_then(|c| c.as_array())
            .ok_or_else(|| ExchangeError::Rejected {
                reason: "metaAndAssetCtxs missing asset contexts".to_string(),
            })?;

        let mut rates = Vec::new();
        for (asset, ctx) in universe.iter().zip(ctxs.iter()) {
            let (Some(name), Some(funding)) = (
                asset.get("name").and_then(|n| n.as_str()),
                ctx.get("funding")
                    .and_then(|f| f.as_str())
                    .and_then(|s| s.parse::<f64>().ok()),
            ) else {
                continue;
            };
            rates.push(FundingRate::from_hourly(name.to_string(), funding));
        }
        Ok(rates)
    }

    async fn get_market_stats(&self) -> ExchangeResult<Vec<MarketStats>> {
        let meta = self.info(json!({"type": "metaAndAssetCtxs"})).await?;
        let universe = meta
            .get(0)
            .and_then(|m| m.get("universe"))
            .and_then(|u| u.as_array())
            .ok_or_else(|| ExchangeError::Rejected {
                reason: "metaAndAssetCtxs missing universe".to_string(),
            })?;
        let ctxs = meta
            .get(1)
            .and_then(|c| c.as_array())
            .ok_or_else(|| ExchangeError::Rejected {
                reason: "metaAndAssetCtxs missing asset contexts".to_string(),
            })?;

        let num = |ctx: &Value, key: &str| -> Option<f64> {
            ctx.get(key).and_then(|v| v.as_str()).and_then(|s| s.parse().ok())
        };

        let mut stats = Vec::new();
        for (asset, ctx) in universe.iter().zip(ctxs.iter()) {
            let (Some(name), Some(mark)) = (
                asset.get("name").and_then(|n| n.as_str()),
                num(ctx, "markPx"),
            ) else {
                continue;
            };
            let prev_day = num(ctx, "prevDayPx").unwrap_or(mark);
            let change_24h_pct = if prev_day > 0.0 {
                (mark - prev_day) / prev_day * 100.0
            } else {
                0.0
            };
            stats.push(MarketStats {
                symbol: name.to_string(),
                volume_24h: num(ctx, "dayNtlVlm").unwrap_or(0.0),
                mark_price: mark,
                change_24h_pct,
                funding_rate_pct: num(ctx, "funding").unwrap_or(0.0) * 100.0,
                open_interest: num(ctx, "openInterest").unwrap_or(0.0),
            });
        }
        Ok(stats)
    }
}
