//! Extended Exchange (X10 starknet perps) adapter.
//!
//! Accepts plain symbols everywhere ("BTC", "ETH") and converts to
//! Extended's "BTC-USD" market names internally.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::config::ExtendedConfig;
use crate::error::ExchangeError;

use super::traits::{ExchangeResult, TradingApi};
use super::types::{AccountBalance, FundingRate, MarketStats, OrderAck, Position, Side};

/// "BTC" -> "BTC-USD"; already-suffixed symbols pass through.
pub fn format_symbol(symbol: &str) -> String {
    if symbol.to_uppercase().contains("-USD") {
        symbol.to_string()
    } else {
        format!("{}-USD", symbol.to_uppercase())
    }
}

/// Per-asset size rounding used when converting a USD notional to base units.
pub fn round_asset_size(market: &str, size: f64) -> f64 {
    let decimals: i32 = if market.contains("BTC") {
        3
    } else if market.contains("SOL") {
        2
    } else {
        4
    };
    let factor = 10f64.powi(decimals);
    let rounded = (size * factor).round() / factor;
    if rounded == 0.0 && size > 0.0 {
        1.0 / factor
    } else {
        rounded
    }
}

#[derive(Clone)]
pub struct ExtendedExchange {
    client: Client,
    base_url: String,
    api_key: String,
    vault_id: u64,
}

impl ExtendedExchange {
    pub fn new(config: ExtendedConfig) -> Result<Self, crate::error::ConfigError> {
        let api_key = std::env::var("X10_API_KEY").map_err(|_| {
            crate::error::ConfigError::MissingCredential {
                env_var: "X10_API_KEY".to_string(),
            }
        })?;
        Ok(Self {
            client: Client::new(),
            base_url: config.base_url,
            api_key,
            vault_id: config.vault_id,
        })
    }

    async fn get(&self, path: &str) -> ExchangeResult<Value> {
        let resp = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .header("X-Api-Key", &self.api_key)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(ExchangeError::AuthFailed { reason: text });
        }
        if !status.is_success() {
            return Err(ExchangeError::Http {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(serde_json::from_str(&text)?)
    }

    fn parse_position(raw: &Value) -> Option<Position> {
        let market = raw
            .get("market")
            .or_else(|| raw.get("marketName"))
            .and_then(|m| m.as_str())?
            .to_string();
        let size: f64 = match raw.get("size")? {
            Value::String(s) => s.parse().ok()?,
            v => v.as_f64()?,
        };
        if size == 0.0 {
            return None;
        }
        let entry_price = json_f64(raw, "openPrice").or_else(|| json_f64(raw, "entryPrice"))?;
        let mark_price = json_f64(raw, "markPrice").unwrap_or(entry_price);
        let pnl = json_f64(raw, "unrealisedPnl")
            .or_else(|| json_f64(raw, "unrealizedPnl"))
            .unwrap_or(0.0);
        let leverage = json_f64(raw, "leverage").unwrap_or(1.0);

        // Direction comes from the side field, not the size sign.
        let side = raw
            .get("side")
            .and_then(|s| s.as_str())
            .unwrap_or("LONG")
            .to_uppercase();
        let is_long = side != "SHORT";
        let amount = if is_long { size } else { -size };

        let margin = if leverage > 0.0 {
            (size * entry_price) / leverage
        } else {
            size * entry_price
        };
        let pnl_percentage = if margin > 0.0 {
            (pnl / margin) * 100.0
        } else {
            0.0
        };

        Some(Position {
            symbol: market,
            amount,
            entry_price,
            mark_price,
            pnl,
            pnl_percentage,
            is_long,
        })
    }

    async fn mid_price(&self, market: &str) -> ExchangeResult<f64> {
        let book = self
            .get(&format!("/api/v1/info/markets/{market}/orderbook"))
            .await?;
        let data = book.get("data").unwrap_or(&book);
        let best = |side: &str| -> Option<f64> {
            data.get(side)?
                .as_array()?
                .first()?
                .get("price")
                .and_then(|p| match p {
                    Value::String(s) => s.parse().ok(),
                    v => v.as_f64(),
                })
        };
        match (best("bid"), best("ask")) {
            (Some(bid), Some(ask)) if bid > 0.0 && ask > 0.0 => Ok((bid + ask) / 2.0),
            _ => Err(ExchangeError::Rejected {
                reason: format!("empty order book for {market}"),
            }),
        }
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
        let market = format_symbol(symbol);
        let mid = self.mid_price(&market).await?;
        let size = round_asset_size(&market, usd_amount / mid);
        self.place_order(&market, side, size, mid, false).await
    }

    /// Size is in base units; close paths pass the exact held amount.
    async fn place_order(
        &self,
        market: &str,
        side: Side,
        size: f64,
        mid: f64,
        reduce_only: bool,
    ) -> ExchangeResult<OrderAck> {
        // Market orders are aggressive IOC limits with 0.5% slippage room.
        let price = match side {
            Side::Buy => mid * 1.005,
            Side::Sell => mid * 0.995,
        };

        let order_id = uuid::Uuid::new_v4().to_string();
        // Extended requires a Stark signature over the order payload.
        // Placeholder settlement block for compile-time wiring.
        let body = json!({
            "id": order_id,
            "market": market,
            "type": "MARKET",
            "side": match side { Side::Buy => "BUY", Side::Sell => "SELL" },
            "qty": format!("{size}"),
            "price": format!("{price:.6}"),
            "timeInForce": "IOC",
            "reduceOnly": reduce_only,
            "settlement": { "vaultId": self.vault_id },
        });

        let resp = self
            .client
            .post(format!("{}/api/v1/user/order", self.base_url))
            .header("X-Api-Key", &self.api_key)
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
        let raw: Value = serde_json::from_str(&text)?;
        if raw.get("status").and_then(|s| s.as_str()) == Some("ERROR") {
            return Err(ExchangeError::Rejected {
                reason: raw
                    .get("error")
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| text.clone()),
            });
        }

        Ok(OrderAck {
            id: order_id,
            symbol: market.to_string(),
            side,
            status: raw
                .get("status")
                .and_then(|s| s.as_str())
                .unwrap_or("OK")
                .to_string(),
            raw,
        })
    }
}

fn json_f64(raw: &Value, key: &str) -> Option<f64> {
    match raw.get(key)? {
        Value::String(s) => s.parse().ok(),
        v => v.as_f64(),
    }
}

#[async_trait]
impl TradingApi for ExtendedExchange {
    fn name(&self) -> &'static str {
        "extended"
    }

    async fn get_account_balance(&self) -> ExchangeResult<AccountBalance> {
        let raw = self.get("/api/v1/user/balance").await?;
        let data = raw.get("data").unwrap_or(&raw);
        let equity = json_f64(data, "equity")
            .or_else(|| json_f64(data, "totalBalance"))
            .ok_or_else(|| ExchangeError::Rejected {
                reason: "balance response missing equity".to_string(),
            })?;
        Ok(AccountBalance { equity })
    }

    async fn get_position(&self, symbol: &str) -> ExchangeResult<Option<Position>> {
        let market = format_symbol(symbol);
        let positions = self.get_positions().await?;
        Ok(positions.into_iter().find(|p| p.symbol == market))
    }

    async fn get_positions(&self) -> ExchangeResult<Vec<Position>> {
        let raw = self.get("/api/v1/user/positions").await?;
        let list = raw
            .get("data")
            .and_then(|d| d.as_array())
            .ok_or_else(|| ExchangeError::Rejected {
                reason: "positions response missing data".to_string(),
            })?;
        Ok(list.iter().filter_map(Self::parse_position).collect())
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
        let market = format_symbol(symbol);
        let position =
            self.get_position(&market)
                .await?
                .ok_or_else(|| ExchangeError::PositionNotFound {
                    symbol: market.clone(),
                })?;

        // Reduce-only opposite order for the exact held size, so a price
        // move between fetches can neither leave a residual nor flip the
        // book the other way.
        let (side, size) = position.closing_order();
        let mid = self.mid_price(&market).await?;
        self.place_order(&market, side, size, mid, true).await?;
        Ok(())
    }

    async fn get_funding_rates(&self) -> ExchangeResult<Vec<FundingRate>> {
        let raw = self.get("/api/v1/info/markets").await?;
        let list = raw
            .get("data")
            .and_then(|d| d.as_array())
            .ok_or_else(|| ExchangeError::Rejected {
                reason: "markets response missing data".to_string(),
            })?;

        let mut rates = Vec::new();
        for market in list {
            let (Some(name), Some(rate)) = (
                market.get("name").and_then(|n| n.as_str()),
                market
                    .get("marketStats")
                    .and_then(|s| json_f64(s, "fundingRate")),
            ) else {
                continue;
            };
            rates.push(FundingRate::from_hourly(name.to_string(), rate));
        }
        Ok(rates)
    }

    async fn get_market_stats(&self) -> ExchangeResult<Vec<MarketStats>> {
        let raw = self.get("/api/v1/info/markets").await?;
        let list = raw
            .get("data")
            .and_then(|d| d.as_array())
            .ok_or_else(|| ExchangeError::Rejected {
                reason: "markets response missing data".to_string(),
            })?;

        let mut stats = Vec::new();
        for market in list {
            let (Some(name), Some(ms)) = (
                market.get("name").and_then(|n| n.as_str()),
                market.get("marketStats"),
            ) else {
                continue;
            };
            let Some(mark) = json_f64(ms, "markPrice") else {
                continue;
            };
            stats.push(MarketStats {
                symbol: name.to_string(),
                volume_24h: json_f64(ms, "dailyVolume").unwrap_or(0.0),
                mark_price: mark,
                change_24h_pct: json_f64(ms, "dailyPriceChangePercentage").unwrap_or(0.0),
                funding_rate_pct: json_f64(ms, "fundingRate").map(|r| r * 100.0).unwrap_or(0.0),
                open_interest: json_f64(ms, "openInterest").unwrap_or(0.0),
            });
        }
        Ok(stats)
    }
}
