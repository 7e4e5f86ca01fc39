use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Account equity snapshot. Always re-fetched, never cached as authoritative
/// state.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct AccountBalance {
    pub equity: f64,
}

/// Open position as reported by the exchange. `amount` is signed: positive
/// for longs, negative for shorts.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub amount: f64,
    pub entry_price: f64,
    pub mark_price: f64,
    pub pnl: f64,
    pub pnl_percentage: f64,
    pub is_long: bool,
}

impl Position {
    /// Notional value of the position at the current mark.
    pub fn value(&self) -> f64 {
        self.amount.abs() * self.mark_price
    }

    /// Side and base-unit size of the order that flattens this position
    /// exactly. Sized from the held amount, not from notional, so the
    /// result does not depend on where the mark has moved since the fetch.
    pub fn closing_order(&self) -> (Side, f64) {
        let side = if self.is_long { Side::Sell } else { Side::Buy };
        (side, self.amount.abs())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

/// Exchange acknowledgement for a submitted order.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrderAck {
    pub id: String,
    pub symbol: String,
    pub side: Side,
    pub status: String,
    pub raw: Value,
}

/// One OHLCV candle in Hyperliquid's snapshot shape.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Candle {
    #[serde(rename = "t")]
    pub open_time_ms: i64,
    #[serde(rename = "o", with = "str_f64")]
    pub open: f64,
    #[serde(rename = "h", with = "str_f64")]
    pub high: f64,
    #[serde(rename = "l", with = "str_f64")]
    pub low: f64,
    #[serde(rename = "c", with = "str_f64")]
    pub close: f64,
    #[serde(rename = "v", with = "str_f64")]
    pub volume: f64,
}

/// Hyperliquid sends numeric candle fields as strings.
mod str_f64 {
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        let raw = String::deserialize(d)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Funding rate snapshot for one perp market.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FundingRate {
    pub symbol: String,
    /// Hourly funding rate as a fraction, e.g. 0.0000125.
    pub rate: f64,
    /// Annualized percentage, rate * 24 * 365 * 100.
    pub annualized_pct: f64,
}

impl FundingRate {
    pub fn from_hourly(symbol: String, rate: f64) -> Self {
        let annualized_pct = rate * 24.0 * 365.0 * 100.0;
        Self {
            symbol,
            rate,
            annualized_pct,
        }
    }
}

/// 24h market-wide stats for one perp market, used for volume ranking.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MarketStats {
    pub symbol: String,
    /// 24h notional volume in USD.
    pub volume_24h: f64,
    pub mark_price: f64,
    /// Price move over the last 24h, percent.
    pub change_24h_pct: f64,
    pub funding_rate_pct: f64,
    pub open_interest: f64,
}
