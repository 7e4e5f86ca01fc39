//! Unit tests for exchange data types.

use super::types::{Candle, FundingRate, Position, Side};

#[test]
fn test_position_value_long() {
    let pos = Position {
        symbol: "BTC".to_string(),
        amount: 0.5,
        entry_price: 60_000.0,
        mark_price: 62_000.0,
        pnl: 1_000.0,
        pnl_percentage: 3.3,
        is_long: true,
    };
    assert_eq!(pos.value(), 31_000.0);
}

#[test]
fn test_position_value_short_uses_abs() {
    let pos = Position {
        symbol: "ETH".to_string(),
        amount: -2.0,
        entry_price: 3_000.0,
        mark_price: 2_900.0,
        pnl: 200.0,
        pnl_percentage: 6.6,
        is_long: false,
    };
    assert_eq!(pos.value(), 5_800.0);
}

#[test]
fn test_closing_order_uses_held_size_not_notional() {
    // The mark has moved since entry; the flattening order must still be
    // the exact held amount, not value()/mark re-rounded.
    let pos = Position {
        symbol: "BTC".to_string(),
        amount: 0.0035,
        entry_price: 60_000.0,
        mark_price: 61_234.5,
        pnl: 4.3,
        pnl_percentage: 2.0,
        is_long: true,
    };
    let (side, size) = pos.closing_order();
    assert_eq!(side, Side::Sell);
    assert_eq!(size, 0.0035);
}

#[test]
fn test_closing_order_short_buys_back() {
    let pos = Position {
        symbol: "ETH".to_string(),
        amount: -2.0,
        entry_price: 3_000.0,
        mark_price: 2_900.0,
        pnl: 200.0,
        pnl_percentage: 6.6,
        is_long: false,
    };
    assert_eq!(pos.closing_order(), (Side::Buy, 2.0));
}

#[test]
fn test_candle_deserializes_string_fields() {
    // Hyperliquid candleSnapshot sends numerics as strings.
    let raw = r#"{"t": 1700000000000, "o": "100.5", "h": "101.0", "l": "99.5", "c": "100.8", "v": "1234.5"}"#;
    let candle: Candle = serde_json::from_str(raw).unwrap();

    assert_eq!(candle.open_time_ms, 1700000000000);
    assert_eq!(candle.open, 100.5);
    assert_eq!(candle.close, 100.8);
    assert_eq!(candle.volume, 1234.5);
}

#[test]
fn test_candle_rejects_garbage_numbers() {
    let raw = r#"{"t": 1, "o": "abc", "h": "1", "l": "1", "c": "1", "v": "1"}"#;
    assert!(serde_json::from_str::<Candle>(raw).is_err());
}

#[test]
fn test_funding_rate_annualization() {
    let rate = FundingRate::from_hourly("BTC".to_string(), 0.0000125);
    // 0.0000125/hour = 10.95% annualized
    assert!((rate.annualized_pct - 10.95).abs() < 0.001);
}

#[test]
fn test_funding_rate_negative() {
    let rate = FundingRate::from_hourly("DOGE".to_string(), -0.0001);
    assert!(rate.annualized_pct < 0.0);
}
