//! In-memory paper-trading venue.
//!
//! Used for dry runs and as the exchange under test: fills instantly at a
//! settable mark price, tracks equity and positions, and can be forced to
//! fail reads so fail-closed behavior is exercisable.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;

use crate::error::ExchangeError;

use super::traits::{ExchangeResult, TradingApi};
use super::types::{AccountBalance, MarketStats, OrderAck, Position, Side};

struct PaperState {
    equity: f64,
    positions: HashMap<String, Position>,
    marks: HashMap<String, f64>,
    closed: Vec<String>,
    stats: Vec<MarketStats>,
}

pub struct PaperExchange {
    state: Mutex<PaperState>,
    fail_reads: AtomicBool,
}

impl PaperExchange {
    pub fn new(starting_equity: f64) -> Self {
        Self {
            state: Mutex::new(PaperState {
                equity: starting_equity,
                positions: HashMap::new(),
                marks: HashMap::new(),
                closed: Vec::new(),
                stats: Vec::new(),
            }),
            fail_reads: AtomicBool::new(false),
        }
    }

    pub fn set_mark(&self, symbol: &str, price: f64) {
        let mut state = self.state.lock().unwrap();
        state.marks.insert(symbol.to_string(), price);
        if let Some(pos) = state.positions.get_mut(symbol) {
            pos.mark_price = price;
            pos.pnl = (price - pos.entry_price) * pos.amount;
            let notional = pos.amount.abs() * pos.entry_price;
            pos.pnl_percentage = if notional > 0.0 {
                (pos.pnl / notional) * 100.0
            } else {
                0.0
            };
        }
    }

    pub fn set_equity(&self, equity: f64) {
        self.state.lock().unwrap().equity = equity;
    }

    pub fn set_market_stats(&self, stats: Vec<MarketStats>) {
        self.state.lock().unwrap().stats = stats;
    }

    /// When set, every read returns an HTTP 503, simulating a dead venue.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Symbols closed via `close_position`, in order.
    pub fn closed_symbols(&self) -> Vec<String> {
        self.state.lock().unwrap().closed.clone()
    }

    pub fn open_position(&self, symbol: &str, amount: f64, entry_price: f64) {
        let mut state = self.state.lock().unwrap();
        state.marks.insert(symbol.to_string(), entry_price);
        state.positions.insert(
            symbol.to_string(),
            Position {
                symbol: symbol.to_string(),
                amount,
                entry_price,
                mark_price: entry_price,
                pnl: 0.0,
                pnl_percentage: 0.0,
                is_long: amount > 0.0,
            },
        );
    }

    fn check_reads(&self) -> ExchangeResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(ExchangeError::Http {
                status: 503,
                body: "paper venue offline".to_string(),
            });
        }
        Ok(())
    }

    fn fill(&self, symbol: &str, side: Side, usd_amount: f64) -> ExchangeResult<OrderAck> {
        if usd_amount <= 0.0 {
            return Err(ExchangeError::InvalidOrderSize {
                symbol: symbol.to_string(),
                usd_amount,
            });
        }
        let mut state = self.state.lock().unwrap();
        let mark = *state
            .marks
            .get(symbol)
            .ok_or_else(|| ExchangeError::InvalidSymbol {
                symbol: symbol.to_string(),
            })?;

        let signed = match side {
            Side::Buy => usd_amount / mark,
            Side::Sell => -(usd_amount / mark),
        };

        let entry = state.positions.get(symbol).cloned();
        let (amount, entry_price) = match entry {
            Some(pos) => {
                let combined = pos.amount + signed;
                (combined, pos.entry_price)
            }
            None => (signed, mark),
        };

        if amount == 0.0 {
            state.positions.remove(symbol);
        } else {
            state.positions.insert(
                symbol.to_string(),
                Position {
                    symbol: symbol.to_string(),
                    amount,
                    entry_price,
                    mark_price: mark,
                    pnl: (mark - entry_price) * amount,
                    pnl_percentage: 0.0,
                    is_long: amount > 0.0,
                },
            );
        }

        Ok(OrderAck {
            id: uuid::Uuid::new_v4().to_string(),
            symbol: symbol.to_string(),
            side,
            status: "filled".to_string(),
            raw: json!({ "paper": true, "mark": mark }),
        })
    }
}

#[async_trait]
impl TradingApi for PaperExchange {
    fn name(&self) -> &'static str {
        "paper"
    }

    async fn get_account_balance(&self) -> ExchangeResult<AccountBalance> {
        self.check_reads()?;
        let state = self.state.lock().unwrap();
        let unrealized: f64 = state.positions.values().map(|p| p.pnl).sum();
        Ok(AccountBalance {
            equity: state.equity + unrealized,
        })
    }

    async fn get_position(&self, symbol: &str) -> ExchangeResult<Option<Position>> {
        self.check_reads()?;
        Ok(self.state.lock().unwrap().positions.get(symbol).cloned())
    }

    async fn get_positions(&self) -> ExchangeResult<Vec<Position>> {
        self.check_reads()?;
        Ok(self.state.lock().unwrap().positions.values().cloned().collect())
    }

    async fn market_buy(
        &self,
        symbol: &str,
        usd_amount: f64,
        _leverage: u32,
    ) -> ExchangeResult<OrderAck> {
        self.fill(symbol, Side::Buy, usd_amount)
    }

    async fn market_sell(
        &self,
        symbol: &str,
        usd_amount: f64,
        _leverage: u32,
    ) -> ExchangeResult<OrderAck> {
        self.fill(symbol, Side::Sell, usd_amount)
    }

    async fn get_market_stats(&self) -> ExchangeResult<Vec<MarketStats>> {
        self.check_reads()?;
        Ok(self.state.lock().unwrap().stats.clone())
    }

    async fn close_position(&self, symbol: &str) -> ExchangeResult<()> {
        let mut state = self.state.lock().unwrap();
        let position =
            state
                .positions
                .remove(symbol)
                .ok_or_else(|| ExchangeError::PositionNotFound {
                    symbol: symbol.to_string(),
                })?;
        // Realize the P&L into equity on close.
        state.equity += position.pnl;
        state.closed.push(symbol.to_string());
        Ok(())
    }
}
