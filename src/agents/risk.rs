//! The risk gate: decides once per cycle whether trading-capable agents may
//! run at all.
//!
//! Checks run in a fixed order (balance floor, max loss, max gain, oversized
//! position) and the first failing check is the one reported. Any data-fetch
//! failure fails closed: the verdict is not-ok with reason
//! `data_unavailable`, never ok.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::artifacts::ArtifactWriter;
use crate::config::{OversizedPolicy, RiskConfig};
use crate::exchange::{Position, TradingApi};

pub const GATE_NAME: &str = "risk";
const ANCHOR_ARTIFACT: &str = "day_anchor.json";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskReason {
    Clear,
    BalanceFloor,
    MaxLoss,
    MaxGainTakeProfit,
    OversizedPosition,
    DataUnavailable,
}

impl RiskReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskReason::Clear => "clear",
            RiskReason::BalanceFloor => "balance_floor",
            RiskReason::MaxLoss => "max_loss",
            RiskReason::MaxGainTakeProfit => "max_gain_take_profit",
            RiskReason::OversizedPosition => "oversized_position",
            RiskReason::DataUnavailable => "data_unavailable",
        }
    }
}

/// Verdict for one cycle. Produced fresh every cycle, never carried over.
#[derive(Clone, Debug, Serialize)]
pub struct RiskVerdict {
    pub ok: bool,
    pub reason: RiskReason,
    pub metrics: HashMap<String, f64>,
}

impl RiskVerdict {
    fn ok(metrics: HashMap<String, f64>) -> Self {
        Self {
            ok: true,
            reason: RiskReason::Clear,
            metrics,
        }
    }

    fn blocked(reason: RiskReason, metrics: HashMap<String, f64>) -> Self {
        Self {
            ok: false,
            reason,
            metrics,
        }
    }
}

/// Start-of-day equity anchor for the tracked P&L window. Persisted so a
/// restart within the same UTC day keeps the same window.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
struct DayAnchor {
    date: NaiveDate,
    equity: f64,
}

/// Outcome of the pure decision step, before any side effects run.
#[derive(Debug, PartialEq)]
pub struct RiskDecision {
    pub reason: RiskReason,
    /// Symbols the gate wants force-closed.
    pub close: CloseRequest,
}

#[derive(Debug, PartialEq)]
pub enum CloseRequest {
    None,
    All,
    Symbols(Vec<String>),
}

/// Fixed-order threshold evaluation. Pure so the ordering contract is
/// directly testable.
pub fn decide(
    equity: f64,
    day_start_equity: f64,
    positions: &[Position],
    config: &RiskConfig,
) -> RiskDecision {
    if equity < config.minimum_balance_usd {
        return RiskDecision {
            reason: RiskReason::BalanceFloor,
            close: CloseRequest::All,
        };
    }

    let loss = day_start_equity - equity;
    if loss > config.max_loss_usd {
        return RiskDecision {
            reason: RiskReason::MaxLoss,
            close: CloseRequest::All,
        };
    }

    let gain = equity - day_start_equity;
    if gain > config.max_gain_usd {
        return RiskDecision {
            reason: RiskReason::MaxGainTakeProfit,
            close: CloseRequest::All,
        };
    }

    if equity > 0.0 {
        let oversized: Vec<String> = positions
            .iter()
            .filter(|p| p.value() / equity > config.max_position_percentage)
            .map(|p| p.symbol.clone())
            .collect();
        if !oversized.is_empty() {
            let close = match config.oversized_policy {
                OversizedPolicy::ForceClose => CloseRequest::Symbols(oversized),
                OversizedPolicy::BlockOnly => CloseRequest::None,
            };
            return RiskDecision {
                reason: RiskReason::OversizedPosition,
                close,
            };
        }
    }

    RiskDecision {
        reason: RiskReason::Clear,
        close: CloseRequest::None,
    }
}

pub struct RiskGate {
    exchange: Arc<dyn TradingApi>,
    config: RiskConfig,
    artifacts: ArtifactWriter,
    anchor: Mutex<Option<DayAnchor>>,
}

impl RiskGate {
    pub fn new(exchange: Arc<dyn TradingApi>, config: RiskConfig, artifacts: ArtifactWriter) -> Self {
        Self {
            exchange,
            config,
            artifacts,
            anchor: Mutex::new(None),
        }
    }

    /// Evaluate the gate for one cycle. Never returns an error: failures
    /// fold into a not-ok `data_unavailable` verdict.
    pub async fn evaluate(&self, cycle: u64) -> RiskVerdict {
        self.evaluate_on(cycle, chrono::Utc::now().date_naive()).await
    }

    pub(crate) async fn evaluate_on(&self, cycle: u64, today: NaiveDate) -> RiskVerdict {
        let balance = match self.exchange.get_account_balance().await {
            Ok(b) => b,
            Err(e) => {
                warn!(cycle, "risk gate: balance fetch failed, failing closed: {e}");
                return RiskVerdict::blocked(RiskReason::DataUnavailable, HashMap::new());
            }
        };

        let positions = match self.exchange.get_positions().await {
            Ok(p) => p,
            Err(e) => {
                warn!(cycle, "risk gate: position fetch failed, failing closed: {e}");
                return RiskVerdict::blocked(RiskReason::DataUnavailable, HashMap::new());
            }
        };

        let day_start_equity = self.day_start_equity(today, balance.equity);
        let exposure: f64 = positions.iter().map(|p| p.value()).sum();

        let mut metrics = HashMap::new();
        metrics.insert("balance".to_string(), balance.equity);
        metrics.insert("day_start_equity".to_string(), day_start_equity);
        metrics.insert("pnl".to_string(), balance.equity - day_start_equity);
        metrics.insert("exposure".to_string(), exposure);
        metrics.insert("open_positions".to_string(), positions.len() as f64);

        let decision = decide(balance.equity, day_start_equity, &positions, &self.config);

        match decision.close {
            CloseRequest::None => {}
            CloseRequest::All => {
                self.force_close(positions.iter().map(|p| p.symbol.as_str()), cycle)
                    .await;
            }
            CloseRequest::Symbols(ref symbols) => {
                self.force_close(symbols.iter().map(|s| s.as_str()), cycle)
                    .await;
            }
        }

        if decision.reason == RiskReason::Clear {
            RiskVerdict::ok(metrics)
        } else {
            RiskVerdict::blocked(decision.reason, metrics)
        }
    }

    /// Anchor equity for today's P&L window, re-anchoring on day rollover.
    fn day_start_equity(&self, today: NaiveDate, current_equity: f64) -> f64 {
        let mut cached = self.anchor.lock().unwrap();

        if cached.is_none() {
            match self.artifacts.read_json::<DayAnchor>(GATE_NAME, ANCHOR_ARTIFACT) {
                Ok(stored) => *cached = stored,
                Err(e) => warn!("risk gate: could not read day anchor: {e}"),
            }
        }

        match *cached {
            Some(anchor) if anchor.date == today => anchor.equity,
            _ => {
                let anchor = DayAnchor {
                    date: today,
                    equity: current_equity,
                };
                if let Err(e) = self
                    .artifacts
                    .write_json(GATE_NAME, ANCHOR_ARTIFACT, &anchor)
                {
                    warn!("risk gate: could not persist day anchor: {e}");
                }
                info!(
                    "risk gate: anchored P&L window at equity {:.2} for {}",
                    current_equity, today
                );
                *cached = Some(anchor);
                anchor.equity
            }
        }
    }

    /// Close the given positions. Failures are logged and do not change the
    /// verdict; the position state is re-fetched next cycle anyway.
    async fn force_close<'a>(&self, symbols: impl Iterator<Item = &'a str>, cycle: u64) {
        for symbol in symbols {
            info!(cycle, symbol, "risk gate: force-closing position");
            if let Err(e) = self.exchange.close_position(symbol).await {
                error!(cycle, symbol, "risk gate: force-close failed: {e}");
            }
        }
    }
}
