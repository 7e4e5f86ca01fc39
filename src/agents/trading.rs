//! LLM-driven trading agent.
//!
//! Per symbol: recent candles in, a strict-JSON BUY/SELL/NOTHING decision
//! out, and a market order through the exchange adapter when the model is
//! confident. One JSON decision artifact per cycle.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::AgentError;
use crate::exchange::Candle;

use super::{Agent, AgentOutcome, CycleContext};

/// Below this confidence the decision is recorded but not executed.
const MIN_CONFIDENCE: f64 = 0.6;

const SYSTEM_PROMPT: &str = r#"You are a disciplined crypto trading analyst.

You are given recent OHLCV candles and the current open position (if any)
for one symbol. Decide whether to BUY, SELL, or do NOTHING.

Rules:
1. Trade trends, not noise. If the data is ambiguous, answer NOTHING.
2. SELL means close or reduce an existing long; do not SELL with no position.
3. Be conservative: NOTHING is the correct answer most of the time.

Output MUST be a single valid JSON object, nothing else:
{
    "action": "BUY" | "SELL" | "NOTHING",
    "confidence": 0.0 to 1.0,
    "reasoning": "One or two sentences."
}
"#;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeAction {
    Buy,
    Sell,
    Nothing,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TradeDecision {
    pub action: TradeAction,
    pub confidence: f64,
    pub reasoning: String,
}

/// Extract the decision JSON from model output, tolerating fences and
/// surrounding chatter.
pub fn parse_decision(raw: &str) -> Result<TradeDecision, AgentError> {
    let start = raw
        .find('{')
        .ok_or_else(|| AgentError::Parse(format!("no JSON object in model output: {raw}")))?;
    let end = raw
        .rfind('}')
        .ok_or_else(|| AgentError::Parse(format!("unterminated JSON object: {raw}")))?;

    let decision: TradeDecision = serde_json::from_str(&raw[start..=end])
        .map_err(|e| AgentError::Parse(format!("bad decision JSON: {e}")))?;

    if !(0.0..=1.0).contains(&decision.confidence) {
        return Err(AgentError::Parse(format!(
            "confidence out of range: {}",
            decision.confidence
        )));
    }
    Ok(decision)
}

/// Compact candle table for the prompt.
pub fn format_candles(candles: &[Candle]) -> String {
    let mut out = String::from("time_ms,open,high,low,close,volume\n");
    for c in candles.iter().rev().take(48).rev() {
        out.push_str(&format!(
            "{},{},{},{},{},{}\n",
            c.open_time_ms, c.open, c.high, c.low, c.close, c.volume
        ));
    }
    out
}

#[derive(Serialize)]
struct DecisionRecord {
    cycle: u64,
    symbol: String,
    decision: TradeDecision,
    executed: bool,
    note: String,
}

#[derive(Debug)]
pub struct TradingAgent;

#[async_trait]
impl Agent for TradingAgent {
    fn name(&self) -> &'static str {
        "trading"
    }

    async fn run(&self, cx: &CycleContext) -> Result<AgentOutcome, AgentError> {
        let mut records = Vec::new();
        let mut executed = 0usize;

        for symbol in &cx.config.symbols {
            let candles = cx
                .exchange
                .get_candles(symbol, "1h")
                .await
                .map_err(|e| AgentError::DataUnavailable(format!("candles for {symbol}: {e}")))?;
            if candles.is_empty() {
                warn!(symbol, "trading: no candle history, skipping symbol");
                continue;
            }

            let position = cx.exchange.get_position(symbol).await?;
            let position_desc = match &position {
                Some(p) => format!(
                    "{} {} @ entry {:.4} (pnl {:.2}%)",
                    if p.is_long { "LONG" } else { "SHORT" },
                    p.amount.abs(),
                    p.entry_price,
                    p.pnl_percentage
                ),
                None => "none".to_string(),
            };

            let user_content = format!(
                "Symbol: {symbol}\nOpen position: {position_desc}\nRecent 1h candles:\n{}",
                format_candles(&candles)
            );

            let response = cx
                .llm
                .generate_response(
                    SYSTEM_PROMPT,
                    &user_content,
                    cx.config.llm.temperature,
                    cx.config.llm.max_tokens,
                )
                .await?;
            let decision = parse_decision(&response)?;
            info!(
                symbol,
                action = ?decision.action,
                confidence = decision.confidence,
                "trading: model decision"
            );

            let (did_execute, note) = self.execute(cx, symbol, &position, &decision).await;
            if did_execute {
                executed += 1;
            }
            records.push(DecisionRecord {
                cycle: cx.cycle,
                symbol: symbol.clone(),
                decision,
                executed: did_execute,
                note,
            });
        }

        cx.artifacts.write_json(
            self.name(),
            &crate::artifacts::ArtifactWriter::stamped_name("decisions", "json"),
            &records,
        )?;

        Ok(AgentOutcome::new(format!(
            "{} decisions, {} executed",
            records.len(),
            executed
        )))
    }
}

impl TradingAgent {
    /// Apply one decision. Exchange rejections are reported in the record,
    /// not retried this cycle; position state is re-fetched next cycle.
    async fn execute(
        &self,
        cx: &CycleContext,
        symbol: &str,
        position: &Option<crate::exchange::Position>,
        decision: &TradeDecision,
    ) -> (bool, String) {
        if decision.confidence < MIN_CONFIDENCE {
            return (false, format!("below confidence floor {MIN_CONFIDENCE}"));
        }

        match decision.action {
            TradeAction::Nothing => (false, "no trade".to_string()),
            TradeAction::Buy => {
                if position.is_some() {
                    return (false, "position already open".to_string());
                }
                match cx
                    .exchange
                    .market_buy(symbol, cx.config.order_size_usd, cx.config.default_leverage)
                    .await
                {
                    Ok(ack) => (true, format!("buy filled: {}", ack.status)),
                    Err(e) => {
                        warn!(symbol, "trading: buy rejected: {e}");
                        (false, format!("buy rejected: {e}"))
                    }
                }
            }
            TradeAction::Sell => match position {
                Some(p) if p.is_long => match cx.exchange.close_position(symbol).await {
                    Ok(()) => (true, "position closed".to_string()),
                    Err(e) => {
                        warn!(symbol, "trading: close rejected: {e}");
                        (false, format!("close rejected: {e}"))
                    }
                },
                _ => (false, "no long position to sell".to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_decision_plain_json() {
        let raw = r#"{"action": "BUY", "confidence": 0.8, "reasoning": "Breakout."}"#;
        let d = parse_decision(raw).unwrap();
        assert_eq!(d.action, TradeAction::Buy);
        assert_eq!(d.confidence, 0.8);
    }

    #[test]
    fn test_parse_decision_fenced_json() {
        let raw = "Here is my analysis:\n```json\n{\"action\": \"NOTHING\", \"confidence\": 0.4, \"reasoning\": \"Chop.\"}\n```";
        let d = parse_decision(raw).unwrap();
        assert_eq!(d.action, TradeAction::Nothing);
    }

    #[test]
    fn test_parse_decision_rejects_garbage() {
        assert!(parse_decision("I would buy BTC here").is_err());
        assert!(parse_decision("{\"action\": \"HODL\"}").is_err());
    }

    #[test]
    fn test_parse_decision_rejects_bad_confidence() {
        let raw = r#"{"action": "SELL", "confidence": 1.5, "reasoning": "x"}"#;
        assert!(parse_decision(raw).is_err());
    }

    #[test]
    fn test_format_candles_caps_history() {
        let candles: Vec<Candle> = (0..100)
            .map(|i| Candle {
                open_time_ms: i,
                open: 1.0,
                high: 2.0,
                low: 0.5,
                close: 1.5,
                volume: 10.0,
            })
            .collect();
        let table = format_candles(&candles);
        // Header plus at most 48 rows, keeping the most recent.
        assert_eq!(table.lines().count(), 49);
        assert!(table.contains("\n99,"));
        assert!(!table.contains("\n10,"));
    }
}
