//! Funding-rate scanner.
//!
//! Pulls current funding across markets, ranks the extremes on both sides,
//! asks the LLM for a one-line read on the standouts, and writes a CSV
//! artifact.

use async_trait::async_trait;
use tracing::info;

use crate::error::AgentError;
use crate::exchange::FundingRate;

use super::{Agent, AgentOutcome, CycleContext};

const TOP_N: usize = 3;
// Commentary wants a steady voice, not creative variance.
const COMMENTARY_TEMPERATURE: f32 = 0.3;

const SYSTEM_PROMPT: &str = r#"You are a perp funding-rate analyst.

You are given the most extreme funding rates across markets (annualized
percentages). Longs pay shorts when funding is positive. In one or two plain
sentences, say what the extremes imply about positioning. No JSON, no lists.
"#;

/// Rank the most positive and most negative funding rates. Ties keep the
/// first-seen market.
pub fn find_anomalies(
    rates: &[FundingRate],
    top_n: usize,
) -> (Vec<FundingRate>, Vec<FundingRate>) {
    let mut sorted = rates.to_vec();
    sorted.sort_by(|a, b| {
        b.annualized_pct
            .partial_cmp(&a.annualized_pct)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let top_positive: Vec<FundingRate> = sorted
        .iter()
        .filter(|r| r.annualized_pct > 0.0)
        .take(top_n)
        .cloned()
        .collect();
    let top_negative: Vec<FundingRate> = sorted
        .iter()
        .rev()
        .filter(|r| r.annualized_pct < 0.0)
        .take(top_n)
        .cloned()
        .collect();
    (top_positive, top_negative)
}

pub fn to_csv(rates: &[FundingRate], commentary: &str) -> String {
    let mut out = String::from("symbol,hourly_rate,annualized_pct\n");
    for r in rates {
        out.push_str(&format!("{},{},{:.4}\n", r.symbol, r.rate, r.annualized_pct));
    }
    out.push_str(&format!("\n# {}\n", commentary.replace('\n', " ")));
    out
}

#[derive(Debug)]
pub struct FundingAgent;

#[async_trait]
impl Agent for FundingAgent {
    fn name(&self) -> &'static str {
        "funding"
    }

    async fn run(&self, cx: &CycleContext) -> Result<AgentOutcome, AgentError> {
        let rates = cx
            .exchange
            .get_funding_rates()
            .await
            .map_err(|e| AgentError::DataUnavailable(format!("funding rates: {e}")))?;
        if rates.is_empty() {
            return Err(AgentError::DataUnavailable(
                "venue reported no funding rates".to_string(),
            ));
        }

        let (top_positive, top_negative) = find_anomalies(&rates, TOP_N);
        info!(
            markets = rates.len(),
            extremes = top_positive.len() + top_negative.len(),
            "funding: scan complete"
        );

        let mut extremes = top_positive;
        extremes.extend(top_negative);

        let user_content = extremes
            .iter()
            .map(|r| format!("{}: {:.2}% annualized", r.symbol, r.annualized_pct))
            .collect::<Vec<_>>()
            .join("\n");
        let commentary = cx
            .llm
            .generate_response(
                SYSTEM_PROMPT,
                &user_content,
                COMMENTARY_TEMPERATURE,
                cx.config.llm.max_tokens,
            )
            .await?;

        cx.artifacts.write_text(
            self.name(),
            &crate::artifacts::ArtifactWriter::stamped_name("funding", "csv"),
            &to_csv(&extremes, &commentary),
        )?;

        Ok(AgentOutcome::new(format!(
            "{} markets scanned, {} extremes flagged",
            rates.len(),
            extremes.len()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rate(symbol: &str, hourly: f64) -> FundingRate {
        FundingRate::from_hourly(symbol.to_string(), hourly)
    }

    #[test]
    fn test_find_anomalies_picks_true_extremes() {
        let rates = vec![
            rate("BTC", 0.0000125),
            rate("ETH", 0.0002),
            rate("SOL", -0.0003),
            rate("DOGE", 0.0005),
            rate("WIF", -0.0001),
            rate("HYPE", 0.0001),
        ];

        let (pos, neg) = find_anomalies(&rates, 3);

        assert_eq!(pos[0].symbol, "DOGE");
        assert_eq!(pos[1].symbol, "ETH");
        assert_eq!(pos[2].symbol, "HYPE");
        assert_eq!(neg[0].symbol, "SOL");
        assert_eq!(neg[1].symbol, "WIF");
    }

    #[test]
    fn test_find_anomalies_skips_zero_rates() {
        let rates = vec![rate("BTC", 0.0), rate("ETH", 0.0001)];
        let (pos, neg) = find_anomalies(&rates, 3);
        assert_eq!(pos.len(), 1);
        assert!(neg.is_empty());
    }

    #[test]
    fn test_csv_shape() {
        let rates = vec![rate("BTC", 0.0000125)];
        let csv = to_csv(&rates, "calm market\nnothing notable");
        assert!(csv.starts_with("symbol,hourly_rate,annualized_pct\n"));
        assert!(csv.contains("BTC,0.0000125,10.95"));
        assert!(csv.contains("# calm market nothing notable"));
    }
}
