//! Altcoin volume scanner.
//!
//! Ranks the top altcoin markets by 24h notional volume (majors excluded),
//! diffs the ranking against the snapshot persisted last cycle to surface
//! volume acceleration, rank climbs, and new entries, then asks the LLM for
//! a volume-only pick and writes a CSV artifact.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::AgentError;
use crate::exchange::MarketStats;

use super::{Agent, AgentOutcome, CycleContext};

const TOP_N: usize = 15;
const EXCLUDED: [&str; 3] = ["BTC", "ETH", "SOL"];
const SNAPSHOT_ARTIFACT: &str = "last_snapshot.json";

const SYSTEM_PROMPT: &str = r#"You are a volume tracker analyzing perp market volume patterns.

Your ONLY job is to identify volume acceleration and momentum. Do NOT consider
price, funding rates, or any other data.

You are given the current top altcoins by 24h volume, with the change since
the last check and rank movement for each.

Based on volume data only, which token would you buy right now? Consider only
volume acceleration, absolute volume size, rank climbing, new entries with
strong volume, and sustained growth versus flash spikes. Give your pick and
your reasoning in 2-3 sentences.
"#;

/// Ranking entry persisted between cycles so the next run can diff.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub symbol: String,
    pub rank: usize,
    pub volume_24h: f64,
}

/// One market's movement since the previous snapshot.
#[derive(Clone, Debug, Serialize)]
pub struct VolumeChange {
    pub symbol: String,
    pub rank: usize,
    pub volume_24h: f64,
    pub mark_price: f64,
    pub change_24h_pct: f64,
    /// Volume change since the last check, percent. `None` for new entries.
    pub volume_change_pct: Option<f64>,
    /// Positive means the market climbed the ranking.
    pub rank_change: Option<i64>,
    pub new_entry: bool,
}

/// Top markets by 24h volume, majors filtered out. Ties keep the
/// first-seen market.
pub fn rank_by_volume(stats: &[MarketStats], excluded: &[&str], top_n: usize) -> Vec<MarketStats> {
    let mut sorted: Vec<MarketStats> = stats
        .iter()
        .filter(|s| !excluded.contains(&s.symbol.as_str()))
        .cloned()
        .collect();
    sorted.sort_by(|a, b| {
        b.volume_24h
            .partial_cmp(&a.volume_24h)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    sorted.truncate(top_n);
    sorted
}

/// Diff the current ranking against the previous snapshot. With no previous
/// snapshot every market is a new entry, which is what a first run is.
pub fn diff_against(current: &[MarketStats], previous: &[SnapshotEntry]) -> Vec<VolumeChange> {
    current
        .iter()
        .enumerate()
        .map(|(i, stats)| {
            let rank = i + 1;
            let prior = previous.iter().find(|p| p.symbol == stats.symbol);
            match prior {
                Some(p) => VolumeChange {
                    symbol: stats.symbol.clone(),
                    rank,
                    volume_24h: stats.volume_24h,
                    mark_price: stats.mark_price,
                    change_24h_pct: stats.change_24h_pct,
                    volume_change_pct: (p.volume_24h > 0.0)
                        .then(|| (stats.volume_24h - p.volume_24h) / p.volume_24h * 100.0),
                    rank_change: Some(p.rank as i64 - rank as i64),
                    new_entry: false,
                },
                None => VolumeChange {
                    symbol: stats.symbol.clone(),
                    rank,
                    volume_24h: stats.volume_24h,
                    mark_price: stats.mark_price,
                    change_24h_pct: stats.change_24h_pct,
                    volume_change_pct: None,
                    rank_change: None,
                    new_entry: true,
                },
            }
        })
        .collect()
}

/// "$1.25B", "$43.10M", "$987.00K".
pub fn format_volume(volume: f64) -> String {
    if volume >= 1_000_000_000.0 {
        format!("${:.2}B", volume / 1_000_000_000.0)
    } else if volume >= 1_000_000.0 {
        format!("${:.2}M", volume / 1_000_000.0)
    } else {
        format!("${:.2}K", volume / 1_000.0)
    }
}

fn build_user_content(changes: &[VolumeChange]) -> String {
    let mut out = String::new();
    for c in changes {
        out.push_str(&format!(
            "{}. {}: 24h volume {}\n",
            c.rank,
            c.symbol,
            format_volume(c.volume_24h)
        ));
        match c.volume_change_pct {
            Some(pct) => out.push_str(&format!("   volume change since last check: {pct:+.1}%\n")),
            None => out.push_str("   volume change since last check: NEW ENTRY\n"),
        }
        match c.rank_change {
            Some(delta) if delta > 0 => {
                out.push_str(&format!("   rank movement: climbed {delta} spots\n"))
            }
            Some(delta) if delta < 0 => {
                out.push_str(&format!("   rank movement: dropped {} spots\n", -delta))
            }
            Some(_) => out.push_str("   rank movement: stable\n"),
            None => out.push_str("   rank movement: new entry\n"),
        }
    }
    out
}

pub fn to_csv(changes: &[VolumeChange], pick: &str) -> String {
    let mut out =
        String::from("rank,symbol,volume_24h,price,change_24h_pct,volume_change_pct,rank_change\n");
    for c in changes {
        let vol_chg = c
            .volume_change_pct
            .map(|p| format!("{p:.2}"))
            .unwrap_or_else(|| "new".to_string());
        let rank_chg = c
            .rank_change
            .map(|r| r.to_string())
            .unwrap_or_else(|| "new".to_string());
        out.push_str(&format!(
            "{},{},{:.0},{},{:.2},{},{}\n",
            c.rank, c.symbol, c.volume_24h, c.mark_price, c.change_24h_pct, vol_chg, rank_chg
        ));
    }
    out.push_str(&format!("\n# {}\n", pick.replace('\n', " ")));
    out
}

#[derive(Debug)]
pub struct VolumeAgent;

#[async_trait]
impl Agent for VolumeAgent {
    fn name(&self) -> &'static str {
        "volume"
    }

    async fn run(&self, cx: &CycleContext) -> Result<AgentOutcome, AgentError> {
        let stats = cx
            .exchange
            .get_market_stats()
            .await
            .map_err(|e| AgentError::DataUnavailable(format!("market stats: {e}")))?;

        let ranked = rank_by_volume(&stats, &EXCLUDED, TOP_N);
        if ranked.is_empty() {
            return Err(AgentError::DataUnavailable(
                "venue reported no market stats".to_string(),
            ));
        }

        let previous: Vec<SnapshotEntry> = cx
            .artifacts
            .read_json(self.name(), SNAPSHOT_ARTIFACT)?
            .unwrap_or_default();
        let changes = diff_against(&ranked, &previous);

        let new_entries = changes.iter().filter(|c| c.new_entry).count();
        info!(
            markets = ranked.len(),
            new_entries, "volume: ranking complete"
        );

        let pick = cx
            .llm
            .generate_response(
                SYSTEM_PROMPT,
                &build_user_content(&changes),
                cx.config.llm.temperature,
                cx.config.llm.max_tokens,
            )
            .await?;

        cx.artifacts.write_text(
            self.name(),
            &crate::artifacts::ArtifactWriter::stamped_name("volume", "csv"),
            &to_csv(&changes, &pick),
        )?;

        let snapshot: Vec<SnapshotEntry> = changes
            .iter()
            .map(|c| SnapshotEntry {
                symbol: c.symbol.clone(),
                rank: c.rank,
                volume_24h: c.volume_24h,
            })
            .collect();
        cx.artifacts
            .write_json(self.name(), SNAPSHOT_ARTIFACT, &snapshot)?;

        Ok(AgentOutcome::new(format!(
            "{} markets ranked, {} new entries",
            changes.len(),
            new_entries
        )))
    }
}
