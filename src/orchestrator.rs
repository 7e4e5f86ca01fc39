//! The risk-gated dispatch loop.
//!
//! Each cycle: evaluate the risk gate, then run the enabled agents
//! sequentially if (and only if) the verdict is ok, then sleep. The gate's
//! verdict for a cycle is fully resolved before any agent starts, and an
//! agent failure never stops the loop or the other agents in that cycle.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::agents::risk::RiskGate;
use crate::agents::{Agent, CycleContext};
use crate::artifacts::ArtifactWriter;
use crate::config::AppConfig;
use crate::exchange::TradingApi;
use crate::llm::LlmClient;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    RunningRisk,
    RunningAgents,
    Sleeping,
    Stopped,
}

pub struct Orchestrator {
    gate: RiskGate,
    agents: Vec<Box<dyn Agent>>,
    exchange: Arc<dyn TradingApi>,
    llm: LlmClient,
    config: AppConfig,
    artifacts: ArtifactWriter,
    shutdown: watch::Receiver<bool>,
    trigger: Arc<Notify>,
    state: LoopState,
    cycle: u64,
}

impl Orchestrator {
    pub fn new(
        gate: RiskGate,
        agents: Vec<Box<dyn Agent>>,
        exchange: Arc<dyn TradingApi>,
        llm: LlmClient,
        config: AppConfig,
        artifacts: ArtifactWriter,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            gate,
            agents,
            exchange,
            llm,
            config,
            artifacts,
            shutdown,
            trigger: Arc::new(Notify::new()),
            state: LoopState::Idle,
            cycle: 0,
        }
    }

    /// Handle that skips the current sleep and starts the next cycle
    /// immediately.
    pub fn trigger(&self) -> Arc<Notify> {
        self.trigger.clone()
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn cycles_completed(&self) -> u64 {
        self.cycle
    }

    fn stop_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Run until a stop is requested. Cooperative: the stop flag is checked
    /// at cycle start and between agent invocations; in-flight calls finish
    /// before the loop stops.
    pub async fn run(&mut self) {
        info!(
            exchange = self.exchange.name(),
            agents = self.agents.len(),
            interval_minutes = self.config.sleep_interval_minutes,
            "orchestrator started"
        );

        loop {
            if self.stop_requested() {
                break;
            }
            self.cycle += 1;

            self.state = LoopState::RunningRisk;
            let verdict = self.gate.evaluate(self.cycle).await;
            info!(
                cycle = self.cycle,
                ok = verdict.ok,
                reason = verdict.reason.as_str(),
                balance = verdict.metrics.get("balance"),
                pnl = verdict.metrics.get("pnl"),
                exposure = verdict.metrics.get("exposure"),
                "risk verdict"
            );

            if verdict.ok {
                self.state = LoopState::RunningAgents;
                self.run_agents().await;
            } else {
                warn!(
                    cycle = self.cycle,
                    reason = verdict.reason.as_str(),
                    "cycle blocked by risk gate, agents skipped"
                );
            }

            if self.stop_requested() {
                break;
            }

            self.state = LoopState::Sleeping;
            let interval = Duration::from_secs(self.config.sleep_interval_minutes * 60);
            tokio::select! {
                _ = sleep(interval) => {}
                _ = self.trigger.notified() => {
                    info!(cycle = self.cycle, "manual trigger, starting next cycle now");
                }
                _ = self.shutdown.changed() => {}
            }
        }

        self.state = LoopState::Stopped;
        info!(cycles = self.cycle, "orchestrator stopped");
    }

    async fn run_agents(&mut self) {
        let cx = CycleContext {
            cycle: self.cycle,
            exchange: self.exchange.clone(),
            llm: self.llm.clone(),
            config: self.config.clone(),
            artifacts: self.artifacts.clone(),
        };

        for agent in &self.agents {
            if self.stop_requested() {
                info!(
                    cycle = self.cycle,
                    "stop requested, skipping remaining agents this cycle"
                );
                break;
            }

            match agent.run(&cx).await {
                Ok(outcome) => {
                    info!(
                        cycle = self.cycle,
                        agent = agent.name(),
                        "agent completed: {}",
                        outcome.summary
                    );
                }
                Err(e) => {
                    // Isolation boundary: log and move on to the next agent.
                    error!(
                        cycle = self.cycle,
                        agent = agent.name(),
                        "agent failed: {e}"
                    );
                }
            }
        }
    }
}
