//! Integration tests for the orchestrator loop: gating, isolation,
//! ordering and cooperative cancellation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::timeout;

use riskgate::agents::risk::RiskGate;
use riskgate::agents::{Agent, AgentOutcome, CycleContext};
use riskgate::artifacts::ArtifactWriter;
use riskgate::config::AppConfig;
use riskgate::error::{AgentError, ProviderError};
use riskgate::exchange::paper::PaperExchange;
use riskgate::llm::LlmClient;
use riskgate::orchestrator::{LoopState, Orchestrator};

fn test_config() -> AppConfig {
    let yaml = r#"
exchange: "paper"
symbols:
  - "BTC"
sleep_interval_minutes: 60

agents:
  - name: "trading"
    enabled: true

risk:
  max_loss_usd: 500.0
  max_gain_usd: 1000.0
  minimum_balance_usd: 100.0
  max_position_percentage: 0.3

llm:
  provider: "ollama"
  model: "llama3.2"

paper:
  starting_equity: 1000.0
"#;
    let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
    config.validate().unwrap();
    config
}

/// Test double that records every invocation and can fail, stall, or
/// request shutdown mid-run.
#[derive(Debug)]
struct StubAgent {
    name: &'static str,
    log: Arc<Mutex<Vec<String>>>,
    runs: Arc<AtomicUsize>,
    fail: bool,
    shutdown_on_run: Option<watch::Sender<bool>>,
}

impl StubAgent {
    fn new(name: &'static str, log: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            name,
            log,
            runs: Arc::new(AtomicUsize::new(0)),
            fail: false,
            shutdown_on_run: None,
        }
    }

    fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    fn requesting_shutdown(mut self, tx: watch::Sender<bool>) -> Self {
        self.shutdown_on_run = Some(tx);
        self
    }

    fn run_counter(&self) -> Arc<AtomicUsize> {
        self.runs.clone()
    }
}

#[async_trait]
impl Agent for StubAgent {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn run(&self, cx: &CycleContext) -> Result<AgentOutcome, AgentError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        self.log
            .lock()
            .unwrap()
            .push(format!("{}:{}", self.name, cx.cycle));

        if let Some(tx) = &self.shutdown_on_run {
            // Simulates SIGINT arriving while this agent is mid-call.
            let _ = tx.send(true);
        }
        if self.fail {
            return Err(AgentError::Provider(ProviderError::Timeout(
                "llm call timed out".to_string(),
            )));
        }
        Ok(AgentOutcome::new("done"))
    }
}

struct Harness {
    orchestrator: Orchestrator,
    exchange: Arc<PaperExchange>,
    shutdown_tx: watch::Sender<bool>,
    _dir: tempfile::TempDir,
}

fn harness(starting_equity: f64, agents: Vec<Box<dyn Agent>>) -> Harness {
    let config = test_config();
    let exchange = Arc::new(PaperExchange::new(starting_equity));
    let dir = tempfile::tempdir().unwrap();
    let artifacts = ArtifactWriter::new(dir.path());
    let gate = RiskGate::new(exchange.clone(), config.risk.clone(), artifacts.clone());
    let llm = LlmClient::from_config(&config.llm).unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let orchestrator = Orchestrator::new(
        gate,
        agents,
        exchange.clone(),
        llm,
        config,
        artifacts,
        shutdown_rx,
    );
    Harness {
        orchestrator,
        exchange,
        shutdown_tx,
        _dir: dir,
    }
}

async fn run_until_stopped(orchestrator: &mut Orchestrator) {
    timeout(Duration::from_secs(5), orchestrator.run())
        .await
        .expect("orchestrator did not stop in time");
}

/// Gate not-ok means no agent runs that cycle.
#[tokio::test]
async fn test_blocked_cycle_skips_all_agents() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let agent = StubAgent::new("trading", log.clone());
    let runs = agent.run_counter();

    // Equity below the 100 USD floor: every cycle is blocked.
    let mut h = harness(80.0, vec![Box::new(agent)]);

    let tx = h.shutdown_tx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let _ = tx.send(true);
    });
    run_until_stopped(&mut h.orchestrator).await;

    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert!(log.lock().unwrap().is_empty());
    assert!(h.orchestrator.cycles_completed() >= 1);
    assert_eq!(h.orchestrator.state(), LoopState::Stopped);
    // No positions were open, so the floor breach had nothing to close.
    assert!(h.exchange.closed_symbols().is_empty());
}

/// One agent failing does not stop the next agent in the same cycle.
#[tokio::test]
async fn test_agent_failure_is_isolated() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sentiment = StubAgent::new("sentiment", log.clone()).failing();
    let whale = StubAgent::new("whale", log.clone());
    let whale_runs = whale.run_counter();

    let mut h = harness(1000.0, vec![Box::new(sentiment), Box::new(whale)]);

    let tx = h.shutdown_tx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let _ = tx.send(true);
    });
    run_until_stopped(&mut h.orchestrator).await;

    // The failing agent ran first, then the healthy one still completed.
    let entries = log.lock().unwrap().clone();
    assert_eq!(entries[0], "sentiment:1");
    assert_eq!(entries[1], "whale:1");
    assert!(whale_runs.load(Ordering::SeqCst) >= 1);
}

/// Agents run sequentially in configured order within a cycle.
#[tokio::test]
async fn test_agents_run_in_configured_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let first = StubAgent::new("first", log.clone());
    let second = StubAgent::new("second", log.clone());
    let third = StubAgent::new("third", log.clone());

    let mut h = harness(
        1000.0,
        vec![Box::new(first), Box::new(second), Box::new(third)],
    );

    let tx = h.shutdown_tx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let _ = tx.send(true);
    });
    run_until_stopped(&mut h.orchestrator).await;

    let entries = log.lock().unwrap().clone();
    assert_eq!(entries[..3], ["first:1", "second:1", "third:1"]);
}

/// A stop request during an agent's run halts after that agent returns;
/// later agents in the cycle never start.
#[tokio::test]
async fn test_stop_mid_cycle_skips_remaining_agents() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let config = test_config();
    let exchange = Arc::new(PaperExchange::new(1000.0));
    let dir = tempfile::tempdir().unwrap();
    let artifacts = ArtifactWriter::new(dir.path());
    let gate = RiskGate::new(exchange.clone(), config.risk.clone(), artifacts.clone());
    let llm = LlmClient::from_config(&config.llm).unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // The first agent requests shutdown from inside its own run, simulating
    // SIGINT landing mid-call.
    let trading = StubAgent::new("trading", log.clone()).requesting_shutdown(shutdown_tx);
    let never = StubAgent::new("never", log.clone());
    let never_runs = never.run_counter();

    let mut orchestrator = Orchestrator::new(
        gate,
        vec![Box::new(trading), Box::new(never)],
        exchange,
        llm,
        config,
        artifacts,
        shutdown_rx,
    );
    run_until_stopped(&mut orchestrator).await;

    let entries = log.lock().unwrap().clone();
    assert_eq!(entries, vec!["trading:1".to_string()]);
    assert_eq!(never_runs.load(Ordering::SeqCst), 0);
    assert_eq!(orchestrator.cycles_completed(), 1);
    assert_eq!(orchestrator.state(), LoopState::Stopped);
}

fn harness_with_exchange(exchange: Arc<PaperExchange>, agents: Vec<Box<dyn Agent>>) -> Harness {
    let config = test_config();
    let dir = tempfile::tempdir().unwrap();
    let artifacts = ArtifactWriter::new(dir.path());
    let gate = RiskGate::new(exchange.clone(), config.risk.clone(), artifacts.clone());
    let llm = LlmClient::from_config(&config.llm).unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let orchestrator = Orchestrator::new(
        gate,
        agents,
        exchange.clone(),
        llm,
        config,
        artifacts,
        shutdown_rx,
    );
    Harness {
        orchestrator,
        exchange,
        shutdown_tx,
        _dir: dir,
    }
}

/// A manual trigger cuts the sleep short and starts the next cycle.
#[tokio::test]
async fn test_manual_trigger_starts_next_cycle() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let agent = StubAgent::new("trading", log.clone());
    let runs = agent.run_counter();

    let mut h = harness(1000.0, vec![Box::new(agent)]);
    let trigger = h.orchestrator.trigger();
    let tx = h.shutdown_tx.clone();
    tokio::spawn(async move {
        // Skip the first sleep (60 min otherwise), then stop during the
        // second one.
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.notify_one();
        tokio::time::sleep(Duration::from_millis(200)).await;
        let _ = tx.send(true);
    });
    run_until_stopped(&mut h.orchestrator).await;

    assert!(runs.load(Ordering::SeqCst) >= 2);
    assert!(h.orchestrator.cycles_completed() >= 2);
}

/// The gate's force-close side effect is visible through the venue before
/// any agent observes the cycle.
#[tokio::test]
async fn test_max_loss_force_close_happens_before_agents() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let agent = StubAgent::new("trading", log.clone());
    let runs = agent.run_counter();

    let exchange = Arc::new(PaperExchange::new(1000.0));
    exchange.open_position("BTC", 0.002, 50_000.0);
    let mut h = harness_with_exchange(exchange.clone(), vec![Box::new(agent)]);

    // First cycle anchors the day at 1000; crash equity before cycle two.
    let trigger = h.orchestrator.trigger();
    let tx = h.shutdown_tx.clone();
    let crash_exchange = exchange.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        crash_exchange.set_equity(300.0); // 700 USD down on the day
        trigger.notify_one();
        tokio::time::sleep(Duration::from_millis(200)).await;
        let _ = tx.send(true);
    });
    run_until_stopped(&mut h.orchestrator).await;

    // Agents ran in cycle 1 (clear) but not cycle 2 (max_loss), and the
    // position was force-closed.
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(exchange.closed_symbols(), vec!["BTC".to_string()]);
}
