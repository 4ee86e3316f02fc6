use crate::{
    clock::SimulatedClock,
    data::{replay::ReplayFeed, MarketDataFeed},
    engine::TradingEngine,
    error::BarkeepError,
    event::NullEventSink,
    execution::simulated::{BacktestSettings, SimulatedExecution},
    instrument::{Currency, SymbolId},
    portfolio::AccountLedger,
    strategy::{
        composed::ComposedStrategy, definition::StrategyConfigProvider, factory::StrategyFactory,
    },
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::{info, warn};
use uuid::Uuid;

/// Reduction of executed trades into a [`BacktestResult`].
pub mod summary;

/// Bus-facing worker consuming [`BacktestJob`]s with at-least-once delivery.
pub mod worker;

/// Request to replay a strategy over a historical window.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BacktestJob {
    pub job_id: Uuid,
    pub strategy_name: SmolStr,
    pub strategy_version: Option<u32>,
    /// Symbols to replay; falls back to the definition's symbol list when
    /// empty.
    pub symbols: Vec<SymbolId>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    /// Parameter overrides applied on top of the stored definition, eg/ by an
    /// optimizer sweep.
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,
    pub requested_at: DateTime<Utc>,
}

/// Outcome of one backtest run.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BacktestResult {
    pub job_id: Uuid,
    pub success: bool,
    pub error: Option<String>,
    pub initial_balance: f64,
    pub final_balance: f64,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub profit_factor: f64,
    pub max_drawdown_percent: f64,
    pub win_rate: f64,
    pub completed_at: DateTime<Utc>,
}

impl BacktestResult {
    /// Unsuccessful result with zeroed metrics.
    pub fn failure(job_id: Uuid, initial_balance: f64, error: String) -> Self {
        Self {
            job_id,
            success: false,
            error: Some(error),
            initial_balance,
            final_balance: initial_balance,
            total_trades: 0,
            winning_trades: 0,
            losing_trades: 0,
            profit_factor: 0.0,
            max_drawdown_percent: 0.0,
            win_rate: 0.0,
            completed_at: Utc::now(),
        }
    }
}

/// Cooperative cancellation flag checked by the orchestrator between bars.
/// The engine itself ignores cancellation; any in-flight bar completes.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Drives one deterministic replay per [`BacktestJob`]: resolves the strategy,
/// wires a fresh clock/executor/feed/engine, replays the window's bars
/// chronologically and reduces the executed trades into a [`BacktestResult`].
///
/// Every run owns its state exclusively, so optimizer sweeps parallelise by
/// running many orchestrator calls concurrently.
pub struct BacktestOrchestrator {
    catalog: Arc<dyn MarketDataFeed>,
    provider: Arc<dyn StrategyConfigProvider>,
    factory: StrategyFactory,
    settings: BacktestSettings,
}

impl BacktestOrchestrator {
    /// Constructs a new [`BacktestOrchestrator`] borrowing the external candle
    /// catalog & strategy configuration provider.
    pub fn new(
        catalog: Arc<dyn MarketDataFeed>,
        provider: Arc<dyn StrategyConfigProvider>,
        factory: StrategyFactory,
        settings: BacktestSettings,
    ) -> Self {
        Self {
            catalog,
            provider,
            factory,
            settings,
        }
    }

    /// Run `job` to completion. Never errors into the caller: every failure
    /// mode is folded into an unsuccessful [`BacktestResult`].
    pub async fn run(&self, job: &BacktestJob, cancel: &CancelToken) -> BacktestResult {
        match self.replay(job, cancel).await {
            Ok(result) => result,
            Err(err) => {
                warn!(job_id = %job.job_id, %err, "backtest failed");
                BacktestResult::failure(job.job_id, self.settings.initial_balance, err.to_string())
            }
        }
    }

    async fn replay(
        &self,
        job: &BacktestJob,
        cancel: &CancelToken,
    ) -> Result<BacktestResult, BarkeepError> {
        // Resolve the latest enabled definition & apply job overrides
        let Some(mut definition) = self.provider.load_by_name(&job.strategy_name).await? else {
            return Ok(BacktestResult::failure(
                job.job_id,
                self.settings.initial_balance,
                format!("Unknown strategy: {}", job.strategy_name),
            ));
        };

        if let Some(version) = job.strategy_version {
            if version != definition.version {
                warn!(
                    job_id = %job.job_id,
                    requested = version,
                    resolved = definition.version,
                    "job requested a non-latest strategy version, using latest"
                );
            }
        }

        definition.merge_parameters(&job.parameters);

        let Some(strategy) = self.factory.create_from_definition(&definition) else {
            return Ok(BacktestResult::failure(
                job.job_id,
                self.settings.initial_balance,
                format!("Unknown strategy: {}", job.strategy_name),
            ));
        };
        let strategy = ComposedStrategy::from_definition(strategy, &definition)?;

        // Fresh collaborators per run; no state is shared across runs
        let clock = SimulatedClock::new(job.start_date);
        let ledger = AccountLedger::new(self.settings.initial_balance, Currency::usd());
        let execution = Arc::new(Mutex::new(SimulatedExecution::new(
            self.settings,
            clock.clone(),
            ledger.clone(),
        )));
        let mut engine = TradingEngine::new(
            Arc::clone(&execution),
            clock.clone(),
            NullEventSink,
            ledger,
        );
        engine.register_strategy(Box::new(strategy));

        // Load the window's bars for every symbol at the main timeframe
        let symbols = if job.symbols.is_empty() {
            definition.symbols.clone()
        } else {
            job.symbols.clone()
        };

        let mut feed = ReplayFeed::new();
        for symbol in symbols {
            let bars = self
                .catalog
                .get_history(
                    symbol,
                    definition.main_timeframe,
                    job.start_date,
                    job.end_date,
                )
                .await?;
            feed.load_bars(symbol, definition.main_timeframe, bars);
        }

        let bars = feed.merged_bars();
        info!(
            job_id = %job.job_id,
            strategy = %definition.name,
            version = definition.version,
            bars = bars.len(),
            "replaying backtest window"
        );

        for bar in &bars {
            if cancel.is_cancelled() {
                return Ok(BacktestResult::failure(
                    job.job_id,
                    self.settings.initial_balance,
                    "Backtest cancelled".to_string(),
                ));
            }

            clock.advance_to(bar.time_close)?;
            execution.lock().process_bar(bar);
            engine.on_bar_closed(bar);
        }

        let execution = execution.lock();
        Ok(summary::reduce(
            job.job_id,
            execution.trades(),
            self.settings.initial_balance,
        ))
    }
}
