//! End-to-end orchestrator & worker suite.

use barkeep::{
    backtest::{
        worker::{BacktestWorker, InMemoryJobBus, JobBus},
        BacktestJob, BacktestOrchestrator, BacktestResult, CancelToken,
    },
    data::replay::ReplayFeed,
    execution::simulated::BacktestSettings,
    instrument::{SymbolId, Timeframe},
    strategy::{
        buy_on_first_bar::BuyOnFirstBar,
        definition::{InMemoryConfigProvider, StrategyDefinition},
        factory::StrategyFactory,
    },
    test_util::{bar, bar_ohlc, time_secs},
};
use smol_str::SmolStr;
use std::sync::Arc;
use uuid::Uuid;

const EURUSD: SymbolId = SymbolId(1);

fn job(strategy_name: &str, window_secs: i64) -> BacktestJob {
    BacktestJob {
        job_id: Uuid::new_v4(),
        strategy_name: SmolStr::new(strategy_name),
        strategy_version: None,
        symbols: vec![EURUSD],
        start_date: time_secs(0),
        end_date: time_secs(window_secs),
        parameters: serde_json::Map::new(),
        requested_at: time_secs(0),
    }
}

fn definition() -> StrategyDefinition {
    let mut definition = StrategyDefinition::new(BuyOnFirstBar::NAME, 1, Timeframe::M5);
    definition.symbols = vec![EURUSD];
    definition
}

fn orchestrator(catalog: ReplayFeed, definitions: Vec<StrategyDefinition>) -> BacktestOrchestrator {
    BacktestOrchestrator::new(
        Arc::new(catalog),
        Arc::new(InMemoryConfigProvider::new(definitions)),
        StrategyFactory::with_builtins(),
        BacktestSettings::default(),
    )
}

/// Ten flat bars: the single-shot strategy opens one position that never
/// reaches its protective levels, so no position closes inside the window.
#[tokio::test]
async fn end_to_end_flat_window_closes_nothing() {
    let mut catalog = ReplayFeed::new();
    catalog.load_bars(
        EURUSD,
        Timeframe::M5,
        (1..=10)
            .map(|index| bar(EURUSD, Timeframe::M5, 300 * index, 1.1000))
            .collect(),
    );

    let orchestrator = orchestrator(catalog, vec![definition()]);
    let result = orchestrator
        .run(&job(BuyOnFirstBar::NAME, 3_000), &CancelToken::new())
        .await;

    assert!(result.success, "unexpected error: {:?}", result.error);
    assert_eq!(result.total_trades, 0);
    assert_eq!(result.final_balance, result.initial_balance);
    assert_eq!(result.win_rate, 0.0);
}

/// A rising window carries the opened position through its take-profit; the
/// metrics must account for both commissions and the level-exact exit.
#[tokio::test]
async fn end_to_end_take_profit_within_window() {
    let settings = BacktestSettings::default();

    let mut catalog = ReplayFeed::new();
    catalog.load_bars(
        EURUSD,
        Timeframe::M5,
        vec![
            // Strategy fires on close of this bar; levels anchor at 1.1000:
            // stop 1.0980, target 1.1040 (20/40 pips)
            bar(EURUSD, Timeframe::M5, 300, 1.1000),
            // Fill at open + spread
            bar_ohlc(EURUSD, Timeframe::M5, 600, 1.1000, 1.1010, 1.0995, 1.1010),
            // Bid high 1.1046 crosses the 1.1040 target
            bar_ohlc(EURUSD, Timeframe::M5, 900, 1.1010, 1.1050, 1.1005, 1.1045),
        ],
    );

    let orchestrator = orchestrator(catalog, vec![definition()]);
    let result = orchestrator
        .run(&job(BuyOnFirstBar::NAME, 3_000), &CancelToken::new())
        .await;

    assert!(result.success);
    assert_eq!(result.total_trades, 1);

    let entry_price = 1.1000 + settings.spread;
    let pnl = (1.1040 - entry_price) * 0.01 - 2.0 * settings.commission_per_lot * 0.01;
    let expected_final = settings.initial_balance + pnl;

    assert!(
        (result.final_balance - expected_final).abs() < 1e-9,
        "final_balance={}, expected={expected_final}",
        result.final_balance
    );
    assert_eq!(result.winning_trades + result.losing_trades, result.total_trades);
}

#[tokio::test]
async fn unknown_strategy_yields_unsuccessful_result() {
    let orchestrator = orchestrator(ReplayFeed::new(), vec![definition()]);
    let result = orchestrator
        .run(&job("DoesNotExist", 3_000), &CancelToken::new())
        .await;

    assert!(!result.success);
    assert_eq!(
        result.error.as_deref(),
        Some("Unknown strategy: DoesNotExist")
    );
    assert_eq!(result.total_trades, 0);
    assert_eq!(result.final_balance, result.initial_balance);
}

#[tokio::test]
async fn cancellation_before_first_bar() {
    let mut catalog = ReplayFeed::new();
    catalog.load_bars(
        EURUSD,
        Timeframe::M5,
        (1..=10)
            .map(|index| bar(EURUSD, Timeframe::M5, 300 * index, 1.1000))
            .collect(),
    );

    let orchestrator = orchestrator(catalog, vec![definition()]);
    let cancel = CancelToken::new();
    cancel.cancel();

    let result = orchestrator.run(&job(BuyOnFirstBar::NAME, 3_000), &cancel).await;

    assert!(!result.success);
    assert!(result.error.as_deref().unwrap().contains("cancelled"));
}

/// Backtests must be independent: two runs over the same inputs produce the
/// same trading metrics.
#[tokio::test]
async fn repeated_runs_are_deterministic() {
    let mut catalog = ReplayFeed::new();
    catalog.load_bars(
        EURUSD,
        Timeframe::M5,
        vec![
            bar(EURUSD, Timeframe::M5, 300, 1.1000),
            bar_ohlc(EURUSD, Timeframe::M5, 600, 1.1000, 1.1010, 1.0995, 1.1010),
            bar_ohlc(EURUSD, Timeframe::M5, 900, 1.1010, 1.1050, 1.1005, 1.1045),
        ],
    );

    let orchestrator = orchestrator(catalog, vec![definition()]);
    let job = job(BuyOnFirstBar::NAME, 3_000);

    let first = orchestrator.run(&job, &CancelToken::new()).await;
    let second = orchestrator.run(&job, &CancelToken::new()).await;

    assert_eq!(first.final_balance, second.final_balance);
    assert_eq!(first.total_trades, second.total_trades);
    assert_eq!(first.max_drawdown_percent, second.max_drawdown_percent);
}

#[tokio::test]
async fn worker_acks_processed_jobs() {
    let bus = Arc::new(InMemoryJobBus::new(vec![job("DoesNotExist", 3_000)]));
    let worker = BacktestWorker::new(
        Arc::clone(&bus) as Arc<dyn JobBus>,
        orchestrator(ReplayFeed::new(), vec![definition()]),
    );

    worker.run().await;

    let results: Vec<BacktestResult> = bus.results();
    assert_eq!(results.len(), 1);
    assert!(!results[0].success);
    assert!(results[0]
        .error
        .as_deref()
        .unwrap()
        .starts_with("Unknown strategy"));

    assert_eq!(bus.acked(), vec![0]);
    assert!(bus.nacked().is_empty());
}

#[tokio::test]
async fn worker_nacks_for_redelivery_on_publish_failure() {
    let bus = Arc::new(InMemoryJobBus::new(vec![job("DoesNotExist", 3_000)]));
    bus.fail_next_publishes(1);

    let worker = BacktestWorker::new(
        Arc::clone(&bus) as Arc<dyn JobBus>,
        orchestrator(ReplayFeed::new(), vec![definition()]),
    );

    worker.run().await;

    // First attempt nacked & re-enqueued, second attempt published & acked
    assert_eq!(bus.nacked(), vec![0]);
    assert_eq!(bus.acked(), vec![0]);
    assert_eq!(bus.results().len(), 1);
}
