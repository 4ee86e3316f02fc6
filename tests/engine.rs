//! Engine wiring suite: cache behaviour & signal-to-fill flow through the
//! public seams.

use barkeep::{
    clock::SimulatedClock,
    engine::{TradingEngine, BAR_CACHE_CAPACITY},
    event::{ChannelEventSink, Event, NullEventSink},
    execution::simulated::{BacktestSettings, SimulatedExecution},
    instrument::{Currency, SymbolId, Timeframe},
    portfolio::AccountLedger,
    strategy::{
        buy_on_first_bar::BuyOnFirstBar, definition::StrategyDefinition, factory::StrategyFactory,
    },
    test_util::{bar, bar_ohlc, time_secs},
};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio_stream::StreamExt;

const EURUSD: SymbolId = SymbolId(1);

type SimExecution = SimulatedExecution<SimulatedClock>;

fn harness<Sink: barkeep::event::EventSink>(
    sink: Sink,
) -> (
    TradingEngine<SimExecution, SimulatedClock, Sink>,
    Arc<Mutex<SimExecution>>,
    SimulatedClock,
) {
    let clock = SimulatedClock::new(time_secs(0));
    let ledger = AccountLedger::new(10_000.0, Currency::usd());
    let execution = Arc::new(Mutex::new(SimulatedExecution::new(
        BacktestSettings::default(),
        clock.clone(),
        ledger.clone(),
    )));
    let engine = TradingEngine::new(Arc::clone(&execution), clock.clone(), sink, ledger);

    (engine, execution, clock)
}

/// Drive one bar the way the replay loop does: clock, executor, engine.
fn step(
    engine: &mut TradingEngine<SimExecution, SimulatedClock, NullEventSink>,
    execution: &Arc<Mutex<SimExecution>>,
    clock: &SimulatedClock,
    bar: barkeep::data::Bar,
) {
    clock.advance_to(bar.time_close).unwrap();
    execution.lock().process_bar(&bar);
    engine.on_bar_closed(&bar);
}

#[test]
fn signal_fills_on_next_bar_and_exits_on_target() {
    let (mut engine, execution, clock) = harness(NullEventSink);

    let factory = StrategyFactory::with_builtins();
    let mut definition = StrategyDefinition::new(BuyOnFirstBar::NAME, 1, Timeframe::M5);
    definition
        .parameters
        .insert("TakeProfitPrice".to_string(), 1.1100.into());
    engine.register_strategy(factory.create_from_definition(&definition).unwrap());

    // Bar 1: strategy fires, order rests
    step(
        &mut engine,
        &execution,
        &clock,
        bar(EURUSD, Timeframe::M5, 300, 1.1000),
    );
    assert_eq!(execution.lock().pending_orders().len(), 1);
    assert!(execution.lock().open_positions().is_empty());

    // Bar 2: order fills at the open + spread
    step(
        &mut engine,
        &execution,
        &clock,
        bar_ohlc(EURUSD, Timeframe::M5, 600, 1.1010, 1.1020, 1.1000, 1.1015),
    );
    {
        let execution = execution.lock();
        assert!(execution.pending_orders().is_empty());
        assert_eq!(execution.open_positions().len(), 1);
        assert!((execution.open_positions()[0].entry_price - 1.1014).abs() < 1e-9);
    }

    // Bar 3: target reached, position closes exactly at the level
    step(
        &mut engine,
        &execution,
        &clock,
        bar_ohlc(EURUSD, Timeframe::M5, 900, 1.1050, 1.1150, 1.1040, 1.1120),
    );
    {
        let execution = execution.lock();
        assert!(execution.open_positions().is_empty());
        assert_eq!(execution.closed_positions().len(), 1);
        assert!((execution.trades().last().unwrap().price - 1.1100).abs() < 1e-9);
    }
}

#[test]
fn cache_caps_at_the_retention_window() {
    let (mut engine, _, clock) = harness(NullEventSink);

    for index in 0..(BAR_CACHE_CAPACITY as i64 + 250) {
        let bar = bar(EURUSD, Timeframe::M1, 60 * (index + 1), 1.1);
        clock.advance_to(bar.time_close).unwrap();
        engine.on_bar_closed(&bar);
    }

    assert_eq!(
        engine.cached_bar_count(EURUSD, Timeframe::M1),
        BAR_CACHE_CAPACITY
    );
}

#[test]
fn duplicate_delivery_is_harmless() {
    let (mut engine, execution, clock) = harness(NullEventSink);

    engine.register_strategy(Box::new(BuyOnFirstBar::new(Timeframe::M5)));

    let first = bar(EURUSD, Timeframe::M5, 300, 1.1);
    clock.advance_to(first.time_close).unwrap();
    execution.lock().process_bar(&first);
    engine.on_bar_closed(&first);

    let cached = engine.cached_bar_count(EURUSD, Timeframe::M5);
    let pending = execution.lock().pending_orders().len();

    // Double delivery of the same bar to the engine ingress
    engine.on_bar_closed(&first);

    assert_eq!(engine.cached_bar_count(EURUSD, Timeframe::M5), cached);
    assert_eq!(execution.lock().pending_orders().len(), pending);
}

#[tokio::test]
async fn order_placement_publishes_status_events() {
    let (sink, events) = ChannelEventSink::channel();
    let (mut engine, _, clock) = harness(sink);

    engine.register_strategy(Box::new(BuyOnFirstBar::new(Timeframe::M5)));

    let first = bar(EURUSD, Timeframe::M5, 300, 1.1);
    clock.advance_to(first.time_close).unwrap();
    engine.on_bar_closed(&first);
    drop(engine);

    let events: Vec<Event> = events.collect().await;
    assert_eq!(events.len(), 2);
    assert!(matches!(events[0], Event::Order(_)));
    assert!(matches!(
        &events[1],
        Event::EngineStatus(status) if status.starts_with("Order placed: Buy 0.01 @")
    ));
}
