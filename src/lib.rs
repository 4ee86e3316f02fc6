//! # Barkeep
//! [`Barkeep`] is a Rust framework for driving **bar-driven trading strategies**
//! against live, paper or historical markets with one shared engine core.
//! Strategies are backtested on a near-identical system to live trading: the
//! mode is decided purely by the four side-effecting collaborators an engine
//! is wired with, never by the engine itself.
//!
//! ## Overview
//! At a high level, the crate provides several de-coupled components that
//! interact via a set of traits:
//!
//! * **Data**: The MarketDataFeed trait governs the delivery of [`Bar`]s, the
//!   system heartbeat. A ReplayFeed implementation drip-feeds pre-loaded
//!   historical bars for deterministic backtests; live adapters push an
//!   unbounded subscription through the same seam.
//! * **Engine**: The TradingEngine holds a rolling per-(symbol, timeframe) bar
//!   window, evaluates registered strategies on each close of their main
//!   timeframe, and translates entry signals into market order requests.
//! * **Strategy**: The SignalStrategy trait governs signal generation over a
//!   multi-timeframe context. Strategies are described by versioned,
//!   JSON-parameterised definitions and instantiated through an explicit
//!   name registry, then composed with stop-loss, take-profit &
//!   position-sizing policies.
//! * **Execution**: The OrderExecution trait governs order placement. The
//!   SimulatedExecution implementation is a deterministic bar-level broker:
//!   orders rest until the next bar's open, buys pay the spread, stops incur
//!   adverse slippage and protective levels are never evaluated on the entry
//!   bar.
//! * **Backtest**: The BacktestOrchestrator replays a historical window
//!   through a fresh engine/executor pair and reduces the executed trades
//!   into profit factor, win rate, max drawdown & balance metrics; a
//!   bus-facing worker runs jobs with at-least-once delivery.
//!
//! [`Barkeep`]: https://github.com/barkeep-rs/barkeep
//! [`Bar`]: crate::data::Bar

/// Backtest job & result messages, the replay orchestrator and the bus-facing
/// worker.
pub mod backtest;

/// Clock capability abstracting "now" so the engine core is reusable across
/// live & simulated time.
pub mod clock;

/// Defines a [`Bar`](data::Bar) & [`Tick`](data::Tick), and the market data
/// feed contract delivering them. Contains the in-memory ReplayFeed used by
/// backtests.
pub mod data;

/// Bar-driven [`TradingEngine`](engine::TradingEngine): rolling bar cache,
/// strategy dispatch on main-timeframe closes & signal-to-order translation.
pub mod engine;

/// Barkeep top-level error.
pub mod error;

/// Defines an [`Event`](event::Event) enum & the fire-and-forget
/// [`EventSink`](event::EventSink) capability used to fan out orders, trades,
/// positions & engine status messages.
pub mod event;

/// Order execution contract & the deterministic
/// [`SimulatedExecution`](execution::simulated::SimulatedExecution) broker.
pub mod execution;

/// Value objects shared across the crate: symbol & timeframe identifiers,
/// unit-safe lot sizes & single-currency money.
pub mod instrument;

/// Tracing subscriber initialisation.
pub mod logging;

/// Account ledger & aggregated portfolio view.
pub mod portfolio;

/// Pluggable stop-loss, take-profit & position-sizing policies parameterised
/// from strategy definitions.
pub mod risk;

/// Iterative trading performance metrics (profit factor, win rate, max
/// drawdown).
pub mod statistic;

/// Signal strategy capability, versioned definitions, the explicit strategy
/// registry & risk composition.
pub mod strategy;

/// Barkeep core test utilities.
pub mod test_util;
