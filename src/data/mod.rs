use crate::instrument::{SymbolId, Timeframe};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// In-memory replay feed used for back-testing & optimizer sweeps.
pub mod replay;

/// OHLCV aggregation over one [`Timeframe`], timestamped by its close.
///
/// `low <= open,close <= high` is a producer-side invariant; violations are
/// treated as upstream data errors and are not policed here.
#[derive(Debug, Copy, Clone, PartialEq, PartialOrd, Deserialize, Serialize)]
pub struct Bar {
    pub symbol: SymbolId,
    pub timeframe: Timeframe,
    /// Close time of the aggregation window.
    pub time_close: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Close time as unix seconds.
    pub fn unix_seconds(&self) -> i64 {
        self.time_close.timestamp()
    }
}

/// Top-of-book quote. Unused by the bar-only simulated execution, but part of
/// the feed contract live adapters implement.
#[derive(Debug, Copy, Clone, PartialEq, PartialOrd, Deserialize, Serialize)]
pub struct Tick {
    pub time: DateTime<Utc>,
    pub symbol: SymbolId,
    pub bid: f64,
    pub ask: f64,
}

/// Market data feed consumed by the engine & the replay driver.
///
/// Implementations are either venue adapters (unbounded subscriptions) or the
/// [`replay::ReplayFeed`] (finite subscriptions drained during a backtest).
#[async_trait]
pub trait MarketDataFeed: Send + Sync {
    /// Stream of closing [`Bar`]s for the provided (symbol, timeframe) pair.
    /// Finite for replay feeds, unbounded for live feeds.
    fn subscribe_bars(&self, symbol: SymbolId, timeframe: Timeframe) -> BoxStream<'static, Bar>;

    /// Stream of [`Tick`]s for the provided symbol. Optional; the default
    /// implementation yields nothing.
    fn subscribe_ticks(&self, _symbol: SymbolId) -> BoxStream<'static, Tick> {
        futures::stream::empty().boxed()
    }

    /// Historical [`Bar`]s in `[from, to]` (inclusive on both ends), sorted
    /// ascending by close time. Empty on an unknown (symbol, timeframe) pair.
    async fn get_history(
        &self,
        symbol: SymbolId,
        timeframe: Timeframe,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Bar>, DataError>;
}

/// Market data specific errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataError {
    #[error("historical bar fetch failed: {0}")]
    Fetch(String),

    #[error("bar subscription failed: {0}")]
    Subscribe(String),
}
