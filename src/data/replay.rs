use crate::{
    data::{Bar, DataError, MarketDataFeed},
    instrument::{SymbolId, Timeframe},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fnv::FnvHashMap;
use futures::stream::{BoxStream, StreamExt};
use itertools::Itertools;
use tracing::debug;

/// In-memory [`MarketDataFeed`] that **simulates** a live market feed by drip
/// feeding pre-loaded historical [`Bar`]s.
///
/// A fresh `ReplayFeed` is constructed per backtest run; the orchestrator
/// loads the run's bars into it and then drains [`ReplayFeed::merged_bars`]
/// chronologically.
#[derive(Debug, Clone, Default)]
pub struct ReplayFeed {
    bars: FnvHashMap<(SymbolId, Timeframe), Vec<Bar>>,
}

impl ReplayFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a (symbol, timeframe) bar series, replacing any previous series
    /// for the same pair. Bars are sorted ascending by close time on load.
    pub fn load_bars(&mut self, symbol: SymbolId, timeframe: Timeframe, mut bars: Vec<Bar>) {
        bars.sort_by_key(Bar::unix_seconds);
        debug!(
            %symbol,
            %timeframe,
            bars = bars.len(),
            "loaded bar series into ReplayFeed"
        );
        self.bars.insert((symbol, timeframe), bars);
    }

    /// All loaded bars merged into one chronological sequence, stable by
    /// (close time, symbol id) so multi-symbol replays are deterministic.
    pub fn merged_bars(&self) -> Vec<Bar> {
        self.bars
            .values()
            .map(|series| series.iter().copied())
            .kmerge_by(|lhs, rhs| {
                (lhs.time_close, lhs.symbol) < (rhs.time_close, rhs.symbol)
            })
            .collect()
    }

    /// Total number of bars loaded across all (symbol, timeframe) pairs.
    pub fn bar_count(&self) -> usize {
        self.bars.values().map(Vec::len).sum()
    }
}

#[async_trait]
impl MarketDataFeed for ReplayFeed {
    fn subscribe_bars(&self, symbol: SymbolId, timeframe: Timeframe) -> BoxStream<'static, Bar> {
        let series = self
            .bars
            .get(&(symbol, timeframe))
            .cloned()
            .unwrap_or_default();

        futures::stream::iter(series).boxed()
    }

    async fn get_history(
        &self,
        symbol: SymbolId,
        timeframe: Timeframe,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Bar>, DataError> {
        Ok(self
            .bars
            .get(&(symbol, timeframe))
            .map(|series| {
                series
                    .iter()
                    .filter(|bar| bar.time_close >= from && bar.time_close <= to)
                    .copied()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::bar;

    #[test]
    fn test_merged_bars_are_chronological_and_stable() {
        let mut feed = ReplayFeed::new();

        let symbol_a = SymbolId::new(1);
        let symbol_b = SymbolId::new(2);

        feed.load_bars(
            symbol_a,
            Timeframe::M5,
            vec![
                bar(symbol_a, Timeframe::M5, 300, 1.0),
                bar(symbol_a, Timeframe::M5, 900, 1.0),
            ],
        );
        feed.load_bars(
            symbol_b,
            Timeframe::M5,
            vec![
                bar(symbol_b, Timeframe::M5, 300, 2.0),
                bar(symbol_b, Timeframe::M5, 600, 2.0),
            ],
        );

        let merged = feed.merged_bars();
        let sequence = merged
            .iter()
            .map(|bar| (bar.unix_seconds(), bar.symbol.0))
            .collect::<Vec<_>>();

        assert_eq!(sequence, vec![(300, 1), (300, 2), (600, 2), (900, 1)]);
    }

    #[tokio::test]
    async fn test_get_history_is_inclusive_and_empty_on_unknown_pair() {
        let mut feed = ReplayFeed::new();
        let symbol = SymbolId::new(7);

        feed.load_bars(
            symbol,
            Timeframe::M5,
            vec![
                bar(symbol, Timeframe::M5, 300, 1.0),
                bar(symbol, Timeframe::M5, 600, 1.0),
                bar(symbol, Timeframe::M5, 900, 1.0),
            ],
        );

        let from = DateTime::from_timestamp(300, 0).unwrap();
        let to = DateTime::from_timestamp(600, 0).unwrap();

        let history = feed
            .get_history(symbol, Timeframe::M5, from, to)
            .await
            .unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].unix_seconds(), 300);
        assert_eq!(history[1].unix_seconds(), 600);

        let unknown = feed
            .get_history(SymbolId::new(99), Timeframe::M5, from, to)
            .await
            .unwrap();
        assert!(unknown.is_empty());
    }

    #[tokio::test]
    async fn test_subscribe_bars_drains_loaded_series() {
        let mut feed = ReplayFeed::new();
        let symbol = SymbolId::new(7);

        feed.load_bars(
            symbol,
            Timeframe::M1,
            vec![
                bar(symbol, Timeframe::M1, 60, 1.0),
                bar(symbol, Timeframe::M1, 120, 1.0),
            ],
        );

        let bars = feed
            .subscribe_bars(symbol, Timeframe::M1)
            .collect::<Vec<_>>()
            .await;
        assert_eq!(bars.len(), 2);

        let none = feed
            .subscribe_bars(symbol, Timeframe::M5)
            .collect::<Vec<_>>()
            .await;
        assert!(none.is_empty());
    }
}
