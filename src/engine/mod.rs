use crate::{
    clock::Clock,
    data::Bar,
    event::EventSink,
    execution::{OrderExecution, OrderRequest, OrderType},
    instrument::{Quantity, SymbolId, Timeframe},
    portfolio::AccountLedger,
    strategy::{SignalContext, SignalStrategy},
};
use fnv::FnvHashMap;
use futures::stream::{BoxStream, StreamExt};
use parking_lot::Mutex;
use std::{collections::VecDeque, sync::Arc};
use tracing::{debug, info, warn};

/// Maximum bars retained per (symbol, timeframe). The oldest bar is evicted
/// once the window is full.
pub const BAR_CACHE_CAPACITY: usize = 1000;

/// Lot size used when a strategy endorses an entry without suggesting one.
pub const DEFAULT_ORDER_VOLUME_LOTS: f64 = 0.01;

/// Bar-driven trading engine.
///
/// One engine core serves live trading, paper trading & backtesting; the mode
/// is decided purely by the execution handler, clock & event sink it is wired
/// with. [`TradingEngine::on_bar_closed`] is the only ingress point: it rolls
/// the per-(symbol, timeframe) bar window forward, evaluates every strategy
/// whose main timeframe closed, and translates entry signals into market
/// order requests.
///
/// The engine is single-threaded; each bar is processed to completion before
/// the next is accepted.
pub struct TradingEngine<Execution, C, Sink>
where
    Execution: OrderExecution,
    C: Clock,
    Sink: EventSink,
{
    execution: Arc<Mutex<Execution>>,
    clock: C,
    event_tx: Sink,
    ledger: AccountLedger,
    strategies: Vec<Box<dyn SignalStrategy>>,
    cache: FnvHashMap<SymbolId, FnvHashMap<Timeframe, VecDeque<Bar>>>,
}

impl<Execution, C, Sink> TradingEngine<Execution, C, Sink>
where
    Execution: OrderExecution,
    C: Clock,
    Sink: EventSink,
{
    /// Constructs a new [`TradingEngine`] wiring the four collaborators.
    pub fn new(
        execution: Arc<Mutex<Execution>>,
        clock: C,
        event_tx: Sink,
        ledger: AccountLedger,
    ) -> Self {
        Self {
            execution,
            clock,
            event_tx,
            ledger,
            strategies: Vec::new(),
            cache: FnvHashMap::default(),
        }
    }

    /// Append a strategy to the active strategy list.
    pub fn register_strategy(&mut self, strategy: Box<dyn SignalStrategy>) {
        info!(
            strategy = %strategy.name(),
            version = strategy.version(),
            main_timeframe = %strategy.main_timeframe(),
            "registered strategy"
        );
        self.strategies.push(strategy);
    }

    /// Number of cached bars for the provided (symbol, timeframe).
    pub fn cached_bar_count(&self, symbol: SymbolId, timeframe: Timeframe) -> usize {
        self.cache
            .get(&symbol)
            .and_then(|timeframes| timeframes.get(&timeframe))
            .map_or(0, VecDeque::len)
    }

    /// Ingest one closing [`Bar`].
    ///
    /// Updates the rolling cache, then evaluates every registered strategy
    /// whose main timeframe matches. A bar that does not advance the cache
    /// (duplicate or older close time) is dropped without dispatch, which
    /// makes double delivery of the same bar safe. Order placement failures
    /// become engine-status events and are never propagated to the caller.
    pub fn on_bar_closed(&mut self, bar: &Bar) {
        if !Self::update_cache(&mut self.cache, bar) {
            debug!(
                symbol = %bar.symbol,
                timeframe = %bar.timeframe,
                time_close = %bar.time_close,
                "dropped non-advancing bar"
            );
            return;
        }

        let Self {
            execution,
            clock,
            event_tx,
            ledger,
            strategies,
            cache,
        } = self;

        for strategy in strategies
            .iter_mut()
            .filter(|strategy| strategy.main_timeframe() == bar.timeframe)
            .filter(|strategy| {
                strategy.symbols().is_empty() || strategy.symbols().contains(&bar.symbol)
            })
        {
            let Some(context) = Self::build_context(cache, ledger, clock, strategy.as_ref(), bar)
            else {
                // Insufficient history for one of the required timeframes
                debug!(
                    strategy = %strategy.name(),
                    symbol = %bar.symbol,
                    "skipped evaluation, context incomplete"
                );
                continue;
            };

            let result = strategy.evaluate(&context);
            let Some(side) = result.signal.side() else {
                continue;
            };

            let volume = result.volume.unwrap_or_else(|| {
                Quantity::new(DEFAULT_ORDER_VOLUME_LOTS)
                    .unwrap_or_default()
            });

            let request = OrderRequest {
                symbol: bar.symbol,
                side,
                order_type: OrderType::Market,
                volume,
                price: None,
                stop_loss: result.stop_loss,
                take_profit: result.take_profit,
                client_order_id: Some(smol_str::SmolStr::new(format!(
                    "{}-{}",
                    strategy.name(),
                    clock.unix_seconds()
                ))),
                strategy: Some(strategy.name().clone()),
            };

            match execution.lock().place_order(request) {
                Ok(order) => {
                    info!(
                        strategy = %strategy.name(),
                        order_id = %order.id,
                        %side,
                        %volume,
                        symbol = %bar.symbol,
                        "placed order from signal"
                    );
                    event_tx.publish_order(&order);
                    event_tx.publish_engine_status(format!(
                        "Order placed: {side} {volume} @ {}",
                        bar.symbol
                    ));
                }
                Err(err) => {
                    warn!(
                        strategy = %strategy.name(),
                        symbol = %bar.symbol,
                        %err,
                        "order placement failed"
                    );
                    event_tx.publish_engine_status(format!("Order failed: {err}"));
                }
            }
        }
    }

    /// Drive the engine from a bar stream until it ends. Live mode feeds an
    /// unbounded subscription; each delivered bar is processed to completion
    /// before the next is polled.
    pub async fn run(&mut self, mut bars: BoxStream<'_, Bar>) {
        while let Some(bar) = bars.next().await {
            self.on_bar_closed(&bar);
        }
        info!("bar stream ended, engine run complete");
    }

    /// Append `bar` if it advances the (symbol, timeframe) window, evicting
    /// the oldest bar beyond capacity. Returns whether the bar was appended.
    fn update_cache(
        cache: &mut FnvHashMap<SymbolId, FnvHashMap<Timeframe, VecDeque<Bar>>>,
        bar: &Bar,
    ) -> bool {
        let window = cache
            .entry(bar.symbol)
            .or_default()
            .entry(bar.timeframe)
            .or_insert_with(|| VecDeque::with_capacity(BAR_CACHE_CAPACITY));

        if let Some(last) = window.back() {
            if bar.time_close <= last.time_close {
                return false;
            }
        }

        window.push_back(*bar);
        if window.len() > BAR_CACHE_CAPACITY {
            window.pop_front();
        }

        true
    }

    /// Build the evaluation context for `strategy` at `bar`'s symbol, or
    /// `None` if any required timeframe lacks history.
    fn build_context(
        cache: &FnvHashMap<SymbolId, FnvHashMap<Timeframe, VecDeque<Bar>>>,
        ledger: &AccountLedger,
        clock: &C,
        strategy: &dyn SignalStrategy,
        bar: &Bar,
    ) -> Option<SignalContext> {
        let timeframes = cache.get(&bar.symbol)?;
        let mut market_data = FnvHashMap::default();

        for (timeframe, count) in strategy.required_timeframes() {
            let window = timeframes.get(timeframe)?;
            if window.len() < *count {
                return None;
            }

            market_data.insert(
                *timeframe,
                window.iter().skip(window.len() - count).copied().collect(),
            );
        }

        Some(SignalContext {
            symbol: bar.symbol,
            market_data,
            account_balance: ledger.balance(),
            time: clock.now(),
        })
    }
}
