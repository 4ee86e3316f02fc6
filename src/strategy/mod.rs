use crate::{
    data::Bar,
    execution::Side,
    instrument::{Quantity, SymbolId, Timeframe},
};
use chrono::{DateTime, Utc};
use fnv::FnvHashMap;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Strategy module specific errors.
pub mod error;

/// Versioned, JSON-parameterised strategy definitions & their provider
/// contract.
pub mod definition;

/// Explicit name -> constructor registry replacing any attribute-based
/// discovery of strategy implementations.
pub mod factory;

/// Single-shot strategy emitting one Buy on the first evaluated bar. Used by
/// end-to-end tests & as the simplest registry entry.
pub mod buy_on_first_bar;

/// RSI threshold strategy parameterised from a definition.
pub mod rsi;

/// Composition of a signal strategy with stop-loss, take-profit &
/// position-sizing policies.
pub mod composed;

/// Direction a strategy endorses on evaluation.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default, Deserialize, Serialize,
)]
pub enum Signal {
    #[default]
    None,
    Buy,
    Sell,
}

impl Signal {
    /// Order [`Side`] this signal translates to, if it is an entry.
    pub fn side(&self) -> Option<Side> {
        match self {
            Signal::None => None,
            Signal::Buy => Some(Side::Buy),
            Signal::Sell => Some(Side::Sell),
        }
    }
}

/// Market snapshot a strategy evaluates against.
///
/// `market_data` holds, per required timeframe, the most recent cached bars in
/// chronological order, sized to the strategy's requirement.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalContext {
    pub symbol: SymbolId,
    pub market_data: FnvHashMap<Timeframe, Vec<Bar>>,
    pub account_balance: f64,
    pub time: DateTime<Utc>,
}

impl SignalContext {
    /// Bars of the requested [`Timeframe`], oldest first.
    pub fn bars(&self, timeframe: Timeframe) -> Option<&[Bar]> {
        self.market_data
            .get(&timeframe)
            .map(|bars| bars.as_slice())
    }

    /// Close price of the most recent bar of the requested [`Timeframe`].
    pub fn latest_close(&self, timeframe: Timeframe) -> Option<f64> {
        self.bars(timeframe)
            .and_then(|bars| bars.last())
            .map(|bar| bar.close)
    }
}

/// Advisory output of one strategy evaluation.
///
/// Protective levels are absolute prices. When a signal strategy leaves them
/// unset, its composed risk policies fill them in
/// (see [`composed::ComposedStrategy`]).
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct SignalResult {
    pub signal: Signal,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub volume: Option<Quantity>,
    pub reason: Option<SmolStr>,
}

impl SignalResult {
    /// A no-action result.
    pub fn none() -> Self {
        Self::default()
    }

    /// An entry result in the provided direction with no levels attached.
    pub fn entry(signal: Signal) -> Self {
        Self {
            signal,
            ..Self::default()
        }
    }
}

/// Signal generation capability.
///
/// A strategy is evaluated on every close of its main timeframe for which a
/// complete context could be built. Implementations may carry internal state
/// (eg/ "already fired") but must not assume anything about engine state.
pub trait SignalStrategy: Send {
    fn name(&self) -> &SmolStr;

    fn version(&self) -> u32;

    /// Timeframe whose bar close triggers evaluation.
    fn main_timeframe(&self) -> Timeframe;

    /// Timeframes & minimum bar counts required to build a [`SignalContext`].
    /// Absence of any suppresses evaluation for that bar.
    fn required_timeframes(&self) -> &IndexMap<Timeframe, usize>;

    /// Symbols this strategy trades. An empty slice means every symbol the
    /// engine sees.
    fn symbols(&self) -> &[SymbolId] {
        &[]
    }

    fn evaluate(&mut self, context: &SignalContext) -> SignalResult;
}
