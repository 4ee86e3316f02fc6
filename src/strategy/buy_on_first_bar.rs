use crate::{
    instrument::{Quantity, SymbolId, Timeframe},
    strategy::{
        definition::StrategyDefinition, error::StrategyError, Signal, SignalContext, SignalResult,
        SignalStrategy,
    },
};
use indexmap::IndexMap;
use smol_str::SmolStr;

/// Single-shot strategy emitting one Buy on the first evaluation in which
/// main-timeframe data is present, then nothing until [`BuyOnFirstBar::reset`].
///
/// Exists for end-to-end tests & wiring smoke checks; optional definition
/// parameters `StopLossPrice`, `TakeProfitPrice` & `VolumeLots` let a test
/// attach exact protective levels to the emitted entry.
#[derive(Debug, Clone)]
pub struct BuyOnFirstBar {
    name: SmolStr,
    version: u32,
    main_timeframe: Timeframe,
    required_timeframes: IndexMap<Timeframe, usize>,
    symbols: Vec<SymbolId>,
    stop_loss: Option<f64>,
    take_profit: Option<f64>,
    volume: Option<Quantity>,
    fired: bool,
}

impl BuyOnFirstBar {
    pub const NAME: &'static str = "BuyOnFirstBar";

    /// Constructs a new [`BuyOnFirstBar`] requiring a single bar of the
    /// provided main timeframe.
    pub fn new(main_timeframe: Timeframe) -> Self {
        let mut required_timeframes = IndexMap::new();
        required_timeframes.insert(main_timeframe, 1);

        Self {
            name: SmolStr::new_static(Self::NAME),
            version: 1,
            main_timeframe,
            required_timeframes,
            symbols: Vec::new(),
            stop_loss: None,
            take_profit: None,
            volume: None,
            fired: false,
        }
    }

    /// Constructs a [`BuyOnFirstBar`] from a definition, honouring its
    /// timeframes, symbols & optional protective-level parameters.
    pub fn from_definition(definition: &StrategyDefinition) -> Result<Self, StrategyError> {
        let volume = definition
            .param_f64("VolumeLots")
            .map(Quantity::new)
            .transpose()?;

        Ok(Self {
            name: definition.name.clone(),
            version: definition.version,
            main_timeframe: definition.main_timeframe,
            required_timeframes: definition.required_timeframes.clone(),
            symbols: definition.symbols.clone(),
            stop_loss: definition.param_f64("StopLossPrice"),
            take_profit: definition.param_f64("TakeProfitPrice"),
            volume,
            fired: false,
        })
    }

    /// Whether the single shot has been fired.
    pub fn has_fired(&self) -> bool {
        self.fired
    }

    /// Re-arm the single shot.
    pub fn reset(&mut self) {
        self.fired = false;
    }
}

impl SignalStrategy for BuyOnFirstBar {
    fn name(&self) -> &SmolStr {
        &self.name
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn main_timeframe(&self) -> Timeframe {
        self.main_timeframe
    }

    fn required_timeframes(&self) -> &IndexMap<Timeframe, usize> {
        &self.required_timeframes
    }

    fn symbols(&self) -> &[SymbolId] {
        &self.symbols
    }

    fn evaluate(&mut self, context: &SignalContext) -> SignalResult {
        if self.fired {
            return SignalResult::none();
        }

        let has_data = context
            .bars(self.main_timeframe)
            .is_some_and(|bars| !bars.is_empty());

        if !has_data {
            return SignalResult::none();
        }

        self.fired = true;

        SignalResult {
            signal: Signal::Buy,
            stop_loss: self.stop_loss,
            take_profit: self.take_profit,
            volume: self.volume,
            reason: Some(SmolStr::new_static("first main-timeframe bar observed")),
        }
    }
}
