use crate::{
    execution::Side,
    instrument::{SymbolId, Timeframe},
    risk::{
        build_position_sizing, build_stop_loss, build_take_profit, PositionSizer, RiskError,
        StopLossPolicy, TakeProfitPolicy,
    },
    strategy::{definition::StrategyDefinition, SignalContext, SignalResult, SignalStrategy},
};
use indexmap::IndexMap;
use smol_str::SmolStr;
use tracing::warn;

/// Default pip size in raw price units, used when a definition does not carry
/// a `PipSize` parameter.
pub const DEFAULT_PIP_SIZE: f64 = 0.0001;

/// A signal strategy composed with stop-loss, take-profit & position-sizing
/// policies.
///
/// The wrapped strategy decides direction; the policies decide distances (in
/// pips) and volume. Pip distances are converted to absolute price levels
/// anchored at the latest main-timeframe close, so every [`SignalResult`]
/// leaving this wrapper carries prices a broker can act on. Fields the inner
/// strategy already set are left untouched.
pub struct ComposedStrategy {
    inner: Box<dyn SignalStrategy>,
    stop_loss: Box<dyn StopLossPolicy>,
    take_profit: Box<dyn TakeProfitPolicy>,
    sizing: Box<dyn PositionSizer>,
    pip_size: f64,
}

impl ComposedStrategy {
    /// Compose `inner` with the risk policies described by `definition`.
    pub fn from_definition(
        inner: Box<dyn SignalStrategy>,
        definition: &StrategyDefinition,
    ) -> Result<Self, RiskError> {
        Ok(Self {
            inner,
            stop_loss: build_stop_loss(&definition.risk.stop_loss)?,
            take_profit: build_take_profit(&definition.risk.take_profit)?,
            sizing: build_position_sizing(&definition.risk.position_sizing)?,
            pip_size: definition.param_f64("PipSize").unwrap_or(DEFAULT_PIP_SIZE),
        })
    }

    fn apply_risk(
        &self,
        context: &SignalContext,
        side: Side,
        result: &mut SignalResult,
    ) -> Result<(), RiskError> {
        let stop_loss_pips = self.stop_loss.stop_loss_pips(context)?;
        let take_profit_pips = self.take_profit.take_profit_pips(context, stop_loss_pips)?;
        let volume = self.sizing.volume(context, stop_loss_pips)?;

        let Some(anchor) = context.latest_close(self.inner.main_timeframe()) else {
            return Err(RiskError::InvalidArgument(
                "no main-timeframe close to anchor protective levels".to_string(),
            ));
        };

        let (stop_loss, take_profit) = match side {
            Side::Buy => (
                anchor - stop_loss_pips * self.pip_size,
                anchor + take_profit_pips * self.pip_size,
            ),
            Side::Sell => (
                anchor + stop_loss_pips * self.pip_size,
                anchor - take_profit_pips * self.pip_size,
            ),
        };

        result.stop_loss.get_or_insert(stop_loss);
        result.take_profit.get_or_insert(take_profit);
        result.volume.get_or_insert(volume);

        Ok(())
    }
}

impl SignalStrategy for ComposedStrategy {
    fn name(&self) -> &SmolStr {
        self.inner.name()
    }

    fn version(&self) -> u32 {
        self.inner.version()
    }

    fn main_timeframe(&self) -> Timeframe {
        self.inner.main_timeframe()
    }

    fn required_timeframes(&self) -> &IndexMap<Timeframe, usize> {
        self.inner.required_timeframes()
    }

    fn symbols(&self) -> &[SymbolId] {
        self.inner.symbols()
    }

    fn evaluate(&mut self, context: &SignalContext) -> SignalResult {
        let mut result = self.inner.evaluate(context);

        let Some(side) = result.signal.side() else {
            return result;
        };

        if let Err(err) = self.apply_risk(context, side, &mut result) {
            warn!(
                strategy = %self.inner.name(),
                symbol = %context.symbol,
                %err,
                "risk policies rejected entry signal"
            );
            return SignalResult::none();
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        instrument::Quantity,
        strategy::{buy_on_first_bar::BuyOnFirstBar, definition::RiskDefinition, Signal},
        test_util::{bar, time_secs},
    };
    use fnv::FnvHashMap;

    struct AlwaysSell {
        name: SmolStr,
        required: IndexMap<Timeframe, usize>,
    }

    impl AlwaysSell {
        fn new() -> Self {
            let mut required = IndexMap::new();
            required.insert(Timeframe::M5, 1);
            Self {
                name: SmolStr::new_static("AlwaysSell"),
                required,
            }
        }
    }

    impl SignalStrategy for AlwaysSell {
        fn name(&self) -> &SmolStr {
            &self.name
        }

        fn version(&self) -> u32 {
            1
        }

        fn main_timeframe(&self) -> Timeframe {
            Timeframe::M5
        }

        fn required_timeframes(&self) -> &IndexMap<Timeframe, usize> {
            &self.required
        }

        fn evaluate(&mut self, _: &SignalContext) -> SignalResult {
            SignalResult::entry(Signal::Sell)
        }
    }

    fn context(symbol: SymbolId, close: f64) -> SignalContext {
        let mut market_data = FnvHashMap::default();
        market_data.insert(Timeframe::M5, vec![bar(symbol, Timeframe::M5, 300, close)]);

        SignalContext {
            symbol,
            market_data,
            account_balance: 10_000.0,
            time: time_secs(300),
        }
    }

    fn definition(stop_pips: f64, target_pips: f64, lots: f64) -> StrategyDefinition {
        let mut definition = StrategyDefinition::new("BuyOnFirstBar", 1, Timeframe::M5);
        definition.risk = RiskDefinition::fixed_pips(stop_pips, target_pips, lots);
        definition
    }

    #[test]
    fn test_policies_anchor_levels_at_latest_close_for_longs() {
        let symbol = SymbolId::new(1);
        let definition = definition(20.0, 40.0, 0.05);

        let mut strategy = ComposedStrategy::from_definition(
            Box::new(BuyOnFirstBar::new(Timeframe::M5)),
            &definition,
        )
        .unwrap();

        let result = strategy.evaluate(&context(symbol, 1.1000));

        assert_eq!(result.signal, Signal::Buy);
        assert!((result.stop_loss.unwrap() - 1.0980).abs() < 1e-9);
        assert!((result.take_profit.unwrap() - 1.1040).abs() < 1e-9);
        assert_eq!(result.volume, Some(Quantity::new(0.05).unwrap()));
    }

    #[test]
    fn test_policies_mirror_levels_for_shorts() {
        let symbol = SymbolId::new(1);
        let definition = definition(20.0, 40.0, 0.05);

        let mut strategy =
            ComposedStrategy::from_definition(Box::new(AlwaysSell::new()), &definition).unwrap();

        let result = strategy.evaluate(&context(symbol, 1.1000));

        assert_eq!(result.signal, Signal::Sell);
        assert!((result.stop_loss.unwrap() - 1.1020).abs() < 1e-9);
        assert!((result.take_profit.unwrap() - 1.0960).abs() < 1e-9);
    }

    #[test]
    fn test_inner_strategy_levels_are_preserved() {
        let symbol = SymbolId::new(1);
        let mut definition = definition(20.0, 40.0, 0.05);
        definition
            .parameters
            .insert("StopLossPrice".to_string(), 1.0950.into());
        definition
            .parameters
            .insert("VolumeLots".to_string(), 0.01.into());

        let inner = BuyOnFirstBar::from_definition(&definition).unwrap();
        let mut strategy =
            ComposedStrategy::from_definition(Box::new(inner), &definition).unwrap();

        let result = strategy.evaluate(&context(symbol, 1.1000));

        // The inner strategy's explicit values win; the policies only fill gaps
        assert_eq!(result.stop_loss, Some(1.0950));
        assert_eq!(result.volume, Some(Quantity::new(0.01).unwrap()));
        assert!((result.take_profit.unwrap() - 1.1040).abs() < 1e-9);
    }

    #[test]
    fn test_no_signal_passes_through_untouched() {
        let symbol = SymbolId::new(1);
        let definition = definition(20.0, 40.0, 0.05);

        let mut inner = BuyOnFirstBar::new(Timeframe::M5);
        // Fire the single shot so the next evaluation is a no-op
        inner.evaluate(&context(symbol, 1.1000));

        let mut strategy =
            ComposedStrategy::from_definition(Box::new(inner), &definition).unwrap();

        let result = strategy.evaluate(&context(symbol, 1.1000));
        assert_eq!(result, SignalResult::none());
    }
}
