use crate::{
    instrument::{SymbolId, Timeframe},
    strategy::{
        definition::StrategyDefinition, error::StrategyError, Signal, SignalContext, SignalResult,
        SignalStrategy,
    },
};
use indexmap::IndexMap;
use smol_str::SmolStr;
use ta::{indicators::RelativeStrengthIndex, Next};

/// RSI threshold strategy.
///
/// Feeds each main-timeframe close into an incremental RSI and endorses a Buy
/// below the oversold threshold, a Sell above the overbought threshold. The
/// indicator warms up over the first `period` observations before any signal
/// is emitted.
///
/// Definition parameters: `Period` (default 14), `Overbought` (default 70),
/// `Oversold` (default 30).
#[derive(Debug, Clone)]
pub struct RsiStrategy {
    name: SmolStr,
    version: u32,
    main_timeframe: Timeframe,
    required_timeframes: IndexMap<Timeframe, usize>,
    symbols: Vec<SymbolId>,
    rsi: RelativeStrengthIndex,
    period: usize,
    overbought: f64,
    oversold: f64,
    observations: usize,
}

impl RsiStrategy {
    pub const NAME: &'static str = "Rsi";

    /// Constructs a [`RsiStrategy`] from a definition.
    pub fn from_definition(definition: &StrategyDefinition) -> Result<Self, StrategyError> {
        let period = definition.param_u64("Period").unwrap_or(14) as usize;
        let overbought = definition.param_f64("Overbought").unwrap_or(70.0);
        let oversold = definition.param_f64("Oversold").unwrap_or(30.0);

        if !(0.0..=100.0).contains(&oversold)
            || !(0.0..=100.0).contains(&overbought)
            || oversold >= overbought
        {
            return Err(StrategyError::InvalidParameters(format!(
                "rsi thresholds must satisfy 0 <= oversold < overbought <= 100: \
                 oversold={oversold}, overbought={overbought}"
            )));
        }

        let rsi = RelativeStrengthIndex::new(period).map_err(|err| {
            StrategyError::InvalidParameters(format!("rsi period {period}: {err}"))
        })?;

        Ok(Self {
            name: definition.name.clone(),
            version: definition.version,
            main_timeframe: definition.main_timeframe,
            required_timeframes: definition.required_timeframes.clone(),
            symbols: definition.symbols.clone(),
            rsi,
            period,
            overbought,
            oversold,
            observations: 0,
        })
    }
}

impl SignalStrategy for RsiStrategy {
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
        let Some(close) = context.latest_close(self.main_timeframe) else {
            return SignalResult::none();
        };

        let rsi = self.rsi.next(close);
        self.observations += 1;

        // Indicator warm-up
        if self.observations <= self.period {
            return SignalResult::none();
        }

        let signal = if rsi <= self.oversold {
            Signal::Buy
        } else if rsi >= self.overbought {
            Signal::Sell
        } else {
            return SignalResult::none();
        };

        SignalResult {
            signal,
            reason: Some(SmolStr::new(format!("rsi={rsi:.1}"))),
            ..SignalResult::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{bar, time_secs};
    use fnv::FnvHashMap;

    fn context_with_close(symbol: SymbolId, secs: i64, close: f64) -> SignalContext {
        let mut market_data = FnvHashMap::default();
        market_data.insert(Timeframe::M5, vec![bar(symbol, Timeframe::M5, secs, close)]);

        SignalContext {
            symbol,
            market_data,
            account_balance: 10_000.0,
            time: time_secs(secs),
        }
    }

    fn strategy(period: u64) -> RsiStrategy {
        let mut definition = StrategyDefinition::new(RsiStrategy::NAME, 1, Timeframe::M5);
        definition
            .parameters
            .insert("Period".to_string(), period.into());
        RsiStrategy::from_definition(&definition).unwrap()
    }

    #[test]
    fn test_no_signal_during_warm_up() {
        let symbol = SymbolId::new(1);
        let mut strategy = strategy(3);

        for index in 0..3 {
            let context = context_with_close(symbol, 300 * (index + 1), 1.1);
            assert_eq!(strategy.evaluate(&context).signal, Signal::None);
        }
    }

    #[test]
    fn test_sell_after_sustained_rally() {
        let symbol = SymbolId::new(1);
        let mut strategy = strategy(3);

        // Monotonically rising closes push RSI to 100
        let mut result = SignalResult::none();
        for index in 0..6 {
            let close = 1.10 + 0.01 * index as f64;
            result = strategy.evaluate(&context_with_close(symbol, 300 * (index + 1), close));
        }

        assert_eq!(result.signal, Signal::Sell);
    }

    #[test]
    fn test_buy_after_sustained_decline() {
        let symbol = SymbolId::new(1);
        let mut strategy = strategy(3);

        let mut result = SignalResult::none();
        for index in 0..6 {
            let close = 1.20 - 0.01 * index as f64;
            result = strategy.evaluate(&context_with_close(symbol, 300 * (index + 1), close));
        }

        assert_eq!(result.signal, Signal::Buy);
    }

    #[test]
    fn test_invalid_thresholds_are_rejected() {
        let mut definition = StrategyDefinition::new(RsiStrategy::NAME, 1, Timeframe::M5);
        definition
            .parameters
            .insert("Overbought".to_string(), 20.0.into());
        definition
            .parameters
            .insert("Oversold".to_string(), 80.0.into());

        assert!(RsiStrategy::from_definition(&definition).is_err());
    }
}
