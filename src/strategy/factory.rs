use crate::strategy::{
    buy_on_first_bar::BuyOnFirstBar, definition::StrategyDefinition, error::StrategyError,
    rsi::RsiStrategy, SignalStrategy,
};
use std::collections::HashMap;
use tracing::warn;

/// Constructor turning a [`StrategyDefinition`] into a boxed strategy
/// instance.
pub type StrategyConstructor =
    Box<dyn Fn(&StrategyDefinition) -> Result<Box<dyn SignalStrategy>, StrategyError> + Send + Sync>;

/// Case-insensitive registry mapping strategy names to constructors.
///
/// Populated explicitly at construction; there is no runtime discovery of
/// strategy implementations. Lookup failure is signalled with `None`, never an
/// error, so callers can translate it into their own "unknown strategy"
/// handling.
pub struct StrategyFactory {
    constructors: HashMap<String, StrategyConstructor>,
}

impl StrategyFactory {
    /// Constructs an empty [`StrategyFactory`].
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Constructs a [`StrategyFactory`] pre-populated with the built-in
    /// strategies.
    pub fn with_builtins() -> Self {
        let mut factory = Self::new();

        factory.register(BuyOnFirstBar::NAME, |definition| {
            BuyOnFirstBar::from_definition(definition)
                .map(|strategy| Box::new(strategy) as Box<dyn SignalStrategy>)
        });
        factory.register(RsiStrategy::NAME, |definition| {
            RsiStrategy::from_definition(definition)
                .map(|strategy| Box::new(strategy) as Box<dyn SignalStrategy>)
        });

        factory
    }

    /// Register a constructor under `name`, replacing any previous entry of
    /// the same (case-insensitive) name.
    pub fn register<F>(&mut self, name: &str, constructor: F)
    where
        F: Fn(&StrategyDefinition) -> Result<Box<dyn SignalStrategy>, StrategyError>
            + Send
            + Sync
            + 'static,
    {
        self.constructors
            .insert(name.to_lowercase(), Box::new(constructor));
    }

    /// Instantiate the strategy registered under `name` from the provided
    /// definition. `None` on unknown name or failed construction.
    pub fn create_by_name(
        &self,
        name: &str,
        definition: &StrategyDefinition,
    ) -> Option<Box<dyn SignalStrategy>> {
        let constructor = self.constructors.get(&name.to_lowercase())?;

        match constructor(definition) {
            Ok(strategy) => Some(strategy),
            Err(err) => {
                warn!(strategy = name, %err, "strategy construction failed");
                None
            }
        }
    }

    /// Instantiate the strategy the definition names.
    pub fn create_from_definition(
        &self,
        definition: &StrategyDefinition,
    ) -> Option<Box<dyn SignalStrategy>> {
        self.create_by_name(&definition.name, definition)
    }
}

impl Default for StrategyFactory {
    fn default() -> Self {
        Self::with_builtins()
    }
}
