use crate::{
    instrument::{SymbolId, Timeframe},
    strategy::error::StrategyError,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smol_str::SmolStr;
use std::str::FromStr;
use uuid::Uuid;

/// One risk policy block of a [`StrategyDefinition`]: a type tag plus
/// free-form parameters interpreted by the policy builders in
/// [`crate::risk`].
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct RiskPolicyDefinition {
    #[serde(rename = "Type")]
    pub kind: SmolStr,
    #[serde(rename = "Parameters", default)]
    pub parameters: serde_json::Map<String, Value>,
}

impl RiskPolicyDefinition {
    pub fn new(kind: &str, parameters: serde_json::Map<String, Value>) -> Self {
        Self {
            kind: SmolStr::new(kind),
            parameters,
        }
    }

    /// Numeric parameter lookup tolerant of integer JSON values.
    pub fn param_f64(&self, key: &str) -> Option<f64> {
        self.parameters.get(key).and_then(Value::as_f64)
    }
}

/// Risk blocks of a [`StrategyDefinition`].
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct RiskDefinition {
    #[serde(rename = "StopLoss")]
    pub stop_loss: RiskPolicyDefinition,
    #[serde(rename = "TakeProfit")]
    pub take_profit: RiskPolicyDefinition,
    #[serde(rename = "PositionSizing")]
    pub position_sizing: RiskPolicyDefinition,
}

impl RiskDefinition {
    /// Fixed-pips stop & target with a fixed lot size. The common baseline
    /// used by tests & simple definitions.
    pub fn fixed_pips(stop_loss_pips: f64, take_profit_pips: f64, lots: f64) -> Self {
        let param = |key: &str, value: f64| {
            let mut map = serde_json::Map::new();
            map.insert(key.to_string(), value.into());
            map
        };

        Self {
            stop_loss: RiskPolicyDefinition::new("FixedPips", param("Pips", stop_loss_pips)),
            take_profit: RiskPolicyDefinition::new("FixedPips", param("Pips", take_profit_pips)),
            position_sizing: RiskPolicyDefinition::new("FixedLot", param("Lots", lots)),
        }
    }
}

/// Versioned, JSON-parameterised description of a deployable strategy.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StrategyDefinition {
    pub name: SmolStr,
    pub version: u32,
    pub main_timeframe: Timeframe,
    /// Timeframe -> minimum bar count the strategy needs in its context.
    pub required_timeframes: IndexMap<Timeframe, usize>,
    /// Free-form strategy parameters.
    pub parameters: serde_json::Map<String, Value>,
    pub risk: RiskDefinition,
    pub symbols: Vec<SymbolId>,
    pub enabled: bool,
}

impl StrategyDefinition {
    /// Minimal enabled definition requiring a single bar of the main
    /// timeframe, with baseline fixed-pips risk.
    pub fn new(name: &str, version: u32, main_timeframe: Timeframe) -> Self {
        let mut required_timeframes = IndexMap::new();
        required_timeframes.insert(main_timeframe, 1);

        Self {
            name: SmolStr::new(name),
            version,
            main_timeframe,
            required_timeframes,
            parameters: serde_json::Map::new(),
            risk: RiskDefinition::fixed_pips(20.0, 40.0, 0.01),
            symbols: Vec::new(),
            enabled: true,
        }
    }

    pub fn param_f64(&self, key: &str) -> Option<f64> {
        self.parameters.get(key).and_then(Value::as_f64)
    }

    pub fn param_u64(&self, key: &str) -> Option<u64> {
        self.parameters.get(key).and_then(Value::as_u64)
    }

    /// Overlay the provided parameters onto this definition, replacing
    /// existing keys. Used by backtest jobs carrying optimizer overrides.
    pub fn merge_parameters(&mut self, overrides: &serde_json::Map<String, Value>) {
        for (key, value) in overrides {
            self.parameters.insert(key.clone(), value.clone());
        }
    }
}

/// Stored row shape of a strategy definition, as persisted by the external
/// configuration catalog. Decoded into a [`StrategyDefinition`] on load.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StrategyDefinitionRow {
    pub id: Uuid,
    pub name: String,
    pub version: u32,
    pub enabled: bool,
    pub main_timeframe: String,
    pub config: StrategyConfigBlock,
    /// Numeric symbol ids encoded as strings.
    pub symbol_list: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Nested JSON `config` column of a [`StrategyDefinitionRow`].
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct StrategyConfigBlock {
    #[serde(rename = "Timeframes", default)]
    pub timeframes: IndexMap<String, usize>,
    #[serde(rename = "Parameters", default)]
    pub parameters: serde_json::Map<String, Value>,
    #[serde(rename = "Risk", default)]
    pub risk: RiskDefinition,
}

impl TryFrom<StrategyDefinitionRow> for StrategyDefinition {
    type Error = StrategyError;

    fn try_from(row: StrategyDefinitionRow) -> Result<Self, Self::Error> {
        let main_timeframe = Timeframe::from_str(&row.main_timeframe)?;

        let mut required_timeframes = IndexMap::new();
        for (code, count) in &row.config.timeframes {
            required_timeframes.insert(Timeframe::from_str(code)?, *count);
        }
        // The main timeframe is always required, with at least one bar
        required_timeframes.entry(main_timeframe).or_insert(1);

        let symbols = row
            .symbol_list
            .iter()
            .map(|raw| {
                raw.parse::<u64>().map(SymbolId::new).map_err(|_| {
                    StrategyError::InvalidDefinition(format!(
                        "non-numeric symbol id in definition {}: {raw}",
                        row.name
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name: SmolStr::new(&row.name),
            version: row.version,
            main_timeframe,
            required_timeframes,
            parameters: row.config.parameters,
            risk: row.config.risk,
            symbols,
            enabled: row.enabled,
        })
    }
}

/// Strategy definition provider capability, implemented by configuration
/// catalog adapters.
#[async_trait]
pub trait StrategyConfigProvider: Send + Sync {
    /// All enabled definitions, deduplicated to the latest version per name.
    async fn load_all(&self) -> Result<Vec<StrategyDefinition>, StrategyError>;

    /// Latest enabled definition of the provided name, if any.
    async fn load_by_name(&self, name: &str) -> Result<Option<StrategyDefinition>, StrategyError>;
}

/// [`StrategyConfigProvider`] over an in-memory definition set. Backs tests &
/// single-process deployments.
#[derive(Debug, Clone, Default)]
pub struct InMemoryConfigProvider {
    definitions: Vec<StrategyDefinition>,
}

impl InMemoryConfigProvider {
    pub fn new(definitions: Vec<StrategyDefinition>) -> Self {
        Self { definitions }
    }

    fn latest_enabled(&self) -> Vec<StrategyDefinition> {
        let mut latest: IndexMap<String, StrategyDefinition> = IndexMap::new();

        for definition in self.definitions.iter().filter(|def| def.enabled) {
            let key = definition.name.to_lowercase();
            match latest.get(&key) {
                Some(existing) if existing.version >= definition.version => {}
                _ => {
                    latest.insert(key, definition.clone());
                }
            }
        }

        latest.into_values().collect()
    }
}

#[async_trait]
impl StrategyConfigProvider for InMemoryConfigProvider {
    async fn load_all(&self) -> Result<Vec<StrategyDefinition>, StrategyError> {
        Ok(self.latest_enabled())
    }

    async fn load_by_name(&self, name: &str) -> Result<Option<StrategyDefinition>, StrategyError> {
        Ok(self
            .latest_enabled()
            .into_iter()
            .find(|definition| definition.name.eq_ignore_ascii_case(name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn definition(name: &str, version: u32, enabled: bool) -> StrategyDefinition {
        let mut definition = StrategyDefinition::new(name, version, Timeframe::M5);
        definition.enabled = enabled;
        definition
    }

    #[tokio::test]
    async fn test_load_all_latest_version_wins() {
        let provider = InMemoryConfigProvider::new(vec![
            definition("MR_M5", 2, true),
            definition("MR_M5", 3, true),
        ]);

        let definitions = provider.load_all().await.unwrap();

        assert_eq!(definitions.len(), 1);
        assert_eq!(definitions[0].version, 3);
    }

    #[tokio::test]
    async fn test_load_all_skips_disabled() {
        let provider = InMemoryConfigProvider::new(vec![
            definition("MR_M5", 4, false),
            definition("MR_M5", 3, true),
            definition("Trend_H1", 1, false),
        ]);

        let definitions = provider.load_all().await.unwrap();

        assert_eq!(definitions.len(), 1);
        assert_eq!(definitions[0].name, "MR_M5");
        assert_eq!(definitions[0].version, 3);
    }

    #[tokio::test]
    async fn test_load_by_name_is_case_insensitive() {
        let provider = InMemoryConfigProvider::new(vec![definition("MR_M5", 1, true)]);

        assert!(provider.load_by_name("mr_m5").await.unwrap().is_some());
        assert!(provider.load_by_name("unknown").await.unwrap().is_none());
    }

    #[test]
    fn test_row_decoding() {
        let row: StrategyDefinitionRow = serde_json::from_value(json!({
            "id": "5f0c12de-9f13-4f5b-8c5a-2bb9f1a7f6f7",
            "name": "MR_M5",
            "version": 3,
            "enabled": true,
            "main_timeframe": "M5",
            "config": {
                "Timeframes": { "M5": 20, "H1": 10 },
                "Parameters": { "Lookback": 14 },
                "Risk": {
                    "StopLoss": { "Type": "FixedPips", "Parameters": { "Pips": 25.0 } },
                    "TakeProfit": { "Type": "RiskReward", "Parameters": { "Ratio": 2.0 } },
                    "PositionSizing": { "Type": "RiskPercent", "Parameters": { "Percent": 1.0 } }
                }
            },
            "symbol_list": ["1", "2"],
            "created_at": "2024-01-15T10:00:00Z"
        }))
        .unwrap();

        let definition = StrategyDefinition::try_from(row).unwrap();

        assert_eq!(definition.main_timeframe, Timeframe::M5);
        assert_eq!(definition.required_timeframes[&Timeframe::M5], 20);
        assert_eq!(definition.required_timeframes[&Timeframe::H1], 10);
        assert_eq!(definition.param_u64("Lookback"), Some(14));
        assert_eq!(definition.risk.stop_loss.param_f64("Pips"), Some(25.0));
        assert_eq!(
            definition.symbols,
            vec![SymbolId::new(1), SymbolId::new(2)]
        );
    }

    #[test]
    fn test_row_decoding_rejects_unknown_timeframe() {
        let row: StrategyDefinitionRow = serde_json::from_value(json!({
            "id": "5f0c12de-9f13-4f5b-8c5a-2bb9f1a7f6f7",
            "name": "MR_M5",
            "version": 1,
            "enabled": true,
            "main_timeframe": "M7",
            "config": {},
            "symbol_list": [],
            "created_at": "2024-01-15T10:00:00Z"
        }))
        .unwrap();

        assert!(StrategyDefinition::try_from(row).is_err());
    }

    #[test]
    fn test_merge_parameters_overrides_existing_keys() {
        let mut definition = StrategyDefinition::new("MR_M5", 1, Timeframe::M5);
        definition
            .parameters
            .insert("Lookback".to_string(), json!(14));

        let mut overrides = serde_json::Map::new();
        overrides.insert("Lookback".to_string(), json!(21));
        overrides.insert("Threshold".to_string(), json!(1.5));

        definition.merge_parameters(&overrides);

        assert_eq!(definition.param_u64("Lookback"), Some(21));
        assert_eq!(definition.param_f64("Threshold"), Some(1.5));
    }
}
