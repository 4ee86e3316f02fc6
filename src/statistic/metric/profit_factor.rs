use serde::{Deserialize, Serialize};

/// ProfitFactor is a performance metric that divides gross profits by the
/// absolute value of gross losses. A profit factor greater than 1 indicates a
/// profitable strategy.
///
/// Reported as zero when there are no gross losses, so a loss-free run reads
/// as "not meaningful" rather than infinite.
#[derive(Debug, Copy, Clone, PartialEq, PartialOrd, Default, Deserialize, Serialize)]
pub struct ProfitFactor {
    pub value: f64,
}

impl ProfitFactor {
    /// Calculate the [`ProfitFactor`] given the provided gross profits and losses.
    pub fn calculate(profits_gross: f64, losses_gross_abs: f64) -> Self {
        let losses_gross_abs = losses_gross_abs.abs();

        let value = if losses_gross_abs > 0.0 {
            profits_gross.abs() / losses_gross_abs
        } else {
            0.0
        };

        Self { value }
    }
}
