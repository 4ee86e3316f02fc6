use serde::{Deserialize, Serialize};

/// Fraction of closed positions with positive pnl. Zero when no positions
/// closed.
#[derive(Debug, Copy, Clone, PartialEq, PartialOrd, Default, Deserialize, Serialize)]
pub struct WinRate {
    pub value: f64,
}

impl WinRate {
    pub fn calculate(wins: usize, total: usize) -> Self {
        let value = if total > 0 {
            wins as f64 / total as f64
        } else {
            0.0
        };

        Self { value }
    }
}
