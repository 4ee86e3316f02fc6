use serde::{Deserialize, Serialize};

/// Maximum peak-to-trough decline generator over an equity curve.
///
/// Feed equity points in chronological order; the generator tracks the
/// running peak and the largest fractional decline `(peak - equity) / peak`
/// observed so far.
#[derive(Debug, Copy, Clone, PartialEq, PartialOrd, Deserialize, Serialize)]
pub struct MaxDrawdownGenerator {
    peak: f64,
    max_drawdown: f64,
}

impl MaxDrawdownGenerator {
    /// Initialise from the starting equity.
    pub fn init(initial_equity: f64) -> Self {
        Self {
            peak: initial_equity,
            max_drawdown: 0.0,
        }
    }

    /// Update the internal state using the next equity point.
    pub fn update(&mut self, equity: f64) {
        if equity > self.peak {
            self.peak = equity;
            return;
        }

        if self.peak > 0.0 {
            let drawdown = (self.peak - equity) / self.peak;
            if drawdown > self.max_drawdown {
                self.max_drawdown = drawdown;
            }
        }
    }

    /// Largest drawdown observed so far, as a fraction of the peak.
    pub fn max_drawdown(&self) -> f64 {
        self.max_drawdown
    }

    /// Largest drawdown observed so far, as a percentage of the peak.
    pub fn max_drawdown_percent(&self) -> f64 {
        self.max_drawdown * 100.0
    }
}
