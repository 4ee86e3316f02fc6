use crate::{
    execution::Position,
    instrument::Currency,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Running account ledger shared between an execution handler (writer) and the
/// engine (reader).
///
/// Clones share the same balance cell. The simulated broker debits commissions
/// on every fill and credits realized pnl on every close, so context-building
/// reads observe a balance that compounds over a run rather than a constant.
#[derive(Debug, Clone)]
pub struct AccountLedger {
    account_id: Uuid,
    currency: Currency,
    balance: Arc<parking_lot::RwLock<f64>>,
}

impl AccountLedger {
    /// Construct a new `AccountLedger` seeded with the provided starting balance.
    pub fn new(initial_balance: f64, currency: Currency) -> Self {
        Self {
            account_id: Uuid::new_v4(),
            currency,
            balance: Arc::new(parking_lot::RwLock::new(initial_balance)),
        }
    }

    pub fn account_id(&self) -> Uuid {
        self.account_id
    }

    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    /// Current realized balance.
    pub fn balance(&self) -> f64 {
        *self.balance.read()
    }

    /// Record an entry fill: the commission is debited immediately.
    pub fn apply_entry(&self, commission: f64) {
        let mut balance = self.balance.write();
        *balance -= commission;
        debug!(commission, balance = *balance, "ledger applied entry fill");
    }

    /// Record a close: gross pnl is credited and the exit commission debited.
    pub fn apply_exit(&self, pnl_gross: f64, commission: f64) {
        let mut balance = self.balance.write();
        *balance += pnl_gross - commission;
        debug!(
            pnl_gross,
            commission,
            balance = *balance,
            "ledger applied position close"
        );
    }
}

/// Aggregated account view. Not authoritative during a backtest, where final
/// pnl is derived from closed positions at the end of the run.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Portfolio {
    pub account_id: Uuid,
    pub balance: f64,
    pub equity: f64,
    pub margin: f64,
    pub free_margin: f64,
    pub open_positions: Vec<Position>,
}

impl Portfolio {
    /// Build a snapshot from the ledger and the open positions, marking each
    /// position against the provided last observed price for its symbol.
    pub fn snapshot<F>(ledger: &AccountLedger, open_positions: Vec<Position>, last_price: F) -> Self
    where
        F: Fn(&Position) -> Option<f64>,
    {
        let balance = ledger.balance();
        let unrealized = open_positions
            .iter()
            .filter_map(|position| {
                last_price(position).map(|price| position.unrealized_pnl(price))
            })
            .sum::<f64>();

        Self {
            account_id: ledger.account_id(),
            balance,
            equity: balance + unrealized,
            margin: 0.0,
            free_margin: balance + unrealized,
            open_positions,
        }
    }
}
