use crate::instrument::{Money, Quantity, SymbolId};
use chrono::{DateTime, Utc};
use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use uuid::Uuid;

use crate::execution::error::ExecutionError;

/// Execution module specific errors.
pub mod error;

/// Deterministic bar-level broker simulation used for back-testing, optimizer
/// sweeps & paper-trading.
pub mod simulated;

/// Unique identifier for an [`Order`].
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display, From,
)]
#[serde(transparent)]
pub struct OrderId(pub Uuid);

impl OrderId {
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Unique identifier for a [`Position`].
///
/// A position created by filling an order inherits that order's id, so closing
/// trades link back to their entry trade via `Trade::order_id` alone.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display, From,
)]
#[serde(transparent)]
pub struct PositionId(pub Uuid);

impl From<OrderId> for PositionId {
    fn from(id: OrderId) -> Self {
        Self(id.0)
    }
}

/// Unique identifier for a [`Trade`].
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display, From,
)]
#[serde(transparent)]
pub struct TradeId(pub Uuid);

impl TradeId {
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Side of an [`Order`] or [`Position`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Opposite [`Side`], used by closing trades.
    pub fn opposite(&self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Side::Buy => "Buy",
                Side::Sell => "Sell",
            }
        )
    }
}

/// Order type. Market is the only type the simulated variant fully models;
/// the others share the structure for live adapters.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub enum OrderType {
    Market,
    Limit,
    Stop,
}

/// Lifecycle state of an [`Order`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub enum OrderStatus {
    Pending,
    Filled,
    PartiallyFilled,
    Cancelled,
    Rejected,
}

/// Request to open an order, produced by the engine's signal translation.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct OrderRequest {
    pub symbol: SymbolId,
    pub side: Side,
    pub order_type: OrderType,
    pub volume: Quantity,
    pub price: Option<f64>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub client_order_id: Option<SmolStr>,
    pub strategy: Option<SmolStr>,
}

impl OrderRequest {
    /// Construct a market [`OrderRequest`] with no protective levels attached.
    pub fn market(symbol: SymbolId, side: Side, volume: Quantity) -> Self {
        Self {
            symbol,
            side,
            order_type: OrderType::Market,
            volume,
            price: None,
            stop_loss: None,
            take_profit: None,
            client_order_id: None,
            strategy: None,
        }
    }

    pub fn with_stop_loss(mut self, stop_loss: f64) -> Self {
        self.stop_loss = Some(stop_loss);
        self
    }

    pub fn with_take_profit(mut self, take_profit: f64) -> Self {
        self.take_profit = Some(take_profit);
        self
    }
}

/// Order resting at, or acknowledged by, a broker.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub symbol: SymbolId,
    pub side: Side,
    pub order_type: OrderType,
    pub volume: Quantity,
    pub price: Option<f64>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub client_order_id: Option<SmolStr>,
}

/// Open position held against a symbol.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Position {
    pub id: PositionId,
    pub symbol: SymbolId,
    pub side: Side,
    pub volume: Quantity,
    pub entry_price: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    /// Close time of the bar this position was filled on. Sole input to the
    /// next-bar execution rule: protective exits are only evaluated on bars
    /// strictly after this instant.
    pub entry_bar_time: DateTime<Utc>,
    pub opened_at: DateTime<Utc>,
    pub strategy: Option<SmolStr>,
}

impl Position {
    /// Unrealized profit & loss of this position against the provided price.
    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        match self.side {
            Side::Buy => (price - self.entry_price) * self.volume.as_f64(),
            Side::Sell => (self.entry_price - price) * self.volume.as_f64(),
        }
    }
}

/// Immutable record of a fill or close.
///
/// Closing trades carry the opposite [`Side`] of their position and reuse the
/// position id as `order_id`, which equals the entry order's id.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Trade {
    pub id: TradeId,
    pub order_id: OrderId,
    pub symbol: SymbolId,
    pub side: Side,
    pub volume: Quantity,
    pub price: f64,
    pub commission: Money,
    pub executed_at: DateTime<Utc>,
}

/// Order execution capability consumed by the engine.
///
/// Implemented by the [`simulated::SimulatedExecution`] broker and by live
/// venue adapters.
pub trait OrderExecution: Send {
    /// Accept an [`OrderRequest`] and return the acknowledged [`Order`].
    fn place_order(&mut self, request: OrderRequest) -> Result<Order, ExecutionError>;

    /// Modify protective levels of a resting order. Absent parameters leave
    /// existing values untouched.
    fn modify_order(
        &mut self,
        order_id: OrderId,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    ) -> Result<Order, ExecutionError>;

    /// Cancel a resting order. Idempotent on unknown ids.
    fn cancel_order(&mut self, order_id: OrderId);

    /// Flat-close an open position without a synthetic trade record.
    /// Idempotent on unknown ids.
    fn close_position(&mut self, position_id: PositionId);

    /// Projection of the currently open positions.
    fn get_positions(&self) -> Vec<Position>;
}
