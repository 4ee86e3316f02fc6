use crate::execution::OrderId;
use thiserror::Error;

/// Execution module specific errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecutionError {
    #[error("no pending order found for id: {0}")]
    UnknownOrder(OrderId),

    #[error("order rejected: {0}")]
    Rejected(String),
}
