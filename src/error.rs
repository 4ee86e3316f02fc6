use crate::{
    backtest::worker::BusError, clock::ClockError, data::DataError, execution::error::ExecutionError,
    instrument::InstrumentError, risk::RiskError, strategy::error::StrategyError,
};
use thiserror::Error;

/// Top-level error aggregating every module's failure modes.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BarkeepError {
    #[error("instrument: {0}")]
    Instrument(#[from] InstrumentError),

    #[error("clock: {0}")]
    Clock(#[from] ClockError),

    #[error("market data: {0}")]
    Data(#[from] DataError),

    #[error("execution: {0}")]
    Execution(#[from] ExecutionError),

    #[error("strategy: {0}")]
    Strategy(#[from] StrategyError),

    #[error("risk: {0}")]
    Risk(#[from] RiskError),

    #[error("job bus: {0}")]
    Bus(#[from] BusError),
}
