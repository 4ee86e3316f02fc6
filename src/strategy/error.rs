use crate::instrument::InstrumentError;
use thiserror::Error;

/// Strategy module specific errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StrategyError {
    #[error("invalid strategy definition: {0}")]
    InvalidDefinition(String),

    #[error("invalid strategy parameters: {0}")]
    InvalidParameters(String),

    #[error("definition provider failure: {0}")]
    Provider(String),

    #[error("instrument: {0}")]
    Instrument(#[from] InstrumentError),
}
