use chrono::Duration;
use derive_more::{Constructor, Display, From};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::{ops::Add, str::FromStr};
use thiserror::Error;

/// Opaque 64-bit instrument identifier, compared by content.
#[derive(
    Debug,
    Copy,
    Clone,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Deserialize,
    Serialize,
    Display,
    From,
    Constructor,
)]
#[serde(transparent)]
pub struct SymbolId(pub u64);

/// Named bar duration. Comparable, and parseable from its code (eg/ "M5").
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
    W1,
}

impl Timeframe {
    /// Duration of one bar of this [`Timeframe`].
    pub fn duration(&self) -> Duration {
        Duration::seconds(self.duration_secs())
    }

    /// Duration of one bar of this [`Timeframe`] in seconds.
    pub fn duration_secs(&self) -> i64 {
        match self {
            Timeframe::M1 => 60,
            Timeframe::M5 => 300,
            Timeframe::M15 => 900,
            Timeframe::M30 => 1800,
            Timeframe::H1 => 3600,
            Timeframe::H4 => 14400,
            Timeframe::D1 => 86400,
            Timeframe::W1 => 604800,
        }
    }

    /// Canonical code of this [`Timeframe`] (eg/ "M5").
    pub fn as_code(&self) -> &'static str {
        match self {
            Timeframe::M1 => "M1",
            Timeframe::M5 => "M5",
            Timeframe::M15 => "M15",
            Timeframe::M30 => "M30",
            Timeframe::H1 => "H1",
            Timeframe::H4 => "H4",
            Timeframe::D1 => "D1",
            Timeframe::W1 => "W1",
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_code())
    }
}

impl FromStr for Timeframe {
    type Err = InstrumentError;

    fn from_str(code: &str) -> Result<Self, Self::Err> {
        match code.to_uppercase().as_str() {
            "M1" => Ok(Timeframe::M1),
            "M5" => Ok(Timeframe::M5),
            "M15" => Ok(Timeframe::M15),
            "M30" => Ok(Timeframe::M30),
            "H1" => Ok(Timeframe::H1),
            "H4" => Ok(Timeframe::H4),
            "D1" => Ok(Timeframe::D1),
            "W1" => Ok(Timeframe::W1),
            other => Err(InstrumentError::UnknownTimeframe(SmolStr::new(other))),
        }
    }
}

/// Non-negative fractional lot size. Closed under addition.
#[derive(Debug, Copy, Clone, PartialEq, PartialOrd, Default, Deserialize, Serialize, Display)]
#[serde(transparent)]
pub struct Quantity(f64);

impl Quantity {
    /// Construct a new [`Quantity`], validating the lot size is non-negative and finite.
    pub fn new(lots: f64) -> Result<Self, InstrumentError> {
        if lots.is_finite() && lots >= 0.0 {
            Ok(Self(lots))
        } else {
            Err(InstrumentError::InvalidQuantity(lots))
        }
    }

    pub fn as_f64(&self) -> f64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0.0
    }
}

impl Add for Quantity {
    type Output = Quantity;

    fn add(self, rhs: Self) -> Self::Output {
        Quantity(self.0 + rhs.0)
    }
}

/// ISO-style currency code (eg/ "USD").
#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display, From,
)]
#[serde(transparent)]
pub struct Currency(SmolStr);

impl Currency {
    pub fn new(code: &str) -> Self {
        Self(SmolStr::new(code))
    }

    /// Account currency used when a venue does not specify one.
    pub fn usd() -> Self {
        Self(SmolStr::new_static("USD"))
    }
}

impl Default for Currency {
    fn default() -> Self {
        Self::usd()
    }
}

/// Monetary amount in a single [`Currency`]. Arithmetic across differing
/// currencies fails rather than converting implicitly.
#[derive(Debug, Clone, PartialEq, PartialOrd, Deserialize, Serialize, Constructor)]
pub struct Money {
    pub amount: f64,
    pub currency: Currency,
}

impl Money {
    /// Construct a [`Money`] in the default account currency.
    pub fn usd(amount: f64) -> Self {
        Self::new(amount, Currency::usd())
    }

    /// Add two [`Money`] values of the same [`Currency`].
    pub fn checked_add(&self, rhs: &Money) -> Result<Money, InstrumentError> {
        self.ensure_same_currency(rhs)?;
        Ok(Money::new(self.amount + rhs.amount, self.currency.clone()))
    }

    /// Subtract two [`Money`] values of the same [`Currency`].
    pub fn checked_sub(&self, rhs: &Money) -> Result<Money, InstrumentError> {
        self.ensure_same_currency(rhs)?;
        Ok(Money::new(self.amount - rhs.amount, self.currency.clone()))
    }

    fn ensure_same_currency(&self, rhs: &Money) -> Result<(), InstrumentError> {
        if self.currency == rhs.currency {
            Ok(())
        } else {
            Err(InstrumentError::CurrencyMismatch {
                left: self.currency.clone(),
                right: rhs.currency.clone(),
            })
        }
    }
}

/// Instrument & value-object specific errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InstrumentError {
    #[error("unknown Timeframe code: {0}")]
    UnknownTimeframe(SmolStr),

    #[error("invalid Quantity, lots must be non-negative & finite: {0}")]
    InvalidQuantity(f64),

    #[error("currency mismatch: {left} != {right}")]
    CurrencyMismatch { left: Currency, right: Currency },
}
