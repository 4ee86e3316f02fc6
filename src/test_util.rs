//! Barkeep core test utilities.

use crate::{
    data::Bar,
    execution::{Position, PositionId, Side},
    instrument::{Quantity, SymbolId, Timeframe},
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// `DateTime<Utc>` from unix seconds.
pub fn time_secs(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap()
}

/// Flat [`Bar`] with all prices at `price`.
pub fn bar(symbol: SymbolId, timeframe: Timeframe, close_secs: i64, price: f64) -> Bar {
    bar_ohlc(symbol, timeframe, close_secs, price, price, price, price)
}

/// [`Bar`] with explicit OHLC prices.
pub fn bar_ohlc(
    symbol: SymbolId,
    timeframe: Timeframe,
    close_secs: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
) -> Bar {
    Bar {
        symbol,
        timeframe,
        time_close: time_secs(close_secs),
        open,
        high,
        low,
        close,
        volume: 100.0,
    }
}

/// Open [`Position`] with no protective levels attached.
pub fn position(
    symbol: SymbolId,
    side: Side,
    volume_lots: f64,
    entry_price: f64,
    entry_bar_secs: i64,
) -> Position {
    Position {
        id: PositionId::from(Uuid::new_v4()),
        symbol,
        side,
        volume: Quantity::new(volume_lots).unwrap(),
        entry_price,
        stop_loss: None,
        take_profit: None,
        entry_bar_time: time_secs(entry_bar_secs),
        opened_at: time_secs(entry_bar_secs),
        strategy: None,
    }
}

/// Approximate `f64` equality with explicit epsilon.
pub fn f64_is_eq(actual: f64, expected: f64, epsilon: f64) -> bool {
    (actual - expected).abs() < epsilon
}
