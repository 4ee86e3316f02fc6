use crate::execution::{Order, Position, Trade};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::warn;

/// Events published by the engine & execution handlers. Useful for
/// event-sourcing, real-time dashboards & general monitoring.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum Event {
    Order(Order),
    Trade(Trade),
    Position(Position),
    EngineStatus(String),
}

/// Fire-and-forget event sink capability.
///
/// The engine publishes through this seam in every mode; a backtest wires the
/// [`NullEventSink`], a live service wires a bus-backed sink such as
/// [`ChannelEventSink`]. Publishing must never fail into the caller.
pub trait EventSink: Send {
    fn publish_order(&self, order: &Order);
    fn publish_trade(&self, trade: &Trade);
    fn publish_position(&self, position: &Position);
    fn publish_engine_status(&self, status: String);
}

/// [`EventSink`] that discards everything. Used by the backtest orchestrator,
/// where results are derived from the executor's trade log instead.
#[derive(Debug, Copy, Clone, Default)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn publish_order(&self, _: &Order) {}
    fn publish_trade(&self, _: &Trade) {}
    fn publish_position(&self, _: &Position) {}
    fn publish_engine_status(&self, _: String) {}
}

/// [`EventSink`] fanning [`Event`]s out over an unbounded channel to an
/// external consumer.
#[derive(Debug)]
pub struct ChannelEventSink {
    /// Flag to communicate if the external [`Event`] receiver has been dropped.
    receiver_dropped: AtomicBool,
    event_tx: mpsc::UnboundedSender<Event>,
}

impl ChannelEventSink {
    /// Constructs a new [`ChannelEventSink`] using the provided channel
    /// transmitter.
    pub fn new(event_tx: mpsc::UnboundedSender<Event>) -> Self {
        Self {
            receiver_dropped: AtomicBool::new(false),
            event_tx,
        }
    }

    /// Constructs a [`ChannelEventSink`] together with the [`Event`] stream an
    /// external consumer drains.
    pub fn channel() -> (Self, UnboundedReceiverStream<Event>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (Self::new(event_tx), UnboundedReceiverStream::new(event_rx))
    }

    fn send(&self, event: Event) {
        if self.receiver_dropped.load(Ordering::Relaxed) {
            return;
        }

        if self.event_tx.send(event).is_err() {
            warn!(
                action = "setting receiver_dropped = true",
                why = "event receiver dropped",
                "cannot send Events"
            );
            self.receiver_dropped.store(true, Ordering::Relaxed);
        }
    }
}

impl EventSink for ChannelEventSink {
    fn publish_order(&self, order: &Order) {
        self.send(Event::Order(order.clone()));
    }

    fn publish_trade(&self, trade: &Trade) {
        self.send(Event::Trade(trade.clone()));
    }

    fn publish_position(&self, position: &Position) {
        self.send(Event::Position(position.clone()));
    }

    fn publish_engine_status(&self, status: String) {
        self.send(Event::EngineStatus(status));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        execution::Side,
        instrument::SymbolId,
        test_util::position,
    };

    #[test]
    fn test_channel_sink_delivers_events() {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let sink = ChannelEventSink::new(event_tx);

        sink.publish_engine_status("engine started".to_string());
        sink.publish_position(&position(SymbolId::new(1), Side::Buy, 0.01, 1.1, 300));

        assert!(matches!(
            event_rx.try_recv(),
            Ok(Event::EngineStatus(status)) if status == "engine started"
        ));
        assert!(matches!(event_rx.try_recv(), Ok(Event::Position(_))));
    }

    #[test]
    fn test_channel_sink_swallows_dropped_receiver() {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let sink = ChannelEventSink::new(event_tx);
        drop(event_rx);

        // Publishing into a dropped receiver must not panic or error
        sink.publish_engine_status("still alive".to_string());
        sink.publish_engine_status("still alive".to_string());
    }
}
