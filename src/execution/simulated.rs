use crate::{
    clock::Clock,
    data::Bar,
    execution::{
        error::ExecutionError, Order, OrderExecution, OrderId, OrderRequest, OrderStatus,
        Position, PositionId, Side, Trade, TradeId,
    },
    instrument::{Money, SymbolId},
    portfolio::AccountLedger,
};
use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Configuration for constructing a [`SimulatedExecution`] via the new() constructor method.
#[derive(Copy, Clone, PartialEq, PartialOrd, Debug, Deserialize, Serialize)]
pub struct BacktestSettings {
    /// Ask minus bid in raw price units. Applied to buy entries and to derive
    /// bid/ask series from a bar's range when sweeping protective levels.
    pub spread: f64,
    /// Adverse execution offset in raw price units, applied only on stop-loss
    /// exits.
    pub slippage: f64,
    /// Commission in account currency charged per lot on both entry and exit.
    pub commission_per_lot: f64,
    /// Starting account balance in account currency.
    pub initial_balance: f64,
}

impl Default for BacktestSettings {
    fn default() -> Self {
        Self {
            spread: 0.0004,
            slippage: 0.0001,
            commission_per_lot: 3.0,
            initial_balance: 10_000.0,
        }
    }
}

/// Order accepted by [`SimulatedExecution::place_order`] but not yet filled.
/// Lives from placement until the next processed bar at its symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingOrder {
    pub order: Order,
    pub strategy: Option<smol_str::SmolStr>,
}

/// Why an open position was closed by the protective-level sweep.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                ExitReason::StopLoss => "SL",
                ExitReason::TakeProfit => "TP",
            }
        )
    }
}

/// Deterministic bar-level broker simulation.
///
/// Orders placed during bar N rest as [`PendingOrder`]s and fill at bar N+1's
/// open (buys pay the spread). Protective stop-loss/take-profit levels are
/// swept against each bar's range, on bid prices for longs and ask prices for
/// shorts, but never on the bar a position was entered on. Stop-loss exits
/// incur adverse slippage; take-profit exits fill exactly at the level.
///
/// Within a single bar the stop-loss is checked before the take-profit for
/// both sides; a range covering both levels closes the position on the stop.
/// Intrabar ordering beyond that is not modelled.
#[derive(Debug)]
pub struct SimulatedExecution<C>
where
    C: Clock,
{
    settings: BacktestSettings,
    clock: C,
    ledger: AccountLedger,
    pending_orders: Vec<PendingOrder>,
    open_positions: Vec<Position>,
    closed_positions: Vec<Position>,
    trades: Vec<Trade>,
    last_close: FnvHashMap<SymbolId, f64>,
}

impl<C> SimulatedExecution<C>
where
    C: Clock,
{
    /// Constructs a new [`SimulatedExecution`] bound to the provided clock &
    /// account ledger.
    pub fn new(settings: BacktestSettings, clock: C, ledger: AccountLedger) -> Self {
        Self {
            settings,
            clock,
            ledger,
            pending_orders: Vec::new(),
            open_positions: Vec::new(),
            closed_positions: Vec::new(),
            trades: Vec::new(),
            last_close: FnvHashMap::default(),
        }
    }

    /// Advance the simulation by one closing [`Bar`].
    ///
    /// Phase 1 fills resting orders at this bar's open; phase 2 sweeps
    /// protective levels of open positions against this bar's range. The
    /// replay driver must call this before the engine dispatches the same bar
    /// to its strategies.
    pub fn process_bar(&mut self, bar: &Bar) {
        self.fill_pending_orders(bar);
        self.sweep_protective_levels(bar);
        self.last_close.insert(bar.symbol, bar.close);
    }

    fn fill_pending_orders(&mut self, bar: &Bar) {
        let mut index = 0;
        while index < self.pending_orders.len() {
            if self.pending_orders[index].order.symbol != bar.symbol {
                index += 1;
                continue;
            }

            let pending = self.pending_orders.remove(index);
            let order = pending.order;

            // All order types currently fill as market orders at the open
            let fill_price = match order.side {
                Side::Buy => bar.open + self.settings.spread,
                Side::Sell => bar.open,
            };

            let commission = self.settings.commission_per_lot * order.volume.as_f64();

            self.open_positions.push(Position {
                id: PositionId::from(order.id),
                symbol: order.symbol,
                side: order.side,
                volume: order.volume,
                entry_price: fill_price,
                stop_loss: order.stop_loss,
                take_profit: order.take_profit,
                entry_bar_time: bar.time_close,
                opened_at: self.clock.now(),
                strategy: pending.strategy,
            });

            self.trades.push(Trade {
                id: TradeId::random(),
                order_id: order.id,
                symbol: order.symbol,
                side: order.side,
                volume: order.volume,
                price: fill_price,
                commission: Money::new(commission, self.ledger.currency().clone()),
                executed_at: self.clock.now(),
            });

            self.ledger.apply_entry(commission);

            debug!(
                order_id = %order.id,
                symbol = %order.symbol,
                side = %order.side,
                volume = %order.volume,
                fill_price,
                "filled pending order at bar open"
            );
        }
    }

    fn sweep_protective_levels(&mut self, bar: &Bar) {
        let mut index = 0;
        while index < self.open_positions.len() {
            let position = &self.open_positions[index];

            // Exits never trigger on the entry bar, even if the range covers
            // the level
            if position.symbol != bar.symbol || bar.time_close <= position.entry_bar_time {
                index += 1;
                continue;
            }

            let Some((exit_price, reason)) = self.protective_exit(position, bar) else {
                index += 1;
                continue;
            };

            let position = self.open_positions.remove(index);
            self.close_with_trade(position, exit_price, reason);
        }
    }

    /// Protective exit for `position` on `bar`, if one triggers. Longs are
    /// evaluated on bid prices, shorts on ask prices; the stop-loss wins when
    /// both levels are covered by the range.
    fn protective_exit(&self, position: &Position, bar: &Bar) -> Option<(f64, ExitReason)> {
        let spread = self.settings.spread;
        let slippage = self.settings.slippage;

        match position.side {
            Side::Buy => {
                let bid_low = bar.low - spread;
                let bid_high = bar.high - spread;

                if let Some(stop_loss) = position.stop_loss.filter(|level| bid_low <= *level) {
                    return Some((stop_loss - slippage, ExitReason::StopLoss));
                }
                if let Some(take_profit) = position.take_profit.filter(|level| bid_high >= *level)
                {
                    return Some((take_profit, ExitReason::TakeProfit));
                }
            }
            Side::Sell => {
                let ask_low = bar.low + spread;
                let ask_high = bar.high + spread;

                if let Some(stop_loss) = position.stop_loss.filter(|level| ask_high >= *level) {
                    return Some((stop_loss + slippage, ExitReason::StopLoss));
                }
                if let Some(take_profit) = position.take_profit.filter(|level| ask_low <= *level) {
                    return Some((take_profit, ExitReason::TakeProfit));
                }
            }
        }

        None
    }

    fn close_with_trade(&mut self, position: Position, exit_price: f64, reason: ExitReason) {
        let commission = self.settings.commission_per_lot * position.volume.as_f64();
        let pnl_gross = position.unrealized_pnl(exit_price);

        self.trades.push(Trade {
            id: TradeId::random(),
            // Closing trades link back to the entry via the position id, which
            // equals the entry order's id
            order_id: OrderId::from(position.id.0),
            symbol: position.symbol,
            side: position.side.opposite(),
            volume: position.volume,
            price: exit_price,
            commission: Money::new(commission, self.ledger.currency().clone()),
            executed_at: self.clock.now(),
        });

        self.ledger.apply_exit(pnl_gross, commission);

        info!(
            position_id = %position.id,
            symbol = %position.symbol,
            side = %position.side,
            %reason,
            exit_price,
            pnl_gross,
            "closed position on protective level"
        );

        self.closed_positions.push(position);
    }

    /// Resting orders awaiting the next bar at their symbol.
    pub fn pending_orders(&self) -> &[PendingOrder] {
        &self.pending_orders
    }

    /// Currently open positions.
    pub fn open_positions(&self) -> &[Position] {
        &self.open_positions
    }

    /// Positions terminated by a protective level or an explicit close.
    pub fn closed_positions(&self) -> &[Position] {
        &self.closed_positions
    }

    /// Every fill & close recorded so far, in execution order.
    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn settings(&self) -> &BacktestSettings {
        &self.settings
    }

    /// Aggregated account view marked against the last processed close per
    /// symbol.
    pub fn portfolio(&self) -> crate::portfolio::Portfolio {
        crate::portfolio::Portfolio::snapshot(
            &self.ledger,
            self.open_positions.clone(),
            |position| self.last_close.get(&position.symbol).copied(),
        )
    }
}

impl<C> OrderExecution for SimulatedExecution<C>
where
    C: Clock + Send,
{
    fn place_order(&mut self, request: OrderRequest) -> Result<Order, ExecutionError> {
        if request.volume.is_zero() {
            return Err(ExecutionError::Rejected(format!(
                "zero volume order for symbol {}",
                request.symbol
            )));
        }

        let order = Order {
            id: OrderId::random(),
            symbol: request.symbol,
            side: request.side,
            order_type: request.order_type,
            volume: request.volume,
            price: request.price,
            stop_loss: request.stop_loss,
            take_profit: request.take_profit,
            status: OrderStatus::Pending,
            created_at: self.clock.now(),
            client_order_id: request.client_order_id,
        };

        debug!(
            order_id = %order.id,
            symbol = %order.symbol,
            side = %order.side,
            volume = %order.volume,
            "accepted pending order"
        );

        self.pending_orders.push(PendingOrder {
            order: order.clone(),
            strategy: request.strategy,
        });

        Ok(order)
    }

    fn modify_order(
        &mut self,
        order_id: OrderId,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    ) -> Result<Order, ExecutionError> {
        let pending = self
            .pending_orders
            .iter_mut()
            .find(|pending| pending.order.id == order_id)
            .ok_or(ExecutionError::UnknownOrder(order_id))?;

        if let Some(stop_loss) = stop_loss {
            pending.order.stop_loss = Some(stop_loss);
        }
        if let Some(take_profit) = take_profit {
            pending.order.take_profit = Some(take_profit);
        }

        Ok(pending.order.clone())
    }

    fn cancel_order(&mut self, order_id: OrderId) {
        let before = self.pending_orders.len();
        self.pending_orders
            .retain(|pending| pending.order.id != order_id);

        if self.pending_orders.len() < before {
            debug!(%order_id, "cancelled pending order");
        }
    }

    fn close_position(&mut self, position_id: PositionId) {
        if let Some(index) = self
            .open_positions
            .iter()
            .position(|position| position.id == position_id)
        {
            let position = self.open_positions.remove(index);
            debug!(%position_id, "flat-closed position without trade record");
            self.closed_positions.push(position);
        }
    }

    fn get_positions(&self) -> Vec<Position> {
        self.open_positions.clone()
    }
}
