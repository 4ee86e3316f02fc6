use crate::{
    backtest::BacktestResult,
    execution::{OrderId, Side, Trade},
    statistic::metric::{MaxDrawdownGenerator, ProfitFactor, WinRate},
};
use chrono::Utc;
use fnv::FnvHashMap;
use tracing::debug;
use uuid::Uuid;

/// Reduce executed trades into a successful [`BacktestResult`].
///
/// Trades are grouped by `order_id`; a group holding an entry and an exit (two
/// or more trades, paired by execution time) forms one closed position. The
/// equity curve walks per-position net pnl in chronological close order.
pub fn reduce(job_id: Uuid, trades: &[Trade], initial_balance: f64) -> BacktestResult {
    let mut groups: FnvHashMap<OrderId, Vec<&Trade>> = FnvHashMap::default();
    for trade in trades {
        groups.entry(trade.order_id).or_default().push(trade);
    }

    // (close time, net pnl) per closed position
    let mut closes = groups
        .into_values()
        .filter(|group| group.len() >= 2)
        .map(|mut group| {
            group.sort_by_key(|trade| trade.executed_at);
            let entry = group[0];
            let exit = group[1];

            let pnl_gross = match entry.side {
                Side::Buy => (exit.price - entry.price) * entry.volume.as_f64(),
                Side::Sell => (entry.price - exit.price) * entry.volume.as_f64(),
            };
            let pnl = pnl_gross - entry.commission.amount - exit.commission.amount;

            (exit.executed_at, pnl)
        })
        .collect::<Vec<_>>();

    closes.sort_by_key(|(closed_at, _)| *closed_at);

    let total_trades = closes.len();
    let winning_trades = closes.iter().filter(|(_, pnl)| *pnl > 0.0).count();
    let losing_trades = total_trades - winning_trades;

    let gross_profit = closes
        .iter()
        .map(|(_, pnl)| *pnl)
        .filter(|pnl| *pnl > 0.0)
        .sum::<f64>();
    let gross_loss = closes
        .iter()
        .map(|(_, pnl)| *pnl)
        .filter(|pnl| *pnl <= 0.0)
        .sum::<f64>()
        .abs();

    let mut drawdown = MaxDrawdownGenerator::init(initial_balance);
    let mut equity = initial_balance;
    for (_, pnl) in &closes {
        equity += pnl;
        drawdown.update(equity);
    }

    debug!(
        %job_id,
        total_trades,
        winning_trades,
        gross_profit,
        gross_loss,
        final_balance = equity,
        "reduced trades into backtest metrics"
    );

    BacktestResult {
        job_id,
        success: true,
        error: None,
        initial_balance,
        final_balance: equity,
        total_trades,
        winning_trades,
        losing_trades,
        profit_factor: ProfitFactor::calculate(gross_profit, gross_loss).value,
        max_drawdown_percent: drawdown.max_drawdown_percent(),
        win_rate: WinRate::calculate(winning_trades, total_trades).value,
        completed_at: Utc::now(),
    }
}
