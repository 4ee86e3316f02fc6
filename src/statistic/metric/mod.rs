pub mod drawdown;
pub mod profit_factor;
pub mod win_rate;

pub use drawdown::MaxDrawdownGenerator;
pub use profit_factor::ProfitFactor;
pub use win_rate::WinRate;
