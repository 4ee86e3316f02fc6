use crate::{
    instrument::Quantity,
    strategy::{definition::RiskPolicyDefinition, SignalContext},
};
use smol_str::SmolStr;
use thiserror::Error;

/// Minimum tradable lot size. Position sizing never goes below this.
pub const MIN_LOT: f64 = 0.01;

/// Default account-currency value of one pip for one lot, used by
/// [`RiskPercentPositionSizing`] when a definition does not override it.
pub const DEFAULT_PIP_VALUE: f64 = 10.0;

/// Determines the stop-loss distance, in pips, for a prospective entry.
pub trait StopLossPolicy: Send {
    fn stop_loss_pips(&self, context: &SignalContext) -> Result<f64, RiskError>;
}

/// Determines the take-profit distance, in pips, for a prospective entry with
/// the provided stop-loss distance.
pub trait TakeProfitPolicy: Send {
    fn take_profit_pips(&self, context: &SignalContext, stop_loss_pips: f64)
        -> Result<f64, RiskError>;
}

/// Determines the volume, in lots, for a prospective entry with the provided
/// stop-loss distance.
pub trait PositionSizer: Send {
    fn volume(&self, context: &SignalContext, stop_loss_pips: f64) -> Result<Quantity, RiskError>;
}

/// Constant stop-loss distance.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FixedPipsStopLoss {
    pips: f64,
}

impl FixedPipsStopLoss {
    pub fn new(pips: f64) -> Result<Self, RiskError> {
        if pips > 0.0 {
            Ok(Self { pips })
        } else {
            Err(RiskError::InvalidArgument(format!(
                "stop-loss pips must be positive: {pips}"
            )))
        }
    }
}

impl StopLossPolicy for FixedPipsStopLoss {
    fn stop_loss_pips(&self, _: &SignalContext) -> Result<f64, RiskError> {
        Ok(self.pips)
    }
}

/// Constant take-profit distance.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FixedPipsTakeProfit {
    pips: f64,
}

impl FixedPipsTakeProfit {
    pub fn new(pips: f64) -> Result<Self, RiskError> {
        if pips > 0.0 {
            Ok(Self { pips })
        } else {
            Err(RiskError::InvalidArgument(format!(
                "take-profit pips must be positive: {pips}"
            )))
        }
    }
}

impl TakeProfitPolicy for FixedPipsTakeProfit {
    fn take_profit_pips(&self, _: &SignalContext, _: f64) -> Result<f64, RiskError> {
        Ok(self.pips)
    }
}

/// Take-profit distance as a multiple of the stop-loss distance.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct RiskRewardTakeProfit {
    ratio: f64,
}

impl RiskRewardTakeProfit {
    pub fn new(ratio: f64) -> Result<Self, RiskError> {
        if ratio > 0.0 {
            Ok(Self { ratio })
        } else {
            Err(RiskError::InvalidArgument(format!(
                "risk-reward ratio must be positive: {ratio}"
            )))
        }
    }
}

impl TakeProfitPolicy for RiskRewardTakeProfit {
    fn take_profit_pips(
        &self,
        _: &SignalContext,
        stop_loss_pips: f64,
    ) -> Result<f64, RiskError> {
        if stop_loss_pips <= 0.0 {
            return Err(RiskError::InvalidArgument(format!(
                "risk-reward take-profit requires a positive stop-loss distance: {stop_loss_pips}"
            )));
        }

        Ok(stop_loss_pips * self.ratio)
    }
}

/// Constant lot size.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FixedLotPositionSizing {
    lots: f64,
}

impl FixedLotPositionSizing {
    pub fn new(lots: f64) -> Result<Self, RiskError> {
        if lots > 0.0 {
            Ok(Self { lots })
        } else {
            Err(RiskError::InvalidArgument(format!(
                "lot size must be positive: {lots}"
            )))
        }
    }
}

impl PositionSizer for FixedLotPositionSizing {
    fn volume(&self, _: &SignalContext, _: f64) -> Result<Quantity, RiskError> {
        Quantity::new(self.lots).map_err(|err| RiskError::InvalidArgument(err.to_string()))
    }
}

/// Lot size risking a fixed percentage of the account balance per trade.
///
/// `lots = round2(max(0.01, balance * percent/100 / (stop_loss_pips * pip_value)))`
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct RiskPercentPositionSizing {
    percent: f64,
    pip_value: f64,
}

impl RiskPercentPositionSizing {
    pub fn new(percent: f64, pip_value: f64) -> Result<Self, RiskError> {
        if percent <= 0.0 || percent > 100.0 {
            return Err(RiskError::InvalidArgument(format!(
                "risk percent must be within (0, 100]: {percent}"
            )));
        }
        if pip_value <= 0.0 {
            return Err(RiskError::InvalidArgument(format!(
                "pip value must be positive: {pip_value}"
            )));
        }

        Ok(Self { percent, pip_value })
    }
}

impl PositionSizer for RiskPercentPositionSizing {
    fn volume(&self, context: &SignalContext, stop_loss_pips: f64) -> Result<Quantity, RiskError> {
        if stop_loss_pips <= 0.0 {
            return Err(RiskError::InvalidArgument(format!(
                "risk-percent sizing requires a positive stop-loss distance: {stop_loss_pips}"
            )));
        }

        let risk_amount = context.account_balance * self.percent / 100.0;
        let lots = risk_amount / (stop_loss_pips * self.pip_value);
        let lots = round2(lots.max(MIN_LOT));

        Quantity::new(lots).map_err(|err| RiskError::InvalidArgument(err.to_string()))
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Build a [`StopLossPolicy`] from its definition block.
pub fn build_stop_loss(
    definition: &RiskPolicyDefinition,
) -> Result<Box<dyn StopLossPolicy>, RiskError> {
    match definition.kind.to_lowercase().as_str() {
        "fixedpips" | "fixedpipsstoploss" => {
            let pips = required_param(definition, "Pips")?;
            Ok(Box::new(FixedPipsStopLoss::new(pips)?))
        }
        _ => Err(RiskError::UnknownPolicy(definition.kind.clone())),
    }
}

/// Build a [`TakeProfitPolicy`] from its definition block.
pub fn build_take_profit(
    definition: &RiskPolicyDefinition,
) -> Result<Box<dyn TakeProfitPolicy>, RiskError> {
    match definition.kind.to_lowercase().as_str() {
        "fixedpips" | "fixedpipstakeprofit" => {
            let pips = required_param(definition, "Pips")?;
            Ok(Box::new(FixedPipsTakeProfit::new(pips)?))
        }
        "riskreward" | "riskrewardtakeprofit" => {
            let ratio = required_param(definition, "Ratio")?;
            Ok(Box::new(RiskRewardTakeProfit::new(ratio)?))
        }
        _ => Err(RiskError::UnknownPolicy(definition.kind.clone())),
    }
}

/// Build a [`PositionSizer`] from its definition block.
pub fn build_position_sizing(
    definition: &RiskPolicyDefinition,
) -> Result<Box<dyn PositionSizer>, RiskError> {
    match definition.kind.to_lowercase().as_str() {
        "fixedlot" | "fixedlotpositionsizing" => {
            let lots = required_param(definition, "Lots")?;
            Ok(Box::new(FixedLotPositionSizing::new(lots)?))
        }
        "riskpercent" | "riskpercentpositionsizing" => {
            let percent = required_param(definition, "Percent")?;
            let pip_value = definition.param_f64("PipValue").unwrap_or(DEFAULT_PIP_VALUE);
            Ok(Box::new(RiskPercentPositionSizing::new(percent, pip_value)?))
        }
        _ => Err(RiskError::UnknownPolicy(definition.kind.clone())),
    }
}

fn required_param(definition: &RiskPolicyDefinition, key: &str) -> Result<f64, RiskError> {
    definition.param_f64(key).ok_or_else(|| {
        RiskError::InvalidArgument(format!(
            "{} policy is missing required parameter {key}",
            definition.kind
        ))
    })
}

/// Risk module specific errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RiskError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unknown risk policy type: {0}")]
    UnknownPolicy(SmolStr),
}
