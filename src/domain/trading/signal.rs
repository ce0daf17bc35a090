use crate::domain::errors::{PipelineError, PipelineResult};
use crate::domain::market::timeframe::Regime;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalAction {
    Buy,
    Sell,
    Hold,
}

impl fmt::Display for SignalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalAction::Buy => write!(f, "BUY"),
            SignalAction::Sell => write!(f, "SELL"),
            SignalAction::Hold => write!(f, "HOLD"),
        }
    }
}

/// Discrete trade decision. BUY and SELL carry the reference price at decision time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "UPPERCASE")]
pub enum TradeSignal {
    Buy { price: f64 },
    Sell { price: f64 },
    Hold,
}

impl TradeSignal {
    pub fn action(&self) -> SignalAction {
        match self {
            TradeSignal::Buy { .. } => SignalAction::Buy,
            TradeSignal::Sell { .. } => SignalAction::Sell,
            TradeSignal::Hold => SignalAction::Hold,
        }
    }

    pub fn reference_price(&self) -> Option<f64> {
        match self {
            TradeSignal::Buy { price } | TradeSignal::Sell { price } => Some(*price),
            TradeSignal::Hold => None,
        }
    }
}

impl fmt::Display for TradeSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeSignal::Buy { price } => write!(f, "BUY @ {:.5}", price),
            TradeSignal::Sell { price } => write!(f, "SELL @ {:.5}", price),
            TradeSignal::Hold => write!(f, "HOLD"),
        }
    }
}

/// Decision thresholds for one regime
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignalThresholds {
    /// Estimate is a probability of an up move
    Probability { buy_above: f64, sell_below: f64 },
    /// Estimate is a price; `band` is the fractional distance from the current price
    PriceBand { band: f64 },
}

impl SignalThresholds {
    pub const DEFAULT_PRICE_BAND: f64 = 0.02;

    pub fn for_regime(regime: Regime) -> Self {
        match regime {
            Regime::Short => SignalThresholds::Probability {
                buy_above: 0.8,
                sell_below: 0.2,
            },
            Regime::Medium => SignalThresholds::Probability {
                buy_above: 0.7,
                sell_below: 0.3,
            },
            Regime::Long => SignalThresholds::PriceBand {
                band: Self::DEFAULT_PRICE_BAND,
            },
        }
    }

    /// Maps an estimate to an action. Strict inequalities: values on a
    /// threshold fall in the dead zone.
    pub fn apply(&self, estimate: f64, price: f64) -> PipelineResult<TradeSignal> {
        if !estimate.is_finite() {
            return Err(PipelineError::invalid_input(format!(
                "estimate must be finite, got {}",
                estimate
            )));
        }
        if !price.is_finite() {
            return Err(PipelineError::invalid_input(format!(
                "price must be finite, got {}",
                price
            )));
        }

        let (buy, sell) = match *self {
            SignalThresholds::Probability {
                buy_above,
                sell_below,
            } => (estimate > buy_above, estimate < sell_below),
            SignalThresholds::PriceBand { band } => (
                estimate > price * (1.0 + band),
                estimate < price * (1.0 - band),
            ),
        };

        Ok(if buy {
            TradeSignal::Buy { price }
        } else if sell {
            TradeSignal::Sell { price }
        } else {
            TradeSignal::Hold
        })
    }
}

/// Stateless mapping from a refined estimate to a trade signal, per regime.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalPolicy {
    short: SignalThresholds,
    medium: SignalThresholds,
    long: SignalThresholds,
}

impl Default for SignalPolicy {
    fn default() -> Self {
        Self {
            short: SignalThresholds::for_regime(Regime::Short),
            medium: SignalThresholds::for_regime(Regime::Medium),
            long: SignalThresholds::for_regime(Regime::Long),
        }
    }
}

impl SignalPolicy {
    pub fn new(short: SignalThresholds, medium: SignalThresholds, long: SignalThresholds) -> Self {
        Self {
            short,
            medium,
            long,
        }
    }

    /// Replaces the thresholds of one regime
    pub fn with_thresholds(mut self, regime: Regime, thresholds: SignalThresholds) -> Self {
        match regime {
            Regime::Short => self.short = thresholds,
            Regime::Medium => self.medium = thresholds,
            Regime::Long => self.long = thresholds,
        }
        self
    }

    pub fn thresholds(&self, regime: Regime) -> &SignalThresholds {
        match regime {
            Regime::Short => &self.short,
            Regime::Medium => &self.medium,
            Regime::Long => &self.long,
        }
    }

    pub fn decide(&self, estimate: f64, price: f64, regime: Regime) -> PipelineResult<TradeSignal> {
        self.thresholds(regime).apply(estimate, price)
    }
}
