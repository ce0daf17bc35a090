use crate::domain::errors::{PipelineError, PipelineResult};
use crate::domain::market::timeframe::{Regime, TargetKind};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SIMULATIONS: usize = 1000;

/// Stand-in for the mean of negative samples when none were drawn.
/// Arbitrary and not scaled to volatility.
pub const NEGATIVE_MEAN_FLOOR: f64 = -0.001;

/// How a scalar estimate becomes the drift of the simulated distribution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftMode {
    /// Probability in [0, 1] mapped to a signed strength in [-1, 1]
    Classification,
    /// Estimate used as-is
    Regression,
}

impl DriftMode {
    pub fn for_regime(regime: Regime) -> Self {
        match regime.target_kind() {
            TargetKind::Direction => DriftMode::Classification,
            TargetKind::NextClose => DriftMode::Regression,
        }
    }

    pub fn drift(&self, estimate: f64) -> f64 {
        match self {
            DriftMode::Classification => (estimate - 0.5) * 2.0,
            DriftMode::Regression => estimate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskSummary {
    pub up_probability: f64,
    pub down_probability: f64,
    pub expected_move: f64,
    pub risk_reward: f64,
    /// |drift|
    pub confidence: f64,
    pub samples: usize,
}

impl RiskSummary {
    /// Reduces raw samples to summary statistics.
    pub fn from_samples(samples: &[f64], drift: f64) -> Self {
        let n = samples.len();
        if n == 0 {
            return Self {
                up_probability: 0.0,
                down_probability: 0.0,
                expected_move: 0.0,
                risk_reward: 0.0,
                confidence: drift.abs(),
                samples: 0,
            };
        }

        let (mut pos_sum, mut pos_count) = (0.0, 0usize);
        let (mut neg_sum, mut neg_count) = (0.0, 0usize);
        let mut total = 0.0;
        for &s in samples {
            total += s;
            if s > 0.0 {
                pos_sum += s;
                pos_count += 1;
            } else if s < 0.0 {
                neg_sum += s;
                neg_count += 1;
            }
        }

        let pos_mean = if pos_count > 0 {
            pos_sum / pos_count as f64
        } else {
            0.0
        };
        let neg_mean = if neg_count > 0 {
            neg_sum / neg_count as f64
        } else {
            NEGATIVE_MEAN_FLOOR
        };

        Self {
            up_probability: pos_count as f64 / n as f64,
            down_probability: neg_count as f64 / n as f64,
            expected_move: total / n as f64,
            risk_reward: (pos_mean / neg_mean).abs(),
            confidence: drift.abs(),
            samples: n,
        }
    }
}

/// Draws one-step moves from `Normal(drift * volatility, volatility)` and
/// summarises them. Unseeded unless `with_seed` is used.
#[derive(Debug, Clone)]
pub struct RiskSimulator {
    simulations: usize,
    seed: Option<u64>,
}

impl Default for RiskSimulator {
    fn default() -> Self {
        Self::new(DEFAULT_SIMULATIONS)
    }
}

impl RiskSimulator {
    pub fn new(simulations: usize) -> Self {
        Self {
            simulations,
            seed: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn simulations(&self) -> usize {
        self.simulations
    }

    pub fn simulate(
        &self,
        estimate: f64,
        volatility: f64,
        mode: DriftMode,
    ) -> PipelineResult<RiskSummary> {
        if self.simulations == 0 {
            return Err(PipelineError::InvalidParameter {
                name: "simulations",
                reason: "must be > 0".to_string(),
            });
        }
        if !volatility.is_finite() || volatility < 0.0 {
            return Err(PipelineError::InvalidParameter {
                name: "volatility",
                reason: format!("must be finite and >= 0, got {}", volatility),
            });
        }
        if !estimate.is_finite() {
            return Err(PipelineError::InvalidParameter {
                name: "estimate",
                reason: format!("must be finite, got {}", estimate),
            });
        }

        let drift = mode.drift(estimate);

        // Degenerate distribution: every draw is exactly the mean, which is 0.
        if volatility == 0.0 {
            let samples = vec![0.0; self.simulations];
            return Ok(RiskSummary::from_samples(&samples, drift));
        }

        let normal = Normal::new(drift * volatility, volatility).map_err(|e| {
            PipelineError::InvalidParameter {
                name: "volatility",
                reason: e.to_string(),
            }
        })?;

        let samples = match self.seed {
            Some(seed) => draw(&normal, self.simulations, &mut StdRng::seed_from_u64(seed)),
            None => draw(&normal, self.simulations, &mut rand::rng()),
        };

        Ok(RiskSummary::from_samples(&samples, drift))
    }
}

fn draw<R: Rng + ?Sized>(normal: &Normal<f64>, n: usize, rng: &mut R) -> Vec<f64> {
    (0..n).map(|_| normal.sample(rng)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drift_modes() {
        assert_eq!(DriftMode::Classification.drift(0.75), 0.5);
        assert_eq!(DriftMode::Classification.drift(0.0), -1.0);
        assert_eq!(DriftMode::Regression.drift(1.2345), 1.2345);
        assert_eq!(DriftMode::for_regime(Regime::Long), DriftMode::Regression);
        assert_eq!(
            DriftMode::for_regime(Regime::Short),
            DriftMode::Classification
        );
    }

    #[test]
    fn test_zero_volatility_is_degenerate() {
        let summary = RiskSimulator::default()
            .simulate(0.9, 0.0, DriftMode::Classification)
            .unwrap();
        assert_eq!(summary.up_probability, 0.0);
        assert_eq!(summary.down_probability, 0.0);
        assert_eq!(summary.expected_move, 0.0);
        assert_eq!(summary.samples, DEFAULT_SIMULATIONS);
    }

    #[test]
    fn test_invalid_parameters() {
        let sim = RiskSimulator::default();
        assert!(matches!(
            sim.simulate(0.5, -0.1, DriftMode::Classification),
            Err(PipelineError::InvalidParameter {
                name: "volatility",
                ..
            })
        ));
        assert!(matches!(
            RiskSimulator::new(0).simulate(0.5, 1.0, DriftMode::Classification),
            Err(PipelineError::InvalidParameter {
                name: "simulations",
                ..
            })
        ));
        assert!(sim.simulate(f64::NAN, 1.0, DriftMode::Regression).is_err());
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let sim = RiskSimulator::new(500).with_seed(7);
        let a = sim.simulate(0.8, 0.5, DriftMode::Classification).unwrap();
        let b = sim.simulate(0.8, 0.5, DriftMode::Classification).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_bullish_estimate_skews_up() {
        let summary = RiskSimulator::new(5000)
            .with_seed(42)
            .simulate(0.95, 1.0, DriftMode::Classification)
            .unwrap();
        // drift 0.9 -> P(N(0.9, 1) > 0) ~ 0.816
        assert!(summary.up_probability > 0.75, "{:?}", summary);
        assert!(summary.expected_move > 0.7);
        assert!((summary.confidence - 0.9).abs() < 1e-12);
        assert!(summary.risk_reward > 1.0);
    }

    #[test]
    fn test_probabilities_never_exceed_one() {
        let summary = RiskSimulator::new(2000)
            .with_seed(3)
            .simulate(0.5, 0.2, DriftMode::Classification)
            .unwrap();
        assert!(summary.up_probability + summary.down_probability <= 1.0);
    }

    #[test]
    fn test_from_samples_uses_floor_without_negatives() {
        let summary = RiskSummary::from_samples(&[0.002, 0.004, 0.0], 0.1);
        assert!((summary.up_probability - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(summary.down_probability, 0.0);
        // pos mean 0.003 / floor -0.001 -> 3.0
        assert!((summary.risk_reward - 3.0).abs() < 1e-9);
        // exactly-zero sample leaves a gap between up and down
        assert!(summary.up_probability + summary.down_probability < 1.0);
    }

    #[test]
    fn test_from_samples_ratio() {
        let summary = RiskSummary::from_samples(&[2.0, 4.0, -1.0, -3.0], 0.0);
        assert_eq!(summary.up_probability, 0.5);
        assert_eq!(summary.down_probability, 0.5);
        assert_eq!(summary.expected_move, 0.5);
        assert_eq!(summary.risk_reward, 1.5);
    }
}
