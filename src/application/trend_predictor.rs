use crate::application::ml::refiner::{BoostedRefiner, RefinerParams};
use crate::application::ml::sequence_model::RecurrentSequenceModel;
use crate::domain::errors::{PipelineError, PipelineResult};
use crate::domain::market::regime_profile::RegimeProfile;
use crate::domain::market::timeframe::Regime;
use crate::domain::ml::dataset::{FeatureDataset, PreprocessWarning};
use crate::domain::ml::training::PipelineTrainingReport;
use crate::domain::ml::window::{WindowBatch, compose_refined};
use crate::domain::ports::{FeatureProvider, SequenceModel};
use crate::domain::risk::monte_carlo::{RiskSimulator, RiskSummary};
use crate::domain::trading::signal::{SignalPolicy, TradeSignal};
use serde::Serialize;
use tracing::{info, warn};

/// Lifecycle of a per-regime pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineState {
    Unfitted,
    Preprocessed,
    Trained,
    Ready,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    /// First-stage output for the window
    pub sequence_estimate: f64,
    /// Refined estimate; the pipeline's final prediction
    pub estimate: f64,
    pub signal: TradeSignal,
    pub risk: RiskSummary,
}

/// Everything `run` produces, for reporting
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRun {
    pub regime: Regime,
    pub windows: usize,
    pub price: f64,
    pub volatility: f64,
    pub training: PipelineTrainingReport,
    pub prediction: Prediction,
    pub warnings: Vec<PreprocessWarning>,
}

/// Wires Feature Provider, Sequence Model, Refiner, Signal Policy and Risk
/// Simulator together for one regime.
///
/// `preprocess_data -> train -> predict`; calling out of order fails with
/// `UnfittedModel`. A pipeline that has been trained stays usable after a
/// later `preprocess_data`.
pub struct TrendPredictor {
    profile: RegimeProfile,
    provider: Box<dyn FeatureProvider>,
    sequence_model: Box<dyn SequenceModel>,
    refiner: BoostedRefiner,
    policy: SignalPolicy,
    simulator: RiskSimulator,
    state: PipelineState,
}

impl TrendPredictor {
    pub fn new(profile: RegimeProfile, provider: Box<dyn FeatureProvider>, seed: u64) -> Self {
        let sequence_model = Box::new(RecurrentSequenceModel::from_profile(&profile, seed));
        let refiner = BoostedRefiner::new(
            profile.refiner_mode(),
            profile.n_features(),
            RefinerParams {
                seed,
                ..RefinerParams::default()
            },
        );
        let policy = SignalPolicy::default().with_thresholds(profile.regime, profile.thresholds);

        Self {
            profile,
            provider,
            sequence_model,
            refiner,
            policy,
            simulator: RiskSimulator::default(),
            state: PipelineState::Unfitted,
        }
    }

    pub fn with_sequence_model(mut self, model: Box<dyn SequenceModel>) -> Self {
        self.sequence_model = model;
        self
    }

    pub fn with_refiner_params(mut self, params: RefinerParams) -> Self {
        self.refiner = BoostedRefiner::new(self.profile.refiner_mode(), self.profile.n_features(), params);
        self
    }

    pub fn with_policy(mut self, policy: SignalPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_simulator(mut self, simulator: RiskSimulator) -> Self {
        self.simulator = simulator;
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn profile(&self) -> &RegimeProfile {
        &self.profile
    }

    pub fn preprocess_data(&mut self) -> PipelineResult<FeatureDataset> {
        let dataset = self.provider.load()?;
        if dataset.is_empty() {
            return Err(PipelineError::no_data(format!(
                "feature provider returned no windows for the {} regime",
                self.profile.regime
            )));
        }
        if self.state == PipelineState::Unfitted {
            self.state = PipelineState::Preprocessed;
        }
        info!(
            "{} preprocessed: {} windows of {}x{}",
            self.profile.regime,
            dataset.windows.len(),
            dataset.windows.window_len(),
            dataset.windows.n_features()
        );
        Ok(dataset)
    }

    /// Trains the sequence model, then the refiner on its in-sample output.
    pub fn train(
        &mut self,
        windows: &WindowBatch,
        targets: &[f64],
    ) -> PipelineResult<PipelineTrainingReport> {
        if self.state == PipelineState::Unfitted {
            return Err(PipelineError::unfitted(
                "train called before preprocess_data",
            ));
        }

        let sequence = self.sequence_model.train(windows, targets)?;
        let in_sample = self.sequence_model.predict(windows)?;
        let refined = compose_refined(&in_sample, windows, self.profile.n_features())?;
        let refiner_loss = self.refiner.train(&refined, targets)?;

        self.state = PipelineState::Trained;
        info!(
            "{} pipeline trained ({}): sequence loss {:.6}, refiner loss {:.6}",
            self.profile.regime,
            self.sequence_model.name(),
            sequence.train_loss,
            refiner_loss
        );
        Ok(PipelineTrainingReport {
            sequence,
            refiner_loss,
        })
    }

    /// Predicts from exactly one window.
    pub fn predict(
        &mut self,
        window: &WindowBatch,
        price: f64,
        volatility: f64,
    ) -> PipelineResult<Prediction> {
        if !matches!(self.state, PipelineState::Trained | PipelineState::Ready) {
            return Err(PipelineError::unfitted(format!(
                "predict called in state {:?}",
                self.state
            )));
        }
        if window.len() != 1 {
            return Err(PipelineError::invalid_shape(
                "exactly one window",
                format!("{} windows", window.len()),
            ));
        }

        let sequence_estimate = self
            .sequence_model
            .predict(window)?
            .first()
            .copied()
            .ok_or_else(|| PipelineError::model("sequence model returned no estimate"))?;
        let refined = compose_refined(&[sequence_estimate], window, self.profile.n_features())?;
        let estimate = self
            .refiner
            .predict(&refined)?
            .first()
            .copied()
            .ok_or_else(|| PipelineError::model("refiner returned no estimate"))?;

        let signal = self.policy.decide(estimate, price, self.profile.regime)?;
        let risk = self
            .simulator
            .simulate(estimate, volatility, self.profile.drift_mode())?;

        self.state = PipelineState::Ready;
        info!(
            "{} prediction: {:.5} (sequence {:.5}) -> {}",
            self.profile.regime, estimate, sequence_estimate, signal
        );
        Ok(Prediction {
            sequence_estimate,
            estimate,
            signal,
            risk,
        })
    }

    /// Preprocess, train, then predict on the newest window with the latest
    /// close and the return volatility of the processed table.
    pub fn run(&mut self) -> PipelineResult<PipelineRun> {
        let dataset = self.preprocess_data()?;
        self.fit_and_predict(dataset)
    }

    /// The train and predict half of `run`, on an already preprocessed dataset.
    pub fn fit_and_predict(&mut self, dataset: FeatureDataset) -> PipelineResult<PipelineRun> {
        let training = self.train(&dataset.windows, &dataset.targets)?;

        let price = dataset
            .table
            .latest_close()
            .ok_or_else(|| PipelineError::no_data("processed table has no close column"))?;
        let volatility = match dataset.table.return_volatility() {
            Some(v) => v,
            None => {
                warn!("Not enough history for a volatility estimate; using 0");
                0.0
            }
        };

        let prediction = self.predict(&dataset.latest, price, volatility)?;
        Ok(PipelineRun {
            regime: self.profile.regime,
            windows: dataset.windows.len(),
            price,
            volatility,
            training,
            prediction,
            warnings: dataset.warnings,
        })
    }
}
