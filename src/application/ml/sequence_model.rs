use super::gru::{ConvFrontEnd, GruCell, sigmoid};
use crate::domain::errors::{PipelineError, PipelineResult};
use crate::domain::market::regime_profile::RegimeProfile;
use crate::domain::ml::model_kind::{ArchitectureHint, OutputRange};
use crate::domain::ml::training::TrainingReport;
use crate::domain::ml::window::WindowBatch;
use crate::domain::ports::SequenceModel;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rayon::prelude::*;
use tracing::{debug, info};

const LOSS_EPS: f64 = 1e-7;

#[derive(Debug, Clone, PartialEq)]
pub struct SequenceModelConfig {
    pub window_len: usize,
    pub n_features: usize,
    pub hidden_units: usize,
    pub layers: usize,
    pub epochs: usize,
    pub learning_rate: f64,
    pub batch_size: usize,
    /// Trailing fraction of the training windows held out for early stopping
    pub validation_fraction: f64,
    /// Epochs without holdout improvement before training stops
    pub patience: usize,
    pub output_range: OutputRange,
    pub architecture: ArchitectureHint,
    pub conv_filters: usize,
    pub conv_kernel: usize,
    pub seed: u64,
}

impl SequenceModelConfig {
    pub fn from_profile(profile: &RegimeProfile, seed: u64) -> Self {
        Self {
            window_len: profile.window_len,
            n_features: profile.n_features(),
            hidden_units: profile.hidden_units,
            layers: 1,
            epochs: profile.epochs,
            learning_rate: profile.learning_rate,
            batch_size: profile.batch_size,
            validation_fraction: 0.2,
            patience: 5,
            output_range: profile.output_range(),
            architecture: profile.architecture,
            conv_filters: profile.conv_filters,
            conv_kernel: profile.conv_kernel,
            seed,
        }
    }
}

/// Standardises unbounded targets so one learning rate works across price scales.
#[derive(Debug, Clone, Copy, PartialEq)]
struct TargetScaler {
    mean: f64,
    std: f64,
}

impl TargetScaler {
    fn fit(targets: &[f64]) -> Self {
        let n = targets.len().max(1) as f64;
        let mean = targets.iter().sum::<f64>() / n;
        let var = targets.iter().map(|t| (t - mean).powi(2)).sum::<f64>() / n;
        let std = var.sqrt();
        Self {
            mean,
            std: if std > 1e-12 { std } else { 1.0 },
        }
    }

    fn scale(&self, v: f64) -> f64 {
        (v - self.mean) / self.std
    }

    fn unscale(&self, v: f64) -> f64 {
        v * self.std + self.mean
    }
}

/// Dense layer from the final hidden state to one output, fitted with Adam.
#[derive(Debug, Clone)]
struct Readout {
    weights: Array1<f64>,
    bias: f64,
    // Adam moments
    m_w: Array1<f64>,
    v_w: Array1<f64>,
    m_b: f64,
    v_b: f64,
    step: i32,
}

impl Readout {
    const BETA1: f64 = 0.9;
    const BETA2: f64 = 0.999;
    const EPS: f64 = 1e-8;

    fn new(inputs: usize) -> Self {
        Self {
            weights: Array1::zeros(inputs),
            bias: 0.0,
            m_w: Array1::zeros(inputs),
            v_w: Array1::zeros(inputs),
            m_b: 0.0,
            v_b: 0.0,
            step: 0,
        }
    }

    fn logit(&self, hidden: ArrayView1<'_, f64>) -> f64 {
        self.weights.dot(&hidden) + self.bias
    }

    /// Applies one Adam step given the mean gradient w.r.t. weights and bias
    fn adam_step(&mut self, grad_w: &Array1<f64>, grad_b: f64, lr: f64) {
        self.step += 1;
        let bc1 = 1.0 - Self::BETA1.powi(self.step);
        let bc2 = 1.0 - Self::BETA2.powi(self.step);

        self.m_w = &self.m_w * Self::BETA1 + grad_w * (1.0 - Self::BETA1);
        self.v_w = &self.v_w * Self::BETA2 + &grad_w.mapv(|g| g * g) * (1.0 - Self::BETA2);
        for ((w, m), v) in self
            .weights
            .iter_mut()
            .zip(self.m_w.iter())
            .zip(self.v_w.iter())
        {
            *w -= lr * (m / bc1) / ((v / bc2).sqrt() + Self::EPS);
        }

        self.m_b = Self::BETA1 * self.m_b + (1.0 - Self::BETA1) * grad_b;
        self.v_b = Self::BETA2 * self.v_b + (1.0 - Self::BETA2) * grad_b * grad_b;
        self.bias -= lr * (self.m_b / bc1) / ((self.v_b / bc2).sqrt() + Self::EPS);
    }
}

/// GRU sequence model, optionally fronted by a causal convolution.
///
/// The encoder is a fixed random projection (seeded); `train` fits only the
/// dense read-out on the final hidden state, which keeps training cheap and
/// deterministic for a given seed.
#[derive(Debug, Clone)]
pub struct RecurrentSequenceModel {
    config: SequenceModelConfig,
    name: String,
    front_end: Option<ConvFrontEnd>,
    cells: Vec<GruCell>,
    readout: Option<Readout>,
    scaler: Option<TargetScaler>,
}

impl RecurrentSequenceModel {
    pub fn new(config: SequenceModelConfig) -> Self {
        let mut rng = StdRng::seed_from_u64(config.seed);

        let (front_end, mut input_size) = match config.architecture {
            ArchitectureHint::ConvRecurrent => (
                Some(ConvFrontEnd::new(
                    config.n_features,
                    config.conv_filters,
                    config.conv_kernel,
                    &mut rng,
                )),
                config.conv_filters,
            ),
            ArchitectureHint::Recurrent => (None, config.n_features),
        };

        let mut cells = Vec::with_capacity(config.layers.max(1));
        for _ in 0..config.layers.max(1) {
            cells.push(GruCell::new(input_size, config.hidden_units, &mut rng));
            input_size = config.hidden_units;
        }

        let name = match config.architecture {
            ArchitectureHint::Recurrent => format!("GRU-{}", config.hidden_units),
            ArchitectureHint::ConvRecurrent => format!(
                "Conv{}x{}-GRU-{}",
                config.conv_filters, config.conv_kernel, config.hidden_units
            ),
        };

        Self {
            config,
            name,
            front_end,
            cells,
            readout: None,
            scaler: None,
        }
    }

    pub fn from_profile(profile: &RegimeProfile, seed: u64) -> Self {
        Self::new(SequenceModelConfig::from_profile(profile, seed))
    }

    pub fn config(&self) -> &SequenceModelConfig {
        &self.config
    }

    pub fn is_fitted(&self) -> bool {
        self.readout.is_some()
    }

    fn check_batch(&self, windows: &WindowBatch) -> PipelineResult<()> {
        if windows.is_empty() {
            return Err(PipelineError::invalid_shape(
                "at least one window",
                "empty batch",
            ));
        }
        windows.validate_schema(self.config.window_len, self.config.n_features)
    }

    /// Runs one window through the encoder and returns the last hidden state.
    fn encode_window(&self, window: ArrayView2<'_, f64>) -> Array1<f64> {
        let convolved;
        let steps = match &self.front_end {
            Some(conv) => {
                convolved = conv.forward(window);
                convolved.view()
            }
            None => window.view(),
        };

        let mut states: Vec<Array1<f64>> = self.cells.iter().map(GruCell::init_hidden).collect();
        for step in steps.rows() {
            let mut layer_input = step.to_owned();
            for (layer, cell) in self.cells.iter().enumerate() {
                let next = cell.forward(layer_input.view(), &states[layer]);
                layer_input = next.clone();
                states[layer] = next;
            }
        }
        states
            .pop()
            .unwrap_or_else(|| Array1::zeros(self.config.hidden_units))
    }

    /// Encodes every window in parallel, `[windows, hidden_units]`
    fn encode(&self, windows: &WindowBatch) -> Array2<f64> {
        let hidden: Vec<Array1<f64>> = (0..windows.len())
            .into_par_iter()
            .map(|i| self.encode_window(windows.window(i)))
            .collect();

        let mut out = Array2::zeros((hidden.len(), self.config.hidden_units));
        for (mut row, h) in out.axis_iter_mut(Axis(0)).zip(hidden) {
            row.assign(&h);
        }
        out
    }

    fn activate(&self, logit: f64) -> f64 {
        match self.config.output_range {
            OutputRange::Probability => sigmoid(logit),
            OutputRange::Unbounded => logit,
        }
    }

    /// Mean loss over the given rows; targets already in model space
    fn loss(&self, readout: &Readout, hidden: &Array2<f64>, targets: &[f64], idx: &[usize]) -> f64 {
        if idx.is_empty() {
            return 0.0;
        }
        let total: f64 = idx
            .iter()
            .map(|&i| {
                let row = hidden.row(i);
                let out = self.activate(readout.logit(row));
                let y = targets[i];
                match self.config.output_range {
                    OutputRange::Probability => {
                        let p = out.clamp(LOSS_EPS, 1.0 - LOSS_EPS);
                        -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
                    }
                    OutputRange::Unbounded => (out - y).powi(2),
                }
            })
            .sum();
        total / idx.len() as f64
    }

    fn train_epoch(
        &self,
        readout: &mut Readout,
        hidden: &Array2<f64>,
        targets: &[f64],
        order: &[usize],
    ) {
        let batch_size = self.config.batch_size.max(1);
        for batch in order.chunks(batch_size) {
            let mut grad_w = Array1::<f64>::zeros(self.config.hidden_units);
            let mut grad_b = 0.0;
            for &i in batch {
                let row = hidden.row(i);
                let z = readout.logit(row);
                // BCE through a sigmoid and half-MSE on a linear output share this form
                let delta = self.activate(z) - targets[i];
                grad_w.scaled_add(delta, &row);
                grad_b += delta;
            }
            let n = batch.len() as f64;
            grad_w /= n;
            readout.adam_step(&grad_w, grad_b / n, self.config.learning_rate);
        }
    }
}

impl SequenceModel for RecurrentSequenceModel {
    fn train(&mut self, windows: &WindowBatch, targets: &[f64]) -> PipelineResult<TrainingReport> {
        self.check_batch(windows)?;
        if targets.len() != windows.len() {
            return Err(PipelineError::invalid_shape(
                format!("{} targets", windows.len()),
                format!("{} targets", targets.len()),
            ));
        }
        if targets.iter().any(|t| !t.is_finite()) {
            return Err(PipelineError::invalid_input("targets contain non-finite values"));
        }
        if self.config.epochs == 0 {
            return Err(PipelineError::InvalidParameter {
                name: "epochs",
                reason: "must be > 0".to_string(),
            });
        }

        let n = windows.len();
        let n_val = if n >= 5 {
            ((n as f64) * self.config.validation_fraction).floor() as usize
        } else {
            0
        };
        let n_train = n - n_val;

        let scaler = match self.config.output_range {
            OutputRange::Unbounded => Some(TargetScaler::fit(&targets[..n_train])),
            OutputRange::Probability => None,
        };
        let model_targets: Vec<f64> = match &scaler {
            Some(s) => targets.iter().map(|t| s.scale(*t)).collect(),
            None => targets.to_vec(),
        };

        info!(
            "Training {} on {} windows ({} held out)",
            self.name, n_train, n_val
        );
        let hidden = self.encode(windows);

        let mut order: Vec<usize> = (0..n_train).collect();
        let val_idx: Vec<usize> = (n_train..n).collect();
        let mut rng = StdRng::seed_from_u64(self.config.seed.wrapping_add(1));

        let mut readout = Readout::new(self.config.hidden_units);
        let mut best = readout.clone();
        let mut best_loss = f64::INFINITY;
        let mut best_epoch = 0;
        let mut epochs_run = 0;
        let mut stale = 0;

        for epoch in 1..=self.config.epochs {
            order.shuffle(&mut rng);
            self.train_epoch(&mut readout, &hidden, &model_targets, &order);
            epochs_run = epoch;

            let train_loss = self.loss(&readout, &hidden, &model_targets, &order);
            let monitored = if val_idx.is_empty() {
                train_loss
            } else {
                self.loss(&readout, &hidden, &model_targets, &val_idx)
            };
            debug!(
                "{} epoch {}: train_loss={:.6} monitored={:.6}",
                self.name, epoch, train_loss, monitored
            );

            if monitored < best_loss {
                best_loss = monitored;
                best = readout.clone();
                best_epoch = epoch;
                stale = 0;
            } else {
                stale += 1;
                if stale >= self.config.patience {
                    debug!("{} early stop at epoch {}", self.name, epoch);
                    break;
                }
            }
        }

        let train_loss = self.loss(&best, &hidden, &model_targets, &order);
        let validation_loss =
            (!val_idx.is_empty()).then(|| self.loss(&best, &hidden, &model_targets, &val_idx));

        self.readout = Some(best);
        self.scaler = scaler;

        info!(
            "{} trained: best epoch {}/{}, train_loss={:.6}, val_loss={:?}",
            self.name, best_epoch, epochs_run, train_loss, validation_loss
        );

        Ok(TrainingReport {
            samples: n,
            epochs_run,
            best_epoch,
            train_loss,
            validation_loss,
        })
    }

    fn predict(&self, windows: &WindowBatch) -> PipelineResult<Vec<f64>> {
        let readout = self
            .readout
            .as_ref()
            .ok_or_else(|| PipelineError::unfitted(format!("{} has not been trained", self.name)))?;
        self.check_batch(windows)?;

        let hidden = self.encode(windows);
        Ok(hidden
            .rows()
            .into_iter()
            .map(|row| {
                let out = self.activate(readout.logit(row));
                match &self.scaler {
                    Some(s) => s.unscale(out),
                    None => out,
                }
            })
            .collect())
    }

    fn output_range(&self) -> OutputRange {
        self.config.output_range
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::timeframe::Regime;
    use ndarray::Array3;

    fn small_config(range: OutputRange, arch: ArchitectureHint) -> SequenceModelConfig {
        SequenceModelConfig {
            window_len: 6,
            n_features: 3,
            hidden_units: 12,
            layers: 1,
            epochs: 15,
            learning_rate: 0.05,
            batch_size: 8,
            validation_fraction: 0.2,
            patience: 5,
            output_range: range,
            architecture: arch,
            conv_filters: 4,
            conv_kernel: 2,
            seed: 42,
        }
    }

    /// Windows whose last close column encodes the label
    fn separable_batch(n: usize) -> (WindowBatch, Vec<f64>) {
        let mut data = Array3::zeros((n, 6, 3));
        let mut targets = Vec::with_capacity(n);
        for i in 0..n {
            let up = i % 2 == 0;
            for t in 0..6 {
                let v = if up { 0.1 + 0.15 * t as f64 } else { 0.9 - 0.15 * t as f64 };
                data[[i, t, 0]] = v;
                data[[i, t, 1]] = v;
                data[[i, t, 2]] = 0.5;
            }
            targets.push(if up { 1.0 } else { 0.0 });
        }
        (WindowBatch::new(data), targets)
    }

    #[test]
    fn test_predict_before_train_fails() {
        let model = RecurrentSequenceModel::new(small_config(
            OutputRange::Probability,
            ArchitectureHint::Recurrent,
        ));
        let (batch, _) = separable_batch(4);
        assert!(matches!(
            model.predict(&batch),
            Err(PipelineError::UnfittedModel { .. })
        ));
    }

    #[test]
    fn test_output_size_and_range() {
        for arch in [ArchitectureHint::Recurrent, ArchitectureHint::ConvRecurrent] {
            let mut model =
                RecurrentSequenceModel::new(small_config(OutputRange::Probability, arch));
            let (batch, targets) = separable_batch(40);
            let report = model.train(&batch, &targets).unwrap();
            assert_eq!(report.samples, 40);
            assert!(report.validation_loss.is_some());

            let preds = model.predict(&batch).unwrap();
            assert_eq!(preds.len(), 40);
            assert!(preds.iter().all(|p| (0.0..=1.0).contains(p)));
        }
    }

    #[test]
    fn test_learns_separable_direction() {
        let mut model = RecurrentSequenceModel::new(small_config(
            OutputRange::Probability,
            ArchitectureHint::Recurrent,
        ));
        let (batch, targets) = separable_batch(60);
        model.train(&batch, &targets).unwrap();
        let preds = model.predict(&batch).unwrap();
        let mean_up: f64 = preds.iter().step_by(2).sum::<f64>() / 30.0;
        let mean_down: f64 = preds.iter().skip(1).step_by(2).sum::<f64>() / 30.0;
        assert!(mean_up > mean_down, "up={} down={}", mean_up, mean_down);
    }

    #[test]
    fn test_unbounded_output_is_on_target_scale() {
        let mut model = RecurrentSequenceModel::new(small_config(
            OutputRange::Unbounded,
            ArchitectureHint::Recurrent,
        ));
        let (batch, labels) = separable_batch(30);
        let targets: Vec<f64> = labels.iter().map(|l| 1000.0 + 10.0 * l).collect();
        model.train(&batch, &targets).unwrap();
        let preds = model.predict(&batch).unwrap();
        assert!(preds.iter().all(|p| (950.0..1060.0).contains(p)), "{:?}", preds);
    }

    #[test]
    fn test_shape_errors() {
        let mut model = RecurrentSequenceModel::new(small_config(
            OutputRange::Probability,
            ArchitectureHint::Recurrent,
        ));
        let (batch, targets) = separable_batch(10);
        assert!(matches!(
            model.train(&batch, &targets[..9]),
            Err(PipelineError::InvalidShape { .. })
        ));

        let wrong = WindowBatch::new(Array3::zeros((3, 5, 3)));
        assert!(matches!(
            model.train(&wrong, &[0.0, 1.0, 0.0]),
            Err(PipelineError::InvalidShape { .. })
        ));

        let empty = WindowBatch::new(Array3::zeros((0, 6, 3)));
        assert!(matches!(
            model.train(&empty, &[]),
            Err(PipelineError::InvalidShape { .. })
        ));
    }

    #[test]
    fn test_same_seed_is_deterministic() {
        let (batch, targets) = separable_batch(20);
        let config = small_config(OutputRange::Probability, ArchitectureHint::ConvRecurrent);
        let mut a = RecurrentSequenceModel::new(config.clone());
        let mut b = RecurrentSequenceModel::new(config);
        a.train(&batch, &targets).unwrap();
        b.train(&batch, &targets).unwrap();
        assert_eq!(a.predict(&batch).unwrap(), b.predict(&batch).unwrap());
    }

    #[test]
    fn test_conv_front_end_predicts_unseen_windows() {
        let mut model = RecurrentSequenceModel::new(small_config(
            OutputRange::Unbounded,
            ArchitectureHint::ConvRecurrent,
        ));
        let (batch, labels) = separable_batch(24);
        let targets: Vec<f64> = labels.iter().map(|l| 1.1 + 0.01 * l).collect();
        model.train(&batch, &targets).unwrap();

        let latest = batch.latest().unwrap();
        let preds = model.predict(&latest).unwrap();
        assert_eq!(preds.len(), 1);
        assert!(preds[0].is_finite());
        assert!(model.name().starts_with("Conv4x2-GRU"));
    }

    #[test]
    fn test_zero_epochs_rejected() {
        let mut config = small_config(OutputRange::Probability, ArchitectureHint::Recurrent);
        config.epochs = 0;
        let mut model = RecurrentSequenceModel::new(config);
        let (batch, targets) = separable_batch(10);
        assert!(matches!(
            model.train(&batch, &targets),
            Err(PipelineError::InvalidParameter { name: "epochs", .. })
        ));
        assert!(!model.is_fitted());
    }

    #[test]
    fn test_config_from_profile() {
        let profile = RegimeProfile::for_regime(Regime::Medium);
        let config = SequenceModelConfig::from_profile(&profile, 7);
        assert_eq!(config.window_len, 20);
        assert_eq!(config.n_features, 6);
        assert_eq!(config.architecture, ArchitectureHint::ConvRecurrent);
        assert_eq!(config.seed, 7);
        let model = RecurrentSequenceModel::new(config);
        assert!(model.name().starts_with("Conv64x2"));
        assert!(!model.is_fitted());
    }
}
