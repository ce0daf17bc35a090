use super::gru::sigmoid;
use crate::domain::errors::{PipelineError, PipelineResult};
use crate::domain::ml::model_kind::RefinerMode;
use crate::domain::ml::window::RefinedFeatureVector;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::index;
use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::tree::decision_tree_regressor::{
    DecisionTreeRegressor, DecisionTreeRegressorParameters,
};
use tracing::{debug, info};

type Tree = DecisionTreeRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

const PROB_EPS: f64 = 1e-6;

/// Boosting hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinerParams {
    /// Number of boosting rounds (trees)
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: u16,
    /// Fraction of rows each tree is fitted on
    pub subsample: f64,
    /// Fraction of columns each tree may split on
    pub colsample: f64,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub seed: u64,
}

impl Default for RefinerParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 5,
            subsample: 0.8,
            colsample: 0.8,
            min_samples_split: 2,
            min_samples_leaf: 1,
            seed: 42,
        }
    }
}

struct BoostedTree {
    columns: Vec<usize>,
    tree: Tree,
}

/// Gradient-boosted ensemble of CART regression trees over refined feature
/// vectors. Log-loss boosting in `Classifier` mode, squared-error boosting in
/// `Regressor` mode.
pub struct BoostedRefiner {
    mode: RefinerMode,
    n_features: usize,
    params: RefinerParams,
    base_score: Option<f64>,
    trees: Vec<BoostedTree>,
}

impl BoostedRefiner {
    /// `n_features` is the raw feature width F; inputs are `1 + F` wide.
    pub fn new(mode: RefinerMode, n_features: usize, params: RefinerParams) -> Self {
        Self {
            mode,
            n_features,
            params,
            base_score: None,
            trees: Vec::new(),
        }
    }

    pub fn mode(&self) -> RefinerMode {
        self.mode
    }

    pub fn is_fitted(&self) -> bool {
        self.base_score.is_some()
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    fn check_widths(&self, vectors: &[RefinedFeatureVector]) -> PipelineResult<()> {
        let expected = 1 + self.n_features;
        match vectors.iter().find(|v| v.width() != expected) {
            Some(v) => Err(PipelineError::DimensionMismatch {
                expected,
                actual: v.width(),
            }),
            None => Ok(()),
        }
    }

    fn to_matrix(rows: Vec<Vec<f64>>) -> PipelineResult<DenseMatrix<f64>> {
        DenseMatrix::from_2d_vec(&rows)
            .map_err(|e| PipelineError::model(format!("Matrix creation failed: {}", e)))
    }

    fn project(vectors: &[&[f64]], columns: &[usize]) -> Vec<Vec<f64>> {
        vectors
            .iter()
            .map(|v| columns.iter().map(|&c| v[c]).collect())
            .collect()
    }

    fn link(&self, score: f64) -> f64 {
        match self.mode {
            RefinerMode::Classifier => sigmoid(score),
            RefinerMode::Regressor => score,
        }
    }

    fn loss(&self, scores: &[f64], targets: &[f64]) -> f64 {
        let n = scores.len().max(1) as f64;
        let total: f64 = scores
            .iter()
            .zip(targets)
            .map(|(&s, &y)| match self.mode {
                RefinerMode::Classifier => {
                    let p = sigmoid(s).clamp(PROB_EPS, 1.0 - PROB_EPS);
                    -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
                }
                RefinerMode::Regressor => (s - y).powi(2),
            })
            .sum();
        total / n
    }

    /// Fits the ensemble and returns the in-sample loss.
    pub fn train(
        &mut self,
        vectors: &[RefinedFeatureVector],
        targets: &[f64],
    ) -> PipelineResult<f64> {
        if vectors.is_empty() {
            return Err(PipelineError::invalid_shape(
                "at least one refined vector",
                "empty input",
            ));
        }
        if vectors.len() != targets.len() {
            return Err(PipelineError::invalid_shape(
                format!("{} targets", vectors.len()),
                format!("{} targets", targets.len()),
            ));
        }
        self.check_widths(vectors)?;
        if targets.iter().any(|t| !t.is_finite()) {
            return Err(PipelineError::invalid_input("targets contain non-finite values"));
        }

        let n = vectors.len();
        let width = 1 + self.n_features;
        let rows: Vec<&[f64]> = vectors.iter().map(RefinedFeatureVector::as_slice).collect();

        let mean = targets.iter().sum::<f64>() / n as f64;
        let base = match self.mode {
            RefinerMode::Classifier => {
                let p = mean.clamp(PROB_EPS, 1.0 - PROB_EPS);
                (p / (1.0 - p)).ln()
            }
            RefinerMode::Regressor => mean,
        };

        let n_rows = ((n as f64 * self.params.subsample).round() as usize).clamp(1, n);
        let n_cols = ((width as f64 * self.params.colsample).round() as usize).clamp(1, width);
        let tree_params = DecisionTreeRegressorParameters::default()
            .with_max_depth(self.params.max_depth)
            .with_min_samples_split(self.params.min_samples_split)
            .with_min_samples_leaf(self.params.min_samples_leaf);

        let mut rng = StdRng::seed_from_u64(self.params.seed);
        let mut scores = vec![base; n];
        let mut trees = Vec::with_capacity(self.params.n_estimators);

        for round in 0..self.params.n_estimators {
            let mut columns = index::sample(&mut rng, width, n_cols).into_vec();
            columns.sort_unstable();
            let sample_rows = index::sample(&mut rng, n, n_rows).into_vec();

            // Negative gradient of the loss w.r.t. the raw score
            let residuals: Vec<f64> = sample_rows
                .iter()
                .map(|&i| targets[i] - self.link(scores[i]))
                .collect();
            let sampled: Vec<&[f64]> = sample_rows.iter().map(|&i| rows[i]).collect();
            let x = Self::to_matrix(Self::project(&sampled, &columns))?;

            let tree = Tree::fit(&x, &residuals, tree_params.clone())
                .map_err(|e| PipelineError::model(format!("Tree {} failed to fit: {}", round, e)))?;

            let full = Self::to_matrix(Self::project(&rows, &columns))?;
            let step = tree
                .predict(&full)
                .map_err(|e| PipelineError::model(format!("Tree {} failed to predict: {}", round, e)))?;
            for (score, delta) in scores.iter_mut().zip(step) {
                *score += self.params.learning_rate * delta;
            }

            trees.push(BoostedTree { columns, tree });
            if round % 25 == 0 {
                debug!("Refiner round {}: loss={:.6}", round, self.loss(&scores, targets));
            }
        }

        let loss = self.loss(&scores, targets);
        info!(
            "Refiner ({:?}) fitted {} trees on {} vectors, loss={:.6}",
            self.mode,
            trees.len(),
            n,
            loss
        );

        self.base_score = Some(base);
        self.trees = trees;
        Ok(loss)
    }

    /// One refined estimate per vector; a probability in `Classifier` mode.
    pub fn predict(&self, vectors: &[RefinedFeatureVector]) -> PipelineResult<Vec<f64>> {
        let base = self
            .base_score
            .ok_or_else(|| PipelineError::unfitted("refiner has not been trained"))?;
        if vectors.is_empty() {
            return Err(PipelineError::invalid_shape(
                "at least one refined vector",
                "empty input",
            ));
        }
        self.check_widths(vectors)?;

        let rows: Vec<&[f64]> = vectors.iter().map(RefinedFeatureVector::as_slice).collect();
        let mut scores = vec![base; rows.len()];
        for (i, boosted) in self.trees.iter().enumerate() {
            let x = Self::to_matrix(Self::project(&rows, &boosted.columns))?;
            let step = boosted
                .tree
                .predict(&x)
                .map_err(|e| PipelineError::model(format!("Tree {} failed to predict: {}", i, e)))?;
            for (score, delta) in scores.iter_mut().zip(step) {
                *score += self.params.learning_rate * delta;
            }
        }

        Ok(scores.into_iter().map(|s| self.link(s)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vectors(rows: &[[f64; 3]]) -> Vec<RefinedFeatureVector> {
        rows.iter()
            .map(|r| RefinedFeatureVector::from_values(r.to_vec(), 2).unwrap())
            .collect()
    }

    fn quick_params() -> RefinerParams {
        RefinerParams {
            n_estimators: 30,
            ..RefinerParams::default()
        }
    }

    fn classification_data() -> (Vec<RefinedFeatureVector>, Vec<f64>) {
        let mut rows = Vec::new();
        let mut targets = Vec::new();
        for i in 0..40 {
            let x = i as f64 / 40.0;
            rows.push([x, 1.0 - x, 0.5]);
            targets.push(if x > 0.5 { 1.0 } else { 0.0 });
        }
        (vectors(&rows), targets)
    }

    #[test]
    fn test_predict_before_train_fails() {
        let refiner = BoostedRefiner::new(RefinerMode::Classifier, 2, quick_params());
        let (x, _) = classification_data();
        assert!(matches!(
            refiner.predict(&x),
            Err(PipelineError::UnfittedModel { .. })
        ));
    }

    #[test]
    fn test_classifier_output_is_probability() {
        let mut refiner = BoostedRefiner::new(RefinerMode::Classifier, 2, quick_params());
        let (x, y) = classification_data();
        let loss = refiner.train(&x, &y).unwrap();
        assert!(loss < (2.0f64).ln(), "loss {}", loss);
        assert_eq!(refiner.n_trees(), 30);

        let preds = refiner.predict(&x).unwrap();
        assert_eq!(preds.len(), x.len());
        assert!(preds.iter().all(|p| (0.0..=1.0).contains(p)));
        assert!(preds[39] > preds[0]);
    }

    #[test]
    fn test_regressor_tracks_targets() {
        let mut refiner = BoostedRefiner::new(RefinerMode::Regressor, 2, RefinerParams::default());
        let rows: Vec<[f64; 3]> = (0..50).map(|i| [i as f64, 0.0, 1.0]).collect();
        let y: Vec<f64> = (0..50).map(|i| 100.0 + i as f64).collect();
        let x = vectors(&rows);
        refiner.train(&x, &y).unwrap();
        let preds = refiner.predict(&x).unwrap();
        assert!(preds[49] > preds[0] + 20.0, "{:?}", preds);
        assert!((preds[25] - 125.0).abs() < 10.0);
    }

    #[test]
    fn test_single_class_targets_do_not_fail() {
        let mut refiner = BoostedRefiner::new(RefinerMode::Classifier, 2, quick_params());
        let (x, _) = classification_data();
        let y = vec![1.0; x.len()];
        refiner.train(&x, &y).unwrap();
        let preds = refiner.predict(&x).unwrap();
        assert!(preds.iter().all(|p| *p > 0.9));
    }

    #[test]
    fn test_width_and_count_errors() {
        let mut refiner = BoostedRefiner::new(RefinerMode::Classifier, 3, quick_params());
        let (x, y) = classification_data();
        assert!(matches!(
            refiner.train(&x, &y),
            Err(PipelineError::DimensionMismatch {
                expected: 4,
                actual: 3
            })
        ));

        let mut refiner = BoostedRefiner::new(RefinerMode::Classifier, 2, quick_params());
        assert!(matches!(
            refiner.train(&x, &y[..5]),
            Err(PipelineError::InvalidShape { .. })
        ));
        assert!(matches!(
            refiner.train(&[], &[]),
            Err(PipelineError::InvalidShape { .. })
        ));
    }

    #[test]
    fn test_seeded_training_is_reproducible() {
        let (x, y) = classification_data();
        let mut a = BoostedRefiner::new(RefinerMode::Classifier, 2, quick_params());
        let mut b = BoostedRefiner::new(RefinerMode::Classifier, 2, quick_params());
        a.train(&x, &y).unwrap();
        b.train(&x, &y).unwrap();
        assert_eq!(a.predict(&x).unwrap(), b.predict(&x).unwrap());
    }
}
