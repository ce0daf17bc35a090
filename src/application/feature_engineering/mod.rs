pub mod indicators;
pub mod regime_features;
