pub mod feature_engineering;
pub mod feature_provider;
pub mod ml;
pub mod trend_predictor;
