pub mod dataset;
pub mod feature_registry;
pub mod model_kind;
pub mod training;
pub mod window;
