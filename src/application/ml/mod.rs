pub mod gru;
pub mod refiner;
pub mod sequence_model;
