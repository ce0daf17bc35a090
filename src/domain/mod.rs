// Market data, regimes and processed tables
pub mod market;

// Feature windows, schemas and datasets
pub mod ml;

// Port interfaces
pub mod ports;

// Monte Carlo risk simulation
pub mod risk;

// Trade signal policy
pub mod trading;

// Domain-specific error types
pub mod errors;
