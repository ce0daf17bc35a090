// Signal generation domain
pub mod signal;
