// Risk simulation domain
pub mod monte_carlo;
