// Market data domain
pub mod candle;
pub mod processed_table;
pub mod regime_profile;
pub mod timeframe;
