use crate::domain::market::timeframe::Regime;

/// Ordered feature columns per regime.
/// The order is the input schema of the sequence model and the refiner;
/// any change here invalidates previously fitted models.
pub const SHORT_FEATURES: &[&str] = &["norm_open", "norm_high", "norm_low", "norm_close"];

pub const MEDIUM_FEATURES: &[&str] = &[
    "norm_open",
    "norm_high",
    "norm_low",
    "norm_close",
    "norm_volume",
    "norm_atr_14",
];

pub const LONG_FEATURES: &[&str] = &[
    "norm_open",
    "norm_high",
    "norm_low",
    "norm_close",
    "norm_volume",
    "norm_ma_50",
    "norm_ma_200",
    "norm_rsi_20",
];

/// Name of the leading column of a refined feature vector
pub const SEQUENCE_ESTIMATE: &str = "sequence_estimate";

pub fn feature_names(regime: Regime) -> &'static [&'static str] {
    match regime {
        Regime::Short => SHORT_FEATURES,
        Regime::Medium => MEDIUM_FEATURES,
        Regime::Long => LONG_FEATURES,
    }
}

pub fn feature_count(regime: Regime) -> usize {
    feature_names(regime).len()
}

/// Column names of the refiner input: the sequence estimate, then the
/// last raw feature vector of the window.
pub fn refined_feature_names(regime: Regime) -> Vec<String> {
    std::iter::once(SEQUENCE_ESTIMATE)
        .chain(feature_names(regime).iter().copied())
        .map(str::to_string)
        .collect()
}
