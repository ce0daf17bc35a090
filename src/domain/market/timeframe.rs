use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Forecast horizon regime. Decides window length, feature schema and
/// whether the pipeline predicts a direction probability or a price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Regime {
    Short,
    Medium,
    Long,
}

/// What the models are trained to approximate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetKind {
    /// 1.0 when the next close is above the current close, else 0.0
    Direction,
    /// The next close itself
    NextClose,
}

impl Regime {
    pub fn all() -> [Regime; 3] {
        [Regime::Short, Regime::Medium, Regime::Long]
    }

    pub fn target_kind(&self) -> TargetKind {
        match self {
            Regime::Short | Regime::Medium => TargetKind::Direction,
            Regime::Long => TargetKind::NextClose,
        }
    }

    /// Only the long regime consumes macro-economic series
    pub fn uses_macro_data(&self) -> bool {
        matches!(self, Regime::Long)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Regime::Short => "short",
            Regime::Medium => "medium",
            Regime::Long => "long",
        }
    }
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Regime {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "short" => Ok(Regime::Short),
            "medium" => Ok(Regime::Medium),
            "long" => Ok(Regime::Long),
            _ => Err(anyhow!(
                "Invalid regime: {}. Must be 'short', 'medium' or 'long'",
                s
            )),
        }
    }
}

/// Bar granularity of the source price data, using Dukascopy codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Granularity {
    M1,
    M5,
    M15,
    M30,
    H1,
    D1,
    W1,
}

impl Granularity {
    /// Returns the duration of one bar in minutes
    pub fn to_minutes(&self) -> usize {
        match self {
            Granularity::M1 => 1,
            Granularity::M5 => 5,
            Granularity::M15 => 15,
            Granularity::M30 => 30,
            Granularity::H1 => 60,
            Granularity::D1 => 1440,
            Granularity::W1 => 10080,
        }
    }

    /// Returns the duration in milliseconds
    pub fn to_millis(&self) -> i64 {
        (self.to_minutes() * 60_000) as i64
    }

    /// Default regime for this granularity
    pub fn regime(&self) -> Regime {
        match self {
            Granularity::M1 | Granularity::M5 | Granularity::M15 | Granularity::M30 => {
                Regime::Short
            }
            Granularity::H1 => Regime::Medium,
            Granularity::D1 | Granularity::W1 => Regime::Long,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Granularity::M1 => "M1",
            Granularity::M5 => "M5",
            Granularity::M15 => "M15",
            Granularity::M30 => "M30",
            Granularity::H1 => "H1",
            Granularity::D1 => "D1",
            Granularity::W1 => "W1",
        }
    }

    /// Returns all granularities in ascending order
    pub fn all() -> Vec<Granularity> {
        vec![
            Granularity::M1,
            Granularity::M5,
            Granularity::M15,
            Granularity::M30,
            Granularity::H1,
            Granularity::D1,
            Granularity::W1,
        ]
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for Granularity {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "M1" => Ok(Granularity::M1),
            "M5" => Ok(Granularity::M5),
            "M15" => Ok(Granularity::M15),
            "M30" => Ok(Granularity::M30),
            "H1" => Ok(Granularity::H1),
            "D1" => Ok(Granularity::D1),
            "W1" => Ok(Granularity::W1),
            _ => Err(anyhow!(
                "Invalid timeframe: {}. Use M1, M5, M15, M30, H1, D1, W1.",
                s
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_granularity_parsing_is_case_insensitive() {
        assert_eq!(Granularity::from_str("h1").unwrap(), Granularity::H1);
        assert_eq!(Granularity::from_str("M15").unwrap(), Granularity::M15);
        assert!(Granularity::from_str("H4").is_err());
    }

    #[test]
    fn test_granularity_regime_mapping() {
        assert_eq!(Granularity::M1.regime(), Regime::Short);
        assert_eq!(Granularity::M30.regime(), Regime::Short);
        assert_eq!(Granularity::H1.regime(), Regime::Medium);
        assert_eq!(Granularity::D1.regime(), Regime::Long);
        assert_eq!(Granularity::W1.regime(), Regime::Long);
    }

    #[test]
    fn test_target_kind_per_regime() {
        assert_eq!(Regime::Short.target_kind(), TargetKind::Direction);
        assert_eq!(Regime::Medium.target_kind(), TargetKind::Direction);
        assert_eq!(Regime::Long.target_kind(), TargetKind::NextClose);
    }

    #[test]
    fn test_to_millis() {
        assert_eq!(Granularity::H1.to_millis(), 3_600_000);
        assert_eq!(Granularity::M5.to_millis(), 300_000);
    }
}
