use fxtrend::config::AppConfig;
use fxtrend::domain::market::timeframe::Regime;
use fxtrend::domain::risk::monte_carlo::{DriftMode, RiskSimulator};
use fxtrend::domain::trading::signal::{SignalPolicy, SignalThresholds, TradeSignal};

#[test]
fn test_short_timeframe_scenario() {
    let policy = SignalPolicy::default();
    let price = 1.10500;
    assert_eq!(
        policy.decide(0.85, price, Regime::Short).unwrap(),
        TradeSignal::Buy { price }
    );
    assert_eq!(
        policy.decide(0.15, price, Regime::Short).unwrap(),
        TradeSignal::Sell { price }
    );
    assert_eq!(policy.decide(0.5, price, Regime::Short).unwrap(), TradeSignal::Hold);
    assert_eq!(
        policy.decide(0.85, price, Regime::Short).unwrap().to_string(),
        "BUY @ 1.10500"
    );
}

#[test]
fn test_long_timeframe_scenario() {
    let policy = SignalPolicy::default().with_thresholds(
        Regime::Long,
        SignalThresholds::PriceBand { band: 0.02 },
    );
    let price = 100.0;
    assert_eq!(
        policy.decide(103.0, price, Regime::Long).unwrap().to_string(),
        "BUY @ 100.00000"
    );
    assert_eq!(
        policy.decide(97.0, price, Regime::Long).unwrap(),
        TradeSignal::Sell { price }
    );
    assert_eq!(policy.decide(100.5, price, Regime::Long).unwrap(), TradeSignal::Hold);
}

#[test]
fn test_configured_policy_drives_decisions() {
    let mut config = AppConfig::default();
    config
        .apply_toml_str("[medium]\nbuy_above = 0.6\nsell_below = 0.4\n")
        .unwrap();
    let policy = config.signal_policy();
    assert_eq!(
        policy.decide(0.65, 1.2, Regime::Medium).unwrap(),
        TradeSignal::Buy { price: 1.2 }
    );
    assert_eq!(
        SignalPolicy::default().decide(0.65, 1.2, Regime::Medium).unwrap(),
        TradeSignal::Hold
    );
}

#[test]
fn test_risk_summary_properties_across_regimes() {
    let simulator = RiskSimulator::new(2_000).with_seed(17);
    for regime in Regime::all() {
        let mode = DriftMode::for_regime(regime);
        let estimate = match regime {
            Regime::Long => 1.25,
            _ => 0.7,
        };
        let summary = simulator.simulate(estimate, 0.8, mode).unwrap();
        assert_eq!(summary.samples, 2_000);
        assert!(summary.up_probability + summary.down_probability <= 1.0 + 1e-12);
        assert!(summary.risk_reward.is_finite());

        let flat = simulator.simulate(estimate, 0.0, mode).unwrap();
        assert_eq!(flat.up_probability, 0.0);
        assert_eq!(flat.down_probability, 0.0);
        assert_eq!(flat.expected_move, 0.0);
    }
}
