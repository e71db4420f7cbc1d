use uplift_core::{
    config::EngineConfig,
    engine::UpliftEngine,
    profile::{InputProfile, RateAdjustment},
    types::Region,
};

// Scenario C: 150M attempts, 0.8% fraud chargebacks at $158, 70% reduction.
fn scenario_c(config: &EngineConfig) -> InputProfile {
    let mut profile = InputProfile::new(config);
    profile.region_mut(Region::Amer, config).annual_gmv_attempts = 150_000_000.0;
    profile.chargeback_input.fraud_chargeback_rate_percent = 0.8;
    profile.chargeback_input.fraud_chargeback_aov = 158.0;
    profile.vendor_assumptions.chargeback_reduction_percent = 70.0;
    profile
}

#[test]
fn scenario_c_headline_savings() {
    let engine = UpliftEngine::standard();
    let cb = engine.compute(&scenario_c(engine.config())).chargebacks;

    assert!((cb.current_chargebacks - 1_200_000.0).abs() < 1e-6);
    assert!((cb.future_chargebacks - 360_000.0).abs() < 1e-6);
    assert!((cb.savings - 840_000.0).abs() < 1e-6);
    assert!((cb.future_fraud_chargeback_rate_percent - 0.24).abs() < 1e-12);
    assert!((cb.current_count().unwrap() - 7_594.94).abs() < 0.01);
    assert!((cb.future_count().unwrap() - 2_278.48).abs() < 0.01);
}

#[test]
fn chargebacks_ignore_three_ds_and_review() {
    // 3DS and manual review inputs never move the chargeback figures.
    let engine = UpliftEngine::standard();
    let config = engine.config();
    let base = engine.compute(&scenario_c(config)).chargebacks;

    let mut profile = scenario_c(config);
    let amer = profile.region_mut(Region::Amer, config);
    amer.three_ds_challenge_rate_percent = 60.0;
    amer.three_ds_abandonment_rate_percent = 30.0;
    amer.manual_review_rate_percent = 25.0;
    profile.vendor_assumptions.manual_review = RateAdjustment::Absolute(0.0);

    assert_eq!(engine.compute(&profile).chargebacks, base);
}

#[test]
fn base_is_attempted_not_completed_gmv() {
    // The base is attempted GMV, so a poor approval rate changes nothing.
    let engine = UpliftEngine::standard();
    let config = engine.config();
    let mut profile = scenario_c(config);
    profile
        .region_mut(Region::Amer, config)
        .pre_auth_fraud_approval_rate_percent = 50.0;

    let cb = engine.compute(&profile).chargebacks;
    assert_eq!(cb.attempted_gmv, 150_000_000.0);
    assert!((cb.savings - 840_000.0).abs() < 1e-6);
}

#[test]
fn dispute_rates_do_not_change_savings() {
    // Dispute and win rates shape the waterfall only, never the headline.
    let engine = UpliftEngine::standard();
    let config = engine.config();
    let base = engine.compute(&scenario_c(config));

    let mut profile = scenario_c(config);
    profile.vendor_assumptions.dispute_rate_percent = 10.0;
    profile.vendor_assumptions.fraud_dispute_win_rate_percent = 90.0;
    let changed = engine.compute(&profile);

    assert_eq!(changed.chargebacks.savings, base.chargebacks.savings);
    assert_eq!(changed.aggregate.total_value, base.aggregate.total_value);
    assert_ne!(changed.disputes.fraud.won, base.disputes.fraud.won);
}

#[test]
fn fraud_waterfall_starts_from_future_chargebacks() {
    // The fraud waterfall starts from the chargebacks left after the reduction.
    let engine = UpliftEngine::standard();
    let assessment = engine.compute(&scenario_c(engine.config()));
    let fraud = &assessment.disputes.fraud;

    assert_eq!(fraud.gross, assessment.chargebacks.future_chargebacks);
    // 360,000 × 95% disputed × 25.2% won
    assert!((fraud.disputed - 342_000.0).abs() < 1e-6);
    assert!((fraud.won - 86_184.0).abs() < 1e-6);
    assert!((fraud.net_loss - 273_816.0).abs() < 1e-6);
}

#[test]
fn service_waterfall_uses_service_rate() {
    let engine = UpliftEngine::standard();
    let mut profile = scenario_c(engine.config());
    profile.chargeback_input.service_chargeback_rate_percent = 0.2;

    let service = engine.compute(&profile).disputes.service;
    assert!((service.gross - 300_000.0).abs() < 1e-6);
    assert!((service.won - 300_000.0 * 0.95 * 0.45).abs() < 1e-6);
}
