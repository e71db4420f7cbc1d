use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;
use uplift_core::{
    config::{EngineConfig, FunnelConfig},
    engine::UpliftEngine,
    profile::{FraudCheckTiming, InputProfile, RateAdjustment, ValueDriver, MAX_CURRENCY},
    types::Region,
};

const CASES: usize = 500;

fn percentish(rng: &mut Pcg64Mcg) -> f64 {
    // Mostly valid, sometimes outside [0, 100].
    if rng.gen_bool(0.1) {
        rng.gen_range(-50.0..200.0)
    } else {
        rng.gen_range(0.0..=100.0)
    }
}

fn adjustment(rng: &mut Pcg64Mcg) -> RateAdjustment {
    RateAdjustment::from_parts(percentish(rng), rng.gen_bool(0.5))
}

fn random_profile(rng: &mut Pcg64Mcg, config: &EngineConfig) -> InputProfile {
    let mut profile = InputProfile::new(config);
    for region in Region::ALL {
        if rng.gen_bool(0.2) {
            continue;
        }
        let input = profile.region_mut(region, config);
        input.annual_gmv_attempts = if rng.gen_bool(0.1) { 0.0 } else { rng.gen_range(0.0..1e9) };
        input.gross_margin_percent = percentish(rng);
        input.fraud_check_timing = if rng.gen_bool(0.5) {
            FraudCheckTiming::PreAuth
        } else {
            FraudCheckTiming::PostAuth
        };
        input.pre_auth_fraud_approval_rate_percent = percentish(rng);
        input.post_auth_fraud_approval_rate_percent = percentish(rng);
        input.issuing_bank_decline_rate_percent = percentish(rng);
        input.three_ds_challenge_rate_percent = percentish(rng);
        input.three_ds_abandonment_rate_percent = percentish(rng);
        input.manual_review_rate_percent = percentish(rng);
        input.alternative_payment_share_percent = percentish(rng);
    }

    let vendor = &mut profile.vendor_assumptions;
    vendor.fraud_approval_rate_percent = percentish(rng);
    vendor.bank_decline_improvement_percent = percentish(rng);
    vendor.chargeback_reduction_percent = percentish(rng);
    vendor.three_ds_challenge = adjustment(rng);
    vendor.three_ds_abandonment = adjustment(rng);
    vendor.manual_review = adjustment(rng);
    profile.chargeback_input.fraud_chargeback_rate_percent = percentish(rng);
    profile.driver_toggles.gmv_uplift = rng.gen_bool(0.8);
    profile.driver_toggles.chargeback_savings = rng.gen_bool(0.8);
    profile.margin_enabled = rng.gen_bool(0.7);
    profile
}

fn check_invariants(engine: &UpliftEngine, seed: u64) {
    let mut rng = Pcg64Mcg::seed_from_u64(seed);
    let ceiling = engine.config().funnel.bank_approval_ceiling_percent;

    for case in 0..CASES {
        let profile = random_profile(&mut rng, engine.config());
        let assessment = engine.compute(&profile);

        for region in &assessment.regions {
            assert!(region.input.annual_gmv_attempts > 0.0, "case {case}: absent region computed");
            for funnel in [&region.current, &region.future] {
                let rate = funnel.complete_rate();
                assert!((0.0..=1.0).contains(&rate), "case {case}: complete rate {rate}");
                assert!(funnel.completed <= funnel.attempts, "case {case}");
                assert!(funnel.attempts >= funnel.fraud_approved, "case {case}");
                assert!(funnel.fraud_approved >= funnel.to_auth, "case {case}");
                assert!(funnel.to_auth >= funnel.bank_approved, "case {case}");
                assert!(funnel.bank_approved >= funnel.completed, "case {case}");
                assert!(funnel.completed >= 0.0, "case {case}");
            }
            assert!(
                region.future.rates.bank_approval_percent <= ceiling,
                "case {case}: future approval above ceiling"
            );
        }

        let aggregate = &assessment.aggregate;
        assert!(aggregate.total_value.is_finite(), "case {case}");
        assert!(aggregate.monthly_run_rate.is_finite(), "case {case}");
        let expected: f64 = ValueDriver::ALL.iter().map(|&d| aggregate.contribution(d)).sum();
        assert!((aggregate.total_value - expected).abs() <= 1e-6 * expected.abs().max(1.0), "case {case}");
        assert!(assessment.chargebacks.savings >= 0.0, "case {case}");
    }
}

#[test]
fn standard_funnel_invariants_hold() {
    check_invariants(&UpliftEngine::standard(), 42);
}

#[test]
fn legacy_funnel_invariants_hold() {
    let config = EngineConfig::standard().with_funnel(FunnelConfig::two_stage_legacy());
    check_invariants(&UpliftEngine::new(config), 7);
}

#[test]
fn rate_adjustment_resolution() {
    // Relative ⇒ current × (1 − x/100) floored at 0; absolute ⇒ x.
    let mut rng = Pcg64Mcg::seed_from_u64(99);
    for _ in 0..CASES {
        let current = rng.gen_range(0.0..=100.0);
        let x = rng.gen_range(0.0..=100.0);

        let relative = RateAdjustment::Relative(x).resolve(current);
        assert!((relative - current * (1.0 - x / 100.0)).abs() < 1e-9);
        assert!(relative >= 0.0);
        assert_eq!(RateAdjustment::Absolute(x).resolve(current), x);
    }
}

#[test]
fn compute_is_deterministic() {
    // Same profile in, same assessment out.
    let engine = UpliftEngine::standard();
    let mut rng = Pcg64Mcg::seed_from_u64(2024);
    for _ in 0..50 {
        let profile = random_profile(&mut rng, engine.config());
        assert_eq!(engine.compute(&profile), engine.compute(&profile));
    }
}

#[test]
fn huge_gmv_in_every_region_stays_finite() {
    let engine = UpliftEngine::standard();
    let config = engine.config().clone();
    let mut profile = InputProfile::new(&config);
    for region in Region::ALL {
        profile.region_mut(region, &config).annual_gmv_attempts = 1e308;
    }
    profile.chargeback_input.fraud_chargeback_rate_percent = 100.0;

    let assessment = engine.compute(&profile);

    // Each region is capped before summing, so the sum cannot overflow.
    let aggregate = &assessment.aggregate;
    assert_eq!(aggregate.attempted_gmv, MAX_CURRENCY * Region::ALL.len() as f64);
    assert!(assessment.chargebacks.savings.is_finite());
    assert!(aggregate.total_gmv_uplift.is_finite());
    assert!(aggregate.total_value.is_finite());
    assert!(aggregate.monthly_run_rate.is_finite());
    for region in &assessment.regions {
        assert_eq!(region.input.annual_gmv_attempts, MAX_CURRENCY);
    }
}
