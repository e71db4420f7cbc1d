//! Per-region funnel simulation.
//!
//! STAGE ORDER (fixed, documented, never reordered):
//!   1. Fraud decisioning
//!   2. 3DS challenge and abandonment
//!   3. Issuing bank authorization
//!   4. Manual review abandonment
//!
//! Each stage operates on the previous stage's survivors, never on the
//! original attempted GMV.
//!
//! RULES:
//!   - Rates are resolved once, by `current_rates` / `future_rates`, into a
//!     `FunnelRates` record. `simulate` is the only place they are applied.
//!   - The breakdown reads `FunnelResult`; it never calls `simulate` itself.

use crate::{
    config::{BankUpliftModel, FunnelConfig},
    profile::{RegionInput, VendorKpis},
    types::{fraction, Percent, Usd},
};
use serde::{Deserialize, Serialize};

/// The resolved percentages one funnel run used.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FunnelRates {
    pub fraud_approval_percent: Percent,
    /// Share of card volume that sees 3DS at all.
    pub card_share_percent: Percent,
    pub three_ds_challenge_percent: Percent,
    pub three_ds_abandonment_percent: Percent,
    pub bank_decline_percent: Percent,
    /// After the ceiling; this, not the decline rate, drives the funnel.
    pub bank_approval_percent: Percent,
    pub manual_review_percent: Percent,
    pub review_abandonment_percent: Percent,
}

/// GMV alive after each funnel stage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FunnelResult {
    pub rates: FunnelRates,
    pub attempts: Usd,
    pub fraud_approved: Usd,
    pub three_ds_exempt: Usd,
    pub three_ds_challenged: Usd,
    pub three_ds_abandoned: Usd,
    pub to_auth: Usd,
    pub bank_approved: Usd,
    pub manually_reviewed: Usd,
    pub review_abandoned: Usd,
    pub completed: Usd,
}

impl FunnelResult {
    /// Completed / attempted, in [0, 1]. Zero attempts gives 0, never NaN.
    pub fn complete_rate(&self) -> f64 {
        if self.attempts > 0.0 {
            (self.completed / self.attempts).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// Challenged volume that finished the challenge.
    pub fn three_ds_survivors(&self) -> Usd {
        self.three_ds_challenged - self.three_ds_abandoned
    }

    pub fn bank_declined(&self) -> Usd {
        self.to_auth - self.bank_approved
    }
}

/// Rates describing today's process for one region.
pub fn current_rates(input: &RegionInput, config: &FunnelConfig) -> FunnelRates {
    let bank_decline_percent = input.issuing_bank_decline_rate_percent;
    FunnelRates {
        fraud_approval_percent: input.active_fraud_approval_rate_percent(),
        card_share_percent: 100.0 - input.alternative_payment_share_percent,
        three_ds_challenge_percent: stage_rate(config.three_ds_stage, input.three_ds_challenge_rate_percent),
        three_ds_abandonment_percent: stage_rate(config.three_ds_stage, input.three_ds_abandonment_rate_percent),
        bank_decline_percent,
        bank_approval_percent: 100.0 - bank_decline_percent,
        manual_review_percent: stage_rate(config.manual_review_stage, input.manual_review_rate_percent),
        review_abandonment_percent: stage_rate(
            config.manual_review_stage,
            config.current_review_abandonment_percent,
        ),
    }
}

/// Rates for the same region once the vendor runs fraud decisioning.
///
/// The dual-mode vendor fields resolve against this region's own current
/// rates. Every consumer of a future rate goes through this function.
pub fn future_rates(input: &RegionInput, vendor: &VendorKpis, config: &FunnelConfig) -> FunnelRates {
    let current = current_rates(input, config);
    let ceiling = config.bank_approval_ceiling_percent;

    let (bank_decline_percent, bank_approval_percent) = match config.bank_uplift_model {
        BankUpliftModel::RelativeDeclineReduction => {
            let decline =
                current.bank_decline_percent * (1.0 - fraction(vendor.bank_decline_improvement_percent));
            (decline, (100.0 - decline).min(ceiling))
        }
        BankUpliftModel::AdditiveApproval => {
            let approval = (current.bank_approval_percent + vendor.bank_decline_improvement_percent)
                .min(ceiling);
            (100.0 - approval, approval)
        }
    };

    FunnelRates {
        fraud_approval_percent: vendor.fraud_approval_rate_percent,
        card_share_percent: current.card_share_percent,
        three_ds_challenge_percent: stage_rate(
            config.three_ds_stage,
            vendor.three_ds_challenge.resolve(current.three_ds_challenge_percent),
        ),
        three_ds_abandonment_percent: stage_rate(
            config.three_ds_stage,
            vendor.three_ds_abandonment.resolve(current.three_ds_abandonment_percent),
        ),
        bank_decline_percent,
        bank_approval_percent,
        manual_review_percent: stage_rate(
            config.manual_review_stage,
            vendor.manual_review.resolve(current.manual_review_percent),
        ),
        review_abandonment_percent: stage_rate(
            config.manual_review_stage,
            config.vendor_review_abandonment_percent,
        ),
    }
}

/// Push `attempts` through the four stages.
pub fn simulate(attempts: Usd, rates: &FunnelRates) -> FunnelResult {
    // 1. Fraud decisioning
    let fraud_approved = attempts * fraction(rates.fraud_approval_percent);

    // 2. 3DS: only card volume can be challenged
    let three_ds_challenged = fraud_approved
        * fraction(rates.card_share_percent)
        * fraction(rates.three_ds_challenge_percent);
    let three_ds_exempt = fraud_approved - three_ds_challenged;
    let three_ds_abandoned = three_ds_challenged * fraction(rates.three_ds_abandonment_percent);
    // exempt + challenge survivors, written so it can never exceed fraud_approved
    let to_auth = fraud_approved - three_ds_abandoned;

    // 3. Issuing bank
    let bank_approved = to_auth * fraction(rates.bank_approval_percent);

    // 4. Manual review
    let manually_reviewed = bank_approved * fraction(rates.manual_review_percent);
    let review_abandoned = manually_reviewed * fraction(rates.review_abandonment_percent);
    let completed = bank_approved - review_abandoned;

    FunnelResult {
        rates: *rates,
        attempts,
        fraud_approved,
        three_ds_exempt,
        three_ds_challenged,
        three_ds_abandoned,
        to_auth,
        bank_approved,
        manually_reviewed,
        review_abandoned,
        completed,
    }
}

fn stage_rate(enabled: bool, rate: Percent) -> Percent {
    if enabled {
        rate
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegionDefaults;
    use crate::types::Region;

    fn region(decline: f64) -> RegionInput {
        let mut input = RegionInput::from_defaults(&RegionDefaults::standard(Region::Amer));
        input.annual_gmv_attempts = 1_000_000.0;
        input.issuing_bank_decline_rate_percent = decline;
        input
    }

    #[test]
    fn zero_decline_still_capped_at_ceiling() {
        let rates = future_rates(&region(0.0), &VendorKpis::default(), &FunnelConfig::standard());
        assert_eq!(rates.bank_approval_percent, 99.0);
    }

    #[test]
    fn post_auth_timing_selects_post_auth_rate() {
        let mut input = region(7.0);
        input.fraud_check_timing = crate::profile::FraudCheckTiming::PostAuth;
        input.pre_auth_fraud_approval_rate_percent = 90.0;
        input.post_auth_fraud_approval_rate_percent = 97.0;
        let rates = current_rates(&input, &FunnelConfig::standard());
        assert_eq!(rates.fraud_approval_percent, 97.0);
    }

    #[test]
    fn alternative_payments_bypass_challenge() {
        let mut input = region(7.0);
        input.three_ds_challenge_rate_percent = 20.0;
        input.alternative_payment_share_percent = 50.0;
        let result = simulate(1_000.0, &current_rates(&input, &FunnelConfig::standard()));
        // 95% approved = 950; card half = 475; 20% challenged = 95.
        assert!((result.three_ds_challenged - 95.0).abs() < 1e-9);
        assert!((result.three_ds_exempt - 855.0).abs() < 1e-9);
    }

    #[test]
    fn disabled_stages_pass_volume_through() {
        let mut input = region(7.0);
        input.three_ds_challenge_rate_percent = 50.0;
        input.manual_review_rate_percent = 50.0;
        let result = simulate(1_000.0, &current_rates(&input, &FunnelConfig::two_stage_legacy()));
        assert_eq!(result.to_auth, result.fraud_approved);
        assert_eq!(result.completed, result.bank_approved);
    }
}
