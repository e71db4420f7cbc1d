//! The assessment input profile: merchant metrics per region plus the
//! vendor's assumed performance.
//!
//! RULE: every percentage is stored as a plain number in [0, 100].
//! Nothing in this module divides by 100; the funnel and chargeback
//! arithmetic do that once, at the point of use.

use crate::{
    config::{EngineConfig, RegionDefaults},
    types::{Percent, Region, Usd},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ── Sanitizing helpers ─────────────────────────────────────────────

/// NaN falls back to the field default; everything else is clamped to [0, 100].
pub fn clamp_percent(value: f64, default: Percent) -> Percent {
    if value.is_nan() {
        default
    } else {
        value.clamp(0.0, 100.0)
    }
}

/// Upper bound for any currency or count input. Three regions at the cap
/// still sum, scale and subtract without overflowing to infinity.
pub const MAX_CURRENCY: Usd = 1e15;

/// Non-finite values fall back to the field default; everything else is
/// clamped to [0, MAX_CURRENCY].
pub fn clamp_currency(value: f64, default: Usd) -> Usd {
    if value.is_finite() {
        value.clamp(0.0, MAX_CURRENCY)
    } else {
        default
    }
}

// ── Region input ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FraudCheckTiming {
    #[default]
    PreAuth,
    PostAuth,
}

impl FraudCheckTiming {
    /// Accepts the loose spellings people type into a chat
    /// ("pre-auth", "Pre Authorization", "before", "after", ...).
    pub fn parse_loose(value: &str) -> Option<Self> {
        let v: String = value
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphabetic())
            .collect();
        if v.starts_with("pre") || v.starts_with("before") {
            Some(Self::PreAuth)
        } else if v.starts_with("post") || v.starts_with("after") {
            Some(Self::PostAuth)
        } else {
            None
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::PreAuth => "pre-auth",
            Self::PostAuth => "post-auth",
        }
    }
}

/// Current-state metrics for one region.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegionInput {
    /// Gross value of all transaction attempts, not only successful ones.
    #[serde(rename = "annualGMVAttempts")]
    pub annual_gmv_attempts: Usd,
    /// Only used to derive average order value for the breakdown.
    #[serde(default)]
    pub gross_attempts_count: Option<f64>,
    pub gross_margin_percent: Percent,
    pub fraud_check_timing: FraudCheckTiming,
    pub pre_auth_fraud_approval_rate_percent: Percent,
    pub post_auth_fraud_approval_rate_percent: Percent,
    pub issuing_bank_decline_rate_percent: Percent,
    #[serde(rename = "threeDSChallengeRatePercent")]
    pub three_ds_challenge_rate_percent: Percent,
    #[serde(rename = "threeDSAbandonmentRatePercent")]
    pub three_ds_abandonment_rate_percent: Percent,
    pub manual_review_rate_percent: Percent,
    /// Non-card share of fraud-approved volume; never challenged by 3DS.
    #[serde(default)]
    pub alternative_payment_share_percent: Percent,
}

impl RegionInput {
    /// A region with no GMV yet, every rate taken from the region's defaults.
    pub fn from_defaults(defaults: &RegionDefaults) -> Self {
        Self {
            annual_gmv_attempts: 0.0,
            gross_attempts_count: None,
            gross_margin_percent: defaults.gross_margin_percent,
            fraud_check_timing: defaults.fraud_check_timing,
            pre_auth_fraud_approval_rate_percent: defaults.pre_auth_fraud_approval_rate_percent,
            post_auth_fraud_approval_rate_percent: defaults.post_auth_fraud_approval_rate_percent,
            issuing_bank_decline_rate_percent: defaults.issuing_bank_decline_rate_percent,
            three_ds_challenge_rate_percent: defaults.three_ds_challenge_rate_percent,
            three_ds_abandonment_rate_percent: defaults.three_ds_abandonment_rate_percent,
            manual_review_rate_percent: defaults.manual_review_rate_percent,
            alternative_payment_share_percent: defaults.alternative_payment_share_percent,
        }
    }

    /// A region takes part in the assessment only with positive, finite GMV.
    pub fn is_present(&self) -> bool {
        self.annual_gmv_attempts.is_finite() && self.annual_gmv_attempts > 0.0
    }

    /// The approval rate selected by `fraud_check_timing`.
    pub fn active_fraud_approval_rate_percent(&self) -> Percent {
        match self.fraud_check_timing {
            FraudCheckTiming::PreAuth => self.pre_auth_fraud_approval_rate_percent,
            FraudCheckTiming::PostAuth => self.post_auth_fraud_approval_rate_percent,
        }
    }

    pub fn average_order_value(&self) -> Option<Usd> {
        match self.gross_attempts_count {
            Some(count) if count > 0.0 && self.is_present() => {
                Some(self.annual_gmv_attempts / count)
            }
            _ => None,
        }
    }

    pub fn sanitized(&self, defaults: &RegionDefaults) -> Self {
        Self {
            annual_gmv_attempts: clamp_currency(self.annual_gmv_attempts, 0.0),
            gross_attempts_count: self
                .gross_attempts_count
                .filter(|c| c.is_finite())
                .map(|c| clamp_currency(c, 0.0)),
            gross_margin_percent: clamp_percent(self.gross_margin_percent, defaults.gross_margin_percent),
            fraud_check_timing: self.fraud_check_timing,
            pre_auth_fraud_approval_rate_percent: clamp_percent(
                self.pre_auth_fraud_approval_rate_percent,
                defaults.pre_auth_fraud_approval_rate_percent,
            ),
            post_auth_fraud_approval_rate_percent: clamp_percent(
                self.post_auth_fraud_approval_rate_percent,
                defaults.post_auth_fraud_approval_rate_percent,
            ),
            issuing_bank_decline_rate_percent: clamp_percent(
                self.issuing_bank_decline_rate_percent,
                defaults.issuing_bank_decline_rate_percent,
            ),
            three_ds_challenge_rate_percent: clamp_percent(
                self.three_ds_challenge_rate_percent,
                defaults.three_ds_challenge_rate_percent,
            ),
            three_ds_abandonment_rate_percent: clamp_percent(
                self.three_ds_abandonment_rate_percent,
                defaults.three_ds_abandonment_rate_percent,
            ),
            manual_review_rate_percent: clamp_percent(
                self.manual_review_rate_percent,
                defaults.manual_review_rate_percent,
            ),
            alternative_payment_share_percent: clamp_percent(
                self.alternative_payment_share_percent,
                defaults.alternative_payment_share_percent,
            ),
        }
    }
}

// ── Chargebacks ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChargebackInput {
    /// Fraud chargebacks as a percentage of attempted GMV.
    pub fraud_chargeback_rate_percent: Percent,
    #[serde(rename = "fraudChargebackAOV")]
    pub fraud_chargeback_aov: Usd,
    pub service_chargeback_rate_percent: Percent,
    #[serde(rename = "serviceChargebackAOV")]
    pub service_chargeback_aov: Usd,
}

impl Default for ChargebackInput {
    fn default() -> Self {
        Self {
            fraud_chargeback_rate_percent: 0.8,
            fraud_chargeback_aov: 158.0,
            service_chargeback_rate_percent: 0.0,
            service_chargeback_aov: 158.0,
        }
    }
}

impl ChargebackInput {
    pub fn sanitized(&self, defaults: &ChargebackInput) -> Self {
        Self {
            fraud_chargeback_rate_percent: clamp_percent(
                self.fraud_chargeback_rate_percent,
                defaults.fraud_chargeback_rate_percent,
            ),
            fraud_chargeback_aov: clamp_currency(self.fraud_chargeback_aov, defaults.fraud_chargeback_aov),
            service_chargeback_rate_percent: clamp_percent(
                self.service_chargeback_rate_percent,
                defaults.service_chargeback_rate_percent,
            ),
            service_chargeback_aov: clamp_currency(
                self.service_chargeback_aov,
                defaults.service_chargeback_aov,
            ),
        }
    }
}

// ── Vendor assumptions ─────────────────────────────────────────────

/// A vendor assumption that is either a relative reduction of the region's
/// current rate or the absolute future rate itself.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "mode", content = "percent", rename_all = "snake_case")]
pub enum RateAdjustment {
    Relative(Percent),
    Absolute(Percent),
}

impl RateAdjustment {
    pub fn from_parts(percent: Percent, is_absolute: bool) -> Self {
        if is_absolute {
            Self::Absolute(percent)
        } else {
            Self::Relative(percent)
        }
    }

    /// The future rate for a region whose current rate is `current`.
    pub fn resolve(&self, current: Percent) -> Percent {
        match *self {
            Self::Relative(reduction) => (current * (1.0 - reduction / 100.0)).max(0.0),
            Self::Absolute(target) => target,
        }
    }

    pub fn percent(&self) -> Percent {
        match *self {
            Self::Relative(p) | Self::Absolute(p) => p,
        }
    }

    pub fn is_absolute(&self) -> bool {
        matches!(self, Self::Absolute(_))
    }

    fn sanitized(&self, default: RateAdjustment) -> Self {
        Self::from_parts(clamp_percent(self.percent(), default.percent()), self.is_absolute())
    }
}

/// The vendor's promised post-adoption performance, shared by every region.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VendorKpis {
    /// Absolute target; replaces each region's current approval rate.
    pub fraud_approval_rate_percent: Percent,
    /// Relative reduction of each region's own bank decline rate.
    pub bank_decline_improvement_percent: Percent,
    pub chargeback_reduction_percent: Percent,
    #[serde(rename = "threeDSChallenge")]
    pub three_ds_challenge: RateAdjustment,
    #[serde(rename = "threeDSAbandonment")]
    pub three_ds_abandonment: RateAdjustment,
    pub manual_review: RateAdjustment,
    // Dispute context, explanatory breakdown only.
    pub dispute_rate_percent: Percent,
    pub fraud_dispute_win_rate_percent: Percent,
    pub service_dispute_rate_percent: Percent,
    pub service_dispute_win_rate_percent: Percent,
}

impl Default for VendorKpis {
    fn default() -> Self {
        Self {
            fraud_approval_rate_percent: 99.0,
            bank_decline_improvement_percent: 1.0,
            chargeback_reduction_percent: 70.0,
            three_ds_challenge: RateAdjustment::Relative(30.0),
            three_ds_abandonment: RateAdjustment::Relative(2.0),
            manual_review: RateAdjustment::Relative(50.0),
            dispute_rate_percent: 95.0,
            fraud_dispute_win_rate_percent: 25.2,
            service_dispute_rate_percent: 95.0,
            service_dispute_win_rate_percent: 45.0,
        }
    }
}

impl VendorKpis {
    pub fn sanitized(&self, defaults: &VendorKpis) -> Self {
        Self {
            fraud_approval_rate_percent: clamp_percent(
                self.fraud_approval_rate_percent,
                defaults.fraud_approval_rate_percent,
            ),
            bank_decline_improvement_percent: clamp_percent(
                self.bank_decline_improvement_percent,
                defaults.bank_decline_improvement_percent,
            ),
            chargeback_reduction_percent: clamp_percent(
                self.chargeback_reduction_percent,
                defaults.chargeback_reduction_percent,
            ),
            three_ds_challenge: self.three_ds_challenge.sanitized(defaults.three_ds_challenge),
            three_ds_abandonment: self.three_ds_abandonment.sanitized(defaults.three_ds_abandonment),
            manual_review: self.manual_review.sanitized(defaults.manual_review),
            dispute_rate_percent: clamp_percent(self.dispute_rate_percent, defaults.dispute_rate_percent),
            fraud_dispute_win_rate_percent: clamp_percent(
                self.fraud_dispute_win_rate_percent,
                defaults.fraud_dispute_win_rate_percent,
            ),
            service_dispute_rate_percent: clamp_percent(
                self.service_dispute_rate_percent,
                defaults.service_dispute_rate_percent,
            ),
            service_dispute_win_rate_percent: clamp_percent(
                self.service_dispute_win_rate_percent,
                defaults.service_dispute_win_rate_percent,
            ),
        }
    }
}

// ── Value drivers ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ValueDriver {
    GmvUplift,
    ChargebackSavings,
}

impl ValueDriver {
    pub const ALL: [ValueDriver; 2] = [ValueDriver::GmvUplift, ValueDriver::ChargebackSavings];

    pub fn label(&self) -> &'static str {
        match self {
            Self::GmvUplift => "GMV uplift",
            Self::ChargebackSavings => "Chargeback savings",
        }
    }

    /// Value category shown in the summary distribution.
    pub fn category(&self) -> &'static str {
        match self {
            Self::GmvUplift => "Business growth",
            Self::ChargebackSavings => "Risk avoidance",
        }
    }
}

/// Which drivers count toward the total. A disabled driver is still computed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DriverToggles {
    pub gmv_uplift: bool,
    pub chargeback_savings: bool,
}

impl Default for DriverToggles {
    fn default() -> Self {
        Self {
            gmv_uplift: true,
            chargeback_savings: true,
        }
    }
}

impl DriverToggles {
    pub fn is_enabled(&self, driver: ValueDriver) -> bool {
        match driver {
            ValueDriver::GmvUplift => self.gmv_uplift,
            ValueDriver::ChargebackSavings => self.chargeback_savings,
        }
    }

    pub fn set(&mut self, driver: ValueDriver, enabled: bool) {
        match driver {
            ValueDriver::GmvUplift => self.gmv_uplift = enabled,
            ValueDriver::ChargebackSavings => self.chargeback_savings = enabled,
        }
    }
}

// ── Profile ────────────────────────────────────────────────────────

/// Everything one assessment session knows about the prospect.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InputProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hq_location: Option<String>,
    #[serde(default)]
    pub regions: BTreeMap<Region, RegionInput>,
    pub chargeback_input: ChargebackInput,
    pub vendor_assumptions: VendorKpis,
    #[serde(default)]
    pub driver_toggles: DriverToggles,
    pub margin_enabled: bool,
}

impl InputProfile {
    /// A fresh session: no regions, configured default assumptions.
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            customer_name: None,
            industry: None,
            hq_location: None,
            regions: BTreeMap::new(),
            chargeback_input: config.chargeback_defaults.clone(),
            vendor_assumptions: config.vendor_defaults.clone(),
            driver_toggles: DriverToggles::default(),
            margin_enabled: true,
        }
    }

    /// Returns the region's input, creating it from the region defaults
    /// the first time it is touched.
    pub fn region_mut(&mut self, region: Region, config: &EngineConfig) -> &mut RegionInput {
        self.regions
            .entry(region)
            .or_insert_with(|| RegionInput::from_defaults(&config.region_defaults(region)))
    }

    /// Regions with positive GMV, in region order.
    pub fn present_regions(&self) -> impl Iterator<Item = (Region, &RegionInput)> {
        self.regions
            .iter()
            .filter(|(_, input)| input.is_present())
            .map(|(&region, input)| (region, input))
    }

    pub fn has_region_data(&self) -> bool {
        self.present_regions().next().is_some()
    }

    /// Mean gross margin across present regions only; None without regions.
    pub fn average_margin_percent(&self) -> Option<Percent> {
        let margins: Vec<Percent> = self
            .present_regions()
            .map(|(_, input)| input.gross_margin_percent)
            .collect();
        if margins.is_empty() {
            None
        } else {
            Some(margins.iter().sum::<f64>() / margins.len() as f64)
        }
    }

    /// Copy with every numeric field clamped to its valid range.
    pub fn sanitized(&self, config: &EngineConfig) -> Self {
        Self {
            customer_name: self.customer_name.clone(),
            industry: self.industry.clone(),
            hq_location: self.hq_location.clone(),
            regions: self
                .regions
                .iter()
                .map(|(&region, input)| (region, input.sanitized(&config.region_defaults(region))))
                .collect(),
            chargeback_input: self.chargeback_input.sanitized(&config.chargeback_defaults),
            vendor_assumptions: self.vendor_assumptions.sanitized(&config.vendor_defaults),
            driver_toggles: self.driver_toggles,
            margin_enabled: self.margin_enabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_adjustment_reduces_current_rate() {
        let adj = RateAdjustment::Relative(30.0);
        assert!((adj.resolve(10.0) - 7.0).abs() < 1e-12);
        assert_eq!(adj.resolve(0.0), 0.0);
    }

    #[test]
    fn absolute_adjustment_ignores_current_rate() {
        let adj = RateAdjustment::Absolute(4.0);
        assert_eq!(adj.resolve(10.0), 4.0);
        assert_eq!(adj.resolve(0.0), 4.0);
        assert_eq!(adj.resolve(100.0), 4.0);
    }

    #[test]
    fn adjustment_serializes_as_tagged_mode() {
        let json = serde_json::to_value(RateAdjustment::Absolute(3.5)).unwrap();
        assert_eq!(json, serde_json::json!({ "mode": "absolute", "percent": 3.5 }));
    }

    #[test]
    fn loose_timing_spellings() {
        assert_eq!(FraudCheckTiming::parse_loose("Pre-Auth"), Some(FraudCheckTiming::PreAuth));
        assert_eq!(FraudCheckTiming::parse_loose("before authorization"), Some(FraudCheckTiming::PreAuth));
        assert_eq!(FraudCheckTiming::parse_loose("post auth"), Some(FraudCheckTiming::PostAuth));
        assert_eq!(FraudCheckTiming::parse_loose("after"), Some(FraudCheckTiming::PostAuth));
        assert_eq!(FraudCheckTiming::parse_loose("sometimes"), None);
    }

    #[test]
    fn nan_percent_falls_back_to_default() {
        assert_eq!(clamp_percent(f64::NAN, 5.0), 5.0);
        assert_eq!(clamp_percent(140.0, 5.0), 100.0);
        assert_eq!(clamp_percent(-3.0, 5.0), 0.0);
        assert_eq!(clamp_currency(-10.0, 0.0), 0.0);
        assert_eq!(clamp_currency(f64::INFINITY, 0.0), 0.0);
        assert_eq!(clamp_currency(1e308, 0.0), MAX_CURRENCY);
    }

    #[test]
    fn margin_average_uses_present_regions_only() {
        let config = EngineConfig::standard();
        let mut profile = InputProfile::new(&config);
        let amer = profile.region_mut(Region::Amer, &config);
        amer.annual_gmv_attempts = 10_000_000.0;
        amer.gross_margin_percent = 40.0;
        // EMEA exists but has no GMV; its margin must not be averaged in.
        profile.region_mut(Region::Emea, &config).gross_margin_percent = 80.0;

        assert_eq!(profile.average_margin_percent(), Some(40.0));
    }

    #[test]
    fn profile_round_trips_through_wire_names() {
        let config = EngineConfig::standard();
        let mut profile = InputProfile::new(&config);
        profile.region_mut(Region::Emea, &config).annual_gmv_attempts = 1_000.0;

        let json = serde_json::to_value(&profile).unwrap();
        assert!(json["regions"]["EMEA"]["annualGMVAttempts"].is_number());
        assert!(json["regions"]["EMEA"]["threeDSChallengeRatePercent"].is_number());
        assert!(json["chargebackInput"]["fraudChargebackAOV"].is_number());

        let back: InputProfile = serde_json::from_value(json).unwrap();
        assert_eq!(back, profile);
    }
}
