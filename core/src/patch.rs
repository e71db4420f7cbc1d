//! Partial profile updates from untrusted producers (the form, the chat
//! assistant, the runner's IPC loop).
//!
//! RULES:
//!   - `apply` never mutates its input; it returns a new profile.
//!   - Every numeric value is clamped on the way in. Each value that had to
//!     change is reported as a `FieldAdjustment` and logged.
//!   - The `is_absolute` flag pairs exist only here; they become
//!     `RateAdjustment`s at merge time.
//!   - The assistant's flat key form (`amerAnnualGMV`, `forterKPIs.*`) is
//!     converted to the nested form by `from_assistant_json`.

use crate::{
    config::EngineConfig,
    error::{UpliftError, UpliftResult},
    profile::{
        clamp_currency, clamp_percent, FraudCheckTiming, InputProfile, RateAdjustment,
    },
    types::{Percent, Region, Usd},
};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

// ── Lenient numbers ────────────────────────────────────────────────

/// A number that may arrive as a JSON number or as text such as `"95%"`,
/// `"$75,000,000"` or `"1,200"`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Lenient(pub f64);

impl<'de> Deserialize<'de> for Lenient {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(Lenient(n)),
            Raw::Text(text) => parse_lenient_number(&text)
                .map(Lenient)
                .ok_or_else(|| serde::de::Error::custom(format!("not a number: {text:?}"))),
        }
    }
}

/// Parse a human-typed number, ignoring currency symbols, percent signs,
/// thousands separators and surrounding whitespace.
pub fn parse_lenient_number(text: &str) -> Option<f64> {
    let cleaned: String = text
        .trim()
        .trim_start_matches("USD")
        .trim_end_matches("USD")
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | '%' | '_') && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse().ok()
}

// ── Patch shapes ───────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RegionPatch {
    #[serde(rename = "annualGMVAttempts")]
    pub annual_gmv_attempts: Option<Lenient>,
    pub gross_attempts_count: Option<Lenient>,
    pub gross_margin_percent: Option<Lenient>,
    /// Free text; "pre-auth", "before", "post authorization", ...
    pub fraud_check_timing: Option<String>,
    pub pre_auth_fraud_approval_rate_percent: Option<Lenient>,
    pub post_auth_fraud_approval_rate_percent: Option<Lenient>,
    pub issuing_bank_decline_rate_percent: Option<Lenient>,
    #[serde(rename = "threeDSChallengeRatePercent")]
    pub three_ds_challenge_rate_percent: Option<Lenient>,
    #[serde(rename = "threeDSAbandonmentRatePercent")]
    pub three_ds_abandonment_rate_percent: Option<Lenient>,
    pub manual_review_rate_percent: Option<Lenient>,
    pub alternative_payment_share_percent: Option<Lenient>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ChargebackPatch {
    pub fraud_chargeback_rate_percent: Option<Lenient>,
    #[serde(rename = "fraudChargebackAOV")]
    pub fraud_chargeback_aov: Option<Lenient>,
    pub service_chargeback_rate_percent: Option<Lenient>,
    #[serde(rename = "serviceChargebackAOV")]
    pub service_chargeback_aov: Option<Lenient>,
}

/// Vendor assumptions as the form and the assistant send them: a value plus
/// an `isAbsolute` flag for each dual-mode field.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct VendorPatch {
    pub fraud_approval_rate_percent: Option<Lenient>,
    pub bank_decline_improvement_percent: Option<Lenient>,
    pub chargeback_reduction_percent: Option<Lenient>,
    #[serde(rename = "threeDSChallengePercent")]
    pub three_ds_challenge_percent: Option<Lenient>,
    #[serde(rename = "threeDSChallengeIsAbsolute")]
    pub three_ds_challenge_is_absolute: Option<bool>,
    #[serde(rename = "threeDSAbandonmentPercent")]
    pub three_ds_abandonment_percent: Option<Lenient>,
    #[serde(rename = "threeDSAbandonmentIsAbsolute")]
    pub three_ds_abandonment_is_absolute: Option<bool>,
    pub manual_review_percent: Option<Lenient>,
    pub manual_review_is_absolute: Option<bool>,
    pub dispute_rate_percent: Option<Lenient>,
    pub fraud_dispute_win_rate_percent: Option<Lenient>,
    pub service_dispute_rate_percent: Option<Lenient>,
    pub service_dispute_win_rate_percent: Option<Lenient>,
    // The saved profile form of the dual-mode fields. The value and flag
    // fields above take precedence when both are present.
    #[serde(rename = "threeDSChallenge")]
    pub three_ds_challenge: Option<RateAdjustment>,
    #[serde(rename = "threeDSAbandonment")]
    pub three_ds_abandonment: Option<RateAdjustment>,
    pub manual_review: Option<RateAdjustment>,
}

/// Value and mode flag for one dual-mode field, falling back to the saved form.
fn adjustment_parts(
    value: Option<Lenient>,
    is_absolute: Option<bool>,
    saved: Option<RateAdjustment>,
) -> (Option<Lenient>, Option<bool>) {
    (
        value.or(saved.map(|a| Lenient(a.percent()))),
        is_absolute.or(saved.map(|a| a.is_absolute())),
    )
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct DriverTogglesPatch {
    pub gmv_uplift: Option<bool>,
    pub chargeback_savings: Option<bool>,
}

/// A partial `InputProfile`. Absent fields leave the profile unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfilePatch {
    pub customer_name: Option<String>,
    pub industry: Option<String>,
    pub hq_location: Option<String>,
    pub regions: BTreeMap<Region, RegionPatch>,
    pub chargeback_input: Option<ChargebackPatch>,
    pub vendor_assumptions: Option<VendorPatch>,
    pub driver_toggles: Option<DriverTogglesPatch>,
    pub margin_enabled: Option<bool>,
}

/// One value that was clamped or replaced on the way in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FieldAdjustment {
    pub field: String,
    pub supplied: f64,
    pub applied: f64,
}

#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub profile: InputProfile,
    /// Wire names of every field the patch touched.
    pub updated_fields: Vec<String>,
    pub adjustments: Vec<FieldAdjustment>,
}

impl ProfilePatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Returns a new profile with this patch applied on top of `base`.
    ///
    /// Fails only on values that cannot be interpreted at all (an unknown
    /// fraud check timing); `base` is untouched either way.
    pub fn apply(&self, base: &InputProfile, config: &EngineConfig) -> UpliftResult<MergeOutcome> {
        let mut profile = base.clone();
        let mut merge = Merger::default();

        merge.text("customerName", &self.customer_name, &mut profile.customer_name);
        merge.text("industry", &self.industry, &mut profile.industry);
        merge.text("hqLocation", &self.hq_location, &mut profile.hq_location);

        for (&region, patch) in &self.regions {
            let defaults = config.region_defaults(region);
            let input = profile.region_mut(region, config);
            let r = region.code();

            merge.currency(&format!("{r}.annualGMVAttempts"), patch.annual_gmv_attempts, 0.0, &mut input.annual_gmv_attempts);
            if let Some(Lenient(count)) = patch.gross_attempts_count {
                let field = format!("{r}.grossAttemptsCount");
                let mut applied = input.gross_attempts_count.unwrap_or(0.0);
                merge.currency(&field, Some(Lenient(count)), 0.0, &mut applied);
                input.gross_attempts_count = Some(applied);
            }
            merge.percent(&format!("{r}.grossMarginPercent"), patch.gross_margin_percent, defaults.gross_margin_percent, &mut input.gross_margin_percent);
            if let Some(text) = &patch.fraud_check_timing {
                input.fraud_check_timing = FraudCheckTiming::parse_loose(text).ok_or_else(|| {
                    UpliftError::InvalidPatch {
                        reason: format!("{r}.fraudCheckTiming: unrecognized value {text:?}"),
                    }
                })?;
                merge.updated.push(format!("{r}.fraudCheckTiming"));
            }
            merge.percent(&format!("{r}.preAuthFraudApprovalRatePercent"), patch.pre_auth_fraud_approval_rate_percent, defaults.pre_auth_fraud_approval_rate_percent, &mut input.pre_auth_fraud_approval_rate_percent);
            merge.percent(&format!("{r}.postAuthFraudApprovalRatePercent"), patch.post_auth_fraud_approval_rate_percent, defaults.post_auth_fraud_approval_rate_percent, &mut input.post_auth_fraud_approval_rate_percent);
            merge.percent(&format!("{r}.issuingBankDeclineRatePercent"), patch.issuing_bank_decline_rate_percent, defaults.issuing_bank_decline_rate_percent, &mut input.issuing_bank_decline_rate_percent);
            merge.percent(&format!("{r}.threeDSChallengeRatePercent"), patch.three_ds_challenge_rate_percent, defaults.three_ds_challenge_rate_percent, &mut input.three_ds_challenge_rate_percent);
            merge.percent(&format!("{r}.threeDSAbandonmentRatePercent"), patch.three_ds_abandonment_rate_percent, defaults.three_ds_abandonment_rate_percent, &mut input.three_ds_abandonment_rate_percent);
            merge.percent(&format!("{r}.manualReviewRatePercent"), patch.manual_review_rate_percent, defaults.manual_review_rate_percent, &mut input.manual_review_rate_percent);
            merge.percent(&format!("{r}.alternativePaymentSharePercent"), patch.alternative_payment_share_percent, defaults.alternative_payment_share_percent, &mut input.alternative_payment_share_percent);
        }

        if let Some(patch) = &self.chargeback_input {
            let defaults = &config.chargeback_defaults;
            let cb = &mut profile.chargeback_input;
            merge.percent("chargebackInput.fraudChargebackRatePercent", patch.fraud_chargeback_rate_percent, defaults.fraud_chargeback_rate_percent, &mut cb.fraud_chargeback_rate_percent);
            merge.currency("chargebackInput.fraudChargebackAOV", patch.fraud_chargeback_aov, defaults.fraud_chargeback_aov, &mut cb.fraud_chargeback_aov);
            merge.percent("chargebackInput.serviceChargebackRatePercent", patch.service_chargeback_rate_percent, defaults.service_chargeback_rate_percent, &mut cb.service_chargeback_rate_percent);
            merge.currency("chargebackInput.serviceChargebackAOV", patch.service_chargeback_aov, defaults.service_chargeback_aov, &mut cb.service_chargeback_aov);
        }

        if let Some(patch) = &self.vendor_assumptions {
            let defaults = &config.vendor_defaults;
            let v = &mut profile.vendor_assumptions;
            merge.percent("vendorAssumptions.fraudApprovalRatePercent", patch.fraud_approval_rate_percent, defaults.fraud_approval_rate_percent, &mut v.fraud_approval_rate_percent);
            merge.percent("vendorAssumptions.bankDeclineImprovementPercent", patch.bank_decline_improvement_percent, defaults.bank_decline_improvement_percent, &mut v.bank_decline_improvement_percent);
            merge.percent("vendorAssumptions.chargebackReductionPercent", patch.chargeback_reduction_percent, defaults.chargeback_reduction_percent, &mut v.chargeback_reduction_percent);
            let (value, flag) = adjustment_parts(patch.three_ds_challenge_percent, patch.three_ds_challenge_is_absolute, patch.three_ds_challenge);
            merge.adjustment("vendorAssumptions.threeDSChallenge", value, flag, defaults.three_ds_challenge, &mut v.three_ds_challenge);
            let (value, flag) = adjustment_parts(patch.three_ds_abandonment_percent, patch.three_ds_abandonment_is_absolute, patch.three_ds_abandonment);
            merge.adjustment("vendorAssumptions.threeDSAbandonment", value, flag, defaults.three_ds_abandonment, &mut v.three_ds_abandonment);
            let (value, flag) = adjustment_parts(patch.manual_review_percent, patch.manual_review_is_absolute, patch.manual_review);
            merge.adjustment("vendorAssumptions.manualReview", value, flag, defaults.manual_review, &mut v.manual_review);
            merge.percent("vendorAssumptions.disputeRatePercent", patch.dispute_rate_percent, defaults.dispute_rate_percent, &mut v.dispute_rate_percent);
            merge.percent("vendorAssumptions.fraudDisputeWinRatePercent", patch.fraud_dispute_win_rate_percent, defaults.fraud_dispute_win_rate_percent, &mut v.fraud_dispute_win_rate_percent);
            merge.percent("vendorAssumptions.serviceDisputeRatePercent", patch.service_dispute_rate_percent, defaults.service_dispute_rate_percent, &mut v.service_dispute_rate_percent);
            merge.percent("vendorAssumptions.serviceDisputeWinRatePercent", patch.service_dispute_win_rate_percent, defaults.service_dispute_win_rate_percent, &mut v.service_dispute_win_rate_percent);
        }

        if let Some(patch) = &self.driver_toggles {
            if let Some(enabled) = patch.gmv_uplift {
                profile.driver_toggles.gmv_uplift = enabled;
                merge.updated.push("driverToggles.gmvUplift".into());
            }
            if let Some(enabled) = patch.chargeback_savings {
                profile.driver_toggles.chargeback_savings = enabled;
                merge.updated.push("driverToggles.chargebackSavings".into());
            }
        }

        if let Some(enabled) = self.margin_enabled {
            profile.margin_enabled = enabled;
            merge.updated.push("marginEnabled".into());
        }

        log::debug!(
            "Applied profile patch: {} fields, {} adjusted",
            merge.updated.len(),
            merge.adjustments.len()
        );
        Ok(MergeOutcome {
            profile,
            updated_fields: merge.updated,
            adjustments: merge.adjustments,
        })
    }
}

#[derive(Default)]
struct Merger {
    updated: Vec<String>,
    adjustments: Vec<FieldAdjustment>,
}

impl Merger {
    fn record(&mut self, field: &str, supplied: f64, applied: f64) {
        self.updated.push(field.to_string());
        // NaN != NaN, so a NaN input is always reported.
        if supplied != applied {
            log::warn!("{field}: supplied {supplied} outside valid range, using {applied}");
            self.adjustments.push(FieldAdjustment {
                field: field.to_string(),
                supplied,
                applied,
            });
        }
    }

    fn percent(&mut self, field: &str, value: Option<Lenient>, default: Percent, target: &mut Percent) {
        if let Some(Lenient(supplied)) = value {
            let applied = clamp_percent(supplied, default);
            self.record(field, supplied, applied);
            *target = applied;
        }
    }

    fn currency(&mut self, field: &str, value: Option<Lenient>, default: Usd, target: &mut Usd) {
        if let Some(Lenient(supplied)) = value {
            let applied = clamp_currency(supplied, default);
            self.record(field, supplied, applied);
            *target = applied;
        }
    }

    /// A flag without a value switches mode and keeps the percentage;
    /// a value without a flag keeps the current mode.
    fn adjustment(
        &mut self,
        field: &str,
        value: Option<Lenient>,
        is_absolute: Option<bool>,
        default: RateAdjustment,
        target: &mut RateAdjustment,
    ) {
        if value.is_none() && is_absolute.is_none() {
            return;
        }
        let mut percent = target.percent();
        match value {
            Some(Lenient(supplied)) => {
                percent = clamp_percent(supplied, default.percent());
                self.record(field, supplied, percent);
            }
            None => self.updated.push(field.to_string()),
        }
        *target = RateAdjustment::from_parts(percent, is_absolute.unwrap_or(target.is_absolute()));
    }

    fn text(&mut self, field: &str, value: &Option<String>, target: &mut Option<String>) {
        if let Some(text) = value {
            let text = text.trim();
            *target = if text.is_empty() { None } else { Some(text.to_string()) };
            self.updated.push(field.to_string());
        }
    }
}

/// Read a saved profile file onto a fresh session. Fields the file leaves
/// out take the configured defaults, and every value is clamped as in any
/// other patch.
pub fn load_profile(path: &str, config: &EngineConfig) -> anyhow::Result<MergeOutcome> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Cannot read profile {path}: {e}"))?;
    let value: Value = serde_json::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Cannot parse profile {path}: {e}"))?;
    let patch = ProfilePatch::from_assistant_json(&value)?;
    Ok(patch.apply(&InputProfile::new(config), config)?)
}

// ── Assistant wire format ──────────────────────────────────────────

impl ProfilePatch {
    /// Build a patch from the assistant's `updatedData`.
    ///
    /// Accepts the nested patch form, the flat key form, or a mix of both;
    /// flat keys win when both name the same field. `null` is an empty patch.
    pub fn from_assistant_json(value: &Value) -> UpliftResult<Self> {
        let object = match value {
            Value::Null => return Ok(Self::default()),
            Value::Object(object) => object,
            other => {
                return Err(UpliftError::InvalidPatch {
                    reason: format!("updatedData must be an object, got {}", json_kind(other)),
                })
            }
        };

        let mut patch: ProfilePatch = serde_json::from_value(value.clone())
            .map_err(|e| UpliftError::InvalidPatch { reason: e.to_string() })?;
        let flat = FlatKeys::new(object);

        for region in Region::ALL {
            let p = region.key_prefix();
            let mut rp = patch.regions.remove(&region).unwrap_or_default();

            // GrossRevenue was the name before the GMV terminology change.
            overlay(&mut rp.annual_gmv_attempts, flat.number(&format!("{p}GrossRevenue"))?);
            overlay(&mut rp.annual_gmv_attempts, flat.number(&format!("{p}AnnualGMV"))?);
            overlay(&mut rp.gross_attempts_count, flat.number(&format!("{p}GrossAttempts"))?);
            overlay(&mut rp.gross_margin_percent, flat.number(&format!("{p}GrossMarginPercent"))?);
            overlay(&mut rp.fraud_check_timing, flat.text(&format!("{p}FraudCheckTiming")));
            overlay(&mut rp.pre_auth_fraud_approval_rate_percent, flat.number(&format!("{p}PreAuthApprovalRate"))?);
            overlay(&mut rp.post_auth_fraud_approval_rate_percent, flat.number(&format!("{p}PostAuthApprovalRate"))?);
            overlay(&mut rp.issuing_bank_decline_rate_percent, flat.number(&format!("{p}IssuingBankDeclineRate"))?);
            overlay(&mut rp.three_ds_challenge_rate_percent, flat.number(&format!("{p}3DSChallengeRate"))?);
            overlay(&mut rp.three_ds_abandonment_rate_percent, flat.number(&format!("{p}3DSAbandonmentRate"))?);
            overlay(&mut rp.manual_review_rate_percent, flat.number(&format!("{p}ManualReviewRate"))?);

            if rp != RegionPatch::default() {
                patch.regions.insert(region, rp);
            }
        }

        let mut cb = patch.chargeback_input.take().unwrap_or_default();
        overlay(&mut cb.fraud_chargeback_rate_percent, flat.number("fraudChargebackRate")?);
        overlay(&mut cb.fraud_chargeback_aov, flat.number("fraudCBAOV")?);
        overlay(&mut cb.fraud_chargeback_aov, flat.number("fraudChargebackAOV")?);
        overlay(&mut cb.service_chargeback_rate_percent, flat.number("serviceChargebackRate")?);
        overlay(&mut cb.service_chargeback_aov, flat.number("serviceCBAOV")?);
        overlay(&mut cb.service_chargeback_aov, flat.number("serviceChargebackAOV")?);
        if cb != ChargebackPatch::default() {
            patch.chargeback_input = Some(cb);
        }

        let mut vendor = patch.vendor_assumptions.take().unwrap_or_default();
        overlay_vendor_kpis(&flat, &mut vendor)?;
        if vendor != VendorPatch::default() {
            patch.vendor_assumptions = Some(vendor);
        }

        Ok(patch)
    }
}

/// Every `forterKPIs` key either producer sends. The chat assistant uses
/// the short names with `<name>UsePercentage` flags; the KPI form uses the
/// long names, where the dual-mode fields are always relative.
const KPI_KEYS: &[&str] = &[
    "fraudApproval",
    "fraudApprovalUsePercentage",
    "bankApproval",
    "bankApprovalUsePercentage",
    "fraudChargeback",
    "fraudChargebackUsePercentage",
    "threeDSChallenge",
    "threeDSChallengeUsePercentage",
    "threeDSAbandonment",
    "threeDSAbandonmentUsePercentage",
    "manualReview",
    "manualReviewUsePercentage",
    "fraudApprovalRate",
    "bankDeclineImprovement",
    "chargebackReduction",
    "threeDSChallengeReduction",
    "threeDSAbandonmentImprovement",
    "manualReviewReduction",
    "disputeRate",
    "fraudDisputeWinRate",
    "serviceDisputeRate",
    "serviceDisputeWinRate",
];

fn overlay_vendor_kpis(flat: &FlatKeys<'_>, vendor: &mut VendorPatch) -> UpliftResult<()> {
    for key in flat.kpi_keys() {
        if !KPI_KEYS.contains(&key) {
            log::warn!("forterKPIs.{key} is not a known KPI; ignored");
        }
    }

    // Form names first, so the chat names win when both are present.
    overlay(&mut vendor.fraud_approval_rate_percent, flat.kpi_number("fraudApprovalRate")?);
    overlay(&mut vendor.bank_decline_improvement_percent, flat.kpi_number("bankDeclineImprovement")?);
    overlay(&mut vendor.chargeback_reduction_percent, flat.kpi_number("chargebackReduction")?);
    overlay_relative(
        &mut vendor.three_ds_challenge_percent,
        &mut vendor.three_ds_challenge_is_absolute,
        flat.kpi_number("threeDSChallengeReduction")?,
    );
    overlay_relative(
        &mut vendor.three_ds_abandonment_percent,
        &mut vendor.three_ds_abandonment_is_absolute,
        flat.kpi_number("threeDSAbandonmentImprovement")?,
    );
    overlay_relative(
        &mut vendor.manual_review_percent,
        &mut vendor.manual_review_is_absolute,
        flat.kpi_number("manualReviewReduction")?,
    );
    overlay(&mut vendor.dispute_rate_percent, flat.kpi_number("disputeRate")?);
    overlay(&mut vendor.fraud_dispute_win_rate_percent, flat.kpi_number("fraudDisputeWinRate")?);
    overlay(&mut vendor.service_dispute_rate_percent, flat.kpi_number("serviceDisputeRate")?);
    overlay(&mut vendor.service_dispute_win_rate_percent, flat.kpi_number("serviceDisputeWinRate")?);

    // Chat names. `<name>UsePercentage: true` means a relative improvement;
    // false means an absolute target rate.
    if let Some(value) = flat.kpi_number("fraudApproval")? {
        if flat.kpi_flag("fraudApprovalUsePercentage") == Some(true) {
            log::warn!("forterKPIs.fraudApproval as a relative improvement is not supported; ignored");
        } else {
            vendor.fraud_approval_rate_percent = Some(value);
        }
    }
    if let Some(value) = flat.kpi_number("bankApproval")? {
        if flat.kpi_flag("bankApprovalUsePercentage") == Some(false) {
            log::warn!("forterKPIs.bankApproval as an absolute rate is not supported; ignored");
        } else {
            vendor.bank_decline_improvement_percent = Some(value);
        }
    }
    if let Some(value) = flat.kpi_number("fraudChargeback")? {
        if flat.kpi_flag("fraudChargebackUsePercentage") == Some(false) {
            log::warn!("forterKPIs.fraudChargeback as an absolute rate is not supported; ignored");
        } else {
            vendor.chargeback_reduction_percent = Some(value);
        }
    }

    overlay(&mut vendor.three_ds_challenge_percent, flat.kpi_number("threeDSChallenge")?);
    overlay(
        &mut vendor.three_ds_challenge_is_absolute,
        flat.kpi_flag("threeDSChallengeUsePercentage").map(|relative| !relative),
    );
    overlay(&mut vendor.three_ds_abandonment_percent, flat.kpi_number("threeDSAbandonment")?);
    overlay(
        &mut vendor.three_ds_abandonment_is_absolute,
        flat.kpi_flag("threeDSAbandonmentUsePercentage").map(|relative| !relative),
    );
    overlay(&mut vendor.manual_review_percent, flat.kpi_number("manualReview")?);
    overlay(
        &mut vendor.manual_review_is_absolute,
        flat.kpi_flag("manualReviewUsePercentage").map(|relative| !relative),
    );
    Ok(())
}

fn overlay_relative(percent: &mut Option<Lenient>, is_absolute: &mut Option<bool>, value: Option<Lenient>) {
    if value.is_some() {
        *percent = value;
        *is_absolute = Some(false);
    }
}

fn overlay<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}

/// Lookup over the assistant's flat keys. KPI fields may come nested
/// (`{"forterKPIs": {"manualReview": 40}}`) or dotted (`"forterKPIs.manualReview"`).
struct FlatKeys<'a> {
    object: &'a Map<String, Value>,
    kpis: Option<&'a Map<String, Value>>,
}

impl<'a> FlatKeys<'a> {
    fn new(object: &'a Map<String, Value>) -> Self {
        Self {
            object,
            kpis: object.get("forterKPIs").and_then(Value::as_object),
        }
    }

    fn number(&self, key: &str) -> UpliftResult<Option<Lenient>> {
        lenient_value(key, self.object.get(key))
    }

    fn text(&self, key: &str) -> Option<String> {
        self.object.get(key).and_then(Value::as_str).map(str::to_string)
    }

    fn kpi(&self, key: &str) -> Option<&'a Value> {
        self.kpis
            .and_then(|kpis| kpis.get(key))
            .or_else(|| self.object.get(&format!("forterKPIs.{key}")))
    }

    /// Every KPI name present, nested or dotted.
    fn kpi_keys(&self) -> Vec<&'a str> {
        let nested = self.kpis.into_iter().flat_map(|kpis| kpis.keys().map(String::as_str));
        let dotted = self
            .object
            .keys()
            .filter_map(|key| key.strip_prefix("forterKPIs."));
        nested.chain(dotted).collect()
    }

    fn kpi_number(&self, key: &str) -> UpliftResult<Option<Lenient>> {
        lenient_value(&format!("forterKPIs.{key}"), self.kpi(key))
    }

    fn kpi_flag(&self, key: &str) -> Option<bool> {
        match self.kpi(key)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" => Some(true),
                "false" | "no" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }
}

fn lenient_value(key: &str, value: Option<&Value>) -> UpliftResult<Option<Lenient>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(v) => serde_json::from_value::<Lenient>(v.clone())
            .map(Some)
            .map_err(|e| UpliftError::InvalidPatch {
                reason: format!("{key}: {e}"),
            }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lenient_numbers_accept_human_formats() {
        assert_eq!(parse_lenient_number("95%"), Some(95.0));
        assert_eq!(parse_lenient_number("$75,000,000"), Some(75_000_000.0));
        assert_eq!(parse_lenient_number(" 1 200 "), Some(1_200.0));
        assert_eq!(parse_lenient_number("USD 158"), Some(158.0));
        assert_eq!(parse_lenient_number("lots"), None);
        assert_eq!(parse_lenient_number(""), None);
    }

    #[test]
    fn lenient_deserializes_numbers_and_strings() {
        let v: Lenient = serde_json::from_value(json!("0.8%")).unwrap();
        assert_eq!(v, Lenient(0.8));
        let v: Lenient = serde_json::from_value(json!(42)).unwrap();
        assert_eq!(v, Lenient(42.0));
        assert!(serde_json::from_value::<Lenient>(json!("n/a")).is_err());
    }

    #[test]
    fn flat_keys_map_to_region_patch() {
        let patch = ProfilePatch::from_assistant_json(&json!({
            "amerAnnualGMV": 75000000,
            "amerFraudCheckTiming": "pre-auth",
            "amer3DSChallengeRate": "10%"
        }))
        .unwrap();
        let amer = &patch.regions[&Region::Amer];
        assert_eq!(amer.annual_gmv_attempts, Some(Lenient(75_000_000.0)));
        assert_eq!(amer.fraud_check_timing.as_deref(), Some("pre-auth"));
        assert_eq!(amer.three_ds_challenge_rate_percent, Some(Lenient(10.0)));
        assert!(!patch.regions.contains_key(&Region::Emea));
    }

    #[test]
    fn use_percentage_flag_selects_relative_mode() {
        let patch = ProfilePatch::from_assistant_json(&json!({
            "forterKPIs": { "manualReview": 40, "manualReviewUsePercentage": false },
            "forterKPIs.threeDSChallenge": 25,
            "forterKPIs.threeDSChallengeUsePercentage": true
        }))
        .unwrap();
        let vendor = patch.vendor_assumptions.unwrap();
        assert_eq!(vendor.manual_review_percent, Some(Lenient(40.0)));
        assert_eq!(vendor.manual_review_is_absolute, Some(true));
        assert_eq!(vendor.three_ds_challenge_percent, Some(Lenient(25.0)));
        assert_eq!(vendor.three_ds_challenge_is_absolute, Some(false));
    }

    #[test]
    fn non_object_update_is_rejected() {
        let err = ProfilePatch::from_assistant_json(&json!([1, 2])).unwrap_err();
        assert!(matches!(err, UpliftError::InvalidPatch { .. }));
        assert!(ProfilePatch::from_assistant_json(&Value::Null).unwrap().is_empty());
    }
}
