//! Engine configuration: funnel formula version, region defaults, vendor
//! default KPIs and chargeback defaults.
//!
//! Loaded from the data/ directory by the runner.
//! In tests, use EngineConfig::standard().

use crate::{
    error::{UpliftError, UpliftResult},
    profile::{ChargebackInput, FraudCheckTiming, RateAdjustment, VendorKpis},
    types::{Percent, Region},
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;

// ── Funnel formula ─────────────────────────────────────────────────

/// How the vendor's bank-decline improvement turns into a future bank
/// approval rate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BankUpliftModel {
    /// futureDecline = decline × (1 − improvement/100), approval = 100 − futureDecline.
    RelativeDeclineReduction,
    /// futureApproval = approval + improvement, in percentage points.
    /// The first revision of the calculator used this.
    AdditiveApproval,
}

/// Every constant the funnel formula depends on.
///
/// Formula changes are made here, under a new `version`, never by forking
/// the funnel code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunnelConfig {
    pub version: String,
    /// Share of manually reviewed volume lost under today's process.
    pub current_review_abandonment_percent: Percent,
    /// Share of manually reviewed volume lost with the vendor.
    pub vendor_review_abandonment_percent: Percent,
    /// Hard ceiling on the future bank approval rate.
    pub bank_approval_ceiling_percent: Percent,
    pub bank_uplift_model: BankUpliftModel,
    pub three_ds_stage: bool,
    pub manual_review_stage: bool,
}

impl FunnelConfig {
    /// The four-stage funnel: fraud → 3DS → bank → manual review.
    pub fn standard() -> Self {
        Self {
            version: "four-stage-v3".into(),
            current_review_abandonment_percent: 3.0,
            vendor_review_abandonment_percent: 2.0,
            bank_approval_ceiling_percent: 99.0,
            bank_uplift_model: BankUpliftModel::RelativeDeclineReduction,
            three_ds_stage: true,
            manual_review_stage: true,
        }
    }

    /// The original dashboard formula: complete rate = bank approval × fraud
    /// approval, with a flat one-point bank approval uplift. Kept so old
    /// figures can be reproduced in regression tests.
    pub fn two_stage_legacy() -> Self {
        Self {
            version: "two-stage-v1".into(),
            current_review_abandonment_percent: 0.0,
            vendor_review_abandonment_percent: 0.0,
            bank_approval_ceiling_percent: 99.0,
            bank_uplift_model: BankUpliftModel::AdditiveApproval,
            three_ds_stage: false,
            manual_review_stage: false,
        }
    }

    pub fn validate(&self) -> UpliftResult<()> {
        check_percent("funnel.current_review_abandonment_percent", self.current_review_abandonment_percent)?;
        check_percent("funnel.vendor_review_abandonment_percent", self.vendor_review_abandonment_percent)?;
        check_percent("funnel.bank_approval_ceiling_percent", self.bank_approval_ceiling_percent)?;
        if self.bank_approval_ceiling_percent <= 0.0 {
            return Err(UpliftError::Config {
                field: "funnel.bank_approval_ceiling_percent".into(),
                reason: "ceiling must be above 0".into(),
            });
        }
        Ok(())
    }
}

// ── Region defaults ────────────────────────────────────────────────

/// Values a region starts from before the user or assistant fills it in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegionDefaults {
    pub region: Region,
    pub gross_margin_percent: Percent,
    pub fraud_check_timing: FraudCheckTiming,
    pub pre_auth_fraud_approval_rate_percent: Percent,
    pub post_auth_fraud_approval_rate_percent: Percent,
    pub issuing_bank_decline_rate_percent: Percent,
    pub three_ds_challenge_rate_percent: Percent,
    pub three_ds_abandonment_rate_percent: Percent,
    pub manual_review_rate_percent: Percent,
    #[serde(default)]
    pub alternative_payment_share_percent: Percent,
}

impl RegionDefaults {
    pub fn standard(region: Region) -> Self {
        let issuing_bank_decline_rate_percent = match region {
            Region::Emea => 5.0,
            Region::Amer | Region::Apac => 7.0,
        };
        Self {
            region,
            gross_margin_percent: 50.0,
            fraud_check_timing: FraudCheckTiming::PreAuth,
            pre_auth_fraud_approval_rate_percent: 95.0,
            post_auth_fraud_approval_rate_percent: 98.5,
            issuing_bank_decline_rate_percent,
            three_ds_challenge_rate_percent: 0.0,
            three_ds_abandonment_rate_percent: 5.0,
            manual_review_rate_percent: 0.0,
            alternative_payment_share_percent: 0.0,
        }
    }

    pub fn validate(&self) -> UpliftResult<()> {
        let r = self.region.key_prefix();
        check_percent(&format!("{r}.gross_margin_percent"), self.gross_margin_percent)?;
        check_percent(&format!("{r}.pre_auth_fraud_approval_rate_percent"), self.pre_auth_fraud_approval_rate_percent)?;
        check_percent(&format!("{r}.post_auth_fraud_approval_rate_percent"), self.post_auth_fraud_approval_rate_percent)?;
        check_percent(&format!("{r}.issuing_bank_decline_rate_percent"), self.issuing_bank_decline_rate_percent)?;
        check_percent(&format!("{r}.three_ds_challenge_rate_percent"), self.three_ds_challenge_rate_percent)?;
        check_percent(&format!("{r}.three_ds_abandonment_rate_percent"), self.three_ds_abandonment_rate_percent)?;
        check_percent(&format!("{r}.manual_review_rate_percent"), self.manual_review_rate_percent)?;
        check_percent(&format!("{r}.alternative_payment_share_percent"), self.alternative_payment_share_percent)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RegionDefaultsFile {
    regions: Vec<RegionDefaults>,
}

// ── Engine config ──────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub funnel: FunnelConfig,
    pub region_defaults: BTreeMap<Region, RegionDefaults>,
    pub vendor_defaults: VendorKpis,
    pub chargeback_defaults: ChargebackInput,
}

impl EngineConfig {
    /// Load from the data/ directory.
    /// Regions missing from region_defaults.json fall back to the built-in table.
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let funnel: FunnelConfig = read_json(&format!("{data_dir}/funnel/funnel_config.json"))?;

        let region_file: RegionDefaultsFile =
            read_json(&format!("{data_dir}/regions/region_defaults.json"))?;
        let mut region_defaults = standard_region_table();
        for defaults in region_file.regions {
            region_defaults.insert(defaults.region, defaults);
        }

        let vendor_defaults: VendorKpis =
            read_json(&format!("{data_dir}/vendor/vendor_defaults.json"))?;
        let chargeback_defaults: ChargebackInput =
            read_json(&format!("{data_dir}/chargebacks/chargeback_defaults.json"))?;

        let config = Self {
            funnel,
            region_defaults,
            vendor_defaults,
            chargeback_defaults,
        };
        config.validate()?;

        log::debug!(
            "Loaded engine config from {data_dir} (funnel {})",
            config.funnel.version
        );
        Ok(config)
    }

    /// Built-in configuration, identical to the shipped data/ files.
    pub fn standard() -> Self {
        Self {
            funnel: FunnelConfig::standard(),
            region_defaults: standard_region_table(),
            vendor_defaults: VendorKpis::default(),
            chargeback_defaults: ChargebackInput::default(),
        }
    }

    pub fn with_funnel(mut self, funnel: FunnelConfig) -> Self {
        self.funnel = funnel;
        self
    }

    pub fn region_defaults(&self, region: Region) -> RegionDefaults {
        self.region_defaults
            .get(&region)
            .cloned()
            .unwrap_or_else(|| RegionDefaults::standard(region))
    }

    pub fn validate(&self) -> UpliftResult<()> {
        self.funnel.validate()?;
        for defaults in self.region_defaults.values() {
            defaults.validate()?;
        }

        let v = &self.vendor_defaults;
        check_percent("vendor.fraud_approval_rate_percent", v.fraud_approval_rate_percent)?;
        check_percent("vendor.bank_decline_improvement_percent", v.bank_decline_improvement_percent)?;
        check_percent("vendor.chargeback_reduction_percent", v.chargeback_reduction_percent)?;
        check_adjustment("vendor.three_ds_challenge", v.three_ds_challenge)?;
        check_adjustment("vendor.three_ds_abandonment", v.three_ds_abandonment)?;
        check_adjustment("vendor.manual_review", v.manual_review)?;
        check_percent("vendor.dispute_rate_percent", v.dispute_rate_percent)?;
        check_percent("vendor.fraud_dispute_win_rate_percent", v.fraud_dispute_win_rate_percent)?;
        check_percent("vendor.service_dispute_rate_percent", v.service_dispute_rate_percent)?;
        check_percent("vendor.service_dispute_win_rate_percent", v.service_dispute_win_rate_percent)?;

        let c = &self.chargeback_defaults;
        check_percent("chargebacks.fraud_chargeback_rate_percent", c.fraud_chargeback_rate_percent)?;
        check_percent("chargebacks.service_chargeback_rate_percent", c.service_chargeback_rate_percent)?;
        if !(c.fraud_chargeback_aov >= 0.0 && c.service_chargeback_aov >= 0.0) {
            return Err(UpliftError::Config {
                field: "chargebacks.aov".into(),
                reason: "average order values must be non-negative".into(),
            });
        }
        Ok(())
    }
}

fn standard_region_table() -> BTreeMap<Region, RegionDefaults> {
    Region::ALL
        .iter()
        .map(|&r| (r, RegionDefaults::standard(r)))
        .collect()
}

fn read_json<T: DeserializeOwned>(path: &str) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
    serde_json::from_str(&content).map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))
}

fn check_percent(field: &str, value: Percent) -> UpliftResult<()> {
    if (0.0..=100.0).contains(&value) {
        Ok(())
    } else {
        Err(UpliftError::Config {
            field: field.to_string(),
            reason: format!("{value} is outside [0, 100]"),
        })
    }
}

fn check_adjustment(field: &str, adjustment: RateAdjustment) -> UpliftResult<()> {
    check_percent(field, adjustment.percent())
}
