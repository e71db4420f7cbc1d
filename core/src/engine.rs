//! The uplift engine. Turns an InputProfile into an Assessment.
//!
//! RULES:
//!   - Pure and synchronous. No I/O, no shared state, no memoization.
//!     Every call re-derives everything from the full profile.
//!   - The profile is sanitized first, so NaN or out-of-range values never
//!     reach the funnel arithmetic.
//!   - Regions with zero or absent GMV are skipped entirely.
//!   - Driver toggles gate only the total; each driver's own value is always
//!     computed and reported.

use crate::{
    chargeback::{chargeback_savings, dispute_view, ChargebackResult, DisputeView},
    config::EngineConfig,
    funnel::{current_rates, future_rates, simulate, FunnelResult},
    profile::{DriverToggles, InputProfile, RegionInput, ValueDriver},
    types::{fraction, Percent, Region, Usd},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegionAssessment {
    pub region: Region,
    /// The sanitized input the funnels were computed from.
    pub input: RegionInput,
    pub current: FunnelResult,
    pub future: FunnelResult,
}

impl RegionAssessment {
    pub fn gmv_uplift(&self) -> Usd {
        self.future.completed - self.current.completed
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AggregateResult {
    pub attempted_gmv: Usd,
    /// Always computed, whether or not the driver is enabled.
    pub total_gmv_uplift: Usd,
    /// Always computed, whether or not the driver is enabled.
    pub chargeback_savings: Usd,
    /// Sum of the enabled drivers only.
    pub total_value: Usd,
    pub gmv_uplift_percent: Percent,
    pub average_margin_percent: Option<Percent>,
    pub margin_applied: bool,
    /// The monthly cost of doing nothing.
    pub monthly_run_rate: Usd,
    pub toggles: DriverToggles,
}

impl AggregateResult {
    pub fn driver_value(&self, driver: ValueDriver) -> Usd {
        match driver {
            ValueDriver::GmvUplift => self.total_gmv_uplift,
            ValueDriver::ChargebackSavings => self.chargeback_savings,
        }
    }

    /// What the driver adds to `total_value`: its value, or 0 when disabled.
    pub fn contribution(&self, driver: ValueDriver) -> Usd {
        if self.toggles.is_enabled(driver) {
            self.driver_value(driver)
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Assessment {
    pub funnel_version: String,
    pub regions: Vec<RegionAssessment>,
    pub chargebacks: ChargebackResult,
    pub disputes: DisputeView,
    pub aggregate: AggregateResult,
}

impl Assessment {
    pub fn region(&self, region: Region) -> Option<&RegionAssessment> {
        self.regions.iter().find(|r| r.region == region)
    }
}

pub struct UpliftEngine {
    config: EngineConfig,
}

impl UpliftEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn standard() -> Self {
        Self::new(EngineConfig::standard())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn compute(&self, profile: &InputProfile) -> Assessment {
        let profile = profile.sanitized(&self.config);
        let funnel = &self.config.funnel;
        let vendor = &profile.vendor_assumptions;

        let regions: Vec<RegionAssessment> = profile
            .present_regions()
            .map(|(region, input)| {
                let current = simulate(input.annual_gmv_attempts, &current_rates(input, funnel));
                let future = simulate(input.annual_gmv_attempts, &future_rates(input, vendor, funnel));
                log::debug!(
                    "{region}: complete rate {:.4} -> {:.4}, uplift {:.0}",
                    current.complete_rate(),
                    future.complete_rate(),
                    future.completed - current.completed
                );
                RegionAssessment {
                    region,
                    input: input.clone(),
                    current,
                    future,
                }
            })
            .collect();

        let attempted_gmv: Usd = regions.iter().map(|r| r.input.annual_gmv_attempts).sum();
        let chargebacks = chargeback_savings(attempted_gmv, &profile.chargeback_input, vendor);
        let disputes = dispute_view(attempted_gmv, &chargebacks, &profile.chargeback_input, vendor);
        let aggregate = aggregate(&profile, &regions, &chargebacks, attempted_gmv);

        log::debug!(
            "Assessment ({} regions, funnel {}): total value {:.0}, monthly {:.0}",
            regions.len(),
            funnel.version,
            aggregate.total_value,
            aggregate.monthly_run_rate
        );

        Assessment {
            funnel_version: funnel.version.clone(),
            regions,
            chargebacks,
            disputes,
            aggregate,
        }
    }
}

fn aggregate(
    profile: &InputProfile,
    regions: &[RegionAssessment],
    chargebacks: &ChargebackResult,
    attempted_gmv: Usd,
) -> AggregateResult {
    let toggles = profile.driver_toggles;
    let total_gmv_uplift: Usd = regions.iter().map(RegionAssessment::gmv_uplift).sum();
    let chargeback_savings = chargebacks.savings;

    let mut total_value = 0.0;
    if toggles.gmv_uplift {
        total_value += total_gmv_uplift;
    }
    if toggles.chargeback_savings {
        total_value += chargeback_savings;
    }

    let average_margin_percent = profile.average_margin_percent();
    let (annual_profit, margin_applied) = match average_margin_percent {
        Some(margin) if profile.margin_enabled => (total_value * fraction(margin), true),
        _ => (total_value, false),
    };

    let gmv_uplift_percent = if attempted_gmv > 0.0 {
        total_gmv_uplift / attempted_gmv * 100.0
    } else {
        0.0
    };

    AggregateResult {
        attempted_gmv,
        total_gmv_uplift,
        chargeback_savings,
        total_value,
        gmv_uplift_percent,
        average_margin_percent,
        margin_applied,
        monthly_run_rate: annual_profit / 12.0,
        toggles,
    }
}
