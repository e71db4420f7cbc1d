//! Chargeback model.
//!
//! Two separate paths, never mixed:
//!   - `chargeback_savings`: the headline figure. Depends only on attempted
//!     GMV, the fraud chargeback rate and the vendor's reduction percentage.
//!   - `dispute_view`: an explanatory gross → disputed → won → net waterfall.
//!     It never feeds back into the headline savings.
//!
//! The base is total attempted GMV of present regions, not completed GMV.

use crate::{
    profile::{ChargebackInput, VendorKpis},
    types::{fraction, Percent, Usd},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChargebackResult {
    pub attempted_gmv: Usd,
    pub fraud_chargeback_rate_percent: Percent,
    pub reduction_percent: Percent,
    pub future_fraud_chargeback_rate_percent: Percent,
    pub current_chargebacks: Usd,
    pub future_chargebacks: Usd,
    pub savings: Usd,
    pub fraud_chargeback_aov: Usd,
}

impl ChargebackResult {
    pub fn current_count(&self) -> Option<f64> {
        per_order(self.current_chargebacks, self.fraud_chargeback_aov)
    }

    pub fn future_count(&self) -> Option<f64> {
        per_order(self.future_chargebacks, self.fraud_chargeback_aov)
    }
}

pub fn chargeback_savings(
    attempted_gmv: Usd,
    input: &ChargebackInput,
    vendor: &VendorKpis,
) -> ChargebackResult {
    let current_chargebacks = attempted_gmv * fraction(input.fraud_chargeback_rate_percent);
    let future_chargebacks =
        current_chargebacks * (1.0 - fraction(vendor.chargeback_reduction_percent));

    ChargebackResult {
        attempted_gmv,
        fraud_chargeback_rate_percent: input.fraud_chargeback_rate_percent,
        reduction_percent: vendor.chargeback_reduction_percent,
        future_fraud_chargeback_rate_percent: input.fraud_chargeback_rate_percent
            * (1.0 - fraction(vendor.chargeback_reduction_percent)),
        current_chargebacks,
        future_chargebacks,
        savings: current_chargebacks - future_chargebacks,
        fraud_chargeback_aov: input.fraud_chargeback_aov,
    }
}

// ── Dispute waterfall (explanatory) ────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DisputeWaterfall {
    pub gross: Usd,
    pub dispute_rate_percent: Percent,
    pub disputed: Usd,
    pub win_rate_percent: Percent,
    pub won: Usd,
    pub net_loss: Usd,
    pub aov: Usd,
}

impl DisputeWaterfall {
    fn new(gross: Usd, dispute_rate_percent: Percent, win_rate_percent: Percent, aov: Usd) -> Self {
        let disputed = gross * fraction(dispute_rate_percent);
        let won = disputed * fraction(win_rate_percent);
        Self {
            gross,
            dispute_rate_percent,
            disputed,
            win_rate_percent,
            won,
            net_loss: gross - won,
            aov,
        }
    }

    pub fn gross_count(&self) -> Option<f64> {
        per_order(self.gross, self.aov)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DisputeView {
    /// Starts from the fraud chargebacks left after the vendor's reduction.
    pub fraud: DisputeWaterfall,
    pub service: DisputeWaterfall,
}

pub fn dispute_view(
    attempted_gmv: Usd,
    headline: &ChargebackResult,
    input: &ChargebackInput,
    vendor: &VendorKpis,
) -> DisputeView {
    let service_gross = attempted_gmv * fraction(input.service_chargeback_rate_percent);
    DisputeView {
        fraud: DisputeWaterfall::new(
            headline.future_chargebacks,
            vendor.dispute_rate_percent,
            vendor.fraud_dispute_win_rate_percent,
            input.fraud_chargeback_aov,
        ),
        service: DisputeWaterfall::new(
            service_gross,
            vendor.service_dispute_rate_percent,
            vendor.service_dispute_win_rate_percent,
            input.service_chargeback_aov,
        ),
    }
}

fn per_order(amount: Usd, aov: Usd) -> Option<f64> {
    if aov > 0.0 {
        Some(amount / aov)
    } else {
        None
    }
}
