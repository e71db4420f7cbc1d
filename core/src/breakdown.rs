//! Line-item breakdown of an Assessment ("show your work").
//!
//! RULES:
//!   - Pure formatting over engine records. Every number on a line is copied
//!     from `Assessment`; nothing here calls the funnel or resolves a rate.
//!   - The unit of a line is carried by its label suffix, see `format`.
//!   - No present regions ⇒ empty GMV-uplift and chargeback sections.
//!
//! SECTION ORDER:
//!   1. GMV uplift, per region, per funnel stage
//!   2. Chargebacks: headline figure, then the dispute waterfall
//!   3. Value summary

use crate::{
    chargeback::DisputeWaterfall,
    engine::{Assessment, RegionAssessment},
    format::ValueFormat,
    profile::ValueDriver,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LineKind {
    Header,
    Subheader,
    Value,
    Result,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub label: String,
    pub kind: LineKind,
    pub current: Option<f64>,
    /// future − current, when both sides exist.
    pub impact: Option<f64>,
    pub future: Option<f64>,
    /// True for metrics where going down is the good direction
    /// (declines, abandonment, chargebacks).
    pub negative_is_good: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl LineItem {
    fn bare(label: impl Into<String>, kind: LineKind) -> Self {
        Self {
            label: label.into(),
            kind,
            current: None,
            impact: None,
            future: None,
            negative_is_good: false,
            note: None,
        }
    }

    pub fn header(label: impl Into<String>) -> Self {
        Self::bare(label, LineKind::Header)
    }

    pub fn subheader(label: impl Into<String>) -> Self {
        Self::bare(label, LineKind::Subheader)
    }

    /// A single figure with no before/after.
    pub fn value(label: impl Into<String>, value: f64) -> Self {
        Self {
            current: Some(value),
            ..Self::bare(label, LineKind::Value)
        }
    }

    /// A current → future comparison.
    pub fn compare(label: impl Into<String>, current: f64, future: f64) -> Self {
        Self {
            current: Some(current),
            impact: Some(future - current),
            future: Some(future),
            ..Self::bare(label, LineKind::Value)
        }
    }

    /// A single bottom-line figure.
    pub fn total(label: impl Into<String>, value: f64) -> Self {
        Self {
            kind: LineKind::Result,
            ..Self::value(label, value)
        }
    }

    pub fn as_result(mut self) -> Self {
        self.kind = LineKind::Result;
        self
    }

    pub fn lower_is_better(mut self) -> Self {
        self.negative_is_good = true;
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn format(&self) -> ValueFormat {
        ValueFormat::from_label(&self.label)
    }

    /// Whether the change is good news. None when there is no change.
    pub fn is_favorable(&self) -> Option<bool> {
        let impact = self.impact?;
        if impact == 0.0 {
            return None;
        }
        Some((impact < 0.0) == self.negative_is_good)
    }

    pub fn rendered(&self) -> RenderedLine {
        let format = self.format();
        RenderedLine {
            label: self.label.clone(),
            kind: self.kind,
            current: self.current.map(|v| format.format(v)),
            impact: self.impact.map(|v| format.format_signed(v)),
            future: self.future.map(|v| format.format(v)),
            favorable: self.is_favorable(),
            note: self.note.clone(),
        }
    }
}

/// A line with its numbers already turned into display strings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RenderedLine {
    pub label: String,
    pub kind: LineKind,
    pub current: Option<String>,
    pub impact: Option<String>,
    pub future: Option<String>,
    pub favorable: Option<bool>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Breakdown {
    pub gmv_uplift: Vec<LineItem>,
    pub chargebacks: Vec<LineItem>,
    pub summary: Vec<LineItem>,
}

impl Breakdown {
    pub fn sections(&self) -> [(&'static str, &[LineItem]); 3] {
        [
            ("GMV uplift", &self.gmv_uplift),
            ("Chargebacks", &self.chargebacks),
            ("Value summary", &self.summary),
        ]
    }
}

pub fn explain(assessment: &Assessment) -> Breakdown {
    Breakdown {
        gmv_uplift: gmv_uplift_lines(assessment),
        chargebacks: chargeback_lines(assessment),
        summary: summary_lines(assessment),
    }
}

/// The section behind one value driver, as opened from its dashboard tile.
pub fn driver_lines(assessment: &Assessment, driver: ValueDriver) -> Vec<LineItem> {
    match driver {
        ValueDriver::GmvUplift => gmv_uplift_lines(assessment),
        ValueDriver::ChargebackSavings => chargeback_lines(assessment),
    }
}

// ── GMV uplift ─────────────────────────────────────────────────────

pub fn gmv_uplift_lines(assessment: &Assessment) -> Vec<LineItem> {
    if assessment.regions.is_empty() {
        return Vec::new();
    }

    let mut lines = Vec::new();
    for region in &assessment.regions {
        region_lines(region, &mut lines);
    }

    let aggregate = &assessment.aggregate;
    let mut total = LineItem::total("Total GMV uplift ($)", aggregate.total_gmv_uplift);
    if !aggregate.toggles.is_enabled(ValueDriver::GmvUplift) {
        total = total.with_note("excluded from total value");
    }
    lines.push(total);
    lines.push(LineItem::value(
        "GMV uplift vs attempted GMV (%)",
        aggregate.gmv_uplift_percent,
    ));
    lines
}

fn region_lines(assessment: &RegionAssessment, lines: &mut Vec<LineItem>) {
    let c = &assessment.current;
    let f = &assessment.future;
    let input = &assessment.input;

    lines.push(LineItem::header(format!("{} region", assessment.region)));

    lines.push(LineItem::subheader("Fraud decisioning"));
    lines.push(LineItem::value("Annual GMV attempts ($)", c.attempts));
    lines.push(LineItem::compare(
        format!("Fraud approval rate, {} (%)", input.fraud_check_timing.label()),
        c.rates.fraud_approval_percent,
        f.rates.fraud_approval_percent,
    ));
    lines.push(
        LineItem::compare("Fraud-approved GMV ($)", c.fraud_approved, f.fraud_approved)
            .with_note("GMV attempts × fraud approval rate"),
    );

    lines.push(LineItem::subheader("3DS"));
    if c.rates.card_share_percent < 100.0 {
        lines.push(LineItem::value("Card share of volume (%)", c.rates.card_share_percent));
    }
    lines.push(
        LineItem::compare(
            "3DS challenge rate (%)",
            c.rates.three_ds_challenge_percent,
            f.rates.three_ds_challenge_percent,
        )
        .lower_is_better(),
    );
    lines.push(
        LineItem::compare("3DS-challenged GMV ($)", c.three_ds_challenged, f.three_ds_challenged)
            .lower_is_better()
            .with_note("fraud-approved GMV × card share × challenge rate"),
    );
    lines.push(
        LineItem::compare(
            "3DS abandonment rate (%)",
            c.rates.three_ds_abandonment_percent,
            f.rates.three_ds_abandonment_percent,
        )
        .lower_is_better(),
    );
    lines.push(
        LineItem::compare("3DS-abandoned GMV ($)", c.three_ds_abandoned, f.three_ds_abandoned)
            .lower_is_better(),
    );
    lines.push(
        LineItem::compare("GMV sent to authorization ($)", c.to_auth, f.to_auth)
            .with_note("exempt GMV + challenged GMV that completed the challenge"),
    );

    lines.push(LineItem::subheader("Bank authorization"));
    lines.push(
        LineItem::compare(
            "Issuing bank decline rate (%)",
            c.rates.bank_decline_percent,
            f.rates.bank_decline_percent,
        )
        .lower_is_better(),
    );
    lines.push(LineItem::compare(
        "Bank approval rate (%)",
        c.rates.bank_approval_percent,
        f.rates.bank_approval_percent,
    ));
    lines.push(
        LineItem::compare("Bank-declined GMV ($)", c.bank_declined(), f.bank_declined())
            .lower_is_better(),
    );
    lines.push(
        LineItem::compare("Bank-approved GMV ($)", c.bank_approved, f.bank_approved)
            .with_note("GMV sent to authorization × bank approval rate"),
    );

    lines.push(LineItem::subheader("Manual review"));
    lines.push(
        LineItem::compare(
            "Manual review rate (%)",
            c.rates.manual_review_percent,
            f.rates.manual_review_percent,
        )
        .lower_is_better(),
    );
    lines.push(
        LineItem::compare("Manually reviewed GMV ($)", c.manually_reviewed, f.manually_reviewed)
            .lower_is_better(),
    );
    lines.push(
        LineItem::compare(
            "Review abandonment rate (%)",
            c.rates.review_abandonment_percent,
            f.rates.review_abandonment_percent,
        )
        .lower_is_better(),
    );
    lines.push(
        LineItem::compare("Review-abandoned GMV ($)", c.review_abandoned, f.review_abandoned)
            .lower_is_better(),
    );

    lines.push(
        LineItem::compare("Completed GMV ($)", c.completed, f.completed)
            .as_result()
            .with_note("bank-approved GMV − review-abandoned GMV"),
    );
    lines.push(
        LineItem::compare(
            "Complete rate (%)",
            c.complete_rate() * 100.0,
            f.complete_rate() * 100.0,
        )
        .as_result(),
    );

    if let (Some(count), Some(aov)) = (input.gross_attempts_count, input.average_order_value()) {
        lines.push(LineItem::subheader("Transactions"));
        lines.push(LineItem::value("Gross attempts (#)", count));
        lines.push(LineItem::value("Average order value ($)", aov));
        lines.push(LineItem::compare(
            "Completed transactions (#)",
            c.completed / aov,
            f.completed / aov,
        ));
    }

    lines.push(LineItem::total(
        format!("{} GMV uplift ($)", assessment.region),
        assessment.gmv_uplift(),
    ));
}

// ── Chargebacks ────────────────────────────────────────────────────

pub fn chargeback_lines(assessment: &Assessment) -> Vec<LineItem> {
    if assessment.regions.is_empty() {
        return Vec::new();
    }
    let cb = &assessment.chargebacks;
    let mut lines = vec![
        LineItem::header("Fraud chargebacks"),
        LineItem::value("Attempted GMV ($)", cb.attempted_gmv),
        LineItem::value("Vendor chargeback reduction (%)", cb.reduction_percent),
        LineItem::compare(
            "Fraud chargeback rate (%)",
            cb.fraud_chargeback_rate_percent,
            cb.future_fraud_chargeback_rate_percent,
        )
        .lower_is_better(),
        LineItem::compare("Fraud chargebacks ($)", cb.current_chargebacks, cb.future_chargebacks)
            .lower_is_better()
            .with_note("attempted GMV × fraud chargeback rate"),
    ];
    if let (Some(current), Some(future)) = (cb.current_count(), cb.future_count()) {
        lines.push(LineItem::value("Fraud chargeback AOV ($)", cb.fraud_chargeback_aov));
        lines.push(LineItem::compare("Fraud chargebacks (#)", current, future).lower_is_better());
    }

    let mut savings = LineItem::total("Chargeback savings ($)", cb.savings);
    if !assessment.aggregate.toggles.is_enabled(ValueDriver::ChargebackSavings) {
        savings = savings.with_note("excluded from total value");
    }
    lines.push(savings);

    lines.push(
        LineItem::header("Dispute recovery")
            .with_note("illustrative; not included in chargeback savings"),
    );
    waterfall_lines("Fraud", &assessment.disputes.fraud, &mut lines);
    if assessment.disputes.service.gross > 0.0 {
        waterfall_lines("Service", &assessment.disputes.service, &mut lines);
    }
    lines
}

fn waterfall_lines(kind: &str, waterfall: &DisputeWaterfall, lines: &mut Vec<LineItem>) {
    lines.push(LineItem::subheader(format!("{kind} disputes")));
    lines.push(LineItem::value(format!("{kind} chargebacks ($)"), waterfall.gross));
    if let Some(count) = waterfall.gross_count() {
        lines.push(LineItem::value(format!("{kind} chargebacks (#)"), count));
    }
    lines.push(LineItem::value("Dispute rate (%)", waterfall.dispute_rate_percent));
    lines.push(LineItem::value("Disputed ($)", waterfall.disputed));
    lines.push(LineItem::value("Win rate (%)", waterfall.win_rate_percent));
    lines.push(LineItem::value("Recovered ($)", waterfall.won));
    lines.push(LineItem::total(format!("Net {} loss ($)", kind.to_lowercase()), waterfall.net_loss));
}

// ── Value summary ──────────────────────────────────────────────────

pub fn summary_lines(assessment: &Assessment) -> Vec<LineItem> {
    let aggregate = &assessment.aggregate;
    let mut lines = vec![LineItem::header("Value summary")];

    for driver in ValueDriver::ALL {
        let mut line = LineItem::value(
            format!("{} ({}) ($)", driver.label(), driver.category()),
            aggregate.driver_value(driver),
        );
        if !aggregate.toggles.is_enabled(driver) {
            line = line.with_note("excluded from total value");
        }
        lines.push(line);
    }
    lines.push(LineItem::total("Total annual value ($)", aggregate.total_value));

    match aggregate.average_margin_percent {
        Some(margin) if aggregate.margin_applied => {
            lines.push(LineItem::value("Average gross margin (%)", margin));
            lines.push(
                LineItem::total("Monthly cost of doing nothing ($)", aggregate.monthly_run_rate)
                    .with_note("total annual value × average gross margin ÷ 12"),
            );
        }
        _ => lines.push(
            LineItem::total("Monthly cost of doing nothing ($)", aggregate.monthly_run_rate)
                .with_note("total annual value ÷ 12"),
        ),
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declines_going_down_is_favorable() {
        let line = LineItem::compare("Issuing bank decline rate (%)", 7.0, 6.93).lower_is_better();
        assert_eq!(line.is_favorable(), Some(true));
        let line = LineItem::compare("Completed GMV ($)", 100.0, 90.0);
        assert_eq!(line.is_favorable(), Some(false));
        assert_eq!(LineItem::compare("Gross attempts (#)", 5.0, 5.0).is_favorable(), None);
    }

    #[test]
    fn rendered_line_uses_label_unit() {
        let rendered = LineItem::compare("Completed GMV ($)", 1_000_000.0, 1_250_000.0).rendered();
        assert_eq!(rendered.current.as_deref(), Some("$1,000,000"));
        assert_eq!(rendered.impact.as_deref(), Some("+$250,000"));
        assert_eq!(rendered.future.as_deref(), Some("$1,250,000"));
        assert_eq!(rendered.favorable, Some(true));
    }
}
