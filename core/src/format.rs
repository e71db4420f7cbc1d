//! Value formatting for breakdown lines.
//!
//! The unit of a line comes from its label suffix:
//!   `($)` currency, whole dollars
//!   `(%)` percent, at most 2 decimals
//!   `(#)` count, whole units
//! Currency and counts get thousands separators.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ValueFormat {
    Currency,
    Percent,
    Count,
    Plain,
}

impl ValueFormat {
    pub fn from_label(label: &str) -> Self {
        let label = label.trim_end();
        if label.ends_with("($)") {
            Self::Currency
        } else if label.ends_with("(%)") {
            Self::Percent
        } else if label.ends_with("(#)") {
            Self::Count
        } else {
            Self::Plain
        }
    }

    pub fn format(&self, value: f64) -> String {
        match self {
            Self::Currency => format_currency(value),
            Self::Percent => format_percent(value),
            Self::Count => format_count(value),
            Self::Plain => format!("{value:.2}"),
        }
    }

    /// Like `format`, with an explicit `+` on positive values.
    pub fn format_signed(&self, value: f64) -> String {
        let text = self.format(value);
        if value > 0.0 && !text.starts_with('-') && text != self.format(0.0) {
            format!("+{text}")
        } else {
            text
        }
    }
}

pub fn format_currency(value: f64) -> String {
    let rounded = value.round();
    let sign = if rounded < 0.0 { "-" } else { "" };
    format!("{sign}${}", group_thousands(rounded.abs()))
}

pub fn format_percent(value: f64) -> String {
    let text = format!("{:.2}", value);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    // "-0" after trimming a tiny negative
    let text = if text == "-0" { "0" } else { text };
    format!("{text}%")
}

pub fn format_count(value: f64) -> String {
    let rounded = value.round();
    let sign = if rounded < 0.0 { "-" } else { "" };
    format!("{sign}{}", group_thousands(rounded.abs()))
}

/// Comma-separate the integer part of a non-negative, already rounded value.
fn group_thousands(value: f64) -> String {
    let digits = format!("{value:.0}");
    let mut result = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(ch);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_suffix_selects_format() {
        assert_eq!(ValueFormat::from_label("Completed GMV ($)"), ValueFormat::Currency);
        assert_eq!(ValueFormat::from_label("Complete rate (%)"), ValueFormat::Percent);
        assert_eq!(ValueFormat::from_label("Gross attempts (#)"), ValueFormat::Count);
        assert_eq!(ValueFormat::from_label("AMER"), ValueFormat::Plain);
    }

    #[test]
    fn currency_rounds_to_whole_dollars() {
        assert_eq!(format_currency(1_200_000.4), "$1,200,000");
        assert_eq!(format_currency(999.5), "$1,000");
        assert_eq!(format_currency(-360_000.0), "-$360,000");
        assert_eq!(format_currency(0.0), "$0");
    }

    #[test]
    fn percent_keeps_at_most_two_decimals() {
        assert_eq!(format_percent(87.829132), "87.83%");
        assert_eq!(format_percent(82.7), "82.7%");
        assert_eq!(format_percent(99.0), "99%");
        assert_eq!(format_percent(-0.001), "0%");
    }

    #[test]
    fn counts_are_grouped() {
        assert_eq!(format_count(7_594.94), "7,595");
        assert_eq!(format_count(500_000.0), "500,000");
        assert_eq!(format_count(12.0), "12");
    }

    #[test]
    fn signed_format_marks_gains() {
        assert_eq!(ValueFormat::Currency.format_signed(2_500.0), "+$2,500");
        assert_eq!(ValueFormat::Currency.format_signed(-2_500.0), "-$2,500");
        assert_eq!(ValueFormat::Percent.format_signed(0.0), "0%");
    }
}
