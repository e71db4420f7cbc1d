//! Shared primitive types used across the entire engine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A money amount in USD.
pub type Usd = f64;

/// A percentage stored as a plain number in [0, 100], never as a fraction.
/// Conversion to a fraction happens once, at the point of use.
pub type Percent = f64;

/// Convert a stored percentage into a multiplier.
#[inline]
pub fn fraction(percent: Percent) -> f64 {
    percent / 100.0
}

/// Sales regions an assessment can carry.
/// Declaration order is the display and aggregation order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum Region {
    Amer,
    Emea,
    Apac,
}

impl Region {
    pub const ALL: [Region; 3] = [Region::Amer, Region::Emea, Region::Apac];

    pub fn code(&self) -> &'static str {
        match self {
            Self::Amer => "AMER",
            Self::Emea => "EMEA",
            Self::Apac => "APAC",
        }
    }

    /// Lower-case key prefix used by the assistant's flat field names
    /// (`amerAnnualGMV`, `emea3DSChallengeRate`, ...).
    pub fn key_prefix(&self) -> &'static str {
        match self {
            Self::Amer => "amer",
            Self::Emea => "emea",
            Self::Apac => "apac",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
