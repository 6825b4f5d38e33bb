//! Rating retention horizon.
//!
//! Horizons are written as a signed relative offset such as `"-6 months"` or
//! `"-30 days"`. A rating is expired when it was observed before
//! `now + offset`. An empty horizon disables pruning.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Months, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

static HORIZON_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([+-]?)\s*(\d+)\s*(minute|hour|day|week|month|year)s?\s*$")
        .expect("horizon pattern is valid")
});

/// Calendar unit of a retention offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HorizonUnit {
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl HorizonUnit {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Year => "year",
        }
    }
}

/// Parsed retention horizon.
///
/// `amount` is always stored as the magnitude looking back in time; a
/// horizon written without a sign is treated the same as a negative one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionHorizon {
    pub amount: u32,
    pub unit: HorizonUnit,
}

impl RetentionHorizon {
    pub fn new(amount: u32, unit: HorizonUnit) -> Self {
        Self { amount, unit }
    }

    /// Parse a horizon, returning `None` for an empty (disabled) horizon.
    pub fn parse_optional(s: &str) -> Result<Option<Self>> {
        if s.trim().is_empty() {
            return Ok(None);
        }
        s.parse().map(Some)
    }

    /// Timestamp before which ratings are expired.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let amount = self.amount;
        let cutoff = match self.unit {
            HorizonUnit::Minute => now.checked_sub_signed(Duration::minutes(amount.into())),
            HorizonUnit::Hour => now.checked_sub_signed(Duration::hours(amount.into())),
            HorizonUnit::Day => now.checked_sub_signed(Duration::days(amount.into())),
            HorizonUnit::Week => now.checked_sub_signed(Duration::weeks(amount.into())),
            HorizonUnit::Month => now.checked_sub_months(Months::new(amount)),
            HorizonUnit::Year => amount
                .checked_mul(12)
                .and_then(|months| now.checked_sub_months(Months::new(months))),
        };
        cutoff.unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

impl FromStr for RetentionHorizon {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.to_lowercase();
        let caps = HORIZON_PATTERN
            .captures(&lowered)
            .ok_or_else(|| Error::Config(format!("invalid retention horizon: {:?}", s)))?;

        if &caps[1] == "+" {
            return Err(Error::Config(format!(
                "retention horizon must point to the past: {:?}",
                s
            )));
        }

        let amount = caps[2]
            .parse::<u32>()
            .map_err(|_| Error::Config(format!("retention amount out of range: {:?}", s)))?;
        let unit = match &caps[3] {
            "minute" => HorizonUnit::Minute,
            "hour" => HorizonUnit::Hour,
            "day" => HorizonUnit::Day,
            "week" => HorizonUnit::Week,
            "month" => HorizonUnit::Month,
            _ => HorizonUnit::Year,
        };

        Ok(Self { amount, unit })
    }
}

impl fmt::Display for RetentionHorizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let plural = if self.amount == 1 { "" } else { "s" };
        write!(f, "-{} {}{}", self.amount, self.unit.as_str(), plural)
    }
}
