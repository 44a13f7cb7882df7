//! Frequency-based interval strategy.
//!
//! Reads `frequency` and the optional `endDate` from the recipe configuration.

use chrono::{DateTime, Months, Utc};
use serde_json::Value;
use std::str::FromStr;

use autosign_core::error::{AutosignError, Result};
use autosign_core::traits::IntervalStrategy;
use autosign_core::types::Policy;

pub const FREQUENCY_KEY: &str = "frequency";
pub const END_DATE_KEY: &str = "endDate";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    OneTime,
    Minutely,
    Hourly,
    Daily,
    Weekly,
    BiWeekly,
    Monthly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::OneTime => "one-time",
            Frequency::Minutely => "minutely",
            Frequency::Hourly => "hourly",
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::BiWeekly => "bi-weekly",
            Frequency::Monthly => "monthly",
        }
    }

    /// Next run measured from `now`; `None` for one-time.
    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Frequency::OneTime => None,
            Frequency::Minutely => now.checked_add_signed(chrono::Duration::minutes(1)),
            Frequency::Hourly => now.checked_add_signed(chrono::Duration::hours(1)),
            Frequency::Daily => now.checked_add_signed(chrono::Duration::days(1)),
            Frequency::Weekly => now.checked_add_signed(chrono::Duration::days(7)),
            Frequency::BiWeekly => now.checked_add_signed(chrono::Duration::days(14)),
            Frequency::Monthly => now.checked_add_months(Months::new(1)),
        }
    }
}

impl FromStr for Frequency {
    type Err = AutosignError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "one-time" => Ok(Frequency::OneTime),
            "minutely" => Ok(Frequency::Minutely),
            "hourly" => Ok(Frequency::Hourly),
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            "bi-weekly" => Ok(Frequency::BiWeekly),
            "monthly" => Ok(Frequency::Monthly),
            other => Err(AutosignError::Recipe(format!("unknown frequency '{other}'"))),
        }
    }
}

/// Default [`IntervalStrategy`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FrequencyInterval;

impl IntervalStrategy for FrequencyInterval {
    fn from_now_when_next(&self, policy: &Policy, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
        let recipe = policy.recipe()?;
        let config = recipe
            .configuration
            .as_ref()
            .ok_or_else(|| AutosignError::Recipe("recipe has no configuration".into()))?;

        let raw_frequency = config
            .get(FREQUENCY_KEY)
            .ok_or_else(|| AutosignError::Recipe(format!("'{FREQUENCY_KEY}' is missing")))?
            .as_str()
            .ok_or_else(|| AutosignError::Recipe(format!("'{FREQUENCY_KEY}' must be a string")))?;

        // The single run of a one-time policy happens at activation.
        if raw_frequency == Frequency::OneTime.as_str() {
            return Ok(None);
        }

        let end_date = match config.get(END_DATE_KEY) {
            None | Some(Value::Null) => None,
            Some(v) => Some(parse_end_date(v)?),
        };
        if let Some(end) = end_date
            && end < now
        {
            return Ok(None);
        }

        let frequency: Frequency = raw_frequency.parse()?;
        let next = frequency
            .next_after(now)
            .ok_or_else(|| AutosignError::Recipe(format!("next run after {now} is out of range")))?;

        match end_date {
            Some(end) if next > end => Ok(None),
            _ => Ok(Some(next)),
        }
    }
}

/// RFC3339 string, or Unix milliseconds as a number or numeric string.
pub fn parse_end_date(value: &Value) -> Result<DateTime<Utc>> {
    let millis = match value {
        Value::String(s) => {
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Ok(dt.with_timezone(&Utc));
            }
            s.trim()
                .parse::<i64>()
                .map_err(|_| AutosignError::Recipe(format!("malformed {END_DATE_KEY} '{s}'")))?
        }
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| AutosignError::Recipe(format!("malformed {END_DATE_KEY} {n}")))?,
        other => {
            return Err(AutosignError::Recipe(format!(
                "{END_DATE_KEY} must be a string or number, got {other}"
            )));
        }
    };
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| AutosignError::Recipe(format!("{END_DATE_KEY} {millis} is out of range")))
}
