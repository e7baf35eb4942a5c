//! Observations and the arithmetic shared by every source

use crate::core::indicator::Periodicity;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Marker providers use for a period with no published value.
pub const NOT_AVAILABLE: &str = "N/E";

/// A single reported data point, kept as the provider sent it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub date: String,
    pub value: String,
}

impl Observation {
    pub fn new(date: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            value: value.into(),
        }
    }

    pub fn is_valid(&self) -> bool {
        let raw = self.value.trim();
        !raw.is_empty() && !raw.eq_ignore_ascii_case(NOT_AVAILABLE)
    }

    pub fn numeric(&self) -> Option<f64> {
        parse_value(&self.value)
    }
}

/// Latest reading for an indicator as produced by a source client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestReading {
    pub latest: Observation,
    pub previous: Option<Observation>,
    /// Percent change from `previous` to `latest`.
    pub variation: Option<f64>,
    pub title: Option<String>,
}

impl LatestReading {
    /// Builds a reading from an ordered sequence, skipping sentinel values.
    /// Returns `None` when no valid observation exists.
    pub fn from_series(
        observations: &[Observation],
        periodicity: Periodicity,
        title: Option<String>,
    ) -> Option<Self> {
        let valid: Vec<&Observation> = observations.iter().filter(|o| o.is_valid()).collect();
        let latest = *valid.last()?;
        let periodicity = match periodicity {
            Periodicity::Unknown => Periodicity::infer_from_date(&latest.date),
            p => p,
        };
        let previous = select_previous(&valid, periodicity).cloned();
        let variation = previous.as_ref().and_then(|p| variation(latest, p));

        Some(LatestReading {
            latest: latest.clone(),
            previous,
            variation,
            title,
        })
    }
}

/// Inclusive date range for historical requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> anyhow::Result<Self> {
        if start > end {
            anyhow::bail!("Start date {} is after end date {}", start, end);
        }
        Ok(Self { start, end })
    }

    /// The `days` days up to and including `end`.
    pub fn trailing_days(end: NaiveDate, days: i64) -> Self {
        Self {
            start: end - chrono::Duration::days(days),
            end,
        }
    }
}

/// Returns the most recent observation whose value is not the sentinel.
pub fn latest_valid_observation(observations: &[Observation]) -> Option<&Observation> {
    observations.iter().rev().find(|o| o.is_valid())
}

/// Picks the observation to compare the latest one against.
///
/// `valid` must already be free of sentinel values and ordered oldest first.
/// Sub-monthly series use the second-to-last point. Monthly and fortnightly
/// series use the point 13 positions back when there are enough, otherwise
/// the oldest one.
pub fn select_previous<'a>(
    valid: &[&'a Observation],
    periodicity: Periodicity,
) -> Option<&'a Observation> {
    let len = valid.len();
    if len < 2 {
        return None;
    }
    if periodicity.compares_year_over_year() {
        if len >= 13 {
            return Some(valid[len - 13]);
        }
        return Some(valid[0]);
    }
    Some(valid[len - 2])
}

/// Percent change between two observations, `None` when either is not
/// numeric or the previous value is zero.
pub fn variation(latest: &Observation, previous: &Observation) -> Option<f64> {
    let current = latest.numeric()?;
    let prior = previous.numeric()?;
    percent_change(current, prior)
}

pub fn percent_change(current: f64, prior: f64) -> Option<f64> {
    if prior == 0.0 {
        return None;
    }
    Some((current - prior) / prior * 100.0)
}

/// Parses a provider value into a number.
///
/// Handles decimal commas (`18,25`), thousands separators (`1,234.50`,
/// `1.234,50`, `1,234,567`) and strips anything that is not a digit, sign or
/// separator. The sentinel and empty strings yield `None`.
pub fn parse_value(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(NOT_AVAILABLE) {
        return None;
    }
    let cleaned: String = trimmed
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-'))
        .collect();

    let last_dot = cleaned.rfind('.');
    let last_comma = cleaned.rfind(',');
    let normalized = match (last_dot, last_comma) {
        (Some(dot), Some(comma)) if comma > dot => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (None, Some(_)) if cleaned.matches(',').count() > 1 => cleaned.replace(',', ""),
        (None, Some(_)) => cleaned.replace(',', "."),
        _ => cleaned,
    };

    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}
