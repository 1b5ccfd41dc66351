//! Five-field cron schedules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::QueueError;

/// A pre-parsed recurrence in standard five-field cron syntax
/// (`minute hour day-of-month month day-of-week`).
///
/// Day-of-week follows the usual convention: 0 and 7 are Sunday. When both
/// day-of-month and day-of-week are restricted, a day matching either fires.
#[derive(Debug, Clone)]
pub struct Schedule {
    expr: String,
    /// One schedule, or two whose union is the recurrence.
    inner: Vec<cron::Schedule>,
}

impl Schedule {
    pub fn parse(expr: &str) -> Result<Self, QueueError> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(QueueError::invalid_schedule(
                expr,
                format!("expected 5 fields, got {}", fields.len()),
            ));
        }
        let (minute, hour, dom, month) = (fields[0], fields[1], fields[2], fields[3]);

        let dow = translate_day_of_week(fields[4])
            .ok_or_else(|| QueueError::invalid_schedule(expr, "bad day-of-week field"))?;

        // The cron crate wants seconds first and ANDs the two day fields.
        let build = |dom: &str, dow: &str| {
            cron::Schedule::from_str(&format!("0 {minute} {hour} {dom} {month} {dow}"))
                .map_err(|e| QueueError::invalid_schedule(expr, e.to_string()))
        };
        let inner = if is_restricted(dom) && is_restricted(fields[4]) {
            vec![build(dom, "*")?, build("*", &dow)?]
        } else {
            vec![build(dom, &dow)?]
        };

        if inner.iter().all(|s| s.upcoming(Utc).next().is_none()) {
            return Err(QueueError::invalid_schedule(expr, "schedule never fires"));
        }

        Ok(Self {
            expr: fields.join(" "),
            inner,
        })
    }

    /// First fire time strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.inner
            .iter()
            .filter_map(|s| s.after(&after).next())
            .min()
    }

    pub fn as_str(&self) -> &str {
        &self.expr
    }
}

fn is_restricted(field: &str) -> bool {
    !(field.starts_with('*') || field == "?")
}

/// Map 0-7 (Sunday = 0 or 7) onto the cron crate's 1-7 (Sunday = 1).
///
/// Numeric items are expanded to explicit days first, so ranges and steps
/// that reach 7 keep their Sunday.
fn translate_day_of_week(field: &str) -> Option<String> {
    if field == "*" || field == "?" || field.chars().any(|c| c.is_ascii_alphabetic()) {
        return Some(field.to_string());
    }

    let mut days = [false; 7];
    for item in field.split(',') {
        let (range, step) = match item.split_once('/') {
            Some((r, s)) => (r, s.parse::<u32>().ok().filter(|s| *s > 0)?),
            None => (item, 1),
        };
        let (lo, hi) = match range {
            "*" => (0, 6),
            _ => match range.split_once('-') {
                Some((lo, hi)) => (lo.parse::<u32>().ok()?, hi.parse::<u32>().ok()?),
                // "n/step" runs from n to the end of the week.
                None if item.contains('/') => (range.parse::<u32>().ok()?, 7),
                None => {
                    let day = range.parse::<u32>().ok()?;
                    (day, day)
                }
            },
        };
        if lo > 7 || hi > 7 || lo > hi {
            return None;
        }
        for day in (lo..=hi).step_by(step as usize) {
            days[(day % 7) as usize] = true;
        }
    }

    let out: Vec<String> = days
        .iter()
        .enumerate()
        .filter(|(_, on)| **on)
        .map(|(day, _)| (day + 1).to_string())
        .collect();
    Some(out.join(","))
}

impl FromStr for Schedule {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expr)
    }
}

impl PartialEq for Schedule {
    fn eq(&self, other: &Self) -> bool {
        self.expr == other.expr
    }
}

impl Eq for Schedule {}

impl Serialize for Schedule {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.expr)
    }
}

impl<'de> Deserialize<'de> for Schedule {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Schedule::parse(&s).map_err(serde::de::Error::custom)
    }
}
