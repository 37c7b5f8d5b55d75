//! Cron expression arithmetic.
//!
//! A single pure function: evaluate an expression in a timezone and return
//! the next fire time after a reference instant. The scheduler never touches
//! the cron grammar directly.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule as CronSchedule;

use crate::StoreError;

/// Compute the next fire time of `expr` strictly after `after`, evaluated in
/// `timezone` (UTC when unset).
///
/// Fails with `InvalidSchedule` when the expression does not parse or has no
/// remaining occurrence, and `InvalidTimezone` when the zone name is
/// unresolvable.
pub fn next_fire(
    expr: &str,
    after: DateTime<Utc>,
    timezone: Option<&str>,
) -> Result<DateTime<Utc>, StoreError> {
    let tz: Tz = match timezone {
        Some(name) => name
            .parse()
            .map_err(|_| StoreError::InvalidTimezone(name.to_string()))?,
        None => chrono_tz::UTC,
    };

    let schedule = CronSchedule::from_str(&normalize(expr))
        .map_err(|_| StoreError::InvalidSchedule(expr.to_string()))?;

    schedule
        .after(&after.with_timezone(&tz))
        .next()
        .map(|t| t.with_timezone(&Utc))
        .ok_or_else(|| StoreError::InvalidSchedule(expr.to_string()))
}

/// The cron grammar here includes a leading seconds field; operators write
/// classic five-field expressions, so prepend a zero-seconds field to those.
fn normalize(expr: &str) -> String {
    if expr.split_whitespace().count() == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    }
}
