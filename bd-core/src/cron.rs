//! Cron evaluation helpers for schedule triggers.
//!
//! Expressions use the `cron` crate's seven-field syntax (seconds
//! first). Validation happens at schedule create/update time so a bad
//! expression or an overly aggressive cadence is rejected before it ever
//! reaches the poll loop.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;

/// Floor on how often a schedule may fire.
pub const MIN_INTERVAL_SECONDS: i64 = 300;

/// Next fire time strictly after `after`, or `None` for expressions with
/// no future occurrence.
pub fn next_run_after(expression: &str, after: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
    let schedule = parse(expression)?;
    Ok(schedule.after(&after).next())
}

pub fn is_valid_expression(expression: &str) -> bool {
    parse(expression).is_ok()
}

/// Validates syntax and enforces the minimum-interval policy by probing
/// consecutive upcoming fire times.
pub fn validate_schedule_expression(expression: &str, min_interval_seconds: i64) -> Result<()> {
    let schedule = parse(expression)?;

    let mut upcoming = schedule.after(&Utc::now());
    let Some(mut previous) = upcoming.next() else {
        return Err(Error::InvalidInput(format!(
            "cron expression {expression:?} never fires"
        )));
    };
    // A handful of consecutive occurrences is enough to catch per-minute
    // and per-second cadences without walking the whole year.
    for _ in 0..4 {
        let Some(next) = upcoming.next() else {
            break;
        };
        let gap = (next - previous).num_seconds();
        if gap < min_interval_seconds {
            return Err(Error::InvalidInput(format!(
                "cron expression {expression:?} fires every {gap}s; minimum interval is {min_interval_seconds}s"
            )));
        }
        previous = next;
    }
    Ok(())
}

fn parse(expression: &str) -> Result<Schedule> {
    let expression = expression.trim();
    if expression.is_empty() {
        return Err(Error::InvalidInput(
            "cron expression must not be empty".to_string(),
        ));
    }
    Schedule::from_str(expression)
        .map_err(|e| Error::InvalidInput(format!("invalid cron expression {expression:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_run_is_strictly_after() {
        let after = Utc::now();
        let next = next_run_after("0 0 * * * *", after)
            .expect("valid expression")
            .expect("has next run");
        assert!(next > after);
    }

    #[test]
    fn rejects_malformed_expressions() {
        assert!(next_run_after("not a cron", Utc::now()).is_err());
        assert!(!is_valid_expression(""));
        assert!(is_valid_expression("0 0 9 * * Mon"));
    }

    #[test]
    fn minimum_interval_floor_is_enforced() {
        // Every minute: below the 5 minute floor.
        let err = validate_schedule_expression("0 * * * * *", MIN_INTERVAL_SECONDS)
            .expect_err("per-minute cadence should be rejected");
        assert!(err.to_string().contains("minimum interval"));

        // Every 10 minutes: fine.
        validate_schedule_expression("0 */10 * * * *", MIN_INTERVAL_SECONDS)
            .expect("10 minute cadence is allowed");
    }
}
