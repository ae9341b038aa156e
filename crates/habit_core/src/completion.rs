use std::fmt;

use chrono::{DateTime, Datelike, TimeZone};
use serde::{Deserialize, Serialize};

use crate::period::Period;
use crate::streak;

/// Ratio of distinct completed periods to periods expected since creation.
///
/// Not clamped: a habit created late in a period and completed in both that
/// period and the next one reports a ratio above 1.0.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompletionRate {
    pub completed: u32,
    pub expected: u32,
}

impl CompletionRate {
    pub fn ratio(&self) -> f64 {
        f64::from(self.completed) / f64::from(self.expected.max(1))
    }

    pub fn percent(&self) -> f64 {
        self.ratio() * 100.0
    }
}

impl fmt::Display for CompletionRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.0}%", self.percent())
    }
}

/// Number of periods a habit should have been completed in since creation.
/// Always at least one.
pub fn expected_occurrences<Tz: TimeZone>(
    period: Period,
    created_at: &DateTime<Tz>,
    now: &DateTime<Tz>,
) -> u32 {
    let created = created_at.with_timezone(&now.timezone()).date_naive();
    let today = now.date_naive();
    let expected = match period {
        Period::Daily => (today - created).num_days(),
        Period::Weekly => {
            let days = (today - created).num_days();
            if days <= 0 {
                0
            } else {
                (days + 6) / 7
            }
        }
        Period::Monthly => {
            i64::from(today.month() as i32 - created.month() as i32)
                + 12 * i64::from(today.year() - created.year())
        }
    };
    u32::try_from(expected.max(1)).unwrap_or(u32::MAX)
}

/// Completion rate over the habit's lifetime, counting at most one completion
/// per period.
pub fn completion_rate<Tz: TimeZone>(
    period: Period,
    created_at: &DateTime<Tz>,
    completions: &[DateTime<Tz>],
    now: &DateTime<Tz>,
) -> CompletionRate {
    let completed = streak::canonical_completions(period, completions, &now.timezone()).len();
    CompletionRate {
        completed: u32::try_from(completed).unwrap_or(u32::MAX),
        expected: expected_occurrences(period, created_at, now),
    }
}
