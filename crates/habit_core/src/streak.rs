use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};

use crate::period::{self, Period};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreakResult {
    pub current_streak: u32,
    pub longest_streak: u32,
}

/// Reduce completions to one per period, keeping the earliest of each period.
/// Periods are judged in `tz` and the output is ascending, converted into
/// `tz`, regardless of input order.
pub fn canonical_completions<Tz: TimeZone>(
    period: Period,
    completions: &[DateTime<Tz>],
    tz: &Tz,
) -> Vec<DateTime<Tz>> {
    let mut sorted: Vec<DateTime<Tz>> = completions
        .iter()
        .map(|completion| completion.with_timezone(tz))
        .collect();
    sorted.sort();
    let mut canonical: Vec<DateTime<Tz>> = Vec::with_capacity(sorted.len());
    let mut last_key: Option<NaiveDate> = None;
    for completion in sorted {
        let key = period::period_key(period, &completion);
        if last_key != Some(key) {
            last_key = Some(key);
            canonical.push(completion);
        }
    }
    canonical
}

/// Distinct period keys of `completions`, judged in the time zone `tz`.
pub fn period_keys<Tz: TimeZone>(
    period: Period,
    completions: &[DateTime<Tz>],
    tz: &Tz,
) -> BTreeSet<NaiveDate> {
    completions
        .iter()
        .map(|completion| period::period_key(period, &completion.with_timezone(tz)))
        .collect()
}

/// Current and longest streak of a habit.
///
/// The current streak is alive only when the latest completion lies inside the
/// period containing `now`; it then extends backwards over consecutive periods.
pub fn compute_streak<Tz: TimeZone>(
    completions: &[DateTime<Tz>],
    period: Period,
    now: &DateTime<Tz>,
) -> StreakResult {
    let tz = now.timezone();
    let canonical = canonical_completions(period, completions, &tz);
    let Some(latest) = canonical.last() else {
        return StreakResult::default();
    };
    let keys = period_keys(period, &canonical, &tz);

    let current_streak = if period::contains(period, now, latest) {
        run_ending_at(period, &keys, period::period_key(period, latest))
    } else {
        0
    };

    StreakResult {
        current_streak,
        longest_streak: longest_run(period, &keys).max(current_streak),
    }
}

/// Number of consecutive keys ending at `anchor` (zero when `anchor` is absent).
pub(crate) fn run_ending_at(period: Period, keys: &BTreeSet<NaiveDate>, anchor: NaiveDate) -> u32 {
    let mut run = 0;
    let mut cursor = anchor;
    while keys.contains(&cursor) {
        run += 1;
        cursor = period::previous_key(period, cursor);
    }
    run
}

pub(crate) fn longest_run(period: Period, keys: &BTreeSet<NaiveDate>) -> u32 {
    let mut longest = 0;
    let mut running = 0;
    let mut previous: Option<NaiveDate> = None;
    for &key in keys {
        running = match previous {
            Some(prev) if period::keys_are_consecutive(period, prev, key) => running + 1,
            _ => 1,
        };
        longest = longest.max(running);
        previous = Some(key);
    }
    longest
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn empty_completions_yield_zero_for_every_period() {
        let now = at(2024, 1, 3, 12);
        for period in Period::ALL {
            assert_eq!(compute_streak(&[], period, &now), StreakResult::default());
        }
    }

    #[test]
    fn three_consecutive_days_ending_today() {
        let completions = [at(2024, 1, 3, 9), at(2024, 1, 2, 9), at(2024, 1, 1, 9)];
        let result = compute_streak(&completions, Period::Daily, &at(2024, 1, 3, 18));
        assert_eq!(
            result,
            StreakResult {
                current_streak: 3,
                longest_streak: 3
            }
        );
    }

    #[test]
    fn gap_resets_the_current_streak() {
        let completions = [at(2024, 1, 3, 9), at(2024, 1, 1, 9)];
        let result = compute_streak(&completions, Period::Daily, &at(2024, 1, 3, 18));
        assert_eq!(result.current_streak, 1);
        assert_eq!(result.longest_streak, 1);
    }

    #[test]
    fn stale_latest_completion_means_no_live_streak() {
        let completions = [at(2024, 1, 1, 9), at(2024, 1, 2, 9), at(2024, 1, 3, 9)];
        let result = compute_streak(&completions, Period::Daily, &at(2024, 1, 5, 8));
        assert_eq!(result.current_streak, 0);
        assert_eq!(result.longest_streak, 3);
    }

    #[test]
    fn caller_order_is_not_trusted() {
        let completions = [at(2024, 1, 2, 9), at(2024, 1, 3, 9), at(2024, 1, 1, 9)];
        let result = compute_streak(&completions, Period::Daily, &at(2024, 1, 3, 18));
        assert_eq!(result.current_streak, 3);
    }

    #[test]
    fn several_completions_in_one_period_count_once() {
        let completions = [
            at(2024, 1, 3, 7),
            at(2024, 1, 3, 21),
            at(2024, 1, 2, 8),
            at(2024, 1, 2, 9),
            at(2024, 1, 2, 10),
        ];
        let result = compute_streak(&completions, Period::Daily, &at(2024, 1, 3, 22));
        assert_eq!(result.current_streak, 2);
        assert_eq!(result.longest_streak, 2);
    }

    #[test]
    fn canonical_completions_keep_the_first_of_each_period() {
        let completions = [
            at(2024, 1, 10, 18),
            at(2024, 1, 8, 6),
            at(2024, 1, 9, 12),
            at(2024, 1, 15, 1),
        ];
        let canonical = canonical_completions(Period::Weekly, &completions, &Utc);
        // 2024-01-07 and 2024-01-14 are Sundays.
        assert_eq!(canonical, vec![at(2024, 1, 8, 6), at(2024, 1, 15, 1)]);
    }

    #[test]
    fn canonical_completions_bucket_in_the_given_zone() {
        use chrono::FixedOffset;
        let tokyo = FixedOffset::east_opt(9 * 3600).unwrap();
        let completions = [
            at(2024, 1, 2, 16).with_timezone(&tokyo),
            at(2024, 1, 2, 14).with_timezone(&tokyo),
        ];
        // In Tokyo 16:00Z is already Jan 3, so both survive; in UTC one day wins.
        assert_eq!(
            canonical_completions(Period::Daily, &completions, &tokyo).len(),
            2
        );
        let utc_offset = FixedOffset::east_opt(0).unwrap();
        let canonical = canonical_completions(Period::Daily, &completions, &utc_offset);
        assert_eq!(canonical, vec![at(2024, 1, 2, 14).with_timezone(&utc_offset)]);
    }

    #[test]
    fn longest_streak_survives_a_later_break() {
        let completions = [
            at(2024, 1, 1, 9),
            at(2024, 1, 2, 9),
            at(2024, 1, 3, 9),
            at(2024, 1, 4, 9),
            at(2024, 1, 8, 9),
            at(2024, 1, 9, 9),
        ];
        let result = compute_streak(&completions, Period::Daily, &at(2024, 1, 9, 20));
        assert_eq!(result.current_streak, 2);
        assert_eq!(result.longest_streak, 4);
    }

    #[test]
    fn weekly_streak_counts_sunday_aligned_weeks() {
        // Weeks starting 2024-01-07, 01-14 and 01-21.
        let completions = [at(2024, 1, 13, 9), at(2024, 1, 14, 9), at(2024, 1, 24, 9)];
        let result = compute_streak(&completions, Period::Weekly, &at(2024, 1, 27, 9));
        assert_eq!(result.current_streak, 3);
        assert_eq!(result.longest_streak, 3);
    }

    #[test]
    fn monthly_streak_crosses_the_new_year() {
        let completions = [at(2023, 11, 30, 9), at(2023, 12, 15, 9), at(2024, 1, 15, 9)];
        let result = compute_streak(&completions, Period::Monthly, &at(2024, 1, 31, 9));
        assert_eq!(result.current_streak, 3);
    }

    #[test]
    fn repeated_evaluation_is_stable() {
        let completions = [at(2024, 3, 1, 9), at(2024, 3, 2, 9), at(2024, 3, 4, 9)];
        let now = at(2024, 3, 4, 12);
        let first = compute_streak(&completions, Period::Daily, &now);
        let second = compute_streak(&completions, Period::Daily, &now);
        assert_eq!(first, second);
        assert!(first.longest_streak >= first.current_streak);
    }
}
