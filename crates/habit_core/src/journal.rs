use chrono::{DateTime, Days, Months, NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};

use crate::period::Period;
use crate::streak::{self, StreakResult};

/// Daily journal streak with a one-day grace: a streak is still alive when the
/// latest entry is from yesterday, so writing later today keeps it going.
pub fn journal_streak<Tz: TimeZone>(entries: &[DateTime<Tz>], now: &DateTime<Tz>) -> StreakResult {
    let days = streak::period_keys(Period::Daily, entries, &now.timezone());
    let today = now.date_naive();

    let anchor = if days.contains(&today) {
        Some(today)
    } else {
        today.pred_opt().filter(|yesterday| days.contains(yesterday))
    };
    let current_streak = anchor
        .map(|day| streak::run_ending_at(Period::Daily, &days, day))
        .unwrap_or(0);

    StreakResult {
        current_streak,
        longest_streak: streak::longest_run(Period::Daily, &days).max(current_streak),
    }
}

/// A past date the journal resurfaces next to today's entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Lookback {
    DaysAgo(u32),
    MonthsAgo(u32),
    YearsAgo(u32),
}

pub const JOURNAL_LOOKBACKS: [Lookback; 11] = [
    Lookback::DaysAgo(1),
    Lookback::DaysAgo(2),
    Lookback::DaysAgo(3),
    Lookback::DaysAgo(4),
    Lookback::DaysAgo(5),
    Lookback::MonthsAgo(1),
    Lookback::YearsAgo(1),
    Lookback::YearsAgo(2),
    Lookback::YearsAgo(3),
    Lookback::YearsAgo(4),
    Lookback::YearsAgo(5),
];

impl Lookback {
    /// Target date; month arithmetic clamps to the end of shorter months.
    pub fn resolve(self, today: NaiveDate) -> Option<NaiveDate> {
        match self {
            Lookback::DaysAgo(days) => today.checked_sub_days(Days::new(u64::from(days))),
            Lookback::MonthsAgo(months) => today.checked_sub_months(Months::new(months)),
            Lookback::YearsAgo(years) => {
                today.checked_sub_months(Months::new(years.saturating_mul(12)))
            }
        }
    }

    pub fn label(self) -> String {
        match self {
            Lookback::DaysAgo(1) => "Yesterday".to_string(),
            Lookback::DaysAgo(days) => format!("{days} days ago"),
            Lookback::MonthsAgo(1) => "Last month".to_string(),
            Lookback::MonthsAgo(months) => format!("{months} months ago"),
            Lookback::YearsAgo(1) => "Last year".to_string(),
            Lookback::YearsAgo(years) => format!("{years} years ago"),
        }
    }
}

pub fn lookback_dates(today: NaiveDate) -> Vec<(Lookback, NaiveDate)> {
    JOURNAL_LOOKBACKS
        .into_iter()
        .filter_map(|lookback| lookback.resolve(today).map(|date| (lookback, date)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn grace_day_keeps_streak_alive() {
        let now = at(2024, 4, 11, 8);
        let entries: Vec<_> = (1..=10).map(|back| now - Duration::days(back)).collect();
        let result = journal_streak(&entries, &now);
        assert_eq!(result.current_streak, 10);
        assert_eq!(result.longest_streak, 10);
    }

    #[test]
    fn todays_entry_anchors_on_today() {
        let now = at(2024, 4, 11, 21);
        let entries = [at(2024, 4, 11, 20), at(2024, 4, 10, 22), at(2024, 4, 8, 7)];
        let result = journal_streak(&entries, &now);
        assert_eq!(result.current_streak, 2);
        assert_eq!(result.longest_streak, 2);
    }

    #[test]
    fn two_missed_days_break_the_streak() {
        let now = at(2024, 4, 11, 8);
        let entries = [at(2024, 4, 9, 8), at(2024, 4, 8, 8), at(2024, 4, 7, 8)];
        let result = journal_streak(&entries, &now);
        assert_eq!(result.current_streak, 0);
        assert_eq!(result.longest_streak, 3);
    }

    #[test]
    fn no_entries_means_no_streak() {
        assert_eq!(
            journal_streak::<Utc>(&[], &at(2024, 4, 11, 8)),
            StreakResult::default()
        );
    }

    #[test]
    fn lookbacks_clamp_to_month_end() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        let dates = lookback_dates(today);
        assert_eq!(dates.len(), JOURNAL_LOOKBACKS.len());
        assert_eq!(dates[0], (Lookback::DaysAgo(1), NaiveDate::from_ymd_opt(2024, 3, 30).unwrap()));
        assert_eq!(dates[5], (Lookback::MonthsAgo(1), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()));
    }

    #[test]
    fn leap_day_lookback_lands_on_february_28() {
        let today = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(
            Lookback::YearsAgo(1).resolve(today),
            NaiveDate::from_ymd_opt(2023, 2, 28)
        );
        assert_eq!(
            Lookback::YearsAgo(4).resolve(today),
            NaiveDate::from_ymd_opt(2020, 2, 29)
        );
    }

    #[test]
    fn labels_read_naturally() {
        assert_eq!(Lookback::DaysAgo(1).label(), "Yesterday");
        assert_eq!(Lookback::DaysAgo(3).label(), "3 days ago");
        assert_eq!(Lookback::YearsAgo(2).label(), "2 years ago");
    }
}
