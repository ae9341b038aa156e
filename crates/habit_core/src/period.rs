use std::fmt;
use std::str::FromStr;

use chrono::{
    DateTime, Datelike, Days, Duration, LocalResult, Months, NaiveDate, NaiveDateTime, NaiveTime,
    TimeZone,
};
use serde::{Deserialize, Serialize};

use crate::error::StatsError;

/// Recurrence granularity of a habit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Daily,
    Weekly,
    Monthly,
}

impl Period {
    pub const ALL: [Period; 3] = [Period::Daily, Period::Weekly, Period::Monthly];

    pub fn as_str(self) -> &'static str {
        match self {
            Period::Daily => "daily",
            Period::Weekly => "weekly",
            Period::Monthly => "monthly",
        }
    }

    /// Singular unit noun used in streak labels.
    pub fn unit(self) -> &'static str {
        match self {
            Period::Daily => "day",
            Period::Weekly => "week",
            Period::Monthly => "month",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = StatsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        Period::ALL
            .into_iter()
            .find(|period| normalized.eq_ignore_ascii_case(period.as_str()))
            .ok_or_else(|| StatsError::InvalidPeriod(value.to_string()))
    }
}

/// Calendar date on which the period containing `instant` starts, in the
/// instant's own time zone. Two instants share a period iff their keys match.
pub fn period_key<Tz: TimeZone>(period: Period, instant: &DateTime<Tz>) -> NaiveDate {
    key_for_date(period, instant.date_naive())
}

pub fn key_for_date(period: Period, date: NaiveDate) -> NaiveDate {
    match period {
        Period::Daily => date,
        Period::Weekly => week_start(date),
        Period::Monthly => date - Days::new(u64::from(date.day0())),
    }
}

/// Sunday starting the week that contains `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Days::new(u64::from(date.weekday().num_days_from_sunday()))
}

/// Key of the period immediately following the one keyed by `key`.
pub fn next_key(period: Period, key: NaiveDate) -> NaiveDate {
    match period {
        Period::Daily => key + Days::new(1),
        Period::Weekly => key + Days::new(7),
        Period::Monthly => key + Months::new(1),
    }
}

pub fn previous_key(period: Period, key: NaiveDate) -> NaiveDate {
    match period {
        Period::Daily => key - Days::new(1),
        Period::Weekly => key - Days::new(7),
        Period::Monthly => key - Months::new(1),
    }
}

pub fn keys_are_consecutive(period: Period, earlier: NaiveDate, later: NaiveDate) -> bool {
    next_key(period, earlier) == later
}

pub fn start_of_period<Tz: TimeZone>(period: Period, reference: &DateTime<Tz>) -> DateTime<Tz> {
    start_of_day(&reference.timezone(), period_key(period, reference))
}

/// Last representable millisecond of the period containing `reference`.
pub fn end_of_period<Tz: TimeZone>(period: Period, reference: &DateTime<Tz>) -> DateTime<Tz> {
    let following = next_key(period, period_key(period, reference));
    start_of_day(&reference.timezone(), following) - Duration::milliseconds(1)
}

pub fn contains<Tz: TimeZone>(period: Period, reference: &DateTime<Tz>, instant: &DateTime<Tz>) -> bool {
    let start = start_of_period(period, reference);
    let end = end_of_period(period, reference);
    *instant >= start && *instant <= end
}

/// Whether `later` falls in the period right after the one containing `earlier`.
/// Judged on local calendar dates, so DST shifts never break a run.
pub fn is_consecutive_period<Tz: TimeZone>(
    period: Period,
    earlier: &DateTime<Tz>,
    later: &DateTime<Tz>,
) -> bool {
    keys_are_consecutive(period, period_key(period, earlier), period_key(period, later))
}

/// First instant of `date` in `tz`. When a DST gap swallows midnight the first
/// valid local time of that day is returned instead.
pub fn start_of_day<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> DateTime<Tz> {
    let midnight = date.and_time(NaiveTime::MIN);
    match tz.from_local_datetime(&midnight) {
        LocalResult::Single(instant) => instant,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => first_valid_after(tz, midnight),
    }
}

fn first_valid_after<Tz: TimeZone>(tz: &Tz, local: NaiveDateTime) -> DateTime<Tz> {
    let mut probe = local;
    for _ in 0..(24 * 4) {
        probe += Duration::minutes(15);
        if let Some(instant) = tz.from_local_datetime(&probe).earliest() {
            return instant;
        }
    }
    tz.from_utc_datetime(&local)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn parses_known_periods_case_insensitively() {
        assert_eq!("daily".parse::<Period>().unwrap(), Period::Daily);
        assert_eq!(" Weekly ".parse::<Period>().unwrap(), Period::Weekly);
        assert_eq!("MONTHLY".parse::<Period>().unwrap(), Period::Monthly);
    }

    #[test]
    fn rejects_unknown_period() {
        let err = "yearly".parse::<Period>().unwrap_err();
        assert_eq!(err, StatsError::InvalidPeriod("yearly".to_string()));
    }

    #[test]
    fn daily_bounds_cover_the_whole_day() {
        let reference = utc(2024, 5, 14, 15, 42);
        assert_eq!(start_of_period(Period::Daily, &reference), utc(2024, 5, 14, 0, 0));
        assert_eq!(
            end_of_period(Period::Daily, &reference),
            Utc.with_ymd_and_hms(2024, 5, 14, 23, 59, 59).unwrap() + Duration::milliseconds(999)
        );
    }

    #[test]
    fn weekly_bounds_run_sunday_to_saturday() {
        // 2024-05-15 is a Wednesday.
        let reference = utc(2024, 5, 15, 8, 0);
        assert_eq!(start_of_period(Period::Weekly, &reference), utc(2024, 5, 12, 0, 0));
        let end = end_of_period(Period::Weekly, &reference);
        assert_eq!(end.date_naive(), NaiveDate::from_ymd_opt(2024, 5, 18).unwrap());
        assert_eq!(end + Duration::milliseconds(1), utc(2024, 5, 19, 0, 0));
    }

    #[test]
    fn sunday_starts_its_own_week() {
        let sunday = utc(2024, 5, 12, 0, 0);
        assert_eq!(start_of_period(Period::Weekly, &sunday), sunday);
    }

    #[test]
    fn monthly_end_handles_leap_february() {
        let reference = utc(2024, 2, 10, 12, 0);
        assert_eq!(start_of_period(Period::Monthly, &reference), utc(2024, 2, 1, 0, 0));
        let end = end_of_period(Period::Monthly, &reference);
        assert_eq!(end.date_naive(), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
    }

    #[test]
    fn bounds_follow_the_reference_offset() {
        let tz = FixedOffset::east_opt(9 * 3600).unwrap();
        // 2024-03-31 20:00 UTC is already April 1st in UTC+9.
        let reference = utc(2024, 3, 31, 20, 0).with_timezone(&tz);
        let start = start_of_period(Period::Monthly, &reference);
        assert_eq!(start.date_naive(), NaiveDate::from_ymd_opt(2024, 4, 1).unwrap());
        assert_eq!(start.with_timezone(&Utc), utc(2024, 3, 31, 15, 0));
    }

    #[test]
    fn reference_lies_within_its_period_for_every_period() {
        let mut instant = utc(2023, 12, 20, 0, 0);
        let stop = utc(2024, 3, 10, 0, 0);
        while instant < stop {
            for period in Period::ALL {
                assert!(start_of_period(period, &instant) <= instant);
                assert!(instant <= end_of_period(period, &instant));
                assert!(contains(period, &instant, &instant));
            }
            instant += Duration::minutes(337);
        }
    }

    #[test]
    fn consecutive_days_ignore_elapsed_time() {
        let late = utc(2024, 1, 1, 23, 59);
        let early = utc(2024, 1, 2, 0, 1);
        assert!(is_consecutive_period(Period::Daily, &late, &early));
        let two_days = utc(2024, 1, 3, 0, 0);
        assert!(!is_consecutive_period(Period::Daily, &late, &two_days));
        assert!(!is_consecutive_period(Period::Daily, &early, &late));
    }

    #[test]
    fn consecutive_weeks_compare_sunday_starts() {
        let saturday = utc(2024, 5, 18, 22, 0);
        let next_sunday = utc(2024, 5, 19, 1, 0);
        let next_saturday = utc(2024, 5, 25, 1, 0);
        let two_weeks_on = utc(2024, 5, 26, 1, 0);
        assert!(is_consecutive_period(Period::Weekly, &saturday, &next_sunday));
        assert!(is_consecutive_period(Period::Weekly, &saturday, &next_saturday));
        assert!(!is_consecutive_period(Period::Weekly, &saturday, &two_weeks_on));
        assert!(!is_consecutive_period(Period::Weekly, &next_sunday, &next_saturday));
    }

    #[test]
    fn consecutive_months_span_year_boundary() {
        let december = utc(2023, 12, 15, 9, 0);
        let january = utc(2024, 1, 15, 9, 0);
        assert!(is_consecutive_period(Period::Monthly, &december, &january));

        let january_next_year = utc(2025, 1, 15, 9, 0);
        assert!(!is_consecutive_period(Period::Monthly, &december, &january_next_year));
        assert!(!is_consecutive_period(Period::Monthly, &january, &december));
    }
}
