use std::collections::BTreeMap;

use chrono::{DateTime, Days, NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};

use crate::error::{StatsError, StatsResult};
use crate::period;

/// Lookback used by the dashboard heatmap: the anchor day plus 364 days before it.
pub const DEFAULT_WINDOW_DAYS: u32 = 364;
pub const MAX_WINDOW_DAYS: u32 = 3_660;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActivityBucket {
    pub date: NaiveDate,
    pub count: u32,
}

/// One cell of the Sunday-first calendar grid.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HeatmapCell {
    /// Before the window start, shown only to align the first week.
    Padding { date: NaiveDate },
    Day(ActivityBucket),
    /// After the anchor day.
    Future { date: NaiveDate },
}

impl HeatmapCell {
    pub fn date(&self) -> NaiveDate {
        match self {
            HeatmapCell::Padding { date } | HeatmapCell::Future { date } => *date,
            HeatmapCell::Day(bucket) => bucket.date,
        }
    }

    pub fn count(&self) -> u32 {
        match self {
            HeatmapCell::Day(bucket) => bucket.count,
            _ => 0,
        }
    }
}

pub type HeatmapWeek = [HeatmapCell; 7];

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActivitySummary {
    pub days: u32,
    pub active_days: u32,
    pub total_events: u64,
}

/// Per-day event counts over `[anchor - window_days, anchor]`, ascending and
/// zero-filled. Events are bucketed by their calendar date in the anchor's
/// time zone; events outside the window are dropped.
pub fn aggregate<Tz: TimeZone>(
    events: &[DateTime<Tz>],
    window_days: u32,
    anchor: &DateTime<Tz>,
) -> StatsResult<Vec<ActivityBucket>> {
    let tz = anchor.timezone();
    aggregate_counts(
        events
            .iter()
            .map(|event| (event.with_timezone(&tz).date_naive(), 1)),
        window_days,
        anchor.date_naive(),
    )
}

/// Same as [`aggregate`] for counts that were already reduced per day.
/// Repeated dates are summed.
pub fn aggregate_counts(
    counts: impl IntoIterator<Item = (NaiveDate, u32)>,
    window_days: u32,
    anchor: NaiveDate,
) -> StatsResult<Vec<ActivityBucket>> {
    let start = window_start(window_days, anchor)?;
    let mut per_day: BTreeMap<NaiveDate, u32> = BTreeMap::new();
    for (date, count) in counts {
        if date < start || date > anchor {
            continue;
        }
        let slot = per_day.entry(date).or_default();
        *slot = slot.saturating_add(count);
    }

    Ok(start
        .iter_days()
        .take_while(|date| *date <= anchor)
        .map(|date| ActivityBucket {
            date,
            count: per_day.get(&date).copied().unwrap_or(0),
        })
        .collect())
}

fn window_start(window_days: u32, anchor: NaiveDate) -> StatsResult<NaiveDate> {
    if window_days > MAX_WINDOW_DAYS {
        return Err(StatsError::InvalidWindow(window_days));
    }
    anchor
        .checked_sub_days(Days::new(u64::from(window_days)))
        .ok_or(StatsError::InvalidWindow(window_days))
}

/// Lay linear buckets out as Sunday-first weeks. The first week starts on the
/// Sunday on or before the first bucket; the last week is completed with
/// future cells.
pub fn heatmap_grid(buckets: &[ActivityBucket]) -> Vec<HeatmapWeek> {
    let (Some(first), Some(last)) = (buckets.first(), buckets.last()) else {
        return Vec::new();
    };
    let (first, last) = (first.date, last.date);
    let mut per_day: BTreeMap<NaiveDate, u32> = BTreeMap::new();
    for bucket in buckets {
        let slot = per_day.entry(bucket.date).or_default();
        *slot = slot.saturating_add(bucket.count);
    }

    let mut weeks = Vec::new();
    let mut week_start = period::week_start(first);
    while week_start <= last {
        let week: HeatmapWeek = std::array::from_fn(|offset| {
            let date = week_start + Days::new(offset as u64);
            if date < first {
                HeatmapCell::Padding { date }
            } else if date > last {
                HeatmapCell::Future { date }
            } else {
                let count = per_day.get(&date).copied().unwrap_or(0);
                HeatmapCell::Day(ActivityBucket { date, count })
            }
        });
        weeks.push(week);
        week_start = week_start + Days::new(7);
    }
    weeks
}

/// Convenience wrapper producing the grid straight from raw events.
pub fn heatmap<Tz: TimeZone>(
    events: &[DateTime<Tz>],
    window_days: u32,
    anchor: &DateTime<Tz>,
) -> StatsResult<Vec<HeatmapWeek>> {
    Ok(heatmap_grid(&aggregate(events, window_days, anchor)?))
}

/// Heatmap intensity from 0 (no activity) to 4.
pub fn activity_level(count: u32) -> u8 {
    match count {
        0 => 0,
        1 => 1,
        2..=3 => 2,
        4..=5 => 3,
        _ => 4,
    }
}

pub fn summarize(buckets: &[ActivityBucket]) -> ActivitySummary {
    ActivitySummary {
        days: buckets.len() as u32,
        active_days: buckets.iter().filter(|bucket| bucket.count > 0).count() as u32,
        total_events: buckets.iter().map(|bucket| u64::from(bucket.count)).sum(),
    }
}
