use std::collections::BTreeSet;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::activity::{self, ActivityBucket, ActivitySummary, HeatmapWeek};
use crate::completion::{self, CompletionRate};
use crate::error::StatsResult;
use crate::habit::{CompletionEvent, Habit, JournalEntry};
use crate::journal;
use crate::period::{self, Period};
use crate::records::RecordSet;
use crate::streak::{self, StreakResult};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HabitCounts {
    pub daily: usize,
    pub weekly: usize,
    pub monthly: usize,
    pub total: usize,
}

impl HabitCounts {
    pub fn from_habits(habits: &[Habit]) -> Self {
        let count = |period: Period| habits.iter().filter(|habit| habit.period == period).count();
        Self {
            daily: count(Period::Daily),
            weekly: count(Period::Weekly),
            monthly: count(Period::Monthly),
            total: habits.len(),
        }
    }
}

pub const TOP_TAG_LIMIT: usize = 5;
pub const ACTIVE_HABIT_DAYS: i64 = 7;

/// Totals of the habits page: habits, recently active habits, completions.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HabitOverview {
    pub total: usize,
    /// Distinct habits completed within the last seven days.
    pub active: usize,
    pub completed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsistentHabit {
    pub habit_id: String,
    pub title: String,
    pub rate: CompletionRate,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HabitStats {
    pub active_habits: usize,
    pub total_completions: usize,
    /// Mean of the per-habit ratios; may exceed 1.0.
    pub average_completion_rate: f64,
    pub longest_streak: u32,
    pub most_consistent: Option<ConsistentHabit>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HabitProgress {
    pub habit_id: String,
    pub title: String,
    pub period: Period,
    pub streak: StreakResult,
    pub rate: CompletionRate,
    pub completed_this_period: bool,
    pub last_completed_at: Option<DateTime<Utc>>,
    pub label: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct JournalStats {
    pub total_entries: usize,
    pub total_words: usize,
    pub current_streak: u32,
    pub longest_streak: u32,
}

/// Everything the dashboard shows for one user at one instant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Dashboard {
    pub as_of: NaiveDate,
    pub habit_counts: HabitCounts,
    pub overview: HabitOverview,
    pub top_tags: Vec<String>,
    pub habit_stats: HabitStats,
    pub habits: Vec<HabitProgress>,
    pub journal: JournalStats,
    pub activity: Vec<ActivityBucket>,
    pub activity_summary: ActivitySummary,
    pub heatmap: Vec<HeatmapWeek>,
}

/// `"3 days streak"`, `"1 week streak"`; empty when there is no streak.
pub fn streak_label(streak: u32, period: Period) -> String {
    match streak {
        0 => String::new(),
        1 => format!("1 {} streak", period.unit()),
        n => format!("{n} {}s streak", period.unit()),
    }
}

pub fn habit_progress<Tz: TimeZone>(
    habit: &Habit,
    completions: &[CompletionEvent],
    now: &DateTime<Tz>,
) -> HabitProgress {
    let tz = now.timezone();
    let times = habit.completion_times(completions, &tz);
    let created_at = habit.created_at.with_timezone(&tz);
    let streak = streak::compute_streak(&times, habit.period, now);

    HabitProgress {
        habit_id: habit.id.clone(),
        title: habit.title.clone(),
        period: habit.period,
        streak,
        rate: completion::completion_rate(habit.period, &created_at, &times, now),
        completed_this_period: times
            .iter()
            .any(|time| period::contains(habit.period, now, time)),
        last_completed_at: times.iter().max().map(|time| time.with_timezone(&Utc)),
        label: streak_label(streak.current_streak, habit.period),
    }
}

pub fn habit_stats<Tz: TimeZone>(
    habits: &[Habit],
    completions: &[CompletionEvent],
    now: &DateTime<Tz>,
) -> HabitStats {
    if habits.is_empty() {
        return HabitStats::default();
    }

    let progress: Vec<HabitProgress> = habits
        .iter()
        .map(|habit| habit_progress(habit, completions, now))
        .collect();

    let total_completions = completions
        .iter()
        .filter(|completion| habits.iter().any(|habit| habit.id == completion.habit_id))
        .count();
    let average_completion_rate =
        progress.iter().map(|entry| entry.rate.ratio()).sum::<f64>() / progress.len() as f64;
    let longest_streak = progress
        .iter()
        .map(|entry| entry.streak.longest_streak)
        .max()
        .unwrap_or(0);

    // Strictly greater keeps the first habit on ties and never picks a zero rate.
    let mut most_consistent: Option<&HabitProgress> = None;
    for entry in &progress {
        let best = most_consistent.map(|current| current.rate.ratio()).unwrap_or(0.0);
        if entry.rate.ratio() > best {
            most_consistent = Some(entry);
        }
    }

    HabitStats {
        active_habits: habits.len(),
        total_completions,
        average_completion_rate,
        longest_streak,
        most_consistent: most_consistent.map(|entry| ConsistentHabit {
            habit_id: entry.habit_id.clone(),
            title: entry.title.clone(),
            rate: entry.rate,
        }),
    }
}

pub fn habit_overview<Tz: TimeZone>(
    habits: &[Habit],
    completions: &[CompletionEvent],
    now: &DateTime<Tz>,
) -> HabitOverview {
    let since = now.with_timezone(&Utc) - Duration::days(ACTIVE_HABIT_DAYS);
    let active: BTreeSet<&str> = completions
        .iter()
        .filter(|completion| completion.completed_at >= since)
        .map(|completion| completion.habit_id.as_str())
        .collect();
    HabitOverview {
        total: habits.len(),
        active: active.len(),
        completed: completions.len(),
    }
}

/// Up to `limit` distinct tag names, taken from the newest habits first.
pub fn top_tags(habits: &[Habit], limit: usize) -> Vec<String> {
    let mut newest_first: Vec<&Habit> = habits.iter().collect();
    newest_first.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let mut tags: Vec<String> = Vec::new();
    for tag in newest_first.iter().flat_map(|habit| habit.tags.iter()) {
        if tags.len() == limit {
            break;
        }
        if !tags.contains(tag) {
            tags.push(tag.clone());
        }
    }
    tags
}

pub fn journal_stats<Tz: TimeZone>(entries: &[JournalEntry], now: &DateTime<Tz>) -> JournalStats {
    let tz = now.timezone();
    let times: Vec<DateTime<Tz>> = entries
        .iter()
        .map(|entry| entry.created_at.with_timezone(&tz))
        .collect();
    let streak = journal::journal_streak(&times, now);
    JournalStats {
        total_entries: entries.len(),
        total_words: entries.iter().map(JournalEntry::word_count).sum(),
        current_streak: streak.current_streak,
        longest_streak: streak.longest_streak,
    }
}

pub fn dashboard<Tz: TimeZone>(
    records: &RecordSet,
    now: &DateTime<Tz>,
    window_days: u32,
) -> StatsResult<Dashboard> {
    let tz = now.timezone();
    let events: Vec<DateTime<Tz>> = records
        .activity_instants()
        .into_iter()
        .map(|instant| instant.with_timezone(&tz))
        .collect();
    let activity = activity::aggregate(&events, window_days, now)?;

    Ok(Dashboard {
        as_of: now.date_naive(),
        habit_counts: HabitCounts::from_habits(&records.habits),
        overview: habit_overview(&records.habits, &records.completions, now),
        top_tags: top_tags(&records.habits, TOP_TAG_LIMIT),
        habit_stats: habit_stats(&records.habits, &records.completions, now),
        habits: records
            .habits
            .iter()
            .map(|habit| habit_progress(habit, &records.completions, now))
            .collect(),
        journal: journal_stats(&records.journal, now),
        activity_summary: activity::summarize(&activity),
        heatmap: activity::heatmap_grid(&activity),
        activity,
    })
}
