use std::collections::HashMap;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::habit::{CompletionEvent, Habit};

pub const FEED_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FeedKind {
    Created,
    Updated,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedItem {
    pub kind: FeedKind,
    pub habit_id: String,
    pub title: String,
    pub at: DateTime<Utc>,
    /// Completions of the habit inside the window, set on completion items
    /// when there is more than one.
    pub completion_count: Option<usize>,
}

impl FeedItem {
    fn new(kind: FeedKind, habit: &Habit, at: DateTime<Utc>) -> Self {
        Self {
            kind,
            habit_id: habit.id.clone(),
            title: habit.title.clone(),
            at,
            completion_count: None,
        }
    }
}

/// Habit events of the last thirty days, newest first.
///
/// With `tag` set only habits carrying that tag contribute. Completions that
/// reference no known habit are left out.
pub fn recent_activity<Tz: TimeZone>(
    habits: &[Habit],
    completions: &[CompletionEvent],
    now: &DateTime<Tz>,
    tag: Option<&str>,
) -> Vec<FeedItem> {
    let since = now.with_timezone(&Utc) - Duration::days(FEED_WINDOW_DAYS);
    let selected: Vec<&Habit> = habits
        .iter()
        .filter(|habit| tag.map_or(true, |tag| habit.has_tag(tag)))
        .collect();
    let by_id: HashMap<&str, &Habit> = selected
        .iter()
        .map(|habit| (habit.id.as_str(), *habit))
        .collect();

    let recent: Vec<&CompletionEvent> = completions
        .iter()
        .filter(|completion| completion.completed_at >= since)
        .collect();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for completion in &recent {
        *counts.entry(completion.habit_id.as_str()).or_default() += 1;
    }

    let mut items = Vec::new();
    for habit in &selected {
        if habit.created_at >= since {
            items.push(FeedItem::new(FeedKind::Created, habit, habit.created_at));
        }
        if habit.updated_at != habit.created_at && habit.updated_at >= since {
            items.push(FeedItem::new(FeedKind::Updated, habit, habit.updated_at));
        }
    }
    for completion in recent {
        let Some(habit) = by_id.get(completion.habit_id.as_str()) else {
            continue;
        };
        let mut item = FeedItem::new(FeedKind::Completed, habit, completion.completed_at);
        item.completion_count = counts
            .get(completion.habit_id.as_str())
            .copied()
            .filter(|count| *count > 1);
        items.push(item);
    }

    items.sort_by(|a, b| b.at.cmp(&a.at));
    items
}
