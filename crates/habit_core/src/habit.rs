use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::period::Period;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Habit {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub period: Period,
    pub details: HabitDetails,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Free-form habit metadata that used to live in a serialized text column.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HabitDetails {
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompletionEvent {
    pub id: String,
    pub user_id: String,
    pub habit_id: String,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JournalEntry {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Habit {
    /// Completion instants of this habit, converted into `tz`.
    pub fn completion_times<Tz: TimeZone>(
        &self,
        completions: &[CompletionEvent],
        tz: &Tz,
    ) -> Vec<DateTime<Tz>> {
        completions
            .iter()
            .filter(|completion| completion.habit_id == self.id)
            .map(|completion| completion.completed_at.with_timezone(tz))
            .collect()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|candidate| candidate.eq_ignore_ascii_case(tag))
    }
}

impl JournalEntry {
    /// Number of word-character runs in the entry body.
    pub fn word_count(&self) -> usize {
        count_words(&self.content)
    }
}

pub fn count_words(text: &str) -> usize {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|word| !word.is_empty())
        .count()
}
