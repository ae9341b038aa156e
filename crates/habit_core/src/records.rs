use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{StatsError, StatsResult};
use crate::habit::{CompletionEvent, Habit, HabitDetails, JournalEntry};
use crate::period::Period;

/// Row shape of the store's generic `entries` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntryRow {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
    #[serde(default)]
    pub period: Option<String>,
    #[serde(rename = "createdat")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedat", default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
}

/// The store sends `null` for empty text and tag columns.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A raw snapshot row that could not be read as an [`EntryRow`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRow {
    /// Owner, when the row carried a readable `user_id`.
    pub user_id: Option<String>,
    pub error: StatsError,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Habit,
    HabitCompletion,
    Journal,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Habit(Habit),
    Completion(CompletionEvent),
    Journal(JournalEntry),
}

#[derive(Debug, Deserialize)]
struct LegacyHabitContent {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    frequency: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LegacyCompletionContent {
    completed_habit_id: String,
}

impl EntryRow {
    /// Read one row of a snapshot array. `index` names rows without an id.
    pub fn from_value(value: Value, index: usize) -> Result<Self, RejectedRow> {
        let field = |name: &str| value.get(name).and_then(Value::as_str).map(str::to_string);
        let id = field("id").unwrap_or_else(|| format!("#{index}"));
        let user_id = field("user_id");
        serde_json::from_value(value).map_err(|err| RejectedRow {
            user_id,
            error: StatsError::MalformedRecord {
                kind: "entry",
                id,
                reason: err.to_string(),
            },
        })
    }

    /// Decode the row into a typed record. Rows of unknown kind yield `None`.
    pub fn decode(&self) -> StatsResult<Option<Record>> {
        let record = match self.kind {
            EntryKind::Habit => Record::Habit(self.decode_habit()?),
            EntryKind::HabitCompletion => Record::Completion(self.decode_completion()?),
            EntryKind::Journal => Record::Journal(JournalEntry {
                id: self.id.clone(),
                user_id: self.user_id.clone(),
                title: self.title.clone(),
                content: self.content.clone(),
                created_at: self.created_at,
            }),
            EntryKind::Other => return Ok(None),
        };
        Ok(Some(record))
    }

    fn decode_habit(&self) -> StatsResult<Habit> {
        // Older rows keep description and frequency as JSON in `content`;
        // anything that is not a JSON object is a plain description.
        let legacy = serde_json::from_str::<LegacyHabitContent>(&self.content).ok();
        let (description, frequency) = match legacy {
            Some(content) => (content.description.unwrap_or_default(), content.frequency),
            None => (self.content.trim().to_string(), None),
        };

        let raw_period = self
            .period
            .as_deref()
            .or(frequency.as_deref())
            .ok_or_else(|| self.malformed("habit", "no recurrence period"))?;
        let period: Period = raw_period.parse()?;

        Ok(Habit {
            id: self.id.clone(),
            user_id: self.user_id.clone(),
            title: self.title.clone(),
            period,
            details: HabitDetails { description },
            tags: self.tags.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at.unwrap_or(self.created_at),
        })
    }

    fn decode_completion(&self) -> StatsResult<CompletionEvent> {
        let content: LegacyCompletionContent = serde_json::from_str(&self.content)
            .map_err(|err| self.malformed("habit_completion", &err.to_string()))?;
        Ok(CompletionEvent {
            id: self.id.clone(),
            user_id: self.user_id.clone(),
            habit_id: content.completed_habit_id,
            completed_at: self.created_at,
        })
    }

    fn malformed(&self, kind: &'static str, reason: &str) -> StatsError {
        StatsError::MalformedRecord {
            kind,
            id: self.id.clone(),
            reason: reason.to_string(),
        }
    }
}

/// Typed records decoded from one batch of rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordSet {
    pub habits: Vec<Habit>,
    pub completions: Vec<CompletionEvent>,
    pub journal: Vec<JournalEntry>,
    pub rejected: Vec<StatsError>,
}

impl RecordSet {
    /// Decode every row, collecting failures instead of aborting.
    pub fn from_rows<'a>(rows: impl IntoIterator<Item = &'a EntryRow>) -> Self {
        let mut set = RecordSet::default();
        for row in rows {
            match row.decode() {
                Ok(Some(record)) => set.push(record),
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(row = %row.id, %err, "skipping undecodable row");
                    set.rejected.push(err);
                }
            }
        }
        set
    }

    pub fn push(&mut self, record: Record) {
        match record {
            Record::Habit(habit) => self.habits.push(habit),
            Record::Completion(completion) => self.completions.push(completion),
            Record::Journal(entry) => self.journal.push(entry),
        }
    }

    /// Every user action with a timestamp: habit creation, completion, journal entry.
    pub fn activity_instants(&self) -> Vec<DateTime<Utc>> {
        self.habits
            .iter()
            .map(|habit| habit.created_at)
            .chain(self.completions.iter().map(|completion| completion.completed_at))
            .chain(self.journal.iter().map(|entry| entry.created_at))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(json: &str) -> Vec<EntryRow> {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn decodes_habit_with_legacy_json_content() {
        let rows = rows(
            r#"[{"id":"h1","user_id":"u1","type":"habit","title":"Read",
                 "content":"{\"description\":\"20 pages\",\"frequency\":\"weekly\"}",
                 "createdat":"2024-01-01T08:00:00Z","tags":["mind"]}]"#,
        );
        let Some(Record::Habit(habit)) = rows[0].decode().unwrap() else {
            panic!("expected a habit record");
        };
        assert_eq!(habit.period, Period::Weekly);
        assert_eq!(habit.details.description, "20 pages");
        assert_eq!(habit.updated_at, habit.created_at);
        assert_eq!(habit.tags, vec!["mind".to_string()]);
    }

    #[test]
    fn explicit_period_column_wins_over_content() {
        let rows = rows(
            r#"[{"id":"h1","user_id":"u1","type":"habit","title":"Read",
                 "content":"{\"frequency\":\"weekly\"}","period":"monthly",
                 "createdat":"2024-01-01T08:00:00Z"}]"#,
        );
        let Some(Record::Habit(habit)) = rows[0].decode().unwrap() else {
            panic!("expected a habit record");
        };
        assert_eq!(habit.period, Period::Monthly);
    }

    #[test]
    fn plain_text_content_becomes_description() {
        let rows = rows(
            r#"[{"id":"h1","user_id":"u1","type":"habit","title":"Walk",
                 "content":"  around the block ","period":"daily",
                 "createdat":"2024-01-01T08:00:00Z"}]"#,
        );
        let Some(Record::Habit(habit)) = rows[0].decode().unwrap() else {
            panic!("expected a habit record");
        };
        assert_eq!(habit.details.description, "around the block");
    }

    #[test]
    fn unknown_period_is_rejected_not_defaulted() {
        let rows = rows(
            r#"[{"id":"h1","user_id":"u1","type":"habit","title":"Read",
                 "period":"fortnightly","createdat":"2024-01-01T08:00:00Z"}]"#,
        );
        assert_eq!(
            rows[0].decode().unwrap_err(),
            StatsError::InvalidPeriod("fortnightly".to_string())
        );
    }

    #[test]
    fn completion_requires_habit_reference() {
        let rows = rows(
            r#"[{"id":"c1","user_id":"u1","type":"habit_completion","content":"{}",
                 "createdat":"2024-01-02T08:00:00Z"},
                {"id":"c2","user_id":"u1","type":"habit_completion",
                 "content":"{\"completed_habit_id\":\"h1\"}",
                 "createdat":"2024-01-02T09:00:00Z"}]"#,
        );
        assert!(matches!(
            rows[0].decode(),
            Err(StatsError::MalformedRecord { kind: "habit_completion", .. })
        ));
        let Some(Record::Completion(completion)) = rows[1].decode().unwrap() else {
            panic!("expected a completion record");
        };
        assert_eq!(completion.habit_id, "h1");
    }

    #[test]
    fn record_set_skips_bad_rows_and_unknown_kinds() {
        let rows = rows(
            r#"[{"id":"j1","user_id":"u1","type":"journal","content":"dear diary",
                 "createdat":"2024-01-02T21:00:00Z"},
                {"id":"t1","user_id":"u1","type":"tag","createdat":"2024-01-02T21:00:00Z"},
                {"id":"h1","user_id":"u1","type":"habit","createdat":"2024-01-02T21:00:00Z"}]"#,
        );
        let set = RecordSet::from_rows(&rows);
        assert_eq!(set.journal.len(), 1);
        assert!(set.habits.is_empty());
        assert_eq!(set.rejected.len(), 1);
        assert_eq!(set.activity_instants().len(), 1);
    }

    #[test]
    fn null_text_columns_read_as_empty() {
        let rows = rows(
            r#"[{"id":"j1","user_id":"u1","type":"journal","title":null,"content":null,
                 "tags":null,"updatedat":null,"createdat":"2024-01-02T21:00:00Z"}]"#,
        );
        let Some(Record::Journal(entry)) = rows[0].decode().unwrap() else {
            panic!("expected a journal record");
        };
        assert_eq!(entry.content, "");
        assert!(rows[0].tags.is_empty());
    }

    #[test]
    fn unreadable_row_keeps_its_id_and_owner() {
        let value = serde_json::json!({
            "id": "c7", "user_id": "u1", "type": "habit_completion", "createdat": "yesterday"
        });
        let rejected = EntryRow::from_value(value, 3).unwrap_err();
        assert_eq!(rejected.user_id.as_deref(), Some("u1"));
        assert!(matches!(
            rejected.error,
            StatsError::MalformedRecord { kind: "entry", ref id, .. } if id == "c7"
        ));

        let rejected = EntryRow::from_value(serde_json::json!(42), 5).unwrap_err();
        assert_eq!(rejected.user_id, None);
        assert!(matches!(
            rejected.error,
            StatsError::MalformedRecord { ref id, .. } if id == "#5"
        ));
    }
}
