use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDate, TimeZone};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::RwLock;
use tracing::instrument;
use walkdir::WalkDir;

use crate::{
    feed::{self, FeedItem},
    habit::{CompletionEvent, Habit, JournalEntry},
    journal::{self, Lookback},
    records::{EntryRow, RecordSet},
    snapshot::Snapshot,
    stats::{self, Dashboard, HabitOverview, HabitProgress},
};

/// Identity the caller acts for. Passed explicitly to every query; the service
/// keeps no notion of a signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Session {
    pub user_id: String,
}

impl Session {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

type SnapshotMap = Arc<RwLock<HashMap<PathBuf, Snapshot>>>;

pub struct HabitService {
    roots: Vec<PathBuf>,
    snapshots: SnapshotMap,
    watcher: Option<RecommendedWatcher>,
}

pub struct HabitServiceBuilder {
    roots: Vec<PathBuf>,
}

impl HabitServiceBuilder {
    pub fn new() -> Self {
        Self { roots: Vec::new() }
    }

    pub fn add_root(self, path: impl AsRef<Path>) -> Self {
        self.add_snapshot_root(path)
    }

    pub fn add_snapshot_root(mut self, path: impl AsRef<Path>) -> Self {
        Self::push_unique(&mut self.roots, path.as_ref().to_path_buf());
        self
    }

    pub fn build(self) -> Result<HabitService> {
        let mut service = HabitService {
            roots: self.roots,
            snapshots: Arc::new(RwLock::new(HashMap::new())),
            watcher: None,
        };
        service.reload_all()?;
        Ok(service)
    }

    fn push_unique(vec: &mut Vec<PathBuf>, path: PathBuf) {
        if !vec.contains(&path) {
            vec.push(path);
        }
    }
}

impl Default for HabitServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HabitService {
    pub fn builder() -> HabitServiceBuilder {
        HabitServiceBuilder::new()
    }

    pub fn roots(&self) -> Vec<PathBuf> {
        let mut roots = self.roots.clone();
        roots.sort();
        roots
    }

    pub fn add_snapshot_root(&mut self, path: PathBuf) -> Result<()> {
        if self.roots.contains(&path) {
            return Ok(());
        }
        self.roots.push(path.clone());
        {
            let mut snapshots = self.snapshots.write();
            Self::ingest_root(&mut snapshots, &path)?;
        }
        self.watch_path(&path)?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn reload_all(&mut self) -> Result<()> {
        let mut snapshots = self.snapshots.write();
        snapshots.clear();
        for root in &self.roots {
            Self::ingest_root(&mut snapshots, root)?;
        }
        let loaded_at = snapshots.values().map(Snapshot::loaded_at).max();
        tracing::info!(
            snapshots = snapshots.len(),
            loaded_at = ?loaded_at,
            "snapshots loaded"
        );
        Ok(())
    }

    pub fn list_snapshots(&self) -> Vec<PathBuf> {
        let mut entries: Vec<PathBuf> = self.snapshots.read().keys().cloned().collect();
        entries.sort();
        entries
    }

    pub fn get_snapshot(&self, path: impl AsRef<Path>) -> Result<Snapshot> {
        self.snapshots
            .read()
            .get(path.as_ref())
            .cloned()
            .ok_or_else(|| anyhow!("snapshot not loaded"))
    }

    /// Replace an in-memory snapshot, e.g. with rows fetched from the store.
    pub fn put_snapshot(&self, snapshot: Snapshot) {
        self.snapshots
            .write()
            .insert(snapshot.path().to_path_buf(), snapshot);
    }

    /// Distinct owners of the loaded rows, sorted.
    pub fn users(&self) -> Vec<String> {
        let snapshots = self.snapshots.read();
        let users: BTreeSet<String> = snapshots
            .values()
            .flat_map(|snapshot| snapshot.rows().iter().map(|row| row.user_id.clone()))
            .collect();
        users.into_iter().collect()
    }

    /// Typed records owned by the session's user. A row id present in several
    /// snapshots resolves to the copy from the last snapshot path in sort order.
    /// Unreadable rows that name the user land in `rejected`.
    pub fn records(&self, session: &Session) -> RecordSet {
        let snapshots = self.snapshots.read();
        let mut ordered: Vec<&Snapshot> = snapshots.values().collect();
        ordered.sort_by(|a, b| a.path().cmp(b.path()));

        let mut rows: BTreeMap<&str, &EntryRow> = BTreeMap::new();
        for snapshot in &ordered {
            for row in snapshot.rows() {
                if row.user_id == session.user_id {
                    rows.insert(row.id.as_str(), row);
                }
            }
        }
        let mut records = RecordSet::from_rows(rows.into_values());
        records.rejected.extend(
            ordered
                .iter()
                .flat_map(|snapshot| snapshot.rejected())
                .filter(|rejected| rejected.user_id.as_deref() == Some(session.user_id.as_str()))
                .map(|rejected| rejected.error.clone()),
        );
        tracing::debug!(
            user = %session.user_id,
            habits = records.habits.len(),
            completions = records.completions.len(),
            journal = records.journal.len(),
            rejected = records.rejected.len(),
            "records resolved"
        );
        records
    }

    pub fn habits(&self, session: &Session) -> Vec<Habit> {
        self.records(session).habits
    }

    pub fn completions(&self, session: &Session) -> Vec<CompletionEvent> {
        self.records(session).completions
    }

    pub fn journal_entries(&self, session: &Session) -> Vec<JournalEntry> {
        let mut entries = self.records(session).journal;
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries
    }

    /// The journal entry written on `day` in the time zone `tz`, if any.
    pub fn journal_entry_on<Tz: TimeZone>(
        &self,
        session: &Session,
        day: NaiveDate,
        tz: &Tz,
    ) -> Option<JournalEntry> {
        self.journal_entries(session)
            .into_iter()
            .find(|entry| entry.created_at.with_timezone(tz).date_naive() == day)
    }

    /// Entries from the dates the journal resurfaces next to today's page.
    pub fn journal_lookbacks<Tz: TimeZone>(
        &self,
        session: &Session,
        now: &DateTime<Tz>,
    ) -> Vec<(Lookback, NaiveDate, Option<JournalEntry>)> {
        let tz = now.timezone();
        let entries = self.journal_entries(session);
        journal::lookback_dates(now.date_naive())
            .into_iter()
            .map(|(lookback, day)| {
                let entry = entries
                    .iter()
                    .find(|entry| entry.created_at.with_timezone(&tz).date_naive() == day)
                    .cloned();
                (lookback, day, entry)
            })
            .collect()
    }

    pub fn habit_progress<Tz: TimeZone>(
        &self,
        session: &Session,
        now: &DateTime<Tz>,
    ) -> Vec<HabitProgress> {
        let records = self.records(session);
        records
            .habits
            .iter()
            .map(|habit| stats::habit_progress(habit, &records.completions, now))
            .collect()
    }

    pub fn overview<Tz: TimeZone>(&self, session: &Session, now: &DateTime<Tz>) -> HabitOverview {
        let records = self.records(session);
        stats::habit_overview(&records.habits, &records.completions, now)
    }

    pub fn top_tags(&self, session: &Session) -> Vec<String> {
        stats::top_tags(&self.habits(session), stats::TOP_TAG_LIMIT)
    }

    /// Recent habit events, optionally limited to habits carrying `tag`.
    pub fn recent_activity<Tz: TimeZone>(
        &self,
        session: &Session,
        now: &DateTime<Tz>,
        tag: Option<&str>,
    ) -> Vec<FeedItem> {
        let records = self.records(session);
        feed::recent_activity(&records.habits, &records.completions, now, tag)
    }

    #[instrument(skip(self, now), fields(user = %session.user_id))]
    pub fn dashboard<Tz: TimeZone>(
        &self,
        session: &Session,
        now: &DateTime<Tz>,
        window_days: u32,
    ) -> Result<Dashboard> {
        let records = self.records(session);
        Ok(stats::dashboard(&records, now, window_days)?)
    }

    /// Reload snapshot files as they change under the roots, until the
    /// service is dropped.
    pub fn watch(&mut self) -> Result<()> {
        if self.watcher.is_some() {
            return Ok(());
        }
        let snapshots = Arc::clone(&self.snapshots);
        let mut watcher =
            notify::recommended_watcher(move |res: notify::Result<Event>| match res {
                Ok(event) => Self::apply_change(&snapshots, &event),
                Err(err) => tracing::warn!(%err, "snapshot watcher failed"),
            })?;
        for root in &self.roots {
            watcher.watch(root, Self::watch_mode(root))?;
        }
        self.watcher = Some(watcher);
        Ok(())
    }
}

impl HabitService {
    /// Reload or drop the snapshot files named by one file-system event.
    fn apply_change(snapshots: &RwLock<HashMap<PathBuf, Snapshot>>, event: &Event) {
        if matches!(event.kind, EventKind::Access(_)) {
            return;
        }
        for path in event.paths.iter().filter(|path| Self::is_snapshot_file(path)) {
            if !path.is_file() {
                if snapshots.write().remove(path).is_some() {
                    tracing::debug!(path = %path.display(), "snapshot removed");
                }
                continue;
            }
            match Snapshot::load(path) {
                Ok(snapshot) => {
                    tracing::debug!(
                        path = %path.display(),
                        rows = snapshot.rows().len(),
                        loaded_at = %snapshot.loaded_at(),
                        "snapshot reloaded"
                    );
                    snapshots.write().insert(path.clone(), snapshot);
                }
                // Editors write in steps; the next event retries.
                Err(err) => tracing::warn!(path = %path.display(), %err, "snapshot not reloaded"),
            }
        }
    }

    fn watch_path(&mut self, path: &Path) -> Result<()> {
        if let Some(watcher) = &mut self.watcher {
            watcher.watch(path, Self::watch_mode(path))?;
        }
        Ok(())
    }

    fn watch_mode(path: &Path) -> RecursiveMode {
        if Self::root_is_file(path) {
            RecursiveMode::NonRecursive
        } else {
            RecursiveMode::Recursive
        }
    }

    fn ingest_root(snapshots: &mut HashMap<PathBuf, Snapshot>, path: &Path) -> Result<()> {
        if Self::root_is_file(path) {
            if Self::is_snapshot_file(path) {
                snapshots.insert(path.to_path_buf(), Snapshot::load(path)?);
            }
            return Ok(());
        }

        if path.is_dir() {
            for entry in WalkDir::new(path) {
                let entry = entry?;
                let entry_path = entry.path();
                if entry.file_type().is_file() && Self::is_snapshot_file(entry_path) {
                    snapshots.insert(entry_path.to_path_buf(), Snapshot::load(entry_path)?);
                }
            }
        } else {
            tracing::warn!(path = %path.display(), "snapshot root does not exist");
        }
        Ok(())
    }

    fn root_is_file(path: &Path) -> bool {
        path.is_file()
    }

    fn is_snapshot_file(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false)
    }
}
