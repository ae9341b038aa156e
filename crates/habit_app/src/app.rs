use std::fmt::Write as _;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Local, TimeZone};
use habit_core::{
    activity::{self, HeatmapCell, DEFAULT_WINDOW_DAYS, MAX_WINDOW_DAYS},
    stats::Dashboard,
    HabitService, Session,
};
use tracing::{info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportFormat {
    Text,
    Json,
}

impl FromStr for ReportFormat {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(ReportFormat::Text),
            "json" => Ok(ReportFormat::Json),
            other => Err(anyhow!("unknown report format `{other}`")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub(crate) roots: Vec<PathBuf>,
    pub(crate) user_id: Option<String>,
    pub(crate) window_days: u32,
    pub(crate) format: ReportFormat,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self::from_vars(|key| std::env::var(key).ok()))
    }

    /// Build a config from any variable source; unparsable values keep the default.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(root) = var("HABIT_ROOT") {
            config.push_root(PathBuf::from(root));
        }
        if let Some(list) = var("HABIT_ROOTS") {
            for path in std::env::split_paths(&list) {
                config.push_root(path);
            }
        }
        if let Some(user) = var("HABIT_USER_ID") {
            let user = user.trim();
            if !user.is_empty() {
                config.user_id = Some(user.to_string());
            }
        }
        if let Some(window) = var("HABIT_ACTIVITY_WINDOW_DAYS") {
            match window.trim().parse::<u32>() {
                Ok(value) if value <= MAX_WINDOW_DAYS => config.window_days = value,
                _ => warn!(value = %window, "ignoring invalid HABIT_ACTIVITY_WINDOW_DAYS"),
            }
        }
        if let Some(format) = var("HABIT_REPORT_FORMAT") {
            match format.parse() {
                Ok(value) => config.format = value,
                Err(err) => warn!(%err, "ignoring HABIT_REPORT_FORMAT"),
            }
        }
        config
    }

    pub(crate) fn push_root(&mut self, path: PathBuf) {
        if path.as_os_str().is_empty() || self.roots.contains(&path) {
            return;
        }
        info!(path = %path.display(), "registering root");
        self.roots.push(path);
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            user_id: None,
            window_days: DEFAULT_WINDOW_DAYS,
            format: ReportFormat::Text,
        }
    }
}

pub fn run(config: AppConfig) -> Result<()> {
    let report = build_report(&config, &Local::now())?;
    println!("{report}");
    Ok(())
}

/// Load every configured root and render the dashboard of the selected user.
pub fn build_report<Tz: TimeZone>(config: &AppConfig, now: &DateTime<Tz>) -> Result<String> {
    let mut builder = HabitService::builder();
    for root in &config.roots {
        builder = builder.add_root(root);
    }
    let service = builder.build().context("failed to load habit snapshots")?;

    let user_id = match &config.user_id {
        Some(user) => user.clone(),
        None => service
            .users()
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("no users found in the configured roots"))?,
    };
    let session = Session::new(user_id);
    info!(user = %session.user_id, roots = config.roots.len(), "building report");

    let dashboard = service.dashboard(&session, now, config.window_days)?;
    match config.format {
        ReportFormat::Json => Ok(serde_json::to_string_pretty(&dashboard)?),
        ReportFormat::Text => Ok(render_text(&session, &dashboard)?),
    }
}

pub fn render_text(session: &Session, dashboard: &Dashboard) -> Result<String, std::fmt::Error> {
    let mut out = String::new();
    writeln!(out, "Habits of {} as of {}", session.user_id, dashboard.as_of)?;
    let counts = &dashboard.habit_counts;
    writeln!(
        out,
        "{} active ({} daily, {} weekly, {} monthly), {} completions",
        counts.total,
        counts.daily,
        counts.weekly,
        counts.monthly,
        dashboard.habit_stats.total_completions
    )?;
    let overview = &dashboard.overview;
    writeln!(
        out,
        "{} habits active this week, {} completions logged",
        overview.active, overview.completed
    )?;
    if !dashboard.top_tags.is_empty() {
        writeln!(out, "Tags: {}", dashboard.top_tags.join(", "))?;
    }
    for progress in &dashboard.habits {
        let mark = if progress.completed_this_period { 'x' } else { ' ' };
        write!(out, "  [{mark}] {} ({})", progress.title, progress.period)?;
        if !progress.label.is_empty() {
            write!(out, ", {}", progress.label)?;
        }
        writeln!(
            out,
            ", {}/{} ({})",
            progress.rate.completed, progress.rate.expected, progress.rate
        )?;
    }
    let stats = &dashboard.habit_stats;
    writeln!(
        out,
        "Average completion {:.0}%, longest streak {}",
        stats.average_completion_rate * 100.0,
        stats.longest_streak
    )?;
    if let Some(best) = &stats.most_consistent {
        writeln!(out, "Most consistent: {} ({})", best.title, best.rate)?;
    }

    let journal = &dashboard.journal;
    writeln!(
        out,
        "Journal: {} entries, {} words, current streak {}, longest {}",
        journal.total_entries, journal.total_words, journal.current_streak, journal.longest_streak
    )?;

    let summary = &dashboard.activity_summary;
    writeln!(
        out,
        "Activity: {} events on {} of {} days",
        summary.total_events, summary.active_days, summary.days
    )?;
    for row in heatmap_rows(dashboard) {
        writeln!(out, "  {row}")?;
    }
    Ok(out)
}

/// One text row per weekday, Sunday first, one column per week.
fn heatmap_rows(dashboard: &Dashboard) -> Vec<String> {
    (0..7)
        .map(|weekday| {
            dashboard
                .heatmap
                .iter()
                .map(|week| heatmap_glyph(&week[weekday]))
                .collect()
        })
        .collect()
}

fn heatmap_glyph(cell: &HeatmapCell) -> char {
    match cell {
        HeatmapCell::Padding { .. } | HeatmapCell::Future { .. } => ' ',
        HeatmapCell::Day(bucket) => match activity::activity_level(bucket.count) {
            0 => '.',
            1 => '-',
            2 => '+',
            3 => '*',
            _ => '#',
        },
    }
}
