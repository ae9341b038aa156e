pub mod activity;
pub mod completion;
pub mod error;
pub mod feed;
pub mod habit;
pub mod journal;
pub mod period;
pub mod records;
pub mod service;
pub mod snapshot;
pub mod stats;
pub mod streak;

pub use crate::error::{StatsError, StatsResult};
pub use crate::period::Period;
pub use crate::service::{HabitService, HabitServiceBuilder, Session};
pub use crate::streak::{compute_streak, StreakResult};
