use thiserror::Error;

/// Failures raised by the statistics engine and the record decoder.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StatsError {
    #[error("unrecognized recurrence period `{0}`")]
    InvalidPeriod(String),
    #[error("malformed {kind} record `{id}`: {reason}")]
    MalformedRecord {
        kind: &'static str,
        id: String,
        reason: String,
    },
    #[error("activity window of {0} days is out of range")]
    InvalidWindow(u32),
}

pub type StatsResult<T> = std::result::Result<T, StatsError>;
