use thiserror::Error;

/// Errors surfaced by the attendance library.
///
/// Duplicate records and empty scopes are not errors: duplicates resolve
/// last-seen-wins and empty scopes yield empty summaries.
#[derive(Debug, Error)]
pub enum AttendanceError {
    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("unknown attendance status: {0:?}")]
    UnknownStatus(String),

    #[error("invalid date range: {start} is after {end}")]
    InvalidRange {
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
    },

    #[error("commit failed for class {class_id} on {date}: {reason}")]
    CommitFailure {
        class_id: i64,
        date: chrono::NaiveDate,
        reason: String,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AttendanceError>;
