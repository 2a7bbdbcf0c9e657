//! Attendance analytics for class rosters: per-student and per-period
//! summaries, ranking and grading, CSV export, and a local edit buffer for
//! bulk marking before a batch commit.

pub mod aggregate;
pub mod buckets;
pub mod cache;
pub mod config;
pub mod db;
pub mod edit_buffer;
pub mod error;
pub mod export;
pub mod models;
pub mod ranking;
pub mod report;
pub mod source;
pub mod status;

pub use error::{AttendanceError, Result};
pub use models::{
    AttendanceRecord, ClassBucketSummary, CommitResult, DateRange, DateScope, PendingEdit,
    RosterEntry, StudentAttendanceSummary, StudentStanding,
};
pub use status::AttendanceStatus;
