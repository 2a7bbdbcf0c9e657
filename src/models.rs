use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{AttendanceError, Result};
use crate::status::AttendanceStatus;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub student_id: i64,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub class_id: i64,
    pub remarks: Option<String>,
}

impl AttendanceRecord {
    pub fn new(student_id: i64, date: NaiveDate, status: AttendanceStatus, class_id: i64) -> Self {
        Self {
            student_id,
            date,
            status,
            class_id,
            remarks: None,
        }
    }

    /// Uniqueness key: one record per (student, date, class).
    pub fn key(&self) -> (i64, NaiveDate, i64) {
        (self.student_id, self.date, self.class_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub student_id: i64,
    pub display_name: String,
    pub email: Option<String>,
    pub grade_level: Option<String>,
}

impl RosterEntry {
    pub fn new(student_id: i64, display_name: impl Into<String>) -> Self {
        Self {
            student_id,
            display_name: display_name.into(),
            email: None,
            grade_level: None,
        }
    }
}

/// Per-student counts over a date range. `total` is the number of records
/// found, not the number of school days.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StudentAttendanceSummary {
    pub present: u32,
    pub absent: u32,
    pub late: u32,
    pub excused: u32,
    pub total: u32,
    pub rate: f64,
}

impl StudentAttendanceSummary {
    pub fn from_counts(present: u32, absent: u32, late: u32, excused: u32) -> Self {
        let total = present + absent + late + excused;
        Self {
            present,
            absent,
            late,
            excused,
            total,
            rate: percentage(present, total),
        }
    }

    pub fn present_rate(&self) -> f64 {
        self.rate
    }

    /// Counts `Late` alongside `Present`. Kept separate from `rate`.
    pub fn present_or_late_rate(&self) -> f64 {
        percentage(self.present + self.late, self.total)
    }

    pub fn has_records(&self) -> bool {
        self.total > 0
    }
}

/// Summary of one bucket (day, week or month) for a class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassBucketSummary {
    pub bucket_key: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub total_students: usize,
    pub present_count: u32,
    pub absent_count: u32,
    pub late_count: u32,
    pub excused_count: u32,
    pub total_records: u32,
    pub attendance_rate: f64,
    /// Latest counted status per student inside the bucket.
    pub student_statuses: BTreeMap<i64, AttendanceStatus>,
}

impl ClassBucketSummary {
    pub fn present_or_late_rate(&self) -> f64 {
        percentage(self.present_count + self.late_count, self.total_records)
    }
}

/// A summary joined back to the roster entry it describes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentStanding {
    pub student: RosterEntry,
    pub summary: StudentAttendanceSummary,
}

impl StudentStanding {
    pub fn student_id(&self) -> i64 {
        self.student.student_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingEdit {
    pub student_id: i64,
    pub status: AttendanceStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitResult {
    pub success: bool,
    pub persisted: Vec<AttendanceRecord>,
}

/// Inclusive date interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(AttendanceError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn single(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

/// The date part of a fetch key: either one class day or a range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DateScope {
    Day(NaiveDate),
    Range(DateRange),
}

impl DateScope {
    pub fn as_range(&self) -> DateRange {
        match self {
            DateScope::Day(date) => DateRange::single(*date),
            DateScope::Range(range) => *range,
        }
    }
}

pub(crate) fn percentage(numerator: u32, denominator: u32) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64 * 100.0
    }
}
