use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::NaiveDate;
use log::warn;

use crate::error::{AttendanceError, Result};
use crate::models::{AttendanceRecord, CommitResult, DateScope, PendingEdit, RosterEntry};

/// External collaborator that supplies records and rosters and persists
/// committed edits. Retries and timeouts belong to the implementation.
#[allow(async_fn_in_trait)]
pub trait AttendanceSource {
    async fn fetch_records(&self, class_id: i64, scope: &DateScope) -> Result<Vec<AttendanceRecord>>;

    async fn fetch_roster(&self, class_id: i64) -> Result<Vec<RosterEntry>>;

    async fn commit_edits(
        &self,
        class_id: i64,
        date: NaiveDate,
        edits: &[PendingEdit],
    ) -> Result<CommitResult>;
}

#[derive(Default)]
struct MemoryInner {
    rosters: HashMap<i64, Vec<RosterEntry>>,
    records: Vec<AttendanceRecord>,
    fail_commits: Option<String>,
}

/// In-process store with the same upsert semantics as the database.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_roster(&self, class_id: i64, roster: Vec<RosterEntry>) {
        self.lock().rosters.insert(class_id, roster);
    }

    pub fn add_record(&self, record: AttendanceRecord) {
        self.lock().records.push(record);
    }

    /// Makes every following commit fail with `reason` until cleared.
    pub fn fail_commits(&self, reason: Option<&str>) {
        self.lock().fail_commits = reason.map(str::to_string);
    }

    pub fn records(&self) -> Vec<AttendanceRecord> {
        self.lock().records.clone()
    }
}

impl AttendanceSource for MemoryStore {
    async fn fetch_records(&self, class_id: i64, scope: &DateScope) -> Result<Vec<AttendanceRecord>> {
        let range = scope.as_range();
        Ok(self
            .lock()
            .records
            .iter()
            .filter(|record| record.class_id == class_id && range.contains(record.date))
            .cloned()
            .collect())
    }

    async fn fetch_roster(&self, class_id: i64) -> Result<Vec<RosterEntry>> {
        Ok(self.lock().rosters.get(&class_id).cloned().unwrap_or_default())
    }

    async fn commit_edits(
        &self,
        class_id: i64,
        date: NaiveDate,
        edits: &[PendingEdit],
    ) -> Result<CommitResult> {
        let mut inner = self.lock();
        if let Some(reason) = inner.fail_commits.clone() {
            return Err(AttendanceError::CommitFailure {
                class_id,
                date,
                reason,
            });
        }

        let enrolled: Vec<i64> = inner
            .rosters
            .get(&class_id)
            .map(|roster| roster.iter().map(|entry| entry.student_id).collect())
            .unwrap_or_default();

        let mut persisted = Vec::with_capacity(edits.len());
        for edit in edits {
            if !enrolled.contains(&edit.student_id) {
                warn!(
                    "rejecting edit for student {} not enrolled in class {}",
                    edit.student_id, class_id
                );
                continue;
            }
            let key = (edit.student_id, date, class_id);
            let record = match inner.records.iter().position(|record| record.key() == key) {
                Some(idx) => {
                    inner.records[idx].status = edit.status;
                    inner.records[idx].clone()
                }
                None => {
                    let record = AttendanceRecord::new(edit.student_id, date, edit.status, class_id);
                    inner.records.push(record.clone());
                    record
                }
            };
            persisted.push(record);
        }

        Ok(CommitResult {
            success: true,
            persisted,
        })
    }
}
