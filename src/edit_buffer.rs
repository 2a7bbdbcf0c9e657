use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::aggregate::dedupe_records;
use crate::error::{AttendanceError, Result};
use crate::models::{AttendanceRecord, ClassBucketSummary, CommitResult, PendingEdit, RosterEntry};
use crate::source::AttendanceSource;
use crate::status::AttendanceStatus;

/// The (class, date) pair an edit session is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EditScope {
    pub class_id: i64,
    pub date: NaiveDate,
}

/// What the baseline holds for a roster student with no record that day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum UnmarkedPolicy {
    /// Quick-mark sessions start everyone at `Present`.
    #[default]
    DefaultPresent,
    /// Calendar edits keep unmarked students out of the buffer.
    LeaveUnmarked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    Clean,
    Dirty,
}

/// Local overlay of intended status changes for one class day.
///
/// Every mutation is a plain local transition. Nothing is persisted until
/// [`EditBuffer::commit`] hands the contents to a source; a failed commit
/// leaves the pending edits in place for a retry.
#[derive(Debug, Clone)]
pub struct EditBuffer {
    scope: EditScope,
    policy: UnmarkedPolicy,
    roster: BTreeSet<i64>,
    /// Students with a stored record for the scope.
    recorded: BTreeSet<i64>,
    baseline: BTreeMap<i64, AttendanceStatus>,
    pending: BTreeMap<i64, AttendanceStatus>,
    visible: Option<BTreeSet<i64>>,
}

impl EditBuffer {
    pub fn new(
        scope: EditScope,
        roster: &[RosterEntry],
        records: &[AttendanceRecord],
        policy: UnmarkedPolicy,
    ) -> Self {
        let roster: BTreeSet<i64> = roster.iter().map(|entry| entry.student_id).collect();
        let recorded = recorded_students(scope, &roster, records);
        let baseline = build_baseline(scope, &roster, records, policy);
        Self {
            scope,
            policy,
            roster,
            recorded,
            pending: baseline.clone(),
            baseline,
            visible: None,
        }
    }

    pub fn quick_mark(scope: EditScope, roster: &[RosterEntry], records: &[AttendanceRecord]) -> Self {
        Self::new(scope, roster, records, UnmarkedPolicy::DefaultPresent)
    }

    pub fn calendar_edit(
        scope: EditScope,
        roster: &[RosterEntry],
        records: &[AttendanceRecord],
    ) -> Self {
        Self::new(scope, roster, records, UnmarkedPolicy::LeaveUnmarked)
    }

    pub fn scope(&self) -> EditScope {
        self.scope
    }

    pub fn policy(&self) -> UnmarkedPolicy {
        self.policy
    }

    pub fn status_of(&self, student_id: i64) -> Option<AttendanceStatus> {
        self.pending.get(&student_id).copied()
    }

    pub fn baseline_status_of(&self, student_id: i64) -> Option<AttendanceStatus> {
        self.baseline.get(&student_id).copied()
    }

    /// `None` when the student has no stored record, even if the baseline
    /// defaulted them to `Present`.
    pub fn recorded_status_of(&self, student_id: i64) -> Option<AttendanceStatus> {
        if self.recorded.contains(&student_id) {
            self.baseline_status_of(student_id)
        } else {
            None
        }
    }

    pub fn statuses(&self) -> &BTreeMap<i64, AttendanceStatus> {
        &self.pending
    }

    /// Overrides one student's status. Returns `false`, changing nothing, when
    /// the student is not on the roster snapshot.
    pub fn set_status(&mut self, student_id: i64, status: AttendanceStatus) -> bool {
        if !self.roster.contains(&student_id) {
            debug!(
                "ignoring status for student {} outside class {} roster",
                student_id, self.scope.class_id
            );
            return false;
        }
        self.pending.insert(student_id, status);
        true
    }

    /// Narrows `mark_all` to the given students, e.g. the rows left by a search.
    pub fn set_visible<I>(&mut self, student_ids: I)
    where
        I: IntoIterator<Item = i64>,
    {
        self.visible = Some(student_ids.into_iter().collect());
    }

    pub fn clear_visible(&mut self) {
        self.visible = None;
    }

    pub fn visible_students(&self) -> Vec<i64> {
        match &self.visible {
            Some(visible) => self.roster.intersection(visible).copied().collect(),
            None => self.roster.iter().copied().collect(),
        }
    }

    /// Applies `status` to every visible student; returns how many were set.
    pub fn mark_all(&mut self, status: AttendanceStatus) -> usize {
        let targets = self.visible_students();
        for student_id in &targets {
            self.pending.insert(*student_id, status);
        }
        targets.len()
    }

    /// Merges the per-student statuses of another bucket into the buffer.
    /// Students the bucket does not mention keep whatever they had.
    pub fn copy_from_bucket(&mut self, source: &ClassBucketSummary) -> usize {
        let mut copied = 0;
        for (student_id, status) in &source.student_statuses {
            if self.set_status(*student_id, *status) {
                copied += 1;
            }
        }
        debug!(
            "copied {} statuses from bucket {} into class {} on {}",
            copied, source.bucket_key, self.scope.class_id, self.scope.date
        );
        copied
    }

    pub fn reset(&mut self) {
        self.pending = self.baseline.clone();
    }

    pub fn is_dirty(&self) -> bool {
        self.pending != self.baseline
    }

    pub fn state(&self) -> BufferState {
        if self.is_dirty() {
            BufferState::Dirty
        } else {
            BufferState::Clean
        }
    }

    /// Full buffer contents, one edit per student, ordered by student id.
    pub fn edits(&self) -> Vec<PendingEdit> {
        self.pending
            .iter()
            .map(|(student_id, status)| PendingEdit {
                student_id: *student_id,
                status: *status,
            })
            .collect()
    }

    /// Only the entries that differ from the baseline.
    pub fn changes(&self) -> Vec<PendingEdit> {
        self.edits()
            .into_iter()
            .filter(|edit| self.baseline.get(&edit.student_id) != Some(&edit.status))
            .collect()
    }

    /// Entries a commit would write for students with no stored record yet.
    /// Quick-mark defaults show up here although they are not `changes`.
    pub fn new_marks(&self) -> Vec<PendingEdit> {
        self.edits()
            .into_iter()
            .filter(|edit| !self.recorded.contains(&edit.student_id))
            .collect()
    }

    /// Takes the source's persisted records as the new baseline and drops
    /// any pending edits.
    pub fn rehydrate(&mut self, persisted: &[AttendanceRecord]) {
        for record in dedupe_records(persisted) {
            if !in_scope(self.scope, &self.roster, record) {
                continue;
            }
            self.recorded.insert(record.student_id);
            self.baseline.insert(record.student_id, record.status);
        }
        self.pending = self.baseline.clone();
    }

    /// Rebinds the buffer to another class day. Pending edits are discarded so
    /// they cannot leak across dates.
    pub fn rebaseline(
        &mut self,
        scope: EditScope,
        roster: &[RosterEntry],
        records: &[AttendanceRecord],
    ) {
        if self.is_dirty() {
            warn!(
                "discarding {} pending edits for class {} on {}",
                self.changes().len(),
                self.scope.class_id,
                self.scope.date
            );
        }
        *self = Self::new(scope, roster, records, self.policy);
    }

    /// Sends the buffer to `source`. On success the buffer is rehydrated from
    /// the persisted records; on failure it is left untouched.
    pub async fn commit<S: AttendanceSource>(&mut self, source: &S) -> Result<CommitResult> {
        let edits = self.edits();
        let result = source
            .commit_edits(self.scope.class_id, self.scope.date, &edits)
            .await?;

        if !result.success {
            return Err(AttendanceError::CommitFailure {
                class_id: self.scope.class_id,
                date: self.scope.date,
                reason: "source rejected the batch".to_string(),
            });
        }

        info!(
            "committed {} edits for class {} on {} ({} persisted)",
            edits.len(),
            self.scope.class_id,
            self.scope.date,
            result.persisted.len()
        );
        self.rehydrate(&result.persisted);
        Ok(result)
    }
}

fn in_scope(scope: EditScope, roster: &BTreeSet<i64>, record: &AttendanceRecord) -> bool {
    record.class_id == scope.class_id
        && record.date == scope.date
        && roster.contains(&record.student_id)
}

fn recorded_students(
    scope: EditScope,
    roster: &BTreeSet<i64>,
    records: &[AttendanceRecord],
) -> BTreeSet<i64> {
    records
        .iter()
        .filter(|record| in_scope(scope, roster, record))
        .map(|record| record.student_id)
        .collect()
}

fn build_baseline(
    scope: EditScope,
    roster: &BTreeSet<i64>,
    records: &[AttendanceRecord],
    policy: UnmarkedPolicy,
) -> BTreeMap<i64, AttendanceStatus> {
    let mut baseline: BTreeMap<i64, AttendanceStatus> = dedupe_records(records)
        .into_iter()
        .filter(|record| in_scope(scope, roster, record))
        .map(|record| (record.student_id, record.status))
        .collect();

    if policy == UnmarkedPolicy::DefaultPresent {
        for student_id in roster {
            baseline.entry(*student_id).or_insert(AttendanceStatus::Present);
        }
    }

    baseline
}
