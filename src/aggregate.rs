use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::NaiveDate;
use log::debug;

use crate::models::{AttendanceRecord, RosterEntry, StudentAttendanceSummary, StudentStanding};
use crate::status::{AttendanceStatus, ExtendedStatusPolicy};

/// Collapses records sharing a (student, date, class) key. The last record in
/// input order wins; survivors keep the position of that last occurrence.
pub fn dedupe_records(records: &[AttendanceRecord]) -> Vec<&AttendanceRecord> {
    let mut last_seen: HashMap<(i64, NaiveDate, i64), usize> = HashMap::new();

    for (idx, record) in records.iter().enumerate() {
        if let Some(previous) = last_seen.insert(record.key(), idx) {
            debug!(
                "duplicate record for student {} on {} in class {}: {} replaced by {}",
                record.student_id,
                record.date,
                record.class_id,
                records[previous].status.code(),
                record.status.code()
            );
        }
    }

    let mut keep: Vec<usize> = last_seen.into_values().collect();
    keep.sort_unstable();
    keep.into_iter().map(|idx| &records[idx]).collect()
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct StatusCounts {
    pub present: u32,
    pub absent: u32,
    pub late: u32,
    pub excused: u32,
}

impl StatusCounts {
    pub fn add(&mut self, status: AttendanceStatus) {
        match status {
            AttendanceStatus::Present => self.present += 1,
            AttendanceStatus::Absent => self.absent += 1,
            AttendanceStatus::Late => self.late += 1,
            AttendanceStatus::Excused
            | AttendanceStatus::SickLeave
            | AttendanceStatus::MedicalLeave
            | AttendanceStatus::Other => self.excused += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.present + self.absent + self.late + self.excused
    }

    pub fn into_summary(self) -> StudentAttendanceSummary {
        StudentAttendanceSummary::from_counts(self.present, self.absent, self.late, self.excused)
    }
}

/// Folds one class's records into one summary per roster student.
///
/// Roster students without records get an all-zero summary. Records for
/// other classes or for students outside the roster are dropped.
pub fn summarize_students(
    records: &[AttendanceRecord],
    roster: &[RosterEntry],
    class_id: i64,
    student_filter: Option<i64>,
    policy: ExtendedStatusPolicy,
) -> BTreeMap<i64, StudentAttendanceSummary> {
    let roster_ids: HashSet<i64> = roster
        .iter()
        .map(|entry| entry.student_id)
        .filter(|id| student_filter.map_or(true, |wanted| wanted == *id))
        .collect();

    let mut counts: BTreeMap<i64, StatusCounts> = roster_ids
        .iter()
        .map(|id| (*id, StatusCounts::default()))
        .collect();

    for record in dedupe_records(records) {
        if record.class_id != class_id {
            debug!(
                "skipping record for student {} from class {} while summarizing class {}",
                record.student_id, record.class_id, class_id
            );
            continue;
        }
        let Some(entry) = counts.get_mut(&record.student_id) else {
            debug!(
                "skipping record for student {} outside the roster",
                record.student_id
            );
            continue;
        };
        match policy.resolve(record.status) {
            Some(status) => entry.add(status),
            None => debug!(
                "skipping {} record for student {} on {}",
                record.status.code(),
                record.student_id,
                record.date
            ),
        }
    }

    counts
        .into_iter()
        .map(|(id, counts)| (id, counts.into_summary()))
        .collect()
}

/// Same as [`summarize_students`] but joined to roster entries, in roster
/// order. The first roster entry wins when a student is listed twice.
pub fn standings(
    records: &[AttendanceRecord],
    roster: &[RosterEntry],
    class_id: i64,
    policy: ExtendedStatusPolicy,
) -> Vec<StudentStanding> {
    let summaries = summarize_students(records, roster, class_id, None, policy);
    let mut seen = HashSet::new();

    roster
        .iter()
        .filter(|entry| seen.insert(entry.student_id))
        .map(|entry| StudentStanding {
            student: entry.clone(),
            summary: summaries
                .get(&entry.student_id)
                .copied()
                .unwrap_or_default(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn roster() -> Vec<RosterEntry> {
        vec![
            RosterEntry::new(1, "Avery Lee"),
            RosterEntry::new(2, "Jules Moreno"),
            RosterEntry::new(3, "Kiara Patel"),
        ]
    }

    #[test]
    fn counts_each_status_per_student() {
        let records = vec![
            AttendanceRecord::new(1, date(1), AttendanceStatus::Present, 10),
            AttendanceRecord::new(1, date(2), AttendanceStatus::Late, 10),
            AttendanceRecord::new(1, date(3), AttendanceStatus::Absent, 10),
            AttendanceRecord::new(1, date(4), AttendanceStatus::Excused, 10),
            AttendanceRecord::new(2, date(1), AttendanceStatus::Present, 10),
        ];

        let summaries = summarize_students(&records, &roster(), 10, None, ExtendedStatusPolicy::Ignore);
        let avery = summaries[&1];
        assert_eq!((avery.present, avery.late, avery.absent, avery.excused), (1, 1, 1, 1));
        assert_eq!(avery.total, 4);
        assert!((avery.rate - 25.0).abs() < 1e-9);
        assert_eq!(summaries[&2].rate, 100.0);
        assert_eq!(summaries[&3], StudentAttendanceSummary::default());
    }

    #[test]
    fn ignores_students_outside_roster() {
        let records = vec![AttendanceRecord::new(99, date(1), AttendanceStatus::Present, 10)];
        let summaries = summarize_students(&records, &roster(), 10, None, ExtendedStatusPolicy::Ignore);
        assert_eq!(summaries.len(), 3);
        assert!(!summaries.contains_key(&99));
    }

    #[test]
    fn ignores_records_from_other_classes() {
        let records = vec![
            AttendanceRecord::new(1, date(1), AttendanceStatus::Present, 10),
            AttendanceRecord::new(99, date(1), AttendanceStatus::Absent, 10),
            AttendanceRecord::new(1, date(1), AttendanceStatus::Absent, 11),
        ];
        let summaries = summarize_students(&records, &roster(), 10, Some(1), ExtendedStatusPolicy::Ignore);
        let avery = summaries[&1];
        assert_eq!((avery.present, avery.absent, avery.total), (1, 0, 1));
        assert_eq!(avery.rate, 100.0);
    }

    #[test]
    fn empty_roster_yields_nothing() {
        let records = vec![AttendanceRecord::new(1, date(1), AttendanceStatus::Present, 10)];
        assert!(summarize_students(&records, &[], 10, None, ExtendedStatusPolicy::Ignore).is_empty());
    }

    #[test]
    fn student_filter_limits_output() {
        let records = vec![
            AttendanceRecord::new(1, date(1), AttendanceStatus::Present, 10),
            AttendanceRecord::new(2, date(1), AttendanceStatus::Absent, 10),
        ];
        let summaries = summarize_students(&records, &roster(), 10, Some(2), ExtendedStatusPolicy::Ignore);
        assert_eq!(summaries.keys().copied().collect::<Vec<_>>(), vec![2]);
        assert_eq!(summaries[&2].absent, 1);
    }

    #[test]
    fn duplicates_resolve_to_last_seen() {
        let records = vec![
            AttendanceRecord::new(1, date(1), AttendanceStatus::Late, 10),
            AttendanceRecord::new(2, date(1), AttendanceStatus::Present, 10),
            AttendanceRecord::new(1, date(1), AttendanceStatus::Absent, 10),
        ];
        let kept = dedupe_records(&records);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].student_id, 2);
        assert_eq!(kept[1].status, AttendanceStatus::Absent);
    }

    #[test]
    fn same_day_in_other_class_is_not_a_duplicate() {
        let records = vec![
            AttendanceRecord::new(1, date(1), AttendanceStatus::Present, 10),
            AttendanceRecord::new(1, date(1), AttendanceStatus::Absent, 11),
        ];
        assert_eq!(dedupe_records(&records).len(), 2);
    }

    #[test]
    fn extended_statuses_follow_policy() {
        let records = vec![
            AttendanceRecord::new(1, date(1), AttendanceStatus::SickLeave, 10),
            AttendanceRecord::new(1, date(2), AttendanceStatus::Present, 10),
        ];
        let ignored = summarize_students(&records, &roster(), 10, Some(1), ExtendedStatusPolicy::Ignore);
        assert_eq!(ignored[&1].total, 1);
        assert_eq!(ignored[&1].rate, 100.0);

        let folded =
            summarize_students(&records, &roster(), 10, Some(1), ExtendedStatusPolicy::FoldIntoExcused);
        assert_eq!(folded[&1].total, 2);
        assert_eq!(folded[&1].excused, 1);
        assert_eq!(folded[&1].rate, 50.0);
    }

    #[test]
    fn input_order_does_not_change_result() {
        let mut records = vec![
            AttendanceRecord::new(1, date(1), AttendanceStatus::Present, 10),
            AttendanceRecord::new(2, date(1), AttendanceStatus::Absent, 10),
            AttendanceRecord::new(3, date(2), AttendanceStatus::Late, 10),
        ];
        let forward = summarize_students(&records, &roster(), 10, None, ExtendedStatusPolicy::Ignore);
        records.reverse();
        let backward = summarize_students(&records, &roster(), 10, None, ExtendedStatusPolicy::Ignore);
        assert_eq!(forward, backward);
    }

    #[test]
    fn standings_follow_roster_order() {
        let records = vec![AttendanceRecord::new(3, date(1), AttendanceStatus::Present, 10)];
        let rows = standings(&records, &roster(), 10, ExtendedStatusPolicy::Ignore);
        let ids: Vec<i64> = rows.iter().map(|row| row.student_id()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(rows[2].summary.present, 1);
    }
}
