use attendance_analytics::aggregate::{standings, summarize_students};
use attendance_analytics::buckets::{summarize_buckets, Granularity};
use attendance_analytics::edit_buffer::{BufferState, EditBuffer, EditScope};
use attendance_analytics::ranking::{rank_students, RateMetric};
use attendance_analytics::source::{AttendanceSource, MemoryStore};
use attendance_analytics::status::ExtendedStatusPolicy;
use attendance_analytics::{
    AttendanceError, AttendanceRecord, AttendanceStatus, DateRange, DateScope, RosterEntry,
};
use chrono::NaiveDate;

const CLASS: i64 = 1;

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
}

fn roster(ids: &[i64]) -> Vec<RosterEntry> {
    ids.iter()
        .map(|id| RosterEntry::new(*id, format!("Student {id}")))
        .collect()
}

#[test]
fn scenario_a_two_students_one_day() {
    let roster = roster(&[1, 2]);
    let records = vec![
        AttendanceRecord::new(1, day(1), AttendanceStatus::Present, CLASS),
        AttendanceRecord::new(2, day(1), AttendanceStatus::Absent, CLASS),
    ];

    let summaries = summarize_students(&records, &roster, CLASS, None, ExtendedStatusPolicy::Ignore);
    assert_eq!(summaries[&1].present, 1);
    assert_eq!(summaries[&1].total, 1);
    assert_eq!(summaries[&1].rate, 100.0);
    assert_eq!(summaries[&2].present, 0);
    assert_eq!(summaries[&2].total, 1);
    assert_eq!(summaries[&2].rate, 0.0);

    let buckets = summarize_buckets(
        &records,
        DateRange::single(day(1)),
        Granularity::Day,
        CLASS,
        &roster,
        ExtendedStatusPolicy::Ignore,
    );
    assert_eq!(buckets.len(), 1);
    assert_eq!(buckets[0].bucket_key, "2024-01-01");
    assert_eq!(buckets[0].total_students, 2);
    assert_eq!(buckets[0].present_count, 1);
    assert_eq!(buckets[0].absent_count, 1);
    assert_eq!(buckets[0].attendance_rate, 50.0);
}

#[test]
fn scenario_b_unmarked_student_is_ranked_but_ungraded() {
    let roster = roster(&[1, 2]);
    let records = vec![AttendanceRecord::new(1, day(1), AttendanceStatus::Absent, CLASS)];

    let rows = standings(&records, &roster, CLASS, ExtendedStatusPolicy::Ignore);
    let unmarked = rows.iter().find(|row| row.student_id() == 2).unwrap();
    let s = unmarked.summary;
    assert_eq!((s.present, s.absent, s.late, s.excused, s.total), (0, 0, 0, 0, 0));
    assert_eq!(s.rate, 0.0);

    let ranked = rank_students(&rows, RateMetric::Present);
    assert_eq!(ranked.len(), 2);
    let entry = ranked.iter().find(|row| row.student_id() == 2).unwrap();
    assert_eq!(entry.rate, 0.0);
    assert_eq!(entry.grade, None);
    let marked = ranked.iter().find(|row| row.student_id() == 1).unwrap();
    assert!(marked.grade.is_some());
}

#[test]
fn scenario_c_mark_all_then_reset() {
    let roster = roster(&[1, 2]);
    let records = vec![
        AttendanceRecord::new(1, day(1), AttendanceStatus::Present, CLASS),
        AttendanceRecord::new(2, day(1), AttendanceStatus::Absent, CLASS),
    ];
    let scope = EditScope {
        class_id: CLASS,
        date: day(1),
    };
    let mut buffer = EditBuffer::calendar_edit(scope, &roster, &records);
    assert!(!buffer.is_dirty());

    buffer.mark_all(AttendanceStatus::Present);
    assert_eq!(buffer.status_of(1), Some(AttendanceStatus::Present));
    assert_eq!(buffer.status_of(2), Some(AttendanceStatus::Present));
    assert!(buffer.is_dirty());
    assert_eq!(buffer.state(), BufferState::Dirty);

    buffer.reset();
    assert_eq!(buffer.status_of(1), Some(AttendanceStatus::Present));
    assert_eq!(buffer.status_of(2), Some(AttendanceStatus::Absent));
    assert!(!buffer.is_dirty());
}

#[test]
fn scenario_d_copy_from_bucket_merges() {
    let roster = roster(&[1, 2]);
    let previous = vec![AttendanceRecord::new(1, day(1), AttendanceStatus::Late, CLASS)];
    let source = summarize_buckets(
        &previous,
        DateRange::single(day(1)),
        Granularity::Day,
        CLASS,
        &roster,
        ExtendedStatusPolicy::Ignore,
    );
    assert_eq!(source.len(), 1);

    let scope = EditScope {
        class_id: CLASS,
        date: day(2),
    };
    let mut buffer = EditBuffer::calendar_edit(scope, &roster, &[]);
    buffer.set_status(2, AttendanceStatus::Excused);

    assert_eq!(buffer.copy_from_bucket(&source[0]), 1);
    assert_eq!(buffer.status_of(1), Some(AttendanceStatus::Late));
    assert_eq!(buffer.status_of(2), Some(AttendanceStatus::Excused));

    let mut untouched = EditBuffer::calendar_edit(scope, &roster, &[]);
    untouched.copy_from_bucket(&source[0]);
    assert_eq!(untouched.status_of(2), None);
}

#[test]
fn scenario_e_duplicate_record_last_seen_wins() {
    let roster = roster(&[1]);
    let records = vec![
        AttendanceRecord::new(1, day(1), AttendanceStatus::Late, CLASS),
        AttendanceRecord::new(1, day(1), AttendanceStatus::Present, CLASS),
    ];
    let summary = summarize_students(&records, &roster, CLASS, None, ExtendedStatusPolicy::Ignore)[&1];
    assert_eq!(summary.total, 1);
    assert_eq!(summary.present, 1);
    assert_eq!(summary.late, 0);
    assert_eq!(summary.rate, 100.0);

    let flipped = vec![records[1].clone(), records[0].clone()];
    let summary = summarize_students(&flipped, &roster, CLASS, None, ExtendedStatusPolicy::Ignore)[&1];
    assert_eq!(summary.total, 1);
    assert_eq!(summary.late, 1);
}

fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.set_roster(CLASS, roster(&[1, 2, 3]));
    store.add_record(AttendanceRecord::new(1, day(8), AttendanceStatus::Absent, CLASS));
    store
}

#[tokio::test]
async fn commit_rehydrates_from_persisted_records() {
    let store = seeded_store();
    let scope = EditScope {
        class_id: CLASS,
        date: day(8),
    };
    let roster = store.fetch_roster(CLASS).await.unwrap();
    let records = store.fetch_records(CLASS, &DateScope::Day(day(8))).await.unwrap();

    let mut buffer = EditBuffer::quick_mark(scope, &roster, &records);
    buffer.set_status(3, AttendanceStatus::Late);
    assert!(buffer.is_dirty());

    let result = buffer.commit(&store).await.unwrap();
    assert!(result.success);
    assert_eq!(result.persisted.len(), 3);
    assert!(!buffer.is_dirty());
    assert_eq!(buffer.baseline_status_of(3), Some(AttendanceStatus::Late));

    let stored = store.fetch_records(CLASS, &DateScope::Day(day(8))).await.unwrap();
    assert_eq!(stored.len(), 3);
}

#[tokio::test]
async fn failed_commit_keeps_pending_edits() {
    let store = seeded_store();
    let scope = EditScope {
        class_id: CLASS,
        date: day(8),
    };
    let roster = store.fetch_roster(CLASS).await.unwrap();
    let records = store.fetch_records(CLASS, &DateScope::Day(day(8))).await.unwrap();

    let mut buffer = EditBuffer::calendar_edit(scope, &roster, &records);
    buffer.mark_all(AttendanceStatus::Present);
    let before = buffer.edits();

    store.fail_commits(Some("connection reset"));
    let err = buffer.commit(&store).await.unwrap_err();
    assert!(matches!(err, AttendanceError::CommitFailure { .. }));
    assert!(buffer.is_dirty());
    assert_eq!(buffer.edits(), before);
    assert_eq!(store.records().len(), 1);

    store.fail_commits(None);
    buffer.commit(&store).await.unwrap();
    assert!(!buffer.is_dirty());
    assert_eq!(store.records().len(), 3);
}
