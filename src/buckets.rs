use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, Days, NaiveDate};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::aggregate::{dedupe_records, StatusCounts};
use crate::models::{percentage, AttendanceRecord, ClassBucketSummary, DateRange, RosterEntry};
use crate::status::{AttendanceStatus, ExtendedStatusPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Day,
    Week,
    Month,
}

/// One slice of a requested interval, already clipped to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    pub key: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Splits `range` into contiguous buckets. Weeks start on Monday; weeks and
/// months that straddle either end of the range are clipped.
pub fn partition(range: DateRange, granularity: Granularity) -> Vec<Bucket> {
    let mut buckets = Vec::new();
    let mut cursor = range.start();

    loop {
        let period_end = match granularity {
            Granularity::Day => Some(cursor),
            Granularity::Week => {
                let offset = 6 - u64::from(cursor.weekday().num_days_from_monday());
                cursor.checked_add_days(Days::new(offset))
            }
            Granularity::Month => Some(last_day_of_month(cursor)),
        };
        let end = period_end.map_or(range.end(), |end| end.min(range.end()));
        buckets.push(Bucket {
            key: bucket_key(cursor, granularity),
            start: cursor,
            end,
        });
        match end.succ_opt() {
            Some(next) if end < range.end() => cursor = next,
            _ => break,
        }
    }

    buckets
}

fn bucket_key(date: NaiveDate, granularity: Granularity) -> String {
    match granularity {
        Granularity::Day => date.format("%Y-%m-%d").to_string(),
        Granularity::Week => {
            let week = date.iso_week();
            format!("{:04}-W{:02}", week.year(), week.week())
        }
        Granularity::Month => date.format("%Y-%m").to_string(),
    }
}

fn last_day_of_month(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first| first.pred_opt())
        .unwrap_or(NaiveDate::MAX)
}

#[derive(Default)]
struct BucketTally {
    counts: StatusCounts,
    latest: BTreeMap<i64, (NaiveDate, AttendanceStatus)>,
}

/// Produces one summary per bucket that holds at least one counted record
/// for `class_id`. Buckets without data are left out rather than reported at
/// a zero rate. Records for other classes or off-roster students are skipped.
pub fn summarize_buckets(
    records: &[AttendanceRecord],
    range: DateRange,
    granularity: Granularity,
    class_id: i64,
    roster: &[RosterEntry],
    policy: ExtendedStatusPolicy,
) -> Vec<ClassBucketSummary> {
    let enrolled: BTreeSet<i64> = roster.iter().map(|entry| entry.student_id).collect();
    let total_students = enrolled.len();
    let buckets = partition(range, granularity);
    let mut tallies: Vec<BucketTally> = buckets.iter().map(|_| BucketTally::default()).collect();

    for record in dedupe_records(records) {
        if !range.contains(record.date) {
            continue;
        }
        if record.class_id != class_id || !enrolled.contains(&record.student_id) {
            debug!(
                "bucket skips record for student {} in class {} on {}",
                record.student_id, record.class_id, record.date
            );
            continue;
        }
        let Some(status) = policy.resolve(record.status) else {
            debug!(
                "bucket skips {} record for student {} on {}",
                record.status.code(),
                record.student_id,
                record.date
            );
            continue;
        };
        let idx = buckets.partition_point(|bucket| bucket.end < record.date);
        let Some(tally) = tallies.get_mut(idx) else {
            continue;
        };
        tally.counts.add(status);
        let latest = tally
            .latest
            .entry(record.student_id)
            .or_insert((record.date, status));
        if record.date >= latest.0 {
            *latest = (record.date, status);
        }
    }

    buckets
        .into_iter()
        .zip(tallies)
        .filter(|(_, tally)| tally.counts.total() > 0)
        .map(|(bucket, tally)| {
            let total_records = tally.counts.total();
            ClassBucketSummary {
                bucket_key: bucket.key,
                start: bucket.start,
                end: bucket.end,
                total_students,
                present_count: tally.counts.present,
                absent_count: tally.counts.absent,
                late_count: tally.counts.late,
                excused_count: tally.counts.excused,
                total_records,
                attendance_rate: percentage(tally.counts.present, total_records),
                student_statuses: tally
                    .latest
                    .into_iter()
                    .map(|(id, (_, status))| (id, status))
                    .collect(),
            }
        })
        .collect()
}

/// Highest-rate bucket; the earliest one wins a tie.
pub fn best_bucket(buckets: &[ClassBucketSummary]) -> Option<&ClassBucketSummary> {
    buckets.iter().fold(None, |best, bucket| match best {
        Some(current) if current.attendance_rate >= bucket.attendance_rate => Some(current),
        _ => Some(bucket),
    })
}

/// Lowest-rate bucket; the earliest one wins a tie. Only buckets with data
/// exist in the input, so a day nobody marked is never picked.
pub fn worst_bucket(buckets: &[ClassBucketSummary]) -> Option<&ClassBucketSummary> {
    buckets.iter().fold(None, |worst, bucket| match worst {
        Some(current) if current.attendance_rate <= bucket.attendance_rate => Some(current),
        _ => Some(bucket),
    })
}
