use std::fmt::Write;

use crate::buckets::{best_bucket, worst_bucket};
use crate::export::format_rate;
use crate::models::{ClassBucketSummary, DateRange, StudentStanding};
use crate::ranking::{
    class_average, concerning_attendance, perfect_attendance, rank_students, RankingOptions,
};

pub struct ReportInput<'a> {
    pub class_label: &'a str,
    pub range: DateRange,
    pub standings: &'a [StudentStanding],
    pub buckets: &'a [ClassBucketSummary],
    pub options: RankingOptions,
    pub top: usize,
}

pub fn build_report(input: &ReportInput<'_>) -> String {
    let ranked = rank_students(input.standings, input.options.metric);
    let average = class_average(input.standings, input.options);

    let mut output = String::new();

    let _ = writeln!(output, "# Class Attendance Report");
    let _ = writeln!(
        output,
        "Generated for {} ({} to {})",
        input.class_label,
        input.range.start(),
        input.range.end()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "Class average: {}", format_rate(average));
    let _ = writeln!(output, "Students on roster: {}", input.standings.len());

    let _ = writeln!(output);
    let _ = writeln!(output, "## Attendance Trend");

    if input.buckets.is_empty() {
        let _ = writeln!(output, "No attendance recorded for this window.");
    } else {
        for bucket in input.buckets {
            let _ = writeln!(
                output,
                "- {}: {} ({} present, {} absent, {} late, {} excused)",
                bucket.bucket_key,
                format_rate(bucket.attendance_rate),
                bucket.present_count,
                bucket.absent_count,
                bucket.late_count,
                bucket.excused_count
            );
        }
        if let (Some(best), Some(worst)) = (best_bucket(input.buckets), worst_bucket(input.buckets)) {
            let _ = writeln!(output);
            let _ = writeln!(
                output,
                "Best period: {} at {}",
                best.bucket_key,
                format_rate(best.attendance_rate)
            );
            let _ = writeln!(
                output,
                "Worst period: {} at {}",
                worst.bucket_key,
                format_rate(worst.attendance_rate)
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Student Ranking");

    if ranked.is_empty() {
        let _ = writeln!(output, "No students on the roster.");
    } else {
        for row in ranked.iter().take(input.top) {
            let grade = row.grade.map(|g| g.label()).unwrap_or("-");
            let _ = writeln!(
                output,
                "{}. {} {} (grade {}, {} records)",
                row.rank,
                row.standing.student.display_name,
                format_rate(row.rate),
                grade,
                row.standing.summary.total
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Perfect Attendance");
    let perfect = perfect_attendance(&ranked);
    if perfect.is_empty() {
        let _ = writeln!(output, "None this window.");
    } else {
        for row in perfect {
            let _ = writeln!(output, "- {}", row.standing.student.display_name);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Needs Attention");
    let concerning = concerning_attendance(&ranked);
    if concerning.is_empty() {
        let _ = writeln!(output, "No students below the attendance threshold.");
    } else {
        for row in concerning {
            let summary = &row.standing.summary;
            let _ = writeln!(
                output,
                "- {} at {} ({} absent, {} late)",
                row.standing.student.display_name,
                format_rate(row.rate),
                summary.absent,
                summary.late
            );
        }
    }

    output
}
