use std::path::PathBuf;

use anyhow::Context;
use attendance_analytics::aggregate::standings;
use attendance_analytics::buckets::{summarize_buckets, Granularity};
use attendance_analytics::cache::RecordCache;
use attendance_analytics::config::Config;
use attendance_analytics::db::{self, PgStore};
use attendance_analytics::edit_buffer::{EditBuffer, EditScope, UnmarkedPolicy};
use attendance_analytics::export::{format_rate, write_csv_file};
use attendance_analytics::ranking::{
    class_average, rank_students, ClassAveragePolicy, RankingOptions, RateMetric,
};
use attendance_analytics::report::{build_report, ReportInput};
use attendance_analytics::source::AttendanceSource;
use attendance_analytics::status::ExtendedStatusPolicy;
use attendance_analytics::{AttendanceStatus, DateRange, DateScope};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "attendance-analytics")]
#[command(about = "Class attendance summaries, rankings and bulk marking", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Window {
    #[arg(long)]
    class_id: i64,
    /// First day of the window (YYYY-MM-DD)
    #[arg(long)]
    start: NaiveDate,
    /// Last day of the window, inclusive (YYYY-MM-DD)
    #[arg(long)]
    end: NaiveDate,
    #[arg(long, value_enum, default_value_t = ExtendedStatusPolicy::Ignore)]
    extended: ExtendedStatusPolicy,
}

impl Window {
    fn range(&self) -> anyhow::Result<DateRange> {
        Ok(DateRange::new(self.start, self.end)?)
    }
}

#[derive(Args)]
struct Ranking {
    #[arg(long, value_enum, default_value_t = RateMetric::Present)]
    metric: RateMetric,
    #[arg(long, value_enum, default_value_t = ClassAveragePolicy::IncludeUnmarked)]
    average: ClassAveragePolicy,
}

impl Ranking {
    fn options(&self) -> RankingOptions {
        RankingOptions {
            metric: self.metric,
            average_policy: self.average,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import roster and attendance rows from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Summarize attendance per period
    Summary {
        #[command(flatten)]
        window: Window,
        #[arg(long, value_enum, default_value_t = Granularity::Day)]
        granularity: Granularity,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Rank students by attendance rate
    Rank {
        #[command(flatten)]
        window: Window,
        #[command(flatten)]
        ranking: Ranking,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Export ranked student summaries as CSV
    Export {
        #[command(flatten)]
        window: Window,
        #[command(flatten)]
        ranking: Ranking,
        #[arg(long, default_value = "attendance.csv")]
        out: PathBuf,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        window: Window,
        #[command(flatten)]
        ranking: Ranking,
        #[arg(long, value_enum, default_value_t = Granularity::Week)]
        granularity: Granularity,
        #[arg(long, default_value_t = 10)]
        top: usize,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Mark attendance for one class day and commit it
    Mark {
        #[arg(long)]
        class_id: i64,
        #[arg(long)]
        date: NaiveDate,
        /// Leave unmarked students out instead of defaulting them to present
        #[arg(long)]
        calendar: bool,
        /// Set every student to this status first
        #[arg(long)]
        all: Option<AttendanceStatus>,
        /// Copy statuses recorded on another day
        #[arg(long)]
        copy_from: Option<NaiveDate>,
        /// Override one student, e.g. --set 3=ABSENT
        #[arg(long = "set", value_parser = parse_assignment)]
        assignments: Vec<(i64, AttendanceStatus)>,
        /// Show the pending changes without committing
        #[arg(long)]
        dry_run: bool,
    },
}

fn parse_assignment(raw: &str) -> Result<(i64, AttendanceStatus), String> {
    let (id, status) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected STUDENT_ID=STATUS, got {raw:?}"))?;
    let id = id
        .trim()
        .parse::<i64>()
        .map_err(|e| format!("invalid student id {id:?}: {e}"))?;
    let status = status.parse::<AttendanceStatus>().map_err(|e| e.to_string())?;
    Ok((id, status))
}

async fn connect() -> anyhow::Result<PgStore> {
    let config = Config::from_env()?;
    PgStore::connect(&config)
        .await
        .context("failed to connect to Postgres")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let store = connect().await?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(store.pool()).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(store.pool()).await?;
            println!("Seed data inserted for class {}.", db::SEED_CLASS_ID);
        }
        Commands::Import { csv } => {
            let summary = db::import_csv(store.pool(), &csv)
                .await
                .with_context(|| format!("failed to import {}", csv.display()))?;
            println!(
                "Imported {} rows from {} ({} skipped).",
                summary.upserted,
                csv.display(),
                summary.skipped
            );
        }
        Commands::Summary {
            window,
            granularity,
            json,
        } => {
            let range = window.range()?;
            let roster = store.fetch_roster(window.class_id).await?;
            let records = store
                .fetch_records(window.class_id, &DateScope::Range(range))
                .await?;
            let buckets = summarize_buckets(
                &records,
                range,
                granularity,
                window.class_id,
                &roster,
                window.extended,
            );

            if json {
                let rows = standings(&records, &roster, window.class_id, window.extended);
                let payload = serde_json::json!({
                    "classId": window.class_id,
                    "start": range.start(),
                    "end": range.end(),
                    "buckets": buckets,
                    "students": rows,
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
                return Ok(());
            }

            if buckets.is_empty() {
                println!("No attendance recorded for this window.");
                return Ok(());
            }
            for bucket in &buckets {
                println!(
                    "{}: {} present of {} records ({}, {} with late)",
                    bucket.bucket_key,
                    bucket.present_count,
                    bucket.total_records,
                    format_rate(bucket.attendance_rate),
                    format_rate(bucket.present_or_late_rate())
                );
            }
        }
        Commands::Rank {
            window,
            ranking,
            limit,
        } => {
            let range = window.range()?;
            let roster = store.fetch_roster(window.class_id).await?;
            let records = store
                .fetch_records(window.class_id, &DateScope::Range(range))
                .await?;
            let rows = standings(&records, &roster, window.class_id, window.extended);
            let ranked = rank_students(&rows, ranking.metric);

            if ranked.is_empty() {
                println!("No students on the roster for class {}.", window.class_id);
                return Ok(());
            }

            println!(
                "Class average {} across {} students:",
                format_rate(class_average(&rows, ranking.options())),
                rows.len()
            );
            for row in ranked.iter().take(limit) {
                println!(
                    "{}. {} {} grade {} across {} records",
                    row.rank,
                    row.standing.student.display_name,
                    format_rate(row.rate),
                    row.grade.map(|g| g.label()).unwrap_or("-"),
                    row.standing.summary.total
                );
            }
        }
        Commands::Export {
            window,
            ranking,
            out,
        } => {
            let range = window.range()?;
            let roster = store.fetch_roster(window.class_id).await?;
            let records = store
                .fetch_records(window.class_id, &DateScope::Range(range))
                .await?;
            let rows = standings(&records, &roster, window.class_id, window.extended);
            let ranked = rank_students(&rows, ranking.metric);
            write_csv_file(&ranked, &out)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Exported {} students to {}.", ranked.len(), out.display());
        }
        Commands::Report {
            window,
            ranking,
            granularity,
            top,
            out,
        } => {
            let range = window.range()?;
            let roster = store.fetch_roster(window.class_id).await?;
            let records = store
                .fetch_records(window.class_id, &DateScope::Range(range))
                .await?;
            let rows = standings(&records, &roster, window.class_id, window.extended);
            let buckets = summarize_buckets(
                &records,
                range,
                granularity,
                window.class_id,
                &roster,
                window.extended,
            );
            let class_label = format!("class {}", window.class_id);
            let report = build_report(&ReportInput {
                class_label: &class_label,
                range,
                standings: &rows,
                buckets: &buckets,
                options: ranking.options(),
                top,
            });
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Mark {
            class_id,
            date,
            calendar,
            all,
            copy_from,
            assignments,
            dry_run,
        } => {
            let roster = store.fetch_roster(class_id).await?;
            let mut cache = RecordCache::new();
            let records = cache
                .read_through(&store, class_id, DateScope::Day(date))
                .await?
                .to_vec();

            let scope = EditScope { class_id, date };
            let policy = if calendar {
                UnmarkedPolicy::LeaveUnmarked
            } else {
                UnmarkedPolicy::DefaultPresent
            };
            let mut buffer = EditBuffer::new(scope, &roster, &records, policy);

            if let Some(status) = all {
                let marked = buffer.mark_all(status);
                println!("Marked {marked} students {status}.");
            }
            if let Some(source_date) = copy_from {
                let source_records = cache
                    .read_through(&store, class_id, DateScope::Day(source_date))
                    .await?
                    .to_vec();
                let source = summarize_buckets(
                    &source_records,
                    DateRange::single(source_date),
                    Granularity::Day,
                    class_id,
                    &roster,
                    ExtendedStatusPolicy::Ignore,
                );
                match source.first() {
                    Some(bucket) => {
                        let copied = buffer.copy_from_bucket(bucket);
                        println!("Copied {copied} statuses from {source_date}.");
                    }
                    None => println!("No attendance recorded on {source_date}; nothing copied."),
                }
            }
            for (student_id, status) in assignments {
                if !buffer.set_status(student_id, status) {
                    println!("Student {student_id} is not on the roster; skipped.");
                }
            }

            let changes = buffer.changes();
            let new_marks: Vec<_> = buffer
                .new_marks()
                .into_iter()
                .filter(|edit| !changes.contains(edit))
                .collect();
            if changes.is_empty() && new_marks.is_empty() {
                println!("No changes against the recorded attendance.");
            }
            for edit in &changes {
                let before = buffer
                    .recorded_status_of(edit.student_id)
                    .map(|s| s.label())
                    .unwrap_or("unmarked");
                println!("- student {}: {} -> {}", edit.student_id, before, edit.status);
            }
            for edit in &new_marks {
                println!("- student {}: unmarked -> {} (new)", edit.student_id, edit.status);
            }

            if dry_run {
                println!("Dry run; nothing committed.");
                return Ok(());
            }
            if changes.is_empty() && new_marks.is_empty() {
                return Ok(());
            }

            let result = buffer
                .commit(&store)
                .await
                .context("commit failed; pending edits were kept")?;
            cache.invalidate_class(class_id);
            println!(
                "Committed {} records for class {} on {}.",
                result.persisted.len(),
                class_id,
                date
            );
        }
    }

    Ok(())
}
