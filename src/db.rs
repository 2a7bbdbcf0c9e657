use std::path::Path;

use chrono::{Duration, NaiveDate};
use log::{info, warn};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AttendanceError, Result};
use crate::models::{AttendanceRecord, CommitResult, DateScope, PendingEdit, RosterEntry};
use crate::source::AttendanceSource;
use crate::status::AttendanceStatus;

/// Postgres-backed attendance source.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(config: &Config) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

pub async fn init_db(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| AttendanceError::Database(e.into()))?;
    Ok(())
}

fn record_from_row(row: &PgRow) -> Result<AttendanceRecord> {
    let raw_status: String = row.try_get("status")?;
    Ok(AttendanceRecord {
        student_id: row.try_get("student_id")?,
        class_id: row.try_get("class_id")?,
        date: row.try_get("attendance_date")?,
        status: raw_status.parse()?,
        remarks: row.try_get("remarks")?,
    })
}

impl AttendanceSource for PgStore {
    async fn fetch_records(&self, class_id: i64, scope: &DateScope) -> Result<Vec<AttendanceRecord>> {
        let range = scope.as_range();
        let rows = sqlx::query(
            r#"
            SELECT student_id, class_id, attendance_date, status, remarks
            FROM attendance.records
            WHERE class_id = $1 AND attendance_date BETWEEN $2 AND $3
            ORDER BY attendance_date, recorded_at
            "#,
        )
        .bind(class_id)
        .bind(range.start())
        .bind(range.end())
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            match record_from_row(&row) {
                Ok(record) => records.push(record),
                Err(e) => warn!("skipping unreadable record in class {class_id}: {e}"),
            }
        }
        Ok(records)
    }

    async fn fetch_roster(&self, class_id: i64) -> Result<Vec<RosterEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT student_id, display_name, email, grade_level
            FROM attendance.roster
            WHERE class_id = $1
            ORDER BY student_id
            "#,
        )
        .bind(class_id)
        .fetch_all(&self.pool)
        .await?;

        let mut roster = Vec::with_capacity(rows.len());
        for row in rows {
            roster.push(RosterEntry {
                student_id: row.try_get("student_id")?,
                display_name: row.try_get("display_name")?,
                email: row.try_get("email")?,
                grade_level: row.try_get("grade_level")?,
            });
        }
        Ok(roster)
    }

    async fn commit_edits(
        &self,
        class_id: i64,
        date: NaiveDate,
        edits: &[PendingEdit],
    ) -> Result<CommitResult> {
        let failure = |e: sqlx::Error| AttendanceError::CommitFailure {
            class_id,
            date,
            reason: e.to_string(),
        };

        let mut tx = self.pool.begin().await.map_err(failure)?;
        let mut persisted = Vec::with_capacity(edits.len());

        for edit in edits {
            let row = sqlx::query(
                r#"
                INSERT INTO attendance.records
                (id, class_id, student_id, attendance_date, status)
                SELECT $1::uuid, $2::bigint, $3::bigint, $4::date, $5::text
                WHERE EXISTS (
                    SELECT 1 FROM attendance.roster WHERE class_id = $2 AND student_id = $3
                )
                ON CONFLICT (student_id, attendance_date, class_id) DO UPDATE
                SET status = EXCLUDED.status, recorded_at = now()
                RETURNING student_id, class_id, attendance_date, status, remarks
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(class_id)
            .bind(edit.student_id)
            .bind(date)
            .bind(edit.status.code())
            .fetch_optional(&mut *tx)
            .await
            .map_err(failure)?;

            match row {
                Some(row) => persisted.push(record_from_row(&row)?),
                None => warn!(
                    "student {} is not enrolled in class {class_id}; edit dropped",
                    edit.student_id
                ),
            }
        }

        tx.commit().await.map_err(failure)?;
        info!(
            "persisted {} of {} edits for class {class_id} on {date}",
            persisted.len(),
            edits.len()
        );

        Ok(CommitResult {
            success: true,
            persisted,
        })
    }
}

async fn upsert_roster_entry(pool: &PgPool, class_id: i64, entry: &RosterEntry) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO attendance.roster (class_id, student_id, display_name, email, grade_level)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (class_id, student_id) DO UPDATE
        SET display_name = EXCLUDED.display_name,
            email = EXCLUDED.email,
            grade_level = EXCLUDED.grade_level
        "#,
    )
    .bind(class_id)
    .bind(entry.student_id)
    .bind(&entry.display_name)
    .bind(&entry.email)
    .bind(&entry.grade_level)
    .execute(pool)
    .await?;
    Ok(())
}

async fn upsert_record(pool: &PgPool, record: &AttendanceRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO attendance.records
        (id, class_id, student_id, attendance_date, status, remarks)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (student_id, attendance_date, class_id) DO UPDATE
        SET status = EXCLUDED.status, remarks = EXCLUDED.remarks, recorded_at = now()
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(record.class_id)
    .bind(record.student_id)
    .bind(record.date)
    .bind(record.status.code())
    .bind(&record.remarks)
    .execute(pool)
    .await?;
    Ok(())
}

pub const SEED_CLASS_ID: i64 = 101;

/// Loads a small class with one school week of attendance.
pub async fn seed(pool: &PgPool) -> Result<()> {
    let students = [
        (1, "Avery Lee", "avery.lee@groupscholar.com", "10"),
        (2, "Jules Moreno", "jules.moreno@groupscholar.com", "10"),
        (3, "Kiara Patel", "kiara.patel@groupscholar.com", "11"),
    ];

    for (student_id, name, email, grade_level) in students {
        let entry = RosterEntry {
            student_id,
            display_name: name.to_string(),
            email: Some(email.to_string()),
            grade_level: Some(grade_level.to_string()),
        };
        upsert_roster_entry(pool, SEED_CLASS_ID, &entry).await?;
    }

    use AttendanceStatus::{Absent, Excused, Late, Present};
    let week: [[AttendanceStatus; 3]; 5] = [
        [Present, Present, Absent],
        [Present, Late, Present],
        [Present, Present, Absent],
        [Present, Absent, Excused],
        [Present, Present, Late],
    ];
    let monday = NaiveDate::from_ymd_opt(2026, 2, 2)
        .ok_or_else(|| AttendanceError::MalformedInput("invalid seed date".to_string()))?;

    for (offset, day) in week.iter().enumerate() {
        let date = monday + Duration::days(offset as i64);
        for (idx, status) in day.iter().enumerate() {
            let record = AttendanceRecord::new(idx as i64 + 1, date, *status, SEED_CLASS_ID);
            upsert_record(pool, &record).await?;
        }
    }

    Ok(())
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub upserted: usize,
    pub skipped: usize,
}

/// Imports roster and attendance rows from a CSV file. Rows with an
/// unknown status are skipped; re-imported rows overwrite earlier ones.
pub async fn import_csv(pool: &PgPool, csv_path: &Path) -> Result<ImportSummary> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        class_id: i64,
        student_id: i64,
        full_name: String,
        email: Option<String>,
        grade_level: Option<String>,
        date: NaiveDate,
        status: String,
        remarks: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut summary = ImportSummary::default();

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result?;
        let status: AttendanceStatus = match row.status.parse() {
            Ok(status) => status,
            Err(e) => {
                warn!("{}: row {} skipped: {e}", csv_path.display(), line + 2);
                summary.skipped += 1;
                continue;
            }
        };

        let entry = RosterEntry {
            student_id: row.student_id,
            display_name: row.full_name,
            email: row.email,
            grade_level: row.grade_level,
        };
        upsert_roster_entry(pool, row.class_id, &entry).await?;

        let record = AttendanceRecord {
            student_id: row.student_id,
            date: row.date,
            status,
            class_id: row.class_id,
            remarks: row.remarks.filter(|r| !r.trim().is_empty()),
        };
        upsert_record(pool, &record).await?;
        summary.upserted += 1;
    }

    Ok(summary)
}
