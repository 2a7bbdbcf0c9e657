//! Flat tabular export of ranked students.

use std::io::Write;
use std::path::Path;

use serde::Serialize;

use crate::error::Result;
use crate::ranking::RankedStudent;

pub const HEADER: [&str; 9] = [
    "Student Name",
    "Email",
    "Grade Level",
    "Present",
    "Absent",
    "Late",
    "Excused",
    "Total",
    "Attendance Rate",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportRow {
    #[serde(rename = "Student Name")]
    pub name: String,
    #[serde(rename = "Email")]
    pub email: String,
    #[serde(rename = "Grade Level")]
    pub grade_level: String,
    #[serde(rename = "Present")]
    pub present: u32,
    #[serde(rename = "Absent")]
    pub absent: u32,
    #[serde(rename = "Late")]
    pub late: u32,
    #[serde(rename = "Excused")]
    pub excused: u32,
    #[serde(rename = "Total")]
    pub total: u32,
    #[serde(rename = "Attendance Rate")]
    pub rate: String,
}

impl ExportRow {
    pub fn cells(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.email.clone(),
            self.grade_level.clone(),
            self.present.to_string(),
            self.absent.to_string(),
            self.late.to_string(),
            self.excused.to_string(),
            self.total.to_string(),
            self.rate.clone(),
        ]
    }
}

pub fn format_rate(rate: f64) -> String {
    format!("{rate:.1}%")
}

/// One row per ranked student, in ranking order.
pub fn export_rows(ranked: &[RankedStudent]) -> Vec<ExportRow> {
    ranked
        .iter()
        .map(|row| {
            let student = &row.standing.student;
            let summary = &row.standing.summary;
            ExportRow {
                name: student.display_name.clone(),
                email: student.email.clone().unwrap_or_default(),
                grade_level: student.grade_level.clone().unwrap_or_default(),
                present: summary.present,
                absent: summary.absent,
                late: summary.late,
                excused: summary.excused,
                total: summary.total,
                rate: format_rate(row.rate),
            }
        })
        .collect()
}

/// Header row followed by every student row, as plain strings.
pub fn export_table(ranked: &[RankedStudent]) -> Vec<Vec<String>> {
    let header = HEADER.iter().map(|cell| cell.to_string()).collect();
    std::iter::once(header)
        .chain(export_rows(ranked).iter().map(ExportRow::cells))
        .collect()
}

pub fn write_csv<W: Write>(ranked: &[RankedStudent], writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    let rows = export_rows(ranked);
    if rows.is_empty() {
        csv_writer.write_record(HEADER)?;
    }
    for row in rows {
        csv_writer.serialize(row)?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn write_csv_file(ranked: &[RankedStudent], path: &Path) -> Result<()> {
    let file = std::fs::File::create(path)?;
    write_csv(ranked, file)
}
