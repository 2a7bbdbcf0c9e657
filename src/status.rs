use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AttendanceError;

/// Attendance status recorded for one student on one class day.
///
/// The first four variants form the core taxonomy that every statistic is
/// computed over. The remaining leave variants come from the extended
/// taxonomy and are display-only unless an [`ExtendedStatusPolicy`] says
/// otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    Excused,
    SickLeave,
    MedicalLeave,
    Other,
}

impl AttendanceStatus {
    pub const CORE: [AttendanceStatus; 4] = [
        AttendanceStatus::Present,
        AttendanceStatus::Absent,
        AttendanceStatus::Late,
        AttendanceStatus::Excused,
    ];

    pub const ALL: [AttendanceStatus; 7] = [
        AttendanceStatus::Present,
        AttendanceStatus::Absent,
        AttendanceStatus::Late,
        AttendanceStatus::Excused,
        AttendanceStatus::SickLeave,
        AttendanceStatus::MedicalLeave,
        AttendanceStatus::Other,
    ];

    pub fn is_core(self) -> bool {
        matches!(
            self,
            AttendanceStatus::Present
                | AttendanceStatus::Absent
                | AttendanceStatus::Late
                | AttendanceStatus::Excused
        )
    }

    /// Only `Present` counts as present. `Late` is tracked on its own.
    pub fn is_present_like(self) -> bool {
        self == AttendanceStatus::Present
    }

    pub fn label(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "Present",
            AttendanceStatus::Absent => "Absent",
            AttendanceStatus::Late => "Late",
            AttendanceStatus::Excused => "Excused",
            AttendanceStatus::SickLeave => "Sick Leave",
            AttendanceStatus::MedicalLeave => "Medical Leave",
            AttendanceStatus::Other => "Other",
        }
    }

    /// Storage code, matching the serde representation.
    pub fn code(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "PRESENT",
            AttendanceStatus::Absent => "ABSENT",
            AttendanceStatus::Late => "LATE",
            AttendanceStatus::Excused => "EXCUSED",
            AttendanceStatus::SickLeave => "SICK_LEAVE",
            AttendanceStatus::MedicalLeave => "MEDICAL_LEAVE",
            AttendanceStatus::Other => "OTHER",
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for AttendanceStatus {
    type Err = AttendanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace([' ', '-'], "_");
        AttendanceStatus::ALL
            .into_iter()
            .find(|status| status.code() == normalized)
            .ok_or_else(|| AttendanceError::UnknownStatus(s.to_string()))
    }
}

/// How extended (non-core) statuses are treated when counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ExtendedStatusPolicy {
    /// Extended statuses are skipped entirely and do not count toward totals.
    #[default]
    Ignore,
    /// Sick leave, medical leave and other are counted as excused.
    FoldIntoExcused,
}

impl ExtendedStatusPolicy {
    /// Maps a status onto the core taxonomy, or `None` when it is not counted.
    pub fn resolve(self, status: AttendanceStatus) -> Option<AttendanceStatus> {
        if status.is_core() {
            return Some(status);
        }
        match self {
            ExtendedStatusPolicy::Ignore => None,
            ExtendedStatusPolicy::FoldIntoExcused => Some(AttendanceStatus::Excused),
        }
    }
}
