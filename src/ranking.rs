use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::StudentStanding;

pub const PERFECT_RATE: f64 = 100.0;
pub const CONCERNING_BELOW: f64 = 80.0;

/// Which rate drives ranking, grading and flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
pub enum RateMetric {
    /// Only `Present` counts toward the rate.
    #[default]
    Present,
    /// `Present` and `Late` both count toward the rate.
    PresentOrLate,
}

impl RateMetric {
    pub fn rate_of(self, standing: &StudentStanding) -> f64 {
        match self {
            RateMetric::Present => standing.summary.present_rate(),
            RateMetric::PresentOrLate => standing.summary.present_or_late_rate(),
        }
    }
}

/// How students with no records enter the class average.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
pub enum ClassAveragePolicy {
    /// Unmarked students contribute a rate of 0.
    #[default]
    IncludeUnmarked,
    /// Unmarked students are left out of the denominator.
    ExcludeUnmarked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Grade {
    APlus,
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    pub fn from_rate(rate: f64) -> Grade {
        match rate {
            r if r >= 95.0 => Grade::APlus,
            r if r >= 90.0 => Grade::A,
            r if r >= 85.0 => Grade::B,
            r if r >= 80.0 => Grade::C,
            r if r >= 75.0 => Grade::D,
            _ => Grade::F,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Grade::APlus => "A+",
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RankingOptions {
    pub metric: RateMetric,
    pub average_policy: ClassAveragePolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedStudent {
    pub rank: usize,
    pub rate: f64,
    /// `None` for students without any records.
    pub grade: Option<Grade>,
    pub perfect: bool,
    pub concerning: bool,
    pub standing: StudentStanding,
}

impl RankedStudent {
    pub fn student_id(&self) -> i64 {
        self.standing.student_id()
    }
}

/// Orders students by rate, highest first. On equal rates students with
/// records come before unmarked ones, then the smaller student id wins.
/// Unmarked students stay in the list at rate 0, below every marked student.
pub fn rank_students(standings: &[StudentStanding], metric: RateMetric) -> Vec<RankedStudent> {
    let mut rows: Vec<(f64, &StudentStanding)> = standings
        .iter()
        .map(|standing| (metric.rate_of(standing), standing))
        .collect();

    rows.sort_by(|(rate_a, a), (rate_b, b)| {
        rate_b
            .partial_cmp(rate_a)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.summary.has_records().cmp(&a.summary.has_records()))
            .then_with(|| a.student_id().cmp(&b.student_id()))
    });

    rows.into_iter()
        .enumerate()
        .map(|(idx, (rate, standing))| {
            let marked = standing.summary.has_records();
            RankedStudent {
                rank: idx + 1,
                rate,
                grade: marked.then(|| Grade::from_rate(rate)),
                perfect: marked && rate >= PERFECT_RATE,
                concerning: marked && rate < CONCERNING_BELOW,
                standing: standing.clone(),
            }
        })
        .collect()
}

pub fn class_average(standings: &[StudentStanding], options: RankingOptions) -> f64 {
    let rates: Vec<f64> = standings
        .iter()
        .filter(|standing| match options.average_policy {
            ClassAveragePolicy::IncludeUnmarked => true,
            ClassAveragePolicy::ExcludeUnmarked => standing.summary.has_records(),
        })
        .map(|standing| options.metric.rate_of(standing))
        .collect();

    if rates.is_empty() {
        0.0
    } else {
        rates.iter().sum::<f64>() / rates.len() as f64
    }
}

pub fn perfect_attendance(ranked: &[RankedStudent]) -> Vec<&RankedStudent> {
    ranked.iter().filter(|row| row.perfect).collect()
}

pub fn concerning_attendance(ranked: &[RankedStudent]) -> Vec<&RankedStudent> {
    ranked.iter().filter(|row| row.concerning).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RosterEntry, StudentAttendanceSummary};

    fn standing(id: i64, present: u32, absent: u32, late: u32) -> StudentStanding {
        StudentStanding {
            student: RosterEntry::new(id, format!("Student {id}")),
            summary: StudentAttendanceSummary::from_counts(present, absent, late, 0),
        }
    }

    #[test]
    fn grade_bands_are_closed_open() {
        assert_eq!(Grade::from_rate(100.0), Grade::APlus);
        assert_eq!(Grade::from_rate(95.0), Grade::APlus);
        assert_eq!(Grade::from_rate(94.99), Grade::A);
        assert_eq!(Grade::from_rate(90.0), Grade::A);
        assert_eq!(Grade::from_rate(89.9), Grade::B);
        assert_eq!(Grade::from_rate(85.0), Grade::B);
        assert_eq!(Grade::from_rate(80.0), Grade::C);
        assert_eq!(Grade::from_rate(79.9), Grade::D);
        assert_eq!(Grade::from_rate(75.0), Grade::D);
        assert_eq!(Grade::from_rate(74.9), Grade::F);
        assert_eq!(Grade::from_rate(0.0), Grade::F);
        assert_eq!(Grade::APlus.to_string(), "A+");
    }

    #[test]
    fn ranks_by_rate_then_student_id() {
        let standings = vec![
            standing(5, 1, 1, 0),
            standing(2, 1, 0, 0),
            standing(3, 1, 1, 0),
            standing(4, 0, 0, 0),
        ];
        let ranked = rank_students(&standings, RateMetric::Present);
        let ids: Vec<i64> = ranked.iter().map(|r| r.student_id()).collect();
        assert_eq!(ids, vec![2, 3, 5, 4]);
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[3].rank, 4);
    }

    #[test]
    fn unmarked_students_rank_below_marked_zero_rates() {
        let standings = vec![standing(1, 0, 0, 0), standing(9, 0, 2, 0), standing(4, 0, 0, 0)];
        let ranked = rank_students(&standings, RateMetric::Present);
        let ids: Vec<i64> = ranked.iter().map(|r| r.student_id()).collect();
        assert_eq!(ids, vec![9, 1, 4]);
        assert_eq!(ranked[0].grade, Some(Grade::F));
        assert_eq!(ranked[1].grade, None);
    }

    #[test]
    fn unmarked_students_are_ranked_but_not_graded() {
        let ranked = rank_students(&[standing(1, 0, 0, 0)], RateMetric::Present);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].rate, 0.0);
        assert_eq!(ranked[0].grade, None);
        assert!(!ranked[0].perfect);
        assert!(!ranked[0].concerning);
    }

    #[test]
    fn flags_perfect_and_concerning() {
        let standings = vec![standing(1, 4, 0, 0), standing(2, 3, 1, 0), standing(3, 4, 1, 0)];
        let ranked = rank_students(&standings, RateMetric::Present);
        let perfect: Vec<i64> = perfect_attendance(&ranked).iter().map(|r| r.student_id()).collect();
        let concerning: Vec<i64> =
            concerning_attendance(&ranked).iter().map(|r| r.student_id()).collect();
        assert_eq!(perfect, vec![1]);
        // 75% is concerning, 80% is not.
        assert_eq!(concerning, vec![2]);
    }

    #[test]
    fn metric_choice_changes_rates() {
        let standings = vec![standing(1, 1, 0, 1)];
        let present = rank_students(&standings, RateMetric::Present);
        let with_late = rank_students(&standings, RateMetric::PresentOrLate);
        assert_eq!(present[0].rate, 50.0);
        assert_eq!(with_late[0].rate, 100.0);
        assert!(with_late[0].perfect);
    }

    #[test]
    fn class_average_policies() {
        let standings = vec![standing(1, 1, 0, 0), standing(2, 1, 1, 0), standing(3, 0, 0, 0)];
        let included = class_average(&standings, RankingOptions::default());
        assert!((included - 50.0).abs() < 1e-9);

        let excluded = class_average(
            &standings,
            RankingOptions {
                average_policy: ClassAveragePolicy::ExcludeUnmarked,
                ..RankingOptions::default()
            },
        );
        assert!((excluded - 75.0).abs() < 1e-9);
        assert_eq!(class_average(&[], RankingOptions::default()), 0.0);
    }
}
