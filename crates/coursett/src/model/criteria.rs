use std::fmt;

use serde::Serialize;

use super::{
    constants::{PREFERENCE_LEVEL_DISCOURAGED, PREFERENCE_LEVEL_STRONGLY_DISCOURAGED},
    score::{Score, ScoreAnalysis},
};

/// A soft component of the timetable objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Criterion {
    TimePreferences,
    RoomPreferences,
    TooBigRooms,
    DistributionPreferences,
    InstructorDistancePreferences,
    StudentConflicts,
    UselessHalfHours,
    BrokenTimePatterns,
    SameSubpartBalancingPenalty,
    DepartmentBalancingPenalty,
}

impl Criterion {
    pub const COUNT: usize = 10;

    pub const ALL: [Criterion; Criterion::COUNT] = [
        Criterion::TimePreferences,
        Criterion::RoomPreferences,
        Criterion::TooBigRooms,
        Criterion::DistributionPreferences,
        Criterion::InstructorDistancePreferences,
        Criterion::StudentConflicts,
        Criterion::UselessHalfHours,
        Criterion::BrokenTimePatterns,
        Criterion::SameSubpartBalancingPenalty,
        Criterion::DepartmentBalancingPenalty,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Criterion::TimePreferences => "TimePreferences",
            Criterion::RoomPreferences => "RoomPreferences",
            Criterion::TooBigRooms => "TooBigRooms",
            Criterion::DistributionPreferences => "DistributionPreferences",
            Criterion::InstructorDistancePreferences => "InstructorDistancePreferences",
            Criterion::StudentConflicts => "StudentConflicts",
            Criterion::UselessHalfHours => "UselessHalfHours",
            Criterion::BrokenTimePatterns => "BrokenTimePatterns",
            Criterion::SameSubpartBalancingPenalty => "SameSubpartBalancingPenalty",
            Criterion::DepartmentBalancingPenalty => "DepartmentBalancingPenalty",
        }
    }

    /// Configuration key of the weight.
    pub fn weight_key(&self) -> &'static str {
        match self {
            Criterion::TimePreferences => "Comparator.TimePreferenceWeight",
            Criterion::RoomPreferences => "Comparator.RoomPreferenceWeight",
            Criterion::TooBigRooms => "Comparator.TooBigRoomWeight",
            Criterion::DistributionPreferences => "Comparator.ContrPreferenceWeight",
            Criterion::InstructorDistancePreferences => {
                "Comparator.DistanceInstructorPreferenceWeight"
            }
            Criterion::StudentConflicts => "Comparator.StudentConflictWeight",
            Criterion::UselessHalfHours | Criterion::BrokenTimePatterns => {
                "Comparator.UselessSlotWeight"
            }
            Criterion::SameSubpartBalancingPenalty => "Comparator.SpreadPenaltyWeight",
            Criterion::DepartmentBalancingPenalty => "Comparator.DeptSpreadPenaltyWeight",
        }
    }

    pub fn default_weight(&self) -> f64 {
        match self {
            Criterion::TimePreferences => 1.0,
            Criterion::RoomPreferences => 0.1,
            Criterion::TooBigRooms => 0.0,
            Criterion::DistributionPreferences => 1.0,
            Criterion::InstructorDistancePreferences => 1.0,
            Criterion::StudentConflicts => 0.2,
            Criterion::UselessHalfHours | Criterion::BrokenTimePatterns => 0.1,
            Criterion::SameSubpartBalancingPenalty => 1.0,
            Criterion::DepartmentBalancingPenalty => 1.0,
        }
    }

    /// Multiplier applied to the configured weight. Both useless slot
    /// criteria share one key and differ by preference level.
    pub fn weight_scale(&self) -> f64 {
        match self {
            Criterion::UselessHalfHours => PREFERENCE_LEVEL_STRONGLY_DISCOURAGED as f64,
            Criterion::BrokenTimePatterns => PREFERENCE_LEVEL_DISCOURAGED as f64,
            _ => 1.0,
        }
    }

    /// Effective weight for a configured value of [`Criterion::weight_key`].
    pub fn scaled_weight(&self, configured: f64) -> f64 {
        configured * self.weight_scale()
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Running values of every criterion, updated incrementally by the model and
/// its constraints.
#[derive(Debug, Clone)]
pub struct Criteria {
    values: [f64; Criterion::COUNT],
    weights: [f64; Criterion::COUNT],
}

impl Criteria {
    pub fn new(weights: [f64; Criterion::COUNT]) -> Self {
        Criteria {
            values: [0.0; Criterion::COUNT],
            weights,
        }
    }

    pub fn inc(&mut self, criterion: Criterion, delta: f64) {
        self.values[criterion.index()] += delta;
    }

    pub fn value(&self, criterion: Criterion) -> f64 {
        self.values[criterion.index()]
    }

    pub fn weight(&self, criterion: Criterion) -> f64 {
        self.weights[criterion.index()]
    }

    pub fn weighted_value(&self, criterion: Criterion) -> f64 {
        self.value(criterion) * self.weight(criterion)
    }

    pub fn total(&self) -> f64 {
        Criterion::ALL
            .iter()
            .map(|criterion| self.weighted_value(*criterion))
            .sum()
    }

    pub fn analysis(&self) -> ScoreAnalysis {
        let mut analysis = ScoreAnalysis::default();
        for criterion in Criterion::ALL {
            analysis
                .scores
                .insert(criterion.name(), Score::soft(self.weighted_value(criterion)));
        }
        analysis
    }
}

impl Default for Criteria {
    fn default() -> Self {
        Criteria::new(
            Criterion::ALL.map(|criterion| criterion.scaled_weight(criterion.default_weight())),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weighted_total() {
        let mut criteria = Criteria::default();
        criteria.inc(Criterion::TimePreferences, 3.0);
        criteria.inc(Criterion::StudentConflicts, 10.0);
        criteria.inc(Criterion::TimePreferences, -1.0);

        assert_eq!(criteria.value(Criterion::TimePreferences), 2.0);
        assert!((criteria.total() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_analysis_lists_every_criterion() {
        let mut criteria = Criteria::default();
        criteria.inc(Criterion::DistributionPreferences, 4.0);
        let analysis = criteria.analysis();

        assert_eq!(analysis.scores.len(), Criterion::COUNT);
        assert_eq!(analysis.scores["DistributionPreferences"], Score::soft(4.0));
    }

    #[test]
    fn test_useless_slot_weights_share_one_key() {
        let criteria = Criteria::default();

        assert_eq!(
            Criterion::UselessHalfHours.weight_key(),
            Criterion::BrokenTimePatterns.weight_key()
        );
        assert!((criteria.weight(Criterion::UselessHalfHours) - 0.4).abs() < 1e-9);
        assert!((criteria.weight(Criterion::BrokenTimePatterns) - 0.1).abs() < 1e-9);
    }
}
