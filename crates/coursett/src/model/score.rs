use std::{
    cmp::Ordering,
    iter,
    ops::{Add, AddAssign, Div, Mul, Sub, SubAssign},
};

use fxhash::FxHashMap;
use serde::Serialize;

/// Objective value of a timetable: unassigned lectures first, then the
/// weighted soft criteria.
#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub struct Score {
    pub hard_score: f64,
    pub soft_score: f64,
}

impl Score {
    pub const MAX: Score = Score {
        hard_score: f64::MAX,
        soft_score: f64::MAX,
    };

    pub const MIN: Score = Score {
        hard_score: f64::MIN,
        soft_score: f64::MIN,
    };

    pub const ZERO: Score = Score {
        hard_score: 0.0,
        soft_score: 0.0,
    };

    pub fn new(hard_score: f64, soft_score: f64) -> Self {
        Score {
            hard_score,
            soft_score,
        }
    }

    pub fn hard(hard_score: f64) -> Self {
        Score {
            hard_score,
            soft_score: 0.0,
        }
    }

    pub fn soft(soft_score: f64) -> Self {
        Score {
            hard_score: 0.0,
            soft_score,
        }
    }

    pub fn zero() -> Self {
        Score::ZERO
    }

    pub fn round(&self) -> Self {
        Score {
            hard_score: self.hard_score.round(),
            soft_score: self.soft_score.round(),
        }
    }

    /// Some lectures are left unassigned.
    pub fn is_incomplete(&self) -> bool {
        self.hard_score > 0.0
    }
}

impl Eq for Score {}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> Ordering {
        self.hard_score
            .total_cmp(&other.hard_score)
            .then_with(|| self.soft_score.total_cmp(&other.soft_score))
    }
}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl iter::Sum for Score {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), |acc, score| acc + score)
    }
}

impl Add<Score> for Score {
    type Output = Self;

    fn add(self, other: Self) -> Self::Output {
        Score {
            hard_score: self.hard_score + other.hard_score,
            soft_score: self.soft_score + other.soft_score,
        }
    }
}

impl AddAssign<Score> for Score {
    fn add_assign(&mut self, other: Score) {
        self.hard_score += other.hard_score;
        self.soft_score += other.soft_score;
    }
}

impl Sub<Score> for Score {
    type Output = Self;

    fn sub(self, other: Self) -> Self::Output {
        Score {
            hard_score: self.hard_score - other.hard_score,
            soft_score: self.soft_score - other.soft_score,
        }
    }
}

impl SubAssign<Score> for Score {
    fn sub_assign(&mut self, other: Score) {
        self.hard_score -= other.hard_score;
        self.soft_score -= other.soft_score;
    }
}

impl Div<f64> for Score {
    type Output = Self;

    fn div(self, divisor: f64) -> Self::Output {
        Score {
            hard_score: self.hard_score / divisor,
            soft_score: self.soft_score / divisor,
        }
    }
}

impl Mul<f64> for Score {
    type Output = Self;

    fn mul(self, scalar: f64) -> Self::Output {
        Score {
            hard_score: self.hard_score * scalar,
            soft_score: self.soft_score * scalar,
        }
    }
}

#[derive(Default, Clone, Debug, Serialize)]
pub struct ScoreAnalysis {
    pub scores: FxHashMap<&'static str, Score>,
}

impl ScoreAnalysis {
    pub fn total_score(&self) -> Score {
        self.scores.values().copied().sum()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_addition() {
        let score1 = Score::hard(10.0);
        let score2 = Score::soft(5.0);
        let result = score1 + score2;
        assert_eq!(result.hard_score, 10.0);
        assert_eq!(result.soft_score, 5.0);
    }

    #[test]
    fn test_score_subtraction() {
        let mut score = Score::new(3.0, 2.5);
        score -= Score::soft(5.0);
        assert_eq!(score.hard_score, 3.0);
        assert_eq!(score.soft_score, -2.5);
    }

    #[test]
    fn test_score_sum() {
        let scores = vec![Score::hard(2.0), Score::soft(0.5), Score::hard(1.0)];
        let total: Score = scores.into_iter().sum();
        assert_eq!(total.hard_score, 3.0);
        assert_eq!(total.soft_score, 0.5);
    }

    #[test]
    fn test_unassigned_lectures_dominate() {
        let complete = Score::new(0.0, 1000.0);
        let incomplete = Score::new(1.0, -50.0);

        assert!(complete < incomplete);
        assert!(incomplete.is_incomplete());
        assert!(!complete.is_incomplete());
        assert_eq!(
            Score::new(2.0, 10.0).cmp(&Score::new(2.0, 12.5)),
            Ordering::Less
        );
    }

    #[test]
    fn test_analysis_total() {
        let mut analysis = ScoreAnalysis::default();
        analysis.scores.insert("TimePreferences", Score::soft(1.5));
        analysis.scores.insert("Unassigned", Score::hard(2.0));

        assert_eq!(analysis.total_score(), Score::new(2.0, 1.5));
        assert!(analysis.to_json().is_ok());
    }
}
