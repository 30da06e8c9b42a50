use thiserror::Error;

use crate::{
    constraints::constraint::ConstraintIdx,
    model::{
        lecture::LectureIdx,
        placement::PlacementIdx,
        student::{ConfigurationIdx, StudentIdx},
    },
};

#[derive(Debug, Error, PartialEq)]
pub enum TimetableError {
    #[error("Unknown constraint type: {0}")]
    UnknownConstraintType(String),

    #[error("Invalid preference: {0}")]
    InvalidPreference(String),

    #[error("Invalid value for property {key}: {value}")]
    InvalidProperty { key: String, value: String },

    #[error("Lecture {0} does not exist")]
    InvalidLecture(LectureIdx),

    #[error("Configuration {0} does not exist")]
    InvalidConfiguration(ConfigurationIdx),

    #[error("Student {0} does not exist")]
    InvalidStudent(StudentIdx),

    #[error("Constraint {0} does not exist")]
    InvalidConstraint(ConstraintIdx),

    #[error("Placement {0} does not exist")]
    InvalidPlacement(PlacementIdx),

    #[error("Placement {placement} does not belong to lecture {lecture}")]
    PlacementNotOwned {
        placement: PlacementIdx,
        lecture: LectureIdx,
    },
}
