use std::{fmt, str::FromStr};

use serde::Serialize;

use crate::error::TimetableError;

use super::constants::{
    PREFERENCE_DISCOURAGED, PREFERENCE_LEVEL_DISCOURAGED, PREFERENCE_LEVEL_NEUTRAL,
    PREFERENCE_LEVEL_PREFERRED, PREFERENCE_LEVEL_PROHIBITED, PREFERENCE_LEVEL_REQUIRED,
    PREFERENCE_LEVEL_STRONGLY_DISCOURAGED, PREFERENCE_LEVEL_STRONGLY_PREFERRED,
    PREFERENCE_NEUTRAL, PREFERENCE_PREFERRED, PREFERENCE_PROHIBITED, PREFERENCE_REQUIRED,
    PREFERENCE_STRONGLY_DISCOURAGED, PREFERENCE_STRONGLY_PREFERRED,
};

/// A preference as written in the input data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Preference {
    Required,
    Prohibited,
    /// Soft level, negative is preferred.
    Soft(i32),
}

impl Preference {
    pub fn from_level(level: i32) -> Self {
        match level {
            PREFERENCE_LEVEL_REQUIRED => Preference::Required,
            PREFERENCE_LEVEL_PROHIBITED => Preference::Prohibited,
            level => Preference::Soft(level),
        }
    }

    pub fn level(&self) -> i32 {
        match self {
            Preference::Required => PREFERENCE_LEVEL_REQUIRED,
            Preference::Prohibited => PREFERENCE_LEVEL_PROHIBITED,
            Preference::Soft(level) => *level,
        }
    }

    pub fn is_hard(&self) -> bool {
        matches!(self, Preference::Required | Preference::Prohibited)
    }

    pub fn is_required(&self) -> bool {
        matches!(self, Preference::Required)
    }

    pub fn is_prohibited(&self) -> bool {
        matches!(self, Preference::Prohibited)
    }
}

impl FromStr for Preference {
    type Err = TimetableError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let preference = match value.trim() {
            PREFERENCE_REQUIRED => Preference::Required,
            PREFERENCE_PROHIBITED => Preference::Prohibited,
            PREFERENCE_STRONGLY_PREFERRED => Preference::Soft(PREFERENCE_LEVEL_STRONGLY_PREFERRED),
            PREFERENCE_PREFERRED => Preference::Soft(PREFERENCE_LEVEL_PREFERRED),
            PREFERENCE_NEUTRAL => Preference::Soft(PREFERENCE_LEVEL_NEUTRAL),
            PREFERENCE_DISCOURAGED => Preference::Soft(PREFERENCE_LEVEL_DISCOURAGED),
            PREFERENCE_STRONGLY_DISCOURAGED => {
                Preference::Soft(PREFERENCE_LEVEL_STRONGLY_DISCOURAGED)
            }
            other => return Err(TimetableError::InvalidPreference(other.to_string())),
        };
        Ok(preference)
    }
}

impl fmt::Display for Preference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self.level() {
            PREFERENCE_LEVEL_REQUIRED => PREFERENCE_REQUIRED,
            PREFERENCE_LEVEL_PROHIBITED => PREFERENCE_PROHIBITED,
            PREFERENCE_LEVEL_STRONGLY_PREFERRED => PREFERENCE_STRONGLY_PREFERRED,
            PREFERENCE_LEVEL_PREFERRED => PREFERENCE_PREFERRED,
            PREFERENCE_LEVEL_DISCOURAGED => PREFERENCE_DISCOURAGED,
            PREFERENCE_LEVEL_STRONGLY_DISCOURAGED => PREFERENCE_STRONGLY_DISCOURAGED,
            PREFERENCE_LEVEL_NEUTRAL => PREFERENCE_NEUTRAL,
            level => return write!(f, "{level}"),
        };
        f.write_str(text)
    }
}

/// Combines room preferences of a multi-room placement: a prohibited room
/// wins over everything, then a required one, otherwise levels add up.
#[derive(Debug, Default, Clone, Copy)]
pub struct PreferenceCombination {
    required: bool,
    prohibited: bool,
    sum: i32,
}

impl PreferenceCombination {
    pub fn add_level(&mut self, level: i32) {
        match Preference::from_level(level) {
            Preference::Required => self.required = true,
            Preference::Prohibited => self.prohibited = true,
            Preference::Soft(level) => self.sum += level,
        }
    }

    pub fn level(&self) -> i32 {
        if self.prohibited {
            PREFERENCE_LEVEL_PROHIBITED
        } else if self.required {
            PREFERENCE_LEVEL_REQUIRED
        } else {
            self.sum
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_preference() {
        assert_eq!("R".parse::<Preference>().unwrap(), Preference::Required);
        assert_eq!("P".parse::<Preference>().unwrap(), Preference::Prohibited);
        assert_eq!("-2".parse::<Preference>().unwrap().level(), -4);
        assert_eq!("2".parse::<Preference>().unwrap().level(), 4);
        assert_eq!("1".parse::<Preference>().unwrap().level(), 1);
        assert!(matches!(
            "3".parse::<Preference>(),
            Err(TimetableError::InvalidPreference(value)) if value == "3"
        ));
    }

    #[test]
    fn test_display_round_trips_known_levels() {
        for text in ["R", "P", "-2", "-1", "0", "1", "2"] {
            let preference: Preference = text.parse().unwrap();
            assert_eq!(preference.to_string(), text);
        }
    }

    #[test]
    fn test_combination() {
        let mut combination = PreferenceCombination::default();
        combination.add_level(1);
        combination.add_level(4);
        assert_eq!(combination.level(), 5);

        combination.add_level(PREFERENCE_LEVEL_REQUIRED);
        assert_eq!(combination.level(), PREFERENCE_LEVEL_REQUIRED);

        combination.add_level(PREFERENCE_LEVEL_PROHIBITED);
        assert_eq!(combination.level(), PREFERENCE_LEVEL_PROHIBITED);
    }
}
