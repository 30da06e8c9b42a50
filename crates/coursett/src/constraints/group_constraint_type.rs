use std::{fmt, str::FromStr};

use crate::{error::TimetableError, model::constants::SLOTS_PER_DAY};

/// Relation a [`GroupConstraint`](super::group_constraint::GroupConstraint)
/// enforces between its lectures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupConstraintType {
    SameTime,
    SameDays,
    /// Back-to-back in the same room.
    Btb,
    BtbTime,
    DiffTime,
    HoursBetween(HoursBetween),
    SameStart,
    SameRoom,
    SameStudents,
    SameInstructor,
    CanShareRoom,
    Precedence,
    BtbDay,
    MeetWith,
    /// More than one day between the meetings.
    NdbGt1,
    ChildrenNotOverlap,
    FollowingDay,
    EveryOtherDay,
    /// At most the given number of slots a day.
    MaxHrsDay(usize),
    SameWeeks,
    LinkedSections,
    BtbPrecedence,
    SameDaysTime,
    SameDaysRoomTime,
}

/// The `NHB` family: back-to-back with a gap of a fixed range of slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HoursBetween {
    One,
    Two,
    Three,
    Four,
    Five,
    Six,
    Seven,
    Eight,
    OneAndHalf,
    FourAndHalf,
    AtLeastOne,
    LessThanSix,
}

impl HoursBetween {
    pub const ALL: [HoursBetween; 12] = [
        HoursBetween::One,
        HoursBetween::Two,
        HoursBetween::Three,
        HoursBetween::Four,
        HoursBetween::Five,
        HoursBetween::Six,
        HoursBetween::Seven,
        HoursBetween::Eight,
        HoursBetween::OneAndHalf,
        HoursBetween::FourAndHalf,
        HoursBetween::AtLeastOne,
        HoursBetween::LessThanSix,
    ];

    pub fn reference(&self) -> &'static str {
        match self {
            HoursBetween::One => "NHB(1)",
            HoursBetween::Two => "NHB(2)",
            HoursBetween::Three => "NHB(3)",
            HoursBetween::Four => "NHB(4)",
            HoursBetween::Five => "NHB(5)",
            HoursBetween::Six => "NHB(6)",
            HoursBetween::Seven => "NHB(7)",
            HoursBetween::Eight => "NHB(8)",
            HoursBetween::OneAndHalf => "NHB(1.5)",
            HoursBetween::FourAndHalf => "NHB(4.5)",
            HoursBetween::AtLeastOne => "NHB_GTE(1)",
            HoursBetween::LessThanSix => "NHB_LT(6)",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            HoursBetween::One => "1 Hour Between",
            HoursBetween::Two => "2 Hours Between",
            HoursBetween::Three => "3 Hours Between",
            HoursBetween::Four => "4 Hours Between",
            HoursBetween::Five => "5 Hours Between",
            HoursBetween::Six => "6 Hours Between",
            HoursBetween::Seven => "7 Hours Between",
            HoursBetween::Eight => "8 Hours Between",
            HoursBetween::OneAndHalf => "1.5 Hour Between",
            HoursBetween::FourAndHalf => "4.5 Hours Between",
            HoursBetween::AtLeastOne => "At Least 1 Hour Between",
            HoursBetween::LessThanSix => "Less Than 6 Hours Between",
        }
    }

    /// Allowed gap in slots, both bounds inclusive.
    pub fn gap(&self) -> (usize, usize) {
        match self {
            HoursBetween::One => (10, 12),
            HoursBetween::Two => (20, 24),
            HoursBetween::Three => (30, 36),
            HoursBetween::Four => (40, 48),
            HoursBetween::Five => (50, 60),
            HoursBetween::Six => (60, 72),
            HoursBetween::Seven => (70, 84),
            HoursBetween::Eight => (80, 96),
            HoursBetween::OneAndHalf => (15, 18),
            HoursBetween::FourAndHalf => (45, 54),
            HoursBetween::AtLeastOne => (6, SLOTS_PER_DAY),
            HoursBetween::LessThanSix => (0, 72),
        }
    }
}

const SIMPLE_TYPES: [GroupConstraintType; 22] = [
    GroupConstraintType::SameTime,
    GroupConstraintType::SameDays,
    GroupConstraintType::Btb,
    GroupConstraintType::BtbTime,
    GroupConstraintType::DiffTime,
    GroupConstraintType::SameStart,
    GroupConstraintType::SameRoom,
    GroupConstraintType::SameStudents,
    GroupConstraintType::SameInstructor,
    GroupConstraintType::CanShareRoom,
    GroupConstraintType::Precedence,
    GroupConstraintType::BtbDay,
    GroupConstraintType::MeetWith,
    GroupConstraintType::NdbGt1,
    GroupConstraintType::ChildrenNotOverlap,
    GroupConstraintType::FollowingDay,
    GroupConstraintType::EveryOtherDay,
    GroupConstraintType::SameWeeks,
    GroupConstraintType::LinkedSections,
    GroupConstraintType::BtbPrecedence,
    GroupConstraintType::SameDaysTime,
    GroupConstraintType::SameDaysRoomTime,
];

impl GroupConstraintType {
    fn simple_reference(&self) -> Option<&'static str> {
        Some(match self {
            GroupConstraintType::SameTime => "SAME_TIME",
            GroupConstraintType::SameDays => "SAME_DAYS",
            GroupConstraintType::Btb => "BTB",
            GroupConstraintType::BtbTime => "BTB_TIME",
            GroupConstraintType::DiffTime => "DIFF_TIME",
            GroupConstraintType::SameStart => "SAME_START",
            GroupConstraintType::SameRoom => "SAME_ROOM",
            GroupConstraintType::SameStudents => "SAME_STUDENTS",
            GroupConstraintType::SameInstructor => "SAME_INSTR",
            GroupConstraintType::CanShareRoom => "CAN_SHARE_ROOM",
            GroupConstraintType::Precedence => "PRECEDENCE",
            GroupConstraintType::BtbDay => "BTB_DAY",
            GroupConstraintType::MeetWith => "MEET_WITH",
            GroupConstraintType::NdbGt1 => "NDB_GT_1",
            GroupConstraintType::ChildrenNotOverlap => "CH_NOTOVERLAP",
            GroupConstraintType::FollowingDay => "FOLLOWING_DAY",
            GroupConstraintType::EveryOtherDay => "EVERY_OTHER_DAY",
            GroupConstraintType::SameWeeks => "SAME_WEEKS",
            GroupConstraintType::LinkedSections => "LINKED_SECTIONS",
            GroupConstraintType::BtbPrecedence => "BTB_PRECEDENCE",
            GroupConstraintType::SameDaysTime => "SAME_D_T",
            GroupConstraintType::SameDaysRoomTime => "SAME_D_R_T",
            GroupConstraintType::HoursBetween(_) | GroupConstraintType::MaxHrsDay(_) => {
                return None;
            }
        })
    }

    /// The reference string the type is loaded from.
    pub fn reference(&self) -> String {
        match self {
            GroupConstraintType::HoursBetween(hours) => hours.reference().to_string(),
            GroupConstraintType::MaxHrsDay(slots) => format!("MAX_HRS_DAY({})", format_hours(*slots)),
            other => other.simple_reference().unwrap_or_default().to_string(),
        }
    }

    pub fn name(&self) -> String {
        let name = match self {
            GroupConstraintType::SameTime => "Same Time",
            GroupConstraintType::SameDays => "Same Days",
            GroupConstraintType::Btb => "Back-To-Back & Same Room",
            GroupConstraintType::BtbTime => "Back-To-Back",
            GroupConstraintType::DiffTime => "Different Time",
            GroupConstraintType::HoursBetween(hours) => hours.name(),
            GroupConstraintType::SameStart => "Same Start Time",
            GroupConstraintType::SameRoom => "Same Room",
            GroupConstraintType::SameStudents => "Same Students",
            GroupConstraintType::SameInstructor => "Same Instructor",
            GroupConstraintType::CanShareRoom => "Can Share Room",
            GroupConstraintType::Precedence => "Precedence",
            GroupConstraintType::BtbDay => "Back-To-Back Day",
            GroupConstraintType::MeetWith => "Meet Together",
            GroupConstraintType::NdbGt1 => "More Than 1 Day Between",
            GroupConstraintType::ChildrenNotOverlap => "Children Cannot Overlap",
            GroupConstraintType::FollowingDay => "Next Day",
            GroupConstraintType::EveryOtherDay => "Two Days After",
            GroupConstraintType::MaxHrsDay(slots) => {
                return format!("At Most {} Hours A Day", format_hours(*slots));
            }
            GroupConstraintType::SameWeeks => "Same Weeks",
            GroupConstraintType::LinkedSections => "Linked Classes",
            GroupConstraintType::BtbPrecedence => "Back-To-Back Precedence",
            GroupConstraintType::SameDaysTime => "Same Days-Time",
            GroupConstraintType::SameDaysRoomTime => "Same Days-Room-Time",
        };
        name.to_string()
    }

    /// Lower gap bound (back-to-back types) or the daily slot limit
    /// (`MAX_HRS_DAY`).
    pub fn min_gap(&self) -> usize {
        match self {
            GroupConstraintType::HoursBetween(hours) => hours.gap().0,
            GroupConstraintType::MaxHrsDay(slots) => *slots,
            _ => 0,
        }
    }

    pub fn max_gap(&self) -> usize {
        match self {
            GroupConstraintType::HoursBetween(hours) => hours.gap().1,
            GroupConstraintType::MaxHrsDay(slots) => *slots,
            _ => 0,
        }
    }

    /// Members are checked as a sequence of meetings within a day.
    pub fn is_back_to_back(&self) -> bool {
        matches!(
            self,
            GroupConstraintType::Btb
                | GroupConstraintType::BtbTime
                | GroupConstraintType::HoursBetween(_)
                | GroupConstraintType::BtbPrecedence
        )
    }

    pub fn can_share_room(&self) -> bool {
        matches!(
            self,
            GroupConstraintType::CanShareRoom | GroupConstraintType::MeetWith
        )
    }

    pub fn is_max_hours_a_day(&self) -> bool {
        matches!(self, GroupConstraintType::MaxHrsDay(_))
    }

    /// Adding a lecture also adds all of its children.
    pub fn includes_children(&self) -> bool {
        matches!(self, GroupConstraintType::ChildrenNotOverlap)
    }

    /// The pair check depends on which lecture comes first in the group.
    pub fn is_order_dependent(&self) -> bool {
        matches!(
            self,
            GroupConstraintType::Precedence
                | GroupConstraintType::BtbPrecedence
                | GroupConstraintType::FollowingDay
                | GroupConstraintType::EveryOtherDay
        )
    }
}

impl fmt::Display for GroupConstraintType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reference())
    }
}

impl FromStr for GroupConstraintType {
    type Err = TimetableError;

    fn from_str(reference: &str) -> Result<Self, Self::Err> {
        if let Some(simple) = SIMPLE_TYPES
            .iter()
            .find(|t| t.simple_reference() == Some(reference))
        {
            return Ok(*simple);
        }
        if let Some(hours) = HoursBetween::ALL
            .iter()
            .find(|hours| hours.reference() == reference)
        {
            return Ok(GroupConstraintType::HoursBetween(*hours));
        }
        if let Some(hours) = reference
            .strip_prefix("MAX_HRS_DAY(")
            .and_then(|rest| rest.strip_suffix(')'))
            .and_then(|hours| hours.parse::<f64>().ok())
            && hours.is_finite()
            && hours > 0.0
        {
            return Ok(GroupConstraintType::MaxHrsDay((12.0 * hours).round() as usize));
        }
        Err(TimetableError::UnknownConstraintType(reference.to_string()))
    }
}

fn format_hours(slots: usize) -> String {
    if slots % 12 == 0 {
        (slots / 12).to_string()
    } else {
        (slots as f64 / 12.0).to_string()
    }
}

/// The shorter of the two day patterns is contained in the longer one.
pub(crate) fn same_days(day_code1: u32, day_code2: u32) -> bool {
    let (shorter, longer) = if day_code1.count_ones() <= day_code2.count_ones() {
        (day_code1, day_code2)
    } else {
        (day_code2, day_code1)
    };
    shorter & longer == shorter
}

/// The shorter meeting lies within the longer one.
pub(crate) fn same_hours(start1: usize, len1: usize, start2: usize, len2: usize) -> bool {
    let ((start1, len1), (start2, len2)) = if len1 > len2 {
        ((start2, len2), (start1, len1))
    } else {
        ((start1, len1), (start2, len2))
    };
    let start1 = start1 % SLOTS_PER_DAY;
    let start2 = start2 % SLOTS_PER_DAY;
    start1 >= start2 && start1 + len1 <= start2 + len2
}
