//! Slot grid and preference scale shared by every timetable component.

/// Number of five-minute slots in a day.
pub const SLOTS_PER_DAY: usize = 288;
/// Length of one slot in minutes.
pub const SLOT_LENGTH_MIN: usize = 5;
/// Start of the first slot, in minutes after midnight.
pub const FIRST_SLOT_TIME_MIN: usize = 0;

pub const NR_DAYS: usize = 7;
pub const NR_DAYS_WEEK: usize = 5;

/// Day bits, Monday first.
pub const DAY_CODES: [u32; NR_DAYS] = [64, 32, 16, 8, 4, 2, 1];
pub const DAY_CODE_ALL: u32 = 127;
pub const DAY_CODE_WEEK: u32 = 124;

pub const DAY_NAMES_SHORT: [&str; NR_DAYS] = ["M", "T", "W", "Th", "F", "S", "Su"];

/// First slot of the regular teaching day (7:30).
pub const DAY_SLOTS_FIRST: usize = (7 * 60 + 30 - FIRST_SLOT_TIME_MIN) / SLOT_LENGTH_MIN;
/// Last slot of the regular teaching day (17:25).
pub const DAY_SLOTS_LAST: usize = (17 * 60 + 30 - FIRST_SLOT_TIME_MIN) / SLOT_LENGTH_MIN - 1;
pub const SLOTS_PER_DAY_NO_EVENINGS: usize = DAY_SLOTS_LAST - DAY_SLOTS_FIRST + 1;

/// Number of days covered by the default week code.
pub const DEFAULT_WEEK_CODE_DAYS: usize = 366;

pub const PREFERENCE_REQUIRED: &str = "R";
pub const PREFERENCE_STRONGLY_PREFERRED: &str = "-2";
pub const PREFERENCE_PREFERRED: &str = "-1";
pub const PREFERENCE_NEUTRAL: &str = "0";
pub const PREFERENCE_DISCOURAGED: &str = "1";
pub const PREFERENCE_STRONGLY_DISCOURAGED: &str = "2";
pub const PREFERENCE_PROHIBITED: &str = "P";

pub const PREFERENCE_LEVEL_REQUIRED: i32 = -100;
pub const PREFERENCE_LEVEL_STRONGLY_PREFERRED: i32 = -4;
pub const PREFERENCE_LEVEL_PREFERRED: i32 = -1;
pub const PREFERENCE_LEVEL_NEUTRAL: i32 = 0;
pub const PREFERENCE_LEVEL_DISCOURAGED: i32 = 1;
pub const PREFERENCE_LEVEL_STRONGLY_DISCOURAGED: i32 = 4;
pub const PREFERENCE_LEVEL_PROHIBITED: i32 = 100;

/// Converts a wall clock time to its slot within the day.
pub const fn time_to_slot(hour: usize, minute: usize) -> usize {
    (hour * 60 + minute - FIRST_SLOT_TIME_MIN) / SLOT_LENGTH_MIN
}

/// Index of the first day in `day_code`, Monday = 0.
pub fn first_day(day_code: u32) -> Option<usize> {
    DAY_CODES.iter().position(|&code| code & day_code != 0)
}

pub fn day_code_name(day_code: u32) -> String {
    DAY_CODES
        .iter()
        .zip(DAY_NAMES_SHORT.iter())
        .filter(|&(&code, _)| code & day_code != 0)
        .map(|(_, name)| *name)
        .collect()
}
