use std::{fmt, sync::Arc};

use fixedbitset::FixedBitSet;
use smallvec::SmallVec;

use super::constants::{
    DAY_CODES, DEFAULT_WEEK_CODE_DAYS, NR_DAYS, SLOT_LENGTH_MIN, SLOTS_PER_DAY, day_code_name,
};

/// A candidate meeting pattern: which days, when, for how long and in which weeks.
#[derive(Debug, Clone)]
pub struct TimeLocation {
    day_code: u32,
    start_slot: usize,
    length: usize,
    break_time: usize,
    preference: i32,
    normalized_preference: f64,
    nr_meetings: usize,
    week_code: Arc<FixedBitSet>,
    date_pattern_id: Option<u64>,
    date_pattern_name: String,
    time_pattern_id: Option<u64>,
    date_preference: i32,
}

pub fn default_week_code() -> Arc<FixedBitSet> {
    let mut week_code = FixedBitSet::with_capacity(DEFAULT_WEEK_CODE_DAYS);
    week_code.insert_range(..);
    Arc::new(week_code)
}

impl TimeLocation {
    pub fn new(day_code: u32, start_slot: usize, length: usize, preference: i32) -> Self {
        TimeLocation {
            day_code,
            start_slot,
            length,
            break_time: 0,
            preference,
            normalized_preference: f64::from(preference),
            nr_meetings: DAY_CODES.iter().filter(|&&d| d & day_code != 0).count(),
            week_code: default_week_code(),
            date_pattern_id: None,
            date_pattern_name: String::from("full"),
            time_pattern_id: None,
            date_preference: 0,
        }
    }

    pub fn with_break_time(mut self, break_time: usize) -> Self {
        self.break_time = break_time;
        self
    }

    pub fn with_normalized_preference(mut self, normalized_preference: f64) -> Self {
        self.normalized_preference = normalized_preference;
        self
    }

    pub fn with_time_pattern(mut self, time_pattern_id: u64) -> Self {
        self.time_pattern_id = Some(time_pattern_id);
        self
    }

    pub fn with_date_pattern(
        mut self,
        date_pattern_id: Option<u64>,
        date_pattern_name: impl Into<String>,
        week_code: Arc<FixedBitSet>,
        date_preference: i32,
    ) -> Self {
        self.date_pattern_id = date_pattern_id;
        self.date_pattern_name = date_pattern_name.into();
        self.week_code = week_code;
        self.date_preference = date_preference;
        self
    }

    pub fn day_code(&self) -> u32 {
        self.day_code
    }

    pub fn start_slot(&self) -> usize {
        self.start_slot
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn nr_slots_per_meeting(&self) -> usize {
        self.length
    }

    /// Break after the meeting, in minutes.
    pub fn break_time(&self) -> usize {
        self.break_time
    }

    pub fn preference(&self) -> i32 {
        self.preference
    }

    pub fn normalized_preference(&self) -> f64 {
        self.normalized_preference
    }

    pub fn nr_meetings(&self) -> usize {
        self.nr_meetings
    }

    pub fn week_code(&self) -> &FixedBitSet {
        &self.week_code
    }

    pub fn date_pattern_id(&self) -> Option<u64> {
        self.date_pattern_id
    }

    pub fn date_pattern_name(&self) -> &str {
        &self.date_pattern_name
    }

    pub fn time_pattern_id(&self) -> Option<u64> {
        self.time_pattern_id
    }

    pub fn date_preference(&self) -> i32 {
        self.date_preference
    }

    pub fn start_time_minutes(&self) -> usize {
        self.start_slot * SLOT_LENGTH_MIN
    }

    pub fn share_days(&self, other: &TimeLocation) -> bool {
        self.day_code & other.day_code != 0
    }

    pub fn nr_shared_days(&self, other: &TimeLocation) -> usize {
        (self.day_code & other.day_code).count_ones() as usize
    }

    pub fn share_hours(&self, other: &TimeLocation) -> bool {
        self.start_slot + self.length > other.start_slot
            && other.start_slot + other.length > self.start_slot
    }

    pub fn nr_shared_hours(&self, other: &TimeLocation) -> usize {
        let end = (self.start_slot + self.length).min(other.start_slot + other.length);
        let start = self.start_slot.max(other.start_slot);
        end.saturating_sub(start)
    }

    pub fn share_weeks(&self, other: &TimeLocation) -> bool {
        !self.week_code.is_disjoint(&other.week_code)
    }

    pub fn has_intersection(&self, other: &TimeLocation) -> bool {
        self.share_days(other) && self.share_hours(other) && self.share_weeks(other)
    }

    /// Day indexes (Monday = 0) this pattern meets on.
    pub fn days(&self) -> SmallVec<[usize; NR_DAYS]> {
        DAY_CODES
            .iter()
            .enumerate()
            .filter(|&(_, &code)| code & self.day_code != 0)
            .map(|(day, _)| day)
            .collect()
    }

    /// Week slots (`day * SLOTS_PER_DAY + slot`) covered by every meeting.
    pub fn slots(&self) -> impl Iterator<Item = usize> + '_ {
        self.days().into_iter().flat_map(move |day| {
            let first = day * SLOTS_PER_DAY + self.start_slot;
            first..first + self.length
        })
    }

    /// Week slot of the first slot of every meeting.
    pub fn start_slots(&self) -> impl Iterator<Item = usize> + '_ {
        self.days()
            .into_iter()
            .map(move |day| day * SLOTS_PER_DAY + self.start_slot)
    }

    pub fn first_start_slot(&self) -> Option<usize> {
        self.start_slots().next()
    }

    /// Index of the first date (in the week code) on which a meeting takes place.
    pub fn first_meeting(&self, day_of_week_offset: usize) -> Option<usize> {
        self.week_code
            .ones()
            .find(|&date| self.meets_on_date(date, day_of_week_offset))
    }

    pub fn last_meeting(&self, day_of_week_offset: usize) -> Option<usize> {
        self.week_code
            .ones()
            .filter(|&date| self.meets_on_date(date, day_of_week_offset))
            .last()
    }

    pub fn has_date(&self, date: usize, day_of_week_offset: usize) -> bool {
        self.week_code.contains(date) && self.meets_on_date(date, day_of_week_offset)
    }

    pub fn count_dates(&self, day_of_week_offset: usize) -> usize {
        self.week_code
            .ones()
            .filter(|&date| self.meets_on_date(date, day_of_week_offset))
            .count()
    }

    pub fn nr_weeks(&self) -> usize {
        match self.week_code.count_ones(..) {
            0 => 0,
            dates if dates <= 7 => 1,
            dates => (5 + dates) / 6,
        }
    }

    fn meets_on_date(&self, date: usize, day_of_week_offset: usize) -> bool {
        DAY_CODES[(date + day_of_week_offset) % NR_DAYS] & self.day_code != 0
    }
}

impl PartialEq for TimeLocation {
    fn eq(&self, other: &Self) -> bool {
        self.start_slot == other.start_slot
            && self.length == other.length
            && self.day_code == other.day_code
            && self.time_pattern_id == other.time_pattern_id
            && self.date_pattern_id == other.date_pattern_id
    }
}

impl fmt::Display for TimeLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let minutes = self.start_time_minutes();
        write!(
            f,
            "{} {:02}:{:02}",
            day_code_name(self.day_code),
            minutes / 60,
            minutes % 60
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MWF: u32 = 64 + 16 + 4;
    const TTH: u32 = 32 + 8;

    fn weeks(dates: &[usize]) -> Arc<FixedBitSet> {
        let mut week_code = FixedBitSet::with_capacity(DEFAULT_WEEK_CODE_DAYS);
        for &date in dates {
            week_code.insert(date);
        }
        Arc::new(week_code)
    }

    #[test]
    fn test_intersection() {
        let a = TimeLocation::new(MWF, 90, 12, 0);
        let b = TimeLocation::new(64, 96, 12, 0);
        let c = TimeLocation::new(TTH, 90, 12, 0);
        let d = TimeLocation::new(MWF, 102, 12, 0);

        assert!(a.has_intersection(&b));
        assert!(!a.has_intersection(&c));
        assert!(!a.has_intersection(&d));
        assert_eq!(a.nr_shared_hours(&b), 6);
        assert_eq!(a.nr_shared_days(&b), 1);
    }

    #[test]
    fn test_disjoint_weeks_do_not_intersect() {
        let a = TimeLocation::new(MWF, 90, 12, 0).with_date_pattern(
            Some(1),
            "odd",
            weeks(&[0, 14]),
            0,
        );
        let b = TimeLocation::new(MWF, 90, 12, 0).with_date_pattern(
            Some(2),
            "even",
            weeks(&[7, 21]),
            0,
        );

        assert!(!a.share_weeks(&b));
        assert!(!a.has_intersection(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn test_slots() {
        let time = TimeLocation::new(TTH, 100, 3, 0);
        let slots: Vec<usize> = time.slots().collect();

        assert_eq!(slots, vec![388, 389, 390, 964, 965, 966]);
        assert_eq!(time.start_slots().collect::<Vec<_>>(), vec![388, 964]);
        assert_eq!(time.nr_meetings(), 2);
    }

    #[test]
    fn test_first_and_last_meeting() {
        // date 0 is a Monday, so date 1 is the first Tuesday
        let time = TimeLocation::new(TTH, 100, 3, 0).with_date_pattern(
            None,
            "custom",
            weeks(&[0, 1, 2, 3, 8]),
            0,
        );

        assert_eq!(time.first_meeting(0), Some(1));
        assert_eq!(time.last_meeting(0), Some(8));
        assert_eq!(time.count_dates(0), 3);
        assert!(time.has_date(3, 0));
        assert!(!time.has_date(2, 0));
    }

    #[test]
    fn test_nr_weeks() {
        let time = TimeLocation::new(MWF, 90, 12, 0);
        assert_eq!(time.nr_weeks(), 61);

        let short = time.clone().with_date_pattern(None, "one", weeks(&[0, 2, 4]), 0);
        assert_eq!(short.nr_weeks(), 1);
    }
}
