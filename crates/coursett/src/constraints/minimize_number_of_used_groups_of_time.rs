use std::str::FromStr;

use rand::Rng;
use tracing::debug;

use crate::{
    error::TimetableError,
    model::{
        constants::{DAY_CODE_ALL, DAY_CODES, time_to_slot},
        criteria::Criteria,
        lecture::LectureIdx,
        placement::{Placement, PlacementIdx},
        time_location::TimeLocation,
        timetable_model::Timetable,
        timetable_params::TimetableParams,
    },
};

use super::constraint::{Conflicts, ConstraintContext, TimetableConstraint};

/// A band of the day, `[start_slot, end_slot)`, on the given days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupOfTime {
    start_slot: usize,
    end_slot: usize,
    days: u32,
}

impl GroupOfTime {
    pub const fn new(start_slot: usize, end_slot: usize, days: u32) -> Self {
        GroupOfTime {
            start_slot,
            end_slot,
            days,
        }
    }

    const fn hours(start: usize, end: usize) -> Self {
        Self::new(time_to_slot(start, 30), time_to_slot(end, 30), DAY_CODE_ALL)
    }

    pub fn start_slot(&self) -> usize {
        self.start_slot
    }

    pub fn end_slot(&self) -> usize {
        self.end_slot
    }

    pub fn nr_days(&self) -> usize {
        DAY_CODES.iter().filter(|&&code| self.days & code != 0).count()
    }

    /// Number of slots of the band over the whole week.
    pub fn size(&self) -> usize {
        (self.end_slot - self.start_slot) * self.nr_days()
    }

    pub fn overlaps(&self, time: &TimeLocation) -> bool {
        if time.day_code() & self.days == 0 {
            return false;
        }
        let start = self.start_slot.max(time.start_slot());
        let end = self.end_slot.min(time.start_slot() + time.length());
        end > start
    }
}

const TWO_OF_FIVE_HOURS: [GroupOfTime; 2] = [GroupOfTime::hours(7, 12), GroupOfTime::hours(12, 17)];

const THREE_OF_THREE_HOURS: [GroupOfTime; 3] = [
    GroupOfTime::hours(7, 10),
    GroupOfTime::hours(10, 14),
    GroupOfTime::hours(14, 17),
];

const FIVE_OF_TWO_HOURS: [GroupOfTime; 5] = [
    GroupOfTime::hours(7, 9),
    GroupOfTime::hours(9, 11),
    GroupOfTime::hours(11, 13),
    GroupOfTime::hours(13, 15),
    GroupOfTime::hours(15, 17),
];

const TEN_OF_ONE_HOUR: [GroupOfTime; 10] = [
    GroupOfTime::hours(7, 8),
    GroupOfTime::hours(8, 9),
    GroupOfTime::hours(9, 10),
    GroupOfTime::hours(10, 11),
    GroupOfTime::hours(11, 12),
    GroupOfTime::hours(12, 13),
    GroupOfTime::hours(13, 14),
    GroupOfTime::hours(14, 15),
    GroupOfTime::hours(15, 16),
    GroupOfTime::hours(16, 17),
];

/// Partitions of the teaching day, 7:30 to 17:30.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupsOfTime {
    TwoOfFiveHours,
    ThreeOfThreeHours,
    FiveOfTwoHours,
    TenOfOneHour,
}

impl GroupsOfTime {
    pub fn groups(&self) -> &'static [GroupOfTime] {
        match self {
            GroupsOfTime::TwoOfFiveHours => &TWO_OF_FIVE_HOURS,
            GroupsOfTime::ThreeOfThreeHours => &THREE_OF_THREE_HOURS,
            GroupsOfTime::FiveOfTwoHours => &FIVE_OF_TWO_HOURS,
            GroupsOfTime::TenOfOneHour => &TEN_OF_ONE_HOUR,
        }
    }

    pub fn reference(&self) -> &'static str {
        match self {
            GroupsOfTime::TwoOfFiveHours => "2of5h",
            GroupsOfTime::ThreeOfThreeHours => "3of3h",
            GroupsOfTime::FiveOfTwoHours => "5of2h",
            GroupsOfTime::TenOfOneHour => "10of1h",
        }
    }
}

impl FromStr for GroupsOfTime {
    type Err = TimetableError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "2of5h" => Ok(GroupsOfTime::TwoOfFiveHours),
            "3of3h" => Ok(GroupsOfTime::ThreeOfThreeHours),
            "5of2h" => Ok(GroupsOfTime::FiveOfTwoHours),
            "10of1h" => Ok(GroupsOfTime::TenOfOneHour),
            _ => Err(TimetableError::UnknownConstraintType(s.to_string())),
        }
    }
}

/// Keeps the lectures within as few bands of the day as possible.
///
/// The number of bands in use may not exceed the limit. A placement opening
/// a new band above the limit pushes out the lectures of the least used
/// bands it does not touch.
#[derive(Debug, Clone)]
pub struct MinimizeNumberOfUsedGroupsOfTime {
    name: String,
    groups: GroupsOfTime,
    lectures: Vec<LectureIdx>,
    unassignments_to_weaken: usize,
    usage: Vec<Vec<PlacementIdx>>,
    limit: usize,
    unassignments: u64,
}

impl MinimizeNumberOfUsedGroupsOfTime {
    pub fn new(
        name: impl Into<String>,
        groups: GroupsOfTime,
        lectures: Vec<LectureIdx>,
        params: &TimetableParams,
    ) -> Self {
        MinimizeNumberOfUsedGroupsOfTime {
            name: name.into(),
            groups,
            lectures,
            unassignments_to_weaken: params.min_groups_unassignments_to_weaken,
            usage: vec![Vec::new(); groups.groups().len()],
            limit: 1,
            unassignments: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn constraint_name(&self) -> String {
        format!("MIN_GRUSE({})", self.groups.reference())
    }

    pub fn groups(&self) -> GroupsOfTime {
        self.groups
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Number of bands holding at least one placement.
    pub fn current_usage(&self) -> usize {
        self.usage.iter().filter(|usage| !usage.is_empty()).count()
    }

    /// Lower bound on the number of bands the members need: enough band
    /// slots for all meetings, and at least the bands of the most compact
    /// lecture.
    pub fn estimate_limit(&self, timetable: &Timetable) -> usize {
        let groups = self.groups.groups();
        let mut nr_slots_used: usize = 0;
        let mut min_groups_used: Option<usize> = None;
        for &lecture in &self.lectures {
            let times = timetable.lecture(lecture).time_locations();
            if let Some(first) = times.first() {
                nr_slots_used += first.length() * first.nr_meetings();
            }
            let lecture_min = times
                .iter()
                .map(|time| groups.iter().filter(|group| group.overlaps(time)).count())
                .min();
            if let Some(lecture_min) = lecture_min {
                min_groups_used = Some(min_groups_used.map_or(lecture_min, |min| min.min(lecture_min)));
            }
        }
        let band_size = groups.first().map_or(1, GroupOfTime::size).max(1);
        nr_slots_used
            .div_ceil(band_size)
            .max(1)
            .max(min_groups_used.unwrap_or(0))
    }

    /// Rebuilds the band usage from the current assignment and sets the limit
    /// to the larger of the current usage and the estimate.
    pub fn set_enabled(&mut self, timetable: &Timetable) {
        let groups = self.groups.groups();
        self.usage = vec![Vec::new(); groups.len()];
        for &lecture in &self.lectures {
            if let Some(placement) = timetable.assignment(lecture) {
                let time = timetable.placement(placement).time_location();
                for (usage, group) in self.usage.iter_mut().zip(groups) {
                    if group.overlaps(time) {
                        usage.push(placement);
                    }
                }
            }
        }
        self.limit = self.current_usage().max(self.estimate_limit(timetable));
        debug!(
            constraint = %self.constraint_name(),
            limit = self.limit,
            usage = self.current_usage(),
            "Enabled groups of time"
        );
    }

    fn is_used_by_others(&self, timetable: &Timetable, group: usize, lecture: LectureIdx) -> bool {
        self.usage[group]
            .iter()
            .any(|&placement| timetable.placement(placement).lecture() != lecture)
    }

    /// Number of bands above the limit if `value` is assigned.
    pub fn over_limit(&self, timetable: &Timetable, value: &Placement) -> usize {
        if self.unassignments_to_weaken == 0 || timetable.lecture(value.lecture()).is_committed() {
            return 0;
        }
        let time = value.time_location();
        let usage = self
            .groups
            .groups()
            .iter()
            .enumerate()
            .filter(|(idx, group)| {
                group.overlaps(time) || self.is_used_by_others(timetable, *idx, value.lecture())
            })
            .count();
        usage.saturating_sub(self.limit)
    }

    pub fn weaken(&mut self) {
        self.unassignments += 1;
        if self.unassignments_to_weaken > 0
            && self.unassignments % self.unassignments_to_weaken as u64 == 0
        {
            self.limit += 1;
        }
    }

    pub fn weaken_for(&mut self, timetable: &Timetable, placement: PlacementIdx) {
        self.limit += self.over_limit(timetable, timetable.placement(placement));
    }
}

impl TimetableConstraint for MinimizeNumberOfUsedGroupsOfTime {
    fn lectures(&self) -> &[LectureIdx] {
        &self.lectures
    }

    fn is_hard(&self) -> bool {
        false
    }

    fn is_weakening(&self) -> bool {
        true
    }

    fn compute_conflicts<R>(
        &self,
        ctx: &ConstraintContext,
        placement: PlacementIdx,
        conflicts: &mut Conflicts,
        _rng: &mut R,
    ) where
        R: Rng,
    {
        let timetable = ctx.timetable;
        let value = timetable.placement(placement);
        let over_limit = self.over_limit(timetable, value);
        if over_limit == 0 {
            return;
        }

        let time = value.time_location();
        let mut adepts: Vec<Vec<PlacementIdx>> = Vec::new();
        for (idx, group) in self.groups.groups().iter().enumerate() {
            if group.overlaps(time) || !self.is_used_by_others(timetable, idx, value.lecture()) {
                continue;
            }
            let members = self.usage[idx]
                .iter()
                .copied()
                .filter(|&p| timetable.placement(p).lecture() != value.lecture());
            let mut to_unassign = Vec::new();
            let mut can_unassign = true;
            for member in members {
                if timetable.placement_lecture(member).is_committed() {
                    can_unassign = false;
                    break;
                }
                if !conflicts.contains(&member) {
                    to_unassign.push(member);
                }
            }
            if can_unassign {
                adepts.push(to_unassign);
            }
        }

        if adepts.len() < over_limit {
            conflicts.insert(placement);
        } else {
            adepts.sort_by_key(Vec::len);
            conflicts.extend(adepts.into_iter().take(over_limit).flatten());
        }
    }

    fn in_conflict(&self, ctx: &ConstraintContext, placement: PlacementIdx) -> bool {
        self.over_limit(ctx.timetable, ctx.timetable.placement(placement)) > 0
    }

    fn is_consistent(&self, _ctx: &ConstraintContext, _p1: PlacementIdx, _p2: PlacementIdx) -> bool {
        true
    }

    fn assigned(
        &mut self,
        timetable: &Timetable,
        _criteria: &mut Criteria,
        _iteration: u64,
        placement: PlacementIdx,
    ) {
        let time = timetable.placement(placement).time_location();
        for (usage, group) in self.usage.iter_mut().zip(self.groups.groups()) {
            if group.overlaps(time) && !usage.contains(&placement) {
                usage.push(placement);
            }
        }
    }

    fn unassigned(
        &mut self,
        timetable: &Timetable,
        _criteria: &mut Criteria,
        _iteration: u64,
        placement: PlacementIdx,
    ) {
        let time = timetable.placement(placement).time_location();
        for (usage, group) in self.usage.iter_mut().zip(self.groups.groups()) {
            if group.overlaps(time) {
                usage.retain(|&p| p != placement);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        constraints::constraint::{Constraint, ConstraintIdx},
        model::{lecture::LectureBuilder, timetable_model::TimetableModel},
        test_utils::{MWF, MockRng, add_built_lecture, time},
    };

    use super::*;

    /// Two lectures, each either in the morning or in the afternoon band.
    fn morning_or_afternoon(
        params: TimetableParams,
        committed: bool,
    ) -> (TimetableModel, ConstraintIdx, Vec<PlacementIdx>, Vec<PlacementIdx>) {
        let mut model = TimetableModel::new(params);
        let mut lectures = Vec::new();
        let mut values = Vec::new();
        for id in 1..=2 {
            let mut builder = LectureBuilder::default();
            builder.set_id(id).set_class_limit(10).set_committed(committed && id == 1);
            let (lecture, lecture_values) = add_built_lecture(
                &mut model,
                builder,
                vec![(time(MWF, 96, 12), vec![]), (time(MWF, 156, 12), vec![])],
            );
            lectures.push(lecture);
            values.push(lecture_values);
        }
        let constraint = MinimizeNumberOfUsedGroupsOfTime::new(
            "Courses",
            GroupsOfTime::TwoOfFiveHours,
            lectures,
            model.timetable().params(),
        );
        let idx = model
            .add_constraint(Constraint::MinimizeGroupsOfTime(constraint))
            .unwrap();
        let b_values = values.pop().unwrap();
        let a_values = values.pop().unwrap();
        (model, idx, a_values, b_values)
    }

    fn groups(model: &TimetableModel, idx: ConstraintIdx) -> &MinimizeNumberOfUsedGroupsOfTime {
        match model.constraint(idx) {
            Constraint::MinimizeGroupsOfTime(groups) => groups,
            _ => panic!("not a groups of time constraint"),
        }
    }

    #[test]
    fn test_bands() {
        let morning = GroupsOfTime::TwoOfFiveHours.groups()[0];
        assert_eq!((morning.start_slot(), morning.end_slot()), (90, 150));
        assert_eq!(morning.nr_days(), 7);
        assert_eq!(morning.size(), 420);
        assert!(morning.overlaps(&time(MWF, 90, 12)));
        assert!(morning.overlaps(&time(MWF, 144, 12)));
        assert!(!morning.overlaps(&time(MWF, 150, 12)));
        assert!(!morning.overlaps(&time(0, 90, 12)));

        assert_eq!(GroupsOfTime::TenOfOneHour.groups().len(), 10);
        assert_eq!(GroupsOfTime::ThreeOfThreeHours.groups()[1].start_slot(), 126);
        assert_eq!("5of2h".parse::<GroupsOfTime>(), Ok(GroupsOfTime::FiveOfTwoHours));
        assert!("4of2h".parse::<GroupsOfTime>().is_err());
    }

    #[test]
    fn test_new_band_evicts_the_other_band() {
        let (mut model, idx, a_values, b_values) =
            morning_or_afternoon(TimetableParams::default(), false);
        model.initialize();
        assert_eq!(groups(&model, idx).limit(), 1);
        assert_eq!(groups(&model, idx).estimate_limit(model.timetable()), 1);

        model.assign(0, a_values[0]).unwrap();
        assert_eq!(groups(&model, idx).current_usage(), 1);
        assert!(!model.in_conflict(b_values[0]));
        assert!(model.in_conflict(b_values[1]));

        let conflicts = model.conflict_values(b_values[1], &mut MockRng::new(vec![0]));
        assert_eq!(conflicts, Conflicts::from_iter([a_values[0]]));

        model.unassign(1, model.timetable().placement(a_values[0]).lecture()).unwrap();
        assert_eq!(groups(&model, idx).current_usage(), 0);
        assert!(!model.in_conflict(b_values[1]));
    }

    #[test]
    fn test_committed_band_rejects_the_candidate() {
        let (mut model, _, a_values, b_values) =
            morning_or_afternoon(TimetableParams::default(), true);
        model.initialize();
        model.assign(0, a_values[0]).unwrap();

        let conflicts = model.conflict_values(b_values[1], &mut MockRng::new(vec![0]));
        assert_eq!(conflicts, Conflicts::from_iter([b_values[1]]));
    }

    #[test]
    fn test_set_enabled_keeps_current_usage() {
        let (mut model, idx, a_values, b_values) =
            morning_or_afternoon(TimetableParams::default(), false);
        model.assign(0, a_values[0]).unwrap();
        model.assign(0, b_values[1]).unwrap();
        model.initialize();

        assert_eq!(groups(&model, idx).current_usage(), 2);
        assert_eq!(groups(&model, idx).limit(), 2);
        assert!(!model.in_conflict(b_values[1]));
    }

    #[test]
    fn test_weakening_raises_the_limit() {
        let params = TimetableParams {
            min_groups_unassignments_to_weaken: 2,
            ..TimetableParams::default()
        };
        let (mut model, idx, a_values, b_values) = morning_or_afternoon(params, false);
        model.initialize();
        model.assign(0, a_values[0]).unwrap();

        model.weaken();
        assert_eq!(groups(&model, idx).limit(), 1);
        model.weaken();
        assert_eq!(groups(&model, idx).limit(), 2);
        assert!(!model.in_conflict(b_values[1]));
    }

    #[test]
    fn test_weaken_for_accepts_the_placement() {
        let (mut model, idx, a_values, b_values) =
            morning_or_afternoon(TimetableParams::default(), false);
        model.initialize();
        model.assign(0, a_values[0]).unwrap();

        model.weaken_for(b_values[1]);
        assert_eq!(groups(&model, idx).limit(), 2);
        assert!(!model.in_conflict(b_values[1]));
    }
}
