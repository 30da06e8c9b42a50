use std::collections::{BTreeMap, BTreeSet};

use rand::Rng;
use tracing::debug;

use crate::model::{
    constants::{DAY_CODES, NR_DAYS},
    criteria::Criteria,
    lecture::LectureIdx,
    placement::PlacementIdx,
    timetable_model::Timetable,
    timetable_params::TimetableParams,
};

use super::constraint::{Conflicts, ConstraintContext, TimetableConstraint};

/// Keeps the lectures in as few distinct rooms as possible.
#[derive(Debug, Clone)]
pub struct MinimizeNumberOfUsedRooms {
    name: String,
    lectures: Vec<LectureIdx>,
    unassignments_to_weaken: usize,
    first_day_slot: usize,
    last_day_slot: usize,
    first_work_day: usize,
    last_work_day: usize,
    /// Lectures assigned into each used room, by room id.
    used_rooms: BTreeMap<u64, Vec<LectureIdx>>,
    limit: usize,
    unassignments: u64,
}

impl MinimizeNumberOfUsedRooms {
    pub fn new(name: impl Into<String>, lectures: Vec<LectureIdx>, params: &TimetableParams) -> Self {
        let first_work_day = params.first_work_day;
        let last_work_day = if params.last_work_day < first_work_day {
            params.last_work_day + NR_DAYS
        } else {
            params.last_work_day
        };
        MinimizeNumberOfUsedRooms {
            name: name.into(),
            lectures,
            unassignments_to_weaken: params.min_rooms_unassignments_to_weaken,
            first_day_slot: params.first_day_slot,
            last_day_slot: params.last_day_slot,
            first_work_day,
            last_work_day,
            used_rooms: BTreeMap::new(),
            limit: 1,
            unassignments: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn constraint_name(&self) -> &'static str {
        "MIN_ROOM_USE"
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn current_usage(&self) -> usize {
        self.used_rooms.len()
    }

    /// Lectures currently placed in the given room.
    pub fn room_lectures(&self, room_id: u64) -> &[LectureIdx] {
        self.used_rooms.get(&room_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Lower bound on the number of rooms: every room a lecture can not
    /// avoid, and the busiest cell of the expected room usage.
    pub fn estimate_limit(&self, timetable: &Timetable) -> usize {
        let mut mandatory_rooms = BTreeSet::new();
        for &lecture in &self.lectures {
            let lecture = timetable.lecture(lecture);
            if lecture.nr_rooms() == 0 {
                continue;
            }
            if lecture.is_committed() || lecture.room_locations().len() == 1 {
                mandatory_rooms.extend(lecture.room_locations().iter().map(|room| room.id()));
            }
        }

        let nr_days = self.last_work_day - self.first_work_day + 1;
        let nr_slots = (self.last_day_slot + 1).saturating_sub(self.first_day_slot);
        let mut histogram = vec![0.0; nr_slots * nr_days];
        for &lecture in &self.lectures {
            let current = timetable.lecture(lecture);
            let values = current.values();
            if current.nr_rooms() == 0 || values.is_empty() {
                continue;
            }
            let share = current.nr_rooms() as f64 / values.len() as f64;
            for &value in values {
                let time = timetable.placement(value).time_location();
                let start = time.start_slot();
                let end = (start + time.nr_slots_per_meeting()).saturating_sub(1);
                if start > self.last_day_slot || end < self.first_day_slot {
                    continue;
                }
                for slot in start.max(self.first_day_slot)..=end.min(self.last_day_slot) {
                    for day in self.first_work_day..=self.last_work_day {
                        if time.day_code() & DAY_CODES[day % NR_DAYS] != 0 {
                            histogram[(slot - self.first_day_slot) * nr_days
                                + (day - self.first_work_day)] += share;
                        }
                    }
                }
            }
        }
        let max_average_rooms = histogram
            .into_iter()
            .map(|usage: f64| usage.ceil() as usize)
            .max()
            .unwrap_or(0);

        mandatory_rooms.len().max(max_average_rooms).max(1)
    }

    /// Rebuilds the room usage from the current assignment and sets the limit
    /// to the larger of the current usage and the estimate.
    pub fn set_enabled(&mut self, timetable: &Timetable) {
        self.used_rooms.clear();
        for i in 0..self.lectures.len() {
            let lecture = self.lectures[i];
            if let Some(placement) = timetable.assignment(lecture) {
                self.add_placement(timetable, placement);
            }
        }
        self.limit = self.current_usage().max(self.estimate_limit(timetable));
        debug!(
            constraint = self.constraint_name(),
            limit = self.limit,
            usage = self.current_usage(),
            "Enabled room usage"
        );
    }

    fn add_placement(&mut self, timetable: &Timetable, placement: PlacementIdx) {
        let value = timetable.placement(placement);
        if timetable.lecture(value.lecture()).nr_rooms() == 0 {
            return;
        }
        for room in value.room_ids() {
            let lectures = self.used_rooms.entry(room).or_default();
            if !lectures.contains(&value.lecture()) {
                lectures.push(value.lecture());
            }
        }
    }

    fn remove_placement(&mut self, timetable: &Timetable, placement: PlacementIdx) {
        let value = timetable.placement(placement);
        if timetable.lecture(value.lecture()).nr_rooms() == 0 {
            return;
        }
        for room in value.room_ids() {
            if let Some(lectures) = self.used_rooms.get_mut(&room) {
                lectures.retain(|&lecture| lecture != value.lecture());
                if lectures.is_empty() {
                    self.used_rooms.remove(&room);
                }
            }
        }
    }

    /// Number of rooms above the limit if `placement` is assigned.
    pub fn over_limit(&self, timetable: &Timetable, placement: PlacementIdx) -> usize {
        if self.unassignments_to_weaken == 0 {
            return 0;
        }
        let value = timetable.placement(placement);
        let lecture = timetable.lecture(value.lecture());
        if lecture.nr_rooms() == 0
            || lecture.room_locations().len() == lecture.nr_rooms()
            || lecture.is_committed()
        {
            return 0;
        }
        if self.used_rooms.len() + lecture.nr_rooms() <= self.limit {
            return 0;
        }

        let mut released: Vec<u64> = timetable
            .assignment(value.lecture())
            .map(|current| timetable.placement(current).room_ids().collect())
            .unwrap_or_default();
        let mut usage = self.used_rooms.len();
        for room in value.room_ids() {
            if let Some(position) = released.iter().position(|&other| other == room) {
                released.swap_remove(position);
            } else if !self.used_rooms.contains_key(&room) {
                usage += 1;
            }
        }
        for room in released {
            if self.used_rooms.get(&room).is_some_and(|lectures| lectures.len() == 1) {
                usage -= 1;
            }
        }

        if usage <= self.used_rooms.len() || usage <= self.limit {
            0
        } else {
            usage - self.limit
        }
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
        self.limit += self.over_limit(timetable, placement);
    }
}

impl TimetableConstraint for MinimizeNumberOfUsedRooms {
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
        let over_limit = self.over_limit(timetable, placement);
        if over_limit == 0 {
            return;
        }

        let value = timetable.placement(placement);
        let mut adepts: Vec<Vec<PlacementIdx>> = Vec::new();
        for (&room, lectures) in &self.used_rooms {
            if value.has_room(room) || lectures.iter().all(|&lecture| lecture == value.lecture()) {
                continue;
            }
            let mut to_unassign = Vec::new();
            let mut can_unassign = true;
            for &lecture in lectures.iter().filter(|&&lecture| lecture != value.lecture()) {
                if timetable.lecture(lecture).is_committed() {
                    can_unassign = false;
                    break;
                }
                if let Some(current) = timetable.assignment(lecture)
                    && !conflicts.contains(&current)
                {
                    to_unassign.push(current);
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
        self.over_limit(ctx.timetable, placement) > 0
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
        self.add_placement(timetable, placement);
    }

    fn unassigned(
        &mut self,
        timetable: &Timetable,
        _criteria: &mut Criteria,
        _iteration: u64,
        placement: PlacementIdx,
    ) {
        self.remove_placement(timetable, placement);
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        constraints::constraint::{Constraint, ConstraintIdx},
        model::{
            lecture::LectureBuilder, room_location::RoomLocation, timetable_model::TimetableModel,
        },
        test_utils::{MWF, MockRng, TTH, add_built_lecture, add_room, time},
    };

    use super::*;

    /// Two lectures at different times, each either in room 1 or room 2.
    /// The first one is limited to its first `a_rooms` rooms.
    fn two_rooms(
        params: TimetableParams,
        committed: bool,
        a_rooms: usize,
    ) -> (TimetableModel, ConstraintIdx, Vec<PlacementIdx>, Vec<PlacementIdx>) {
        let mut model = TimetableModel::new(params);
        let rooms: Vec<RoomLocation> = (1..=2).map(|id| add_room(&mut model, id, 30)).collect();
        let mut lectures = Vec::new();
        let mut values = Vec::new();
        for (id, days, nr_rooms) in [(1, MWF, a_rooms), (2, TTH, rooms.len())] {
            let mut builder = LectureBuilder::default();
            builder.set_id(id).set_class_limit(10).set_committed(committed && id == 1);
            let (lecture, lecture_values) = add_built_lecture(
                &mut model,
                builder,
                rooms
                    .iter()
                    .take(nr_rooms)
                    .map(|room| (time(days, 96, 12), vec![room.clone()]))
                    .collect(),
            );
            lectures.push(lecture);
            values.push(lecture_values);
        }
        let constraint =
            MinimizeNumberOfUsedRooms::new("Courses", lectures, model.timetable().params());
        let idx = model
            .add_constraint(Constraint::MinimizeRoomUsage(constraint))
            .unwrap();
        let b_values = values.pop().unwrap();
        let a_values = values.pop().unwrap();
        (model, idx, a_values, b_values)
    }

    fn rooms(model: &TimetableModel, idx: ConstraintIdx) -> &MinimizeNumberOfUsedRooms {
        match model.constraint(idx) {
            Constraint::MinimizeRoomUsage(rooms) => rooms,
            _ => panic!("not a room usage constraint"),
        }
    }

    #[test]
    fn test_estimate_limit() {
        let (mut model, idx, _, _) = two_rooms(TimetableParams::default(), false, 2);
        model.initialize();

        // each lecture expects one room per cell over its two placements
        assert_eq!(rooms(&model, idx).estimate_limit(model.timetable()), 1);
        assert_eq!(rooms(&model, idx).limit(), 1);
    }

    #[test]
    fn test_committed_lecture_makes_its_rooms_mandatory() {
        let (model, idx, _, _) = two_rooms(TimetableParams::default(), true, 2);
        assert_eq!(rooms(&model, idx).estimate_limit(model.timetable()), 2);
    }

    #[test]
    fn test_new_room_evicts_the_other_room() {
        let (mut model, idx, a_values, b_values) =
            two_rooms(TimetableParams::default(), false, 2);
        model.initialize();

        model.assign(0, a_values[0]).unwrap();
        assert_eq!(rooms(&model, idx).current_usage(), 1);
        assert_eq!(rooms(&model, idx).room_lectures(1).len(), 1);
        assert!(!model.in_conflict(b_values[0]));
        assert!(model.in_conflict(b_values[1]));

        let conflicts = model.conflict_values(b_values[1], &mut MockRng::new(vec![0]));
        assert_eq!(conflicts, Conflicts::from_iter([a_values[0]]));

        let a = model.timetable().placement(a_values[0]).lecture();
        model.unassign(1, a).unwrap();
        assert_eq!(rooms(&model, idx).current_usage(), 0);
        assert!(!model.in_conflict(b_values[1]));
    }

    #[test]
    fn test_moving_the_only_lecture_keeps_the_usage() {
        let (mut model, _, a_values, _) = two_rooms(TimetableParams::default(), false, 2);
        model.initialize();
        model.assign(0, a_values[0]).unwrap();

        assert!(!model.in_conflict(a_values[1]));
    }

    #[test]
    fn test_committed_room_rejects_the_candidate() {
        let (mut model, idx, a_values, b_values) =
            two_rooms(TimetableParams::default(), true, 1);
        model.initialize();
        assert_eq!(rooms(&model, idx).limit(), 1);
        model.assign(0, a_values[0]).unwrap();

        let conflicts = model.conflict_values(b_values[1], &mut MockRng::new(vec![0]));
        assert_eq!(conflicts, Conflicts::from_iter([b_values[1]]));
    }

    #[test]
    fn test_weakening_raises_the_limit() {
        let params = TimetableParams {
            min_rooms_unassignments_to_weaken: 2,
            ..TimetableParams::default()
        };
        let (mut model, idx, a_values, b_values) = two_rooms(params, false, 2);
        model.initialize();
        model.assign(0, a_values[0]).unwrap();

        model.weaken();
        assert_eq!(rooms(&model, idx).limit(), 1);
        model.weaken();
        assert_eq!(rooms(&model, idx).limit(), 2);
        assert!(!model.in_conflict(b_values[1]));
    }

    #[test]
    fn test_weaken_for_accepts_the_placement() {
        let (mut model, idx, a_values, b_values) =
            two_rooms(TimetableParams::default(), false, 2);
        model.initialize();
        model.assign(0, a_values[0]).unwrap();

        model.weaken_for(b_values[1]);
        assert_eq!(rooms(&model, idx).limit(), 2);
        assert!(!model.in_conflict(b_values[1]));
    }
}
