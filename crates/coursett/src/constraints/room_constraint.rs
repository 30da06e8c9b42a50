use rand::Rng;
use smallvec::SmallVec;
use tracing::trace;

use crate::model::{
    constants::{DAY_CODES, NR_DAYS, SLOT_LENGTH_MIN, SLOTS_PER_DAY},
    criteria::{Criteria, Criterion},
    lecture::LectureIdx,
    placement::{Placement, PlacementIdx},
    time_location::TimeLocation,
    timetable_model::Timetable,
};

use super::constraint::{Conflicts, ConstraintContext, TimetableConstraint};

/// A room that can host one class at a time, unless the classes are allowed
/// to share it and fit in together.
#[derive(Debug, Clone)]
pub struct RoomConstraint {
    id: u64,
    name: String,
    capacity: usize,
    lectures: Vec<LectureIdx>,
    /// Placements occupying each week slot.
    resource: Vec<SmallVec<[PlacementIdx; 2]>>,
    not_available: Vec<TimeLocation>,
    useless_half_hours: usize,
    broken_time_patterns: f64,
}

impl RoomConstraint {
    pub fn new(id: u64, name: impl Into<String>, capacity: usize) -> Self {
        RoomConstraint {
            id,
            name: name.into(),
            capacity,
            lectures: Vec::new(),
            resource: vec![SmallVec::new(); SLOTS_PER_DAY * NR_DAYS],
            not_available: Vec::new(),
            useless_half_hours: 0,
            broken_time_patterns: 0.0,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn add_lecture(&mut self, lecture: LectureIdx) {
        if !self.lectures.contains(&lecture) {
            self.lectures.push(lecture);
        }
    }

    /// Blocks the room during `time`.
    pub fn set_not_available(&mut self, time: TimeLocation) {
        self.not_available.push(time);
    }

    pub fn is_available(&self, time: &TimeLocation) -> bool {
        !self
            .not_available
            .iter()
            .any(|blocked| blocked.has_intersection(time))
    }

    /// Placements currently occupying the given week slot.
    pub fn placements(&self, slot: usize) -> &[PlacementIdx] {
        &self.resource[slot]
    }

    /// Empty half hours squeezed between two classes of this room.
    pub fn useless_half_hours(&self) -> usize {
        self.useless_half_hours
    }

    /// Current value of the broken time pattern counter of this room.
    pub fn broken_time_patterns(&self) -> f64 {
        self.broken_time_patterns
    }

    /// Whether `placement`, every placement of `others` and `extra` fit in
    /// the room on every slot they meet together.
    pub fn check_room_size(
        &self,
        timetable: &Timetable,
        placement: &Placement,
        others: &[PlacementIdx],
        extra: Option<PlacementIdx>,
    ) -> bool {
        let time = placement.time_location();
        let own = timetable.lecture(placement.lecture()).max_room_use();
        let extra = extra.map(|extra| timetable.placement(extra));

        for day in time.days() {
            if extra.is_some_and(|extra| extra.time_location().day_code() & DAY_CODES[day] == 0) {
                continue;
            }
            for slot in time.start_slot()..time.start_slot() + time.length() {
                let mut size = own;
                if let Some(extra) = extra {
                    if !covers(extra.time_location(), day, slot) {
                        continue;
                    }
                    size += timetable.lecture(extra.lecture()).max_room_use();
                }
                for &other in others {
                    let other = timetable.placement(other);
                    if covers(other.time_location(), day, slot) {
                        size += timetable.lecture(other.lecture()).max_room_use();
                    }
                }
                if size > self.capacity {
                    return false;
                }
            }
        }
        true
    }

    fn collect_conflicts(
        &self,
        timetable: &Timetable,
        placement: PlacementIdx,
        conflicts: &mut Conflicts,
        stop_at_first: bool,
    ) {
        let value = timetable.placement(placement);
        if !value.has_room(self.id) {
            return;
        }
        let lecture_idx = value.lecture();
        let lecture = timetable.lecture(lecture_idx);
        let current = timetable.assignment(lecture_idx);
        let time = value.time_location();

        let mut shared: SmallVec<[PlacementIdx; 4]> = SmallVec::new();
        for slot in time.slots() {
            for &occupant in &self.resource[slot] {
                let other = timetable.placement(occupant);
                if !other.time_location().share_weeks(time)
                    || other.lecture() == lecture_idx
                    || Some(occupant) == current
                    || shared.contains(&occupant)
                    || conflicts.contains(&occupant)
                {
                    continue;
                }
                if lecture.can_share_room_with(lecture_idx, other.lecture())
                    && self.check_room_size(timetable, value, &shared, Some(occupant))
                {
                    shared.push(occupant);
                } else {
                    conflicts.insert(occupant);
                    if stop_at_first {
                        return;
                    }
                }
            }
        }
    }

    /// Slots starting an empty half hour with classes right before and right
    /// after it.
    fn count_useless_half_hours(&self) -> usize {
        let empty = |slot: usize| self.resource[slot].is_empty();
        (0..NR_DAYS * SLOTS_PER_DAY)
            .filter(|&slot| {
                let in_day = slot % SLOTS_PER_DAY;
                in_day >= 1
                    && in_day + HALF_HOUR < SLOTS_PER_DAY
                    && !empty(slot - 1)
                    && (slot..slot + HALF_HOUR).all(empty)
                    && !empty(slot + HALF_HOUR)
            })
            .count()
    }

    /// Empty slots on one day of a MWF or TTh pattern whose other days are
    /// in use.
    fn count_broken_time_patterns(&self) -> usize {
        let occupied = |day: usize, slot: usize| !self.resource[day * SLOTS_PER_DAY + slot].is_empty();
        (0..SLOTS_PER_DAY)
            .map(|slot| {
                let empty = |day: usize| !occupied(day, slot);
                [
                    empty(0) && occupied(2, slot) && occupied(4, slot),
                    empty(1) && occupied(3, slot),
                    empty(2) && occupied(0, slot) && occupied(4, slot),
                    empty(3) && occupied(1, slot),
                    empty(4) && occupied(0, slot) && occupied(2, slot),
                ]
                .into_iter()
                .filter(|&broken| broken)
                .count()
            })
            .sum()
    }

    fn update_useless_slots(&mut self, criteria: &mut Criteria) {
        let useless_half_hours = self.count_useless_half_hours();
        criteria.inc(
            Criterion::UselessHalfHours,
            useless_half_hours as f64 - self.useless_half_hours as f64,
        );
        self.useless_half_hours = useless_half_hours;

        let value = self.count_broken_time_patterns() as f64 / 6.0;
        criteria.inc(Criterion::BrokenTimePatterns, value - self.broken_time_patterns);
        self.broken_time_patterns = value;
    }
}

/// Slots in half an hour.
const HALF_HOUR: usize = 30 / SLOT_LENGTH_MIN;

fn covers(time: &TimeLocation, day: usize, slot: usize) -> bool {
    time.day_code() & DAY_CODES[day] != 0
        && time.start_slot() <= slot
        && slot < time.start_slot() + time.length()
}

impl TimetableConstraint for RoomConstraint {
    fn lectures(&self) -> &[LectureIdx] {
        &self.lectures
    }

    fn is_hard(&self) -> bool {
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
        self.collect_conflicts(ctx.timetable, placement, conflicts, false);
    }

    fn in_conflict(&self, ctx: &ConstraintContext, placement: PlacementIdx) -> bool {
        let mut conflicts = Conflicts::default();
        self.collect_conflicts(ctx.timetable, placement, &mut conflicts, true);
        !conflicts.is_empty()
    }

    fn is_consistent(&self, ctx: &ConstraintContext, p1: PlacementIdx, p2: PlacementIdx) -> bool {
        let timetable = ctx.timetable;
        let (first, second) = (timetable.placement(p1), timetable.placement(p2));
        if !first.has_room(self.id) || !second.has_room(self.id) {
            return true;
        }
        if !first.time_location().has_intersection(second.time_location()) {
            return true;
        }
        let lecture = timetable.lecture(first.lecture());
        if !lecture.can_share_room_with(first.lecture(), second.lecture()) {
            return false;
        }
        lecture.max_room_use() + timetable.lecture(second.lecture()).max_room_use()
            <= self.capacity
    }

    fn assigned(
        &mut self,
        timetable: &Timetable,
        criteria: &mut Criteria,
        _iteration: u64,
        placement: PlacementIdx,
    ) {
        let value = timetable.placement(placement);
        if !value.has_room(self.id) {
            return;
        }
        for slot in value.time_location().slots() {
            self.resource[slot].push(placement);
        }
        self.update_useless_slots(criteria);
        trace!(room = self.id, placement = %placement, "Room occupied");
    }

    fn unassigned(
        &mut self,
        timetable: &Timetable,
        criteria: &mut Criteria,
        _iteration: u64,
        placement: PlacementIdx,
    ) {
        let value = timetable.placement(placement);
        if !value.has_room(self.id) {
            return;
        }
        for slot in value.time_location().slots() {
            self.resource[slot].retain(|&mut occupant| occupant != placement);
        }
        self.update_useless_slots(criteria);
    }
}
