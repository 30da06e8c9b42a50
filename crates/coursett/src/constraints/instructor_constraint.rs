use std::{convert::Infallible, ops::ControlFlow};

use fxhash::FxHashSet;
use rand::Rng;
use smallvec::SmallVec;

use crate::model::{
    constants::{
        NR_DAYS, PREFERENCE_LEVEL_DISCOURAGED, PREFERENCE_LEVEL_NEUTRAL,
        PREFERENCE_LEVEL_PROHIBITED, PREFERENCE_LEVEL_STRONGLY_DISCOURAGED, SLOT_LENGTH_MIN,
        SLOTS_PER_DAY,
    },
    criteria::{Criteria, Criterion},
    distance_metric::DistanceMetric,
    lecture::LectureIdx,
    placement::{Placement, PlacementIdx},
    room_location::RoomLocation,
    time_location::TimeLocation,
    timetable_model::Timetable,
};

use super::constraint::{Conflicts, ConstraintContext, TimetableConstraint};

/// A time the instructor is busy elsewhere, optionally in known rooms.
#[derive(Debug, Clone)]
struct Unavailability {
    time: TimeLocation,
    rooms: Vec<RoomLocation>,
}

/// An instructor teaches one class at a time and needs enough time to walk
/// between back-to-back classes.
#[derive(Debug, Clone)]
pub struct InstructorConstraint {
    id: u64,
    name: String,
    lectures: Vec<LectureIdx>,
    ignore_distances: bool,
    unavailabilities: Vec<Unavailability>,
    resource: Vec<SmallVec<[PlacementIdx; 2]>>,
    preference: i32,
}

impl InstructorConstraint {
    pub fn new(
        id: u64,
        name: impl Into<String>,
        lectures: Vec<LectureIdx>,
        ignore_distances: bool,
    ) -> Self {
        InstructorConstraint {
            id,
            name: name.into(),
            lectures,
            ignore_distances,
            unavailabilities: Vec::new(),
            resource: vec![SmallVec::new(); SLOTS_PER_DAY * NR_DAYS],
            preference: 0,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ignore_distances(&self) -> bool {
        self.ignore_distances
    }

    pub fn set_not_available(&mut self, time: TimeLocation, rooms: Vec<RoomLocation>) {
        self.unavailabilities.push(Unavailability { time, rooms });
    }

    pub fn is_time_available(&self, time: &TimeLocation) -> bool {
        !self
            .unavailabilities
            .iter()
            .any(|blocked| blocked.time.has_intersection(time))
    }

    /// Whether the instructor can teach `placement` given the blocked times,
    /// including the travel to and from a blocked time right before or after.
    pub fn is_placement_available(&self, metric: &DistanceMetric, placement: &Placement) -> bool {
        let t1 = placement.time_location();
        for blocked in &self.unavailabilities {
            let t2 = &blocked.time;
            if t1.has_intersection(t2) {
                return false;
            }
            if self.ignore_distances || !t1.share_days(t2) || !t1.share_weeks(t2) {
                continue;
            }
            if is_back_to_back(t1, t2) {
                let distance = rooms_distance_in_meters(metric, placement.rooms(), &blocked.rooms);
                if distance > metric.instructor_prohibited_limit() {
                    return false;
                }
            } else if metric.compute_distance_conflicts_between_non_btb_classes()
                && let Some((break_time, gap)) = gap_between(t1, t2)
            {
                let minutes = rooms_distance_in_minutes(metric, placement.rooms(), &blocked.rooms);
                if minutes > break_time + gap {
                    return false;
                }
            }
        }
        true
    }

    /// Travel preference between two placements of this instructor.
    pub fn distance_preference(&self, metric: &DistanceMetric, p1: &Placement, p2: &Placement) -> i32 {
        let (t1, t2) = (p1.time_location(), p2.time_location());
        if !t1.share_days(t2) || !t1.share_weeks(t2) {
            return PREFERENCE_LEVEL_NEUTRAL;
        }
        if is_back_to_back(t1, t2) {
            let distance = p1.distance_in_meters(metric, p2);
            if distance <= metric.instructor_no_preference_limit() {
                PREFERENCE_LEVEL_NEUTRAL
            } else if distance <= metric.instructor_discouraged_limit() {
                PREFERENCE_LEVEL_DISCOURAGED
            } else if self.ignore_distances || distance <= metric.instructor_prohibited_limit() {
                PREFERENCE_LEVEL_STRONGLY_DISCOURAGED
            } else {
                PREFERENCE_LEVEL_PROHIBITED
            }
        } else if metric.compute_distance_conflicts_between_non_btb_classes()
            && let Some((break_time, gap)) = gap_between(t1, t2)
        {
            self.non_back_to_back_preference(p1.distance_in_minutes(metric, p2), break_time, gap)
        } else {
            PREFERENCE_LEVEL_NEUTRAL
        }
    }

    fn non_back_to_back_preference(&self, minutes: usize, break_time: usize, gap: usize) -> i32 {
        if minutes > break_time + gap {
            if self.ignore_distances {
                PREFERENCE_LEVEL_STRONGLY_DISCOURAGED
            } else {
                PREFERENCE_LEVEL_PROHIBITED
            }
        } else if minutes > gap {
            PREFERENCE_LEVEL_DISCOURAGED
        } else {
            PREFERENCE_LEVEL_NEUTRAL
        }
    }

    /// Travel preference of the current assignment.
    pub fn preference(&self) -> i32 {
        self.preference
    }

    pub fn worst_preference(&self) -> i32 {
        PREFERENCE_LEVEL_STRONGLY_DISCOURAGED * self.lectures.len().saturating_sub(1) as i32
    }

    /// Travel preference `placement` would have against the current
    /// assignment.
    pub fn placement_preference(&self, timetable: &Timetable, placement: PlacementIdx) -> i32 {
        let metric = timetable.distance_metric();
        let value = timetable.placement(placement);
        let lecture = value.lecture();
        let time = value.time_location();
        let mut checked: FxHashSet<PlacementIdx> = FxHashSet::default();
        let mut preference = 0;

        for start in time.start_slots() {
            let neighbours = self
                .previous_slot(start)
                .into_iter()
                .map(|slot| (slot, false))
                .chain(self.next_slot(start, time.length()).map(|slot| (slot, true)));
            for (slot, after) in neighbours {
                for &other in &self.resource[slot] {
                    let other_value = timetable.placement(other);
                    if !other_value.time_location().share_weeks(time)
                        || other_value.lecture() == lecture
                        || !checked.insert(other)
                    {
                        continue;
                    }
                    let distance = value.distance_in_meters(metric, other_value);
                    if distance > metric.instructor_no_preference_limit()
                        && distance <= metric.instructor_discouraged_limit()
                    {
                        preference += PREFERENCE_LEVEL_DISCOURAGED;
                    }
                    if distance > metric.instructor_discouraged_limit()
                        && (self.ignore_distances
                            || distance <= metric.instructor_prohibited_limit())
                    {
                        preference += PREFERENCE_LEVEL_STRONGLY_DISCOURAGED;
                    }
                    if !self.ignore_distances && distance > metric.instructor_prohibited_limit() {
                        if after {
                            preference = PREFERENCE_LEVEL_PROHIBITED;
                        } else {
                            preference += PREFERENCE_LEVEL_PROHIBITED;
                        }
                    }
                }
            }
        }

        if metric.compute_distance_conflicts_between_non_btb_classes() {
            for (other, other_value) in self.assigned_others(timetable, lecture) {
                let t2 = other_value.time_location();
                if other == placement || !time.share_days(t2) || !time.share_weeks(t2) {
                    continue;
                }
                if let Some((break_time, gap)) = gap_between(time, t2) {
                    preference += self.non_back_to_back_preference(
                        value.distance_in_minutes(metric, other_value),
                        break_time,
                        gap,
                    );
                }
            }
        }
        preference
    }

    /// Travel preference of every pair of consecutive classes.
    fn count_preference(&self, timetable: &Timetable) -> i32 {
        let metric = timetable.distance_metric();
        let mut checked: FxHashSet<PlacementIdx> = FxHashSet::default();
        let mut preference = 0;

        for slot in 1..self.resource.len() {
            if slot % SLOTS_PER_DAY == 0 {
                continue;
            }
            for &placement in &self.resource[slot] {
                let value = timetable.placement(placement);
                for &other in &self.resource[slot - 1] {
                    let other_value = timetable.placement(other);
                    if !other_value
                        .time_location()
                        .share_weeks(value.time_location())
                        || other_value.lecture() == value.lecture()
                        || !checked.insert(other)
                    {
                        continue;
                    }
                    let distance = other_value.distance_in_meters(metric, value);
                    if distance > metric.instructor_no_preference_limit()
                        && distance <= metric.instructor_discouraged_limit()
                    {
                        preference += PREFERENCE_LEVEL_DISCOURAGED;
                    }
                    if distance > metric.instructor_discouraged_limit() {
                        preference += PREFERENCE_LEVEL_STRONGLY_DISCOURAGED;
                    }
                }
            }
        }

        if metric.compute_distance_conflicts_between_non_btb_classes() {
            for &lecture in &self.lectures {
                let Some(first) = timetable.assigned_placement(lecture) else {
                    continue;
                };
                let t1 = first.time_location();
                for (_, second) in self.assigned_others(timetable, lecture) {
                    let t2 = second.time_location();
                    if !t1.share_days(t2) || !t1.share_weeks(t2) {
                        continue;
                    }
                    if t2.start_slot() + t2.length() < t1.start_slot() {
                        let gap = SLOT_LENGTH_MIN * (t1.start_slot() - t2.start_slot() - t2.length());
                        preference += self.non_back_to_back_preference(
                            first.distance_in_minutes(metric, second),
                            t2.break_time(),
                            gap,
                        );
                    }
                }
            }
        }
        preference
    }

    /// Single free slots between two classes of the instructor.
    pub fn count_useless_slots(&self) -> usize {
        (0..NR_DAYS)
            .flat_map(|day| (1..SLOTS_PER_DAY - 1).map(move |slot| day * SLOTS_PER_DAY + slot))
            .filter(|&slot| {
                !self.resource[slot - 1].is_empty()
                    && self.resource[slot].is_empty()
                    && !self.resource[slot + 1].is_empty()
            })
            .count()
    }

    pub fn placements(&self, slot: usize) -> &[PlacementIdx] {
        &self.resource[slot]
    }

    fn previous_slot(&self, start: usize) -> Option<usize> {
        (start % SLOTS_PER_DAY != 0).then(|| start - 1)
    }

    fn next_slot(&self, start: usize, length: usize) -> Option<usize> {
        let next = start + length;
        (next / SLOTS_PER_DAY == start / SLOTS_PER_DAY).then_some(next)
    }

    fn assigned_others<'a>(
        &'a self,
        timetable: &'a Timetable,
        lecture: LectureIdx,
    ) -> impl Iterator<Item = (PlacementIdx, &'a Placement)> + 'a {
        self.lectures
            .iter()
            .filter(move |&&other| other != lecture)
            .filter_map(move |&other| timetable.assignment(other))
            .map(move |placement| (placement, timetable.placement(placement)))
    }

    fn scan_conflicts<B>(
        &self,
        timetable: &Timetable,
        placement: PlacementIdx,
        mut visit: impl FnMut(PlacementIdx) -> ControlFlow<B>,
    ) -> ControlFlow<B> {
        let metric = timetable.distance_metric();
        let value = timetable.placement(placement);
        let lecture_idx = value.lecture();
        let lecture = timetable.lecture(lecture_idx);
        let current = timetable.assignment(lecture_idx);
        let time = value.time_location();
        let shares_rooms = |other: &Placement| {
            lecture.can_share_room_with(lecture_idx, other.lecture()) && value.same_rooms(other)
        };

        for slot in time.slots() {
            for &occupant in &self.resource[slot] {
                let other = timetable.placement(occupant);
                if Some(occupant) == current
                    || !other.time_location().share_weeks(time)
                    || shares_rooms(other)
                {
                    continue;
                }
                visit(occupant)?;
            }
        }

        if self.ignore_distances {
            return ControlFlow::Continue(());
        }

        for start in time.start_slots() {
            let neighbours = self
                .previous_slot(start)
                .into_iter()
                .chain(self.next_slot(start, time.length()));
            for slot in neighbours {
                for &occupant in &self.resource[slot] {
                    let other = timetable.placement(occupant);
                    if !other.time_location().share_weeks(time)
                        || other.lecture() == lecture_idx
                        || shares_rooms(other)
                    {
                        continue;
                    }
                    if value.distance_in_meters(metric, other) > metric.instructor_prohibited_limit()
                    {
                        visit(occupant)?;
                    }
                }
            }
        }

        if metric.compute_distance_conflicts_between_non_btb_classes() {
            for (occupant, other) in self.assigned_others(timetable, lecture_idx) {
                let t2 = other.time_location();
                if !time.share_days(t2) || !time.share_weeks(t2) {
                    continue;
                }
                if let Some((break_time, gap)) = gap_between(time, t2)
                    && value.distance_in_minutes(metric, other) > break_time + gap
                {
                    visit(occupant)?;
                }
            }
        }
        ControlFlow::Continue(())
    }

    fn update_preference(&mut self, timetable: &Timetable, criteria: &mut Criteria) {
        let preference = self.count_preference(timetable);
        criteria.inc(
            Criterion::InstructorDistancePreferences,
            f64::from(preference - self.preference),
        );
        self.preference = preference;
    }
}

fn is_back_to_back(t1: &TimeLocation, t2: &TimeLocation) -> bool {
    t1.start_slot() + t1.length() == t2.start_slot() || t2.start_slot() + t2.length() == t1.start_slot()
}

/// Break time of the earlier meeting and the free minutes between two
/// meetings that do not touch, `None` when they touch or overlap.
fn gap_between(t1: &TimeLocation, t2: &TimeLocation) -> Option<(usize, usize)> {
    if t1.start_slot() + t1.length() < t2.start_slot() {
        Some((
            t1.break_time(),
            SLOT_LENGTH_MIN * (t2.start_slot() - t1.start_slot() - t1.length()),
        ))
    } else if t2.start_slot() + t2.length() < t1.start_slot() {
        Some((
            t2.break_time(),
            SLOT_LENGTH_MIN * (t1.start_slot() - t2.start_slot() - t2.length()),
        ))
    } else {
        None
    }
}

fn rooms_distance_in_meters(metric: &DistanceMetric, a: &[RoomLocation], b: &[RoomLocation]) -> f64 {
    a.iter()
        .flat_map(|r1| b.iter().map(move |r2| r1.distance_in_meters(metric, r2)))
        .fold(0.0, f64::max)
}

fn rooms_distance_in_minutes(
    metric: &DistanceMetric,
    a: &[RoomLocation],
    b: &[RoomLocation],
) -> usize {
    a.iter()
        .flat_map(|r1| b.iter().map(move |r2| r1.distance_in_minutes(metric, r2)))
        .max()
        .unwrap_or(0)
}

impl TimetableConstraint for InstructorConstraint {
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
        let ControlFlow::Continue(()) =
            self.scan_conflicts(ctx.timetable, placement, |conflict| {
                conflicts.insert(conflict);
                ControlFlow::<Infallible>::Continue(())
            });
    }

    fn in_conflict(&self, ctx: &ConstraintContext, placement: PlacementIdx) -> bool {
        self.scan_conflicts(ctx.timetable, placement, |_| ControlFlow::Break(()))
            .is_break()
    }

    fn is_consistent(&self, ctx: &ConstraintContext, p1: PlacementIdx, p2: PlacementIdx) -> bool {
        let timetable = ctx.timetable;
        let (first, second) = (timetable.placement(p1), timetable.placement(p2));
        let lecture = timetable.lecture(first.lecture());
        if lecture.can_share_room_with(first.lecture(), second.lecture()) && first.same_rooms(second)
        {
            return true;
        }
        if first.time_location().has_intersection(second.time_location()) {
            return false;
        }
        self.distance_preference(timetable.distance_metric(), first, second)
            != PREFERENCE_LEVEL_PROHIBITED
    }

    fn assigned(
        &mut self,
        timetable: &Timetable,
        criteria: &mut Criteria,
        _iteration: u64,
        placement: PlacementIdx,
    ) {
        for slot in timetable.placement(placement).time_location().slots() {
            self.resource[slot].push(placement);
        }
        self.update_preference(timetable, criteria);
    }

    fn unassigned(
        &mut self,
        timetable: &Timetable,
        criteria: &mut Criteria,
        _iteration: u64,
        placement: PlacementIdx,
    ) {
        for slot in timetable.placement(placement).time_location().slots() {
            self.resource[slot].retain(|&mut occupant| occupant != placement);
        }
        self.update_preference(timetable, criteria);
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        constraints::constraint::{Constraint, ConstraintIdx},
        model::{timetable_model::TimetableModel, timetable_params::TimetableParams},
        test_utils::{MONDAY, MWF, MockRng, add_lecture, time},
    };

    use super::*;

    fn room(id: u64, x: f64) -> RoomLocation {
        RoomLocation::new(id, format!("R{id}"), 30, 0).with_position(x, 0.0)
    }

    fn instructor(model: &TimetableModel, idx: ConstraintIdx) -> &InstructorConstraint {
        match model.constraint(idx) {
            Constraint::Instructor(instructor) => instructor,
            _ => panic!("not an instructor constraint"),
        }
    }

    /// Two back-to-back MWF classes, 400 units apart.
    fn back_to_back_model(ignore_distances: bool, far: f64) -> (TimetableModel, ConstraintIdx, PlacementIdx, PlacementIdx) {
        let mut model = TimetableModel::new(TimetableParams::default());
        model
            .distance_metric_mut()
            .set_instructor_limits(100.0, 300.0, 800.0);
        let (a, a_values) = add_lecture(&mut model, 1, vec![(time(MWF, 90, 12), vec![room(1, 0.0)])]);
        let (b, b_values) = add_lecture(&mut model, 2, vec![(time(MWF, 102, 12), vec![room(2, far)])]);
        let idx = model
            .add_constraint(Constraint::Instructor(InstructorConstraint::new(
                1,
                "Smith",
                vec![a, b],
                ignore_distances,
            )))
            .unwrap();
        (model, idx, a_values[0], b_values[0])
    }

    #[test]
    fn test_overlapping_classes_conflict() {
        let mut model = TimetableModel::new(TimetableParams::default());
        let (a, a_values) = add_lecture(&mut model, 1, vec![(time(MWF, 90, 12), vec![])]);
        let (b, b_values) = add_lecture(
            &mut model,
            2,
            vec![(time(MONDAY, 96, 12), vec![]), (time(MONDAY, 120, 12), vec![])],
        );
        let idx = model
            .add_constraint(Constraint::Instructor(InstructorConstraint::new(
                1,
                "Smith",
                vec![a, b],
                false,
            )))
            .unwrap();
        let mut rng = MockRng::new(vec![0]);

        model.assign(0, a_values[0]).unwrap();
        let ctx = model.context();
        let constraint = instructor(&model, idx);

        let mut conflicts = Conflicts::default();
        constraint.compute_conflicts(&ctx, b_values[0], &mut conflicts, &mut rng);
        assert_eq!(conflicts, Conflicts::from_iter([a_values[0]]));
        assert!(constraint.in_conflict(&ctx, b_values[0]));
        assert!(!constraint.is_consistent(&ctx, a_values[0], b_values[0]));

        assert!(!constraint.in_conflict(&ctx, b_values[1]));
        assert!(constraint.is_consistent(&ctx, a_values[0], b_values[1]));
    }

    #[test]
    fn test_strongly_discouraged_distance_is_not_a_conflict() {
        let (mut model, idx, a, b) = back_to_back_model(false, 400.0);
        let mut rng = MockRng::new(vec![0]);

        model.assign(0, a).unwrap();
        let ctx = model.context();
        let constraint = instructor(&model, idx);
        let metric = model.timetable().distance_metric();
        assert_eq!(
            constraint.distance_preference(
                metric,
                model.timetable().placement(a),
                model.timetable().placement(b)
            ),
            PREFERENCE_LEVEL_STRONGLY_DISCOURAGED
        );
        assert_eq!(constraint.placement_preference(model.timetable(), b), 4);

        let mut conflicts = Conflicts::default();
        constraint.compute_conflicts(&ctx, b, &mut conflicts, &mut rng);
        assert!(conflicts.is_empty());
        assert!(!constraint.in_conflict(&ctx, b));

        model.assign(1, b).unwrap();
        assert_eq!(instructor(&model, idx).preference(), 4);
        assert_eq!(
            model
                .criteria()
                .value(Criterion::InstructorDistancePreferences),
            4.0
        );
    }

    #[test]
    fn test_prohibited_distance_conflicts_unless_ignored() {
        let (mut model, idx, a, b) = back_to_back_model(false, 1000.0);
        let mut rng = MockRng::new(vec![0]);
        model.assign(0, a).unwrap();
        let ctx = model.context();
        let constraint = instructor(&model, idx);

        let mut conflicts = Conflicts::default();
        constraint.compute_conflicts(&ctx, b, &mut conflicts, &mut rng);
        assert!(conflicts.contains(&a));
        assert!(!constraint.is_consistent(&ctx, a, b));

        let (mut model, idx, a, b) = back_to_back_model(true, 1000.0);
        model.assign(0, a).unwrap();
        let ctx = model.context();
        let constraint = instructor(&model, idx);
        assert!(!constraint.in_conflict(&ctx, b));
        assert!(constraint.is_consistent(&ctx, a, b));
        assert_eq!(constraint.placement_preference(model.timetable(), b), 4);
    }

    #[test]
    fn test_preference_is_restored_after_unassign() {
        let (mut model, idx, a, b) = back_to_back_model(false, 200.0);
        model.assign(0, a).unwrap();
        model.assign(1, b).unwrap();
        assert_eq!(instructor(&model, idx).preference(), 1);

        let lecture = model.timetable().placement(b).lecture();
        model.unassign(2, lecture).unwrap();
        assert_eq!(instructor(&model, idx).preference(), 0);
        assert_eq!(
            model
                .criteria()
                .value(Criterion::InstructorDistancePreferences),
            0.0
        );
        assert!(instructor(&model, idx).placements(95).contains(&a));
        assert!(instructor(&model, idx).placements(105).is_empty());
    }

    #[test]
    fn test_non_back_to_back_travel() {
        let mut model = TimetableModel::new(TimetableParams::default());
        model
            .distance_metric_mut()
            .set_instructor_limits(100.0, 300.0, 800.0)
            .set_compute_distance_conflicts_between_non_btb_classes(true);
        let (a, a_values) = add_lecture(&mut model, 1, vec![(time(MONDAY, 90, 12), vec![room(1, 0.0)])]);
        // ten minutes after the first class, an hour away
        let (b, b_values) =
            add_lecture(&mut model, 2, vec![(time(MONDAY, 104, 12), vec![room(2, 400.0)])]);
        let idx = model
            .add_constraint(Constraint::Instructor(InstructorConstraint::new(
                1,
                "Smith",
                vec![a, b],
                false,
            )))
            .unwrap();

        model.assign(0, a_values[0]).unwrap();
        let ctx = model.context();
        let constraint = instructor(&model, idx);
        assert!(constraint.in_conflict(&ctx, b_values[0]));
        assert_eq!(
            constraint.distance_preference(
                model.timetable().distance_metric(),
                model.timetable().placement(a_values[0]),
                model.timetable().placement(b_values[0])
            ),
            PREFERENCE_LEVEL_PROHIBITED
        );
    }

    #[test]
    fn test_availability() {
        let metric = DistanceMetric::default();
        let mut constraint = InstructorConstraint::new(1, "Smith", vec![], false);
        constraint.set_not_available(time(MONDAY, 90, 12), vec![room(9, 0.0)]);

        assert!(!constraint.is_time_available(&time(MWF, 96, 12)));
        assert!(constraint.is_time_available(&time(MWF, 102, 12)));

        let near = Placement::new(LectureIdx::new(0), time(MWF, 102, 12), vec![room(1, 10.0)]);
        let far = Placement::new(LectureIdx::new(0), time(MWF, 102, 12), vec![room(2, 500.0)]);
        let later = Placement::new(LectureIdx::new(0), time(MWF, 150, 12), vec![room(2, 500.0)]);
        assert!(constraint.is_placement_available(&metric, &near));
        assert!(!constraint.is_placement_available(&metric, &far));
        assert!(constraint.is_placement_available(&metric, &later));
    }

    #[test]
    fn test_useless_slots_and_worst_preference() {
        let mut model = TimetableModel::new(TimetableParams::default());
        let (a, a_values) = add_lecture(&mut model, 1, vec![(time(MONDAY, 90, 12), vec![])]);
        let (b, b_values) = add_lecture(&mut model, 2, vec![(time(MONDAY, 103, 12), vec![])]);
        let (c, _) = add_lecture(&mut model, 3, vec![(time(MONDAY, 150, 12), vec![])]);
        let idx = model
            .add_constraint(Constraint::Instructor(InstructorConstraint::new(
                1,
                "Smith",
                vec![a, b, c],
                false,
            )))
            .unwrap();

        model.assign(0, a_values[0]).unwrap();
        model.assign(1, b_values[0]).unwrap();
        assert_eq!(instructor(&model, idx).count_useless_slots(), 1);
        assert_eq!(instructor(&model, idx).worst_preference(), 8);
    }
}
