use fxhash::FxHashSet;
use rand::Rng;
use tracing::debug;

use crate::model::{
    constants::SLOT_LENGTH_MIN,
    criteria::{Criteria, Criterion},
    lecture::LectureIdx,
    placement::{Placement, PlacementIdx},
    student::StudentIdx,
    timetable_model::Timetable,
};

use super::constraint::{Conflicts, ConstraintContext, TimetableConstraint};

const WEAKEN_EPSILON: f64 = 0.00001;

/// Joint enrollment of two lectures.
///
/// Keeps the weighted number of students attending both lectures and
/// publishes it into [`Criterion::StudentConflicts`] while their placements
/// conflict. With `General.JenrlMaxConflicts` below 1, a pair with too many
/// students becomes hard: its lectures may not conflict at all.
#[derive(Debug, Clone)]
pub struct JenrlConstraint {
    lectures: [LectureIdx; 2],
    jenrl: f64,
    priority: f64,
    students: FxHashSet<StudentIdx>,
    in_conflict: bool,
    min_class_limit: f64,
    max_conflicts: f64,
    max_conflicts_weaken: f64,
    twiggle: f64,
    limit: Option<f64>,
}

impl JenrlConstraint {
    pub fn new(timetable: &Timetable, first: LectureIdx, second: LectureIdx) -> Self {
        let params = timetable.params();
        let min_class_limit = timetable
            .lecture(first)
            .max_class_limit()
            .min(timetable.lecture(second).max_class_limit()) as f64;
        let mut constraint = JenrlConstraint {
            lectures: [first, second],
            jenrl: 0.0,
            priority: 0.0,
            students: FxHashSet::default(),
            in_conflict: false,
            min_class_limit,
            max_conflicts: params.jenrl_max_conflicts,
            max_conflicts_weaken: params.jenrl_max_conflicts_weaken,
            twiggle: 0.0,
            limit: None,
        };
        constraint.limit = constraint.limit_for(constraint.max_conflicts);
        constraint
    }

    pub fn first(&self) -> LectureIdx {
        self.lectures[0]
    }

    pub fn second(&self) -> LectureIdx {
        self.lectures[1]
    }

    /// The other endpoint, `None` if `lecture` is not part of the pair.
    pub fn another(&self, lecture: LectureIdx) -> Option<LectureIdx> {
        match self.lectures {
            [first, second] if first == lecture => Some(second),
            [first, second] if second == lecture => Some(first),
            _ => None,
        }
    }

    pub fn jenrl(&self) -> f64 {
        self.jenrl
    }

    pub fn priority(&self) -> f64 {
        self.priority
    }

    pub fn nr_students(&self) -> usize {
        self.students.len()
    }

    pub fn students(&self) -> &FxHashSet<StudentIdx> {
        &self.students
    }

    pub fn limit(&self) -> Option<f64> {
        self.limit
    }

    /// Whether the current placements of both lectures conflict.
    pub fn is_conflicting(&self) -> bool {
        self.in_conflict
    }

    pub fn is_over_limit(&self) -> bool {
        self.limit.is_some_and(|limit| self.jenrl > limit)
    }

    /// Rounded joint enrollment if `placement` conflicts with the current
    /// placement of the other lecture, 0 otherwise.
    pub fn jenrl_for(&self, timetable: &Timetable, placement: PlacementIdx) -> usize {
        let value = timetable.placement(placement);
        let Some(other) = self
            .another(value.lecture())
            .and_then(|other| timetable.assigned_placement(other))
        else {
            return 0;
        };
        if Self::is_in_conflict(timetable, value, other) {
            self.jenrl.round() as usize
        } else {
            0
        }
    }

    /// Whether a student can not attend both placements: they overlap, or
    /// there is not enough time to walk between them. Conflicts between two
    /// committed lectures are ignored.
    pub fn is_in_conflict(timetable: &Timetable, p1: &Placement, p2: &Placement) -> bool {
        if timetable.lecture(p1.lecture()).is_committed()
            && timetable.lecture(p2.lecture()).is_committed()
        {
            return false;
        }
        p1.time_location().has_intersection(p2.time_location())
            || Self::is_too_far(timetable, p1, p2)
    }

    fn is_too_far(timetable: &Timetable, p1: &Placement, p2: &Placement) -> bool {
        let (t1, t2) = (p1.time_location(), p2.time_location());
        if !t1.share_days(t2) || !t1.share_weeks(t2) {
            return false;
        }
        let metric = timetable.distance_metric();
        let (end1, end2) = (t1.start_slot() + t1.length(), t2.start_slot() + t2.length());
        if metric.compute_distance_conflicts_between_non_btb_classes() {
            if end1 <= t2.start_slot() {
                return p1.distance_in_minutes(metric, p2)
                    > t1.break_time() + SLOT_LENGTH_MIN * (t2.start_slot() - end1);
            }
            if end2 <= t1.start_slot() {
                return p1.distance_in_minutes(metric, p2)
                    > t2.break_time() + SLOT_LENGTH_MIN * (t1.start_slot() - end2);
            }
        } else {
            if end1 == t2.start_slot() {
                return p1.distance_in_minutes(metric, p2) > t1.break_time();
            }
            if end2 == t1.start_slot() {
                return p1.distance_in_minutes(metric, p2) > t2.break_time();
            }
        }
        false
    }

    fn limit_for(&self, max_conflicts: f64) -> Option<f64> {
        (0.0..1.0)
            .contains(&max_conflicts)
            .then(|| self.min_class_limit * max_conflicts)
    }

    fn weights(&self, timetable: &Timetable, student: StudentIdx) -> (f64, Option<f64>) {
        let student = timetable.student(student);
        let offering1 = timetable.offering_id(self.first());
        let offering2 = timetable.offering_id(self.second());
        (
            student.jenrl_weight(offering1, offering2),
            student.conflicting_priority(offering1, offering2),
        )
    }

    /// Adds a student attending both lectures.
    pub fn inc_jenrl(&mut self, timetable: &Timetable, criteria: &mut Criteria, student: StudentIdx) {
        let hard = self.is_over_limit();
        let (weight, priority) = self.weights(timetable, student);
        self.jenrl += weight;
        if let Some(priority) = priority {
            self.priority += priority * weight;
        }
        self.students.insert(student);
        if self.in_conflict {
            criteria.inc(Criterion::StudentConflicts, weight);
        }
        // the pair already conflicts, so the new student must not make it hard
        if !hard
            && self.in_conflict
            && let Some(limit) = self.limit.as_mut()
            && self.jenrl > *limit
        {
            *limit += weight;
        }
    }

    /// Removes a student that no longer attends both lectures.
    pub fn dec_jenrl(&mut self, timetable: &Timetable, criteria: &mut Criteria, student: StudentIdx) {
        let hard = self.is_over_limit();
        let (weight, priority) = self.weights(timetable, student);
        self.jenrl -= weight;
        if let Some(priority) = priority {
            self.priority -= priority * weight;
        }
        self.students.remove(&student);
        if self.in_conflict {
            criteria.inc(Criterion::StudentConflicts, -weight);
        }
        if hard && !self.is_over_limit() {
            self.limit = self
                .limit_for(self.max_conflicts + self.twiggle)
                .zip(self.limit)
                .map(|(base, limit)| base.max(limit - weight));
        }
    }

    /// Whether assigning `placement` requires unassigning the other lecture.
    fn rejects(&self, timetable: &Timetable, placement: PlacementIdx) -> Option<PlacementIdx> {
        if !self.is_over_limit() {
            return None;
        }
        let value = timetable.placement(placement);
        if timetable.lecture(value.lecture()).is_committed() {
            return None;
        }
        let other = self.another(value.lecture())?;
        let current = timetable.assignment(other)?;
        (!timetable.lecture(other).is_committed()
            && Self::is_in_conflict(timetable, value, timetable.placement(current)))
        .then_some(current)
    }

    /// Raises the limit by one weakening step.
    pub fn weaken(&mut self) {
        self.twiggle += self.max_conflicts_weaken;
        self.limit = self.limit_for(self.max_conflicts + self.twiggle);
    }

    /// Raises the limit just enough for `placement` to be accepted.
    pub fn weaken_for(&mut self, timetable: &Timetable, placement: PlacementIdx) {
        if self.rejects(timetable, placement).is_none() || self.min_class_limit <= 0.0 {
            return;
        }
        let max_conflicts = (self.jenrl + WEAKEN_EPSILON) / self.min_class_limit;
        self.twiggle = max_conflicts - self.max_conflicts;
        self.limit = self.limit_for(max_conflicts);
        debug!(
            first = %self.first(),
            second = %self.second(),
            limit = ?self.limit,
            "Weakened joint enrollment limit"
        );
    }
}

impl TimetableConstraint for JenrlConstraint {
    fn lectures(&self) -> &[LectureIdx] {
        &self.lectures
    }

    fn is_hard(&self) -> bool {
        true
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
        if let Some(conflict) = self.rejects(ctx.timetable, placement) {
            conflicts.insert(conflict);
        }
    }

    fn in_conflict(&self, ctx: &ConstraintContext, placement: PlacementIdx) -> bool {
        self.rejects(ctx.timetable, placement).is_some()
    }

    fn is_consistent(&self, ctx: &ConstraintContext, p1: PlacementIdx, p2: PlacementIdx) -> bool {
        let timetable = ctx.timetable;
        !self.is_over_limit()
            || !Self::is_in_conflict(timetable, timetable.placement(p1), timetable.placement(p2))
    }

    fn assigned(
        &mut self,
        timetable: &Timetable,
        criteria: &mut Criteria,
        _iteration: u64,
        _placement: PlacementIdx,
    ) {
        if self.in_conflict {
            return;
        }
        let (Some(p1), Some(p2)) = (
            timetable.assigned_placement(self.first()),
            timetable.assigned_placement(self.second()),
        ) else {
            return;
        };
        if Self::is_in_conflict(timetable, p1, p2) {
            self.in_conflict = true;
            criteria.inc(Criterion::StudentConflicts, self.jenrl);
        }
    }

    fn unassigned(
        &mut self,
        _timetable: &Timetable,
        criteria: &mut Criteria,
        _iteration: u64,
        _placement: PlacementIdx,
    ) {
        if self.in_conflict {
            self.in_conflict = false;
            criteria.inc(Criterion::StudentConflicts, -self.jenrl);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        constraints::constraint::Constraint,
        model::{
            lecture::LectureBuilder, room_location::RoomLocation, student::Student,
            timetable_model::TimetableModel, timetable_params::TimetableParams,
        },
        test_utils::{MWF, MockRng, TTH, add_built_lecture, add_lecture, time},
    };

    use super::*;

    fn jenrl(model: &TimetableModel, first: LectureIdx, second: LectureIdx) -> &JenrlConstraint {
        let idx = model.timetable().lecture(first).jenrl_constraint(second).unwrap();
        match model.constraint(idx) {
            Constraint::Jenrl(jenrl) => jenrl,
            _ => panic!("not a joint enrollment"),
        }
    }

    fn enroll_students(model: &mut TimetableModel, lectures: &[LectureIdx], count: u64) {
        for id in 0..count {
            let student = model.add_student(Student::new(id));
            for &lecture in lectures {
                model.enroll(student, lecture).unwrap();
            }
        }
    }

    #[test]
    fn test_overlap_and_committed_pairs() {
        let mut model = TimetableModel::new(TimetableParams::default());
        let (_, a) = add_lecture(&mut model, 1, vec![(time(MWF, 90, 12), vec![])]);
        let (_, b) = add_lecture(
            &mut model,
            2,
            vec![(time(MWF, 96, 12), vec![]), (time(TTH, 96, 12), vec![])],
        );
        let mut committed = Vec::new();
        for id in 3..5 {
            let mut builder = LectureBuilder::default();
            builder.set_id(id).set_committed(true);
            let (_, values) = add_built_lecture(&mut model, builder, vec![(time(MWF, 90, 12), vec![])]);
            committed.push(values[0]);
        }
        let (c, d) = (committed[0], committed[1]);

        let timetable = model.timetable();
        let placement = |idx| timetable.placement(idx);
        assert!(JenrlConstraint::is_in_conflict(timetable, placement(a[0]), placement(b[0])));
        assert!(!JenrlConstraint::is_in_conflict(timetable, placement(a[0]), placement(b[1])));
        assert!(JenrlConstraint::is_in_conflict(timetable, placement(a[0]), placement(c)));
        assert!(!JenrlConstraint::is_in_conflict(timetable, placement(c), placement(d)));
    }

    #[test]
    fn test_back_to_back_distance() {
        let mut model = TimetableModel::new(TimetableParams::default());
        let near = RoomLocation::new(1, "A", 30, 0).with_position(0.0, 0.0);
        let far = RoomLocation::new(2, "B", 30, 0).with_position(0.0, 100.0);
        let (_, a) = add_lecture(&mut model, 1, vec![(time(MWF, 90, 12), vec![near.clone()])]);
        let (_, b) = add_lecture(
            &mut model,
            2,
            vec![
                (time(MWF, 102, 12), vec![far.clone()]),
                (time(MWF, 102, 12), vec![near]),
                (time(MWF, 104, 12), vec![far]),
            ],
        );

        let timetable = model.timetable();
        let placement = |idx| timetable.placement(idx);
        assert!(JenrlConstraint::is_in_conflict(timetable, placement(a[0]), placement(b[0])));
        assert!(!JenrlConstraint::is_in_conflict(timetable, placement(a[0]), placement(b[1])));
        assert!(!JenrlConstraint::is_in_conflict(timetable, placement(a[0]), placement(b[2])));

        model
            .distance_metric_mut()
            .set_compute_distance_conflicts_between_non_btb_classes(true);
        let timetable = model.timetable();
        assert!(JenrlConstraint::is_in_conflict(
            timetable,
            timetable.placement(a[0]),
            timetable.placement(b[2])
        ));
    }

    #[test]
    fn test_student_conflicts_follow_assignment() {
        let mut model = TimetableModel::new(TimetableParams::default());
        let (a, a_values) = add_lecture(&mut model, 1, vec![(time(MWF, 90, 12), vec![])]);
        let (b, b_values) = add_lecture(
            &mut model,
            2,
            vec![(time(MWF, 96, 12), vec![]), (time(TTH, 96, 12), vec![])],
        );
        enroll_students(&mut model, &[a, b], 3);
        let conflicts = |model: &TimetableModel| model.criteria().value(Criterion::StudentConflicts);

        assert_eq!(jenrl(&model, a, b).nr_students(), 3);
        assert_eq!(jenrl(&model, a, b).jenrl(), 3.0);
        assert_eq!(jenrl(&model, a, b).another(a), Some(b));
        assert_eq!(jenrl(&model, a, b).limit(), None);

        model.assign(0, a_values[0]).unwrap();
        model.assign(1, b_values[0]).unwrap();
        assert!(jenrl(&model, a, b).is_conflicting());
        assert_eq!(conflicts(&model), 3.0);

        model.assign(2, b_values[1]).unwrap();
        assert!(!jenrl(&model, a, b).is_conflicting());
        assert_eq!(conflicts(&model), 0.0);

        model.assign(3, b_values[0]).unwrap();
        model.unassign(4, a).unwrap();
        assert_eq!(conflicts(&model), 0.0);
    }

    #[test]
    fn test_over_limit_pair_is_hard() {
        let params = TimetableParams {
            jenrl_max_conflicts: 0.1,
            jenrl_max_conflicts_weaken: 0.1,
            ..TimetableParams::default()
        };
        let mut model = TimetableModel::new(params);
        let (a, a_values) = add_lecture(&mut model, 1, vec![(time(MWF, 90, 12), vec![])]);
        let (b, b_values) = add_lecture(
            &mut model,
            2,
            vec![(time(MWF, 96, 12), vec![]), (time(TTH, 96, 12), vec![])],
        );
        enroll_students(&mut model, &[a, b], 2);
        model.assign(0, a_values[0]).unwrap();

        let constraint = jenrl(&model, a, b);
        assert_eq!(constraint.limit(), Some(1.0));
        assert!(constraint.is_over_limit());

        let ctx = model.context();
        let mut conflicts = Conflicts::default();
        let mut rng = MockRng::new(vec![0]);
        constraint.compute_conflicts(&ctx, b_values[0], &mut conflicts, &mut rng);
        assert_eq!(conflicts, Conflicts::from_iter([a_values[0]]));
        assert!(constraint.in_conflict(&ctx, b_values[0]));
        assert!(!constraint.in_conflict(&ctx, b_values[1]));
        assert!(!constraint.is_consistent(&ctx, a_values[0], b_values[0]));
        assert!(constraint.is_consistent(&ctx, a_values[0], b_values[1]));

        model.weaken_for(b_values[0]);
        let constraint = jenrl(&model, a, b);
        assert!(!constraint.is_over_limit());
        assert!(!model.in_conflict(b_values[0]));
    }

    #[test]
    fn test_weaken_relaxes_limit() {
        let params = TimetableParams {
            jenrl_max_conflicts: 0.5,
            jenrl_max_conflicts_weaken: 0.25,
            ..TimetableParams::default()
        };
        let mut model = TimetableModel::new(params);
        let (a, _) = add_lecture(&mut model, 1, vec![(time(MWF, 90, 12), vec![])]);
        let (b, _) = add_lecture(&mut model, 2, vec![(time(MWF, 96, 12), vec![])]);
        enroll_students(&mut model, &[a, b], 1);
        assert_eq!(jenrl(&model, a, b).limit(), Some(5.0));

        model.weaken();
        assert_eq!(jenrl(&model, a, b).limit(), Some(7.5));
        model.weaken();
        assert_eq!(jenrl(&model, a, b).limit(), None);
    }

    #[test]
    fn test_jenrl_for_rounds() {
        let mut model = TimetableModel::new(TimetableParams::default());
        let (a, a_values) = add_lecture(&mut model, 1, vec![(time(MWF, 90, 12), vec![])]);
        let (b, b_values) = add_lecture(&mut model, 2, vec![(time(MWF, 96, 12), vec![])]);
        enroll_students(&mut model, &[a, b], 1);

        assert_eq!(jenrl(&model, a, b).jenrl(), 1.0);
        assert_eq!(jenrl(&model, a, b).jenrl_for(model.timetable(), b_values[0]), 0);
        model.assign(0, a_values[0]).unwrap();
        assert_eq!(jenrl(&model, a, b).jenrl_for(model.timetable(), b_values[0]), 1);
    }
}
