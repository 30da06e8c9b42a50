use rand::Rng;

use crate::model::{
    criteria::{Criteria, Criterion},
    lecture::LectureIdx,
    placement::PlacementIdx,
    timetable_model::Timetable,
    timetable_params::TimetableParams,
};

use super::{
    constraint::{Conflicts, ConstraintContext, TimetableConstraint},
    spread_constraint::SpreadConstraint,
};

/// Balancing of all lectures of one department, configured by the
/// `DeptBalancing.*` parameters.
#[derive(Debug, Clone)]
pub struct DepartmentSpreadConstraint {
    department: u64,
    spread: SpreadConstraint,
}

impl DepartmentSpreadConstraint {
    pub fn new(
        department: u64,
        name: impl Into<String>,
        lectures: Vec<LectureIdx>,
        params: &TimetableParams,
    ) -> Self {
        DepartmentSpreadConstraint {
            department,
            spread: SpreadConstraint::with_settings(
                name,
                lectures,
                params,
                params.department_spread_factor,
                params.effective_department_unassignments_to_weaken(),
                Criterion::DepartmentBalancingPenalty,
            ),
        }
    }

    pub fn department(&self) -> u64 {
        self.department
    }

    pub fn spread(&self) -> &SpreadConstraint {
        &self.spread
    }

    pub fn retain_lectures<F>(&mut self, f: F)
    where
        F: FnMut(LectureIdx) -> bool,
    {
        self.spread.retain_lectures(f);
    }

    pub fn init(&mut self, timetable: &Timetable, criteria: &mut Criteria) {
        self.spread.init(timetable, criteria);
    }

    pub fn weaken(&mut self) {
        self.spread.weaken();
    }

    pub fn weaken_for(&mut self, timetable: &Timetable, placement: PlacementIdx) {
        self.spread.weaken_for(timetable, placement);
    }
}

impl TimetableConstraint for DepartmentSpreadConstraint {
    fn lectures(&self) -> &[LectureIdx] {
        self.spread.lectures()
    }

    fn is_hard(&self) -> bool {
        self.spread.is_hard()
    }

    fn is_weakening(&self) -> bool {
        self.spread.is_weakening()
    }

    fn compute_conflicts<R>(
        &self,
        ctx: &ConstraintContext,
        placement: PlacementIdx,
        conflicts: &mut Conflicts,
        rng: &mut R,
    ) where
        R: Rng,
    {
        self.spread.compute_conflicts(ctx, placement, conflicts, rng);
    }

    fn in_conflict(&self, ctx: &ConstraintContext, placement: PlacementIdx) -> bool {
        self.spread.in_conflict(ctx, placement)
    }

    fn is_consistent(&self, ctx: &ConstraintContext, p1: PlacementIdx, p2: PlacementIdx) -> bool {
        self.spread.is_consistent(ctx, p1, p2)
    }

    fn assigned(
        &mut self,
        timetable: &Timetable,
        criteria: &mut Criteria,
        iteration: u64,
        placement: PlacementIdx,
    ) {
        self.spread.assigned(timetable, criteria, iteration, placement);
    }

    fn unassigned(
        &mut self,
        timetable: &Timetable,
        criteria: &mut Criteria,
        iteration: u64,
        placement: PlacementIdx,
    ) {
        self.spread.unassigned(timetable, criteria, iteration, placement);
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        constraints::constraint::Constraint,
        model::{lecture::LectureBuilder, timetable_model::TimetableModel},
        test_utils::{MWF, add_built_lecture, time},
    };

    use super::*;

    #[test]
    fn test_department_balancing_publishes_its_own_criterion() {
        let params = TimetableParams {
            department_unassignments_to_weaken: 2,
            ..TimetableParams::default()
        };
        let mut model = TimetableModel::new(params);
        let mut lectures = Vec::new();
        let mut values = Vec::new();
        for id in 1..=2 {
            let mut builder = LectureBuilder::default();
            builder.set_id(id).set_class_limit(10).set_department(7);
            let (lecture, lecture_values) =
                add_built_lecture(&mut model, builder, vec![(time(MWF, 90, 12), vec![])]);
            lectures.push(lecture);
            values.push(lecture_values[0]);
        }
        let constraint =
            DepartmentSpreadConstraint::new(7, "Dept 7", lectures.clone(), model.timetable().params());
        assert_eq!(constraint.department(), 7);
        assert_eq!(constraint.spread().criterion(), Criterion::DepartmentBalancingPenalty);
        assert_eq!(constraint.spread().unassignments_to_weaken(), 2);
        let idx = model
            .add_constraint(Constraint::DepartmentSpread(constraint))
            .unwrap();
        assert_eq!(
            model.timetable().lecture(lectures[0]).department_spread_constraint(),
            Some(idx)
        );

        // Both lectures can only meet at the same time: each cell expects 2.
        model.initialize();
        model.assign(0, values[0]).unwrap();
        model.assign(0, values[1]).unwrap();
        assert_eq!(model.criteria().value(Criterion::DepartmentBalancingPenalty), 0.0);
        assert_eq!(model.criteria().value(Criterion::SameSubpartBalancingPenalty), 0.0);
        assert!(!model.in_conflict(values[1]));

        model.weaken();
        model.weaken();
        match model.constraint(idx) {
            Constraint::DepartmentSpread(constraint) => {
                assert_eq!(constraint.spread().max_allowed_penalty(), 1)
            }
            _ => panic!("not a department spread constraint"),
        }
    }
}
