use fxhash::FxHashSet;
use rand::Rng;

use crate::{
    define_index_newtype,
    model::{
        criteria::Criteria,
        lecture::LectureIdx,
        placement::PlacementIdx,
        timetable_model::Timetable,
    },
};

use super::{
    class_limit_constraint::ClassLimitConstraint,
    department_spread_constraint::DepartmentSpreadConstraint,
    group_constraint::GroupConstraint, instructor_constraint::InstructorConstraint,
    jenrl_constraint::JenrlConstraint,
    minimize_number_of_used_groups_of_time::MinimizeNumberOfUsedGroupsOfTime,
    minimize_number_of_used_rooms::MinimizeNumberOfUsedRooms,
    room_constraint::RoomConstraint, spread_constraint::SpreadConstraint,
};

define_index_newtype!(ConstraintIdx, Constraint);

/// Placements that have to be unassigned for a candidate to become legal.
pub type Conflicts = FxHashSet<PlacementIdx>;

/// Read-only view handed to constraint queries.
#[derive(Clone, Copy)]
pub struct ConstraintContext<'a> {
    pub timetable: &'a Timetable,
    pub constraints: &'a [Constraint],
}

impl<'a> ConstraintContext<'a> {
    pub fn new(timetable: &'a Timetable, constraints: &'a [Constraint]) -> Self {
        ConstraintContext {
            timetable,
            constraints,
        }
    }

    pub fn constraint(&self, idx: ConstraintIdx) -> &'a Constraint {
        &self.constraints[idx]
    }

    pub fn room_constraint(&self, idx: ConstraintIdx) -> Option<&'a RoomConstraint> {
        match self.constraint(idx) {
            Constraint::Room(room) => Some(room),
            _ => None,
        }
    }
}

pub trait TimetableConstraint {
    fn lectures(&self) -> &[LectureIdx];

    fn is_hard(&self) -> bool;

    /// Weakening constraints relax themselves over time and are skipped by
    /// forward checking.
    fn is_weakening(&self) -> bool {
        false
    }

    fn compute_conflicts<R>(
        &self,
        ctx: &ConstraintContext,
        placement: PlacementIdx,
        conflicts: &mut Conflicts,
        rng: &mut R,
    ) where
        R: Rng;

    fn in_conflict(&self, ctx: &ConstraintContext, placement: PlacementIdx) -> bool;

    fn is_consistent(&self, ctx: &ConstraintContext, p1: PlacementIdx, p2: PlacementIdx)
    -> bool;

    fn assigned(
        &mut self,
        timetable: &Timetable,
        criteria: &mut Criteria,
        iteration: u64,
        placement: PlacementIdx,
    );

    fn unassigned(
        &mut self,
        timetable: &Timetable,
        criteria: &mut Criteria,
        iteration: u64,
        placement: PlacementIdx,
    );
}

#[derive(Debug, Clone)]
pub enum Constraint {
    Room(RoomConstraint),
    Instructor(InstructorConstraint),
    Group(GroupConstraint),
    ClassLimit(ClassLimitConstraint),
    Spread(SpreadConstraint),
    DepartmentSpread(DepartmentSpreadConstraint),
    Jenrl(JenrlConstraint),
    MinimizeGroupsOfTime(MinimizeNumberOfUsedGroupsOfTime),
    MinimizeRoomUsage(MinimizeNumberOfUsedRooms),
}

impl Constraint {
    pub fn constraint_name(&self) -> &'static str {
        match self {
            Constraint::Room(_) => "room",
            Constraint::Instructor(_) => "instructor",
            Constraint::Group(_) => "group",
            Constraint::ClassLimit(_) => "class_limit",
            Constraint::Spread(_) => "spread",
            Constraint::DepartmentSpread(_) => "department_spread",
            Constraint::Jenrl(_) => "jenrl",
            Constraint::MinimizeGroupsOfTime(_) => "min_groups_of_time",
            Constraint::MinimizeRoomUsage(_) => "min_room_use",
        }
    }

    /// One step of the relaxation schedule, called once per unassignment.
    pub fn weaken(&mut self) {
        match self {
            Constraint::Spread(constraint) => constraint.weaken(),
            Constraint::DepartmentSpread(constraint) => constraint.weaken(),
            Constraint::Jenrl(constraint) => constraint.weaken(),
            Constraint::MinimizeGroupsOfTime(constraint) => constraint.weaken(),
            Constraint::MinimizeRoomUsage(constraint) => constraint.weaken(),
            _ => {}
        }
    }

    /// Relaxes the constraint until `placement` is no longer in conflict.
    pub fn weaken_for(&mut self, timetable: &Timetable, placement: PlacementIdx) {
        match self {
            Constraint::Spread(constraint) => constraint.weaken_for(timetable, placement),
            Constraint::DepartmentSpread(constraint) => constraint.weaken_for(timetable, placement),
            Constraint::Jenrl(constraint) => constraint.weaken_for(timetable, placement),
            Constraint::MinimizeGroupsOfTime(constraint) => {
                constraint.weaken_for(timetable, placement)
            }
            Constraint::MinimizeRoomUsage(constraint) => constraint.weaken_for(timetable, placement),
            _ => {}
        }
    }
}

impl TimetableConstraint for Constraint {
    fn lectures(&self) -> &[LectureIdx] {
        match self {
            Constraint::Room(constraint) => constraint.lectures(),
            Constraint::Instructor(constraint) => constraint.lectures(),
            Constraint::Group(constraint) => constraint.lectures(),
            Constraint::ClassLimit(constraint) => constraint.lectures(),
            Constraint::Spread(constraint) => constraint.lectures(),
            Constraint::DepartmentSpread(constraint) => constraint.lectures(),
            Constraint::Jenrl(constraint) => constraint.lectures(),
            Constraint::MinimizeGroupsOfTime(constraint) => constraint.lectures(),
            Constraint::MinimizeRoomUsage(constraint) => constraint.lectures(),
        }
    }

    fn is_hard(&self) -> bool {
        match self {
            Constraint::Room(constraint) => constraint.is_hard(),
            Constraint::Instructor(constraint) => constraint.is_hard(),
            Constraint::Group(constraint) => constraint.is_hard(),
            Constraint::ClassLimit(constraint) => constraint.is_hard(),
            Constraint::Spread(constraint) => constraint.is_hard(),
            Constraint::DepartmentSpread(constraint) => constraint.is_hard(),
            Constraint::Jenrl(constraint) => constraint.is_hard(),
            Constraint::MinimizeGroupsOfTime(constraint) => constraint.is_hard(),
            Constraint::MinimizeRoomUsage(constraint) => constraint.is_hard(),
        }
    }

    fn is_weakening(&self) -> bool {
        match self {
            Constraint::Room(constraint) => constraint.is_weakening(),
            Constraint::Instructor(constraint) => constraint.is_weakening(),
            Constraint::Group(constraint) => constraint.is_weakening(),
            Constraint::ClassLimit(constraint) => constraint.is_weakening(),
            Constraint::Spread(constraint) => constraint.is_weakening(),
            Constraint::DepartmentSpread(constraint) => constraint.is_weakening(),
            Constraint::Jenrl(constraint) => constraint.is_weakening(),
            Constraint::MinimizeGroupsOfTime(constraint) => constraint.is_weakening(),
            Constraint::MinimizeRoomUsage(constraint) => constraint.is_weakening(),
        }
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
        match self {
            Constraint::Room(c) => c.compute_conflicts(ctx, placement, conflicts, rng),
            Constraint::Instructor(c) => c.compute_conflicts(ctx, placement, conflicts, rng),
            Constraint::Group(c) => c.compute_conflicts(ctx, placement, conflicts, rng),
            Constraint::ClassLimit(c) => c.compute_conflicts(ctx, placement, conflicts, rng),
            Constraint::Spread(c) => c.compute_conflicts(ctx, placement, conflicts, rng),
            Constraint::DepartmentSpread(c) => c.compute_conflicts(ctx, placement, conflicts, rng),
            Constraint::Jenrl(c) => c.compute_conflicts(ctx, placement, conflicts, rng),
            Constraint::MinimizeGroupsOfTime(c) => {
                c.compute_conflicts(ctx, placement, conflicts, rng)
            }
            Constraint::MinimizeRoomUsage(c) => c.compute_conflicts(ctx, placement, conflicts, rng),
        }
    }

    fn in_conflict(&self, ctx: &ConstraintContext, placement: PlacementIdx) -> bool {
        match self {
            Constraint::Room(c) => c.in_conflict(ctx, placement),
            Constraint::Instructor(c) => c.in_conflict(ctx, placement),
            Constraint::Group(c) => c.in_conflict(ctx, placement),
            Constraint::ClassLimit(c) => c.in_conflict(ctx, placement),
            Constraint::Spread(c) => c.in_conflict(ctx, placement),
            Constraint::DepartmentSpread(c) => c.in_conflict(ctx, placement),
            Constraint::Jenrl(c) => c.in_conflict(ctx, placement),
            Constraint::MinimizeGroupsOfTime(c) => c.in_conflict(ctx, placement),
            Constraint::MinimizeRoomUsage(c) => c.in_conflict(ctx, placement),
        }
    }

    fn is_consistent(
        &self,
        ctx: &ConstraintContext,
        p1: PlacementIdx,
        p2: PlacementIdx,
    ) -> bool {
        match self {
            Constraint::Room(c) => c.is_consistent(ctx, p1, p2),
            Constraint::Instructor(c) => c.is_consistent(ctx, p1, p2),
            Constraint::Group(c) => c.is_consistent(ctx, p1, p2),
            Constraint::ClassLimit(c) => c.is_consistent(ctx, p1, p2),
            Constraint::Spread(c) => c.is_consistent(ctx, p1, p2),
            Constraint::DepartmentSpread(c) => c.is_consistent(ctx, p1, p2),
            Constraint::Jenrl(c) => c.is_consistent(ctx, p1, p2),
            Constraint::MinimizeGroupsOfTime(c) => c.is_consistent(ctx, p1, p2),
            Constraint::MinimizeRoomUsage(c) => c.is_consistent(ctx, p1, p2),
        }
    }

    fn assigned(
        &mut self,
        timetable: &Timetable,
        criteria: &mut Criteria,
        iteration: u64,
        placement: PlacementIdx,
    ) {
        match self {
            Constraint::Room(c) => c.assigned(timetable, criteria, iteration, placement),
            Constraint::Instructor(c) => c.assigned(timetable, criteria, iteration, placement),
            Constraint::Group(c) => c.assigned(timetable, criteria, iteration, placement),
            Constraint::ClassLimit(c) => c.assigned(timetable, criteria, iteration, placement),
            Constraint::Spread(c) => c.assigned(timetable, criteria, iteration, placement),
            Constraint::DepartmentSpread(c) => {
                c.assigned(timetable, criteria, iteration, placement)
            }
            Constraint::Jenrl(c) => c.assigned(timetable, criteria, iteration, placement),
            Constraint::MinimizeGroupsOfTime(c) => {
                c.assigned(timetable, criteria, iteration, placement)
            }
            Constraint::MinimizeRoomUsage(c) => {
                c.assigned(timetable, criteria, iteration, placement)
            }
        }
    }

    fn unassigned(
        &mut self,
        timetable: &Timetable,
        criteria: &mut Criteria,
        iteration: u64,
        placement: PlacementIdx,
    ) {
        match self {
            Constraint::Room(c) => c.unassigned(timetable, criteria, iteration, placement),
            Constraint::Instructor(c) => c.unassigned(timetable, criteria, iteration, placement),
            Constraint::Group(c) => c.unassigned(timetable, criteria, iteration, placement),
            Constraint::ClassLimit(c) => c.unassigned(timetable, criteria, iteration, placement),
            Constraint::Spread(c) => c.unassigned(timetable, criteria, iteration, placement),
            Constraint::DepartmentSpread(c) => {
                c.unassigned(timetable, criteria, iteration, placement)
            }
            Constraint::Jenrl(c) => c.unassigned(timetable, criteria, iteration, placement),
            Constraint::MinimizeGroupsOfTime(c) => {
                c.unassigned(timetable, criteria, iteration, placement)
            }
            Constraint::MinimizeRoomUsage(c) => {
                c.unassigned(timetable, criteria, iteration, placement)
            }
        }
    }
}
