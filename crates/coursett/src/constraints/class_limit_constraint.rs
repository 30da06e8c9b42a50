use std::cmp::Reverse;

use rand::Rng;
use tracing::trace;

use crate::model::{
    criteria::Criteria,
    lecture::LectureIdx,
    placement::{Placement, PlacementIdx},
    timetable_model::Timetable,
};

use super::constraint::{Conflicts, Constraint, ConstraintContext, TimetableConstraint};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Limit {
    Fixed(usize),
    /// Minimal class limit of the parent lecture plus a delta.
    Parent { parent: LectureIdx, delta: i64 },
}

/// The sections of one subpart must together offer at least as many seats as
/// the limit. Smaller rooms lower a section's class limit; when the total
/// drops below the limit, sections in the roomiest placements are moved out
/// first.
#[derive(Debug, Clone)]
pub struct ClassLimitConstraint {
    name: String,
    limit: Limit,
    lectures: Vec<LectureIdx>,
}

impl ClassLimitConstraint {
    pub fn new(name: impl Into<String>, limit: usize, lectures: Vec<LectureIdx>) -> Self {
        ClassLimitConstraint {
            name: name.into(),
            limit: Limit::Fixed(limit),
            lectures,
        }
    }

    /// Limit derived from the parent lecture, for the children of `parent`.
    pub fn for_parent(
        name: impl Into<String>,
        parent: LectureIdx,
        delta: i64,
        lectures: Vec<LectureIdx>,
    ) -> Self {
        ClassLimitConstraint {
            name: name.into(),
            limit: Limit::Parent { parent, delta },
            lectures,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<LectureIdx> {
        match self.limit {
            Limit::Fixed(_) => None,
            Limit::Parent { parent, .. } => Some(parent),
        }
    }

    pub fn class_limit(&self, timetable: &Timetable) -> usize {
        match self.limit {
            Limit::Fixed(limit) => limit,
            Limit::Parent { parent, delta } => {
                let min = timetable.lecture(parent).min_class_limit() as i64;
                (min + delta).max(0) as usize
            }
        }
    }

    /// Total class limit of the member lectures if `value` were assigned and
    /// the placements in `conflicts` removed.
    pub fn current_class_limit(
        &self,
        timetable: &Timetable,
        value: Option<PlacementIdx>,
        conflicts: Option<&Conflicts>,
    ) -> usize {
        self.lectures
            .iter()
            .map(|&lecture| timetable.class_limit(lecture, value, conflicts))
            .sum()
    }

    /// Assigned placements of the members and their descendants that may be
    /// unassigned to raise the total.
    fn collect_adepts(
        &self,
        timetable: &Timetable,
        lectures: &[LectureIdx],
        value: &Placement,
        conflicts: &Conflicts,
        adepts: &mut Vec<PlacementIdx>,
    ) {
        for &lecture in lectures {
            if lecture == value.lecture() {
                continue;
            }
            let current = timetable.lecture(lecture);
            if !current.is_committed()
                && let Some(placement) = timetable.assignment(lecture)
                && !conflicts.contains(&placement)
            {
                adepts.push(placement);
            }
            for children in current.children().values() {
                self.collect_adepts(timetable, children, value, conflicts, adepts);
            }
        }
    }

    /// Seats an adept gives away by sitting in its room.
    fn slack(timetable: &Timetable, placement: PlacementIdx) -> usize {
        let value = timetable.placement(placement);
        let lecture = timetable.lecture(value.lecture());
        let achieved = lecture.class_limit_for_room_size(value.room_size());
        timetable
            .max_achievable_class_limit(value.lecture())
            .saturating_sub(achieved)
    }

    fn parent_constraint<'a>(&self, ctx: &ConstraintContext<'a>) -> Option<&'a ClassLimitConstraint> {
        let parent = self.parent()?;
        let idx = ctx.timetable.lecture(parent).class_limit_constraint()?;
        match ctx.constraint(idx) {
            Constraint::ClassLimit(constraint) => Some(constraint),
            _ => None,
        }
    }
}

impl TimetableConstraint for ClassLimitConstraint {
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
        rng: &mut R,
    ) where
        R: Rng,
    {
        let timetable = ctx.timetable;
        let limit = self.class_limit(timetable);
        let mut current = self.current_class_limit(timetable, Some(placement), Some(conflicts));

        if current < limit {
            let value = timetable.placement(placement);
            let mut adepts = Vec::new();
            self.collect_adepts(timetable, &self.lectures, value, conflicts, &mut adepts);
            adepts.sort_by_key(|&adept| {
                (
                    Reverse(Self::slack(timetable, adept)),
                    timetable.placement_lecture(adept).id(),
                )
            });

            for adept in adepts {
                if current >= limit {
                    break;
                }
                conflicts.insert(adept);
                current = self.current_class_limit(timetable, Some(placement), Some(conflicts));
            }
            if current < limit {
                trace!(constraint = %self.name, current, limit, "Class limit can not be reached");
                conflicts.insert(placement);
            }
        }

        if let Some(parent) = self.parent_constraint(ctx) {
            parent.compute_conflicts(ctx, placement, conflicts, rng);
        }
    }

    fn in_conflict(&self, ctx: &ConstraintContext, placement: PlacementIdx) -> bool {
        let timetable = ctx.timetable;
        if self.current_class_limit(timetable, Some(placement), None) < self.class_limit(timetable) {
            return true;
        }
        self.parent_constraint(ctx)
            .is_some_and(|parent| parent.in_conflict(ctx, placement))
    }

    fn is_consistent(&self, _ctx: &ConstraintContext, _p1: PlacementIdx, _p2: PlacementIdx) -> bool {
        true
    }

    fn assigned(
        &mut self,
        _timetable: &Timetable,
        _criteria: &mut Criteria,
        _iteration: u64,
        _placement: PlacementIdx,
    ) {
    }

    fn unassigned(
        &mut self,
        _timetable: &Timetable,
        _criteria: &mut Criteria,
        _iteration: u64,
        _placement: PlacementIdx,
    ) {
    }
}
