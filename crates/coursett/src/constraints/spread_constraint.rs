use fxhash::FxHashSet;
use rand::Rng;
use tracing::{debug, trace};

use crate::model::{
    constants::{DAY_CODES, NR_DAYS},
    criteria::{Criteria, Criterion},
    lecture::LectureIdx,
    placement::{Placement, PlacementIdx},
    time_location::TimeLocation,
    timetable_model::Timetable,
    timetable_params::TimetableParams,
};

use super::constraint::{Conflicts, ConstraintContext, TimetableConstraint};

/// Balances the lectures of a group over the (slot, work day) cells of the
/// teaching week.
///
/// On [`SpreadConstraint::init`] each cell gets a limit derived from how
/// often the member domains touch it. The penalty is the number of cells
/// used above their limit. A placement that would push the penalty over the
/// allowed maximum is in conflict, and members sitting in the overfull cells
/// are moved out. The allowed maximum only grows: by one every
/// `unassignments_to_weaken` unassignments, or directly through
/// [`SpreadConstraint::weaken_for`].
#[derive(Debug, Clone)]
pub struct SpreadConstraint {
    name: String,
    lectures: Vec<LectureIdx>,
    criterion: Criterion,
    spread_factor: f64,
    unassignments_to_weaken: usize,
    use_most_improvement_adepts: bool,
    first_day_slot: usize,
    last_day_slot: usize,
    first_work_day: usize,
    last_work_day: usize,

    initialized: bool,
    courses: Vec<Vec<PlacementIdx>>,
    max_courses: Vec<usize>,
    current_penalty: usize,
    max_allowed_penalty: usize,
    unassignments: u64,
}

impl SpreadConstraint {
    /// Same subpart balancing over `lectures`, configured by the `Spread.*`
    /// parameters.
    pub fn new(name: impl Into<String>, lectures: Vec<LectureIdx>, params: &TimetableParams) -> Self {
        Self::with_settings(
            name,
            lectures,
            params,
            params.spread_factor,
            params.effective_spread_unassignments_to_weaken(),
            Criterion::SameSubpartBalancingPenalty,
        )
    }

    pub(crate) fn with_settings(
        name: impl Into<String>,
        lectures: Vec<LectureIdx>,
        params: &TimetableParams,
        spread_factor: f64,
        unassignments_to_weaken: usize,
        criterion: Criterion,
    ) -> Self {
        let first_work_day = params.first_work_day;
        let last_work_day = if params.last_work_day < first_work_day {
            params.last_work_day + NR_DAYS
        } else {
            params.last_work_day
        };
        SpreadConstraint {
            name: name.into(),
            lectures,
            criterion,
            spread_factor,
            unassignments_to_weaken,
            use_most_improvement_adepts: params.spread_use_most_improvement_adepts,
            first_day_slot: params.first_day_slot,
            last_day_slot: params.last_day_slot,
            first_work_day,
            last_work_day,
            initialized: false,
            courses: Vec::new(),
            max_courses: Vec::new(),
            current_penalty: 0,
            max_allowed_penalty: 0,
            unassignments: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn criterion(&self) -> Criterion {
        self.criterion
    }

    pub fn unassignments_to_weaken(&self) -> usize {
        self.unassignments_to_weaken
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Current number of cells used above their limit.
    pub fn penalty(&self) -> usize {
        self.current_penalty
    }

    pub fn max_allowed_penalty(&self) -> usize {
        self.max_allowed_penalty
    }

    /// Limit of the cell at `slot` of `day`, `None` outside the day window.
    pub fn max_courses(&self, slot: usize, day: usize) -> Option<usize> {
        self.cell_at(slot, day).map(|cell| self.max_courses[cell])
    }

    pub fn retain_lectures<F>(&mut self, mut f: F)
    where
        F: FnMut(LectureIdx) -> bool,
    {
        self.lectures.retain(|&lecture| f(lecture));
    }

    fn nr_day_slots(&self) -> usize {
        (self.last_day_slot + 1).saturating_sub(self.first_day_slot)
    }

    fn nr_work_days(&self) -> usize {
        self.last_work_day - self.first_work_day + 1
    }

    fn nr_cells(&self) -> usize {
        self.nr_day_slots() * self.nr_work_days()
    }

    fn cell_at(&self, slot: usize, day: usize) -> Option<usize> {
        if slot < self.first_day_slot || slot > self.last_day_slot {
            return None;
        }
        let day = if day < self.first_work_day { day + NR_DAYS } else { day };
        if day > self.last_work_day {
            return None;
        }
        Some((slot - self.first_day_slot) * self.nr_work_days() + (day - self.first_work_day))
    }

    /// Cells covered by one meeting pattern, clipped to the day window.
    fn cells<'a>(&'a self, time: &'a TimeLocation) -> impl Iterator<Item = usize> + 'a {
        let start = time.start_slot();
        let end = (start + time.nr_slots_per_meeting()).saturating_sub(1);
        let days = (self.first_work_day..=self.last_work_day)
            .filter(move |day| time.day_code() & DAY_CODES[day % NR_DAYS] != 0);
        (start.max(self.first_day_slot)..=end.min(self.last_day_slot)).flat_map(move |slot| {
            days.clone().map(move |day| {
                (slot - self.first_day_slot) * self.nr_work_days() + (day - self.first_work_day)
            })
        })
    }

    /// Per cell limits from the expected usage of the member domains. Cells
    /// below the average usage may hold `spread_factor` times their expected
    /// share; busier cells keep their expected usage.
    fn compute_max_courses(&self, timetable: &Timetable) -> Vec<usize> {
        let mut histogram = vec![0.0; self.nr_cells()];
        let mut total_used_slots: usize = 0;
        for &lecture in &self.lectures {
            let values = timetable.lecture(lecture).values();
            if let Some(&first) = values.first() {
                let time = timetable.placement(first).time_location();
                total_used_slots += time.nr_slots_per_meeting() * time.nr_meetings();
            }
            let share = 1.0 / values.len() as f64;
            for &value in values {
                for cell in self.cells(timetable.placement(value).time_location()) {
                    histogram[cell] += share;
                }
            }
        }

        let threshold = self.spread_factor * total_used_slots as f64 / self.nr_cells().max(1) as f64;
        histogram
            .into_iter()
            .map(|usage| {
                let limit = if usage <= threshold {
                    self.spread_factor * usage
                } else {
                    usage
                };
                (0.999 + limit) as usize
            })
            .collect()
    }

    /// Builds the cell limits and the usage of the current assignment. The
    /// current penalty becomes the allowed maximum.
    pub fn init(&mut self, timetable: &Timetable, criteria: &mut Criteria) {
        if self.initialized {
            criteria.inc(self.criterion, -(self.current_penalty as f64));
        }

        self.max_courses = self.compute_max_courses(timetable);
        let mut courses = vec![Vec::new(); self.nr_cells()];
        for &lecture in &self.lectures {
            if let Some(placement) = timetable.assignment(lecture) {
                for cell in self.cells(timetable.placement(placement).time_location()) {
                    courses[cell].push(placement);
                }
            }
        }
        self.courses = courses;
        self.current_penalty = self
            .courses
            .iter()
            .zip(&self.max_courses)
            .map(|(courses, &max)| courses.len().saturating_sub(max))
            .sum();
        self.max_allowed_penalty = self.current_penalty;
        self.initialized = true;
        criteria.inc(self.criterion, self.current_penalty as f64);

        debug!(
            constraint = %self.name,
            nr_lectures = self.lectures.len(),
            penalty = self.current_penalty,
            "Initialized spread"
        );
    }

    fn is_active(&self) -> bool {
        self.initialized && self.unassignments_to_weaken > 0
    }

    /// Members other than `lecture` currently placed in `cell`.
    fn nr_courses(&self, timetable: &Timetable, cell: usize, lecture: LectureIdx) -> usize {
        self.courses[cell]
            .iter()
            .filter(|&&placement| timetable.placement(placement).lecture() != lecture)
            .count()
    }

    /// Increase of the penalty if `value` is assigned.
    pub fn penalty_for(&self, timetable: &Timetable, value: &Placement) -> usize {
        if !self.initialized {
            return 0;
        }
        self.cells(value.time_location())
            .filter(|&cell| self.nr_courses(timetable, cell, value.lecture()) >= self.max_courses[cell])
            .count()
    }

    /// Worst over-limit among the cells `value` would occupy.
    pub fn max_penalty(&self, timetable: &Timetable, value: &Placement) -> usize {
        if !self.initialized {
            return 0;
        }
        self.cells(value.time_location())
            .map(|cell| {
                (1 + self.nr_courses(timetable, cell, value.lecture())).saturating_sub(self.max_courses[cell])
            })
            .max()
            .unwrap_or(0)
    }

    /// Penalty of the current assignment against freshly computed limits.
    pub fn penalty_estimate(&self, timetable: &Timetable) -> usize {
        let max_courses = self.compute_max_courses(timetable);
        let mut nr_courses = vec![0usize; max_courses.len()];
        for &lecture in &self.lectures {
            if let Some(placement) = timetable.assigned_placement(lecture) {
                for cell in self.cells(placement.time_location()) {
                    nr_courses[cell] += 1;
                }
            }
        }
        nr_courses
            .into_iter()
            .zip(max_courses)
            .map(|(nr, max)| nr.saturating_sub(max))
            .sum()
    }

    fn try_assign(&self, time: &TimeLocation, nr_courses: &mut [usize]) -> usize {
        let mut penalty = 0;
        for cell in self.cells(time) {
            nr_courses[cell] += 1;
            if nr_courses[cell] > self.max_courses[cell] {
                penalty += 1;
            }
        }
        penalty
    }

    fn try_unassign(&self, time: &TimeLocation, nr_courses: &mut [usize]) -> usize {
        let mut improvement = 0;
        for cell in self.cells(time) {
            if nr_courses[cell] > self.max_courses[cell] {
                improvement += 1;
            }
            nr_courses[cell] = nr_courses[cell].saturating_sub(1);
        }
        improvement
    }

    fn improvement_if_unassigned(&self, time: &TimeLocation, nr_courses: &[usize]) -> usize {
        self.cells(time)
            .filter(|&cell| nr_courses[cell] > self.max_courses[cell])
            .count()
    }

    /// Member placement whose removal lowers the penalty the most, taking
    /// uncommitted lectures first.
    fn most_improving_adept(
        &self,
        timetable: &Timetable,
        value: &Placement,
        nr_courses: &[usize],
        conflicts: &Conflicts,
    ) -> Option<PlacementIdx> {
        for committed in [false, true] {
            let mut adept: Option<(PlacementIdx, usize)> = None;
            for &lecture in &self.lectures {
                if lecture == value.lecture() || timetable.lecture(lecture).is_committed() != committed {
                    continue;
                }
                let Some(placement) = timetable.assignment(lecture) else {
                    continue;
                };
                if conflicts.contains(&placement) {
                    continue;
                }
                let improvement = self
                    .improvement_if_unassigned(timetable.placement(placement).time_location(), nr_courses);
                if improvement > 0 && adept.is_none_or(|(_, best)| improvement > best) {
                    adept = Some((placement, improvement));
                }
            }
            if let Some((placement, _)) = adept {
                return Some(placement);
            }
        }
        None
    }

    /// Placements sitting in the full cells `value` touches, uncommitted
    /// ones first.
    fn random_adepts(
        &self,
        timetable: &Timetable,
        value: &Placement,
        nr_courses: &[usize],
        conflicts: &Conflicts,
    ) -> [Vec<PlacementIdx>; 2] {
        let mut uncommitted = FxHashSet::default();
        let mut committed = FxHashSet::default();
        for cell in self.cells(value.time_location()) {
            if nr_courses[cell] < self.max_courses[cell] {
                continue;
            }
            for &placement in &self.courses[cell] {
                let lecture = timetable.placement(placement).lecture();
                if lecture == value.lecture() || conflicts.contains(&placement) {
                    continue;
                }
                if timetable.lecture(lecture).is_committed() {
                    committed.insert(placement);
                } else {
                    uncommitted.insert(placement);
                }
            }
        }
        [uncommitted, committed].map(|adepts| {
            let mut adepts: Vec<PlacementIdx> = adepts.into_iter().collect();
            adepts.sort();
            adepts
        })
    }

    /// One unassignment. Every `unassignments_to_weaken` calls the allowed
    /// penalty grows by one.
    pub fn weaken(&mut self) {
        if self.unassignments_to_weaken == 0 {
            return;
        }
        self.unassignments += 1;
        if self.unassignments % self.unassignments_to_weaken as u64 == 0 {
            self.max_allowed_penalty += 1;
            trace!(
                constraint = %self.name,
                max_allowed_penalty = self.max_allowed_penalty,
                "Weakened spread"
            );
        }
    }

    /// Raises the allowed penalty so that `placement` is accepted.
    pub fn weaken_for(&mut self, timetable: &Timetable, placement: PlacementIdx) {
        if !self.is_active() {
            return;
        }
        let penalty = self.current_penalty + self.penalty_for(timetable, timetable.placement(placement));
        if penalty > self.max_allowed_penalty {
            debug!(
                constraint = %self.name,
                from = self.max_allowed_penalty,
                to = penalty,
                "Raised allowed spread penalty"
            );
            self.max_allowed_penalty = penalty;
        }
    }
}

impl TimetableConstraint for SpreadConstraint {
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
        rng: &mut R,
    ) where
        R: Rng,
    {
        if !self.is_active() {
            return;
        }
        let timetable = ctx.timetable;
        let value = timetable.placement(placement);
        let mut penalty = self.current_penalty + self.penalty_for(timetable, value);
        if penalty <= self.max_allowed_penalty {
            return;
        }

        let mut nr_courses: Vec<usize> = (0..self.nr_cells())
            .map(|cell| self.nr_courses(timetable, cell, value.lecture()))
            .collect();
        self.try_assign(value.time_location(), &mut nr_courses);

        for &lecture in &self.lectures {
            if lecture == value.lecture() {
                continue;
            }
            if let Some(current) = timetable.assignment(lecture)
                && conflicts.contains(&current)
            {
                let time = timetable.placement(current).time_location();
                penalty = penalty.saturating_sub(self.try_unassign(time, &mut nr_courses));
            }
            if penalty <= self.max_allowed_penalty {
                return;
            }
        }

        if self.use_most_improvement_adepts {
            while penalty > self.max_allowed_penalty {
                let Some(adept) = self.most_improving_adept(timetable, value, &nr_courses, conflicts)
                else {
                    break;
                };
                conflicts.insert(adept);
                let time = timetable.placement(adept).time_location();
                penalty = penalty.saturating_sub(self.try_unassign(time, &mut nr_courses));
            }
        } else {
            for mut adepts in self.random_adepts(timetable, value, &nr_courses, conflicts) {
                while !adepts.is_empty() && penalty > self.max_allowed_penalty {
                    let adept = adepts.swap_remove(rng.random_range(0..adepts.len()));
                    conflicts.insert(adept);
                    let time = timetable.placement(adept).time_location();
                    penalty = penalty.saturating_sub(self.try_unassign(time, &mut nr_courses));
                }
            }
        }

        if penalty > self.max_allowed_penalty {
            trace!(constraint = %self.name, penalty, "Spread penalty stays above the allowed maximum");
        }
    }

    fn in_conflict(&self, ctx: &ConstraintContext, placement: PlacementIdx) -> bool {
        if !self.is_active() {
            return false;
        }
        let value = ctx.timetable.placement(placement);
        self.current_penalty + self.penalty_for(ctx.timetable, value) > self.max_allowed_penalty
    }

    /// Two overlapping placements are inconsistent when the cells they share
    /// can not hold both of them within the allowed penalty.
    fn is_consistent(&self, ctx: &ConstraintContext, p1: PlacementIdx, p2: PlacementIdx) -> bool {
        if !self.is_active() {
            return true;
        }
        let t1 = ctx.timetable.placement(p1).time_location();
        let t2 = ctx.timetable.placement(p2).time_location();
        if !t1.has_intersection(t2) {
            return true;
        }
        let shared: FxHashSet<usize> = self.cells(t2).collect();
        let penalty: usize = self
            .cells(t1)
            .filter(|cell| shared.contains(cell))
            .map(|cell| 2usize.saturating_sub(self.max_courses[cell]))
            .sum();
        penalty <= self.max_allowed_penalty
    }

    fn assigned(
        &mut self,
        timetable: &Timetable,
        criteria: &mut Criteria,
        _iteration: u64,
        placement: PlacementIdx,
    ) {
        if !self.initialized {
            return;
        }
        let cells: Vec<usize> = self.cells(timetable.placement(placement).time_location()).collect();
        let before = self.current_penalty;
        for cell in cells {
            self.courses[cell].push(placement);
            if self.courses[cell].len() > self.max_courses[cell] {
                self.current_penalty += 1;
            }
        }
        criteria.inc(self.criterion, (self.current_penalty - before) as f64);
    }

    fn unassigned(
        &mut self,
        timetable: &Timetable,
        criteria: &mut Criteria,
        _iteration: u64,
        placement: PlacementIdx,
    ) {
        if !self.initialized {
            return;
        }
        let cells: Vec<usize> = self.cells(timetable.placement(placement).time_location()).collect();
        let before = self.current_penalty;
        for cell in cells {
            if let Some(position) = self.courses[cell].iter().position(|&p| p == placement) {
                if self.courses[cell].len() > self.max_courses[cell] {
                    self.current_penalty -= 1;
                }
                self.courses[cell].swap_remove(position);
            }
        }
        criteria.inc(self.criterion, -((before - self.current_penalty) as f64));
    }
}
