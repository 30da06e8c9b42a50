use fixedbitset::FixedBitSet;
use rand::Rng;
use tracing::trace;

use crate::model::{
    constants::{DAY_CODES, NR_DAYS, SLOT_LENGTH_MIN, SLOTS_PER_DAY},
    criteria::{Criteria, Criterion},
    lecture::LectureIdx,
    placement::{Placement, PlacementIdx},
    preference::Preference,
    time_location::TimeLocation,
    timetable_model::Timetable,
};

use super::{
    constraint::{Conflicts, Constraint, ConstraintContext, ConstraintIdx, TimetableConstraint},
    group_constraint_type::{GroupConstraintType, same_days, same_hours},
    jenrl_constraint::JenrlConstraint,
};

/// Placements seen by the sequence and daily-load checks: the overrides win
/// over the current assignment, which is ignored entirely when
/// `with_assignment` is false.
#[derive(Clone, Copy)]
struct AssignmentView<'a> {
    timetable: &'a Timetable,
    overrides: &'a [(LectureIdx, Option<PlacementIdx>)],
    with_assignment: bool,
}

impl AssignmentView<'_> {
    fn placement(&self, lecture: LectureIdx) -> Option<PlacementIdx> {
        match self.overrides.iter().find(|(l, _)| *l == lecture) {
            Some((_, placement)) => *placement,
            None if self.with_assignment => self.timetable.assignment(lecture),
            None => None,
        }
    }

    fn is_overridden(&self, lecture: LectureIdx) -> bool {
        self.overrides.iter().any(|(l, _)| *l == lecture)
    }

    fn overridden_placements(&self) -> impl Iterator<Item = PlacementIdx> + '_ {
        self.overrides.iter().filter_map(|(_, placement)| *placement)
    }
}

/// A distribution constraint between an explicit list of lectures.
///
/// Hard instances (required or prohibited) reject placements through
/// conflicts and forward checking. Soft instances only publish their
/// current preference into [`Criterion::DistributionPreferences`].
#[derive(Debug, Clone)]
pub struct GroupConstraint {
    id: u64,
    index: Option<ConstraintIdx>,
    constraint_type: GroupConstraintType,
    preference: Preference,
    lectures: Vec<LectureIdx>,
    last_preference: i32,
}

impl GroupConstraint {
    pub fn new(
        id: u64,
        constraint_type: GroupConstraintType,
        preference: Preference,
        lectures: Vec<LectureIdx>,
    ) -> Self {
        let mut unique: Vec<LectureIdx> = Vec::with_capacity(lectures.len());
        for lecture in lectures {
            if !unique.contains(&lecture) {
                unique.push(lecture);
            }
        }
        GroupConstraint {
            id,
            index: None,
            constraint_type,
            preference,
            lectures: unique,
            last_preference: 0,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn constraint_type(&self) -> GroupConstraintType {
        self.constraint_type
    }

    pub fn preference(&self) -> Preference {
        self.preference
    }

    pub fn name(&self) -> String {
        self.constraint_type.name()
    }

    /// Contribution last published into the distribution criterion.
    pub fn last_preference(&self) -> i32 {
        self.last_preference
    }

    pub(crate) fn set_index(&mut self, index: ConstraintIdx) {
        self.index = Some(index);
    }

    /// Pulls the children of every member into the group, for types that
    /// constrain whole class hierarchies.
    pub(crate) fn include_children(&mut self, timetable: &Timetable) {
        if !self.constraint_type.includes_children() {
            return;
        }
        let parents = self.lectures.clone();
        for parent in parents {
            for children in timetable.lecture(parent).children().values() {
                for &child in children {
                    if !self.lectures.contains(&child) {
                        self.lectures.push(child);
                    }
                }
            }
        }
    }

    fn abs_preference(&self) -> i32 {
        self.preference.level().abs()
    }

    fn position(&self, lecture: LectureIdx) -> usize {
        self.lectures
            .iter()
            .position(|&l| l == lecture)
            .unwrap_or(usize::MAX)
    }

    fn nr_work_days(&self, timetable: &Timetable) -> i32 {
        let params = timetable.params();
        let mut days = params.last_work_day as i32 - params.first_work_day as i32 + 1;
        if days <= 0 {
            days += NR_DAYS as i32;
        }
        if days > NR_DAYS as i32 {
            days -= NR_DAYS as i32;
        }
        days
    }

    /// Positive form of the relation, used by required and preferred
    /// constraints.
    pub fn is_satisfied(&self, timetable: &Timetable, p1: PlacementIdx, p2: PlacementIdx) -> bool {
        self.check(timetable, p1, p2, true, true)
    }

    /// Negative form of the relation, used by prohibited and discouraged
    /// constraints. Not the negation of [`Self::is_satisfied`].
    pub fn is_violated(&self, timetable: &Timetable, p1: PlacementIdx, p2: PlacementIdx) -> bool {
        self.check(timetable, p1, p2, false, true)
    }

    /// Whether the pair is acceptable under this constraint's preference.
    pub fn is_satisfied_pair(
        &self,
        timetable: &Timetable,
        p1: PlacementIdx,
        p2: PlacementIdx,
    ) -> bool {
        self.check_pair(timetable, p1, p2, true)
    }

    fn check_pair(
        &self,
        timetable: &Timetable,
        p1: PlacementIdx,
        p2: PlacementIdx,
        with_assignment: bool,
    ) -> bool {
        match self.preference {
            Preference::Required => self.check(timetable, p1, p2, true, with_assignment),
            Preference::Prohibited => self.check(timetable, p1, p2, false, with_assignment),
            Preference::Soft(level) if level <= 0 => {
                self.check(timetable, p1, p2, true, with_assignment)
            }
            Preference::Soft(_) => self.check(timetable, p1, p2, false, with_assignment),
        }
    }

    fn check(
        &self,
        timetable: &Timetable,
        p1: PlacementIdx,
        p2: PlacementIdx,
        satisfied: bool,
        with_assignment: bool,
    ) -> bool {
        let (plc1, plc2) = (timetable.placement(p1), timetable.placement(p2));
        let (t1, t2) = (plc1.time_location(), plc2.time_location());
        let days = || same_days(t1.day_code(), t2.day_code());
        let hours = || same_hours(t1.start_slot(), t1.length(), t2.start_slot(), t2.length());

        match self.constraint_type {
            GroupConstraintType::SameTime => {
                if satisfied {
                    hours()
                } else {
                    !t1.share_hours(t2)
                }
            }
            GroupConstraintType::SameDays => {
                if satisfied {
                    days()
                } else {
                    !t1.share_days(t2)
                }
            }
            GroupConstraintType::Btb => plc1.same_rooms(plc2) && days(),
            GroupConstraintType::BtbTime | GroupConstraintType::HoursBetween(_) => days(),
            GroupConstraintType::DiffTime => t1.has_intersection(t2) != satisfied,
            GroupConstraintType::SameStart => {
                (t1.start_slot() % SLOTS_PER_DAY == t2.start_slot() % SLOTS_PER_DAY) == satisfied
            }
            GroupConstraintType::SameRoom => plc1.same_rooms(plc2) == satisfied,
            GroupConstraintType::SameStudents | GroupConstraintType::LinkedSections => {
                !satisfied || !JenrlConstraint::is_in_conflict(timetable, plc1, plc2)
            }
            GroupConstraintType::SameInstructor => {
                !satisfied || can_be_taught_together(timetable, plc1, plc2)
            }
            GroupConstraintType::CanShareRoom | GroupConstraintType::MaxHrsDay(_) => true,
            GroupConstraintType::Precedence => {
                self.is_precedence(timetable, plc1, plc2, satisfied, true)
            }
            GroupConstraintType::BtbDay => {
                !days() && self.is_back_to_back_days(timetable, t1, t2) == satisfied
            }
            GroupConstraintType::MeetWith => {
                !satisfied || (plc1.same_rooms(plc2) && hours() && days())
            }
            GroupConstraintType::NdbGt1 => {
                !days() && self.is_nr_days_between_greater_than_one(timetable, t1, t2) == satisfied
            }
            GroupConstraintType::ChildrenNotOverlap => {
                !satisfied || !with_assignment || self.is_children_not_overlap(timetable, plc1, plc2)
            }
            GroupConstraintType::FollowingDay => {
                self.is_days_after(timetable, plc1, plc2, satisfied, 1)
            }
            GroupConstraintType::EveryOtherDay => {
                self.is_days_after(timetable, plc1, plc2, satisfied, 2)
            }
            GroupConstraintType::SameWeeks => {
                if satisfied {
                    t1.week_code() == t2.week_code()
                } else {
                    !t1.share_weeks(t2)
                }
            }
            GroupConstraintType::BtbPrecedence => {
                self.is_precedence(timetable, plc1, plc2, true, false) && days()
            }
            GroupConstraintType::SameDaysTime => {
                if satisfied {
                    hours() && days()
                } else {
                    !t1.share_hours(t2) || !t1.share_days(t2)
                }
            }
            GroupConstraintType::SameDaysRoomTime => {
                if satisfied {
                    hours() && days() && plc1.same_rooms(plc2)
                } else {
                    !t1.share_hours(t2) || !t1.share_days(t2) || !plc1.same_rooms(plc2)
                }
            }
        }
    }

    /// Orders the two times by the member order of their lectures.
    fn ordered<'a>(
        &self,
        p1: &'a Placement,
        p2: &'a Placement,
        first_goes_first: bool,
    ) -> (&'a TimeLocation, &'a TimeLocation) {
        if (self.position(p1.lecture()) < self.position(p2.lecture())) == first_goes_first {
            (p1.time_location(), p2.time_location())
        } else {
            (p2.time_location(), p1.time_location())
        }
    }

    fn is_precedence(
        &self,
        timetable: &Timetable,
        p1: &Placement,
        p2: &Placement,
        first_goes_first: bool,
        consider_date_patterns: bool,
    ) -> bool {
        let (t1, t2) = self.ordered(p1, p2, first_goes_first);
        let params = timetable.params();
        if consider_date_patterns
            && params.precedence_consider_date_patterns
            && let (Some(m1), Some(m2)) = (
                t1.first_meeting(params.day_of_week_offset),
                t2.first_meeting(params.day_of_week_offset),
            )
            && m1 != m2
        {
            return m1 < m2;
        }
        if params.first_work_day != 0 {
            for i in 0..NR_DAYS {
                let code = DAY_CODES[(i + params.first_work_day) % NR_DAYS];
                let a = t1.day_code() & code != 0;
                let b = t2.day_code() & code != 0;
                match (a, b) {
                    (false, true) => return false,
                    (true, false) => return true,
                    (true, true) => return t1.start_slot() + t1.length() <= t2.start_slot(),
                    (false, false) => {}
                }
            }
        }
        match (t1.first_start_slot(), t2.first_start_slot()) {
            (Some(s1), Some(s2)) => s1 + t1.length() <= s2,
            _ => true,
        }
    }

    /// First and last meeting day, counted from the first work day, or -1.
    fn day_span(&self, timetable: &Timetable, time: &TimeLocation) -> (i32, i32) {
        let first_work_day = timetable.params().first_work_day;
        let mut span = (-1, -1);
        for i in 0..NR_DAYS {
            if time.day_code() & DAY_CODES[(i + first_work_day) % NR_DAYS] != 0 {
                if span.0 < 0 {
                    span.0 = i as i32;
                }
                span.1 = i as i32;
            }
        }
        span
    }

    fn is_back_to_back_days(&self, timetable: &Timetable, t1: &TimeLocation, t2: &TimeLocation) -> bool {
        let (f1, e1) = self.day_span(timetable, t1);
        let (f2, e2) = self.day_span(timetable, t2);
        e1 + 1 == f2 || e2 + 1 == f1
    }

    fn is_nr_days_between_greater_than_one(
        &self,
        timetable: &Timetable,
        t1: &TimeLocation,
        t2: &TimeLocation,
    ) -> bool {
        let (f1, e1) = self.day_span(timetable, t1);
        let (f2, e2) = self.day_span(timetable, t2);
        e1 - f2 > 2 || e2 - f1 > 2
    }

    /// The second meeting starts `days` days after the last day of the first.
    fn is_days_after(
        &self,
        timetable: &Timetable,
        p1: &Placement,
        p2: &Placement,
        first_goes_first: bool,
        days: i32,
    ) -> bool {
        let (t1, t2) = self.ordered(p1, p2, first_goes_first);
        let (_, e1) = self.day_span(timetable, t1);
        let (f2, _) = self.day_span(timetable, t2);
        (e1 + days).rem_euclid(self.nr_work_days(timetable)) == f2
    }

    /// Children of non-overlapping parents must not overlap, and overlapping
    /// children need overlapping parents.
    fn is_children_not_overlap(&self, timetable: &Timetable, plc1: &Placement, plc2: &Placement) -> bool {
        let lec1 = timetable.lecture(plc1.lecture());
        let lec2 = timetable.lecture(plc2.lecture());
        if lec1.scheduling_subpart_id() != lec2.scheduling_subpart_id() {
            return true;
        }

        let overlap = plc1.time_location().has_intersection(plc2.time_location());
        if overlap
            && let (Some(parent1), Some(parent2)) = (lec1.parent(), lec2.parent())
            && self.lectures.contains(&parent1)
            && self.lectures.contains(&parent2)
            && let (Some(a), Some(b)) = (
                timetable.assigned_placement(parent1),
                timetable.assigned_placement(parent2),
            )
            && !a.time_location().has_intersection(b.time_location())
        {
            return false;
        }

        if !overlap {
            for (subpart, children1) in lec1.children() {
                let Some(children2) = lec2.children().get(subpart) else {
                    continue;
                };
                for &c1 in children1 {
                    let Some(a) = timetable.assigned_placement(c1) else {
                        continue;
                    };
                    for &c2 in children2 {
                        let Some(b) = timetable.assigned_placement(c2) else {
                            continue;
                        };
                        if timetable.lecture(c1).scheduling_subpart_id()
                            == timetable.lecture(c2).scheduling_subpart_id()
                            && a.time_location().has_intersection(b.time_location())
                        {
                            return false;
                        }
                    }
                }
            }
        }
        true
    }

    fn is_gap_fill_mode(&self) -> bool {
        match self.preference {
            Preference::Required => true,
            Preference::Prohibited => false,
            Preference::Soft(level) => level < 0,
        }
    }

    fn is_gap_avoid_mode(&self) -> bool {
        match self.preference {
            Preference::Required => false,
            Preference::Prohibited => true,
            Preference::Soft(level) => level > 0,
        }
    }

    /// Checks the gaps between the members' meetings, folded onto one day.
    /// With `conflicts`, overlapping meetings are resolved by adding the
    /// non-overridden one to the set instead of failing.
    fn is_satisfied_seq_check(
        &self,
        view: AssignmentView,
        mut conflicts: Option<&mut Conflicts>,
    ) -> bool {
        if !self.constraint_type.is_back_to_back() {
            return true;
        }
        let timetable = view.timetable;
        let gap_min = self.constraint_type.min_gap();
        let gap_max = self.constraint_type.max_gap();

        let mut lengths: Vec<Vec<usize>> = Vec::new();
        let mut occupied: Vec<Option<PlacementIdx>> = vec![None; SLOTS_PER_DAY];
        let mut nr_lectures = 0;

        for &lecture in &self.lectures {
            let placement = view
                .placement(lecture)
                .filter(|p| !conflicts.as_deref().is_some_and(|c| c.contains(p)));
            let Some(placement) = placement else {
                let mut options: Vec<usize> = timetable
                    .lecture(lecture)
                    .time_locations()
                    .iter()
                    .map(TimeLocation::length)
                    .collect();
                options.sort_unstable();
                options.dedup();
                if !options.is_empty() {
                    lengths.push(options);
                }
                continue;
            };

            let time = timetable.placement(placement).time_location();
            let slots = time.start_slot()..(time.start_slot() + time.length()).min(SLOTS_PER_DAY);
            for slot in slots.clone() {
                let Some(other) = occupied[slot] else {
                    continue;
                };
                let Some(conflicts) = conflicts.as_deref_mut() else {
                    return false;
                };
                if !view.is_overridden(lecture) {
                    conflicts.insert(placement);
                } else if !view.is_overridden(timetable.placement(other).lecture()) {
                    conflicts.insert(other);
                }
            }
            for slot in slots {
                occupied[slot] = Some(placement);
            }
            nr_lectures += 1;
        }
        if nr_lectures <= 1 {
            return true;
        }
        lengths.truncate(timetable.params().can_fill_max_lengths);

        let fill = self.is_gap_fill_mode();
        if !fill && !self.is_gap_avoid_mode() {
            return true;
        }

        let end_of = |slot: usize| {
            occupied[slot]
                .map(|p| {
                    let time = timetable.placement(p).time_location();
                    time.start_slot() + time.length()
                })
                .unwrap_or(slot + 1)
        };
        let Some(first) = occupied.iter().position(Option::is_some) else {
            return true;
        };
        let mut slot = end_of(first);
        nr_lectures -= 1;
        while nr_lectures > 0 {
            let mut gap = 0;
            while slot < SLOTS_PER_DAY && occupied[slot].is_none() {
                gap += 1;
                slot += 1;
            }
            if slot >= SLOTS_PER_DAY {
                break;
            }
            if fill {
                if !can_fill(gap, gap_min, gap_max, &mut lengths) {
                    return false;
                }
            } else if (gap_min == 0 || !can_fill(gap, 0, gap_min - 1, &mut lengths))
                && (gap_max >= SLOTS_PER_DAY
                    || !can_fill(gap, gap_max + 1, SLOTS_PER_DAY, &mut lengths))
            {
                return false;
            }
            slot = end_of(slot);
            nr_lectures -= 1;
        }
        true
    }

    /// Sequence check. With `conflicts`, searches for the cheapest set of
    /// members to unassign so that the sequence holds and adds it.
    fn is_satisfied_seq(&self, view: AssignmentView, conflicts: Option<&mut Conflicts>) -> bool {
        let Some(conflicts) = conflicts else {
            return self.is_satisfied_seq_check(view, None);
        };
        let mut new_conflicts = Conflicts::default();
        match self.satisfied_recursive(view, 0, conflicts, &mut new_conflicts, None) {
            Some(best) => {
                conflicts.extend(best);
                true
            }
            None => false,
        }
    }

    fn satisfied_recursive(
        &self,
        view: AssignmentView,
        idx: usize,
        conflicts: &mut Conflicts,
        new_conflicts: &mut Conflicts,
        best: Option<Conflicts>,
    ) -> Option<Conflicts> {
        if idx == self.lectures.len() && new_conflicts.is_empty() {
            return best;
        }
        if self.is_satisfied_seq_check(view, Some(conflicts)) {
            let Some(best) = best else {
                return Some(new_conflicts.clone());
            };
            let b = view.overridden_placements().filter(|p| best.contains(p)).count();
            let n = view
                .overridden_placements()
                .filter(|p| new_conflicts.contains(p))
                .count();
            if n < b || (n == b && new_conflicts.len() < best.len()) {
                return Some(new_conflicts.clone());
            }
            return Some(best);
        }
        if idx == self.lectures.len() {
            return best;
        }

        let best = self.satisfied_recursive(view, idx + 1, conflicts, new_conflicts, best);
        let Some(placement) = view.placement(self.lectures[idx]) else {
            return best;
        };
        if conflicts.contains(&placement)
            || view.timetable.lecture(self.lectures[idx]).is_committed()
        {
            return best;
        }
        conflicts.insert(placement);
        new_conflicts.insert(placement);
        let best = self.satisfied_recursive(view, idx + 1, conflicts, new_conflicts, best);
        new_conflicts.remove(&placement);
        conflicts.remove(&placement);
        best
    }

    /// Number of distinct day slots the members occupy on the given day.
    fn nr_slots_a_day(&self, view: AssignmentView, day_code: u32, conflicts: Option<&Conflicts>) -> usize {
        let mut slots = FixedBitSet::with_capacity(SLOTS_PER_DAY);
        for &lecture in &self.lectures {
            let Some(placement) = view.placement(lecture) else {
                continue;
            };
            if conflicts.is_some_and(|c| c.contains(&placement)) {
                continue;
            }
            let time = view.timetable.placement(placement).time_location();
            if time.day_code() & day_code == 0 {
                continue;
            }
            let end = (time.start_slot() + time.length()).min(SLOTS_PER_DAY);
            slots.insert_range(time.start_slot()..end);
        }
        slots.count_ones(..)
    }

    fn max_hours_over(&self, view: AssignmentView) -> usize {
        let max = self.constraint_type.max_gap();
        DAY_CODES
            .iter()
            .map(|&day| self.nr_slots_a_day(view, day, None).saturating_sub(max))
            .sum()
    }

    fn max_hours_preference(&self, over: usize) -> i32 {
        if over > 0 {
            self.abs_preference() * over as i32 / 12
        } else {
            -self.abs_preference()
        }
    }

    fn pairs_preference(&self, violated: usize) -> i32 {
        if violated > 0 {
            self.abs_preference() * violated as i32
        } else {
            -self.abs_preference()
        }
    }

    fn nr_assigned(&self, timetable: &Timetable) -> usize {
        self.lectures
            .iter()
            .filter(|&&lecture| timetable.is_assigned(lecture))
            .count()
    }

    /// Current soft cost: the weighted number of violated pairs, or a reward
    /// of `-|preference|` when nothing is violated or fewer than two members
    /// are assigned. Hard constraints report 0.
    pub fn current_preference(&self, timetable: &Timetable) -> i32 {
        if self.is_hard() {
            return 0;
        }
        if self.nr_assigned(timetable) < 2 {
            return -self.abs_preference();
        }
        let view = AssignmentView {
            timetable,
            overrides: &[],
            with_assignment: true,
        };
        if self.constraint_type.is_max_hours_a_day() {
            return self.max_hours_preference(self.max_hours_over(view));
        }

        let assigned: Vec<PlacementIdx> = self
            .lectures
            .iter()
            .filter_map(|&lecture| timetable.assignment(lecture))
            .collect();
        let mut violated = 0;
        for (i, &p1) in assigned.iter().enumerate() {
            for &p2 in &assigned[i + 1..] {
                if !self.is_satisfied_pair(timetable, p1, p2) {
                    violated += 1;
                }
            }
        }
        if self.constraint_type.is_back_to_back() {
            let mut conflicts = Conflicts::default();
            if self.is_satisfied_seq(view, Some(&mut conflicts)) {
                violated += conflicts.len();
            } else {
                violated = self.lectures.len();
            }
        }
        self.pairs_preference(violated)
    }

    /// Change of [`Self::current_preference`] if `placement` were assigned.
    pub fn current_preference_for(&self, timetable: &Timetable, placement: PlacementIdx) -> i32 {
        if self.is_hard() {
            return 0;
        }
        let lecture = timetable.placement(placement).lecture();
        let newly_assigned = usize::from(!timetable.is_assigned(lecture));
        if self.nr_assigned(timetable) + newly_assigned < 2 {
            return 0;
        }

        let assign = [(lecture, Some(placement))];
        let unassign = [(lecture, None)];
        let after = AssignmentView {
            timetable,
            overrides: &assign,
            with_assignment: true,
        };
        let before = AssignmentView {
            timetable,
            overrides: &unassign,
            with_assignment: true,
        };

        if self.constraint_type.is_max_hours_a_day() {
            return self.max_hours_preference(self.max_hours_over(after))
                - self.max_hours_preference(self.max_hours_over(before));
        }

        let mut violated_after = 0;
        let mut violated_before = 0;
        for (i, &l1) in self.lectures.iter().enumerate() {
            for &l2 in &self.lectures[i + 1..] {
                if let (Some(p1), Some(p2)) = (before.placement(l1), before.placement(l2))
                    && !self.is_satisfied_pair(timetable, p1, p2)
                {
                    violated_before += 1;
                }
                if let (Some(p1), Some(p2)) = (after.placement(l1), after.placement(l2))
                    && !self.is_satisfied_pair(timetable, p1, p2)
                {
                    violated_after += 1;
                }
            }
        }

        if self.constraint_type.is_back_to_back() {
            let mut conflicts = Conflicts::default();
            if self.is_satisfied_seq(after, Some(&mut conflicts)) {
                violated_after += conflicts.len();
            } else {
                violated_after = self.lectures.len();
            }
            let mut previous = Conflicts::default();
            if self.is_satisfied_seq(before, Some(&mut previous)) {
                violated_before += previous.len();
            } else {
                violated_before = self.lectures.len();
            }
        }

        self.pairs_preference(violated_after) - self.pairs_preference(violated_before)
    }

    fn update_criterion(&mut self, timetable: &Timetable, criteria: &mut Criteria) {
        if self.is_hard() {
            return;
        }
        criteria.inc(
            Criterion::DistributionPreferences,
            -f64::from(self.last_preference),
        );
        self.last_preference = self.current_preference(timetable) + self.abs_preference();
        criteria.inc(
            Criterion::DistributionPreferences,
            f64::from(self.last_preference),
        );
    }

    fn new_ignore_set(&self, ctx: &ConstraintContext) -> FixedBitSet {
        FixedBitSet::with_capacity(ctx.constraints.len())
    }

    fn forward_check_depth(&self, ctx: &ConstraintContext) -> isize {
        ctx.timetable.params().forward_check_max_depth as isize - 1
    }

    /// Rejects `placement` (adds it to `conflicts`) when another member has
    /// no value left that is compatible with it. A member with a single
    /// compatible value gets that value propagated through its own hard
    /// constraints, up to `depth` group constraints deep.
    pub fn forward_check<R>(
        &self,
        ctx: &ConstraintContext,
        placement: PlacementIdx,
        conflicts: &mut Conflicts,
        ignore: &mut FixedBitSet,
        depth: isize,
        rng: &mut R,
    ) where
        R: Rng,
    {
        if depth < 0 {
            return;
        }
        let own = self.index.map(usize::from);
        if let Some(own) = own {
            ignore.insert(own);
        }
        self.forward_check_conflicts(ctx, placement, conflicts, ignore, depth, rng);
        if let Some(own) = own {
            ignore.set(own, false);
        }
    }

    fn forward_check_conflicts<R>(
        &self,
        ctx: &ConstraintContext,
        placement: PlacementIdx,
        conflicts: &mut Conflicts,
        ignore: &mut FixedBitSet,
        depth: isize,
        rng: &mut R,
    ) where
        R: Rng,
    {
        let timetable = ctx.timetable;
        let value = timetable.placement(placement);
        let can_share_room = self.constraint_type.can_share_room();
        let mut needed: Vec<PlacementIdx> = Vec::new();

        for &lecture in &self.lectures {
            if conflicts.contains(&placement) {
                break;
            }
            if lecture == value.lecture() {
                continue;
            }
            if let Some(current) = timetable.assignment(lecture) {
                if self.is_satisfied_pair(timetable, placement, current) {
                    if can_share_room && same_room_and_overlaps(value, timetable.placement(current)) {
                        needed.push(current);
                    }
                    continue;
                }
                conflicts.insert(current);
            }

            let Some(support) = self.supports(ctx, placement, lecture) else {
                return;
            };
            let Support {
                first,
                count,
                all_share_room,
            } = support;
            let Some(first) = first else {
                conflicts.insert(placement);
                return;
            };
            if all_share_room {
                needed.push(first);
            }

            if count == 1 {
                for &other in timetable.lecture(lecture).constraints() {
                    let constraint = ctx.constraint(other);
                    if !constraint.is_hard() || constraint.is_weakening() {
                        continue;
                    }
                    match constraint {
                        Constraint::Group(group) => {
                            if depth > 0 && !ignore.contains(other.get()) {
                                group.forward_check(ctx, first, conflicts, ignore, depth - 1, rng);
                            }
                        }
                        constraint => constraint.compute_conflicts(ctx, first, conflicts, rng),
                    }
                }
                if conflicts.contains(&first) {
                    conflicts.insert(placement);
                }
            }
        }

        if can_share_room && !needed.is_empty() {
            for room in value.rooms() {
                if let Some(room_constraint) =
                    room.room_constraint().and_then(|idx| ctx.room_constraint(idx))
                    && !room_constraint.check_room_size(timetable, value, &needed, None)
                {
                    conflicts.insert(placement);
                }
            }
        }
    }

    /// Same propagation as [`Self::forward_check`], answering only whether
    /// `placement` survives it.
    pub fn forward_check_ok(
        &self,
        ctx: &ConstraintContext,
        placement: PlacementIdx,
        ignore: &mut FixedBitSet,
        depth: isize,
    ) -> bool {
        if depth < 0 {
            return true;
        }
        let own = self.index.map(usize::from);
        if let Some(own) = own {
            ignore.insert(own);
        }
        let ok = self.forward_check_passes(ctx, placement, ignore, depth);
        if let Some(own) = own {
            ignore.set(own, false);
        }
        ok
    }

    fn forward_check_passes(
        &self,
        ctx: &ConstraintContext,
        placement: PlacementIdx,
        ignore: &mut FixedBitSet,
        depth: isize,
    ) -> bool {
        let timetable = ctx.timetable;
        let value = timetable.placement(placement);
        let can_share_room = self.constraint_type.can_share_room();
        let mut needed_size = timetable.lecture(value.lecture()).max_room_use();

        for &lecture in &self.lectures {
            if lecture == value.lecture() {
                continue;
            }
            if let Some(current) = timetable.assignment(lecture) {
                if !self.is_satisfied_pair(timetable, placement, current) {
                    return false;
                }
                if can_share_room && same_room_and_overlaps(value, timetable.placement(current)) {
                    needed_size += timetable.lecture(lecture).max_room_use();
                }
                continue;
            }

            let Some(support) = self.supports(ctx, placement, lecture) else {
                return true;
            };
            let Some(first) = support.first else {
                return false;
            };
            if support.all_share_room {
                needed_size += timetable.lecture(lecture).max_room_use();
            }

            if support.count == 1 {
                for &other in timetable.lecture(lecture).constraints() {
                    let constraint = ctx.constraint(other);
                    if !constraint.is_hard() || constraint.is_weakening() {
                        continue;
                    }
                    let rejected = match constraint {
                        Constraint::Group(group) => {
                            depth > 0
                                && !ignore.contains(other.get())
                                && !group.forward_check_ok(ctx, first, ignore, depth - 1)
                        }
                        constraint => constraint.in_conflict(ctx, first),
                    };
                    if rejected {
                        return false;
                    }
                }
            }
        }

        !(can_share_room && needed_size > value.room_size())
    }

    /// Values of `lecture` compatible with `placement`. `None` when the
    /// domain is empty or too large to scan.
    fn supports(
        &self,
        ctx: &ConstraintContext,
        placement: PlacementIdx,
        lecture: LectureIdx,
    ) -> Option<Support> {
        let timetable = ctx.timetable;
        let target = timetable.lecture(lecture);
        if target.nr_values() >= timetable.params().forward_check_max_domain_size {
            trace!(lecture = %lecture, nr_values = target.nr_values(), "Forward check skipped a large domain");
            return None;
        }
        if target.values().is_empty() {
            trace!(lecture = %lecture, "Forward check skipped an empty domain");
            return None;
        }

        let value = timetable.placement(placement);
        let mut support = Support {
            first: None,
            count: 0,
            all_share_room: self.constraint_type.can_share_room(),
        };
        for &other in target.values() {
            if support.count < 2 {
                if self.is_satisfied_pair(timetable, placement, other) {
                    if support.first.is_none() {
                        support.first = Some(other);
                    }
                    support.count += 1;
                    if support.all_share_room
                        && !same_room_and_overlaps(value, timetable.placement(other))
                    {
                        support.all_share_room = false;
                    }
                }
            } else if support.all_share_room
                && !same_room_and_overlaps(value, timetable.placement(other))
                && self.is_satisfied_pair(timetable, placement, other)
            {
                support.all_share_room = false;
            }
            if support.count > 1 && !support.all_share_room {
                break;
            }
        }
        Some(support)
    }
}

struct Support {
    first: Option<PlacementIdx>,
    /// Number of supporting values, counted up to two.
    count: usize,
    /// Every supporting value uses the same room at an overlapping time.
    all_share_room: bool,
}

fn same_room_and_overlaps(p1: &Placement, p2: &Placement) -> bool {
    p1.share_rooms(p2) && p1.time_location().has_intersection(p2.time_location())
}

/// An instructor can move between the two placements in time.
fn can_be_taught_together(timetable: &Timetable, p1: &Placement, p2: &Placement) -> bool {
    let (t1, t2) = (p1.time_location(), p2.time_location());
    if !t1.share_days(t2) || !t1.share_weeks(t2) {
        return true;
    }
    if t1.share_hours(t2) {
        return false;
    }
    let metric = timetable.distance_metric();
    if t1.start_slot() + t1.length() == t2.start_slot() || t2.start_slot() + t2.length() == t1.start_slot()
    {
        return p1.distance_in_meters(metric, p2) <= metric.instructor_prohibited_limit();
    }
    if metric.compute_distance_conflicts_between_non_btb_classes() {
        let minutes = p1.distance_in_minutes(metric, p2);
        if t1.start_slot() + t1.length() < t2.start_slot()
            && minutes
                > t1.break_time() + SLOT_LENGTH_MIN * (t2.start_slot() - t1.start_slot() - t1.length())
        {
            return false;
        }
        if t2.start_slot() + t2.length() < t1.start_slot()
            && minutes
                > t2.break_time() + SLOT_LENGTH_MIN * (t1.start_slot() - t2.start_slot() - t2.length())
        {
            return false;
        }
    }
    true
}

/// Whether `total_gap` can be split into gaps within `[gap_min, gap_max]`
/// separated by meetings of the remaining lectures, each contributing one of
/// its possible lengths.
fn can_fill(total_gap: usize, gap_min: usize, gap_max: usize, lengths: &mut Vec<Vec<usize>>) -> bool {
    if gap_min <= total_gap && total_gap <= gap_max {
        return true;
    }
    if total_gap < 2 * gap_min {
        return false;
    }
    for i in 0..lengths.len() {
        let options = lengths.remove(i);
        for gap in gap_min..=gap_max {
            for &length in &options {
                if gap + length <= total_gap && can_fill(total_gap - gap - length, gap_min, gap_max, lengths)
                {
                    lengths.insert(i, options);
                    return true;
                }
            }
        }
        lengths.insert(i, options);
    }
    false
}

impl TimetableConstraint for GroupConstraint {
    fn lectures(&self) -> &[LectureIdx] {
        &self.lectures
    }

    fn is_hard(&self) -> bool {
        self.preference.is_hard()
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
        if !self.is_hard() {
            return;
        }
        let timetable = ctx.timetable;
        let lecture = timetable.placement(placement).lecture();

        for &other in &self.lectures {
            if other == lecture {
                continue;
            }
            if let Some(current) = timetable.assignment(other)
                && !self.is_satisfied_pair(timetable, current, placement)
            {
                conflicts.insert(current);
            }
        }

        let overrides = [(lecture, Some(placement))];
        let view = AssignmentView {
            timetable,
            overrides: &overrides,
            with_assignment: true,
        };

        if self.constraint_type.is_back_to_back() && !self.is_satisfied_seq(view, Some(conflicts)) {
            conflicts.insert(placement);
        }

        if self.constraint_type.is_max_hours_a_day() {
            let max = self.constraint_type.max_gap();
            for &day in &DAY_CODES {
                if self.nr_slots_a_day(view, day, Some(conflicts)) <= max {
                    continue;
                }
                let mut adepts: Vec<PlacementIdx> = self
                    .lectures
                    .iter()
                    .filter(|&&other| other != lecture && !timetable.lecture(other).is_committed())
                    .filter_map(|&other| timetable.assignment(other))
                    .filter(|p| {
                        !conflicts.contains(p)
                            && timetable.placement(*p).time_location().day_code() & day != 0
                    })
                    .collect();
                loop {
                    if adepts.is_empty() {
                        conflicts.insert(placement);
                        break;
                    }
                    let conflict = adepts.swap_remove(rng.random_range(0..adepts.len()));
                    conflicts.insert(conflict);
                    if self.nr_slots_a_day(view, day, Some(conflicts)) <= max {
                        break;
                    }
                }
            }
        }

        let mut ignore = self.new_ignore_set(ctx);
        self.forward_check(
            ctx,
            placement,
            conflicts,
            &mut ignore,
            self.forward_check_depth(ctx),
            rng,
        );
    }

    fn in_conflict(&self, ctx: &ConstraintContext, placement: PlacementIdx) -> bool {
        if !self.is_hard() {
            return false;
        }
        let timetable = ctx.timetable;
        let lecture = timetable.placement(placement).lecture();

        let pair_conflict = self.lectures.iter().any(|&other| {
            other != lecture
                && timetable
                    .assignment(other)
                    .is_some_and(|current| !self.is_satisfied_pair(timetable, current, placement))
        });
        if pair_conflict {
            return true;
        }

        let overrides = [(lecture, Some(placement))];
        let view = AssignmentView {
            timetable,
            overrides: &overrides,
            with_assignment: true,
        };
        if self.constraint_type.is_back_to_back() && !self.is_satisfied_seq(view, None) {
            return true;
        }
        if self.constraint_type.is_max_hours_a_day() {
            let max = self.constraint_type.max_gap();
            if DAY_CODES
                .iter()
                .any(|&day| self.nr_slots_a_day(view, day, None) > max)
            {
                return true;
            }
        }

        let mut ignore = self.new_ignore_set(ctx);
        !self.forward_check_ok(ctx, placement, &mut ignore, self.forward_check_depth(ctx))
    }

    fn is_consistent(&self, ctx: &ConstraintContext, p1: PlacementIdx, p2: PlacementIdx) -> bool {
        if !self.is_hard() {
            return true;
        }
        let timetable = ctx.timetable;
        if !self.check_pair(timetable, p1, p2, false) {
            return false;
        }
        let overrides = [
            (timetable.placement(p1).lecture(), Some(p1)),
            (timetable.placement(p2).lecture(), Some(p2)),
        ];
        let view = AssignmentView {
            timetable,
            overrides: &overrides,
            with_assignment: false,
        };
        if self.constraint_type.is_back_to_back() && !self.is_satisfied_seq(view, None) {
            return false;
        }
        if self.constraint_type.is_max_hours_a_day() {
            let max = self.constraint_type.max_gap();
            return DAY_CODES
                .iter()
                .all(|&day| self.nr_slots_a_day(view, day, None) <= max);
        }
        true
    }

    fn assigned(
        &mut self,
        timetable: &Timetable,
        criteria: &mut Criteria,
        _iteration: u64,
        _placement: PlacementIdx,
    ) {
        self.update_criterion(timetable, criteria);
    }

    fn unassigned(
        &mut self,
        timetable: &Timetable,
        criteria: &mut Criteria,
        _iteration: u64,
        _placement: PlacementIdx,
    ) {
        self.update_criterion(timetable, criteria);
    }
}
