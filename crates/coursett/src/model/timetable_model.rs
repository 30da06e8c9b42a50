use fxhash::{FxHashMap, FxHashSet};
use rand::Rng;
use tracing::{debug, info, instrument};

use crate::{
    constraints::{
        constraint::{
            Conflicts, Constraint, ConstraintContext, ConstraintIdx, TimetableConstraint,
        },
        group_constraint_type::GroupConstraintType,
        jenrl_constraint::JenrlConstraint,
    },
    error::TimetableError,
    utils::enumerate_idx::EnumerateIdx,
};

use super::{
    constants::PREFERENCE_LEVEL_PROHIBITED,
    criteria::{Criteria, Criterion},
    distance_metric::DistanceMetric,
    lecture::{Lecture, LectureIdx},
    placement::{Placement, PlacementIdx},
    room_location::RoomLocation,
    score::{Score, ScoreAnalysis},
    student::{Configuration, ConfigurationIdx, Student, StudentIdx},
    timetable_params::TimetableParams,
};

/// Times and rooms with a preference above this level never enter a domain.
const MAX_DOMAIN_PREFERENCE: i32 = 500;

/// Lectures, placements and students of a timetabling problem together with
/// the current assignment.
#[derive(Debug, Clone)]
pub struct Timetable {
    params: TimetableParams,
    distance_metric: DistanceMetric,
    lectures: Vec<Lecture>,
    placements: Vec<Placement>,
    students: Vec<Student>,
    configurations: Vec<Configuration>,
    assignment: Vec<Option<PlacementIdx>>,
    subpart_lectures: FxHashMap<u64, Vec<LectureIdx>>,
}

impl Timetable {
    pub fn new(params: TimetableParams) -> Self {
        let distance_metric = params.distance_metric();
        Timetable {
            params,
            distance_metric,
            lectures: Vec::new(),
            placements: Vec::new(),
            students: Vec::new(),
            configurations: Vec::new(),
            assignment: Vec::new(),
            subpart_lectures: FxHashMap::default(),
        }
    }

    pub fn params(&self) -> &TimetableParams {
        &self.params
    }

    pub fn distance_metric(&self) -> &DistanceMetric {
        &self.distance_metric
    }

    pub fn distance_metric_mut(&mut self) -> &mut DistanceMetric {
        &mut self.distance_metric
    }

    pub fn lectures(&self) -> &[Lecture] {
        &self.lectures
    }

    pub fn lecture(&self, lecture: LectureIdx) -> &Lecture {
        &self.lectures[lecture]
    }

    pub fn placements(&self) -> &[Placement] {
        &self.placements
    }

    pub fn placement(&self, placement: PlacementIdx) -> &Placement {
        &self.placements[placement]
    }

    /// Lecture owning the placement.
    pub fn placement_lecture(&self, placement: PlacementIdx) -> &Lecture {
        &self.lectures[self.placements[placement].lecture()]
    }

    pub fn students(&self) -> &[Student] {
        &self.students
    }

    pub fn student(&self, student: StudentIdx) -> &Student {
        &self.students[student]
    }

    pub fn configurations(&self) -> &[Configuration] {
        &self.configurations
    }

    pub fn configuration(&self, configuration: ConfigurationIdx) -> &Configuration {
        &self.configurations[configuration]
    }

    pub fn assignment(&self, lecture: LectureIdx) -> Option<PlacementIdx> {
        self.assignment[lecture.get()]
    }

    pub fn assigned_placement(&self, lecture: LectureIdx) -> Option<&Placement> {
        self.assignment(lecture)
            .map(|placement| &self.placements[placement])
    }

    pub fn is_assigned(&self, lecture: LectureIdx) -> bool {
        self.assignment[lecture.get()].is_some()
    }

    pub fn nr_assigned(&self) -> usize {
        self.assignment.iter().filter(|value| value.is_some()).count()
    }

    pub fn unassigned_lectures(&self) -> impl Iterator<Item = LectureIdx> + '_ {
        self.assignment
            .iter()
            .enumerate_idx()
            .filter(|(_, value)| value.is_none())
            .map(|(lecture, _)| lecture)
    }

    /// Every lecture of the same scheduling subpart, including `lecture`.
    pub fn same_subpart_lectures(&self, lecture: LectureIdx) -> &[LectureIdx] {
        self.lectures[lecture]
            .scheduling_subpart_id()
            .and_then(|subpart| self.subpart_lectures.get(&subpart))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_single_section(&self, lecture: LectureIdx) -> bool {
        let current = &self.lectures[lecture];
        match (current.parent(), current.scheduling_subpart_id()) {
            (Some(parent), Some(subpart)) => self.lectures[parent]
                .children()
                .get(&subpart)
                .is_none_or(|children| children.len() <= 1),
            _ => self.same_subpart_lectures(lecture).len() <= 1,
        }
    }

    pub fn offering_id(&self, lecture: LectureIdx) -> Option<u64> {
        let mut current = &self.lectures[lecture];
        loop {
            if let Some(configuration) = current.configuration() {
                return Some(self.configurations[configuration].offering_id());
            }
            current = &self.lectures[current.parent()?];
        }
    }

    pub fn max_achievable_class_limit(&self, lecture: LectureIdx) -> usize {
        let current = &self.lectures[lecture];
        let mut limit = current.class_limit_for_room_size(current.max_room_size());
        for children in current.children().values() {
            let children_limit = children
                .iter()
                .map(|&child| self.max_achievable_class_limit(child))
                .sum::<usize>();
            limit = limit.min(children_limit);
        }
        limit.max(current.min_class_limit())
    }

    /// Class limit of `lecture` if `value` were assigned and every placement
    /// in `conflicts` were removed.
    pub fn class_limit(
        &self,
        lecture: LectureIdx,
        value: Option<PlacementIdx>,
        conflicts: Option<&Conflicts>,
    ) -> usize {
        let current = &self.lectures[lecture];
        let mut assigned = self.assignment(lecture);
        if let Some(value) = value
            && self.placements[value].lecture() == lecture
        {
            assigned = Some(value);
        }
        if let (Some(conflicts), Some(placement)) = (conflicts, assigned)
            && conflicts.contains(&placement)
        {
            assigned = None;
        }

        let mut limit = match assigned {
            Some(placement) => {
                current.class_limit_for_room_size(self.placements[placement].room_size())
            }
            None => self.max_achievable_class_limit(lecture),
        };

        if !current.has_any_children() {
            return limit;
        }

        for children in current.children().values() {
            let children_limit = children
                .iter()
                .map(|&child| self.class_limit(child, value, conflicts))
                .sum::<usize>();
            limit = limit.min(children_limit);
        }
        limit.max(current.min_class_limit())
    }

    pub fn can_enroll(&self, student: StudentIdx, lecture: LectureIdx) -> bool {
        let Some(offering) = self.offering_id(lecture) else {
            return true;
        };
        let Some(excluded) = self.students[student].can_not_enroll(offering) else {
            return true;
        };
        let mut current = Some(lecture);
        while let Some(idx) = current {
            if excluded.contains(&idx) {
                return false;
            }
            current = self.lectures[idx].parent();
        }
        true
    }

    pub fn add_configuration(&mut self, configuration: Configuration) -> ConfigurationIdx {
        self.configurations.push(configuration);
        ConfigurationIdx::new(self.configurations.len() - 1)
    }

    pub fn add_student(&mut self, student: Student) -> StudentIdx {
        self.students.push(student);
        StudentIdx::new(self.students.len() - 1)
    }

    pub fn add_lecture(&mut self, lecture: Lecture) -> Result<LectureIdx, TimetableError> {
        if let Some(parent) = lecture.parent()
            && parent.get() >= self.lectures.len()
        {
            return Err(TimetableError::InvalidLecture(parent));
        }
        if let Some(configuration) = lecture.configuration()
            && configuration.get() >= self.configurations.len()
        {
            return Err(TimetableError::InvalidConfiguration(configuration));
        }

        let idx = LectureIdx::new(self.lectures.len());
        let subpart = lecture.scheduling_subpart_id();
        match (lecture.parent(), lecture.configuration()) {
            (Some(parent), _) => {
                self.lectures[parent].add_child(subpart.unwrap_or_default(), idx);
            }
            (None, Some(configuration)) => {
                self.configurations[configuration]
                    .add_top_lecture(subpart.unwrap_or_default(), idx);
            }
            (None, None) => {}
        }
        if let Some(subpart) = subpart {
            self.subpart_lectures.entry(subpart).or_default().push(idx);
        }

        self.lectures.push(lecture);
        self.assignment.push(None);
        Ok(idx)
    }

    /// Appends a placement to the domain of its lecture.
    pub fn add_placement(&mut self, placement: Placement) -> Result<PlacementIdx, TimetableError> {
        let lecture = placement.lecture();
        if lecture.get() >= self.lectures.len() {
            return Err(TimetableError::InvalidLecture(lecture));
        }
        let idx = self.push_placement(placement);
        self.lectures[lecture].push_value(idx);
        Ok(idx)
    }

    fn push_placement(&mut self, placement: Placement) -> PlacementIdx {
        self.placements.push(placement);
        PlacementIdx::new(self.placements.len() - 1)
    }

    fn checked_placement(&self, placement: PlacementIdx) -> Result<&Placement, TimetableError> {
        self.placements
            .get(placement.get())
            .ok_or(TimetableError::InvalidPlacement(placement))
    }

    fn check_lecture(&self, lecture: LectureIdx) -> Result<(), TimetableError> {
        if lecture.get() < self.lectures.len() {
            Ok(())
        } else {
            Err(TimetableError::InvalidLecture(lecture))
        }
    }

    fn check_student(&self, student: StudentIdx) -> Result<(), TimetableError> {
        if student.get() < self.students.len() {
            Ok(())
        } else {
            Err(TimetableError::InvalidStudent(student))
        }
    }
}

/// The timetable together with its constraints and objective accumulators.
///
/// Every change of the assignment goes through [`TimetableModel::assign`] and
/// [`TimetableModel::unassign`], which keep constraint state and criteria in
/// sync.
#[derive(Debug, Clone)]
pub struct TimetableModel {
    timetable: Timetable,
    constraints: Vec<Constraint>,
    criteria: Criteria,
}

impl TimetableModel {
    pub fn new(params: TimetableParams) -> Self {
        let criteria = params.criteria();
        TimetableModel {
            timetable: Timetable::new(params),
            constraints: Vec::new(),
            criteria,
        }
    }

    pub fn timetable(&self) -> &Timetable {
        &self.timetable
    }

    pub fn distance_metric_mut(&mut self) -> &mut DistanceMetric {
        self.timetable.distance_metric_mut()
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn constraint(&self, constraint: ConstraintIdx) -> &Constraint {
        &self.constraints[constraint]
    }

    pub fn criteria(&self) -> &Criteria {
        &self.criteria
    }

    pub fn context(&self) -> ConstraintContext<'_> {
        ConstraintContext::new(&self.timetable, &self.constraints)
    }

    pub fn add_configuration(&mut self, configuration: Configuration) -> ConfigurationIdx {
        self.timetable.add_configuration(configuration)
    }

    pub fn add_student(&mut self, student: Student) -> StudentIdx {
        self.timetable.add_student(student)
    }

    pub fn add_placement(&mut self, placement: Placement) -> Result<PlacementIdx, TimetableError> {
        self.timetable.add_placement(placement)
    }

    /// Adds a lecture and registers it with the room constraints of its
    /// candidate rooms.
    pub fn add_lecture(&mut self, lecture: Lecture) -> Result<LectureIdx, TimetableError> {
        let room_constraints: Vec<ConstraintIdx> = lecture
            .room_locations()
            .iter()
            .filter_map(RoomLocation::room_constraint)
            .collect::<FxHashSet<_>>()
            .into_iter()
            .collect();
        if let Some(&missing) = room_constraints
            .iter()
            .find(|constraint| constraint.get() >= self.constraints.len())
        {
            return Err(TimetableError::InvalidConstraint(missing));
        }

        let idx = self.timetable.add_lecture(lecture)?;
        for constraint in room_constraints {
            if let Constraint::Room(room) = &mut self.constraints[constraint] {
                room.add_lecture(idx);
                self.timetable.lectures[idx].add_constraint(constraint);
            }
        }
        Ok(idx)
    }

    /// Adds a constraint and wires the back-references of its lectures.
    #[instrument(skip_all, level = "debug", fields(kind = constraint.constraint_name()))]
    pub fn add_constraint(
        &mut self,
        mut constraint: Constraint,
    ) -> Result<ConstraintIdx, TimetableError> {
        let idx = ConstraintIdx::new(self.constraints.len());

        for &lecture in constraint.lectures() {
            self.timetable.check_lecture(lecture)?;
        }

        match &mut constraint {
            Constraint::Group(group) => {
                group.set_index(idx);
                group.include_children(&self.timetable);
            }
            Constraint::Spread(spread) => {
                let timetable = &self.timetable;
                let constraints = &self.constraints;
                spread.retain_lectures(|lecture| {
                    !is_secondary_meet_with(timetable, constraints, lecture)
                });
            }
            Constraint::DepartmentSpread(spread) => {
                let timetable = &self.timetable;
                let constraints = &self.constraints;
                spread.retain_lectures(|lecture| {
                    !is_secondary_meet_with(timetable, constraints, lecture)
                });
            }
            _ => {}
        }

        let lectures = constraint.lectures().to_vec();
        for &lecture in &lectures {
            let current = &mut self.timetable.lectures[lecture];
            current.add_constraint(idx);
            match &constraint {
                Constraint::Group(group) => {
                    current.add_group_constraint(idx);
                    if group.constraint_type().can_share_room() {
                        current.add_can_share_room_constraint(
                            idx,
                            lectures.iter().copied().filter(|&other| other != lecture),
                        );
                    }
                }
                Constraint::Instructor(_) => current.add_instructor_constraint(idx),
                Constraint::Spread(_) => current.add_spread_constraint(idx),
                Constraint::DepartmentSpread(_) => current.set_department_spread_constraint(idx),
                Constraint::ClassLimit(_) => current.set_class_limit_constraint(idx),
                Constraint::Jenrl(jenrl) => {
                    if let Some(other) = jenrl.another(lecture) {
                        current.add_jenrl_constraint(other, idx);
                    }
                }
                Constraint::Room(_)
                | Constraint::MinimizeGroupsOfTime(_)
                | Constraint::MinimizeRoomUsage(_) => {}
            }
        }

        debug!(
            constraint = %idx,
            nr_lectures = lectures.len(),
            "Registered {} constraint",
            constraint.constraint_name()
        );
        self.constraints.push(constraint);
        Ok(idx)
    }

    /// Enrolls a student into a lecture, updating the joint enrollments with
    /// every other lecture of the student.
    pub fn enroll(&mut self, student: StudentIdx, lecture: LectureIdx) -> Result<(), TimetableError> {
        self.timetable.check_student(student)?;
        self.timetable.check_lecture(lecture)?;

        if !self.timetable.students[student].add_lecture(lecture) {
            return Ok(());
        }
        self.timetable.lectures[lecture].add_student(student);
        if let Some(configuration) = self.timetable.lectures[lecture].configuration() {
            self.timetable.students[student].add_configuration(configuration);
        }

        let mut others: Vec<LectureIdx> = self.timetable.students[student]
            .lectures()
            .iter()
            .copied()
            .filter(|&other| other != lecture)
            .collect();
        others.sort_unstable();

        for other in others {
            let constraint = match self.timetable.lectures[lecture].jenrl_constraint(other) {
                Some(constraint) => constraint,
                None => {
                    let jenrl = JenrlConstraint::new(&self.timetable, lecture, other);
                    self.add_constraint(Constraint::Jenrl(jenrl))?
                }
            };
            if let Constraint::Jenrl(jenrl) = &mut self.constraints[constraint] {
                jenrl.inc_jenrl(&self.timetable, &mut self.criteria, student);
            }
        }
        Ok(())
    }

    /// Removes a student from a lecture. Joint enrollments that drop to no
    /// students are detached from both lectures.
    pub fn unenroll(&mut self, student: StudentIdx, lecture: LectureIdx) -> Result<(), TimetableError> {
        self.timetable.check_student(student)?;
        self.timetable.check_lecture(lecture)?;

        if !self.timetable.students[student].remove_lecture(lecture) {
            return Ok(());
        }
        self.timetable.lectures[lecture].remove_student(student);

        let others: Vec<LectureIdx> = self.timetable.students[student]
            .lectures()
            .iter()
            .copied()
            .collect();
        for other in others {
            let Some(constraint) = self.timetable.lectures[lecture].jenrl_constraint(other) else {
                continue;
            };
            let Constraint::Jenrl(jenrl) = &mut self.constraints[constraint] else {
                continue;
            };
            jenrl.dec_jenrl(&self.timetable, &mut self.criteria, student);
            if jenrl.nr_students() == 0 {
                self.timetable.lectures[lecture].remove_jenrl_constraint(other);
                self.timetable.lectures[lecture].remove_constraint(constraint);
                self.timetable.lectures[other].remove_jenrl_constraint(lecture);
                self.timetable.lectures[other].remove_constraint(constraint);
                debug!(
                    constraint = %constraint,
                    first = %lecture,
                    second = %other,
                    "Removed joint enrollment without students"
                );
            }
        }

        if let Some(configuration) = self.timetable.lectures[lecture].configuration() {
            let still_enrolled = self.timetable.students[student]
                .lectures()
                .iter()
                .any(|&other| self.timetable.lectures[other].configuration() == Some(configuration));
            if !still_enrolled {
                self.timetable.students[student].remove_configuration(configuration);
            }
        }
        Ok(())
    }

    /// Builds the domain of a lecture from its candidate times and rooms.
    #[instrument(skip_all, level = "debug", fields(lecture = %lecture_idx))]
    pub fn compute_values(
        &mut self,
        lecture_idx: LectureIdx,
    ) -> Result<Vec<PlacementIdx>, TimetableError> {
        self.timetable.check_lecture(lecture_idx)?;

        let candidates = {
            let ctx = self.context();
            let lecture = self.timetable.lecture(lecture_idx);
            let allow_break_hard = self.timetable.params.allow_break_hard;
            let metric = self.timetable.distance_metric();
            let instructors: Vec<_> = lecture
                .instructor_constraints()
                .iter()
                .filter_map(|&constraint| match ctx.constraint(constraint) {
                    Constraint::Instructor(instructor) if instructor.is_hard() => Some(instructor),
                    _ => None,
                })
                .collect();

            let usable_room = |room: &RoomLocation| {
                (allow_break_hard || room.preference() != PREFERENCE_LEVEL_PROHIBITED)
                    && room.preference() <= MAX_DOMAIN_PREFERENCE
            };

            let mut candidates = Vec::new();
            for time in lecture.time_locations() {
                if !allow_break_hard && time.preference() == PREFERENCE_LEVEL_PROHIBITED {
                    continue;
                }
                if time.preference() > MAX_DOMAIN_PREFERENCE {
                    continue;
                }
                if instructors
                    .iter()
                    .any(|instructor| !instructor.is_time_available(time))
                {
                    continue;
                }

                let room_available = |room: &RoomLocation| {
                    room.room_constraint()
                        .and_then(|constraint| ctx.room_constraint(constraint))
                        .is_none_or(|constraint| constraint.is_available(time))
                };

                let room_sets: Vec<Vec<RoomLocation>> = match lecture.nr_rooms() {
                    0 => vec![Vec::new()],
                    1 => lecture
                        .room_locations()
                        .iter()
                        .filter(|room| usable_room(room) && room_available(room))
                        .map(|room| vec![room.clone()])
                        .collect(),
                    nr_rooms => {
                        let rooms: Vec<RoomLocation> = lecture
                            .room_locations()
                            .iter()
                            .filter(|room| usable_room(room) && room_available(room))
                            .cloned()
                            .collect();
                        room_combinations(&rooms, nr_rooms, lecture.min_room_use())
                    }
                };

                for rooms in room_sets {
                    let placement = Placement::new(lecture_idx, time.clone(), rooms);
                    if instructors
                        .iter()
                        .all(|instructor| instructor.is_placement_available(metric, &placement))
                    {
                        candidates.push(placement);
                    }
                }
            }
            candidates
        };

        let values: Vec<PlacementIdx> = candidates
            .into_iter()
            .map(|placement| self.timetable.push_placement(placement))
            .collect();
        debug!(nr_values = values.len(), "Computed domain");
        self.timetable.lectures[lecture_idx].set_values(values.clone());
        Ok(values)
    }

    /// Initializes the constraints that derive their limits from the domains
    /// and the current assignment.
    #[instrument(skip_all, level = "debug")]
    pub fn initialize(&mut self) {
        for constraint in self.constraints.iter_mut() {
            match constraint {
                Constraint::Spread(spread) => spread.init(&self.timetable, &mut self.criteria),
                Constraint::DepartmentSpread(spread) => {
                    spread.init(&self.timetable, &mut self.criteria)
                }
                Constraint::MinimizeGroupsOfTime(groups) => groups.set_enabled(&self.timetable),
                Constraint::MinimizeRoomUsage(rooms) => rooms.set_enabled(&self.timetable),
                _ => {}
            }
        }
        info!(
            nr_lectures = self.timetable.lectures.len(),
            nr_placements = self.timetable.placements.len(),
            nr_constraints = self.constraints.len(),
            "Timetable model initialized"
        );
    }

    /// Assigns a placement, unassigning the previous placement of its lecture
    /// first.
    pub fn assign(&mut self, iteration: u64, placement: PlacementIdx) -> Result<(), TimetableError> {
        let lecture = self.timetable.checked_placement(placement)?.lecture();
        if !self.timetable.lectures[lecture].values().contains(&placement) {
            return Err(TimetableError::PlacementNotOwned { placement, lecture });
        }

        match self.timetable.assignment(lecture) {
            Some(current) if current == placement => return Ok(()),
            Some(_) => {
                self.unassign(iteration, lecture)?;
            }
            None => {}
        }

        self.timetable.assignment[lecture.get()] = Some(placement);
        self.update_placement_criteria(placement, 1.0);

        let constraints = self.timetable.lectures[lecture].constraints().to_vec();
        for constraint in constraints {
            self.constraints[constraint].assigned(
                &self.timetable,
                &mut self.criteria,
                iteration,
                placement,
            );
        }
        Ok(())
    }

    /// Unassigns the current placement of a lecture, returning it.
    pub fn unassign(
        &mut self,
        iteration: u64,
        lecture: LectureIdx,
    ) -> Result<Option<PlacementIdx>, TimetableError> {
        self.timetable.check_lecture(lecture)?;
        let Some(placement) = self.timetable.assignment[lecture.get()].take() else {
            return Ok(None);
        };
        self.update_placement_criteria(placement, -1.0);

        let constraints = self.timetable.lectures[lecture].constraints().to_vec();
        for constraint in constraints {
            self.constraints[constraint].unassigned(
                &self.timetable,
                &mut self.criteria,
                iteration,
                placement,
            );
        }
        Ok(Some(placement))
    }

    fn update_placement_criteria(&mut self, placement: PlacementIdx, sign: f64) {
        let value = &self.timetable.placements[placement];
        let lecture = &self.timetable.lectures[value.lecture()];
        self.criteria.inc(
            Criterion::TimePreferences,
            sign * lecture.weight() * value.time_location().normalized_preference(),
        );
        self.criteria.inc(
            Criterion::RoomPreferences,
            sign * lecture.weight() * f64::from(value.sum_room_preference()),
        );
        self.criteria.inc(
            Criterion::TooBigRooms,
            sign * f64::from(lecture.too_big_room_preference(value)),
        );
    }

    /// Every assigned placement that has to go for `placement` to be legal.
    /// May contain `placement` itself when it can not be made legal.
    pub fn conflict_values<R>(&self, placement: PlacementIdx, rng: &mut R) -> Conflicts
    where
        R: Rng,
    {
        let ctx = self.context();
        let mut conflicts = Conflicts::default();
        let lecture = self.timetable.placement(placement).lecture();
        for &constraint in self.timetable.lecture(lecture).constraints() {
            ctx.constraint(constraint)
                .compute_conflicts(&ctx, placement, &mut conflicts, rng);
        }
        conflicts
    }

    pub fn in_conflict(&self, placement: PlacementIdx) -> bool {
        let ctx = self.context();
        let lecture = self.timetable.placement(placement).lecture();
        self.timetable
            .lecture(lecture)
            .constraints()
            .iter()
            .any(|&constraint| ctx.constraint(constraint).in_conflict(&ctx, placement))
    }

    /// Whether two placements of different lectures can coexist under every
    /// constraint both lectures share.
    pub fn is_consistent(&self, p1: PlacementIdx, p2: PlacementIdx) -> bool {
        let ctx = self.context();
        let first = self.timetable.placement_lecture(p1);
        let second = self.timetable.placement_lecture(p2);
        first
            .constraints()
            .iter()
            .filter(|constraint| second.constraints().contains(constraint))
            .all(|&constraint| ctx.constraint(constraint).is_consistent(&ctx, p1, p2))
    }

    /// One relaxation step of every weakening constraint.
    pub fn weaken(&mut self) {
        for constraint in self.constraints.iter_mut() {
            constraint.weaken();
        }
    }

    /// Relaxes the weakening constraints of the placement's lecture until the
    /// placement is no longer rejected by them.
    pub fn weaken_for(&mut self, placement: PlacementIdx) {
        let lecture = self.timetable.placement(placement).lecture();
        for &constraint in self.timetable.lectures[lecture].constraints() {
            self.constraints[constraint].weaken_for(&self.timetable, placement);
        }
    }

    /// Number of (rounded) student conflicts `placement` would cause.
    pub fn count_student_conflicts(&self, placement: PlacementIdx) -> usize {
        let lecture = self.timetable.placement(placement).lecture();
        self.timetable
            .lecture(lecture)
            .jenrl_constraints()
            .values()
            .filter_map(|&constraint| match &self.constraints[constraint] {
                Constraint::Jenrl(jenrl) => Some(jenrl.jenrl_for(&self.timetable, placement)),
                _ => None,
            })
            .sum()
    }

    pub fn score(&self) -> Score {
        let unassigned = self.timetable.lectures.len() - self.timetable.nr_assigned();
        Score::new(unassigned as f64, self.criteria.total())
    }

    pub fn score_analysis(&self) -> ScoreAnalysis {
        let mut analysis = self.criteria.analysis();
        let unassigned = self.timetable.lectures.len() - self.timetable.nr_assigned();
        analysis
            .scores
            .insert("Unassigned", Score::hard(unassigned as f64));
        analysis
    }
}

fn is_secondary_meet_with(
    timetable: &Timetable,
    constraints: &[Constraint],
    lecture: LectureIdx,
) -> bool {
    let current = timetable.lecture(lecture);
    current.can_share_room()
        && current.group_constraints().iter().any(|&constraint| {
            matches!(
                &constraints[constraint],
                Constraint::Group(group)
                    if group.constraint_type() == GroupConstraintType::MeetWith
                        && group.lectures().iter().position(|&l| l == lecture).is_some_and(|p| p > 0)
            )
        })
}

/// Every `size`-subset of `rooms` (in order) with a total capacity of at
/// least `min_size`.
fn room_combinations(
    rooms: &[RoomLocation],
    size: usize,
    min_size: usize,
) -> Vec<Vec<RoomLocation>> {
    fn collect(
        rooms: &[RoomLocation],
        start: usize,
        size: usize,
        min_size: usize,
        current: &mut Vec<RoomLocation>,
        result: &mut Vec<Vec<RoomLocation>>,
    ) {
        if current.len() == size {
            if current.iter().map(RoomLocation::size).sum::<usize>() >= min_size {
                result.push(current.clone());
            }
            return;
        }
        let needed = size - current.len();
        for index in start..rooms.len() {
            if rooms.len() - index < needed {
                break;
            }
            current.push(rooms[index].clone());
            collect(rooms, index + 1, size, min_size, current, result);
            current.pop();
        }
    }

    let mut result = Vec::new();
    if size <= rooms.len() {
        collect(rooms, 0, size, min_size, &mut Vec::with_capacity(size), &mut result);
    }
    result
}

#[cfg(test)]
mod tests {
    use crate::{
        constraints::{
            group_constraint::GroupConstraint, instructor_constraint::InstructorConstraint,
        },
        model::{lecture::LectureBuilder, preference::Preference, time_location::TimeLocation},
        test_utils::{MWF, MockRng, add_lecture, add_room, time},
    };

    use super::*;

    #[test]
    fn test_children_and_subparts_are_registered() {
        let mut timetable = Timetable::new(TimetableParams::default());
        let configuration = timetable.add_configuration(Configuration::new(1, 100, 30));

        let mut builder = LectureBuilder::default();
        builder
            .set_id(1)
            .set_scheduling_subpart_id(10)
            .set_configuration(configuration);
        let parent = timetable.add_lecture(builder.build()).unwrap();

        let mut children = Vec::new();
        for id in 2..4 {
            let mut builder = LectureBuilder::default();
            builder.set_id(id).set_scheduling_subpart_id(20).set_parent(parent);
            children.push(timetable.add_lecture(builder.build()).unwrap());
        }

        assert_eq!(timetable.lecture(parent).children()[&20], children);
        assert_eq!(timetable.configuration(configuration).top_lectures()[&10], vec![parent]);
        assert_eq!(timetable.same_subpart_lectures(children[0]), children.as_slice());
        assert!(timetable.is_single_section(parent));
        assert!(!timetable.is_single_section(children[1]));
        assert_eq!(timetable.offering_id(children[1]), Some(100));
    }

    #[test]
    fn test_add_lecture_with_unknown_parent() {
        let mut timetable = Timetable::new(TimetableParams::default());
        let mut builder = LectureBuilder::default();
        builder.set_parent(LectureIdx::new(3));

        assert_eq!(
            timetable.add_lecture(builder.build()),
            Err(TimetableError::InvalidLecture(LectureIdx::new(3)))
        );
        assert!(timetable.lectures().is_empty());
    }

    #[test]
    fn test_class_limit_follows_children() {
        let mut model = TimetableModel::new(TimetableParams::default());
        let big = add_room(&mut model, 1, 100);
        let small = add_room(&mut model, 2, 12);

        let mut builder = LectureBuilder::default();
        builder
            .set_id(1)
            .set_class_limits(20, 60)
            .set_time_locations(vec![time(MWF, 90, 12)])
            .set_room_locations(vec![big.clone()]);
        let parent = model.add_lecture(builder.build()).unwrap();

        let mut children = Vec::new();
        for id in 2..4 {
            let mut builder = LectureBuilder::default();
            builder
                .set_id(id)
                .set_scheduling_subpart_id(7)
                .set_parent(parent)
                .set_class_limits(10, 25)
                .set_time_locations(vec![time(MWF, 90, 12)])
                .set_room_locations(vec![big.clone(), small.clone()]);
            children.push(model.add_lecture(builder.build()).unwrap());
        }

        assert_eq!(model.timetable().max_achievable_class_limit(children[0]), 25);
        assert_eq!(model.timetable().max_achievable_class_limit(parent), 50);

        let small_placement = model
            .add_placement(Placement::new(children[0], time(MWF, 90, 12), vec![small]))
            .unwrap();
        model.assign(0, small_placement).unwrap();

        assert_eq!(model.timetable().class_limit(children[0], None, None), 12);
        assert_eq!(model.timetable().class_limit(parent, None, None), 37);

        let mut conflicts = Conflicts::default();
        conflicts.insert(small_placement);
        assert_eq!(model.timetable().class_limit(parent, None, Some(&conflicts)), 50);
    }

    #[test]
    fn test_compute_values_filters_times_and_rooms() {
        let mut model = TimetableModel::new(TimetableParams::default());
        let r1 = add_room(&mut model, 1, 30);
        let r2 = add_room(&mut model, 2, 40);
        let prohibited = RoomLocation::new(3, "P", 50, PREFERENCE_LEVEL_PROHIBITED);

        let mut builder = LectureBuilder::default();
        builder
            .set_id(1)
            .set_class_limit(20)
            .set_time_locations(vec![
                time(MWF, 90, 12),
                TimeLocation::new(MWF, 102, 12, PREFERENCE_LEVEL_PROHIBITED),
                TimeLocation::new(MWF, 114, 12, 600),
            ])
            .set_room_locations(vec![r1, r2, prohibited]);
        let lecture = model.add_lecture(builder.build()).unwrap();

        let values = model.compute_values(lecture).unwrap();
        assert_eq!(values.len(), 2);
        assert!(values.iter().all(|&value| {
            let placement = model.timetable().placement(value);
            placement.time_location().start_slot() == 90 && placement.nr_rooms() == 1
        }));
        assert_eq!(model.timetable().lecture(lecture).values(), values.as_slice());
    }

    #[test]
    fn test_compute_values_respects_room_availability() {
        let mut model = TimetableModel::new(TimetableParams::default());
        let room = add_room(&mut model, 1, 30);
        if let Some(Constraint::Room(constraint)) = room
            .room_constraint()
            .map(|idx| &mut model.constraints[idx])
        {
            constraint.set_not_available(time(64, 90, 6));
        }

        let mut builder = LectureBuilder::default();
        builder
            .set_id(1)
            .set_class_limit(20)
            .set_time_locations(vec![time(MWF, 90, 12), time(MWF, 120, 12)])
            .set_room_locations(vec![room]);
        let lecture = model.add_lecture(builder.build()).unwrap();

        let values = model.compute_values(lecture).unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(
            model.timetable().placement(values[0]).time_location().start_slot(),
            120
        );
    }

    #[test]
    fn test_compute_values_multi_room_combinations() {
        let mut model = TimetableModel::new(TimetableParams::default());
        let rooms: Vec<RoomLocation> = [(1, 10), (2, 20), (3, 30)]
            .into_iter()
            .map(|(id, size)| add_room(&mut model, id, size))
            .collect();

        let mut builder = LectureBuilder::default();
        builder
            .set_id(1)
            .set_class_limit(40)
            .set_nr_rooms(2)
            .set_time_locations(vec![time(MWF, 90, 12)])
            .set_room_locations(rooms);
        let lecture = model.add_lecture(builder.build()).unwrap();

        let values = model.compute_values(lecture).unwrap();
        let mut sizes: Vec<usize> = values
            .iter()
            .map(|&value| model.timetable().placement(value).room_size())
            .collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![40, 50]);
    }

    #[test]
    fn test_compute_values_skips_unavailable_instructor_times() {
        let mut model = TimetableModel::new(TimetableParams::default());
        let (lecture, _) = add_lecture(&mut model, 1, vec![]);
        let mut instructor = InstructorConstraint::new(1, "Smith", vec![lecture], false);
        instructor.set_not_available(time(MWF, 90, 12), vec![]);
        model
            .add_constraint(Constraint::Instructor(instructor))
            .unwrap();

        let mut builder = LectureBuilder::default();
        builder
            .set_id(2)
            .set_time_locations(vec![time(MWF, 96, 12), time(MWF, 150, 12)]);
        let other = model.add_lecture(builder.build()).unwrap();
        assert_eq!(model.compute_values(other).unwrap().len(), 2);

        let mut builder = LectureBuilder::default();
        builder
            .set_id(3)
            .set_time_locations(vec![time(MWF, 96, 12), time(MWF, 150, 12)]);
        let constrained = model.add_lecture(builder.build()).unwrap();
        let mut instructor = InstructorConstraint::new(2, "Jones", vec![constrained], false);
        instructor.set_not_available(time(MWF, 90, 12), vec![]);
        model
            .add_constraint(Constraint::Instructor(instructor))
            .unwrap();

        let values = model.compute_values(constrained).unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(
            model.timetable().placement(values[0]).time_location().start_slot(),
            150
        );
    }

    #[test]
    fn test_assign_and_unassign_restore_criteria() {
        let mut model = TimetableModel::new(TimetableParams::default());
        let room = add_room(&mut model, 1, 30);
        let preferred = RoomLocation::new(1, "R1", 30, -1)
            .with_room_constraint(room.room_constraint().unwrap());
        let (a, a_values) = add_lecture(
            &mut model,
            1,
            vec![
                (TimeLocation::new(MWF, 90, 12, 1), vec![preferred.clone()]),
                (TimeLocation::new(MWF, 120, 12, -1), vec![preferred.clone()]),
            ],
        );
        let (b, b_values) = add_lecture(
            &mut model,
            2,
            vec![(TimeLocation::new(MWF, 102, 12, 4), vec![preferred])],
        );
        model.initialize();

        let before = model.criteria().clone();
        let score = model.score();
        assert_eq!(score.hard_score, 2.0);

        model.assign(1, a_values[0]).unwrap();
        model.assign(2, b_values[0]).unwrap();
        assert_eq!(model.criteria().value(Criterion::TimePreferences), 5.0);
        assert_eq!(model.criteria().value(Criterion::RoomPreferences), -2.0);
        assert_eq!(model.score().hard_score, 0.0);

        model.assign(3, a_values[1]).unwrap();
        assert_eq!(model.criteria().value(Criterion::TimePreferences), 3.0);
        assert_eq!(model.timetable().assignment(a), Some(a_values[1]));

        model.unassign(4, a).unwrap();
        model.unassign(5, b).unwrap();
        for criterion in Criterion::ALL {
            assert!((model.criteria().value(criterion) - before.value(criterion)).abs() < 1e-9);
        }
        assert_eq!(model.score().hard_score, 2.0);
        assert!((model.score().soft_score - score.soft_score).abs() < 1e-9);
    }

    #[test]
    fn test_assign_rejects_foreign_placement() {
        let mut model = TimetableModel::new(TimetableParams::default());
        let (a, _) = add_lecture(&mut model, 1, vec![(time(MWF, 90, 12), vec![])]);
        let stray = model
            .timetable
            .push_placement(Placement::new(a, time(MWF, 102, 12), vec![]));

        assert_eq!(
            model.assign(0, stray),
            Err(TimetableError::PlacementNotOwned {
                placement: stray,
                lecture: a
            })
        );
        assert_eq!(
            model.assign(0, PlacementIdx::new(99)),
            Err(TimetableError::InvalidPlacement(PlacementIdx::new(99)))
        );
    }

    #[test]
    fn test_room_exclusion_through_the_model() {
        let mut model = TimetableModel::new(TimetableParams::default());
        let room = add_room(&mut model, 1, 30);
        let (_, a) = add_lecture(&mut model, 1, vec![(time(MWF, 90, 12), vec![room.clone()])]);
        let (_, b) = add_lecture(
            &mut model,
            2,
            vec![
                (time(MWF, 96, 12), vec![room.clone()]),
                (time(MWF, 102, 12), vec![room]),
            ],
        );
        let mut rng = MockRng::new(vec![0]);

        model.assign(0, a[0]).unwrap();
        assert!(!model.is_consistent(a[0], b[0]));
        assert!(model.is_consistent(a[0], b[1]));
        assert!(model.in_conflict(b[0]));
        assert!(!model.in_conflict(b[1]));

        let conflicts = model.conflict_values(b[0], &mut rng);
        assert_eq!(conflicts.len(), 1);
        assert!(conflicts.contains(&a[0]));
        assert!(model.conflict_values(b[1], &mut rng).is_empty());
    }

    #[test]
    fn test_enroll_builds_joint_enrollments() {
        let mut model = TimetableModel::new(TimetableParams::default());
        let (a, a_values) = add_lecture(&mut model, 1, vec![(time(MWF, 90, 12), vec![])]);
        let (b, b_values) = add_lecture(&mut model, 2, vec![(time(MWF, 96, 12), vec![])]);
        let first = model.add_student(Student::new(1));
        let second = model.add_student(Student::new(2));

        for student in [first, second] {
            model.enroll(student, a).unwrap();
            model.enroll(student, b).unwrap();
        }
        let jenrl = model.timetable().lecture(a).jenrl_constraint(b).unwrap();
        assert_eq!(model.timetable().lecture(b).jenrl_constraint(a), Some(jenrl));

        model.assign(0, a_values[0]).unwrap();
        assert_eq!(model.count_student_conflicts(b_values[0]), 2);
        model.assign(1, b_values[0]).unwrap();
        assert_eq!(model.criteria().value(Criterion::StudentConflicts), 2.0);

        model.unenroll(first, b).unwrap();
        assert_eq!(model.criteria().value(Criterion::StudentConflicts), 1.0);
        model.unenroll(second, b).unwrap();
        assert_eq!(model.criteria().value(Criterion::StudentConflicts), 0.0);
        assert_eq!(model.timetable().lecture(a).jenrl_constraint(b), None);
        assert!(!model.timetable().lecture(b).constraints().contains(&jenrl));
    }

    #[test]
    fn test_can_share_room_partners_are_wired() {
        let mut model = TimetableModel::new(TimetableParams::default());
        let (a, _) = add_lecture(&mut model, 1, vec![(time(MWF, 90, 12), vec![])]);
        let (b, _) = add_lecture(&mut model, 2, vec![(time(MWF, 90, 12), vec![])]);
        let (c, _) = add_lecture(&mut model, 3, vec![(time(MWF, 90, 12), vec![])]);
        let group = GroupConstraint::new(
            1,
            GroupConstraintType::CanShareRoom,
            Preference::Required,
            vec![a, b],
        );
        model.add_constraint(Constraint::Group(group)).unwrap();

        let lecture = model.timetable().lecture(a);
        assert!(lecture.can_share_room());
        assert!(lecture.can_share_room_with(a, b));
        assert!(!lecture.can_share_room_with(a, c));
    }

    #[test]
    fn test_add_constraint_with_unknown_lecture() {
        let mut model = TimetableModel::new(TimetableParams::default());
        let instructor = InstructorConstraint::new(1, "Smith", vec![LectureIdx::new(4)], false);

        assert_eq!(
            model.add_constraint(Constraint::Instructor(instructor)),
            Err(TimetableError::InvalidLecture(LectureIdx::new(4)))
        );
        assert!(model.constraints().is_empty());
    }

    #[test]
    fn test_score_analysis_counts_unassigned() {
        let mut model = TimetableModel::new(TimetableParams::default());
        add_lecture(&mut model, 1, vec![(time(MWF, 90, 12), vec![])]);

        let analysis = model.score_analysis();
        assert_eq!(analysis.scores["Unassigned"], Score::hard(1.0));
        assert_eq!(analysis.total_score().hard_score, 1.0);
    }

    #[test]
    fn test_room_combinations() {
        let rooms: Vec<RoomLocation> = (1..=4)
            .map(|id| RoomLocation::new(id, format!("R{id}"), id as usize * 10, 0))
            .collect();

        assert_eq!(room_combinations(&rooms, 2, 0).len(), 6);
        assert_eq!(room_combinations(&rooms, 2, 60).len(), 2);
        assert_eq!(room_combinations(&rooms, 5, 0).len(), 0);
    }
}
