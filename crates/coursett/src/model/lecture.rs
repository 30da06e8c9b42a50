use std::collections::BTreeMap;

use fxhash::{FxHashMap, FxHashSet};

use crate::{constraints::constraint::ConstraintIdx, define_index_newtype};

use super::{
    constants::{
        PREFERENCE_LEVEL_DISCOURAGED, PREFERENCE_LEVEL_NEUTRAL, PREFERENCE_LEVEL_PROHIBITED,
        PREFERENCE_LEVEL_STRONGLY_DISCOURAGED,
    },
    placement::{Placement, PlacementIdx},
    room_location::RoomLocation,
    student::{ConfigurationIdx, StudentIdx},
    time_location::TimeLocation,
};

define_index_newtype!(LectureIdx, Lecture);

/// Rooms with a minimal preference above this level are not considered when
/// estimating room sizes.
const ROOM_SIZE_PREFERENCE_CAP: i32 = PREFERENCE_LEVEL_PROHIBITED / 2;

/// A class to be placed in time and space.
#[derive(Debug, Clone)]
pub struct Lecture {
    id: u64,
    name: String,
    scheduling_subpart_id: Option<u64>,
    department: Option<u64>,
    min_class_limit: usize,
    max_class_limit: usize,
    room_to_limit_ratio: f64,
    nr_rooms: usize,
    committed: bool,
    weight: f64,
    discouraged_room_size: Option<usize>,
    strongly_discouraged_room_size: Option<usize>,
    time_locations: Vec<TimeLocation>,
    room_locations: Vec<RoomLocation>,
    parent: Option<LectureIdx>,
    configuration: Option<ConfigurationIdx>,

    values: Vec<PlacementIdx>,
    children: BTreeMap<u64, Vec<LectureIdx>>,
    students: FxHashSet<StudentIdx>,
    constraints: Vec<ConstraintIdx>,
    group_constraints: Vec<ConstraintIdx>,
    can_share_room_constraints: Vec<ConstraintIdx>,
    instructor_constraints: Vec<ConstraintIdx>,
    spread_constraints: Vec<ConstraintIdx>,
    department_spread_constraint: Option<ConstraintIdx>,
    class_limit_constraint: Option<ConstraintIdx>,
    jenrl_constraints: FxHashMap<LectureIdx, ConstraintIdx>,
    room_sharing_partners: FxHashSet<LectureIdx>,
}

impl Lecture {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scheduling_subpart_id(&self) -> Option<u64> {
        self.scheduling_subpart_id
    }

    pub fn department(&self) -> Option<u64> {
        self.department
    }

    pub fn min_class_limit(&self) -> usize {
        self.min_class_limit
    }

    pub fn max_class_limit(&self) -> usize {
        self.max_class_limit
    }

    pub fn room_to_limit_ratio(&self) -> f64 {
        self.room_to_limit_ratio
    }

    pub fn nr_rooms(&self) -> usize {
        self.nr_rooms
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn time_locations(&self) -> &[TimeLocation] {
        &self.time_locations
    }

    pub fn room_locations(&self) -> &[RoomLocation] {
        &self.room_locations
    }

    pub fn parent(&self) -> Option<LectureIdx> {
        self.parent
    }

    pub fn configuration(&self) -> Option<ConfigurationIdx> {
        self.configuration
    }

    /// Domain of the lecture.
    pub fn values(&self) -> &[PlacementIdx] {
        &self.values
    }

    pub fn nr_values(&self) -> usize {
        self.values.len()
    }

    pub fn has_any_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Child lectures keyed by their scheduling subpart.
    pub fn children(&self) -> &BTreeMap<u64, Vec<LectureIdx>> {
        &self.children
    }

    pub fn students(&self) -> &FxHashSet<StudentIdx> {
        &self.students
    }

    pub fn constraints(&self) -> &[ConstraintIdx] {
        &self.constraints
    }

    pub fn group_constraints(&self) -> &[ConstraintIdx] {
        &self.group_constraints
    }

    pub fn can_share_room_constraints(&self) -> &[ConstraintIdx] {
        &self.can_share_room_constraints
    }

    pub fn instructor_constraints(&self) -> &[ConstraintIdx] {
        &self.instructor_constraints
    }

    pub fn spread_constraints(&self) -> &[ConstraintIdx] {
        &self.spread_constraints
    }

    pub fn department_spread_constraint(&self) -> Option<ConstraintIdx> {
        self.department_spread_constraint
    }

    pub fn class_limit_constraint(&self) -> Option<ConstraintIdx> {
        self.class_limit_constraint
    }

    pub fn jenrl_constraints(&self) -> &FxHashMap<LectureIdx, ConstraintIdx> {
        &self.jenrl_constraints
    }

    pub fn jenrl_constraint(&self, other: LectureIdx) -> Option<ConstraintIdx> {
        self.jenrl_constraints.get(&other).copied()
    }

    pub fn can_share_room(&self) -> bool {
        !self.can_share_room_constraints.is_empty()
    }

    pub fn can_share_room_with(&self, self_idx: LectureIdx, other: LectureIdx) -> bool {
        self_idx == other || self.room_sharing_partners.contains(&other)
    }

    pub fn min_room_use(&self) -> usize {
        self.room_use(self.min_class_limit)
    }

    pub fn max_room_use(&self) -> usize {
        self.room_use(self.max_class_limit)
    }

    fn room_use(&self, limit: usize) -> usize {
        if self.nr_rooms == 0 {
            0
        } else {
            (limit as f64 * self.room_to_limit_ratio).round() as usize
        }
    }

    /// Size of the smallest usable room, or of the `nr_rooms`-th smallest for
    /// multi-room lectures.
    pub fn min_room_size(&self) -> usize {
        let mut sizes = self.usable_room_sizes();
        sizes.sort_unstable();
        self.pick_room_size(&sizes)
    }

    /// Size of the largest usable room, or of the `nr_rooms`-th largest for
    /// multi-room lectures.
    pub fn max_room_size(&self) -> usize {
        let mut sizes = self.usable_room_sizes();
        sizes.sort_unstable_by(|a, b| b.cmp(a));
        self.pick_room_size(&sizes)
    }

    fn usable_room_sizes(&self) -> Vec<usize> {
        self.room_locations
            .iter()
            .filter(|room| room.preference() <= ROOM_SIZE_PREFERENCE_CAP)
            .map(RoomLocation::size)
            .collect()
    }

    fn pick_room_size(&self, sorted: &[usize]) -> usize {
        if sorted.is_empty() {
            return 0;
        }
        let index = self.nr_rooms.max(1).min(sorted.len()) - 1;
        sorted[index]
    }

    /// Class limit achievable with the given total room capacity.
    pub fn class_limit_for_room_size(&self, room_size: usize) -> usize {
        if self.room_to_limit_ratio <= 0.0 {
            return self.max_class_limit;
        }
        self.max_class_limit
            .min((room_size as f64 / self.room_to_limit_ratio).floor() as usize)
    }

    pub fn too_big_room_preference(&self, placement: &Placement) -> i32 {
        let size = placement.room_size();
        match (self.strongly_discouraged_room_size, self.discouraged_room_size) {
            (Some(limit), _) if size > limit => PREFERENCE_LEVEL_STRONGLY_DISCOURAGED,
            (_, Some(limit)) if size > limit => PREFERENCE_LEVEL_DISCOURAGED,
            _ => PREFERENCE_LEVEL_NEUTRAL,
        }
    }

    pub(crate) fn set_values(&mut self, values: Vec<PlacementIdx>) {
        self.values = values;
    }

    pub(crate) fn push_value(&mut self, placement: PlacementIdx) {
        self.values.push(placement);
    }

    pub(crate) fn add_child(&mut self, subpart_id: u64, child: LectureIdx) {
        self.children.entry(subpart_id).or_default().push(child);
    }

    pub(crate) fn set_configuration(&mut self, configuration: ConfigurationIdx) {
        self.configuration = Some(configuration);
    }

    pub(crate) fn add_student(&mut self, student: StudentIdx) -> bool {
        self.students.insert(student)
    }

    pub(crate) fn remove_student(&mut self, student: StudentIdx) -> bool {
        self.students.remove(&student)
    }

    pub(crate) fn add_constraint(&mut self, constraint: ConstraintIdx) {
        self.constraints.push(constraint);
    }

    pub(crate) fn remove_constraint(&mut self, constraint: ConstraintIdx) {
        self.constraints.retain(|&c| c != constraint);
    }

    pub(crate) fn add_group_constraint(&mut self, constraint: ConstraintIdx) {
        self.group_constraints.push(constraint);
    }

    pub(crate) fn add_can_share_room_constraint(
        &mut self,
        constraint: ConstraintIdx,
        partners: impl IntoIterator<Item = LectureIdx>,
    ) {
        self.can_share_room_constraints.push(constraint);
        self.room_sharing_partners.extend(partners);
    }

    pub(crate) fn add_instructor_constraint(&mut self, constraint: ConstraintIdx) {
        self.instructor_constraints.push(constraint);
    }

    pub(crate) fn add_spread_constraint(&mut self, constraint: ConstraintIdx) {
        self.spread_constraints.push(constraint);
    }

    pub(crate) fn set_department_spread_constraint(&mut self, constraint: ConstraintIdx) {
        self.department_spread_constraint = Some(constraint);
    }

    pub(crate) fn set_class_limit_constraint(&mut self, constraint: ConstraintIdx) {
        self.class_limit_constraint = Some(constraint);
    }

    pub(crate) fn add_jenrl_constraint(&mut self, other: LectureIdx, constraint: ConstraintIdx) {
        self.jenrl_constraints.insert(other, constraint);
    }

    pub(crate) fn remove_jenrl_constraint(&mut self, other: LectureIdx) -> Option<ConstraintIdx> {
        self.jenrl_constraints.remove(&other)
    }
}

#[derive(Default)]
pub struct LectureBuilder {
    id: Option<u64>,
    name: Option<String>,
    scheduling_subpart_id: Option<u64>,
    department: Option<u64>,
    min_class_limit: Option<usize>,
    max_class_limit: Option<usize>,
    room_to_limit_ratio: Option<f64>,
    nr_rooms: Option<usize>,
    committed: Option<bool>,
    weight: Option<f64>,
    discouraged_room_size: Option<usize>,
    strongly_discouraged_room_size: Option<usize>,
    time_locations: Option<Vec<TimeLocation>>,
    room_locations: Option<Vec<RoomLocation>>,
    parent: Option<LectureIdx>,
    configuration: Option<ConfigurationIdx>,
}

impl LectureBuilder {
    pub fn set_id(&mut self, id: u64) -> &mut LectureBuilder {
        self.id = Some(id);
        self
    }

    pub fn set_name(&mut self, name: impl Into<String>) -> &mut LectureBuilder {
        self.name = Some(name.into());
        self
    }

    pub fn set_scheduling_subpart_id(&mut self, subpart_id: u64) -> &mut LectureBuilder {
        self.scheduling_subpart_id = Some(subpart_id);
        self
    }

    pub fn set_department(&mut self, department: u64) -> &mut LectureBuilder {
        self.department = Some(department);
        self
    }

    pub fn set_class_limit(&mut self, limit: usize) -> &mut LectureBuilder {
        self.min_class_limit = Some(limit);
        self.max_class_limit = Some(limit);
        self
    }

    pub fn set_class_limits(&mut self, min: usize, max: usize) -> &mut LectureBuilder {
        self.min_class_limit = Some(min);
        self.max_class_limit = Some(max.max(min));
        self
    }

    pub fn set_room_to_limit_ratio(&mut self, ratio: f64) -> &mut LectureBuilder {
        self.room_to_limit_ratio = Some(ratio);
        self
    }

    pub fn set_nr_rooms(&mut self, nr_rooms: usize) -> &mut LectureBuilder {
        self.nr_rooms = Some(nr_rooms);
        self
    }

    pub fn set_committed(&mut self, committed: bool) -> &mut LectureBuilder {
        self.committed = Some(committed);
        self
    }

    pub fn set_weight(&mut self, weight: f64) -> &mut LectureBuilder {
        self.weight = Some(weight);
        self
    }

    pub fn set_too_big_room_sizes(
        &mut self,
        discouraged: usize,
        strongly_discouraged: usize,
    ) -> &mut LectureBuilder {
        self.discouraged_room_size = Some(discouraged);
        self.strongly_discouraged_room_size = Some(strongly_discouraged);
        self
    }

    pub fn set_time_locations(&mut self, times: Vec<TimeLocation>) -> &mut LectureBuilder {
        self.time_locations = Some(times);
        self
    }

    pub fn set_room_locations(&mut self, rooms: Vec<RoomLocation>) -> &mut LectureBuilder {
        self.room_locations = Some(rooms);
        self
    }

    pub fn set_parent(&mut self, parent: LectureIdx) -> &mut LectureBuilder {
        self.parent = Some(parent);
        self
    }

    pub fn set_configuration(&mut self, configuration: ConfigurationIdx) -> &mut LectureBuilder {
        self.configuration = Some(configuration);
        self
    }

    pub fn build(self) -> Lecture {
        let room_locations = self.room_locations.unwrap_or_default();
        let nr_rooms = self
            .nr_rooms
            .unwrap_or(if room_locations.is_empty() { 0 } else { 1 });
        let id = self.id.unwrap_or(0);
        Lecture {
            id,
            name: self.name.unwrap_or_else(|| format!("Class {id}")),
            scheduling_subpart_id: self.scheduling_subpart_id,
            department: self.department,
            min_class_limit: self.min_class_limit.unwrap_or(0),
            max_class_limit: self.max_class_limit.unwrap_or(0),
            room_to_limit_ratio: self.room_to_limit_ratio.unwrap_or(1.0),
            nr_rooms,
            committed: self.committed.unwrap_or(false),
            weight: self.weight.unwrap_or(1.0),
            discouraged_room_size: self.discouraged_room_size,
            strongly_discouraged_room_size: self.strongly_discouraged_room_size,
            time_locations: self.time_locations.unwrap_or_default(),
            room_locations,
            parent: self.parent,
            configuration: self.configuration,
            values: Vec::new(),
            children: BTreeMap::new(),
            students: FxHashSet::default(),
            constraints: Vec::new(),
            group_constraints: Vec::new(),
            can_share_room_constraints: Vec::new(),
            instructor_constraints: Vec::new(),
            spread_constraints: Vec::new(),
            department_spread_constraint: None,
            class_limit_constraint: None,
            jenrl_constraints: FxHashMap::default(),
            room_sharing_partners: FxHashSet::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lecture(nr_rooms: usize, rooms: Vec<RoomLocation>) -> Lecture {
        let mut builder = LectureBuilder::default();
        builder
            .set_id(1)
            .set_class_limits(20, 30)
            .set_room_to_limit_ratio(1.2)
            .set_nr_rooms(nr_rooms)
            .set_room_locations(rooms);
        builder.build()
    }

    fn rooms() -> Vec<RoomLocation> {
        vec![
            RoomLocation::new(1, "A", 40, 0),
            RoomLocation::new(2, "B", 25, -1),
            RoomLocation::new(3, "C", 60, 1),
            RoomLocation::new(4, "D", 100, PREFERENCE_LEVEL_PROHIBITED),
        ]
    }

    #[test]
    fn test_room_use_is_rounded() {
        let lecture = lecture(1, rooms());
        assert_eq!(lecture.min_room_use(), 24);
        assert_eq!(lecture.max_room_use(), 36);

        let roomless = lecture_without_rooms();
        assert_eq!(roomless.min_room_use(), 0);
        assert_eq!(roomless.max_room_use(), 0);
    }

    fn lecture_without_rooms() -> Lecture {
        let mut builder = LectureBuilder::default();
        builder.set_class_limit(15);
        builder.build()
    }

    #[test]
    fn test_room_sizes_skip_prohibited_rooms() {
        let single = lecture(1, rooms());
        assert_eq!(single.min_room_size(), 25);
        assert_eq!(single.max_room_size(), 60);

        let double = lecture(2, rooms());
        assert_eq!(double.min_room_size(), 40);
        assert_eq!(double.max_room_size(), 40);
    }

    #[test]
    fn test_class_limit_for_room_size() {
        let mut builder = LectureBuilder::default();
        builder.set_class_limits(20, 30).set_room_to_limit_ratio(1.5);
        let lecture = builder.build();

        assert_eq!(lecture.class_limit_for_room_size(30), 20);
        assert_eq!(lecture.class_limit_for_room_size(31), 20);
        assert_eq!(lecture.class_limit_for_room_size(100), 30);
    }

    #[test]
    fn test_too_big_room_preference() {
        let mut builder = LectureBuilder::default();
        builder.set_too_big_room_sizes(30, 50);
        let lecture = builder.build();
        let placement = |size| {
            Placement::new(
                LectureIdx::new(0),
                TimeLocation::new(64, 90, 12, 0),
                vec![RoomLocation::new(1, "R", size, 0)],
            )
        };

        assert_eq!(lecture.too_big_room_preference(&placement(20)), PREFERENCE_LEVEL_NEUTRAL);
        assert_eq!(lecture.too_big_room_preference(&placement(40)), PREFERENCE_LEVEL_DISCOURAGED);
        assert_eq!(
            lecture.too_big_room_preference(&placement(60)),
            PREFERENCE_LEVEL_STRONGLY_DISCOURAGED
        );
    }
}
