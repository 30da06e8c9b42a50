use std::fmt;

use smallvec::SmallVec;

use crate::define_index_newtype;

use super::{
    constants::{PREFERENCE_LEVEL_PROHIBITED, PREFERENCE_PROHIBITED},
    distance_metric::DistanceMetric,
    lecture::LectureIdx,
    preference::PreferenceCombination,
    room_location::RoomLocation,
    time_location::TimeLocation,
};

define_index_newtype!(PlacementIdx, Placement);

/// One value of a lecture's domain: a time and the rooms used at that time.
#[derive(Debug, Clone)]
pub struct Placement {
    lecture: LectureIdx,
    time: TimeLocation,
    rooms: SmallVec<[RoomLocation; 1]>,
}

impl Placement {
    pub fn new(
        lecture: LectureIdx,
        time: TimeLocation,
        rooms: impl IntoIterator<Item = RoomLocation>,
    ) -> Self {
        Placement {
            lecture,
            time,
            rooms: rooms.into_iter().collect(),
        }
    }

    pub fn lecture(&self) -> LectureIdx {
        self.lecture
    }

    pub fn time_location(&self) -> &TimeLocation {
        &self.time
    }

    pub fn rooms(&self) -> &[RoomLocation] {
        &self.rooms
    }

    pub fn room(&self) -> Option<&RoomLocation> {
        self.rooms.first()
    }

    pub fn nr_rooms(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_multi_room(&self) -> bool {
        self.rooms.len() > 1
    }

    pub fn has_room(&self, room_id: u64) -> bool {
        self.rooms.iter().any(|room| room.id() == room_id)
    }

    pub fn room_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.rooms.iter().map(RoomLocation::id)
    }

    /// Both placements use exactly the same set of rooms.
    pub fn same_rooms(&self, other: &Placement) -> bool {
        self.rooms.len() == other.rooms.len()
            && self.rooms.iter().all(|room| other.rooms.contains(room))
    }

    /// At least one enforced room is used by both placements.
    pub fn share_rooms(&self, other: &Placement) -> bool {
        self.rooms
            .iter()
            .filter(|room| room.room_constraint().is_some())
            .any(|room| other.rooms.contains(room))
    }

    pub fn same_time(&self, other: &Placement) -> bool {
        self.time == other.time
    }

    pub fn nr_different_rooms(&self, other: &Placement) -> usize {
        self.rooms
            .iter()
            .filter(|room| !other.rooms.contains(room))
            .count()
    }

    pub fn nr_different_buildings(&self, other: &Placement) -> usize {
        self.rooms
            .iter()
            .filter(|room| {
                !other
                    .rooms
                    .iter()
                    .any(|o| o.building_id() == room.building_id())
            })
            .count()
    }

    pub fn sum_room_preference(&self) -> i32 {
        self.rooms.iter().map(RoomLocation::preference).sum()
    }

    pub fn room_preference(&self) -> i32 {
        let mut combination = PreferenceCombination::default();
        for room in &self.rooms {
            combination.add_level(room.preference());
        }
        combination.level()
    }

    pub fn is_room_prohibited(&self) -> bool {
        self.rooms
            .iter()
            .any(|room| room.preference() == PREFERENCE_LEVEL_PROHIBITED)
    }

    pub fn is_time_prohibited(&self) -> bool {
        self.time.preference() == PREFERENCE_LEVEL_PROHIBITED
    }

    /// Total seating capacity of all rooms.
    pub fn room_size(&self) -> usize {
        self.rooms.iter().map(RoomLocation::size).sum()
    }

    /// Capacity of the smallest room, 0 without rooms.
    pub fn min_room_size(&self) -> usize {
        self.rooms.iter().map(RoomLocation::size).min().unwrap_or(0)
    }

    /// Largest distance between any room of `self` and any room of `other`.
    pub fn distance_in_meters(&self, metric: &DistanceMetric, other: &Placement) -> f64 {
        self.rooms
            .iter()
            .flat_map(|r1| other.rooms.iter().map(move |r2| r1.distance_in_meters(metric, r2)))
            .fold(0.0, f64::max)
    }

    pub fn distance_in_minutes(&self, metric: &DistanceMetric, other: &Placement) -> usize {
        self.rooms
            .iter()
            .flat_map(|r1| other.rooms.iter().map(move |r2| r1.distance_in_minutes(metric, r2)))
            .max()
            .unwrap_or(0)
    }

    pub fn room_names(&self) -> String {
        self.rooms
            .iter()
            .map(RoomLocation::name)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.time, self.room_names())?;
        if self.is_time_prohibited() || self.is_room_prohibited() {
            write!(f, " ({PREFERENCE_PROHIBITED})")?;
        }
        Ok(())
    }
}
