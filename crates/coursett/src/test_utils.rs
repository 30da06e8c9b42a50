use rand::RngCore;

use crate::{
    constraints::{constraint::Constraint, room_constraint::RoomConstraint},
    model::{
        lecture::{LectureBuilder, LectureIdx},
        placement::{Placement, PlacementIdx},
        room_location::RoomLocation,
        time_location::TimeLocation,
        timetable_model::TimetableModel,
    },
};

pub const MONDAY: u32 = 64;
pub const TUESDAY: u32 = 32;
pub const WEDNESDAY: u32 = 16;
pub const THURSDAY: u32 = 8;
pub const FRIDAY: u32 = 4;
pub const MWF: u32 = MONDAY | WEDNESDAY | FRIDAY;
pub const TTH: u32 = TUESDAY | THURSDAY;

pub fn time(day_code: u32, start_slot: usize, length: usize) -> TimeLocation {
    TimeLocation::new(day_code, start_slot, length, 0)
}

/// Registers a room constraint and returns a room location bound to it.
pub fn add_room(model: &mut TimetableModel, id: u64, size: usize) -> RoomLocation {
    let name = format!("R{id}");
    let constraint = model
        .add_constraint(Constraint::Room(RoomConstraint::new(id, name.clone(), size)))
        .unwrap();
    RoomLocation::new(id, name, size, 0).with_room_constraint(constraint)
}

/// Adds a lecture with a class limit of 10 whose domain is exactly the given
/// placements.
pub fn add_lecture(
    model: &mut TimetableModel,
    id: u64,
    placements: Vec<(TimeLocation, Vec<RoomLocation>)>,
) -> (LectureIdx, Vec<PlacementIdx>) {
    let mut builder = LectureBuilder::default();
    builder.set_id(id).set_class_limit(10);
    add_built_lecture(model, builder, placements)
}

pub fn add_built_lecture(
    model: &mut TimetableModel,
    mut builder: LectureBuilder,
    placements: Vec<(TimeLocation, Vec<RoomLocation>)>,
) -> (LectureIdx, Vec<PlacementIdx>) {
    let mut times: Vec<TimeLocation> = Vec::new();
    let mut rooms: Vec<RoomLocation> = Vec::new();
    for (time, placement_rooms) in &placements {
        if !times.contains(time) {
            times.push(time.clone());
        }
        for room in placement_rooms {
            if !rooms.contains(room) {
                rooms.push(room.clone());
            }
        }
    }
    builder.set_time_locations(times).set_room_locations(rooms);

    let lecture = model.add_lecture(builder.build()).unwrap();
    let values = placements
        .into_iter()
        .map(|(time, rooms)| {
            model
                .add_placement(Placement::new(lecture, time, rooms))
                .unwrap()
        })
        .collect();
    (lecture, values)
}

pub struct MockRng {
    data: Vec<u64>,
    index: usize,
}

impl MockRng {
    pub fn new(data: Vec<u64>) -> Self {
        MockRng { data, index: 0 }
    }
}

impl RngCore for MockRng {
    fn next_u32(&mut self) -> u32 {
        self.next_u64() as u32
    }

    fn next_u64(&mut self) -> u64 {
        let value = self.data[self.index % self.data.len()];
        self.index = (self.index + 1) % self.data.len();
        value
    }

    fn fill_bytes(&mut self, dst: &mut [u8]) {
        for byte in dst.iter_mut() {
            *byte = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::Rng;

    use super::*;

    #[test]
    fn test_mock_rng() {
        let data = vec![1, 2, 3, 4];
        let mut rng = MockRng::new(data.clone());

        for &expected in data.iter().cycle().take(8) {
            let value = rng.next_u64();
            assert_eq!(value, expected);
        }
    }

    #[test]
    fn test_random_bool() {
        let data = vec![
            (u64::MAX / 4),
            (u64::MAX / 4),
            (u64::MAX / 4),
            (u64::MAX / 4),
        ];
        let mut rng = MockRng::new(data);

        assert!(!rng.random_bool(0.20));
        assert!(rng.random_bool(0.26));
        assert!(rng.random_bool(0.6));
        assert!(!rng.random_bool(0.10));
    }

    #[test]
    fn test_add_lecture_collects_times_and_rooms() {
        let mut model = TimetableModel::new(Default::default());
        let room = add_room(&mut model, 1, 30);
        let (lecture, values) = add_lecture(
            &mut model,
            7,
            vec![
                (time(MWF, 90, 12), vec![room.clone()]),
                (time(TTH, 90, 18), vec![room]),
            ],
        );

        let lecture = model.timetable().lecture(lecture);
        assert_eq!(lecture.time_locations().len(), 2);
        assert_eq!(lecture.room_locations().len(), 1);
        assert_eq!(lecture.values(), values.as_slice());
    }
}
