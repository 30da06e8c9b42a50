use std::hint::black_box;

use coursett::{
    constraints::{
        constraint::Constraint,
        group_constraint::GroupConstraint,
        group_constraint_type::GroupConstraintType,
        room_constraint::RoomConstraint,
        spread_constraint::SpreadConstraint,
    },
    model::{
        lecture::LectureBuilder,
        placement::PlacementIdx,
        preference::Preference,
        room_location::RoomLocation,
        time_location::TimeLocation,
        timetable_model::TimetableModel,
        timetable_params::TimetableParams,
    },
};
use criterion::{Criterion, criterion_group, criterion_main};
use rand::{SeedableRng, rngs::SmallRng};

const NR_ROOMS: u64 = 8;
const NR_LECTURES: u64 = 60;

/// Lectures on MWF or TTH between 7:30 and 15:30 in any of the rooms, half
/// assigned, with a spread and a few back-to-back groups.
fn build_model() -> (TimetableModel, Vec<PlacementIdx>) {
    let mut model = TimetableModel::new(TimetableParams::default());
    let rooms: Vec<RoomLocation> = (1..=NR_ROOMS)
        .map(|id| {
            let name = format!("R{id}");
            let constraint = model
                .add_constraint(Constraint::Room(RoomConstraint::new(id, name.clone(), 40)))
                .unwrap();
            RoomLocation::new(id, name, 40, 0).with_room_constraint(constraint)
        })
        .collect();

    let times: Vec<TimeLocation> = (0..8)
        .flat_map(|hour| {
            let start = 90 + hour * 12;
            [
                TimeLocation::new(64 | 16 | 4, start, 12, 0),
                TimeLocation::new(32 | 8, start, 18, 0),
            ]
        })
        .collect();

    let mut lectures = Vec::new();
    for id in 1..=NR_LECTURES {
        let mut builder = LectureBuilder::default();
        builder
            .set_id(id)
            .set_class_limit(30)
            .set_time_locations(times.clone())
            .set_room_locations(rooms.clone());
        let lecture = model.add_lecture(builder.build()).unwrap();
        model.compute_values(lecture).unwrap();
        lectures.push(lecture);
    }

    for (id, pair) in lectures.chunks(2).enumerate() {
        let group = GroupConstraint::new(
            id as u64,
            GroupConstraintType::Btb,
            Preference::Soft(-1),
            pair.to_vec(),
        );
        model.add_constraint(Constraint::Group(group)).unwrap();
    }
    let spread = SpreadConstraint::new("All", lectures.clone(), model.timetable().params());
    model.add_constraint(Constraint::Spread(spread)).unwrap();
    model.initialize();

    let mut values = Vec::new();
    for (iteration, &lecture) in lectures.iter().enumerate() {
        let domain = model.timetable().lecture(lecture).values().to_vec();
        let value = domain[(iteration * 7) % domain.len()];
        if iteration % 2 == 0 {
            model.assign(iteration as u64, value).unwrap();
        }
        values.extend(domain.into_iter().step_by(5));
    }
    (model, values)
}

fn conflicts_benchmark(c: &mut Criterion) {
    let (model, values) = build_model();
    let mut rng = SmallRng::seed_from_u64(7);

    c.bench_function("conflict values", |b| {
        b.iter(|| {
            for &value in &values {
                black_box(model.conflict_values(black_box(value), &mut rng));
            }
        })
    });

    c.bench_function("in conflict", |b| {
        b.iter(|| {
            for &value in &values {
                black_box(model.in_conflict(black_box(value)));
            }
        })
    });
}

fn assignment_benchmark(c: &mut Criterion) {
    let (model, values) = build_model();

    c.bench_function("assign and unassign", |b| {
        b.iter_batched(
            || model.clone(),
            |mut model| {
                for (iteration, &value) in values.iter().enumerate().take(50) {
                    let lecture = model.timetable().placement(value).lecture();
                    model.assign(iteration as u64, value).unwrap();
                    model.unassign(iteration as u64, lecture).unwrap();
                }
                model
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, conflicts_benchmark, assignment_benchmark);
criterion_main!(benches);
