use std::str::FromStr;

use fxhash::FxHashMap;
use geo::{Distance, Euclidean, Geodesic, Point};
use parking_lot::RwLock;
use serde::Serialize;

use crate::error::TimetableError;

/// Coordinate system of room positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Ellipsoid {
    /// Plain euclidean grid, one unit is ten meters. Negative coordinates are unknown.
    Legacy,
    /// Latitude (x) and longitude (y) on the WGS-84 ellipsoid.
    Wgs84,
}

impl FromStr for Ellipsoid {
    type Err = TimetableError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "LEGACY" => Ok(Ellipsoid::Legacy),
            "WGS84" => Ok(Ellipsoid::Wgs84),
            other => Err(TimetableError::InvalidProperty {
                key: String::from("Distances.Ellipsoid"),
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug)]
pub struct DistanceMetric {
    ellipsoid: Ellipsoid,
    /// Meters per minute.
    speed: f64,
    instructor_no_preference_limit: f64,
    instructor_discouraged_limit: f64,
    instructor_prohibited_limit: f64,
    null_distance: f64,
    max_travel_time: usize,
    compute_distance_conflicts_between_non_btb_classes: bool,
    travel_times: FxHashMap<(u64, u64), usize>,
    cache: RwLock<FxHashMap<[u64; 4], f64>>,
}

impl DistanceMetric {
    pub fn new(ellipsoid: Ellipsoid) -> Self {
        match ellipsoid {
            Ellipsoid::Legacy => DistanceMetric {
                ellipsoid,
                speed: 100.0 / 15.0,
                instructor_no_preference_limit: 0.0,
                instructor_discouraged_limit: 5.0,
                instructor_prohibited_limit: 20.0,
                null_distance: 1000.0,
                max_travel_time: 60,
                compute_distance_conflicts_between_non_btb_classes: false,
                travel_times: FxHashMap::default(),
                cache: RwLock::new(FxHashMap::default()),
            },
            Ellipsoid::Wgs84 => DistanceMetric {
                ellipsoid,
                speed: 1000.0 / 15.0,
                instructor_no_preference_limit: 0.0,
                instructor_discouraged_limit: 50.0,
                instructor_prohibited_limit: 200.0,
                null_distance: 10000.0,
                max_travel_time: 60,
                compute_distance_conflicts_between_non_btb_classes: false,
                travel_times: FxHashMap::default(),
                cache: RwLock::new(FxHashMap::default()),
            },
        }
    }

    pub fn set_speed(&mut self, speed: f64) -> &mut Self {
        self.speed = speed;
        self
    }

    pub fn set_instructor_limits(
        &mut self,
        no_preference: f64,
        discouraged: f64,
        prohibited: f64,
    ) -> &mut Self {
        self.instructor_no_preference_limit = no_preference;
        self.instructor_discouraged_limit = discouraged;
        self.instructor_prohibited_limit = prohibited;
        self
    }

    pub fn set_null_distance(&mut self, null_distance: f64) -> &mut Self {
        self.null_distance = null_distance;
        self
    }

    pub fn set_max_travel_time(&mut self, minutes: usize) -> &mut Self {
        self.max_travel_time = minutes;
        self
    }

    pub fn set_compute_distance_conflicts_between_non_btb_classes(
        &mut self,
        enabled: bool,
    ) -> &mut Self {
        self.compute_distance_conflicts_between_non_btb_classes = enabled;
        self
    }

    pub fn ellipsoid(&self) -> Ellipsoid {
        self.ellipsoid
    }

    pub fn is_legacy(&self) -> bool {
        self.ellipsoid == Ellipsoid::Legacy
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn instructor_no_preference_limit(&self) -> f64 {
        self.instructor_no_preference_limit
    }

    pub fn instructor_discouraged_limit(&self) -> f64 {
        self.instructor_discouraged_limit
    }

    pub fn instructor_prohibited_limit(&self) -> f64 {
        self.instructor_prohibited_limit
    }

    pub fn null_distance(&self) -> f64 {
        self.null_distance
    }

    pub fn max_travel_distance_in_minutes(&self) -> usize {
        self.max_travel_time
    }

    pub fn compute_distance_conflicts_between_non_btb_classes(&self) -> bool {
        self.compute_distance_conflicts_between_non_btb_classes
    }

    pub fn minutes_to_meters(&self, minutes: usize) -> f64 {
        self.speed * minutes as f64
    }

    /// Registers a travel time that overrides the coordinates of both rooms.
    pub fn add_travel_time(&mut self, room1: u64, room2: u64, minutes: usize) {
        self.travel_times
            .insert((room1.min(room2), room1.max(room2)), minutes);
    }

    pub fn travel_time_in_minutes(&self, room1: u64, room2: u64) -> Option<usize> {
        self.travel_times
            .get(&(room1.min(room2), room1.max(room2)))
            .copied()
    }

    pub fn distance_between_points(&self, from: Option<Point>, to: Option<Point>) -> f64 {
        let (Some(from), Some(to)) = (from, to) else {
            return self.null_distance;
        };
        if from == to {
            return 0.0;
        }

        match self.ellipsoid {
            Ellipsoid::Legacy => {
                if from.x() < 0.0 || from.y() < 0.0 || to.x() < 0.0 || to.y() < 0.0 {
                    return self.null_distance;
                }
                Euclidean.distance(&from, &to)
            }
            Ellipsoid::Wgs84 => {
                let key = if (from.x(), from.y()) <= (to.x(), to.y()) {
                    [from.x(), from.y(), to.x(), to.y()].map(f64::to_bits)
                } else {
                    [to.x(), to.y(), from.x(), from.y()].map(f64::to_bits)
                };
                if let Some(&distance) = self.cache.read().get(&key) {
                    return distance;
                }
                // points are stored as (latitude, longitude)
                let distance = Geodesic.distance(
                    Point::new(from.y(), from.x()),
                    Point::new(to.y(), to.x()),
                );
                self.cache.write().insert(key, distance);
                distance
            }
        }
    }

    pub fn distance_in_meters(
        &self,
        room1: u64,
        position1: Option<Point>,
        room2: u64,
        position2: Option<Point>,
    ) -> f64 {
        if let Some(minutes) = self.travel_time_in_minutes(room1, room2) {
            return self.minutes_to_meters(minutes);
        }
        self.distance_between_points(position1, position2)
    }

    pub fn distance_in_minutes(
        &self,
        room1: u64,
        position1: Option<Point>,
        room2: u64,
        position2: Option<Point>,
    ) -> usize {
        if let Some(minutes) = self.travel_time_in_minutes(room1, room2) {
            return minutes;
        }
        if position1.is_none() || position2.is_none() {
            return self.max_travel_time;
        }
        let minutes = (self.distance_between_points(position1, position2) / self.speed).round();
        (minutes as usize).min(self.max_travel_time)
    }
}

impl Default for DistanceMetric {
    fn default() -> Self {
        DistanceMetric::new(Ellipsoid::Legacy)
    }
}

impl Clone for DistanceMetric {
    fn clone(&self) -> Self {
        DistanceMetric {
            ellipsoid: self.ellipsoid,
            speed: self.speed,
            instructor_no_preference_limit: self.instructor_no_preference_limit,
            instructor_discouraged_limit: self.instructor_discouraged_limit,
            instructor_prohibited_limit: self.instructor_prohibited_limit,
            null_distance: self.null_distance,
            max_travel_time: self.max_travel_time,
            compute_distance_conflicts_between_non_btb_classes: self
                .compute_distance_conflicts_between_non_btb_classes,
            travel_times: self.travel_times.clone(),
            cache: RwLock::new(self.cache.read().clone()),
        }
    }
}
