use geo::Point;

use crate::constraints::constraint::ConstraintIdx;

use super::distance_metric::DistanceMetric;

/// A candidate room of a lecture together with the lecture's preference for it.
#[derive(Debug, Clone)]
pub struct RoomLocation {
    id: u64,
    name: String,
    building_id: Option<u64>,
    preference: i32,
    size: usize,
    position: Option<Point>,
    ignore_too_far: bool,
    room_constraint: Option<ConstraintIdx>,
}

impl RoomLocation {
    pub fn new(id: u64, name: impl Into<String>, size: usize, preference: i32) -> Self {
        RoomLocation {
            id,
            name: name.into(),
            building_id: None,
            preference,
            size,
            position: None,
            ignore_too_far: false,
            room_constraint: None,
        }
    }

    pub fn with_building(mut self, building_id: u64) -> Self {
        self.building_id = Some(building_id);
        self
    }

    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.position = Some(Point::new(x, y));
        self
    }

    pub fn with_ignore_too_far(mut self, ignore_too_far: bool) -> Self {
        self.ignore_too_far = ignore_too_far;
        self
    }

    pub fn with_room_constraint(mut self, room_constraint: ConstraintIdx) -> Self {
        self.room_constraint = Some(room_constraint);
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn building_id(&self) -> Option<u64> {
        self.building_id
    }

    pub fn preference(&self) -> i32 {
        self.preference
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn position(&self) -> Option<Point> {
        self.position
    }

    pub fn ignore_too_far(&self) -> bool {
        self.ignore_too_far
    }

    pub fn room_constraint(&self) -> Option<ConstraintIdx> {
        self.room_constraint
    }

    pub fn distance_in_meters(&self, metric: &DistanceMetric, other: &RoomLocation) -> f64 {
        if self.id == other.id || self.ignore_too_far || other.ignore_too_far {
            return 0.0;
        }
        metric.distance_in_meters(self.id, self.position, other.id, other.position)
    }

    pub fn distance_in_minutes(&self, metric: &DistanceMetric, other: &RoomLocation) -> usize {
        if self.id == other.id || self.ignore_too_far || other.ignore_too_far {
            return 0;
        }
        metric.distance_in_minutes(self.id, self.position, other.id, other.position)
    }
}

impl PartialEq for RoomLocation {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for RoomLocation {}

#[cfg(test)]
mod tests {
    use crate::model::distance_metric::Ellipsoid;

    use super::*;

    #[test]
    fn test_equality_is_by_id() {
        let a = RoomLocation::new(1, "EE 117", 40, 0);
        let b = RoomLocation::new(1, "EE 117 (alias)", 60, 4);
        let c = RoomLocation::new(2, "EE 117", 40, 0);

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_ignore_too_far() {
        let metric = DistanceMetric::new(Ellipsoid::Legacy);
        let a = RoomLocation::new(1, "A", 40, 0).with_position(0.0, 0.0);
        let b = RoomLocation::new(2, "B", 40, 0).with_position(30.0, 40.0);
        let c = b.clone().with_ignore_too_far(true);

        assert!((a.distance_in_meters(&metric, &b) - 50.0).abs() < 1e-9);
        assert_eq!(a.distance_in_meters(&metric, &c), 0.0);
        assert_eq!(a.distance_in_minutes(&metric, &a), 0);
    }
}
