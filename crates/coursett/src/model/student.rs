use std::collections::BTreeMap;

use fxhash::{FxHashMap, FxHashSet};

use crate::define_index_newtype;

use super::{lecture::LectureIdx, placement::PlacementIdx};

define_index_newtype!(ConfigurationIdx, Configuration);
define_index_newtype!(StudentIdx, Student);

/// One alternative structure of a course offering.
#[derive(Debug, Clone)]
pub struct Configuration {
    id: u64,
    offering_id: u64,
    limit: usize,
    top_lectures: BTreeMap<u64, Vec<LectureIdx>>,
}

impl Configuration {
    pub fn new(id: u64, offering_id: u64, limit: usize) -> Self {
        Configuration {
            id,
            offering_id,
            limit,
            top_lectures: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn offering_id(&self) -> u64 {
        self.offering_id
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Lectures without a parent, keyed by scheduling subpart.
    pub fn top_lectures(&self) -> &BTreeMap<u64, Vec<LectureIdx>> {
        &self.top_lectures
    }

    pub(crate) fn add_top_lecture(&mut self, subpart_id: u64, lecture: LectureIdx) {
        self.top_lectures.entry(subpart_id).or_default().push(lecture);
    }
}

#[derive(Debug, Clone)]
pub struct Student {
    id: u64,
    offerings: FxHashMap<u64, f64>,
    priorities: FxHashMap<u64, f64>,
    lectures: FxHashSet<LectureIdx>,
    configurations: FxHashSet<ConfigurationIdx>,
    can_not_enroll: FxHashMap<u64, FxHashSet<LectureIdx>>,
    committed_placements: Vec<PlacementIdx>,
}

impl Student {
    pub fn new(id: u64) -> Self {
        Student {
            id,
            offerings: FxHashMap::default(),
            priorities: FxHashMap::default(),
            lectures: FxHashSet::default(),
            configurations: FxHashSet::default(),
            can_not_enroll: FxHashMap::default(),
            committed_placements: Vec::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn add_offering(&mut self, offering_id: u64, weight: f64) -> &mut Self {
        self.offerings.insert(offering_id, weight);
        self
    }

    pub fn add_offering_with_priority(
        &mut self,
        offering_id: u64,
        weight: f64,
        priority: f64,
    ) -> &mut Self {
        self.offerings.insert(offering_id, weight);
        self.priorities.insert(offering_id, priority);
        self
    }

    pub fn has_offering(&self, offering_id: u64) -> bool {
        self.offerings.contains_key(&offering_id)
    }

    /// Weight of the offering for this student, 0 if not requested.
    pub fn offering_weight(&self, offering_id: Option<u64>) -> f64 {
        match offering_id {
            None => 1.0,
            Some(id) => self.offerings.get(&id).copied().unwrap_or(0.0),
        }
    }

    pub fn priority(&self, offering_id: Option<u64>) -> Option<f64> {
        offering_id.and_then(|id| self.priorities.get(&id).copied())
    }

    /// Contribution of this student to the joint enrollment of two lectures
    /// of the given offerings.
    pub fn jenrl_weight(&self, offering1: Option<u64>, offering2: Option<u64>) -> f64 {
        (self.offering_weight(offering1) * self.offering_weight(offering2)).sqrt()
    }

    pub fn conflicting_priority(&self, offering1: Option<u64>, offering2: Option<u64>) -> Option<f64> {
        let p1 = self.priority(offering1)?;
        let p2 = self.priority(offering2)?;
        Some(p1.min(p2))
    }

    pub fn lectures(&self) -> &FxHashSet<LectureIdx> {
        &self.lectures
    }

    pub fn configurations(&self) -> &FxHashSet<ConfigurationIdx> {
        &self.configurations
    }

    pub fn add_can_not_enroll(&mut self, offering_id: u64, lecture: LectureIdx) -> &mut Self {
        self.can_not_enroll
            .entry(offering_id)
            .or_default()
            .insert(lecture);
        self
    }

    pub fn can_not_enroll(&self, offering_id: u64) -> Option<&FxHashSet<LectureIdx>> {
        self.can_not_enroll.get(&offering_id)
    }

    pub fn add_committed_placement(&mut self, placement: PlacementIdx) -> &mut Self {
        self.committed_placements.push(placement);
        self
    }

    pub fn committed_placements(&self) -> &[PlacementIdx] {
        &self.committed_placements
    }

    pub(crate) fn add_lecture(&mut self, lecture: LectureIdx) -> bool {
        self.lectures.insert(lecture)
    }

    pub(crate) fn remove_lecture(&mut self, lecture: LectureIdx) -> bool {
        self.lectures.remove(&lecture)
    }

    pub(crate) fn add_configuration(&mut self, configuration: ConfigurationIdx) {
        self.configurations.insert(configuration);
    }

    pub(crate) fn remove_configuration(&mut self, configuration: ConfigurationIdx) {
        self.configurations.remove(&configuration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jenrl_weight_is_geometric_mean() {
        let mut student = Student::new(1);
        student.add_offering(10, 1.0).add_offering(20, 0.25);

        assert_eq!(student.jenrl_weight(Some(10), Some(20)), 0.5);
        assert_eq!(student.jenrl_weight(Some(10), None), 1.0);
        assert_eq!(student.jenrl_weight(Some(10), Some(30)), 0.0);
    }

    #[test]
    fn test_conflicting_priority_takes_the_lower() {
        let mut student = Student::new(1);
        student
            .add_offering_with_priority(10, 1.0, 2.0)
            .add_offering_with_priority(20, 1.0, 0.5)
            .add_offering(30, 1.0);

        assert_eq!(student.conflicting_priority(Some(10), Some(20)), Some(0.5));
        assert_eq!(student.conflicting_priority(Some(10), Some(30)), None);
    }
}
