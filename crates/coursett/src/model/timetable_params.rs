use crate::{error::TimetableError, parsers::properties::Properties};

use super::{
    constants::{DAY_SLOTS_FIRST, DAY_SLOTS_LAST, NR_DAYS_WEEK},
    criteria::{Criteria, Criterion},
    distance_metric::{DistanceMetric, Ellipsoid},
};

/// Every tunable knob of the timetabling model.
#[derive(Clone, Debug)]
pub struct TimetableParams {
    pub spread_factor: f64,
    pub spread_unassignments_to_weaken: usize,
    pub spread_use_most_improvement_adepts: bool,
    pub department_spread_factor: f64,
    pub department_unassignments_to_weaken: usize,

    pub interactive_mode: bool,
    pub allow_break_hard: bool,
    pub first_day_slot: usize,
    pub last_day_slot: usize,
    pub first_work_day: usize,
    pub last_work_day: usize,

    pub forward_check_max_depth: usize,
    pub forward_check_max_domain_size: usize,
    pub can_fill_max_lengths: usize,

    pub day_of_week_offset: usize,
    pub precedence_consider_date_patterns: bool,

    pub ellipsoid: Ellipsoid,
    pub speed: Option<f64>,
    pub instructor_no_preference_limit: Option<f64>,
    pub instructor_discouraged_limit: Option<f64>,
    pub instructor_prohibited_limit: Option<f64>,
    pub null_distance: Option<f64>,
    pub max_travel_distance_in_minutes: usize,
    pub compute_distance_conflicts_between_non_btb_classes: bool,

    pub jenrl_max_conflicts: f64,
    pub jenrl_max_conflicts_weaken: f64,

    pub min_groups_unassignments_to_weaken: usize,
    pub min_rooms_unassignments_to_weaken: usize,

    pub criterion_weights: [f64; Criterion::COUNT],
}

impl Default for TimetableParams {
    fn default() -> Self {
        TimetableParams {
            spread_factor: 1.2,
            spread_unassignments_to_weaken: 250,
            spread_use_most_improvement_adepts: false,
            department_spread_factor: 1.2,
            department_unassignments_to_weaken: 250,
            interactive_mode: false,
            allow_break_hard: false,
            first_day_slot: DAY_SLOTS_FIRST,
            last_day_slot: DAY_SLOTS_LAST,
            first_work_day: 0,
            last_work_day: NR_DAYS_WEEK - 1,
            forward_check_max_depth: 2,
            forward_check_max_domain_size: 1000,
            can_fill_max_lengths: 16,
            day_of_week_offset: 0,
            precedence_consider_date_patterns: true,
            ellipsoid: Ellipsoid::Legacy,
            speed: None,
            instructor_no_preference_limit: None,
            instructor_discouraged_limit: None,
            instructor_prohibited_limit: None,
            null_distance: None,
            max_travel_distance_in_minutes: 60,
            compute_distance_conflicts_between_non_btb_classes: false,
            jenrl_max_conflicts: 1.0,
            jenrl_max_conflicts_weaken: 0.001,
            min_groups_unassignments_to_weaken: 250,
            min_rooms_unassignments_to_weaken: 250,
            criterion_weights: Criterion::ALL
                .map(|criterion| criterion.scaled_weight(criterion.default_weight())),
        }
    }
}

impl TimetableParams {
    pub fn from_properties(properties: &Properties) -> Result<Self, TimetableError> {
        let defaults = TimetableParams::default();

        let ellipsoid = match properties.get("Distances.Ellipsoid") {
            Some(value) => value.parse()?,
            None => defaults.ellipsoid,
        };

        let optional = |key: &str| -> Result<Option<f64>, TimetableError> {
            if properties.contains(key) {
                properties.get_or(key, 0.0).map(Some)
            } else {
                Ok(None)
            }
        };

        let mut criterion_weights = defaults.criterion_weights;
        for criterion in Criterion::ALL {
            criterion_weights[criterion as usize] = criterion
                .scaled_weight(properties.get_or(criterion.weight_key(), criterion.default_weight())?);
        }

        Ok(TimetableParams {
            spread_factor: properties.get_or("Spread.SpreadFactor", defaults.spread_factor)?,
            spread_unassignments_to_weaken: properties.get_or(
                "Spread.Unassignments2Weaken",
                defaults.spread_unassignments_to_weaken,
            )?,
            spread_use_most_improvement_adepts: properties.get_bool(
                "Spread.UseMostImprovementAdepts",
                defaults.spread_use_most_improvement_adepts,
            )?,
            department_spread_factor: properties
                .get_or("DeptBalancing.SpreadFactor", defaults.department_spread_factor)?,
            department_unassignments_to_weaken: properties.get_or(
                "DeptBalancing.Unassignments2Weaken",
                defaults.department_unassignments_to_weaken,
            )?,
            interactive_mode: properties
                .get_bool("General.InteractiveMode", defaults.interactive_mode)?,
            allow_break_hard: properties
                .get_bool("General.AllowBreakHard", defaults.allow_break_hard)?,
            first_day_slot: properties.get_or("General.FirstDaySlot", defaults.first_day_slot)?,
            last_day_slot: properties.get_or("General.LastDaySlot", defaults.last_day_slot)?,
            first_work_day: properties.get_or("General.FirstWorkDay", defaults.first_work_day)?,
            last_work_day: properties.get_or("General.LastWorkDay", defaults.last_work_day)?,
            forward_check_max_depth: properties
                .get_or("ForwardCheck.MaxDepth", defaults.forward_check_max_depth)?,
            forward_check_max_domain_size: properties.get_or(
                "ForwardCheck.MaxDomainSize",
                defaults.forward_check_max_domain_size,
            )?,
            can_fill_max_lengths: properties.get_or(
                "GroupConstraint.CanFillMaxLengths",
                defaults.can_fill_max_lengths,
            )?,
            day_of_week_offset: properties
                .get_or("DatePattern.DayOfWeekOffset", defaults.day_of_week_offset)?,
            precedence_consider_date_patterns: properties.get_bool(
                "Precedence.ConsiderDatePatterns",
                defaults.precedence_consider_date_patterns,
            )?,
            ellipsoid,
            speed: optional("Distances.Speed")?,
            instructor_no_preference_limit: optional("Instructor.NoPreferenceLimit")?,
            instructor_discouraged_limit: optional("Instructor.DiscouragedLimit")?,
            instructor_prohibited_limit: optional("Instructor.ProhibitedLimit")?,
            null_distance: optional("Distances.NullDistance")?,
            max_travel_distance_in_minutes: properties.get_or(
                "Distances.MaxTravelDistanceInMinutes",
                defaults.max_travel_distance_in_minutes,
            )?,
            compute_distance_conflicts_between_non_btb_classes: properties.get_bool(
                "Distances.ComputeDistanceConflictsBetweenNonBTBClasses",
                defaults.compute_distance_conflicts_between_non_btb_classes,
            )?,
            jenrl_max_conflicts: properties
                .get_or("General.JenrlMaxConflicts", defaults.jenrl_max_conflicts)?,
            jenrl_max_conflicts_weaken: properties.get_or(
                "General.JenrlMaxConflictsWeaken",
                defaults.jenrl_max_conflicts_weaken,
            )?,
            min_groups_unassignments_to_weaken: properties.get_or(
                "MinimizeNumberOfUsedGroupsOfTime.Unassignments2Weaken",
                defaults.min_groups_unassignments_to_weaken,
            )?,
            min_rooms_unassignments_to_weaken: properties.get_or(
                "MinimizeNumberOfUsedRooms.Unassignments2Weaken",
                defaults.min_rooms_unassignments_to_weaken,
            )?,
            criterion_weights,
        })
    }

    /// Distance metric configured by the `Distances.*` and `Instructor.*` keys.
    pub fn distance_metric(&self) -> DistanceMetric {
        let mut metric = DistanceMetric::new(self.ellipsoid);
        if let Some(speed) = self.speed {
            metric.set_speed(speed);
        }
        if let Some(null_distance) = self.null_distance {
            metric.set_null_distance(null_distance);
        }
        let no_preference = self
            .instructor_no_preference_limit
            .unwrap_or(metric.instructor_no_preference_limit());
        let discouraged = self
            .instructor_discouraged_limit
            .unwrap_or(metric.instructor_discouraged_limit());
        let prohibited = self
            .instructor_prohibited_limit
            .unwrap_or(metric.instructor_prohibited_limit());
        metric
            .set_instructor_limits(no_preference, discouraged, prohibited)
            .set_max_travel_time(self.max_travel_distance_in_minutes)
            .set_compute_distance_conflicts_between_non_btb_classes(
                self.compute_distance_conflicts_between_non_btb_classes,
            );
        metric
    }

    pub fn criteria(&self) -> Criteria {
        Criteria::new(self.criterion_weights)
    }

    /// Spread weakening is disabled in interactive mode.
    pub fn effective_spread_unassignments_to_weaken(&self) -> usize {
        if self.interactive_mode {
            0
        } else {
            self.spread_unassignments_to_weaken
        }
    }

    pub fn effective_department_unassignments_to_weaken(&self) -> usize {
        if self.interactive_mode {
            0
        } else {
            self.department_unassignments_to_weaken
        }
    }
}
