pub mod constants;
pub mod criteria;
pub mod distance_metric;
pub mod lecture;
pub mod placement;
pub mod preference;
pub mod room_location;
pub mod score;
pub mod student;
pub mod time_location;
pub mod timetable_model;
pub mod timetable_params;
