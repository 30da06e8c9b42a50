pub mod class_limit_constraint;
pub mod constraint;
pub mod department_spread_constraint;
pub mod group_constraint;
pub mod group_constraint_type;
pub mod instructor_constraint;
pub mod jenrl_constraint;
pub mod minimize_number_of_used_groups_of_time;
pub mod minimize_number_of_used_rooms;
pub mod room_constraint;
pub mod spread_constraint;
