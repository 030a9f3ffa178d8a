pub mod activity;
pub mod class_state;
pub mod half_term;
pub mod lesson;
pub mod lesson_number;
pub mod plan;
pub mod unit;
