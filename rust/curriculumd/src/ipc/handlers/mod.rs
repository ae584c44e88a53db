pub mod core;
pub mod coverage;
pub mod curriculum;
pub mod planner;
pub mod setup;
