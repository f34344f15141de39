pub mod analyze;
pub mod swings;
pub mod trace;
