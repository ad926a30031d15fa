//! Small helpers shared across the garupa crates.

pub mod text;
pub mod time;
