pub mod error;
pub mod passes;
pub mod schedule;
pub mod tracking;
