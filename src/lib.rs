//! Real-time control core of a satellite-tracking antenna ground station:
//! trajectory generation with keyhole mitigation, the per-pass and
//! multi-pass tracking state machines, and firmware frame building.

pub mod config;
pub mod hardware;
pub mod predict;
pub mod protocol;
pub mod scheduler;
pub mod tracker;
pub mod trajectory;
pub mod web;
