//! Per-pass tracking state machine and the guards and actions it shares
//! with the queue coordinator.

mod actions;
mod context;
mod controller;
mod error;
mod guards;
mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use actions::Actuator;
pub use context::{PassContext, PrepareProgress};
pub use controller::TrackingController;
pub use error::TrackingError;
pub(crate) use guards::span;
pub use guards::{
    preparation_phase, refresh_progress, time_window, train_arrived, train_stabilized, Arrival,
    ArrivalMonitor, TimeWindow, TransitionGate,
};
pub use state::{PreparePhase, TrackingState};
