//! Thin HTTP pass-through to the control loop and the trajectory store.

pub mod api;
mod error;
pub mod server;
pub mod state;

pub use error::WebError;
pub use server::{router, run_server};
pub use state::AppState;
