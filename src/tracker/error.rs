use thiserror::Error;

use crate::hardware::LinkError;
use crate::protocol::ProtocolError;

#[derive(Debug, Error)]
pub enum TrackingError {
    #[error("pass {0} not found")]
    PassNotFound(u64),
    #[error("pass {0} has no samples")]
    EmptyPass(u64),
    #[error("no pass is active")]
    NoActivePass,
    #[error("none of the requested passes can still be tracked")]
    EmptyQueue,
    #[error("link error: {0}")]
    Link(#[from] LinkError),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("control loop is not running")]
    ControlLoopClosed,
}
