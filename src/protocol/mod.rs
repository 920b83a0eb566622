//! Firmware link frames and the data paths that fill them.

mod cache;
mod error;
mod framer;
mod frames;

pub use cache::{CachedSample, TrackingDataCache};
pub use error::ProtocolError;
pub use framer::{sample_index_at, ProtocolFramer, INITIAL_BURST_LEN};
pub use frames::{
    BurstKind, BurstSample, DataBurst, FrameTimestamp, HeaderFrame, MAX_BURST_SAMPLES,
};
