//! Audio module - platform streams and sample buffering
//!
//! This module provides:
//! - The backend seam over cpal input/output streams
//! - Lock-free sample buffers for leaving the real-time callback

mod backend;
mod buffer;
#[cfg(test)]
pub(crate) mod mock;

pub use backend::{
    AudioBackend, CpalBackend, InputCallback, RenderCallback, StreamControl, StreamHandle,
    StreamInfo,
};
pub use buffer::{sample_buffer, RollingWindow, SampleConsumer, SampleProducer};
