//! Per-frame streaming of visible quad-sphere indices.
//!
//! Every frame the six [`FaceStream`]s query their face trees on the CPU, stage
//! the surviving index ranges, and copy them into one of N GPU buffers. A
//! [`FrameFence`] gates reuse of each buffer until the frame that last read it
//! has completed.

mod device;
mod error;
mod face_stream;
mod fence;
mod recording;
mod slots;
mod streams;
mod wgpu_backend;

pub use device::{DrawTarget, INDEX_SIZE, IndexBufferDesc, IndexDevice};
pub use error::StreamError;
pub use face_stream::FaceStream;
pub use fence::{CpuFence, FrameFence};
pub use recording::{DrawCall, RecordedBuffer, RecordingDevice, RecordingTarget};
pub use slots::{FrameSlot, FrameSlots};
pub use streams::{FaceStreams, FrameStats};
pub use wgpu_backend::{QueueFence, WgpuIndexDevice, vertex_layout};
