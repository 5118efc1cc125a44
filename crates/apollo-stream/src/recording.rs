//! A headless [`IndexDevice`] that keeps buffers in memory and records draws.
//!
//! Used by the demo when no GPU is requested and by the tests to inspect
//! exactly what would have reached the GPU.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::{DrawTarget, IndexBufferDesc, IndexDevice, StreamError};

/// An index buffer held in host memory.
#[derive(Debug)]
pub struct RecordedBuffer {
    id: u32,
    label: String,
    capacity: u32,
    contents: Mutex<Vec<u32>>,
}

impl RecordedBuffer {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Capacity in indices.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// A copy of the indices written so far.
    pub fn contents(&self) -> Vec<u32> {
        self.contents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// In-memory device with an optional per-buffer size limit.
///
/// [`RecordingDevice::mark_lost`] makes every later allocation fail the way
/// a lost GPU device does.
#[derive(Debug)]
pub struct RecordingDevice {
    max_buffer_bytes: u64,
    lost: AtomicBool,
    next_id: AtomicU32,
    bytes_allocated: AtomicU64,
    bytes_written: AtomicU64,
    writes: AtomicU64,
}

impl Default for RecordingDevice {
    fn default() -> Self {
        Self::with_limit(u64::MAX)
    }
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// A device rejecting buffers larger than `max_buffer_bytes`.
    pub fn with_limit(max_buffer_bytes: u64) -> Self {
        Self {
            max_buffer_bytes,
            lost: AtomicBool::new(false),
            next_id: AtomicU32::new(0),
            bytes_allocated: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    pub fn mark_lost(&self) {
        self.lost.store(true, Ordering::Release);
    }

    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    pub fn buffers_created(&self) -> u32 {
        self.next_id.load(Ordering::Relaxed)
    }

    pub fn bytes_allocated(&self) -> u64 {
        self.bytes_allocated.load(Ordering::Relaxed)
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    /// Number of `write_indices` calls.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }
}

impl IndexDevice for RecordingDevice {
    type Buffer = RecordedBuffer;

    fn create_index_buffer(&self, desc: &IndexBufferDesc<'_>) -> Result<RecordedBuffer, StreamError> {
        if self.is_lost() {
            return Err(StreamError::DeviceLost);
        }
        let size = desc.size_bytes();
        if size > self.max_buffer_bytes {
            return Err(StreamError::BufferTooLarge {
                label: desc.label.to_owned(),
                size,
                limit: self.max_buffer_bytes,
            });
        }
        self.bytes_allocated.fetch_add(size, Ordering::Relaxed);
        Ok(RecordedBuffer {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            label: desc.label.to_owned(),
            capacity: desc.index_count,
            contents: Mutex::new(Vec::new()),
        })
    }

    fn write_indices(&self, buffer: &RecordedBuffer, indices: &[u32]) {
        debug_assert!(indices.len() <= buffer.capacity as usize);
        let mut contents = buffer
            .contents
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        contents.clear();
        contents.extend_from_slice(indices);
        self.bytes_written
            .fetch_add(std::mem::size_of_val(indices) as u64, Ordering::Relaxed);
        self.writes.fetch_add(1, Ordering::Relaxed);
    }
}

/// One recorded draw call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DrawCall {
    pub buffer_id: u32,
    pub index_count: u32,
    /// The indices the draw reads, captured at draw time.
    pub indices: Vec<u32>,
}

/// Records every draw it receives.
#[derive(Clone, Debug, Default)]
pub struct RecordingTarget {
    pub draws: Vec<DrawCall>,
}

impl RecordingTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sum of the index counts of all recorded draws.
    pub fn total_indices(&self) -> u64 {
        self.draws.iter().map(|d| u64::from(d.index_count)).sum()
    }

    pub fn clear(&mut self) {
        self.draws.clear();
    }
}

impl DrawTarget<RecordedBuffer> for RecordingTarget {
    fn draw_indexed(&mut self, buffer: &RecordedBuffer, index_count: u32) {
        let contents = buffer.contents.lock().unwrap_or_else(PoisonError::into_inner);
        let end = (index_count as usize).min(contents.len());
        self.draws.push(DrawCall {
            buffer_id: buffer.id,
            index_count,
            indices: contents[..end].to_vec(),
        });
    }
}
