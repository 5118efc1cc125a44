//! The seams between the streams and the renderer.
//!
//! The streams never talk to a graphics API directly. They allocate and fill
//! index buffers through an [`IndexDevice`] and issue draws into a
//! [`DrawTarget`]. The wgpu backend and the headless recorder implement both.

use crate::StreamError;

/// Bytes per index (`u32`).
pub const INDEX_SIZE: u64 = std::mem::size_of::<u32>() as u64;

/// Description of an index buffer to allocate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexBufferDesc<'a> {
    pub label: &'a str,
    /// Capacity in indices.
    pub index_count: u32,
}

impl IndexBufferDesc<'_> {
    /// Capacity in bytes.
    pub fn size_bytes(&self) -> u64 {
        u64::from(self.index_count) * INDEX_SIZE
    }
}

/// Allocates index buffers and uploads index data into them.
pub trait IndexDevice {
    type Buffer;

    /// Allocate a buffer able to hold `desc.index_count` indices.
    fn create_index_buffer(&self, desc: &IndexBufferDesc<'_>) -> Result<Self::Buffer, StreamError>;

    /// Overwrite the start of `buffer` with `indices`.
    ///
    /// `indices` never exceeds the capacity the buffer was created with.
    fn write_indices(&self, buffer: &Self::Buffer, indices: &[u32]);
}

/// Receives indexed draws of quad patches.
pub trait DrawTarget<B> {
    /// Draw the first `index_count` indices of `buffer`.
    fn draw_indexed(&mut self, buffer: &B, index_count: u32);
}
