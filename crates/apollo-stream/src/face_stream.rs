//! Per-face owner of the static index buffer and the per-frame staging slots.

use std::ops::Range;
use std::sync::Arc;

use apollo_quadsphere::{CubeFace, CullPolicy, FaceTree, Frustum, QuadSphereMesh};

use crate::device::INDEX_SIZE;
use crate::{DrawTarget, FrameSlot, IndexBufferDesc, IndexDevice, StreamError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Published {
    slot: usize,
    index_count: u32,
}

/// Streams the visible part of one face's index range to the GPU.
///
/// Every frame the face tree is queried on the CPU, the surviving index
/// ranges are gathered into a staging list, and the list is copied into one
/// of `frames_in_flight` GPU buffers. Each buffer is sized for the whole
/// face so a fully visible face always fits.
#[derive(Debug)]
pub struct FaceStream<B> {
    tree: FaceTree,
    mesh: Arc<QuadSphereMesh>,
    full: B,
    slots: Vec<B>,
    staged: Vec<u32>,
    ranges: Vec<Range<u32>>,
    culled_quads: u32,
    published: Option<Published>,
}

impl<B> FaceStream<B> {
    /// Allocate the full-resolution buffer and the staging slots, and upload
    /// the face's static indices.
    pub fn init<D>(
        device: &D,
        mesh: Arc<QuadSphereMesh>,
        tree: FaceTree,
        frames_in_flight: usize,
    ) -> Result<Self, StreamError>
    where
        D: IndexDevice<Buffer = B>,
    {
        let face = tree.face();
        let index_count = mesh.face_index_count();

        let full_label = format!("{}-full-indices", face.name());
        let full = device.create_index_buffer(&IndexBufferDesc {
            label: &full_label,
            index_count,
        })?;
        device.write_indices(&full, mesh.face_indices(face));

        let slots = (0..frames_in_flight.max(1))
            .map(|slot| {
                let label = format!("{}-visible-indices-{slot}", face.name());
                device.create_index_buffer(&IndexBufferDesc {
                    label: &label,
                    index_count,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            tree,
            mesh,
            full,
            slots,
            staged: Vec::with_capacity(index_count as usize),
            ranges: Vec::new(),
            culled_quads: 0,
            published: None,
        })
    }

    pub fn face(&self) -> CubeFace {
        self.tree.face()
    }

    pub fn tree(&self) -> &FaceTree {
        &self.tree
    }

    /// Quads owned by this face.
    pub fn total_quads(&self) -> u32 {
        self.tree.root().quad_count()
    }

    /// Gather this frame's visible indices. CPU only.
    ///
    /// Returns the number of culled quads.
    pub fn update_visibility(&mut self, frustum: &Frustum, policy: CullPolicy) -> u32 {
        self.staged.clear();
        self.ranges.clear();

        let indices = &self.mesh.indices;
        let staged = &mut self.staged;
        let ranges = &mut self.ranges;
        let counts = self.tree.query(frustum, policy, |range| {
            staged.extend_from_slice(&indices[range.start as usize..range.end as usize]);
            ranges.push(range);
        });

        self.culled_quads = counts.culled_quads;
        tracing::trace!(
            face = self.face().name(),
            ranges = self.ranges.len(),
            indices = self.staged.len(),
            culled = counts.culled_quads,
            visited = counts.visited_nodes,
            "face visibility updated"
        );
        counts.culled_quads
    }

    /// Index-array ranges gathered by the last update.
    pub fn visible_ranges(&self) -> &[Range<u32>] {
        &self.ranges
    }

    /// Indices gathered by the last update.
    pub fn staged_indices(&self) -> &[u32] {
        &self.staged
    }

    pub fn staged_index_count(&self) -> u32 {
        self.staged.len() as u32
    }

    pub fn staged_bytes(&self) -> u64 {
        u64::from(self.staged_index_count()) * INDEX_SIZE
    }

    /// Quads culled by the last update.
    pub fn culled_quads(&self) -> u32 {
        self.culled_quads
    }

    /// Copy the staged list into `slot` and make it the slot to draw.
    ///
    /// With nothing staged this writes nothing and clears the published
    /// slot, so the next [`FaceStream::draw`] is skipped.
    pub fn publish<D>(&mut self, device: &D, slot: &FrameSlot)
    where
        D: IndexDevice<Buffer = B>,
    {
        if self.staged.is_empty() {
            self.published = None;
            return;
        }
        device.write_indices(&self.slots[slot.index()], &self.staged);
        self.published = Some(Published {
            slot: slot.index(),
            index_count: self.staged_index_count(),
        });
    }

    /// Draw the most recently published slot, if any.
    pub fn draw<T: DrawTarget<B> + ?Sized>(&self, target: &mut T) {
        if let Some(published) = self.published {
            target.draw_indexed(&self.slots[published.slot], published.index_count);
        }
    }

    /// Draw the whole face from the static buffer.
    pub fn draw_full<T: DrawTarget<B> + ?Sized>(&self, target: &mut T) {
        target.draw_indexed(&self.full, self.mesh.face_index_count());
    }

    /// Slot and index count of the most recent publish.
    pub fn published(&self) -> Option<(usize, u32)> {
        self.published.map(|p| (p.slot, p.index_count))
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }
}
