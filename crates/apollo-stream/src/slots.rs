//! Ring of per-frame staging slots gated by fence values.

use crate::FrameFence;

/// Proof that a staging slot is free for writing.
///
/// Only [`FrameSlots::acquire`] and [`FrameSlots::try_acquire`] hand these
/// out, after the fence has confirmed that no in-flight frame still reads
/// the slot.
#[derive(Debug, PartialEq, Eq)]
pub struct FrameSlot {
    index: usize,
}

impl FrameSlot {
    pub fn index(&self) -> usize {
        self.index
    }
}

/// N staging slots reused round-robin.
///
/// Each slot remembers the fence value signalled after the last frame that
/// wrote it. A slot is reused only once that value has completed.
#[derive(Debug, Clone)]
pub struct FrameSlots {
    retire_values: Vec<u64>,
    next: usize,
}

impl FrameSlots {
    /// A ring of `count` slots, all initially free. `count` is at least 1.
    pub fn new(count: usize) -> Self {
        Self {
            retire_values: vec![0; count.max(1)],
            next: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.retire_values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.retire_values.is_empty()
    }

    /// Index of the slot the next acquire will return.
    pub fn next_index(&self) -> usize {
        self.next
    }

    /// Fence value that must complete before the next slot is free.
    pub fn next_required_value(&self) -> u64 {
        self.retire_values[self.next]
    }

    /// Take the next slot, blocking on `fence` until it is free.
    pub fn acquire<F: FrameFence + ?Sized>(&mut self, fence: &F) -> FrameSlot {
        let required = self.next_required_value();
        if fence.completed_value() < required {
            tracing::trace!(slot = self.next, required, "waiting for frame slot");
            fence.wait_until(required);
        }
        self.advance()
    }

    /// Take the next slot only if it is already free.
    pub fn try_acquire<F: FrameFence + ?Sized>(&mut self, fence: &F) -> Option<FrameSlot> {
        (fence.completed_value() >= self.next_required_value()).then(|| self.advance())
    }

    /// Record that the frame written through `slot` completes at `fence_value`.
    pub fn retire(&mut self, slot: FrameSlot, fence_value: u64) {
        self.retire_values[slot.index] = fence_value;
    }

    /// Highest fence value any slot is waiting on.
    pub fn max_retire_value(&self) -> u64 {
        self.retire_values.iter().copied().max().unwrap_or(0)
    }

    fn advance(&mut self) -> FrameSlot {
        let index = self.next;
        self.next = (index + 1) % self.retire_values.len();
        FrameSlot { index }
    }
}
