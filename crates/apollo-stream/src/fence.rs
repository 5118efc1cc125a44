//! Monotonic frame fences.
//!
//! The CPU signals a new value after submitting each frame. The consumer
//! completes values in order once it has finished reading that frame's
//! buffers. Waiting on a value blocks until it is completed.

use std::sync::{Condvar, Mutex, PoisonError};

/// A monotonically increasing completion counter shared with a consumer.
pub trait FrameFence {
    /// Allocate the next fence value for the work just submitted.
    fn signal(&self) -> u64;

    /// Highest value the consumer has finished with.
    fn completed_value(&self) -> u64;

    /// Block until `completed_value() >= value`.
    fn wait_until(&self, value: u64);
}

#[derive(Debug, Default)]
struct FenceState {
    signalled: u64,
    completed: u64,
}

/// Fence completed by a CPU thread standing in for the GPU.
#[derive(Debug, Default)]
pub struct CpuFence {
    state: Mutex<FenceState>,
    completed: Condvar,
}

impl CpuFence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark every value up to `value` as finished and wake waiters.
    ///
    /// Completing a value lower than the current one has no effect.
    pub fn complete(&self, value: u64) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if value > state.completed {
            state.completed = value;
            self.completed.notify_all();
        }
    }

    /// Highest value handed out by [`FrameFence::signal`].
    pub fn signalled_value(&self) -> u64 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .signalled
    }
}

impl FrameFence for CpuFence {
    fn signal(&self) -> u64 {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.signalled += 1;
        state.signalled
    }

    fn completed_value(&self) -> u64 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .completed
    }

    fn wait_until(&self, value: u64) {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let _state = self
            .completed
            .wait_while(state, |s| s.completed < value)
            .unwrap_or_else(PoisonError::into_inner);
    }
}
