//! The six face streams, their shared slot ring, and per-frame stats.

use std::sync::Arc;

use apollo_config::Config;
use apollo_quadsphere::{
    CubeFace, CullPolicy, FaceTree, Frustum, MeshBuilder, QuadSphereMesh, TreeParams,
};
use rayon::prelude::*;

use crate::{DrawTarget, FaceStream, FrameFence, FrameSlot, FrameSlots, IndexDevice, StreamError};

/// Quad counts for one frame.
///
/// `culled_quads` counts the quads of every subtree rejected by the frustum.
/// A coarse node whose children were all rejected still draws its own range,
/// so [`FrameStats::drawn_indices`] can exceed `4 * rendered_quads()`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub total_quads: u32,
    pub culled_quads: u32,
    /// Indices actually staged for drawing.
    pub drawn_indices: u32,
}

impl FrameStats {
    pub fn rendered_quads(&self) -> u32 {
        self.total_quads.saturating_sub(self.culled_quads)
    }

    pub fn rendered_triangles(&self) -> u32 {
        self.rendered_quads() * 2
    }

    pub fn culled_percent(&self) -> f32 {
        if self.total_quads == 0 {
            return 0.0;
        }
        self.culled_quads as f32 / self.total_quads as f32 * 100.0
    }
}

/// Everything the frame loop needs to stream the quad-sphere.
#[derive(Debug)]
pub struct FaceStreams<B> {
    mesh: Arc<QuadSphereMesh>,
    faces: Vec<FaceStream<B>>,
    slots: FrameSlots,
    current: Option<FrameSlot>,
    policy: CullPolicy,
    culling_enabled: bool,
    last_signalled: u64,
    stats: FrameStats,
    empty_frames: u32,
}

impl<B> FaceStreams<B> {
    /// Build the mesh and face trees from `config` and allocate all buffers.
    pub fn new<D>(device: &D, config: &Config) -> Result<Self, StreamError>
    where
        D: IndexDevice<Buffer = B>,
    {
        config.validate()?;
        let sphere = &config.sphere;

        let mut mesh = MeshBuilder::new(sphere.edge_length, sphere.max_subdivision_depth).build()?;
        let params = TreeParams {
            radius: sphere.radius(),
            max_node_level: sphere.node_level_limit(),
            attribute_level: sphere.attribute_level,
        };
        let trees = CubeFace::ALL
            .iter()
            .map(|&face| FaceTree::build(face, &mut mesh, &params))
            .collect::<Result<Vec<_>, _>>()?;

        let mesh = Arc::new(mesh);
        let frames_in_flight = config.frames.frames_in_flight as usize;
        let faces = trees
            .into_iter()
            .map(|tree| FaceStream::init(device, Arc::clone(&mesh), tree, frames_in_flight))
            .collect::<Result<Vec<_>, _>>()?;

        let bytes_per_face = u64::from(mesh.face_index_count()) * crate::device::INDEX_SIZE;
        tracing::info!(
            faces = faces.len(),
            frames_in_flight,
            bytes_per_face,
            total_bytes = bytes_per_face * (frames_in_flight as u64 + 1) * faces.len() as u64,
            "allocated face index streams"
        );

        Ok(Self {
            faces,
            slots: FrameSlots::new(frames_in_flight),
            current: None,
            policy: CullPolicy {
                never_cull_below_level: config.culling.never_cull_below_level,
            },
            culling_enabled: config.culling.enabled,
            last_signalled: 0,
            empty_frames: 0,
            stats: FrameStats {
                total_quads: mesh.total_quad_count(),
                ..FrameStats::default()
            },
            mesh,
        })
    }

    pub fn mesh(&self) -> &QuadSphereMesh {
        &self.mesh
    }

    /// Streams in [`CubeFace::ALL`] order.
    pub fn faces(&self) -> &[FaceStream<B>] {
        &self.faces
    }

    pub fn face(&self, face: CubeFace) -> &FaceStream<B> {
        &self.faces[face.index()]
    }

    pub fn frames_in_flight(&self) -> usize {
        self.slots.len()
    }

    pub fn culling_enabled(&self) -> bool {
        self.culling_enabled
    }

    /// Stats of the last [`FaceStreams::update_visibility`].
    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Consecutive frames, up to the last one, that had nothing to draw.
    pub fn empty_frames(&self) -> u32 {
        self.empty_frames
    }

    /// Highest fence value signalled by [`FaceStreams::end_frame`].
    pub fn last_signalled(&self) -> u64 {
        self.last_signalled
    }

    /// Query all six faces in parallel and gather their visible indices.
    ///
    /// With culling disabled nothing is queried and every quad counts as
    /// rendered.
    pub fn update_visibility(&mut self, frustum: &Frustum) -> FrameStats
    where
        B: Send,
    {
        let total_quads = self.mesh.total_quad_count();
        if !self.culling_enabled {
            self.stats = FrameStats {
                total_quads,
                culled_quads: 0,
                drawn_indices: self.mesh.indices.len() as u32,
            };
            return self.stats;
        }

        let policy = self.policy;
        let culled_quads = self
            .faces
            .par_iter_mut()
            .map(|face| face.update_visibility(frustum, policy))
            .sum();
        let drawn_indices = self.faces.iter().map(FaceStream::staged_index_count).sum();

        self.stats = FrameStats {
            total_quads,
            culled_quads,
            drawn_indices,
        };
        if drawn_indices == 0 {
            self.empty_frames += 1;
            if self.empty_frames == 1 {
                tracing::warn!("no visible quads, nothing will be drawn");
            }
        } else if self.empty_frames > 0 {
            tracing::debug!(frames = self.empty_frames, "quads visible again");
            self.empty_frames = 0;
        }
        self.stats
    }

    /// Acquire a free staging slot and copy every face's staged list into it.
    ///
    /// Blocks on `fence` while the slot is still read by an earlier frame.
    /// Publishing again before [`FaceStreams::end_frame`] reuses the same slot.
    pub fn publish<D, F>(&mut self, device: &D, fence: &F)
    where
        D: IndexDevice<Buffer = B>,
        F: FrameFence + ?Sized,
    {
        if !self.culling_enabled {
            return;
        }
        let slot = match self.current.take() {
            Some(slot) => slot,
            None => self.slots.acquire(fence),
        };
        for face in &mut self.faces {
            face.publish(device, &slot);
        }
        self.current = Some(slot);
    }

    /// Draw this frame's published slots, or the full buffers when culling
    /// is disabled.
    pub fn draw<T: DrawTarget<B> + ?Sized>(&self, target: &mut T) {
        if !self.culling_enabled {
            self.draw_full(target);
            return;
        }
        for face in &self.faces {
            face.draw(target);
        }
    }

    /// Draw every face at full resolution.
    pub fn draw_full<T: DrawTarget<B> + ?Sized>(&self, target: &mut T) {
        for face in &self.faces {
            face.draw_full(target);
        }
    }

    /// Signal `fence` for the submitted frame and tie the value to the slot
    /// written this frame.
    pub fn end_frame<F: FrameFence + ?Sized>(&mut self, fence: &F) -> u64 {
        let value = fence.signal();
        if let Some(slot) = self.current.take() {
            self.slots.retire(slot, value);
        }
        self.last_signalled = value;
        value
    }

    /// Wait for every in-flight frame, then rebuild from `config`.
    ///
    /// `device` and `fence` keep being used afterwards. On failure the
    /// current streams are kept.
    pub fn rebuild<D, F>(&mut self, device: &D, fence: &F, config: &Config) -> Result<(), StreamError>
    where
        D: IndexDevice<Buffer = B>,
        F: FrameFence + ?Sized,
    {
        self.drain(fence);
        let last_signalled = self.last_signalled;
        self.replace(device, config, last_signalled)
    }

    /// Recover from a lost device: drain `old_fence`, then rebuild on
    /// `device`, a replacement device whose fence starts counting from zero.
    ///
    /// On failure the current streams are kept.
    pub fn rebuild_on_new_device<D, F>(
        &mut self,
        old_fence: &F,
        device: &D,
        config: &Config,
    ) -> Result<(), StreamError>
    where
        D: IndexDevice<Buffer = B>,
        F: FrameFence + ?Sized,
    {
        self.drain(old_fence);
        self.replace(device, config, 0)
    }

    fn drain<F: FrameFence + ?Sized>(&self, fence: &F) {
        let drain_to = self.last_signalled.max(self.slots.max_retire_value());
        tracing::debug!(drain_to, "draining in-flight frames before rebuild");
        fence.wait_until(drain_to);
    }

    fn replace<D>(&mut self, device: &D, config: &Config, last_signalled: u64) -> Result<(), StreamError>
    where
        D: IndexDevice<Buffer = B>,
    {
        let rebuilt = Self::new(device, config)?;
        *self = Self {
            last_signalled,
            ..rebuilt
        };
        tracing::info!(
            depth = self.mesh.subdivision_depth(),
            frames_in_flight = self.slots.len(),
            "rebuilt face streams"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CpuFence, RecordingDevice, RecordingTarget};
    use glam::Vec3;

    fn config(depth: u32) -> Config {
        let mut config = Config::default();
        config.sphere.max_subdivision_depth = depth;
        config.sphere.max_node_level = depth.min(4);
        config.sphere.attribute_level = depth;
        config
    }

    fn camera() -> Frustum {
        Frustum::look_at(
            Vec3::new(0.0, 0.0, -500.0),
            Vec3::ZERO,
            Vec3::Y,
            10f32.to_radians(),
            16.0 / 9.0,
            0.01,
            1000.0,
        )
    }

    #[test]
    fn test_stats_derived_counts() {
        let stats = FrameStats {
            total_quads: 200,
            culled_quads: 50,
            drawn_indices: 600,
        };
        assert_eq!(stats.rendered_quads(), 150);
        assert_eq!(stats.rendered_triangles(), 300);
        assert!((stats.culled_percent() - 25.0).abs() < 1e-5);
        assert_eq!(FrameStats::default().culled_percent(), 0.0);
    }

    #[test]
    fn test_new_allocates_every_face() {
        let device = RecordingDevice::new();
        let streams = FaceStreams::new(&device, &config(3)).unwrap();
        assert_eq!(streams.faces().len(), 6);
        assert_eq!(streams.frames_in_flight(), 3);
        // One full buffer and three slots per face.
        assert_eq!(device.buffers_created(), 24);
        for (stream, face) in streams.faces().iter().zip(CubeFace::ALL) {
            assert_eq!(stream.face(), face);
        }
    }

    #[test]
    fn test_invalid_config_rejected_before_allocation() {
        let device = RecordingDevice::new();
        let mut config = config(3);
        config.frames.frames_in_flight = 0;
        let err = FaceStreams::new(&device, &config).unwrap_err();
        assert!(matches!(err, StreamError::Config(_)));
        assert_eq!(device.buffers_created(), 0);
    }

    #[test]
    fn test_buffer_limit_reported() {
        let device = RecordingDevice::with_limit(64);
        let err = FaceStreams::new(&device, &config(3)).unwrap_err();
        assert!(matches!(err, StreamError::BufferTooLarge { .. }));
    }

    #[test]
    fn test_frame_cycle_draws_visible_faces() {
        let device = RecordingDevice::new();
        let fence = CpuFence::new();
        let mut streams = FaceStreams::new(&device, &config(4)).unwrap();

        let stats = streams.update_visibility(&camera());
        assert_eq!(stats.total_quads, 6 * 4u32.pow(4));
        assert!(stats.culled_quads > 0);
        assert!(stats.drawn_indices > 0);

        streams.publish(&device, &fence);
        let mut target = RecordingTarget::new();
        streams.draw(&mut target);
        assert_eq!(target.total_indices(), u64::from(stats.drawn_indices));

        assert_eq!(streams.end_frame(&fence), 1);
        assert_eq!(streams.last_signalled(), 1);
    }

    #[test]
    fn test_frames_rotate_through_slots() {
        let device = RecordingDevice::new();
        let fence = CpuFence::new();
        let mut streams = FaceStreams::new(&device, &config(3)).unwrap();
        let frustum = camera();

        let mut slots_used = Vec::new();
        for _ in 0..4 {
            streams.update_visibility(&frustum);
            streams.publish(&device, &fence);
            slots_used.push(streams.face(CubeFace::Front).published().map(|(s, _)| s));
            let value = streams.end_frame(&fence);
            fence.complete(value);
        }
        assert_eq!(slots_used, vec![Some(0), Some(1), Some(2), Some(0)]);
    }

    #[test]
    fn test_disabled_culling_draws_full_buffers() {
        let device = RecordingDevice::new();
        let fence = CpuFence::new();
        let mut config = config(3);
        config.culling.enabled = false;
        let mut streams = FaceStreams::new(&device, &config).unwrap();

        let stats = streams.update_visibility(&camera());
        assert_eq!(stats.culled_quads, 0);
        streams.publish(&device, &fence);
        let mut target = RecordingTarget::new();
        streams.draw(&mut target);
        assert_eq!(target.draws.len(), 6);
        assert_eq!(target.total_indices(), streams.mesh().indices.len() as u64);
    }

    #[test]
    fn test_rebuild_waits_for_in_flight_frames() {
        let device = RecordingDevice::new();
        let fence = std::sync::Arc::new(CpuFence::new());
        let mut streams = FaceStreams::new(&device, &config(3)).unwrap();

        streams.update_visibility(&camera());
        streams.publish(&device, fence.as_ref());
        let value = streams.end_frame(fence.as_ref());

        let (tx, rx) = crossbeam_channel::bounded(1);
        let worker = {
            let fence = std::sync::Arc::clone(&fence);
            std::thread::spawn(move || {
                let device = RecordingDevice::new();
                let mut config = config(4);
                config.frames.frames_in_flight = 2;
                streams.rebuild(&device, fence.as_ref(), &config).unwrap();
                tx.send(()).unwrap();
                streams
            })
        };

        assert!(rx.recv_timeout(std::time::Duration::from_millis(50)).is_err());
        fence.complete(value);
        rx.recv_timeout(std::time::Duration::from_secs(10)).unwrap();

        let streams = worker.join().unwrap();
        assert_eq!(streams.mesh().subdivision_depth(), 4);
        assert_eq!(streams.frames_in_flight(), 2);
        assert_eq!(streams.last_signalled(), value);
    }

    #[test]
    fn test_failed_rebuild_keeps_streams() {
        let device = RecordingDevice::new();
        let fence = CpuFence::new();
        let mut streams = FaceStreams::new(&device, &config(3)).unwrap();
        let mut bad = config(3);
        bad.sphere.edge_length = -1.0;
        assert!(streams.rebuild(&device, &fence, &bad).is_err());
        assert_eq!(streams.mesh().subdivision_depth(), 3);
    }

    #[test]
    fn test_rebuild_on_lost_device_fails() {
        let device = RecordingDevice::new();
        let fence = CpuFence::new();
        let mut streams = FaceStreams::new(&device, &config(3)).unwrap();
        device.mark_lost();

        let err = streams.rebuild(&device, &fence, &config(3)).unwrap_err();
        assert!(matches!(err, StreamError::DeviceLost));
        assert_eq!(streams.faces().len(), 6);
    }

    #[test]
    fn test_rebuild_on_new_device_after_loss() {
        let lost = RecordingDevice::new();
        let old_fence = CpuFence::new();
        let mut streams = FaceStreams::new(&lost, &config(3)).unwrap();

        streams.update_visibility(&camera());
        streams.publish(&lost, &old_fence);
        let value = streams.end_frame(&old_fence);
        old_fence.complete(value);
        lost.mark_lost();

        let fresh = RecordingDevice::new();
        let fence = CpuFence::new();
        streams
            .rebuild_on_new_device(&old_fence, &fresh, &config(3))
            .unwrap();
        assert_eq!(fresh.buffers_created(), 24);
        assert_eq!(streams.last_signalled(), 0);

        streams.update_visibility(&camera());
        streams.publish(&fresh, &fence);
        let mut target = RecordingTarget::new();
        streams.draw(&mut target);
        assert!(target.total_indices() > 0);
        assert_eq!(streams.end_frame(&fence), 1);
    }

    #[test]
    fn test_empty_frames_counted_until_quads_return() {
        let device = RecordingDevice::new();
        let mut streams = FaceStreams::new(&device, &config(3)).unwrap();
        let away = Frustum::look_at(
            Vec3::new(0.0, 0.0, -500.0),
            Vec3::new(0.0, 0.0, -1000.0),
            Vec3::Y,
            10f32.to_radians(),
            16.0 / 9.0,
            0.01,
            1000.0,
        );

        for expected in 1..=3 {
            let stats = streams.update_visibility(&away);
            assert_eq!(stats.drawn_indices, 0);
            assert_eq!(streams.empty_frames(), expected);
        }
        streams.update_visibility(&camera());
        assert_eq!(streams.empty_frames(), 0);
    }
}
