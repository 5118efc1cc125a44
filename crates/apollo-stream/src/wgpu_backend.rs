//! wgpu implementations of the device, draw target, and frame fence.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use apollo_quadsphere::{QuadSphereMesh, Vertex};
use wgpu::util::DeviceExt;

use crate::{DrawTarget, FrameFence, IndexBufferDesc, IndexDevice, StreamError};

/// Index buffers on a wgpu device, uploaded through its queue.
#[derive(Debug)]
pub struct WgpuIndexDevice {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    lost: Arc<AtomicBool>,
}

impl WgpuIndexDevice {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        let lost = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&lost);
        device.set_device_lost_callback(move |reason, message| {
            flag.store(true, Ordering::Release);
            tracing::warn!(?reason, %message, "graphics device lost");
        });
        Self {
            device,
            queue,
            lost,
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// A fence on this device's queue that stops waiting once the device is
    /// lost.
    pub fn fence(&self) -> QueueFence {
        QueueFence {
            device: Arc::clone(&self.device),
            queue: Arc::clone(&self.queue),
            lost: Arc::clone(&self.lost),
            signalled: AtomicU64::new(0),
            completed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Whether the device-lost callback has fired.
    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    /// Upload the mesh vertices into a vertex buffer.
    pub fn create_vertex_buffer(&self, mesh: &QuadSphereMesh) -> wgpu::Buffer {
        self.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("quadsphere-vertices"),
                contents: mesh.vertex_bytes(),
                usage: wgpu::BufferUsages::VERTEX,
            })
    }
}

impl IndexDevice for WgpuIndexDevice {
    type Buffer = wgpu::Buffer;

    fn create_index_buffer(&self, desc: &IndexBufferDesc<'_>) -> Result<wgpu::Buffer, StreamError> {
        if self.is_lost() {
            return Err(StreamError::DeviceLost);
        }
        let size = desc.size_bytes();
        let limit = self.device.limits().max_buffer_size;
        if size > limit {
            return Err(StreamError::BufferTooLarge {
                label: desc.label.to_owned(),
                size,
                limit,
            });
        }
        tracing::debug!(label = desc.label, size, "creating index buffer");
        Ok(self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(desc.label),
            size,
            usage: wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        }))
    }

    fn write_indices(&self, buffer: &wgpu::Buffer, indices: &[u32]) {
        self.queue
            .write_buffer(buffer, 0, bytemuck::cast_slice(indices));
    }
}

impl DrawTarget<wgpu::Buffer> for wgpu::RenderPass<'_> {
    fn draw_indexed(&mut self, buffer: &wgpu::Buffer, index_count: u32) {
        let bytes = u64::from(index_count) * crate::device::INDEX_SIZE;
        self.set_index_buffer(buffer.slice(..bytes), wgpu::IndexFormat::Uint32);
        wgpu::RenderPass::draw_indexed(self, 0..index_count, 0, 0..1);
    }
}

/// Vertex buffer layout of [`Vertex`]: position at location 0, patch center
/// at location 1.
pub fn vertex_layout() -> wgpu::VertexBufferLayout<'static> {
    use wgpu::{VertexAttribute, VertexFormat};

    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &[
            VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: VertexFormat::Float32x3,
            },
            VertexAttribute {
                offset: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                shader_location: 1,
                format: VertexFormat::Float32x3,
            },
        ],
    }
}

/// Fence driven by queue completion callbacks.
///
/// Call [`FrameFence::signal`] right after `Queue::submit`; the value
/// completes once the GPU has finished all work submitted before it. Waits
/// return early once the device is lost, since its work never completes.
#[derive(Debug)]
pub struct QueueFence {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    lost: Arc<AtomicBool>,
    signalled: AtomicU64,
    completed: Arc<AtomicU64>,
}

impl QueueFence {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        Self {
            device,
            queue,
            lost: Arc::new(AtomicBool::new(false)),
            signalled: AtomicU64::new(0),
            completed: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl FrameFence for QueueFence {
    fn signal(&self) -> u64 {
        let value = self.signalled.fetch_add(1, Ordering::AcqRel) + 1;
        let completed = Arc::clone(&self.completed);
        self.queue.on_submitted_work_done(move || {
            completed.fetch_max(value, Ordering::AcqRel);
        });
        value
    }

    fn completed_value(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    fn wait_until(&self, value: u64) {
        if value > self.signalled.load(Ordering::Acquire) {
            tracing::warn!(value, "waiting on a fence value that was never signalled");
            return;
        }
        while self.completed_value() < value {
            if self.lost.load(Ordering::Acquire) {
                tracing::warn!(value, "device lost while waiting on fence");
                return;
            }
            tracing::trace!(value, completed = self.completed_value(), "polling device");
            if let Err(err) = self.device.poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: None,
            }) {
                tracing::warn!(%err, "device poll failed while waiting on fence");
                return;
            }
        }
    }
}
