//! Frame loop on a real wgpu device, rendering offscreen.
//!
//! No surface is created. Each frame draws the visible patch control points
//! projected onto the sphere into an offscreen color target, colored by
//! their baked patch center.

use std::error::Error;
use std::num::NonZeroU64;
use std::sync::Arc;

use apollo_config::Config;
use apollo_quadsphere::{Frustum, QuadSphereMesh};
use apollo_stream::{FaceStreams, FrameFence, QueueFence, WgpuIndexDevice, vertex_layout};
use bytemuck::{Pod, Zeroable};

use crate::FRAME_TIME;
use crate::camera::OrbitCamera;
use crate::report::StatsReport;

const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Camera uniform: view-projection plus the sphere radius in `x`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct CameraUniform {
    view_proj: [[f32; 4]; 4],
    sphere: [f32; 4],
}

const SHADER_SOURCE: &str = r#"
struct CameraUniform {
    view_proj: mat4x4<f32>,
    sphere: vec4<f32>,
};

@group(0) @binding(0)
var<uniform> camera: CameraUniform;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) patch_center: vec3<f32>,
};

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) color: vec3<f32>,
};

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    let on_sphere = normalize(in.position) * camera.sphere.x;
    out.clip_position = camera.view_proj * vec4<f32>(on_sphere, 1.0);
    let len = length(in.patch_center);
    out.color = select(vec3<f32>(1.0), in.patch_center / len * 0.5 + 0.5, len > 0.0);
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    return vec4<f32>(in.color, 1.0);
}
"#;

/// Point-list pipeline and the resources it draws with.
struct PatchRenderer {
    pipeline: wgpu::RenderPipeline,
    camera_buffer: wgpu::Buffer,
    camera_bind_group: wgpu::BindGroup,
    vertex_buffer: wgpu::Buffer,
    target_view: wgpu::TextureView,
    radius: f32,
}

impl PatchRenderer {
    fn new(backend: &WgpuIndexDevice, mesh: &QuadSphereMesh, width: u32, height: u32) -> Self {
        let device = backend.device();
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("patch-shader"),
            source: wgpu::ShaderSource::Wgsl(SHADER_SOURCE.into()),
        });

        let camera_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("camera-bind-group-layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: NonZeroU64::new(
                            std::mem::size_of::<CameraUniform>() as u64
                        ),
                    },
                    count: None,
                }],
            });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("patch-pipeline-layout"),
            bind_group_layouts: &[&camera_bind_group_layout],
            immediate_size: 0,
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("patch-pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[vertex_layout()],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::PointList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                unclipped_depth: false,
                polygon_mode: wgpu::PolygonMode::Fill,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState {
                count: 1,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: TARGET_FORMAT,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview_mask: None,
            cache: None,
        });

        let camera_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("camera-uniform"),
            size: std::mem::size_of::<CameraUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("camera-bind-group"),
            layout: &camera_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_buffer.as_entire_binding(),
            }],
        });

        let target = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("offscreen-target"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let target_view = target.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            pipeline,
            camera_buffer,
            camera_bind_group,
            vertex_buffer: backend.create_vertex_buffer(mesh),
            target_view,
            radius: mesh.radius(),
        }
    }

    fn update_camera(&self, queue: &wgpu::Queue, view_proj: glam::Mat4) {
        let uniform = CameraUniform {
            view_proj: view_proj.to_cols_array_2d(),
            sphere: [self.radius, 0.0, 0.0, 0.0],
        };
        queue.write_buffer(&self.camera_buffer, 0, bytemuck::bytes_of(&uniform));
    }

    fn encode(&self, encoder: &mut wgpu::CommandEncoder, streams: &FaceStreams<wgpu::Buffer>) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("patch-pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &self.target_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            ..Default::default()
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.camera_bind_group, &[]);
        pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        streams.draw(&mut pass);
    }
}

/// Device, queue and the stream-facing wrappers around them.
struct GpuContext {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    backend: WgpuIndexDevice,
    fence: QueueFence,
}

impl GpuContext {
    async fn request() -> Result<Self, Box<dyn Error>> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await?;

        let info = adapter.get_info();
        tracing::info!(
            name = %info.name,
            backend = ?info.backend,
            device_type = ?info.device_type,
            "selected GPU"
        );

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("apollo-device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
                experimental_features: Default::default(),
                ..Default::default()
            })
            .await?;

        let device = Arc::new(device);
        let queue = Arc::new(queue);
        let backend = WgpuIndexDevice::new(Arc::clone(&device), Arc::clone(&queue));
        let fence = backend.fence();
        Ok(Self {
            device,
            queue,
            backend,
            fence,
        })
    }
}

pub fn run(config: &Config, frames: u32) -> Result<(), Box<dyn Error>> {
    let mut gpu = pollster::block_on(GpuContext::request())?;
    let mut streams = FaceStreams::new(&gpu.backend, config)?;
    let mut renderer = PatchRenderer::new(
        &gpu.backend,
        streams.mesh(),
        config.window.width,
        config.window.height,
    );

    let camera = OrbitCamera::from_config(config);
    let mut report = StatsReport::new(config.debug.stats_interval_frames);

    for frame in 0..frames {
        if gpu.backend.is_lost() {
            tracing::warn!(frame, "device lost, requesting a new one");
            let fresh = pollster::block_on(GpuContext::request())?;
            streams.rebuild_on_new_device(&gpu.fence, &fresh.backend, config)?;
            renderer = PatchRenderer::new(
                &fresh.backend,
                streams.mesh(),
                config.window.width,
                config.window.height,
            );
            gpu = fresh;
        }

        let time = frame as f32 * FRAME_TIME;
        let view_proj = camera.view_proj(time);
        let stats = streams.update_visibility(&Frustum::from_view_projection(&view_proj));
        streams.publish(&gpu.backend, &gpu.fence);
        renderer.update_camera(&gpu.queue, view_proj);

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame-encoder"),
            });
        renderer.encode(&mut encoder, &streams);
        gpu.queue.submit(std::iter::once(encoder.finish()));
        streams.end_frame(&gpu.fence);

        report.record(frame, &stats);
    }

    gpu.fence.wait_until(streams.last_signalled());
    report.finish("gpu");
    Ok(())
}
