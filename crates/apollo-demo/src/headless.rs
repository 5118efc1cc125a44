//! Frame loop without a GPU.
//!
//! Buffers live in host memory and a consumer thread plays the GPU: it
//! completes each frame's fence value after a fixed latency, so the producer
//! stalls on the slot ring exactly as it would behind a slow device.

use std::error::Error;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use apollo_config::Config;
use apollo_stream::{CpuFence, FaceStreams, FrameFence, RecordingDevice, RecordingTarget};

use crate::FRAME_TIME;
use crate::camera::OrbitCamera;
use crate::report::StatsReport;

/// Time the simulated GPU spends on each frame.
const SIMULATED_LATENCY: Duration = Duration::from_millis(2);

pub fn run(config: &Config, frames: u32) -> Result<(), Box<dyn Error>> {
    let device = RecordingDevice::new();
    let fence = Arc::new(CpuFence::new());
    let mut streams = FaceStreams::new(&device, config)?;
    tracing::info!(
        vertices = streams.mesh().vertices.len(),
        indices = streams.mesh().indices.len(),
        bytes_allocated = device.bytes_allocated(),
        "headless streams ready"
    );

    let (submit_tx, submit_rx) = crossbeam_channel::unbounded::<u64>();
    let consumer = {
        let fence = Arc::clone(&fence);
        thread::Builder::new()
            .name("simulated-gpu".into())
            .spawn(move || {
                for value in submit_rx {
                    thread::sleep(SIMULATED_LATENCY);
                    fence.complete(value);
                }
            })?
    };

    let camera = OrbitCamera::from_config(config);
    let mut target = RecordingTarget::new();
    let mut report = StatsReport::new(config.debug.stats_interval_frames);

    for frame in 0..frames {
        let time = frame as f32 * FRAME_TIME;
        let stats = streams.update_visibility(&camera.frustum(time));
        streams.publish(&device, fence.as_ref());

        target.clear();
        streams.draw(&mut target);
        debug_assert_eq!(target.total_indices(), u64::from(stats.drawn_indices));

        let value = streams.end_frame(fence.as_ref());
        submit_tx.send(value)?;
        report.record(frame, &stats);
    }

    drop(submit_tx);
    consumer
        .join()
        .map_err(|_| "simulated GPU thread panicked")?;
    fence.wait_until(streams.last_signalled());

    tracing::info!(
        writes = device.writes(),
        bytes_written = device.bytes_written(),
        completed = fence.completed_value(),
        "headless device totals"
    );
    report.finish("headless");
    Ok(())
}
