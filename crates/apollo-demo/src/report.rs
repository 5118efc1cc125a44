//! Periodic frame statistics, logged the way an on-screen overlay shows them.

use std::time::{Duration, Instant};

use apollo_stream::FrameStats;

/// Accumulates per-frame stats and logs them every `interval` frames.
#[derive(Debug)]
pub struct StatsReport {
    interval: u32,
    started: Instant,
    frames: u64,
    culled_percent_sum: f64,
    drawn_indices_sum: u64,
}

impl StatsReport {
    /// `interval == 0` disables the periodic lines; the summary is still logged.
    pub fn new(interval: u32) -> Self {
        Self {
            interval,
            started: Instant::now(),
            frames: 0,
            culled_percent_sum: 0.0,
            drawn_indices_sum: 0,
        }
    }

    pub fn record(&mut self, frame: u32, stats: &FrameStats) {
        self.frames += 1;
        self.culled_percent_sum += f64::from(stats.culled_percent());
        self.drawn_indices_sum += u64::from(stats.drawn_indices);

        if self.interval != 0 && frame % self.interval == 0 {
            tracing::info!(
                frame,
                rendered_quads = stats.rendered_quads(),
                rendered_triangles = stats.rendered_triangles(),
                culled_quads = stats.culled_quads,
                culled_percent = format_args!("{:.1}", stats.culled_percent()),
                drawn_indices = stats.drawn_indices,
                "frame stats"
            );
        } else {
            tracing::debug!(
                frame,
                culled_quads = stats.culled_quads,
                drawn_indices = stats.drawn_indices,
                "frame stats"
            );
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Mean culled percentage over all recorded frames.
    pub fn mean_culled_percent(&self) -> f64 {
        if self.frames == 0 {
            return 0.0;
        }
        self.culled_percent_sum / self.frames as f64
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Log the end-of-run summary.
    pub fn finish(&self, mode: &str) {
        let elapsed = self.elapsed();
        let fps = if elapsed.is_zero() {
            0.0
        } else {
            self.frames as f64 / elapsed.as_secs_f64()
        };
        let mean_drawn = if self.frames == 0 {
            0
        } else {
            self.drawn_indices_sum / self.frames
        };
        tracing::info!(
            mode,
            frames = self.frames,
            elapsed_ms = elapsed.as_millis() as u64,
            fps = format_args!("{fps:.1}"),
            mean_culled_percent = format_args!("{:.1}", self.mean_culled_percent()),
            mean_drawn_indices = mean_drawn,
            "run finished"
        );
    }
}
