// ABOUTME: Per-connection statistics with a rolling emission window
// ABOUTME: One log line per window covering both pipeline threads

use crate::handoff::RenderStats;
use crate::reconstruct::{Applied, Ingest};
use std::time::{Duration, Instant};
use tracing::info;

/// Counters for one connection, emitted once per stats window.
///
/// The session thread records its own stages (recv, lz4, delta); the
/// presenter's upload/present averages and the overwrite count are drained
/// from the handoff slot at emission time.
pub(crate) struct ConnectionStats {
    window_start: Instant,
    frames: u32,
    total_frames: u32,
    recv_ms_sum: f64,
    lz4_ms_sum: f64,
    delta_ms_sum: f64,
    skipped: u32,
    last_payload: usize,
    last_keyframe: bool,
}

impl ConnectionStats {
    pub fn new() -> Self {
        ConnectionStats {
            window_start: Instant::now(),
            frames: 0,
            total_frames: 0,
            recv_ms_sum: 0.0,
            lz4_ms_sum: 0.0,
            delta_ms_sum: 0.0,
            skipped: 0,
            last_payload: 0,
            last_keyframe: false,
        }
    }

    pub fn record_frame(&mut self, recv_ms: f64, ingest: &Ingest, payload_len: usize, keyframe: bool) {
        self.frames += 1;
        self.total_frames += 1;
        self.recv_ms_sum += recv_ms;
        self.lz4_ms_sum += ingest.lz4_ms;
        self.delta_ms_sum += ingest.delta_ms;
        if ingest.applied == Applied::SkippedTiny {
            self.skipped += 1;
        }
        self.last_payload = payload_len;
        self.last_keyframe = keyframe;
    }

    pub fn due(&self, interval: Duration) -> bool {
        self.frames > 0 && self.window_start.elapsed() >= interval
    }

    /// Emit one window's log line and reset the window counters.
    pub fn emit(&mut self, dropped: u64, render: RenderStats) {
        let elapsed = self.window_start.elapsed().as_secs_f64();
        let frames = f64::from(self.frames);
        info!(
            fps = frames / elapsed,
            recv_ms = self.recv_ms_sum / frames,
            lz4_ms = self.lz4_ms_sum / frames,
            delta_ms = self.delta_ms_sum / frames,
            upload_ms = render.upload_ms_avg,
            present_ms = render.present_ms_avg,
            payload_kb = self.last_payload / 1024,
            kind = if self.last_keyframe { "KF" } else { "delta" },
            dropped,
            skipped = self.skipped,
            overwritten = render.overwritten,
            total = self.total_frames,
            "frame pipeline stats",
        );

        self.window_start = Instant::now();
        self.frames = 0;
        self.recv_ms_sum = 0.0;
        self.lz4_ms_sum = 0.0;
        self.delta_ms_sum = 0.0;
        self.skipped = 0;
    }
}
