// ABOUTME: Latest-value handoff slot between the session thread and the presenter thread
// ABOUTME: Double-buffered under one mutex+condvar; the writer always wins and overwrites

use crate::reconstruct::try_zeroed;
use std::collections::TryReserveError;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Frame metadata returned with each successful `take`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Taken {
    pub seq: u32,
    pub width: u32,
    pub height: u32,
}

/// Render-side statistics drained once per stats window.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RenderStats {
    pub overwritten: u32,
    pub frames: u32,
    pub upload_ms_avg: f64,
    pub present_ms_avg: f64,
}

struct Slot {
    bufs: [Vec<u8>; 2],
    ready_index: usize,
    ready_seq: u32,
    has_ready: bool,
    width: u32,
    height: u32,
    overwritten: u32,
    // Presenter-contributed timing sums live under the same lock as the
    // frame slot so one mutex guards all cross-thread state.
    upload_ms_sum: f64,
    present_ms_sum: f64,
    presented: u32,
    running: bool,
}

/// Single-writer / single-reader slot carrying the newest reconstructed
/// frame from the session thread to the presenter thread.
///
/// The contract is writer-wins: `publish` never waits for the consumer, it
/// overwrites the pending frame and counts the overwrite. The consumer
/// blocks on the condvar until a frame is ready or the slot is shut down.
/// `ready_seq` is non-decreasing across successful takes within a
/// connection, though sequence numbers may be skipped when the presenter
/// cannot keep up.
pub struct Handoff {
    slot: Mutex<Slot>,
    cond: Condvar,
}

/// Replacement buffer pair staged for a resolution change.
pub struct HandoffBuffers {
    bufs: [Vec<u8>; 2],
}

impl Handoff {
    /// Allocate a slot for `width x height` frames, painted white so the
    /// surface shows blank until the first real frame lands.
    pub fn new(width: u32, height: u32) -> Result<Self, TryReserveError> {
        let HandoffBuffers { bufs } = Self::stage_resize(width, height)?;
        Ok(Handoff {
            slot: Mutex::new(Slot {
                bufs,
                ready_index: 0,
                ready_seq: 0,
                has_ready: false,
                width,
                height,
                overwritten: 0,
                upload_ms_sum: 0.0,
                present_ms_sum: 0.0,
                presented: 0,
                running: true,
            }),
            cond: Condvar::new(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish `src` as the newest frame, overwriting any pending one.
    pub fn publish(&self, src: &[u8], seq: u32) {
        let mut slot = self.lock();
        debug_assert_eq!(src.len(), slot.bufs[0].len());

        let write = 1 - slot.ready_index;
        slot.bufs[write].copy_from_slice(src);
        if slot.has_ready {
            slot.overwritten += 1;
        }
        slot.ready_index = write;
        slot.ready_seq = seq;
        slot.has_ready = true;
        drop(slot);
        self.cond.notify_one();
    }

    /// Block until a frame is ready, copy it into `out`, and return its
    /// metadata. Returns `None` once the slot has been shut down, even if a
    /// frame is still pending.
    pub fn take(&self, out: &mut Vec<u8>) -> Option<Taken> {
        let mut slot = self.lock();
        while slot.running && !slot.has_ready {
            slot = self
                .cond
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
        if !slot.running {
            return None;
        }

        let pixels = slot.bufs[slot.ready_index].len();
        if out.len() != pixels {
            out.resize(pixels, 0);
        }
        out.copy_from_slice(&slot.bufs[slot.ready_index]);
        slot.has_ready = false;
        Some(Taken {
            seq: slot.ready_seq,
            width: slot.width,
            height: slot.height,
        })
    }

    /// Sequence number of the most recently published frame.
    pub fn ready_seq(&self) -> u32 {
        self.lock().ready_seq
    }

    /// Allocate white replacement buffers for a new resolution without
    /// touching the live slot.
    pub fn stage_resize(width: u32, height: u32) -> Result<HandoffBuffers, TryReserveError> {
        let pixels = width as usize * height as usize;
        let mut a = try_zeroed(pixels)?;
        let mut b = try_zeroed(pixels)?;
        a.fill(0xFF);
        b.fill(0xFF);
        Ok(HandoffBuffers { bufs: [a, b] })
    }

    /// Swap in buffers staged by `stage_resize` and drop any pending frame.
    pub fn install(&self, buffers: HandoffBuffers, width: u32, height: u32) {
        let mut slot = self.lock();
        slot.bufs = buffers.bufs;
        slot.ready_index = 0;
        slot.has_ready = false;
        slot.width = width;
        slot.height = height;
    }

    /// Record one presented frame's upload and present durations.
    pub fn record_present(&self, upload_ms: f64, present_ms: f64) {
        let mut slot = self.lock();
        slot.upload_ms_sum += upload_ms;
        slot.present_ms_sum += present_ms;
        slot.presented += 1;
    }

    /// Drain and reset the render-side counters for one stats window.
    pub fn drain_render_stats(&self) -> RenderStats {
        let mut slot = self.lock();
        let frames = slot.presented;
        let stats = RenderStats {
            overwritten: slot.overwritten,
            frames,
            upload_ms_avg: if frames > 0 {
                slot.upload_ms_sum / f64::from(frames)
            } else {
                0.0
            },
            present_ms_avg: if frames > 0 {
                slot.present_ms_sum / f64::from(frames)
            } else {
                0.0
            },
        };
        slot.overwritten = 0;
        slot.upload_ms_sum = 0.0;
        slot.present_ms_sum = 0.0;
        slot.presented = 0;
        stats
    }

    /// Wake the consumer and make every future `take` return `None`.
    pub fn shutdown(&self) {
        let mut slot = self.lock();
        slot.running = false;
        drop(slot);
        self.cond.notify_all();
    }
}
