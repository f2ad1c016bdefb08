// ABOUTME: Owns the authoritative reconstructed frame and applies incoming payloads to it
// ABOUTME: LZ4-decompresses each packet, then replaces (keyframe) or XOR-deltas (otherwise)

use crate::codec::FrameHeader;
use crate::pixel;
use std::collections::TryReserveError;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, warn};

/// Deltas with a compressed payload below this size may be skipped entirely
/// when the tiny-delta optimization is on: the encoder emits them for frames
/// with no visible change.
pub const TINY_DELTA_MAX: usize = 256;

// Sequence gaps at or above this are treated as a counter glitch, not drops.
const GAP_SANITY_LIMIT: u32 = 1000;

/// Fatal reconstruction error.
///
/// Only a keyframe that fails to decompress to the expected size is fatal: at
/// that point the current frame can no longer be trusted and the connection
/// must be dropped so the server's next mandatory keyframe resets state. A
/// bad delta is merely discarded (`Applied::Discarded`) because the current
/// frame is still consistent with what the server last acked.
#[derive(Debug, Error)]
pub enum ReconstructError {
    #[error("keyframe payload did not decompress to {expected} bytes")]
    CorruptKeyframe { expected: usize },
}

/// How a frame packet was absorbed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Applied {
    /// Keyframe copied or delta XORed into the current frame.
    Full,
    /// Tiny delta: acked and republished but not applied.
    SkippedTiny,
    /// Delta whose payload did not decompress to the frame size; dropped
    /// without an ack, current frame untouched.
    Discarded,
}

/// Outcome of one `ingest` call, with per-stage timings for the stats window.
#[derive(Clone, Copy, Debug)]
pub struct Ingest {
    pub applied: Applied,
    pub lz4_ms: f64,
    pub delta_ms: f64,
}

/// Owner of the current frame `C` and the decompression scratch.
///
/// The invariant maintained here is the heart of the protocol: after
/// processing packet `n`, the current frame equals the encoder's logical
/// frame `n`. XOR deltas only compose against the exact predecessor frame,
/// which TCP's ordering guarantees as long as nothing is applied out of turn.
pub struct Reconstructor {
    current: Vec<u8>,
    scratch: Vec<u8>,
    width: u32,
    height: u32,
    last_seq: Option<u32>,
    dropped: u64,
    skip_tiny: bool,
}

impl Reconstructor {
    pub fn new(width: u32, height: u32, skip_tiny: bool) -> Result<Self, TryReserveError> {
        let pixels = width as usize * height as usize;
        Ok(Reconstructor {
            current: try_zeroed(pixels)?,
            scratch: try_zeroed(pixels)?,
            width,
            height,
            last_seq: None,
            dropped: 0,
            skip_tiny,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel_count(&self) -> usize {
        self.current.len()
    }

    /// The reconstructed frame as of the last applied packet.
    pub fn current(&self) -> &[u8] {
        &self.current
    }

    /// Cumulative sequence gaps observed since session start.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Forget per-connection sequencing state. The frame content itself is
    /// kept; the server opens every connection with a keyframe.
    pub fn begin_connection(&mut self) {
        self.last_seq = None;
    }

    /// Track the packet sequence number, counting gaps as dropped frames.
    ///
    /// TCP cannot reorder or drop, so a gap means the server skipped sequence
    /// numbers before sending; it is surfaced as a warning and a statistic,
    /// never as a reconstruction decision.
    pub fn observe_seq(&mut self, seq: u32) {
        if let Some(last) = self.last_seq {
            let gap = seq.wrapping_sub(last).wrapping_sub(1);
            if gap > 0 && gap < GAP_SANITY_LIMIT {
                self.dropped += u64::from(gap);
                warn!(seq, last, gap, "sequence gap on an in-order stream");
            }
        }
        self.last_seq = Some(seq);
    }

    /// Absorb one frame packet per the reconstruction procedure.
    pub fn ingest(
        &mut self,
        header: &FrameHeader,
        payload: &[u8],
    ) -> Result<Ingest, ReconstructError> {
        let pixels = self.current.len();

        let t0 = Instant::now();
        let decompressed = lz4_flex::block::decompress_into(payload, &mut self.scratch);
        let lz4_ms = ms_since(t0);

        match decompressed {
            Ok(n) if n == pixels => {}
            outcome => {
                if header.keyframe() {
                    return Err(ReconstructError::CorruptKeyframe { expected: pixels });
                }
                debug!(seq = header.seq, ?outcome, "discarding undecodable delta");
                return Ok(Ingest {
                    applied: Applied::Discarded,
                    lz4_ms,
                    delta_ms: 0.0,
                });
            }
        }

        let t1 = Instant::now();
        let applied = if header.keyframe() {
            self.current.copy_from_slice(&self.scratch);
            Applied::Full
        } else if self.skip_tiny && payload.len() < TINY_DELTA_MAX {
            Applied::SkippedTiny
        } else {
            pixel::xor_in_place(&mut self.current, &self.scratch);
            Applied::Full
        };

        Ok(Ingest {
            applied,
            lz4_ms,
            delta_ms: ms_since(t1),
        })
    }

    /// Paint the current frame white, shown while disconnected.
    pub fn whiteout(&mut self) {
        self.current.fill(0xFF);
    }

    /// Allocate replacement buffers for a new resolution without installing
    /// them, so a failed allocation leaves the session untouched.
    pub fn stage_resize(width: u32, height: u32) -> Result<FrameBuffers, TryReserveError> {
        let pixels = width as usize * height as usize;
        Ok(FrameBuffers {
            current: try_zeroed(pixels)?,
            scratch: try_zeroed(pixels)?,
        })
    }

    /// Install buffers staged by `stage_resize`.
    pub fn install(&mut self, buffers: FrameBuffers, width: u32, height: u32) {
        self.current = buffers.current;
        self.scratch = buffers.scratch;
        self.width = width;
        self.height = height;
    }
}

/// Replacement current+scratch pair staged for a resolution change.
pub struct FrameBuffers {
    current: Vec<u8>,
    scratch: Vec<u8>,
}

pub(crate) fn try_zeroed(len: usize) -> Result<Vec<u8>, TryReserveError> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)?;
    v.resize(len, 0);
    Ok(v)
}

pub(crate) fn ms_since(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1e3
}
