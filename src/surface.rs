// ABOUTME: Abstraction over the host's native window handle
// ABOUTME: The core only needs geometry control and lock/blit/post access

use thiserror::Error;

/// Pixel formats the client may request for the surface's buffers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    /// Four bytes per pixel, alpha byte ignored by the compositor.
    Rgbx8888,
    /// One grey byte per pixel. A documented fast path; disabled by default
    /// because the shipping compositor cannot display it.
    R8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgbx8888 => 4,
            PixelFormat::R8 => 1,
        }
    }
}

#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("failed to lock surface buffer: {0}")]
    Lock(String),

    #[error("surface rejected geometry {width}x{height}: {reason}")]
    Geometry {
        width: u32,
        height: u32,
        reason: String,
    },

    #[error("surface is gone")]
    Gone,
}

/// A locked surface buffer, valid for the duration of one blit.
///
/// `stride_px` is measured in pixels, not bytes; rows may be padded. `bits`
/// covers `stride_px * height` pixels at the surface's current pixel format.
pub struct SurfaceBuffer<'a> {
    pub bits: &'a mut [u8],
    pub stride_px: usize,
    pub width: u32,
    pub height: u32,
}

/// The narrow window-handle interface the presenter consumes.
///
/// Implementations wrap whatever the platform provides (an `ANativeWindow`,
/// a test buffer, a frame dump). All calls arrive from the presenter thread
/// only.
pub trait Surface: Send {
    /// Declare the producer-side geometry of the surface's buffers.
    fn set_buffer_geometry(
        &mut self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<(), SurfaceError>;

    /// Lock the backing buffer for writing, run `f` over it, then unlock and
    /// post the buffer to the compositor.
    fn lock_and_post(&mut self, f: &mut dyn FnMut(SurfaceBuffer<'_>)) -> Result<(), SurfaceError>;

    /// Drop the underlying window reference. Called once, at session end.
    fn release(&mut self) {}
}
