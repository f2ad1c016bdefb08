// CPU blit fallback: expand the grey frame into the locked surface buffer.

use crate::pixel;
use crate::reconstruct::ms_since;
use crate::surface::{PixelFormat, Surface, SurfaceBuffer, SurfaceError};
use std::time::Instant;

/// Blit `frame` (`fw x fh` grey bytes) into the surface, clipped to the
/// surface's own dimensions. Returns `(blit_ms, post_ms)`.
pub(super) fn blit_frame(
    surface: &mut dyn Surface,
    frame: &[u8],
    fw: u32,
    fh: u32,
    format: PixelFormat,
) -> Result<(f64, f64), SurfaceError> {
    let mut blit_ms = 0.0;
    let t0 = Instant::now();
    surface.lock_and_post(&mut |buf| {
        let t = Instant::now();
        match format {
            PixelFormat::Rgbx8888 => blit_rgbx(frame, fw, fh, buf),
            PixelFormat::R8 => blit_r8(frame, fw, fh, buf),
        }
        blit_ms = ms_since(t);
    })?;
    let post_ms = (ms_since(t0) - blit_ms).max(0.0);
    Ok((blit_ms, post_ms))
}

fn blit_rgbx(frame: &[u8], fw: u32, fh: u32, buf: SurfaceBuffer<'_>) {
    let fw = fw as usize;
    let rows = (fh as usize).min(buf.height as usize);
    let cols = fw.min(buf.width as usize);
    let dst_stride = buf.stride_px * 4;

    for y in 0..rows {
        let src = &frame[y * fw..y * fw + cols];
        let dst = &mut buf.bits[y * dst_stride..y * dst_stride + cols * 4];
        pixel::expand_grey_to_rgbx(src, dst);
    }
}

// Direct single-channel copy for compositors that can scan out R8.
fn blit_r8(frame: &[u8], fw: u32, fh: u32, buf: SurfaceBuffer<'_>) {
    let fw = fw as usize;
    let rows = (fh as usize).min(buf.height as usize);
    let cols = fw.min(buf.width as usize);

    if buf.stride_px == fw && cols == fw {
        buf.bits[..rows * fw].copy_from_slice(&frame[..rows * fw]);
    } else {
        for y in 0..rows {
            let src = &frame[y * fw..y * fw + cols];
            buf.bits[y * buf.stride_px..y * buf.stride_px + cols].copy_from_slice(src);
        }
    }
}
