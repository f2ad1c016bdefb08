// ABOUTME: Presenter thread - consumes the handoff and maps frames onto the surface
// ABOUTME: Tries the hardware quad backend once, then falls back to CPU blit for good

mod blit;
pub mod gpu;

pub use gpu::{QuadContext, QuadContextFactory};

use crate::handoff::Handoff;
use crate::reconstruct::ms_since;
use crate::surface::{PixelFormat, Surface, SurfaceError};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Presentation-path errors. None of these reach the host: a hardware
/// failure demotes the backend and a surface failure skips the frame.
#[derive(Debug, Error)]
pub enum PresentError {
    #[error("context init failed: {0}")]
    Init(String),

    #[error("texture allocation failed for {width}x{height}")]
    Texture { width: u32, height: u32 },

    #[error("texture upload failed: {0}")]
    Upload(String),

    #[error("buffer swap failed: {0}")]
    Swap(String),

    #[error(transparent)]
    Surface(#[from] SurfaceError),
}

// Backend state machine. Transitions are one-way: once the hardware path
// has failed there is no route back within the session.
enum Backend {
    Uninit,
    Gpu(Box<dyn QuadContext>),
    CpuOnly,
}

/// Owns the surface and presents frames taken from the handoff slot.
///
/// Runs entirely on a dedicated presenter thread; the hardware context, when
/// present, is created and used on that thread only.
pub(crate) struct Presenter {
    surface: Box<dyn Surface>,
    factory: Option<Box<dyn QuadContextFactory>>,
    backend: Backend,
    geometry: Option<(u32, u32)>,
    format: PixelFormat,
}

impl Presenter {
    pub(crate) fn new(
        surface: Box<dyn Surface>,
        factory: Option<Box<dyn QuadContextFactory>>,
        direct_r8: bool,
    ) -> Self {
        Presenter {
            surface,
            factory,
            backend: Backend::Uninit,
            geometry: None,
            format: if direct_r8 {
                PixelFormat::R8
            } else {
                PixelFormat::Rgbx8888
            },
        }
    }

    /// Consume frames until the handoff shuts down, then release the surface.
    pub(crate) fn run(&mut self, handoff: &Handoff, initial_width: u32, initial_height: u32) {
        self.ensure_geometry(initial_width, initial_height);

        let mut local = Vec::new();
        while let Some(taken) = handoff.take(&mut local) {
            self.present(handoff, &local, taken.width, taken.height);
        }

        debug!("presenter shutting down");
        self.surface.release();
    }

    fn ensure_geometry(&mut self, width: u32, height: u32) {
        if self.geometry == Some((width, height)) {
            return;
        }
        match self.surface.set_buffer_geometry(width, height, self.format) {
            Ok(()) => self.geometry = Some((width, height)),
            Err(e) => warn!(width, height, error = %e, "surface geometry change failed"),
        }
    }

    fn present(&mut self, handoff: &Handoff, frame: &[u8], width: u32, height: u32) {
        self.ensure_geometry(width, height);

        if matches!(self.backend, Backend::Uninit) {
            self.backend = match self.factory.as_mut() {
                Some(factory) => match factory.create(width, height) {
                    Ok(ctx) => {
                        info!(width, height, "hardware quad backend ready");
                        Backend::Gpu(ctx)
                    }
                    Err(e) => {
                        warn!(error = %e, "hardware init failed, using CPU blit");
                        Backend::CpuOnly
                    }
                },
                None => Backend::CpuOnly,
            };
        }

        if let Backend::Gpu(ctx) = &mut self.backend {
            match present_gpu(ctx.as_mut(), frame, width, height) {
                Ok((upload_ms, swap_ms)) => {
                    handoff.record_present(upload_ms, swap_ms);
                    return;
                }
                Err(e) => {
                    // Demote for the rest of the session and let the CPU
                    // path show this same frame.
                    warn!(error = %e, "hardware present failed, falling back to CPU blit");
                    self.backend = Backend::CpuOnly;
                }
            }
        }

        match blit::blit_frame(self.surface.as_mut(), frame, width, height, self.format) {
            Ok((blit_ms, post_ms)) => handoff.record_present(blit_ms, post_ms),
            Err(e) => warn!(error = %e, "surface blit failed"),
        }
    }
}

fn present_gpu(
    ctx: &mut dyn QuadContext,
    frame: &[u8],
    width: u32,
    height: u32,
) -> Result<(f64, f64), PresentError> {
    ctx.ensure_texture(width, height)?;

    let t0 = Instant::now();
    ctx.upload_and_draw(frame, width, height)?;
    let upload_ms = ms_since(t0);

    let t1 = Instant::now();
    ctx.swap()?;
    Ok((upload_ms, ms_since(t1)))
}
