// ABOUTME: Demo client - connects to a mirror server and logs the frame stream
// ABOUTME: Stands in for a host activity; the "surface" just counts posted frames

use argh::FromArgs;
use inkmirror::host::HostEvents;
use inkmirror::session::{Mirror, SessionConfig};
use inkmirror::surface::{PixelFormat, Surface, SurfaceBuffer, SurfaceError};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(FromArgs)]
/// Receive a mirror stream and report what would have been displayed.
struct Args {
    /// server host (default 127.0.0.1)
    #[argh(option, default = "String::from(\"127.0.0.1\")")]
    host: String,

    /// server port (default 8888)
    #[argh(option, default = "8888")]
    port: u16,

    /// seconds to run before stopping (default 30)
    #[argh(option, default = "30")]
    seconds: u64,
}

/// Headless surface: accepts geometry and frames, renders nothing.
#[derive(Default)]
struct CountingSurface {
    width: u32,
    height: u32,
    bits: Vec<u8>,
    posts: u64,
}

impl Surface for CountingSurface {
    fn set_buffer_geometry(
        &mut self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<(), SurfaceError> {
        self.width = width;
        self.height = height;
        self.bits = vec![0u8; width as usize * height as usize * format.bytes_per_pixel()];
        info!(width, height, ?format, "surface geometry set");
        Ok(())
    }

    fn lock_and_post(&mut self, f: &mut dyn FnMut(SurfaceBuffer<'_>)) -> Result<(), SurfaceError> {
        f(SurfaceBuffer {
            bits: &mut self.bits,
            stride_px: self.width as usize,
            width: self.width,
            height: self.height,
        });
        self.posts += 1;
        if self.posts % 60 == 0 {
            info!(posts = self.posts, "frames presented");
        }
        Ok(())
    }

    fn release(&mut self) {
        info!(posts = self.posts, "surface released");
    }
}

struct LoggingHost;

impl HostEvents for LoggingHost {
    fn connection_state(&self, connected: bool) {
        info!(connected, "connection state");
    }

    fn set_brightness(&self, value: u8) {
        info!(value, "brightness request");
    }

    fn set_warmth(&self, value: u8) {
        info!(value, "warmth request");
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let args: Args = argh::from_env();

    let config = SessionConfig::new(args.host, args.port)?;
    let mut mirror = Mirror::new();
    mirror.start(
        config,
        Box::new(CountingSurface::default()),
        Arc::new(LoggingHost),
    )?;

    std::thread::sleep(Duration::from_secs(args.seconds));
    mirror.stop();
    Ok(())
}
