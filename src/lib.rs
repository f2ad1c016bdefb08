//! Client half of a low-latency greyscale screen-mirroring link.
//!
//! Receives LZ4-compressed keyframe/XOR-delta frames over a single TCP
//! stream, reconstructs the current frame, acknowledges each packet, and
//! presents frames to a host-supplied surface - through a hardware textured
//! quad when the host provides a context, or a SIMD CPU blit otherwise.

pub mod codec;
pub mod connection;
pub mod handoff;
pub mod host;
pub mod pixel;
pub mod present;
pub mod reconstruct;
pub mod session;
pub mod surface;

#[cfg(test)]
mod tests;

// Re-export the host-facing API for easy access
pub use host::{HostEvents, NullHost};
pub use present::{PresentError, QuadContext, QuadContextFactory};
pub use session::{Mirror, Session, SessionConfig, SessionError, SessionResult};
pub use surface::{PixelFormat, Surface, SurfaceBuffer, SurfaceError};
