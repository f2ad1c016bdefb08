// ABOUTME: Builder-style configuration for a mirror session
// ABOUTME: Validates host and resolution up front so the session threads never see bad values

use crate::codec::MAX_DIMENSION;
use crate::present::QuadContextFactory;
use crate::session::error::{SessionError, SessionResult};
use std::time::Duration;

/// Default stream resolution until the server sends its first
/// resolution command. (An earlier protocol variant used 1280x960; the
/// server is expected to send the real resolution before the first frame
/// either way.)
pub const DEFAULT_WIDTH: u32 = 1024;
pub const DEFAULT_HEIGHT: u32 = 768;

/// Pause between reconnect attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Wall-time span of one statistics window.
pub const DEFAULT_STATS_INTERVAL: Duration = Duration::from_secs(5);

/// Longest accepted host name, in bytes.
pub const MAX_HOST_LEN: usize = 63;

/// Configuration for one mirror session.
///
/// ```no_run
/// use inkmirror::session::SessionConfig;
///
/// let config = SessionConfig::new("192.168.0.10", 8888)?
///     .with_resolution(1448, 1072)?
///     .skip_tiny_deltas(false);
/// # Ok::<(), inkmirror::session::SessionError>(())
/// ```
pub struct SessionConfig {
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) reconnect_delay: Duration,
    pub(crate) stats_interval: Duration,
    pub(crate) skip_tiny_deltas: bool,
    pub(crate) direct_r8: bool,
    pub(crate) gpu: Option<Box<dyn QuadContextFactory>>,
}

impl SessionConfig {
    pub fn new(host: impl Into<String>, port: u16) -> SessionResult<Self> {
        let host = host.into();
        if host.len() > MAX_HOST_LEN {
            return Err(SessionError::HostTooLong(host.len()));
        }
        Ok(SessionConfig {
            host,
            port,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            stats_interval: DEFAULT_STATS_INTERVAL,
            skip_tiny_deltas: true,
            direct_r8: false,
            gpu: None,
        })
    }

    /// Resolution to allocate for before the server's first resolution
    /// command arrives.
    pub fn with_resolution(mut self, width: u32, height: u32) -> SessionResult<Self> {
        if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(SessionError::InvalidResolution { width, height });
        }
        self.width = width;
        self.height = height;
        Ok(self)
    }

    /// How long to wait between reconnect attempts.
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// How often to emit the statistics log line.
    pub fn with_stats_interval(mut self, interval: Duration) -> Self {
        self.stats_interval = interval;
        self
    }

    /// Whether deltas under 256 compressed bytes are treated as "no visible
    /// change" and skipped. On by default; turn off for servers that do not
    /// honor that encoder contract, at some CPU cost.
    pub fn skip_tiny_deltas(mut self, enabled: bool) -> Self {
        self.skip_tiny_deltas = enabled;
        self
    }

    /// Request single-channel R8 surface buffers and blit grey bytes
    /// directly. Off by default: most compositors cannot display R8.
    pub fn direct_r8(mut self, enabled: bool) -> Self {
        self.direct_r8 = enabled;
        self
    }

    /// Supply a hardware quad backend. Without one the presenter runs the
    /// CPU blit from the first frame.
    pub fn with_gpu(mut self, factory: Box<dyn QuadContextFactory>) -> Self {
        self.gpu = Some(factory);
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_protocol() {
        let config = SessionConfig::new("localhost", 8888).unwrap();
        assert_eq!((config.width, config.height), (1024, 768));
        assert_eq!(config.reconnect_delay, Duration::from_secs(1));
        assert_eq!(config.stats_interval, Duration::from_secs(5));
        assert!(config.skip_tiny_deltas);
        assert!(!config.direct_r8);
    }

    #[test]
    fn host_length_is_capped() {
        let long = "h".repeat(64);
        assert!(matches!(
            SessionConfig::new(long, 8888),
            Err(SessionError::HostTooLong(64))
        ));
        assert!(SessionConfig::new("h".repeat(63), 8888).is_ok());
    }

    #[test]
    fn resolution_bounds() {
        let config = SessionConfig::new("localhost", 8888).unwrap();
        let config = config.with_resolution(4096, 4096).unwrap();
        assert!(config.with_resolution(4097, 1).is_err());

        let config = SessionConfig::new("localhost", 8888).unwrap();
        assert!(config.with_resolution(0, 768).is_err());
    }
}
