// ABOUTME: Capability trait for calls back into the host activity
// ABOUTME: Keeps the core decoupled from any particular host runtime

/// Callbacks the session makes into the host.
///
/// All calls happen on the session thread and should return quickly; a slow
/// callback stalls packet processing. Tests supply a recording double.
pub trait HostEvents: Send + Sync {
    /// The TCP link came up or went down.
    fn connection_state(&self, connected: bool);

    /// Server asked for a backlight brightness change.
    fn set_brightness(&self, value: u8);

    /// Server asked for a backlight warmth change.
    fn set_warmth(&self, value: u8);
}

/// Host that ignores every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullHost;

impl HostEvents for NullHost {
    fn connection_state(&self, _connected: bool) {}
    fn set_brightness(&self, _value: u8) {}
    fn set_warmth(&self, _value: u8) {}
}
