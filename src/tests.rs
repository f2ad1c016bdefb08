//! End-to-end scenarios: a full session driven against an in-process server.

use crate::host::HostEvents;
use crate::session::{Mirror, Session, SessionConfig};
use crate::surface::{PixelFormat, Surface, SurfaceBuffer, SurfaceError};
use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const ACK_TIMEOUT: Duration = Duration::from_secs(5);
const POLL_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct SurfaceState {
    geometry: Vec<(u32, u32)>,
    last_post: Option<Vec<u8>>,
    posts: u32,
    released: bool,
    width: u32,
    height: u32,
}

/// Surface double whose state stays observable from the test thread.
#[derive(Clone, Default)]
struct SharedSurface {
    state: Arc<Mutex<SurfaceState>>,
}

impl SharedSurface {
    fn last_post(&self) -> Option<Vec<u8>> {
        self.state.lock().unwrap().last_post.clone()
    }

    fn geometry(&self) -> Vec<(u32, u32)> {
        self.state.lock().unwrap().geometry.clone()
    }

    fn released(&self) -> bool {
        self.state.lock().unwrap().released
    }

    fn posts(&self) -> u32 {
        self.state.lock().unwrap().posts
    }
}

impl Surface for SharedSurface {
    fn set_buffer_geometry(
        &mut self,
        width: u32,
        height: u32,
        _format: PixelFormat,
    ) -> Result<(), SurfaceError> {
        let mut state = self.state.lock().unwrap();
        state.width = width;
        state.height = height;
        state.geometry.push((width, height));
        Ok(())
    }

    fn lock_and_post(&mut self, f: &mut dyn FnMut(SurfaceBuffer<'_>)) -> Result<(), SurfaceError> {
        let mut state = self.state.lock().unwrap();
        let (width, height) = (state.width, state.height);
        let mut bits = vec![0u8; width as usize * height as usize * 4];
        f(SurfaceBuffer {
            bits: &mut bits,
            stride_px: width as usize,
            width,
            height,
        });
        state.last_post = Some(bits);
        state.posts += 1;
        Ok(())
    }

    fn release(&mut self) {
        self.state.lock().unwrap().released = true;
    }
}

/// Recording double for the host-activity callbacks.
#[derive(Default)]
struct RecordingHost {
    states: Mutex<Vec<bool>>,
    brightness: Mutex<Vec<u8>>,
    warmth: Mutex<Vec<u8>>,
}

impl RecordingHost {
    fn states(&self) -> Vec<bool> {
        self.states.lock().unwrap().clone()
    }
}

impl HostEvents for RecordingHost {
    fn connection_state(&self, connected: bool) {
        self.states.lock().unwrap().push(connected);
    }

    fn set_brightness(&self, value: u8) {
        self.brightness.lock().unwrap().push(value);
    }

    fn set_warmth(&self, value: u8) {
        self.warmth.lock().unwrap().push(value);
    }
}

struct Harness {
    listener: TcpListener,
    surface: SharedSurface,
    host: Arc<RecordingHost>,
    session: Option<Session>,
}

impl Harness {
    /// Bind a server socket and start a session pointed at it.
    fn start(configure: impl FnOnce(SessionConfig) -> SessionConfig) -> Harness {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let surface = SharedSurface::default();
        let host = Arc::new(RecordingHost::default());

        let config = SessionConfig::new("127.0.0.1", port)
            .unwrap()
            .with_reconnect_delay(Duration::from_millis(50));
        let config = configure(config);

        let session = Session::start(
            config,
            Box::new(surface.clone()),
            Arc::clone(&host) as Arc<dyn HostEvents>,
        )
        .unwrap();

        Harness {
            listener,
            surface,
            host,
            session: Some(session),
        }
    }

    fn accept(&self) -> TcpStream {
        let (conn, _) = self.listener.accept().unwrap();
        conn.set_read_timeout(Some(ACK_TIMEOUT)).unwrap();
        conn
    }

    fn stop(&mut self) {
        if let Some(session) = self.session.take() {
            session.stop();
        }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.stop();
    }
}

fn resolution_cmd(width: u16, height: u16) -> Vec<u8> {
    let mut wire = vec![0xDA, 0x7F, 0x04];
    wire.extend_from_slice(&width.to_le_bytes());
    wire.extend_from_slice(&height.to_le_bytes());
    wire
}

fn value_cmd(opcode: u8, value: u8) -> Vec<u8> {
    vec![0xDA, 0x7F, opcode, value]
}

fn frame_packet(flags: u8, seq: u32, payload: &[u8]) -> Vec<u8> {
    let mut wire = vec![0xDA, 0x7E, flags];
    wire.extend_from_slice(&seq.to_le_bytes());
    wire.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    wire.extend_from_slice(payload);
    wire
}

fn keyframe_packet(seq: u32, pixels: &[u8]) -> Vec<u8> {
    frame_packet(0x01, seq, &lz4_flex::block::compress(pixels))
}

fn delta_packet(seq: u32, mask: &[u8]) -> Vec<u8> {
    frame_packet(0x00, seq, &lz4_flex::block::compress(mask))
}

fn read_ack(conn: &mut TcpStream) -> u32 {
    let mut ack = [0u8; 6];
    conn.read_exact(&mut ack).unwrap();
    assert_eq!(&ack[..2], &[0xDA, 0x7A]);
    u32::from_le_bytes([ack[2], ack[3], ack[4], ack[5]])
}

fn assert_no_ack(conn: &mut TcpStream) {
    conn.set_read_timeout(Some(Duration::from_millis(200)))
        .unwrap();
    let mut byte = [0u8; 1];
    match conn.read(&mut byte) {
        Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {}
        other => panic!("expected silence, got {other:?}"),
    }
    conn.set_read_timeout(Some(ACK_TIMEOUT)).unwrap();
}

fn wait_until<T>(mut f: impl FnMut() -> Option<T>) -> T {
    let deadline = Instant::now() + POLL_TIMEOUT;
    loop {
        if let Some(value) = f() {
            return value;
        }
        assert!(Instant::now() < deadline, "timed out waiting for condition");
        std::thread::sleep(Duration::from_millis(10));
    }
}

fn rgbx(pixels: &[u8]) -> Vec<u8> {
    pixels
        .iter()
        .flat_map(|&g| [g, g, g, 0xFF])
        .collect()
}

#[test]
fn single_keyframe_reaches_the_surface() {
    let mut harness = Harness::start(|c| c);
    let mut conn = harness.accept();

    conn.write_all(&resolution_cmd(2, 2)).unwrap();
    conn.write_all(&keyframe_packet(1, &[0x10, 0x20, 0x30, 0x40]))
        .unwrap();

    assert_eq!(read_ack(&mut conn), 1);

    let expected = rgbx(&[0x10, 0x20, 0x30, 0x40]);
    wait_until(|| (harness.surface.last_post() == Some(expected.clone())).then_some(()));
    assert_eq!(harness.host.states(), vec![true]);

    harness.stop();
}

#[test]
fn delta_composes_over_the_keyframe() {
    let mut harness = Harness::start(|c| c.skip_tiny_deltas(false));
    let mut conn = harness.accept();

    conn.write_all(&resolution_cmd(2, 2)).unwrap();
    conn.write_all(&keyframe_packet(1, &[0x10, 0x20, 0x30, 0x40]))
        .unwrap();
    assert_eq!(read_ack(&mut conn), 1);

    conn.write_all(&delta_packet(2, &[0x01, 0x02, 0x00, 0xFF]))
        .unwrap();
    assert_eq!(read_ack(&mut conn), 2);

    let expected = rgbx(&[0x11, 0x22, 0x30, 0xBF]);
    wait_until(|| (harness.surface.last_post() == Some(expected.clone())).then_some(()));

    harness.stop();
}

#[test]
fn corrupt_delta_is_dropped_without_an_ack() {
    let mut harness = Harness::start(|c| c.skip_tiny_deltas(false));
    let mut conn = harness.accept();

    conn.write_all(&resolution_cmd(2, 2)).unwrap();
    conn.write_all(&keyframe_packet(1, &[0x10, 0x20, 0x30, 0x40]))
        .unwrap();
    assert_eq!(read_ack(&mut conn), 1);

    // Decompresses to three bytes instead of four.
    conn.write_all(&delta_packet(2, &[0x01, 0x02, 0x03])).unwrap();
    assert_no_ack(&mut conn);

    // The stream is still alive and the frame unchanged; a good delta
    // composes against the keyframe, not the corrupt one.
    conn.write_all(&delta_packet(3, &[0x01, 0x01, 0x01, 0x01]))
        .unwrap();
    assert_eq!(read_ack(&mut conn), 3);

    let expected = rgbx(&[0x11, 0x21, 0x31, 0x41]);
    wait_until(|| (harness.surface.last_post() == Some(expected.clone())).then_some(()));

    harness.stop();
}

#[test]
fn corrupt_keyframe_forces_a_reconnect() {
    let mut harness = Harness::start(|c| c);
    let mut conn = harness.accept();

    conn.write_all(&resolution_cmd(2, 2)).unwrap();
    conn.write_all(&frame_packet(0x01, 1, &[0xDE, 0xAD, 0xBE, 0xEF]))
        .unwrap();

    // The client drops the link and dials again.
    let mut second = harness.accept();
    wait_until(|| {
        let states = harness.host.states();
        (states == vec![true, false, true]).then_some(())
    });

    // The fresh connection recovers with a mandatory keyframe.
    second.write_all(&resolution_cmd(2, 2)).unwrap();
    second
        .write_all(&keyframe_packet(1, &[0x50, 0x60, 0x70, 0x80]))
        .unwrap();
    assert_eq!(read_ack(&mut second), 1);

    harness.stop();
}

#[test]
fn resolution_change_reallocates_and_resizes_the_surface() {
    let mut harness = Harness::start(|c| c);
    let mut conn = harness.accept();

    conn.write_all(&resolution_cmd(2, 2)).unwrap();
    conn.write_all(&keyframe_packet(1, &[0x01, 0x02, 0x03, 0x04]))
        .unwrap();
    assert_eq!(read_ack(&mut conn), 1);

    let big: Vec<u8> = (0..16).map(|i| i * 16).collect();
    conn.write_all(&resolution_cmd(4, 4)).unwrap();
    conn.write_all(&keyframe_packet(2, &big)).unwrap();
    assert_eq!(read_ack(&mut conn), 2);

    let expected = rgbx(&big);
    wait_until(|| (harness.surface.last_post() == Some(expected.clone())).then_some(()));

    let geometry = harness.surface.geometry();
    assert!(geometry.contains(&(2, 2)));
    assert!(geometry.contains(&(4, 4)));

    harness.stop();
}

#[test]
fn stale_delta_after_resolution_change_is_rejected_until_a_keyframe() {
    let mut harness = Harness::start(|c| c.skip_tiny_deltas(false));
    let mut conn = harness.accept();

    conn.write_all(&resolution_cmd(2, 2)).unwrap();
    conn.write_all(&keyframe_packet(1, &[0x10, 0x20, 0x30, 0x40]))
        .unwrap();
    assert_eq!(read_ack(&mut conn), 1);

    // Resolution changes but the next delta is still sized for 2x2: it must
    // be rejected without an ack and without corrupting the frame.
    conn.write_all(&resolution_cmd(4, 4)).unwrap();
    conn.write_all(&delta_packet(2, &[0x01, 0x02, 0x03, 0x04]))
        .unwrap();
    assert_no_ack(&mut conn);

    // The first keyframe at the new size restores a valid frame.
    let big = [0x33u8; 16];
    conn.write_all(&keyframe_packet(3, &big)).unwrap();
    assert_eq!(read_ack(&mut conn), 3);

    let expected = rgbx(&big);
    wait_until(|| (harness.surface.last_post() == Some(expected.clone())).then_some(()));

    harness.stop();
}

#[test]
fn unknown_command_is_consumed_and_ignored() {
    let mut harness = Harness::start(|c| c);
    let mut conn = harness.accept();

    conn.write_all(&resolution_cmd(2, 2)).unwrap();
    conn.write_all(&value_cmd(0x77, 0x00)).unwrap();
    conn.write_all(&keyframe_packet(1, &[0x0A, 0x0B, 0x0C, 0x0D]))
        .unwrap();

    // Exactly one value byte was consumed: the keyframe parses and acks.
    assert_eq!(read_ack(&mut conn), 1);
    assert!(harness.host.brightness.lock().unwrap().is_empty());
    assert!(harness.host.warmth.lock().unwrap().is_empty());

    harness.stop();
}

#[test]
fn brightness_and_warmth_reach_the_host() {
    let mut harness = Harness::start(|c| c);
    let mut conn = harness.accept();

    conn.write_all(&value_cmd(0x01, 0x80)).unwrap();
    conn.write_all(&value_cmd(0x02, 0x40)).unwrap();

    wait_until(|| {
        let brightness = harness.host.brightness.lock().unwrap().clone();
        let warmth = harness.host.warmth.lock().unwrap().clone();
        (brightness == vec![0x80] && warmth == vec![0x40]).then_some(())
    });

    harness.stop();
}

#[test]
fn disconnect_blanks_the_surface_white() {
    let mut harness = Harness::start(|c| c);
    let mut conn = harness.accept();

    conn.write_all(&resolution_cmd(2, 2)).unwrap();
    conn.write_all(&keyframe_packet(1, &[0x00, 0x00, 0x00, 0x00]))
        .unwrap();
    assert_eq!(read_ack(&mut conn), 1);

    let black = rgbx(&[0x00, 0x00, 0x00, 0x00]);
    wait_until(|| (harness.surface.last_post() == Some(black.clone())).then_some(()));

    drop(conn);

    let white = rgbx(&[0xFF, 0xFF, 0xFF, 0xFF]);
    wait_until(|| (harness.surface.last_post() == Some(white.clone())).then_some(()));
    wait_until(|| {
        harness
            .host
            .states()
            .windows(2)
            .any(|w| w == [true, false])
            .then_some(())
    });

    harness.stop();
}

#[test]
fn tiny_deltas_are_acked_but_not_applied_by_default() {
    let mut harness = Harness::start(|c| c);
    let mut conn = harness.accept();

    conn.write_all(&resolution_cmd(2, 2)).unwrap();
    conn.write_all(&keyframe_packet(1, &[0x10, 0x20, 0x30, 0x40]))
        .unwrap();
    assert_eq!(read_ack(&mut conn), 1);

    let unchanged = rgbx(&[0x10, 0x20, 0x30, 0x40]);
    wait_until(|| (harness.surface.last_post() == Some(unchanged.clone())).then_some(()));
    let posts_before = harness.surface.posts();

    // Well under the 256-byte threshold: acked, republished, not applied.
    conn.write_all(&delta_packet(2, &[0xFF, 0xFF, 0xFF, 0xFF]))
        .unwrap();
    assert_eq!(read_ack(&mut conn), 2);

    wait_until(|| (harness.surface.posts() > posts_before).then_some(()));
    assert_eq!(harness.surface.last_post(), Some(unchanged.clone()));

    harness.stop();
}

#[test]
fn stop_tears_down_threads_and_releases_the_surface() {
    let mut harness = Harness::start(|c| c);
    let mut conn = harness.accept();

    conn.write_all(&resolution_cmd(2, 2)).unwrap();
    conn.write_all(&keyframe_packet(1, &[1, 2, 3, 4])).unwrap();
    assert_eq!(read_ack(&mut conn), 1);

    harness.stop();
    assert!(harness.surface.released());
}

#[test]
fn mirror_start_is_idempotent() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let surface = SharedSurface::default();
    let host = Arc::new(RecordingHost::default());

    let mut mirror = Mirror::new();
    let config = SessionConfig::new("127.0.0.1", port).unwrap();
    mirror
        .start(
            config,
            Box::new(surface.clone()),
            Arc::clone(&host) as Arc<dyn HostEvents>,
        )
        .unwrap();
    assert!(mirror.is_running());

    // Second start with a live session is a no-op.
    let config = SessionConfig::new("127.0.0.1", port).unwrap();
    mirror
        .start(
            config,
            Box::new(SharedSurface::default()),
            Arc::clone(&host) as Arc<dyn HostEvents>,
        )
        .unwrap();
    assert!(mirror.is_running());

    let _conn = listener.accept().unwrap();

    mirror.stop();
    assert!(!mirror.is_running());
    assert!(surface.released());

    mirror.stop(); // stop twice is fine
}
