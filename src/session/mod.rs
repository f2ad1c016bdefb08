// ABOUTME: Session controller - owns both pipeline threads and the connection lifecycle
// ABOUTME: Reconnect loop, command dispatch, resolution reallocation, stats, shutdown

//! Session lifecycle.
//!
//! A [`Session`] owns the whole receive-decompress-delta-present pipeline:
//! a session thread running the network loop on a current-thread tokio
//! runtime, and a presenter thread blocking on the handoff slot. The
//! [`Mirror`] facade layers the host's idempotent start/stop contract on
//! top.
//!
//! ```no_run
//! use inkmirror::host::NullHost;
//! use inkmirror::session::{Session, SessionConfig};
//! use std::sync::Arc;
//!
//! # fn surface() -> Box<dyn inkmirror::surface::Surface> { unimplemented!() }
//! let config = SessionConfig::new("127.0.0.1", 8888)?;
//! let session = Session::start(config, surface(), Arc::new(NullHost))?;
//! // ... frames flow until ...
//! session.stop();
//! # Ok::<(), inkmirror::session::SessionError>(())
//! ```

pub mod config;
pub mod error;
mod stats;

pub use config::SessionConfig;
pub use error::{SessionError, SessionResult};

use crate::codec::{Command, Packet, MAX_DIMENSION};
use crate::connection::Connection;
use crate::handoff::Handoff;
use crate::host::HostEvents;
use crate::present::Presenter;
use crate::reconstruct::{ms_since, Applied, Ingest, Reconstructor};
use crate::surface::Surface;
use stats::ConnectionStats;
use std::collections::TryReserveError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

// State shared between the host-facing handle and both threads.
struct Shared {
    handoff: Handoff,
    running: AtomicBool,
    stop: Notify,
}

/// One start-to-stop lifecycle of the mirror client.
///
/// Dropping a session stops it; `stop` does the same explicitly and blocks
/// until both threads have joined and the surface has been released.
pub struct Session {
    shared: Arc<Shared>,
    session_thread: Option<thread::JoinHandle<()>>,
    presenter_thread: Option<thread::JoinHandle<()>>,
}

impl Session {
    /// Allocate all buffers, spawn the presenter and session threads, and
    /// begin connecting to the configured server.
    ///
    /// Allocation failure here means the session never starts; there is no
    /// partially-running state.
    pub fn start(
        mut config: SessionConfig,
        surface: Box<dyn Surface>,
        events: Arc<dyn HostEvents>,
    ) -> SessionResult<Session> {
        let reconstructor =
            Reconstructor::new(config.width, config.height, config.skip_tiny_deltas)?;
        let handoff = Handoff::new(config.width, config.height)?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let shared = Arc::new(Shared {
            handoff,
            running: AtomicBool::new(true),
            stop: Notify::new(),
        });

        let mut presenter = Presenter::new(surface, config.gpu.take(), config.direct_r8);
        let presenter_shared = Arc::clone(&shared);
        let (width, height) = (config.width, config.height);
        let presenter_thread = thread::Builder::new()
            .name("mirror-present".into())
            .spawn(move || presenter.run(&presenter_shared.handoff, width, height))?;

        let session_shared = Arc::clone(&shared);
        let session_thread = thread::Builder::new()
            .name("mirror-session".into())
            .spawn(move || {
                runtime.block_on(session_loop::run(
                    session_shared,
                    config,
                    reconstructor,
                    events,
                ));
            });

        let session_thread = match session_thread {
            Ok(handle) => handle,
            Err(e) => {
                shared.handoff.shutdown();
                let _ = presenter_thread.join();
                return Err(e.into());
            }
        };

        Ok(Session {
            shared,
            session_thread: Some(session_thread),
            presenter_thread: Some(presenter_thread),
        })
    }

    /// Stop the session: wake both threads, join them, release the surface.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        // One stored permit is enough: the session loop re-checks the
        // running flag after every wakeup.
        self.shared.stop.notify_one();
        self.shared.handoff.shutdown();

        if let Some(handle) = self.session_thread.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.presenter_thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Host-facing wrapper implementing the idempotent start/stop contract:
/// `start` while running is a no-op, `stop` while stopped is a no-op.
#[derive(Default)]
pub struct Mirror {
    session: Option<Session>,
}

impl Mirror {
    pub fn new() -> Self {
        Mirror::default()
    }

    /// Start mirroring unless a session is already live.
    pub fn start(
        &mut self,
        config: SessionConfig,
        surface: Box<dyn Surface>,
        events: Arc<dyn HostEvents>,
    ) -> SessionResult<()> {
        if self.session.is_some() {
            debug!("start ignored: session already running");
            return Ok(());
        }
        self.session = Some(Session::start(config, surface, events)?);
        Ok(())
    }

    /// Stop mirroring; blocks until the session is fully torn down.
    pub fn stop(&mut self) {
        if let Some(session) = self.session.take() {
            session.stop();
        }
    }

    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }
}

mod session_loop {
    use super::*;

    // What the packet handler decided while it still borrowed the
    // connection's payload buffer; acted on after the borrow ends.
    pub(super) enum Step {
        Absorbed {
            seq: u32,
            ingest: Ingest,
            recv_ms: f64,
            payload_len: usize,
            keyframe: bool,
        },
        Resize {
            width: u32,
            height: u32,
        },
        Quiet,
        Lost,
    }

    pub(super) async fn run(
        shared: Arc<Shared>,
        config: SessionConfig,
        mut reconstructor: Reconstructor,
        events: Arc<dyn HostEvents>,
    ) {
        while shared.running.load(Ordering::SeqCst) {
            let connect = tokio::select! {
                _ = shared.stop.notified() => break,
                c = Connection::connect(&config.host, config.port, reconstructor.pixel_count()) => c,
            };

            let mut conn = match connect {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(host = %config.host, port = config.port, error = %e, "connect failed");
                    if !sleep_unless_stopped(&shared, config.reconnect_delay).await {
                        break;
                    }
                    continue;
                }
            };

            info!(host = %config.host, port = config.port, "connected");
            events.connection_state(true);
            reconstructor.begin_connection();

            run_connection(&shared, &config, &mut conn, &mut reconstructor, &events).await;
            drop(conn);

            // Blank the display rather than leaving a stale frame up.
            reconstructor.whiteout();
            shared
                .handoff
                .publish(reconstructor.current(), shared.handoff.ready_seq().wrapping_add(1));
            events.connection_state(false);

            if !shared.running.load(Ordering::SeqCst) {
                break;
            }
            info!(delay = ?config.reconnect_delay, "disconnected, reconnecting");
            if !sleep_unless_stopped(&shared, config.reconnect_delay).await {
                break;
            }
        }
        debug!("session loop exited");
    }

    async fn run_connection(
        shared: &Shared,
        config: &SessionConfig,
        conn: &mut Connection,
        reconstructor: &mut Reconstructor,
        events: &Arc<dyn HostEvents>,
    ) {
        let mut stats = ConnectionStats::new();

        while shared.running.load(Ordering::SeqCst) {
            let t0 = Instant::now();

            let step = {
                let packet = tokio::select! {
                    _ = shared.stop.notified() => return,
                    p = conn.read_packet() => p,
                };
                handle_packet(packet, t0, reconstructor, events)
            };

            match step {
                Step::Lost => return,
                Step::Quiet => {}
                Step::Resize { width, height } => {
                    match apply_resolution(conn, reconstructor, &shared.handoff, width, height) {
                        Ok(()) => info!(width, height, "resolution changed"),
                        Err(e) => {
                            // Keep the old buffers and the old resolution.
                            warn!(width, height, error = %e, "resolution reallocation failed");
                        }
                    }
                }
                Step::Absorbed {
                    seq,
                    ingest,
                    recv_ms,
                    payload_len,
                    keyframe,
                } => {
                    if ingest.applied != Applied::Discarded {
                        if let Err(e) = conn.send_ack(seq).await {
                            warn!(seq, error = %e, "ack send failed");
                        }
                        shared.handoff.publish(reconstructor.current(), seq);
                    }

                    stats.record_frame(recv_ms, &ingest, payload_len, keyframe);
                    if stats.due(config.stats_interval) {
                        let render = shared.handoff.drain_render_stats();
                        stats.emit(reconstructor.dropped(), render);
                    }
                }
            }
        }
    }

    fn handle_packet(
        packet: Result<Option<Packet<'_>>, crate::codec::CodecError>,
        t0: Instant,
        reconstructor: &mut Reconstructor,
        events: &Arc<dyn HostEvents>,
    ) -> Step {
        match packet {
            Ok(None) => {
                info!("server closed the connection");
                Step::Lost
            }
            Err(e) => {
                warn!(error = %e, "link error");
                Step::Lost
            }
            Ok(Some(Packet::Command(command))) => match command {
                Command::Resolution { width, height } => {
                    let (width, height) = (u32::from(width), u32::from(height));
                    if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION
                    {
                        warn!(width, height, "ignoring out-of-range resolution");
                        Step::Quiet
                    } else {
                        Step::Resize { width, height }
                    }
                }
                Command::Brightness(value) => {
                    events.set_brightness(value);
                    Step::Quiet
                }
                Command::Warmth(value) => {
                    events.set_warmth(value);
                    Step::Quiet
                }
                Command::Unknown { opcode, .. } => {
                    debug!(opcode, "ignoring unknown command");
                    Step::Quiet
                }
            },
            Ok(Some(Packet::Frame { header, payload })) => {
                let recv_ms = ms_since(t0);
                reconstructor.observe_seq(header.seq);
                match reconstructor.ingest(&header, payload) {
                    Ok(ingest) => Step::Absorbed {
                        seq: header.seq,
                        ingest,
                        recv_ms,
                        payload_len: payload.len(),
                        keyframe: header.keyframe(),
                    },
                    Err(e) => {
                        // The current frame can no longer be trusted; only
                        // the next connection's keyframe recovers it.
                        warn!(seq = header.seq, error = %e, "fatal stream error");
                        Step::Lost
                    }
                }
            }
        }
    }

    /// Reallocate every frame-sized buffer for a new resolution.
    ///
    /// All five allocations (current, scratch, compressed, both handoff
    /// buffers) happen before anything is installed, so a failure leaves the
    /// session running at the old resolution with its old buffers.
    fn apply_resolution(
        conn: &mut Connection,
        reconstructor: &mut Reconstructor,
        handoff: &Handoff,
        width: u32,
        height: u32,
    ) -> Result<(), TryReserveError> {
        let frame_buffers = Reconstructor::stage_resize(width, height)?;
        let handoff_buffers = Handoff::stage_resize(width, height)?;
        conn.set_frame_budget(width as usize * height as usize)?;

        reconstructor.install(frame_buffers, width, height);
        handoff.install(handoff_buffers, width, height);
        Ok(())
    }

    async fn sleep_unless_stopped(shared: &Shared, delay: Duration) -> bool {
        tokio::select! {
            _ = shared.stop.notified() => false,
            _ = tokio::time::sleep(delay) => shared.running.load(Ordering::SeqCst),
        }
    }
}
