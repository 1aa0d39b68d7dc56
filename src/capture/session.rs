use log::{debug, error, info, trace, warn};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::capture::filter::CompiledFilter;
use crate::capture::source::{FrameSource, Interrupter, PcapSource, ReadOutcome};
use crate::models::config::AppConfig;
use crate::models::interface::CaptureDevice;
use crate::models::packet::RawFrame;
use crate::utils::error::{OpenError, SessionError};

/// Consecutive read errors tolerated before the capture loop gives up
const MAX_CONSECUTIVE_ERRORS: u32 = 5;

/// Pause after a read error so a persistent failure does not spin
const ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Lifecycle of a capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Idle,
    Opened,
    Capturing,
    /// Stop requested or the capture thread has exited; not yet closed
    Stopping,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "Idle",
            SessionState::Opened => "Opened",
            SessionState::Capturing => "Capturing",
            SessionState::Stopping => "Stopping",
            SessionState::Closed => "Closed",
        };
        f.pad(name)
    }
}

/// Why the capture thread exited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EndReason {
    /// A stop was requested (operator key or a [`StopHandle`])
    Stopped,
    /// The configured packet count was delivered
    CountReached,
    /// The device reported end of capture
    EndOfCapture,
    /// Too many consecutive read errors
    Failed,
}

/// What the capture thread reports once it has exited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CaptureSummary {
    pub frames_delivered: u64,
    pub reason: EndReason,
}

impl CaptureSummary {
    /// The summary, or an error if the device stopped answering
    pub fn into_result(self) -> Result<Self, SessionError> {
        match self.reason {
            EndReason::Failed => Err(SessionError::ReadFailed {
                frames_delivered: self.frames_delivered,
            }),
            _ => Ok(self),
        }
    }
}

struct StopShared {
    /// Set while the session is capturing; stop requests before that are ignored
    armed: AtomicBool,
    /// Sticky stop request
    requested: AtomicBool,
    interrupter: Mutex<Option<Interrupter>>,
}

/// Cloneable, thread-safe handle onto a session's stop signal
///
/// Both the operator key and the packet-count limit converge here, so the
/// capture loop has a single condition to check.
#[derive(Clone)]
pub struct StopHandle {
    shared: Arc<StopShared>,
}

impl StopHandle {
    fn new() -> Self {
        Self {
            shared: Arc::new(StopShared {
                armed: AtomicBool::new(false),
                requested: AtomicBool::new(false),
                interrupter: Mutex::new(None),
            }),
        }
    }

    /// Request the capture loop to stop and abort a blocked read
    ///
    /// Idempotent. Returns `true` only for the call that actually set the
    /// signal. Does nothing unless the session is capturing.
    pub fn stop(&self) -> bool {
        if !self.shared.armed.load(Ordering::SeqCst) {
            return false;
        }
        if self.shared.requested.swap(true, Ordering::SeqCst) {
            return false;
        }
        if let Some(interrupt) = self.shared.interrupter.lock().as_ref() {
            interrupt();
        }
        true
    }

    /// Whether a stop has been requested
    pub fn is_stopped(&self) -> bool {
        self.shared.requested.load(Ordering::SeqCst)
    }

    fn arm(&self, interrupter: Option<Interrupter>) {
        *self.shared.interrupter.lock() = interrupter;
        self.shared.armed.store(true, Ordering::SeqCst);
    }
}

impl fmt::Debug for StopHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StopHandle")
            .field("armed", &self.shared.armed.load(Ordering::SeqCst))
            .field("requested", &self.is_stopped())
            .finish()
    }
}

/// Owns one capture device and the thread that reads from it
///
/// `Idle --open--> Opened --start--> Capturing --stop--> Stopping --join/close--> Closed`
pub struct CaptureSession<S: FrameSource = PcapSource> {
    state: SessionState,
    source: Option<S>,
    filter: Option<CompiledFilter>,
    stop: StopHandle,
    max_packets: Option<u64>,
    capture_thread: Option<JoinHandle<(S, CaptureSummary)>>,
    summary: Option<CaptureSummary>,
}

impl<S: FrameSource> CaptureSession<S> {
    /// An idle session; `max_packets` stops capture after that many frames
    pub fn new(max_packets: Option<u64>) -> Self {
        Self {
            state: SessionState::Idle,
            source: None,
            filter: None,
            stop: StopHandle::new(),
            max_packets,
            capture_thread: None,
            summary: None,
        }
    }

    /// Take ownership of an already configured source
    pub fn attach(&mut self, source: S, filter: CompiledFilter) -> Result<(), SessionError> {
        if self.state != SessionState::Idle {
            return Err(SessionError::InvalidState { op: "open", state: self.state });
        }
        self.source = Some(source);
        self.filter = Some(filter);
        self.state = SessionState::Opened;
        Ok(())
    }

    /// Current lifecycle state
    ///
    /// A capturing session reports `Stopping` as soon as a stop has been
    /// requested or its thread has exited on its own.
    pub fn state(&self) -> SessionState {
        match self.state {
            SessionState::Capturing if self.stop.is_stopped() || self.is_finished() => SessionState::Stopping,
            state => state,
        }
    }

    /// Handle that can stop this session from any thread
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// The filter applied to the device, once opened
    pub fn filter(&self) -> Option<&CompiledFilter> {
        self.filter.as_ref()
    }

    /// Whether the capture thread has exited (it may still need joining)
    pub fn is_finished(&self) -> bool {
        match &self.capture_thread {
            Some(handle) => handle.is_finished(),
            None => self.summary.is_some(),
        }
    }

    /// Spawn the capture thread
    ///
    /// `on_packet` runs on the capture thread, synchronously and in capture
    /// order, once per delivered frame. It must not block: a slow callback
    /// throttles capture.
    pub fn start<F>(&mut self, on_packet: F) -> Result<(), SessionError>
    where
        F: FnMut(RawFrame) + Send + 'static,
    {
        if self.state != SessionState::Opened {
            return Err(SessionError::InvalidState { op: "start", state: self.state });
        }
        let mut source = match self.source.take() {
            Some(source) => source,
            None => return Err(SessionError::InvalidState { op: "start", state: self.state }),
        };

        self.stop.arm(source.interrupter());
        let stop = self.stop.clone();
        let max_packets = self.max_packets;

        let spawned = thread::Builder::new()
            .name("capture".to_string())
            .spawn(move || {
                let summary = run_capture(&mut source, &stop, max_packets, on_packet);
                (source, summary)
            });

        match spawned {
            Ok(handle) => {
                info!("Capture thread started");
                self.capture_thread = Some(handle);
                self.state = SessionState::Capturing;
                Ok(())
            }
            Err(e) => {
                error!("Failed to spawn capture thread: {}", e);
                // The source went down with the closure
                self.state = SessionState::Closed;
                Err(SessionError::Spawn(e))
            }
        }
    }

    /// Request the capture thread to stop; a no-op unless capturing
    pub fn stop(&mut self) {
        if self.state != SessionState::Capturing {
            debug!("Stop ignored in state {}", self.state);
            return;
        }
        if self.stop.stop() {
            info!("Stopping packet capture");
        }
    }

    /// Wait for the capture thread to exit and take back the device
    ///
    /// Blocks until the thread observes a stop, reaches its packet count, or
    /// the device ends the capture.
    pub fn join(&mut self) -> Result<CaptureSummary, SessionError> {
        let handle = match self.capture_thread.take() {
            Some(handle) => handle,
            None => match self.summary {
                Some(summary) => return Ok(summary),
                None => return Err(SessionError::InvalidState { op: "join", state: self.state() }),
            },
        };

        match handle.join() {
            Ok((source, summary)) => {
                info!(
                    "Capture thread exited after {} frames ({:?})",
                    summary.frames_delivered, summary.reason
                );
                self.source = Some(source);
                self.summary = Some(summary);
                self.state = SessionState::Stopping;
                Ok(summary)
            }
            Err(_) => {
                error!("Capture thread panicked");
                self.state = SessionState::Stopping;
                Err(SessionError::CaptureThreadPanicked)
            }
        }
    }

    /// Release the device
    ///
    /// # Panics
    ///
    /// Panics if the capture thread has been started but not joined: the
    /// device is still in use by that thread.
    pub fn close(&mut self) {
        if self.capture_thread.is_some() {
            panic!("CaptureSession::close called before the capture thread was joined");
        }
        if self.state == SessionState::Idle {
            return;
        }
        self.source = None;
        self.filter = None;
        self.state = SessionState::Closed;
        info!("Capture device closed");
    }

    /// Summary of the finished capture, once joined
    pub fn summary(&self) -> Option<CaptureSummary> {
        self.summary
    }
}

impl CaptureSession<PcapSource> {
    /// Open `device` for live capture with `filter` applied
    ///
    /// On failure the session stays `Idle` and nothing is left open.
    pub fn open(&mut self, device: &CaptureDevice, filter: CompiledFilter, config: &AppConfig) -> Result<(), OpenError> {
        if self.state != SessionState::Idle {
            return Err(SessionError::InvalidState { op: "open", state: self.state }.into());
        }
        let source = PcapSource::open(device, &filter, config)?;
        self.attach(source, filter)?;
        Ok(())
    }
}

impl<S: FrameSource> Drop for CaptureSession<S> {
    fn drop(&mut self) {
        if let Some(handle) = self.capture_thread.take() {
            warn!("Capture session dropped while capturing, stopping capture thread");
            self.stop.stop();
            let _ = handle.join();
        }
    }
}

/// The capture loop; runs on the capture thread
fn run_capture<S, F>(source: &mut S, stop: &StopHandle, max_packets: Option<u64>, mut on_packet: F) -> CaptureSummary
where
    S: FrameSource,
    F: FnMut(RawFrame),
{
    let link_type = source.link_type();
    let mut delivered: u64 = 0;
    let mut consecutive_errors = 0;

    let reason = loop {
        if stop.is_stopped() {
            break EndReason::Stopped;
        }

        match source.next_frame() {
            Ok(ReadOutcome::Frame(frame)) => {
                consecutive_errors = 0;
                // Frames read after a stop request are not accepted
                if stop.is_stopped() {
                    break EndReason::Stopped;
                }

                delivered += 1;
                trace!("Captured frame #{}: {} bytes", delivered, frame.data.len());
                on_packet(RawFrame {
                    seq: delivered,
                    timestamp: frame.timestamp,
                    link_type,
                    data: frame.data,
                    orig_len: frame.orig_len,
                });

                if max_packets.is_some_and(|max| delivered >= max) {
                    info!("Packet count limit of {} reached", delivered);
                    stop.stop();
                    break EndReason::CountReached;
                }
            }
            Ok(ReadOutcome::Timeout) => {
                trace!("Packet capture timed out, continuing");
            }
            Ok(ReadOutcome::Finished) => {
                if stop.is_stopped() {
                    break EndReason::Stopped;
                }
                info!("Device reported end of capture");
                break EndReason::EndOfCapture;
            }
            Err(e) => {
                error!("Error capturing packet: {}", e);
                consecutive_errors += 1;
                if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                    error!("Too many consecutive errors ({}), stopping capture", consecutive_errors);
                    break EndReason::Failed;
                }
                thread::sleep(ERROR_BACKOFF);
            }
        }
    };

    CaptureSummary {
        frames_delivered: delivered,
        reason,
    }
}
