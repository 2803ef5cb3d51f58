use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver};
use libsniffer_tools::{
    CaptureBackend, CaptureError, CaptureHandle, CaptureSession, CaptureState, DecodeError, FrameEvent,
    RawFrame,
};
use serde::Serialize;
use tracing::{debug, error, info, trace, warn};

use crate::decoder::decode;
use crate::observer::{BoxedObserver, ObserverRegistry, SummaryChannel};
use crate::record::{DecodedFrame, PacketSummary};
use crate::store::PacketStore;

/// Frame counters of a controller, across all sessions
#[derive(Debug, Default)]
pub struct CaptureStats {
    received: AtomicU64,
    accepted: AtomicU64,
    truncated: AtomicU64,
    invalid_header: AtomicU64,
    unsupported: AtomicU64,
}

/// Point-in-time copy of `CaptureStats`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub received: u64,
    pub accepted: u64,
    pub truncated: u64,
    pub invalid_header: u64,
    pub unsupported: u64,
}

impl CaptureStats {
    fn count_error(&self, e: &DecodeError) {
        let counter = match e {
            DecodeError::Truncated { .. } => &self.truncated,
            DecodeError::InvalidHeaderLength(_) => &self.invalid_header,
            DecodeError::UnsupportedVersion(_) => &self.unsupported,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            accepted: self.accepted.load(Ordering::Relaxed),
            truncated: self.truncated.load(Ordering::Relaxed),
            invalid_header: self.invalid_header.load(Ordering::Relaxed),
            unsupported: self.unsupported.load(Ordering::Relaxed),
        }
    }
}

/// Why a receive loop returned
#[derive(Debug)]
enum LoopEnd {
    Stopped,
    Exhausted,
    Failed(CaptureError),
}

/// Everything the receive loop needs, moved into its thread
struct LoopContext {
    session: Arc<CaptureSession>,
    store: Arc<PacketStore>,
    observers: Arc<ObserverRegistry>,
    stats: Arc<CaptureStats>,
    last_error: Arc<Mutex<Option<CaptureError>>>,
    /// Highest sequence id to store, 0 for no limit
    packet_limit: Arc<AtomicU64>,
}

impl LoopContext {
    fn limit_reached(&self) -> bool {
        match self.packet_limit.load(Ordering::SeqCst) {
            0 => false,
            limit => self.store.last_sequence_id() >= limit,
        }
    }

    fn handle_frame(&self, frame: RawFrame) {
        self.stats.received.fetch_add(1, Ordering::Relaxed);
        let link_header_len = self.session.link_header_len;
        let fields = match decode(&frame.data, link_header_len) {
            Ok(fields) => fields,
            Err(e) => {
                self.stats.count_error(&e);
                debug!("frame dropped ({} bytes): {}", frame.data.len(), e);
                return;
            }
        };
        let elapsed_seconds = frame.ts.seconds_since(self.session.started_at);
        if elapsed_seconds < 0.0 {
            warn!(
                "capture clock is not monotonic: frame at {} precedes session start {}",
                frame.ts, self.session.started_at
            );
        }
        let record = self.store.append(DecodedFrame {
            fields,
            captured_at: frame.ts,
            elapsed_seconds,
            link_header_len,
            original_len: frame.origlen,
            raw_frame: frame.data.get(link_header_len..).map(<[u8]>::to_vec).unwrap_or_default(),
        });
        self.stats.accepted.fetch_add(1, Ordering::Relaxed);
        trace!(
            "packet {}: {} -> {} {}",
            record.sequence_id,
            record.source_text,
            record.dest_text,
            record.protocol
        );
        self.observers.notify(&record);
    }

    fn run<H: CaptureHandle>(self, mut handle: H, stop: Arc<AtomicBool>) -> (H, LoopEnd) {
        debug!("receive loop started on {}", self.session.device);
        let end = loop {
            if stop.load(Ordering::SeqCst) {
                break LoopEnd::Stopped;
            }
            if self.limit_reached() {
                info!("packet limit reached, stopping capture on {}", self.session.device);
                stop.store(true, Ordering::SeqCst);
                break LoopEnd::Stopped;
            }
            match handle.next_frame() {
                Ok(FrameEvent::Frame(frame)) => {
                    // a read may complete after stop() was requested
                    if stop.load(Ordering::SeqCst) {
                        trace!("frame received after stop request, dropped");
                        break LoopEnd::Stopped;
                    }
                    self.handle_frame(frame);
                }
                Ok(FrameEvent::Timeout) => continue,
                Ok(FrameEvent::Exhausted) => break LoopEnd::Exhausted,
                Err(e) => {
                    error!("capture on {} failed: {}", self.session.device, e);
                    *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(e.clone());
                    break LoopEnd::Failed(e);
                }
            }
        };
        debug!("receive loop on {} ended: {:?}", self.session.device, end);
        (handle, end)
    }
}

/// A receive loop thread
struct Worker<H> {
    thread: JoinHandle<(H, LoopEnd)>,
    /// Disconnected when the loop returns
    finished: Receiver<()>,
}

struct ActiveSession<H> {
    session: Arc<CaptureSession>,
    /// Cancellation flag of the current (or last) receive loop
    stop: Arc<AtomicBool>,
    /// The handle, when no loop owns it
    handle: Option<H>,
    worker: Option<Worker<H>>,
}

impl<H: CaptureHandle> ActiveSession<H> {
    fn is_running(&self) -> bool {
        !self.stop.load(Ordering::SeqCst) && self.worker.as_ref().map_or(false, |w| !w.thread.is_finished())
    }

    /// Stop the receive loop, wait for it and get the handle back
    ///
    /// Returns how the loop ended, or `None` if no loop was left to reap.
    fn halt(&mut self) -> Option<LoopEnd> {
        self.stop.store(true, Ordering::SeqCst);
        let worker = self.worker.take()?;
        match worker.thread.join() {
            Ok((handle, end)) => {
                self.handle = Some(handle);
                Some(end)
            }
            Err(_) => {
                error!("receive loop on {} panicked", self.session.device);
                let e = CaptureError::HandleLost(format!("{}: receive loop panicked", self.session.device));
                Some(LoopEnd::Failed(e))
            }
        }
    }
}

/// Owns the capture device and the thread reading from it
///
/// At most one session is active. Frames read by the receive loop are
/// decoded, appended to the shared `PacketStore`, then passed to the
/// registered observers.
pub struct CaptureController<B: CaptureBackend> {
    backend: B,
    store: Arc<PacketStore>,
    observers: Arc<ObserverRegistry>,
    stats: Arc<CaptureStats>,
    last_error: Arc<Mutex<Option<CaptureError>>>,
    packet_limit: Arc<AtomicU64>,
    active: Mutex<Option<ActiveSession<B::Handle>>>,
}

impl<B: CaptureBackend> CaptureController<B> {
    pub fn new(backend: B, store: Arc<PacketStore>) -> Self {
        CaptureController {
            backend,
            store,
            observers: Arc::new(ObserverRegistry::new()),
            stats: Arc::new(CaptureStats::default()),
            last_error: Arc::new(Mutex::new(None)),
            packet_limit: Arc::new(AtomicU64::new(0)),
            active: Mutex::new(None),
        }
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveSession<B::Handle>>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn store(&self) -> &Arc<PacketStore> {
        &self.store
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn list_interfaces(&self) -> Result<Vec<String>, CaptureError> {
        self.backend.list_devices()
    }

    /// Stop receiving once the store holds the packet with sequence id `limit`
    ///
    /// The limit applies to running and future receive loops. `None` removes it.
    pub fn set_packet_limit(&self, limit: Option<u64>) {
        self.packet_limit.store(limit.unwrap_or(0), Ordering::SeqCst);
    }

    pub fn add_observer(&self, observer: BoxedObserver) {
        self.observers.add(observer);
    }

    /// Receive a `PacketSummary` for every packet accepted from now on
    pub fn subscribe(&self) -> Receiver<PacketSummary> {
        let (observer, receiver) = SummaryChannel::unbounded();
        self.observers.add(Box::new(observer));
        receiver
    }

    pub fn session(&self) -> Option<Arc<CaptureSession>> {
        self.lock_active().as_ref().map(|a| a.session.clone())
    }

    pub fn state(&self) -> CaptureState {
        match self.lock_active().as_ref() {
            None => CaptureState::Idle,
            Some(a) if a.is_running() => CaptureState::Running,
            Some(_) => CaptureState::Stopped,
        }
    }

    /// Error reported by the last receive loop that failed, if any
    pub fn take_error(&self) -> Option<CaptureError> {
        self.last_error.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    fn spawn(&self, active: &mut ActiveSession<B::Handle>, handle: B::Handle) -> Result<(), CaptureError> {
        let stop = Arc::new(AtomicBool::new(false));
        let ctx = LoopContext {
            session: active.session.clone(),
            store: self.store.clone(),
            observers: self.observers.clone(),
            stats: self.stats.clone(),
            last_error: self.last_error.clone(),
            packet_limit: self.packet_limit.clone(),
        };
        let loop_stop = stop.clone();
        let (done, finished) = bounded::<()>(0);
        let thread = thread::Builder::new()
            .name(format!("capture-{}", active.session.device))
            .spawn(move || {
                let _done = done;
                ctx.run(handle, loop_stop)
            })
            .map_err(|e| CaptureError::HandleLost(format!("could not spawn receive loop: {e}")))?;
        active.stop = stop;
        active.worker = Some(Worker { thread, finished });
        Ok(())
    }

    /// Open `device` and start capturing from it
    ///
    /// A capture already in progress is stopped first. If `device` cannot be
    /// opened, the previous session is restored in the state it was in and
    /// `CaptureError::OpenFailed` is returned.
    pub fn start(&self, device: &str) -> Result<Arc<CaptureSession>, CaptureError> {
        let mut active = self.lock_active();
        let mut previous = active.take();
        let was_running = previous.as_ref().map_or(false, |p| p.is_running());
        if let Some(p) = previous.as_mut() {
            p.halt();
        }

        let handle = match self.backend.open(device) {
            Ok(handle) => handle,
            Err(e) => {
                warn!("could not open {}: {}", device, e);
                if let Some(mut p) = previous {
                    if was_running {
                        if let Some(h) = p.handle.take() {
                            self.spawn(&mut p, h)?;
                        }
                    }
                    *active = Some(p);
                }
                return Err(e);
            }
        };
        if let Some(p) = previous {
            info!("closing capture on {}", p.session.device);
        }

        let session = Arc::new(CaptureSession::new(device, handle.link_type(), handle.start_time()));
        info!(
            "capture started on {} (link type {:?}, link header {} bytes)",
            device, session.link_type, session.link_header_len
        );
        let mut new_active = ActiveSession {
            session: session.clone(),
            stop: Arc::new(AtomicBool::new(true)),
            handle: None,
            worker: None,
        };
        self.spawn(&mut new_active, handle)?;
        *active = Some(new_active);
        Ok(session)
    }

    /// Replace the current capture device by `device`
    pub fn switch_interface(&self, device: &str) -> Result<Arc<CaptureSession>, CaptureError> {
        info!("switching capture to {}", device);
        self.start(device)
    }

    /// Ask the receive loop to stop
    ///
    /// Does not wait for the loop to exit. The loop notices the request at
    /// the next frame boundary or read timeout. Calling this when nothing is
    /// running has no effect.
    pub fn stop(&self) {
        if let Some(a) = self.lock_active().as_ref() {
            if !a.stop.swap(true, Ordering::SeqCst) {
                info!("stopping capture on {}", a.session.device);
            }
        }
    }

    /// Restart capturing on the current device, keeping the sequence numbering
    pub fn resume(&self) -> Result<(), CaptureError> {
        let mut guard = self.lock_active();
        let active = guard.as_mut().ok_or(CaptureError::NoSession)?;
        if active.is_running() {
            return Ok(());
        }
        active.halt();
        let handle = active
            .handle
            .take()
            .ok_or_else(|| CaptureError::HandleLost(format!("{}: handle unavailable", active.session.device)))?;
        info!("resuming capture on {}", active.session.device);
        self.spawn(active, handle)
    }

    /// Wait until the receive loop ends by itself (end of a capture file,
    /// device failure) or because `stop()` was called
    ///
    /// The controller stays usable while waiting: the session keeps reporting
    /// `Running` until the loop has returned.
    pub fn join(&self) -> Result<(), CaptureError> {
        let (stop, finished) = {
            let guard = self.lock_active();
            let active = guard.as_ref().ok_or(CaptureError::NoSession)?;
            match active.worker.as_ref() {
                Some(worker) => (active.stop.clone(), worker.finished.clone()),
                None => return Ok(()),
            }
        };
        // only returns on disconnection, when the loop thread exits
        let _ = finished.recv();
        let end = self
            .lock_active()
            .as_mut()
            .filter(|a| Arc::ptr_eq(&a.stop, &stop))
            .and_then(|a| a.halt());
        match end {
            Some(LoopEnd::Failed(e)) => Err(e),
            // already reaped by start, resume or close
            Some(LoopEnd::Stopped) | Some(LoopEnd::Exhausted) | None => Ok(()),
        }
    }

    /// Stop capturing and release the device
    pub fn close(&self) {
        if let Some(mut active) = self.lock_active().take() {
            active.halt();
            info!("capture on {} closed", active.session.device);
        }
    }
}

impl<B: CaptureBackend> Drop for CaptureController<B> {
    fn drop(&mut self) {
        self.close();
    }
}
