//! The relay worker.
//!
//! A `RelayWorker` opens its transport in `start()`, then hands it to a
//! dedicated thread that repeats one iteration until asked to stop:
//!
//! 1. check the stop flag, and if raised close the transport and exit
//! 2. transmit at most one frame from the outbound queue
//! 3. wait (bounded) for one frame from the bus
//! 4. drop it if its ID is on the block-list
//! 5. otherwise push it onto the inbound queue
//!
//! Outbound frames are serviced before the blocking receive so that a queued
//! frame waits at most one iteration. Only one is sent per iteration.
//!
//! Faults inside the loop never end it. They are counted in `WorkerStats`
//! and logged.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use crate::constants::DEFAULT_RECEIVE_TIMEOUT_MS;
use crate::errors::WorkerError;
use crate::filter::IdFilter;
use crate::queue::FrameQueue;
use crate::transport::{ChannelParams, Connector, Transport};

/// Granularity of the receive-error back-off, so a stop request cuts it short.
const BACKOFF_SLICE: Duration = Duration::from_millis(5);

/// Lifecycle of a relay worker.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    /// Constructed, no transport open.
    Created = 0,
    /// The relay thread owns an open transport.
    Running = 1,
    /// Stop was requested; the thread exits at its next iteration boundary.
    StopRequested = 2,
    /// The thread has closed the transport and ended.
    Stopped = 3,
}

impl WorkerState {
    fn from_u8(v: u8) -> WorkerState {
        match v {
            0 => WorkerState::Created,
            1 => WorkerState::Running,
            2 => WorkerState::StopRequested,
            _ => WorkerState::Stopped,
        }
    }
}

/// What a single iteration did with the bus side.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Step {
    /// A frame was received and pushed onto the inbound queue.
    Forwarded,
    /// A frame was received but its ID is blocked.
    Dropped,
    /// Nothing arrived within the receive timeout.
    Idle,
}

/// Counters for everything the loop does, including the faults it swallows.
#[derive(Debug, Default)]
pub struct WorkerStats {
    forwarded: AtomicU64,
    dropped: AtomicU64,
    transmitted: AtomicU64,
    transmit_failures: AtomicU64,
    receive_errors: AtomicU64,
}

/// A point-in-time copy of `WorkerStats`.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub forwarded: u64,
    pub dropped: u64,
    pub transmitted: u64,
    pub transmit_failures: u64,
    pub receive_errors: u64,
}

impl WorkerStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            forwarded: self.forwarded.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            transmitted: self.transmitted.load(Ordering::Relaxed),
            transmit_failures: self.transmit_failures.load(Ordering::Relaxed),
            receive_errors: self.receive_errors.load(Ordering::Relaxed),
        }
    }

    #[inline]
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// The per-iteration protocol, independent of any thread.
///
/// `RelayWorker` drives one of these from its thread; tests can drive one
/// directly with `step()`.
pub struct Relay {
    transport: Box<dyn Transport>,
    filter: Arc<IdFilter>,
    inbound: FrameQueue,
    outbound: FrameQueue,
    receive_timeout: Duration,
    stats: Arc<WorkerStats>,
    stop: Arc<AtomicBool>,
}

impl Relay {
    pub fn new(transport: Box<dyn Transport>,
               filter: Arc<IdFilter>,
               inbound: FrameQueue,
               outbound: FrameQueue,
               receive_timeout: Duration)
               -> Relay {
        Relay {
            transport,
            filter,
            inbound,
            outbound,
            receive_timeout,
            stats: Arc::new(WorkerStats::default()),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    fn with_stats(mut self, stats: Arc<WorkerStats>) -> Relay {
        self.stats = stats;
        self
    }

    fn with_stop(mut self, stop: Arc<AtomicBool>) -> Relay {
        self.stop = stop;
        self
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Run one iteration: transmit at most one outbound frame, then receive,
    /// filter and forward at most one inbound frame.
    pub fn step(&mut self) -> Step {
        self.service_outbound();

        let frame = match self.transport.receive(self.receive_timeout) {
            Ok(Some(frame)) => frame,
            Ok(None) => return Step::Idle,
            Err(e) => {
                WorkerStats::bump(&self.stats.receive_errors);
                warn!("receive failed: {}", e);
                self.back_off();
                return Step::Idle;
            }
        };

        if self.filter.should_drop(frame.id()) {
            WorkerStats::bump(&self.stats.dropped);
            debug!("blocked {:X}", frame);
            return Step::Dropped;
        }

        debug!("rx {:X}", frame);
        self.inbound.push(frame);
        WorkerStats::bump(&self.stats.forwarded);
        Step::Forwarded
    }

    /// Wait up to one receive timeout so a persistently failing bus does not
    /// spin. Ends early once stop is requested.
    fn back_off(&self) {
        let deadline = Instant::now() + self.receive_timeout;
        while !self.stop.load(Ordering::Acquire) {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                break;
            }
            thread::sleep(left.min(BACKOFF_SLICE));
        }
    }

    fn service_outbound(&mut self) {
        let frame = match self.outbound.try_pop() {
            Some(frame) => frame,
            None => return,
        };

        match self.transport.transmit(&frame) {
            Ok(()) => {
                WorkerStats::bump(&self.stats.transmitted);
                debug!("tx {:X}", frame);
            }
            Err(e) => {
                WorkerStats::bump(&self.stats.transmit_failures);
                warn!("dropping outbound frame {:X}: {}", frame, e);
            }
        }
    }

    /// Release the transport.
    pub fn close(self) {
        self.transport.close();
    }
}

impl fmt::Debug for Relay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relay")
            .field("filter", &self.filter)
            .field("receive_timeout", &self.receive_timeout)
            .finish()
    }
}

/// State shared between the worker handle and its thread.
#[derive(Debug)]
struct Shared {
    state: AtomicU8,
    stop: Arc<AtomicBool>,
    stats: Arc<WorkerStats>,
}

impl Shared {
    fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn transition(&self, from: WorkerState, to: WorkerState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn set_state(&self, to: WorkerState) {
        self.state.store(to as u8, Ordering::Release);
    }

    fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
        if !self.transition(WorkerState::Running, WorkerState::StopRequested) {
            // Never started: there is no transport to release.
            self.transition(WorkerState::Created, WorkerState::Stopped);
        }
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Undo `Created -> Running` after the thread failed to spawn. A stop
    /// that arrived in between wins.
    fn abandon_start(&self) {
        if !self.transition(WorkerState::Running, WorkerState::Created) {
            self.set_state(WorkerState::Stopped);
        }
    }
}

/// Raises a worker's stop flag from anywhere, e.g. a signal handler.
#[derive(Debug, Clone)]
pub struct StopHandle {
    shared: Arc<Shared>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.shared.request_stop();
    }
}

/// RelayWorker
///
/// Owns the connection parameters, the block-list and handles to both
/// queues. Sequence it as `start()`, then `stop()`, `join()` and finally
/// `drain()` if the queues should start clean next time.
pub struct RelayWorker<C: Connector = ChannelParams> {
    connector: C,
    filter: Arc<IdFilter>,
    inbound: FrameQueue,
    outbound: FrameQueue,
    receive_timeout: Duration,
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl<C: Connector> RelayWorker<C> {
    /// Store everything needed to run. Nothing is opened or validated yet.
    pub fn new(connector: C, filter: IdFilter, inbound: FrameQueue, outbound: FrameQueue) -> RelayWorker<C> {
        RelayWorker {
            connector,
            filter: Arc::new(filter),
            inbound,
            outbound,
            receive_timeout: Duration::from_millis(DEFAULT_RECEIVE_TIMEOUT_MS),
            shared: Arc::new(Shared {
                state: AtomicU8::new(WorkerState::Created as u8),
                stop: Arc::new(AtomicBool::new(false)),
                stats: Arc::new(WorkerStats::default()),
            }),
            handle: None,
        }
    }

    /// Bound on each receive call. This is also the worst-case delay between
    /// `stop()` and the thread noticing it.
    pub fn with_receive_timeout(mut self, timeout: Duration) -> RelayWorker<C> {
        self.receive_timeout = timeout;
        self
    }

    /// Open the transport and spawn the relay thread.
    ///
    /// If the transport cannot be opened the worker stays `Created` and
    /// `start()` may be called again.
    pub fn start(&mut self) -> Result<(), WorkerError> {
        let state = self.state();
        if state != WorkerState::Created {
            return Err(WorkerError::InvalidState(state));
        }

        let transport = self.connector.connect().map_err(|e| {
            warn!("cannot open {}: {}", self.connector, e);
            WorkerError::TransportUnavailable(e)
        })?;

        if !self.shared.transition(WorkerState::Created, WorkerState::Running) {
            // Stopped through a `StopHandle` while we were connecting.
            transport.close();
            return Err(WorkerError::InvalidState(self.state()));
        }

        let relay = Relay::new(transport,
                               Arc::clone(&self.filter),
                               self.inbound.clone(),
                               self.outbound.clone(),
                               self.receive_timeout)
            .with_stats(Arc::clone(&self.shared.stats))
            .with_stop(Arc::clone(&self.shared.stop));
        let shared = Arc::clone(&self.shared);
        let label = self.connector.to_string();

        let spawned = thread::Builder::new()
            .name(format!("canrelay {}", label))
            .spawn(move || run(relay, shared, label));

        match spawned {
            Ok(handle) => {
                info!("relay on {} started", self.connector);
                self.handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                // The closure, and the transport inside it, was dropped.
                error!("cannot spawn relay thread for {}: {}", self.connector, e);
                self.shared.abandon_start();
                Err(WorkerError::Spawn(e))
            }
        }
    }

    /// Ask the relay thread to exit at its next iteration boundary.
    ///
    /// Never blocks and may be called any number of times.
    pub fn stop(&self) {
        if !self.shared.stop_requested() {
            debug!("stop requested for {}", self.connector);
        }
        self.shared.request_stop();
    }

    /// A handle that can stop this worker from another thread.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Block until the relay thread has ended.
    ///
    /// Returns at once if the worker never started. Without a prior `stop()`
    /// this waits forever, since the loop only ends when asked to.
    pub fn join(&mut self) {
        let handle = match self.handle.take() {
            Some(handle) => handle,
            None => return,
        };

        debug!("waiting for relay thread on {}", self.connector);
        if handle.join().is_err() {
            error!("relay thread on {} panicked", self.connector);
            self.shared.set_state(WorkerState::Stopped);
        }
    }

    /// Discard anything left on both queues. Returns the number of frames
    /// dropped.
    ///
    /// Call after `join()`: a frame pushed by a still-running loop after the
    /// drain would survive it.
    pub fn drain(&self) -> usize {
        match self.state() {
            WorkerState::Running | WorkerState::StopRequested => {
                warn!("draining queues of {} while the relay thread is active", self.connector)
            }
            WorkerState::Created | WorkerState::Stopped => {}
        }

        let n = self.inbound.drain() + self.outbound.drain();
        if n > 0 {
            debug!("drained {} stale frames for {}", n, self.connector);
        }
        n
    }

    pub fn state(&self) -> WorkerState {
        self.shared.state()
    }

    /// `true` once the relay thread has ended, or if it never started.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    pub fn inbound(&self) -> &FrameQueue {
        &self.inbound
    }

    pub fn outbound(&self) -> &FrameQueue {
        &self.outbound
    }

    pub fn filter(&self) -> &IdFilter {
        &self.filter
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }
}

impl<C: Connector> Drop for RelayWorker<C> {
    fn drop(&mut self) {
        // Signal shutdown but don't block; `join()` is for waiting.
        self.shared.request_stop();
    }
}

impl<C: Connector> fmt::Debug for RelayWorker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayWorker")
            .field("connector", &format_args!("{}", self.connector))
            .field("state", &self.state())
            .field("receive_timeout", &self.receive_timeout)
            .finish()
    }
}

/// Body of the relay thread.
fn run(mut relay: Relay, shared: Arc<Shared>, label: String) {
    debug!("relay thread on {} entering loop", label);

    while !shared.stop_requested() {
        relay.step();
    }

    relay.close();
    shared.set_state(WorkerState::Stopped);

    let stats = shared.stats.snapshot();
    info!("relay on {} stopped: {} forwarded, {} blocked, {} sent, {} send failures, {} receive errors",
          label,
          stats.forwarded,
          stats.dropped,
          stats.transmitted,
          stats.transmit_failures,
          stats.receive_errors);
}
