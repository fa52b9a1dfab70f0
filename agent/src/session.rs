//! Capture session orchestration.
//!
//! A [`CaptureSession`] owns one session identifier and wires raw input
//! signals into the event buffer and the snapshot pipeline:
//!
//! ```text
//! pointer / scroll ──▶ Throttle ──┐
//! click ──────────────────────────┼──▶ EventBuffer ──▶ flush loop ──▶ Delivery
//! content change ──▶ Debouncer ──▶ SnapshotDiffer ──┘        ▲            │
//!                                                            └─ requeue ◀─┘ (on failure)
//! ```
//!
//! The session starts running inside [`CaptureSession::new`]: the initial
//! snapshot is captured synchronously and the periodic flush is scheduled one
//! [`FLUSH_INTERVAL`] later. [`CaptureSession::stop`] is terminal.
//!
//! Capture entry points are synchronous and never wait on the network. The
//! only suspension point is the delivery call inside a flush cycle, and at most
//! one flush cycle is in flight at a time, so batches are always delivered in
//! capture order.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::buffer::EventBuffer;
use crate::config::Config;
use crate::content::ContentSource;
use crate::delivery::{Backoff, Delivery, HttpDelivery};
use crate::error::Result;
use crate::snapshot::SnapshotDiffer;
use crate::throttle::{Throttle, POINTER_COOLDOWN, SCROLL_COOLDOWN};
use crate::types::{CapturedEvent, EventPayload};
use crate::utils::debounce::{Debouncer, DEFAULT_DEBOUNCE_MS};

/// Interval between periodic flushes.
pub const FLUSH_INTERVAL: Duration = Duration::from_millis(1000);

/// Quiet period required after a structural change before snapshotting.
pub const SNAPSHOT_DEBOUNCE: Duration = Duration::from_millis(DEFAULT_DEBOUNCE_MS);

/// Result of a single flush cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was buffered; no request was made.
    Empty,
    /// The batch of this many events was acknowledged.
    Delivered(usize),
    /// Delivery failed and this many events were requeued.
    Requeued(usize),
}

/// A running (or stopped) capture session.
pub struct CaptureSession {
    shared: Arc<Shared>,
    stop_tx: watch::Sender<bool>,
    debouncer: Mutex<Option<Debouncer>>,
}

/// State shared between the session handle and its background tasks.
struct Shared {
    session_id: String,
    site_id: String,
    debug_logging: bool,
    running: AtomicBool,
    buffer: Mutex<EventBuffer>,
    pointer_throttle: Mutex<Throttle>,
    scroll_throttle: Mutex<Throttle>,
    differ: Mutex<SnapshotDiffer>,
    content: Arc<dyn ContentSource>,
    delivery: Arc<dyn Delivery>,
    /// Size of the batch currently out for delivery, 0 when none.
    in_flight: AtomicUsize,
    /// Held for the whole of a flush cycle; at most one batch is in flight.
    flight: tokio::sync::Mutex<FlightState>,
}

#[derive(Debug)]
struct FlightState {
    backoff: Backoff,
    retry_at: Option<Instant>,
}

impl CaptureSession {
    /// Validates `config`, starts capturing, and schedules periodic delivery.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `AgentError::Config` if the configuration is invalid. This is
    /// the only condition that prevents a session from starting.
    pub fn new(
        config: Config,
        content: Arc<dyn ContentSource>,
        delivery: Arc<dyn Delivery>,
    ) -> Result<Self> {
        config.validate()?;

        let buffer = match config.max_queue_len {
            Some(max_len) => EventBuffer::with_max_len(max_len),
            None => EventBuffer::new(),
        };

        let shared = Arc::new(Shared {
            session_id: Uuid::new_v4().to_string(),
            site_id: config.site_id,
            debug_logging: config.debug_logging,
            running: AtomicBool::new(true),
            buffer: Mutex::new(buffer),
            pointer_throttle: Mutex::new(Throttle::new(POINTER_COOLDOWN)),
            scroll_throttle: Mutex::new(Throttle::new(SCROLL_COOLDOWN)),
            differ: Mutex::new(SnapshotDiffer::new()),
            content,
            delivery,
            in_flight: AtomicUsize::new(0),
            flight: tokio::sync::Mutex::new(FlightState {
                backoff: Backoff::new(config.retry),
                retry_at: None,
            }),
        });

        info!(
            session_id = %shared.session_id,
            site_id = %shared.site_id,
            "Capture session started"
        );

        shared.capture_snapshot();

        let (stop_tx, stop_rx) = watch::channel(false);
        tokio::spawn(run_flush_loop(Arc::clone(&shared), stop_rx));

        let (settled_tx, settled_rx) = mpsc::channel(4);
        let debouncer = Debouncer::new(SNAPSHOT_DEBOUNCE, settled_tx);
        tokio::spawn(run_snapshot_loop(Arc::clone(&shared), settled_rx));

        Ok(Self {
            shared,
            stop_tx,
            debouncer: Mutex::new(Some(debouncer)),
        })
    }

    /// Starts a session that delivers over HTTP to `config.api_endpoint`.
    ///
    /// # Errors
    ///
    /// Returns `AgentError::Config` for invalid configuration and
    /// `AgentError::Delivery` if the HTTP client cannot be built.
    pub fn with_http_delivery(config: Config, content: Arc<dyn ContentSource>) -> Result<Self> {
        config.validate()?;
        let delivery = HttpDelivery::new(&config.api_endpoint, config.request_timeout)?;
        Self::new(config, content, Arc::new(delivery))
    }

    /// Returns the opaque session identifier.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.shared.session_id
    }

    #[must_use]
    pub fn site_id(&self) -> &str {
        &self.shared.site_id
    }

    /// Returns true until [`stop`](Self::stop) has been called.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Returns the number of events waiting for delivery (excluding any batch
    /// currently in flight).
    #[must_use]
    pub fn pending_events(&self) -> usize {
        lock(&self.shared.buffer).len()
    }

    /// Records a pointer position, subject to the pointer throttle.
    ///
    /// Returns `true` if an event was captured.
    pub fn pointer_moved(&self, x: i32, y: i32) -> bool {
        if !self.is_running() {
            return false;
        }
        if !lock(&self.shared.pointer_throttle).try_acquire(Instant::now()) {
            return false;
        }
        self.shared
            .enqueue(CapturedEvent::now(EventPayload::PointerMove { x, y }));
        true
    }

    /// Records a click. Clicks are never throttled.
    ///
    /// Returns `true` if an event was captured.
    pub fn clicked(&self, x: i32, y: i32, target: &str) -> bool {
        if !self.is_running() {
            return false;
        }
        self.shared.enqueue(CapturedEvent::now(EventPayload::Click {
            x,
            y,
            target: target.to_ascii_lowercase(),
        }));
        true
    }

    /// Records a scroll position, subject to the scroll throttle.
    ///
    /// Returns `true` if an event was captured.
    pub fn scrolled(&self, x: i32, y: i32) -> bool {
        if !self.is_running() {
            return false;
        }
        if !lock(&self.shared.scroll_throttle).try_acquire(Instant::now()) {
            return false;
        }
        self.shared
            .enqueue(CapturedEvent::now(EventPayload::Scroll { x, y }));
        true
    }

    /// Notes that the observed content changed.
    ///
    /// A snapshot is taken once no further change has arrived for
    /// [`SNAPSHOT_DEBOUNCE`].
    pub fn content_changed(&self) {
        if !self.is_running() {
            return;
        }
        if let Some(debouncer) = lock(&self.debouncer).as_ref() {
            if let Err(e) = debouncer.notify() {
                self.shared.log_failure(|| warn!(error = %e, "Change notification dropped"));
            }
        }
    }

    /// Runs one flush cycle now, waiting for any in-flight cycle first.
    ///
    /// Ignores retry backoff. Cancelling the returned future while the
    /// request is in flight requeues the batch.
    pub async fn flush_now(&self) -> FlushOutcome {
        let mut flight = self.shared.flight.lock().await;
        self.shared.flush_cycle(&mut flight).await
    }

    /// Stops capture and cancels the periodic flush.
    ///
    /// Idempotent. Buffered events are not flushed (see
    /// [`shutdown`](Self::shutdown)), and a send already in flight is allowed
    /// to complete; its batch is requeued if it fails.
    pub fn stop(&self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return;
        }

        self.stop_tx.send_replace(true);
        lock(&self.debouncer).take();

        info!(
            session_id = %self.shared.session_id,
            pending_events = self.pending_events(),
            "Capture session stopped"
        );
    }

    /// Stops the session, then attempts a final flush bounded by `timeout`.
    ///
    /// # Returns
    ///
    /// The number of events that could not be delivered: everything still
    /// buffered, plus a batch the periodic flush had in flight when the
    /// timeout expired. That batch may still be acknowledged afterwards.
    pub async fn shutdown(&self, timeout: Duration) -> usize {
        self.stop();

        match time::timeout(timeout, self.flush_now()).await {
            Ok(FlushOutcome::Empty) => {}
            Ok(FlushOutcome::Delivered(count)) => {
                info!(events = count, "Flushed buffer before shutdown");
            }
            Ok(FlushOutcome::Requeued(count)) => {
                error!(events = count, "Failed to flush buffer during shutdown");
            }
            Err(_) => {
                error!("Timeout while flushing buffer during shutdown");
            }
        }

        self.pending_events() + self.shared.in_flight.load(Ordering::SeqCst)
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSession")
            .field("session_id", &self.shared.session_id)
            .field("site_id", &self.shared.site_id)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl Shared {
    fn enqueue(&self, event: CapturedEvent) {
        trace!(kind = ?event.kind(), "Captured event");
        lock(&self.buffer).enqueue(event);
    }

    /// Takes a sanitized snapshot and enqueues it if the content changed.
    ///
    /// The differ stays locked until the event is queued, so snapshot events
    /// enter the buffer in the order their digests were recorded.
    fn capture_snapshot(&self) {
        let mut differ = lock(&self.differ);
        match differ.capture(self.content.as_ref()) {
            Ok(Some(event)) => self.enqueue(event),
            Ok(None) => {}
            Err(e) => self.log_failure(|| warn!(error = %e, "Snapshot skipped")),
        }
    }

    async fn flush_cycle(&self, flight: &mut FlightState) -> FlushOutcome {
        let batch = {
            let mut buffer = lock(&self.buffer);
            buffer.flush()
        };
        let Some(batch) = batch else {
            return FlushOutcome::Empty;
        };

        let count = batch.len();
        let mut in_flight = InFlightBatch::new(self, batch);

        match self
            .delivery
            .send(&self.session_id, &self.site_id, in_flight.events())
            .await
        {
            Ok(()) => {
                in_flight.acknowledge();
                flight.backoff.record_success();
                flight.retry_at = None;
                debug!(events = count, "Batch delivered");
                FlushOutcome::Delivered(count)
            }
            Err(e) => {
                drop(in_flight);
                let delay = flight.backoff.record_failure();
                flight.retry_at = Some(Instant::now() + delay);
                self.log_failure(|| {
                    warn!(
                        error = %e,
                        events = count,
                        consecutive_failures = flight.backoff.consecutive_failures(),
                        retry_in_ms = delay.as_millis(),
                        "Delivery failed, batch requeued"
                    );
                });
                FlushOutcome::Requeued(count)
            }
        }
    }

    /// Failures are only reported when debug logging is enabled.
    fn log_failure(&self, log: impl FnOnce()) {
        if self.debug_logging {
            log();
        }
    }
}

/// A batch taken out of the buffer for delivery.
///
/// Unless acknowledged, the batch is put back at the head of the buffer when
/// this guard is dropped, including when the flush future is cancelled.
struct InFlightBatch<'a> {
    shared: &'a Shared,
    events: Option<Vec<CapturedEvent>>,
}

impl<'a> InFlightBatch<'a> {
    fn new(shared: &'a Shared, events: Vec<CapturedEvent>) -> Self {
        shared.in_flight.store(events.len(), Ordering::SeqCst);
        Self {
            shared,
            events: Some(events),
        }
    }

    fn events(&self) -> &[CapturedEvent] {
        self.events.as_deref().unwrap_or_default()
    }

    fn acknowledge(&mut self) {
        self.events = None;
        self.shared.in_flight.store(0, Ordering::SeqCst);
    }
}

impl Drop for InFlightBatch<'_> {
    fn drop(&mut self) {
        if let Some(events) = self.events.take() {
            let mut buffer = lock(&self.shared.buffer);
            buffer.requeue_front(events);
            self.shared.in_flight.store(0, Ordering::SeqCst);
        }
    }
}

/// Fires a flush cycle every [`FLUSH_INTERVAL`] until stopped.
async fn run_flush_loop(shared: Arc<Shared>, mut stop_rx: watch::Receiver<bool>) {
    let mut ticker = time::interval_at(Instant::now() + FLUSH_INTERVAL, FLUSH_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = stop_rx.changed() => break,
            _ = ticker.tick() => {}
        }

        let mut flight = shared.flight.lock().await;
        if let Some(retry_at) = flight.retry_at {
            if Instant::now() < retry_at {
                trace!("Flush deferred by retry backoff");
                continue;
            }
        }

        shared.flush_cycle(&mut flight).await;
    }

    debug!(session_id = %shared.session_id, "Flush loop terminated");
}

/// Snapshots the content each time a burst of changes settles.
async fn run_snapshot_loop(shared: Arc<Shared>, mut settled_rx: mpsc::Receiver<usize>) {
    while let Some(burst) = settled_rx.recv().await {
        if !shared.running.load(Ordering::SeqCst) {
            break;
        }
        trace!(burst, "Structural changes settled");
        shared.capture_snapshot();
    }

    debug!(session_id = %shared.session_id, "Snapshot loop terminated");
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
