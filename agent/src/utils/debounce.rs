//! Trailing-edge debounce for bursty notifications.
//!
//! Structural changes tend to arrive in bursts. The debouncer holds a single
//! pending deadline: every notification pushes it out to `now + interval`, and
//! only when the deadline passes without another notification does it emit
//! once. The emitted value is the number of notifications coalesced into the
//! burst.
//!
//! # Architecture
//!
//! Notifications are sent from synchronous code through a bounded channel to a
//! background task that owns the deadline. Dropping the [`Debouncer`] closes
//! the channel; the task then exits without emitting any pending burst.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use tokio::sync::mpsc;
//! use sessiontap_agent::utils::debounce::Debouncer;
//!
//! #[tokio::main]
//! async fn main() {
//!     let (output_tx, mut output_rx) = mpsc::channel(8);
//!     let debouncer = Debouncer::new(Duration::from_millis(1000), output_tx);
//!
//!     debouncer.notify().unwrap();
//!     debouncer.notify().unwrap();
//!     debouncer.notify().unwrap();
//!
//!     // One second after the last notification, a single burst is emitted
//!     assert_eq!(output_rx.recv().await, Some(3));
//! }
//! ```

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// Default debounce interval for structural-change notifications.
pub const DEFAULT_DEBOUNCE_MS: u64 = 1000;

/// Capacity of the notification channel. Overflowing notifications are
/// harmless: a full channel already guarantees a pending burst.
const INPUT_CAPACITY: usize = 1024;

/// Error type for debouncer operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebouncerError {
    /// The debouncer's background task has terminated.
    ChannelClosed,
}

impl std::fmt::Display for DebouncerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ChannelClosed => write!(f, "debouncer channel closed"),
        }
    }
}

impl std::error::Error for DebouncerError {}

/// A single-slot trailing-edge debouncer.
#[derive(Debug)]
pub struct Debouncer {
    /// Channel for sending notifications to the background task.
    input_tx: mpsc::Sender<()>,
}

impl Debouncer {
    /// Creates a new debouncer with the specified quiet interval.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Arguments
    ///
    /// * `interval` - Quiet period required after the last notification
    /// * `output_tx` - Channel receiving one burst size per settled burst
    #[must_use]
    pub fn new(interval: Duration, output_tx: mpsc::Sender<usize>) -> Self {
        let (input_tx, input_rx) = mpsc::channel(INPUT_CAPACITY);

        tokio::spawn(async move {
            run_debounce_loop(interval, input_rx, output_tx).await;
        });

        Self { input_tx }
    }

    /// Records a notification, resetting the pending deadline.
    ///
    /// Never blocks. A full channel is treated as success since a burst is
    /// already pending.
    ///
    /// # Errors
    ///
    /// Returns `DebouncerError::ChannelClosed` if the background task has
    /// terminated.
    pub fn notify(&self) -> Result<(), DebouncerError> {
        match self.input_tx.try_send(()) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(())) => Ok(()),
            Err(mpsc::error::TrySendError::Closed(())) => Err(DebouncerError::ChannelClosed),
        }
    }
}

/// Runs the debounce loop until the input channel closes.
async fn run_debounce_loop(
    interval: Duration,
    mut input_rx: mpsc::Receiver<()>,
    output_tx: mpsc::Sender<usize>,
) {
    let mut deadline: Option<Instant> = None;
    let mut burst = 0usize;

    debug!(interval_ms = interval.as_millis(), "Starting debounce loop");

    loop {
        tokio::select! {
            notification = input_rx.recv() => {
                match notification {
                    Some(()) => {
                        burst += 1;
                        deadline = Some(Instant::now() + interval);
                        trace!(burst, "Notification received, deadline reset");
                    }
                    None => {
                        if burst > 0 {
                            debug!(burst, "Input channel closed, dropping pending burst");
                        }
                        break;
                    }
                }
            }

            () = sleep_until_deadline(deadline) => {
                deadline = None;
                let settled = std::mem::take(&mut burst);
                trace!(burst = settled, "Burst settled");
                if output_tx.send(settled).await.is_err() {
                    warn!("Debounce output closed");
                    break;
                }
            }
        }
    }

    debug!("Debounce loop terminated");
}

/// Sleeps until `deadline`, or forever when nothing is pending.
async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
