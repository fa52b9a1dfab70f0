//! SessionTap Agent - client-side session telemetry.
//!
//! This crate captures user interactions (pointer movement, clicks, scrolling)
//! and periodic structural snapshots of the observed content, buffers them in
//! capture order, and delivers them in batches to a collector.
//!
//! # Overview
//!
//! A [`CaptureSession`] is the entry point. It throttles high-frequency
//! signals, debounces structural changes before snapshotting, and flushes the
//! [`EventBuffer`] once per second. A failed delivery puts the batch back at
//! the head of the buffer, so events are never reordered or silently dropped.
//!
//! # Privacy
//!
//! Snapshots pass through the [`privacy`] sanitizer before they are buffered:
//! script elements and inline event handlers are removed, and password and
//! hidden input values are cleared.
//!
//! # Modules
//!
//! - [`types`]: Captured event types and wire format
//! - [`buffer`]: Ordered event queue with requeue-at-head
//! - [`throttle`]: Leading-edge throttling for pointer and scroll signals
//! - [`content`]: Content tree model and the [`ContentSource`] capability
//! - [`privacy`]: Snapshot sanitization
//! - [`snapshot`]: Digest-based snapshot deduplication
//! - [`delivery`]: HTTP batch delivery and retry policy
//! - [`session`]: The capture session orchestrator
//! - [`config`]: Configuration from environment variables
//! - [`error`]: Error types for agent operations
//! - [`watcher`]: Document file watcher used by the CLI
//! - [`utils`]: Shared utilities (debouncing)

pub mod buffer;
pub mod config;
pub mod content;
pub mod delivery;
pub mod error;
pub mod privacy;
pub mod session;
pub mod snapshot;
pub mod throttle;
pub mod types;
pub mod utils;
pub mod watcher;

pub use buffer::EventBuffer;
pub use config::{Config, ConfigError};
pub use content::{load_document, ContentError, ContentSource, DomNode, StaticContent};
pub use delivery::{Delivery, DeliveryError, HttpDelivery, RetryPolicy};
pub use error::{AgentError, Result};
pub use privacy::{sanitize, SanitizeError};
pub use session::{CaptureSession, FlushOutcome};
pub use snapshot::{SnapshotDiffer, SnapshotError};
pub use types::{CapturedEvent, EventKind, EventPayload, Viewport};
pub use utils::{Debouncer, DebouncerError, DEFAULT_DEBOUNCE_MS};
pub use watcher::{DocumentEvent, DocumentWatcher, WatcherError};
