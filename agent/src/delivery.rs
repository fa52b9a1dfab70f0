//! Batch delivery to the collector.
//!
//! This module handles transmitting captured events with:
//!
//! - A single POST per batch to `<apiEndpoint>/api/events`
//! - Connection pooling and a request timeout via reqwest
//! - Success only on a 2xx status whose body is empty or JSON; an unreadable
//!   or non-JSON body is a failure
//! - No retries of its own: a failed batch is handed back to the caller, which
//!   requeues it (see [`crate::buffer::EventBuffer::requeue_front`])
//! - A [`RetryPolicy`] describing how long the caller waits between attempts
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use sessiontap_agent::delivery::{Delivery, HttpDelivery};
//! use sessiontap_agent::types::{CapturedEvent, EventPayload};
//!
//! #[tokio::main]
//! async fn main() {
//!     let delivery = HttpDelivery::new("https://collector.example.com", Duration::from_secs(30))
//!         .unwrap();
//!
//!     let batch = vec![CapturedEvent::now(EventPayload::Click {
//!         x: 100,
//!         y: 200,
//!         target: "button".to_string(),
//!     })];
//!
//!     delivery.send("session-id", "site-id", &batch).await.unwrap();
//! }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::types::CapturedEvent;

/// Path of the ingest route, relative to the configured endpoint.
const EVENTS_PATH: &str = "/api/events";

/// Default HTTP request timeout.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Initial retry delay in seconds.
const INITIAL_RETRY_DELAY_SECS: u64 = 1;

/// Maximum retry delay in seconds.
const MAX_RETRY_DELAY_SECS: u64 = 60;

/// Jitter factor (±25%).
const JITTER_FACTOR: f64 = 0.25;

/// Errors that can occur while delivering a batch.
#[derive(Error, Debug)]
pub enum DeliveryError {
    /// Transport failure (connection refused, DNS, timeout, ...).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Collector answered with a non-success status.
    #[error("collector error: {status} - {message}")]
    Status { status: u16, message: String },

    /// The batch could not be serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(String),
}

/// Transmits batches of captured events.
///
/// Implementations perform exactly one round trip per call and never mutate
/// shared state. Any error is a transmission failure; the caller decides
/// whether and when to retry.
#[async_trait]
pub trait Delivery: Send + Sync {
    /// Sends `batch` on behalf of `session_id` and `site_id`.
    ///
    /// # Errors
    ///
    /// Returns a [`DeliveryError`] on transport failure, timeout, a
    /// non-success response, or a success response whose body is not JSON.
    async fn send(
        &self,
        session_id: &str,
        site_id: &str,
        batch: &[CapturedEvent],
    ) -> Result<(), DeliveryError>;
}

/// Request body sent to the collector.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EventBatchRequest<'a> {
    session_id: &'a str,
    website_id: &'a str,
    events: &'a [CapturedEvent],
}

/// reqwest-backed [`Delivery`] implementation.
#[derive(Debug, Clone)]
pub struct HttpDelivery {
    client: Client,
    events_url: String,
}

impl HttpDelivery {
    /// Creates a client posting to `<api_endpoint>/api/events`.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::ClientBuild` if the underlying HTTP client
    /// cannot be created.
    pub fn new(api_endpoint: &str, request_timeout: Duration) -> Result<Self, DeliveryError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .pool_max_idle_per_host(4)
            .build()
            .map_err(|e| DeliveryError::ClientBuild(e.to_string()))?;

        Ok(Self {
            client,
            events_url: events_url(api_endpoint),
        })
    }
}

#[async_trait]
impl Delivery for HttpDelivery {
    async fn send(
        &self,
        session_id: &str,
        site_id: &str,
        batch: &[CapturedEvent],
    ) -> Result<(), DeliveryError> {
        let body = serde_json::to_vec(&EventBatchRequest {
            session_id,
            website_id: site_id,
            events: batch,
        })?;

        debug!(
            url = %self.events_url,
            events = batch.len(),
            bytes = body.len(),
            "Sending event batch"
        );

        let response = self
            .client
            .post(&self.events_url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(DeliveryError::Status {
                status: status.as_u16(),
                message: text,
            });
        }

        // An empty body (e.g. 204) is an acknowledgement; anything else must be JSON
        if !text.trim().is_empty() {
            let ack: serde_json::Value = serde_json::from_str(&text)?;
            debug!(status = status.as_u16(), response = %ack, "Collector acknowledged batch");
        }

        info!(events = batch.len(), "Events sent successfully");
        Ok(())
    }
}

/// Builds the ingest URL from a collector base URL.
fn events_url(api_endpoint: &str) -> String {
    format!("{}{EVENTS_PATH}", api_endpoint.trim_end_matches('/'))
}

/// Delay policy applied between failed delivery attempts.
///
/// Delays start at `initial_delay`, double after each consecutive failure up
/// to `max_delay`, and are randomized by `jitter_factor`. A successful send
/// resets the sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(INITIAL_RETRY_DELAY_SECS),
            max_delay: Duration::from_secs(MAX_RETRY_DELAY_SECS),
            jitter_factor: JITTER_FACTOR,
        }
    }
}

impl RetryPolicy {
    /// Retries on the very next flush tick, with no backoff.
    #[must_use]
    pub fn immediate() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter_factor: 0.0,
        }
    }

    /// Short deterministic delays for tests.
    #[must_use]
    pub fn fast_for_tests() -> Self {
        Self {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(40),
            jitter_factor: 0.0,
        }
    }
}

/// Consecutive-failure state driven by a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    current: Duration,
    consecutive_failures: u32,
}

impl Backoff {
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            current: policy.initial_delay,
            consecutive_failures: 0,
        }
    }

    /// Records a failure and returns how long to wait before the next attempt.
    pub fn record_failure(&mut self) -> Duration {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        let delay = self.add_jitter(self.current);
        self.current = (self.current * 2).min(self.policy.max_delay);
        delay
    }

    /// Records a success, resetting the delay sequence.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.current = self.policy.initial_delay;
    }

    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Adds ±`jitter_factor` jitter to a duration.
    fn add_jitter(&self, duration: Duration) -> Duration {
        if duration.is_zero() || self.policy.jitter_factor <= 0.0 {
            return duration;
        }

        let mut rng = rand::rng();
        let jitter_range = duration.as_secs_f64() * self.policy.jitter_factor;
        let jitter = rng.random_range(-jitter_range..=jitter_range);
        Duration::from_secs_f64((duration.as_secs_f64() + jitter).max(0.0))
    }
}
