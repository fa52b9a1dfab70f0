//! Utility modules for the SessionTap agent.
//!
//! # Modules
//!
//! - [`debounce`]: Trailing-edge debouncing for bursty change notifications

pub mod debounce;

pub use debounce::{Debouncer, DebouncerError, DEFAULT_DEBOUNCE_MS};
