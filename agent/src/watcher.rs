//! Document watcher for the command-line host.
//!
//! The CLI observes a document tree stored as JSON on disk. This module
//! watches that single file and emits a [`DocumentEvent`] whenever it is
//! written, replaced, or removed, so the host can reload the tree and tell the
//! capture session that the content changed.
//!
//! # Architecture
//!
//! The parent directory is watched non-recursively and events are filtered by
//! file name. Editors commonly save through a temporary file and a rename,
//! which a watch on the file itself would miss.
//!
//! The notify callback runs on notify's own thread. It only classifies the
//! event and forwards it with `try_send`; all reloading happens on the
//! receiving side.
//!
//! # Example
//!
//! ```no_run
//! use std::path::PathBuf;
//! use tokio::sync::mpsc;
//! use sessiontap_agent::watcher::{DocumentEvent, DocumentWatcher};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (tx, mut rx) = mpsc::channel(16);
//!     let _watcher = DocumentWatcher::new(PathBuf::from("page.json"), tx)?;
//!
//!     while let Some(event) = rx.recv().await {
//!         match event {
//!             DocumentEvent::Changed => println!("document changed"),
//!             DocumentEvent::Removed => println!("document removed"),
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use notify::{
    event::{CreateKind, ModifyKind, RemoveKind},
    Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

/// Changes to the watched document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentEvent {
    /// The document was written or replaced.
    Changed,
    /// The document was removed.
    Removed,
}

/// Errors that can occur while watching the document.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// Failed to initialize the file system watcher.
    #[error("failed to create watcher: {0}")]
    WatcherInit(#[from] notify::Error),

    /// Failed to resolve the document path.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The document does not exist.
    #[error("document does not exist: {0}")]
    FileNotFound(PathBuf),

    /// Failed to send event through the channel.
    #[error("failed to send event: channel closed")]
    ChannelClosed,
}

/// Result type for watcher operations.
pub type Result<T> = std::result::Result<T, WatcherError>;

/// Watches a single document file for changes.
///
/// Dropping the watcher ends the subscription.
#[derive(Debug)]
pub struct DocumentWatcher {
    /// Kept alive to maintain the watch subscription.
    #[allow(dead_code)]
    watcher: RecommendedWatcher,
}

impl DocumentWatcher {
    /// Starts watching `document`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The document does not exist
    /// - Its path cannot be canonicalized
    /// - The file system watcher cannot be initialized
    pub fn new(document: PathBuf, event_sender: mpsc::Sender<DocumentEvent>) -> Result<Self> {
        if !document.is_file() {
            return Err(WatcherError::FileNotFound(document));
        }

        let document = document.canonicalize()?;
        let file_name = document
            .file_name()
            .map(OsString::from)
            .ok_or_else(|| WatcherError::FileNotFound(document.clone()))?;
        let parent = document
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| WatcherError::FileNotFound(document.clone()))?;

        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| {
                handle_notify_event(res, &file_name, &event_sender);
            },
            Config::default(),
        )?;
        watcher.watch(&parent, RecursiveMode::NonRecursive)?;

        info!(document = %document.display(), "Watching document");

        Ok(Self { watcher })
    }
}

/// Forwards events that concern the watched file.
fn handle_notify_event(
    res: std::result::Result<Event, notify::Error>,
    file_name: &OsString,
    event_sender: &mpsc::Sender<DocumentEvent>,
) {
    let event = match res {
        Ok(event) => event,
        Err(e) => {
            error!(error = %e, "File watcher error");
            return;
        }
    };

    trace!(kind = ?event.kind, paths = ?event.paths, "Received notify event");

    if !event
        .paths
        .iter()
        .any(|path| path.file_name() == Some(file_name.as_os_str()))
    {
        return;
    }

    let Some(document_event) = classify(&event.kind) else {
        trace!(kind = ?event.kind, "Ignoring event kind");
        return;
    };

    debug!(event = ?document_event, "Document event");

    match event_sender.try_send(document_event) {
        Ok(()) => {}
        // A pending event already covers this one
        Err(mpsc::error::TrySendError::Full(_)) => {}
        Err(mpsc::error::TrySendError::Closed(_)) => {
            warn!("Document event receiver closed");
        }
    }
}

/// Maps a notify event kind onto a document event.
fn classify(kind: &EventKind) -> Option<DocumentEvent> {
    match kind {
        EventKind::Create(CreateKind::File | CreateKind::Any)
        | EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Name(_) | ModifyKind::Any) => {
            Some(DocumentEvent::Changed)
        }
        EventKind::Remove(RemoveKind::File | RemoveKind::Any) => Some(DocumentEvent::Removed),
        _ => None,
    }
}
