//! Deduplicated structural snapshots.
//!
//! The differ reads the current tree from a [`ContentSource`], sanitizes it,
//! and produces a `structuralSnapshot` event only when the sanitized markup
//! differs from the last one it emitted. Comparison uses a SHA-256 digest of
//! the markup, so the previous snapshot text does not need to be retained.

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, trace};

use crate::content::{render_markup, ContentError, ContentSource};
use crate::privacy::{sanitize, SanitizeError};
use crate::types::{CapturedEvent, EventPayload};

/// Errors that abort a single snapshot cycle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    /// The content source could not produce a tree.
    #[error("content error: {0}")]
    Content(#[from] ContentError),

    /// The tree could not be sanitized.
    #[error("sanitization error: {0}")]
    Sanitize(#[from] SanitizeError),
}

/// SHA-256 digest of sanitized snapshot markup.
pub type SnapshotDigest = [u8; 32];

/// Tracks the last emitted snapshot and suppresses unchanged ones.
#[derive(Debug, Default)]
pub struct SnapshotDiffer {
    last_emitted_digest: Option<SnapshotDigest>,
}

impl SnapshotDiffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Computes a sanitized snapshot and returns an event if content changed.
    ///
    /// The stored digest is updated before this method returns, so the next
    /// call always compares against the snapshot emitted here. On error the
    /// stored digest is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError`] if the tree is unavailable or malformed.
    pub fn capture(
        &mut self,
        source: &dyn ContentSource,
    ) -> Result<Option<CapturedEvent>, SnapshotError> {
        let document = source.document()?;
        let html = render_markup(&sanitize(document)?);

        if !self.observe(&html) {
            trace!(bytes = html.len(), "Snapshot unchanged, suppressed");
            return Ok(None);
        }

        debug!(bytes = html.len(), "Snapshot changed, emitting");

        Ok(Some(CapturedEvent::now(EventPayload::StructuralSnapshot {
            html,
            viewport: source.viewport(),
            url: source.location(),
        })))
    }

    /// Records `markup` as emitted if it differs from the last emission.
    ///
    /// Returns `true` when the markup is new.
    pub fn observe(&mut self, markup: &str) -> bool {
        let digest = digest(markup);
        if self.last_emitted_digest == Some(digest) {
            return false;
        }
        self.last_emitted_digest = Some(digest);
        true
    }

    /// Returns the digest of the last emitted snapshot, if any.
    #[must_use]
    pub fn last_emitted_digest(&self) -> Option<&SnapshotDigest> {
        self.last_emitted_digest.as_ref()
    }
}

fn digest(markup: &str) -> SnapshotDigest {
    let mut hasher = Sha256::new();
    hasher.update(markup.as_bytes());
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{DomNode, StaticContent};
    use crate::types::{EventKind, Viewport};

    fn source(doc: DomNode) -> StaticContent {
        StaticContent::new(
            doc,
            Viewport {
                width: 1024,
                height: 768,
            },
            "https://shop.test/checkout",
        )
    }

    fn page(text: &str) -> DomNode {
        DomNode::element("body").with_child(DomNode::element("p").with_child(DomNode::text(text)))
    }

    #[test]
    fn test_first_capture_emits() {
        let mut differ = SnapshotDiffer::new();
        let event = differ
            .capture(&source(page("hello")))
            .unwrap()
            .expect("first snapshot");

        assert_eq!(event.kind(), EventKind::StructuralSnapshot);
        let EventPayload::StructuralSnapshot {
            html,
            viewport,
            url,
        } = event.payload()
        else {
            panic!("unexpected payload");
        };
        assert_eq!(html, "<body><p>hello</p></body>");
        assert_eq!(viewport.width, 1024);
        assert_eq!(url, "https://shop.test/checkout");
        assert!(differ.last_emitted_digest().is_some());
    }

    #[test]
    fn test_identical_snapshot_suppressed() {
        let mut differ = SnapshotDiffer::new();
        let content = source(page("hello"));

        assert!(differ.capture(&content).unwrap().is_some());
        let digest = *differ.last_emitted_digest().unwrap();

        assert!(differ.capture(&content).unwrap().is_none());
        assert_eq!(differ.last_emitted_digest(), Some(&digest));
    }

    #[test]
    fn test_changed_snapshot_emits() {
        let mut differ = SnapshotDiffer::new();
        let content = source(page("hello"));

        assert!(differ.capture(&content).unwrap().is_some());
        content.replace(page("goodbye"));
        assert!(differ.capture(&content).unwrap().is_some());
    }

    #[test]
    fn test_changes_only_in_stripped_content_are_suppressed() {
        let mut differ = SnapshotDiffer::new();
        let content = source(page("hello"));
        assert!(differ.capture(&content).unwrap().is_some());

        // Only a script and a handler differ; the sanitized output is identical.
        content.replace(
            page("hello")
                .with_attr("onload", "init()")
                .with_child(DomNode::element("script").with_child(DomNode::text("x()"))),
        );
        assert!(differ.capture(&content).unwrap().is_none());
    }

    #[test]
    fn test_reverting_content_emits_again() {
        let mut differ = SnapshotDiffer::new();
        let content = source(page("a"));

        assert!(differ.capture(&content).unwrap().is_some());
        content.replace(page("b"));
        assert!(differ.capture(&content).unwrap().is_some());
        content.replace(page("a"));
        assert!(differ.capture(&content).unwrap().is_some());
    }

    #[test]
    fn test_malformed_tree_leaves_state_untouched() {
        let mut differ = SnapshotDiffer::new();
        let content = source(page("a"));
        assert!(differ.capture(&content).unwrap().is_some());
        let digest = *differ.last_emitted_digest().unwrap();

        content.replace(DomNode::element("div").with_child(DomNode::element("")));
        let err = differ.capture(&content).unwrap_err();
        assert!(matches!(err, SnapshotError::Sanitize(_)));
        assert_eq!(differ.last_emitted_digest(), Some(&digest));
    }

    #[test]
    fn test_unavailable_content_is_error() {
        let mut differ = SnapshotDiffer::new();
        let content = StaticContent::empty(Viewport::default(), "about:blank");
        assert_eq!(
            differ.capture(&content).unwrap_err(),
            SnapshotError::Content(ContentError::Unavailable)
        );
    }
}
