//! Access to the rendered content being observed.
//!
//! The capture session never reaches for an ambient document. Instead the host
//! hands it a [`ContentSource`], which yields the current content tree together
//! with the viewport and location readouts sampled at snapshot time.
//!
//! The tree is a small owned model ([`DomNode`]) that hosts build from whatever
//! rendering technology they observe. [`render_markup`] turns a tree into the
//! HTML-like text carried in snapshot events.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Viewport;

/// Elements that never carry children or a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Errors raised while reading the content tree.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContentError {
    /// No document is currently available.
    #[error("content tree unavailable")]
    Unavailable,

    /// The host could not produce a well-formed tree.
    #[error("malformed content tree: {0}")]
    Malformed(String),
}

/// A single attribute on an element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

impl Attribute {
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A node in the observed content tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomNode {
    Element {
        tag: String,
        #[serde(default)]
        attributes: Vec<Attribute>,
        #[serde(default)]
        children: Vec<DomNode>,
    },
    Text {
        text: String,
    },
    Comment {
        text: String,
    },
}

impl DomNode {
    /// Creates an element with no attributes or children.
    #[must_use]
    pub fn element(tag: impl Into<String>) -> Self {
        Self::Element {
            tag: tag.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Adds an attribute, returning the node (builder style). No-op on non-elements.
    #[must_use]
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        if let Self::Element { attributes, .. } = &mut self {
            attributes.push(Attribute::new(name, value));
        }
        self
    }

    /// Appends a child, returning the node (builder style). No-op on non-elements.
    #[must_use]
    pub fn with_child(mut self, child: DomNode) -> Self {
        if let Self::Element { children, .. } = &mut self {
            children.push(child);
        }
        self
    }
}

/// Reads a content tree stored as JSON on disk.
///
/// # Errors
///
/// Returns `AgentError::Io` if the file cannot be read and
/// `AgentError::Json` if it does not hold a valid tree.
pub fn load_document(path: &Path) -> crate::Result<DomNode> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Capability for reading the rendered content being observed.
///
/// Implementations must be cheap to call; the session samples them on the
/// snapshot path only.
pub trait ContentSource: Send + Sync {
    /// Returns the current content tree.
    ///
    /// # Errors
    ///
    /// Returns a [`ContentError`] when no well-formed tree can be produced.
    fn document(&self) -> Result<DomNode, ContentError>;

    /// Returns the current viewport dimensions.
    fn viewport(&self) -> Viewport;

    /// Returns the current location (for example the page URL).
    fn location(&self) -> String;
}

/// A content source holding a replaceable in-memory tree.
///
/// Used by the CLI host (documents loaded from disk) and by tests.
#[derive(Debug)]
pub struct StaticContent {
    document: RwLock<Option<DomNode>>,
    viewport: Viewport,
    location: String,
}

impl StaticContent {
    #[must_use]
    pub fn new(document: DomNode, viewport: Viewport, location: impl Into<String>) -> Self {
        Self {
            document: RwLock::new(Some(document)),
            viewport,
            location: location.into(),
        }
    }

    /// Creates a source that has no document yet.
    #[must_use]
    pub fn empty(viewport: Viewport, location: impl Into<String>) -> Self {
        Self {
            document: RwLock::new(None),
            viewport,
            location: location.into(),
        }
    }

    /// Replaces the current tree.
    pub fn replace(&self, document: DomNode) {
        let mut guard = self
            .document
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = Some(document);
    }

    /// Drops the current tree; snapshots fail until a new one is set.
    pub fn clear(&self) {
        self.document
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
    }
}

impl ContentSource for StaticContent {
    fn document(&self) -> Result<DomNode, ContentError> {
        self.document
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
            .ok_or(ContentError::Unavailable)
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn location(&self) -> String {
        self.location.clone()
    }
}

/// Renders a tree as HTML-like markup.
///
/// Text and attribute values are escaped; void elements are written without a
/// closing tag.
///
/// # Examples
///
/// ```
/// use sessiontap_agent::content::{render_markup, DomNode};
///
/// let node = DomNode::element("p")
///     .with_attr("class", "lead")
///     .with_child(DomNode::text("a < b"));
///
/// assert_eq!(render_markup(&node), r#"<p class="lead">a &lt; b</p>"#);
/// ```
#[must_use]
pub fn render_markup(node: &DomNode) -> String {
    let mut out = String::new();
    write_node(&mut out, node);
    out
}

fn write_node(out: &mut String, node: &DomNode) {
    match node {
        DomNode::Element {
            tag,
            attributes,
            children,
        } => {
            let _ = write!(out, "<{tag}");
            for attr in attributes {
                let _ = write!(out, " {}=\"{}\"", attr.name, escape(&attr.value, true));
            }
            out.push('>');

            if VOID_ELEMENTS.iter().any(|v| tag.eq_ignore_ascii_case(v)) {
                return;
            }

            for child in children {
                write_node(out, child);
            }
            let _ = write!(out, "</{tag}>");
        }
        DomNode::Text { text } => out.push_str(&escape(text, false)),
        DomNode::Comment { text } => {
            let _ = write!(out, "<!--{}-->", text.replace("--", "- -"));
        }
    }
}

fn escape(raw: &str, in_attribute: bool) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' if in_attribute => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AgentError;

    fn viewport() -> Viewport {
        Viewport {
            width: 800,
            height: 600,
        }
    }

    #[test]
    fn test_render_nested_markup() {
        let doc = DomNode::element("html").with_child(
            DomNode::element("body")
                .with_child(DomNode::element("h1").with_child(DomNode::text("Title")))
                .with_child(DomNode::element("br"))
                .with_child(DomNode::element("input").with_attr("type", "text")),
        );

        assert_eq!(
            render_markup(&doc),
            r#"<html><body><h1>Title</h1><br><input type="text"></body></html>"#
        );
    }

    #[test]
    fn test_render_escapes_attribute_quotes() {
        let node = DomNode::element("a").with_attr("title", r#"say "hi" & <go>"#);
        assert_eq!(
            render_markup(&node),
            r#"<a title="say &quot;hi&quot; &amp; &lt;go&gt;"></a>"#
        );
    }

    #[test]
    fn test_render_comment() {
        let node = DomNode::Comment {
            text: "note".to_string(),
        };
        assert_eq!(render_markup(&node), "<!--note-->");
    }

    #[test]
    fn test_load_document_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.json");
        fs::write(
            &path,
            r#"{"type":"element","tag":"p","attributes":[{"name":"id","value":"x"}]}"#,
        )
        .unwrap();

        let node = load_document(&path).unwrap();
        assert_eq!(node, DomNode::element("p").with_attr("id", "x"));
    }

    #[test]
    fn test_load_document_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_document(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, AgentError::Io(_)), "got {err:?}");
    }

    #[test]
    fn test_load_document_rejects_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.json");
        fs::write(&path, r#"{"type":"element","tag":"#).unwrap();

        let err = load_document(&path).unwrap_err();
        assert!(matches!(err, AgentError::Json(_)), "got {err:?}");
    }

    #[test]
    fn test_dom_node_deserializes_with_defaults() {
        let json = r#"{"type":"element","tag":"div","children":[{"type":"text","text":"hi"}]}"#;
        let node: DomNode = serde_json::from_str(json).unwrap();
        assert_eq!(
            node,
            DomNode::element("div").with_child(DomNode::text("hi"))
        );
    }

    #[test]
    fn test_static_content_replace() {
        let source = StaticContent::new(DomNode::element("p"), viewport(), "https://a.test/");
        assert_eq!(source.document().unwrap(), DomNode::element("p"));

        source.replace(DomNode::element("div"));
        assert_eq!(source.document().unwrap(), DomNode::element("div"));
        assert_eq!(source.viewport(), viewport());
        assert_eq!(source.location(), "https://a.test/");
    }

    #[test]
    fn test_empty_static_content_is_unavailable() {
        let source = StaticContent::empty(viewport(), "about:blank");
        assert_eq!(source.document(), Err(ContentError::Unavailable));
    }

    #[test]
    fn test_cleared_content_is_unavailable() {
        let source = StaticContent::new(DomNode::element("p"), viewport(), "about:blank");
        source.clear();
        assert_eq!(source.document(), Err(ContentError::Unavailable));
    }
}
