//! Privacy pipeline for structural snapshots.
//!
//! Every content tree passes through the sanitizer before it is compared,
//! digested or queued, so no snapshot event can carry executable content or
//! sensitive field values.
//!
//! # Privacy Guarantees
//!
//! - **Script stripping**: `script` elements are removed together with their content
//! - **Handler stripping**: every attribute whose name starts with `on`
//!   (`onclick`, `ONLOAD`, `onmouseover`, ...) is removed
//! - **Field clearing**: `value` attributes of `password` and `hidden` inputs
//!   are cleared to the empty string
//!
//! A tree that cannot be sanitized safely (empty or invalid tag and attribute
//! names, or runaway nesting) is rejected with a [`SanitizeError`] instead of
//! being partially emitted.
//!
//! # Example
//!
//! ```
//! use sessiontap_agent::content::{render_markup, DomNode};
//! use sessiontap_agent::privacy::sanitize;
//!
//! let tree = DomNode::element("form")
//!     .with_attr("onsubmit", "steal()")
//!     .with_child(DomNode::element("script").with_child(DomNode::text("alert(1)")))
//!     .with_child(
//!         DomNode::element("input")
//!             .with_attr("type", "password")
//!             .with_attr("value", "hunter2"),
//!     );
//!
//! let clean = sanitize(tree).unwrap();
//! assert_eq!(
//!     render_markup(&clean),
//!     r#"<form><input type="password" value=""></form>"#
//! );
//! ```

use thiserror::Error;

use crate::content::{Attribute, DomNode};

/// Elements removed entirely, children included.
const EXECUTABLE_TAGS: &[&str] = &["script"];

/// Attribute prefix identifying inline event handlers.
const HANDLER_PREFIX: &str = "on";

/// Input types whose values are never captured.
const SENSITIVE_INPUT_TYPES: &[&str] = &["password", "hidden"];

/// Deepest nesting accepted before the tree is considered malformed.
pub const MAX_TREE_DEPTH: usize = 512;

/// Errors raised when a tree cannot be sanitized.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SanitizeError {
    /// An element has an empty or invalid tag name.
    #[error("invalid element tag: {0:?}")]
    InvalidTag(String),

    /// An attribute has an empty or invalid name.
    #[error("invalid attribute name on <{tag}>: {name:?}")]
    InvalidAttribute { tag: String, name: String },

    /// Nesting exceeds [`MAX_TREE_DEPTH`].
    #[error("tree nesting exceeds {max} levels")]
    TooDeep { max: usize },
}

/// Sanitizes a content tree.
///
/// # Errors
///
/// Returns [`SanitizeError`] if the tree is malformed. No partial output is
/// produced in that case.
pub fn sanitize(root: DomNode) -> Result<DomNode, SanitizeError> {
    match sanitize_node(root, 0)? {
        Some(node) => Ok(node),
        // A bare script root sanitizes to nothing.
        None => Ok(DomNode::text("")),
    }
}

fn sanitize_node(node: DomNode, depth: usize) -> Result<Option<DomNode>, SanitizeError> {
    if depth >= MAX_TREE_DEPTH {
        return Err(SanitizeError::TooDeep {
            max: MAX_TREE_DEPTH,
        });
    }

    let (tag, attributes, children) = match node {
        DomNode::Element {
            tag,
            attributes,
            children,
        } => (tag, attributes, children),
        other => return Ok(Some(other)),
    };

    if !is_valid_tag(&tag) {
        return Err(SanitizeError::InvalidTag(tag));
    }

    if EXECUTABLE_TAGS.iter().any(|t| tag.eq_ignore_ascii_case(t)) {
        return Ok(None);
    }

    let clears_value = tag.eq_ignore_ascii_case("input") && is_sensitive_input(&attributes);

    let mut kept = Vec::with_capacity(attributes.len());
    for attr in attributes {
        if !is_valid_attribute_name(&attr.name) {
            return Err(SanitizeError::InvalidAttribute {
                tag,
                name: attr.name,
            });
        }
        if is_event_handler(&attr.name) {
            continue;
        }
        if clears_value && attr.name.eq_ignore_ascii_case("value") {
            kept.push(Attribute::new(attr.name, ""));
            continue;
        }
        kept.push(attr);
    }

    let mut sanitized_children = Vec::with_capacity(children.len());
    for child in children {
        if let Some(child) = sanitize_node(child, depth + 1)? {
            sanitized_children.push(child);
        }
    }

    Ok(Some(DomNode::Element {
        tag,
        attributes: kept,
        children: sanitized_children,
    }))
}

/// Returns true for inline event handler attributes such as `onclick`.
#[must_use]
pub fn is_event_handler(name: &str) -> bool {
    name.get(..HANDLER_PREFIX.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(HANDLER_PREFIX))
}

fn is_sensitive_input(attributes: &[Attribute]) -> bool {
    attributes
        .iter()
        .filter(|a| a.name.eq_ignore_ascii_case("type"))
        .any(|a| {
            SENSITIVE_INPUT_TYPES
                .iter()
                .any(|t| a.value.trim().eq_ignore_ascii_case(t))
        })
}

fn is_valid_tag(tag: &str) -> bool {
    let mut chars = tag.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-')
}

fn is_valid_attribute_name(name: &str) -> bool {
    !name.is_empty()
        && !name.chars().any(|c| {
            c.is_whitespace() || c.is_control() || matches!(c, '"' | '\'' | '<' | '>' | '/' | '=')
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::render_markup;

    fn clean(node: DomNode) -> String {
        render_markup(&sanitize(node).expect("sanitize"))
    }

    #[test]
    fn test_removes_script_elements_with_content() {
        let tree = DomNode::element("body")
            .with_child(DomNode::element("p").with_child(DomNode::text("keep")))
            .with_child(
                DomNode::element("SCRIPT")
                    .with_attr("src", "https://evil.test/x.js")
                    .with_child(DomNode::text("document.cookie")),
            );

        let out = clean(tree);
        assert_eq!(out, "<body><p>keep</p></body>");
        assert!(!out.contains("cookie"));
    }

    #[test]
    fn test_removes_nested_scripts() {
        let tree = DomNode::element("div").with_child(
            DomNode::element("section")
                .with_child(DomNode::element("script").with_child(DomNode::text("a()"))),
        );
        assert_eq!(clean(tree), "<div><section></section></div>");
    }

    #[test]
    fn test_root_script_sanitizes_to_empty() {
        let tree = DomNode::element("script").with_child(DomNode::text("x()"));
        assert_eq!(clean(tree), "");
    }

    #[test]
    fn test_strips_event_handlers_any_case() {
        let tree = DomNode::element("button")
            .with_attr("onclick", "pay()")
            .with_attr("OnMouseOver", "track()")
            .with_attr("ONLOAD", "boot()")
            .with_attr("class", "primary");

        assert_eq!(clean(tree), r#"<button class="primary"></button>"#);
    }

    #[test]
    fn test_bare_on_attribute_is_handler() {
        assert!(is_event_handler("on"));
        assert!(is_event_handler("onerror"));
        assert!(!is_event_handler("o"));
        assert!(!is_event_handler("data-on"));
        assert!(!is_event_handler("class"));
    }

    #[test]
    fn test_clears_password_and_hidden_values() {
        let tree = DomNode::element("form")
            .with_child(
                DomNode::element("input")
                    .with_attr("type", "Password")
                    .with_attr("value", "hunter2"),
            )
            .with_child(
                DomNode::element("input")
                    .with_attr("type", "hidden")
                    .with_attr("VALUE", "csrf-token"),
            )
            .with_child(
                DomNode::element("input")
                    .with_attr("type", "text")
                    .with_attr("value", "visible"),
            );

        let out = clean(tree);
        assert!(!out.contains("hunter2"));
        assert!(!out.contains("csrf-token"));
        assert!(out.contains(r#"value="visible""#));
        assert!(out.contains(r#"<input type="Password" value="">"#));
        assert!(out.contains(r#"<input type="hidden" VALUE="">"#));
    }

    #[test]
    fn test_value_outside_inputs_untouched() {
        let tree = DomNode::element("option")
            .with_attr("type", "password")
            .with_attr("value", "kept");
        assert_eq!(clean(tree), r#"<option type="password" value="kept"></option>"#);
    }

    #[test]
    fn test_text_and_comments_pass_through() {
        let tree = DomNode::element("p")
            .with_child(DomNode::text("onclick is just text"))
            .with_child(DomNode::Comment {
                text: "c".to_string(),
            });
        assert_eq!(clean(tree), "<p>onclick is just text<!--c--></p>");
    }

    #[test]
    fn test_rejects_empty_tag() {
        let tree = DomNode::element("div").with_child(DomNode::element(""));
        assert_eq!(
            sanitize(tree),
            Err(SanitizeError::InvalidTag(String::new()))
        );
    }

    #[test]
    fn test_rejects_invalid_attribute_name() {
        let tree = DomNode::element("div").with_attr("a b", "x");
        assert!(matches!(
            sanitize(tree),
            Err(SanitizeError::InvalidAttribute { ref tag, ref name }) if tag == "div" && name == "a b"
        ));
    }

    #[test]
    fn test_accepts_custom_element_tags() {
        let tree = DomNode::element("my-widget");
        assert_eq!(clean(tree), "<my-widget></my-widget>");
    }

    #[test]
    fn test_rejects_runaway_nesting() {
        let mut tree = DomNode::element("div");
        for _ in 0..MAX_TREE_DEPTH {
            tree = DomNode::element("div").with_child(tree);
        }

        assert_eq!(
            sanitize(tree),
            Err(SanitizeError::TooDeep {
                max: MAX_TREE_DEPTH
            })
        );
    }
}
