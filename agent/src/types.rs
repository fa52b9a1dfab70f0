//! Event types for SessionTap capture.
//!
//! This module defines the event schema shared by the capture pipeline and the
//! collector wire format. All types serialize to camelCase JSON, and each
//! [`CapturedEvent`] serializes as `{ "type": ..., "data": ..., "timestamp": ... }`.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Classification of a captured event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    PointerMove,
    Click,
    Scroll,
    StructuralSnapshot,
}

/// Viewport dimensions sampled at snapshot time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Payload variants for the different event kinds.
///
/// Uses serde's adjacently tagged representation so the kind lands in `type`
/// and the kind-specific fields land in `data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum EventPayload {
    /// Pointer position changed.
    PointerMove { x: i32, y: i32 },
    /// Mouse button clicked on an element.
    Click {
        x: i32,
        y: i32,
        /// Lowercase tag name of the clicked element.
        target: String,
    },
    /// Scroll offsets changed.
    Scroll { x: i32, y: i32 },
    /// Sanitized structural snapshot of the rendered content.
    StructuralSnapshot {
        html: String,
        viewport: Viewport,
        url: String,
    },
}

impl EventPayload {
    /// Returns the kind this payload belongs to.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::PointerMove { .. } => EventKind::PointerMove,
            Self::Click { .. } => EventKind::Click,
            Self::Scroll { .. } => EventKind::Scroll,
            Self::StructuralSnapshot { .. } => EventKind::StructuralSnapshot,
        }
    }
}

/// A single captured observation.
///
/// Events are immutable once created: there are no setters, and the capture
/// timestamp is assigned by [`CapturedEvent::now`] rather than at send time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedEvent {
    #[serde(flatten)]
    payload: EventPayload,

    /// Milliseconds since the Unix epoch at capture time.
    #[serde(rename = "timestamp")]
    captured_at_millis: i64,
}

impl CapturedEvent {
    /// Creates an event stamped with the current wall-clock time.
    ///
    /// # Examples
    ///
    /// ```
    /// use sessiontap_agent::types::{CapturedEvent, EventKind, EventPayload};
    ///
    /// let event = CapturedEvent::now(EventPayload::PointerMove { x: 4, y: 2 });
    /// assert_eq!(event.kind(), EventKind::PointerMove);
    /// assert!(event.captured_at_millis() > 0);
    /// ```
    #[must_use]
    pub fn now(payload: EventPayload) -> Self {
        Self::at(payload, Utc::now().timestamp_millis())
    }

    /// Creates an event with an explicit capture timestamp.
    #[must_use]
    pub fn at(payload: EventPayload, captured_at_millis: i64) -> Self {
        Self {
            payload,
            captured_at_millis,
        }
    }

    #[must_use]
    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    #[must_use]
    pub fn payload(&self) -> &EventPayload {
        &self.payload
    }

    #[must_use]
    pub fn captured_at_millis(&self) -> i64 {
        self.captured_at_millis
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_kind_serializes_to_camel_case() {
        assert_eq!(
            serde_json::to_string(&EventKind::PointerMove).unwrap(),
            "\"pointerMove\""
        );
        assert_eq!(
            serde_json::to_string(&EventKind::StructuralSnapshot).unwrap(),
            "\"structuralSnapshot\""
        );
    }

    #[test]
    fn click_event_wire_format() {
        let event = CapturedEvent::at(
            EventPayload::Click {
                x: 100,
                y: 200,
                target: "button".to_string(),
            },
            1_700_000_000_000,
        );

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "click",
                "data": { "x": 100, "y": 200, "target": "button" },
                "timestamp": 1_700_000_000_000_i64,
            })
        );
    }

    #[test]
    fn snapshot_event_wire_format() {
        let event = CapturedEvent::at(
            EventPayload::StructuralSnapshot {
                html: "<p>hi</p>".to_string(),
                viewport: Viewport {
                    width: 1280,
                    height: 720,
                },
                url: "https://example.com/".to_string(),
            },
            42,
        );

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "structuralSnapshot");
        assert_eq!(value["data"]["html"], "<p>hi</p>");
        assert_eq!(value["data"]["viewport"]["width"], 1280);
        assert_eq!(value["data"]["url"], "https://example.com/");
        assert_eq!(value["timestamp"], 42);
    }

    #[test]
    fn payload_kind_matches_variant() {
        assert_eq!(
            EventPayload::Scroll { x: 0, y: 10 }.kind(),
            EventKind::Scroll
        );
        assert_eq!(
            EventPayload::PointerMove { x: 0, y: 0 }.kind(),
            EventKind::PointerMove
        );
    }

    #[test]
    fn now_uses_current_time() {
        let before = Utc::now().timestamp_millis();
        let event = CapturedEvent::now(EventPayload::Scroll { x: 0, y: 0 });
        let after = Utc::now().timestamp_millis();

        assert!(event.captured_at_millis() >= before);
        assert!(event.captured_at_millis() <= after);
    }
}
