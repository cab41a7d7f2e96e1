//! JSON wire frames exchanged over the live socket.
//!
//! Inbound frames are `{ "type": ..., "data"?: ... }`. The `data` payload is
//! kept as raw JSON and decoded on demand with [`InboundMessage::item`], so a
//! frame whose payload is not a full item (e.g. a bare `{ "id" }` on
//! `item_deleted`) is still delivered instead of being dropped.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::ids::ItemId;

// ─────────────────────────────────────────────────────────────────────────────
// DisplayableItem
// ─────────────────────────────────────────────────────────────────────────────

/// A generated response eligible for on-screen presentation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DisplayableItem {
    /// Server-assigned item ID.
    pub id: ItemId,
    /// Text shown in the overlay.
    #[serde(rename = "banterText", alias = "text", deserialize_with = "null_as_default")]
    pub text: String,
    /// Optional synthesized voice clip (absolute, relative or `data:` URL).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    /// Metadata of the triggering stream event (opaque to the client).
    #[serde(alias = "metadata", skip_serializing_if = "Value::is_null")]
    pub event_metadata: Value,
    /// Creation timestamp as sent by the server. Epoch numbers are kept in
    /// their decimal form.
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "timestamp_text")]
    pub created_at: Option<String>,
    /// Whether the server has marked the item as played (`null` reads as no).
    #[serde(deserialize_with = "null_as_default")]
    pub is_played: bool,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn timestamp_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(text)) => Some(text),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

impl DisplayableItem {
    /// Create an item with text only.
    #[must_use]
    pub fn new(id: impl Into<ItemId>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            ..Self::default()
        }
    }

    /// Attach an audio URL.
    #[must_use]
    pub fn with_audio(mut self, url: impl Into<String>) -> Self {
        self.audio_url = Some(url.into());
        self
    }

    /// Whether the item has non-blank text.
    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }

    /// The audio URL, if present and non-blank.
    pub fn audio(&self) -> Option<&str> {
        self.audio_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Inbound
// ─────────────────────────────────────────────────────────────────────────────

/// Inbound frame type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// A freshly generated item.
    NewItem,
    /// An item was played (manually or automatically).
    ItemPlayed,
    /// An item was replayed from the dashboard.
    ItemReplayed,
    /// An item was edited server-side.
    ItemUpdated,
    /// An item was deleted server-side.
    ItemDeleted,
    /// Server liveness probe.
    Ping,
    /// Reply to a liveness probe.
    Pong,
    /// Any type this client does not know.
    #[serde(other)]
    Unknown,
}

impl MessageKind {
    /// Wire name of the kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NewItem => "new_item",
            Self::ItemPlayed => "item_played",
            Self::ItemReplayed => "item_replayed",
            Self::ItemUpdated => "item_updated",
            Self::ItemDeleted => "item_deleted",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::Unknown => "unknown",
        }
    }

    /// Heartbeat frames never leave the connection layer.
    pub fn is_heartbeat(self) -> bool {
        matches!(self, Self::Ping | Self::Pong)
    }

    /// Kinds that change the item list of an owner.
    pub fn affects_queue(self) -> bool {
        matches!(
            self,
            Self::NewItem
                | Self::ItemPlayed
                | Self::ItemReplayed
                | Self::ItemUpdated
                | Self::ItemDeleted
        )
    }

    /// Kinds that may put an item on screen.
    pub fn is_presentable(self) -> bool {
        matches!(self, Self::NewItem | Self::ItemPlayed | Self::ItemReplayed)
    }
}

/// One parsed inbound frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Frame type.
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Raw payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl InboundMessage {
    /// Parse a text frame.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Build a frame carrying an item.
    #[must_use]
    pub fn with_item(kind: MessageKind, item: &DisplayableItem) -> Self {
        Self {
            kind,
            data: serde_json::to_value(item).ok(),
        }
    }

    /// Build a frame without payload.
    #[must_use]
    pub fn bare(kind: MessageKind) -> Self {
        Self { kind, data: None }
    }

    /// Decode the payload as an item, if it is one.
    pub fn item(&self) -> Option<DisplayableItem> {
        let data = self.data.as_ref()?;
        if !data.is_object() {
            return None;
        }
        serde_json::from_value(data.clone()).ok()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Outbound
// ─────────────────────────────────────────────────────────────────────────────

/// A client → server frame: `{ "type": ..., ...fields }`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Frame type.
    #[serde(rename = "type")]
    pub kind: String,
    /// Remaining top-level fields.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl OutboundMessage {
    /// Create an outbound frame with no extra fields.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            fields: Map::new(),
        }
    }

    /// Heartbeat reply: `{ "type": "pong", "timestamp": <ms> }`.
    #[must_use]
    pub fn pong(timestamp_ms: i64) -> Self {
        Self::new("pong").with("timestamp", timestamp_ms)
    }

    /// Add a top-level field.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let _ = self.fields.insert(key.into(), value.into());
        self
    }

    /// Serialize to a text frame.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_new_item_with_banter_text() {
        let msg = InboundMessage::parse(
            r#"{"type":"new_item","data":{"id":"x1","banterText":"Hello!","audioUrl":null}}"#,
        )
        .unwrap();
        assert_eq!(msg.kind, MessageKind::NewItem);
        let item = msg.item().unwrap();
        assert_eq!(item.id.as_str(), "x1");
        assert_eq!(item.text, "Hello!");
        assert!(item.audio_url.is_none());
        assert!(!item.is_played);
    }

    #[test]
    fn text_alias_accepted() {
        let item: DisplayableItem =
            serde_json::from_value(json!({"id": "a", "text": "hi"})).unwrap();
        assert_eq!(item.text, "hi");
    }

    #[test]
    fn full_item_fields() {
        let item: DisplayableItem = serde_json::from_value(json!({
            "id": "b7",
            "banterText": "Thanks for the raid!",
            "audioUrl": "/audio/b7.mp3",
            "eventMetadata": {"kind": "raid", "viewers": 20},
            "createdAt": "2026-01-01T00:00:00Z",
            "isPlayed": true
        }))
        .unwrap();
        assert_eq!(item.audio(), Some("/audio/b7.mp3"));
        assert_eq!(item.event_metadata["viewers"], 20);
        assert_eq!(item.created_at.as_deref(), Some("2026-01-01T00:00:00Z"));
        assert!(item.is_played);
    }

    #[test]
    fn loosely_typed_fields_still_decode() {
        let msg = InboundMessage::parse(
            r#"{"type":"new_item","data":{"id":"x2","banterText":"GG","createdAt":1767225600000,"isPlayed":null}}"#,
        )
        .unwrap();
        let item = msg.item().unwrap();
        assert_eq!(item.text, "GG");
        assert_eq!(item.created_at.as_deref(), Some("1767225600000"));
        assert!(!item.is_played);

        let item: DisplayableItem = serde_json::from_value(json!({
            "id": "x3",
            "banterText": null,
            "createdAt": {"seconds": 1},
        }))
        .unwrap();
        assert!(!item.has_text());
        assert!(item.created_at.is_none());
    }

    #[test]
    fn item_list_survives_one_odd_item() {
        let items: Vec<DisplayableItem> = serde_json::from_value(json!([
            {"id": "a", "banterText": "one", "createdAt": "2026-01-01T00:00:00Z", "isPlayed": true},
            {"id": "b", "banterText": "two", "createdAt": 1_767_225_600, "isPlayed": null},
        ]))
        .unwrap();
        assert_eq!(items.len(), 2);
        assert!(items[0].is_played);
        assert_eq!(items[1].created_at.as_deref(), Some("1767225600"));
    }

    #[test]
    fn ping_without_data() {
        let msg = InboundMessage::parse(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(msg.kind, MessageKind::Ping);
        assert!(msg.kind.is_heartbeat());
        assert!(msg.data.is_none());
        assert!(msg.item().is_none());
    }

    #[test]
    fn unknown_type_is_not_an_error() {
        let msg = InboundMessage::parse(r#"{"type":"subscription_changed","data":{}}"#).unwrap();
        assert_eq!(msg.kind, MessageKind::Unknown);
        assert!(!msg.kind.affects_queue());
    }

    #[test]
    fn malformed_frames_fail_to_parse() {
        assert!(InboundMessage::parse("not json").is_err());
        assert!(InboundMessage::parse(r#"{"data":{}}"#).is_err());
        assert!(InboundMessage::parse("[1,2]").is_err());
    }

    #[test]
    fn non_object_data_yields_no_item() {
        let msg = InboundMessage::parse(r#"{"type":"item_deleted","data":"x1"}"#).unwrap();
        assert!(msg.item().is_none());
    }

    #[test]
    fn deleted_with_bare_id_still_decodes() {
        let msg = InboundMessage::parse(r#"{"type":"item_deleted","data":{"id":"x9"}}"#).unwrap();
        let item = msg.item().unwrap();
        assert_eq!(item.id.as_str(), "x9");
        assert!(!item.has_text());
    }

    #[test]
    fn kind_classification() {
        assert!(MessageKind::NewItem.is_presentable());
        assert!(MessageKind::ItemReplayed.is_presentable());
        assert!(!MessageKind::ItemUpdated.is_presentable());
        assert!(MessageKind::ItemDeleted.affects_queue());
        assert!(!MessageKind::Ping.affects_queue());
        assert_eq!(MessageKind::ItemPlayed.as_str(), "item_played");
    }

    #[test]
    fn pong_shape() {
        let pong = OutboundMessage::pong(1_700_000_000_000);
        let value: Value = serde_json::from_str(&pong.to_json().unwrap()).unwrap();
        assert_eq!(value, json!({"type": "pong", "timestamp": 1_700_000_000_000_i64}));
    }

    #[test]
    fn outbound_with_fields() {
        let msg = OutboundMessage::new("overlay_ready").with("owner", "o1");
        let value: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "overlay_ready");
        assert_eq!(value["owner"], "o1");
    }

    #[test]
    fn blank_audio_is_ignored() {
        let item = DisplayableItem::new("x", "t").with_audio("   ");
        assert!(item.audio().is_none());
    }

    #[test]
    fn with_item_roundtrip_keeps_wire_names() {
        let item = DisplayableItem::new("x1", "Hello!");
        let msg = InboundMessage::with_item(MessageKind::NewItem, &item);
        let data = msg.data.as_ref().unwrap();
        assert_eq!(data["banterText"], "Hello!");
        assert_eq!(msg.item().unwrap(), item);
    }
}
