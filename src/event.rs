//! Wire model for MTA event datagrams
//!
//! Datagrams are MessagePack maps. Only `id`, `action` and `message-id` are
//! interpreted, and only when they are strings; every other field lands in
//! [`EventMessage::attributes`] whatever its type. The stored payload is the
//! raw datagram, so this model is a view for validation and display.

use std::collections::BTreeMap;
use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// Actions after which the message id is worth indexing
pub const TERMINAL_ACTIONS: [&str; 3] = ["DROP", "QUEUED", "NOQUEUE"];

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EventMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(
        rename = "message-id",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub message_id: Option<String>,
    #[serde(flatten)]
    pub attributes: BTreeMap<String, Value>,
}

impl EventMessage {
    pub fn decode(payload: &[u8]) -> Result<Self, rmp_serde::decode::Error> {
        rmp_serde::from_slice(payload)
    }

    pub fn encode(&self) -> Result<Vec<u8>, rmp_serde::encode::Error> {
        rmp_serde::to_vec_named(self)
    }

    /// The entry id, if it is usable as a key segment
    pub fn entry_id(&self) -> Option<&str> {
        self.id
            .as_deref()
            .filter(|id| !id.is_empty() && !id.chars().any(char::is_control))
    }

    /// Normalized message id when this event closes a queue transaction
    pub fn indexable_message_id(&self) -> Option<String> {
        let action = self.action.as_deref()?;
        if !TERMINAL_ACTIONS.contains(&action) {
            return None;
        }
        let normalized = normalize_message_id(self.message_id.as_deref()?);
        (!normalized.is_empty()).then_some(normalized)
    }

    /// Route a decoded field: string-valued known fields are typed, the rest
    /// stay attributes. Later duplicates win.
    fn set_field(&mut self, key: String, value: Value) {
        let slot = match key.as_str() {
            "id" => Some(&mut self.id),
            "action" => Some(&mut self.action),
            "message-id" => Some(&mut self.message_id),
            _ => None,
        };

        match (slot, value) {
            (Some(slot), Value::String(text)) => {
                *slot = Some(text);
                self.attributes.remove(&key);
            }
            (Some(slot), value) => {
                *slot = None;
                self.attributes.insert(key, value);
            }
            (None, value) => {
                self.attributes.insert(key, value);
            }
        }
    }
}

impl<'de> Deserialize<'de> for EventMessage {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct EventVisitor;

        impl<'de> Visitor<'de> for EventVisitor {
            type Value = EventMessage;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a map of event fields")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut message = EventMessage::default();
                while let Some(AttributeKey(key)) = map.next_key()? {
                    let Attribute(value) = map.next_value()?;
                    message.set_field(key, value);
                }
                Ok(message)
            }
        }

        deserializer.deserialize_any(EventVisitor)
    }
}

/// Any MessagePack value, rendered as JSON
///
/// Binary and extension payloads become base64 strings, non-finite floats
/// become null.
struct Attribute(Value);

impl<'de> Deserialize<'de> for Attribute {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct AttributeVisitor;

        impl<'de> Visitor<'de> for AttributeVisitor {
            type Value = Attribute;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("any MessagePack value")
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
                Ok(Attribute(Value::Bool(v)))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                Ok(Attribute(Value::Number(v.into())))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                Ok(Attribute(Value::Number(v.into())))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
                Ok(Attribute(
                    Number::from_f64(v).map_or(Value::Null, Value::Number),
                ))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                Ok(Attribute(Value::String(v.to_string())))
            }

            fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
                Ok(Attribute(Value::String(v)))
            }

            fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
                Ok(Attribute(Value::String(BASE64.encode(v))))
            }

            fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(Attribute(Value::Null))
            }

            fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(Attribute(Value::Null))
            }

            fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
            where
                D: Deserializer<'de>,
            {
                Attribute::deserialize(deserializer)
            }

            // Extension values arrive as a newtype around `(tag, data)`
            fn visit_newtype_struct<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
            where
                D: Deserializer<'de>,
            {
                Attribute::deserialize(deserializer)
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: SeqAccess<'de>,
            {
                let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
                while let Some(Attribute(item)) = seq.next_element()? {
                    items.push(item);
                }
                Ok(Attribute(Value::Array(items)))
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut object = Map::new();
                while let Some(AttributeKey(key)) = map.next_key()? {
                    let Attribute(value) = map.next_value()?;
                    object.insert(key, value);
                }
                Ok(Attribute(Value::Object(object)))
            }
        }

        deserializer.deserialize_any(AttributeVisitor)
    }
}

/// A map key of any type, as text: strings verbatim, `7` as `"7"`
struct AttributeKey(String);

impl<'de> Deserialize<'de> for AttributeKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let key = match Attribute::deserialize(deserializer)?.0 {
            Value::String(text) => text,
            other => other.to_string(),
        };
        Ok(AttributeKey(key))
    }
}

/// Strip surrounding whitespace and angle brackets, then lowercase
///
/// `<Foo@Bar>`, `foo@bar` and ` FOO@BAR ` all normalize to `foo@bar`.
pub fn normalize_message_id(raw: &str) -> String {
    raw.trim()
        .trim_start_matches('<')
        .trim_end_matches('>')
        .trim()
        .to_lowercase()
}
