//! Diff serialization: staged buffer → minimal wire payload.
//!
//! The payload is built in two passes. Required fields are pre-populated from
//! the live entity first, then every dirty field overwrites its slot with the
//! encoded staged value. The order matters: a dirty value must never be
//! clobbered by a live default.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Map, Value};

use crate::buffer::{PendingChangeBuffer, StagedIcon, StagedValue};
use crate::fields::{Encoding, FieldDescriptor};

/// Encode one staged value under its field's declared encoding rule.
pub fn encode_value(encoding: Encoding, value: &StagedValue) -> Value {
    match (encoding, value) {
        (Encoding::Scalar, StagedValue::Text(s)) => json!(s),
        (Encoding::Scalar, StagedValue::Int(i)) => json!(i),
        (Encoding::Scalar, StagedValue::UInt(u)) => json!(u),
        (Encoding::Scalar, StagedValue::Bool(b)) => json!(b),
        (Encoding::Scalar, StagedValue::Permissions(p)) => json!(p.bits().to_string()),

        (Encoding::NullableText, StagedValue::MaybeText(Some(s))) => json!(s),
        (Encoding::NullableText, StagedValue::MaybeText(None)) => Value::Null,
        (Encoding::NullableText, StagedValue::Text(s)) => json!(s),

        (Encoding::IconData, StagedValue::Icon(Some(icon))) => json!(icon_data_uri(icon)),
        (Encoding::IconData, StagedValue::Icon(None)) => Value::Null,

        (Encoding::IdList, StagedValue::Ids(ids)) => {
            Value::Array(ids.iter().map(|id| json!(id.to_string())).collect())
        }

        (Encoding::Overwrites, StagedValue::Overwrites(list)) => {
            serde_json::to_value(list).unwrap_or(Value::Null)
        }

        // A descriptor/value mismatch is a bug in a field table; validation
        // keeps user input out of this arm. Encode as null rather than
        // inventing a value.
        (encoding, other) => {
            tracing::warn!(?encoding, value = ?other, "staged value does not match field encoding");
            Value::Null
        }
    }
}

/// `data:image/png;base64,...` — the wire form for uploaded icons.
fn icon_data_uri(icon: &StagedIcon) -> String {
    format!("data:{};base64,{}", icon.mime, STANDARD.encode(&icon.data))
}

/// Build the PATCH body for a manager.
///
/// `live_value` supplies the current value for required fields; it is only
/// invoked for required descriptors that are not dirty (dirty values win
/// regardless, and optional clean fields never appear at all).
pub fn build_payload<F>(
    descriptors: &[FieldDescriptor],
    buffer: &PendingChangeBuffer,
    mut live_value: F,
) -> Value
where
    F: FnMut(&FieldDescriptor) -> Option<Value>,
{
    let mut body = Map::new();

    for desc in descriptors {
        if desc.required && !buffer.is_dirty(desc.key) {
            if let Some(value) = live_value(desc) {
                body.insert(desc.wire_name.to_string(), value);
            }
        }
    }

    for desc in descriptors {
        if let Some(staged) = buffer.staged(desc.key) {
            body.insert(
                desc.wire_name.to_string(),
                encode_value(desc.encoding, staged),
            );
        }
    }

    Value::Object(body)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::FieldKey;

    const NAME: FieldKey = FieldKey::new(0, "name");
    const TOPIC: FieldKey = FieldKey::new(1, "topic");
    const ICON: FieldKey = FieldKey::new(2, "icon");

    const DESCRIPTORS: [FieldDescriptor; 3] = [
        FieldDescriptor {
            key: NAME,
            wire_name: "name",
            required: true,
            readback: true,
            validate: FieldDescriptor::accept_any,
            encoding: Encoding::Scalar,
        },
        FieldDescriptor {
            key: TOPIC,
            wire_name: "topic",
            required: false,
            readback: true,
            validate: FieldDescriptor::accept_any,
            encoding: Encoding::NullableText,
        },
        FieldDescriptor {
            key: ICON,
            wire_name: "icon",
            required: false,
            readback: false,
            validate: FieldDescriptor::accept_any,
            encoding: Encoding::IconData,
        },
    ];

    fn live(desc: &FieldDescriptor) -> Option<Value> {
        match desc.wire_name {
            "name" => Some(json!("live-name")),
            _ => None,
        }
    }

    #[test]
    fn clean_buffer_yields_only_required_fields() {
        let buffer = PendingChangeBuffer::new();
        let payload = build_payload(&DESCRIPTORS, &buffer, live);
        assert_eq!(payload, json!({ "name": "live-name" }));
    }

    #[test]
    fn dirty_value_wins_over_live_default() {
        let mut buffer = PendingChangeBuffer::new();
        buffer
            .stage(&DESCRIPTORS[0], StagedValue::Text("staged-name".into()))
            .unwrap();
        let payload = build_payload(&DESCRIPTORS, &buffer, live);
        assert_eq!(payload["name"], "staged-name");
    }

    #[test]
    fn payload_contains_only_required_plus_dirty() {
        let mut buffer = PendingChangeBuffer::new();
        buffer
            .stage(&DESCRIPTORS[1], StagedValue::MaybeText(Some("hi".into())))
            .unwrap();
        let payload = build_payload(&DESCRIPTORS, &buffer, live);
        let keys: Vec<&str> = payload.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys.len(), 2);
        assert!(keys.contains(&"name"));
        assert!(keys.contains(&"topic"));
    }

    #[test]
    fn removal_sentinel_encodes_as_null() {
        let mut buffer = PendingChangeBuffer::new();
        buffer
            .stage(&DESCRIPTORS[1], StagedValue::MaybeText(None))
            .unwrap();
        let payload = build_payload(&DESCRIPTORS, &buffer, live);
        assert!(payload["topic"].is_null());
        assert!(payload.as_object().unwrap().contains_key("topic"));
    }

    #[test]
    fn icon_encodes_as_data_uri() {
        let mut buffer = PendingChangeBuffer::new();
        buffer
            .stage(
                &DESCRIPTORS[2],
                StagedValue::Icon(Some(StagedIcon::png(vec![1, 2, 3]))),
            )
            .unwrap();
        let payload = build_payload(&DESCRIPTORS, &buffer, live);
        let uri = payload["icon"].as_str().unwrap();
        assert!(uri.starts_with("data:image/png;base64,"));
        assert_eq!(uri, format!("data:image/png;base64,{}", STANDARD.encode([1u8, 2, 3])));
    }

    #[test]
    fn reset_field_excludes_it_from_the_payload() {
        let mut buffer = PendingChangeBuffer::new();
        buffer
            .stage(&DESCRIPTORS[1], StagedValue::MaybeText(Some("hi".into())))
            .unwrap();
        buffer.reset_field(TOPIC);
        let payload = build_payload(&DESCRIPTORS, &buffer, live);
        assert!(!payload.as_object().unwrap().contains_key("topic"));
    }

    #[test]
    fn id_list_projection() {
        let value = StagedValue::Ids(vec![3, 1, 2]);
        let encoded = encode_value(Encoding::IdList, &value);
        assert_eq!(encoded, json!(["3", "1", "2"]));
    }
}
