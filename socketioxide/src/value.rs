//! A JSON-like value tree that can also carry opaque binary leaves (the
//! "binary value wrapper", C1): this is what lets the packet codec treat a
//! binary attachment as just another leaf while it walks a payload, instead
//! of special-casing binary arguments throughout the dispatch path.

use bytes::Bytes;
use serde::Serialize as _;
use serde_json::Number;

/// A structured value as carried inside a packet's `data` array.
///
/// Mirrors `serde_json::Value` with one addition: [`Value::Blob`], an
/// opaque binary leaf. A `Blob` only ever exists in memory, after a
/// `BINARY_*` packet's attachments have been substituted into the payload
/// tree in place of their `{"_placeholder":true,"num":N}` markers; it is
/// never itself serialized back to JSON (encoding reverses the process,
/// pulling `Blob`s back out into the attachment stream).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<Value>),
    Object(Vec<(String, Value)>),
    Blob(Bytes),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// `true` if this value or any of its descendants is a [`Value::Blob`].
    pub fn has_binary(&self) -> bool {
        match self {
            Value::Blob(_) => true,
            Value::Array(items) => items.iter().any(Value::has_binary),
            Value::Object(fields) => fields.iter().any(|(_, v)| v.has_binary()),
            _ => false,
        }
    }
}

/// Lets [`Value`] ride directly through `rmp-serde` for the single-blob
/// codec (C3, spec §4.2): [`Value::Blob`] is handed to `serialize_bytes` so
/// it lands as a native MessagePack `bin` leaf instead of a byte array.
impl serde::Serialize for Value {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) => n.serialize(serializer),
            Value::String(s) => serializer.serialize_str(s),
            Value::Array(items) => items.serialize(serializer),
            Value::Object(fields) => {
                use serde::ser::SerializeMap;
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (k, v) in fields {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
            Value::Blob(bytes) => serializer.serialize_bytes(bytes),
        }
    }
}

impl<'de> serde::Deserialize<'de> for Value {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ValueVisitor)
    }
}

struct ValueVisitor;

impl<'de> serde::de::Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("a socket.io value (null, bool, number, string, array, map, or binary blob)")
    }

    fn visit_unit<E>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_none<E>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_bool<E>(self, v: bool) -> Result<Value, E> {
        Ok(Value::Bool(v))
    }

    fn visit_i64<E>(self, v: i64) -> Result<Value, E> {
        Ok(Value::Number(Number::from(v)))
    }

    fn visit_u64<E>(self, v: u64) -> Result<Value, E> {
        Ok(Value::Number(Number::from(v)))
    }

    fn visit_f64<E>(self, v: f64) -> Result<Value, E> {
        Ok(Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null))
    }

    fn visit_str<E>(self, v: &str) -> Result<Value, E> {
        Ok(Value::String(v.to_string()))
    }

    fn visit_string<E>(self, v: String) -> Result<Value, E> {
        Ok(Value::String(v))
    }

    fn visit_bytes<E>(self, v: &[u8]) -> Result<Value, E> {
        Ok(Value::Blob(Bytes::copy_from_slice(v)))
    }

    fn visit_byte_buf<E>(self, v: Vec<u8>) -> Result<Value, E> {
        Ok(Value::Blob(Bytes::from(v)))
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Value, A::Error>
    where
        A: serde::de::SeqAccess<'de>,
    {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(Value::Array(items))
    }

    fn visit_map<A>(self, mut map: A) -> Result<Value, A::Error>
    where
        A: serde::de::MapAccess<'de>,
    {
        let mut fields = Vec::with_capacity(map.size_hint().unwrap_or(0));
        while let Some((key, value)) = map.next_entry::<String, Value>()? {
            fields.push((key, value));
        }
        Ok(Value::Object(fields))
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

/// Error produced while substituting attachment placeholders into a decoded
/// payload tree (spec §4.1, §8).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlaceholderError {
    #[error("placeholder refers to attachment {0} which was not received")]
    UnknownPlaceholder(usize),
    #[error("packet declared {declared} attachments but {used} were referenced by placeholders")]
    AttachmentCountMismatch { declared: usize, used: usize },
}

/// Serializes `value` to a `serde_json::Value`, replacing every [`Value::Blob`]
/// with a `{"_placeholder":true,"num":N}` marker and pushing the blob's
/// bytes onto `attachments` in the order they are encountered (a
/// depth-first, left-to-right traversal), per spec §4.1.
pub fn extract_placeholders(value: &Value, attachments: &mut Vec<Bytes>) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => serde_json::Value::Number(n.clone()),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Array(items) => serde_json::Value::Array(
            items
                .iter()
                .map(|v| extract_placeholders(v, attachments))
                .collect(),
        ),
        Value::Object(fields) => serde_json::Value::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), extract_placeholders(v, attachments)))
                .collect(),
        ),
        Value::Blob(bytes) => {
            let num = attachments.len();
            attachments.push(bytes.clone());
            serde_json::json!({ "_placeholder": true, "num": num })
        }
    }
}

/// Reverses [`extract_placeholders`]: deep-walks a decoded payload tree
/// substituting every `{"_placeholder":true,"num":N}` marker with
/// `attachments[N]`. Every attachment must be referenced by exactly one
/// placeholder; anything else is a decode error (spec §4.1, §8).
pub fn substitute_placeholders(
    value: Value,
    attachments: &[Bytes],
) -> Result<Value, PlaceholderError> {
    let mut used = vec![false; attachments.len()];
    let out = substitute_inner(value, attachments, &mut used)?;
    let used_count = used.iter().filter(|u| **u).count();
    if used_count != attachments.len() {
        return Err(PlaceholderError::AttachmentCountMismatch {
            declared: attachments.len(),
            used: used_count,
        });
    }
    Ok(out)
}

fn substitute_inner(
    value: Value,
    attachments: &[Bytes],
    used: &mut [bool],
) -> Result<Value, PlaceholderError> {
    match value {
        Value::Object(fields) => {
            if let Some(num) = placeholder_index(&fields) {
                let bytes = attachments
                    .get(num)
                    .ok_or(PlaceholderError::UnknownPlaceholder(num))?;
                used[num] = true;
                Ok(Value::Blob(bytes.clone()))
            } else {
                let fields = fields
                    .into_iter()
                    .map(|(k, v)| Ok((k, substitute_inner(v, attachments, used)?)))
                    .collect::<Result<Vec<_>, PlaceholderError>>()?;
                Ok(Value::Object(fields))
            }
        }
        Value::Array(items) => {
            let items = items
                .into_iter()
                .map(|v| substitute_inner(v, attachments, used))
                .collect::<Result<Vec<_>, PlaceholderError>>()?;
            Ok(Value::Array(items))
        }
        other => Ok(other),
    }
}

fn placeholder_index(fields: &[(String, Value)]) -> Option<usize> {
    let is_placeholder = fields
        .iter()
        .any(|(k, v)| k == "_placeholder" && matches!(v, Value::Bool(true)));
    if !is_placeholder {
        return None;
    }
    fields.iter().find_map(|(k, v)| {
        if k == "num" {
            match v {
                Value::Number(n) => n.as_u64().map(|n| n as usize),
                _ => None,
            }
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_plain_json_value() {
        let json = serde_json::json!(["echo", {"a": 1, "b": [true, null]}]);
        let value: Value = json.clone().into();
        let mut attachments = Vec::new();
        let out = extract_placeholders(&value, &mut attachments);
        assert!(attachments.is_empty());
        assert_eq!(out, json);
    }

    #[test]
    fn extracts_nested_blobs_in_traversal_order() {
        let value = Value::Array(vec![
            Value::String("binary".into()),
            Value::Blob(Bytes::from_static(b"first")),
            Value::Object(vec![("nested".into(), Value::Blob(Bytes::from_static(b"second")))]),
        ]);
        let mut attachments = Vec::new();
        let json = extract_placeholders(&value, &mut attachments);
        assert_eq!(attachments, vec![Bytes::from_static(b"first"), Bytes::from_static(b"second")]);
        assert_eq!(
            json,
            serde_json::json!([
                "binary",
                {"_placeholder": true, "num": 0},
                {"nested": {"_placeholder": true, "num": 1}},
            ])
        );
    }

    #[test]
    fn substitutes_placeholders_back_into_blobs() {
        let json: Value = serde_json::json!(["binary", {"_placeholder": true, "num": 0}]).into();
        let attachments = vec![Bytes::from_static(&[1, 2, 3, 4])];
        let value = substitute_placeholders(json, &attachments).unwrap();
        assert_eq!(
            value,
            Value::Array(vec![
                Value::String("binary".into()),
                Value::Blob(Bytes::from_static(&[1, 2, 3, 4])),
            ])
        );
    }

    #[test]
    fn unknown_placeholder_index_is_an_error() {
        let json: Value = serde_json::json!([{"_placeholder": true, "num": 5}]).into();
        assert_eq!(
            substitute_placeholders(json, &[]),
            Err(PlaceholderError::UnknownPlaceholder(5))
        );
    }

    #[test]
    fn excess_attachments_are_an_error() {
        let json: Value = serde_json::json!(["no blobs here"]).into();
        let attachments = vec![Bytes::from_static(b"unused")];
        assert!(matches!(
            substitute_placeholders(json, &attachments),
            Err(PlaceholderError::AttachmentCountMismatch { .. })
        ));
    }

    #[cfg(feature = "msgpack")]
    #[test]
    fn msgpack_roundtrips_a_blob_leaf_natively() {
        let value = Value::Array(vec![
            Value::String("binary".into()),
            Value::Blob(Bytes::from_static(&[9, 8, 7])),
            Value::Object(vec![("n".into(), Value::Number(Number::from(42)))]),
        ]);
        let bytes = rmp_serde::to_vec(&value).unwrap();
        let decoded: Value = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(decoded, value);
    }
}
