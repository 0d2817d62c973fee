//! Conversion between plain JSON and Firestore's typed value encoding.
//!
//! Firestore wraps every value in a single-key object naming its type
//! (`{"stringValue": "x"}`, `{"integerValue": "7"}`, ...). Records carry
//! free-form metadata, so the codec covers every JSON shape.

use crate::models::{ImageRecord, Metadata, NewImageRecord};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value, json};

/// Encode a plain JSON value as a Firestore value.
pub fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => match n.as_i64() {
            // int64 travels as a decimal string
            Some(i) => json!({ "integerValue": i.to_string() }),
            None => json!({ "doubleValue": n.as_f64().unwrap_or_default() }),
        },
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => json!({
            "arrayValue": { "values": items.iter().map(encode_value).collect::<Vec<_>>() }
        }),
        Value::Object(map) => json!({ "mapValue": { "fields": encode_fields(map) } }),
    }
}

pub fn encode_fields(map: &Map<String, Value>) -> Map<String, Value> {
    map.iter()
        .map(|(k, v)| (k.clone(), encode_value(v)))
        .collect()
}

fn encode_timestamp(ts: &DateTime<Utc>) -> Value {
    json!({ "timestampValue": ts.to_rfc3339_opts(SecondsFormat::Micros, true) })
}

/// Decode a Firestore value back to plain JSON.
///
/// Timestamps, bytes and references come back as strings; geo points as
/// `{latitude, longitude}`.
pub fn decode_value(value: &Value) -> Result<Value, String> {
    let obj = value
        .as_object()
        .ok_or_else(|| format!("expected typed value object, got {}", value))?;
    let (kind, inner) = obj
        .iter()
        .next()
        .ok_or_else(|| "empty typed value".to_string())?;

    match kind.as_str() {
        "nullValue" => Ok(Value::Null),
        "booleanValue" => inner
            .as_bool()
            .map(Value::Bool)
            .ok_or_else(|| format!("invalid booleanValue {}", inner)),
        "integerValue" => {
            let parsed = match inner {
                Value::String(s) => s.parse::<i64>().ok(),
                Value::Number(n) => n.as_i64(),
                _ => None,
            };
            parsed
                .map(Value::from)
                .ok_or_else(|| format!("invalid integerValue {}", inner))
        }
        "doubleValue" => {
            let parsed = match inner {
                Value::Number(n) => n.as_f64(),
                // NaN and infinities arrive as strings
                Value::String(s) => s.parse::<f64>().ok(),
                _ => None,
            };
            parsed
                .map(Value::from)
                .ok_or_else(|| format!("invalid doubleValue {}", inner))
        }
        "stringValue" | "timestampValue" | "bytesValue" | "referenceValue" => inner
            .as_str()
            .map(|s| Value::String(s.to_string()))
            .ok_or_else(|| format!("invalid {} {}", kind, inner)),
        "geoPointValue" => Ok(inner.clone()),
        "arrayValue" => {
            let values = match inner.get("values") {
                Some(Value::Array(items)) => items
                    .iter()
                    .map(decode_value)
                    .collect::<Result<Vec<_>, _>>()?,
                // an empty array omits `values`
                _ => Vec::new(),
            };
            Ok(Value::Array(values))
        }
        "mapValue" => match inner.get("fields") {
            Some(Value::Object(fields)) => decode_fields(fields).map(Value::Object),
            _ => Ok(Value::Object(Map::new())),
        },
        other => Err(format!("unsupported value type `{}`", other)),
    }
}

pub fn decode_fields(fields: &Map<String, Value>) -> Result<Map<String, Value>, String> {
    fields
        .iter()
        .map(|(k, v)| decode_value(v).map(|decoded| (k.clone(), decoded)))
        .collect()
}

/// Build the `fields` body for a new document.
pub fn encode_record(record: &NewImageRecord, timestamp: &DateTime<Utc>) -> Value {
    json!({
        "fields": {
            "image_url": { "stringValue": record.image_url },
            "public_id": { "stringValue": record.public_id },
            "source_type": { "stringValue": record.source_type },
            "timestamp": encode_timestamp(timestamp),
            "metadata": { "mapValue": { "fields": encode_fields(&record.metadata) } },
        }
    })
}

/// Turn a Firestore document (`{name, fields, createTime, ...}`) into a record.
pub fn decode_record(document: &Value) -> Result<ImageRecord, String> {
    let name = document
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| "document has no name".to_string())?;
    let id = document_id(name).to_string();

    let empty = Map::new();
    let fields = match document.get("fields") {
        Some(Value::Object(fields)) => fields,
        _ => &empty,
    };
    let decoded = decode_fields(fields)?;

    let string_field = |key: &str| decoded.get(key).and_then(Value::as_str).map(str::to_string);

    let image_url = string_field("image_url").ok_or_else(|| format!("{}: missing image_url", id))?;
    let source_type = string_field("source_type").unwrap_or_default();
    let timestamp = match string_field("timestamp") {
        Some(raw) => DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|err| format!("{}: invalid timestamp `{}`: {}", id, raw, err))?,
        None => return Err(format!("{}: missing timestamp", id)),
    };
    let metadata: Metadata = match decoded.get("metadata") {
        Some(Value::Object(map)) => map.clone(),
        _ => Metadata::new(),
    };

    Ok(ImageRecord {
        id,
        image_url,
        public_id: string_field("public_id"),
        source_type,
        timestamp,
        metadata,
    })
}

/// Last path segment of a full document resource name.
pub fn document_id(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}
