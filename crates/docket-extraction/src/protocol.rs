//! Decoding of extraction service messages into [`ExtractionEvent`]s.
//!
//! The service is loose about field names and nesting: counts may sit
//! flat on the message or under `result`/`data`/`stats`, and may be
//! numbers or arrays. Everything is normalized here so the rest of the
//! crate only sees the canonical shapes.

use serde_json::{Map, Value};

use docket_core::error::{DocketError, Result};
use docket_core::extraction::{ExtractionEvent, ExtractionSummary, TerminalResult};

const NESTED_KEYS: &[&str] = &["result", "data", "stats"];
const ENTITY_KEYS: &[&str] = &["entity_count", "entities_count", "num_entities", "entities"];
const RELATIONSHIP_KEYS: &[&str] = &[
    "relationship_count",
    "relationships_count",
    "num_relationships",
    "relationships",
    "relations",
];
const TRANSCRIPT_KEYS: &[&str] = &["transcript", "raw_response", "llm_response", "response"];
const TOKEN_KEYS: &[&str] = &["token", "text", "content"];
const ERROR_KEYS: &[&str] = &["message", "error", "detail"];
const INDEX_KEYS: &[&str] = &["chunk_index", "index", "chunk"];
const CHUNK_TOTAL_KEYS: &[&str] = &["total_chunks", "num_chunks", "chunk_count", "chunks"];

/// Decode one streamed message.
pub fn decode_event(raw: &str) -> Result<ExtractionEvent> {
    let value: Value = serde_json::from_str(raw.trim())
        .map_err(|e| DocketError::Protocol(format!("invalid JSON message: {e}")))?;
    let obj = value
        .as_object()
        .ok_or_else(|| DocketError::Protocol("message is not a JSON object".into()))?;
    let kind = obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| DocketError::Protocol("message has no 'type' field".into()))?;

    let event = match kind {
        "status" => ExtractionEvent::Status {
            message: find_text(obj, &["message", "status", "detail"]).unwrap_or_default(),
        },
        "document_info" => ExtractionEvent::DocumentInfo {
            info: obj
                .get("info")
                .or_else(|| obj.get("data"))
                .cloned()
                .unwrap_or_else(|| without_type(obj)),
        },
        "chunking_complete" => ExtractionEvent::ChunkingComplete {
            total_chunks: require_u32(obj, CHUNK_TOTAL_KEYS, kind)?,
        },
        "chunk_start" => ExtractionEvent::ChunkStart {
            index: require_u32(obj, INDEX_KEYS, kind)?,
        },
        "chunk_complete" => ExtractionEvent::ChunkComplete {
            index: require_u32(obj, INDEX_KEYS, kind)?,
        },
        "chunk_error" => ExtractionEvent::ChunkError {
            index: require_u32(obj, INDEX_KEYS, kind)?,
            message: find_text(obj, ERROR_KEYS).unwrap_or_else(|| "chunk failed".into()),
        },
        "llm_start" => ExtractionEvent::LlmStart,
        "llm_token" => ExtractionEvent::LlmToken {
            text: find_text(obj, TOKEN_KEYS).ok_or_else(|| {
                DocketError::Protocol("llm_token message carries no text".into())
            })?,
        },
        "llm_complete" => ExtractionEvent::LlmComplete,
        "llm_error" => ExtractionEvent::LlmError {
            message: find_text(obj, ERROR_KEYS).unwrap_or_else(|| "generation failed".into()),
        },
        "extraction_complete" => ExtractionEvent::ExtractionComplete(summary_from(obj)),
        "error" => ExtractionEvent::Error {
            message: find_text(obj, ERROR_KEYS).unwrap_or_else(|| "extraction failed".into()),
        },
        other => {
            return Err(DocketError::Protocol(format!("unknown event type '{other}'")));
        }
    };

    Ok(event)
}

/// Decode the body of a synchronous (non-streaming) extraction response
/// into a terminal result.
///
/// Accepts a typed terminal event, a `{success, result | error}`
/// envelope, or a bare result object.
pub fn decode_fallback(raw: &str) -> Result<TerminalResult> {
    let value: Value = serde_json::from_str(raw.trim())
        .map_err(|e| DocketError::Protocol(format!("invalid JSON response: {e}")))?;
    let obj = value
        .as_object()
        .ok_or_else(|| DocketError::Protocol("response is not a JSON object".into()))?;

    if obj.contains_key("type") {
        return match decode_event(raw)? {
            ExtractionEvent::ExtractionComplete(summary) => Ok(TerminalResult::Succeeded(summary)),
            ExtractionEvent::Error { message } => Ok(TerminalResult::Failed { message }),
            other => Err(DocketError::Protocol(format!(
                "response carries non-terminal event '{}'",
                other.kind()
            ))),
        };
    }

    if let Some(success) = obj.get("success").and_then(Value::as_bool) {
        if !success {
            let message = find_text(obj, ERROR_KEYS).unwrap_or_else(|| "extraction failed".into());
            return Ok(TerminalResult::Failed { message });
        }
        return Ok(TerminalResult::Succeeded(summary_from(obj)));
    }

    let has_counts = find_value(obj, ENTITY_KEYS).is_some()
        || find_value(obj, RELATIONSHIP_KEYS).is_some();
    if !has_counts {
        if let Some(message) = find_text(obj, &["error", "detail"]) {
            return Ok(TerminalResult::Failed { message });
        }
    }

    Ok(TerminalResult::Succeeded(summary_from(obj)))
}

fn summary_from(obj: &Map<String, Value>) -> ExtractionSummary {
    ExtractionSummary {
        entity_count: find_value(obj, ENTITY_KEYS).and_then(as_count).unwrap_or(0),
        relationship_count: find_value(obj, RELATIONSHIP_KEYS)
            .and_then(as_count)
            .unwrap_or(0),
        transcript: find_text(obj, TRANSCRIPT_KEYS),
    }
}

/// First value under any of `keys`, looking at the object itself and
/// then inside the nested containers.
fn find_value<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    find_flat(obj, keys).or_else(|| {
        NESTED_KEYS.iter().find_map(|container| {
            let inner = obj.get(*container)?.as_object()?;
            find_flat(inner, keys).or_else(|| {
                NESTED_KEYS
                    .iter()
                    .find_map(|c| find_flat(inner.get(*c)?.as_object()?, keys))
            })
        })
    })
}

fn find_flat<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find(|v| !v.is_null())
}

fn find_text(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| obj.get(*k)?.as_str().map(str::to_string)).or_else(|| {
        NESTED_KEYS.iter().find_map(|container| {
            let inner = obj.get(*container)?.as_object()?;
            keys.iter()
                .find_map(|k| inner.get(*k)?.as_str().map(str::to_string))
        })
    })
}

fn as_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::Array(items) => Some(items.len() as u64),
        Value::Object(map) => Some(map.len() as u64),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn require_u32(obj: &Map<String, Value>, keys: &[&str], kind: &str) -> Result<u32> {
    find_value(obj, keys)
        .and_then(as_count)
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| DocketError::Protocol(format!("{kind} message has no usable {}", keys[0])))
}

fn without_type(obj: &Map<String, Value>) -> Value {
    let mut copy = obj.clone();
    copy.remove("type");
    Value::Object(copy)
}
