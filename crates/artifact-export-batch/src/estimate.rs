// Payload size estimation
//
// Approximates the serialized JSON size of a document so batches can be
// flushed by payload size as well as document count.

use serde_json::Value;

const NULL_BYTES: u64 = 4;
const QUOTE_BYTES: u64 = 2;
const NUMBER_BYTES: u64 = 20; // coarse placeholder, never exact
const BOOL_BYTES: u64 = 5;
const BRACKET_BYTES: u64 = 2;
const ENTRY_SEPARATOR_BYTES: u64 = 3;

/// Estimates the byte size of `document` when serialized as JSON.
///
/// Strings count their UTF-8 length plus quotes, numbers a flat 20 bytes,
/// maps and lists their brackets plus their contents. Separators between
/// siblings are not counted, so the result underestimates the real payload.
/// Only use it as a soft cap.
pub fn estimate_bytes(document: &Value) -> u64 {
    match document {
        Value::Null => NULL_BYTES,
        Value::Bool(_) => BOOL_BYTES,
        Value::Number(_) => NUMBER_BYTES,
        Value::String(s) => quoted_len(s),
        Value::Array(items) => {
            BRACKET_BYTES + items.iter().map(estimate_bytes).sum::<u64>()
        }
        Value::Object(map) => {
            BRACKET_BYTES
                + map
                    .iter()
                    .map(|(key, value)| {
                        ENTRY_SEPARATOR_BYTES + quoted_len(key) + estimate_bytes(value)
                    })
                    .sum::<u64>()
        }
    }
}

fn quoted_len(s: &str) -> u64 {
    s.len() as u64 + QUOTE_BYTES
}
