// Diagnostics export with recursive redaction.
//
// Vendor payloads carry account and device identifiers at arbitrary
// nesting depth, so redaction walks the whole tree by key name.

use serde_json::{json, Value};

/// Keys whose values are replaced before a diagnostics dump leaves the
/// process, matched case-insensitively at every nesting level.
const TO_REDACT: &[&str] = &[
    "id",
    "_id",
    "_deviceid",
    "email",
    "phone",
    "phonenumber",
    "password",
    "token",
    "fcmtoken",
    "serialnumber",
    "serial_number",
    "owner",
];

const REDACTED: &str = "**REDACTED**";

fn is_sensitive(key: &str) -> bool {
    TO_REDACT.iter().any(|k| key.eq_ignore_ascii_case(k))
}

/// Return a copy of `value` with all sensitive fields replaced.
pub fn redact(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, val)| {
                    if is_sensitive(key) {
                        (key.clone(), json!(REDACTED))
                    } else {
                        (key.clone(), redact(val))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        other => other.clone(),
    }
}
