//! Shared HTTP utilities for the users demo workspace.
//!
//! Provides the `{success, ...}` envelope builders, timestamp formatting and
//! HTML escaping used by the api-server routes and page.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::time::SystemTime;

// ============================================================================
// JSON Envelope Helpers (framework-agnostic)
// ============================================================================

/// Success envelope carrying one payload field plus the serving store labels.
///
/// Returns: `{"success": true, "<key>": <value>, "database": "<db>", "type": "<kind>"}`
pub fn json_success(key: &str, value: Value, database: &str, kind: &str) -> Value {
    let mut body = Map::new();
    body.insert("success".into(), Value::Bool(true));
    body.insert(key.into(), value);
    body.insert("database".into(), Value::String(database.into()));
    body.insert("type".into(), Value::String(kind.into()));
    Value::Object(body)
}

/// Failure envelope.
///
/// Returns: `{"success": false, "error": "<error>"}` with `"details"` added
/// when the backend supplied one.
pub fn json_failure(error: &str, details: Option<&str>) -> Value {
    let mut body = serde_json::json!({"success": false, "error": error});
    if let (Some(d), Value::Object(m)) = (details, &mut body) {
        m.insert("details".into(), Value::String(d.into()));
    }
    body
}

// ============================================================================
// Time Utilities
// ============================================================================

/// Convert SystemTime to RFC3339 string (millisecond precision, UTC).
pub fn system_time_to_rfc3339(t: SystemTime) -> String {
    let dt: DateTime<Utc> = t.into();
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

// ============================================================================
// HTML
// ============================================================================

/// Escape text for use in HTML bodies and quoted attribute values.
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}
