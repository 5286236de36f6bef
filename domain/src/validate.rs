//! Lightweight input validation helpers. Keep logic minimal and deterministic.
//!
//! Only presence is checked here. Range rules (such as the age bounds) live in
//! the relational schema and nowhere else.

use crate::{NewUser, StoreError};

/// Ensure a required field is present and non-empty.
pub fn require_field(field: &str, value: Option<String>) -> Result<String, StoreError> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(StoreError::Validation(format!("missing required field: {}", field))),
    }
}

/// Coerce an age to an integer the way a lenient form parser would: leading
/// whitespace is skipped, an optional sign and the leading run of digits are
/// kept, and anything after that is ignored (`"40.9"` -> 40, `"12abc"` -> 12).
/// Returns `None` when there are no leading digits or the value overflows.
pub fn coerce_age(raw: &str) -> Option<i64> {
    let s = raw.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    let magnitude: i64 = digits[..end].parse().ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

/// Build a `NewUser` from raw form/JSON fields.
///
/// Fails with `StoreError::Validation` naming every missing field, or with
/// `StoreError::InvalidValue` when the age has no integer reading.
pub fn new_user_from_fields(
    name: Option<String>,
    email: Option<String>,
    age: Option<String>,
) -> Result<NewUser, StoreError> {
    let missing: Vec<&str> = [("name", &name), ("email", &email), ("age", &age)]
        .iter()
        .filter(|(_, v)| v.as_deref().map_or(true, str::is_empty))
        .map(|(k, _)| *k)
        .collect();
    if !missing.is_empty() {
        return Err(StoreError::Validation(format!(
            "missing required fields: {}",
            missing.join(", ")
        )));
    }

    let name = require_field("name", name)?;
    let email = require_field("email", email)?;
    let age_raw = require_field("age", age)?;
    let age = coerce_age(&age_raw).ok_or_else(|| StoreError::InvalidValue {
        field: "age",
        message: format!("'{}' is not an integer", age_raw),
    })?;
    Ok(NewUser { name, email, age })
}
