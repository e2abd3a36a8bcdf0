use serde_json::Value;

use crate::sos::error::SosError;

/// Reads `is_active` from the raw body. Only JSON booleans are accepted:
/// `"true"`, `1` and a missing field are all invalid.
pub fn parse_is_active(body: &Value) -> Result<bool, SosError> {
    body.get("is_active")
        .and_then(Value::as_bool)
        .ok_or(SosError::InvalidInput)
}
