//! Response envelope decoding.
//!
//! The Engine answers in several shapes. A 2xx body is decoded by trying
//! one parser per known shape in a fixed order:
//!
//! 1. empty body → no data
//! 2. `{ "success": bool, "data": ..., "error": ... }` → the Engine's own envelope
//! 3. `{ "detail": "..." }` → framework error body, turned into an error
//! 4. any other JSON value → the value itself is the data
//! 5. anything that is not JSON → raw text
//!
//! Non-2xx bodies go through [`error_for_status`].

use serde_json::Value;

use crate::shared::error::{ApiError, ApiResult};

/// A decoded 2xx response body
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Empty,
    Engine {
        success: bool,
        data: Option<Value>,
        error: Option<ApiError>,
    },
    Detail(String),
    Json(Value),
    Text(String),
}

impl Envelope {
    pub fn decode(body: &str) -> Self {
        if body.trim().is_empty() {
            return Envelope::Empty;
        }
        let Ok(value) = serde_json::from_str::<Value>(body) else {
            return Envelope::Text(body.to_string());
        };
        decode_engine(&value)
            .or_else(|| decode_detail(&value))
            .unwrap_or(Envelope::Json(value))
    }

    /// Collapse into the request result. `Ok(None)` means "no data".
    pub fn into_result(self) -> ApiResult<Option<Value>> {
        match self {
            Envelope::Empty => Ok(None),
            Envelope::Engine {
                success: true,
                data,
                ..
            } => Ok(data),
            Envelope::Engine {
                success: false,
                error,
                ..
            } => Err(error.unwrap_or_else(|| ApiError::engine("Engine reported a failure"))),
            Envelope::Detail(detail) => Err(ApiError::engine(detail)),
            Envelope::Json(value) => Ok(Some(value)),
            Envelope::Text(text) => Ok(Some(Value::String(text))),
        }
    }
}

fn decode_engine(value: &Value) -> Option<Envelope> {
    let object = value.as_object()?;
    let success = object.get("success")?.as_bool()?;
    let data = object.get("data").filter(|d| !d.is_null()).cloned();
    let error = object
        .get("error")
        .and_then(engine_error)
        .map(|(message, code)| {
            let error = ApiError::engine(message);
            match code {
                Some(code) => error.with_code(code),
                None => error,
            }
        });
    Some(Envelope::Engine {
        success,
        data,
        error,
    })
}

fn decode_detail(value: &Value) -> Option<Envelope> {
    let detail = value.as_object()?.get("detail")?.as_str()?;
    Some(Envelope::Detail(detail.to_string()))
}

/// `error` as either a bare string or `{ message, code? }`
fn engine_error(error: &Value) -> Option<(String, Option<String>)> {
    match error {
        Value::String(message) => Some((message.clone(), None)),
        Value::Object(object) => {
            let message = object.get("message")?.as_str()?.to_string();
            let code = object
                .get("code")
                .and_then(|c| match c {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                });
            Some((message, code))
        }
        _ => None,
    }
}

/// Human-readable message carried by an error body, if any.
fn error_body_message(body: &str) -> Option<(String, Option<String>)> {
    let value: Value = serde_json::from_str(body).ok()?;
    let object = value.as_object()?;

    match object.get("detail") {
        Some(Value::String(detail)) => return Some((detail.clone(), None)),
        // Validation failures: [{ "loc": [...], "msg": "..." }, ...]
        Some(Value::Array(items)) => {
            let messages: Vec<&str> = items
                .iter()
                .filter_map(|item| item.get("msg").and_then(Value::as_str))
                .collect();
            if !messages.is_empty() {
                return Some((messages.join("; "), None));
            }
        }
        _ => {}
    }

    object.get("error").and_then(engine_error)
}

/// Error for a non-2xx response.
pub fn error_for_status(status: u16, reason: &str, body: &str, path: &str) -> ApiError {
    if let Some((message, code)) = error_body_message(body) {
        let error = ApiError::http(status, message);
        return match code {
            Some(code) => error.with_code(code),
            None => error,
        };
    }

    let message = match status {
        401 | 403 => format!(
            "Authentication failed (HTTP {}): check the Engine API key",
            status
        ),
        404 => format!("Endpoint not found: {}", path),
        _ if reason.is_empty() => format!("HTTP {}", status),
        _ => format!("HTTP {}: {}", status, reason),
    };
    ApiError::http(status, message)
}
