//! Echo server that reads a request body as a stream, parses it as JSON and
//! reports what it found.

use axum::{
    Router,
    body::Body,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use bytes::BytesMut;
use futures_util::StreamExt;
use http_body_util::BodyStream;
use serde_json::Value;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::debug;

#[derive(Debug, Error)]
pub enum EchoError {
    #[error("{0}")]
    Body(#[from] axum::Error),

    #[error("{0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl IntoResponse for EchoError {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, format!("error: {}", self)).into_response()
    }
}

/// JavaScript `typeof` for a parsed JSON value.
pub fn js_typeof(value: &Value) -> &'static str {
    match value {
        Value::Null | Value::Array(_) | Value::Object(_) => "object",
        Value::String(_) => "string",
        Value::Number(_) => "number",
        Value::Bool(_) => "boolean",
    }
}

/// Compact JSON as JavaScript's `JSON.stringify` prints it: object keys in
/// document order and whole floats without a trailing `.0`.
pub fn js_stringify(value: &Value) -> String {
    match value {
        Value::Number(n) if n.is_f64() => n.as_f64().map(js_number).unwrap_or_else(|| n.to_string()),
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(js_stringify).collect();
            format!("[{}]", items.join(","))
        }
        Value::Object(map) => {
            let entries: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}:{}", Value::String(k.clone()), js_stringify(v)))
                .collect();
            format!("{{{}}}", entries.join(","))
        }
        _ => value.to_string(),
    }
}

/// JavaScript number-to-string for a finite double.
fn js_number(n: f64) -> String {
    let abs = n.abs();
    if abs == 0.0 {
        "0".to_string()
    } else if abs >= 1e21 || abs < 1e-6 {
        // JS always signs the exponent
        let s = format!("{:e}", n);
        match s.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{}e+{}", mantissa, exp),
            _ => s,
        }
    } else {
        n.to_string()
    }
}

/// Parse a complete body and describe it.
pub fn describe(body: &[u8]) -> Result<String, EchoError> {
    let text = std::str::from_utf8(body)?;
    let data: Value = serde_json::from_str(text)?;
    Ok(format!("typeof data is: {} and data is {}", js_typeof(&data), js_stringify(&data)))
}

/// Collect the body chunk by chunk, then describe it.
pub async fn echo(body: Body) -> Result<String, EchoError> {
    let mut stream = BodyStream::new(body);
    let mut buf = BytesMut::new();

    while let Some(frame) = stream.next().await {
        let frame = frame?;
        if let Some(chunk) = frame.data_ref() {
            debug!("chunk ({} bytes): {}", chunk.len(), String::from_utf8_lossy(chunk));
            buf.extend_from_slice(chunk);
        }
    }

    describe(&buf)
}

/// Every method and path goes to `echo`.
pub fn router() -> Router {
    Router::new()
        .fallback(echo)
        .layer(TraceLayer::new_for_http())
}
