//! Client-facing payloads.
//!
//! Every outcome maps to a status code and a JSON body: `{status: "OK", id}`
//! for writes, `{status: "ERROR", errors}` for failures, `{res}` for method
//! calls, and the shaped records for reads.

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::bridge::ListPage;
use crate::error::BridgeError;
use crate::types::RecordId;

/// A status code with its JSON body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    pub fn record(record: Map<String, Value>) -> Self {
        Self::ok(Value::Object(record))
    }

    pub fn page(page: &ListPage) -> Self {
        Self::ok(json!({
            "items": page.items,
            "n_items": page.n_items,
            "limit": page.limit,
            "offset": page.offset,
        }))
    }

    /// Successful create or update.
    pub fn written(id: RecordId) -> Self {
        Self::ok(json!({"status": "OK", "id": id}))
    }

    pub fn deleted() -> Self {
        Self::ok(json!({"status": "OK"}))
    }

    pub fn method_result(res: Value) -> Self {
        Self::ok(json!({ "res": res }))
    }

    /// Failure payload. Remote fault detail is not exposed.
    pub fn error(error: &BridgeError) -> Self {
        Self {
            status: error.status_code(),
            body: json!({"status": "ERROR", "errors": error.field_errors()}),
        }
    }

    /// Map an operation result, rendering errors with [`ApiResponse::error`].
    pub fn from_result<T>(result: Result<T, BridgeError>, render: impl FnOnce(T) -> Self) -> Self {
        match result {
            Ok(value) => render(value),
            Err(error) => {
                tracing::debug!(error = %error, "request failed");
                Self::error(&error)
            }
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
