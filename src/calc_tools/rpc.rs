// =============================================================================
// JSON-RPC 2.0 envelope — request/response/error types
// =============================================================================
//
// Minimal hand-rolled envelope; the wire format is exactly JSON-RPC 2.0 but
// the surface this server needs is small enough that a dedicated crate
// would add more ceremony than it removes.
// =============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PARSE_ERROR: i64 = -32700;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;
pub const TOOL_ERROR: i64 = -32000;

#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

#[derive(Debug, Serialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcResponse {
    pub fn ok(id: Value, result: Value) -> Self {
        Self { jsonrpc: "2.0", id, result: Some(result), error: None }
    }

    pub fn err(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(RpcError { code, message: message.into(), data: None }),
        }
    }

    pub fn parse_error() -> Self {
        Self::err(Value::Null, PARSE_ERROR, "parse error")
    }
}

/// A tool-level failure, carrying the JSON-RPC error code it maps to.
#[derive(Debug)]
pub struct ToolError {
    pub code: i64,
    pub message: String,
}

impl ToolError {
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self { code: INVALID_PARAMS, message: message.into() }
    }

    pub fn tool(message: impl Into<String>) -> Self {
        Self { code: TOOL_ERROR, message: message.into() }
    }
}

pub type ToolResult = Result<Value, ToolError>;

/// Coerces a JSON value expected to be numeric: accepts `number`, or an
/// integer encoded as `int32`/`int64`, rejects everything else with a
/// message naming the field.
pub fn coerce_f64(params: &Value, field: &str) -> Result<f64, ToolError> {
    match params.get(field) {
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| ToolError::invalid_params(format!("{field} is not a valid number"))),
        Some(other) => Err(ToolError::invalid_params(format!(
            "{field} must be a number, got {other}"
        ))),
        None => Err(ToolError::invalid_params(format!("missing required field: {field}"))),
    }
}

pub fn coerce_f64_opt(params: &Value, field: &str) -> Result<Option<f64>, ToolError> {
    match params.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| ToolError::invalid_params(format!("{field} is not a valid number"))),
        Some(other) => Err(ToolError::invalid_params(format!(
            "{field} must be a number, got {other}"
        ))),
    }
}

pub fn require_array<'a>(params: &'a Value, field: &str) -> Result<&'a Vec<Value>, ToolError> {
    params
        .get(field)
        .and_then(Value::as_array)
        .filter(|a| !a.is_empty())
        .ok_or_else(|| ToolError::invalid_params(format!("{field} must be a non-empty array")))
}

pub fn coerce_f64_array(values: &[Value], field: &str) -> Result<Vec<f64>, ToolError> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            v.as_f64()
                .ok_or_else(|| ToolError::invalid_params(format!("{field}[{i}] must be a number")))
        })
        .collect()
}

pub fn require_str<'a>(params: &'a Value, field: &str) -> Result<&'a str, ToolError> {
    params
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::invalid_params(format!("missing required field: {field}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn coerce_f64_accepts_int_and_float() {
        let params = json!({"a": 1, "b": 1.5});
        assert_eq!(coerce_f64(&params, "a").unwrap(), 1.0);
        assert_eq!(coerce_f64(&params, "b").unwrap(), 1.5);
    }

    #[test]
    fn coerce_f64_rejects_non_numeric() {
        let params = json!({"a": "nope"});
        let err = coerce_f64(&params, "a").unwrap_err();
        assert_eq!(err.code, INVALID_PARAMS);
    }

    #[test]
    fn require_array_rejects_empty() {
        let params = json!({"returns": []});
        assert!(require_array(&params, "returns").is_err());
    }
}
