//! `http`: request-descriptor action.
//!
//! Dispatching a real network request is third-party-API glue that has no
//! place in this core; what belongs here is resolving the already-templated
//! method/url/headers/body into a well-formed descriptor, the same shape a
//! caller would hand to whatever HTTP client sits above this layer.

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::workflow::registry::ActionError;

/// Typed subset of `type: http`'s parameters, for `ActionMetadata::parameter_schema`.
/// `headers`/`body` stay out of the typed schema -- they're an open-ended
/// value tree, not a fixed set of fields.
#[derive(Debug, Deserialize, JsonSchema)]
#[allow(dead_code)]
pub struct HttpParams {
    /// Defaults to `GET`.
    pub method: Option<String>,
    pub url: String,
}

pub async fn action_http(params: Value, _context: Value) -> Result<Value, ActionError> {
    let method = params
        .get("method")
        .and_then(|v| v.as_str())
        .unwrap_or("GET")
        .to_uppercase();
    let url = params
        .get("url")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ActionError::new("url is required"))?
        .to_string();
    let headers = params.get("headers").cloned().unwrap_or(Value::Object(Map::new()));
    let body = params.get("body").cloned().unwrap_or(Value::Null);

    Ok(json!({
        "method": method,
        "url": url,
        "headers": headers,
        "body": body,
        "dispatched": false,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builds_descriptor_with_defaults() {
        let result = action_http(json!({"url": "https://example.com/hook"}), json!({})).await.unwrap();
        assert_eq!(result["method"], json!("GET"));
        assert_eq!(result["url"], json!("https://example.com/hook"));
        assert_eq!(result["dispatched"], json!(false));
    }

    #[tokio::test]
    async fn missing_url_errors() {
        let err = action_http(json!({"method": "post"}), json!({})).await.unwrap_err();
        assert!(err.0.contains("url is required"));
    }

    #[tokio::test]
    async fn method_is_uppercased() {
        let result = action_http(json!({"url": "https://x", "method": "post"}), json!({})).await.unwrap();
        assert_eq!(result["method"], json!("POST"));
    }
}
