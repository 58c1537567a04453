pub mod actions;
pub mod currency;
pub mod inventory;
pub mod market;
pub mod orders;
pub mod weather;

use serde_json::{Map, Value};

use secureorder_core::error::{Result, SecureOrderError};

/// Fetch a string argument that has already passed schema validation.
pub(crate) fn str_arg<'a>(args: &'a Map<String, Value>, name: &str) -> Result<&'a str> {
    args.get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| SecureOrderError::ToolValidation(format!("'{}' must be a string", name)))
}

pub(crate) fn exec_err(tool: &str, message: impl std::fmt::Display) -> SecureOrderError {
    SecureOrderError::ToolExecution {
        tool: tool.to_string(),
        message: message.to_string(),
    }
}

/// Shared HTTP client settings for the live-data tools.
pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(concat!("secureorder/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Send a request and decode the JSON body, mapping transport and HTTP failures to `ToolExecution`.
pub(crate) async fn get_json(tool: &str, request: reqwest::RequestBuilder) -> Result<Value> {
    let resp = request.send().await.map_err(|e| exec_err(tool, e))?;
    let status = resp.status();
    let body: Value = resp.json().await.unwrap_or(Value::Null);
    if !status.is_success() {
        let detail = ["message", "error-type"]
            .iter()
            .find_map(|k| body.get(*k).and_then(|v| v.as_str()))
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed"));
        return Err(exec_err(tool, format!("HTTP {}: {}", status.as_u16(), detail)));
    }
    if body.is_null() {
        return Err(exec_err(tool, "response was not valid JSON"));
    }
    Ok(body)
}
