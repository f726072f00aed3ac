//! Generic request client
//!
//! One HTTP call per `request`: format the query parameters, send, then
//! classify the response by status and declared content type.

use reqwest::{Method, StatusCode};
use serde_json::Value;
use std::fmt;
use tracing::debug;

use crate::config::ApiConfig;
use crate::error::{ApiError, Result};

/// Scalar query-parameter value
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => write!(f, "{}", s),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            // JSON literal form: `true` / `false`
            Self::Bool(b) => write!(f, "{}", if *b { "true" } else { "false" }),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<&String> for ParamValue {
    fn from(value: &String) -> Self {
        Self::Str(value.clone())
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        Self::Int(value as i64)
    }
}

impl From<u32> for ParamValue {
    fn from(value: u32) -> Self {
        Self::Int(value as i64)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Render every parameter to the string sent on the wire
pub fn format_params(params: &[(&str, ParamValue)]) -> Vec<(String, String)> {
    params
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Request body variants used by the providers
#[derive(Debug, Clone)]
pub enum RequestBody {
    Form(Vec<(String, String)>),
    Json(Value),
}

/// Successful response, dispatched by content type
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    Text(String),
}

impl Payload {
    pub fn into_json(self) -> Result<Value> {
        match self {
            Self::Json(value) => Ok(value),
            Self::Text(text) => Err(ApiError::Shape(format!(
                "expected JSON, got text: {}",
                preview(&text)
            ))),
        }
    }

    pub fn into_text(self) -> Result<String> {
        match self {
            Self::Text(text) => Ok(text),
            Self::Json(value) => Ok(value.to_string()),
        }
    }

    /// JSON payload narrowed to the value under `key`
    pub fn subset(self, key: &str) -> Result<Value> {
        subset(self.into_json()?, key)
    }
}

/// Take the value under `key` out of a JSON object
pub fn subset(value: Value, key: &str) -> Result<Value> {
    match value {
        Value::Object(mut map) => map
            .remove(key)
            .ok_or_else(|| ApiError::MissingKey(key.to_string())),
        _ => Err(ApiError::MissingKey(key.to_string())),
    }
}

/// Best-effort error text out of an error body
pub fn error_message(body: &str) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        for key in ["error", "message", "Message", "Error Message", "error_description"] {
            match map.get(key) {
                Some(Value::String(s)) => return s.clone(),
                Some(Value::Null) | None => {}
                Some(other) => return other.to_string(),
            }
        }
    }
    body.to_string()
}

/// Classify a finished response
pub fn classify_response(status: StatusCode, content_type: &str, body: String) -> Result<Payload> {
    if !status.is_success() {
        return Err(ApiError::Api {
            status: status.as_u16(),
            message: error_message(&body),
        });
    }

    let content_type = content_type.to_ascii_lowercase();
    if content_type.contains("application/json") {
        return serde_json::from_str(&body)
            .map(Payload::Json)
            .map_err(|_| ApiError::Content {
                content_type,
                body,
            });
    }
    if content_type.contains("text/csv") || content_type.contains("text/plain") {
        return Ok(Payload::Text(body));
    }

    Err(ApiError::Content {
        content_type,
        body,
    })
}

fn preview(text: &str) -> &str {
    match text.char_indices().nth(200) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Shared HTTP plumbing for one provider base URL
#[derive(Debug, Clone)]
pub struct RequestClient {
    http: reqwest::Client,
    base_url: String,
    default_params: Vec<(String, String)>,
}

impl RequestClient {
    pub fn new(config: &ApiConfig) -> anyhow::Result<Self> {
        Ok(Self {
            http: config.http_client()?,
            base_url: config.base_url.clone(),
            default_params: Vec::new(),
        })
    }

    /// Query parameter appended to every request (API keys)
    pub fn with_default_param(mut self, key: &str, value: impl Into<String>) -> Self {
        self.default_params.push((key.to_string(), value.into()));
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Join `path` to the base URL with exactly one separator
    pub fn url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            self.base_url.clone()
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Perform one HTTP call and classify the result
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        headers: &[(&str, String)],
        params: &[(&str, ParamValue)],
        body: Option<RequestBody>,
    ) -> Result<Payload> {
        let url = self.url(path);
        debug!("{} {} ({} params)", method, url, params.len());

        let mut request = self
            .http
            .request(method, &url)
            .query(&self.default_params)
            .query(&format_params(params));

        for (name, value) in headers {
            request = request.header(*name, value);
        }

        request = match body {
            Some(RequestBody::Form(fields)) => request.form(&fields),
            Some(RequestBody::Json(value)) => request.json(&value),
            None => request,
        };

        let response = request.send().await?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let text = response.text().await?;

        classify_response(status, &content_type, text)
    }

    pub async fn get(&self, path: &str, params: &[(&str, ParamValue)]) -> Result<Payload> {
        self.request(Method::GET, path, &[], params, None).await
    }

    pub async fn get_with_headers(
        &self,
        path: &str,
        headers: &[(&str, String)],
        params: &[(&str, ParamValue)],
    ) -> Result<Payload> {
        self.request(Method::GET, path, headers, params, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bool_params_serialize_to_json_literals() {
        let params = [
            ("adjusted", ParamValue::from(true)),
            ("raw", ParamValue::from(false)),
            ("limit", ParamValue::from(5_i64)),
            ("symbol", ParamValue::from("AAPL")),
        ];
        let formatted = format_params(&params);
        assert_eq!(formatted[0], ("adjusted".to_string(), "true".to_string()));
        assert_eq!(formatted[1], ("raw".to_string(), "false".to_string()));
        assert_eq!(formatted[2], ("limit".to_string(), "5".to_string()));
        assert_eq!(formatted[3], ("symbol".to_string(), "AAPL".to_string()));
    }

    #[test]
    fn test_non_success_exposes_status_and_message() {
        let err = classify_response(
            StatusCode::UNAUTHORIZED,
            "application/json",
            r#"{"error":"invalid token"}"#.to_string(),
        )
        .unwrap_err();
        assert_eq!(err.status(), Some(401));
        assert_eq!(err.message(), Some("invalid token"));
    }

    #[test]
    fn test_non_json_error_body_falls_back_to_text() {
        let err = classify_response(
            StatusCode::BAD_GATEWAY,
            "text/html",
            "<html>bad gateway</html>".to_string(),
        )
        .unwrap_err();
        assert_eq!(err.status(), Some(502));
        assert_eq!(err.message(), Some("<html>bad gateway</html>"));
    }

    #[test]
    fn test_dispatch_by_content_type() {
        let json_payload = classify_response(
            StatusCode::OK,
            "application/json; charset=utf-8",
            r#"{"a":1}"#.to_string(),
        )
        .unwrap();
        assert_eq!(json_payload, Payload::Json(json!({"a": 1})));

        let csv_payload =
            classify_response(StatusCode::OK, "text/csv", "code,name\nUSD,Dollar".to_string())
                .unwrap();
        assert_eq!(csv_payload, Payload::Text("code,name\nUSD,Dollar".to_string()));

        let err = classify_response(StatusCode::OK, "image/png", "...".to_string()).unwrap_err();
        assert!(matches!(err, ApiError::Content { .. }));
    }

    #[test]
    fn test_subset_missing_key() {
        let value = json!({"result": [1, 2]});
        assert_eq!(subset(value.clone(), "result").unwrap(), json!([1, 2]));
        assert!(matches!(subset(value, "data"), Err(ApiError::MissingKey(k)) if k == "data"));

        let payload = Payload::Json(json!({"titulos": []}));
        assert_eq!(payload.subset("titulos").unwrap(), json!([]));
        assert!(Payload::Text("a,b".to_string()).subset("titulos").is_err());
    }

    #[test]
    fn test_url_join() {
        let client = RequestClient::new(&ApiConfig::new("https://api.llama.fi/")).unwrap();
        assert_eq!(client.url("/protocols"), "https://api.llama.fi/protocols");
        assert_eq!(client.url("charts/Ethereum"), "https://api.llama.fi/charts/Ethereum");
        assert_eq!(client.url(""), "https://api.llama.fi");
    }
}
