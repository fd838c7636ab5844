//! Response envelope
//!
//! Every JSON reply from the control server goes through here so that all
//! endpoints share one header set and one error shape:
//!
//! ```json
//! {"code": 400, "message": "missing level", "details": ["..."]}
//! ```
//!
//! `details` is omitted when empty. Bodies are never chunked; Content-Length
//! is always set from the encoded size.

use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::http::header::{
    HeaderMap, HeaderName, HeaderValue, CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE, EXPIRES,
    PRAGMA, X_CONTENT_TYPE_OPTIONS,
};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use super::buffer::BufferPool;
use super::errors::RequestError;

pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Sent when a status envelope itself cannot be encoded
pub const MARSHAL_FAILURE_BODY: &[u8] = br#"{"code":500,"message":"failed to marshal status"}"#;

/// Headers that keep intermediaries from caching or sniffing control-plane replies
pub fn no_cache_headers() -> [(HeaderName, HeaderValue); 4] {
    [
        (X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff")),
        (
            CACHE_CONTROL,
            HeaderValue::from_static("no-cache, no-store, must-revalidate"),
        ),
        (PRAGMA, HeaderValue::from_static("no-cache")),
        (EXPIRES, HeaderValue::from_static("0")),
    ]
}

/// Uniform status body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub code: u16,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

impl Status {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code: code.as_u16(),
            message: message.into(),
            details: Vec::new(),
        }
    }

    pub fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = details;
        self
    }
}

/// Apply the JSON content type plus the no-cache set
pub fn set_default_headers(headers: &mut HeaderMap) {
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
    for (name, value) in no_cache_headers() {
        headers.insert(name, value);
    }
}

pub fn set_content_length(headers: &mut HeaderMap, len: usize) {
    headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
}

/// Status envelope reply
pub fn status_response(code: StatusCode, message: impl Into<String>, details: Vec<String>) -> Response {
    let status = Status::new(code, message).with_details(details);
    let (code, body) = encode_or_fallback(code, &status);
    finish(code, body)
}

/// Success reply with `value` encoded as JSON through a pooled buffer.
///
/// An encoding failure turns into a 500 status envelope.
pub fn json_response<T>(pool: &Arc<BufferPool>, code: StatusCode, value: &T) -> Response
where
    T: Serialize + ?Sized,
{
    let mut buf = pool.acquire();
    if let Err(err) = serde_json::to_writer(&mut *buf, value) {
        return RequestError::Serialization(err.to_string()).into_response();
    }
    buf.push(b'\n');
    finish(code, Bytes::copy_from_slice(&buf))
}

fn encode_or_fallback<T: Serialize + ?Sized>(code: StatusCode, status: &T) -> (StatusCode, Bytes) {
    match serde_json::to_vec(status) {
        Ok(body) => (code, Bytes::from(body)),
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Bytes::from_static(MARSHAL_FAILURE_BODY),
        ),
    }
}

fn finish(code: StatusCode, body: Bytes) -> Response {
    let len = body.len();
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = code;
    set_default_headers(response.headers_mut());
    set_content_length(response.headers_mut(), len);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serializer;

    struct Unencodable;

    impl Serialize for Unencodable {
        fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("value refuses to encode"))
        }
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_status_omits_empty_details() {
        let json = serde_json::to_string(&Status::new(StatusCode::BAD_REQUEST, "nope")).unwrap();
        assert_eq!(json, r#"{"code":400,"message":"nope"}"#);

        let with_details = Status::new(StatusCode::BAD_REQUEST, "nope")
            .with_details(vec!["a".to_string(), "b".to_string()]);
        let json = serde_json::to_string(&with_details).unwrap();
        assert_eq!(json, r#"{"code":400,"message":"nope","details":["a","b"]}"#);
    }

    #[tokio::test]
    async fn test_status_response_headers() {
        let response = status_response(StatusCode::NOT_IMPLEMENTED, "later", Vec::new());
        let headers = response.headers();

        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
        assert_eq!(headers[CONTENT_TYPE], JSON_CONTENT_TYPE);
        assert_eq!(headers[X_CONTENT_TYPE_OPTIONS], "nosniff");
        assert_eq!(headers[CACHE_CONTROL], "no-cache, no-store, must-revalidate");
        assert_eq!(headers[PRAGMA], "no-cache");
        assert_eq!(headers[EXPIRES], "0");

        let expected_len = r#"{"code":501,"message":"later"}"#.len().to_string();
        assert_eq!(headers[CONTENT_LENGTH], expected_len.as_str());

        let body = body_json(response).await;
        assert_eq!(body["code"], 501);
        assert_eq!(body["message"], "later");
    }

    #[test]
    fn test_status_encoding_failure_uses_fixed_body() {
        let (code, body) = encode_or_fallback(StatusCode::BAD_REQUEST, &Unencodable);
        assert_eq!(code, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(&body[..], MARSHAL_FAILURE_BODY);

        let parsed: Status = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed.code, 500);
    }

    #[tokio::test]
    async fn test_json_response_success() {
        let pool = Arc::new(BufferPool::new());
        let response = json_response(&pool, StatusCode::OK, &serde_json::json!({"level": "info"}));

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_LENGTH], "17");
        assert_eq!(body_json(response).await["level"], "info");
        assert_eq!(pool.idle(), 1);
    }

    #[tokio::test]
    async fn test_json_response_encoding_failure_is_500_json() {
        let pool = Arc::new(BufferPool::new());
        let response = json_response(&pool, StatusCode::OK, &Unencodable);

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[CONTENT_TYPE], JSON_CONTENT_TYPE);
        let body = body_json(response).await;
        assert_eq!(body["code"], 500);
        assert_eq!(body["message"], "value refuses to encode");
        // Buffer went back to the pool on the error path too
        assert_eq!(pool.idle(), 1);
    }
}
