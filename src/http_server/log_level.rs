//! # Log Level Endpoint
//!
//! `GET /log/level` reports the current level, `PUT /log/level` changes it.
//!
//! A change request is decoded and fully validated before the setter is
//! looked at, so a malformed level or duration can never reach the
//! embedding process. Accepted encodings:
//!
//! - JSON (`Content-Type: application/json`):
//!   `{"level": "debug", "duration": "5m"}`
//! - form fields `level` and `duration`, read from an
//!   `application/x-www-form-urlencoded` body and then from the query string
//!
//! Durations use humantime syntax (`30s`, `1h30m`) and also accept decimal
//! amounts per unit (`1.5h`, `2.5s`, `250us`). A non-zero duration asks the
//! setter to revert after that long; the revert itself is the setter's
//! business.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::{HeaderMap, HeaderValue, ALLOW, CONTENT_TYPE};
use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, MethodRouter};
use serde::{Deserialize, Serialize};

use super::buffer::BufferPool;
use super::envelope::json_response;
use super::errors::RequestError;
use super::options::{LevelGetter, LevelSetter};
use crate::observability::{Level, Logger, MetricsRegistry};

pub const LOG_LEVEL_PATH: &str = "/log/level";

const JSON_MEDIA_TYPE: &str = "application/json";
const FORM_MEDIA_TYPE: &str = "application/x-www-form-urlencoded";

/// Body of a successful GET
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelResponse {
    pub level: Level,
}

/// Raw change request, identical whichever encoding carried it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelChangeRequest {
    #[serde(default)]
    pub level: String,
    /// Interval text such as `30s`; absent or empty means permanent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
}

/// A validated change, ready for the setter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelChange {
    pub level: Level,
    pub duration: Duration,
}

impl LevelChangeRequest {
    /// Decode a request from the body (and query string) of a PUT
    pub fn from_parts(headers: &HeaderMap, query: Option<&str>, body: &[u8]) -> Result<Self, RequestError> {
        if has_media_type(headers, JSON_MEDIA_TYPE) {
            Self::from_json(body)
        } else {
            let form_body = has_media_type(headers, FORM_MEDIA_TYPE).then_some(body);
            Self::from_form(form_body, query)
        }
    }

    pub fn from_json(body: &[u8]) -> Result<Self, RequestError> {
        // Keep the message stable for clients instead of leaking an EOF error
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(RequestError::EmptyBody);
        }
        serde_json::from_slice::<Self>(body)
            .map(Self::normalized)
            .map_err(|err| RequestError::MalformedJson(err.to_string()))
    }

    /// Body fields come first, then the query string; the first value of a
    /// repeated field wins.
    pub fn from_form(body: Option<&[u8]>, query: Option<&str>) -> Result<Self, RequestError> {
        let mut pairs: Vec<(String, String)> = Vec::new();
        if let Some(body) = body {
            pairs.extend(
                serde_urlencoded::from_bytes::<Vec<(String, String)>>(body)
                    .map_err(|err| RequestError::MalformedForm(err.to_string()))?,
            );
        }
        if let Some(query) = query {
            pairs.extend(
                serde_urlencoded::from_str::<Vec<(String, String)>>(query)
                    .map_err(|err| RequestError::MalformedForm(err.to_string()))?,
            );
        }

        let mut level = None;
        let mut duration = None;
        for (key, value) in pairs {
            match key.as_str() {
                "level" if level.is_none() => level = Some(value),
                "duration" if duration.is_none() => duration = Some(value),
                _ => {}
            }
        }

        Ok(Self {
            level: level.unwrap_or_default(),
            duration,
        }
        .normalized())
    }

    fn normalized(mut self) -> Self {
        if self.duration.as_deref().is_some_and(str::is_empty) {
            self.duration = None;
        }
        self
    }

    /// Parse level and duration
    pub fn validate(&self) -> Result<LevelChange, RequestError> {
        if self.level.is_empty() {
            return Err(RequestError::MissingLevel);
        }
        let level = self.level.parse::<Level>()?;

        let duration = match self.duration.as_deref() {
            Some(text) => parse_interval(text).map_err(|err| {
                RequestError::InvalidDuration {
                    text: text.to_string(),
                    reason: err.to_string(),
                }
            })?,
            None => Duration::ZERO,
        };

        Ok(LevelChange { level, duration })
    }
}

fn parse_interval(text: &str) -> Result<Duration, humantime::DurationError> {
    humantime::parse_duration(text).or_else(|err| parse_decimal_interval(text).ok_or(err))
}

/// `<amount><unit>` runs where amounts may carry a fraction
fn parse_decimal_interval(text: &str) -> Option<Duration> {
    let mut rest = text.trim();
    if rest.is_empty() {
        return None;
    }

    let mut seconds = 0f64;
    while !rest.is_empty() {
        let amount_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (amount, tail) = rest.split_at(amount_len);
        let amount: f64 = amount.parse().ok()?;

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);
        let scale = match unit {
            "h" => 3600.0,
            "m" => 60.0,
            "s" => 1.0,
            "ms" => 1e-3,
            "us" | "µs" => 1e-6,
            "ns" => 1e-9,
            _ => return None,
        };

        seconds += amount * scale;
        rest = tail;
    }
    Duration::try_from_secs_f64(seconds).ok()
}

fn has_media_type(headers: &HeaderMap, media_type: &str) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .is_some_and(|essence| essence.trim().eq_ignore_ascii_case(media_type))
}

/// Shared state of the log level endpoint
pub struct LogLevelState {
    getter: Option<LevelGetter>,
    setter: Option<LevelSetter>,
    pool: Arc<BufferPool>,
    metrics: Arc<MetricsRegistry>,
}

impl LogLevelState {
    pub fn new(
        getter: Option<LevelGetter>,
        setter: Option<LevelSetter>,
        pool: Arc<BufferPool>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            getter,
            setter,
            pool,
            metrics,
        }
    }

    fn get_level(&self) -> Result<Response, RequestError> {
        let getter = self.getter.as_ref().ok_or(RequestError::GetterUnavailable)?;
        let body = LevelResponse { level: getter() };

        self.metrics.increment_level_reads();
        Ok(json_response(&self.pool, StatusCode::OK, &body))
    }

    fn put_level(&self, headers: &HeaderMap, query: Option<&str>, body: &[u8]) -> Result<Response, RequestError> {
        let change = LevelChangeRequest::from_parts(headers, query, body)?.validate()?;
        let setter = self.setter.as_ref().ok_or(RequestError::SetterUnavailable)?;

        setter(change.level, change.duration).map_err(|err| RequestError::Callback(err.to_string()))?;

        self.metrics.increment_level_changes();
        Ok(StatusCode::NO_CONTENT.into_response())
    }

    fn record_failure(&self, err: &RequestError) {
        if err.is_client_error() {
            self.metrics.increment_level_rejections();
        } else {
            self.metrics.increment_level_failures();
            Logger::warn("LOG_LEVEL_REQUEST_FAILED", &[("error", &err.to_string())]);
        }
    }
}

/// Handler for [`LOG_LEVEL_PATH`]
pub fn log_level_handler(state: LogLevelState) -> MethodRouter {
    any(log_level).with_state(Arc::new(state))
}

async fn log_level(
    State(state): State<Arc<LogLevelState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let result = match method {
        Method::GET => state.get_level(),
        Method::PUT => state.put_level(&headers, uri.query(), &body),
        _ => Err(RequestError::MethodNotAllowed("Only GET and PUT are supported.")),
    };

    match result {
        Ok(response) => response,
        Err(err) => {
            state.record_failure(&err);
            let allow = matches!(err, RequestError::MethodNotAllowed(_));
            let mut response = err.into_response();
            if allow {
                response
                    .headers_mut()
                    .insert(ALLOW, HeaderValue::from_static("GET, PUT"));
            }
            response
        }
    }
}
