//! Profiling endpoints
//!
//! The five profiling paths are a fixed compatibility surface. What answers
//! them is up to the embedding process: any handler may be swapped out
//! through [`ProfilingHandlers`]. The built-in set covers what the process
//! can report about itself without a sampling backend:
//!
//! - index: plain-text list of the profiling paths
//! - cmdline: process arguments, NUL-separated
//! - profile / trace: validate `seconds`, then 501 (no sampler built in)
//! - symbol: `num_symbols: 0`, telling clients no symbol table is served

use std::collections::HashMap;

use axum::extract::Query;
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, MethodRouter};

use super::errors::RequestError;

pub const PPROF_INDEX_PATH: &str = "/debug/pprof/";
pub const PPROF_CMDLINE_PATH: &str = "/debug/pprof/cmdline";
pub const PPROF_PROFILE_PATH: &str = "/debug/pprof/profile";
pub const PPROF_SYMBOL_PATH: &str = "/debug/pprof/symbol";
pub const PPROF_TRACE_PATH: &str = "/debug/pprof/trace";

/// Capture window used when `seconds` is absent
pub const DEFAULT_CAPTURE_SECONDS: u64 = 30;

const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Handlers mounted on the profiling paths
#[derive(Clone)]
pub struct ProfilingHandlers {
    pub index: MethodRouter,
    pub cmdline: MethodRouter,
    pub profile: MethodRouter,
    pub symbol: MethodRouter,
    pub trace: MethodRouter,
}

impl ProfilingHandlers {
    /// Path/handler pairs in registration order
    pub fn into_routes(self) -> [(&'static str, MethodRouter); 5] {
        [
            (PPROF_INDEX_PATH, self.index),
            (PPROF_CMDLINE_PATH, self.cmdline),
            (PPROF_PROFILE_PATH, self.profile),
            (PPROF_SYMBOL_PATH, self.symbol),
            (PPROF_TRACE_PATH, self.trace),
        ]
    }
}

impl Default for ProfilingHandlers {
    fn default() -> Self {
        Self {
            index: get(index),
            cmdline: get(cmdline),
            profile: get(profile),
            symbol: get(symbol).post(symbol),
            trace: get(trace),
        }
    }
}

async fn index() -> Response {
    let body = format!(
        "profiling endpoints:\n{PPROF_CMDLINE_PATH}\n{PPROF_PROFILE_PATH}?seconds=N\n{PPROF_SYMBOL_PATH}\n{PPROF_TRACE_PATH}?seconds=N\n"
    );
    ([(CONTENT_TYPE, TEXT_CONTENT_TYPE)], body).into_response()
}

async fn cmdline() -> Response {
    let body = std::env::args().collect::<Vec<_>>().join("\0");
    ([(CONTENT_TYPE, TEXT_CONTENT_TYPE)], body).into_response()
}

async fn profile(Query(params): Query<HashMap<String, String>>) -> Result<Response, RequestError> {
    let seconds = capture_seconds(&params)?;
    Err(RequestError::BackendUnavailable(format!(
        "CPU profiling backend is not configured (requested {seconds}s)"
    )))
}

async fn trace(Query(params): Query<HashMap<String, String>>) -> Result<Response, RequestError> {
    let seconds = capture_seconds(&params)?;
    Err(RequestError::BackendUnavailable(format!(
        "execution tracing backend is not configured (requested {seconds}s)"
    )))
}

async fn symbol() -> Response {
    (
        StatusCode::OK,
        [(CONTENT_TYPE, TEXT_CONTENT_TYPE)],
        "num_symbols: 0\n",
    )
        .into_response()
}

fn capture_seconds(params: &HashMap<String, String>) -> Result<u64, RequestError> {
    match params.get("seconds") {
        None => Ok(DEFAULT_CAPTURE_SECONDS),
        Some(raw) => match raw.parse::<u64>() {
            Ok(seconds) if seconds > 0 => Ok(seconds),
            _ => Err(RequestError::InvalidQuery {
                name: "seconds".to_string(),
                value: raw.clone(),
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_capture_seconds_default() {
        assert_eq!(capture_seconds(&params(&[])).unwrap(), DEFAULT_CAPTURE_SECONDS);
    }

    #[test]
    fn test_capture_seconds_explicit() {
        assert_eq!(capture_seconds(&params(&[("seconds", "5")])).unwrap(), 5);
    }

    #[test]
    fn test_capture_seconds_rejects_bad_values() {
        for raw in ["0", "-3", "soon"] {
            let err = capture_seconds(&params(&[("seconds", raw)])).unwrap_err();
            assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn test_routes_cover_every_path() {
        let paths: Vec<_> = ProfilingHandlers::default()
            .into_routes()
            .into_iter()
            .map(|(path, _)| path)
            .collect();
        assert_eq!(
            paths,
            vec![
                PPROF_INDEX_PATH,
                PPROF_CMDLINE_PATH,
                PPROF_PROFILE_PATH,
                PPROF_SYMBOL_PATH,
                PPROF_TRACE_PATH,
            ]
        );
    }
}
