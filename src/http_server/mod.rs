//! # Control Plane HTTP Server
//!
//! Operational endpoints an application embeds next to its real service:
//!
//! - `/log/level` - read or change the runtime log level
//! - `/metrics` - counter exposition (replaceable)
//! - `/debug/pprof/*` - profiling endpoints (replaceable)
//!
//! Extra paths can be registered before serving starts.

mod buffer;
mod config;
mod envelope;
mod errors;
mod log_level;
mod options;
mod profiling;
mod server;

pub use buffer::{BufferPool, PooledBuffer};
pub use config::{ControlServerConfig, DEFAULT_CONTROL_PORT};
pub use envelope::{
    json_response, no_cache_headers, status_response, Status, JSON_CONTENT_TYPE,
    MARSHAL_FAILURE_BODY,
};
pub use errors::{ControlError, ControlResult, RequestError};
pub use log_level::{LevelChange, LevelChangeRequest, LevelResponse, LOG_LEVEL_PATH};
pub use options::{CallbackError, LevelGetter, LevelSetter, ServerOptions};
pub use profiling::{
    ProfilingHandlers, DEFAULT_CAPTURE_SECONDS, PPROF_CMDLINE_PATH, PPROF_INDEX_PATH,
    PPROF_PROFILE_PATH, PPROF_SYMBOL_PATH, PPROF_TRACE_PATH,
};
pub use server::{metrics_handler, ControlServer, ServerState, METRICS_PATH};
