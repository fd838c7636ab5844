//! Construction options
//!
//! Everything the embedding process injects into a control server. Every
//! field is optional; an absent log-level callback makes the matching
//! request answer 501 rather than fail.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::MethodRouter;

use super::profiling::ProfilingHandlers;
use crate::observability::{Level, LevelController};

/// Error type a level setter may return; its text reaches the client verbatim
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// Reads the current level. Must be cheap and non-blocking.
pub type LevelGetter = Arc<dyn Fn() -> Level + Send + Sync>;

/// Applies a level, optionally reverting after the duration (zero = permanent)
pub type LevelSetter = Arc<dyn Fn(Level, Duration) -> Result<(), CallbackError> + Send + Sync>;

/// Options applied when a control server is constructed
#[derive(Default)]
pub struct ServerOptions {
    pub level_getter: Option<LevelGetter>,
    pub level_setter: Option<LevelSetter>,
    /// Replaces the built-in metrics exposition handler
    pub metrics: Option<MethodRouter>,
    /// Replaces the built-in profiling handlers
    pub profiling: Option<ProfilingHandlers>,
}

impl ServerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level_getter<F>(mut self, getter: F) -> Self
    where
        F: Fn() -> Level + Send + Sync + 'static,
    {
        self.level_getter = Some(Arc::new(getter));
        self
    }

    pub fn with_level_setter<F, E>(mut self, setter: F) -> Self
    where
        F: Fn(Level, Duration) -> Result<(), E> + Send + Sync + 'static,
        E: Into<CallbackError>,
    {
        self.level_setter = Some(Arc::new(
            move |level: Level, duration: Duration| -> Result<(), CallbackError> {
                setter(level, duration).map_err(Into::into)
            },
        ));
        self
    }

    /// Install both callbacks from one controller
    pub fn with_level_controller(self, controller: &LevelController) -> Self {
        self.with_level_getter(controller.getter())
            .with_level_setter(controller.setter())
    }

    pub fn with_metrics_handler(mut self, handler: MethodRouter) -> Self {
        self.metrics = Some(handler);
        self
    }

    pub fn with_profiling(mut self, handlers: ProfilingHandlers) -> Self {
        self.profiling = Some(handlers);
        self
    }
}

impl fmt::Debug for ServerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerOptions")
            .field("level_getter", &self.level_getter.is_some())
            .field("level_setter", &self.level_setter.is_some())
            .field("metrics", &self.metrics.is_some())
            .field("profiling", &self.profiling.is_some())
            .finish()
    }
}
