//! Observability subsystem
//!
//! - Structured JSON logging gated by a runtime level
//! - Level control with timed auto-revert
//! - Counter metrics in Prometheus text format
//!
//! # Usage
//!
//! ```ignore
//! use ctrlserver::observability::{Level, LevelController, Logger};
//!
//! Logger::info("STARTUP", &[("addr", "0.0.0.0:8080")]);
//!
//! let controller = LevelController::for_logger();
//! controller.set_level(Level::Debug, Duration::from_secs(30))?;
//! ```

mod level;
mod logger;
mod metrics;

pub use level::{LevelChangeError, LevelController};
pub use logger::{AtomicLevel, Level, Logger, ParseLevelError};
pub use metrics::{MetricsRegistry, MetricsSnapshot, EXPOSITION_CONTENT_TYPE};
