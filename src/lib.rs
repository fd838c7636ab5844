//! ctrlserver - an embeddable control-plane HTTP server
//!
//! Exposes runtime log level control, metrics and profiling endpoints next to
//! an application's main service.

pub mod cli;
pub mod http_server;
pub mod observability;
