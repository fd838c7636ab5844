//! Metrics registry for the control server
//!
//! - Counters only, monotonic
//! - Reset only on process start
//! - Rendered in the Prometheus text exposition format

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

/// Content type of the text exposition format
pub const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Control-plane counters
///
/// All counters use Relaxed ordering; scrapes tolerate slightly stale values.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// Successful level reads
    level_reads: AtomicU64,
    /// Applied level changes
    level_changes: AtomicU64,
    /// Level changes rejected for bad input
    level_rejections: AtomicU64,
    /// Level requests that failed server-side (callback error or missing callback)
    level_failures: AtomicU64,
    /// Requests for unknown paths
    unknown_paths: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_level_reads(&self) {
        self.level_reads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_level_changes(&self) {
        self.level_changes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_level_rejections(&self) {
        self.level_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_level_failures(&self) {
        self.level_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_unknown_paths(&self) {
        self.unknown_paths.fetch_add(1, Ordering::Relaxed);
    }

    /// Get all metrics as a snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            level_reads: self.level_reads.load(Ordering::Relaxed),
            level_changes: self.level_changes.load(Ordering::Relaxed),
            level_rejections: self.level_rejections.load(Ordering::Relaxed),
            level_failures: self.level_failures.load(Ordering::Relaxed),
            unknown_paths: self.unknown_paths.load(Ordering::Relaxed),
        }
    }

    /// Render every counter in the text exposition format
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        let counters = [
            (
                "ctrlserver_log_level_reads_total",
                "Log level reads served.",
                snapshot.level_reads,
            ),
            (
                "ctrlserver_log_level_changes_total",
                "Log level changes applied.",
                snapshot.level_changes,
            ),
            (
                "ctrlserver_log_level_rejections_total",
                "Log level changes rejected as malformed.",
                snapshot.level_rejections,
            ),
            (
                "ctrlserver_log_level_failures_total",
                "Log level requests that failed server-side.",
                snapshot.level_failures,
            ),
            (
                "ctrlserver_unknown_path_requests_total",
                "Requests for paths with no handler.",
                snapshot.unknown_paths,
            ),
        ];

        let mut output = String::with_capacity(1024);
        for (name, help, value) in counters {
            // Writing to a String cannot fail
            let _ = writeln!(output, "# HELP {name} {help}");
            let _ = writeln!(output, "# TYPE {name} counter");
            let _ = writeln!(output, "{name} {value}");
        }
        output
    }
}

/// A point-in-time snapshot of all metrics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub level_reads: u64,
    pub level_changes: u64,
    pub level_rejections: u64,
    pub level_failures: u64,
    pub unknown_paths: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_registry_has_zero_values() {
        let registry = MetricsRegistry::new();
        assert_eq!(registry.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_increment_counters() {
        let registry = MetricsRegistry::new();

        registry.increment_level_reads();
        registry.increment_level_reads();
        registry.increment_level_changes();
        registry.increment_level_rejections();
        registry.increment_level_failures();
        registry.increment_unknown_paths();

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.level_reads, 2);
        assert_eq!(snapshot.level_changes, 1);
        assert_eq!(snapshot.level_rejections, 1);
        assert_eq!(snapshot.level_failures, 1);
        assert_eq!(snapshot.unknown_paths, 1);
    }

    #[test]
    fn test_prometheus_output() {
        let registry = MetricsRegistry::new();
        registry.increment_level_changes();

        let output = registry.to_prometheus();
        assert!(output.contains("# TYPE ctrlserver_log_level_changes_total counter"));
        assert!(output.contains("ctrlserver_log_level_changes_total 1\n"));
        assert!(output.contains("ctrlserver_log_level_reads_total 0\n"));
        assert!(output.ends_with('\n'));
    }
}
