//! Runtime level control with timed auto-revert
//!
//! `LevelController` is the ready-made get/set pair an embedding process can
//! hand to the control server. Overlapping timed changes follow last write
//! wins: each change bumps a generation counter, and a pending revert only
//! fires if no newer change has happened since it was scheduled. Reverts
//! restore the *base* level, i.e. the most recent permanent setting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::runtime::Handle;

use super::logger::{AtomicLevel, Level, Logger};

/// Failure to apply a level change
#[derive(Debug, Error)]
pub enum LevelChangeError {
    /// Timed changes need a tokio runtime to schedule the revert
    #[error("cannot schedule level revert: no async runtime available")]
    NoRuntime,
}

#[derive(Debug)]
struct ControllerInner {
    current: Arc<AtomicLevel>,
    /// Most recent permanent level; guarded so change + generation bump are atomic
    base: Mutex<Level>,
    generation: AtomicU64,
}

/// Shared handle for reading and changing a runtime log level
#[derive(Debug, Clone)]
pub struct LevelController {
    inner: Arc<ControllerInner>,
}

impl LevelController {
    /// Controller over a private threshold starting at `initial`
    pub fn new(initial: Level) -> Self {
        Self::with_threshold(Arc::new(AtomicLevel::new(initial)))
    }

    /// Controller over the process-wide [`Logger`] threshold
    pub fn for_logger() -> Self {
        Self::with_threshold(Logger::threshold())
    }

    /// Controller over an existing threshold
    pub fn with_threshold(current: Arc<AtomicLevel>) -> Self {
        let base = current.load();
        Self {
            inner: Arc::new(ControllerInner {
                current,
                base: Mutex::new(base),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Level currently in effect
    pub fn level(&self) -> Level {
        self.inner.current.load()
    }

    /// Level a pending revert would restore
    pub fn base_level(&self) -> Level {
        *self.inner.base.lock()
    }

    /// Change the level.
    ///
    /// A zero `duration` makes the change permanent. Otherwise the level
    /// reverts to the base level once `duration` has elapsed, unless another
    /// change supersedes it first.
    pub fn set_level(&self, level: Level, duration: Duration) -> Result<(), LevelChangeError> {
        if duration.is_zero() {
            let mut base = self.inner.base.lock();
            self.inner.generation.fetch_add(1, Ordering::AcqRel);
            *base = level;
            let previous = self.inner.current.swap(level);
            drop(base);

            Logger::info(
                "LOG_LEVEL_CHANGED",
                &[("from", previous.as_str()), ("to", level.as_str())],
            );
            return Ok(());
        }

        let runtime = Handle::try_current().map_err(|_| LevelChangeError::NoRuntime)?;

        let base = self.inner.base.lock();
        let generation = self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let previous = self.inner.current.swap(level);
        drop(base);

        let revert_after = humantime::format_duration(duration).to_string();
        Logger::info(
            "LOG_LEVEL_CHANGED",
            &[
                ("from", previous.as_str()),
                ("revert_after", &revert_after),
                ("to", level.as_str()),
            ],
        );

        let inner = Arc::clone(&self.inner);
        runtime.spawn(async move {
            tokio::time::sleep(duration).await;
            inner.revert(generation);
        });
        Ok(())
    }

    /// Getter suitable for [`crate::http_server::ServerOptions`]
    pub fn getter(&self) -> impl Fn() -> Level + Send + Sync + 'static {
        let controller = self.clone();
        move || controller.level()
    }

    /// Setter suitable for [`crate::http_server::ServerOptions`]
    pub fn setter(&self) -> impl Fn(Level, Duration) -> Result<(), LevelChangeError> + Send + Sync + 'static {
        let controller = self.clone();
        move |level, duration| controller.set_level(level, duration)
    }
}

impl ControllerInner {
    fn revert(&self, generation: u64) {
        let base = self.base.lock();
        if self.generation.load(Ordering::Acquire) != generation {
            return;
        }
        let previous = self.current.swap(*base);
        let restored = *base;
        drop(base);

        Logger::info(
            "LOG_LEVEL_REVERTED",
            &[("from", previous.as_str()), ("to", restored.as_str())],
        );
    }
}
