//! Background scheduler: a reusable worker pool that waits out delays.
//!
//! Triggers carry no callback, only a closure that marks a task ready, so
//! one pool can serve any number of event loops on any number of threads.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tokio::runtime::{Builder, Runtime};
use tokio::task::AbortHandle;
use tracing::{debug, info};

use crate::config::PoolConfig;
use crate::task::Delay;
use crate::{Error, Result};

static SHARED_POOL: OnceLock<Arc<TimerPool>> = OnceLock::new();

/// Cancels an armed trigger that has not fired yet.
#[derive(Debug)]
pub struct TriggerHandle {
    abort: AbortHandle,
}

impl TriggerHandle {
    /// Best-effort cancel. No effect once the trigger has fired.
    pub fn cancel(&self) {
        self.abort.abort();
    }
}

/// Releases a pending-trigger slot when the trigger fires or is aborted.
struct PendingSlot(Arc<AtomicUsize>);

impl Drop for PendingSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Process-wide pool of timer threads.
pub struct TimerPool {
    config: PoolConfig,
    runtime: Mutex<Option<Runtime>>,
    accepting: AtomicBool,
    pending: Arc<AtomicUsize>,
}

impl TimerPool {
    /// Build a dedicated pool.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the config fails validation and
    /// `PoolStartFailed` if the worker threads cannot be started.
    pub fn new(config: PoolConfig) -> Result<Arc<Self>> {
        config.validate()?;

        let runtime = Builder::new_multi_thread()
            .worker_threads(config.worker_threads)
            .thread_name(config.thread_name.clone())
            .enable_time()
            .build()
            .map_err(|e| Error::pool_start_failed(e.to_string()))?;

        info!(
            worker_threads = config.worker_threads,
            max_pending_triggers = config.max_pending_triggers,
            "Timer pool started"
        );

        Ok(Arc::new(Self {
            config,
            runtime: Mutex::new(Some(runtime)),
            accepting: AtomicBool::new(true),
            pending: Arc::new(AtomicUsize::new(0)),
        }))
    }

    /// Get the process-wide pool, building it from `PoolConfig::default()`
    /// on first use.
    ///
    /// # Errors
    ///
    /// Returns `PoolStartFailed` if the first build fails; a later call
    /// retries.
    pub fn shared() -> Result<Arc<Self>> {
        if let Some(pool) = SHARED_POOL.get() {
            return Ok(Arc::clone(pool));
        }
        let pool = Self::new(PoolConfig::default())?;
        // A racing caller may have won; its pool is the shared one.
        Ok(Arc::clone(SHARED_POOL.get_or_init(|| pool)))
    }

    /// Arm a trigger that runs `on_fire` on a worker thread once `delay`
    /// has elapsed.
    ///
    /// A zero delay still fires on a worker, never on the calling thread.
    /// A trigger armed before [`TimerPool::shutdown`] is abandoned by it and
    /// never fires.
    ///
    /// # Errors
    ///
    /// Returns `SchedulingUnavailable` if the pool has been shut down or
    /// already holds `max_pending_triggers` armed triggers.
    pub fn arm<F>(&self, delay: Delay, on_fire: F) -> Result<TriggerHandle>
    where
        F: FnOnce() + Send + 'static,
    {
        // Held until the spawn completes so shutdown cannot interleave.
        let guard = self.runtime.lock();
        let Some(runtime) = guard.as_ref().filter(|_| self.is_accepting()) else {
            return Err(Error::scheduling_unavailable("timer pool has been shut down"));
        };

        let max = self.config.max_pending_triggers;
        self.pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |pending| {
                (pending < max).then(|| pending.saturating_add(1))
            })
            .map_err(|_| {
                Error::scheduling_unavailable(format!("{max} timer triggers already pending"))
            })?;
        let slot = PendingSlot(Arc::clone(&self.pending));

        let duration = delay.as_duration();
        let join = runtime.spawn(async move {
            let _slot = slot;
            if !duration.is_zero() {
                tokio::time::sleep(duration).await;
            }
            on_fire();
        });

        debug!(delay_ms = delay.as_millis(), "Trigger armed");

        Ok(TriggerHandle {
            abort: join.abort_handle(),
        })
    }

    /// Stop accepting triggers and abandon the ones still armed.
    ///
    /// Every later `arm` fails with `SchedulingUnavailable`.
    pub fn shutdown(&self) {
        if !self.accepting.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(runtime) = self.runtime.lock().take() {
            runtime.shutdown_background();
        }
        info!("Timer pool shut down");
    }

    /// Check if the pool still accepts triggers.
    #[must_use]
    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    /// Get the number of armed triggers that have not fired.
    #[must_use]
    pub fn pending_triggers(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Get the configuration the pool was built with.
    #[must_use]
    pub const fn config(&self) -> &PoolConfig {
        &self.config
    }
}

impl Drop for TimerPool {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.get_mut().take() {
            runtime.shutdown_background();
        }
    }
}

impl std::fmt::Debug for TimerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerPool")
            .field("config", &self.config)
            .field("accepting", &self.is_accepting())
            .field("pending_triggers", &self.pending_triggers())
            .finish_non_exhaustive()
    }
}
