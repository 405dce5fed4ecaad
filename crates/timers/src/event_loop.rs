//! The event loop for one logical session.
//!
//! Registration and draining happen on the owning thread. Background
//! triggers only ever touch [`LoopShared`]: the state table, the ready queue
//! and the epoch. Callbacks stay in the owner-only task table, so they never
//! have to be `Send`.
//!
//! A trigger marks its task ready under the state lock, after checking the
//! epoch it was armed in. `reset` bumps the epoch under the same lock, so a
//! trigger either lands before the reset (and is cleared with the queue) or
//! observes the new epoch and discards itself.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use deferloop_core::ResultExt;
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::ids::IdAllocator;
use crate::pool::{TimerPool, TriggerHandle};
use crate::queue::ReadyQueue;
use crate::report::{CallbackFailure, FailureReporter, TracingReporter};
use crate::task::{Callback, Delay, TaskKind, TaskRecord, TaskState, TimerId};
use crate::Result;

/// A task that became due, tagged with the epoch it was armed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ReadyEntry {
    id: TimerId,
    epoch: u64,
}

/// The part of a loop that background triggers can reach.
#[derive(Debug, Default)]
struct LoopShared {
    epoch: AtomicU64,
    states: Mutex<HashMap<TimerId, TaskState>>,
    ready: ReadyQueue<ReadyEntry>,
}

impl LoopShared {
    fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Called on a pool thread when a trigger's delay has elapsed.
    fn fire(&self, id: TimerId, epoch: u64) {
        let mut states = self.states.lock();
        if self.epoch() != epoch {
            trace!(timer_id = %id, epoch, "Discarding trigger from a reset epoch");
            return;
        }
        match states.get_mut(&id) {
            Some(state) if *state == TaskState::Scheduled => {
                *state = TaskState::Ready;
                self.ready.push(ReadyEntry { id, epoch });
                trace!(timer_id = %id, "Timer ready");
            }
            _ => trace!(timer_id = %id, "Discarding trigger for inactive timer"),
        }
    }
}

/// Outcome of one [`EventLoop::process`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainSummary {
    /// Callbacks invoked, including failed ones.
    pub executed: usize,
    /// Callbacks that threw or panicked.
    pub failed: usize,
    /// Queue entries dropped because their task was cancelled or reset.
    pub skipped: usize,
}

impl DrainSummary {
    /// Check if the drain ran nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.executed == 0 && self.skipped == 0
    }
}

/// `setTimeout`/`setInterval`/`setImmediate` for one logical session.
///
/// All methods take `&self`, so a callback holding an `Rc` (or `Weak`) to
/// its loop can register and clear timers while it runs. The loop is not
/// `Sync`; it belongs to the thread that calls [`EventLoop::process`].
pub struct EventLoop<A = serde_json::Value> {
    pool: Arc<TimerPool>,
    shared: Arc<LoopShared>,
    ids: IdAllocator,
    tasks: RefCell<HashMap<TimerId, TaskRecord<A>>>,
    /// Kinds of the tasks whose callbacks are on the stack right now.
    running: RefCell<HashMap<TimerId, TaskKind>>,
    reporter: Box<dyn FailureReporter<A>>,
}

impl<A: fmt::Debug + 'static> EventLoop<A> {
    /// Create a loop on `pool` that logs callback failures via `tracing`.
    #[must_use]
    pub fn new(pool: Arc<TimerPool>) -> Self {
        Self::with_reporter(pool, TracingReporter)
    }

    /// Create a loop on the process-wide pool.
    ///
    /// # Errors
    ///
    /// Returns `PoolStartFailed` if the shared pool cannot be started.
    pub fn on_shared_pool() -> Result<Self> {
        Ok(Self::new(TimerPool::shared()?))
    }
}

impl<A: 'static> EventLoop<A> {
    /// Create a loop on `pool` with a custom failure reporter.
    pub fn with_reporter(
        pool: Arc<TimerPool>,
        reporter: impl FailureReporter<A> + 'static,
    ) -> Self {
        Self {
            pool,
            shared: Arc::new(LoopShared::default()),
            ids: IdAllocator::new(),
            tasks: RefCell::new(HashMap::new()),
            running: RefCell::new(HashMap::new()),
            reporter: Box::new(reporter),
        }
    }

    /// Run `callback(args)` once, after `delay`.
    ///
    /// Returns immediately; the callback never runs inside this call.
    ///
    /// # Errors
    ///
    /// Returns `SchedulingUnavailable` if the pool refuses the trigger and
    /// `IdSpaceExhausted` if no id is left.
    pub fn set_timeout(
        &self,
        callback: Callback<A>,
        args: Vec<A>,
        delay: Delay,
    ) -> Result<TimerId> {
        self.register(TaskKind::Timeout, callback, args, delay)
    }

    /// Run `callback(args)` every `period` until cleared or reset.
    ///
    /// The next period starts after the previous run returns, so runs of one
    /// interval never overlap.
    ///
    /// # Errors
    ///
    /// As [`EventLoop::set_timeout`].
    pub fn set_interval(
        &self,
        callback: Callback<A>,
        args: Vec<A>,
        period: Delay,
    ) -> Result<TimerId> {
        self.register(TaskKind::Interval, callback, args, period)
    }

    /// Run `callback(args)` on the next [`EventLoop::process`] call.
    ///
    /// Bypasses the pool. An immediate registered while a drain is running
    /// waits for the following drain.
    ///
    /// # Errors
    ///
    /// Returns `IdSpaceExhausted` if no id is left.
    pub fn set_immediate(&self, callback: Callback<A>, args: Vec<A>) -> Result<TimerId> {
        let id = self.ids.next_id()?;
        let epoch = self.shared.epoch();
        self.tasks.borrow_mut().insert(
            id,
            TaskRecord::new(id, TaskKind::Immediate, callback, args, Delay::ZERO),
        );
        {
            let mut states = self.shared.states.lock();
            states.insert(id, TaskState::Ready);
            self.shared.ready.push(ReadyEntry { id, epoch });
        }
        debug!(timer_id = %id, "Immediate queued");
        Ok(id)
    }

    /// Cancel a timeout. Unknown or finished ids are ignored.
    pub fn clear_timeout(&self, id: TimerId) {
        self.cancel(id);
    }

    /// Cancel an interval. Unknown or finished ids are ignored.
    ///
    /// Called from inside the interval's own callback, the current run
    /// finishes and no further run is armed.
    pub fn clear_interval(&self, id: TimerId) {
        self.cancel(id);
    }

    /// Cancel an immediate that has not been drained yet. Unknown or
    /// finished ids are ignored.
    pub fn clear_immediate(&self, id: TimerId) {
        self.cancel(id);
    }

    /// Cancel any task by id.
    ///
    /// Returns `true` if the cancel prevents a future run. An interval that
    /// is executing finishes its run and is then not re-armed. A one-shot
    /// task that is executing cannot be cancelled, so this returns `false`.
    ///
    /// Cancellation of the background trigger is best-effort: a trigger may
    /// already be firing. The task is removed from the state table first, so
    /// such a trigger finds nothing to mark ready, and a queue entry left
    /// behind is skipped at drain time.
    pub fn cancel(&self, id: TimerId) -> bool {
        let cancelled = {
            let mut states = self.shared.states.lock();
            match states.get(&id).copied() {
                Some(state) if state.is_cancellable() => {
                    states.remove(&id);
                    true
                }
                Some(TaskState::Executing) if self.is_running_interval(id) => {
                    states.insert(id, TaskState::Cancelled);
                    true
                }
                _ => false,
            }
        };

        if !cancelled {
            trace!(timer_id = %id, "Ignoring cancel for timer that cannot be cancelled");
            return false;
        }

        // Bind first so the table borrow ends before the record drops.
        let record = self.tasks.borrow_mut().remove(&id);
        if let Some(mut record) = record {
            record.cancel_trigger();
        }
        debug!(timer_id = %id, "Timer cancelled");
        true
    }

    /// Run every callback that was ready when the call started.
    ///
    /// Must only be called by the owning thread. Callbacks run one at a time
    /// in queue arrival order; a failing callback is reported and the drain
    /// continues. Timers that become due during the drain, and immediates
    /// registered by callbacks, run on the next call. Does not wait for
    /// timers that are not yet due.
    ///
    /// Once the pool has been shut down, tasks still waiting on a trigger
    /// can never become ready; they are retired here so the loop can go
    /// idle.
    pub fn process(&self) -> DrainSummary {
        if !self.pool.is_accepting() {
            self.retire_abandoned();
        }

        let batch = self.shared.ready.drain_all();
        let mut summary = DrainSummary::default();

        for entry in batch {
            if !self.begin_execution(entry) {
                summary.skipped = summary.skipped.saturating_add(1);
                continue;
            }

            let record = self.tasks.borrow_mut().remove(&entry.id);
            let Some(mut record) = record else {
                self.shared.states.lock().remove(&entry.id);
                summary.skipped = summary.skipped.saturating_add(1);
                continue;
            };

            trace!(timer_id = %entry.id, kind = %record.kind(), "Running timer callback");
            self.running.borrow_mut().insert(entry.id, record.kind());
            let outcome = record.invoke();
            self.running.borrow_mut().remove(&entry.id);
            summary.executed = summary.executed.saturating_add(1);

            if let Err(error) = &outcome {
                summary.failed = summary.failed.saturating_add(1);
                self.reporter.report(&CallbackFailure {
                    timer_id: record.id(),
                    kind: record.kind(),
                    descriptor: record.descriptor(),
                    args: record.args(),
                    error,
                });
            }

            self.finish_execution(record, entry.epoch);
        }

        if !summary.is_empty() {
            debug!(
                executed = summary.executed,
                failed = summary.failed,
                skipped = summary.skipped,
                "Drained ready timers"
            );
        }
        summary
    }

    /// Drop every task of this session.
    ///
    /// Cancels all armed triggers, empties the ready queue and the task
    /// tables, and moves to a new epoch. Triggers already mid-fire observe
    /// the new epoch and discard themselves, so nothing registered before
    /// the call can run after it returns. Ids keep counting up.
    pub fn reset(&self) {
        let (epoch, dropped_states, dropped_ready) = {
            let mut states = self.shared.states.lock();
            let epoch = self
                .shared
                .epoch
                .fetch_add(1, Ordering::AcqRel)
                .wrapping_add(1);
            let dropped_states = states.len();
            states.clear();
            let dropped_ready = self.shared.ready.clear();
            (epoch, dropped_states, dropped_ready)
        };

        let records: Vec<TaskRecord<A>> =
            self.tasks.borrow_mut().drain().map(|(_, r)| r).collect();
        for mut record in records {
            record.cancel_trigger();
        }

        info!(
            epoch,
            dropped_tasks = dropped_states,
            dropped_ready,
            "Event loop reset"
        );
    }

    /// Get the number of live tasks: scheduled, ready or executing.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.shared.states.lock().len()
    }

    /// Get the number of tasks waiting for the next drain.
    #[must_use]
    pub fn ready_count(&self) -> usize {
        self.shared.ready.len()
    }

    /// Check if no task is live.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.shared.states.lock().is_empty()
    }

    /// Get the state of a live task.
    #[must_use]
    pub fn state_of(&self, id: TimerId) -> Option<TaskState> {
        self.shared.states.lock().get(&id).copied()
    }

    /// Get the current epoch; bumped by every reset.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.shared.epoch()
    }

    /// Get the pool this loop arms triggers on.
    #[must_use]
    pub const fn pool(&self) -> &Arc<TimerPool> {
        &self.pool
    }

    fn register(
        &self,
        kind: TaskKind,
        callback: Callback<A>,
        args: Vec<A>,
        delay: Delay,
    ) -> Result<TimerId> {
        let id = self.ids.next_id()?;
        let epoch = self.shared.epoch();

        // The state must exist before the trigger can fire.
        self.shared.states.lock().insert(id, TaskState::Scheduled);
        let trigger = match self.arm(id, epoch, delay) {
            Ok(trigger) => trigger,
            Err(e) => {
                self.shared.states.lock().remove(&id);
                return Err(e);
            }
        };

        let mut record = TaskRecord::new(id, kind, callback, args, delay);
        record.set_trigger(trigger);
        self.tasks.borrow_mut().insert(id, record);

        debug!(timer_id = %id, %kind, delay_ms = delay.as_millis(), "Timer registered");
        Ok(id)
    }

    fn arm(&self, id: TimerId, epoch: u64, delay: Delay) -> Result<TriggerHandle> {
        let shared: Weak<LoopShared> = Arc::downgrade(&self.shared);
        self.pool.arm(delay, move || {
            if let Some(shared) = shared.upgrade() {
                shared.fire(id, epoch);
            }
        })
    }

    fn is_running_interval(&self, id: TimerId) -> bool {
        self.running
            .borrow()
            .get(&id)
            .is_some_and(|kind| kind.is_repeating())
    }

    /// Drop tasks whose trigger died with a shut-down pool.
    fn retire_abandoned(&self) {
        let abandoned: Vec<TimerId> = {
            let mut states = self.shared.states.lock();
            let abandoned: Vec<TimerId> = states
                .iter()
                .filter(|(_, state)| **state == TaskState::Scheduled)
                .map(|(id, _)| *id)
                .collect();
            for id in &abandoned {
                states.remove(id);
            }
            abandoned
        };
        if abandoned.is_empty() {
            return;
        }

        let records: Vec<TaskRecord<A>> = {
            let mut tasks = self.tasks.borrow_mut();
            abandoned.iter().filter_map(|id| tasks.remove(id)).collect()
        };
        drop(records);
        warn!(
            retired = abandoned.len(),
            "Timer pool shut down; retiring timers that can no longer fire"
        );
    }

    /// Move a drained entry from `Ready` to `Executing`.
    fn begin_execution(&self, entry: ReadyEntry) -> bool {
        let mut states = self.shared.states.lock();
        if self.shared.epoch() != entry.epoch {
            return false;
        }
        match states.get_mut(&entry.id) {
            Some(state) if *state == TaskState::Ready => {
                *state = TaskState::Executing;
                true
            }
            _ => false,
        }
    }

    /// Complete a run: re-arm a live interval, otherwise retire the task.
    fn finish_execution(&self, mut record: TaskRecord<A>, epoch: u64) {
        let id = record.id();
        let rearm = {
            let mut states = self.shared.states.lock();
            if self.shared.epoch() != epoch {
                // Reset from inside the callback; the table is already clear.
                false
            } else {
                match states.get_mut(&id) {
                    Some(state)
                        if *state == TaskState::Executing && record.kind().is_repeating() =>
                    {
                        *state = TaskState::Scheduled;
                        true
                    }
                    _ => {
                        states.remove(&id);
                        false
                    }
                }
            }
        };

        if !rearm {
            trace!(timer_id = %id, "Timer completed");
            return;
        }

        let period = record.delay();
        let armed = self.arm(id, epoch, period).inspect_error(|e| {
            warn!(timer_id = %id, error = %e, "Failed to re-arm interval; dropping it");
        });
        match armed {
            Ok(trigger) => {
                record.set_trigger(trigger);
                self.tasks.borrow_mut().insert(id, record);
                trace!(timer_id = %id, period_ms = period.as_millis(), "Interval re-armed");
            }
            Err(_) => {
                self.shared.states.lock().remove(&id);
            }
        }
    }
}

impl<A> Drop for EventLoop<A> {
    fn drop(&mut self) {
        for record in self.tasks.get_mut().values_mut() {
            record.cancel_trigger();
        }
    }
}

impl<A> fmt::Debug for EventLoop<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("epoch", &self.shared.epoch())
            .field("active", &self.shared.states.lock().len())
            .field("ready", &self.shared.ready.len())
            .finish_non_exhaustive()
    }
}
