//! Deferred callbacks for single-threaded script hosts.
//!
//! This crate gives a host with no event loop of its own the
//! `setTimeout`/`setInterval`/`setImmediate` family, while the actual
//! time-keeping runs on a reusable background pool.
//!
//! # Architecture
//!
//! The timer system uses:
//! 1. A shared worker pool that waits out delays and marks tasks ready
//! 2. A per-loop ready queue fed by the pool
//! 3. A dispatcher (`EventLoop::process`) that runs ready callbacks on the
//!    owning thread, one at a time
//! 4. An epoch counter so `EventLoop::reset` can recycle the owning thread
//!    without stale callbacks leaking into the next session
//!
//! # Key Types
//!
//! - `EventLoop`: registration, draining and reset for one logical session
//! - `TimerPool`: the process-wide background scheduler
//! - `TimerId`: the handle returned to script code
//! - `FailureReporter`: where callback failures go

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![deny(clippy::expect_used)]

pub mod config;
pub mod event_loop;
pub mod ids;
pub mod pool;
pub mod queue;
pub mod report;
pub mod task;

pub use config::PoolConfig;
pub use deferloop_core::{Error, Result};
pub use event_loop::{DrainSummary, EventLoop};
pub use ids::IdAllocator;
pub use pool::{TimerPool, TriggerHandle};
pub use queue::ReadyQueue;
pub use report::{
    CallbackError, CallbackFailure, FailureReporter, RecordingReporter, ReportedFailure,
    TracingReporter,
};
pub use task::{Callback, Delay, TaskKind, TaskRecord, TaskState, TimerId};
