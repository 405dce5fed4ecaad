#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! # deferloop
//!
//! Deferred callbacks for embedded script engines that have no event loop
//! of their own.
//!
//! This library re-exports the workspace crates for convenience.

pub use deferloop_core;
pub use deferloop_timers;

pub mod telemetry;

pub use deferloop_core::{Error, Result, ResultExt};
pub use deferloop_timers::{
    Callback, CallbackError, Delay, DrainSummary, EventLoop, FailureReporter, PoolConfig,
    RecordingReporter, TaskKind, TaskState, TimerId, TimerPool, TracingReporter,
};

/// The argument type script hosts pass to callbacks by default.
pub type ScriptValue = serde_json::Value;

/// An event loop whose callbacks receive script values.
pub type ScriptEventLoop = EventLoop<ScriptValue>;
