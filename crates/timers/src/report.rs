//! Reporting of callback failures.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use thiserror::Error;
use tracing::error;

use crate::task::{TaskKind, TimerId};

/// A failure raised by a callback during `EventLoop::process`.
///
/// Reported, never propagated: the drain continues with the next task.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallbackError {
    /// The callback returned an error (a script exception).
    #[error("callback threw: {message}")]
    Thrown { message: String },
    /// The callback panicked.
    #[error("callback panicked: {message}")]
    Panicked { message: String },
}

impl CallbackError {
    /// Create a thrown error.
    pub fn thrown(message: impl Into<String>) -> Self {
        Self::Thrown {
            message: message.into(),
        }
    }

    pub(crate) fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self::Panicked { message }
    }
}

/// Everything known about one failed callback run.
#[derive(Debug)]
pub struct CallbackFailure<'a, A> {
    /// Timer that ran.
    pub timer_id: TimerId,
    /// Kind of the task.
    pub kind: TaskKind,
    /// Descriptor of the callback.
    pub descriptor: &'a str,
    /// Arguments the callback was invoked with.
    pub args: &'a [A],
    /// What went wrong.
    pub error: &'a CallbackError,
}

/// Receives callback failures.
///
/// Implementations must not panic; they run inside the drain.
pub trait FailureReporter<A> {
    /// Report one failure.
    fn report(&self, failure: &CallbackFailure<'_, A>);
}

impl<A, R: FailureReporter<A> + ?Sized> FailureReporter<A> for Rc<R> {
    fn report(&self, failure: &CallbackFailure<'_, A>) {
        (**self).report(failure);
    }
}

impl<A, R: FailureReporter<A> + ?Sized> FailureReporter<A> for Arc<R> {
    fn report(&self, failure: &CallbackFailure<'_, A>) {
        (**self).report(failure);
    }
}

/// Logs failures through `tracing` at error level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl<A: fmt::Debug> FailureReporter<A> for TracingReporter {
    fn report(&self, failure: &CallbackFailure<'_, A>) {
        error!(
            timer_id = %failure.timer_id,
            kind = %failure.kind,
            callback = failure.descriptor,
            args = ?failure.args,
            error = %failure.error,
            "Timer callback failed"
        );
    }
}

/// An owned copy of a reported failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportedFailure {
    /// Timer that ran.
    pub timer_id: TimerId,
    /// Kind of the task.
    pub kind: TaskKind,
    /// Descriptor of the callback.
    pub descriptor: String,
    /// Debug rendering of each argument.
    pub args: Vec<String>,
    /// What went wrong.
    pub error: CallbackError,
}

/// Keeps every reported failure in memory, for hosts that surface errors
/// after a drain and for tests.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    failures: RefCell<Vec<ReportedFailure>>,
}

impl RecordingReporter {
    /// Create an empty reporter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a copy of the failures reported so far.
    #[must_use]
    pub fn failures(&self) -> Vec<ReportedFailure> {
        self.failures.borrow().clone()
    }

    /// Take the failures reported so far, leaving none behind.
    pub fn take(&self) -> Vec<ReportedFailure> {
        self.failures.take()
    }

    /// Get the number of failures reported so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.failures.borrow().len()
    }

    /// Check if nothing has been reported.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.failures.borrow().is_empty()
    }
}

impl<A: fmt::Debug> FailureReporter<A> for RecordingReporter {
    fn report(&self, failure: &CallbackFailure<'_, A>) {
        self.failures.borrow_mut().push(ReportedFailure {
            timer_id: failure.timer_id,
            kind: failure.kind,
            descriptor: failure.descriptor.to_string(),
            args: failure.args.iter().map(|arg| format!("{arg:?}")).collect(),
            error: failure.error.clone(),
        });
    }
}
