//! Task records: one scheduled unit of deferred work.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pool::TriggerHandle;
use crate::report::CallbackError;
use crate::{Error, Result};

/// Unique identifier for a timer, as handed back to script code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimerId(u64);

impl TimerId {
    /// Wrap a raw id, e.g. one passed back by a script to `clearTimeout`.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw numeric id.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for TimerId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl From<TimerId> for u64 {
    fn from(id: TimerId) -> Self {
        id.0
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which registration call created a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// One-shot after a delay.
    Timeout,
    /// Repeats every period until cancelled or reset.
    Interval,
    /// One-shot on the next drain, no delay.
    Immediate,
}

impl TaskKind {
    /// Check if the task is re-armed after each run.
    #[must_use]
    pub const fn is_repeating(self) -> bool {
        matches!(self, Self::Interval)
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::Interval => write!(f, "interval"),
            Self::Immediate => write!(f, "immediate"),
        }
    }
}

/// Lifecycle of a task.
///
/// `Scheduled -> Ready -> Executing`, with `Cancelled` reachable from
/// `Scheduled`, `Ready` and (for intervals) `Executing`. An interval goes
/// back to `Scheduled` after each run; any other task that finishes leaves
/// the loop, so `EventLoop::state_of` returns `None` for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Waiting on a background trigger.
    Scheduled,
    /// In the ready queue, waiting for the next drain.
    Ready,
    /// Callback is running on the owning thread.
    Executing,
    /// Cancelled by a `clear_*` call.
    Cancelled,
}

impl TaskState {
    /// Check if cancelling now still prevents the next run.
    #[must_use]
    pub const fn is_cancellable(self) -> bool {
        matches!(self, Self::Scheduled | Self::Ready)
    }
}

/// A non-negative delay or period in milliseconds.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Delay(u64);

impl Delay {
    /// Fire on the next background tick.
    pub const ZERO: Self = Self(0);

    /// Create a delay from whole milliseconds.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Create a delay from a host's floating-point milliseconds.
    ///
    /// Fractions are truncated and values past `u64::MAX` saturate.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidDelay` for NaN or negative values.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn from_millis_f64(millis: f64) -> Result<Self> {
        if millis.is_nan() || millis < 0.0 {
            return Err(Error::invalid_delay(millis));
        }
        // `as` saturates for out-of-range floats, including +inf.
        Ok(Self(millis.trunc() as u64))
    }

    /// Get the delay in milliseconds.
    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// Get the delay as a `Duration`.
    #[must_use]
    pub const fn as_duration(self) -> Duration {
        Duration::from_millis(self.0)
    }

    /// Check if the delay is zero.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl From<Duration> for Delay {
    fn from(duration: Duration) -> Self {
        Self(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }
}

impl fmt::Display for Delay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Boxed callback body; receives the arguments captured at registration.
pub type CallbackFn<A> = Box<dyn FnMut(&[A]) -> std::result::Result<(), CallbackError>>;

/// An invocable value supplied by the host.
///
/// The loop never inspects the function; it only calls it and, on failure,
/// hands the descriptor to the reporter.
pub struct Callback<A> {
    descriptor: String,
    func: CallbackFn<A>,
}

impl<A> Callback<A> {
    /// Wrap a host function.
    ///
    /// `descriptor` is what failure reports show for this callback, typically
    /// the host's string form of the function.
    pub fn new<F>(descriptor: impl Into<String>, func: F) -> Self
    where
        F: FnMut(&[A]) -> std::result::Result<(), CallbackError> + 'static,
    {
        Self {
            descriptor: descriptor.into(),
            func: Box::new(func),
        }
    }

    /// Get the descriptor.
    #[must_use]
    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    /// Invoke on the calling thread. Panics are caught and returned as
    /// `CallbackError::Panicked`.
    pub(crate) fn invoke(&mut self, args: &[A]) -> std::result::Result<(), CallbackError> {
        let func = &mut self.func;
        match catch_unwind(AssertUnwindSafe(|| func(args))) {
            Ok(outcome) => outcome,
            Err(payload) => Err(CallbackError::from_panic(payload.as_ref())),
        }
    }
}

impl<A> fmt::Debug for Callback<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// One registered task, owned by its event loop.
///
/// The lifecycle state is kept by the loop next to the ready queue, where
/// background triggers can read it without touching the callback.
#[derive(Debug)]
pub struct TaskRecord<A> {
    id: TimerId,
    kind: TaskKind,
    callback: Callback<A>,
    args: Vec<A>,
    delay: Delay,
    trigger: Option<TriggerHandle>,
}

impl<A> TaskRecord<A> {
    /// Create a record. `delay` is the period for intervals and zero for
    /// immediates.
    #[must_use]
    pub fn new(
        id: TimerId,
        kind: TaskKind,
        callback: Callback<A>,
        args: Vec<A>,
        delay: Delay,
    ) -> Self {
        Self {
            id,
            kind,
            callback,
            args,
            delay,
            trigger: None,
        }
    }

    /// Get the timer ID.
    #[must_use]
    pub const fn id(&self) -> TimerId {
        self.id
    }

    /// Get the task kind.
    #[must_use]
    pub const fn kind(&self) -> TaskKind {
        self.kind
    }

    /// Get the delay, or the period for intervals.
    #[must_use]
    pub const fn delay(&self) -> Delay {
        self.delay
    }

    /// Get the callback descriptor.
    #[must_use]
    pub fn descriptor(&self) -> &str {
        self.callback.descriptor()
    }

    /// Get the captured arguments.
    #[must_use]
    pub fn args(&self) -> &[A] {
        &self.args
    }

    /// Attach the trigger armed for the next run.
    pub(crate) fn set_trigger(&mut self, trigger: TriggerHandle) {
        self.trigger = Some(trigger);
    }

    /// Cancel the pending trigger, if any.
    pub(crate) fn cancel_trigger(&mut self) {
        if let Some(trigger) = self.trigger.take() {
            trigger.cancel();
        }
    }

    /// Run the callback with its captured arguments.
    pub(crate) fn invoke(&mut self) -> std::result::Result<(), CallbackError> {
        self.trigger = None;
        self.callback.invoke(&self.args)
    }
}
