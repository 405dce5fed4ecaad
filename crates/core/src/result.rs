//! Result type definition and extension traits.
//!
//! Provides combinators for Result types so callers can log and recover
//! without unwrap/expect/panic.

use crate::error::Error;

/// The standard Result type for deferloop operations.
///
/// # Examples
///
/// ```ignore
/// fn register(event_loop: &EventLoop) -> Result<TimerId> {
///     let id = event_loop.set_timeout(callback, Vec::new(), Delay::ZERO)?;
///     Ok(id)
/// }
/// ```
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait providing side-effect combinators for Results.
pub trait ResultExt<T> {
    /// Inspect the error without consuming the Result.
    #[must_use]
    fn inspect_error<F: FnOnce(&Error)>(self, f: F) -> Self;
}

impl<T> ResultExt<T> for Result<T> {
    fn inspect_error<F: FnOnce(&Error)>(self, f: F) -> Self {
        if let Err(ref e) = self {
            f(e);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inspect_error_sees_err_only() {
        let mut seen = Vec::new();

        let ok: Result<u8> = Ok(1);
        let ok = ok.inspect_error(|e| seen.push(e.to_string()));
        assert!(ok.is_ok());
        assert!(seen.is_empty());

        let err: Result<u8> = Err(Error::scheduling_unavailable("full"));
        let err = err.inspect_error(|e| seen.push(e.to_string()));
        assert!(err.is_err());
        assert_eq!(seen.len(), 1);
    }
}
