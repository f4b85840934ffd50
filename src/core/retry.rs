//! Bounded retry for fallible pipeline steps.
//!
//! Attempts run back to back; there is no delay or backoff between them.

use crate::error::Result;

/// How many times a step may run before its last error is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::once()
    }
}

impl RetryPolicy {
    pub const PROMOTION_ATTEMPTS: u32 = 3;

    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn once() -> Self {
        Self::new(1)
    }

    pub fn promotion() -> Self {
        Self::new(Self::PROMOTION_ATTEMPTS)
    }

    /// Call `op` until it succeeds or attempts run out; the last error is returned.
    ///
    /// `op` receives the 1-based attempt number.
    pub fn run<T, F>(&self, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Result<T>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.max_attempts => {
                    log_status!(
                        "retry",
                        "Attempt {}/{} failed: {}",
                        attempt,
                        self.max_attempts,
                        err.message
                    );
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn stops_at_first_success() {
        let mut calls = 0;
        let value = RetryPolicy::promotion()
            .run(|attempt| {
                calls += 1;
                if attempt < 2 {
                    Err(Error::internal_unexpected("flaky"))
                } else {
                    Ok(attempt)
                }
            })
            .unwrap();
        assert_eq!(value, 2);
        assert_eq!(calls, 2);
    }

    #[test]
    fn gives_up_after_budget_with_last_error() {
        let mut calls = 0;
        let err = RetryPolicy::promotion()
            .run(|attempt| -> Result<()> {
                calls += 1;
                Err(Error::internal_unexpected(format!("attempt {}", attempt)))
            })
            .unwrap_err();
        assert_eq!(calls, 3);
        assert_eq!(err.details["error"], "attempt 3");
    }

    #[test]
    fn zero_attempts_still_runs_once() {
        let mut calls = 0;
        let _ = RetryPolicy::new(0).run(|_| -> Result<()> {
            calls += 1;
            Err(Error::internal_unexpected("x"))
        });
        assert_eq!(calls, 1);
    }
}
