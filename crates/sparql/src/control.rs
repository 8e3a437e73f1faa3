//! Cooperative execution control
//!
//! Executors are single-threaded and cooperative: every triple match, path
//! step, merge and group iteration calls [`ExecControl::check`], which is
//! the engine's yield point. A host cancels or bounds a query by handing
//! the executor a control carrying a cancel flag and/or a deadline.

use crate::{QueryError, QueryResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Shared cancellation flag
///
/// Setting it makes the next yield point observe the cancellation and
/// terminate the iterator with [`QueryError::Cancelled`].
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Create an unset flag
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-execution control: cancel flag plus optional deadline
#[derive(Clone, Default)]
pub struct ExecControl {
    cancel: Option<CancelFlag>,
    deadline: Option<Instant>,
}

impl ExecControl {
    /// Control with neither flag nor deadline (never interrupts)
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Attach a cancel flag
    pub fn with_cancel(mut self, flag: CancelFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Attach a deadline
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Yield point: fails with `Cancelled` or `Timeout` when due
    pub fn check(&self) -> QueryResult<()> {
        if let Some(flag) = &self.cancel {
            if flag.is_cancelled() {
                return Err(QueryError::Cancelled);
            }
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() > deadline {
                return Err(QueryError::Timeout);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn unbounded_never_interrupts() {
        assert!(ExecControl::unbounded().check().is_ok());
    }

    #[test]
    fn cancel_flag_interrupts() {
        let flag = CancelFlag::new();
        let control = ExecControl::unbounded().with_cancel(flag.clone());
        assert!(control.check().is_ok());

        flag.cancel();
        assert!(matches!(control.check(), Err(QueryError::Cancelled)));
    }

    #[test]
    fn elapsed_deadline_interrupts() {
        let control =
            ExecControl::unbounded().with_deadline(Instant::now() - Duration::from_millis(1));
        assert!(matches!(control.check(), Err(QueryError::Timeout)));
    }
}
