//! Cooperative cancellation for bulk operations.
//!
//! Bulk operations (load, diff, re-key) consult a [`Cancellation`] between
//! items. The core never spawns threads; a caller running an operation off
//! the main thread shares a [`CancelFlag`] with whoever may cancel it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Result, TallyError};

pub trait Cancellation {
    fn is_cancelled(&self) -> bool;

    /// `Err(TallyError::Cancelled)` once cancellation was requested.
    fn checkpoint(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(TallyError::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl<F> Cancellation for F
where
    F: Fn() -> bool,
{
    fn is_cancelled(&self) -> bool {
        self()
    }
}

/// Never cancels.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverCancel;

impl Cancellation for NeverCancel {
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Shareable flag, e.g. set from a signal handler or another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// The underlying flag, for registration with a signal handler.
    pub fn handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.0)
    }
}

impl Cancellation for CancelFlag {
    fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[test]
    fn test_never_cancel() {
        assert!(NeverCancel.checkpoint().is_ok());
    }

    #[test]
    fn test_flag_is_shared() {
        let flag = CancelFlag::new();
        let handle = flag.clone();
        assert!(!flag.is_cancelled());
        handle.cancel();
        assert!(matches!(flag.checkpoint(), Err(TallyError::Cancelled)));
    }

    #[test]
    fn test_raw_handle_cancels() {
        let flag = CancelFlag::new();
        flag.handle().store(true, Ordering::SeqCst);
        assert!(flag.is_cancelled());
    }

    #[test]
    fn test_closure_cancellation() {
        let calls = Cell::new(0);
        let cancel = || {
            calls.set(calls.get() + 1);
            calls.get() > 2
        };
        assert!(!cancel.is_cancelled());
        assert!(!cancel.is_cancelled());
        assert!(cancel.is_cancelled());
    }
}
