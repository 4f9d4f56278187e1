use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use vecagg_error::{DbError, Result};

/// Cooperative cancellation flag shared between an operator and whoever
/// drives it.
///
/// The operator checks the flag before every input batch fetch. An
/// interrupted operator must not be polled again without a rescan.
#[derive(Debug, Clone, Default)]
pub struct InterruptHandle {
    flag: Arc<AtomicBool>,
}

impl InterruptHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interrupt(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Clear a previous interrupt.
    pub fn clear(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    pub fn is_interrupted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Error if an interrupt was requested.
    pub fn check(&self) -> Result<()> {
        if self.is_interrupted() {
            return Err(DbError::cancelled("Query execution interrupted"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use vecagg_error::ErrorKind;

    use super::*;

    #[test]
    fn interrupt_from_clone() {
        let handle = InterruptHandle::new();
        handle.check().unwrap();

        let other = handle.clone();
        other.interrupt();

        let err = handle.check().unwrap_err();
        assert_eq!(ErrorKind::Cancelled, err.kind());

        handle.clear();
        other.check().unwrap();
    }
}
