use crate::core::{IntellimetricError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag shared between the pool and a running task.
///
/// The parse pipeline polls it at every stage boundary and after each mapped
/// resource.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    canceled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::Release);
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
    }

    /// Returns [`IntellimetricError::Canceled`] once the token has been tripped.
    pub fn check(&self) -> Result<()> {
        if self.is_canceled() {
            Err(IntellimetricError::Canceled)
        } else {
            Ok(())
        }
    }
}
