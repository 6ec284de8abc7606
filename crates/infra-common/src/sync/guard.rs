use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::errors::types::{Error, Result};

/// Busy flag for one logical action on one entity.
///
/// A second caller arriving while the flag is held is rejected immediately
/// with [`Error::AlreadyInProgress`]; nothing is queued. The flag is released
/// when the [`GuardPermit`] drops, so success, failure, abort and an early `?`
/// all release it.
#[derive(Debug)]
pub struct OperationGuard {
    operation: String,
    busy: Arc<AtomicBool>,
}

impl OperationGuard {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Claim the flag or fail fast
    pub fn try_acquire(&self) -> Result<GuardPermit> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| {
                debug!("Rejected overlapping {} operation", self.operation);
                Error::already_in_progress(&self.operation)
            })?;
        Ok(GuardPermit {
            busy: self.busy.clone(),
        })
    }

    /// Run `operation` under the guard
    pub async fn run<T, E, Fut>(&self, operation: Fut) -> std::result::Result<T, E>
    where
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<Error>,
    {
        let _permit = self.try_acquire()?;
        operation.await
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }
}

/// Proof of holding an [`OperationGuard`]; releases it on drop
#[derive(Debug)]
pub struct GuardPermit {
    busy: Arc<AtomicBool>,
}

impl Drop for GuardPermit {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}
