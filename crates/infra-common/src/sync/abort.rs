//! Cooperative cancellation.
//!
//! An [`AbortController`] is held by whoever may cancel; the [`AbortSignal`] it
//! hands out is passed into long-running sequences, which check it at each
//! resumption point and unwind with [`Error::Aborted`].

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::errors::types::{Error, Result};

/// Owner side of an abort signal
#[derive(Debug, Clone, Default)]
pub struct AbortController {
    token: CancellationToken,
}

impl AbortController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            token: self.token.clone(),
        }
    }

    /// Request cancellation. Idempotent.
    pub fn abort(&self) {
        self.token.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Observer side of an abort request
#[derive(Debug, Clone)]
pub struct AbortSignal {
    token: CancellationToken,
}

impl AbortSignal {
    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Fail with [`Error::Aborted`] if cancellation was requested
    pub fn check(&self, operation: &str) -> Result<()> {
        if self.is_aborted() {
            Err(Error::aborted(operation))
        } else {
            Ok(())
        }
    }

    /// Resolves once cancellation is requested
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

/// [`AbortSignal::check`] for an optional signal
pub fn check(signal: Option<&AbortSignal>, operation: &str) -> Result<()> {
    signal.map_or(Ok(()), |s| s.check(operation))
}

/// Sleep for `duration`, returning early with [`Error::Aborted`] on abort
pub async fn sleep(duration: Duration, signal: Option<&AbortSignal>, operation: &str) -> Result<()> {
    race(signal, operation, tokio::time::sleep(duration)).await
}

/// Drive `future` to completion unless `signal` fires first
pub async fn race<F>(signal: Option<&AbortSignal>, operation: &str, future: F) -> Result<F::Output>
where
    F: Future,
{
    check(signal, operation)?;
    match signal {
        None => Ok(future.await),
        Some(signal) => tokio::select! {
            biased;
            _ = signal.cancelled() => Err(Error::aborted(operation)),
            output = future => Ok(output),
        },
    }
}
