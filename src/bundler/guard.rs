//! Bounded-parallelism gate
//!
//! One guard exists per resource class (parsed content, HTML, modules,
//! authors, images, revisions). Each caps the number of outstanding
//! operations of its class; excess callers wait in FIFO order.
//!
//! A guard never wraps code that itself re-enters the same guard. Callers
//! that need to continue work under an already-held slot (the redirect
//! resolver) call their unguarded primitive directly.

use crate::{BundlerError, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Caps in-flight operations of one resource class
#[derive(Clone)]
pub struct ConcurrencyGuard {
    name: &'static str,
    limit: usize,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl ConcurrencyGuard {
    /// Creates a guard admitting at most `limit` operations at once
    ///
    /// A limit of zero is treated as one.
    pub fn new(name: &'static str, limit: usize, cancel: CancellationToken) -> Self {
        let limit = limit.max(1);
        Self {
            name,
            limit,
            semaphore: Arc::new(Semaphore::new(limit)),
            cancel,
        }
    }

    /// Runs `op` once a slot is free
    ///
    /// The slot is released when `op` completes, fails, or is abandoned.
    /// Once the run is cancelled, queued callers and in-flight operations
    /// return `BundlerError::Cancelled` instead of proceeding.
    pub async fn run<F, T>(&self, op: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let _permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(BundlerError::Cancelled),
            permit = self.semaphore.acquire() => {
                permit.map_err(|_| BundlerError::Cancelled)?
            }
        };

        tracing::trace!(
            guard = self.name,
            available = self.semaphore.available_permits(),
            "slot acquired"
        );

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(BundlerError::Cancelled),
            result = op => result,
        }
    }

    /// Resource class name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Maximum number of concurrent operations
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Number of free slots right now
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}
