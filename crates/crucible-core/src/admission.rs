//! Admission controller: the counting gate that bounds concurrent
//! executions.
//!
//! A thin wrapper over a fair [`tokio::sync::Semaphore`]. `admit()` waits
//! up to a configurable budget for a slot; past the budget it fails with
//! `RESOURCE_LIMIT_ERROR` before any process is started. Waiters are
//! granted permits in arrival order. The returned [`Permit`] releases its
//! slot exactly once, on drop, no matter how the execution terminated.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::ExecutionError;

/// Bounds the number of concurrently in-flight executions.
#[derive(Debug, Clone)]
pub struct AdmissionController {
    capacity: usize,
    wait_budget: Duration,
    semaphore: Arc<Semaphore>,
}

/// RAII permit for one in-flight execution. Dropping it frees the slot.
#[derive(Debug)]
pub struct Permit {
    _permit: OwnedSemaphorePermit,
}

impl AdmissionController {
    pub fn new(capacity: usize, wait_budget: Duration) -> Self {
        Self {
            capacity,
            wait_budget,
            semaphore: Arc::new(Semaphore::new(capacity)),
        }
    }

    /// Wait for an execution slot.
    ///
    /// Returns `ResourceLimit` once the wait budget elapses with no slot
    /// free. A zero budget never waits: a slot is either free now or the
    /// request is rejected.
    pub async fn admit(&self) -> Result<Permit, ExecutionError> {
        let semaphore = Arc::clone(&self.semaphore);

        let permit = if self.wait_budget.is_zero() {
            semaphore.try_acquire_owned().map_err(|_| self.rejection())?
        } else {
            tokio::time::timeout(self.wait_budget, semaphore.acquire_owned())
                .await
                .map_err(|_| self.rejection())?
                // The semaphore is never closed.
                .map_err(|_| self.rejection())?
        };

        Ok(Permit { _permit: permit })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    fn rejection(&self) -> ExecutionError {
        ExecutionError::ResourceLimit(format!(
            "no execution slot free within {:?} (capacity {})",
            self.wait_budget, self.capacity
        ))
    }
}
