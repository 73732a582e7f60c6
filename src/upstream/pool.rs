//! Bounded upstream concurrency.
//!
//! # Responsibilities
//! - Cap the number of in-flight upstream requests process-wide
//! - Queue briefly for a slot, then fail fast
//! - Release the slot when the response body is finished or dropped

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{ProxyError, UpstreamFailure};
use crate::observability::metrics;

/// Process-wide upstream slot pool.
#[derive(Debug, Clone)]
pub struct UpstreamPool {
    slots: Arc<Semaphore>,
    acquire_timeout: Duration,
    max_in_flight: usize,
}

impl UpstreamPool {
    pub fn new(max_in_flight: usize, acquire_timeout: Duration) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(max_in_flight)),
            acquire_timeout,
            max_in_flight,
        }
    }

    /// Wait up to the acquire timeout for a free slot.
    pub async fn acquire(&self) -> Result<UpstreamPermit, ProxyError> {
        let acquire = Arc::clone(&self.slots).acquire_owned();
        match tokio::time::timeout(self.acquire_timeout, acquire).await {
            Ok(Ok(permit)) => {
                metrics::upstream_in_flight(self.in_flight());
                Ok(UpstreamPermit {
                    _permit: permit,
                    pool: self.clone(),
                })
            }
            Ok(Err(_)) => Err(ProxyError::Internal("upstream pool closed".into())),
            Err(_) => Err(ProxyError::upstream(
                UpstreamFailure::Saturated,
                format!("no upstream slot within {:?}", self.acquire_timeout),
            )),
        }
    }

    /// Slots currently held.
    pub fn in_flight(&self) -> usize {
        self.max_in_flight - self.slots.available_permits()
    }
}

/// One held upstream slot. Dropping it frees the slot.
#[derive(Debug)]
pub struct UpstreamPermit {
    _permit: OwnedSemaphorePermit,
    pool: UpstreamPool,
}

impl Drop for UpstreamPermit {
    fn drop(&mut self) {
        // The semaphore permit is released after this body runs.
        metrics::upstream_in_flight(self.pool.in_flight().saturating_sub(1));
    }
}
