//! Admission control for the active connection ceiling

use crate::errors::{PoolError, PoolResult};

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio_util::sync::CancellationToken;

/// Gate in front of every checkout.
///
/// One permit exists per unit of the `max_active` ceiling. A caller holds a
/// permit from the moment it is admitted until its connection is handed
/// back, whether the connection is re-idled or closed. Waiters are woken in
/// FIFO order by the underlying semaphore.
#[derive(Debug)]
pub(crate) struct AdmissionController {
    permits: Option<Arc<Semaphore>>,
    ceiling: usize,
    wait: bool,
    wait_timeout: Option<Duration>,
}

impl AdmissionController {
    pub fn new(ceiling: usize, wait: bool, wait_timeout: Option<Duration>) -> Self {
        Self {
            permits: (ceiling > 0).then(|| Arc::new(Semaphore::new(ceiling))),
            ceiling,
            wait,
            wait_timeout,
        }
    }

    pub fn ceiling(&self) -> Option<usize> {
        (self.ceiling > 0).then_some(self.ceiling)
    }

    /// Admit one caller. `Ok(None)` means the pool is unbounded.
    ///
    /// A token that is already cancelled refuses admission in every mode,
    /// even when a permit is free.
    pub async fn admit(
        &self,
        cancel: Option<&CancellationToken>,
    ) -> PoolResult<Option<OwnedSemaphorePermit>> {
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            return Err(PoolError::Cancelled);
        }

        let Some(permits) = &self.permits else {
            return Ok(None);
        };

        if !self.wait {
            return match Arc::clone(permits).try_acquire_owned() {
                Ok(permit) => Ok(Some(permit)),
                Err(TryAcquireError::NoPermits) => Err(PoolError::PoolExhausted),
                Err(TryAcquireError::Closed) => Err(PoolError::PoolClosed),
            };
        }

        let acquire = self.acquire_blocking(Arc::clone(permits));
        match cancel {
            Some(token) => tokio::select! {
                biased;
                () = token.cancelled() => Err(PoolError::Cancelled),
                result = acquire => result.map(Some),
            },
            None => acquire.await.map(Some),
        }
    }

    async fn acquire_blocking(&self, permits: Arc<Semaphore>) -> PoolResult<OwnedSemaphorePermit> {
        let acquired = match self.wait_timeout {
            Some(limit) => tokio::time::timeout(limit, permits.acquire_owned())
                .await
                .map_err(|_| PoolError::Timeout(limit))?,
            None => permits.acquire_owned().await,
        };
        acquired.map_err(|_| PoolError::PoolClosed)
    }

    /// Wake every waiter with `PoolClosed` and refuse later admissions
    pub fn close(&self) {
        if let Some(permits) = &self.permits {
            permits.close();
        }
    }
}
