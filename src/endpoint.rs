//! Endpoint-tier admission: a concurrency ceiling with a bounded wait queue.
//!
//! Semantics of [`EndpointState::acquire`]:
//! - There are `retry_count + 1` admission attempts.
//! - Each attempt takes the state lock. If `requests < max_requests` the
//!   request is admitted, gives back any queue slot it reserved, and receives an
//!   [`EndpointPermit`] that frees the request slot when dropped.
//! - The first attempt that finds no capacity tries to reserve a queue slot. If
//!   the queue is full *after* that step the request is rejected with
//!   [`ThrottleError::QueueFull`] in the same attempt. This includes the request
//!   that takes the last free slot: with `max_queue = 1` nobody ever waits.
//! - A request holding a reservation does not look at the queue again; it waits
//!   `retry_delay` (lock released) and tries again.
//! - When the attempts run out the reservation is released and the request is
//!   rejected with [`ThrottleError::RetryExhausted`].
//! - A reservation is also released when the waiting future is dropped, for
//!   example by a timeout or a client disconnect.
//!
//! Invariants:
//! - `requests <= max_requests` at every point another thread can observe.
//! - A rejected request leaves both counters as it found them.
//! - No lock is held across a wait.

use crate::error::ThrottleError;
use crate::policy::{EndpointKey, EndpointLimits};
use crate::sleeper::Sleeper;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Counters {
    requests: usize,
    queued: usize,
}

/// Live counters for one (path, method) plus the limits they are checked against.
#[derive(Debug)]
pub struct EndpointState {
    key: EndpointKey,
    limits: EndpointLimits,
    counters: Mutex<Counters>,
}

impl EndpointState {
    pub fn new(key: EndpointKey, limits: EndpointLimits) -> Self {
        Self { key, limits, counters: Mutex::new(Counters::default()) }
    }

    pub fn key(&self) -> &EndpointKey {
        &self.key
    }

    pub fn limits(&self) -> &EndpointLimits {
        &self.limits
    }

    /// Requests currently admitted.
    pub fn requests_count(&self) -> usize {
        self.counters().requests
    }

    /// Queue slots currently reserved.
    pub fn queue_count(&self) -> usize {
        self.counters().queued
    }

    // Every mutation is a single step, so a poisoned guard still holds consistent counts.
    fn counters(&self) -> MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for a request slot, following the queued-retry rules above.
    pub async fn acquire<E>(
        self: &Arc<Self>,
        sleeper: &dyn Sleeper,
    ) -> Result<EndpointPermit, ThrottleError<E>> {
        let EndpointLimits { max_requests, max_queue, retry_count, retry_delay } = self.limits;
        let attempts = retry_count.saturating_add(1);
        let mut slot: Option<QueueSlot> = None;

        for attempt in 1..=attempts {
            {
                let mut counters = self.counters();
                if counters.requests < max_requests {
                    counters.requests += 1;
                    if let Some(slot) = slot.take() {
                        counters.queued = counters.queued.saturating_sub(1);
                        slot.disarm();
                    }
                    return Ok(EndpointPermit { state: Arc::clone(self) });
                }

                if slot.is_none() {
                    let reserved = counters.queued < max_queue;
                    if reserved {
                        counters.queued += 1;
                    }
                    if counters.queued >= max_queue {
                        let queued = counters.queued;
                        if reserved {
                            counters.queued -= 1;
                        }
                        drop(counters);
                        debug!(
                            target: "throttle::endpoint",
                            endpoint = %self.key,
                            queued,
                            max_queue,
                            "queue limit reached for endpoint"
                        );
                        return Err(ThrottleError::QueueFull { queued, max_queue });
                    }
                    slot = Some(QueueSlot { state: Arc::clone(self), armed: true });
                }
            }

            if attempt < attempts {
                sleeper.sleep(retry_delay).await;
            }
        }

        drop(slot);
        debug!(
            target: "throttle::endpoint",
            endpoint = %self.key,
            attempts,
            "request denied after all retry attempts"
        );
        Err(ThrottleError::RetryExhausted { attempts })
    }

    /// Acquire a slot, run `operation`, then free the slot.
    pub async fn execute<T, E, Fut, Op>(
        self: &Arc<Self>,
        sleeper: &dyn Sleeper,
        operation: Op,
    ) -> Result<T, ThrottleError<E>>
    where
        Fut: Future<Output = Result<T, E>>,
        Op: FnOnce() -> Fut,
    {
        let permit = self.acquire::<E>(sleeper).await?;
        let result = operation().await.map_err(ThrottleError::Inner);
        drop(permit);
        result
    }
}

/// One admitted request. Dropping it frees the request slot.
#[derive(Debug)]
#[must_use = "the request slot is freed as soon as the permit is dropped"]
pub struct EndpointPermit {
    state: Arc<EndpointState>,
}

impl EndpointPermit {
    pub fn state(&self) -> &Arc<EndpointState> {
        &self.state
    }
}

impl Drop for EndpointPermit {
    fn drop(&mut self) {
        let mut counters = self.state.counters();
        counters.requests = counters.requests.saturating_sub(1);
    }
}

/// A reserved queue slot. Dropping it while armed gives the slot back, so a
/// waiter whose future is cancelled mid-wait does not keep it.
#[derive(Debug)]
struct QueueSlot {
    state: Arc<EndpointState>,
    armed: bool,
}

impl QueueSlot {
    // Caller already adjusted `queued` under the lock it holds.
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for QueueSlot {
    fn drop(&mut self) {
        if self.armed {
            let mut counters = self.state.counters();
            counters.queued = counters.queued.saturating_sub(1);
        }
    }
}
