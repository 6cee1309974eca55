//! User-tier admission with timed release.
//!
//! A user may hold `max_requests` slots per endpoint. Each admission takes a
//! slot and schedules a one-shot task that gives it back after
//! `release_delay`, whether or not the request has finished by then. There is
//! no waiting at this tier: a user at the limit is rejected at once.
//!
//! This is a fixed-window approximation. A burst admitted together is released
//! together when its delay runs out, not as each request completes.

use crate::error::ThrottleError;
use crate::policy::{EndpointKey, UserLimits};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

/// Outstanding admissions for one user at one endpoint.
#[derive(Debug)]
pub struct UserState {
    key: EndpointKey,
    user_id: String,
    limits: UserLimits,
    outstanding: Mutex<usize>,
}

impl UserState {
    pub fn new(key: EndpointKey, user_id: impl Into<String>, limits: UserLimits) -> Self {
        Self { key, user_id: user_id.into(), limits, outstanding: Mutex::new(0) }
    }

    pub fn key(&self) -> &EndpointKey {
        &self.key
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn limits(&self) -> &UserLimits {
        &self.limits
    }

    /// Slots currently taken.
    pub fn requests_count(&self) -> usize {
        *self.outstanding()
    }

    fn outstanding(&self) -> MutexGuard<'_, usize> {
        self.outstanding.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take a slot or reject. The slot comes back on its own after `release_delay`.
    pub fn try_admit<E>(self: &Arc<Self>) -> Result<(), ThrottleError<E>> {
        let max = self.limits.max_requests;
        {
            let mut outstanding = self.outstanding();
            if *outstanding >= max {
                let in_flight = *outstanding;
                drop(outstanding);
                debug!(
                    target: "throttle::user",
                    endpoint = %self.key,
                    user = %self.user_id,
                    in_flight,
                    max,
                    "user exceeded max requests"
                );
                return Err(ThrottleError::UserLimit { in_flight, max });
            }
            *outstanding += 1;
        }
        schedule_release(Arc::clone(self), self.limits.release_delay);
        Ok(())
    }

    fn release(&self) {
        let mut outstanding = self.outstanding();
        *outstanding = outstanding.saturating_sub(1);
    }
}

// Detached from the request: runs on the tokio runtime when there is one,
// otherwise on a short-lived thread.
fn schedule_release(state: Arc<UserState>, delay: Duration) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                tokio::time::sleep(delay).await;
                state.release();
            });
        }
        Err(_) => {
            std::thread::spawn(move || {
                std::thread::sleep(delay);
                state.release();
            });
        }
    }
}
