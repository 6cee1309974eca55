//! Lazily-populated state for every endpoint and user seen so far.
//!
//! Lookups take the read lock; a miss takes the write lock, checks again and
//! only then inserts, so concurrent first requests for a key always end up
//! sharing one state object. The registry locks only guard the maps; counters
//! live behind each state's own lock.
//!
//! Entries are never evicted. Memory grows with the number of distinct paths,
//! methods and users observed.

use crate::endpoint::EndpointState;
use crate::policy::{EndpointKey, EndpointLimits, PolicyStore};
use crate::user::UserState;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

type EndpointMap = HashMap<EndpointKey, Arc<EndpointState>>;
type UserMap = HashMap<EndpointKey, HashMap<String, Arc<UserState>>>;

/// Counters for one endpoint at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSnapshot {
    pub key: EndpointKey,
    pub requests: usize,
    pub queued: usize,
    pub limits: EndpointLimits,
}

/// Outstanding slots for one user at one endpoint at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSnapshot {
    pub key: EndpointKey,
    pub user_id: String,
    pub requests: usize,
}

/// Endpoint and user state maps.
#[derive(Debug, Default)]
pub struct StateRegistry {
    endpoints: RwLock<EndpointMap>,
    users: RwLock<UserMap>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl StateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// State for `key`, created from `policies` on first use.
    pub fn endpoint(&self, key: &EndpointKey, policies: &PolicyStore) -> Arc<EndpointState> {
        {
            let map = read(&self.endpoints);
            if let Some(state) = map.get(key) {
                return Arc::clone(state);
            }
        }

        let mut map = write(&self.endpoints);
        let state = map.entry(key.clone()).or_insert_with(|| {
            let limits = policies.resolve(key).endpoint_limits();
            debug!(target: "throttle::registry", endpoint = %key, ?limits, "created endpoint state");
            Arc::new(EndpointState::new(key.clone(), limits))
        });
        Arc::clone(state)
    }

    /// State for `user_id` at `key`, created from `policies` on first use.
    pub fn user(&self, key: &EndpointKey, user_id: &str, policies: &PolicyStore) -> Arc<UserState> {
        {
            let map = read(&self.users);
            if let Some(state) = map.get(key).and_then(|users| users.get(user_id)) {
                return Arc::clone(state);
            }
        }

        let mut map = write(&self.users);
        let state = map
            .entry(key.clone())
            .or_default()
            .entry(user_id.to_string())
            .or_insert_with(|| {
                let limits = policies.resolve(key).user_limits();
                debug!(
                    target: "throttle::registry",
                    endpoint = %key,
                    user = %user_id,
                    ?limits,
                    "created user state"
                );
                Arc::new(UserState::new(key.clone(), user_id, limits))
            });
        Arc::clone(state)
    }

    /// Number of endpoint states created so far.
    pub fn endpoint_count(&self) -> usize {
        read(&self.endpoints).len()
    }

    /// Number of user states created so far, across all endpoints.
    pub fn user_count(&self) -> usize {
        read(&self.users).values().map(HashMap::len).sum()
    }

    /// Current endpoint counters, sorted by key.
    pub fn endpoint_snapshot(&self) -> Vec<EndpointSnapshot> {
        let states: Vec<Arc<EndpointState>> = read(&self.endpoints).values().cloned().collect();
        let mut entries: Vec<EndpointSnapshot> = states
            .iter()
            .map(|s| EndpointSnapshot {
                key: s.key().clone(),
                requests: s.requests_count(),
                queued: s.queue_count(),
                limits: *s.limits(),
            })
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        entries
    }

    /// Current user counters, sorted by key then user.
    pub fn user_snapshot(&self) -> Vec<UserSnapshot> {
        let states: Vec<Arc<UserState>> =
            read(&self.users).values().flat_map(|users| users.values().cloned()).collect();
        let mut entries: Vec<UserSnapshot> = states
            .iter()
            .map(|s| UserSnapshot {
                key: s.key().clone(),
                user_id: s.user_id().to_string(),
                requests: s.requests_count(),
            })
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key).then_with(|| a.user_id.cmp(&b.user_id)));
        entries
    }
}
