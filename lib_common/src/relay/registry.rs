//! # Subscriber Registry
//!
//! Tracks the set of currently open subscriber handles. Membership is the
//! subscriber's lifecycle: a handle is admitted when its connection opens and
//! dropped as soon as it is seen closed or explicitly removed.
//!
//! The member list sits behind a `std::sync::Mutex` that is only held long
//! enough to copy or edit the list. Iteration runs over a snapshot, so
//! subscribers may be admitted or close while a broadcast is in flight.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::RelayResult;

/// # Subscriber
///
/// A connected real-time client. Implementations must be cheap to query and
/// must never block in [`Subscriber::send`].
pub trait Subscriber: Send + Sync {
    /// Stable identifier, used for removal and diagnostics.
    fn id(&self) -> &str;
    /// Whether the underlying connection can still accept messages.
    fn is_open(&self) -> bool;
    /// Hands one serialized message to the connection.
    fn send(&self, message: &str) -> RelayResult<()>;
}

#[derive(Default)]
pub struct SubscriberRegistry {
    members: Mutex<Vec<Arc<dyn Subscriber>>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<dyn Subscriber>>> {
        // The list holds no invariants a panicking holder could break.
        self.members.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers a subscriber. Re-admitting an id replaces the old handle.
    pub fn admit(&self, subscriber: Arc<dyn Subscriber>) {
        let mut members = self.lock();
        members.retain(|m| m.id() != subscriber.id());
        tracing::info!("Subscriber '{}' admitted ({} open)", subscriber.id(), members.len() + 1);
        members.push(subscriber);
    }

    /// Removes a subscriber by id. Returns whether it was present.
    pub fn remove(&self, id: &str) -> bool {
        let mut members = self.lock();
        let before = members.len();
        members.retain(|m| m.id() != id);
        let removed = members.len() != before;
        if removed {
            tracing::info!("Subscriber '{}' removed ({} open)", id, members.len());
        }
        removed
    }

    /// Drops every member that reports itself closed.
    pub fn prune(&self) -> usize {
        let mut members = self.lock();
        let before = members.len();
        members.retain(|m| m.is_open());
        before - members.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Calls `f` for every member that is open at the moment it is visited.
    ///
    /// Members found closed are skipped and evicted once the pass is over.
    /// Returns the number of open members visited.
    pub fn for_each<F>(&self, mut f: F) -> usize
    where
        F: FnMut(&Arc<dyn Subscriber>),
    {
        let snapshot: Vec<Arc<dyn Subscriber>> = self.lock().clone();

        let mut visited = 0;
        let mut saw_closed = false;
        for subscriber in &snapshot {
            if !subscriber.is_open() {
                saw_closed = true;
                continue;
            }
            visited += 1;
            f(subscriber);
        }

        if saw_closed {
            let pruned = self.prune();
            if pruned > 0 {
                tracing::debug!("Evicted {} closed subscriber(s)", pruned);
            }
        }
        visited
    }
}
