//! # Fan-out Dispatcher
//!
//! Takes one [`UpdateEvent`], serializes it once and hands the same text to
//! every open subscriber in the registry. Delivery is best effort and
//! at-most-once: there is no acknowledgement and no retry, and a failed send
//! only costs the subscriber it was aimed at.

use std::sync::Arc;

use crate::relay::event::UpdateEvent;
use crate::relay::registry::SubscriberRegistry;

pub struct Dispatcher {
    registry: Arc<SubscriberRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<SubscriberRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    /// Delivers `event` to all open subscribers.
    ///
    /// Returns how many sends succeeded, or `None` when the event could not
    /// be serialized and nothing was sent. Subscribers whose send fails are
    /// removed from the registry; the remaining ones are still served.
    pub fn broadcast(&self, event: &UpdateEvent) -> Option<usize> {
        let wire = match event.to_wire() {
            Ok(wire) => wire,
            Err(e) => {
                tracing::error!("Failed to serialize {} update: {}", event.kind, e);
                return None;
            }
        };

        let mut delivered = 0;
        let mut failed: Vec<String> = Vec::new();
        self.registry.for_each(|subscriber| {
            tracing::debug!("Transmitting {} update to subscriber '{}'", event.kind, subscriber.id());
            match subscriber.send(&wire) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::debug!("{}", e);
                    failed.push(subscriber.id().to_string());
                }
            }
        });

        for id in failed {
            self.registry.remove(&id);
        }
        Some(delivered)
    }
}
