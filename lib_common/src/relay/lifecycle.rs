//! # Connection Lifecycle
//!
//! A freshly admitted subscriber should not sit idle until the next tick, so
//! admission immediately runs one out-of-band cycle. That cycle goes through
//! the same query path as a scheduled one and broadcasts to everyone, and
//! its failure is contained: the subscriber stays registered either way.

use std::sync::Arc;

use crate::connections::data_source::DataSource;
use crate::relay::registry::Subscriber;
use crate::relay::scheduler::{CycleReport, RelayContext};

pub struct ConnectionLifecycle<D: DataSource> {
    context: Arc<RelayContext<D>>,
}

impl<D: DataSource> Clone for ConnectionLifecycle<D> {
    fn clone(&self) -> Self {
        Self {
            context: Arc::clone(&self.context),
        }
    }
}

impl<D: DataSource> ConnectionLifecycle<D> {
    pub fn new(context: Arc<RelayContext<D>>) -> Self {
        Self { context }
    }

    /// Admits `subscriber` and pushes it an initial snapshot.
    ///
    /// Returns the snapshot cycle's report, or `None` if it failed.
    pub async fn on_connect(&self, subscriber: Arc<dyn Subscriber>) -> Option<CycleReport> {
        let id = subscriber.id().to_string();
        self.context.registry().admit(subscriber);

        match self.context.run_cycle().await {
            Ok(report) => {
                tracing::debug!("Initial sync for '{}' sent {} update(s)", id, report.broadcast.len());
                Some(report)
            }
            Err(e) => {
                tracing::warn!("Initial sync for '{}' failed: {}", id, e);
                None
            }
        }
    }

    pub fn on_disconnect(&self, id: &str) {
        self.context.registry().remove(id);
    }
}
