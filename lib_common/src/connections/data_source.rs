//! # Data Source Boundary
//!
//! What the relay needs from a record store: fetch the most recent row of a
//! validated stream whose `created_at` falls inside a window.

use std::future::Future;

use serde_json::Value;

use crate::relay::stream::StreamName;
use crate::relay::time_window::TimeWindow;
use crate::error::RelayResult;

pub trait DataSource: Send + Sync + 'static {
    /// Most recent row of `stream` with `created_at` in `[window.lower, window.upper)`.
    ///
    /// Implementations do not retry; a failure is reported to the caller as
    /// [`RelayError::DataSource`](crate::error::RelayError::DataSource).
    fn query(
        &self,
        stream: &StreamName,
        window: &TimeWindow,
    ) -> impl Future<Output = RelayResult<Option<Value>>> + Send;

    /// Releases pooled connections. Called once at shutdown.
    fn close(&self) {}
}
