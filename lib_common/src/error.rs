//! # Relay Error Taxonomy
//!
//! Every failure the relay core can observe falls into one of three buckets.
//! None of them is fatal in steady state: configuration problems disable a
//! stream, data-source problems void one poll cycle, delivery problems affect
//! a single subscriber.

use thiserror::Error;

/// Custom error types for relay operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// A configured value was rejected (unknown stream name, zero-width window).
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// The data source could not be reached or the query failed.
    #[error("Data source error: {0}")]
    DataSource(String),
    /// A message could not be handed to one subscriber.
    #[error("Delivery to subscriber {subscriber} failed: {reason}")]
    Delivery { subscriber: String, reason: String },
}

/// Convenience alias used across the core.
pub type RelayResult<T> = Result<T, RelayError>;
