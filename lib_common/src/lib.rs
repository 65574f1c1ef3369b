//! # lib_common
//!
//! Shared building blocks for the relay servers: the poll/fan-out core that
//! pushes sensor readings and identity events to live subscribers, the
//! data-source gateways it reads from, and the resolved configuration value.

// Declare the modules to re-export
pub mod configs;
pub mod connections;
pub mod relay;
pub mod error;

// Re-export everything
pub use configs::RelayConfig;
pub use connections::DataSource;
pub use relay::*;
pub use error::RelayError;
