//! # Configuration Modules
//!
//! The relay core consumes configuration as an already-resolved value. Where
//! the values come from (defaults, files, environment, command line) is the
//! binary's business.

/// The resolved relay configuration and its validation into core types.
pub mod relay_config;

pub use relay_config::RelayConfig;
