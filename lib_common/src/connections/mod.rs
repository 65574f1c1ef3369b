//! # Connections Module
//!
//! This module handles persistent connections to the record store the relay
//! polls.

/// The trait every data source implements.
pub mod data_source;

/// Module for PostgreSQL database connection pooling and range queries.
#[cfg(feature = "connections")]
pub mod db_postgres;

pub use data_source::DataSource;
#[cfg(feature = "connections")]
pub use db_postgres::{PgGateway, PgSettings};
