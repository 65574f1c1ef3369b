//! # PostgreSQL Gateway
//!
//! Provides a managed connection pool for PostgreSQL using `deadpool-postgres`
//! and issues the relay's range query against it.
//!
//! The table name is the only part of the statement that cannot be a bound
//! parameter. It reaches the statement builder exclusively as a
//! [`StreamName`], which can only come out of the allow-list, and is quoted
//! on top of that. Both window bounds travel as `timestamptz` parameters.

use std::time::Duration;

use deadpool_postgres::{Config as DeadpoolConfig, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use serde_json::Value;
use tokio_postgres::NoTls;

use crate::connections::data_source::DataSource;
use crate::relay::stream::StreamName;
use crate::relay::time_window::TimeWindow;
use crate::error::{RelayError, RelayResult};

/// Connection parameters, either as a full URL or as discrete fields.
#[derive(Debug, Clone, Default)]
pub struct PgSettings {
    pub url: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub dbname: Option<String>,
    /// Maximum number of pooled connections.
    pub pool_size: usize,
    pub connect_timeout: Duration,
}

impl PgSettings {
    fn to_deadpool(&self) -> DeadpoolConfig {
        let mut cfg = DeadpoolConfig::new();
        cfg.url = self.url.clone();
        cfg.host = self.host.clone();
        cfg.port = self.port;
        cfg.user = self.user.clone();
        cfg.password = self.password.clone();
        cfg.dbname = self.dbname.clone();
        cfg.connect_timeout = Some(self.connect_timeout);
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let mut pool = PoolConfig::new(self.pool_size.max(1));
        pool.timeouts.wait = Some(self.connect_timeout);
        pool.timeouts.create = Some(self.connect_timeout);
        cfg.pool = Some(pool);
        cfg
    }
}

/// Builds the range statement for one stream.
pub(crate) fn range_statement(stream: &StreamName) -> String {
    format!(
        "SELECT row_to_json(t) FROM \"{}\" AS t \
         WHERE t.created_at >= $1::timestamptz AND t.created_at < $2::timestamptz \
         ORDER BY t.created_at DESC LIMIT 1",
        stream.as_str()
    )
}

/// A wrapper around the PostgreSQL connection pool.
pub struct PgGateway {
    /// The underlying deadpool connection pool.
    pool: Pool,
}

impl PgGateway {
    /// Creates the pool. No connection is opened until the first query.
    pub fn new(settings: &PgSettings) -> RelayResult<Self> {
        let pool = settings
            .to_deadpool()
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| RelayError::Configuration(format!("Failed to create database pool: {}", e)))?;
        tracing::info!("Database connection pool created (max {} connections).", settings.pool_size.max(1));
        Ok(Self { pool })
    }

    /// Checks the health of the database connection by running a simple query.
    pub async fn ping(&self) -> RelayResult<()> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| RelayError::DataSource(format!("pool: {}", e)))?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| RelayError::DataSource(format!("ping: {}", e)))?;
        Ok(())
    }
}

impl DataSource for PgGateway {
    async fn query(&self, stream: &StreamName, window: &TimeWindow) -> RelayResult<Option<Value>> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| RelayError::DataSource(format!("pool: {}", e)))?;

        let statement = range_statement(stream);
        tracing::trace!("Executing: {} [{} .. {})", statement, window.lower, window.upper);

        let row = client
            .query_opt(statement.as_str(), &[&window.lower, &window.upper])
            .await
            .map_err(|e| match e.as_db_error() {
                Some(db) => RelayError::DataSource(format!(
                    "{} query failed: {} ({})",
                    stream,
                    db.message(),
                    db.code().code()
                )),
                None => RelayError::DataSource(format!("{} query failed: {}", stream, e)),
            })?;

        match row {
            None => Ok(None),
            Some(row) => row
                .try_get::<_, Value>(0)
                .map(Some)
                .map_err(|e| RelayError::DataSource(format!("{} row decode failed: {}", stream, e))),
        }
    }

    fn close(&self) {
        tracing::info!("Closing database connection pool.");
        self.pool.close();
    }
}
