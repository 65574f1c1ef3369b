use std::fmt;
use std::time::Duration;

use crate::error::RelayResult;
use crate::relay::scheduler::DEFAULT_POLL_INTERVAL;
use crate::relay::stream::{AllowList, StreamBinding, StreamKind};
use crate::relay::time_window::{WindowCalculator, DEFAULT_FORWARD_SKEW, DEFAULT_LOOKBACK};

/// Default listening port for subscriber connections.
pub const DEFAULT_PORT: u16 = 8080;

/// # Relay Configuration
///
/// Everything the poll/fan-out core needs, resolved by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub port: u16,
    /// Table backing the temperature stream, if any.
    pub temperature_table: Option<String>,
    /// Table backing the id stream, if any.
    pub id_table: Option<String>,
    /// Narrows the built-in allow-list when set.
    pub allowed_streams: Option<Vec<String>>,
    pub lookback: Duration,
    pub forward_skew: Duration,
    pub poll_interval: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            temperature_table: None,
            id_table: None,
            allowed_streams: None,
            lookback: DEFAULT_LOOKBACK,
            forward_skew: DEFAULT_FORWARD_SKEW,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl fmt::Display for RelayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RelayConfig
    Port: {},
    Temperature table: {},
    Id table: {},
    Allowed streams: {},
    Lookback: {:?},
    Forward skew: {:?},
    Poll interval: {:?}
",
            self.port,
            self.temperature_table.as_deref().unwrap_or("undefined"),
            self.id_table.as_deref().unwrap_or("undefined"),
            self.allowed_streams
                .as_ref()
                .map(|v| v.join(","))
                .unwrap_or_else(|| "built-in".to_string()),
            self.lookback,
            self.forward_skew,
            self.poll_interval
        )
    }
}

impl RelayConfig {
    pub fn allow_list(&self) -> AllowList {
        match &self.allowed_streams {
            Some(names) => AllowList::restricted_to(names),
            None => AllowList::default(),
        }
    }

    /// Validates both table names independently.
    ///
    /// An invalid name disables only its own stream; this never fails.
    pub fn bindings(&self) -> (StreamBinding, StreamBinding) {
        let allow = self.allow_list();
        (
            StreamBinding::resolve(StreamKind::Temperature, self.temperature_table.as_deref(), &allow),
            StreamBinding::resolve(StreamKind::Id, self.id_table.as_deref(), &allow),
        )
    }

    pub fn window_calculator(&self) -> RelayResult<WindowCalculator> {
        WindowCalculator::new(self.lookback, self.forward_skew)
    }
}
