//! # Stream Names and the Allow-List
//!
//! The relay polls exactly two record streams. Their table names come from
//! configuration, which makes them untrusted input: a name is only ever used
//! to address a table after it has been matched against a fixed allow-list
//! and checked to be a plain SQL identifier. The only way to obtain a
//! [`StreamName`] is through [`AllowList::resolve`], so the gateway cannot be
//! handed anything else.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::error::{RelayError, RelayResult};

/// Built-in table names the relay is allowed to read from.
pub const DEFAULT_ALLOWED_STREAMS: &[&str] = &[
    "temperature",
    "temperatures",
    "temperature_readings",
    "id",
    "ids",
    "id_events",
];

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    // PostgreSQL truncates identifiers past 63 bytes.
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("identifier pattern is valid")
});

/// # Stream Kind
///
/// The two update variants pushed to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    /// Sensor readings.
    Temperature,
    /// Identity events.
    Id,
}

impl StreamKind {
    /// The `type` tag carried by the wire message for this kind.
    pub fn wire_type(self) -> &'static str {
        match self {
            StreamKind::Temperature => "temperature_update",
            StreamKind::Id => "id_update",
        }
    }

    /// Both kinds in polling order.
    pub fn all() -> [StreamKind; 2] {
        [StreamKind::Temperature, StreamKind::Id]
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::Temperature => f.write_str("temperature"),
            StreamKind::Id => f.write_str("id"),
        }
    }
}

/// A table name that passed allow-list validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamName(String);

impl StreamName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// # Allow-List
///
/// The fixed set of identifiers a [`StreamName`] may take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowList {
    names: BTreeSet<String>,
}

impl Default for AllowList {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOWED_STREAMS.iter().copied())
    }
}

impl AllowList {
    /// Narrows the built-in list to the given entries.
    ///
    /// Configuration can only take names away: an entry outside
    /// [`DEFAULT_ALLOWED_STREAMS`] is dropped with a warning.
    pub fn restricted_to<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let kept: Vec<String> = names
            .into_iter()
            .map(|name| name.as_ref().trim().to_string())
            .filter(|name| !name.is_empty())
            .filter(|name| {
                let known = DEFAULT_ALLOWED_STREAMS.contains(&name.as_str());
                if !known {
                    tracing::warn!("Ignoring allow-list entry '{}': not a built-in stream", name);
                }
                known
            })
            .collect();
        Self::new(kept)
    }

    /// Entries that are not plain identifiers are dropped, so they can never
    /// be resolved later.
    fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = BTreeSet::new();
        for name in names {
            let name = name.as_ref().trim();
            if IDENTIFIER.is_match(name) {
                set.insert(name.to_string());
            } else if !name.is_empty() {
                tracing::warn!("Dropping allow-list entry '{}': not a plain identifier", name);
            }
        }
        Self { names: set }
    }

    /// Returns `true` when `name` would resolve.
    pub fn permits(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Validates a configured table name.
    pub fn resolve(&self, name: &str) -> RelayResult<StreamName> {
        if self.permits(name) {
            Ok(StreamName(name.to_string()))
        } else {
            Err(RelayError::Configuration(format!(
                "stream name '{}' is not in the allow-list",
                name
            )))
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// # Stream Binding
///
/// Pairs an update kind with the table it is read from. A binding without a
/// name is disabled and never reaches the data source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamBinding {
    pub kind: StreamKind,
    pub name: Option<StreamName>,
}

impl StreamBinding {
    /// Resolves a configured table name for `kind`.
    ///
    /// A missing or rejected name yields a disabled binding; the rejection is
    /// logged and never escalated.
    pub fn resolve(kind: StreamKind, configured: Option<&str>, allow_list: &AllowList) -> Self {
        let name = match configured.map(str::trim).filter(|s| !s.is_empty()) {
            None => {
                tracing::info!("No table configured for the {} stream; stream disabled", kind);
                None
            }
            Some(raw) => match allow_list.resolve(raw) {
                Ok(name) => Some(name),
                Err(e) => {
                    tracing::warn!("{}; {} stream disabled", e, kind);
                    None
                }
            },
        };
        Self { kind, name }
    }

    pub fn disabled(kind: StreamKind) -> Self {
        Self { kind, name: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.name.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_default_allow_list_resolves_known_tables() {
        let allow = AllowList::default();
        assert_eq!(allow.resolve("temperatures").unwrap().as_str(), "temperatures");
        assert_eq!(allow.resolve("ids").unwrap().as_str(), "ids");
    }

    #[test]
    fn test_injection_attempt_is_rejected() {
        let allow = AllowList::default();
        let err = allow.resolve("ids; DROP TABLE ids").unwrap_err();
        assert!(matches!(err, RelayError::Configuration(_)));
        assert!(allow.resolve("IDS").is_err());
        assert!(allow.resolve(" ids").is_err());
    }

    #[test]
    fn test_restriction_only_narrows_builtin_list() {
        let allow = AllowList::restricted_to(["ids", " temperature_readings ", "greenhouse", "bad name", ""]);
        assert_eq!(allow.len(), 2);
        assert!(allow.permits("ids"));
        assert!(allow.permits("temperature_readings"));
        assert!(!allow.permits("temperatures"));
        assert!(!allow.permits("greenhouse"));
        assert!(allow.resolve("greenhouse").is_err());
    }

    #[test]
    fn test_restriction_to_nothing_permits_nothing() {
        let allow = AllowList::restricted_to(["users", "accounts"]);
        assert!(allow.is_empty());
        assert!(allow.resolve("ids").is_err());
    }

    #[test]
    fn test_random_names_outside_list_never_resolve() {
        let allow = AllowList::default();
        let alphabet: Vec<char> = "abcdefghijklmnopqrstuvwxyz_;' \"-0123456789".chars().collect();
        let mut rng = rand::rng();
        for _ in 0..2_000 {
            let len = rng.random_range(1..12);
            let candidate: String = (0..len)
                .map(|_| alphabet[rng.random_range(0..alphabet.len())])
                .collect();
            let resolved = allow.resolve(&candidate);
            assert_eq!(resolved.is_ok(), DEFAULT_ALLOWED_STREAMS.contains(&candidate.as_str()));
        }
    }

    #[test]
    fn test_binding_degrades_to_disabled() {
        let allow = AllowList::default();
        let on = StreamBinding::resolve(StreamKind::Temperature, Some("temperature"), &allow);
        let off = StreamBinding::resolve(StreamKind::Id, Some("users"), &allow);
        let missing = StreamBinding::resolve(StreamKind::Id, None, &allow);
        let blank = StreamBinding::resolve(StreamKind::Id, Some("   "), &allow);
        assert!(on.is_enabled());
        assert!(!off.is_enabled());
        assert!(!missing.is_enabled());
        assert!(!blank.is_enabled());
    }

    #[test]
    fn test_wire_types() {
        assert_eq!(StreamKind::Temperature.wire_type(), "temperature_update");
        assert_eq!(StreamKind::Id.wire_type(), "id_update");
    }
}
