//! # Update Events
//!
//! The payload pushed to subscribers. On the wire an event is a single UTF-8
//! JSON object, `{"type": "temperature_update" | "id_update", "data": <row>}`,
//! where `data` is the row exactly as the data source returned it.

use serde::ser::{Serialize, SerializeStruct, Serializer};
use serde_json::Value;

use crate::relay::stream::StreamKind;

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateEvent {
    pub kind: StreamKind,
    pub payload: Value,
}

impl UpdateEvent {
    pub fn new(kind: StreamKind, payload: Value) -> Self {
        Self { kind, payload }
    }

    /// Canonical wire form of the event.
    pub fn to_wire(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl Serialize for UpdateEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("UpdateEvent", 2)?;
        state.serialize_field("type", self.kind.wire_type())?;
        state.serialize_field("data", &self.payload)?;
        state.end()
    }
}
