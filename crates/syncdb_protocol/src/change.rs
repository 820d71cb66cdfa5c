//! Journaled changes exchanged between replicas.

use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::ser::{self, SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub use serde_json::Value;

/// Named fields of a record, ordered by field name.
pub type Fields = serde_json::Map<String, Value>;

/// Key carrying the record id in a change record.
const ID_KEY: &str = "id";
/// Key carrying the journal timestamp in a change record.
const LAST_MODIFIED_KEY: &str = "lastModified";

/// Millisecond timestamp assigned by the writing replica.
///
/// Timestamps order writes to the same id: the greater one wins. `ZERO`
/// is the "never synced" cursor.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// The zero timestamp, older than every write.
    pub const ZERO: Self = Self(0);

    /// Creates a new timestamp from milliseconds.
    #[must_use]
    pub const fn new(millis: u64) -> Self {
        Self(millis)
    }

    /// Returns the raw millisecond value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the next timestamp.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl From<u64> for Timestamp {
    fn from(millis: u64) -> Self {
        Self(millis)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t:{}", self.0)
    }
}

/// State of a record after a journaled write.
#[derive(Debug, Clone, PartialEq)]
pub enum RowState {
    /// The record exists with these fields.
    Live(Fields),
    /// The record was deleted; only its journal entry remains.
    Tombstone,
}

impl RowState {
    /// Returns true for a tombstone.
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        matches!(self, RowState::Tombstone)
    }

    /// Returns the fields of a live row.
    #[must_use]
    pub fn fields(&self) -> Option<&Fields> {
        match self {
            RowState::Live(fields) => Some(fields),
            RowState::Tombstone => None,
        }
    }

    /// Converts into the fields of a live row.
    #[must_use]
    pub fn into_fields(self) -> Option<Fields> {
        match self {
            RowState::Live(fields) => Some(fields),
            RowState::Tombstone => None,
        }
    }
}

impl From<Option<Fields>> for RowState {
    fn from(fields: Option<Fields>) -> Self {
        fields.map_or(RowState::Tombstone, RowState::Live)
    }
}

/// A journal entry joined with the row it describes.
///
/// On the wire a change is a flat object
/// `{id, lastModified, field1, ..., fieldN}`. A tombstone carries no
/// fields; on decode, a record whose fields are all `null` is also read
/// as a tombstone.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordChange {
    /// Caller-chosen record id.
    pub id: String,
    /// Timestamp assigned by the replica that accepted the write.
    pub last_modified: Timestamp,
    /// Row after the write.
    pub state: RowState,
}

impl RecordChange {
    /// Creates a change describing an upsert.
    pub fn live(id: impl Into<String>, last_modified: impl Into<Timestamp>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            last_modified: last_modified.into(),
            state: RowState::Live(fields),
        }
    }

    /// Creates a change describing a delete.
    pub fn tombstone(id: impl Into<String>, last_modified: impl Into<Timestamp>) -> Self {
        Self {
            id: id.into(),
            last_modified: last_modified.into(),
            state: RowState::Tombstone,
        }
    }

    /// Returns true if this change deletes the record.
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.state.is_tombstone()
    }
}

/// Returns true if `name` is one of the keys a change record uses for
/// itself (`id`, `lastModified`) and so cannot name a field.
#[must_use]
pub fn is_reserved_field(name: &str) -> bool {
    name == ID_KEY || name == LAST_MODIFIED_KEY
}

/// Returns true if a live row cannot be told apart from a tombstone on
/// the wire.
#[must_use]
pub fn reads_as_tombstone(fields: &Fields) -> bool {
    fields.values().all(Value::is_null)
}

impl Serialize for RecordChange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let field_count = self.state.fields().map_or(0, |f| f.len());
        let mut map = serializer.serialize_map(Some(2 + field_count))?;
        map.serialize_entry(ID_KEY, &self.id)?;
        map.serialize_entry(LAST_MODIFIED_KEY, &self.last_modified)?;
        if let RowState::Live(fields) = &self.state {
            for (name, value) in fields {
                if is_reserved_field(name) {
                    return Err(ser::Error::custom(format!(
                        "field '{name}' of '{}' collides with a change key",
                        self.id
                    )));
                }
                map.serialize_entry(name, value)?;
            }
        }
        map.end()
    }
}

/// Reads a flat change record, rejecting repeated keys.
struct UniqueKeys;

impl<'de> Visitor<'de> for UniqueKeys {
    type Value = BTreeMap<String, Value>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a change record map")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut raw = BTreeMap::new();
        while let Some((key, value)) = access.next_entry::<String, Value>()? {
            if raw.contains_key(&key) {
                return Err(de::Error::custom(format!("duplicate key '{key}' in change")));
            }
            raw.insert(key, value);
        }
        Ok(raw)
    }
}

impl<'de> Deserialize<'de> for RecordChange {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut raw = deserializer.deserialize_map(UniqueKeys)?;

        let id = match raw.remove(ID_KEY) {
            Some(Value::String(id)) => id,
            Some(other) => {
                return Err(de::Error::custom(format!(
                    "change id must be a string, got {other}"
                )))
            }
            None => return Err(de::Error::missing_field(ID_KEY)),
        };

        let last_modified = match raw.remove(LAST_MODIFIED_KEY) {
            Some(value) => value.as_u64().map(Timestamp).ok_or_else(|| {
                de::Error::custom(format!(
                    "lastModified must be a non-negative integer, got {value}"
                ))
            })?,
            None => return Err(de::Error::missing_field(LAST_MODIFIED_KEY)),
        };

        let fields: Fields = raw.into_iter().collect();
        let state = if reads_as_tombstone(&fields) {
            RowState::Tombstone
        } else {
            RowState::Live(fields)
        };

        Ok(Self {
            id,
            last_modified,
            state,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn repeated_key_is_rejected() {
        let err = serde_json::from_str::<RecordChange>(
            r#"{"id":"x","lastModified":5,"id":"other","v":1}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate key 'id'"));
    }

    #[test]
    fn reserved_field_name_is_not_encoded() {
        let change = RecordChange::live("x", 5, fields(json!({"id": "other", "v": 1})));
        assert!(serde_json::to_string(&change).is_err());
        assert!(is_reserved_field("lastModified"));
        assert!(!is_reserved_field("v"));
    }

    #[test]
    fn live_change_is_flat_on_the_wire() {
        let change = RecordChange::live("app-1", 100, fields(json!({"code": "x", "state": 2})));
        let encoded = serde_json::to_value(&change).unwrap();

        assert_eq!(
            encoded,
            json!({"id": "app-1", "lastModified": 100, "code": "x", "state": 2})
        );
    }

    #[test]
    fn tombstone_carries_only_key_and_timestamp() {
        let change = RecordChange::tombstone("app-1", 120);
        let encoded = serde_json::to_value(&change).unwrap();

        assert_eq!(encoded, json!({"id": "app-1", "lastModified": 120}));
    }

    #[test]
    fn all_null_fields_decode_as_tombstone() {
        let decoded: RecordChange = serde_json::from_value(json!({
            "id": "dev-7", "lastModified": 55, "kind": null, "state": null
        }))
        .unwrap();

        assert_eq!(decoded, RecordChange::tombstone("dev-7", 55));
    }

    #[test]
    fn one_non_null_field_keeps_row_live() {
        let decoded: RecordChange = serde_json::from_value(json!({
            "id": "dev-7", "lastModified": 55, "kind": null, "state": "{}"
        }))
        .unwrap();

        let row = decoded.state.fields().unwrap();
        assert_eq!(row.len(), 2);
        assert_eq!(row["state"], json!("{}"));
    }

    #[test]
    fn missing_id_is_rejected() {
        let result: Result<RecordChange, _> =
            serde_json::from_value(json!({"lastModified": 1, "v": 1}));
        assert!(result.is_err());
    }

    #[test]
    fn negative_timestamp_is_rejected() {
        let result: Result<RecordChange, _> =
            serde_json::from_value(json!({"id": "a", "lastModified": -4}));
        assert!(result.is_err());
    }

    #[test]
    fn timestamp_ordering_and_next() {
        assert!(Timestamp::new(5) > Timestamp::ZERO);
        assert_eq!(Timestamp::new(5).next(), Timestamp::new(6));
        assert_eq!(Timestamp::new(u64::MAX).next(), Timestamp::new(u64::MAX));
        assert_eq!(Timestamp::new(42).to_string(), "t:42");
    }

    #[test]
    fn row_state_from_option() {
        assert!(RowState::from(None).is_tombstone());
        assert!(!RowState::from(Some(Fields::new())).is_tombstone());
    }
}
