//! Protocol messages for replication.
//!
//! Every message travels inside an [`Envelope`] addressed to the stable
//! channel of one collection. The `op` tag selects the operation:
//!
//! | op                | direction          | purpose                              |
//! |-------------------|--------------------|--------------------------------------|
//! | `change`          | broadcast          | one local write, sent right away     |
//! | `sync-request`    | client → server    | push own changes, ask for theirs     |
//! | `sync-reply`      | server → client    | changes after the cursor + new cursor|
//! | `force-sync`      | any → authority    | ask for a full snapshot              |
//! | `force-sync-data` | authority → any    | the snapshot                         |
//! | `do-force-sync`   | authority → any    | "your data is suspect, force sync"   |

use crate::change::{Fields, RecordChange, RowState, Timestamp};
use serde::{Deserialize, Serialize};

/// Prefix of every collection channel name.
pub const CHANNEL_PREFIX: &str = "syncdb-";

/// Returns the channel a collection's messages are addressed to.
#[must_use]
pub fn channel_name(collection: &str) -> String {
    format!("{CHANNEL_PREFIX}{collection}")
}

/// A replication protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum SyncMessage {
    /// A single write made on the sending replica.
    Change {
        /// Record id.
        id: String,
        /// Timestamp assigned by the sender.
        #[serde(rename = "lastModified")]
        last_modified: Timestamp,
        /// New row; absent for a delete.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        row: Option<Fields>,
    },

    /// Opens a sync round.
    SyncRequest {
        /// The requester's cursor for the receiving peer.
        #[serde(rename = "lastSyncTime")]
        last_sync_time: Timestamp,
        /// The requester's own changes since its last round.
        values: Vec<RecordChange>,
    },

    /// Closes a sync round.
    SyncReply {
        /// The replier's high-water-mark, the requester's next cursor.
        #[serde(rename = "lastModified")]
        last_modified: Timestamp,
        /// The replier's changes after the requested cursor.
        values: Vec<RecordChange>,
    },

    /// Asks for a full snapshot.
    ForceSync,

    /// A full snapshot answering `force-sync`.
    ForceSyncData {
        /// Every journal entry joined with its row.
        values: Vec<RecordChange>,
    },

    /// Tells the receiver to force sync against the sender.
    DoForceSync,
}

impl SyncMessage {
    /// Builds a `change` message from a journaled change.
    #[must_use]
    pub fn change(change: RecordChange) -> Self {
        SyncMessage::Change {
            id: change.id,
            last_modified: change.last_modified,
            row: change.state.into_fields(),
        }
    }

    /// Returns the wire name of this message's operation.
    #[must_use]
    pub fn op(&self) -> &'static str {
        match self {
            SyncMessage::Change { .. } => "change",
            SyncMessage::SyncRequest { .. } => "sync-request",
            SyncMessage::SyncReply { .. } => "sync-reply",
            SyncMessage::ForceSync => "force-sync",
            SyncMessage::ForceSyncData { .. } => "force-sync-data",
            SyncMessage::DoForceSync => "do-force-sync",
        }
    }

    /// Converts a `change` message into the change it carries.
    #[must_use]
    pub fn into_record_change(self) -> Option<RecordChange> {
        match self {
            SyncMessage::Change {
                id,
                last_modified,
                row,
            } => Some(RecordChange {
                id,
                last_modified,
                state: RowState::from(row),
            }),
            _ => None,
        }
    }
}

/// A message addressed to a collection channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Channel name, see [`channel_name`].
    pub target: String,
    /// The protocol message.
    #[serde(flatten)]
    pub message: SyncMessage,
}

impl Envelope {
    /// Addresses `message` to `target`.
    pub fn new(target: impl Into<String>, message: SyncMessage) -> Self {
        Self {
            target: target.into(),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: serde_json::Value) -> Fields {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn change_with_row_shape() {
        let msg = SyncMessage::change(RecordChange::live("x", 100, row(json!({"v": 1}))));
        let encoded = serde_json::to_value(Envelope::new("syncdb-apps", msg)).unwrap();

        assert_eq!(
            encoded,
            json!({
                "target": "syncdb-apps",
                "op": "change",
                "id": "x",
                "lastModified": 100,
                "row": {"v": 1}
            })
        );
    }

    #[test]
    fn change_without_row_is_a_delete() {
        let decoded: Envelope = serde_json::from_value(json!({
            "target": "syncdb-apps", "op": "change", "id": "x", "lastModified": 90
        }))
        .unwrap();

        let change = decoded.message.into_record_change().unwrap();
        assert_eq!(change, RecordChange::tombstone("x", 90));
    }

    #[test]
    fn sync_request_shape() {
        let msg = SyncMessage::SyncRequest {
            last_sync_time: Timestamp::new(40),
            values: vec![RecordChange::live("y", 50, row(json!({"v": 2})))],
        };
        let encoded = serde_json::to_value(&msg).unwrap();

        assert_eq!(
            encoded,
            json!({
                "op": "sync-request",
                "lastSyncTime": 40,
                "values": [{"id": "y", "lastModified": 50, "v": 2}]
            })
        );
    }

    #[test]
    fn sync_reply_decodes_tombstones() {
        let msg: SyncMessage = serde_json::from_value(json!({
            "op": "sync-reply",
            "lastModified": 60,
            "values": [
                {"id": "a", "lastModified": 58, "v": 1},
                {"id": "b", "lastModified": 60, "v": null}
            ]
        }))
        .unwrap();

        match msg {
            SyncMessage::SyncReply {
                last_modified,
                values,
            } => {
                assert_eq!(last_modified, Timestamp::new(60));
                assert!(!values[0].is_tombstone());
                assert!(values[1].is_tombstone());
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn unit_operations_carry_only_the_tag() {
        let encoded =
            serde_json::to_value(Envelope::new("syncdb-devices", SyncMessage::DoForceSync))
                .unwrap();
        assert_eq!(
            encoded,
            json!({"target": "syncdb-devices", "op": "do-force-sync"})
        );

        let decoded: SyncMessage = serde_json::from_value(json!({"op": "force-sync"})).unwrap();
        assert_eq!(decoded, SyncMessage::ForceSync);
    }

    #[test]
    fn unknown_op_is_rejected() {
        let result: Result<SyncMessage, _> =
            serde_json::from_value(json!({"op": "merge-everything"}));
        assert!(result.is_err());
    }

    #[test]
    fn op_names_match_wire_tags() {
        let messages = [
            SyncMessage::change(RecordChange::tombstone("a", 1)),
            SyncMessage::SyncRequest {
                last_sync_time: Timestamp::ZERO,
                values: vec![],
            },
            SyncMessage::SyncReply {
                last_modified: Timestamp::ZERO,
                values: vec![],
            },
            SyncMessage::ForceSync,
            SyncMessage::ForceSyncData { values: vec![] },
            SyncMessage::DoForceSync,
        ];

        for msg in messages {
            let encoded = serde_json::to_value(&msg).unwrap();
            assert_eq!(encoded["op"], json!(msg.op()));
        }
    }

    #[test]
    fn channel_names_are_prefixed() {
        assert_eq!(channel_name("apps"), "syncdb-apps");
    }
}
