//! Property-based test generators using proptest.
//!
//! Every generated row has at least one non-null field, so it never reads
//! as a tombstone.

use proptest::prelude::*;
use syncdb_protocol::{is_reserved_field, Fields, RecordChange, RowState, Value};

/// Strategy for valid record ids.
pub fn record_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9-]{0,11}").expect("Invalid regex")
}

/// Strategy for ids drawn from a pool of `size` ids, so writes collide.
pub fn pooled_id_strategy(size: usize) -> impl Strategy<Value = String> {
    (0..size.max(1)).prop_map(|i| format!("id-{i}"))
}

/// Strategy for a non-null field value.
pub fn field_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(Value::from),
        any::<bool>().prop_map(Value::from),
        prop::string::string_regex("[a-zA-Z0-9 ]{0,16}")
            .expect("Invalid regex")
            .prop_map(Value::from),
    ]
}

/// Strategy for a live row with one to three fields.
pub fn fields_strategy() -> impl Strategy<Value = Fields> {
    prop::collection::btree_map(
        prop::string::string_regex("[a-z]{1,8}")
            .expect("Invalid regex")
            .prop_filter("reserved field name", |name| !is_reserved_field(name)),
        field_value_strategy(),
        1..4,
    )
    .prop_map(|map| map.into_iter().collect())
}

/// Strategy for a row state, live three times out of four.
pub fn row_state_strategy() -> impl Strategy<Value = RowState> {
    prop_oneof![
        3 => fields_strategy().prop_map(RowState::Live),
        1 => Just(RowState::Tombstone),
    ]
}

/// Strategy for a single change.
pub fn record_change_strategy() -> impl Strategy<Value = RecordChange> {
    (record_id_strategy(), 1u64..10_000, row_state_strategy()).prop_map(
        |(id, ts, state)| RecordChange {
            id,
            last_modified: ts.into(),
            state,
        },
    )
}

/// Strategy for a batch of changes. Ids and timestamps may repeat.
pub fn change_batch_strategy(max_len: usize) -> impl Strategy<Value = Vec<RecordChange>> {
    prop::collection::vec(
        (pooled_id_strategy(4), 1u64..50, row_state_strategy()).prop_map(|(id, ts, state)| {
            RecordChange {
                id,
                last_modified: ts.into(),
                state,
            }
        }),
        0..max_len,
    )
}

/// Strategy for a write history over `ids` ids in which no two writes share
/// a timestamp, delivered in arbitrary order.
pub fn distinct_history_strategy(
    ids: usize,
    max_len: usize,
) -> impl Strategy<Value = Vec<RecordChange>> {
    (1..=max_len.max(1)).prop_flat_map(move |len| {
        (
            prop::collection::vec((pooled_id_strategy(ids), row_state_strategy()), len),
            prop::collection::btree_set(1u64..1_000_000, len),
        )
            .prop_map(|(writes, stamps)| {
                writes
                    .into_iter()
                    .zip(stamps)
                    .map(|((id, state), ts)| RecordChange {
                        id,
                        last_modified: ts.into(),
                        state,
                    })
                    .collect::<Vec<_>>()
            })
            .prop_shuffle()
    })
}

/// A local operation on one replica of a simulated network.
#[derive(Debug, Clone)]
pub enum ReplicaOp {
    /// Insert on replica `replica`.
    Insert {
        /// Replica index.
        replica: usize,
        /// Record id.
        id: String,
        /// Row.
        fields: Fields,
    },
    /// Delete on replica `replica`.
    Delete {
        /// Replica index.
        replica: usize,
        /// Record id.
        id: String,
    },
    /// Flip replica `replica` between online and offline.
    Toggle {
        /// Replica index.
        replica: usize,
    },
}

/// Strategy for a sequence of replica operations.
pub fn replica_ops_strategy(
    replicas: usize,
    max_len: usize,
) -> impl Strategy<Value = Vec<ReplicaOp>> {
    let replicas = replicas.max(1);
    let op = prop_oneof![
        4 => (0..replicas, pooled_id_strategy(5), fields_strategy())
            .prop_map(|(replica, id, fields)| ReplicaOp::Insert { replica, id, fields }),
        2 => (0..replicas, pooled_id_strategy(5))
            .prop_map(|(replica, id)| ReplicaOp::Delete { replica, id }),
        1 => (0..replicas).prop_map(|replica| ReplicaOp::Toggle { replica }),
    ];
    prop::collection::vec(op, 0..max_len)
}
