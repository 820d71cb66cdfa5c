//! Convergence assertions.

use syncdb_core::SyncTable;
use syncdb_protocol::conflict;
use syncdb_protocol::RecordChange;

/// Asserts that every table holds the same rows and journal.
///
/// Compares digests first and reports the full `get_raw()` of the first
/// mismatching pair.
pub fn assert_tables_converged(tables: &[(&str, &SyncTable)]) {
    let Some((first_name, first)) = tables.first() else {
        return;
    };
    let expected = first.digest().expect("Failed to digest collection");
    for (name, table) in &tables[1..] {
        let actual = table.digest().expect("Failed to digest collection");
        if actual != expected {
            panic!(
                "replicas diverged\n{first_name}: {:#?}\n{name}: {:#?}",
                first.get_raw(),
                table.get_raw()
            );
        }
    }
}

/// The state a set of writes must converge to: for each id, the write
/// with the greatest timestamp.
pub fn expected_state(history: &[RecordChange]) -> Vec<RecordChange> {
    conflict::project(history.iter().cloned())
}

/// Asserts that `table` holds exactly the last-writer-wins outcome of
/// `history`.
pub fn assert_last_writer_wins(table: &SyncTable, history: &[RecordChange]) {
    assert_eq!(table.get_raw(), expected_state(history));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::row;

    #[test]
    fn converged_tables_pass() {
        let a = SyncTable::in_memory("apps");
        let b = SyncTable::in_memory("apps");
        a.insert_if_recent("x", 5u64.into(), row(1)).unwrap();
        b.insert_if_recent("x", 5u64.into(), row(1)).unwrap();
        assert_tables_converged(&[("a", &a), ("b", &b)]);
        assert_tables_converged(&[]);
    }

    #[test]
    #[should_panic(expected = "replicas diverged")]
    fn diverged_tables_fail() {
        let a = SyncTable::in_memory("apps");
        let b = SyncTable::in_memory("apps");
        a.insert_if_recent("x", 5u64.into(), row(1)).unwrap();
        assert_tables_converged(&[("a", &a), ("b", &b)]);
    }

    #[test]
    fn expected_state_keeps_newest() {
        let history = vec![
            RecordChange::live("x", 7u64, row(7)),
            RecordChange::tombstone("x", 9u64),
            RecordChange::live("x", 8u64, row(8)),
        ];
        assert_eq!(expected_state(&history), vec![RecordChange::tombstone("x", 9u64)]);
    }
}
