#![deny(unused)]
//! Persistence for CityDesk.
//!
//! This crate provides the append-only command record stores (in-memory and
//! SQLite) and the in-memory passage retriever used by `rag_query` commands.

pub mod memory;
pub mod retrieval;
pub mod sqlite;

use std::collections::HashSet;

use citydesk_core::{traits::RecordFilter, types::Command};

pub use memory::InMemoryRecordStore;
pub use retrieval::InMemoryRetriever;
pub use sqlite::SqliteRecordStore;

/// Apply `filter` to records held in append order.
///
/// With `latest_only`, older snapshots of a command are dropped before the
/// field filters run. `limit` keeps the newest matches; the result stays in
/// append order.
pub fn apply_filter(records: &[Command], filter: &RecordFilter) -> Vec<Command> {
    let mut seen = HashSet::new();
    let mut selected: Vec<&Command> = Vec::new();

    for record in records.iter().rev() {
        if filter.latest_only && !seen.insert(record.id.as_str()) {
            continue;
        }
        if filter.matches(record) {
            selected.push(record);
        }
        if filter.limit.is_some_and(|limit| selected.len() >= limit) {
            break;
        }
    }

    selected.into_iter().rev().cloned().collect()
}
