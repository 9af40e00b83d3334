//! In-memory command record store.

use async_trait::async_trait;
use tokio::sync::RwLock;

use citydesk_core::{
    traits::{RecordFilter, RecordStore},
    types::Command,
    Result,
};

use crate::apply_filter;

/// Record store kept in process memory; contents are lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: RwLock<Vec<Command>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored snapshots.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn append_record(&self, record: &Command) -> Result<()> {
        self.records.write().await.push(record.clone());
        Ok(())
    }

    async fn query_records(&self, filter: &RecordFilter) -> Result<Vec<Command>> {
        let records = self.records.read().await;
        Ok(apply_filter(&records, filter))
    }
}
