//! Audit persistence traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{Command, CommandState, Intent};

/// Filter for querying command records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordFilter {
    pub command_id: Option<String>,
    pub submitter: Option<String>,
    pub intent: Option<Intent>,
    pub state: Option<CommandState>,
    /// Keep only commands created at or after this instant.
    pub since: Option<DateTime<Utc>>,
    /// Return only the newest record per command; field filters then apply
    /// to that newest record.
    #[serde(default)]
    pub latest_only: bool,
    pub limit: Option<usize>,
}

impl RecordFilter {
    /// Filter on a single command.
    pub fn command(id: impl Into<String>) -> Self {
        Self {
            command_id: Some(id.into()),
            ..Default::default()
        }
    }

    /// Whether a record passes the field filters.
    pub fn matches(&self, record: &Command) -> bool {
        self.command_id.as_ref().map_or(true, |id| &record.id == id)
            && self.submitter.as_ref().map_or(true, |s| &record.submitter == s)
            && self.intent.map_or(true, |i| record.intent == i)
            && self.state.map_or(true, |s| record.state == s)
            && self.since.map_or(true, |since| record.created_at >= since)
    }
}

/// Append-only store of command snapshots.
///
/// Every ledger transition appends one snapshot; records come back in append
/// order.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Append a snapshot.
    async fn append_record(&self, record: &Command) -> Result<()>;

    /// Query snapshots, oldest first.
    async fn query_records(&self, filter: &RecordFilter) -> Result<Vec<Command>>;
}
