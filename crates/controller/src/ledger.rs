//! Command ledger: authoritative lifecycle state of every command.
//!
//! Transitions run `Pending -> Running -> {Succeeded, Failed}` and are
//! compare-and-set: a transition from the wrong state is refused and changes
//! nothing. Each accepted transition is appended to the record store and
//! broadcast to subscribers.
//!
//! Only live commands stay in memory. A terminal command leaves the map once
//! its final snapshot is persisted and is served from the store afterwards.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

use citydesk_core::{
    traits::{RecordFilter, RecordStore},
    types::{Command, CommandError, CommandState, CommandStats, CommandUpdate},
    Error, Result,
};
use citydesk_governance::track_command;

const UPDATE_CHANNEL_CAPACITY: usize = 1024;

pub struct CommandLedger {
    commands: DashMap<String, Command>,
    store: Arc<dyn RecordStore>,
    updates: broadcast::Sender<CommandUpdate>,
}

impl CommandLedger {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            commands: DashMap::new(),
            store,
            updates,
        }
    }

    /// Receive a notification for every transition.
    pub fn subscribe(&self) -> broadcast::Receiver<CommandUpdate> {
        self.updates.subscribe()
    }

    /// Record a new pending command.
    pub async fn create(&self, command: Command) -> Result<Command> {
        if command.state != CommandState::Pending {
            return Err(Error::internal(format!(
                "command {} created in state {}",
                command.id, command.state
            )));
        }
        if self.commands.contains_key(&command.id) {
            return Err(Error::internal(format!("duplicate command id {}", command.id)));
        }

        self.commands.insert(command.id.clone(), command.clone());
        self.published(&command).await;
        Ok(command)
    }

    /// Snapshot of a command; finished commands and those from before a
    /// restart come from the record store.
    pub async fn get(&self, id: &str) -> Result<Command> {
        if let Some(command) = self.commands.get(id) {
            return Ok(command.clone());
        }
        self.stored(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("command '{}'", id)))
    }

    async fn stored(&self, id: &str) -> Result<Option<Command>> {
        let filter = RecordFilter {
            command_id: Some(id.to_string()),
            latest_only: true,
            ..Default::default()
        };
        Ok(self.store.query_records(&filter).await?.pop())
    }

    /// Outcome of a transition on a command that is not live: refused when
    /// the store knows it, NotFound otherwise.
    async fn refuse_unless_stored(&self, id: &str) -> Result<bool> {
        match self.stored(id).await? {
            Some(command) => {
                tracing::debug!(command_id = id, state = %command.state, "Transition refused");
                Ok(false)
            }
            None => Err(Error::not_found(format!("command '{}'", id))),
        }
    }

    /// Move a command from Pending to Running.
    ///
    /// Returns false when the command is not Pending.
    pub async fn mark_running(&self, id: &str) -> Result<bool> {
        let snapshot = {
            let Some(mut entry) = self.commands.get_mut(id) else {
                return self.refuse_unless_stored(id).await;
            };
            if entry.state != CommandState::Pending {
                tracing::debug!(command_id = id, state = %entry.state, "Start refused");
                return Ok(false);
            }
            entry.state = CommandState::Running;
            entry.started_at = Some(Utc::now());
            entry.clone()
        };

        self.published(&snapshot).await;
        Ok(true)
    }

    /// Move a command from Running to Succeeded or Failed.
    ///
    /// Returns false, leaving the command untouched, when it is not Running.
    pub async fn finish(
        &self,
        id: &str,
        outcome: std::result::Result<Value, CommandError>,
    ) -> Result<bool> {
        let snapshot = {
            let Some(mut entry) = self.commands.get_mut(id) else {
                return self.refuse_unless_stored(id).await;
            };
            if entry.state != CommandState::Running {
                tracing::debug!(command_id = id, state = %entry.state, "Completion refused");
                return Ok(false);
            }
            match outcome {
                Ok(result) => {
                    entry.state = CommandState::Succeeded;
                    entry.result = Some(result);
                }
                Err(error) => {
                    entry.state = CommandState::Failed;
                    entry.error = Some(error);
                }
            }
            entry.completed_at = Some(Utc::now());
            entry.clone()
        };

        self.published(&snapshot).await;
        Ok(true)
    }

    /// Persist and announce a transition. A command whose snapshot could not
    /// be persisted stays in memory, even when terminal.
    async fn published(&self, command: &Command) {
        match self.store.append_record(command).await {
            Ok(()) if command.state.is_terminal() => {
                self.commands.remove(&command.id);
            }
            Ok(()) => {}
            Err(e) => {
                tracing::error!(command_id = %command.id, error = %e, "Failed to persist command record");
            }
        }
        track_command(command.intent.as_str(), command.state.as_str());
        tracing::info!(
            command_id = %command.id,
            intent = %command.intent,
            state = %command.state,
            "Command transition"
        );
        // No subscribers is fine.
        let _ = self.updates.send(CommandUpdate {
            id: command.id.clone(),
            state: command.state,
        });
    }

    /// Query persisted records.
    pub async fn records(&self, filter: &RecordFilter) -> Result<Vec<Command>> {
        self.store.query_records(filter).await
    }

    /// KPIs over every recorded command, or those created since `since`.
    ///
    /// Live commands and unpersisted ones come from memory, the rest from the
    /// newest stored snapshot.
    pub async fn stats(&self, since: Option<DateTime<Utc>>) -> Result<CommandStats> {
        let filter = RecordFilter {
            since,
            latest_only: true,
            ..Default::default()
        };
        let mut latest: HashMap<String, Command> = self
            .store
            .query_records(&filter)
            .await?
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect();
        for entry in self.commands.iter() {
            if filter.matches(entry.value()) {
                latest.insert(entry.key().clone(), entry.value().clone());
            }
        }

        let mut stats = CommandStats::default();
        let mut total_ms = 0i64;
        let mut timed = 0usize;

        for command in latest.values() {
            stats.total += 1;
            match command.state {
                CommandState::Pending => stats.pending += 1,
                CommandState::Running => stats.running += 1,
                CommandState::Succeeded => stats.succeeded += 1,
                CommandState::Failed => stats.failed += 1,
            }
            if let Some(ms) = command.execution_ms() {
                total_ms += ms;
                timed += 1;
            }
        }

        let finished = stats.succeeded + stats.failed;
        if finished > 0 {
            stats.success_rate = stats.succeeded as f64 / finished as f64 * 100.0;
        }
        if timed > 0 {
            stats.avg_execution_ms = total_ms as f64 / timed as f64;
        }
        Ok(stats)
    }
}
