use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, ProviderFailure};

// =============================================================================
// Command Types
// =============================================================================

/// Kind of work a command requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Prompt a provider (named, or the fallback chain).
    LlmQuery,
    /// Retrieve passages, then answer with them as context.
    RagQuery,
    /// Ask several providers the same prompt and compare.
    CrossValidate,
}

impl Intent {
    /// Wire name of the intent.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LlmQuery => "llm_query",
            Self::RagQuery => "rag_query",
            Self::CrossValidate => "cross_validate",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Intent {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "llm_query" => Ok(Self::LlmQuery),
            "rag_query" => Ok(Self::RagQuery),
            "cross_validate" => Ok(Self::CrossValidate),
            other => Err(Error::invalid_intent(format!("unknown intent '{}'", other))),
        }
    }
}

/// Lifecycle state of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandState {
    /// Recorded, not yet picked up by a worker.
    Pending,
    /// A worker is executing the plan.
    Running,
    /// Finished with a result.
    Succeeded,
    /// Finished with an error.
    Failed,
}

impl CommandState {
    /// Whether no further transition may leave this state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for CommandState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            other => Err(Error::internal(format!("unknown command state '{}'", other))),
        }
    }
}

/// Structured failure kept on a failed command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandError {
    /// Stable error code.
    pub code: String,
    /// Human readable message.
    pub message: String,
    /// Per-provider failures, in attempt order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<ProviderFailure>,
}

impl From<&Error> for CommandError {
    fn from(error: &Error) -> Self {
        Self {
            code: error.code().to_string(),
            message: error.to_string(),
            failures: error.failures().to_vec(),
        }
    }
}

/// A tracked unit of requested work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Unique command ID.
    pub id: String,
    /// Requested intent.
    pub intent: Intent,
    /// Intent parameters (JSON object).
    pub parameters: serde_json::Value,
    /// Identity of the submitter.
    pub submitter: String,
    /// Current state.
    pub state: CommandState,
    /// Submission time.
    pub created_at: DateTime<Utc>,
    /// Time a worker picked the command up.
    pub started_at: Option<DateTime<Utc>>,
    /// Time the command reached a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
    /// Result payload, only when succeeded.
    pub result: Option<serde_json::Value>,
    /// Failure description, only when failed.
    pub error: Option<CommandError>,
}

impl Command {
    /// Create a new pending command with a fresh ID.
    pub fn new(intent: Intent, parameters: serde_json::Value, submitter: impl Into<String>) -> Self {
        Self {
            id: format!("cmd_{}", uuid::Uuid::new_v4()),
            intent,
            parameters,
            submitter: submitter.into(),
            state: CommandState::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
        }
    }

    /// Wall time between start and completion, if both are known.
    pub fn execution_ms(&self) -> Option<i64> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        }
    }
}

/// Notification emitted on every ledger transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandUpdate {
    pub id: String,
    pub state: CommandState,
}

/// Command execution KPIs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandStats {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Succeeded / (succeeded + failed), in percent.
    pub success_rate: f64,
    /// Mean execution time of finished commands.
    pub avg_execution_ms: f64,
}
