// src/session/types.rs
// Conversation session and turn records, serialized as-is to durable storage.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::task_type::{ComplexityLevel, TaskType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Paused => "paused",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Failed | SessionStatus::Cancelled
        )
    }
}

/// One request/response exchange. Created incomplete when the request is
/// enqueued; completion fills response/success/error/cost exactly once —
/// callers sequence completion, the type does not re-validate it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub request_type: TaskType,
    pub prompt: String,
    pub response: Option<String>,
    pub success: bool,
    pub error: Option<String>,
    pub tokens_used: u32,
    pub cost: f64,
    pub model_used: Option<String>,
}

impl ConversationTurn {
    pub fn new(request_type: TaskType, prompt: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            request_type,
            prompt: prompt.into(),
            response: None,
            success: false,
            error: None,
            tokens_used: 0,
            cost: 0.0,
            model_used: None,
        }
    }
}

/// Fields written into a turn on completion.
#[derive(Debug, Clone, Default)]
pub struct TurnOutcome {
    pub response: Option<String>,
    pub success: bool,
    pub error: Option<String>,
    pub tokens_used: u32,
    pub cost: f64,
    pub model_used: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSession {
    pub id: String,
    pub project_path: String,
    pub task_description: String,
    pub task_type: TaskType,
    pub complexity: ComplexityLevel,
    pub created_at: DateTime<Utc>,
    pub turns: Vec<ConversationTurn>,
    pub status: SessionStatus,
    pub total_cost: f64,
    pub total_tokens: u64,
    pub completed_phases: Vec<String>,
}

impl ConversationSession {
    pub fn new(
        project_path: impl Into<String>,
        task_description: impl Into<String>,
        task_type: TaskType,
        complexity: ComplexityLevel,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            project_path: project_path.into(),
            task_description: task_description.into(),
            task_type,
            complexity,
            created_at: Utc::now(),
            turns: Vec::new(),
            status: SessionStatus::Active,
            total_cost: 0.0,
            total_tokens: 0,
            completed_phases: Vec::new(),
        }
    }
}

/// Health signals derived from a session's turn history.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FlowAnalysis {
    pub total_turns: usize,
    pub success_rate: f64,
    pub turns_by_type: HashMap<String, usize>,
    pub average_turn_gap_secs: f64,
    pub detected_patterns: Vec<String>,
    pub recommendations: Vec<String>,
}
