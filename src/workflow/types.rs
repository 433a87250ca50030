// src/workflow/types.rs
// Workflow and request records. Serialized whole to durable storage on every
// mutation, so every field the executor touches lives here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::extractor::{ImplementationPlan, ProcessedResponse};
use crate::optimizer::OptimizationTarget;
use crate::task_type::{ComplexityLevel, TaskType};

/// Execution priority. Ordering matters: batch ties and cycle breaks both
/// resolve toward the higher variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Running => "running",
            RequestStatus::Paused => "paused",
            RequestStatus::Completed => "completed",
            RequestStatus::Failed => "failed",
            RequestStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestStatus::Completed | RequestStatus::Failed | RequestStatus::Cancelled
        )
    }
}

/// Workflow lifecycle: pending -> running -> {completed, failed, cancelled},
/// with running <-> paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Pending => "pending",
            WorkflowStatus::Running => "running",
            WorkflowStatus::Paused => "paused",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
            WorkflowStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::Cancelled
        )
    }
}

/// One unit of work inside a workflow. Dependencies name other request ids
/// in the same workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImplementationRequest {
    pub id: String,
    pub session_id: String,
    pub prompt: String,
    pub request_type: TaskType,
    pub priority: Priority,
    pub dependencies: Vec<String>,
    pub status: RequestStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    pub cost: f64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub response: Option<ProcessedResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImplementationWorkflow {
    pub id: String,
    pub project_path: String,
    pub task_description: String,
    pub complexity: ComplexityLevel,
    pub target: OptimizationTarget,
    pub requests: Vec<ImplementationRequest>,
    pub completed_request_ids: Vec<String>,
    pub failed_request_ids: Vec<String>,
    pub status: WorkflowStatus,
    pub total_cost: f64,
    pub successful_requests: usize,
    pub average_response_time_ms: f64,
    pub session_id: String,
    pub final_plan: Option<ImplementationPlan>,
}

impl ImplementationWorkflow {
    pub fn request(&self, request_id: &str) -> Option<&ImplementationRequest> {
        self.requests.iter().find(|r| r.id == request_id)
    }

    pub(super) fn request_mut(&mut self, request_id: &str) -> Option<&mut ImplementationRequest> {
        self.requests.iter_mut().find(|r| r.id == request_id)
    }

    /// Done means every request reached a terminal state.
    pub fn is_done(&self) -> bool {
        self.requests.iter().all(|r| r.status.is_terminal())
    }
}

/// Advisory output of workflow analysis. Never applied automatically.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkflowAdvice {
    pub suggestions: Vec<String>,
    pub estimated_improvement_pct: f64,
    pub has_cycles: bool,
}
