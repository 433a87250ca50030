//! Multi-turn conversation tracking.
//!
//! `ConversationManager` owns the in-memory working set of active sessions
//! and rewrites each session's durable record on every mutation. On startup
//! only sessions still marked `active` are reloaded; closed sessions stay on
//! disk for later inspection.

mod types;

pub use types::{
    ConversationSession, ConversationTurn, FlowAnalysis, SessionStatus, TurnOutcome,
};

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::storage::RecordStore;
use crate::task_type::{ComplexityLevel, TaskType};

const RECORD_KIND: &str = "session";

pub struct ConversationManager {
    sessions: RwLock<HashMap<String, ConversationSession>>,
    store: Arc<dyn RecordStore>,
    context_max_turns: usize,
    preview_chars: usize,
}

impl ConversationManager {
    pub fn new(store: Arc<dyn RecordStore>, config: &EngineConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            store,
            context_max_turns: config.context_max_turns,
            preview_chars: config.context_preview_chars,
        }
    }

    /// Reload active sessions from durable storage into the working set.
    /// Returns how many were restored.
    pub async fn load_active(&self) -> Result<usize> {
        let docs = self.store.list(RECORD_KIND).await?;
        let mut restored = 0;

        let mut sessions = self.sessions.write().await;
        for doc in docs {
            match serde_json::from_value::<ConversationSession>(doc) {
                Ok(session) if session.status == SessionStatus::Active => {
                    debug!("Restoring active session {}", session.id);
                    sessions.insert(session.id.clone(), session);
                    restored += 1;
                }
                Ok(_) => {}
                Err(e) => warn!("Skipping undecodable session record: {}", e),
            }
        }

        if restored > 0 {
            info!("Restored {} active session(s)", restored);
        }
        Ok(restored)
    }

    pub async fn create_session(
        &self,
        project_path: &str,
        task_description: &str,
        task_type: TaskType,
        complexity: ComplexityLevel,
    ) -> Result<String> {
        let session = ConversationSession::new(project_path, task_description, task_type, complexity);
        let id = session.id.clone();

        self.persist(&session).await?;
        self.sessions.write().await.insert(id.clone(), session);

        info!("Created session {} for {}", id, project_path);
        Ok(id)
    }

    /// Append an incomplete turn and return its id.
    pub async fn add_turn(
        &self,
        session_id: &str,
        request_type: TaskType,
        prompt: &str,
    ) -> Result<String> {
        let snapshot = {
            let mut sessions = self.sessions.write().await;
            let session = sessions
                .get_mut(session_id)
                .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))?;

            let turn = ConversationTurn::new(request_type, prompt);
            session.turns.push(turn);
            session.clone()
        };

        let turn_id = snapshot.turns.last().map(|t| t.id.clone()).unwrap_or_default();
        self.persist(&snapshot).await?;
        Ok(turn_id)
    }

    /// Fill a turn's outcome and roll its cost/tokens into the session totals.
    pub async fn complete_turn(
        &self,
        session_id: &str,
        turn_id: &str,
        outcome: TurnOutcome,
    ) -> Result<()> {
        let snapshot = {
            let mut sessions = self.sessions.write().await;
            let session = sessions
                .get_mut(session_id)
                .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))?;

            let turn = session
                .turns
                .iter_mut()
                .find(|t| t.id == turn_id)
                .ok_or_else(|| EngineError::RequestNotFound(format!("turn {turn_id}")))?;

            turn.response = outcome.response;
            turn.success = outcome.success;
            turn.error = outcome.error;
            turn.tokens_used = outcome.tokens_used;
            turn.cost = outcome.cost;
            turn.model_used = outcome.model_used;

            session.total_cost += outcome.cost;
            session.total_tokens += outcome.tokens_used as u64;
            session.clone()
        };

        self.persist(&snapshot).await
    }

    /// Render the most recent turns plus session metadata as a single context
    /// string. This is how multi-turn memory is carried between requests
    /// without re-sending the full history verbatim.
    pub async fn conversation_context(
        &self,
        session_id: &str,
        max_turns: Option<usize>,
    ) -> Result<String> {
        let sessions = self.sessions.read().await;
        let session = sessions
            .get(session_id)
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))?;

        let limit = max_turns.unwrap_or(self.context_max_turns);
        let mut context = format!(
            "Task: {} ({} / {})\nProject: {}\nTurns so far: {}\n",
            session.task_description,
            session.task_type.as_str(),
            session.complexity.as_str(),
            session.project_path,
            session.turns.len(),
        );

        let start = session.turns.len().saturating_sub(limit);
        for turn in &session.turns[start..] {
            context.push_str(&format!(
                "\n[{}] {}\n",
                turn.request_type.as_str(),
                truncate_preview(&turn.prompt, self.preview_chars)
            ));
            match (&turn.response, &turn.error) {
                (Some(response), _) => context.push_str(&format!(
                    "-> {}\n",
                    truncate_preview(response, self.preview_chars)
                )),
                (None, Some(error)) => context.push_str(&format!("-> failed: {error}\n")),
                (None, None) => context.push_str("-> (pending)\n"),
            }
        }

        Ok(context)
    }

    /// Derive success rate, per-type counts, turn pacing, and named patterns
    /// with their deterministic recommendations.
    pub async fn analyze_flow(&self, session_id: &str) -> Result<FlowAnalysis> {
        let sessions = self.sessions.read().await;
        let session = sessions
            .get(session_id)
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))?;

        let total = session.turns.len();
        let mut analysis = FlowAnalysis {
            total_turns: total,
            ..Default::default()
        };
        if total == 0 {
            return Ok(analysis);
        }

        let successes = session.turns.iter().filter(|t| t.success).count();
        analysis.success_rate = successes as f64 / total as f64;

        for turn in &session.turns {
            *analysis
                .turns_by_type
                .entry(turn.request_type.as_str().to_string())
                .or_insert(0) += 1;
        }

        if total > 1 {
            let gap_sum: i64 = session
                .turns
                .windows(2)
                .map(|w| (w[1].timestamp - w[0].timestamp).num_seconds())
                .sum();
            analysis.average_turn_gap_secs = gap_sum as f64 / (total - 1) as f64;
        }

        // Same-type turn immediately after a failure reads as a retry
        let retry_repeats = session
            .turns
            .windows(2)
            .filter(|w| !w[0].success && w[1].request_type == w[0].request_type)
            .count();
        if retry_repeats > 2 {
            analysis.detected_patterns.push("high_retry_rate".to_string());
            analysis.recommendations.push(
                "break the failing task into smaller, more specific requests".to_string(),
            );
        }

        let clarifications = analysis
            .turns_by_type
            .get(TaskType::Clarification.as_str())
            .copied()
            .unwrap_or(0);
        if clarifications as f64 / total as f64 > 0.3 {
            analysis
                .detected_patterns
                .push("frequent_clarifications".to_string());
            analysis.recommendations.push(
                "provide more context up front to reduce clarification round-trips".to_string(),
            );
        }

        if total > 10 {
            analysis
                .detected_patterns
                .push("extended_conversation".to_string());
            analysis.recommendations.push(
                "consider closing this session and starting a focused follow-up".to_string(),
            );
        }

        if session.total_cost > 1.0 {
            analysis
                .detected_patterns
                .push("high_cost_session".to_string());
            analysis
                .recommendations
                .push("switch remaining turns to a cheaper model tier".to_string());
        }

        Ok(analysis)
    }

    /// Decision table for what to do next:
    /// no turns yet -> implementation; last turn failed -> retry with
    /// clarification; last turn a successful validation -> complete; else the
    /// task type's natural successor.
    pub async fn suggest_next_action(&self, session_id: &str) -> Result<String> {
        let sessions = self.sessions.read().await;
        let session = sessions
            .get(session_id)
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))?;

        let Some(last) = session.turns.last() else {
            return Ok("implementation".to_string());
        };

        if !last.success && (last.response.is_some() || last.error.is_some()) {
            return Ok("retry_with_clarification".to_string());
        }
        if last.success && last.request_type == TaskType::Validation {
            return Ok("complete_session".to_string());
        }
        Ok(last.request_type.next_action_after().to_string())
    }

    /// Record that a named workflow phase has been carried out.
    pub async fn mark_phase_complete(&self, session_id: &str, phase: &str) -> Result<()> {
        let snapshot = {
            let mut sessions = self.sessions.write().await;
            let session = sessions
                .get_mut(session_id)
                .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))?;
            if !session.completed_phases.iter().any(|p| p == phase) {
                session.completed_phases.push(phase.to_string());
            }
            session.clone()
        };
        self.persist(&snapshot).await
    }

    pub async fn pause_session(&self, session_id: &str) -> Result<()> {
        self.set_status(session_id, SessionStatus::Paused).await
    }

    pub async fn resume_session(&self, session_id: &str) -> Result<()> {
        self.set_status(session_id, SessionStatus::Active).await
    }

    /// Finalize a session. It leaves the in-memory working set but the
    /// durable record stays, carrying the terminal status.
    pub async fn close_session(&self, session_id: &str, status: SessionStatus) -> Result<()> {
        let snapshot = {
            let mut sessions = self.sessions.write().await;
            let mut session = sessions
                .remove(session_id)
                .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))?;
            session.status = if status.is_terminal() {
                status
            } else {
                SessionStatus::Completed
            };
            session
        };

        info!("Closed session {} as {}", session_id, snapshot.status.as_str());
        self.persist(&snapshot).await
    }

    pub async fn get_session(&self, session_id: &str) -> Result<ConversationSession> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))
    }

    pub async fn active_session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    async fn set_status(&self, session_id: &str, status: SessionStatus) -> Result<()> {
        let snapshot = {
            let mut sessions = self.sessions.write().await;
            let session = sessions
                .get_mut(session_id)
                .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))?;
            session.status = status;
            session.clone()
        };
        self.persist(&snapshot).await
    }

    async fn persist(&self, session: &ConversationSession) -> Result<()> {
        let doc = serde_json::to_value(session)?;
        self.store.put(RECORD_KIND, &session.id, &doc).await
    }
}

fn truncate_preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    format!("{truncated}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn manager() -> ConversationManager {
        ConversationManager::new(Arc::new(MemoryStore::new()), &EngineConfig::default())
    }

    async fn session_with_turns(
        mgr: &ConversationManager,
        turns: &[(TaskType, bool)],
    ) -> String {
        let id = mgr
            .create_session("/p", "demo", TaskType::Implementation, ComplexityLevel::Moderate)
            .await
            .unwrap();
        for (task_type, success) in turns {
            let turn_id = mgr.add_turn(&id, *task_type, "prompt").await.unwrap();
            mgr.complete_turn(
                &id,
                &turn_id,
                TurnOutcome {
                    response: Some("done".to_string()),
                    success: *success,
                    tokens_used: 100,
                    cost: 0.01,
                    model_used: Some("gpt-5-mini".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        }
        id
    }

    #[tokio::test]
    async fn test_turn_lifecycle_updates_totals() {
        let mgr = manager();
        let id = session_with_turns(&mgr, &[(TaskType::Implementation, true)]).await;

        let session = mgr.get_session(&id).await.unwrap();
        assert_eq!(session.turns.len(), 1);
        assert!(session.turns[0].success);
        assert_eq!(session.total_tokens, 100);
        assert!((session.total_cost - 0.01).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_frequent_clarifications_pattern() {
        let mgr = manager();
        // 2 clarification turns out of 4 puts the ratio at 50%, over threshold
        let id = session_with_turns(
            &mgr,
            &[
                (TaskType::Implementation, true),
                (TaskType::Clarification, true),
                (TaskType::Clarification, true),
                (TaskType::Validation, true),
            ],
        )
        .await;

        let analysis = mgr.analyze_flow(&id).await.unwrap();
        assert_eq!(analysis.total_turns, 4);
        assert!(analysis
            .detected_patterns
            .contains(&"frequent_clarifications".to_string()));
        assert!(!analysis.recommendations.is_empty());
    }

    #[tokio::test]
    async fn test_extended_conversation_pattern() {
        let mgr = manager();
        let turns: Vec<(TaskType, bool)> =
            (0..11).map(|_| (TaskType::Implementation, true)).collect();
        let id = session_with_turns(&mgr, &turns).await;

        let analysis = mgr.analyze_flow(&id).await.unwrap();
        assert!(analysis
            .detected_patterns
            .contains(&"extended_conversation".to_string()));
        assert!((analysis.success_rate - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_suggest_next_action_table() {
        let mgr = manager();

        let empty = session_with_turns(&mgr, &[]).await;
        assert_eq!(mgr.suggest_next_action(&empty).await.unwrap(), "implementation");

        let after_impl = session_with_turns(&mgr, &[(TaskType::Implementation, true)]).await;
        assert_eq!(mgr.suggest_next_action(&after_impl).await.unwrap(), "validation");

        let failed = session_with_turns(&mgr, &[(TaskType::Implementation, false)]).await;
        assert_eq!(
            mgr.suggest_next_action(&failed).await.unwrap(),
            "retry_with_clarification"
        );

        let validated = session_with_turns(&mgr, &[(TaskType::Validation, true)]).await;
        assert_eq!(
            mgr.suggest_next_action(&validated).await.unwrap(),
            "complete_session"
        );
    }

    #[tokio::test]
    async fn test_context_includes_recent_turns_only() {
        let mgr = manager();
        let id = mgr
            .create_session("/p", "demo", TaskType::Implementation, ComplexityLevel::Moderate)
            .await
            .unwrap();
        for i in 0..8 {
            mgr.add_turn(&id, TaskType::Implementation, &format!("prompt number {i}"))
                .await
                .unwrap();
        }

        let context = mgr.conversation_context(&id, Some(2)).await.unwrap();
        assert!(context.contains("prompt number 7"));
        assert!(context.contains("prompt number 6"));
        assert!(!context.contains("prompt number 5"));
        assert!(context.contains("Turns so far: 8"));
    }

    #[tokio::test]
    async fn test_close_removes_from_memory_keeps_record() {
        let store = Arc::new(MemoryStore::new());
        let mgr = ConversationManager::new(store.clone(), &EngineConfig::default());
        let id = mgr
            .create_session("/p", "demo", TaskType::Implementation, ComplexityLevel::Simple)
            .await
            .unwrap();

        mgr.close_session(&id, SessionStatus::Completed).await.unwrap();
        assert!(mgr.get_session(&id).await.is_err());

        let doc = store.get(RECORD_KIND, &id).await.unwrap().unwrap();
        assert_eq!(doc["status"], "completed");
    }

    #[tokio::test]
    async fn test_reload_filters_to_active() {
        let store = Arc::new(MemoryStore::new());
        {
            let mgr = ConversationManager::new(store.clone(), &EngineConfig::default());
            let keep = mgr
                .create_session("/p", "keep", TaskType::Implementation, ComplexityLevel::Simple)
                .await
                .unwrap();
            let drop = mgr
                .create_session("/p", "drop", TaskType::Implementation, ComplexityLevel::Simple)
                .await
                .unwrap();
            mgr.close_session(&drop, SessionStatus::Failed).await.unwrap();
            assert_ne!(keep, drop);
        }

        let fresh = ConversationManager::new(store, &EngineConfig::default());
        let restored = fresh.load_active().await.unwrap();
        assert_eq!(restored, 1);
        assert_eq!(fresh.active_session_count().await, 1);
    }

    #[tokio::test]
    async fn test_pause_resume_roundtrip() {
        let mgr = manager();
        let id = session_with_turns(&mgr, &[]).await;

        mgr.pause_session(&id).await.unwrap();
        assert_eq!(mgr.get_session(&id).await.unwrap().status, SessionStatus::Paused);
        mgr.resume_session(&id).await.unwrap();
        assert_eq!(mgr.get_session(&id).await.unwrap().status, SessionStatus::Active);
    }

    #[tokio::test]
    async fn test_unknown_session_errors() {
        let mgr = manager();
        let err = mgr.add_turn("missing", TaskType::Implementation, "x").await;
        assert!(matches!(err, Err(EngineError::SessionNotFound(_))));
    }
}
