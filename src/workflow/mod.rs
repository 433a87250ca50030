//! Dependency-ordered workflow execution.
//!
//! The coordinator turns a set of inter-dependent requests into a sequence of
//! batches (topological order, priority as tie-break), drives each request
//! through optimize -> send -> extract with its own bounded retry budget, and
//! assembles a final plan from whatever succeeded. A failed request never
//! aborts the rest of the workflow.

mod types;

pub use types::{
    ImplementationRequest, ImplementationWorkflow, Priority, RequestStatus, WorkflowAdvice,
    WorkflowStatus,
};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::client::{RequestClient, RequestConfig};
use crate::config::EngineConfig;
use crate::context::{ProjectContext, ProjectContextProvider};
use crate::error::{EngineError, Result};
use crate::extractor::{build_plan, ImplementationPlan, ProcessedResponse, ResponseExtractor};
use crate::optimizer::{OptimizationTarget, RequestOptimizer};
use crate::session::{ConversationManager, SessionStatus, TurnOutcome};
use crate::storage::RecordStore;
use crate::task_type::{ComplexityLevel, TaskType};

const RECORD_KIND: &str = "workflow";
const PAUSE_POLL_SECS: u64 = 1;

pub struct WorkflowCoordinator {
    workflows: RwLock<HashMap<String, ImplementationWorkflow>>,
    client: Arc<RequestClient>,
    optimizer: Arc<RequestOptimizer>,
    extractor: ResponseExtractor,
    sessions: Arc<ConversationManager>,
    store: Arc<dyn RecordStore>,
    context_provider: Option<Arc<dyn ProjectContextProvider>>,
    config: EngineConfig,
}

impl WorkflowCoordinator {
    pub fn new(
        client: Arc<RequestClient>,
        optimizer: Arc<RequestOptimizer>,
        sessions: Arc<ConversationManager>,
        store: Arc<dyn RecordStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            workflows: RwLock::new(HashMap::new()),
            client,
            optimizer,
            extractor: ResponseExtractor::new(),
            sessions,
            store,
            context_provider: None,
            config,
        }
    }

    /// Attach a project scanner. Without one, optimization runs on an empty
    /// context for the workflow's project path.
    pub fn with_context_provider(mut self, provider: Arc<dyn ProjectContextProvider>) -> Self {
        self.context_provider = Some(provider);
        self
    }

    /// Reload workflows that were mid-run when the process stopped.
    pub async fn load_running(&self) -> Result<usize> {
        let docs = self.store.list(RECORD_KIND).await?;
        let mut restored = 0;

        let mut workflows = self.workflows.write().await;
        for doc in docs {
            match serde_json::from_value::<ImplementationWorkflow>(doc) {
                Ok(workflow) if workflow.status == WorkflowStatus::Running => {
                    debug!("Restoring running workflow {}", workflow.id);
                    workflows.insert(workflow.id.clone(), workflow);
                    restored += 1;
                }
                Ok(_) => {}
                Err(e) => warn!("Skipping undecodable workflow record: {}", e),
            }
        }

        if restored > 0 {
            info!("Restored {} running workflow(s)", restored);
        }
        Ok(restored)
    }

    /// Create a workflow and its backing conversation session.
    pub async fn create_workflow(
        &self,
        project_path: &str,
        task_description: &str,
        complexity: ComplexityLevel,
        target: OptimizationTarget,
    ) -> Result<String> {
        let (task_type, _) = TaskType::detect_from_prompt(task_description);
        let session_id = self
            .sessions
            .create_session(project_path, task_description, task_type, complexity)
            .await?;

        let workflow = ImplementationWorkflow {
            id: uuid::Uuid::new_v4().to_string(),
            project_path: project_path.to_string(),
            task_description: task_description.to_string(),
            complexity,
            target,
            requests: Vec::new(),
            completed_request_ids: Vec::new(),
            failed_request_ids: Vec::new(),
            status: WorkflowStatus::Pending,
            total_cost: 0.0,
            successful_requests: 0,
            average_response_time_ms: 0.0,
            session_id,
            final_plan: None,
        };
        let id = workflow.id.clone();

        self.persist(&workflow).await?;
        self.workflows.write().await.insert(id.clone(), workflow);

        info!("Created workflow {} for {}", id, project_path);
        Ok(id)
    }

    /// Append a request. Dependencies name other request ids in the same
    /// workflow; unknown ids are tolerated and treated as already satisfied.
    pub async fn add_request(
        &self,
        workflow_id: &str,
        prompt: &str,
        request_type: TaskType,
        priority: Priority,
        dependencies: Vec<String>,
    ) -> Result<String> {
        let snapshot = {
            let mut workflows = self.workflows.write().await;
            let workflow = workflows
                .get_mut(workflow_id)
                .ok_or_else(|| EngineError::WorkflowNotFound(workflow_id.to_string()))?;

            for dep in &dependencies {
                if !workflow.requests.iter().any(|r| &r.id == dep) {
                    warn!("Request dependency {} not found in workflow {}", dep, workflow_id);
                }
            }

            let request = ImplementationRequest {
                id: uuid::Uuid::new_v4().to_string(),
                session_id: workflow.session_id.clone(),
                prompt: prompt.to_string(),
                request_type,
                priority,
                dependencies,
                status: RequestStatus::Pending,
                retry_count: 0,
                max_retries: self.config.request_max_retries,
                cost: 0.0,
                created_at: Utc::now(),
                started_at: None,
                completed_at: None,
                last_error: None,
                response: None,
            };
            workflow.requests.push(request);
            workflow.clone()
        };

        let request_id = snapshot.requests.last().map(|r| r.id.clone()).unwrap_or_default();
        self.persist(&snapshot).await?;
        Ok(request_id)
    }

    /// Run the workflow to completion. Requests execute in dependency-ordered
    /// batches; inside a batch up to `max_concurrent` run in parallel, with
    /// `delay` applied between chunks to respect external rate limits.
    /// Completes (status `completed`) even when some requests failed.
    pub async fn execute_workflow(
        &self,
        workflow_id: &str,
        max_concurrent: Option<usize>,
        delay: Option<Duration>,
    ) -> Result<ImplementationWorkflow> {
        let max_concurrent = max_concurrent
            .unwrap_or(self.config.max_concurrent_requests)
            .max(1);
        let delay = delay.unwrap_or(Duration::from_millis(self.config.inter_request_delay_ms));

        let (batches, had_cycle) = {
            let mut workflows = self.workflows.write().await;
            let workflow = workflows
                .get_mut(workflow_id)
                .ok_or_else(|| EngineError::WorkflowNotFound(workflow_id.to_string()))?;
            if workflow.status != WorkflowStatus::Pending {
                return Err(EngineError::InvalidWorkflowState(format!(
                    "{workflow_id} is {} and cannot be started",
                    workflow.status.as_str()
                )));
            }
            workflow.status = WorkflowStatus::Running;
            plan_batches(&workflow.requests)
        };
        self.persist_current(workflow_id).await?;

        if had_cycle {
            // Broken deterministically by priority; execution continues
            warn!("{}", EngineError::CycleDetected(workflow_id.to_string()));
        }
        info!(
            "Executing workflow {} in {} batch(es), max {} concurrent",
            workflow_id,
            batches.len(),
            max_concurrent
        );

        for batch in &batches {
            if !self.wait_until_runnable(workflow_id).await? {
                return self.finish_cancelled(workflow_id).await;
            }

            for chunk in batch.chunks(max_concurrent) {
                join_all(
                    chunk
                        .iter()
                        .map(|request_id| self.run_request(workflow_id, request_id)),
                )
                .await;

                if !delay.is_zero() {
                    sleep(delay).await;
                }
            }
        }

        // A pause or cancel during the final batch still has to win: wait
        // out a pause and honor a cancellation before declaring completion.
        if !self.wait_until_runnable(workflow_id).await? {
            return self.finish_cancelled(workflow_id).await;
        }
        self.finish_completed(workflow_id).await
    }

    pub async fn pause_workflow(&self, workflow_id: &str) -> Result<()> {
        let snapshot = {
            let mut workflows = self.workflows.write().await;
            let workflow = workflows
                .get_mut(workflow_id)
                .ok_or_else(|| EngineError::WorkflowNotFound(workflow_id.to_string()))?;
            if workflow.status == WorkflowStatus::Running {
                workflow.status = WorkflowStatus::Paused;
            }
            workflow.clone()
        };
        self.persist(&snapshot).await
    }

    pub async fn resume_workflow(&self, workflow_id: &str) -> Result<()> {
        let snapshot = {
            let mut workflows = self.workflows.write().await;
            let workflow = workflows
                .get_mut(workflow_id)
                .ok_or_else(|| EngineError::WorkflowNotFound(workflow_id.to_string()))?;
            if workflow.status == WorkflowStatus::Paused {
                workflow.status = WorkflowStatus::Running;
            }
            workflow.clone()
        };
        self.persist(&snapshot).await
    }

    /// Request cancellation. Takes effect at the next batch boundary; a
    /// request already in flight runs to completion or retry exhaustion.
    pub async fn cancel_workflow(&self, workflow_id: &str) -> Result<()> {
        let snapshot = {
            let mut workflows = self.workflows.write().await;
            let workflow = workflows
                .get_mut(workflow_id)
                .ok_or_else(|| EngineError::WorkflowNotFound(workflow_id.to_string()))?;
            if !workflow.status.is_terminal() {
                workflow.status = WorkflowStatus::Cancelled;
            }
            workflow.clone()
        };
        self.persist(&snapshot).await
    }

    pub async fn get_workflow(&self, workflow_id: &str) -> Result<ImplementationWorkflow> {
        self.workflows
            .read()
            .await
            .get(workflow_id)
            .cloned()
            .ok_or_else(|| EngineError::WorkflowNotFound(workflow_id.to_string()))
    }

    /// Advisory structural analysis. Returns suggestions with rough
    /// percentage improvements; never mutates the workflow.
    pub async fn optimize_workflow(&self, workflow_id: &str) -> Result<WorkflowAdvice> {
        let workflows = self.workflows.read().await;
        let workflow = workflows
            .get(workflow_id)
            .ok_or_else(|| EngineError::WorkflowNotFound(workflow_id.to_string()))?;

        let mut advice = WorkflowAdvice::default();
        let total = workflow.requests.len();
        if total == 0 {
            return Ok(advice);
        }

        let clarifications = workflow
            .requests
            .iter()
            .filter(|r| r.request_type == TaskType::Clarification)
            .count();
        if clarifications as f64 / total as f64 > 0.3 {
            advice.suggestions.push(
                "fold clarification prompts into the task description to cut round-trips"
                    .to_string(),
            );
            advice.estimated_improvement_pct += 15.0;
        }

        let urgent = workflow
            .requests
            .iter()
            .filter(|r| r.priority >= Priority::High)
            .count();
        if total > 1 && urgent as f64 / total as f64 > 0.5 {
            advice.suggestions.push(
                "most requests share a high priority; differentiate them so batch ordering means something"
                    .to_string(),
            );
            advice.estimated_improvement_pct += 10.0;
        }

        let (_, has_cycles) = plan_batches(&workflow.requests);
        if has_cycles {
            advice.has_cycles = true;
            advice.suggestions.push(
                "dependency cycle present; it will be broken by priority, review the dependency edges"
                    .to_string(),
            );
            advice.estimated_improvement_pct += 20.0;
        }

        Ok(advice)
    }

    // ------------------------------------------------------------------
    // Execution internals
    // ------------------------------------------------------------------

    /// Drive one request through optimize -> send -> extract with its own
    /// retry budget. Failures are absorbed into the workflow counters.
    async fn run_request(&self, workflow_id: &str, request_id: &str) {
        let Some((prompt, request_type, session_id, max_retries)) =
            self.start_request(workflow_id, request_id).await
        else {
            return;
        };

        let turn_id = match self
            .sessions
            .add_turn(&session_id, request_type, &prompt)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                warn!("Could not open turn for request {}: {}", request_id, e);
                String::new()
            }
        };

        let optimized = self.build_request(workflow_id, &prompt, request_type, &session_id).await;

        let mut retry_count: u32 = 0;
        let outcome = loop {
            match self.client.send(optimized.clone()).await {
                Ok(outcome) => break Ok(outcome),
                Err(e) if retry_count < max_retries => {
                    retry_count += 1;
                    let backoff = Duration::from_secs(2u64.pow(retry_count));
                    warn!(
                        "Request {} attempt {} failed ({}), retrying in {:?}",
                        request_id, retry_count, e, backoff
                    );
                    self.bump_retry_count(workflow_id, request_id).await;
                    sleep(backoff).await;
                }
                Err(e) => break Err(e),
            }
        };

        match outcome {
            Ok(outcome) => {
                let processed = self.extractor.process(&outcome.response.text);
                let turn = TurnOutcome {
                    response: Some(outcome.response.text.clone()),
                    success: true,
                    error: None,
                    tokens_used: outcome.response.total_tokens(),
                    cost: outcome.cost,
                    model_used: Some(outcome.model_used.clone()),
                };
                if !turn_id.is_empty() {
                    if let Err(e) = self.sessions.complete_turn(&session_id, &turn_id, turn).await {
                        warn!("Could not complete turn for request {}: {}", request_id, e);
                    }
                }
                self.optimizer.record_outcome(request_type, true);
                self.finish_request_ok(workflow_id, request_id, processed, &outcome).await;
            }
            Err(e) => {
                let message = e.to_string();
                let turn = TurnOutcome {
                    success: false,
                    error: Some(message.clone()),
                    ..Default::default()
                };
                if !turn_id.is_empty() {
                    if let Err(e) = self.sessions.complete_turn(&session_id, &turn_id, turn).await {
                        warn!("Could not complete turn for request {}: {}", request_id, e);
                    }
                }
                self.optimizer.record_outcome(request_type, false);
                self.finish_request_err(workflow_id, request_id, message).await;
            }
        }
    }

    /// Mark the request running and pull what execution needs.
    async fn start_request(
        &self,
        workflow_id: &str,
        request_id: &str,
    ) -> Option<(String, TaskType, String, u32)> {
        let (snapshot, pulled) = {
            let mut workflows = self.workflows.write().await;
            let workflow = workflows.get_mut(workflow_id)?;
            let request = workflow.request_mut(request_id)?;
            if request.status != RequestStatus::Pending {
                return None;
            }
            request.status = RequestStatus::Running;
            request.started_at = Some(Utc::now());
            let pulled = (
                request.prompt.clone(),
                request.request_type,
                request.session_id.clone(),
                request.max_retries,
            );
            (workflow.clone(), pulled)
        };
        if let Err(e) = self.persist(&snapshot).await {
            warn!("Could not persist workflow {}: {}", workflow_id, e);
        }
        Some(pulled)
    }

    /// Build the provider request: conversation context as system prompt,
    /// then the optimizer shapes model/tokens/temperature.
    async fn build_request(
        &self,
        workflow_id: &str,
        prompt: &str,
        request_type: TaskType,
        session_id: &str,
    ) -> RequestConfig {
        let (project_path, complexity, target) = {
            let workflows = self.workflows.read().await;
            match workflows.get(workflow_id) {
                Some(w) => (w.project_path.clone(), w.complexity, w.target),
                None => (String::new(), ComplexityLevel::default(), OptimizationTarget::default()),
            }
        };

        let context = self
            .sessions
            .conversation_context(session_id, None)
            .await
            .unwrap_or_default();

        let project = match &self.context_provider {
            Some(provider) => match provider.project_context(&project_path).await {
                Ok(project) => project,
                Err(e) => {
                    warn!("Project context unavailable for {}: {}", project_path, e);
                    ProjectContext::new(&project_path)
                }
            },
            None => ProjectContext::new(&project_path),
        };

        let mut config = RequestConfig::new(prompt, &self.config.default_model)
            .with_task_type(request_type)
            .with_fallback(&self.config.fallback_model);
        config.complexity = complexity;
        if !context.is_empty() {
            config.system_prompt = Some(context);
        }

        self.optimizer.optimize(config, &project, target)
    }

    async fn bump_retry_count(&self, workflow_id: &str, request_id: &str) {
        let mut workflows = self.workflows.write().await;
        if let Some(request) = workflows
            .get_mut(workflow_id)
            .and_then(|w| w.request_mut(request_id))
        {
            request.retry_count += 1;
        }
    }

    async fn finish_request_ok(
        &self,
        workflow_id: &str,
        request_id: &str,
        processed: ProcessedResponse,
        outcome: &crate::client::SendOutcome,
    ) {
        let snapshot = {
            let mut workflows = self.workflows.write().await;
            let Some(workflow) = workflows.get_mut(workflow_id) else {
                return;
            };
            if let Some(request) = workflow.request_mut(request_id) {
                request.status = RequestStatus::Completed;
                request.cost = outcome.cost;
                request.completed_at = Some(Utc::now());
                request.last_error = None;
                request.response = Some(processed);
            }
            workflow.completed_request_ids.push(request_id.to_string());
            workflow.total_cost += outcome.cost;
            workflow.successful_requests += 1;
            // Running average over successful requests
            let n = workflow.successful_requests as f64;
            workflow.average_response_time_ms +=
                (outcome.elapsed_ms as f64 - workflow.average_response_time_ms) / n;
            workflow.clone()
        };
        if let Err(e) = self.persist(&snapshot).await {
            warn!("Could not persist workflow {}: {}", workflow_id, e);
        }
    }

    async fn finish_request_err(&self, workflow_id: &str, request_id: &str, message: String) {
        warn!("Request {} permanently failed: {}", request_id, message);
        let snapshot = {
            let mut workflows = self.workflows.write().await;
            let Some(workflow) = workflows.get_mut(workflow_id) else {
                return;
            };
            if let Some(request) = workflow.request_mut(request_id) {
                request.status = RequestStatus::Failed;
                request.completed_at = Some(Utc::now());
                request.last_error = Some(message);
            }
            if !workflow.failed_request_ids.iter().any(|id| id == request_id) {
                workflow.failed_request_ids.push(request_id.to_string());
            }
            workflow.clone()
        };
        if let Err(e) = self.persist(&snapshot).await {
            warn!("Could not persist workflow {}: {}", workflow_id, e);
        }
    }

    /// Block while paused; false means the workflow was cancelled.
    async fn wait_until_runnable(&self, workflow_id: &str) -> Result<bool> {
        loop {
            let status = {
                let workflows = self.workflows.read().await;
                workflows
                    .get(workflow_id)
                    .map(|w| w.status)
                    .ok_or_else(|| EngineError::WorkflowNotFound(workflow_id.to_string()))?
            };
            match status {
                WorkflowStatus::Running => return Ok(true),
                WorkflowStatus::Paused => {
                    debug!("Workflow {} paused, waiting", workflow_id);
                    sleep(Duration::from_secs(PAUSE_POLL_SECS)).await;
                }
                _ => return Ok(false),
            }
        }
    }

    async fn finish_cancelled(&self, workflow_id: &str) -> Result<ImplementationWorkflow> {
        let snapshot = {
            let mut workflows = self.workflows.write().await;
            let workflow = workflows
                .get_mut(workflow_id)
                .ok_or_else(|| EngineError::WorkflowNotFound(workflow_id.to_string()))?;
            for request in &mut workflow.requests {
                if !request.status.is_terminal() {
                    request.status = RequestStatus::Cancelled;
                }
            }
            workflow.status = WorkflowStatus::Cancelled;
            workflow.clone()
        };
        self.persist(&snapshot).await?;

        if let Err(e) = self
            .sessions
            .close_session(&snapshot.session_id, SessionStatus::Cancelled)
            .await
        {
            warn!("Could not close session {}: {}", snapshot.session_id, e);
        }
        info!("Workflow {} cancelled", workflow_id);
        Ok(snapshot)
    }

    async fn finish_completed(&self, workflow_id: &str) -> Result<ImplementationWorkflow> {
        let snapshot = {
            let mut workflows = self.workflows.write().await;
            let workflow = workflows
                .get_mut(workflow_id)
                .ok_or_else(|| EngineError::WorkflowNotFound(workflow_id.to_string()))?;
            // Cancelled is terminal and must never become completed, even
            // when the cancel landed while the last batch was in flight
            if workflow.status == WorkflowStatus::Cancelled {
                None
            } else {
                workflow.final_plan = Some(merge_final_plan(&workflow.requests));
                // Completed even with failures; partial results are the output
                workflow.status = WorkflowStatus::Completed;
                Some(workflow.clone())
            }
        };
        let Some(snapshot) = snapshot else {
            return self.finish_cancelled(workflow_id).await;
        };
        self.persist(&snapshot).await?;

        if let Some(plan) = &snapshot.final_plan {
            for phase in &plan.phases {
                if let Err(e) = self
                    .sessions
                    .mark_phase_complete(&snapshot.session_id, &phase.name)
                    .await
                {
                    warn!("Could not record phase {}: {}", phase.name, e);
                }
            }
        }

        info!(
            "Workflow {} finished: {} succeeded, {} failed, ${:.4} total",
            workflow_id,
            snapshot.successful_requests,
            snapshot.failed_request_ids.len(),
            snapshot.total_cost
        );
        Ok(snapshot)
    }

    async fn persist_current(&self, workflow_id: &str) -> Result<()> {
        let snapshot = self.get_workflow(workflow_id).await?;
        self.persist(&snapshot).await
    }

    async fn persist(&self, workflow: &ImplementationWorkflow) -> Result<()> {
        let doc = serde_json::to_value(workflow)?;
        self.store.put(RECORD_KIND, &workflow.id, &doc).await
    }
}

/// Group requests into dependency-ordered batches: each pass takes every
/// request whose dependencies are all already scheduled, sorted by priority
/// descending (creation order as tie-break). A pass with nothing ready means
/// a cycle; it is broken by force-scheduling the highest-priority remaining
/// request. Returns the batches and whether a cycle was broken.
fn plan_batches(requests: &[ImplementationRequest]) -> (Vec<Vec<String>>, bool) {
    let known: HashSet<&str> = requests.iter().map(|r| r.id.as_str()).collect();
    let mut scheduled: HashSet<String> = HashSet::new();
    let mut remaining: Vec<&ImplementationRequest> = requests.iter().collect();
    let mut batches = Vec::new();
    let mut had_cycle = false;

    while !remaining.is_empty() {
        let mut ready: Vec<&ImplementationRequest> = remaining
            .iter()
            .copied()
            .filter(|r| {
                r.dependencies
                    .iter()
                    .all(|d| scheduled.contains(d) || !known.contains(d.as_str()))
            })
            .collect();

        if ready.is_empty() {
            had_cycle = true;
            // Highest priority wins; earliest created breaks priority ties
            if let Some(forced) = remaining
                .iter()
                .copied()
                .max_by(|a, b| {
                    a.priority
                        .cmp(&b.priority)
                        .then_with(|| b.created_at.cmp(&a.created_at))
                })
            {
                ready.push(forced);
            }
        }

        ready.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });

        let batch: Vec<String> = ready.iter().map(|r| r.id.clone()).collect();
        for id in &batch {
            scheduled.insert(id.clone());
        }
        remaining.retain(|r| !scheduled.contains(&r.id));
        batches.push(batch);
    }

    (batches, had_cycle)
}

/// Merge the extracted content of every successful request, in priority
/// order, into one plan. Dependencies, file paths, commands, and validation
/// steps are de-duplicated; failed requests contribute nothing.
fn merge_final_plan(requests: &[ImplementationRequest]) -> ImplementationPlan {
    let mut successful: Vec<&ImplementationRequest> = requests
        .iter()
        .filter(|r| r.status == RequestStatus::Completed && r.response.is_some())
        .collect();
    successful.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.created_at.cmp(&b.created_at))
    });

    let mut dependencies: Vec<String> = Vec::new();
    let mut modifications = Vec::new();
    let mut seen_paths = HashSet::new();
    let mut commands = Vec::new();
    let mut seen_commands = HashSet::new();
    let mut validation_steps: Vec<String> = Vec::new();

    for request in successful {
        let Some(processed) = &request.response else {
            continue;
        };
        for dep in &processed.dependencies {
            if !dependencies.contains(dep) {
                dependencies.push(dep.clone());
            }
        }
        for modification in &processed.file_modifications {
            if seen_paths.insert(modification.path.clone()) {
                modifications.push(modification.clone());
            }
        }
        for command in &processed.commands {
            if seen_commands.insert(command.command.clone()) {
                commands.push(command.clone());
            }
        }
        for step in &processed.validation_steps {
            if !validation_steps.contains(step) {
                validation_steps.push(step.clone());
            }
        }
    }

    build_plan(&dependencies, &modifications, &commands, &validation_steps)
}
