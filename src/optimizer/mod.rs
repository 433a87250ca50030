//! RequestOptimizer: picks model/temperature/token-budget for a request.
//!
//! Pure parameter shaping, no network I/O. Strategy pass first, then two
//! always-on adjustments: context-size correction and historical smoothing.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::pricing::{cheapest_model, estimate_cost, model_for_tier, ModelTier};
use crate::client::RequestConfig;
use crate::context::{ProjectContext, TechnicalDebtLevel};
use crate::task_type::TaskType;

/// What the caller wants to optimize a request for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizationTarget {
    Speed,
    Cost,
    Quality,
    Balanced,
}

impl OptimizationTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            OptimizationTarget::Speed => "speed",
            OptimizationTarget::Cost => "cost",
            OptimizationTarget::Quality => "quality",
            OptimizationTarget::Balanced => "balanced",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "speed" | "fast" => Some(OptimizationTarget::Speed),
            "cost" | "cheap" => Some(OptimizationTarget::Cost),
            "quality" | "best" => Some(OptimizationTarget::Quality),
            "balanced" | "default" => Some(OptimizationTarget::Balanced),
            _ => None,
        }
    }
}

impl Default for OptimizationTarget {
    fn default() -> Self {
        OptimizationTarget::Balanced
    }
}

/// One optimization pass, logged for later analysis and smoothing.
#[derive(Debug, Clone, Serialize)]
pub struct OptimizationRecord {
    pub timestamp: DateTime<Utc>,
    pub task_type: TaskType,
    pub target: OptimizationTarget,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub cost_before: f64,
    pub cost_after: f64,
    /// Filled in by `record_outcome` once the request resolves
    pub success: Option<bool>,
}

/// Aggregates over all optimization calls so far.
#[derive(Debug, Clone, Serialize)]
pub struct OptimizationMetrics {
    pub total_optimizations: usize,
    pub average_cost_reduction: f64,
    pub per_target_counts: HashMap<String, usize>,
}

/// Filler phrases stripped by prompt compression, mildest first.
const FILLER_PHRASES: &[&str] = &[
    "please ",
    "could you ",
    "i would like you to ",
    "if possible, ",
    "it would be great if ",
    "kindly ",
];

/// Additional phrases the cost strategy strips on top of the base list.
const AGGRESSIVE_FILLERS: &[&str] = &[
    "make sure to ",
    "be sure to ",
    "don't forget to ",
    "as mentioned before, ",
    "in other words, ",
];

const QUALITY_SUFFIX: &str = "\n\nRequirements: production-quality code, \
explicit error handling, and a short note on edge cases considered.";

pub struct RequestOptimizer {
    history: Mutex<Vec<OptimizationRecord>>,
}

impl Default for RequestOptimizer {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestOptimizer {
    pub fn new() -> Self {
        Self {
            history: Mutex::new(Vec::new()),
        }
    }

    /// Shape a request for the given target and project signals.
    pub fn optimize(
        &self,
        config: RequestConfig,
        project: &ProjectContext,
        target: OptimizationTarget,
    ) -> RequestConfig {
        let cost_before = estimate_cost(&config.model, &config.prompt, config.max_tokens);
        let task_type = config.task_type;

        let mut optimized = match target {
            OptimizationTarget::Speed => self.apply_speed(config),
            OptimizationTarget::Cost => self.apply_cost(config),
            OptimizationTarget::Quality => self.apply_quality(config, project),
            OptimizationTarget::Balanced => self.apply_balanced(config, project),
        };

        self.apply_context_correction(&mut optimized, project);
        self.apply_historical_smoothing(&mut optimized);

        let cost_after = estimate_cost(&optimized.model, &optimized.prompt, optimized.max_tokens);
        debug!(
            "Optimized request: target={}, task={}, model={}, tokens={}, est ${:.5} -> ${:.5}",
            target.as_str(),
            task_type,
            optimized.model,
            optimized.max_tokens,
            cost_before,
            cost_after
        );

        let mut history = self.history.lock().expect("optimizer history poisoned");
        history.push(OptimizationRecord {
            timestamp: Utc::now(),
            task_type,
            target,
            model: optimized.model.clone(),
            temperature: optimized.temperature,
            max_tokens: optimized.max_tokens,
            cost_before,
            cost_after,
            success: None,
        });

        optimized
    }

    /// Record how the most recent optimization for this task type worked out.
    /// Feeds historical smoothing on later calls.
    pub fn record_outcome(&self, task_type: TaskType, success: bool) {
        let mut history = self.history.lock().expect("optimizer history poisoned");
        if let Some(record) = history
            .iter_mut()
            .rev()
            .find(|r| r.task_type == task_type && r.success.is_none())
        {
            record.success = Some(success);
        }
    }

    pub fn optimization_metrics(&self) -> OptimizationMetrics {
        let history = self.history.lock().expect("optimizer history poisoned");

        let mut per_target_counts: HashMap<String, usize> = HashMap::new();
        let mut reduction_sum = 0.0;
        for record in history.iter() {
            *per_target_counts
                .entry(record.target.as_str().to_string())
                .or_insert(0) += 1;
            if record.cost_before > 0.0 {
                reduction_sum += (record.cost_before - record.cost_after) / record.cost_before;
            }
        }

        OptimizationMetrics {
            total_optimizations: history.len(),
            average_cost_reduction: if history.is_empty() {
                0.0
            } else {
                reduction_sum / history.len() as f64
            },
            per_target_counts,
        }
    }

    // ------------------------------------------------------------------
    // Strategies
    // ------------------------------------------------------------------

    fn apply_speed(&self, mut config: RequestConfig) -> RequestConfig {
        config.model = cheapest_model().to_string();
        config.max_tokens = config.max_tokens.min(2000);
        config.temperature = (config.temperature + 0.1).min(1.0);
        config.prompt = compress_prompt(&config.prompt, false);
        config
    }

    fn apply_cost(&self, mut config: RequestConfig) -> RequestConfig {
        config.model = cheapest_model().to_string();
        config.max_tokens = config.max_tokens.min(config.task_type.cost_token_floor());
        config.temperature = (config.temperature - 0.2).max(0.0);
        config.prompt = compress_prompt(&config.prompt, true);
        config
    }

    fn apply_quality(&self, mut config: RequestConfig, project: &ProjectContext) -> RequestConfig {
        let needs_best = project.technical_debt == TechnicalDebtLevel::High
            || config.task_type == TaskType::Debugging;
        config.model = if needs_best {
            model_for_tier(ModelTier::Premium).to_string()
        } else {
            model_for_tier(ModelTier::Standard).to_string()
        };
        config.max_tokens = ((config.max_tokens as f32 * 1.5) as u32).min(8000);
        config.temperature = config.task_type.quality_temperature();
        if !config.prompt.ends_with(QUALITY_SUFFIX) {
            config.prompt.push_str(QUALITY_SUFFIX);
        }
        config
    }

    fn apply_balanced(&self, mut config: RequestConfig, _project: &ProjectContext) -> RequestConfig {
        config.model = model_for_tier(ModelTier::Standard).to_string();
        config.max_tokens =
            ((config.max_tokens as f32 * config.complexity.token_multiplier()) as u32).max(500);
        config
    }

    // ------------------------------------------------------------------
    // Always-on adjustments
    // ------------------------------------------------------------------

    /// Large projects need room for cross-file context; tiny ones don't.
    fn apply_context_correction(&self, config: &mut RequestConfig, project: &ProjectContext) {
        if project.file_count > 100 {
            config.max_tokens += 1000;
        } else if project.file_count > 0 && project.file_count < 20 {
            config.max_tokens = config.max_tokens.saturating_sub(500).max(200);
        }
        if project.is_frontend_framework() {
            config.max_tokens += 500;
        }
    }

    /// Blend in the last successful choice for the same task type.
    fn apply_historical_smoothing(&self, config: &mut RequestConfig) {
        let history = self.history.lock().expect("optimizer history poisoned");
        let prior = history
            .iter()
            .rev()
            .find(|r| r.task_type == config.task_type && r.success == Some(true));

        if let Some(prior) = prior {
            config.temperature = (config.temperature + prior.temperature) / 2.0;
            config.max_tokens = (config.max_tokens + prior.max_tokens) / 2;
        }
    }
}

/// Strip filler phrases; `aggressive` adds the cost-strategy list and
/// collapses repeated blank lines.
fn compress_prompt(prompt: &str, aggressive: bool) -> String {
    let mut result = prompt.to_string();

    for filler in FILLER_PHRASES {
        result = strip_phrase(&result, filler);
    }
    if aggressive {
        for filler in AGGRESSIVE_FILLERS {
            result = strip_phrase(&result, filler);
        }
        while result.contains("\n\n\n") {
            result = result.replace("\n\n\n", "\n\n");
        }
    }

    result
}

/// Case-insensitive removal of a phrase, preserving the rest of the text.
/// The filler lists are plain ASCII, so a matched span is all-ASCII and both
/// cut points land on char boundaries even in non-ASCII prompts.
fn strip_phrase(text: &str, phrase: &str) -> String {
    let haystack = text.as_bytes();
    let needle = phrase.as_bytes();
    if needle.is_empty() || haystack.len() < needle.len() {
        return text.to_string();
    }

    for (idx, _) in text.char_indices() {
        let end = idx + needle.len();
        if end > haystack.len() {
            break;
        }
        if haystack[idx..end].eq_ignore_ascii_case(needle) {
            let mut out = String::with_capacity(text.len() - needle.len());
            out.push_str(&text[..idx]);
            out.push_str(&text[end..]);
            // One pass per call site is enough; repeated fillers are rare
            return out;
        }
    }
    text.to_string()
}
