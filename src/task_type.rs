//! Task type classification for request routing
//!
//! Classifies prompts into task types to drive:
//! - Token floors and temperature per optimization strategy
//! - Model tier selection
//! - The next-action decision table in conversation flow

use serde::{Deserialize, Serialize};

/// What a single request (or a whole session) is trying to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    /// Writing or changing code
    Implementation,
    /// Confirming that earlier work behaves as intended
    Validation,
    /// Asking the model to explain or disambiguate
    Clarification,
    /// Investigating errors and failures
    Debugging,
    /// Performance or cost tuning of existing code
    Optimization,
    /// Writing or running tests
    Testing,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Implementation => "implementation",
            TaskType::Validation => "validation",
            TaskType::Clarification => "clarification",
            TaskType::Debugging => "debugging",
            TaskType::Optimization => "optimization",
            TaskType::Testing => "testing",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "implementation" | "implement" | "feature" => Some(TaskType::Implementation),
            "validation" | "validate" | "verify" => Some(TaskType::Validation),
            "clarification" | "clarify" | "question" => Some(TaskType::Clarification),
            "debugging" | "debug" | "fix" => Some(TaskType::Debugging),
            "optimization" | "optimize" => Some(TaskType::Optimization),
            "testing" | "test" => Some(TaskType::Testing),
            _ => None,
        }
    }

    /// Detect task type from a prompt using keyword matching.
    /// Returns (task_type, confidence) where confidence is the match count.
    pub fn detect_from_prompt(prompt: &str) -> (TaskType, f32) {
        let prompt_lower = prompt.to_lowercase();

        let patterns: &[(TaskType, &[&str])] = &[
            (TaskType::Debugging, &[
                "error", "fail", "bug", "fix", "broken", "crash", "issue", "wrong",
                "not working", "doesn't work", "exception", "panic", "stack trace",
            ]),
            (TaskType::Testing, &[
                "test", "unit test", "integration test", "coverage", "assert",
                "test case", "regression",
            ]),
            (TaskType::Optimization, &[
                "optimize", "slow", "performance", "speed up", "memory usage",
                "reduce cost", "profil",
            ]),
            (TaskType::Validation, &[
                "verify", "validate", "confirm", "check that", "make sure",
                "does it work",
            ]),
            (TaskType::Clarification, &[
                "what is", "what does", "explain", "clarify", "why does",
                "how does", "which",
            ]),
            (TaskType::Implementation, &[
                "add", "implement", "create", "build", "write", "make",
                "develop", "introduce", "support",
            ]),
        ];

        let mut best_match = (TaskType::Implementation, 0.0);

        for (task_type, keywords) in patterns {
            let match_count = keywords
                .iter()
                .filter(|kw| prompt_lower.contains(*kw))
                .count() as f32;

            if match_count > best_match.1 {
                best_match = (*task_type, match_count);
            }
        }

        if best_match.1 == 0.0 {
            // Questions read as clarification, everything else as implementation
            if prompt.trim_end().ends_with('?') {
                return (TaskType::Clarification, 0.5);
            }
            return (TaskType::Implementation, 0.5);
        }

        best_match
    }

    /// Minimum output-token floor applied by the `cost` strategy.
    pub fn cost_token_floor(&self) -> u32 {
        match self {
            TaskType::Debugging => 1000,
            TaskType::Implementation => 1500,
            TaskType::Testing => 800,
            TaskType::Validation | TaskType::Clarification | TaskType::Optimization => 600,
        }
    }

    /// Temperature applied by the `quality` strategy.
    pub fn quality_temperature(&self) -> f32 {
        match self {
            TaskType::Debugging => 0.1,
            TaskType::Implementation => 0.2,
            TaskType::Optimization => 0.2,
            TaskType::Testing => 0.1,
            TaskType::Validation => 0.1,
            TaskType::Clarification => 0.3,
        }
    }

    /// Natural successor in a conversation: what to do after a successful
    /// turn of this type. Anything not listed falls through to follow-up.
    pub fn next_action_after(&self) -> &'static str {
        match self {
            TaskType::Implementation => "validation",
            TaskType::Clarification => "implementation",
            TaskType::Debugging => "validation",
            TaskType::Optimization => "validation",
            TaskType::Testing => "validation",
            TaskType::Validation => "follow_up",
        }
    }
}

impl Default for TaskType {
    fn default() -> Self {
        TaskType::Implementation
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rough size of the overall task, supplied by the caller (or derived from
/// project signals upstream). Nudges token budgets in the optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplexityLevel {
    Simple,
    Moderate,
    Complex,
}

impl ComplexityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplexityLevel::Simple => "simple",
            ComplexityLevel::Moderate => "moderate",
            ComplexityLevel::Complex => "complex",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "simple" | "low" => Some(ComplexityLevel::Simple),
            "moderate" | "medium" => Some(ComplexityLevel::Moderate),
            "complex" | "high" => Some(ComplexityLevel::Complex),
            _ => None,
        }
    }

    /// Token-budget multiplier used by the balanced strategy.
    pub fn token_multiplier(&self) -> f32 {
        match self {
            ComplexityLevel::Simple => 0.8,
            ComplexityLevel::Moderate => 1.0,
            ComplexityLevel::Complex => 1.3,
        }
    }
}

impl Default for ComplexityLevel {
    fn default() -> Self {
        ComplexityLevel::Moderate
    }
}
