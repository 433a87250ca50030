//! Provider boundary: the single "create completion" call shape.
//!
//! The orchestration layer only cares about six logical fields on the wire;
//! anything provider-specific rides in the `extra` side-map untouched.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

mod http;

pub use http::HttpProvider;

/// One completion request as the orchestration layer sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub system_prompt: Option<String>,
    pub user_prompt: String,
    /// Provider-specific passthrough fields (verbosity, reasoning effort, ...)
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            max_tokens: 2000,
            temperature: 0.3,
            system_prompt: None,
            user_prompt: user_prompt.into(),
            extra: Map::new(),
        }
    }
}

/// One completion response, reduced to the fields the engine consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub text: String,
    /// Model the provider actually served (may differ from requested)
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl CompletionResponse {
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// Anything that can execute one completion request. The HTTP implementation
/// talks to the real provider; tests substitute scripted implementations.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse>;
}
