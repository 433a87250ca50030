// src/context.rs
// Project signals consumed by the optimizer, plus the boundary traits for
// collaborators that live outside this crate (scanner, credential source).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How much accumulated debt the project carries. High debt pushes the
/// quality strategy toward the most capable model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TechnicalDebtLevel {
    Low,
    Medium,
    High,
}

impl Default for TechnicalDebtLevel {
    fn default() -> Self {
        TechnicalDebtLevel::Medium
    }
}

/// Snapshot of project metadata fed into request optimization.
/// Produced by an external scanner; this crate never walks the filesystem.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectContext {
    pub project_path: String,
    pub file_count: usize,
    pub directory_count: usize,
    /// Language name -> file count
    pub language_stats: HashMap<String, usize>,
    pub detected_framework: Option<String>,
    pub technical_debt: TechnicalDebtLevel,
}

impl ProjectContext {
    pub fn new(project_path: impl Into<String>) -> Self {
        Self {
            project_path: project_path.into(),
            ..Default::default()
        }
    }

    pub fn with_file_count(mut self, count: usize) -> Self {
        self.file_count = count;
        self
    }

    pub fn with_framework(mut self, framework: impl Into<String>) -> Self {
        self.detected_framework = Some(framework.into());
        self
    }

    pub fn with_technical_debt(mut self, level: TechnicalDebtLevel) -> Self {
        self.technical_debt = level;
        self
    }

    /// Frontend frameworks tend to produce verbose component code, which the
    /// optimizer compensates for with extra output tokens.
    pub fn is_frontend_framework(&self) -> bool {
        matches!(
            self.detected_framework.as_deref().map(|f| f.to_lowercase()),
            Some(ref f) if ["react", "vue", "svelte", "angular", "next", "nuxt"]
                .iter()
                .any(|known| f.contains(known))
        )
    }

    /// Dominant language by file count, if any stats were collected.
    pub fn primary_language(&self) -> Option<&str> {
        self.language_stats
            .iter()
            .max_by_key(|(_, count)| **count)
            .map(|(lang, _)| lang.as_str())
    }
}

/// Boundary port: something that can produce a ProjectContext for a path.
#[async_trait]
pub trait ProjectContextProvider: Send + Sync {
    async fn project_context(&self, project_path: &str) -> anyhow::Result<ProjectContext>;
}

/// Boundary port: something that can supply the provider API key.
pub trait CredentialProvider: Send + Sync {
    fn api_key(&self) -> anyhow::Result<String>;
}

/// Reads the key from an environment variable. Good enough for tests and
/// simple deployments; real installs supply their own keychain-backed impl.
pub struct EnvCredentialProvider {
    var_name: String,
}

impl EnvCredentialProvider {
    pub fn new(var_name: impl Into<String>) -> Self {
        Self {
            var_name: var_name.into(),
        }
    }
}

impl Default for EnvCredentialProvider {
    fn default() -> Self {
        Self::new("MAESTRO_API_KEY")
    }
}

impl CredentialProvider for EnvCredentialProvider {
    fn api_key(&self) -> anyhow::Result<String> {
        std::env::var(&self.var_name)
            .map_err(|_| anyhow::anyhow!("credential variable {} not set", self.var_name))
    }
}
