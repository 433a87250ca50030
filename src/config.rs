// src/config.rs
// All tunables load from the environment with sane defaults; the struct is
// passed into constructors rather than held as a global.

use serde::Deserialize;
use std::str::FromStr;

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    // ── Provider Configuration
    pub provider_base_url: String,
    pub default_model: String,
    pub fallback_model: String,
    pub provider_timeout_secs: u64,

    // ── Cost Ceilings (USD)
    pub daily_cost_ceiling: f64,
    pub monthly_cost_ceiling: f64,

    // ── Cache & History
    pub cache_ttl_secs: u64,
    pub request_history_cap: usize,

    // ── Retry Policy
    pub max_retries: u32,
    pub backoff_base_secs: f64,

    // ── Workflow Execution
    pub max_concurrent_requests: usize,
    pub inter_request_delay_ms: u64,
    pub request_max_retries: u32,

    // ── Session Context
    pub context_max_turns: usize,
    pub context_preview_chars: usize,

    // ── Storage
    pub storage_dir: String,
}

fn env_var_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    match std::env::var(key) {
        Ok(val) => {
            // Trim whitespace and strip inline comments before parsing
            let clean_val = val.split('#').next().unwrap_or("").trim();
            match clean_val.parse::<T>() {
                Ok(parsed) => parsed,
                Err(_) => default,
            }
        }
        Err(_) => default,
    }
}

fn default_storage_dir() -> String {
    dirs::data_local_dir()
        .map(|d| d.join("maestro").to_string_lossy().into_owned())
        .unwrap_or_else(|| "./maestro-data".to_string())
}

impl EngineConfig {
    pub fn from_env() -> Self {
        // Load from .env first if present; missing file is not an error
        let _ = dotenvy::dotenv();

        Self {
            provider_base_url: env_var_or(
                "MAESTRO_PROVIDER_BASE_URL",
                "https://api.openai.com".to_string(),
            ),
            default_model: env_var_or("MAESTRO_DEFAULT_MODEL", "gpt-5-mini".to_string()),
            fallback_model: env_var_or("MAESTRO_FALLBACK_MODEL", "gpt-5-nano".to_string()),
            provider_timeout_secs: env_var_or("MAESTRO_PROVIDER_TIMEOUT", 60),
            daily_cost_ceiling: env_var_or("MAESTRO_DAILY_COST_CEILING", 10.0),
            monthly_cost_ceiling: env_var_or("MAESTRO_MONTHLY_COST_CEILING", 100.0),
            cache_ttl_secs: env_var_or("MAESTRO_CACHE_TTL_SECS", 3600),
            request_history_cap: env_var_or("MAESTRO_REQUEST_HISTORY_CAP", 1000),
            max_retries: env_var_or("MAESTRO_MAX_RETRIES", 3),
            backoff_base_secs: env_var_or("MAESTRO_BACKOFF_BASE_SECS", 2.0),
            max_concurrent_requests: env_var_or("MAESTRO_MAX_CONCURRENT", 3),
            inter_request_delay_ms: env_var_or("MAESTRO_INTER_REQUEST_DELAY_MS", 500),
            request_max_retries: env_var_or("MAESTRO_REQUEST_MAX_RETRIES", 2),
            context_max_turns: env_var_or("MAESTRO_CONTEXT_MAX_TURNS", 5),
            context_preview_chars: env_var_or("MAESTRO_CONTEXT_PREVIEW_CHARS", 200),
            storage_dir: env_var_or("MAESTRO_STORAGE_DIR", default_storage_dir()),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            provider_base_url: "https://api.openai.com".to_string(),
            default_model: "gpt-5-mini".to_string(),
            fallback_model: "gpt-5-nano".to_string(),
            provider_timeout_secs: 60,
            daily_cost_ceiling: 10.0,
            monthly_cost_ceiling: 100.0,
            cache_ttl_secs: 3600,
            request_history_cap: 1000,
            max_retries: 3,
            backoff_base_secs: 2.0,
            max_concurrent_requests: 3,
            inter_request_delay_ms: 500,
            request_max_retries: 2,
            context_max_turns: 5,
            context_preview_chars: 200,
            storage_dir: default_storage_dir(),
        }
    }
}
