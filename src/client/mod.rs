//! RequestClient: the single-request execution layer.
//!
//! Owns the response cache, the cost ledger, and the retry/backoff policy.
//! The cache and ledger are the only state shared across concurrent in-flight
//! requests, so both sit behind their own mutex.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::provider::{CompletionProvider, CompletionRequest, CompletionResponse};
use crate::task_type::{ComplexityLevel, TaskType};

pub mod pricing;

use pricing::{actual_cost, estimate_cost};

// ============================================================================
// Request / Outcome Types
// ============================================================================

/// Fully-resolved parameters for one completion request. Produced by the
/// optimizer, consumed by `RequestClient::send`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestConfig {
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub task_type: TaskType,
    pub complexity: ComplexityLevel,
    /// Cheaper model substituted when the primary would breach a ceiling.
    /// None means the cost gate fails hard instead.
    pub fallback_model: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl RequestConfig {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_prompt: None,
            model: model.into(),
            temperature: 0.3,
            max_tokens: 2000,
            task_type: TaskType::default(),
            complexity: ComplexityLevel::default(),
            fallback_model: None,
            extra: Map::new(),
        }
    }

    pub fn with_task_type(mut self, task_type: TaskType) -> Self {
        self.task_type = task_type;
        self
    }

    pub fn with_fallback(mut self, model: impl Into<String>) -> Self {
        self.fallback_model = Some(model.into());
        self
    }
}

/// Result of a send: the response plus the bookkeeping callers care about.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub response: CompletionResponse,
    pub from_cache: bool,
    pub cost: f64,
    pub elapsed_ms: u64,
    /// Model actually used (differs from the request when the cost gate
    /// substituted the fallback)
    pub model_used: String,
}

// ============================================================================
// Internal State
// ============================================================================

#[derive(Debug, Clone)]
struct CachedResponse {
    response: CompletionResponse,
    cached_at: DateTime<Utc>,
}

/// Running daily/monthly spend. Rolls over on wall-clock date/month advance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostLedger {
    pub daily_cost: f64,
    pub monthly_cost: f64,
    pub last_reset: DateTime<Utc>,
}

impl CostLedger {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            daily_cost: 0.0,
            monthly_cost: 0.0,
            last_reset: now,
        }
    }

    /// Reset counters whose wall-clock period has advanced since last touch.
    fn rollover(&mut self, now: DateTime<Utc>) {
        if now.date_naive() != self.last_reset.date_naive() {
            self.daily_cost = 0.0;
        }
        if now.month() != self.last_reset.month() || now.year() != self.last_reset.year() {
            self.monthly_cost = 0.0;
        }
        self.last_reset = now;
    }

    fn add(&mut self, cost: f64) {
        self.daily_cost += cost;
        self.monthly_cost += cost;
    }
}

/// One completed (or failed) send, kept in a bounded ring for metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestRecord {
    pub timestamp: DateTime<Utc>,
    pub model: String,
    pub task_type: TaskType,
    pub complexity: ComplexityLevel,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub elapsed_ms: u64,
    pub from_cache: bool,
    pub success: bool,
}

/// Rolling aggregates over the last 24 hours of request records.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceMetrics {
    pub total_requests: usize,
    pub cache_hit_rate: f64,
    pub success_rate: f64,
    pub average_latency_ms: f64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub ledger: CostLedger,
}

// ============================================================================
// RequestClient
// ============================================================================

pub struct RequestClient {
    provider: Arc<dyn CompletionProvider>,
    config: EngineConfig,
    cache: Mutex<HashMap<String, CachedResponse>>,
    ledger: Mutex<CostLedger>,
    history: Mutex<VecDeque<RequestRecord>>,
}

impl RequestClient {
    pub fn new(provider: Arc<dyn CompletionProvider>, config: EngineConfig) -> Self {
        info!(
            "RequestClient initialized: model={}, daily_ceiling=${:.2}, monthly_ceiling=${:.2}",
            config.default_model, config.daily_cost_ceiling, config.monthly_cost_ceiling
        );
        Self {
            provider,
            config,
            cache: Mutex::new(HashMap::new()),
            ledger: Mutex::new(CostLedger::new(Utc::now())),
            history: Mutex::new(VecDeque::new()),
        }
    }

    /// Execute one request: cache lookup, cost gate, retry loop, bookkeeping.
    pub async fn send(&self, mut config: RequestConfig) -> Result<SendOutcome> {
        let started = Instant::now();

        // Cache lookup: a valid hit costs nothing and makes no network call
        let key = cache_key(&config);
        if let Some(hit) = self.cache_lookup(&key).await {
            debug!("Cache hit for model={} key={}", config.model, &key[..12]);
            let outcome = SendOutcome {
                model_used: hit.model.clone(),
                response: hit,
                from_cache: true,
                cost: 0.0,
                elapsed_ms: started.elapsed().as_millis() as u64,
            };
            self.append_record(&config, &outcome, true).await;
            return Ok(outcome);
        }

        // Cost gate, with optional fallback substitution
        self.apply_cost_gate(&mut config).await?;

        // Bounded retry with exponential backoff on transient failures
        let response = self.execute_with_retry(&config).await;

        match response {
            Ok(response) => {
                let cost = actual_cost(
                    &config.model,
                    response.input_tokens,
                    response.output_tokens,
                );
                {
                    let mut ledger = self.ledger.lock().await;
                    ledger.rollover(Utc::now());
                    ledger.add(cost);
                }
                self.cache_insert(key, response.clone()).await;

                let outcome = SendOutcome {
                    model_used: config.model.clone(),
                    response,
                    from_cache: false,
                    cost,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                };
                self.append_record(&config, &outcome, true).await;
                Ok(outcome)
            }
            Err(e) => {
                let outcome = SendOutcome {
                    model_used: config.model.clone(),
                    response: CompletionResponse {
                        text: String::new(),
                        model: config.model.clone(),
                        input_tokens: 0,
                        output_tokens: 0,
                        extra: Map::new(),
                    },
                    from_cache: false,
                    cost: 0.0,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                };
                self.append_record(&config, &outcome, false).await;
                Err(e)
            }
        }
    }

    /// Aggregate request records from the last 24 hours.
    /// Returns None when the window is empty; callers must not read absence
    /// of data as zeroes.
    pub async fn performance_metrics(&self) -> Option<PerformanceMetrics> {
        let cutoff = Utc::now() - chrono::Duration::hours(24);
        let history = self.history.lock().await;
        let window: Vec<&RequestRecord> =
            history.iter().filter(|r| r.timestamp > cutoff).collect();

        if window.is_empty() {
            return None;
        }

        let total = window.len();
        let cache_hits = window.iter().filter(|r| r.from_cache).count();
        let successes = window.iter().filter(|r| r.success).count();
        let latency_sum: u64 = window.iter().map(|r| r.elapsed_ms).sum();

        let ledger = {
            let mut ledger = self.ledger.lock().await;
            ledger.rollover(Utc::now());
            ledger.clone()
        };

        Some(PerformanceMetrics {
            total_requests: total,
            cache_hit_rate: cache_hits as f64 / total as f64,
            success_rate: successes as f64 / total as f64,
            average_latency_ms: latency_sum as f64 / total as f64,
            total_input_tokens: window.iter().map(|r| r.input_tokens as u64).sum(),
            total_output_tokens: window.iter().map(|r| r.output_tokens as u64).sum(),
            ledger,
        })
    }

    /// Current spend counters after rollover.
    pub async fn ledger_snapshot(&self) -> CostLedger {
        let mut ledger = self.ledger.lock().await;
        ledger.rollover(Utc::now());
        ledger.clone()
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn cache_lookup(&self, key: &str) -> Option<CompletionResponse> {
        let cache = self.cache.lock().await;
        let entry = cache.get(key)?;
        let age = Utc::now() - entry.cached_at;
        if age < chrono::Duration::seconds(self.config.cache_ttl_secs as i64) {
            Some(entry.response.clone())
        } else {
            None
        }
    }

    async fn cache_insert(&self, key: String, response: CompletionResponse) {
        let mut cache = self.cache.lock().await;

        // Drop expired entries once the map grows large
        if cache.len() > 1000 {
            let cutoff =
                Utc::now() - chrono::Duration::seconds(self.config.cache_ttl_secs as i64);
            cache.retain(|_, entry| entry.cached_at > cutoff);
        }

        // Entries are replaced whole, never mutated
        cache.insert(
            key,
            CachedResponse {
                response,
                cached_at: Utc::now(),
            },
        );
    }

    /// Reject or substitute when projected spend would breach a ceiling.
    /// The input projection covers the full text sent to the provider: the
    /// system prompt (often the rendered conversation context, and the
    /// larger half) plus the user prompt.
    async fn apply_cost_gate(&self, config: &mut RequestConfig) -> Result<()> {
        let mut ledger = self.ledger.lock().await;
        ledger.rollover(Utc::now());

        let gate_input = match &config.system_prompt {
            Some(system) => format!("{system}\n{}", config.prompt),
            None => config.prompt.clone(),
        };
        let mut estimated = estimate_cost(&config.model, &gate_input, config.max_tokens);

        if self.would_exceed(&ledger, estimated) {
            if let Some(fallback) = config.fallback_model.take() {
                warn!(
                    "Projected cost ${:.4} breaches ceiling with model={}; substituting {}",
                    estimated, config.model, fallback
                );
                config.model = fallback;
                estimated = estimate_cost(&config.model, &gate_input, config.max_tokens);
            }
        }

        if self.would_exceed(&ledger, estimated) {
            return Err(EngineError::CostLimitExceeded(format!(
                "projected ${:.4} on top of daily ${:.4}/{} monthly ${:.4}/{}",
                estimated,
                ledger.daily_cost,
                self.config.daily_cost_ceiling,
                ledger.monthly_cost,
                self.config.monthly_cost_ceiling
            )));
        }

        Ok(())
    }

    fn would_exceed(&self, ledger: &CostLedger, estimated: f64) -> bool {
        ledger.daily_cost + estimated > self.config.daily_cost_ceiling
            || ledger.monthly_cost + estimated > self.config.monthly_cost_ceiling
    }

    async fn execute_with_retry(&self, config: &RequestConfig) -> Result<CompletionResponse> {
        let request = CompletionRequest {
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            system_prompt: config.system_prompt.clone(),
            user_prompt: config.prompt.clone(),
            extra: config.extra.clone(),
        };

        let mut attempt: u32 = 0;
        loop {
            match self.provider.complete(&request).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = backoff_delay(self.config.backoff_base_secs, attempt);
                    warn!(
                        "Request failed (attempt {}/{}), retrying in {:?}: {}",
                        attempt + 1,
                        self.config.max_retries,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn append_record(&self, config: &RequestConfig, outcome: &SendOutcome, success: bool) {
        let record = RequestRecord {
            timestamp: Utc::now(),
            model: outcome.model_used.clone(),
            task_type: config.task_type,
            complexity: config.complexity,
            input_tokens: outcome.response.input_tokens,
            output_tokens: outcome.response.output_tokens,
            elapsed_ms: outcome.elapsed_ms,
            from_cache: outcome.from_cache,
            success,
        };

        let mut history = self.history.lock().await;
        history.push_back(record);
        while history.len() > self.config.request_history_cap {
            history.pop_front();
        }
    }
}

/// Stable cache key over everything that changes a completion's content.
fn cache_key(config: &RequestConfig) -> String {
    let mut hasher = Sha256::new();
    hasher.update(config.prompt.as_bytes());
    hasher.update(b"\n");
    hasher.update(config.system_prompt.as_deref().unwrap_or("").as_bytes());
    hasher.update(b"\n");
    hasher.update(config.model.as_bytes());
    hasher.update(b"\n");
    hasher.update(format!("{:.2}", config.temperature).as_bytes());
    hasher.update(b"\n");
    hasher.update(config.max_tokens.to_string().as_bytes());

    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// base^attempt seconds plus up to 250ms of jitter.
fn backoff_delay(base_secs: f64, attempt: u32) -> Duration {
    let secs = base_secs.powi(attempt as i32 + 1);
    let jitter_ms = rand::random_range(0..250u64);
    Duration::from_millis((secs * 1000.0) as u64 + jitter_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Provider that fails the first `failures` calls with a transient error.
    struct FlakyProvider {
        calls: AtomicUsize,
        failures: usize,
    }

    impl FlakyProvider {
        fn new(failures: usize) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                failures,
            }
        }
    }

    #[async_trait]
    impl CompletionProvider for FlakyProvider {
        async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                return Err(EngineError::TransientProvider("503".into()));
            }
            Ok(CompletionResponse {
                text: format!("reply to: {}", request.user_prompt),
                model: request.model.clone(),
                input_tokens: 100,
                output_tokens: 50,
                extra: Map::new(),
            })
        }
    }

    fn fast_config() -> EngineConfig {
        EngineConfig {
            backoff_base_secs: 0.001,
            ..EngineConfig::default()
        }
    }

    #[tokio::test]
    async fn test_cache_hit_is_free_and_identical() {
        let provider = Arc::new(FlakyProvider::new(0));
        let client = RequestClient::new(provider.clone(), fast_config());
        let config = RequestConfig::new("same prompt", "gpt-5-mini");

        let first = client.send(config.clone()).await.unwrap();
        let second = client.send(config).await.unwrap();

        assert!(!first.from_cache);
        assert!(second.from_cache);
        assert_eq!(second.cost, 0.0);
        assert_eq!(first.response.text, second.response.text);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cost_monotonicity() {
        let provider = Arc::new(FlakyProvider::new(0));
        let client = RequestClient::new(provider, fast_config());

        let mut last = 0.0;
        for i in 0..4 {
            client
                .send(RequestConfig::new(format!("prompt {i}"), "gpt-5-mini"))
                .await
                .unwrap();
            let snapshot = client.ledger_snapshot().await;
            assert!(snapshot.daily_cost >= last);
            last = snapshot.daily_cost;
        }
        assert!(last > 0.0);
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transients() {
        let provider = Arc::new(FlakyProvider::new(2));
        let client = RequestClient::new(provider.clone(), fast_config());

        let outcome = client
            .send(RequestConfig::new("retry me", "gpt-5-mini"))
            .await
            .unwrap();
        assert!(!outcome.from_cache);
        // 2 failures + 1 success
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_budget_exhausted() {
        let provider = Arc::new(FlakyProvider::new(100));
        let client = RequestClient::new(provider.clone(), fast_config());

        let err = client
            .send(RequestConfig::new("doomed", "gpt-5-mini"))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        // Initial attempt + max_retries
        assert_eq!(
            provider.calls.load(Ordering::SeqCst) as u32,
            fast_config().max_retries + 1
        );
    }

    #[tokio::test]
    async fn test_cost_gate_rejects_without_fallback() {
        let provider = Arc::new(FlakyProvider::new(0));
        let config = EngineConfig {
            daily_cost_ceiling: 0.000_000_1,
            ..fast_config()
        };
        let client = RequestClient::new(provider.clone(), config);

        let err = client
            .send(RequestConfig::new("too expensive", "gpt-5"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::CostLimitExceeded(_)));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cost_gate_counts_system_prompt() {
        let provider = Arc::new(FlakyProvider::new(0));
        let config = EngineConfig {
            daily_cost_ceiling: 0.001,
            ..fast_config()
        };

        // The bare prompt projects well under the ceiling
        let mut request = RequestConfig::new("short ask", "gpt-5");
        request.max_tokens = 10;
        let client = RequestClient::new(provider.clone(), config.clone());
        client.send(request.clone()).await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

        // A large rendered context riding along as the system prompt must
        // be part of the projection and trip the gate
        request.system_prompt = Some("c".repeat(40_000));
        let client = RequestClient::new(provider.clone(), config);
        let err = client.send(request).await.unwrap_err();
        assert!(matches!(err, EngineError::CostLimitExceeded(_)));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cost_gate_substitutes_fallback() {
        let provider = Arc::new(FlakyProvider::new(0));
        // Ceiling sits between the premium estimate and the economy estimate
        let config = EngineConfig {
            daily_cost_ceiling: 0.000_9,
            ..fast_config()
        };
        let client = RequestClient::new(provider, config);

        let request = RequestConfig::new("borderline", "gpt-5").with_fallback("gpt-5-nano");
        let outcome = client.send(request).await.unwrap();
        assert_eq!(outcome.model_used, "gpt-5-nano");
    }

    #[tokio::test]
    async fn test_metrics_none_when_empty() {
        let provider = Arc::new(FlakyProvider::new(0));
        let client = RequestClient::new(provider, fast_config());
        assert!(client.performance_metrics().await.is_none());
    }

    #[tokio::test]
    async fn test_metrics_track_cache_hits() {
        let provider = Arc::new(FlakyProvider::new(0));
        let client = RequestClient::new(provider, fast_config());
        let config = RequestConfig::new("metrics prompt", "gpt-5-mini");

        client.send(config.clone()).await.unwrap();
        client.send(config).await.unwrap();

        let metrics = client.performance_metrics().await.unwrap();
        assert_eq!(metrics.total_requests, 2);
        assert!((metrics.cache_hit_rate - 0.5).abs() < f64::EPSILON);
        assert_eq!(metrics.success_rate, 1.0);
    }

    #[test]
    fn test_ledger_daily_rollover() {
        let yesterday = Utc::now() - chrono::Duration::days(1);
        let mut ledger = CostLedger::new(yesterday);
        ledger.add(5.0);

        ledger.rollover(Utc::now());
        assert_eq!(ledger.daily_cost, 0.0);
    }

    #[test]
    fn test_ledger_monthly_rollover() {
        let long_ago = Utc::now() - chrono::Duration::days(40);
        let mut ledger = CostLedger::new(long_ago);
        ledger.add(5.0);

        ledger.rollover(Utc::now());
        assert_eq!(ledger.daily_cost, 0.0);
        assert_eq!(ledger.monthly_cost, 0.0);
    }

    #[test]
    fn test_cache_key_sensitive_to_all_inputs() {
        let base = RequestConfig::new("prompt", "gpt-5-mini");
        let key = cache_key(&base);

        let mut other = base.clone();
        other.temperature = 0.9;
        assert_ne!(key, cache_key(&other));

        let mut other = base.clone();
        other.max_tokens = 1;
        assert_ne!(key, cache_key(&other));

        let mut other = base.clone();
        other.system_prompt = Some("different".into());
        assert_ne!(key, cache_key(&other));

        assert_eq!(key, cache_key(&base.clone()));
    }

    #[test]
    fn test_backoff_schedule_grows() {
        let first = backoff_delay(2.0, 0);
        let third = backoff_delay(2.0, 2);
        assert!(third > first);
        assert!(first >= Duration::from_secs(2));
        assert!(first < Duration::from_millis(2250 + 1));
    }
}
