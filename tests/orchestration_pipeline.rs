// tests/orchestration_pipeline.rs
// The optimize -> send -> extract path exercised as one pipeline, plus the
// client-level guarantees callers build on: cache idempotency and the ledger.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use maestro::client::{RequestClient, RequestConfig};
use maestro::config::EngineConfig;
use maestro::context::ProjectContext;
use maestro::error::EngineError;
use maestro::extractor::ResponseExtractor;
use maestro::optimizer::{OptimizationTarget, RequestOptimizer};
use maestro::provider::{CompletionProvider, CompletionRequest, CompletionResponse};
use maestro::task_type::TaskType;

struct CannedProvider {
    calls: AtomicUsize,
    text: String,
}

impl CannedProvider {
    fn new(text: &str) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            text: text.to_string(),
        }
    }
}

#[async_trait]
impl CompletionProvider for CannedProvider {
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(CompletionResponse {
            text: self.text.clone(),
            model: request.model.clone(),
            input_tokens: 80,
            output_tokens: 300,
            extra: serde_json::Map::new(),
        })
    }
}

const STRUCTURED_REPLY: &str = r#"Create `src/routes.rs` with the handler:

```rust
pub fn routes() -> Router {
    Router::new().route("/health", get(health))
}
```

Install the dependency first:

```bash
$ cargo add axum
```

1. Add the route module
2. Run the server locally

Finally, verify that the health endpoint returns 200.
"#;

#[tokio::test]
async fn test_cost_target_debugging_picks_cheapest_model() {
    let optimizer = RequestOptimizer::new();
    let project = ProjectContext::new("/small").with_file_count(5);

    let config = RequestConfig::new("fix the panic in the worker loop", "gpt-5")
        .with_task_type(TaskType::Debugging);
    let optimized = optimizer.optimize(config, &project, OptimizationTarget::Cost);

    assert_eq!(optimized.model, "gpt-5-nano");
    assert!(optimized.max_tokens <= 1000);
}

#[tokio::test]
async fn test_cache_hit_is_idempotent_and_free() {
    let provider = Arc::new(CannedProvider::new(STRUCTURED_REPLY));
    let client = RequestClient::new(provider.clone(), EngineConfig::default());

    let config = RequestConfig::new("implement the health route", "gpt-5-mini");

    let first = client.send(config.clone()).await.unwrap();
    let second = client.send(config).await.unwrap();

    assert!(!first.from_cache);
    assert!(second.from_cache);
    assert_eq!(second.cost, 0.0);
    assert_eq!(first.response.text, second.response.text);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

    // Only the first send touched the ledger
    let ledger = client.ledger_snapshot().await;
    assert!((ledger.daily_cost - first.cost).abs() < 1e-12);
}

#[tokio::test]
async fn test_full_pipeline_produces_actionable_plan() {
    let provider = Arc::new(CannedProvider::new(STRUCTURED_REPLY));
    let client = RequestClient::new(provider, EngineConfig::default());
    let optimizer = RequestOptimizer::new();
    let extractor = ResponseExtractor::new();
    let project = ProjectContext::new("/app").with_file_count(40);

    let config = RequestConfig::new("add a health endpoint to the router", "gpt-5-mini")
        .with_task_type(TaskType::Implementation);
    let optimized = optimizer.optimize(config, &project, OptimizationTarget::Balanced);

    let outcome = client.send(optimized).await.unwrap();
    let processed = extractor.process(&outcome.response.text);

    assert!(!processed.code_blocks.is_empty());
    assert!(processed.dependencies.contains(&"axum".to_string()));
    assert!(processed
        .file_modifications
        .iter()
        .any(|m| m.path == "src/routes.rs"));
    assert!(processed.confidence > 0.5);
    assert!(processed.warnings.is_empty() || !processed.warnings.iter().any(|w| w.contains("fence")));

    let plan = &processed.plan;
    assert!(plan.phase("install_dependencies").is_some());
    assert!(plan.phase("modify_files").is_some());
    assert_eq!(plan.phases.last().unwrap().name, "validation");
}

#[tokio::test]
async fn test_unstructured_reply_degrades_safely() {
    let provider = Arc::new(CannedProvider::new("I am not sure, maybe try restarting?"));
    let client = RequestClient::new(provider, EngineConfig::default());
    let extractor = ResponseExtractor::new();

    let outcome = client
        .send(RequestConfig::new("vague question", "gpt-5-mini"))
        .await
        .unwrap();
    let processed = extractor.process(&outcome.response.text);

    assert!(processed.code_blocks.is_empty());
    assert!(processed.commands.is_empty());
    assert!(!processed.warnings.is_empty());
}
