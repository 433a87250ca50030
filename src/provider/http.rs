// src/provider/http.rs

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client as ReqwestClient};
use serde_json::{json, Map, Value};
use tracing::{debug, error};

use crate::config::EngineConfig;
use crate::context::CredentialProvider;
use crate::error::{classify_status, EngineError, Result};

use super::{CompletionProvider, CompletionRequest, CompletionResponse};

/// HTTP transport for the completion API. Carries no retry logic of its own;
/// RequestClient owns the retry/backoff policy.
pub struct HttpProvider {
    client: ReqwestClient,
    base_url: String,
    api_key: String,
}

impl HttpProvider {
    pub fn new(
        config: &EngineConfig,
        credentials: &dyn CredentialProvider,
    ) -> anyhow::Result<Self> {
        let client = ReqwestClient::builder()
            .timeout(Duration::from_secs(config.provider_timeout_secs))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            base_url: config.provider_base_url.clone(),
            api_key: credentials.api_key()?,
        })
    }

    fn build_body(request: &CompletionRequest) -> Value {
        let mut messages = Vec::new();
        if let Some(system) = &request.system_prompt {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": request.user_prompt }));

        let mut body = json!({
            "model": request.model,
            "messages": messages,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        });

        // Provider-specific passthrough fields merge in at the top level
        if let Value::Object(map) = &mut body {
            for (key, value) in &request.extra {
                map.insert(key.clone(), value.clone());
            }
        }

        body
    }

    fn parse_response(value: &Value) -> Result<CompletionResponse> {
        let text = value["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                EngineError::PermanentProvider("no text in provider response".to_string())
            })?
            .to_string();

        let model = value["model"].as_str().unwrap_or_default().to_string();
        let input_tokens = value["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32;
        let output_tokens = value["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32;

        Ok(CompletionResponse {
            text,
            model,
            input_tokens,
            output_tokens,
            extra: Map::new(),
        })
    }
}

#[async_trait]
impl CompletionProvider for HttpProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        debug!("Sending completion request: model={}", request.model);

        let response = self
            .client
            .post(&url)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_key))
            .header(header::CONTENT_TYPE, "application/json")
            .json(&Self::build_body(request))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response.text().await.unwrap_or_default();
            error!("Provider error ({}): {}", status, error_text);
            return Err(classify_status(status, error_text));
        }

        let value: Value = response.json().await?;
        Self::parse_response(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_body_includes_system_prompt() {
        let mut req = CompletionRequest::new("gpt-5-mini", "do the thing");
        req.system_prompt = Some("you are terse".to_string());
        let body = HttpProvider::build_body(&req);

        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["role"], "user");
    }

    #[test]
    fn test_build_body_merges_extra() {
        let mut req = CompletionRequest::new("gpt-5", "hi");
        req.extra
            .insert("reasoning_effort".to_string(), json!("low"));
        let body = HttpProvider::build_body(&req);
        assert_eq!(body["reasoning_effort"], "low");
    }

    #[test]
    fn test_parse_response_extracts_fields() {
        let value = json!({
            "model": "gpt-5-mini",
            "choices": [{ "message": { "content": "hello there" } }],
            "usage": { "prompt_tokens": 12, "completion_tokens": 4 }
        });
        let parsed = HttpProvider::parse_response(&value).unwrap();
        assert_eq!(parsed.text, "hello there");
        assert_eq!(parsed.input_tokens, 12);
        assert_eq!(parsed.output_tokens, 4);
    }

    #[test]
    fn test_parse_response_missing_text_is_permanent() {
        let value = json!({ "choices": [] });
        let err = HttpProvider::parse_response(&value).unwrap_err();
        assert!(!err.is_retryable());
    }
}
