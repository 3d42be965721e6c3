use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::types::{ChatRequest, ChatResponse, Message, ModelRole};
use crate::config::{BudgetConfig, LlmConfig};
use crate::error::{LlmError, LlmResult};

/// Client for the chat-completions API of the configured LLM provider.
///
/// Every call is bounded by `max_llm_retries` with exponential backoff;
/// exhaustion is surfaced as [`LlmError::Exhausted`] and treated as
/// session-fatal by the controller.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    base_url: String,
    api_key: String,
    config: LlmConfig,
    max_retries: u32,
    retry_delay_ms: u64,
}

impl LlmClient {
    /// Create a new LLM client
    pub fn new(config: &LlmConfig, budgets: &BudgetConfig) -> LlmResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(LlmError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            config: config.clone(),
            max_retries: budgets.max_llm_retries,
            retry_delay_ms: budgets.retry_delay_ms,
        })
    }

    /// Send a chat request, retrying transport failures with backoff
    pub async fn chat(&self, request: ChatRequest) -> LlmResult<ChatResponse> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let model = request.model.clone();

        let mut last_error = None;
        let mut retries = 0;

        while retries <= self.max_retries {
            if retries > 0 {
                let delay =
                    Duration::from_millis(self.retry_delay_ms * (2_u64.pow(retries - 1)));
                warn!(
                    model = %model,
                    retry = retries,
                    delay_ms = delay.as_millis(),
                    "Retrying LLM request"
                );
                tokio::time::sleep(delay).await;
            }

            let start = Instant::now();

            match self.execute_request(&url, &request).await {
                Ok(response) => {
                    let latency = start.elapsed();
                    info!(
                        model = %model,
                        latency_ms = latency.as_millis(),
                        "LLM call succeeded"
                    );
                    return Ok(response);
                }
                Err(e) => {
                    let latency = start.elapsed();
                    error!(
                        model = %model,
                        error = %e,
                        latency_ms = latency.as_millis(),
                        retry = retries,
                        "LLM call failed"
                    );
                    last_error = Some(e);
                    retries += 1;
                }
            }
        }

        Err(LlmError::Exhausted {
            message: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
            retries,
        })
    }

    /// Convenience wrapper selecting model and temperature by role
    pub async fn complete(&self, role: ModelRole, messages: Vec<Message>) -> LlmResult<String> {
        let (model, temperature) = match role {
            ModelRole::Planner => (
                self.config.planner_model.clone(),
                self.config.planner_temperature,
            ),
            ModelRole::Executor => (
                self.config.executor_model.clone(),
                self.config.executor_temperature,
            ),
        };

        let request = ChatRequest::new(model, messages).with_temperature(temperature);
        let response = self.chat(request).await?;
        Ok(response.completion().to_string())
    }

    /// Execute a single request (internal)
    async fn execute_request(&self, url: &str, request: &ChatRequest) -> LlmResult<ChatResponse> {
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            "Calling chat completions"
        );

        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout {
                        timeout_ms: self.config.timeout_ms,
                    }
                } else {
                    LlmError::Http(e)
                }
            })?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        let chat_response: ChatResponse =
            response
                .json()
                .await
                .map_err(|e| LlmError::MalformedResponse {
                    message: format!("Failed to parse response: {}", e),
                })?;

        Ok(chat_response)
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}
