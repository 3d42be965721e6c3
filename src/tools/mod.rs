//! External tools and the invoker that wraps them with bounded retry.
//!
//! Tool failures are classified: transient failures (network, timeout) are
//! retried with exponential backoff up to `max_tool_retries`, deterministic
//! failures (bad input) surface immediately, and sandbox violations abort
//! the session.

mod code_runner;
mod web;

pub use code_runner::CodeRunTool;
pub use web::{PageFetchTool, WebSearchTool};

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::{BudgetConfig, ToolSet, ToolsConfig};
use crate::error::{ToolError, ToolResult};
use crate::session::{BudgetClass, RetryBudget, ToolInvocation};

/// A fact proposed by a tool for insertion into the knowledge graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Fact {
    pub subject: String,
    pub predicate: String,
    pub object: String,
}

impl Fact {
    /// Render as a plain statement for mutation goals.
    pub fn render(&self) -> String {
        format!("{} {} {}", self.subject, self.predicate, self.object)
    }
}

/// Result of a successful tool call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Human-readable output, recorded as step evidence.
    pub content: String,
    /// Facts the tool proposes for the knowledge graph.
    #[serde(default)]
    pub facts: Vec<Fact>,
}

/// An external tool callable by the controller.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Stable identifier the planner addresses this tool by.
    fn id(&self) -> &str;

    /// Execute one attempt with the given payload.
    async fn call(&self, payload: &serde_json::Value) -> ToolResult<ToolOutput>;
}

/// Invoker owning the tool registry and the per-invocation retry policy.
pub struct ToolInvoker {
    tools: HashMap<String, Arc<dyn Tool>>,
    max_retries: u32,
    retry_delay_ms: u64,
    timeout_ms: u64,
    records: Mutex<Vec<ToolInvocation>>,
}

impl ToolInvoker {
    /// Build the invoker with the configured tool set.
    pub fn from_config(tools_config: &ToolsConfig, budgets: &BudgetConfig) -> ToolResult<Self> {
        let mut tools: Vec<Arc<dyn Tool>> = vec![Arc::new(CodeRunTool::new(tools_config)?)];

        if tools_config.tool_set == ToolSet::Full {
            tools.push(Arc::new(WebSearchTool::new(tools_config)?));
            tools.push(Arc::new(PageFetchTool::new(tools_config)?));
        }

        Ok(Self::with_tools(tools, budgets, tools_config.timeout_ms))
    }

    /// Build an invoker over an explicit tool list.
    pub fn with_tools(
        tools: Vec<Arc<dyn Tool>>,
        budgets: &BudgetConfig,
        timeout_ms: u64,
    ) -> Self {
        Self {
            tools: tools
                .into_iter()
                .map(|tool| (tool.id().to_string(), tool))
                .collect(),
            max_retries: budgets.max_tool_retries,
            retry_delay_ms: budgets.retry_delay_ms,
            timeout_ms,
            records: Mutex::new(vec![]),
        }
    }

    /// Identifiers of the registered tools, sorted for stable prompts.
    pub fn available_tools(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.tools.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Invocation records accumulated so far.
    pub fn records(&self) -> Vec<ToolInvocation> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Id of the most recent invocation record.
    pub fn last_record_id(&self) -> Option<String> {
        self.records
            .lock()
            .ok()
            .and_then(|r| r.last().map(|inv| inv.id.clone()))
    }

    fn push_record(&self, record: ToolInvocation) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record);
        }
    }

    /// Invoke a tool with bounded retry and a hard per-attempt timeout.
    ///
    /// Attempts are counted across retries and recorded whether or not the
    /// invocation eventually succeeds.
    pub async fn invoke(
        &self,
        tool_id: &str,
        payload: serde_json::Value,
    ) -> ToolResult<ToolOutput> {
        let tool = self
            .tools
            .get(tool_id)
            .ok_or_else(|| ToolError::UnknownTool {
                tool_id: tool_id.to_string(),
            })?
            .clone();

        let start = Instant::now();
        let mut budget = RetryBudget::new(BudgetClass::ToolCall, self.max_retries);
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;

            let attempt = tokio::time::timeout(
                Duration::from_millis(self.timeout_ms),
                tool.call(&payload),
            )
            .await
            .unwrap_or_else(|_| {
                Err(ToolError::Timeout {
                    tool_id: tool_id.to_string(),
                    timeout_ms: self.timeout_ms,
                })
            });

            match attempt {
                Ok(output) => {
                    let latency = start.elapsed().as_millis() as i64;
                    info!(
                        tool = %tool_id,
                        attempts,
                        latency_ms = latency,
                        "Tool invocation succeeded"
                    );
                    self.push_record(
                        ToolInvocation::new(tool_id, payload.clone()).succeeded(
                            output.content.clone(),
                            attempts,
                            latency,
                        ),
                    );
                    return Ok(output);
                }
                Err(e) if e.is_session_fatal() => {
                    let latency = start.elapsed().as_millis() as i64;
                    error!(tool = %tool_id, error = %e, "Sandbox violation, aborting");
                    self.push_record(
                        ToolInvocation::new(tool_id, payload.clone()).failed(
                            e.to_string(),
                            attempts,
                            latency,
                        ),
                    );
                    return Err(e);
                }
                Err(e) if e.is_transient() => {
                    if !budget.try_consume() {
                        let latency = start.elapsed().as_millis() as i64;
                        error!(
                            tool = %tool_id,
                            attempts,
                            error = %e,
                            "Tool retries exhausted"
                        );
                        self.push_record(
                            ToolInvocation::new(tool_id, payload.clone()).failed(
                                e.to_string(),
                                attempts,
                                latency,
                            ),
                        );
                        return Err(ToolError::RetriesExhausted {
                            attempts,
                            message: e.to_string(),
                        });
                    }
                    let delay = Duration::from_millis(
                        self.retry_delay_ms * 2_u64.pow(budget.failures.saturating_sub(1)),
                    );
                    warn!(
                        tool = %tool_id,
                        attempt = attempts,
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "Transient tool failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    // Deterministic failure: retrying the same input cannot help.
                    let latency = start.elapsed().as_millis() as i64;
                    warn!(tool = %tool_id, error = %e, "Deterministic tool failure");
                    self.push_record(
                        ToolInvocation::new(tool_id, payload.clone()).failed(
                            e.to_string(),
                            attempts,
                            latency,
                        ),
                    );
                    return Err(e);
                }
            }
        }
    }
}
