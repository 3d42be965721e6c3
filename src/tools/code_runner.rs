use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Fact, Tool, ToolOutput};
use crate::config::ToolsConfig;
use crate::error::{ToolError, ToolResult};

/// Parameters for a code execution request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeRunParams {
    /// Source to execute.
    pub code: String,
    /// Language understood by the executor.
    #[serde(default = "default_language")]
    pub language: String,
    /// Executor-side time limit in seconds.
    #[serde(default = "default_timeout_s")]
    pub timeout_s: u64,
}

fn default_language() -> String {
    "python".to_string()
}

fn default_timeout_s() -> u64 {
    60
}

/// Executor service response
#[derive(Debug, Clone, Deserialize)]
struct RunResponse {
    #[serde(default)]
    stdout: String,
    #[serde(default)]
    stderr: String,
    #[serde(default)]
    exit_code: i32,
    /// Set by the sandbox when the code attempted a forbidden operation.
    #[serde(default)]
    violation: bool,
    #[serde(default)]
    facts: Vec<Fact>,
}

/// Remote code-execution sandbox reached over HTTP.
///
/// A non-zero exit code is a valid result (the model needs the error
/// output); a reported sandbox violation is session-fatal.
pub struct CodeRunTool {
    client: Client,
    base_url: String,
}

impl CodeRunTool {
    /// Tool identifier the planner uses.
    pub const ID: &'static str = "run_code";

    /// Create the tool from configuration
    pub fn new(config: &ToolsConfig) -> ToolResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| ToolError::Transient {
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: config.executor_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Tool for CodeRunTool {
    fn id(&self) -> &str {
        Self::ID
    }

    async fn call(&self, payload: &serde_json::Value) -> ToolResult<ToolOutput> {
        let params: CodeRunParams =
            serde_json::from_value(payload.clone()).map_err(|e| ToolError::BadInput {
                message: format!("invalid run_code payload: {}", e),
            })?;

        if params.code.trim().is_empty() {
            return Err(ToolError::BadInput {
                message: "code must not be empty".to_string(),
            });
        }

        debug!(language = %params.language, "Submitting code to executor");

        let response = self
            .client
            .post(format!("{}/run", self.base_url))
            .json(&params)
            .send()
            .await
            .map_err(|e| ToolError::Transient {
                message: e.to_string(),
            })?;

        let status = response.status();
        if status.as_u16() == 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::BadInput { message: body });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::Transient {
                message: format!("executor returned {}: {}", status, body),
            });
        }

        let run: RunResponse = response.json().await.map_err(|e| ToolError::Transient {
            message: format!("unreadable executor response: {}", e),
        })?;

        if run.violation {
            return Err(ToolError::SandboxViolation {
                tool_id: Self::ID.to_string(),
                message: run.stderr,
            });
        }

        let content = if run.exit_code == 0 {
            run.stdout
        } else {
            format!(
                "exit code {}\nstdout:\n{}\nstderr:\n{}",
                run.exit_code, run.stdout, run.stderr
            )
        };

        Ok(ToolOutput {
            content,
            facts: run.facts,
        })
    }
}
