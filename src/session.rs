//! Session state: the question under investigation, the append-only step
//! history, retry budgets, and cooperative cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use uuid::Uuid;

use crate::config::BudgetConfig;

/// One question-answering run.
///
/// Owned exclusively by the controller; working memory is the ordered,
/// append-only sequence of committed reasoning steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique session identifier.
    pub id: String,
    /// The original question.
    pub question: String,
    /// Attached file paths or URIs supplied with the question.
    pub attachments: Vec<String>,
    /// Committed reasoning steps, in order.
    pub steps: Vec<ReasoningStep>,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Create a new session for a question
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            question: question.into(),
            attachments: vec![],
            steps: vec![],
            created_at: Utc::now(),
        }
    }

    /// Attach supporting files or URIs
    pub fn with_attachments(mut self, attachments: Vec<String>) -> Self {
        self.attachments = attachments;
        self
    }

    /// Index the next committed step will get.
    pub fn next_step_index(&self) -> u32 {
        self.steps.len() as u32
    }

    /// Append a completed step. Steps are never rewritten.
    pub fn record_step(&mut self, step: ReasoningStep) {
        self.steps.push(step);
    }

    /// Numbered digest of the step history for planner prompts.
    pub fn history_digest(&self) -> String {
        if self.steps.is_empty() {
            return "(no steps taken yet)".to_string();
        }
        self.steps
            .iter()
            .map(|step| {
                format!(
                    "{}. [{}] {} -> {}",
                    step.index + 1,
                    step.kind,
                    step.goal,
                    step.outcome.digest()
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Evidence gathered by successful steps, for answer extraction.
    pub fn evidence(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter_map(|step| match &step.outcome {
                StepOutcome::Success { evidence } => Some(evidence.as_str()),
                StepOutcome::Failure { .. } => None,
            })
            .collect()
    }
}

/// Action kind chosen by the planner for one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Read from the knowledge graph.
    QueryGraph,
    /// Write new facts into the knowledge graph.
    MutateGraph,
    /// Call an external tool.
    InvokeTool,
    /// Evidence suffices; extract the answer.
    Finalize,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionKind::QueryGraph => write!(f, "query_graph"),
            ActionKind::MutateGraph => write!(f, "mutate_graph"),
            ActionKind::InvokeTool => write!(f, "invoke_tool"),
            ActionKind::Finalize => write!(f, "finalize"),
        }
    }
}

impl std::str::FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "query_graph" => Ok(ActionKind::QueryGraph),
            "mutate_graph" => Ok(ActionKind::MutateGraph),
            "invoke_tool" => Ok(ActionKind::InvokeTool),
            "finalize" => Ok(ActionKind::Finalize),
            _ => Err(format!("Unknown action kind: {}", s)),
        }
    }
}

/// Outcome of one reasoning step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum StepOutcome {
    /// The action completed and produced evidence.
    Success { evidence: String },
    /// The action failed even after its local retries.
    Failure { reason: String },
}

impl StepOutcome {
    /// Single-line rendering for history digests.
    pub fn digest(&self) -> String {
        match self {
            StepOutcome::Success { evidence } => {
                let mut text = evidence.replace('\n', " ");
                if text.chars().count() > 240 {
                    text = text.chars().take(240).collect::<String>() + "...";
                }
                format!("ok: {}", text)
            }
            StepOutcome::Failure { reason } => format!("failed: {}", reason),
        }
    }

    /// Whether the step succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, StepOutcome::Success { .. })
    }
}

/// One planner decision with its result, committed to the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningStep {
    /// Unique step identifier.
    pub id: String,
    /// Position in the session's step sequence.
    pub index: u32,
    /// The action kind the planner chose.
    pub kind: ActionKind,
    /// Natural-language sub-goal for the action.
    pub goal: String,
    /// Outcome recorded after execution.
    pub outcome: StepOutcome,
    /// Tool invocation that backed this step, if any.
    pub invocation_id: Option<String>,
    /// When the step was committed.
    pub created_at: DateTime<Utc>,
}

impl ReasoningStep {
    /// Create a completed step record
    pub fn new(index: u32, kind: ActionKind, goal: impl Into<String>, outcome: StepOutcome) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            index,
            kind,
            goal: goal.into(),
            outcome,
            invocation_id: None,
            created_at: Utc::now(),
        }
    }

    /// Reference the tool invocation that produced the outcome
    pub fn with_invocation(mut self, invocation_id: impl Into<String>) -> Self {
        self.invocation_id = Some(invocation_id.into());
        self
    }
}

/// Failure class a retry budget guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetClass {
    QueryGeneration,
    QueryFixing,
    ToolCall,
    LlmCall,
    AnswerParsing,
}

impl std::fmt::Display for BudgetClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BudgetClass::QueryGeneration => write!(f, "query_generation"),
            BudgetClass::QueryFixing => write!(f, "query_fixing"),
            BudgetClass::ToolCall => write!(f, "tool_call"),
            BudgetClass::LlmCall => write!(f, "llm_call"),
            BudgetClass::AnswerParsing => write!(f, "answer_parsing"),
        }
    }
}

/// Explicit retry state for one failure class.
///
/// The remaining count only decreases; exhaustion is a regular state, not
/// an exception, so it can be tested without real failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryBudget {
    /// Failure class this budget guards.
    pub class: BudgetClass,
    /// Retries permitted, from configuration.
    pub limit: u32,
    /// Failures recorded so far.
    pub failures: u32,
}

impl RetryBudget {
    /// Create a fresh budget for a failure class
    pub fn new(class: BudgetClass, limit: u32) -> Self {
        Self {
            class,
            limit,
            failures: 0,
        }
    }

    /// Seed a budget from the configured ceiling for its class
    pub fn for_class(class: BudgetClass, config: &BudgetConfig) -> Self {
        let limit = match class {
            BudgetClass::QueryGeneration => config.max_retrieve_query_retry,
            BudgetClass::QueryFixing => config.max_cypher_fixing_retry,
            BudgetClass::ToolCall => config.max_tool_retries,
            BudgetClass::LlmCall => config.max_llm_retries,
            BudgetClass::AnswerParsing => config.max_final_solution_parsing,
        };
        Self::new(class, limit)
    }

    /// Record a failure and report whether one more retry is allowed.
    ///
    /// Returns `false` once the budget is exhausted; the counter never
    /// goes past the limit.
    pub fn try_consume(&mut self) -> bool {
        if self.failures < self.limit {
            self.failures += 1;
            true
        } else {
            false
        }
    }

    /// Retries still available.
    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.failures)
    }

    /// Whether no retries remain.
    pub fn is_exhausted(&self) -> bool {
        self.failures >= self.limit
    }
}

/// Record of one tool invocation, owned by the invoker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Unique invocation identifier.
    pub id: String,
    /// Target tool.
    pub tool_id: String,
    /// Input payload.
    pub input: serde_json::Value,
    /// Attempts made, including the successful one.
    pub attempts: u32,
    /// Whether the invocation eventually succeeded.
    pub success: bool,
    /// Output content (if successful).
    pub output: Option<String>,
    /// Error message (if failed).
    pub error: Option<String>,
    /// Total latency across attempts in milliseconds.
    pub latency_ms: Option<i64>,
    /// When the invocation started.
    pub created_at: DateTime<Utc>,
}

impl ToolInvocation {
    /// Create a new invocation record
    pub fn new(tool_id: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tool_id: tool_id.into(),
            input,
            attempts: 0,
            success: false,
            output: None,
            error: None,
            latency_ms: None,
            created_at: Utc::now(),
        }
    }

    /// Mark as successful with output
    pub fn succeeded(mut self, output: impl Into<String>, attempts: u32, latency_ms: i64) -> Self {
        self.success = true;
        self.output = Some(output.into());
        self.attempts = attempts;
        self.latency_ms = Some(latency_ms);
        self
    }

    /// Mark as failed with error
    pub fn failed(mut self, error: impl Into<String>, attempts: u32, latency_ms: i64) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self.attempts = attempts;
        self.latency_ms = Some(latency_ms);
        self
    }
}

/// Cooperative cancellation shared across a session's suspension points.
///
/// Aborting wakes every pending wait; dropping the in-flight future
/// cancels the underlying HTTP call rather than abandoning it.
#[derive(Clone, Default)]
pub struct Cancel {
    inner: Arc<CancelInner>,
}

#[derive(Default)]
struct CancelInner {
    notify: Notify,
    cancelled: AtomicBool,
}

impl Cancel {
    /// Create a fresh, un-cancelled handle
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; wakes all pending waits.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolve once cancellation is requested.
    pub async fn cancelled(&self) {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        // Register interest before checking the flag so a cancel between
        // the check and the await is not lost.
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}
