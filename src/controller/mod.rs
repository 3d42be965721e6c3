//! The controller: a bounded, retry-aware orchestration state machine.
//!
//! Sequences planner -> synthesizer/invoker -> graph store, strictly one
//! outstanding external call at a time, records every step in the
//! session's working memory, and terminates through `Finalizing` (success
//! or graceful degradation) or `Failed` (session-fatal error). The loop is
//! bounded by `max_iterations`: reaching it forces finalization with the
//! accumulated evidence instead of failing.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult, ExtractionError, SessionError, SynthesisError};
use crate::extractor::{AnswerExtractor, FinalAnswer};
use crate::graph::GraphStore;
use crate::llm::LlmClient;
use crate::planner::{ActionDecision, StepPlanner};
use crate::session::{
    ActionKind, Cancel, ReasoningStep, Session, StepOutcome, ToolInvocation,
};
use crate::synthesizer::QuerySynthesizer;
use crate::tools::{CodeRunTool, PageFetchTool, ToolInvoker, WebSearchTool};


/// Controller state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    /// Deciding the next action.
    Planning,
    /// Turning a sub-goal into a read query.
    SynthesizingQuery,
    /// Calling an external tool.
    InvokingTool,
    /// Writing facts into the graph.
    MutatingGraph,
    /// Recording an action's outcome.
    Evaluating,
    /// Terminal: extracting the final answer.
    Finalizing,
    /// Terminal: session-fatal error.
    Failed,
}

impl std::fmt::Display for ControllerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControllerState::Planning => write!(f, "planning"),
            ControllerState::SynthesizingQuery => write!(f, "synthesizing_query"),
            ControllerState::InvokingTool => write!(f, "invoking_tool"),
            ControllerState::MutatingGraph => write!(f, "mutating_graph"),
            ControllerState::Evaluating => write!(f, "evaluating"),
            ControllerState::Finalizing => write!(f, "finalizing"),
            ControllerState::Failed => write!(f, "failed"),
        }
    }
}

/// Result of a session run.
///
/// Working memory is returned intact on every path, including failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    /// The session with its full step history.
    pub session: Session,
    /// The final answer, absent when the session failed.
    pub answer: Option<FinalAnswer>,
    /// Terminal state: `Finalizing` or `Failed`.
    pub terminal_state: ControllerState,
    /// Planning cycles consumed.
    pub iterations: u32,
    /// Whether finalization was forced by the iteration bound.
    pub forced_finalize: bool,
    /// Session-fatal failure description, when `terminal_state` is `Failed`.
    pub failure: Option<String>,
    /// Tool invocation records from this run.
    pub invocations: Vec<ToolInvocation>,
    /// Where the knowledge-graph snapshot was written, if it was.
    pub snapshot_path: Option<PathBuf>,
}

/// Snapshot text beyond this length is truncated in extraction prompts.
const SNAPSHOT_PROMPT_LIMIT: usize = 8 * 1024;

/// The orchestration state machine for one session.
pub struct Controller {
    config: Config,
    store: Arc<dyn GraphStore>,
    planner: StepPlanner,
    synthesizer: QuerySynthesizer,
    invoker: ToolInvoker,
    extractor: AnswerExtractor,
    cancel: Cancel,
}

/// What a single executed action produced, before it is committed.
enum ActionResult {
    Recorded(StepOutcome, Option<String>),
    Fatal(String),
}

impl Controller {
    /// Build a controller and its collaborators from configuration.
    ///
    /// The graph store is injected so the backend choice stays a
    /// construction-time decision.
    pub fn new(config: Config, store: Arc<dyn GraphStore>) -> AppResult<Self> {
        let llm = LlmClient::new(&config.llm, &config.budgets).map_err(AppError::Llm)?;
        let planner = StepPlanner::new(llm.clone(), config.controller.strategy, &config.budgets);
        let synthesizer = QuerySynthesizer::new(llm.clone(), &config.budgets);
        let invoker =
            ToolInvoker::from_config(&config.tools, &config.budgets).map_err(AppError::Tool)?;
        let extractor = AnswerExtractor::new(llm, &config.budgets, &config.controller);

        Ok(Self {
            config,
            store,
            planner,
            synthesizer,
            invoker,
            extractor,
            cancel: Cancel::new(),
        })
    }

    /// Handle for aborting the run from another task.
    pub fn cancel_handle(&self) -> Cancel {
        self.cancel.clone()
    }

    /// Run a session to a terminal state.
    ///
    /// Always returns the report; session-fatal errors land in
    /// [`SessionReport::failure`] with the partial working memory intact.
    pub async fn run(&self, mut session: Session) -> SessionReport {
        info!(
            session_id = %session.id,
            question = %session.question,
            zero_shot = self.config.controller.zero_shot,
            "Session started"
        );

        if self.config.controller.zero_shot {
            return self.run_zero_shot(session).await;
        }

        let mut iterations: u32 = 0;
        let mut forced_finalize = true;

        while iterations < self.config.budgets.max_iterations {
            iterations += 1;
            info!(
                session_id = %session.id,
                iteration = iterations,
                state = %ControllerState::Planning,
                "Planning next step"
            );

            let graph_summary = match self.graph_summary().await {
                Ok(summary) => summary,
                Err(fatal) => return self.failed(session, iterations, fatal),
            };

            let decision = match self
                .checked(self.planner.plan_next(
                    &session.question,
                    &session.history_digest(),
                    &graph_summary,
                    &self.invoker.available_tools(),
                ))
                .await
            {
                Some(Ok(decision)) => decision,
                Some(Err(e)) => {
                    // Planner exhaustion means no further planning is possible.
                    let reason = SessionError::LlmExhausted {
                        message: format!("planner: {}", e),
                    };
                    return self.failed(session, iterations, reason.to_string());
                }
                None => return self.aborted(session, iterations),
            };

            if decision.kind == ActionKind::Finalize {
                info!(session_id = %session.id, "Planner chose to finalize");
                forced_finalize = false;
                break;
            }

            let (outcome, invocation_id) = match self.execute(&session, &decision).await {
                Some(ActionResult::Recorded(outcome, invocation_id)) => (outcome, invocation_id),
                Some(ActionResult::Fatal(reason)) => {
                    return self.failed(session, iterations, reason)
                }
                None => return self.aborted(session, iterations),
            };

            // EVALUATING: commit the step, then loop back to PLANNING.
            let mut step = ReasoningStep::new(
                session.next_step_index(),
                decision.kind,
                decision.goal.clone(),
                outcome,
            );
            if let Some(id) = invocation_id {
                step = step.with_invocation(id);
            }
            session.record_step(step);
        }

        if forced_finalize {
            warn!(
                session_id = %session.id,
                iterations,
                "Iteration bound reached, forcing finalization"
            );
        }

        self.finalize(session, iterations, forced_finalize).await
    }

    /// Execute one non-finalize action.
    async fn execute(&self, session: &Session, decision: &ActionDecision) -> Option<ActionResult> {
        match decision.kind {
            ActionKind::QueryGraph => {
                info!(state = %ControllerState::SynthesizingQuery, goal = %decision.goal, "Executing action");
                let result = self
                    .checked(self.synthesizer.retrieve(&decision.goal, self.store.as_ref()))
                    .await?;
                Some(self.synthesis_outcome(result.map(|r| {
                    format!(
                        "Query `{}` returned {} rows:\n{}",
                        r.query,
                        r.results.len(),
                        r.results.render()
                    )
                })))
            }
            ActionKind::MutateGraph => {
                info!(state = %ControllerState::MutatingGraph, goal = %decision.goal, "Executing action");
                let result = self
                    .checked(self.synthesizer.mutate(&decision.goal, self.store.as_ref()))
                    .await?;
                Some(self.synthesis_outcome(result.map(|m| {
                    format!("Applied mutation `{}` ({})", m.query, m.result.summary)
                })))
            }
            ActionKind::InvokeTool => {
                info!(state = %ControllerState::InvokingTool, goal = %decision.goal, "Executing action");
                self.invoke_tool(session, decision).await
            }
            ActionKind::Finalize => unreachable!("finalize is handled by the main loop"),
        }
    }

    /// Map a synthesis result onto the error taxonomy.
    fn synthesis_outcome(&self, result: Result<String, SynthesisError>) -> ActionResult {
        match result {
            Ok(evidence) => ActionResult::Recorded(StepOutcome::Success { evidence }, None),
            Err(SynthesisError::LowConfidence { query, .. }) => ActionResult::Recorded(
                // Valid query, empty graph region: that absence is evidence.
                StepOutcome::Success {
                    evidence: format!(
                        "Query `{}` is valid but matched nothing (low confidence)",
                        query
                    ),
                },
                None,
            ),
            Err(SynthesisError::Failed { attempts, message }) => ActionResult::Recorded(
                StepOutcome::Failure {
                    reason: format!("query synthesis failed after {} attempts: {}", attempts, message),
                },
                None,
            ),
            Err(SynthesisError::Graph(e)) if e.is_session_fatal() => ActionResult::Fatal(
                SessionError::GraphConnectivity {
                    message: e.to_string(),
                }
                .to_string(),
            ),
            Err(SynthesisError::Graph(e)) => ActionResult::Recorded(
                StepOutcome::Failure {
                    reason: format!("graph backend rejected the step: {}", e),
                },
                None,
            ),
            Err(SynthesisError::Llm(e)) => ActionResult::Fatal(
                SessionError::LlmExhausted {
                    message: e.to_string(),
                }
                .to_string(),
            ),
        }
    }

    async fn invoke_tool(
        &self,
        session: &Session,
        decision: &ActionDecision,
    ) -> Option<ActionResult> {
        let tool_id = decision.tool_id.as_deref().unwrap_or_default();
        let payload = build_tool_payload(tool_id, &decision.goal, &session.attachments);

        let result = self.checked(self.invoker.invoke(tool_id, payload)).await?;
        let invocation_id = self.invoker.last_record_id();

        match result {
            Ok(output) => {
                let mut evidence = output.content;

                // Side effect: tool-proposed facts are queued straight into
                // the graph while still part of this step.
                if !output.facts.is_empty() {
                    let goal = format!(
                        "Record the following facts in the graph: {}",
                        output
                            .facts
                            .iter()
                            .map(|f| f.render())
                            .collect::<Vec<_>>()
                            .join("; ")
                    );
                    match self
                        .checked(self.synthesizer.mutate(&goal, self.store.as_ref()))
                        .await?
                    {
                        Ok(mutation) => {
                            evidence.push_str(&format!(
                                "\n[stored {} facts via `{}`]",
                                output.facts.len(),
                                mutation.query
                            ));
                        }
                        Err(SynthesisError::Graph(e)) if e.is_session_fatal() => {
                            return Some(ActionResult::Fatal(
                                SessionError::GraphConnectivity {
                                    message: e.to_string(),
                                }
                                .to_string(),
                            ));
                        }
                        Err(SynthesisError::Llm(e)) => {
                            return Some(ActionResult::Fatal(
                                SessionError::LlmExhausted {
                                    message: e.to_string(),
                                }
                                .to_string(),
                            ));
                        }
                        Err(e) => {
                            warn!(error = %e, "Failed to store tool-proposed facts");
                            evidence.push_str("\n[tool-proposed facts could not be stored]");
                        }
                    }
                }

                Some(ActionResult::Recorded(
                    StepOutcome::Success { evidence },
                    invocation_id,
                ))
            }
            Err(e) if e.is_session_fatal() => Some(ActionResult::Fatal(
                SessionError::SandboxViolation {
                    message: e.to_string(),
                }
                .to_string(),
            )),
            Err(e) => Some(ActionResult::Recorded(
                StepOutcome::Failure {
                    reason: format!("tool call failed: {}", e),
                },
                invocation_id,
            )),
        }
    }

    /// Terminal success path: snapshot, extract, report.
    async fn finalize(
        &self,
        session: Session,
        iterations: u32,
        forced_finalize: bool,
    ) -> SessionReport {
        info!(
            session_id = %session.id,
            state = %ControllerState::Finalizing,
            forced = forced_finalize,
            "Finalizing session"
        );

        let (snapshot_text, snapshot_path) = match self
            .checked(self.store.export_snapshot())
            .await
        {
            None => return self.aborted(session, iterations),
            Some(Ok(snapshot)) => {
                let path = match snapshot.write_to(&self.config.graph.snapshot_dir, &session.id) {
                    Ok(path) => {
                        info!(path = %path.display(), "Snapshot exported");
                        Some(path)
                    }
                    Err(e) => {
                        warn!(error = %e, "Snapshot could not be written");
                        None
                    }
                };
                (truncate_chars(&snapshot.data, SNAPSHOT_PROMPT_LIMIT), path)
            }
            Some(Err(e)) if e.is_session_fatal() => {
                let reason = SessionError::GraphConnectivity {
                    message: e.to_string(),
                };
                return self.failed(session, iterations, reason.to_string());
            }
            Some(Err(e)) => {
                warn!(error = %e, "Snapshot export failed, extracting from history only");
                ("(snapshot unavailable)".to_string(), None)
            }
        };

        let answer = match self
            .checked(self.extractor.extract(
                &session.question,
                &snapshot_text,
                &session.history_digest(),
            ))
            .await
        {
            None => return self.aborted(session, iterations),
            Some(Ok(answer)) => answer,
            Some(Err(ExtractionError::Llm(e))) => {
                let reason = SessionError::LlmExhausted {
                    message: e.to_string(),
                };
                return self.failed(session, iterations, reason.to_string());
            }
            Some(Err(e)) => {
                return self.failed(session, iterations, format!("extraction failed: {}", e))
            }
        };

        info!(
            session_id = %session.id,
            structured = answer.structured,
            iterations,
            "Session finished"
        );

        SessionReport {
            answer: Some(answer),
            terminal_state: ControllerState::Finalizing,
            iterations,
            forced_finalize,
            failure: None,
            invocations: self.invoker.records(),
            snapshot_path,
            session,
        }
    }

    async fn run_zero_shot(&self, session: Session) -> SessionReport {
        let answer = match self.checked(self.extractor.zero_shot(&session.question)).await {
            None => return self.aborted(session, 0),
            Some(Ok(answer)) => answer,
            Some(Err(e)) => {
                return self.failed(session, 0, format!("zero-shot answering failed: {}", e))
            }
        };

        SessionReport {
            answer: Some(answer),
            terminal_state: ControllerState::Finalizing,
            iterations: 0,
            forced_finalize: false,
            failure: None,
            invocations: vec![],
            snapshot_path: None,
            session,
        }
    }

    /// Best-effort graph summary for planning prompts.
    ///
    /// Only connectivity loss is fatal here.
    async fn graph_summary(&self) -> Result<String, String> {
        match self.store.schema_summary().await {
            Ok(summary) => Ok(summary),
            Err(e) if e.is_session_fatal() => Err(SessionError::GraphConnectivity {
                message: e.to_string(),
            }
            .to_string()),
            Err(e) => {
                warn!(error = %e, "Graph summary unavailable for planning");
                Ok("(graph summary unavailable)".to_string())
            }
        }
    }

    fn failed(&self, session: Session, iterations: u32, reason: String) -> SessionReport {
        error!(session_id = %session.id, reason = %reason, "Session failed");
        SessionReport {
            answer: None,
            terminal_state: ControllerState::Failed,
            iterations,
            forced_finalize: false,
            failure: Some(reason),
            invocations: self.invoker.records(),
            snapshot_path: None,
            session,
        }
    }

    fn aborted(&self, session: Session, iterations: u32) -> SessionReport {
        warn!(session_id = %session.id, "Session aborted");
        SessionReport {
            answer: None,
            terminal_state: ControllerState::Failed,
            iterations,
            forced_finalize: false,
            failure: Some(SessionError::Aborted.to_string()),
            invocations: self.invoker.records(),
            snapshot_path: None,
            session,
        }
    }

    /// Await an external call, bailing out at this suspension point when
    /// the session is cancelled. Dropping the future cancels the
    /// underlying HTTP request.
    async fn checked<T>(&self, fut: impl Future<Output = T>) -> Option<T> {
        tokio::select! {
            _ = self.cancel.cancelled() => None,
            result = fut => Some(result),
        }
    }
}

/// Build the payload a tool expects from the planner's goal text.
fn build_tool_payload(
    tool_id: &str,
    goal: &str,
    attachments: &[String],
) -> serde_json::Value {
    if tool_id == CodeRunTool::ID {
        serde_json::json!({ "code": goal })
    } else if tool_id == WebSearchTool::ID {
        serde_json::json!({ "query": goal })
    } else if tool_id == PageFetchTool::ID {
        serde_json::json!({ "url": goal })
    } else {
        serde_json::json!({ "input": goal, "attachments": attachments })
    }
}

fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(limit).collect();
        format!("{}\n[truncated]", truncated)
    }
}
