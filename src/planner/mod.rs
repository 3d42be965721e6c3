//! Step planner: asks the planning model for the next action.
//!
//! Each decision proposes up to `num_next_steps_decision` candidate
//! actions; the configured strategy ranks them and the earliest-proposed
//! candidate wins ties. Transport and parse failures are bounded by the
//! LLM-call budget, whose exhaustion is session-fatal.

use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{BudgetConfig, ControllerStrategy};
use crate::error::{LlmError, LlmResult};
use crate::llm::{extract_json_from_completion, LlmClient, Message, ModelRole};
use crate::prompts::PLANNER_DECISION_PROMPT;
use crate::session::{ActionKind, BudgetClass, RetryBudget};

/// The action the controller will execute next.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDecision {
    /// Chosen action kind.
    pub kind: ActionKind,
    /// Natural-language sub-goal (or tool input) for the action.
    pub goal: String,
    /// Target tool when `kind` is `InvokeTool`.
    pub tool_id: Option<String>,
    /// Planner-reported confidence (0.0-1.0).
    pub confidence: f64,
    /// Why the planner proposed this action.
    pub rationale: String,
}

/// Raw planner response
#[derive(Debug, Clone, Deserialize)]
struct PlannerResponse {
    candidates: Vec<CandidateAction>,
}

#[derive(Debug, Clone, Deserialize)]
struct CandidateAction {
    kind: String,
    goal: String,
    #[serde(default)]
    tool_id: Option<String>,
    #[serde(default = "default_confidence")]
    confidence: f64,
    #[serde(default)]
    rationale: String,
}

fn default_confidence() -> f64 {
    0.5
}

/// Planner over the configured planning model.
#[derive(Clone)]
pub struct StepPlanner {
    llm: LlmClient,
    strategy: ControllerStrategy,
    num_candidates: u32,
    llm_budget_limit: u32,
}

impl StepPlanner {
    /// Create a new planner
    pub fn new(llm: LlmClient, strategy: ControllerStrategy, budgets: &BudgetConfig) -> Self {
        Self {
            llm,
            strategy,
            num_candidates: budgets.num_next_steps_decision,
            llm_budget_limit: budgets.max_llm_retries,
        }
    }

    /// Decide the next action from the step history and graph summary.
    ///
    /// Malformed structured responses are re-requested within the LLM-call
    /// budget; exhaustion propagates as [`LlmError::Exhausted`].
    pub async fn plan_next(
        &self,
        question: &str,
        history_digest: &str,
        graph_summary: &str,
        available_tools: &[String],
    ) -> LlmResult<ActionDecision> {
        let start = Instant::now();
        let messages = self.build_messages(question, history_digest, graph_summary, available_tools);

        let mut parse_budget = RetryBudget::new(BudgetClass::LlmCall, self.llm_budget_limit);

        loop {
            let completion = self
                .llm
                .complete(ModelRole::Planner, messages.clone())
                .await?;

            match self.parse_decision(&completion) {
                Ok(decision) => {
                    info!(
                        kind = %decision.kind,
                        confidence = decision.confidence,
                        latency_ms = start.elapsed().as_millis() as i64,
                        "Planner decided next action"
                    );
                    return Ok(decision);
                }
                Err(reason) => {
                    warn!(
                        error = %reason,
                        remaining = parse_budget.remaining(),
                        "Planner response failed to parse"
                    );
                    if !parse_budget.try_consume() {
                        return Err(LlmError::Exhausted {
                            message: format!("planner response never parsed: {}", reason),
                            retries: parse_budget.failures,
                        });
                    }
                }
            }
        }
    }

    /// Parse and rank the candidate list from a completion.
    fn parse_decision(&self, completion: &str) -> Result<ActionDecision, String> {
        let json = extract_json_from_completion(completion)?;
        let response: PlannerResponse =
            serde_json::from_str(json).map_err(|e| format!("invalid planner schema: {}", e))?;

        let candidates: Vec<ActionDecision> = response
            .candidates
            .into_iter()
            .take(self.num_candidates as usize)
            .filter_map(|c| {
                let kind: ActionKind = c.kind.parse().ok()?;
                if kind == ActionKind::InvokeTool && c.tool_id.is_none() {
                    debug!(goal = %c.goal, "Dropping tool candidate without tool_id");
                    return None;
                }
                Some(ActionDecision {
                    kind,
                    goal: c.goal,
                    tool_id: c.tool_id,
                    confidence: c.confidence.clamp(0.0, 1.0),
                    rationale: c.rationale,
                })
            })
            .collect();

        select_candidate(candidates, self.strategy)
            .ok_or_else(|| "no valid candidates proposed".to_string())
    }

    fn build_messages(
        &self,
        question: &str,
        history_digest: &str,
        graph_summary: &str,
        available_tools: &[String],
    ) -> Vec<Message> {
        let user_msg = format!(
            "Question: {}\n\nStep history:\n{}\n\nKnowledge graph summary:\n{}\n\nAvailable tools: [{}]\n\nPropose up to {} candidate next actions.",
            question,
            history_digest,
            graph_summary,
            available_tools.join(", "),
            self.num_candidates
        );

        vec![
            Message::system(PLANNER_DECISION_PROMPT),
            Message::user(user_msg),
        ]
    }
}

/// Apply the configured ranking over proposal order.
///
/// Both strategies are deterministic: with `Confidence`, a strict
/// comparison keeps the earliest proposal on equal scores; with `First`,
/// proposal order is the ranking.
fn select_candidate(
    candidates: Vec<ActionDecision>,
    strategy: ControllerStrategy,
) -> Option<ActionDecision> {
    match strategy {
        ControllerStrategy::First => candidates.into_iter().next(),
        ControllerStrategy::Confidence => {
            let mut best_idx = 0;
            for (idx, candidate) in candidates.iter().enumerate().skip(1) {
                if candidate.confidence > candidates[best_idx].confidence {
                    best_idx = idx;
                }
            }
            candidates.into_iter().nth(best_idx)
        }
    }
}
