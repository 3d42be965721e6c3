//! Final answer extraction from accumulated evidence.
//!
//! The structured-answer parse is retried up to
//! `max_final_solution_parsing` times; exhaustion degrades to the raw
//! model text flagged as unstructured rather than failing the session.

use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{info, warn};

use crate::config::{BudgetConfig, ControllerConfig};
use crate::error::ExtractionError;
use crate::llm::{extract_json_from_completion, LlmClient, Message, ModelRole};
use crate::prompts::{ANSWER_EXTRACTION_PROMPT, OUTPUT_FORMAT_PROMPT, ZERO_SHOT_PROMPT};
use crate::session::{BudgetClass, RetryBudget};

/// The session's final answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalAnswer {
    /// The answer text.
    pub answer: String,
    /// Whether the answer passed schema validation. Degraded answers carry
    /// the raw model text and are flagged `false`.
    pub structured: bool,
    /// Model-reported confidence, absent on degraded answers.
    pub confidence: Option<f64>,
    /// Evidence trace backing the answer.
    pub reasoning: Option<String>,
}

/// Schema the extraction model must satisfy
#[derive(Debug, Clone, Deserialize)]
struct StructuredAnswer {
    answer: String,
    #[serde(default = "default_confidence")]
    confidence: f64,
    #[serde(default)]
    reasoning: String,
}

fn default_confidence() -> f64 {
    0.5
}

/// Extractor over the configured execution model.
#[derive(Clone)]
pub struct AnswerExtractor {
    llm: LlmClient,
    max_parsing_retry: u32,
    format_output: bool,
}

impl AnswerExtractor {
    /// Create a new extractor
    pub fn new(llm: LlmClient, budgets: &BudgetConfig, controller: &ControllerConfig) -> Self {
        Self {
            llm,
            max_parsing_retry: budgets.max_final_solution_parsing,
            format_output: controller.format_output,
        }
    }

    /// Extract the final answer from the graph snapshot and step history.
    pub async fn extract(
        &self,
        question: &str,
        graph_snapshot: &str,
        history_digest: &str,
    ) -> Result<FinalAnswer, ExtractionError> {
        let user = format!(
            "Question: {}\n\nKnowledge graph snapshot:\n{}\n\nStep history:\n{}",
            question, graph_snapshot, history_digest
        );
        let messages = vec![Message::system(ANSWER_EXTRACTION_PROMPT), Message::user(user)];
        self.extract_with_retry(messages).await
    }

    /// Answer directly from the model, without graph evidence.
    pub async fn zero_shot(&self, question: &str) -> Result<FinalAnswer, ExtractionError> {
        let messages = vec![
            Message::system(ZERO_SHOT_PROMPT),
            Message::user(format!("Question: {}", question)),
        ];
        self.extract_with_retry(messages).await
    }

    async fn extract_with_retry(
        &self,
        messages: Vec<Message>,
    ) -> Result<FinalAnswer, ExtractionError> {
        let start = Instant::now();
        let mut parse_budget =
            RetryBudget::new(BudgetClass::AnswerParsing, self.max_parsing_retry);
        let mut last_completion = String::new();

        loop {
            let completion = self
                .llm
                .complete(ModelRole::Executor, messages.clone())
                .await
                .map_err(ExtractionError::Llm)?;

            match parse_structured(&completion) {
                Ok(parsed) => {
                    let answer = FinalAnswer {
                        answer: parsed.answer,
                        structured: true,
                        confidence: Some(parsed.confidence.clamp(0.0, 1.0)),
                        reasoning: (!parsed.reasoning.is_empty()).then_some(parsed.reasoning),
                    };
                    info!(
                        structured = true,
                        latency_ms = start.elapsed().as_millis() as i64,
                        "Answer extracted"
                    );
                    return Ok(self.maybe_format(answer).await);
                }
                Err(reason) => {
                    warn!(
                        error = %reason,
                        remaining = parse_budget.remaining(),
                        "Answer failed schema validation"
                    );
                    last_completion = completion;
                    if !parse_budget.try_consume() {
                        break;
                    }
                }
            }
        }

        // Budget exhausted: favor returning something over hard failure.
        let raw = last_completion.trim().to_string();
        if raw.is_empty() {
            return Err(ExtractionError::ParseExhausted {
                attempts: parse_budget.failures,
                message: "model returned no content to degrade to".to_string(),
            });
        }

        info!(
            structured = false,
            attempts = parse_budget.failures,
            "Returning unstructured answer after parse budget exhaustion"
        );
        Ok(FinalAnswer {
            answer: raw,
            structured: false,
            confidence: None,
            reasoning: None,
        })
    }

    /// Optional presentation pass; any failure keeps the original answer.
    async fn maybe_format(&self, answer: FinalAnswer) -> FinalAnswer {
        if !self.format_output {
            return answer;
        }

        let messages = vec![
            Message::system(OUTPUT_FORMAT_PROMPT),
            Message::user(answer.answer.clone()),
        ];
        match self.llm.complete(ModelRole::Executor, messages).await {
            Ok(formatted) if !formatted.trim().is_empty() => FinalAnswer {
                answer: formatted.trim().to_string(),
                ..answer
            },
            Ok(_) => answer,
            Err(e) => {
                warn!(error = %e, "Output formatting failed, keeping original answer");
                answer
            }
        }
    }
}

fn parse_structured(completion: &str) -> Result<StructuredAnswer, String> {
    let json = extract_json_from_completion(completion)?;
    serde_json::from_str(json).map_err(|e| format!("invalid answer schema: {}", e))
}
