//! Query synthesizer: turns a natural-language sub-goal into a backend
//! query, with a self-correcting repair loop.
//!
//! Generation attempts are bounded by `max_retrieve_query_retry`; each
//! generated query gets a fixing sub-loop bounded by
//! `max_cypher_fixing_retry` that feeds the backend's error message and the
//! failed query back to the execution model. Two consecutive
//! valid-but-empty results stop the loop early with a low-confidence
//! report instead of draining the syntax-repair budget.

use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::BudgetConfig;
use crate::error::{GraphError, LlmResult, SynthesisError, SynthesisResult};
use crate::graph::{GraphStore, MutationResult, QueryDialect, ResultSet};
use crate::llm::{strip_code_fences, LlmClient, Message, ModelRole};
use crate::prompts::{CYPHER_SYNTHESIS_PROMPT, QUERY_FIX_PROMPT, SPARQL_SYNTHESIS_PROMPT};
use crate::session::{BudgetClass, RetryBudget};

/// Outcome of a retrieval goal.
#[derive(Debug, Clone)]
pub struct Retrieval {
    /// The query that finally executed.
    pub query: String,
    /// Rows it returned.
    pub results: ResultSet,
}

/// Outcome of a mutation goal.
#[derive(Debug, Clone)]
pub struct Mutation {
    /// The update that finally executed.
    pub query: String,
    /// Backend-reported change summary.
    pub result: MutationResult,
}

/// Synthesizer over the configured execution model.
#[derive(Clone)]
pub struct QuerySynthesizer {
    llm: LlmClient,
    max_generation_retry: u32,
    max_fixing_retry: u32,
}

impl QuerySynthesizer {
    /// Create a new synthesizer
    pub fn new(llm: LlmClient, budgets: &BudgetConfig) -> Self {
        Self {
            llm,
            max_generation_retry: budgets.max_retrieve_query_retry,
            max_fixing_retry: budgets.max_cypher_fixing_retry,
        }
    }

    /// Produce one query for a goal against the given schema.
    pub async fn synthesize(
        &self,
        goal: &str,
        schema_hint: &str,
        dialect: QueryDialect,
    ) -> LlmResult<String> {
        let system = match dialect {
            QueryDialect::Cypher => CYPHER_SYNTHESIS_PROMPT,
            QueryDialect::Sparql => SPARQL_SYNTHESIS_PROMPT,
        };
        let user = format!("Goal: {}\n\nSchema summary: {}", goal, schema_hint);

        let completion = self
            .llm
            .complete(ModelRole::Executor, vec![Message::system(system), Message::user(user)])
            .await?;
        Ok(strip_code_fences(&completion))
    }

    /// Produce a corrected query from the backend's rejection.
    async fn fix(
        &self,
        goal: &str,
        failed_query: &str,
        error_message: &str,
    ) -> LlmResult<String> {
        let user = format!(
            "Goal: {}\n\nFailed query:\n{}\n\nBackend error:\n{}",
            goal, failed_query, error_message
        );

        let completion = self
            .llm
            .complete(
                ModelRole::Executor,
                vec![Message::system(QUERY_FIX_PROMPT), Message::user(user)],
            )
            .await?;
        Ok(strip_code_fences(&completion))
    }

    /// Run a retrieval goal to completion against the store.
    ///
    /// Returns [`SynthesisError::LowConfidence`] when two consecutive
    /// valid queries come back empty, and [`SynthesisError::Failed`] when
    /// the fixing budget runs out.
    pub async fn retrieve(
        &self,
        goal: &str,
        store: &dyn GraphStore,
    ) -> SynthesisResult<Retrieval> {
        let start = Instant::now();
        let schema = self.schema_or_placeholder(store).await?;
        let mut generation_budget =
            RetryBudget::new(BudgetClass::QueryGeneration, self.max_generation_retry);

        loop {
            let query = self
                .synthesize(goal, &schema, store.dialect())
                .await
                .map_err(SynthesisError::Llm)?;

            if query.is_empty() {
                warn!(goal = %goal, "Synthesis produced an empty query");
                if !generation_budget.try_consume() {
                    return Err(SynthesisError::Failed {
                        attempts: generation_budget.failures,
                        message: "execution model kept producing empty queries".to_string(),
                    });
                }
                continue;
            }

            match self.execute_with_fixing(goal, query, store).await {
                Ok(retrieval) => {
                    info!(
                        goal = %goal,
                        rows = retrieval.results.len(),
                        latency_ms = start.elapsed().as_millis() as i64,
                        "Retrieval goal completed"
                    );
                    return Ok(retrieval);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Run a mutation goal to completion against the store.
    pub async fn mutate(&self, goal: &str, store: &dyn GraphStore) -> SynthesisResult<Mutation> {
        let start = Instant::now();
        let schema = self.schema_or_placeholder(store).await?;

        let mut query = self
            .synthesize(goal, &schema, store.dialect())
            .await
            .map_err(SynthesisError::Llm)?;
        let mut fixing_budget = RetryBudget::new(BudgetClass::QueryFixing, self.max_fixing_retry);

        loop {
            match store.apply_mutation(&query).await {
                Ok(result) => {
                    info!(
                        goal = %goal,
                        contains_updates = result.contains_updates,
                        latency_ms = start.elapsed().as_millis() as i64,
                        "Mutation goal completed"
                    );
                    return Ok(Mutation { query, result });
                }
                Err(GraphError::Syntax { message, .. }) => {
                    debug!(error = %message, remaining = fixing_budget.remaining(), "Mutation rejected, attempting fix");
                    if !fixing_budget.try_consume() {
                        return Err(SynthesisError::Failed {
                            attempts: fixing_budget.failures,
                            message,
                        });
                    }
                    query = self
                        .fix(goal, &query, &message)
                        .await
                        .map_err(SynthesisError::Llm)?;
                }
                Err(e) => return Err(SynthesisError::Graph(e)),
            }
        }
    }

    /// Execute a query, repairing rejections within the fixing budget.
    async fn execute_with_fixing(
        &self,
        goal: &str,
        mut query: String,
        store: &dyn GraphStore,
    ) -> SynthesisResult<Retrieval> {
        let mut fixing_budget = RetryBudget::new(BudgetClass::QueryFixing, self.max_fixing_retry);
        let mut empty_streak: u32 = 0;

        loop {
            match store.run_query(&query).await {
                Ok(results) if results.is_empty() => {
                    empty_streak += 1;
                    if empty_streak >= 2 {
                        info!(goal = %goal, "Two consecutive empty results, stopping with low confidence");
                        return Err(SynthesisError::LowConfidence {
                            consecutive_empty: empty_streak,
                            query,
                        });
                    }
                    // A valid query that matches nothing may still be the
                    // wrong query; spend one fix on a semantic revision.
                    if !fixing_budget.try_consume() {
                        return Err(SynthesisError::LowConfidence {
                            consecutive_empty: empty_streak,
                            query,
                        });
                    }
                    query = self
                        .fix(
                            goal,
                            &query,
                            "query executed but returned no results; revise it to better match the goal",
                        )
                        .await
                        .map_err(SynthesisError::Llm)?;
                }
                Ok(results) => return Ok(Retrieval { query, results }),
                Err(GraphError::Syntax { message, .. }) => {
                    empty_streak = 0;
                    debug!(error = %message, remaining = fixing_budget.remaining(), "Query rejected, attempting fix");
                    if !fixing_budget.try_consume() {
                        return Err(SynthesisError::Failed {
                            attempts: fixing_budget.failures,
                            message,
                        });
                    }
                    query = self
                        .fix(goal, &query, &message)
                        .await
                        .map_err(SynthesisError::Llm)?;
                }
                Err(e) => return Err(SynthesisError::Graph(e)),
            }
        }
    }

    /// Schema summaries are best-effort; only connectivity loss aborts.
    async fn schema_or_placeholder(&self, store: &dyn GraphStore) -> SynthesisResult<String> {
        match store.schema_summary().await {
            Ok(schema) => Ok(schema),
            Err(e) if e.is_session_fatal() => Err(SynthesisError::Graph(e)),
            Err(e) => {
                warn!(error = %e, "Schema summary unavailable, synthesizing without it");
                Ok("(schema unavailable)".to_string())
            }
        }
    }
}
