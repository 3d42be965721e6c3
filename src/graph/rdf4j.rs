use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use super::{session_namespace, GraphSnapshot, GraphStore, MutationResult, QueryDialect, ResultSet};
use crate::config::GraphConfig;
use crate::error::{GraphError, GraphResult};

/// Triple-store adapter speaking SPARQL to an RDF4J repository over HTTP.
///
/// Reads go to the repository endpoint, updates to its `/statements`
/// endpoint; every update is its own transaction.
#[derive(Clone)]
pub struct Rdf4jStore {
    client: Client,
    base_url: String,
    repository: String,
}

#[derive(Debug, Deserialize)]
struct SparqlResults {
    #[serde(default)]
    head: SparqlHead,
    #[serde(default)]
    results: Option<SparqlBindings>,
    /// Present for ASK queries.
    #[serde(default)]
    boolean: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct SparqlHead {
    #[serde(default)]
    vars: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SparqlBindings {
    #[serde(default)]
    bindings: Vec<HashMap<String, SparqlTerm>>,
}

#[derive(Debug, Deserialize)]
struct SparqlTerm {
    value: String,
}

impl Rdf4jStore {
    /// Create an adapter scoped to one session.
    ///
    /// A `{session}` placeholder in the configured repository name is
    /// replaced with the session id so concurrent sessions stay disjoint.
    pub fn new(config: &GraphConfig, session_id: &str) -> GraphResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(GraphError::Http)?;

        Ok(Self {
            client,
            base_url: config.rdf4j.base_url.trim_end_matches('/').to_string(),
            repository: session_namespace(&config.rdf4j.repository, session_id),
        })
    }

    /// Get the repository query endpoint URL (for testing)
    pub fn query_endpoint(&self) -> String {
        format!("{}/repositories/{}", self.base_url, self.repository)
    }

    /// Get the statements endpoint URL (for testing)
    pub fn statements_endpoint(&self) -> String {
        format!("{}/repositories/{}/statements", self.base_url, self.repository)
    }

    fn map_send_error(e: reqwest::Error) -> GraphError {
        if e.is_connect() || e.is_timeout() {
            GraphError::Connection {
                message: e.to_string(),
            }
        } else {
            GraphError::Http(e)
        }
    }

    /// 400 responses carry the parser message; everything there is a
    /// malformed-query rejection and therefore repairable.
    fn map_status_error(status: reqwest::StatusCode, body: String, query: &str) -> GraphError {
        if status.as_u16() == 400 {
            GraphError::Syntax {
                message: body,
                query: query.to_string(),
            }
        } else {
            GraphError::Backend {
                status: status.as_u16(),
                message: body,
            }
        }
    }
}

#[async_trait]
impl GraphStore for Rdf4jStore {
    fn dialect(&self) -> QueryDialect {
        QueryDialect::Sparql
    }

    async fn run_query(&self, query: &str) -> GraphResult<ResultSet> {
        let start = Instant::now();
        debug!(repository = %self.repository, "Submitting SPARQL query");

        let response = self
            .client
            .post(self.query_endpoint())
            .header("Accept", "application/sparql-results+json")
            .form(&[("query", query)])
            .send()
            .await
            .map_err(Self::map_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::map_status_error(status, body, query));
        }

        let parsed: SparqlResults =
            response
                .json()
                .await
                .map_err(|e| GraphError::InvalidResponse {
                    message: format!("Failed to parse SPARQL results: {}", e),
                })?;

        let result_set = if let Some(answer) = parsed.boolean {
            ResultSet {
                columns: vec!["boolean".to_string()],
                rows: vec![vec![serde_json::Value::Bool(answer)]],
            }
        } else {
            let vars = parsed.head.vars;
            let rows = parsed
                .results
                .map(|r| r.bindings)
                .unwrap_or_default()
                .into_iter()
                .map(|mut binding| {
                    vars.iter()
                        .map(|var| {
                            binding
                                .remove(var)
                                .map(|term| serde_json::Value::String(term.value))
                                .unwrap_or(serde_json::Value::Null)
                        })
                        .collect()
                })
                .collect();
            ResultSet {
                columns: vars,
                rows,
            }
        };

        info!(
            repository = %self.repository,
            rows = result_set.len(),
            latency_ms = start.elapsed().as_millis() as i64,
            "SPARQL query completed"
        );

        Ok(result_set)
    }

    async fn apply_mutation(&self, query: &str) -> GraphResult<MutationResult> {
        let start = Instant::now();
        debug!(repository = %self.repository, "Submitting SPARQL update");

        let response = self
            .client
            .post(self.statements_endpoint())
            .form(&[("update", query)])
            .send()
            .await
            .map_err(Self::map_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::map_status_error(status, body, query));
        }

        info!(
            repository = %self.repository,
            latency_ms = start.elapsed().as_millis() as i64,
            "SPARQL update committed"
        );

        Ok(MutationResult {
            contains_updates: true,
            summary: "update accepted".to_string(),
        })
    }

    async fn export_snapshot(&self) -> GraphResult<GraphSnapshot> {
        let response = self
            .client
            .get(self.statements_endpoint())
            .header("Accept", "application/n-triples")
            .send()
            .await
            .map_err(Self::map_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GraphError::Backend {
                status: status.as_u16(),
                message: body,
            });
        }

        let body = response.text().await.map_err(GraphError::Http)?;

        // N-Triples statement order is not guaranteed by the server; sort
        // so repeated exports of the same graph are identical.
        let mut lines: Vec<&str> = body.lines().filter(|l| !l.trim().is_empty()).collect();
        lines.sort_unstable();
        let data = lines.join("\n");

        Ok(GraphSnapshot {
            dialect: QueryDialect::Sparql,
            format: "nt".to_string(),
            data,
            taken_at: Utc::now(),
        })
    }

    async fn schema_summary(&self) -> GraphResult<String> {
        let result = self
            .run_query("SELECT DISTINCT ?p WHERE { ?s ?p ?o } ORDER BY ?p LIMIT 50")
            .await?;

        let predicates: Vec<String> = result
            .rows
            .iter()
            .filter_map(|row| row.first().and_then(|v| v.as_str()).map(String::from))
            .collect();

        Ok(format!("Predicates in use: [{}].", predicates.join(", ")))
    }
}
