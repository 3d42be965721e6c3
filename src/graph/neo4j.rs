use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{session_namespace, GraphSnapshot, GraphStore, MutationResult, QueryDialect, ResultSet};
use crate::config::GraphConfig;
use crate::error::{GraphError, GraphResult};

/// Property-graph adapter speaking Cypher to Neo4j's HTTP transactional
/// endpoint.
///
/// Each call commits its own transaction (`tx/commit`), so mutations are
/// durable as soon as the call returns.
#[derive(Clone)]
pub struct Neo4jStore {
    client: Client,
    base_url: String,
    database: String,
    user: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct TxRequest {
    statements: Vec<TxStatement>,
}

#[derive(Debug, Serialize)]
struct TxStatement {
    statement: String,
    #[serde(rename = "includeStats")]
    include_stats: bool,
}

#[derive(Debug, Deserialize)]
struct TxResponse {
    #[serde(default)]
    results: Vec<TxResult>,
    #[serde(default)]
    errors: Vec<TxError>,
}

#[derive(Debug, Deserialize)]
struct TxResult {
    #[serde(default)]
    columns: Vec<String>,
    #[serde(default)]
    data: Vec<TxRow>,
    #[serde(default)]
    stats: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct TxRow {
    #[serde(default)]
    row: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct TxError {
    code: String,
    message: String,
}

impl Neo4jStore {
    /// Create an adapter scoped to one session.
    ///
    /// A `{session}` placeholder in the configured database name is
    /// replaced with the session id so concurrent sessions stay disjoint.
    pub fn new(config: &GraphConfig, session_id: &str) -> GraphResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(GraphError::Http)?;

        Ok(Self {
            client,
            base_url: config.neo4j.base_url.trim_end_matches('/').to_string(),
            database: session_namespace(&config.neo4j.database, session_id),
            user: config.neo4j.user.clone(),
            password: config.neo4j.password.clone(),
        })
    }

    /// Get the transactional endpoint URL (for testing)
    pub fn endpoint(&self) -> String {
        format!("{}/db/{}/tx/commit", self.base_url, self.database)
    }

    /// Submit statements in one auto-committed transaction.
    async fn commit(&self, statements: Vec<String>) -> GraphResult<Vec<TxResult>> {
        let url = self.endpoint();
        let first = statements.first().cloned().unwrap_or_default();
        let request = TxRequest {
            statements: statements
                .into_iter()
                .map(|statement| TxStatement {
                    statement,
                    include_stats: true,
                })
                .collect(),
        };

        debug!(database = %self.database, "Submitting Cypher transaction");

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.user, Some(&self.password))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    GraphError::Connection {
                        message: e.to_string(),
                    }
                } else {
                    GraphError::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GraphError::Backend {
                status: status.as_u16(),
                message: body,
            });
        }

        let tx: TxResponse = response
            .json()
            .await
            .map_err(|e| GraphError::InvalidResponse {
                message: format!("Failed to parse transaction response: {}", e),
            })?;

        if let Some(err) = tx.errors.first() {
            return Err(classify_tx_error(err, &first));
        }

        Ok(tx.results)
    }
}

/// Map a Neo4j status code to the retryability taxonomy.
///
/// `Neo.ClientError.Statement.*` means the query text is wrong and can be
/// repaired by re-synthesis; everything else is not retryable.
fn classify_tx_error(err: &TxError, query: &str) -> GraphError {
    if err.code.starts_with("Neo.ClientError.Statement") {
        GraphError::Syntax {
            message: err.message.clone(),
            query: query.to_string(),
        }
    } else if err.code.starts_with("Neo.TransientError") {
        GraphError::Connection {
            message: format!("{}: {}", err.code, err.message),
        }
    } else {
        GraphError::Backend {
            status: 200,
            message: format!("{}: {}", err.code, err.message),
        }
    }
}

// Deterministic ordering keeps snapshot export idempotent.
const EXPORT_NODES: &str =
    "MATCH (n) RETURN id(n) AS id, labels(n) AS labels, properties(n) AS props ORDER BY id";
const EXPORT_RELS: &str = "MATCH (a)-[r]->(b) RETURN id(r) AS id, id(a) AS source, type(r) AS kind, id(b) AS target, properties(r) AS props ORDER BY id";

#[async_trait]
impl GraphStore for Neo4jStore {
    fn dialect(&self) -> QueryDialect {
        QueryDialect::Cypher
    }

    async fn run_query(&self, query: &str) -> GraphResult<ResultSet> {
        let start = Instant::now();
        let mut results = self.commit(vec![query.to_string()]).await?;
        let result = results.drain(..).next().unwrap_or(TxResult {
            columns: vec![],
            data: vec![],
            stats: None,
        });

        let result_set = ResultSet {
            columns: result.columns,
            rows: result.data.into_iter().map(|d| d.row).collect(),
        };

        info!(
            database = %self.database,
            rows = result_set.len(),
            latency_ms = start.elapsed().as_millis() as i64,
            "Cypher query completed"
        );

        Ok(result_set)
    }

    async fn apply_mutation(&self, query: &str) -> GraphResult<MutationResult> {
        let start = Instant::now();
        let results = self.commit(vec![query.to_string()]).await?;

        let stats = results.first().and_then(|r| r.stats.clone());
        let contains_updates = stats
            .as_ref()
            .and_then(|s| s.get("contains_updates"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let summary = stats
            .map(|s| s.to_string())
            .unwrap_or_else(|| "no stats reported".to_string());

        info!(
            database = %self.database,
            contains_updates,
            latency_ms = start.elapsed().as_millis() as i64,
            "Cypher mutation committed"
        );

        Ok(MutationResult {
            contains_updates,
            summary,
        })
    }

    async fn export_snapshot(&self) -> GraphResult<GraphSnapshot> {
        let results = self
            .commit(vec![EXPORT_NODES.to_string(), EXPORT_RELS.to_string()])
            .await?;

        let mut iter = results.into_iter();
        let nodes: Vec<Vec<serde_json::Value>> = iter
            .next()
            .map(|r| r.data.into_iter().map(|d| d.row).collect())
            .unwrap_or_default();
        let relationships: Vec<Vec<serde_json::Value>> = iter
            .next()
            .map(|r| r.data.into_iter().map(|d| d.row).collect())
            .unwrap_or_default();

        let body = serde_json::json!({
            "nodes": nodes,
            "relationships": relationships,
        });
        let data =
            serde_json::to_string_pretty(&body).map_err(|e| GraphError::InvalidResponse {
                message: format!("Failed to serialize snapshot: {}", e),
            })?;

        Ok(GraphSnapshot {
            dialect: QueryDialect::Cypher,
            format: "json".to_string(),
            data,
            taken_at: Utc::now(),
        })
    }

    async fn schema_summary(&self) -> GraphResult<String> {
        let labels = self
            .run_query("MATCH (n) UNWIND labels(n) AS label RETURN DISTINCT label ORDER BY label")
            .await?;
        let rel_types = self
            .run_query("MATCH ()-[r]->() RETURN DISTINCT type(r) AS kind ORDER BY kind")
            .await?;

        let labels: Vec<String> = labels
            .rows
            .iter()
            .filter_map(|row| row.first().and_then(|v| v.as_str()).map(String::from))
            .collect();
        let rel_types: Vec<String> = rel_types
            .rows
            .iter()
            .filter_map(|row| row.first().and_then(|v| v.as_str()).map(String::from))
            .collect();

        Ok(format!(
            "Node labels: [{}]. Relationship types: [{}].",
            labels.join(", "),
            rel_types.join(", ")
        ))
    }
}
