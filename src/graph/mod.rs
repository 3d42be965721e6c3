//! Graph store adapters for the knowledge graph.
//!
//! One backend-agnostic [`GraphStore`] trait over two backends: a property
//! graph reached with Cypher ([`Neo4jStore`]) and a triple store reached
//! with SPARQL ([`Rdf4jStore`]). The backend is selected once, at session
//! construction, via [`connect`]; callers never branch on backend kind.

mod neo4j;
mod rdf4j;

pub use neo4j::Neo4jStore;
pub use rdf4j::Rdf4jStore;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{DbChoice, GraphConfig};
use crate::error::{AppError, GraphResult};

/// Query dialect spoken by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryDialect {
    Cypher,
    Sparql,
}

impl std::fmt::Display for QueryDialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryDialect::Cypher => write!(f, "cypher"),
            QueryDialect::Sparql => write!(f, "sparql"),
        }
    }
}

/// Tabular result of a read query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultSet {
    /// Column (or binding variable) names.
    pub columns: Vec<String>,
    /// One entry per result row, aligned with `columns`.
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl ResultSet {
    /// Whether the query matched nothing.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of result rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Compact single-string rendering for prompts and evidence logs.
    pub fn render(&self) -> String {
        if self.rows.is_empty() {
            return "(no results)".to_string();
        }
        let mut out = self.columns.join(" | ");
        for row in &self.rows {
            out.push('\n');
            let cells: Vec<String> = row.iter().map(|v| v.to_string()).collect();
            out.push_str(&cells.join(" | "));
        }
        out
    }
}

/// Outcome of a successful mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationResult {
    /// Whether the backend reported any change.
    pub contains_updates: bool,
    /// Backend-reported change summary, for evidence logs.
    pub summary: String,
}

/// Serialized knowledge-graph snapshot.
///
/// Snapshots are deterministic: exporting twice without intervening
/// mutations yields byte-identical data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSnapshot {
    /// Dialect of the backend the snapshot came from.
    pub dialect: QueryDialect,
    /// File extension for the serialization format.
    pub format: String,
    /// The serialized graph.
    pub data: String,
    /// When the snapshot was taken.
    pub taken_at: DateTime<Utc>,
}

impl GraphSnapshot {
    /// Persist the snapshot under `dir`, named after the session.
    ///
    /// Re-exporting overwrites the previous file for the same session.
    pub fn write_to(&self, dir: &Path, session_id: &str) -> GraphResult<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.{}", session_id, self.format));
        std::fs::write(&path, &self.data)?;
        Ok(path)
    }
}

/// Uniform interface over the graph backends.
///
/// Mutations are durable immediately (one transaction per call, no
/// batching), so a crash mid-session loses at most the in-flight step.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Dialect this backend accepts. Used only to select prompt templates,
    /// never for call-site branching.
    fn dialect(&self) -> QueryDialect;

    /// Run a read query against the knowledge graph.
    async fn run_query(&self, query: &str) -> GraphResult<ResultSet>;

    /// Apply a mutation. Each call is a single transaction.
    async fn apply_mutation(&self, query: &str) -> GraphResult<MutationResult>;

    /// Export the full graph as a deterministic serialized snapshot.
    async fn export_snapshot(&self) -> GraphResult<GraphSnapshot>;

    /// Compact schema description (labels, relationship types or
    /// predicates) for synthesis prompts.
    async fn schema_summary(&self) -> GraphResult<String>;
}

/// Substitute the `{session}` placeholder in a namespace setting.
///
/// Lets concurrent sessions share one server while writing to disjoint
/// databases/repositories.
pub(crate) fn session_namespace(template: &str, session_id: &str) -> String {
    template.replace("{session}", session_id)
}

/// Construct the configured backend for one session.
///
/// This is the single point where `db_choice` is consulted.
pub fn connect(config: &GraphConfig, session_id: &str) -> Result<Arc<dyn GraphStore>, AppError> {
    let store: Arc<dyn GraphStore> = match config.db_choice {
        DbChoice::Neo4j => Arc::new(Neo4jStore::new(config, session_id).map_err(AppError::Graph)?),
        DbChoice::Rdf4j => Arc::new(Rdf4jStore::new(config, session_id).map_err(AppError::Graph)?),
    };
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_set_empty() {
        let rs = ResultSet::default();
        assert!(rs.is_empty());
        assert_eq!(rs.len(), 0);
        assert_eq!(rs.render(), "(no results)");
    }

    #[test]
    fn test_result_set_render() {
        let rs = ResultSet {
            columns: vec!["name".to_string(), "year".to_string()],
            rows: vec![vec![
                serde_json::json!("Apollo 11"),
                serde_json::json!(1969),
            ]],
        };
        let rendered = rs.render();
        assert!(rendered.starts_with("name | year"));
        assert!(rendered.contains("\"Apollo 11\" | 1969"));
    }

    #[test]
    fn test_session_namespace_substitution() {
        assert_eq!(session_namespace("kgot-{session}", "abc"), "kgot-abc");
        assert_eq!(session_namespace("neo4j", "abc"), "neo4j");
    }

    #[test]
    fn test_snapshot_write_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = GraphSnapshot {
            dialect: QueryDialect::Cypher,
            format: "json".to_string(),
            data: r#"{"nodes": []}"#.to_string(),
            taken_at: Utc::now(),
        };

        let first = snapshot.write_to(dir.path(), "sess-1").unwrap();
        let second = snapshot.write_to(dir.path(), "sess-1").unwrap();
        assert_eq!(first, second);
        assert_eq!(std::fs::read_to_string(&first).unwrap(), snapshot.data);
    }

    #[test]
    fn test_dialect_display() {
        assert_eq!(QueryDialect::Cypher.to_string(), "cypher");
        assert_eq!(QueryDialect::Sparql.to_string(), "sparql");
    }
}
