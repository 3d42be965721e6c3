//! Integration tests for the graph store adapters
//!
//! Both backends are exercised against wiremock servers speaking their
//! native wire formats; the trait surface is identical across them.

use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use kgot::config::{DbChoice, GraphConfig, Neo4jConfig, Rdf4jConfig};
use kgot::error::GraphError;
use kgot::graph::{self, GraphStore, Neo4jStore, QueryDialect, Rdf4jStore};

fn graph_config(neo4j_url: &str, rdf4j_url: &str, db_choice: DbChoice) -> GraphConfig {
    GraphConfig {
        db_choice,
        neo4j: Neo4jConfig {
            base_url: neo4j_url.to_string(),
            database: "neo4j".to_string(),
            user: "neo4j".to_string(),
            password: "secret".to_string(),
        },
        rdf4j: Rdf4jConfig {
            base_url: rdf4j_url.to_string(),
            repository: "kgot".to_string(),
        },
        snapshot_dir: std::env::temp_dir(),
        timeout_ms: 2000,
    }
}

fn neo4j_rows_body() -> serde_json::Value {
    json!({
        "results": [{
            "columns": ["name", "year"],
            "data": [
                {"row": ["Apollo 11", 1969]},
                {"row": ["Apollo 12", 1969]}
            ]
        }],
        "errors": []
    })
}

mod neo4j_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_run_query_parses_rows() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/db/neo4j/tx/commit"))
            .respond_with(ResponseTemplate::new(200).set_body_json(neo4j_rows_body()))
            .mount(&server)
            .await;

        let config = graph_config(&server.uri(), "http://localhost:1", DbChoice::Neo4j);
        let store = Neo4jStore::new(&config, "s1").unwrap();

        let results = store.run_query("MATCH (m:Mission) RETURN m.name, m.year").await.unwrap();
        assert_eq!(results.columns, vec!["name", "year"]);
        assert_eq!(results.len(), 2);
        assert_eq!(results.rows[0][0], json!("Apollo 11"));
    }

    #[tokio::test]
    async fn test_syntax_error_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/db/neo4j/tx/commit"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [],
                "errors": [{
                    "code": "Neo.ClientError.Statement.SyntaxError",
                    "message": "Invalid input 'MTCH'"
                }]
            })))
            .mount(&server)
            .await;

        let config = graph_config(&server.uri(), "http://localhost:1", DbChoice::Neo4j);
        let store = Neo4jStore::new(&config, "s1").unwrap();

        let err = store.run_query("MTCH (n) RETURN n").await.unwrap_err();
        assert!(err.is_retryable());
        assert!(!err.is_session_fatal());
        match err {
            GraphError::Syntax { query, .. } => assert_eq!(query, "MTCH (n) RETURN n"),
            other => panic!("expected Syntax, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_connection_refused_is_session_fatal() {
        // Nothing listens on this port.
        let config = graph_config("http://127.0.0.1:9", "http://localhost:1", DbChoice::Neo4j);
        let store = Neo4jStore::new(&config, "s1").unwrap();

        let err = store.run_query("MATCH (n) RETURN n").await.unwrap_err();
        assert!(err.is_session_fatal());
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_mutation_reports_stats() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/db/neo4j/tx/commit"))
            .and(body_string_contains("includeStats"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{
                    "columns": [],
                    "data": [],
                    "stats": {"contains_updates": true, "nodes_created": 1}
                }],
                "errors": []
            })))
            .mount(&server)
            .await;

        let config = graph_config(&server.uri(), "http://localhost:1", DbChoice::Neo4j);
        let store = Neo4jStore::new(&config, "s1").unwrap();

        let result = store
            .apply_mutation("MERGE (m:Mission {name: 'Apollo 11'})")
            .await
            .unwrap();
        assert!(result.contains_updates);
        assert!(result.summary.contains("nodes_created"));
    }

    #[tokio::test]
    async fn test_mutation_then_query_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/db/neo4j/tx/commit"))
            .and(body_string_contains("MERGE"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{"columns": [], "data": [], "stats": {"contains_updates": true}}],
                "errors": []
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/db/neo4j/tx/commit"))
            .and(body_string_contains("MATCH"))
            .respond_with(ResponseTemplate::new(200).set_body_json(neo4j_rows_body()))
            .mount(&server)
            .await;

        let config = graph_config(&server.uri(), "http://localhost:1", DbChoice::Neo4j);
        let store = Neo4jStore::new(&config, "s1").unwrap();

        let mutation = store
            .apply_mutation("MERGE (m:Mission {name: 'Apollo 11', year: 1969})")
            .await
            .unwrap();
        assert!(mutation.contains_updates);

        let results = store
            .run_query("MATCH (m:Mission) RETURN m.name, m.year")
            .await
            .unwrap();
        assert!(results
            .rows
            .iter()
            .any(|row| row[0] == json!("Apollo 11")));
    }

    #[tokio::test]
    async fn test_export_snapshot_is_idempotent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/db/neo4j/tx/commit"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    {"columns": ["id", "labels", "props"], "data": [{"row": [0, ["Mission"], {"name": "Apollo 11"}]}]},
                    {"columns": ["id", "source", "kind", "target", "props"], "data": []}
                ],
                "errors": []
            })))
            .mount(&server)
            .await;

        let config = graph_config(&server.uri(), "http://localhost:1", DbChoice::Neo4j);
        let store = Neo4jStore::new(&config, "s1").unwrap();

        let first = store.export_snapshot().await.unwrap();
        let second = store.export_snapshot().await.unwrap();
        assert_eq!(first.data, second.data);
        assert_eq!(first.format, "json");
        assert!(first.data.contains("Apollo 11"));
    }

    #[tokio::test]
    async fn test_schema_summary_lists_labels() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/db/neo4j/tx/commit"))
            .and(body_string_contains("labels"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{"columns": ["label"], "data": [{"row": ["Mission"]}, {"row": ["Person"]}]}],
                "errors": []
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/db/neo4j/tx/commit"))
            .and(body_string_contains("type(r)"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{"columns": ["kind"], "data": [{"row": ["CREWED_BY"]}]}],
                "errors": []
            })))
            .mount(&server)
            .await;

        let config = graph_config(&server.uri(), "http://localhost:1", DbChoice::Neo4j);
        let store = Neo4jStore::new(&config, "s1").unwrap();

        let summary = store.schema_summary().await.unwrap();
        assert!(summary.contains("Mission"));
        assert!(summary.contains("CREWED_BY"));
    }
}

mod rdf4j_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_run_query_parses_bindings() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repositories/kgot"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "head": {"vars": ["s", "o"]},
                "results": {"bindings": [
                    {"s": {"type": "uri", "value": "urn:kgot:apollo11"},
                     "o": {"type": "literal", "value": "1969"}}
                ]}
            })))
            .mount(&server)
            .await;

        let config = graph_config("http://localhost:1", &server.uri(), DbChoice::Rdf4j);
        let store = Rdf4jStore::new(&config, "s1").unwrap();

        let results = store
            .run_query("SELECT ?s ?o WHERE { ?s <urn:kgot:landed_in> ?o }")
            .await
            .unwrap();
        assert_eq!(results.columns, vec!["s", "o"]);
        assert_eq!(results.rows[0][1], json!("1969"));
    }

    #[tokio::test]
    async fn test_ask_query_returns_boolean_row() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repositories/kgot"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"head": {}, "boolean": true})),
            )
            .mount(&server)
            .await;

        let config = graph_config("http://localhost:1", &server.uri(), DbChoice::Rdf4j);
        let store = Rdf4jStore::new(&config, "s1").unwrap();

        let results = store.run_query("ASK { ?s ?p ?o }").await.unwrap();
        assert_eq!(results.columns, vec!["boolean"]);
        assert_eq!(results.rows[0][0], json!(true));
    }

    #[tokio::test]
    async fn test_malformed_update_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repositories/kgot/statements"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_string("MALFORMED QUERY: Encountered \"INSER\""),
            )
            .mount(&server)
            .await;

        let config = graph_config("http://localhost:1", &server.uri(), DbChoice::Rdf4j);
        let store = Rdf4jStore::new(&config, "s1").unwrap();

        let err = store
            .apply_mutation("INSER DATA { <urn:a> <urn:b> <urn:c> }")
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_update_accepted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repositories/kgot/statements"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let config = graph_config("http://localhost:1", &server.uri(), DbChoice::Rdf4j);
        let store = Rdf4jStore::new(&config, "s1").unwrap();

        let result = store
            .apply_mutation("INSERT DATA { <urn:a> <urn:b> <urn:c> }")
            .await
            .unwrap();
        assert!(result.contains_updates);
    }

    #[tokio::test]
    async fn test_export_sorts_statements_for_determinism() {
        let server = MockServer::start().await;
        // First export returns triples in one order, second in another; the
        // adapter must normalize both to the same snapshot.
        Mock::given(method("GET"))
            .and(path("/repositories/kgot/statements"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<urn:b> <urn:p> <urn:o> .\n<urn:a> <urn:p> <urn:o> .\n",
            ))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repositories/kgot/statements"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<urn:a> <urn:p> <urn:o> .\n<urn:b> <urn:p> <urn:o> .\n",
            ))
            .mount(&server)
            .await;

        let config = graph_config("http://localhost:1", &server.uri(), DbChoice::Rdf4j);
        let store = Rdf4jStore::new(&config, "s1").unwrap();

        let first = store.export_snapshot().await.unwrap();
        let second = store.export_snapshot().await.unwrap();
        assert_eq!(first.data, second.data);
        assert!(first.data.starts_with("<urn:a>"));
        assert_eq!(first.format, "nt");
    }

    #[tokio::test]
    async fn test_connection_refused_is_session_fatal() {
        let config = graph_config("http://localhost:1", "http://127.0.0.1:9", DbChoice::Rdf4j);
        let store = Rdf4jStore::new(&config, "s1").unwrap();

        let err = store.run_query("SELECT ?s WHERE { ?s ?p ?o }").await.unwrap_err();
        assert!(err.is_session_fatal());
    }
}

#[tokio::test]
async fn test_connect_selects_backend_once() {
    let config = graph_config("http://localhost:7474", "http://localhost:8080", DbChoice::Neo4j);
    let store = graph::connect(&config, "abc").unwrap();
    assert_eq!(store.dialect(), QueryDialect::Cypher);

    let config = graph_config("http://localhost:7474", "http://localhost:8080", DbChoice::Rdf4j);
    let store = graph::connect(&config, "abc").unwrap();
    assert_eq!(store.dialect(), QueryDialect::Sparql);
}

#[tokio::test]
async fn test_concurrent_sessions_use_disjoint_namespaces() {
    let mut config = graph_config("http://localhost:7474", "http://localhost:8080", DbChoice::Neo4j);
    config.neo4j.database = "kgot-{session}".to_string();

    let a = Neo4jStore::new(&config, "session-a").unwrap();
    let b = Neo4jStore::new(&config, "session-b").unwrap();
    assert_ne!(a.endpoint(), b.endpoint());
}
