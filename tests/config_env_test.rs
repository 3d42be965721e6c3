//! Config environment variable tests
//!
//! These tests verify that Config::from_env() correctly reads and applies
//! environment variable overrides.
//!
//! Tests use #[serial] to prevent race conditions with shared env vars.

use kgot::config::{Config, ControllerStrategy, DbChoice, LogFormat, ToolSet};
use serial_test::serial;
use std::env;

fn set_required_vars() {
    env::set_var("KGOT_LLM_API_KEY", "test-key");
}

#[test]
#[serial]
fn test_config_from_env_requires_api_key() {
    env::remove_var("KGOT_LLM_API_KEY");
    let result = Config::from_env();
    // Succeeds only if a .env file provides the key; otherwise errors.
    if let Err(e) = result {
        assert!(e.to_string().contains("KGOT_LLM_API_KEY"));
    }
}

#[test]
#[serial]
fn test_config_from_env_defaults() {
    set_required_vars();
    env::remove_var("KGOT_DB_CHOICE");
    env::remove_var("KGOT_MAX_ITERATIONS");

    let config = Config::from_env().unwrap();
    assert_eq!(config.graph.db_choice, DbChoice::Neo4j);
    assert_eq!(config.budgets.max_iterations, 7);
    assert_eq!(config.budgets.max_tool_retries, 6);
    assert_eq!(config.tools.tool_set, ToolSet::Full);
    assert!(!config.controller.zero_shot);
    assert!(!config.controller.format_output);
}

#[test]
#[serial]
fn test_config_from_env_db_choice() {
    set_required_vars();
    env::set_var("KGOT_DB_CHOICE", "rdf4j");

    let config = Config::from_env().unwrap();
    assert_eq!(config.graph.db_choice, DbChoice::Rdf4j);

    env::remove_var("KGOT_DB_CHOICE");
}

#[test]
#[serial]
fn test_config_from_env_budget_overrides() {
    set_required_vars();
    env::set_var("KGOT_MAX_ITERATIONS", "3");
    env::set_var("KGOT_NUM_NEXT_STEPS_DECISION", "5");
    env::set_var("KGOT_MAX_RETRIEVE_QUERY_RETRY", "2");
    env::set_var("KGOT_MAX_CYPHER_FIXING_RETRY", "4");
    env::set_var("KGOT_MAX_FINAL_SOLUTION_PARSING", "1");
    env::set_var("KGOT_MAX_TOOL_RETRIES", "9");
    env::set_var("KGOT_MAX_LLM_RETRIES", "8");

    let config = Config::from_env().unwrap();
    assert_eq!(config.budgets.max_iterations, 3);
    assert_eq!(config.budgets.num_next_steps_decision, 5);
    assert_eq!(config.budgets.max_retrieve_query_retry, 2);
    assert_eq!(config.budgets.max_cypher_fixing_retry, 4);
    assert_eq!(config.budgets.max_final_solution_parsing, 1);
    assert_eq!(config.budgets.max_tool_retries, 9);
    assert_eq!(config.budgets.max_llm_retries, 8);

    for key in [
        "KGOT_MAX_ITERATIONS",
        "KGOT_NUM_NEXT_STEPS_DECISION",
        "KGOT_MAX_RETRIEVE_QUERY_RETRY",
        "KGOT_MAX_CYPHER_FIXING_RETRY",
        "KGOT_MAX_FINAL_SOLUTION_PARSING",
        "KGOT_MAX_TOOL_RETRIES",
        "KGOT_MAX_LLM_RETRIES",
    ] {
        env::remove_var(key);
    }
}

#[test]
#[serial]
fn test_config_from_env_controller_flags() {
    set_required_vars();
    env::set_var("KGOT_CONTROLLER_STRATEGY", "first");
    env::set_var("KGOT_ZERO_SHOT", "true");
    env::set_var("KGOT_FORMAT_OUTPUT", "true");
    env::set_var("KGOT_TOOL_SET", "minimal");

    let config = Config::from_env().unwrap();
    assert_eq!(config.controller.strategy, ControllerStrategy::First);
    assert!(config.controller.zero_shot);
    assert!(config.controller.format_output);
    assert_eq!(config.tools.tool_set, ToolSet::Minimal);

    for key in [
        "KGOT_CONTROLLER_STRATEGY",
        "KGOT_ZERO_SHOT",
        "KGOT_FORMAT_OUTPUT",
        "KGOT_TOOL_SET",
    ] {
        env::remove_var(key);
    }
}

#[test]
#[serial]
fn test_config_from_env_endpoints() {
    set_required_vars();
    env::set_var("KGOT_NEO4J_URL", "http://graph:7474");
    env::set_var("KGOT_NEO4J_DATABASE", "kgot-{session}");
    env::set_var("KGOT_RDF4J_URL", "http://triples:8080/rdf4j-server");
    env::set_var("KGOT_EXECUTOR_URL", "http://executor:16000");
    env::set_var("KGOT_SNAPSHOT_DIR", "/var/lib/kgot/snapshots");

    let config = Config::from_env().unwrap();
    assert_eq!(config.graph.neo4j.base_url, "http://graph:7474");
    assert_eq!(config.graph.neo4j.database, "kgot-{session}");
    assert_eq!(
        config.graph.rdf4j.base_url,
        "http://triples:8080/rdf4j-server"
    );
    assert_eq!(config.tools.executor_url, "http://executor:16000");
    assert_eq!(
        config.graph.snapshot_dir.to_str().unwrap(),
        "/var/lib/kgot/snapshots"
    );

    for key in [
        "KGOT_NEO4J_URL",
        "KGOT_NEO4J_DATABASE",
        "KGOT_RDF4J_URL",
        "KGOT_EXECUTOR_URL",
        "KGOT_SNAPSHOT_DIR",
    ] {
        env::remove_var(key);
    }
}

#[test]
#[serial]
fn test_config_from_env_invalid_numbers_fall_back() {
    set_required_vars();
    env::set_var("KGOT_MAX_ITERATIONS", "not-a-number");

    let config = Config::from_env().unwrap();
    assert_eq!(config.budgets.max_iterations, 7);

    env::remove_var("KGOT_MAX_ITERATIONS");
}

#[test]
#[serial]
fn test_config_from_env_json_log_format() {
    set_required_vars();
    env::set_var("LOG_FORMAT", "json");

    let config = Config::from_env().unwrap();
    assert_eq!(config.logging.format, LogFormat::Json);

    env::set_var("LOG_FORMAT", "pretty");
}

#[test]
#[serial]
fn test_config_from_env_models() {
    set_required_vars();
    env::set_var("KGOT_PLANNER_MODEL", "gpt-4o");
    env::set_var("KGOT_PLANNER_TEMPERATURE", "0.3");
    env::set_var("KGOT_EXECUTOR_MODEL", "gpt-4o-mini");
    env::set_var("KGOT_EXECUTOR_TEMPERATURE", "0.1");

    let config = Config::from_env().unwrap();
    assert_eq!(config.llm.planner_model, "gpt-4o");
    assert_eq!(config.llm.planner_temperature, 0.3);
    assert_eq!(config.llm.executor_model, "gpt-4o-mini");
    assert_eq!(config.llm.executor_temperature, 0.1);

    for key in [
        "KGOT_PLANNER_MODEL",
        "KGOT_PLANNER_TEMPERATURE",
        "KGOT_EXECUTOR_MODEL",
        "KGOT_EXECUTOR_TEMPERATURE",
    ] {
        env::remove_var(key);
    }
}
