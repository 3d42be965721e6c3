use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::AppError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub llm: LlmConfig,
    pub graph: GraphConfig,
    pub tools: ToolsConfig,
    pub budgets: BudgetConfig,
    pub controller: ControllerConfig,
    pub logging: LoggingConfig,
}

/// LLM provider configuration.
///
/// The planning model decides the next action; the execution model writes
/// queries and extracts answers. Each is independently configurable.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub planner_model: String,
    pub planner_temperature: f64,
    pub executor_model: String,
    pub executor_temperature: f64,
    pub timeout_ms: u64,
}

/// Graph backend selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DbChoice {
    #[default]
    Neo4j,
    Rdf4j,
}

impl std::fmt::Display for DbChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DbChoice::Neo4j => write!(f, "neo4j"),
            DbChoice::Rdf4j => write!(f, "rdf4j"),
        }
    }
}

impl FromStr for DbChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "neo4j" => Ok(DbChoice::Neo4j),
            "rdf4j" => Ok(DbChoice::Rdf4j),
            _ => Err(format!("Unknown db choice: {}", s)),
        }
    }
}

/// Graph backend configuration
#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub db_choice: DbChoice,
    pub neo4j: Neo4jConfig,
    pub rdf4j: Rdf4jConfig,
    /// Directory where knowledge-graph snapshots are exported.
    pub snapshot_dir: PathBuf,
    pub timeout_ms: u64,
}

/// Neo4j connection settings (HTTP transactional endpoint)
#[derive(Debug, Clone)]
pub struct Neo4jConfig {
    pub base_url: String,
    pub database: String,
    pub user: String,
    pub password: String,
}

/// RDF4J repository settings
#[derive(Debug, Clone)]
pub struct Rdf4jConfig {
    pub base_url: String,
    pub repository: String,
}

/// Tool selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ToolSet {
    /// Code execution, web search, and page fetch.
    #[default]
    Full,
    /// Code execution only.
    Minimal,
}

impl FromStr for ToolSet {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "full" => Ok(ToolSet::Full),
            "minimal" => Ok(ToolSet::Minimal),
            _ => Err(format!("Unknown tool set: {}", s)),
        }
    }
}

/// External tool configuration
#[derive(Debug, Clone)]
pub struct ToolsConfig {
    /// Code execution sandbox endpoint.
    pub executor_url: String,
    /// SearxNG instance for web search.
    pub searxng_url: String,
    pub tool_set: ToolSet,
    /// Hard timeout per tool attempt.
    pub timeout_ms: u64,
}

/// Iteration and retry budgets.
///
/// Every retryable operation in the system is bounded by one of these
/// ceilings; none may be bypassed.
#[derive(Debug, Clone)]
pub struct BudgetConfig {
    /// Planning cycles before forced finalization.
    pub max_iterations: u32,
    /// Candidate actions the planner may propose per decision.
    pub num_next_steps_decision: u32,
    /// Fresh query generations per retrieval goal.
    pub max_retrieve_query_retry: u32,
    /// Correction attempts per malformed query.
    pub max_cypher_fixing_retry: u32,
    /// Parse attempts for the structured final answer.
    pub max_final_solution_parsing: u32,
    /// Attempts per tool invocation.
    pub max_tool_retries: u32,
    /// Attempts per LLM call.
    pub max_llm_retries: u32,
    /// Base delay for exponential backoff.
    pub retry_delay_ms: u64,
}

/// Controller behavior selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ControllerStrategy {
    /// Rank planner candidates by reported confidence; earliest wins ties.
    #[default]
    Confidence,
    /// Always take the earliest proposed candidate.
    First,
}

impl FromStr for ControllerStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "confidence" => Ok(ControllerStrategy::Confidence),
            "first" => Ok(ControllerStrategy::First),
            _ => Err(format!("Unknown controller strategy: {}", s)),
        }
    }
}

/// Controller configuration
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub strategy: ControllerStrategy,
    /// Answer directly from the execution model without building a graph.
    pub zero_shot: bool,
    /// Run a final formatting pass over the extracted answer.
    pub format_output: bool,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let llm = LlmConfig {
            api_key: env::var("KGOT_LLM_API_KEY").map_err(|_| AppError::Config {
                message: "KGOT_LLM_API_KEY is required".to_string(),
            })?,
            base_url: env::var("KGOT_LLM_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com".to_string()),
            planner_model: env::var("KGOT_PLANNER_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            planner_temperature: env_parse("KGOT_PLANNER_TEMPERATURE", 0.0),
            executor_model: env::var("KGOT_EXECUTOR_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            executor_temperature: env_parse("KGOT_EXECUTOR_TEMPERATURE", 0.0),
            timeout_ms: env_parse("KGOT_LLM_TIMEOUT_MS", 60_000),
        };

        let graph = GraphConfig {
            db_choice: env_parse("KGOT_DB_CHOICE", DbChoice::Neo4j),
            neo4j: Neo4jConfig {
                base_url: env::var("KGOT_NEO4J_URL")
                    .unwrap_or_else(|_| "http://localhost:7474".to_string()),
                database: env::var("KGOT_NEO4J_DATABASE").unwrap_or_else(|_| "neo4j".to_string()),
                user: env::var("KGOT_NEO4J_USER").unwrap_or_else(|_| "neo4j".to_string()),
                password: env::var("KGOT_NEO4J_PASSWORD").unwrap_or_default(),
            },
            rdf4j: Rdf4jConfig {
                base_url: env::var("KGOT_RDF4J_URL")
                    .unwrap_or_else(|_| "http://localhost:8080/rdf4j-server".to_string()),
                repository: env::var("KGOT_RDF4J_REPOSITORY")
                    .unwrap_or_else(|_| "kgot".to_string()),
            },
            snapshot_dir: PathBuf::from(
                env::var("KGOT_SNAPSHOT_DIR").unwrap_or_else(|_| "./snapshots".to_string()),
            ),
            timeout_ms: env_parse("KGOT_GRAPH_TIMEOUT_MS", 30_000),
        };

        let tools = ToolsConfig {
            executor_url: env::var("KGOT_EXECUTOR_URL")
                .unwrap_or_else(|_| "http://localhost:16000".to_string()),
            searxng_url: env::var("KGOT_SEARXNG_URL")
                .unwrap_or_else(|_| "https://searx.be".to_string()),
            tool_set: env_parse("KGOT_TOOL_SET", ToolSet::Full),
            timeout_ms: env_parse("KGOT_TOOL_TIMEOUT_MS", 120_000),
        };

        let budgets = BudgetConfig {
            max_iterations: env_parse("KGOT_MAX_ITERATIONS", 7),
            num_next_steps_decision: env_parse("KGOT_NUM_NEXT_STEPS_DECISION", 3),
            max_retrieve_query_retry: env_parse("KGOT_MAX_RETRIEVE_QUERY_RETRY", 3),
            max_cypher_fixing_retry: env_parse("KGOT_MAX_CYPHER_FIXING_RETRY", 3),
            max_final_solution_parsing: env_parse("KGOT_MAX_FINAL_SOLUTION_PARSING", 3),
            max_tool_retries: env_parse("KGOT_MAX_TOOL_RETRIES", 6),
            max_llm_retries: env_parse("KGOT_MAX_LLM_RETRIES", 6),
            retry_delay_ms: env_parse("KGOT_RETRY_DELAY_MS", 1000),
        };

        let controller = ControllerConfig {
            strategy: env_parse("KGOT_CONTROLLER_STRATEGY", ControllerStrategy::Confidence),
            zero_shot: env_parse("KGOT_ZERO_SHOT", false),
            format_output: env_parse("KGOT_FORMAT_OUTPUT", false),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        Ok(Config {
            llm,
            graph,
            tools,
            budgets,
            controller,
            logging,
        })
    }
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_iterations: 7,
            num_next_steps_decision: 3,
            max_retrieve_query_retry: 3,
            max_cypher_fixing_retry: 3,
            max_final_solution_parsing: 3,
            max_tool_retries: 6,
            max_llm_retries: 6,
            retry_delay_ms: 1000,
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            strategy: ControllerStrategy::Confidence,
            zero_shot: false,
            format_output: false,
        }
    }
}
