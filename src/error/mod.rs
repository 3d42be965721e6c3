use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Graph store error: {0}")]
    Graph(#[from] GraphError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Query synthesis error: {0}")]
    Synthesis(#[from] SynthesisError),

    #[error("Answer extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Graph backend errors.
///
/// Syntax errors are retryable by re-synthesis; connectivity errors are
/// session-fatal and must never be retried.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Query rejected by backend: {message}")]
    Syntax { message: String, query: String },

    #[error("Graph backend unreachable: {message}")]
    Connection { message: String },

    #[error("Backend error: {status} - {message}")]
    Backend { status: u16, message: String },

    #[error("Invalid result payload: {message}")]
    InvalidResponse { message: String },

    #[error("Snapshot I/O failed: {0}")]
    Snapshot(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl GraphError {
    /// Whether the failed query can be repaired and re-issued.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GraphError::Syntax { .. })
    }

    /// Whether this error must abort the whole session.
    pub fn is_session_fatal(&self) -> bool {
        match self {
            GraphError::Connection { .. } => true,
            GraphError::Http(e) => e.is_connect(),
            _ => false,
        }
    }
}

/// LLM provider errors
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM unavailable: {message} (retries: {retries})")]
    Exhausted { message: String, retries: u32 },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Malformed model response: {message}")]
    MalformedResponse { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Tool invocation errors, classified per the retry policy.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Transient tool failure: {message}")]
    Transient { message: String },

    #[error("Tool rejected input: {message}")]
    BadInput { message: String },

    #[error("Sandbox violation from tool '{tool_id}': {message}")]
    SandboxViolation { tool_id: String, message: String },

    #[error("Tool '{tool_id}' timed out after {timeout_ms}ms")]
    Timeout { tool_id: String, timeout_ms: u64 },

    #[error("Unknown tool: {tool_id}")]
    UnknownTool { tool_id: String },

    #[error("Tool retries exhausted after {attempts} attempts: {message}")]
    RetriesExhausted { attempts: u32, message: String },
}

impl ToolError {
    /// Transient failures are retried; deterministic ones are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ToolError::Transient { .. } | ToolError::Timeout { .. }
        )
    }

    /// Sandbox violations abort the session outright.
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, ToolError::SandboxViolation { .. })
    }
}

/// Query synthesis errors
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("Query synthesis failed after {attempts} attempts: {message}")]
    Failed { attempts: u32, message: String },

    #[error("Synthesis stopped early: {consecutive_empty} consecutive empty results for query '{query}'")]
    LowConfidence {
        consecutive_empty: u32,
        query: String,
    },

    #[error("LLM error during synthesis: {0}")]
    Llm(#[from] LlmError),

    #[error("Graph error during synthesis: {0}")]
    Graph(#[from] GraphError),
}

/// Final answer extraction errors
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Answer failed schema validation after {attempts} attempts: {message}")]
    ParseExhausted { attempts: u32, message: String },

    #[error("LLM error during extraction: {0}")]
    Llm(#[from] LlmError),
}

/// Session-fatal conditions surfaced by the controller.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Graph backend connectivity lost: {message}")]
    GraphConnectivity { message: String },

    #[error("Sandbox violation: {message}")]
    SandboxViolation { message: String },

    #[error("LLM call budget exhausted: {message}")]
    LlmExhausted { message: String },

    #[error("Session aborted")]
    Aborted,
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for graph store operations
pub type GraphResult<T> = Result<T, GraphError>;

/// Result type alias for LLM operations
pub type LlmResult<T> = Result<T, LlmError>;

/// Result type alias for tool invocations
pub type ToolResult<T> = Result<T, ToolError>;

/// Result type alias for query synthesis
pub type SynthesisResult<T> = Result<T, SynthesisError>;
