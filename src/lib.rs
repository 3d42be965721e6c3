//! # KGoT: Knowledge Graph of Thoughts
//!
//! An LLM-agent reasoning framework that answers complex, multi-step
//! questions by incrementally building and querying a persistent knowledge
//! graph instead of relying solely on a context window.
//!
//! ## Architecture
//!
//! ```text
//! Controller -> Step Planner -> {Query Synthesizer | Tool Invoker}
//!      ^                                 |
//!      |                                 v
//!      +--- working memory <--- Graph Store Adapter (Neo4j | RDF4J)
//! ```
//!
//! The controller loop is bounded: every retryable operation carries an
//! explicit, externally configured ceiling, and reaching the iteration
//! bound degrades gracefully to a best-effort answer instead of failing.
//!
//! ## Example
//!
//! ```ignore
//! use kgot::{graph, Config, Controller, Session};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let session = Session::new("Which mission landed on the Moon first?");
//!     let store = graph::connect(&config.graph, &session.id)?;
//!     let controller = Controller::new(config, store)?;
//!     let report = controller.run(session).await;
//!     println!("{:?}", report.answer);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

/// Configuration management.
pub mod config;
/// The orchestration state machine.
pub mod controller;
/// Error types and result aliases for the application.
pub mod error;
/// Final answer extraction.
pub mod extractor;
/// Graph store adapters (Neo4j, RDF4J).
pub mod graph;
/// LLM provider client and chat types.
pub mod llm;
/// Step planner for next-action decisions.
pub mod planner;
/// System prompts for planning, synthesis, and extraction.
pub mod prompts;
/// Session state, reasoning steps, and retry budgets.
pub mod session;
/// Query synthesis with the self-correcting repair loop.
pub mod synthesizer;
/// External tools and the retrying invoker.
pub mod tools;

pub use config::Config;
pub use controller::{Controller, ControllerState, SessionReport};
pub use error::{AppError, AppResult};
pub use extractor::FinalAnswer;
pub use session::Session;
