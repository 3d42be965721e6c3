use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use kgot::controller::ControllerState;
use kgot::{graph, Config, Controller, Session};

/// Answer a question by building and querying a knowledge graph.
#[derive(Debug, Parser)]
#[command(name = "kgot", version, about)]
struct Cli {
    /// The question to answer.
    question: String,

    /// Attachment paths or URIs supplied with the question.
    #[arg(long = "attachment")]
    attachments: Vec<String>,

    /// Answer directly from the model without building a graph.
    #[arg(long)]
    zero_shot: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    if cli.zero_shot {
        config.controller.zero_shot = true;
    }

    // Initialize logging
    init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        backend = %config.graph.db_choice,
        "KGoT starting"
    );

    let session = Session::new(cli.question).with_attachments(cli.attachments);

    let store = match graph::connect(&config.graph, &session.id) {
        Ok(s) => {
            info!(backend = %config.graph.db_choice, "Graph store connected");
            s
        }
        Err(e) => {
            error!(error = %e, "Failed to construct graph store");
            return Err(e.into());
        }
    };

    let controller = Controller::new(config, store)?;

    // Abort the session cleanly on Ctrl-C; in-flight calls are cancelled.
    let cancel = controller.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let report = controller.run(session).await;

    match report.terminal_state {
        ControllerState::Finalizing => {
            let answer = report
                .answer
                .as_ref()
                .map(|a| a.answer.as_str())
                .unwrap_or("(no answer)");
            println!("{}", answer);
            if report.forced_finalize {
                info!("Answer is best-effort: the iteration bound was reached");
            }
            if let Some(path) = &report.snapshot_path {
                info!(path = %path.display(), "Knowledge graph snapshot saved");
            }
            Ok(())
        }
        _ => {
            let reason = report.failure.unwrap_or_else(|| "unknown failure".to_string());
            error!(
                steps = report.session.steps.len(),
                reason = %reason,
                "Session failed"
            );
            anyhow::bail!("session failed: {}", reason)
        }
    }
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        kgot::config::LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        kgot::config::LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
