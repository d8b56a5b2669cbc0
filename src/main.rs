use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use policy_copilot::chat::{ChatError, ChatSession, StreamEnd};
use policy_copilot::config::AssistantConfig;
use policy_copilot::llm::client_from_config;
use policy_copilot::store::FileStore;
use policy_copilot::suggest::{CodeSuggester, CursorPosition};
use policy_copilot::validate::{sorted_by_position, AttributeValidator, PolicySchema, Severity};

#[derive(Parser)]
#[command(name = "policy-copilot", about = "Validate API gateway policies and ask an assistant about them.")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Report attributes the policy schema does not allow
    Validate {
        file: PathBuf,
        /// Schema catalog (YAML) instead of the built-in one
        #[arg(long)]
        schema: Option<PathBuf>,
        /// Print diagnostics as JSON
        #[arg(long)]
        json: bool,
    },
    /// Ask the assistant about a policy document; the reply streams to stdout
    Chat { file: PathBuf, message: String },
    /// Suggest text to insert at a cursor position
    Suggest {
        file: PathBuf,
        #[arg(long)]
        line: usize,
        #[arg(long)]
        column: usize,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("policy_copilot=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Validate { file, schema, json } => validate(&file, schema.as_deref(), json),
        Command::Chat { file, message } => chat(&file, &message).await,
        Command::Suggest { file, line, column } => suggest(&file, CursorPosition { line, column }).await,
    }
}

fn read_document(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn load_config() -> Result<AssistantConfig> {
    let store = FileStore::open_default().context("failed to open state store")?;
    Ok(AssistantConfig::load(&store))
}

fn validate(file: &Path, schema_path: Option<&Path>, json: bool) -> Result<ExitCode> {
    let document = read_document(file)?;
    let schema = match schema_path {
        Some(path) => PolicySchema::load(path)?,
        None => load_config()?.policy_schema()?,
    };

    let diagnostics = sorted_by_position(AttributeValidator::new(schema).validate(&document));

    if json {
        println!("{}", serde_json::to_string_pretty(&diagnostics)?);
    } else {
        for d in &diagnostics {
            let severity = match d.severity {
                Severity::Error => "error",
                Severity::Warning => "warning",
            };
            println!(
                "{}:{}:{}: {severity}: {}",
                file.display(),
                d.start_line,
                d.start_column,
                d.message
            );
        }
    }

    info!(diagnostics = diagnostics.len(), "validation finished");
    Ok(if diagnostics.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn chat(file: &Path, message: &str) -> Result<ExitCode> {
    let document = read_document(file)?;
    let client = client_from_config(&load_config()?)?;
    let session = Arc::new(ChatSession::new(client));

    let on_interrupt = {
        let session = session.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                session.cancel();
            }
        })
    };

    let result = session
        .send(message, &document, |delta, _| {
            print!("{}", delta.text);
            let _ = std::io::stdout().flush();
        })
        .await;
    on_interrupt.abort();
    println!();

    match result {
        Ok(outcome) => {
            if outcome.end == StreamEnd::Cancelled {
                eprintln!("(cancelled)");
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(ChatError::Interrupted { source, .. }) => {
            Err(anyhow::Error::new(source).context("reply interrupted"))
        }
        Err(e) => Err(e.into()),
    }
}

async fn suggest(file: &Path, cursor: CursorPosition) -> Result<ExitCode> {
    let document = read_document(file)?;
    let config = load_config()?;
    let suggester = CodeSuggester::new(client_from_config(&config)?, config.policy_schema()?);

    match suggester.suggest(&document, cursor).await? {
        Some(text) => {
            println!("{text}");
            Ok(ExitCode::SUCCESS)
        }
        None => {
            eprintln!("(no suggestion)");
            Ok(ExitCode::FAILURE)
        }
    }
}
