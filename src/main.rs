//! Command-line front end for the taskforge orchestration core.
//!
//! Only the completion tool is registered here; embedders supply real
//! file and shell tools through `taskforge_tools::ToolRegistry`.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use taskforge::services::TaskStatus;
use taskforge::{logging, AgentContext, AppConfig, ConfigService};
use taskforge_core::StreamEvent;
use taskforge_llm::{generate_code_stream, Message, PromptData};
use taskforge_tools::ToolRegistry;

/// Exit status when the task did not complete
const EXIT_INCOMPLETE: i32 = 2;

#[derive(Parser)]
#[command(name = "taskforge", version, about = "Drive coding tasks against a language model")]
struct Cli {
    /// Config file to use instead of ~/.taskforge/config.json
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging when RUST_LOG is unset
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a task through the session loop until reflection settles it.
    Run {
        task: String,
        /// Override session.max_attempts
        #[arg(long)]
        max_attempts: Option<u32>,
    },
    /// Stream a plain completion to stdout.
    Ask { prompt: String },
    /// Show how the tool-choice classifier labels a message.
    Classify { text: String },
    /// Print the effective configuration with the API key masked.
    Config,
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("failed to start runtime: {}", err);
            std::process::exit(1);
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    let mut config = load_config(cli.config)?;

    match cli.command {
        Command::Run { task, max_attempts } => {
            if let Some(n) = max_attempts {
                config.session.max_attempts = n;
            }
            cmd_run(config, &task).await
        }
        Command::Ask { prompt } => cmd_ask(config, &prompt).await,
        Command::Classify { text } => cmd_classify(config, &text),
        Command::Config => cmd_config(config),
    }
}

fn load_config(path: Option<PathBuf>) -> Result<AppConfig> {
    let service = match path {
        Some(path) => ConfigService::open(path),
        None => ConfigService::new(),
    }
    .context("open config")?;
    Ok(service.effective_config()?)
}

/// Token cancelled on Ctrl-C.
fn interrupt_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\ninterrupted");
            token.cancel();
        }
    });
    cancel
}

async fn cmd_run(config: AppConfig, task: &str) -> Result<i32> {
    let ctx = AgentContext::new(config)?;
    let tools = Arc::new(ToolRegistry::with_completion_tool());
    let (tx, rx) = mpsc::channel(64);
    let mut session = ctx.new_session(task, tools).await?.with_event_sink(tx);

    let printer = tokio::spawn(print_events(rx));
    let cancel = interrupt_token();
    let result = session.process_task(&cancel).await;
    session.close();
    let _ = printer.await;

    let outcome = result?;
    eprintln!(
        "\n{} after {} attempt(s); {} tokens in, {} out",
        match outcome.status {
            TaskStatus::Completed => "completed",
            TaskStatus::Incomplete => "incomplete",
            TaskStatus::Failed => "failed",
        },
        outcome.attempts,
        outcome.usage.input_tokens,
        outcome.usage.output_tokens
    );
    if let Some(reflection) = &outcome.reflection {
        eprintln!("reason: {}", reflection.reason);
    }
    if let Some(error) = &outcome.error {
        eprintln!("error: {}", error);
    }

    Ok(match outcome.status {
        TaskStatus::Completed => 0,
        TaskStatus::Incomplete | TaskStatus::Failed => EXIT_INCOMPLETE,
    })
}

async fn print_events(mut rx: mpsc::Receiver<StreamEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            StreamEvent::TextDelta { content } => println!("{}", content),
            StreamEvent::ToolStart {
                tool_name,
                arguments,
                ..
            } => eprintln!("-> {} {}", tool_name, arguments.unwrap_or_default()),
            StreamEvent::ToolResult { error: Some(e), .. } => eprintln!("   error: {}", e),
            StreamEvent::Error { message, .. } => eprintln!("provider error: {}", message),
            _ => {}
        }
    }
}

async fn cmd_ask(config: AppConfig, prompt: &str) -> Result<i32> {
    let ctx = AgentContext::new(config)?;
    let provider = ctx.create_provider()?;
    let cancel = interrupt_token();

    let mut stream = generate_code_stream(
        provider,
        cancel,
        PromptData::new(vec![Message::user(prompt)]),
    );

    let mut stdout = std::io::stdout();
    while let Some(chunk) = stream.text.recv().await {
        stdout.write_all(chunk.as_bytes()).context("write stdout")?;
        stdout.flush().context("flush stdout")?;
    }
    println!();

    if let Some(err) = stream.error.recv().await {
        return Err(err).context("stream failed");
    }
    Ok(0)
}

fn cmd_classify(config: AppConfig, text: &str) -> Result<i32> {
    let ctx = AgentContext::new(config)?;
    let intent = ctx.classifier().classify(text);
    println!("{} -> {:?}", intent, intent.tool_mode());
    Ok(0)
}

fn cmd_config(mut config: AppConfig) -> Result<i32> {
    if let Some(key) = config.provider.api_key.as_mut() {
        *key = mask_key(key);
    }
    println!(
        "{}",
        serde_json::to_string_pretty(&config).context("serialize config")?
    );
    Ok(0)
}

fn mask_key(key: &str) -> String {
    let tail: String = key
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("****{}", tail)
}
