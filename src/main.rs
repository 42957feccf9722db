// Parley - interactive console front end

use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::Instant;

use parley::{AppConfig, Collaborators, Command, Conversation};

#[derive(Debug, Parser)]
#[command(name = "parley", version, about = "Talk to the Parley decision core from a terminal")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "parley.toml")]
    config: PathBuf,

    /// Attach a text document to every command
    #[arg(short, long)]
    document: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long)]
    verbose: bool,
}

/// Filter used when RUST_LOG is unset or invalid
const DEFAULT_FILTER: &str = "info";

fn fallback_filter(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        DEFAULT_FILTER
    }
}

fn init_tracing(verbose: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(fallback_filter(verbose)))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_config(path: &PathBuf) -> anyhow::Result<AppConfig> {
    if path.exists() {
        return AppConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()));
    }
    tracing::warn!(path = %path.display(), "configuration file not found; using defaults");
    let mut config = AppConfig::default();
    config.apply_remote_api_key(std::env::var(parley::config::REMOTE_API_KEY_ENV).ok());
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(&cli.config)?;
    let document = match &cli.document {
        Some(path) => Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading document {}", path.display()))?,
        ),
        None => None,
    };
    let conversation = Conversation::from_config(&config, Collaborators::new())?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut window_until: Option<Instant> = None;
    let mut stdout = tokio::io::stdout();

    // utterances heard during a plan that still need an answer
    let mut backlog: VecDeque<String> = VecDeque::new();

    stdout.write_all(b"> ").await?;
    stdout.flush().await?;
    loop {
        let line = match backlog.pop_front() {
            Some(queued) => {
                stdout.write_all(format!("{}\n", queued).as_bytes()).await?;
                queued
            }
            None => match lines.next_line().await? {
                Some(line) => line,
                None => break,
            },
        };
        let line = line.trim();
        if line.is_empty() {
            stdout.write_all(b"> ").await?;
            stdout.flush().await?;
            continue;
        }

        let in_window = window_until.is_some_and(|deadline| Instant::now() < deadline);
        let mut command = Command::new(line).in_window(in_window);
        if let Some(document) = &document {
            command = command.with_document(document.clone());
        }

        let (tx, mut rx) = mpsc::channel::<String>(64);
        let printer = tokio::spawn(async move {
            let mut out = tokio::io::stdout();
            while let Some(token) = rx.recv().await {
                let _ = out.write_all(token.as_bytes()).await;
                let _ = out.flush().await;
            }
        });

        let reply = conversation.respond_streaming(command, tx).await;
        printer.await?;
        backlog.extend(reply.unhandled.iter().cloned());

        if reply.dropped {
            stdout.write_all(b"(ignored)\n").await?;
        } else {
            stdout.write_all(b"\n").await?;
        }

        window_until = if reply.close_window {
            None
        } else {
            reply
                .open_window_secs
                .map(|secs| Instant::now() + Duration::from_secs(secs))
        };

        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
    }

    Ok(())
}
