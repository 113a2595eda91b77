//! Stagewatch - ask the analysis pipeline a question and watch it work
//!
//! With a question on the command line it runs once and exits. Without one it
//! reads questions from stdin; a new line replaces the question still running.

mod logging;
mod render;

use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use stagewatch_core::{Config, HttpSseTransport, QueryClient, SessionSnapshot};
use tokio::io::{AsyncBufReadExt, BufReader};

use render::TranscriptRenderer;

#[derive(Parser, Debug)]
#[command(
    name = "stagewatch",
    version,
    about = "Ask the analysis pipeline a question and watch each stage arrive"
)]
struct Args {
    /// Question to ask (reads questions from stdin when omitted)
    query: Vec<String>,

    /// Config file (default: ~/.config/stagewatch/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Pipeline endpoint, overrides config and STAGEWATCH_ENDPOINT
    #[arg(long)]
    endpoint: Option<String>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long)]
    log_level: Option<String>,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Print the final session snapshot as JSON instead of the transcript
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let config = Config::load(args.config.as_deref())
        .context("failed to load configuration")?
        .apply_env()
        .with_endpoint_override(args.endpoint.clone());
    config.validate().context("invalid configuration")?;

    let level = args.log_level.as_deref().unwrap_or(&config.log_level);
    logging::init(level, args.log_file.as_deref())?;
    match Config::source_path(args.config.as_deref()) {
        Some(path) => tracing::info!("Loaded config from {}", path.display()),
        None => tracing::debug!("No config file found, using defaults"),
    }
    tracing::info!(endpoint = %config.endpoint, level = %level, "Starting stagewatch");

    let transport = HttpSseTransport::new(
        config.endpoint_url()?,
        config.query_param.clone(),
        config.connect_timeout(),
    )
    .context("failed to build HTTP client")?;
    let mut client = QueryClient::new(config.catalog()?, transport);

    let color = !args.no_color && !args.json && io::stdout().is_terminal();
    let mut renderer = TranscriptRenderer::new(io::stdout(), color);

    if args.query.is_empty() {
        interactive(&mut client, &mut renderer, args.json).await?;
        return Ok(ExitCode::SUCCESS);
    }

    let query = args.query.join(" ");
    if client.start(&query).is_none() {
        eprintln!("Nothing to ask: the question is empty");
        return Ok(ExitCode::from(2));
    }
    if !args.json {
        draw(&client, &mut renderer)?;
    }
    while client.is_loading() {
        match client.next_message().await {
            Some(true) if !args.json => draw(&client, &mut renderer)?,
            Some(_) => {}
            None => break,
        }
    }

    let snapshot = client.snapshot();
    if args.json {
        print_json(&snapshot)?;
    }
    Ok(if snapshot.done {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Read questions line by line; each one supersedes the session still running
async fn interactive(
    client: &mut QueryClient<HttpSseTransport>,
    renderer: &mut TranscriptRenderer<io::Stdout>,
    json: bool,
) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => {
                match line.context("failed to read stdin")? {
                    Some(line) => {
                        if client.start(&line).is_some() && !json {
                            draw(client, renderer)?;
                        }
                    }
                    None => stdin_open = false,
                }
            }
            changed = client.next_message(), if client.is_loading() => {
                match changed {
                    Some(true) if !json => draw(client, renderer)?,
                    Some(true) if !client.is_loading() => print_json(&client.snapshot())?,
                    _ => {}
                }
            }
            else => break,
        }
    }
    Ok(())
}

fn draw(
    client: &QueryClient<HttpSseTransport>,
    renderer: &mut TranscriptRenderer<io::Stdout>,
) -> Result<()> {
    renderer
        .update(&client.snapshot(), &client.progress())
        .context("failed to write transcript")
}

fn print_json(snapshot: &SessionSnapshot) -> Result<()> {
    let json = serde_json::to_string_pretty(snapshot).context("failed to encode snapshot")?;
    println!("{}", json);
    Ok(())
}
