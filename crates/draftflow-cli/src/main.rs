//! `draftflow`: stream a new document from the producer, or refine an existing
//! one interactively (accept / reject / refine again / manual edit).

mod presenter;
mod progress;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt as _, BufReader};
use tracing::debug;

use draftflow::observability::init_observability;
use draftflow::prelude::*;
use draftflow::ReplayTransport;

use crate::presenter::TerminalPresenter;

/// Chunk size used when replaying captured bodies, small enough to split
/// frames across reads.
const REPLAY_CHUNK_SIZE: usize = 64;

#[derive(Parser)]
#[command(name = "draftflow", version, about = "Streamed generation and refinement client")]
struct Cli {
    /// Play back a captured SSE body instead of calling the producer. Repeat
    /// once per expected round; files are used in order.
    #[arg(long, global = true)]
    replay: Vec<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a new document.
    Generate {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Write the result here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Refine an existing document, then choose what to keep.
    Refine {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        instructions: String,
        #[arg(long, default_value = "")]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Write the accepted text here instead of overwriting `--input`.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    init_observability();

    let cli = Cli::parse();
    let transport = build_transport(&cli.replay)?;
    let options = SessionOptions::from_env()?;

    match cli.command {
        Command::Generate {
            name,
            description,
            output,
        } => generate(transport, options, name, description, output).await,
        Command::Refine {
            input,
            instructions,
            name,
            description,
            output,
        } => {
            let output = output.unwrap_or_else(|| input.clone());
            refine(transport, options, input, instructions, name, description, output).await
        }
    }
}

fn build_transport(
    replay: &[PathBuf],
) -> Result<Arc<dyn GenerationTransport>, Box<dyn std::error::Error>> {
    if replay.is_empty() {
        return Ok(Arc::new(HttpTransport::from_env()?));
    }
    let mut transport = ReplayTransport::new();
    for path in replay {
        let body = std::fs::read_to_string(path)?;
        debug!(path = %path.display(), len = body.len(), "queued replay body");
        transport = transport.push_body(&body, REPLAY_CHUNK_SIZE);
    }
    Ok(Arc::new(transport))
}

async fn generate(
    transport: Arc<dyn GenerationTransport>,
    options: SessionOptions,
    name: String,
    description: String,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = GenerationSession::new(transport, options);
    let reporter = progress::spawn_reporter(session.subscribe());
    let snapshot = session
        .start(GenerationRequest::generate(name, description))
        .await?;
    let _ = reporter.await;

    match snapshot.status {
        SessionStatus::Complete => write_result(output.as_ref(), &snapshot.accumulated_content),
        SessionStatus::Stopped => {
            eprintln!("warning: stream ended without completing; output may be partial");
            write_result(output.as_ref(), &snapshot.accumulated_content)
        }
        _ => Err(snapshot
            .last_error
            .unwrap_or_else(|| "generation failed".to_string())
            .into()),
    }
}

async fn refine(
    transport: Arc<dyn GenerationTransport>,
    options: SessionOptions,
    input: PathBuf,
    instructions: String,
    name: String,
    description: String,
    output: PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    let original = std::fs::read_to_string(&input)?;
    let mut cycle = RefinementCycle::new(transport, original.clone())
        .subject(name, description)
        .options(options)
        .presenter(Box::new(TerminalPresenter));

    cycle.begin_refinement(original, instructions)?;
    wait_with_progress(&mut cycle).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        eprintln!("[accept | reject | again <instructions> | edit <file> | show]");
        let Some(line) = lines.next_line().await? else {
            eprintln!("input closed; leaving {} untouched", output.display());
            return Ok(());
        };
        let (command, rest) = line
            .trim()
            .split_once(' ')
            .map(|(c, r)| (c, r.trim()))
            .unwrap_or((line.trim(), ""));
        match command {
            "accept" => {
                let accepted = cycle.accept();
                std::fs::write(&output, accepted)?;
                eprintln!("saved {}", output.display());
                return Ok(());
            }
            "reject" => {
                cycle.reject();
                eprintln!("rejected; {} left untouched", input.display());
                return Ok(());
            }
            "again" if !rest.is_empty() => {
                cycle.refine_again(rest)?;
                wait_with_progress(&mut cycle).await?;
            }
            "edit" if !rest.is_empty() => match std::fs::read_to_string(rest) {
                Ok(text) => {
                    cycle.record_manual_edit(text)?;
                    eprintln!(
                        "manual edit recorded ({})",
                        if cycle.has_manual_edits() {
                            "differs from machine output"
                        } else {
                            "same as machine output"
                        }
                    );
                }
                Err(e) => eprintln!("cannot read {rest}: {e}"),
            },
            "show" => println!("{}", cycle.current_best()),
            _ => eprintln!("unrecognized command: {}", line.trim()),
        }
    }
}

async fn wait_with_progress(cycle: &mut RefinementCycle) -> Result<(), CycleError> {
    let reporter = progress::spawn_reporter(cycle.subscribe());
    let outcome = cycle.wait().await;
    let _ = reporter.await;
    match outcome? {
        RefinementOutcome::Completed { .. } => {}
        RefinementOutcome::Failed { .. } | RefinementOutcome::Stopped { .. } => {
            eprintln!("keeping the previous version; try `again` or choose accept/reject");
        }
    }
    Ok(())
}

fn write_result(path: Option<&PathBuf>, content: &str) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(path) => {
            std::fs::write(path, content)?;
            eprintln!("saved {}", path.display());
        }
        None => println!("{content}"),
    }
    Ok(())
}
