use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

mod replay;

#[derive(Parser, Debug)]
#[command(name = "projtree")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Inspect a project as the model sees it and replay edits against it")]
struct Args {
    /// Write traces to ~/.projtree/trace/projtree.log instead of stderr
    #[arg(long, global = true)]
    log_file: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import a directory and print the context sent to the model
    Context {
        dir: PathBuf,

        /// Path to leave out of the context; repeatable
        #[arg(long, value_name = "PATH")]
        exclude: Vec<String>,
    },

    /// Execute a JSON array of function calls against a directory as one batch
    Replay {
        dir: PathBuf,

        /// File holding `[{"name": ..., "args": {...}}, ...]`
        calls_json: PathBuf,

        /// Write the result back to the directory
        #[arg(long)]
        apply: bool,

        /// Print a unified diff for every modified file
        #[arg(long)]
        diff: bool,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    setup_tracing(args.log_file)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let local = tokio::task::LocalSet::new();
        local.run_until(async_main(args.command)).await
    })
}

async fn async_main(command: Command) -> Result<()> {
    info!(?command, "CLI startup");

    match command {
        Command::Context { dir, exclude } => replay::print_context(&dir, &exclude).await,
        Command::Replay {
            dir,
            calls_json,
            apply,
            diff,
        } => {
            let calls = std::fs::read_to_string(&calls_json)
                .with_context(|| format!("Failed to read {}", calls_json.display()))?;
            replay::run_replay(&dir, &calls, apply, diff).await
        }
    }
}

fn setup_tracing(to_file: bool) -> Result<()> {
    use tracing_subscriber::fmt;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if !to_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .with(filter)
            .init();
        return Ok(());
    }

    let home = dirs::home_dir().context("Failed to get home directory")?;
    let trace_dir = home.join(".projtree").join("trace");
    std::fs::create_dir_all(&trace_dir)?;

    let log_file = trace_dir.join("projtree.log");
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file)?;

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(file)
                .with_ansi(false)
                .with_target(true)
                .with_file(true)
                .with_line_number(true),
        )
        .with(filter)
        .init();

    info!("Tracing initialized to {:?}", log_file);
    Ok(())
}
