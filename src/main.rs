//! page-watcher binary entrypoint.
//! Opens one watcher per directory and runs scheduler passes over them.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use page_watcher::fetch::token::AuthToken;
use page_watcher::Watcher;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Keep a local Markdown archive of the pages you follow.
#[derive(Parser)]
#[command(name = "page-watcher", version, about)]
struct Cli {
    /// Emit logs as JSON lines instead of the compact format.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run scheduler passes over one or more watcher directories.
    Watch {
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Number of passes per watcher; runs until interrupted when omitted.
        #[arg(long)]
        passes: Option<u64>,

        /// Seconds to wait between passes.
        #[arg(long, default_value_t = 30)]
        interval: u64,
    },

    /// Print tracked and due counts for watcher directories without writing to them.
    Report {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Save an auth token used by the HTTP fetcher.
    SetToken { file: PathBuf, token: String },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("page_watcher=info,warn"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    match cli.command {
        Command::Watch {
            paths,
            passes,
            interval,
        } => watch_all(paths, passes, Duration::from_secs(interval)).await,
        Command::Report { paths } => report_all(&paths).await,
        Command::SetToken { file, token } => {
            AuthToken::new(token).save(&file)?;
            println!("token saved to {}", file.display());
            Ok(())
        }
    }
}

async fn watch_all(paths: Vec<PathBuf>, passes: Option<u64>, interval: Duration) -> anyhow::Result<()> {
    let mut handles = Vec::with_capacity(paths.len());
    for path in paths {
        handles.push(tokio::spawn(async move {
            let outcome = watch_dir(&path, passes, interval).await;
            (path, outcome)
        }));
    }

    let mut fatal = 0usize;
    for handle in handles {
        let (path, outcome) = handle.await.context("watcher task panicked")?;
        if let Err(e) = outcome {
            tracing::error!(dir = %path.display(), error = %format!("{e:#}"), "watcher stopped");
            fatal += 1;
        }
    }
    if fatal > 0 {
        anyhow::bail!("{fatal} watcher(s) stopped on a fatal error");
    }
    Ok(())
}

async fn watch_dir(path: &Path, passes: Option<u64>, interval: Duration) -> anyhow::Result<()> {
    let mut watcher = Watcher::open(path)
        .await
        .with_context(|| format!("open watcher at {}", path.display()))?;
    let mut done = 0u64;
    loop {
        let summary = watcher
            .watch_once()
            .await
            .with_context(|| format!("pass over {}", path.display()))?;
        done += 1;
        tracing::info!(
            dir = %path.display(),
            pass = done,
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            "pass summary"
        );
        if passes.is_some_and(|n| done >= n) {
            return Ok(());
        }
        tokio::time::sleep(interval).await;
    }
}

async fn report_all(paths: &[PathBuf]) -> anyhow::Result<()> {
    for path in paths {
        let report = Watcher::inspect(path)
            .await
            .with_context(|| format!("inspect watcher at {}", path.display()))?;
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}
