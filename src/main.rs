use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use covwatch::cli::{self, WatchSession};
use covwatch::config::Config;
use covwatch::logging;

/// covwatch — live Clover coverage for the files you are editing.
#[derive(Parser)]
#[command(name = "covwatch", version, about)]
struct Cli {
    /// JSON settings file (defaults apply when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug messages to stderr
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the coverage report that covers a source file.
    Find {
        /// The source file path.
        source: PathBuf,
    },

    /// Show coverage for a source file once.
    Show {
        /// The source file path.
        source: PathBuf,
    },

    /// Follow coverage for source files as their report changes.
    Watch {
        /// Source file paths.
        #[arg(required = true)]
        sources: Vec<PathBuf>,

        /// Stop after this many seconds (run until interrupted if omitted).
        #[arg(long)]
        duration: Option<f64>,
    },
}

fn main() -> Result<()> {
    let args = Cli::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => Config::default(),
    };
    config.debug |= args.debug;
    logging::init(config.debug);

    let output = match args.command {
        Commands::Find { source } => cli::cmd_find(&config, &source)?,
        Commands::Show { source } => cli::cmd_show(&config, &source)?,
        Commands::Watch { sources, duration } => {
            return run_watch(Arc::new(config), &sources, duration);
        }
    };
    print!("{output}");
    Ok(())
}

fn run_watch(config: Arc<Config>, sources: &[PathBuf], duration: Option<f64>) -> Result<()> {
    let deadline = cli::watch_deadline(Instant::now(), duration)?;

    let session = WatchSession::new(config).context("Failed to set up watchers")?;
    for source in sources {
        print!("{}", session.add(source)?);
    }

    if session.watched_reports().is_empty() {
        println!("Nothing to watch.");
        return Ok(());
    }

    let tick = Duration::from_millis(200);
    while deadline.map_or(true, |d| Instant::now() < d) {
        for line in session.step(tick) {
            print!("{line}");
        }
    }

    session.shutdown().context("Failed to stop watchers")
}
