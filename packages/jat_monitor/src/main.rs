use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use jat_markers::{determine_session_state, parse_all_markers};
use jat_monitor::config::{FileConfig, MIN_POLL_INTERVAL, MonitorConfig, OutputFormat, load_config};
use jat_monitor::render::{StateReport, render_markers, render_state, render_transition};
use jat_monitor::source::read_tail;
use jat_monitor::watch::Watcher;
use tracing::info;
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(name = "jat-monitor")]
#[command(version)]
#[command(about = "Inspect JAT activity markers in agent terminal output")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (overrides [output].format)
    #[arg(short, long, value_enum, global = true)]
    format: Option<OutputFormat>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Config file
    #[arg(long, global = true, default_value = "jat.toml")]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Print every marker found in a buffer
    Parse {
        /// Buffer file, or "-" for stdin
        path: PathBuf,
    },

    /// Print the resolved session state of a buffer
    State {
        /// Buffer file, or "-" for stdin
        path: PathBuf,

        /// Treat the session as having a task assigned
        #[arg(long)]
        assigned_task: bool,
    },

    /// Poll buffer files and print state transitions
    Watch {
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Poll interval in milliseconds (overrides [monitor].poll_interval_ms)
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Treat sessions as having a task assigned
        #[arg(long)]
        assigned_task: bool,

        /// Stop after N polls
        #[arg(long)]
        ticks: Option<u64>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_directive = if cli.debug {
        "jat_monitor=debug,jat_markers=debug"
    } else {
        "jat_monitor=info,jat_markers=warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();

    let file_config: FileConfig = load_config(&cli.config)
        .extract()
        .with_context(|| format!("Failed to load config from {:?}", cli.config))?;
    let mut config = MonitorConfig::from_file(&file_config);
    if let Some(format) = cli.format {
        config.format = format;
    }

    match cli.command {
        Commands::Parse { path } => {
            let buffer = read_tail(&path, config.window_bytes)?;
            let result = parse_all_markers(&buffer);
            println!("{}", render_markers(&result, config.format)?);
        }
        Commands::State {
            path,
            assigned_task,
        } => {
            let buffer = read_tail(&path, config.window_bytes)?;
            let result = parse_all_markers(&buffer);
            let state = determine_session_state(&result, assigned_task || config.assigned_task);
            let report = StateReport::new(state, &result);
            println!("{}", render_state(&report, config.format)?);
        }
        Commands::Watch {
            paths,
            interval_ms,
            assigned_task,
            ticks,
        } => {
            if let Some(ms) = interval_ms {
                config.poll_interval = Duration::from_millis(ms).max(MIN_POLL_INTERVAL);
            }
            config.assigned_task |= assigned_task;

            info!(
                files = paths.len(),
                interval_ms = config.poll_interval.as_millis() as u64,
                "Watching buffers"
            );
            let format = config.format;
            let mut watcher = Watcher::new(paths, &config);
            let mut stdout = std::io::stdout();
            watcher.run(config.poll_interval, ticks, |t| {
                let line = render_transition(t, format)?;
                writeln!(stdout, "{}", line).context("Failed to write to stdout")?;
                stdout.flush().context("Failed to flush stdout")?;
                Ok(())
            })?;
        }
    }

    Ok(())
}
