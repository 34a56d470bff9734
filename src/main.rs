use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod backend;
mod commands;
mod config;
mod sandbox;
mod templates;
mod tool;

use backend::BackendKind;
use config::Config;

#[derive(Parser)]
#[command(name = "codebox")]
#[command(
    author,
    version,
    about = "Run agent-generated Python code in throwaway Docker sandboxes"
)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value = "text")]
    log_format: LogFormat,

    /// Config file (default: ./codebox.toml if present)
    #[arg(long, global = true, env = "CODEBOX_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default codebox.toml in the current directory
    Init {
        /// Force overwrite existing files
        #[arg(short, long)]
        force: bool,
    },

    /// Execute Python code and print the tool response
    Run {
        /// Script to run ("-" or omitted reads stdin)
        file: Option<PathBuf>,

        /// Code to run, instead of a file
        #[arg(short, long, conflicts_with = "file")]
        code: Option<String>,

        /// Channel tag copied onto the response
        #[arg(long)]
        channel: Option<String>,

        /// Execution backend (overrides codebox.toml)
        #[arg(short, long, value_enum, env = "CODEBOX_EXECUTION_BACKEND")]
        backend: Option<BackendKind>,

        /// Print the full response message as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the tool name and description as JSON
    Describe,

    /// Manage the sandbox image
    Image {
        #[command(subcommand)]
        action: commands::image::ImageAction,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.log_format);

    match cli.command {
        Commands::Init { force } => {
            commands::init::run(force)?;
        }
        Commands::Run {
            file,
            code,
            channel,
            backend,
            json,
        } => {
            let config = Config::resolve(cli.config.as_deref())?;
            let options = commands::run::RunOptions {
                source: commands::run::CodeSource::from_args(code, file),
                channel,
                backend,
                json,
            };
            commands::run::run(options, config).await?;
        }
        Commands::Describe => {
            commands::describe::run()?;
        }
        Commands::Image { action } => {
            let config = Config::resolve(cli.config.as_deref())?;
            commands::image::run(action, &config).await?;
        }
    }

    Ok(())
}

/// Logs go to stderr so stdout carries only the tool response.
fn init_logging(verbose: bool, format: LogFormat) {
    let default_directive = if verbose { "codebox=debug" } else { "codebox=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }
}
