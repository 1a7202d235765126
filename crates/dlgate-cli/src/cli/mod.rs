//! CLI for the dlgate download dispatcher.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use dlgate_core::config;

use commands::{run_config, run_simulate, SimulateOptions};

/// Top-level CLI for the dlgate download dispatcher.
#[derive(Debug, Parser)]
#[command(name = "dlgate")]
#[command(about = "dlgate: admission-controlled dispatcher for concurrent downloads", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Run simulated download jobs through the dispatcher and report how each ended.
    Simulate {
        /// Number of jobs to submit.
        #[arg(long, default_value = "30", value_name = "N")]
        jobs: usize,
        /// Override max_concurrency from config.toml.
        #[arg(long, value_name = "N")]
        max_concurrency: Option<usize>,
        /// Simulated transfer time per job.
        #[arg(long, default_value = "200", value_name = "MS")]
        duration_ms: u64,
        /// Every K-th job targets the same file, to show FILE_BUSY rejections (0 = never).
        #[arg(long, default_value = "0", value_name = "K")]
        shared_path_every: usize,
        /// Submit with blocking `execute` on helper threads instead of `enqueue`.
        #[arg(long)]
        sync: bool,
        /// Print one JSON object per terminal event and a JSON summary.
        #[arg(long)]
        json: bool,
    },

    /// Show the config file path and effective settings.
    Config,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Simulate {
                jobs,
                max_concurrency,
                duration_ms,
                shared_path_every,
                sync,
                json,
            } => {
                let opts = SimulateOptions {
                    jobs,
                    max_concurrency,
                    duration_ms,
                    shared_path_every,
                    sync,
                    json,
                };
                run_simulate(&cfg, &opts).await?;
            }
            CliCommand::Config => run_config(&cfg)?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
