//! CLI for the MDM download manager.

mod commands;

use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use mdm_core::config::{self, MdmConfig};
use mdm_core::job::JobKind;
use std::path::PathBuf;
use std::process::ExitCode;

use commands::{run_batch, run_clean, run_get};

/// Top-level CLI for the MDM download manager.
#[derive(Debug, Parser)]
#[command(name = "mdm", version)]
#[command(about = "MDM: multi-protocol download manager", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub overrides: Overrides,

    #[command(subcommand)]
    pub command: CliCommand,
}

/// Flags that override values from the config file for this run.
#[derive(Debug, Default, Args)]
pub struct Overrides {
    /// Connections per HTTP job.
    #[arg(long, global = true, value_name = "N")]
    pub connections: Option<usize>,
    /// Jobs downloaded concurrently.
    #[arg(long, global = true, value_name = "N")]
    pub workers: Option<usize>,
    /// Connect timeout in seconds.
    #[arg(long, global = true, value_name = "SECS")]
    pub connect_timeout: Option<u64>,
    /// Overall per-request timeout in seconds.
    #[arg(long, global = true, value_name = "SECS")]
    pub timeout: Option<u64>,
    /// Proxy URL, e.g. http://proxy:3128 or socks5://host:1080.
    #[arg(long, global = true, value_name = "URL")]
    pub proxy: Option<String>,
    /// Smallest chunk worth its own connection, in bytes.
    #[arg(long, global = true, value_name = "BYTES")]
    pub min_chunk_size: Option<u64>,
}

impl Overrides {
    pub fn apply(&self, cfg: &mut MdmConfig) {
        if let Some(n) = self.connections {
            cfg.connections = n;
        }
        if let Some(n) = self.workers {
            cfg.workers = n;
        }
        if let Some(secs) = self.connect_timeout {
            cfg.http.connect_timeout_secs = secs;
        }
        if let Some(secs) = self.timeout {
            cfg.http.timeout_secs = secs;
        }
        if let Some(proxy) = &self.proxy {
            cfg.http.proxy = Some(proxy.clone());
        }
        if let Some(bytes) = self.min_chunk_size {
            cfg.min_chunk_size = bytes;
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download a single URL or repository.
    Get {
        /// HTTP(S) URL or git remote.
        url: String,

        /// Job type (http, git). Guessed from the URL when omitted.
        #[arg(long = "type", value_name = "TYPE")]
        kind: Option<JobKind>,

        /// Output file (or directory for git). Relative paths use the download directory.
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Shallow clone depth (git only).
        #[arg(long, value_name = "N")]
        depth: Option<u32>,

        /// Branch to clone (git only).
        #[arg(long)]
        branch: Option<String>,
    },

    /// Run every job in a JSON (or .toml) batch file.
    Batch {
        /// Path to the batch file.
        file: PathBuf,
    },

    /// Delete leftover part files for an output path.
    Clean {
        /// The output path the parts belong to.
        output: PathBuf,
    },

    /// Print shell completions to stdout.
    Completions {
        shell: Shell,
    },

    /// Print a man page to stdout.
    Man,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<ExitCode> {
        let cli = Cli::parse();

        match cli.command {
            CliCommand::Completions { shell } => {
                clap_complete::generate(shell, &mut Cli::command(), "mdm", &mut std::io::stdout());
                return Ok(ExitCode::SUCCESS);
            }
            CliCommand::Man => {
                clap_mangen::Man::new(Cli::command()).render(&mut std::io::stdout())?;
                return Ok(ExitCode::SUCCESS);
            }
            _ => {}
        }

        let mut cfg = config::load_or_init()?;
        cli.overrides.apply(&mut cfg);
        tracing::debug!("effective config: {:?}", cfg);

        let success = match cli.command {
            CliCommand::Get {
                url,
                kind,
                output,
                depth,
                branch,
            } => run_get(&cfg, url, kind, output, depth, branch).await?,
            CliCommand::Batch { file } => run_batch(&cfg, &file).await?,
            CliCommand::Clean { output } => run_clean(&cfg, &output)?,
            CliCommand::Completions { .. } | CliCommand::Man => true,
        };

        Ok(if success { ExitCode::SUCCESS } else { ExitCode::FAILURE })
    }
}

#[cfg(test)]
mod tests;
