//! repligit - mirror refs between Git smart HTTP remotes.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;

use config::{MirrorConfig, Remote};

/// repligit - Git smart HTTP client
#[derive(Parser, Debug)]
#[command(name = "repligit")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Give up on any request after this many seconds
    #[arg(long, global = true, value_name = "SECS")]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the refs of a remote
    LsRemote {
        /// Repository URL
        url: String,
        /// Basic auth user name
        #[arg(long)]
        username: Option<String>,
        /// Environment variable holding the password or token
        #[arg(long)]
        password_env: Option<String>,
        /// Use the blocking client
        #[arg(long)]
        blocking: bool,
    },

    /// Mirror refs from one remote to another
    Mirror {
        /// YAML mirror configuration
        #[arg(short, long, conflicts_with_all = ["source", "destination", "refs"])]
        config: Option<PathBuf>,
        /// Source repository URL
        #[arg(long)]
        source: Option<String>,
        /// Source user name
        #[arg(long)]
        source_username: Option<String>,
        /// Environment variable holding the source password or token
        #[arg(long)]
        source_password_env: Option<String>,
        /// Destination repository URL
        #[arg(long)]
        destination: Option<String>,
        /// Destination user name
        #[arg(long)]
        destination_username: Option<String>,
        /// Environment variable holding the destination password or token
        #[arg(long)]
        destination_password_env: Option<String>,
        /// Ref to mirror, repeatable
        #[arg(long = "ref", value_name = "REF")]
        refs: Vec<String>,
        /// Use the blocking client
        #[arg(long)]
        blocking: bool,
    },
}

fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}

fn run(command: Commands, timeout: Option<Duration>) -> anyhow::Result<()> {
    match command {
        Commands::LsRemote {
            url,
            username,
            password_env,
            blocking,
        } => {
            let remote = Remote {
                username,
                password_env,
                ..Remote::new(url)
            };
            if blocking {
                commands::ls_remote_blocking(&remote, timeout)
            } else {
                runtime()?.block_on(commands::ls_remote(&remote, timeout))
            }
        }
        Commands::Mirror {
            config,
            source,
            source_username,
            source_password_env,
            destination,
            destination_username,
            destination_password_env,
            refs,
            blocking,
        } => {
            let config = match config {
                Some(path) => MirrorConfig::load_yaml(&path)
                    .with_context(|| format!("failed to load {}", path.display()))?,
                None => {
                    let (Some(source), Some(destination)) = (source, destination) else {
                        bail!("either --config or both --source and --destination are required");
                    };
                    let config = MirrorConfig {
                        source: Remote {
                            url: source,
                            username: source_username,
                            password_env: source_password_env,
                        },
                        destination: Remote {
                            url: destination,
                            username: destination_username,
                            password_env: destination_password_env,
                        },
                        refs,
                    };
                    config.validate()?;
                    config
                }
            };

            if blocking {
                commands::mirror_blocking(&config, timeout)
            } else {
                runtime()?.block_on(commands::mirror(&config, timeout))
            }
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("repligit={log_level},repligit_cli={log_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let timeout = cli.timeout.map(Duration::from_secs);
    if let Err(e) = run(cli.command, timeout) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_flag_is_global() {
        let cli = Cli::try_parse_from([
            "repligit",
            "ls-remote",
            "https://example.com/repo.git",
            "--timeout",
            "30",
        ])
        .unwrap();
        assert_eq!(cli.timeout, Some(30));

        let cli =
            Cli::try_parse_from(["repligit", "ls-remote", "https://example.com/repo.git"]).unwrap();
        assert_eq!(cli.timeout, None);
    }
}
