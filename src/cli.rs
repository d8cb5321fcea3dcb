// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: One invocation deploys, or with --cleanup tears down, a single host.

use clap::Parser;
use dockhand::config::Overrides;
use dockhand::output::OutputMode;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "dockhand")]
#[command(about = "Deploy a Dockerized Git repository to a Linux host over SSH")]
#[command(version)]
pub struct Cli {
    /// Repository URL (http or https)
    #[arg(long = "repo", value_name = "URL")]
    pub repository: Option<String>,

    /// Access token for cloning the repository
    #[arg(long, env = "DOCKHAND_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Remote host as host, user@host, or user@host:port
    #[arg(long)]
    pub host: Option<String>,

    /// Remote SSH user
    #[arg(short, long)]
    pub user: Option<String>,

    /// Remote SSH port
    #[arg(long, value_name = "PORT")]
    pub ssh_port: Option<u16>,

    /// Private key (defaults to ~/.ssh/id_ed25519, id_rsa, or id_ecdsa)
    #[arg(short = 'i', long)]
    pub key: Option<PathBuf>,

    /// Branch to deploy [default: main]
    #[arg(short, long)]
    pub branch: Option<String>,

    /// Deployment directory on the host [default: ~<user>/deployments/<repo>]
    #[arg(long, value_name = "DIR")]
    pub remote_dir: Option<String>,

    /// Port the application listens on inside its container
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Loopback port published by the single-container path
    #[arg(long, value_name = "PORT")]
    pub host_port: Option<u16>,

    /// Local directory holding working trees [default: current directory]
    #[arg(long, value_name = "DIR")]
    pub workspace: Option<PathBuf>,

    /// Remove everything a deploy created instead of deploying
    #[arg(long)]
    pub cleanup: bool,

    /// Run read-only checks and log mutating actions without executing them
    #[arg(long)]
    pub dry_run: bool,

    /// Configuration file [default: dockhand.yml if present]
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Run log file
    #[arg(long, value_name = "FILE", default_value = "dockhand.log")]
    pub log_file: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Only print the final result
    #[arg(short, long, conflicts_with = "json")]
    pub quiet: bool,

    /// Print JSON lines
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    pub fn output_mode(&self) -> OutputMode {
        if self.json {
            OutputMode::Json
        } else if self.quiet {
            OutputMode::Quiet
        } else {
            OutputMode::Normal
        }
    }

    pub fn overrides(&self) -> Overrides {
        Overrides {
            repository: self.repository.clone(),
            branch: self.branch.clone(),
            token: self.token.clone(),
            server: self.host.clone(),
            user: self.user.clone(),
            ssh_port: self.ssh_port,
            key: self.key.clone(),
            remote_dir: self.remote_dir.clone(),
            app_port: self.port,
            host_port: self.host_port,
            workspace: self.workspace.clone(),
            cleanup: self.cleanup,
            dry_run: self.dry_run,
        }
    }
}
