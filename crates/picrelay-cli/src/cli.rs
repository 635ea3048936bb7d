use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "picrelay",
    about = "picrelay: spread image uploads across GitHub repositories",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// TOML configuration file; environment variables override it
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the HTTP server
    Serve(ServeArgs),
    /// Create the metadata schema if missing
    Init(InitArgs),
    /// Show the rotation counter and the next target repository
    Status,
    /// List recent uploads, newest first
    Records(RecordsArgs),
    /// Compare the upload log with repository contents
    Reconcile,
}

#[derive(Args)]
pub struct ServeArgs {
    /// Listen address, overriding the configuration
    #[arg(long)]
    pub bind: Option<SocketAddr>,
}

#[derive(Args)]
pub struct InitArgs {
    /// Also clear the rotation counter and the upload log
    #[arg(long)]
    pub reset: bool,
}

#[derive(Args)]
pub struct RecordsArgs {
    #[arg(short = 'n', long, default_value = "20")]
    pub limit: usize,
}
