use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "opsecret", version, about = "Resolve op:// secret references in configuration")]
pub struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true, env = "OPSECRET_LOG_JSON")]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve every reference in a document and print it as JSON.
    Render(RenderOpts),
    /// Show how a single value is classified, without resolving it.
    Extract(ExtractOpts),
    Version,
}

/// Delimiter overrides shared by subcommands.
#[derive(clap::Args)]
pub struct DelimiterOpts {
    #[arg(long)]
    pub prefix: Option<String>,
    #[arg(long)]
    pub suffix: Option<String>,
}

#[derive(clap::Args)]
pub struct RenderOpts {
    /// Document to render (JSON, JSON5, YAML or TOML).
    pub file: PathBuf,
    /// Settings file for the resolver backend.
    #[arg(short, long)]
    pub settings: Option<PathBuf>,
    #[command(flatten)]
    pub delimiters: DelimiterOpts,
    /// Overall resolution timeout in seconds.
    #[arg(short, long)]
    pub timeout: Option<u64>,
    /// Pretty-print the output.
    #[arg(long)]
    pub pretty: bool,
}

#[derive(clap::Args)]
pub struct ExtractOpts {
    pub value: String,
    #[command(flatten)]
    pub delimiters: DelimiterOpts,
}
