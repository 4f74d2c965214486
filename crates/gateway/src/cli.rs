//! §6.3 command-line surface: `pagemap build` renders a one-shot page map,
//! `pagemap serve` runs the MCP server over stdio or HTTP.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "pagemap", version, about = "Build accessibility-first page maps for browser-using agents")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Render a single page map to stdout or a file, then exit.
    Build(BuildArgs),
    /// Run the MCP server, serving tool calls until shut down.
    Serve(ServeArgs),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lowercase")]
pub enum OutputFormat {
    Json,
    Text,
    Markdown,
}

#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Page to build a map for.
    #[arg(long)]
    pub url: String,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    /// Write to this path instead of stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Skip the browser entirely and build from a fetched HTML rule set.
    #[arg(long)]
    pub offline: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lowercase")]
pub enum TransportArg {
    Stdio,
    Http,
}

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    #[arg(long, value_enum)]
    pub transport: Option<TransportArg>,
    #[arg(long)]
    pub host: Option<String>,
    #[arg(long)]
    pub port: Option<u16>,
    #[arg(long = "cors-origin")]
    pub cors_origin: Vec<String>,
    #[arg(long)]
    pub allow_local: bool,
    #[arg(long)]
    pub telemetry: bool,
    #[arg(long)]
    pub ignore_robots: bool,
    #[arg(long)]
    pub bot_ua: bool,
    #[arg(long = "trusted-proxy")]
    pub trusted_proxy: Vec<String>,
    #[arg(long)]
    pub drain_timeout: Option<u64>,
    /// Path to a TOML config file, merged under CLI flags and env vars.
    #[arg(long)]
    pub config: Option<PathBuf>,
}
