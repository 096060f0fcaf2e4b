//! CLI module for tokengate
//!
//! Command-line parsing for the tokengate-server binary.

use clap::Parser;
use std::path::PathBuf;

/// tokengate - token authentication demo server
#[derive(Parser, Debug)]
#[command(
    name = "tokengate-server",
    version,
    about = "Token authentication middleware demo server",
    after_help = "EXAMPLES:\n    \
                  JWT_SECRET=s3cr3t tokengate-server                   # Defaults, no config file needed\n    \
                  tokengate-server --config my.toml --watch            # Reload token expiration on change\n    \
                  tokengate-server --port 8080 --json-logs             # Structured logs"
)]
pub struct Cli {
    /// Path to the configuration file (optional; defaults apply when missing)
    #[arg(short, long, default_value = "tokengate.toml")]
    pub config: PathBuf,

    /// Override the listen host
    #[arg(long, env = "TOKENGATE_HOST")]
    pub host: Option<String>,

    /// Override the listen port
    #[arg(short, long, env = "TOKENGATE_PORT")]
    pub port: Option<u16>,

    /// Emit logs as JSON
    #[arg(long)]
    pub json_logs: bool,

    /// Watch the configuration file and apply changes
    #[arg(short, long)]
    pub watch: bool,
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
