//! Command-line argument parsing for fleet-probe.

use clap::Parser;
use fleet_probe::config::{Config, ServerConfig};
use std::path::PathBuf;

/// Run an ad-hoc osquery diagnostic on one Fleet host.
#[derive(Parser, Debug)]
#[command(name = "fleet-probe")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Host name to query (case-insensitive)
    #[arg(value_name = "HOST")]
    pub host: String,

    /// Query template name (e.g., file_hash)
    #[arg(value_name = "QUERY")]
    pub query_name: String,

    /// Template argument (e.g., a file path for file_hash)
    #[arg(value_name = "ARGS", default_value = "")]
    pub args: String,

    /// Fleet server URL (e.g., https://fleet.example.com:8080)
    #[arg(long, value_name = "URL")]
    pub url: Option<String>,

    /// Fleet login user
    #[arg(short = 'u', long, value_name = "USER")]
    pub username: Option<String>,

    /// Config file path
    #[arg(long, value_name = "PATH", env = "FLEET_PROBE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Skip TLS certificate verification (unsafe; for self-signed test servers)
    #[arg(long)]
    pub insecure: bool,

    /// Use the built-in mock backend instead of a real server
    #[arg(long)]
    pub mock: bool,

    /// Write logs to a file instead of stderr
    #[arg(long)]
    pub log_file: bool,

    /// Print the response as a single JSON object
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the config file path to use.
    ///
    /// Uses the --config argument if provided, otherwise the default path.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_path)
    }

    /// Converts CLI overrides to a ServerConfig for merging over the file config.
    pub fn to_server_config(&self) -> ServerConfig {
        ServerConfig {
            url: self.url.clone(),
            username: self.username.clone(),
            accept_invalid_certs: self.insecure,
            ..Default::default()
        }
    }
}
