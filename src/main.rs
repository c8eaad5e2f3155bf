//! fleet-probe - run ad-hoc osquery diagnostics on one Fleet host.

mod cli;

use cli::Cli;
use fleet_probe::config::{Config, Credentials};
use fleet_probe::error::{FleetError, Result};
use fleet_probe::fleet::MockBackend;
use fleet_probe::logging::{self, LogTarget};
use fleet_probe::query::{FleetQuery, QueryResponse};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse_args();
    logging::init(if cli.log_file {
        LogTarget::File(logging::log_path())
    } else {
        LogTarget::Stderr
    });

    match run(&cli).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("{}: {}", e.category(), e);
            std::process::exit(2);
        }
    }
}

/// Runs one query and prints the response. Returns the success flag.
async fn run(cli: &Cli) -> Result<bool> {
    let fleet = build_client(cli).await?;
    let response = fleet.query(&cli.host, &cli.query_name, &cli.args).await;
    print_response(&response, cli.json)?;
    Ok(response.is_success())
}

/// Resolves configuration with precedence CLI > config file > environment,
/// then builds the client.
async fn build_client(cli: &Cli) -> Result<FleetQuery> {
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let mut config = Config::load_from_file(&config_path)?;

    config.server.merge(&cli.to_server_config());
    config.server.apply_env_defaults();

    if cli.mock {
        warn!("Using the mock Fleet backend");
        let backend = Box::new(MockBackend::demo());
        let credentials = Credentials::new("mock", "mock");
        return Ok(FleetQuery::with_backend(backend, &credentials, config.results.clone()).await);
    }

    info!("Server: {}", config.server.display_string());
    FleetQuery::connect(&config).await
}

fn print_response(response: &QueryResponse, json: bool) -> Result<()> {
    let render = |value: std::result::Result<String, serde_json::Error>| {
        value.map_err(|e| FleetError::internal(format!("Cannot render response: {e}")))
    };

    if json {
        println!("{}", render(serde_json::to_string(response))?);
    } else {
        println!("{}", response.success);
        println!("{}", render(serde_json::to_string_pretty(&response.payload))?);
    }
    Ok(())
}
