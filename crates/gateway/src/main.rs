use clap::Parser;
use dotenvy::dotenv;
use tracing::{error, Level};
use tracing_subscriber::EnvFilter;

use sponsor_gateway::config::GatewayArgs;
use sponsor_gateway::run::GatewayRunner;

#[derive(Parser, Debug)]
#[command(author, version, about = "Authorization gateway for gas-sponsored user operations")]
struct Args {
    #[command(flatten)]
    gateway: GatewayArgs,

    #[arg(long, env, default_value = "info")]
    log_level: Level,

    /// Format for logs, can be json or text
    #[arg(long, env, default_value = "text")]
    log_format: String,
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    let args = Args::parse();

    let log_format = args.log_format.to_lowercase();
    let log_level = args.log_level.to_string();

    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(EnvFilter::new(log_level))
            .with_ansi(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new(log_level))
            .with_ansi(false)
            .init();
    }

    let config = match args.gateway.validate() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            std::process::exit(1);
        }
    };

    if let Err(e) = GatewayRunner::run(config).await {
        error!(error = ?e, "error running gateway");
        std::process::exit(1);
    }
}
