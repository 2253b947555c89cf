use clap::Parser;
use cuberace::app::{server::start_server, types, utils};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about = "Session server for head-to-head speed-solving races")]
struct Args {
    /// Path to the server configuration file
    #[arg(short, long, default_value = "config/server.toml")]
    config: String,
}

// Single threaded runtime
#[tokio::main(flavor = "current_thread")]
pub async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let formatter = tracing_subscriber::fmt::format()
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::fmt()
        .event_format(formatter)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config =
        utils::read_config::<types::ServerConfig>(&args.config, Some("CUBERACE_SERVER"))?;
    tracing::info!(?config, "Loaded configuration");

    start_server(config).await
}
