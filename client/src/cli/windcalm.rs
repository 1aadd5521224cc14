mod commands;
mod utils;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use windcalm_client::{ADDRESS_AUTO, DEFAULT_VERSION, WindcalmClientError};

#[derive(Subcommand, Debug, Clone)]
enum Commands {
    /// Look for Tuya devices on the local network
    Scan,
    /// Read one data point
    Get {
        #[arg(long)]
        dp: u32,
    },
    /// Write one data point; the value is parsed as JSON, bare words are strings
    Set {
        #[arg(long)]
        dp: u32,
        #[arg(long)]
        value: String,
    },
    /// Print connection changes and device reports until Ctrl+C
    Listen,
}

#[derive(Parser, Debug)]
struct Params {
    /// Tuya device ID
    #[clap(long, env = "WINDCALM_ID")]
    id: Option<String>,
    /// Tuya local key
    #[clap(long, env = "WINDCALM_KEY")]
    key: Option<String>,
    /// Device IP address, or "Auto" to discover it
    #[clap(long, default_value = ADDRESS_AUTO)]
    address: String,
    /// Tuya protocol version
    #[clap(long, default_value = DEFAULT_VERSION)]
    version: String,
    /// Seconds to wait for the device connection
    #[clap(long, default_value = "15")]
    connect_timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<(), WindcalmClientError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let params = Params::parse();

    match &params.command.clone() {
        Commands::Scan => commands::scan().await?,
        Commands::Get { dp } => commands::get_data_point(params, *dp).await?,
        Commands::Set { dp, value } => commands::set_data_point(params, *dp, value).await?,
        Commands::Listen => commands::listen(params).await?,
    }

    Ok(())
}
