mod accessories;
mod logging;
mod server;
mod settings;

pub use server::start_accessory;

use anyhow::{Context, Result};
use clap::Parser;
use clap_derive::Parser;
use logging::{LogConfig, RotationPeriod, init_logging};
use settings::Settings;
use tracing::info;

#[derive(Parser, Debug)]
pub struct Params {
    /// JSON settings file (if not set, default settings are used)
    #[clap(long)]
    settings: Option<String>,
    /// Tuya device ID, overrides the settings file
    #[clap(long)]
    id: Option<String>,
    /// Tuya local key, overrides the settings file
    #[clap(long)]
    key: Option<String>,
    /// Directory for rolling log files (if not set, logs go to stdout)
    #[clap(long)]
    log_dir: Option<String>,
    /// Log rotation period: minutely, hourly, daily or never
    #[clap(long, default_value = "daily")]
    log_rotation: RotationPeriod,
    /// Maximum number of log files to keep (0 = unlimited)
    #[clap(long, default_value = "7")]
    max_log_files: usize,
    /// Also log to stdout when logging to files
    #[clap(long)]
    log_to_console: bool,
}

impl Params {
    fn log_config(&self) -> Option<LogConfig> {
        let log_dir = self.log_dir.clone()?;
        Some(LogConfig {
            log_dir,
            rotation: self.log_rotation,
            max_log_files: self.max_log_files,
            console: self.log_to_console,
            ..Default::default()
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let params = Params::parse();
    let _log_guard = init_logging(params.log_config()).context("Failed to set up logging")?;

    let mut settings = match &params.settings {
        Some(path) => Settings::load(path)?,
        None => {
            info!("No settings file, using default settings");
            Settings::default()
        }
    };
    if params.id.is_some() {
        settings.id = params.id;
    }
    if params.key.is_some() {
        settings.key = params.key;
    }

    start_accessory(settings).await
}
