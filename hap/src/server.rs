use crate::accessories::{WindcalmAccessory, WindcalmAdapter};
use crate::settings::Settings;
use anyhow::{Context, Result};
use hap::{
    Config, MacAddress, Pin,
    accessory::AccessoryCategory,
    server::{IpServer, Server},
    storage::{FileStorage, Storage},
};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use windcalm_client::{DataPointClient, TuyaTransport};

/// Setup code category of a fan.
const CATEGORY_FAN: u64 = 3;
const ACCESSORY_ID: u64 = 1;

fn generate_setup_uri(pincode: &str, category: u64, setup_id: &str) -> String {
    let value_low = pincode.replace('-', "").parse::<u64>().unwrap_or(0);

    let version = 0;
    let reserved = 0;
    let flag = 2;
    let mut payload: u64 = 0;

    payload |= version & 0x7;
    payload <<= 4;
    payload |= reserved & 0xf;

    payload <<= 8;
    payload |= category & 0xff;

    payload <<= 4;
    payload |= flag & 0xf;
    payload <<= 27u64;
    payload |= value_low & 0x07ff_ffff;

    let mut encoded_payload = base36_encode(payload).to_uppercase();
    while encoded_payload.len() < 9 {
        encoded_payload.insert(0, '0');
    }

    format!("X-HM://{encoded_payload}{setup_id}")
}

fn base36_encode(mut num: u64) -> String {
    let mut chars = Vec::new();
    while num > 0 {
        let rem = (num % 36) as u8;
        chars.push(if rem < 10 {
            (b'0' + rem) as char
        } else {
            (b'A' + rem - 10) as char
        });
        num /= 36;
    }
    chars.reverse();
    if chars.is_empty() {
        chars.push('0');
    }
    chars.into_iter().collect()
}

/// HAP device id: the host MAC address, random when it cannot be read.
fn device_id() -> MacAddress {
    match mac_address::get_mac_address() {
        Ok(Some(mac)) => MacAddress::from(mac.bytes()),
        Ok(None) => {
            warn!("No MAC address found, using a random device id");
            MacAddress::from(rand::random::<[u8; 6]>())
        }
        Err(e) => {
            warn!("Cannot read MAC address ({e}), using a random device id");
            MacAddress::from(rand::random::<[u8; 6]>())
        }
    }
}

async fn load_config(storage: &mut FileStorage, settings: &Settings) -> Result<Config> {
    match storage.load_config().await {
        Ok(mut config) => {
            info!("Loaded config");
            config.redetermine_local_ip();
            storage.save_config(&config).await?;
            Ok(config)
        }
        Err(_) => {
            info!("Creating new config");
            let pin = Pin::new(settings.pairing_code).context("Invalid pairing code")?;
            let config = Config {
                pin,
                name: settings.name.clone(),
                device_id: device_id(),
                category: AccessoryCategory::Fan,
                ..Default::default()
            };
            storage.save_config(&config).await?;
            Ok(config)
        }
    }
}

pub async fn start_accessory(settings: Settings) -> Result<()> {
    let options = settings
        .tuya_options()
        .context("Cannot configure the Tuya device")?;
    let serial_number = options.id.clone();

    let transport = TuyaTransport::spawn(options);
    let client = DataPointClient::new(transport.clone(), settings.retry_policy());
    let adapter = Arc::new(WindcalmAdapter::new(client, transport.status()));

    let mut storage = FileStorage::current_dir().await?;
    let config = load_config(&mut storage, &settings).await?;

    let pin = config.pin.to_string();
    let server = IpServer::new(config, storage).await?;
    info!("IP server created, adding fan accessory...");

    let accessory = WindcalmAccessory::new(
        ACCESSORY_ID,
        settings.name.as_str(),
        serial_number.as_str(),
        adapter,
        &server,
    )
    .await
    .context("Failed to add fan accessory")?;

    let mut reports = transport.subscribe_reports();
    tokio::spawn(async move {
        loop {
            match reports.recv().await {
                Ok(report) => {
                    if let Err(e) = accessory.update(&report).await {
                        warn!("Failed to push device report: {e:#}");
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Dropped {skipped} device reports");
                }
                Err(RecvError::Closed) => {
                    debug!("Device report channel closed");
                    break;
                }
            }
        }
    });

    info!("Starting HAP accessory server...");
    let handle = server.run_handle();
    let setup_id = settings.setup_id.as_str();
    info!("PIN for the fan accessory is: {pin}, setup ID: {setup_id}");
    let uri = generate_setup_uri(pin.as_str(), CATEGORY_FAN, setup_id);
    qr2term::print_qr(uri)?;

    let ctrl_c = signal::ctrl_c();

    #[cfg(unix)]
    let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
        .context("Failed to install SIGTERM handler")?;
    #[cfg(unix)]
    let terminate = terminate.recv();

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Option<()>>();

    let result = tokio::select! {
        res = handle => res.context("HAP server stopped"),
        res = ctrl_c => {
            info!("signal received, starting graceful shutdown");
            res.context("Failed to listen for Ctrl+C")
        },
        _ = terminate => {
            info!("signal received, starting graceful shutdown");
            Ok(())
        },
    };

    transport.stop().await;
    result
}
