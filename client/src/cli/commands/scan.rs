use std::time::Duration;

use windcalm_client::WindcalmClientError;

pub async fn scan() -> Result<(), WindcalmClientError> {
    let devices = rustuya::Scanner::new()
        .with_timeout(Duration::from_secs(5))
        .scan()
        .await?;
    if devices.is_empty() {
        println!("No device found");
    }
    for device in devices {
        println!(
            "Found device {} at {} (version {:?})",
            device.id, device.ip, device.version
        );
    }
    Ok(())
}
