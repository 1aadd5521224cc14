use std::time::Duration;

use windcalm_client::{
    DataPointClient, RetryPolicy, TuyaOptions, TuyaTransport, WindcalmClientError,
};

use crate::Params;

pub fn create_transport(params: &Params) -> Result<TuyaTransport, WindcalmClientError> {
    let options = TuyaOptions::builder()
        .id(params.id.clone().unwrap_or_default())
        .key(params.key.clone().unwrap_or_default())
        .address(params.address.clone())
        .version(params.version.clone())
        .build()
        .map_err(|e| WindcalmClientError::Options(e.to_string()))?;
    if options.id.is_empty() || options.key.is_empty() {
        return Err(WindcalmClientError::Options(
            "both --id and --key are required".to_string(),
        ));
    }
    Ok(TuyaTransport::spawn(options))
}

/// Creates a client and waits until the device is connected.
pub async fn create_client(
    params: &Params,
) -> Result<DataPointClient<TuyaTransport>, WindcalmClientError> {
    let transport = create_transport(params)?;
    let mut status = transport.status();
    let wait = async {
        while !status.is_connected() {
            if status.changed().await.is_none() {
                break;
            }
        }
    };
    let in_time = tokio::time::timeout(Duration::from_secs(params.connect_timeout), wait)
        .await
        .is_ok();
    if !in_time || !status.is_connected() {
        transport.stop().await;
        return Err(WindcalmClientError::NotConnected);
    }
    Ok(DataPointClient::new(transport, RetryPolicy::default()))
}
