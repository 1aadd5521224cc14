use tracing::debug;
use windcalm_client::{
    ConnectionStatus, DataPointClient, DataPointTransport, DpValue, WindcalmClientError,
};

use crate::accessories::mapping::{
    Characteristic, RotationDirection, direction_from_device, direction_to_device, expect_bool,
    expect_number, expect_str, fan_speed_from_device, fan_speed_to_device,
    temperature_from_device, temperature_to_device,
};

type Result<T> = std::result::Result<T, WindcalmClientError>;

/// Translates characteristic reads and writes into data-point calls.
///
/// Nothing is cached: every read goes to the device. Both directions
/// require the connection to be up and fail with
/// [`WindcalmClientError::NotConnected`] otherwise, before the device is
/// touched.
pub(crate) struct WindcalmAdapter<T> {
    client: DataPointClient<T>,
    status: ConnectionStatus,
}

impl<T: DataPointTransport> WindcalmAdapter<T> {
    pub fn new(client: DataPointClient<T>, status: ConnectionStatus) -> Self {
        Self { client, status }
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.status.is_connected() {
            Ok(())
        } else {
            Err(WindcalmClientError::NotConnected)
        }
    }

    async fn read(&self, characteristic: Characteristic) -> Result<DpValue> {
        self.ensure_connected()?;
        self.client.get(characteristic.data_point()).await
    }

    async fn write(&self, characteristic: Characteristic, value: DpValue) -> Result<()> {
        self.ensure_connected()?;
        self.client.set(characteristic.data_point(), value).await
    }

    pub async fn fetch_fan_on(&self) -> Result<bool> {
        let value = self.read(Characteristic::FanOn).await?;
        expect_bool(Characteristic::FanOn, &value)
    }

    pub async fn handle_fan_on(&self, on: bool) -> Result<()> {
        debug!("Fan on -> {on}");
        self.write(Characteristic::FanOn, DpValue::Boolean(on)).await
    }

    pub async fn fetch_fan_speed(&self) -> Result<f32> {
        let value = self.read(Characteristic::FanSpeed).await?;
        let steps = expect_number(Characteristic::FanSpeed, &value)?;
        Ok(fan_speed_from_device(steps) as f32)
    }

    pub async fn handle_fan_speed(&self, percent: f32) -> Result<()> {
        let steps = fan_speed_to_device(percent as f64);
        debug!("Fan speed {percent}% -> step {steps}");
        self.write(Characteristic::FanSpeed, DpValue::from(steps)).await
    }

    pub async fn fetch_fan_direction(&self) -> Result<RotationDirection> {
        let value = self.read(Characteristic::FanDirection).await?;
        let direction = expect_str(Characteristic::FanDirection, &value)?;
        Ok(direction_from_device(direction))
    }

    pub async fn handle_fan_direction(&self, direction: RotationDirection) -> Result<()> {
        let value = direction_to_device(direction);
        debug!("Fan direction {direction:?} -> {value}");
        self.write(Characteristic::FanDirection, DpValue::from(value)).await
    }

    pub async fn fetch_light_on(&self) -> Result<bool> {
        let value = self.read(Characteristic::LightOn).await?;
        expect_bool(Characteristic::LightOn, &value)
    }

    pub async fn handle_light_on(&self, on: bool) -> Result<()> {
        debug!("Light on -> {on}");
        self.write(Characteristic::LightOn, DpValue::Boolean(on)).await
    }

    /// Color temperature in mired.
    pub async fn fetch_light_temperature(&self) -> Result<f64> {
        let value = self.read(Characteristic::LightTemperature).await?;
        let raw = expect_number(Characteristic::LightTemperature, &value)?;
        Ok(temperature_from_device(raw))
    }

    pub async fn handle_light_temperature(&self, mired: f64) -> Result<()> {
        let raw = temperature_to_device(mired);
        debug!("Light temperature {mired} mired -> {raw}");
        self.write(Characteristic::LightTemperature, DpValue::Number(raw)).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use windcalm_client::{ConnectionState, ConnectionTracker, RetryPolicy, TuyaError};

    use super::*;

    /// Answers from an in-memory table of data points.
    #[derive(Clone, Default)]
    struct FakeDevice {
        dps: Arc<Mutex<HashMap<u32, DpValue>>>,
        calls: Arc<Mutex<usize>>,
    }

    impl FakeDevice {
        fn with(entries: &[(u32, DpValue)]) -> Self {
            let device = FakeDevice::default();
            device.dps.lock().unwrap().extend(entries.iter().cloned());
            device
        }

        fn value(&self, index: u32) -> Option<DpValue> {
            self.dps.lock().unwrap().get(&index).cloned()
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl DataPointTransport for FakeDevice {
        async fn get(&self, index: u32) -> std::result::Result<DpValue, TuyaError> {
            *self.calls.lock().unwrap() += 1;
            self.value(index).ok_or(TuyaError::Offline)
        }

        async fn set(&self, index: u32, value: DpValue) -> std::result::Result<(), TuyaError> {
            *self.calls.lock().unwrap() += 1;
            self.dps.lock().unwrap().insert(index, value);
            Ok(())
        }
    }

    fn connected() -> ConnectionTracker {
        let tracker = ConnectionTracker::new("test fan");
        tracker.transition(ConnectionState::Connecting);
        tracker.transition(ConnectionState::Connected);
        tracker
    }

    fn adapter(device: &FakeDevice, tracker: &ConnectionTracker) -> WindcalmAdapter<FakeDevice> {
        WindcalmAdapter::new(
            DataPointClient::new(device.clone(), RetryPolicy::default()),
            tracker.subscribe(),
        )
    }

    #[tokio::test]
    async fn test_read_while_disconnected_does_not_reach_device() {
        let device = FakeDevice::with(&[(60, DpValue::Boolean(true))]);
        let tracker = ConnectionTracker::new("test fan");
        let adapter = adapter(&device, &tracker);

        let err = adapter.fetch_fan_on().await.unwrap_err();
        assert!(matches!(err, WindcalmClientError::NotConnected));
        assert_eq!(err.to_string(), "Not connected");
        assert_eq!(device.calls(), 0);
    }

    #[tokio::test]
    async fn test_write_while_disconnected_does_not_reach_device() {
        let device = FakeDevice::default();
        let tracker = connected();
        let adapter = adapter(&device, &tracker);
        tracker.transition(ConnectionState::Disconnected);

        let err = adapter.handle_light_on(true).await.unwrap_err();
        assert!(matches!(err, WindcalmClientError::NotConnected));
        assert_eq!(device.calls(), 0);
        assert_eq!(device.value(20), None);
    }

    #[tokio::test]
    async fn test_power_states() {
        let device = FakeDevice::with(&[
            (60, DpValue::Boolean(false)),
            (20, DpValue::Boolean(true)),
        ]);
        let tracker = connected();
        let adapter = adapter(&device, &tracker);

        assert!(!adapter.fetch_fan_on().await.unwrap());
        assert!(adapter.fetch_light_on().await.unwrap());

        adapter.handle_fan_on(true).await.unwrap();
        assert_eq!(device.value(60), Some(DpValue::Boolean(true)));
        assert!(adapter.fetch_fan_on().await.unwrap());
    }

    #[tokio::test]
    async fn test_fan_speed() {
        let device = FakeDevice::with(&[(62, DpValue::Number(3.0))]);
        let tracker = connected();
        let adapter = adapter(&device, &tracker);

        assert_eq!(adapter.fetch_fan_speed().await.unwrap(), 50.0);

        adapter.handle_fan_speed(0.0).await.unwrap();
        assert_eq!(device.value(62), Some(DpValue::Number(1.0)));

        adapter.handle_fan_speed(100.0).await.unwrap();
        assert_eq!(device.value(62), Some(DpValue::Number(6.0)));

        for steps in 1..=6 {
            device.dps.lock().unwrap().insert(62, DpValue::from(steps as i64));
            let percent = adapter.fetch_fan_speed().await.unwrap();
            adapter.handle_fan_speed(percent).await.unwrap();
            assert_eq!(device.value(62), Some(DpValue::Number(steps as f64)));
        }
    }

    #[tokio::test]
    async fn test_fan_direction_write_is_inverted() {
        let device = FakeDevice::with(&[(63, DpValue::from("forward"))]);
        let tracker = connected();
        let adapter = adapter(&device, &tracker);

        assert_eq!(
            adapter.fetch_fan_direction().await.unwrap(),
            RotationDirection::Clockwise
        );

        adapter
            .handle_fan_direction(RotationDirection::CounterClockwise).await
            .unwrap();
        assert_eq!(device.value(63), Some(DpValue::from("forward")));
        assert_eq!(
            adapter.fetch_fan_direction().await.unwrap(),
            RotationDirection::Clockwise
        );
    }

    #[tokio::test]
    async fn test_light_temperature() {
        let device = FakeDevice::with(&[(23, DpValue::Number(0.0))]);
        let tracker = connected();
        let adapter = adapter(&device, &tracker);

        assert_eq!(adapter.fetch_light_temperature().await.unwrap(), 140.0);

        adapter.handle_light_temperature(500.0).await.unwrap();
        assert_eq!(device.value(23), Some(DpValue::Number(1000.0)));

        adapter.handle_light_temperature(320.0).await.unwrap();
        assert_eq!(device.value(23), Some(DpValue::Number(515.0)));
        let mired = adapter.fetch_light_temperature().await.unwrap();
        assert!((mired - 320.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_unexpected_value_type() {
        let device = FakeDevice::with(&[(62, DpValue::from("fast"))]);
        let tracker = connected();
        let adapter = adapter(&device, &tracker);

        let err = adapter.fetch_fan_speed().await.unwrap_err();
        assert!(matches!(
            err,
            WindcalmClientError::UnexpectedValue { index: 62, .. }
        ));
    }

    #[tokio::test]
    async fn test_device_error_is_returned() {
        let device = FakeDevice::default();
        let tracker = connected();
        let adapter = adapter(&device, &tracker);

        let err = adapter.fetch_light_on().await.unwrap_err();
        assert!(matches!(err, WindcalmClientError::Device(TuyaError::Offline)));
        assert_eq!(device.calls(), 1);
    }
}
