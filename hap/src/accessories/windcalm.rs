use std::sync::Arc;

use anyhow::{Context, Result};
use futures::FutureExt;
use hap::characteristic::HapCharacteristic;
use hap::pointer::Accessory;
use hap::server::Server;
use hap::{
    HapType,
    accessory::{AccessoryInformation, HapAccessory},
    characteristic::AsyncCharacteristicCallbacks,
    server::IpServer,
    service::{
        HapService, accessory_information::AccessoryInformationService, fan::FanService,
        lightbulb::LightbulbService,
    },
};
use serde::{
    Serialize,
    ser::{SerializeStruct, Serializer},
};
use serde_json::Value;
use tracing::{debug, info, warn};
use windcalm_client::{DataPointTransport, DpReport};

use crate::accessories::adapter::WindcalmAdapter;
use crate::accessories::mapping::{Characteristic, RotationDirection};

const MANUFACTURER: &str = "CREATE";
const MODEL: &str = "Windcalm DC";

#[derive(Debug)]
struct WindcalmFan {
    id: u64,
    /// Accessory Information service.
    pub accessory_information: AccessoryInformationService,
    /// Fan service.
    pub fan: FanService,
    /// Lightbulb service.
    pub lightbulb: LightbulbService,
}

impl HapAccessory for WindcalmFan {
    fn get_id(&self) -> u64 {
        self.id
    }

    fn set_id(&mut self, id: u64) {
        self.id = id;
    }

    fn get_service(&self, hap_type: HapType) -> Option<&dyn HapService> {
        self.get_services()
            .into_iter()
            .find(|&service| service.get_type() == hap_type)
    }

    fn get_mut_service(&mut self, hap_type: HapType) -> Option<&mut dyn HapService> {
        self.get_mut_services()
            .into_iter()
            .find(|service| service.get_type() == hap_type)
    }

    fn get_services(&self) -> Vec<&dyn HapService> {
        vec![&self.accessory_information, &self.fan, &self.lightbulb]
    }

    fn get_mut_services(&mut self) -> Vec<&mut dyn HapService> {
        vec![
            &mut self.accessory_information,
            &mut self.fan,
            &mut self.lightbulb,
        ]
    }
}

impl Serialize for WindcalmFan {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("HapAccessory", 2)?;
        state.serialize_field("aid", &self.get_id())?;
        state.serialize_field("services", &self.get_services())?;
        state.end()
    }
}

impl WindcalmFan {
    async fn new(id: u64, name: &str, serial_number: &str) -> Result<Self> {
        let accessory_information = AccessoryInformation {
            manufacturer: MANUFACTURER.to_string(),
            model: MODEL.to_string(),
            serial_number: serial_number.to_string(),
            name: name.to_string(),
            ..Default::default()
        }
        .to_service(1, id)?;

        let fan_id = 1 + accessory_information.get_characteristics().len() as u64 + 1;
        let mut fan = FanService::new(fan_id, id);
        let light_id = fan_id + fan.get_characteristics().len() as u64 + 1;
        let mut lightbulb = LightbulbService::new(light_id, id);
        debug!("Fan service ID: {fan_id}, lightbulb service ID: {light_id}");

        fan.set_primary(true);

        lightbulb.brightness = None;
        lightbulb.hue = None;
        lightbulb.saturation = None;
        lightbulb.characteristic_value_active_transition_count = None;
        lightbulb.characteristic_value_transition_control = None;
        lightbulb.supported_characteristic_value_transition_configuration = None;

        if let Some(characteristic) = fan.name.as_mut() {
            characteristic.set_value(Value::from(name)).await?;
        }
        if let Some(characteristic) = lightbulb.name.as_mut() {
            characteristic
                .set_value(Value::from(format!("{name} Light")))
                .await?;
        }

        Ok(Self {
            id,
            accessory_information,
            fan,
            lightbulb,
        })
    }
}

/// Service and characteristic a data point is exposed as.
fn hap_target(characteristic: Characteristic) -> (HapType, HapType) {
    match characteristic {
        Characteristic::FanOn => (HapType::Fan, HapType::PowerState),
        Characteristic::FanSpeed => (HapType::Fan, HapType::RotationSpeed),
        Characteristic::FanDirection => (HapType::Fan, HapType::RotationDirection),
        Characteristic::LightOn => (HapType::Lightbulb, HapType::PowerState),
        Characteristic::LightTemperature => (HapType::Lightbulb, HapType::ColorTemperature),
    }
}

/// The fan and its light as one HomeKit accessory.
pub(crate) struct WindcalmAccessory {
    accessory: Accessory,
}

impl WindcalmAccessory {
    pub async fn new<T>(
        id: u64,
        name: &str,
        serial_number: &str,
        adapter: Arc<WindcalmAdapter<T>>,
        server: &IpServer,
    ) -> Result<Self>
    where
        T: DataPointTransport + 'static,
    {
        let mut accessory = WindcalmFan::new(id, name, serial_number).await?;
        info!("Creating fan accessory '{name}' for device {serial_number}");

        Self::setup_fan(&mut accessory.fan, adapter.clone())?;
        Self::setup_light(&mut accessory.lightbulb, adapter)?;

        let accessory = server.add_accessory(accessory).await?;
        Ok(Self { accessory })
    }

    fn setup_fan<T>(fan: &mut FanService, adapter: Arc<WindcalmAdapter<T>>) -> Result<()>
    where
        T: DataPointTransport + 'static,
    {
        let adapter_ = adapter.clone();
        fan.power_state.on_read_async(Some(move || {
            let adapter = adapter_.clone();
            async move { Ok(Some(adapter.fetch_fan_on().await?)) }.boxed()
        }));

        let adapter_ = adapter.clone();
        fan.power_state
            .on_update_async(Some(move |_current: bool, new: bool| {
                let adapter = adapter_.clone();
                async move {
                    adapter.handle_fan_on(new).await?;
                    Ok(())
                }
                .boxed()
            }));

        let rotation_speed = fan
            .rotation_speed
            .as_mut()
            .context("Fan service has no rotation speed")?;

        let adapter_ = adapter.clone();
        rotation_speed.on_read_async(Some(move || {
            let adapter = adapter_.clone();
            async move { Ok(Some(adapter.fetch_fan_speed().await?)) }.boxed()
        }));

        let adapter_ = adapter.clone();
        rotation_speed.on_update_async(Some(move |_current: f32, new: f32| {
            let adapter = adapter_.clone();
            async move {
                adapter.handle_fan_speed(new).await?;
                Ok(())
            }
            .boxed()
        }));

        let rotation_direction = fan
            .rotation_direction
            .as_mut()
            .context("Fan service has no rotation direction")?;

        let adapter_ = adapter.clone();
        rotation_direction.on_read_async(Some(move || {
            let adapter = adapter_.clone();
            async move {
                let direction = adapter.fetch_fan_direction().await?;
                Ok(Some(direction as i32))
            }
            .boxed()
        }));

        rotation_direction.on_update_async(Some(move |_current: i32, new: i32| {
            let adapter = adapter.clone();
            async move {
                adapter
                    .handle_fan_direction(RotationDirection::from(new))
                    .await?;
                Ok(())
            }
            .boxed()
        }));

        Ok(())
    }

    fn setup_light<T>(
        lightbulb: &mut LightbulbService,
        adapter: Arc<WindcalmAdapter<T>>,
    ) -> Result<()>
    where
        T: DataPointTransport + 'static,
    {
        let adapter_ = adapter.clone();
        lightbulb.power_state.on_read_async(Some(move || {
            let adapter = adapter_.clone();
            async move { Ok(Some(adapter.fetch_light_on().await?)) }.boxed()
        }));

        let adapter_ = adapter.clone();
        lightbulb
            .power_state
            .on_update_async(Some(move |_current: bool, new: bool| {
                let adapter = adapter_.clone();
                async move {
                    adapter.handle_light_on(new).await?;
                    Ok(())
                }
                .boxed()
            }));

        let color_temperature = lightbulb
            .color_temperature
            .as_mut()
            .context("Lightbulb service has no color temperature")?;

        let adapter_ = adapter.clone();
        color_temperature.on_read_async(Some(move || {
            let adapter = adapter_.clone();
            async move {
                let mired = adapter.fetch_light_temperature().await?;
                Ok(Some(mired.round() as u32))
            }
            .boxed()
        }));

        color_temperature.on_update_async(Some(move |_current: u32, new: u32| {
            let adapter = adapter.clone();
            async move {
                adapter.handle_light_temperature(new as f64).await?;
                Ok(())
            }
            .boxed()
        }));

        Ok(())
    }

    /// Pushes the data points of an unsolicited device report to the
    /// controllers.
    pub async fn update(&self, report: &DpReport) -> Result<()> {
        let mut accessory = self.accessory.lock().await;
        apply_report(&mut **accessory, report).await
    }
}

/// Sets every known data point of `report` on its characteristic. Values
/// of the wrong type are skipped.
async fn apply_report(accessory: &mut dyn HapAccessory, report: &DpReport) -> Result<()> {
    for (index, value) in report.dps.iter() {
        let Some(characteristic) = Characteristic::from_data_point(*index) else {
            continue;
        };
        let host_value = match characteristic.to_host(value) {
            Ok(host_value) => host_value,
            Err(e) => {
                warn!("Skipping update of {characteristic:?}: {e}");
                continue;
            }
        };

        let (service_type, characteristic_type) = hap_target(characteristic);
        let service = accessory
            .get_mut_service(service_type)
            .with_context(|| format!("{service_type:?} service not found"))?;
        if let Some(target) = service.get_mut_characteristic(characteristic_type) {
            debug!("Updating {characteristic:?} to {host_value}");
            target.update_value(host_value).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use windcalm_client::DpValue;

    use super::*;

    async fn value_of(
        accessory: &mut WindcalmFan,
        service_type: HapType,
        characteristic_type: HapType,
    ) -> Value {
        accessory
            .get_mut_service(service_type)
            .unwrap()
            .get_mut_characteristic(characteristic_type)
            .unwrap()
            .get_value()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_report_reaches_characteristics() {
        let mut accessory = WindcalmFan::new(1, "Bedroom fan", "bf0123456789abcdef")
            .await
            .unwrap();
        let report = DpReport {
            dps: [
                (60, DpValue::Boolean(true)),
                (62, DpValue::Number(3.0)),
                (63, DpValue::from("reverse")),
                (20, DpValue::Boolean(true)),
                (23, DpValue::Number(0.0)),
                // not exposed
                (1, DpValue::Boolean(true)),
            ]
            .into_iter()
            .collect(),
        };

        apply_report(&mut accessory, &report).await.unwrap();

        assert_eq!(
            value_of(&mut accessory, HapType::Fan, HapType::PowerState).await,
            Value::from(true)
        );
        assert_eq!(
            value_of(&mut accessory, HapType::Fan, HapType::RotationSpeed).await,
            Value::from(50.0)
        );
        assert_eq!(
            value_of(&mut accessory, HapType::Fan, HapType::RotationDirection).await,
            Value::from(1)
        );
        assert_eq!(
            value_of(&mut accessory, HapType::Lightbulb, HapType::PowerState).await,
            Value::from(true)
        );
        assert_eq!(
            value_of(&mut accessory, HapType::Lightbulb, HapType::ColorTemperature).await,
            Value::from(140)
        );
    }

    #[tokio::test]
    async fn test_report_with_wrong_type_is_skipped() {
        let mut accessory = WindcalmFan::new(1, "Bedroom fan", "bf0123456789abcdef")
            .await
            .unwrap();
        let before = value_of(&mut accessory, HapType::Fan, HapType::RotationSpeed).await;
        let report = DpReport {
            dps: [(62, DpValue::from("fast")), (20, DpValue::Boolean(true))]
                .into_iter()
                .collect(),
        };

        apply_report(&mut accessory, &report).await.unwrap();

        assert_eq!(
            value_of(&mut accessory, HapType::Fan, HapType::RotationSpeed).await,
            before
        );
        assert_eq!(
            value_of(&mut accessory, HapType::Lightbulb, HapType::PowerState).await,
            Value::from(true)
        );
    }

    #[test]
    fn test_every_data_point_has_a_target() {
        let targets: Vec<_> = Characteristic::ALL.into_iter().map(hap_target).collect();
        assert_eq!(targets.len(), 5);
        for (i, a) in targets.iter().enumerate() {
            for b in targets.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[tokio::test]
    async fn test_accessory_services() {
        let accessory = WindcalmFan::new(1, "Bedroom fan", "bf0123456789abcdef")
            .await
            .unwrap();

        let types: Vec<HapType> = accessory
            .get_services()
            .into_iter()
            .map(|service| service.get_type())
            .collect();
        assert_eq!(
            types,
            vec![
                HapType::AccessoryInformation,
                HapType::Fan,
                HapType::Lightbulb
            ]
        );

        assert!(accessory.fan.rotation_speed.is_some());
        assert!(accessory.fan.rotation_direction.is_some());
        assert!(accessory.lightbulb.color_temperature.is_some());
        assert!(accessory.lightbulb.brightness.is_none());

        let mut ids: Vec<u64> = accessory
            .get_services()
            .into_iter()
            .map(|service| service.get_id())
            .collect();
        ids.dedup();
        assert_eq!(ids.len(), 3);
    }
}
