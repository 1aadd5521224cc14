//! Data points of the Windcalm DC and the transforms between device values
//! and HomeKit characteristic values.

use serde_json::Value;
use windcalm_client::{DpValue, WindcalmClientError};

/// The fan speed data point counts steps, 1 to 6.
pub(crate) const FAN_SPEED_STEPS: f64 = 6.0;
/// Absorbs single precision error of a percentage read back from the device
/// before flooring it to a step.
const FAN_SPEED_TOLERANCE: f64 = 1e-6;

pub(crate) const DEVICE_TEMPERATURE_RANGE: (f64, f64) = (30.0, 1000.0);
pub(crate) const MIRED_RANGE: (f64, f64) = (140.0, 500.0);

const DIRECTION_FORWARD: &str = "forward";
const DIRECTION_REVERSE: &str = "reverse";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Characteristic {
    FanOn,
    FanSpeed,
    FanDirection,
    LightOn,
    LightTemperature,
}

impl Characteristic {
    pub(crate) const ALL: [Characteristic; 5] = [
        Characteristic::FanOn,
        Characteristic::FanSpeed,
        Characteristic::FanDirection,
        Characteristic::LightOn,
        Characteristic::LightTemperature,
    ];

    pub(crate) const fn data_point(self) -> u32 {
        match self {
            Characteristic::FanOn => 60,
            Characteristic::FanSpeed => 62,
            Characteristic::FanDirection => 63,
            Characteristic::LightOn => 20,
            Characteristic::LightTemperature => 23,
        }
    }

    pub(crate) fn from_data_point(index: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.data_point() == index)
    }

    /// HomeKit value for a device value, through the read transform.
    pub(crate) fn to_host(self, value: &DpValue) -> Result<Value, WindcalmClientError> {
        Ok(match self {
            Characteristic::FanOn | Characteristic::LightOn => {
                Value::from(expect_bool(self, value)?)
            }
            Characteristic::FanSpeed => {
                Value::from(fan_speed_from_device(expect_number(self, value)?))
            }
            Characteristic::FanDirection => {
                Value::from(direction_from_device(expect_str(self, value)?) as i32)
            }
            Characteristic::LightTemperature => {
                Value::from(temperature_from_device(expect_number(self, value)?).round() as u32)
            }
        })
    }
}

/// HomeKit rotation direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub(crate) enum RotationDirection {
    Clockwise = 0,
    CounterClockwise = 1,
}

impl From<i32> for RotationDirection {
    fn from(value: i32) -> Self {
        if value == RotationDirection::CounterClockwise as i32 {
            RotationDirection::CounterClockwise
        } else {
            RotationDirection::Clockwise
        }
    }
}

/// `(v - a) * (d - c) / (b - a) + c`
pub(crate) fn convert_range(value: f64, from: (f64, f64), to: (f64, f64)) -> f64 {
    (value - from.0) * (to.1 - to.0) / (from.1 - from.0) + to.0
}

pub(crate) fn fan_speed_from_device(steps: f64) -> f64 {
    steps * 100.0 / FAN_SPEED_STEPS
}

/// Speed percentage to device step. Never 0: the device rejects it, the On
/// characteristic stops the fan.
pub(crate) fn fan_speed_to_device(percent: f64) -> i64 {
    let steps = (percent * FAN_SPEED_STEPS / 100.0 + FAN_SPEED_TOLERANCE).floor();
    if steps.is_nan() {
        return 1;
    }
    (steps as i64).clamp(1, FAN_SPEED_STEPS as i64)
}

pub(crate) fn direction_from_device(value: &str) -> RotationDirection {
    if value == DIRECTION_FORWARD {
        RotationDirection::Clockwise
    } else {
        RotationDirection::CounterClockwise
    }
}

// Not the inverse of direction_from_device: writing back a direction that
// was just read flips it.
pub(crate) fn direction_to_device(direction: RotationDirection) -> &'static str {
    match direction {
        RotationDirection::CounterClockwise => DIRECTION_FORWARD,
        RotationDirection::Clockwise => DIRECTION_REVERSE,
    }
}

/// Device temperature to mired. The firmware reports its floor (30) as 0,
/// so anything below the floor reads as the floor.
pub(crate) fn temperature_from_device(raw: f64) -> f64 {
    convert_range(
        raw.max(DEVICE_TEMPERATURE_RANGE.0),
        DEVICE_TEMPERATURE_RANGE,
        MIRED_RANGE,
    )
}

pub(crate) fn temperature_to_device(mired: f64) -> f64 {
    convert_range(mired, MIRED_RANGE, DEVICE_TEMPERATURE_RANGE)
}

fn unexpected(characteristic: Characteristic, value: &DpValue) -> WindcalmClientError {
    WindcalmClientError::UnexpectedValue {
        index: characteristic.data_point(),
        value: value.clone(),
    }
}

pub(crate) fn expect_bool(
    characteristic: Characteristic,
    value: &DpValue,
) -> Result<bool, WindcalmClientError> {
    value.as_bool().ok_or_else(|| unexpected(characteristic, value))
}

pub(crate) fn expect_number(
    characteristic: Characteristic,
    value: &DpValue,
) -> Result<f64, WindcalmClientError> {
    value.as_f64().ok_or_else(|| unexpected(characteristic, value))
}

pub(crate) fn expect_str(
    characteristic: Characteristic,
    value: &DpValue,
) -> Result<&str, WindcalmClientError> {
    value.as_str().ok_or_else(|| unexpected(characteristic, value))
}
