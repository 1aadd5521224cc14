use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

const KEY_DPS: &str = "dps";
const KEY_DATA: &str = "data";

/// Value held by a single data point.
///
/// Tuya devices only carry booleans, numbers and strings in their `dps`
/// object. Numbers are kept as `f64` so that remapped values are written
/// without rounding; integral numbers go on the wire as JSON integers.
#[derive(Debug, Clone, PartialEq)]
pub enum DpValue {
    Boolean(bool),
    Number(f64),
    String(String),
}

impl DpValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DpValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DpValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DpValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            DpValue::Boolean(b) => Value::Bool(*b),
            DpValue::Number(n)
                if n.is_finite() && n.fract() == 0.0 && n.abs() < i64::MAX as f64 =>
            {
                Value::from(*n as i64)
            }
            DpValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            DpValue::String(s) => Value::String(s.clone()),
        }
    }

    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(DpValue::Boolean(*b)),
            Value::Number(n) => n.as_f64().map(DpValue::Number),
            Value::String(s) => Some(DpValue::String(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for DpValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl From<bool> for DpValue {
    fn from(value: bool) -> Self {
        DpValue::Boolean(value)
    }
}

impl From<i64> for DpValue {
    fn from(value: i64) -> Self {
        DpValue::Number(value as f64)
    }
}

impl From<f64> for DpValue {
    fn from(value: f64) -> Self {
        DpValue::Number(value)
    }
}

impl From<&str> for DpValue {
    fn from(value: &str) -> Self {
        DpValue::String(value.to_string())
    }
}

impl From<String> for DpValue {
    fn from(value: String) -> Self {
        DpValue::String(value)
    }
}

/// The data points carried by one device message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DpReport {
    pub dps: BTreeMap<u32, DpValue>,
}

impl DpReport {
    /// Extracts the `dps` object of a decoded payload.
    ///
    /// Protocol 3.3 and older put it at the top level, 3.4+ nest it under
    /// `data`. Keys that are not numeric and values that are not scalar are
    /// skipped.
    pub fn from_payload(payload: &Value) -> Option<Self> {
        let dps = payload
            .get(KEY_DPS)
            .or_else(|| payload.get(KEY_DATA).and_then(|data| data.get(KEY_DPS)))?
            .as_object()?;

        let dps = dps
            .iter()
            .filter_map(|(index, value)| {
                Some((index.parse::<u32>().ok()?, DpValue::from_json(value)?))
            })
            .collect();
        Some(Self { dps })
    }

    pub fn get(&self, index: u32) -> Option<&DpValue> {
        self.dps.get(&index)
    }

    pub fn is_empty(&self) -> bool {
        self.dps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_report_from_v33_payload() {
        let payload = json!({
            "devId": "bf0123456789abcdef",
            "dps": {"60": true, "62": 3, "63": "forward"},
            "t": 1700000000
        });
        let report = DpReport::from_payload(&payload).unwrap();
        assert_eq!(report.get(60), Some(&DpValue::Boolean(true)));
        assert_eq!(report.get(62), Some(&DpValue::Number(3.0)));
        assert_eq!(report.get(63), Some(&DpValue::from("forward")));
        assert_eq!(report.get(20), None);
    }

    #[test]
    fn test_report_from_v34_payload() {
        let payload = json!({
            "protocol": 4,
            "t": 1700000000,
            "data": {"dps": {"20": false, "23": 515}}
        });
        let report = DpReport::from_payload(&payload).unwrap();
        assert_eq!(report.dps.len(), 2);
        assert_eq!(report.get(20).and_then(DpValue::as_bool), Some(false));
        assert_eq!(report.get(23).and_then(DpValue::as_f64), Some(515.0));
    }

    #[test]
    fn test_report_skips_unusable_entries() {
        let payload = json!({"dps": {"60": null, "abc": 1, "62": [1, 2], "20": true}});
        let report = DpReport::from_payload(&payload).unwrap();
        assert_eq!(report.dps.len(), 1);
        assert!(report.get(20).is_some());
    }

    #[test]
    fn test_payload_without_dps() {
        assert!(DpReport::from_payload(&json!({"Err": "905"})).is_none());
        assert!(DpReport::from_payload(&json!({"dps": "nope"})).is_none());
    }

    #[test]
    fn test_integral_numbers_go_out_as_integers() {
        assert_eq!(DpValue::Number(4.0).to_json(), json!(4));
        assert_eq!(DpValue::Number(32.5).to_json(), json!(32.5));
        assert_eq!(DpValue::from("reverse").to_json(), json!("reverse"));
        assert_eq!(DpValue::Number(6.0).to_string(), "6");
    }
}
