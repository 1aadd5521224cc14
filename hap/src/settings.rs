use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use windcalm_client::{
    ADDRESS_AUTO, DEFAULT_STALE_READ_AGE, DEFAULT_VERSION, RetryPolicy, TuyaOptions,
};

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Please provide a Tuya device ID and Tuya device key in your settings file")]
    MissingCredentials,
    #[error("Cannot read settings file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("Invalid settings file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid device options: {0}")]
    Options(String),
}

/// Accessory configuration, homebridge style: one flat JSON object.
/// Unknown keys (e.g. `"accessory"`) are ignored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub id: Option<String>,
    pub key: Option<String>,
    pub name: String,
    pub address: String,
    pub version: String,
    pub pairing_code: [u8; 8],
    pub setup_id: String,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub max_attempts: Option<u32>,
}

impl Default for Settings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Settings {
            id: None,
            key: None,
            name: String::from("Windcalm"),
            address: ADDRESS_AUTO.to_string(),
            version: DEFAULT_VERSION.to_string(),
            pairing_code: [1, 1, 1, 2, 2, 3, 3, 3],
            setup_id: String::from("WNDC"),
            read_timeout_ms: policy.read_timeout.as_millis() as u64,
            write_timeout_ms: policy.write_timeout.as_millis() as u64,
            max_attempts: policy.max_attempts,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCredentials {
    pub id: String,
    pub key: String,
}

impl Settings {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Device id and key, both required and non-blank.
    pub fn credentials(&self) -> Result<DeviceCredentials, SettingsError> {
        let present = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        match (present(&self.id), present(&self.key)) {
            (Some(id), Some(key)) => Ok(DeviceCredentials { id, key }),
            _ => Err(SettingsError::MissingCredentials),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            write_timeout: Duration::from_millis(self.write_timeout_ms),
            max_attempts: self.max_attempts,
        }
    }

    /// Age after which a pending read is dropped: never below the default,
    /// and always twice the read timeout.
    fn stale_read_age(&self) -> Duration {
        DEFAULT_STALE_READ_AGE.max(self.retry_policy().read_timeout * 2)
    }

    pub fn tuya_options(&self) -> Result<TuyaOptions, SettingsError> {
        let credentials = self.credentials()?;
        TuyaOptions::builder()
            .id(credentials.id)
            .key(credentials.key)
            .address(self.address.clone())
            .version(self.version.clone())
            .name(self.name.clone())
            .stale_read_age(self.stale_read_age())
            .build()
            .map_err(|e| SettingsError::Options(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.name, "Windcalm");
        assert_eq!(settings.address, "Auto");
        assert_eq!(settings.version, "3.3");
        assert_eq!(settings.retry_policy(), RetryPolicy::default());
        assert!(matches!(
            settings.credentials(),
            Err(SettingsError::MissingCredentials)
        ));
    }

    #[test]
    fn test_homebridge_style_config() {
        let settings: Settings = serde_json::from_str(
            r#"{
                "accessory": "CREATEWindcalm",
                "name": "Bedroom fan",
                "id": "bf0123456789abcdef",
                "key": "0123456789abcdef"
            }"#,
        )
        .unwrap();
        assert_eq!(settings.name, "Bedroom fan");
        assert_eq!(settings.read_timeout_ms, 500);
        assert_eq!(settings.write_timeout_ms, 250);
        assert_eq!(
            settings.credentials().unwrap(),
            DeviceCredentials {
                id: "bf0123456789abcdef".to_string(),
                key: "0123456789abcdef".to_string(),
            }
        );

        let options = settings.tuya_options().unwrap();
        assert_eq!(options.name, "Bedroom fan");
        assert_eq!(options.address, "Auto");
    }

    #[test]
    fn test_blank_key_is_missing() {
        let settings = Settings {
            id: Some("bf0123456789abcdef".to_string()),
            key: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            settings.tuya_options(),
            Err(SettingsError::MissingCredentials)
        ));
    }

    #[test]
    fn test_bounded_retries() {
        let settings: Settings =
            serde_json::from_str(r#"{"read_timeout_ms": 1000, "max_attempts": 3}"#).unwrap();
        let policy = settings.retry_policy();
        assert_eq!(policy.read_timeout, Duration::from_secs(1));
        assert_eq!(policy.write_timeout, Duration::from_millis(250));
        assert_eq!(policy.max_attempts, Some(3));
    }

    #[test]
    fn test_stale_read_age_follows_read_timeout() {
        let mut settings = Settings {
            id: Some("bf0123456789abcdef".to_string()),
            key: Some("0123456789abcdef".to_string()),
            ..Default::default()
        };
        assert_eq!(
            settings.tuya_options().unwrap().stale_read_age,
            DEFAULT_STALE_READ_AGE
        );

        settings.read_timeout_ms = 30_000;
        assert_eq!(
            settings.tuya_options().unwrap().stale_read_age,
            Duration::from_secs(60)
        );
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("windcalm.json");
        std::fs::write(&path, r#"{"id": "abc", "key": "def", "setup_id": "ABCD"}"#).unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.setup_id, "ABCD");
        assert!(settings.credentials().is_ok());

        assert!(matches!(
            Settings::load(dir.path().join("missing.json")),
            Err(SettingsError::Read { .. })
        ));
    }
}
