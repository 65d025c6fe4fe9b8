use serde::{Deserialize, Serialize};

use super::error::{BridgeError, Result};
use super::format::{DeviceId, Direction, StreamFormat};

/// Default elastic buffer depth, in frame periods.
pub const DEFAULT_CAPACITY_FACTOR: u32 = 2;

/// Configuration for a device bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Frame layout shared by the device and the mixing side.
    pub format: StreamFormat,

    /// Which device directions to open (default: both).
    pub direction: Direction,

    /// Capture device, or the platform default.
    pub rec_device: DeviceId,

    /// Playback device, or the platform default.
    pub play_device: DeviceId,

    /// Elastic buffer depth in frame periods (default: 2).
    pub capacity_factor: u32,

    /// Start the device stream as soon as the bridge is built (default: true).
    pub auto_start: bool,
}

impl BridgeConfig {
    pub fn new(format: StreamFormat) -> Self {
        Self {
            format,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.format.validate()?;
        if self.capacity_factor == 0 {
            return Err(BridgeError::invalid_argument(
                "capacity factor must be at least 1",
            ));
        }
        Ok(())
    }

    /// Parse a JSON configuration. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| BridgeError::invalid_argument(format!("bad bridge config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            format: StreamFormat::default(),
            direction: Direction::CaptureAndPlayback,
            rec_device: DeviceId::Default,
            play_device: DeviceId::Default,
            capacity_factor: DEFAULT_CAPACITY_FACTOR,
            auto_start: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = BridgeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.format.ptime_msec(), 20);
        assert_eq!(config.capacity_factor, 2);
    }

    #[test]
    fn from_json_fills_defaults() {
        let config = BridgeConfig::from_json(
            r#"{
                "format": {
                    "clock_rate": 8000,
                    "channel_count": 1,
                    "bits_per_sample": 16,
                    "samples_per_frame": 160
                },
                "direction": "playback",
                "play_device": 2
            }"#,
        )
        .unwrap();

        assert_eq!(config.format.clock_rate, 8000);
        assert_eq!(config.direction, Direction::Playback);
        assert_eq!(config.play_device, DeviceId::Index(2));
        assert_eq!(config.rec_device, DeviceId::Default);
        assert!(config.auto_start);
    }

    #[test]
    fn from_json_negative_device_is_default() {
        let config = BridgeConfig::from_json(r#"{ "rec_device": -1 }"#).unwrap();
        assert_eq!(config.rec_device, DeviceId::Default);
    }

    #[test]
    fn from_json_rejects_invalid() {
        assert!(matches!(
            BridgeConfig::from_json(r#"{ "capacity_factor": 0 }"#),
            Err(BridgeError::InvalidArgument(_))
        ));
        assert!(matches!(
            BridgeConfig::from_json("not json"),
            Err(BridgeError::InvalidArgument(_))
        ));
    }
}
