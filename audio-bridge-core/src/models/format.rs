use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{BridgeError, Result};

/// PCM layout shared by every frame that crosses one port.
///
/// `samples_per_frame` counts samples across all channels, so a 20 ms stereo
/// frame at 16 kHz is 640 samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamFormat {
    /// Sampling rate in Hz.
    pub clock_rate: u32,

    /// Number of interleaved channels (at least 1).
    pub channel_count: u16,

    /// Bits per sample. Only 16-bit PCM is carried by the bridge.
    pub bits_per_sample: u16,

    /// Interleaved samples per frame, all channels included.
    pub samples_per_frame: u32,
}

impl StreamFormat {
    pub fn new(
        clock_rate: u32,
        channel_count: u16,
        bits_per_sample: u16,
        samples_per_frame: u32,
    ) -> Self {
        Self {
            clock_rate,
            channel_count,
            bits_per_sample,
            samples_per_frame,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.clock_rate == 0 {
            return Err(BridgeError::invalid_argument("clock rate must be positive"));
        }
        if self.channel_count == 0 {
            return Err(BridgeError::invalid_argument("channel count must be at least 1"));
        }
        if self.bits_per_sample != 16 {
            return Err(BridgeError::invalid_argument(format!(
                "unsupported bits per sample: {}",
                self.bits_per_sample
            )));
        }
        if self.samples_per_frame == 0 {
            return Err(BridgeError::invalid_argument(
                "samples per frame must be positive",
            ));
        }
        if self.samples_per_frame % u32::from(self.channel_count) != 0 {
            return Err(BridgeError::invalid_argument(format!(
                "{} samples per frame is not a whole number of {}-channel sample frames",
                self.samples_per_frame, self.channel_count
            )));
        }
        Ok(())
    }

    /// Samples per frame as a buffer length.
    pub fn frame_len(&self) -> usize {
        self.samples_per_frame as usize
    }

    /// Per-channel samples in one frame, i.e. clock ticks per period.
    pub fn samples_per_channel(&self) -> u32 {
        self.samples_per_frame / u32::from(self.channel_count.max(1))
    }

    /// Byte size of one frame.
    pub fn frame_bytes(&self) -> usize {
        self.frame_len() * usize::from(self.bits_per_sample / 8)
    }

    /// Frame period in microseconds.
    pub fn ptime_usec(&self) -> u64 {
        if self.clock_rate == 0 {
            return 0;
        }
        u64::from(self.samples_per_channel()) * 1_000_000 / u64::from(self.clock_rate)
    }

    /// Frame period in whole milliseconds.
    pub fn ptime_msec(&self) -> u32 {
        (self.ptime_usec() / 1000) as u32
    }
}

impl Default for StreamFormat {
    fn default() -> Self {
        // 16 kHz mono, 20 ms frames
        Self::new(16000, 1, 16, 320)
    }
}

/// Media direction of a device stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Capture,
    Playback,
    CaptureAndPlayback,
}

impl Direction {
    pub fn has_capture(&self) -> bool {
        matches!(self, Self::Capture | Self::CaptureAndPlayback)
    }

    pub fn has_playback(&self) -> bool {
        matches!(self, Self::Playback | Self::CaptureAndPlayback)
    }
}

/// Device selector. Negative indices select the platform default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum DeviceId {
    #[default]
    Default,
    Index(usize),
}

impl From<i32> for DeviceId {
    fn from(index: i32) -> Self {
        if index < 0 {
            Self::Default
        } else {
            Self::Index(index as usize)
        }
    }
}

impl From<DeviceId> for i32 {
    fn from(id: DeviceId) -> Self {
        match id {
            DeviceId::Default => -1,
            DeviceId::Index(index) => i32::try_from(index).unwrap_or(i32::MAX),
        }
    }
}

bitflags! {
    /// Device port construction options.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
    pub struct PortOptions: u32 {
        /// Create the device stream but do not start it.
        const NO_AUTO_START = 1 << 0;
    }
}

/// Identity and format of a media port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    pub id: Uuid,
    pub name: String,
    pub format: StreamFormat,
}

impl PortInfo {
    pub fn new(name: impl Into<String>, format: StreamFormat) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            format,
        }
    }
}
