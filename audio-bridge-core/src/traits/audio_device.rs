use std::sync::Arc;

use crate::models::audio_models::DeviceInfo;
use crate::models::error::{BridgeError, Result};
use crate::models::format::{DeviceId, Direction, StreamFormat};
use crate::models::frame::AudioFrame;

/// Callback invoked by a device stream once per period.
///
/// The record callback receives a captured frame. The playback callback
/// receives a frame-sized buffer (with `size` set to the required byte count)
/// that it must fill.
pub type FrameCallback = Arc<dyn Fn(&mut AudioFrame) -> Result<()> + Send + Sync + 'static>;

/// Observation-only hook receiving each played or recorded frame.
pub type FramePreview = Arc<dyn Fn(&AudioFrame) + Send + Sync + 'static>;

/// Parameters for opening a device stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamParam {
    pub direction: Direction,
    pub rec_device: DeviceId,
    pub play_device: DeviceId,
    pub format: StreamFormat,
}

/// Record and playback callbacks handed to a stream.
#[derive(Clone, Default)]
pub struct StreamCallbacks {
    pub record: Option<FrameCallback>,
    pub playback: Option<FrameCallback>,
}

/// A device stream calling its callbacks at a fixed period while running.
///
/// Dropping the stream destroys it; implementations stop first if needed.
pub trait AudioStream: Send {
    fn start(&mut self) -> Result<()>;

    fn stop(&mut self) -> Result<()>;

    fn is_running(&self) -> bool;
}

/// Audio device subsystem that can describe devices and open streams.
///
/// Implemented by:
/// - `VirtualDevice` (software clock, no hardware)
/// - `CpalDevice` (audio-bridge-cpal crate)
pub trait AudioDevice: Send + Sync {
    /// Number of devices known to this subsystem.
    fn device_count(&self) -> usize;

    /// Describe the device at `index`.
    fn device_info(&self, index: usize) -> Result<DeviceInfo>;

    fn default_capture_device(&self) -> Result<usize>;

    fn default_playback_device(&self) -> Result<usize>;

    /// Open a stream. The stream is created stopped.
    fn create_stream(
        &self,
        param: &StreamParam,
        callbacks: StreamCallbacks,
    ) -> Result<Box<dyn AudioStream>>;

    fn resolve_capture(&self, id: DeviceId) -> Result<usize> {
        self.resolve(id, true)
    }

    fn resolve_playback(&self, id: DeviceId) -> Result<usize> {
        self.resolve(id, false)
    }

    fn resolve(&self, id: DeviceId, capture: bool) -> Result<usize> {
        match id {
            DeviceId::Default if capture => self.default_capture_device(),
            DeviceId::Default => self.default_playback_device(),
            DeviceId::Index(index) if index < self.device_count() => Ok(index),
            DeviceId::Index(index) => Err(BridgeError::device_unavailable(format!(
                "no device at index {}",
                index
            ))),
        }
    }
}
