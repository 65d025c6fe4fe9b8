//! # audio-bridge-core
//!
//! Platform-agnostic audio port bridge.
//!
//! Lets a hardware-driven capture/playback pump and a software mixing pump
//! exchange fixed-size frames although each runs on its own thread and clock.
//! Device backends implement the `AudioDevice` trait and plug into the
//! generic `DevicePort`; `DeviceBridge` joins a device stream to the mixing
//! side through an `AdapterPort`.
//!
//! ## Architecture
//!
//! ```text
//! audio-bridge-core (this crate)
//! ├── traits/       ← MediaPort, AudioDevice, AudioStream
//! ├── models/       ← BridgeError, StreamFormat, AudioFrame, BridgeConfig, etc.
//! ├── processing/   ← ElasticBuffer, ClockSource
//! ├── port/         ← AdapterPort, DevicePort, DeviceBridge
//! └── device/       ← VirtualDevice (software clock)
//! ```

pub mod device;
pub mod models;
pub mod port;
pub mod processing;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use device::virtual_device::{Clocking, VirtualDevice};
pub use models::audio_models::{
    AdapterStats, BridgeDiagnostics, DeviceCaps, DeviceInfo, ResetState,
};
pub use models::config::BridgeConfig;
pub use models::error::{BridgeError, FormatMismatch, Result};
pub use models::format::{DeviceId, Direction, PortInfo, PortOptions, StreamFormat};
pub use models::frame::{AudioFrame, FrameType};
pub use port::adapter::{AdapterFacade, AdapterPort, Facade};
pub use port::bridge::DeviceBridge;
pub use port::device_port::{DevicePort, DevicePortParam};
pub use processing::clock_source::ClockSource;
pub use processing::elastic_buffer::{ElasticBuffer, ElasticBufferStats};
pub use traits::audio_device::{
    AudioDevice, AudioStream, FrameCallback, FramePreview, StreamCallbacks, StreamParam,
};
pub use traits::media_port::MediaPort;
