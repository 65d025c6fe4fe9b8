//! # audio-bridge-cpal
//!
//! cpal device backend for audio-bridge-core.
//!
//! Provides:
//! - `CpalDevice`: `AudioDevice` over a cpal host (ALSA, CoreAudio, WASAPI, ...)
//! - `framing`: re-blocking between host buffers and fixed-size frames
//!
//! ## Build Requirements
//! The backend is behind the `cpal` feature. On Linux it needs the ALSA
//! development headers (`libasound2-dev`).
//!
//! ## Usage
//! ```ignore
//! use std::sync::Arc;
//! use audio_bridge_core::{BridgeConfig, DeviceBridge, StreamFormat};
//! use audio_bridge_cpal::CpalDevice;
//!
//! let device = Arc::new(CpalDevice::new()?);
//! let bridge = DeviceBridge::create(device, &BridgeConfig::new(StreamFormat::default()))?;
//! let mixer_port = bridge.port();
//! ```

pub mod framing;

#[cfg(feature = "cpal")]
pub mod cpal_device;

#[cfg(feature = "cpal")]
pub use cpal_device::{CpalDevice, CpalStream};
pub use framing::{CaptureFramer, PlaybackFramer};
