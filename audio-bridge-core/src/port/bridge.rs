use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::models::audio_models::BridgeDiagnostics;
use crate::models::config::BridgeConfig;
use crate::models::error::Result;
use crate::models::format::{Direction, PortOptions, StreamFormat};
use crate::port::adapter::AdapterPort;
use crate::port::device_port::{DevicePort, DevicePortParam};
use crate::traits::audio_device::{AudioDevice, FramePreview};
use crate::traits::media_port::MediaPort;

/// A device stream that looks like one ordinary port to the mixing side.
///
/// Data flow:
/// ```text
/// [device record cb] → DevicePort → internal.put → [capture buf]  → external.get → mixer
/// [device play cb]   ← DevicePort ← internal.get ← [playback buf] ← external.put ← mixer
/// ```
/// The device clock drives one end and the mixer clock the other; the two
/// elastic buffers absorb the jitter between them.
pub struct DeviceBridge {
    adapter: AdapterPort,
    device_port: DevicePort,
    closed: AtomicBool,
}

impl DeviceBridge {
    pub fn create(device: Arc<dyn AudioDevice>, config: &BridgeConfig) -> Result<Self> {
        Self::create_with_preview(device, config, None, None)
    }

    /// Like [`DeviceBridge::create`], with frame preview hooks on the device
    /// port.
    pub fn create_with_preview(
        device: Arc<dyn AudioDevice>,
        config: &BridgeConfig,
        on_play_frame: Option<FramePreview>,
        on_rec_frame: Option<FramePreview>,
    ) -> Result<Self> {
        config.validate()?;

        let adapter = AdapterPort::create(config.format, config.capacity_factor)?;

        let mut param = DevicePortParam::new(config.direction, config.format);
        param.stream.rec_device = config.rec_device;
        param.stream.play_device = config.play_device;
        param.options = PortOptions::NO_AUTO_START;
        param.on_play_frame = on_play_frame;
        param.on_rec_frame = on_rec_frame;

        let device_port = match DevicePort::create2(device, param) {
            Ok(port) => port,
            Err(e) => {
                log::warn!("device bridge: device port creation failed: {}", e);
                Self::discard_adapter(&adapter);
                return Err(e);
            }
        };

        let bridge = Self {
            adapter,
            device_port,
            closed: AtomicBool::new(false),
        };

        bridge
            .device_port
            .connect(bridge.adapter.internal().into_port())
            .and_then(|()| {
                if config.auto_start {
                    bridge.device_port.start()
                } else {
                    Ok(())
                }
            })
            .map_err(|e| {
                log::warn!("device bridge: start failed, unwinding: {}", e);
                let _ = bridge.close();
                e
            })?;

        log::info!(
            "device bridge {} ready ({:?}, {} Hz, {} ms)",
            bridge.adapter.id(),
            config.direction,
            config.format.clock_rate,
            config.format.ptime_msec()
        );
        Ok(bridge)
    }

    /// Mixer-facing port.
    pub fn port(&self) -> Arc<dyn MediaPort> {
        self.adapter.external().into_port()
    }

    pub fn adapter(&self) -> &AdapterPort {
        &self.adapter
    }

    pub fn device_port(&self) -> &DevicePort {
        &self.device_port
    }

    pub fn format(&self) -> StreamFormat {
        self.adapter.format()
    }

    /// Start the device stream of a bridge built without auto start.
    pub fn start(&self) -> Result<()> {
        self.device_port.start()
    }

    pub fn is_running(&self) -> bool {
        self.device_port.is_running()
    }

    /// Disconnect, stop the device stream, then destroy the adapter.
    /// Later calls are no-ops.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.device_port.disconnect();
        let stopped = self.device_port.stop();
        let destroyed = self.adapter.destroy();
        log::info!("device bridge {} closed", self.adapter.id());
        stopped.and(destroyed)
    }

    pub fn diagnostics(&self) -> BridgeDiagnostics {
        BridgeDiagnostics {
            adapter: self.adapter.stats(),
            capture_ticks: self.device_port.clock_src(Direction::Capture).timestamp(),
            playback_ticks: self.device_port.clock_src(Direction::Playback).timestamp(),
            running: self.device_port.is_running(),
        }
    }

    fn discard_adapter(adapter: &AdapterPort) {
        if let Err(e) = adapter.destroy() {
            log::error!("device bridge: failed to destroy adapter: {}", e);
        }
    }
}

impl Drop for DeviceBridge {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::error!("device bridge: close failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::virtual_device::{Clocking, VirtualDevice};
    use crate::models::error::BridgeError;
    use crate::models::frame::AudioFrame;

    fn config() -> BridgeConfig {
        BridgeConfig::new(StreamFormat::new(16000, 1, 16, 160))
    }

    #[test]
    fn close_orders_teardown_and_is_idempotent() {
        let device = Arc::new(VirtualDevice::new().with_clocking(Clocking::Manual));
        let bridge = DeviceBridge::create(device.clone(), &config()).unwrap();
        assert!(bridge.is_running());
        assert!(bridge.device_port().port().is_some());

        bridge.close().unwrap();
        assert!(bridge.device_port().port().is_none());
        assert!(!bridge.device_port().has_stream());
        assert!(bridge.adapter().is_destroyed());
        assert_eq!(device.live_stream_count(), 0);

        assert!(bridge.close().is_ok());
    }

    #[test]
    fn start_failure_unwinds() {
        let device = Arc::new(
            VirtualDevice::new()
                .with_clocking(Clocking::Manual)
                .with_failing_start(),
        );
        let result = DeviceBridge::create(device.clone(), &config());
        assert!(matches!(result, Err(BridgeError::StreamStart(_))));
        assert_eq!(device.live_stream_count(), 0);
    }

    #[test]
    fn invalid_config_is_rejected_before_opening_device() {
        let device = Arc::new(VirtualDevice::new().with_clocking(Clocking::Manual));
        let mut cfg = config();
        cfg.capacity_factor = 0;
        assert!(matches!(
            DeviceBridge::create(device.clone(), &cfg),
            Err(BridgeError::InvalidArgument(_))
        ));
        assert_eq!(device.live_stream_count(), 0);
    }

    #[test]
    fn deferred_start() {
        let device = Arc::new(VirtualDevice::new().with_clocking(Clocking::Manual));
        let mut cfg = config();
        cfg.auto_start = false;

        let bridge = DeviceBridge::create(device.clone(), &cfg).unwrap();
        assert!(!bridge.is_running());
        bridge.start().unwrap();
        assert!(bridge.is_running());

        device.pump(1);
        let diag = bridge.diagnostics();
        assert_eq!(diag.capture_ticks, 160);
        assert_eq!(diag.playback_ticks, 160);
        assert!(diag.running);
    }

    #[test]
    fn mixer_port_is_external_facade() {
        let device = Arc::new(VirtualDevice::new().with_clocking(Clocking::Manual));
        let bridge = DeviceBridge::create(device, &config()).unwrap();
        let port = bridge.port();

        assert_eq!(port.info().name, "adapter-port/external");
        assert_eq!(port.info().format, bridge.format());

        port.put_frame(&AudioFrame::empty()).unwrap();
        assert_eq!(bridge.diagnostics().adapter.playback.resets, 1);
    }
}
