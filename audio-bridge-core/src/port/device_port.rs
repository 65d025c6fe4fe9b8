use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::models::audio_models::DeviceCaps;
use crate::models::error::{BridgeError, FormatMismatch, Result};
use crate::models::format::{DeviceId, Direction, PortOptions, StreamFormat};
use crate::models::frame::AudioFrame;
use crate::processing::clock_source::ClockSource;
use crate::traits::audio_device::{
    AudioDevice, AudioStream, FrameCallback, FramePreview, StreamCallbacks, StreamParam,
};
use crate::traits::media_port::MediaPort;

/// Parameters for [`DevicePort::create2`].
#[derive(Clone)]
pub struct DevicePortParam {
    pub stream: StreamParam,
    pub options: PortOptions,
    /// Called with every frame handed to the device for playback.
    pub on_play_frame: Option<FramePreview>,
    /// Called with every frame captured from the device.
    pub on_rec_frame: Option<FramePreview>,
}

impl DevicePortParam {
    pub fn new(direction: Direction, format: StreamFormat) -> Self {
        Self {
            stream: StreamParam {
                direction,
                rec_device: DeviceId::Default,
                play_device: DeviceId::Default,
                format,
            },
            options: PortOptions::empty(),
            on_play_frame: None,
            on_rec_frame: None,
        }
    }
}

/// State touched from the device callbacks.
struct DeviceShared {
    format: StreamFormat,
    port: RwLock<Option<Arc<dyn MediaPort>>>,
    cap_clock: Mutex<ClockSource>,
    play_clock: Mutex<ClockSource>,
    on_play_frame: Option<FramePreview>,
    on_rec_frame: Option<FramePreview>,
}

impl DeviceShared {
    /// Device wants one frame to play.
    fn play_frame(&self, frame: &mut AudioFrame) -> Result<()> {
        if frame.samples.len() < self.format.frame_len() {
            return Err(BridgeError::invalid_argument(format!(
                "playback buffer holds {} samples, need {}",
                frame.samples.len(),
                self.format.frame_len()
            )));
        }
        let required_size = self.format.frame_bytes();

        frame.timestamp = self.play_clock.lock().advance();

        let port = self.port.read().clone();
        let delivered = match port {
            Some(port) => match port.get_frame(frame) {
                Ok(()) => frame.is_audio() && frame.size == required_size,
                Err(e) => {
                    log::trace!("playback source returned no frame: {}", e);
                    false
                }
            },
            None => false,
        };

        // The device needs a full frame every period regardless of upstream.
        if !delivered {
            frame.fill_silence(required_size);
        }

        if let Some(ref preview) = self.on_play_frame {
            preview(frame);
        }
        Ok(())
    }

    /// Device captured one frame.
    fn rec_frame(&self, frame: &mut AudioFrame) -> Result<()> {
        if frame.samples.is_empty() {
            return Err(BridgeError::invalid_argument("captured frame has no buffer"));
        }

        frame.timestamp = self.cap_clock.lock().advance();

        if let Some(ref preview) = self.on_rec_frame {
            preview(frame);
        }

        let port = self.port.read().clone();
        if let Some(port) = port {
            if let Err(e) = port.put_frame(frame) {
                log::debug!("capture sink rejected frame: {}", e);
            }
        }
        Ok(())
    }
}

/// Front-end for a device audio stream.
///
/// Opens a stream on an [`AudioDevice`], keeps a media clock per direction
/// and moves frames between the device callbacks and at most one connected
/// [`MediaPort`]. With no port connected, playback gets silence and captured
/// audio is discarded.
///
/// `connect`/`disconnect` may be called while the stream runs. Callers must
/// still disconnect and stop before destroying the connected port.
pub struct DevicePort {
    device: Arc<dyn AudioDevice>,
    param: StreamParam,
    options: PortOptions,
    caps: AtomicU32,
    stream: Mutex<Option<Box<dyn AudioStream>>>,
    shared: Arc<DeviceShared>,
}

impl DevicePort {
    /// Bidirectional device port.
    pub fn create(
        device: Arc<dyn AudioDevice>,
        rec_id: DeviceId,
        play_id: DeviceId,
        format: StreamFormat,
        options: PortOptions,
    ) -> Result<Self> {
        let mut param = DevicePortParam::new(Direction::CaptureAndPlayback, format);
        param.stream.rec_device = rec_id;
        param.stream.play_device = play_id;
        param.options = options;
        Self::create2(device, param)
    }

    /// Capture-only device port.
    pub fn create_rec(
        device: Arc<dyn AudioDevice>,
        dev_id: DeviceId,
        format: StreamFormat,
        options: PortOptions,
    ) -> Result<Self> {
        let mut param = DevicePortParam::new(Direction::Capture, format);
        param.stream.rec_device = dev_id;
        param.options = options;
        Self::create2(device, param)
    }

    /// Playback-only device port.
    pub fn create_player(
        device: Arc<dyn AudioDevice>,
        dev_id: DeviceId,
        format: StreamFormat,
        options: PortOptions,
    ) -> Result<Self> {
        let mut param = DevicePortParam::new(Direction::Playback, format);
        param.stream.play_device = dev_id;
        param.options = options;
        Self::create2(device, param)
    }

    /// Create from full parameters. The stream is opened immediately and
    /// started unless `NO_AUTO_START` is set.
    pub fn create2(device: Arc<dyn AudioDevice>, param: DevicePortParam) -> Result<Self> {
        let format = param.stream.format;
        format.validate()?;

        let ticks = format.samples_per_channel();
        let ptime_usec = format.ptime_usec();

        let port = Self {
            device,
            param: param.stream,
            options: param.options,
            caps: AtomicU32::new(0),
            stream: Mutex::new(None),
            shared: Arc::new(DeviceShared {
                format,
                port: RwLock::new(None),
                cap_clock: Mutex::new(ClockSource::new(format.clock_rate, ticks, ptime_usec)),
                play_clock: Mutex::new(ClockSource::new(format.clock_rate, ticks, ptime_usec)),
                on_play_frame: param.on_play_frame,
                on_rec_frame: param.on_rec_frame,
            }),
        };

        {
            let mut guard = port.stream.lock();
            *guard = Some(port.open_stream()?);
            if !port.options.contains(PortOptions::NO_AUTO_START) {
                port.start_stream(&mut guard)?;
            }
        }

        Ok(port)
    }

    /// Start the device stream, reopening it if it was stopped.
    /// Starting a running port is a no-op.
    pub fn start(&self) -> Result<()> {
        let mut guard = self.stream.lock();
        if guard.is_none() {
            *guard = Some(self.open_stream()?);
        }
        self.start_stream(&mut guard)
    }

    /// Stop and destroy the device stream. Later calls are no-ops.
    pub fn stop(&self) -> Result<()> {
        let stream = self.stream.lock().take();
        if let Some(mut stream) = stream {
            if let Err(e) = stream.stop() {
                log::warn!("device stream did not stop cleanly: {}", e);
            }
            drop(stream);
            log::info!("device stream stopped ({:?})", self.param.direction);
        }
        Ok(())
    }

    /// Connect the port frames are exchanged with.
    ///
    /// The port's format must match this device port's format exactly; on
    /// mismatch the current connection is left as it was.
    pub fn connect(&self, port: Arc<dyn MediaPort>) -> Result<()> {
        let ours = self.shared.format;
        let theirs = port.info().format;

        if theirs.clock_rate != ours.clock_rate {
            return Err(FormatMismatch::ClockRate {
                expected: ours.clock_rate,
                actual: theirs.clock_rate,
            }
            .into());
        }
        if theirs.samples_per_frame != ours.samples_per_frame {
            return Err(FormatMismatch::SamplesPerFrame {
                expected: ours.samples_per_frame,
                actual: theirs.samples_per_frame,
            }
            .into());
        }
        if theirs.channel_count != ours.channel_count {
            return Err(FormatMismatch::ChannelCount {
                expected: ours.channel_count,
                actual: theirs.channel_count,
            }
            .into());
        }
        if theirs.bits_per_sample != ours.bits_per_sample {
            return Err(FormatMismatch::BitsPerSample {
                expected: ours.bits_per_sample,
                actual: theirs.bits_per_sample,
            }
            .into());
        }

        log::debug!("device port connected to {}", port.info().name);
        *self.shared.port.write() = Some(port);
        Ok(())
    }

    pub fn disconnect(&self) {
        if self.shared.port.write().take().is_some() {
            log::debug!("device port disconnected");
        }
    }

    /// The connected port, if any.
    pub fn port(&self) -> Option<Arc<dyn MediaPort>> {
        self.shared.port.read().clone()
    }

    pub fn format(&self) -> StreamFormat {
        self.shared.format
    }

    pub fn direction(&self) -> Direction {
        self.param.direction
    }

    pub fn options(&self) -> PortOptions {
        self.options
    }

    /// Capability bits of the capture device, empty for playback-only ports.
    pub fn device_caps(&self) -> DeviceCaps {
        DeviceCaps::from_bits_truncate(self.caps.load(Ordering::Relaxed))
    }

    /// Run `f` on the device stream while holding the stream slot.
    /// Returns `None` when the port has no stream.
    pub fn with_stream<R>(&self, f: impl FnOnce(&mut dyn AudioStream) -> R) -> Option<R> {
        let mut guard = self.stream.lock();
        guard.as_mut().map(|stream| f(&mut **stream))
    }

    pub fn has_stream(&self) -> bool {
        self.stream.lock().is_some()
    }

    pub fn is_running(&self) -> bool {
        self.stream
            .lock()
            .as_ref()
            .map(|s| s.is_running())
            .unwrap_or(false)
    }

    /// Snapshot of the media clock for `direction`. Anything but
    /// `Direction::Capture` selects the playback clock.
    pub fn clock_src(&self, direction: Direction) -> ClockSource {
        match direction {
            Direction::Capture => self.shared.cap_clock.lock().clone(),
            _ => self.shared.play_clock.lock().clone(),
        }
    }

    fn open_stream(&self) -> Result<Box<dyn AudioStream>> {
        let direction = self.param.direction;

        if direction.has_capture() {
            let info = self
                .device
                .resolve_capture(self.param.rec_device)
                .and_then(|index| self.device.device_info(index))
                .map_err(|e| match e {
                    BridgeError::DeviceUnavailable(_) => e,
                    other => BridgeError::device_unavailable(other.to_string()),
                })?;
            log::debug!("capture device {:?} caps: {:?}", info.name, info.caps);
            self.caps.store(info.caps.bits(), Ordering::Relaxed);
        } else {
            self.caps.store(0, Ordering::Relaxed);
        }

        let record: Option<FrameCallback> = direction.has_capture().then(|| {
            let shared = Arc::clone(&self.shared);
            Arc::new(move |frame: &mut AudioFrame| shared.rec_frame(frame)) as FrameCallback
        });
        let playback: Option<FrameCallback> = direction.has_playback().then(|| {
            let shared = Arc::clone(&self.shared);
            Arc::new(move |frame: &mut AudioFrame| shared.play_frame(frame)) as FrameCallback
        });

        self.device
            .create_stream(&self.param, StreamCallbacks { record, playback })
    }

    /// Start the stream in `slot`. On failure the stream is destroyed so the
    /// port never keeps a half-open stream.
    fn start_stream(&self, slot: &mut Option<Box<dyn AudioStream>>) -> Result<()> {
        let Some(stream) = slot.as_mut() else {
            return Err(BridgeError::stream_start("no stream to start"));
        };
        if stream.is_running() {
            return Ok(());
        }

        if let Err(e) = stream.start() {
            log::warn!("device stream failed to start, tearing it down: {}", e);
            *slot = None;
            return Err(match e {
                BridgeError::StreamStart(_) => e,
                other => BridgeError::stream_start(other.to_string()),
            });
        }

        let format = self.shared.format;
        log::info!(
            "device stream started ({:?}, {} Hz, {} ch, {} ms)",
            self.param.direction,
            format.clock_rate,
            format.channel_count,
            format.ptime_msec()
        );
        Ok(())
    }
}

impl Drop for DevicePort {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
