//! Software-clocked audio device.
//!
//! `VirtualDevice` implements [`AudioDevice`] without hardware. Capture
//! frames come from an optional sample source (silence by default) and
//! played frames are kept in a bounded history. Streams either run on a
//! dedicated clock thread (`Clocking::Realtime`) or advance only when the
//! owner calls [`VirtualDevice::pump`] (`Clocking::Manual`).

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::models::audio_models::{DeviceCaps, DeviceInfo};
use crate::models::error::{BridgeError, Result};
use crate::models::frame::{AudioFrame, FrameType};
use crate::traits::audio_device::{AudioDevice, AudioStream, StreamCallbacks, StreamParam};

/// Played frames kept for inspection (10 s of 20 ms frames).
const PLAYED_HISTORY: usize = 500;

/// Fills one captured frame.
pub type CaptureSource = Box<dyn FnMut(&mut [i16]) + Send + 'static>;

/// How virtual streams are clocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clocking {
    /// One thread per stream, ticking once per frame period.
    Realtime,
    /// Ticks only on [`VirtualDevice::pump`].
    Manual,
}

struct VirtualShared {
    streams: Mutex<Vec<Weak<StreamCore>>>,
    capture_source: Mutex<Option<CaptureSource>>,
    played: Mutex<VecDeque<AudioFrame>>,
}

struct StreamCore {
    param: StreamParam,
    callbacks: StreamCallbacks,
    running: AtomicBool,
}

impl StreamCore {
    /// Run one period: capture first, then playback.
    fn tick(&self, shared: &VirtualShared) {
        let format = self.param.format;
        let len = format.frame_len();

        if self.param.direction.has_capture() {
            if let Some(ref record) = self.callbacks.record {
                let mut frame = AudioFrame::with_len(len);
                if let Some(source) = shared.capture_source.lock().as_mut() {
                    source(&mut frame.samples);
                }
                frame.frame_type = FrameType::Audio;
                frame.size = format.frame_bytes();
                if let Err(e) = record(&mut frame) {
                    log::debug!("virtual record callback failed: {}", e);
                }
            }
        }

        if self.param.direction.has_playback() {
            if let Some(ref playback) = self.callbacks.playback {
                let mut frame = AudioFrame::with_len(len);
                frame.size = format.frame_bytes();
                match playback(&mut frame) {
                    Ok(()) => {
                        let mut played = shared.played.lock();
                        if played.len() == PLAYED_HISTORY {
                            played.pop_front();
                        }
                        played.push_back(frame);
                    }
                    Err(e) => log::debug!("virtual playback callback failed: {}", e),
                }
            }
        }
    }
}

/// Audio device driven by a software clock.
pub struct VirtualDevice {
    devices: Vec<DeviceInfo>,
    unavailable: HashSet<usize>,
    clocking: Clocking,
    fail_start: bool,
    shared: Arc<VirtualShared>,
}

impl VirtualDevice {
    /// One full-duplex device accepting any clock rate, real-time clocked.
    pub fn new() -> Self {
        Self::with_devices(vec![Self::default_info()])
    }

    pub fn with_devices(devices: Vec<DeviceInfo>) -> Self {
        Self {
            devices,
            unavailable: HashSet::new(),
            clocking: Clocking::Realtime,
            fail_start: false,
            shared: Arc::new(VirtualShared {
                streams: Mutex::new(Vec::new()),
                capture_source: Mutex::new(None),
                played: Mutex::new(VecDeque::new()),
            }),
        }
    }

    pub fn default_info() -> DeviceInfo {
        DeviceInfo {
            name: "Virtual Audio Device".into(),
            driver: "virtual".into(),
            input_count: 2,
            output_count: 2,
            default_clock_rate: 16000,
            clock_rates: Vec::new(),
            caps: DeviceCaps::empty(),
        }
    }

    pub fn with_clocking(mut self, clocking: Clocking) -> Self {
        self.clocking = clocking;
        self
    }

    /// Make `device_info(index)` fail, as for a device that vanished.
    pub fn with_unavailable_info(mut self, index: usize) -> Self {
        self.unavailable.insert(index);
        self
    }

    /// Make every stream refuse to start.
    pub fn with_failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    /// Source for captured samples. Without one, capture yields silence.
    pub fn set_capture_source<F>(&self, source: F)
    where
        F: FnMut(&mut [i16]) + Send + 'static,
    {
        *self.shared.capture_source.lock() = Some(Box::new(source));
    }

    /// Run `periods` clock periods on every running stream, on this thread.
    pub fn pump(&self, periods: usize) {
        for _ in 0..periods {
            let running: Vec<Arc<StreamCore>> = self
                .shared
                .streams
                .lock()
                .iter()
                .filter_map(Weak::upgrade)
                .filter(|core| core.running.load(Ordering::SeqCst))
                .collect();
            for core in running {
                core.tick(&self.shared);
            }
        }
    }

    /// Drain the frames played so far, oldest first.
    pub fn take_played(&self) -> Vec<AudioFrame> {
        self.shared.played.lock().drain(..).collect()
    }

    /// Streams created and not yet destroyed.
    pub fn live_stream_count(&self) -> usize {
        let mut streams = self.shared.streams.lock();
        streams.retain(|s| s.strong_count() > 0);
        streams.len()
    }

    fn check_format(&self, param: &StreamParam) -> Result<()> {
        param
            .format
            .validate()
            .map_err(|e| BridgeError::stream_create(e.to_string()))?;

        let mut checks = Vec::new();
        if param.direction.has_capture() {
            checks.push((self.resolve_capture(param.rec_device)?, true));
        }
        if param.direction.has_playback() {
            checks.push((self.resolve_playback(param.play_device)?, false));
        }

        for (index, capture) in checks {
            let info = &self.devices[index];
            if !info.supports_clock_rate(param.format.clock_rate) {
                return Err(BridgeError::stream_create(format!(
                    "{} does not support {} Hz",
                    info.name, param.format.clock_rate
                )));
            }
            let max_channels = if capture { info.input_count } else { info.output_count };
            if param.format.channel_count > max_channels {
                return Err(BridgeError::stream_create(format!(
                    "{} has {} {} channels, {} requested",
                    info.name,
                    max_channels,
                    if capture { "input" } else { "output" },
                    param.format.channel_count
                )));
            }
        }
        Ok(())
    }
}

impl Default for VirtualDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioDevice for VirtualDevice {
    fn device_count(&self) -> usize {
        self.devices.len()
    }

    fn device_info(&self, index: usize) -> Result<DeviceInfo> {
        if self.unavailable.contains(&index) {
            return Err(BridgeError::device_unavailable(format!(
                "device {} did not report its capabilities",
                index
            )));
        }
        self.devices
            .get(index)
            .cloned()
            .ok_or_else(|| BridgeError::device_unavailable(format!("no device at index {}", index)))
    }

    fn default_capture_device(&self) -> Result<usize> {
        self.devices
            .iter()
            .position(|d| d.input_count > 0)
            .ok_or_else(|| BridgeError::device_unavailable("no capture device"))
    }

    fn default_playback_device(&self) -> Result<usize> {
        self.devices
            .iter()
            .position(|d| d.output_count > 0)
            .ok_or_else(|| BridgeError::device_unavailable("no playback device"))
    }

    fn create_stream(
        &self,
        param: &StreamParam,
        callbacks: StreamCallbacks,
    ) -> Result<Box<dyn AudioStream>> {
        self.check_format(param)?;

        let core = Arc::new(StreamCore {
            param: param.clone(),
            callbacks,
            running: AtomicBool::new(false),
        });
        self.shared.streams.lock().push(Arc::downgrade(&core));

        Ok(Box::new(VirtualStream {
            core,
            shared: Arc::clone(&self.shared),
            clocking: self.clocking,
            fail_start: self.fail_start,
            clock_handle: None,
        }))
    }
}

/// Stream opened on a [`VirtualDevice`].
pub struct VirtualStream {
    core: Arc<StreamCore>,
    shared: Arc<VirtualShared>,
    clocking: Clocking,
    fail_start: bool,
    clock_handle: Option<thread::JoinHandle<()>>,
}

impl AudioStream for VirtualStream {
    fn start(&mut self) -> Result<()> {
        if self.fail_start {
            return Err(BridgeError::stream_start("virtual device refused to start"));
        }
        if self.core.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if self.clocking == Clocking::Manual {
            return Ok(());
        }

        let core = Arc::clone(&self.core);
        let shared = Arc::clone(&self.shared);
        let period = Duration::from_micros(self.core.param.format.ptime_usec());

        let handle = thread::Builder::new()
            .name("virtual-audio-clock".into())
            .spawn(move || {
                while core.running.load(Ordering::SeqCst) {
                    thread::sleep(period);
                    if !core.running.load(Ordering::SeqCst) {
                        break;
                    }
                    core.tick(&shared);
                }
            })
            .map_err(|e| {
                self.core.running.store(false, Ordering::SeqCst);
                BridgeError::stream_start(format!("failed to spawn clock thread: {}", e))
            })?;

        self.clock_handle = Some(handle);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.core.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.clock_handle.take() {
            if handle.join().is_err() {
                log::error!("virtual clock thread panicked");
            }
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.core.running.load(Ordering::SeqCst)
    }
}

impl Drop for VirtualStream {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::format::{DeviceId, Direction, StreamFormat};
    use crate::traits::audio_device::FrameCallback;
    use std::sync::atomic::AtomicUsize;

    fn param(direction: Direction) -> StreamParam {
        StreamParam {
            direction,
            rec_device: DeviceId::Default,
            play_device: DeviceId::Default,
            format: StreamFormat::new(16000, 1, 16, 160),
        }
    }

    fn counting(counter: &Arc<AtomicUsize>) -> FrameCallback {
        let counter = Arc::clone(counter);
        Arc::new(move |_frame: &mut AudioFrame| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn manual_stream_ticks_only_when_pumped_and_running() {
        let device = VirtualDevice::new().with_clocking(Clocking::Manual);
        let count = Arc::new(AtomicUsize::new(0));
        let mut stream = device
            .create_stream(
                &param(Direction::Capture),
                StreamCallbacks {
                    record: Some(counting(&count)),
                    playback: None,
                },
            )
            .unwrap();

        device.pump(3);
        assert_eq!(count.load(Ordering::SeqCst), 0);

        stream.start().unwrap();
        device.pump(3);
        assert_eq!(count.load(Ordering::SeqCst), 3);

        stream.stop().unwrap();
        device.pump(3);
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn realtime_stream_runs_on_clock_thread() {
        let device = VirtualDevice::new();
        let count = Arc::new(AtomicUsize::new(0));
        let mut stream = device
            .create_stream(
                &param(Direction::Playback),
                StreamCallbacks {
                    record: None,
                    playback: Some(counting(&count)),
                },
            )
            .unwrap();

        stream.start().unwrap();
        thread::sleep(Duration::from_millis(100));
        stream.stop().unwrap();

        let ticks = count.load(Ordering::SeqCst);
        assert!(ticks > 0);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(count.load(Ordering::SeqCst), ticks);
    }

    #[test]
    fn dropped_streams_are_not_live() {
        let device = VirtualDevice::new().with_clocking(Clocking::Manual);
        let stream = device
            .create_stream(&param(Direction::CaptureAndPlayback), StreamCallbacks::default())
            .unwrap();
        assert_eq!(device.live_stream_count(), 1);
        drop(stream);
        assert_eq!(device.live_stream_count(), 0);
    }

    #[test]
    fn too_many_channels_is_stream_create_error() {
        let mut info = VirtualDevice::default_info();
        info.input_count = 1;
        let device = VirtualDevice::with_devices(vec![info]);
        let mut p = param(Direction::Capture);
        p.format = StreamFormat::new(16000, 2, 16, 320);

        assert!(matches!(
            device.create_stream(&p, StreamCallbacks::default()),
            Err(BridgeError::StreamCreate(_))
        ));
    }

    #[test]
    fn missing_direction_has_no_default_device() {
        let mut info = VirtualDevice::default_info();
        info.output_count = 0;
        let device = VirtualDevice::with_devices(vec![info]);

        assert!(device.default_capture_device().is_ok());
        assert!(matches!(
            device.create_stream(&param(Direction::Playback), StreamCallbacks::default()),
            Err(BridgeError::DeviceUnavailable(_))
        ));
    }

    #[test]
    fn played_history_is_bounded() {
        let device = VirtualDevice::new().with_clocking(Clocking::Manual);
        let mut stream = device
            .create_stream(
                &param(Direction::Playback),
                StreamCallbacks {
                    record: None,
                    playback: Some(Arc::new(|_frame: &mut AudioFrame| Ok(()))),
                },
            )
            .unwrap();
        stream.start().unwrap();

        device.pump(PLAYED_HISTORY + 10);
        assert_eq!(device.take_played().len(), PLAYED_HISTORY);
        assert!(device.take_played().is_empty());
    }
}
