//! cpal device backend.
//!
//! Enumerates the devices of one cpal host and opens streams on them in
//! i16 when the device offers it, else in f32 converted at the callback.
//! cpal streams are not `Send` on every platform, so each
//! [`CpalStream`] owns a worker thread that builds, plays, pauses and
//! finally drops the underlying cpal streams. The bridge talks to it over
//! a command channel.

use std::sync::mpsc;
use std::thread;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    BufferSize, HostId, Sample, SampleFormat, SampleRate, StreamConfig,
    SupportedStreamConfigRange,
};

use audio_bridge_core::{
    AudioDevice, AudioStream, BridgeError, DeviceCaps, DeviceInfo, Result, StreamCallbacks,
    StreamFormat, StreamParam,
};

use crate::framing::{CaptureFramer, PlaybackFramer};

/// Rates reported in `DeviceInfo::clock_rates` when a device accepts them.
const PROBE_RATES: [u32; 7] = [8000, 11025, 16000, 22050, 32000, 44100, 48000];

/// Sample formats a stream can be built in, most preferred first.
const STREAM_SAMPLE_FORMATS: [SampleFormat; 2] = [SampleFormat::I16, SampleFormat::F32];

/// A device as seen at enumeration time.
struct DeviceEntry {
    info: DeviceInfo,
    inputs: Vec<SupportedStreamConfigRange>,
    outputs: Vec<SupportedStreamConfigRange>,
}

/// Device index and the sample format its stream is built in.
#[derive(Debug, Clone, Copy)]
struct Endpoint {
    index: usize,
    sample_format: SampleFormat,
}

/// Audio device subsystem backed by a cpal host.
pub struct CpalDevice {
    host_id: HostId,
    entries: Vec<DeviceEntry>,
    default_input: Option<usize>,
    default_output: Option<usize>,
}

impl CpalDevice {
    /// Enumerate the platform's default host.
    pub fn new() -> Result<Self> {
        Self::with_host(cpal::default_host().id())
    }

    pub fn with_host(host_id: HostId) -> Result<Self> {
        let host = open_host(host_id)?;
        let devices: Vec<cpal::Device> = host
            .devices()
            .map_err(|e| BridgeError::device_unavailable(format!("cannot list devices: {}", e)))?
            .collect();

        let entries: Vec<DeviceEntry> = devices.iter().map(|d| describe(host_id, d)).collect();

        let position_of = |device: Option<cpal::Device>| {
            let name = device.and_then(|d| d.name().ok())?;
            entries.iter().position(|e| e.info.name == name)
        };
        let default_input = position_of(host.default_input_device())
            .or_else(|| entries.iter().position(|e| e.info.input_count > 0));
        let default_output = position_of(host.default_output_device())
            .or_else(|| entries.iter().position(|e| e.info.output_count > 0));

        log::info!(
            "{} host: {} devices (default input {:?}, default output {:?})",
            host_id.name(),
            entries.len(),
            default_input,
            default_output
        );
        for (index, info) in entries.iter().map(|e| &e.info).enumerate() {
            log::debug!(
                "  [{}] {} in={} out={} rate={}",
                index,
                info.name,
                info.input_count,
                info.output_count,
                info.default_clock_rate
            );
        }

        Ok(Self {
            host_id,
            entries,
            default_input,
            default_output,
        })
    }

    pub fn host_id(&self) -> HostId {
        self.host_id
    }

    /// Check `format` against the device and pick the stream sample format.
    fn check_format(
        &self,
        index: usize,
        capture: bool,
        format: &StreamFormat,
    ) -> Result<Endpoint> {
        let entry = self.entries.get(index).ok_or_else(|| {
            BridgeError::device_unavailable(format!("no device at index {}", index))
        })?;
        let info = &entry.info;
        if !info.supports_clock_rate(format.clock_rate) {
            return Err(BridgeError::stream_create(format!(
                "{} does not support {} Hz",
                info.name, format.clock_rate
            )));
        }
        let max_channels = if capture { info.input_count } else { info.output_count };
        if format.channel_count > max_channels {
            return Err(BridgeError::stream_create(format!(
                "{} has {} {} channels, {} requested",
                info.name,
                max_channels,
                if capture { "input" } else { "output" },
                format.channel_count
            )));
        }

        let ranges = if capture { &entry.inputs } else { &entry.outputs };
        let sample_format = select_sample_format(ranges, format).ok_or_else(|| {
            BridgeError::stream_create(format!(
                "{} offers no i16 or f32 {} config at {} Hz with {} channels",
                info.name,
                if capture { "input" } else { "output" },
                format.clock_rate,
                format.channel_count
            ))
        })?;
        log::debug!(
            "{} stream on {} uses {:?}",
            if capture { "input" } else { "output" },
            info.name,
            sample_format
        );
        Ok(Endpoint {
            index,
            sample_format,
        })
    }
}

impl AudioDevice for CpalDevice {
    fn device_count(&self) -> usize {
        self.entries.len()
    }

    fn device_info(&self, index: usize) -> Result<DeviceInfo> {
        self.entries
            .get(index)
            .map(|e| e.info.clone())
            .ok_or_else(|| BridgeError::device_unavailable(format!("no device at index {}", index)))
    }

    fn default_capture_device(&self) -> Result<usize> {
        self.default_input
            .ok_or_else(|| BridgeError::device_unavailable("no capture device"))
    }

    fn default_playback_device(&self) -> Result<usize> {
        self.default_output
            .ok_or_else(|| BridgeError::device_unavailable("no playback device"))
    }

    fn create_stream(
        &self,
        param: &StreamParam,
        callbacks: StreamCallbacks,
    ) -> Result<Box<dyn AudioStream>> {
        param
            .format
            .validate()
            .map_err(|e| BridgeError::stream_create(e.to_string()))?;

        let rec = if param.direction.has_capture() {
            let index = self.resolve_capture(param.rec_device)?;
            Some(self.check_format(index, true, &param.format)?)
        } else {
            None
        };
        let play = if param.direction.has_playback() {
            let index = self.resolve_playback(param.play_device)?;
            Some(self.check_format(index, false, &param.format)?)
        } else {
            None
        };

        let (command_tx, command_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();
        let host_id = self.host_id;
        let format = param.format;

        let worker = thread::Builder::new()
            .name("cpal-audio-stream".into())
            .spawn(move || {
                match build_streams(host_id, format, rec, play, callbacks) {
                    Ok(streams) => {
                        let _ = ready_tx.send(Ok(()));
                        run_streams(streams, command_rx);
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
            })
            .map_err(|e| {
                BridgeError::stream_create(format!("failed to spawn stream thread: {}", e))
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                log::info!(
                    "cpal stream opened ({:?}, {} Hz, {} ch, {} samples/frame)",
                    param.direction,
                    format.clock_rate,
                    format.channel_count,
                    format.samples_per_frame
                );
                Ok(Box::new(CpalStream {
                    commands: command_tx,
                    running: false,
                    worker: Some(worker),
                }))
            }
            Ok(Err(e)) => {
                let _ = worker.join();
                Err(e)
            }
            Err(_) => {
                let _ = worker.join();
                Err(BridgeError::stream_create("stream thread exited during setup"))
            }
        }
    }
}

enum Command {
    Play(mpsc::Sender<Result<()>>),
    Pause(mpsc::Sender<()>),
}

/// Stream opened on a [`CpalDevice`].
pub struct CpalStream {
    commands: mpsc::Sender<Command>,
    running: bool,
    worker: Option<thread::JoinHandle<()>>,
}

impl AudioStream for CpalStream {
    fn start(&mut self) -> Result<()> {
        if self.running {
            return Ok(());
        }
        let (reply_tx, reply_rx) = mpsc::channel();
        self.commands
            .send(Command::Play(reply_tx))
            .map_err(|_| BridgeError::stream_start("stream thread is gone"))?;
        reply_rx
            .recv()
            .map_err(|_| BridgeError::stream_start("stream thread is gone"))??;
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if !self.running {
            return Ok(());
        }
        self.running = false;
        let (reply_tx, reply_rx) = mpsc::channel();
        if self.commands.send(Command::Pause(reply_tx)).is_ok() {
            // no callbacks after the reply
            let _ = reply_rx.recv();
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        let _ = self.stop();
        // Closing the channel ends the worker loop, which drops the streams.
        let (closed, _) = mpsc::channel();
        self.commands = closed;
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("cpal stream thread panicked");
            }
        }
    }
}

fn open_host(host_id: HostId) -> Result<cpal::Host> {
    cpal::host_from_id(host_id).map_err(|e| {
        BridgeError::device_unavailable(format!("{} host unavailable: {}", host_id.name(), e))
    })
}

fn nth_device(host: &cpal::Host, index: usize) -> Result<cpal::Device> {
    host.devices()
        .map_err(|e| BridgeError::device_unavailable(format!("cannot list devices: {}", e)))?
        .nth(index)
        .ok_or_else(|| BridgeError::device_unavailable(format!("no device at index {}", index)))
}

fn describe(host_id: HostId, device: &cpal::Device) -> DeviceEntry {
    let name = device.name().unwrap_or_else(|_| "Unknown".to_string());

    // Only ranges a stream can actually be built in count.
    let usable = |range: &SupportedStreamConfigRange| {
        STREAM_SAMPLE_FORMATS.contains(&range.sample_format())
    };
    let inputs: Vec<SupportedStreamConfigRange> = device
        .supported_input_configs()
        .map(|configs| configs.filter(usable).collect())
        .unwrap_or_default();
    let outputs: Vec<SupportedStreamConfigRange> = device
        .supported_output_configs()
        .map(|configs| configs.filter(usable).collect())
        .unwrap_or_default();

    let max_channels = |ranges: &[SupportedStreamConfigRange]| {
        ranges.iter().map(|r| r.channels()).max().unwrap_or(0)
    };

    let clock_rates: Vec<u32> = PROBE_RATES
        .iter()
        .copied()
        .filter(|&rate| inputs.iter().chain(outputs.iter()).any(|r| covers_rate(r, rate)))
        .collect();

    let default_clock_rate = device
        .default_input_config()
        .or_else(|_| device.default_output_config())
        .map(|c| c.sample_rate().0)
        .unwrap_or(0);

    let info = DeviceInfo {
        name,
        driver: host_id.name().to_string(),
        input_count: max_channels(&inputs),
        output_count: max_channels(&outputs),
        default_clock_rate,
        clock_rates,
        caps: DeviceCaps::empty(),
    };
    DeviceEntry {
        info,
        inputs,
        outputs,
    }
}

fn covers_rate(range: &SupportedStreamConfigRange, rate: u32) -> bool {
    range.min_sample_rate().0 <= rate && rate <= range.max_sample_rate().0
}

/// Most preferred sample format among `ranges` that fit `format` exactly.
fn select_sample_format(
    ranges: &[SupportedStreamConfigRange],
    format: &StreamFormat,
) -> Option<SampleFormat> {
    let fits = |range: &SupportedStreamConfigRange, sample_format: SampleFormat| {
        range.sample_format() == sample_format
            && range.channels() == format.channel_count
            && covers_rate(range, format.clock_rate)
    };
    STREAM_SAMPLE_FORMATS
        .iter()
        .copied()
        .find(|&sf| ranges.iter().any(|r| fits(r, sf)))
}

/// Host buffer size is left to the driver; the framers re-block to frames.
fn stream_config(format: &StreamFormat) -> StreamConfig {
    StreamConfig {
        channels: format.channel_count,
        sample_rate: SampleRate(format.clock_rate),
        buffer_size: BufferSize::Default,
    }
}

fn build_streams(
    host_id: HostId,
    format: StreamFormat,
    rec: Option<Endpoint>,
    play: Option<Endpoint>,
    callbacks: StreamCallbacks,
) -> Result<Vec<cpal::Stream>> {
    let host = open_host(host_id)?;
    let config = stream_config(&format);
    let mut streams = Vec::with_capacity(2);

    if let (Some(endpoint), Some(record)) = (rec, callbacks.record) {
        let device = nth_device(&host, endpoint.index)?;
        let mut framer = CaptureFramer::new(format, record);
        let on_error = |err| log::error!("cpal input stream error: {}", err);
        let stream = match endpoint.sample_format {
            SampleFormat::I16 => device.build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    framer.push(data);
                },
                on_error,
                None,
            ),
            SampleFormat::F32 => device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    framer.push_converted(data, |s: f32| s.to_sample::<i16>());
                },
                on_error,
                None,
            ),
            other => return Err(unsupported_sample_format(other)),
        }
        .map_err(|e| BridgeError::stream_create(format!("input stream: {}", e)))?;
        streams.push(stream);
    }

    if let (Some(endpoint), Some(playback)) = (play, callbacks.playback) {
        let device = nth_device(&host, endpoint.index)?;
        let mut framer = PlaybackFramer::new(format, playback);
        let on_error = |err| log::error!("cpal output stream error: {}", err);
        let stream = match endpoint.sample_format {
            SampleFormat::I16 => device.build_output_stream(
                &config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    framer.fill(data);
                },
                on_error,
                None,
            ),
            SampleFormat::F32 => device.build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    framer.fill_converted(data, |s: i16| s.to_sample::<f32>());
                },
                on_error,
                None,
            ),
            other => return Err(unsupported_sample_format(other)),
        }
        .map_err(|e| BridgeError::stream_create(format!("output stream: {}", e)))?;
        streams.push(stream);
    }

    // Some hosts start streams as soon as they are built.
    for stream in &streams {
        if let Err(e) = stream.pause() {
            log::debug!("initial pause not supported: {}", e);
        }
    }
    Ok(streams)
}

fn unsupported_sample_format(sample_format: SampleFormat) -> BridgeError {
    BridgeError::stream_create(format!("cannot build a {:?} stream", sample_format))
}

fn run_streams(streams: Vec<cpal::Stream>, commands: mpsc::Receiver<Command>) {
    for command in commands {
        match command {
            Command::Play(reply) => {
                let result = streams.iter().try_for_each(|s| {
                    s.play()
                        .map_err(|e| BridgeError::stream_start(e.to_string()))
                });
                let _ = reply.send(result);
            }
            Command::Pause(reply) => {
                for stream in &streams {
                    if let Err(e) = stream.pause() {
                        log::warn!("cpal stream pause failed: {}", e);
                    }
                }
                let _ = reply.send(());
            }
        }
    }
    log::debug!("cpal stream thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpal::SupportedBufferSize;

    fn range(
        channels: u16,
        min: u32,
        max: u32,
        sample_format: SampleFormat,
    ) -> SupportedStreamConfigRange {
        SupportedStreamConfigRange::new(
            channels,
            SampleRate(min),
            SampleRate(max),
            SupportedBufferSize::Unknown,
            sample_format,
        )
    }

    fn mono_16k() -> StreamFormat {
        StreamFormat::new(16000, 1, 16, 320)
    }

    #[test]
    fn prefers_i16_when_offered() {
        let ranges = [
            range(1, 8000, 48000, SampleFormat::F32),
            range(1, 8000, 48000, SampleFormat::I16),
        ];
        assert_eq!(select_sample_format(&ranges, &mono_16k()), Some(SampleFormat::I16));
    }

    #[test]
    fn float_only_device_uses_f32() {
        let ranges = [range(1, 8000, 48000, SampleFormat::F32)];
        assert_eq!(select_sample_format(&ranges, &mono_16k()), Some(SampleFormat::F32));
    }

    #[test]
    fn i16_range_must_fit_rate_and_channels() {
        let ranges = [
            range(2, 8000, 48000, SampleFormat::I16),
            range(1, 44100, 48000, SampleFormat::I16),
            range(1, 16000, 16000, SampleFormat::F32),
        ];
        assert_eq!(select_sample_format(&ranges, &mono_16k()), Some(SampleFormat::F32));
    }

    #[test]
    fn no_usable_format_is_none() {
        let ranges = [range(1, 8000, 48000, SampleFormat::U8)];
        assert_eq!(select_sample_format(&ranges, &mono_16k()), None);
        assert_eq!(select_sample_format(&[], &mono_16k()), None);
    }

    #[test]
    fn float_samples_convert_to_full_scale_i16() {
        assert_eq!(0.0f32.to_sample::<i16>(), 0);
        assert_eq!(1.0f32.to_sample::<i16>(), i16::MAX);
        assert_eq!((-1.0f32).to_sample::<i16>(), i16::MIN);
    }
}
