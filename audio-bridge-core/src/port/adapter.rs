use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use uuid::Uuid;

use crate::models::audio_models::{AdapterStats, ResetState};
use crate::models::config::DEFAULT_CAPACITY_FACTOR;
use crate::models::error::{BridgeError, Result};
use crate::models::format::{PortInfo, StreamFormat};
use crate::models::frame::{AudioFrame, FrameType};
use crate::processing::elastic_buffer::ElasticBuffer;
use crate::traits::media_port::MediaPort;

/// Which of the two views of an [`AdapterPort`] a handle is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Facade {
    /// Mixer side: reads the capture buffer, writes the playback buffer.
    External,
    /// Device side: reads the playback buffer, writes the capture buffer.
    Internal,
}

/// One direction of the adapter: its buffer and its reset flag.
struct Channel {
    buffer: ElasticBuffer,
    drained: AtomicBool,
}

impl Channel {
    fn new(buffer: ElasticBuffer) -> Self {
        Self {
            buffer,
            drained: AtomicBool::new(false),
        }
    }

    fn reset_state(&self) -> ResetState {
        if self.drained.load(Ordering::Acquire) {
            ResetState::Drained
        } else {
            ResetState::Fresh
        }
    }
}

struct AdapterShared {
    id: Uuid,
    format: StreamFormat,
    capture: Channel,
    playback: Channel,
    external_info: PortInfo,
    internal_info: PortInfo,
    destroyed: AtomicBool,
}

impl AdapterShared {
    fn read_channel(&self, facade: Facade) -> &Channel {
        match facade {
            Facade::External => &self.capture,
            Facade::Internal => &self.playback,
        }
    }

    fn write_channel(&self, facade: Facade) -> &Channel {
        match facade {
            Facade::External => &self.playback,
            Facade::Internal => &self.capture,
        }
    }

    fn destroy(&self) -> Result<()> {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let capture = self.capture.buffer.destroy();
        if let Err(ref e) = capture {
            log::error!("[adapter {}] failed to destroy capture buffer: {}", self.id, e);
        }
        let playback = self.playback.buffer.destroy();
        if let Err(ref e) = playback {
            log::error!("[adapter {}] failed to destroy playback buffer: {}", self.id, e);
        }

        log::debug!("[adapter {}] destroyed", self.id);
        capture.and(playback)
    }
}

/// Two-faced port joining a device call site and a mixer call site.
///
/// Owns one elastic buffer per direction and hands out two [`MediaPort`]
/// facades wired to opposite ends:
/// ```text
/// internal.put_frame → [capture buffer]  → external.get_frame
/// internal.get_frame ← [playback buffer] ← external.put_frame
/// ```
/// A `put_frame` without data resets the written buffer once per silence
/// episode, so a producer that goes quiet does not leave stale audio behind
/// for the consumer. The reset flags belong to this instance.
#[derive(Clone)]
pub struct AdapterPort {
    shared: Arc<AdapterShared>,
}

impl AdapterPort {
    /// Create an adapter whose buffers each hold `capacity_factor` frames.
    pub fn create(format: StreamFormat, capacity_factor: u32) -> Result<Self> {
        format.validate()?;
        if capacity_factor == 0 {
            return Err(BridgeError::invalid_argument(
                "capacity factor must be at least 1",
            ));
        }

        let id = Uuid::new_v4();
        let frame_len = format.frame_len();
        let capacity = capacity_factor as usize;

        let capture = ElasticBuffer::new("capture", frame_len, capacity).map_err(|e| {
            log::warn!("[adapter {}] failed to create capture buffer: {}", id, e);
            e
        })?;
        let playback = ElasticBuffer::new("playback", frame_len, capacity).map_err(|e| {
            log::warn!("[adapter {}] failed to create playback buffer: {}", id, e);
            e
        })?;

        log::debug!(
            "[adapter {}] created: {} Hz, {} ch, {} samples/frame, {} frames deep",
            id,
            format.clock_rate,
            format.channel_count,
            format.samples_per_frame,
            capacity_factor
        );

        Ok(Self {
            shared: Arc::new(AdapterShared {
                id,
                format,
                capture: Channel::new(capture),
                playback: Channel::new(playback),
                external_info: PortInfo {
                    id,
                    name: "adapter-port/external".into(),
                    format,
                },
                internal_info: PortInfo {
                    id,
                    name: "adapter-port/internal".into(),
                    format,
                },
                destroyed: AtomicBool::new(false),
            }),
        })
    }

    /// Create an adapter with buffers two frame periods deep.
    pub fn with_default_capacity(format: StreamFormat) -> Result<Self> {
        Self::create(format, DEFAULT_CAPACITY_FACTOR)
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn format(&self) -> StreamFormat {
        self.shared.format
    }

    pub fn facade(&self, facade: Facade) -> AdapterFacade {
        AdapterFacade {
            shared: Arc::clone(&self.shared),
            facade,
        }
    }

    /// Mixer-facing view.
    pub fn external(&self) -> AdapterFacade {
        self.facade(Facade::External)
    }

    /// Device-facing view.
    pub fn internal(&self) -> AdapterFacade {
        self.facade(Facade::Internal)
    }

    /// Destroy both buffers.
    ///
    /// Both buffers are always attempted; the first failure is returned.
    /// Later calls are no-ops.
    pub fn destroy(&self) -> Result<()> {
        self.shared.destroy()
    }

    pub fn is_destroyed(&self) -> bool {
        self.shared.destroyed.load(Ordering::Acquire)
    }

    pub fn capture_reset_state(&self) -> ResetState {
        self.shared.capture.reset_state()
    }

    pub fn playback_reset_state(&self) -> ResetState {
        self.shared.playback.reset_state()
    }

    pub fn stats(&self) -> AdapterStats {
        AdapterStats {
            capture: self.shared.capture.buffer.stats(),
            playback: self.shared.playback.buffer.stats(),
            capture_reset: self.capture_reset_state(),
            playback_reset: self.playback_reset_state(),
        }
    }
}

/// One view of an [`AdapterPort`].
#[derive(Clone)]
pub struct AdapterFacade {
    shared: Arc<AdapterShared>,
    facade: Facade,
}

impl AdapterFacade {
    pub fn kind(&self) -> Facade {
        self.facade
    }

    pub fn into_port(self) -> Arc<dyn MediaPort> {
        Arc::new(self)
    }
}

impl MediaPort for AdapterFacade {
    fn info(&self) -> &PortInfo {
        match self.facade {
            Facade::External => &self.shared.external_info,
            Facade::Internal => &self.shared.internal_info,
        }
    }

    fn get_frame(&self, frame: &mut AudioFrame) -> Result<()> {
        if frame.samples.is_empty() {
            return Err(BridgeError::invalid_argument("get_frame needs a frame buffer"));
        }

        let channel = self.shared.read_channel(self.facade);
        match channel.buffer.get(&mut frame.samples) {
            Ok(()) => {
                frame.frame_type = FrameType::Audio;
                frame.size = self.shared.format.frame_bytes();
                Ok(())
            }
            Err(e) => {
                frame.frame_type = FrameType::None;
                frame.size = 0;
                Err(e)
            }
        }
    }

    fn put_frame(&self, frame: &AudioFrame) -> Result<()> {
        let channel = self.shared.write_channel(self.facade);

        if frame.is_no_data() {
            if channel
                .drained
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                log::debug!(
                    "[adapter {}] no data on {:?} put_frame, resetting {} buffer",
                    self.shared.id,
                    self.facade,
                    channel.buffer.name()
                );
                if let Err(e) = channel.buffer.reset() {
                    log::debug!(
                        "[adapter {}] failed to reset {} buffer: {}",
                        self.shared.id,
                        channel.buffer.name(),
                        e
                    );
                    channel.drained.store(false, Ordering::Release);
                    return Err(e);
                }
            }
            return Ok(());
        }

        channel.buffer.put(&frame.samples)?;
        channel.drained.store(false, Ordering::Release);
        Ok(())
    }

    fn destroy(&self) -> Result<()> {
        self.shared.destroy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn narrowband() -> StreamFormat {
        StreamFormat::new(16000, 1, 16, 160)
    }

    fn tone_1khz(len: usize) -> Vec<i16> {
        (0..len)
            .map(|i| {
                let phase = 2.0 * std::f64::consts::PI * 1000.0 * i as f64 / 16000.0;
                (phase.sin() * 16000.0) as i16
            })
            .collect()
    }

    #[test]
    fn capture_round_trip_preserves_tone() {
        let adapter = AdapterPort::with_default_capacity(narrowband()).unwrap();
        let tone = tone_1khz(160);

        adapter.internal().put_frame(&AudioFrame::audio(tone.clone())).unwrap();

        let mut out = AudioFrame::with_len(160);
        adapter.external().get_frame(&mut out).unwrap();
        assert_eq!(out.samples, tone);
        assert_eq!(out.frame_type, FrameType::Audio);
        assert_eq!(out.size, 320);
    }

    #[test]
    fn playback_round_trip() {
        let adapter = AdapterPort::with_default_capacity(narrowband()).unwrap();
        let samples: Vec<i16> = (0..160).map(|i| i as i16 * 3 - 200).collect();

        adapter.external().put_frame(&AudioFrame::audio(samples.clone())).unwrap();

        let mut out = AudioFrame::with_len(160);
        adapter.internal().get_frame(&mut out).unwrap();
        assert_eq!(out.samples, samples);
    }

    #[test]
    fn directions_do_not_cross() {
        let adapter = AdapterPort::with_default_capacity(narrowband()).unwrap();
        adapter.external().put_frame(&AudioFrame::audio(vec![1; 160])).unwrap();

        // the mixer side must not read back its own playback audio
        let mut out = AudioFrame::with_len(160);
        assert_eq!(
            adapter.external().get_frame(&mut out),
            Err(BridgeError::BufferUnderrun)
        );
        assert_eq!(out.frame_type, FrameType::None);
        assert_eq!(out.samples, vec![0; 160]);
    }

    #[test]
    fn three_empty_puts_reset_once() {
        let adapter = AdapterPort::with_default_capacity(narrowband()).unwrap();
        let external = adapter.external();

        for _ in 0..3 {
            assert!(external.put_frame(&AudioFrame::empty()).is_ok());
        }

        let stats = adapter.stats();
        assert_eq!(stats.playback.resets, 1);
        assert_eq!(stats.capture.resets, 0);
        assert_eq!(stats.playback_reset, ResetState::Drained);
    }

    #[test]
    fn data_after_reset_returns_to_fresh() {
        let adapter = AdapterPort::with_default_capacity(narrowband()).unwrap();
        let internal = adapter.internal();

        internal.put_frame(&AudioFrame::audio(vec![4; 160])).unwrap();
        internal.put_frame(&AudioFrame::empty()).unwrap();
        assert_eq!(adapter.capture_reset_state(), ResetState::Drained);

        // the stale frame was purged
        let mut out = AudioFrame::with_len(160);
        assert_eq!(
            adapter.external().get_frame(&mut out),
            Err(BridgeError::BufferUnderrun)
        );

        internal.put_frame(&AudioFrame::audio(vec![5; 160])).unwrap();
        assert_eq!(adapter.capture_reset_state(), ResetState::Fresh);

        // a new silence episode resets again
        internal.put_frame(&AudioFrame::empty()).unwrap();
        assert_eq!(adapter.stats().capture.resets, 2);
    }

    #[test]
    fn zero_size_audio_frame_counts_as_no_data() {
        // Open question: a zero-size frame tagged Audio still resets the
        // buffer, same as a frame with no buffer at all.
        let adapter = AdapterPort::with_default_capacity(narrowband()).unwrap();
        let mut frame = AudioFrame::audio(vec![9; 160]);
        frame.size = 0;

        adapter.external().put_frame(&frame).unwrap();
        assert_eq!(adapter.playback_reset_state(), ResetState::Drained);
        assert_eq!(adapter.stats().playback.frames_put, 0);
    }

    #[test]
    fn reset_state_is_per_instance() {
        let a = AdapterPort::with_default_capacity(narrowband()).unwrap();
        let b = AdapterPort::with_default_capacity(narrowband()).unwrap();

        a.external().put_frame(&AudioFrame::empty()).unwrap();
        b.external().put_frame(&AudioFrame::empty()).unwrap();

        assert_eq!(a.stats().playback.resets, 1);
        assert_eq!(b.stats().playback.resets, 1);

        b.external().put_frame(&AudioFrame::audio(vec![1; 160])).unwrap();
        assert_eq!(a.playback_reset_state(), ResetState::Drained);
        assert_eq!(b.playback_reset_state(), ResetState::Fresh);
    }

    #[test]
    fn get_frame_without_buffer_is_invalid() {
        let adapter = AdapterPort::with_default_capacity(narrowband()).unwrap();
        let mut frame = AudioFrame::empty();
        assert!(matches!(
            adapter.external().get_frame(&mut frame),
            Err(BridgeError::InvalidArgument(_))
        ));
    }

    #[test]
    fn short_put_is_invalid() {
        let adapter = AdapterPort::with_default_capacity(narrowband()).unwrap();
        assert!(matches!(
            adapter.external().put_frame(&AudioFrame::audio(vec![1; 80])),
            Err(BridgeError::InvalidArgument(_))
        ));
        assert_eq!(adapter.playback_reset_state(), ResetState::Fresh);
    }

    #[test]
    fn create_rejects_bad_arguments() {
        assert!(matches!(
            AdapterPort::create(narrowband(), 0),
            Err(BridgeError::InvalidArgument(_))
        ));
        assert!(matches!(
            AdapterPort::create(StreamFormat::new(16000, 1, 16, 0), 2),
            Err(BridgeError::InvalidArgument(_))
        ));
    }

    #[test]
    fn facades_share_format_and_id() {
        let adapter = AdapterPort::with_default_capacity(narrowband()).unwrap();
        let external = adapter.external();
        let internal = adapter.internal();

        assert_eq!(external.info().format, internal.info().format);
        assert_eq!(external.info().id, adapter.id());
        assert_eq!(internal.info().id, adapter.id());
        assert_eq!(external.kind(), Facade::External);
    }

    #[test]
    fn destroy_is_idempotent_and_shared_by_facades() {
        let adapter = AdapterPort::with_default_capacity(narrowband()).unwrap();
        let external = adapter.external();

        assert!(external.destroy().is_ok());
        assert!(adapter.is_destroyed());
        assert!(adapter.internal().destroy().is_ok());
        assert!(adapter.destroy().is_ok());

        let mut out = AudioFrame::with_len(160);
        assert_eq!(external.get_frame(&mut out), Err(BridgeError::PortDestroyed));
        assert_eq!(
            external.put_frame(&AudioFrame::audio(vec![0; 160])),
            Err(BridgeError::PortDestroyed)
        );
    }

    #[test]
    fn failed_capture_destroy_still_destroys_playback() {
        let adapter = AdapterPort::with_default_capacity(narrowband()).unwrap();
        adapter.shared.capture.buffer.destroy().unwrap();

        assert!(matches!(
            adapter.destroy(),
            Err(BridgeError::BufferDestroy(_))
        ));
        assert!(adapter.shared.playback.buffer.is_destroyed());
        assert!(adapter.is_destroyed());
        assert!(adapter.destroy().is_ok());
    }

    #[test]
    fn capacity_factor_bounds_latency() {
        let adapter = AdapterPort::create(narrowband(), 2).unwrap();
        let internal = adapter.internal();
        for i in 0..5i16 {
            internal.put_frame(&AudioFrame::audio(vec![i; 160])).unwrap();
        }

        let stats = adapter.stats();
        assert_eq!(stats.capture.overruns, 3);
        assert_eq!(stats.capture.pending_frames, 2);

        let mut out = AudioFrame::with_len(160);
        adapter.external().get_frame(&mut out).unwrap();
        assert_eq!(out.samples[0], 3);
    }
}
