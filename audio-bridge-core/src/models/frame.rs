/// Content tag of an [`AudioFrame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrameType {
    /// No valid payload.
    #[default]
    None,
    /// Interleaved 16-bit PCM. Silence is an audio frame of zeros.
    Audio,
}

/// One period of interleaved PCM audio.
///
/// An empty `samples` vector stands for a frame without a buffer. Ports treat
/// such a frame, or one whose `size` is zero, as an explicit "no data" signal.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AudioFrame {
    pub frame_type: FrameType,
    pub samples: Vec<i16>,
    /// Payload size in bytes.
    pub size: usize,
    /// Clock ticks (one per sample per channel) at the start of the frame.
    pub timestamp: u64,
}

impl AudioFrame {
    /// Audio frame carrying `samples`, sized accordingly.
    pub fn audio(samples: Vec<i16>) -> Self {
        let size = samples.len() * std::mem::size_of::<i16>();
        Self {
            frame_type: FrameType::Audio,
            samples,
            size,
            timestamp: 0,
        }
    }

    /// Zeroed receive buffer for `len` samples, typed `None` until filled.
    pub fn with_len(len: usize) -> Self {
        Self {
            frame_type: FrameType::None,
            samples: vec![0; len],
            size: 0,
            timestamp: 0,
        }
    }

    /// Frame with no buffer at all.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Whether this frame is the "no data" signal: no buffer or zero size.
    pub fn is_no_data(&self) -> bool {
        self.samples.is_empty() || self.size == 0
    }

    pub fn is_audio(&self) -> bool {
        self.frame_type == FrameType::Audio
    }

    /// Overwrite the payload with a full-size silent audio block.
    pub fn fill_silence(&mut self, size: usize) {
        self.samples.iter_mut().for_each(|s| *s = 0);
        self.frame_type = FrameType::Audio;
        self.size = size;
    }
}
