use parking_lot::Mutex;

use crate::models::error::{BridgeError, Result};

/// Counters kept by an [`ElasticBuffer`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ElasticBufferStats {
    pub frames_put: u64,
    pub frames_got: u64,
    pub underruns: u64,
    pub overruns: u64,
    pub resets: u64,
    /// Whole frames waiting to be read.
    pub pending_frames: usize,
}

#[derive(Debug)]
struct Ring {
    samples: Vec<i16>,
    write_index: usize,
    read_index: usize,
    available: usize,
    stats: ElasticBufferStats,
}

/// Bounded FIFO of frame-sized PCM blocks shared by two call contexts.
///
/// Whole frames are moved under a short `parking_lot::Mutex`, so a reader
/// never observes a partially written frame. When full, a new frame replaces
/// the oldest unread one. When empty, `get` zero-fills the caller's block and
/// reports [`BridgeError::BufferUnderrun`].
#[derive(Debug)]
pub struct ElasticBuffer {
    name: String,
    frame_len: usize,
    capacity: usize,
    ring: Mutex<Option<Ring>>,
}

impl ElasticBuffer {
    /// Create a buffer holding `capacity_frames` blocks of `frame_len` samples.
    pub fn new(name: impl Into<String>, frame_len: usize, capacity_frames: usize) -> Result<Self> {
        let name = name.into();
        if frame_len == 0 || capacity_frames == 0 {
            return Err(BridgeError::BufferCreate(format!(
                "{}: frame length and capacity must be positive",
                name
            )));
        }
        let capacity = frame_len.checked_mul(capacity_frames).ok_or_else(|| {
            BridgeError::AllocationError(format!("{}: capacity overflows usize", name))
        })?;

        let mut samples = Vec::new();
        samples
            .try_reserve_exact(capacity)
            .map_err(|e| BridgeError::AllocationError(format!("{}: {}", name, e)))?;
        samples.resize(capacity, 0);

        Ok(Self {
            name,
            frame_len,
            capacity,
            ring: Mutex::new(Some(Ring {
                samples,
                write_index: 0,
                read_index: 0,
                available: 0,
                stats: ElasticBufferStats::default(),
            })),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    /// Capacity in samples.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append one frame. The first `frame_len` samples of `frame` are used.
    pub fn put(&self, frame: &[i16]) -> Result<()> {
        if frame.len() < self.frame_len {
            return Err(BridgeError::invalid_argument(format!(
                "{}: frame has {} samples, need {}",
                self.name,
                frame.len(),
                self.frame_len
            )));
        }

        let mut guard = self.ring.lock();
        let ring = guard.as_mut().ok_or(BridgeError::PortDestroyed)?;

        if ring.available + self.frame_len > self.capacity {
            ring.read_index = (ring.read_index + self.frame_len) % self.capacity;
            ring.available -= self.frame_len;
            ring.stats.overruns += 1;
        }

        // Capacity is a whole number of frames, so a frame never wraps.
        let start = ring.write_index;
        ring.samples[start..start + self.frame_len].copy_from_slice(&frame[..self.frame_len]);
        ring.write_index = (start + self.frame_len) % self.capacity;
        ring.available += self.frame_len;
        ring.stats.frames_put += 1;
        Ok(())
    }

    /// Take the oldest frame into the first `frame_len` samples of `out`.
    pub fn get(&self, out: &mut [i16]) -> Result<()> {
        if out.len() < self.frame_len {
            return Err(BridgeError::invalid_argument(format!(
                "{}: output holds {} samples, need {}",
                self.name,
                out.len(),
                self.frame_len
            )));
        }

        let mut guard = self.ring.lock();
        let ring = guard.as_mut().ok_or(BridgeError::PortDestroyed)?;

        if ring.available < self.frame_len {
            out[..self.frame_len].iter_mut().for_each(|s| *s = 0);
            ring.stats.underruns += 1;
            return Err(BridgeError::BufferUnderrun);
        }

        let start = ring.read_index;
        out[..self.frame_len].copy_from_slice(&ring.samples[start..start + self.frame_len]);
        ring.read_index = (start + self.frame_len) % self.capacity;
        ring.available -= self.frame_len;
        ring.stats.frames_got += 1;
        Ok(())
    }

    /// Discard all pending frames.
    pub fn reset(&self) -> Result<()> {
        let mut guard = self.ring.lock();
        let ring = guard.as_mut().ok_or(BridgeError::PortDestroyed)?;
        ring.write_index = 0;
        ring.read_index = 0;
        ring.available = 0;
        ring.stats.resets += 1;
        Ok(())
    }

    /// Release the backing storage. Fails if already destroyed.
    pub fn destroy(&self) -> Result<()> {
        match self.ring.lock().take() {
            Some(_) => Ok(()),
            None => Err(BridgeError::BufferDestroy(format!(
                "{}: already destroyed",
                self.name
            ))),
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.ring.lock().is_none()
    }

    pub fn stats(&self) -> ElasticBufferStats {
        match self.ring.lock().as_ref() {
            Some(ring) => ElasticBufferStats {
                pending_frames: ring.available / self.frame_len,
                ..ring.stats
            },
            None => ElasticBufferStats::default(),
        }
    }
}
