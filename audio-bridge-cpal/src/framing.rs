//! Re-blocking between host callback buffers and fixed-size frames.
//!
//! Host audio APIs hand out buffers of whatever length and sample type the
//! driver picked, while the bridge works in i16 frames of exactly
//! `samples_per_frame` samples. Each framer owns one frame buffer that is
//! reused for every period, so the host callback does not allocate.

use std::collections::VecDeque;

use audio_bridge_core::{AudioFrame, FrameCallback, FrameType, StreamFormat};

/// Collects captured samples and emits one record callback per full frame.
pub struct CaptureFramer {
    format: StreamFormat,
    frame: AudioFrame,
    filled: usize,
    callback: FrameCallback,
}

impl CaptureFramer {
    pub fn new(format: StreamFormat, callback: FrameCallback) -> Self {
        Self {
            format,
            frame: AudioFrame::with_len(format.frame_len()),
            filled: 0,
            callback,
        }
    }

    /// Feed host samples. Returns the number of frames delivered.
    pub fn push(&mut self, data: &[i16]) -> usize {
        self.push_converted(data, |s| s)
    }

    /// Feed host samples of another type, converting each to i16.
    pub fn push_converted<T, F>(&mut self, data: &[T], convert: F) -> usize
    where
        T: Copy,
        F: Fn(T) -> i16,
    {
        let len = self.format.frame_len();

        let mut delivered = 0;
        let mut rest = data;
        while !rest.is_empty() {
            let take = (len - self.filled).min(rest.len());
            let (head, tail) = rest.split_at(take);
            for (dst, &src) in self.frame.samples[self.filled..self.filled + take]
                .iter_mut()
                .zip(head)
            {
                *dst = convert(src);
            }
            self.filled += take;
            rest = tail;

            if self.filled == len {
                self.deliver();
                delivered += 1;
            }
        }
        delivered
    }

    pub fn pending_samples(&self) -> usize {
        self.filled
    }

    fn deliver(&mut self) {
        let len = self.format.frame_len();
        self.frame.frame_type = FrameType::Audio;
        self.frame.size = self.format.frame_bytes();
        self.frame.timestamp = 0;
        if let Err(e) = (self.callback)(&mut self.frame) {
            log::debug!("record callback failed: {}", e);
        }
        // the callback may have resized the buffer
        self.frame.samples.resize(len, 0);
        self.filled = 0;
    }
}

/// Pulls frames from the playback callback to fill host buffers.
pub struct PlaybackFramer {
    format: StreamFormat,
    frame: AudioFrame,
    pending: VecDeque<i16>,
    callback: FrameCallback,
}

impl PlaybackFramer {
    pub fn new(format: StreamFormat, callback: FrameCallback) -> Self {
        Self {
            format,
            frame: AudioFrame::with_len(format.frame_len()),
            pending: VecDeque::with_capacity(format.frame_len() * 2),
            callback,
        }
    }

    /// Fill `out` completely. Returns the number of frames requested.
    pub fn fill(&mut self, out: &mut [i16]) -> usize {
        self.fill_converted(out, |s| s)
    }

    /// Fill a host buffer of another sample type, converting from i16.
    pub fn fill_converted<T, F>(&mut self, out: &mut [T], convert: F) -> usize
    where
        F: Fn(i16) -> T,
    {
        let wanted = out.len();

        let mut requested = 0;
        while self.pending.len() < wanted {
            self.pull();
            requested += 1;
        }

        for (dst, src) in out.iter_mut().zip(self.pending.drain(..wanted)) {
            *dst = convert(src);
        }
        requested
    }

    pub fn pending_samples(&self) -> usize {
        self.pending.len()
    }

    fn pull(&mut self) {
        let len = self.format.frame_len();
        self.frame.samples.resize(len, 0);
        self.frame.samples.iter_mut().for_each(|s| *s = 0);
        self.frame.frame_type = FrameType::None;
        self.frame.size = self.format.frame_bytes();

        match (self.callback)(&mut self.frame) {
            Ok(()) if self.frame.samples.len() >= len => {
                self.pending.extend(&self.frame.samples[..len]);
            }
            Ok(()) => {
                log::debug!("playback callback shrank the frame buffer");
                self.pending.extend(std::iter::repeat(0).take(len));
            }
            Err(e) => {
                log::debug!("playback callback failed: {}", e);
                self.pending.extend(std::iter::repeat(0).take(len));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audio_bridge_core::BridgeError;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn format() -> StreamFormat {
        StreamFormat::new(16000, 1, 16, 4)
    }

    fn recording(seen: &Arc<Mutex<Vec<Vec<i16>>>>) -> FrameCallback {
        let seen = Arc::clone(seen);
        Arc::new(move |frame: &mut AudioFrame| {
            assert_eq!(frame.size, 8);
            assert!(frame.is_audio());
            seen.lock().push(frame.samples.clone());
            Ok(())
        })
    }

    fn counting_source() -> FrameCallback {
        let next = Arc::new(Mutex::new(0i16));
        Arc::new(move |frame: &mut AudioFrame| {
            let mut n = next.lock();
            for s in frame.samples.iter_mut() {
                *n += 1;
                *s = *n;
            }
            Ok(())
        })
    }

    #[test]
    fn capture_reblocks_odd_host_buffers() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut framer = CaptureFramer::new(format(), recording(&seen));

        assert_eq!(framer.push(&[1, 2, 3]), 0);
        assert_eq!(framer.push(&[4, 5, 6, 7, 8, 9, 10]), 2);
        assert_eq!(framer.pending_samples(), 2);

        let seen = seen.lock();
        assert_eq!(*seen, vec![vec![1, 2, 3, 4], vec![5, 6, 7, 8]]);
    }

    #[test]
    fn capture_reuses_one_frame_buffer() {
        let addresses = Arc::new(Mutex::new(Vec::new()));
        let callback: FrameCallback = {
            let addresses = Arc::clone(&addresses);
            Arc::new(move |frame: &mut AudioFrame| {
                addresses.lock().push(frame.samples.as_ptr() as usize);
                Ok(())
            })
        };
        let mut framer = CaptureFramer::new(format(), callback);

        assert_eq!(framer.push(&[0; 12]), 3);
        let addresses = addresses.lock();
        assert_eq!(addresses.len(), 3);
        assert!(addresses.iter().all(|&a| a == addresses[0]));
    }

    #[test]
    fn capture_survives_callback_truncating_the_frame() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let callback: FrameCallback = {
            let seen = Arc::clone(&seen);
            Arc::new(move |frame: &mut AudioFrame| {
                seen.lock().push(frame.samples.clone());
                frame.samples.clear();
                Ok(())
            })
        };
        let mut framer = CaptureFramer::new(format(), callback);

        assert_eq!(framer.push(&[1, 2, 3, 4, 5, 6, 7, 8]), 2);
        assert_eq!(seen.lock()[1], vec![5, 6, 7, 8]);
    }

    #[test]
    fn capture_converts_float_samples() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut framer = CaptureFramer::new(format(), recording(&seen));

        let data = [0.0f32, 0.5, -0.5, 1.0];
        assert_eq!(framer.push_converted(&data, |s| (s * 32767.0) as i16), 1);
        assert_eq!(seen.lock()[0], vec![0, 16383, -16383, 32767]);
    }

    #[test]
    fn playback_splits_frames_across_host_buffers() {
        let mut framer = PlaybackFramer::new(format(), counting_source());

        let mut out = [0i16; 6];
        assert_eq!(framer.fill(&mut out), 2);
        assert_eq!(out, [1, 2, 3, 4, 5, 6]);
        assert_eq!(framer.pending_samples(), 2);

        let mut out = [0i16; 2];
        assert_eq!(framer.fill(&mut out), 0);
        assert_eq!(out, [7, 8]);
    }

    #[test]
    fn playback_converts_to_float() {
        let mut framer = PlaybackFramer::new(format(), counting_source());

        let mut out = [0.0f32; 4];
        framer.fill_converted(&mut out, f32::from);
        assert_eq!(out, [1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn failing_playback_callback_plays_silence() {
        let callback: FrameCallback =
            Arc::new(|_frame: &mut AudioFrame| Err(BridgeError::BufferUnderrun));
        let mut framer = PlaybackFramer::new(format(), callback);

        let mut out = [9i16; 4];
        framer.fill(&mut out);
        assert_eq!(out, [0; 4]);
    }

    #[test]
    fn playback_buffer_is_cleared_between_periods() {
        let calls = Arc::new(Mutex::new(0));
        let callback: FrameCallback = {
            let calls = Arc::clone(&calls);
            Arc::new(move |frame: &mut AudioFrame| {
                let mut calls = calls.lock();
                *calls += 1;
                if *calls == 1 {
                    frame.samples.iter_mut().for_each(|s| *s = 7);
                }
                Ok(())
            })
        };
        let mut framer = PlaybackFramer::new(format(), callback);

        let mut out = [0i16; 8];
        assert_eq!(framer.fill(&mut out), 2);
        assert_eq!(out, [7, 7, 7, 7, 0, 0, 0, 0]);
    }
}
