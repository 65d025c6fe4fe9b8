use std::time::Instant;

/// Monotonic media clock for one stream direction.
///
/// Advances by one frame period per device callback. The timestamp counts
/// per-channel samples, so it ticks at `clock_rate` Hz.
#[derive(Debug, Clone, PartialEq)]
pub struct ClockSource {
    clock_rate: u32,
    ticks_per_period: u64,
    ptime_usec: u64,
    timestamp: u64,
    last_update: Option<Instant>,
}

impl ClockSource {
    pub fn new(clock_rate: u32, ticks_per_period: u32, ptime_usec: u64) -> Self {
        Self {
            clock_rate,
            ticks_per_period: u64::from(ticks_per_period),
            ptime_usec,
            timestamp: 0,
            last_update: None,
        }
    }

    /// Record one period. Returns the timestamp of the period just started.
    pub fn advance(&mut self) -> u64 {
        let ts = self.timestamp;
        self.timestamp += self.ticks_per_period;
        self.last_update = Some(Instant::now());
        ts
    }

    /// Ticks elapsed since the stream started.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Elapsed media time in milliseconds.
    pub fn elapsed_msec(&self) -> f64 {
        if self.clock_rate == 0 {
            return 0.0;
        }
        self.timestamp as f64 * 1000.0 / f64::from(self.clock_rate)
    }

    pub fn clock_rate(&self) -> u32 {
        self.clock_rate
    }

    pub fn ptime_usec(&self) -> u64 {
        self.ptime_usec
    }

    /// Wall-clock instant of the last `advance`, if any.
    pub fn last_update(&self) -> Option<Instant> {
        self.last_update
    }
}
