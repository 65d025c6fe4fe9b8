use bitflags::bitflags;

use crate::processing::elastic_buffer::ElasticBufferStats;

bitflags! {
    /// Optional features a device reports. Used for diagnostics only.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
    pub struct DeviceCaps: u32 {
        const INPUT_LATENCY = 1 << 0;
        const OUTPUT_LATENCY = 1 << 1;
        const INPUT_VOLUME = 1 << 2;
        const OUTPUT_VOLUME = 1 << 3;
        const EC = 1 << 4;
        const VAD = 1 << 5;
    }
}

/// An audio device available for capture or playback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub driver: String,
    pub input_count: u16,
    pub output_count: u16,
    pub default_clock_rate: u32,
    /// Clock rates the device accepts. Empty means any.
    pub clock_rates: Vec<u32>,
    pub caps: DeviceCaps,
}

impl DeviceInfo {
    pub fn supports_clock_rate(&self, clock_rate: u32) -> bool {
        self.clock_rates.is_empty() || self.clock_rates.contains(&clock_rate)
    }
}

/// Reset state of one adapter direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResetState {
    /// The buffer may hold trailing data.
    #[default]
    Fresh,
    /// The buffer was reset and nothing has been written since.
    Drained,
}

/// Counters for both directions of an adapter port.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdapterStats {
    pub capture: ElasticBufferStats,
    pub playback: ElasticBufferStats,
    pub capture_reset: ResetState,
    pub playback_reset: ResetState,
}

/// Diagnostics for a running device bridge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BridgeDiagnostics {
    pub adapter: AdapterStats,
    pub capture_ticks: u64,
    pub playback_ticks: u64,
    pub running: bool,
}
