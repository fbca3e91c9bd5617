//! Channel evaluations

use crate::Ts;

/// Occupancy class of a measured subslot
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SubslotStatus {
    Free,
    Possible,
    Busy,
}

/// RSSI limits for classifying a subslot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RssiThresholds {
    /// At or below this level a subslot is free
    pub free_dbm: i16,
    /// At or below this level a subslot is possibly usable, above it is busy
    pub busy_dbm: i16,
}

impl Default for RssiThresholds {
    fn default() -> Self {
        Self { free_dbm: -85, busy_dbm: -50 }
    }
}

impl RssiThresholds {
    pub fn classify(&self, rssi_dbm: i16) -> SubslotStatus {
        if rssi_dbm <= self.free_dbm {
            SubslotStatus::Free
        } else if rssi_dbm <= self.busy_dbm {
            SubslotStatus::Possible
        } else {
            SubslotStatus::Busy
        }
    }
}

/// Point in time measurement of one subslot on a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelEvaluation {
    /// Measurement time, locates the evaluated subslot
    pub at: Ts,
    pub rssi_dbm: i16,
    pub status: SubslotStatus,
}

impl ChannelEvaluation {
    pub fn new(at: Ts, rssi_dbm: i16, thresholds: &RssiThresholds) -> Self {
        Self { at, rssi_dbm, status: thresholds.classify(rssi_dbm) }
    }

    pub fn is_busy(&self) -> bool {
        self.status == SubslotStatus::Busy
    }
}

/// Per-channel tally of subslot states across one frame
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelSummary {
    pub free: u16,
    pub possible: u16,
    pub busy: u16,
    /// Mean received power over evaluated subslots
    pub mean_rssi_dbm: f32,
}

impl ChannelSummary {
    pub fn total(&self) -> u16 {
        self.free + self.possible + self.busy
    }

    pub fn is_free(&self) -> bool {
        self.possible == 0 && self.busy == 0
    }

    /// Share of subslots that are free or possibly usable
    pub fn usable_ratio(&self) -> f32 {
        match self.total() {
            0 => 1.0,
            n => (self.free + self.possible) as f32 / n as f32,
        }
    }

    pub(crate) fn count(&mut self, status: SubslotStatus) {
        match status {
            SubslotStatus::Free => self.free += 1,
            SubslotStatus::Possible => self.possible += 1,
            SubslotStatus::Busy => self.busy += 1,
        }
    }
}
