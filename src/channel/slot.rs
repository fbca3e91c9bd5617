//! Slot and subslot time model
//
// A 10 ms frame holds 24 slots, each split into 2, 4, 8 or 16 subslots
// depending on the subcarrier scaling factor. Boundaries are rounded up to
// the next microsecond so every boundary maps back to its own index.

use strum::{EnumIter, FromRepr};

use crate::Ts;

/// Frame duration in microseconds
pub const FRAME_US: Ts = 10_000;

pub const SLOTS_PER_FRAME: u8 = 24;

/// Subcarrier scaling factor µ
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, FromRepr)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum SubcarrierScaling {
    X1 = 1,
    X2 = 2,
    X4 = 4,
    X8 = 8,
}

impl SubcarrierScaling {
    pub fn subslots_per_slot(&self) -> u8 {
        2 * *self as u8
    }
}

impl Default for SubcarrierScaling {
    fn default() -> Self {
        SubcarrierScaling::X1
    }
}

/// Slot within a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Slot {
    pub frame: u64,
    pub index: u8,
    pub start: Ts,
    pub end: Ts,
}

impl Slot {
    pub fn duration(&self) -> Ts {
        self.end - self.start
    }
}

/// Subslot within a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Subslot {
    pub frame: u64,
    pub slot: u8,
    pub index: u8,
    /// Frame-relative subslot number
    pub number: u16,
    pub start: Ts,
    pub end: Ts,
}

impl Subslot {
    pub fn duration(&self) -> Ts {
        self.end - self.start
    }

    pub fn overlaps(&self, start: Ts, end: Ts) -> bool {
        self.start < end && start < self.end
    }
}

/// Channel time configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SlotConfig {
    pub scaling: SubcarrierScaling,
}

impl SlotConfig {
    pub fn new(scaling: SubcarrierScaling) -> Self {
        Self { scaling }
    }

    pub fn subslots_per_slot(&self) -> u8 {
        self.scaling.subslots_per_slot()
    }

    pub fn subslots_per_frame(&self) -> u16 {
        SLOTS_PER_FRAME as u16 * self.subslots_per_slot() as u16
    }

    /// Frame-relative offset of boundary `k` of `n` equal divisions
    fn boundary(k: u64, n: u64) -> Ts {
        (k * FRAME_US + n - 1) / n
    }

    /// Frame-relative start time of a subslot, `None` if either index is
    /// out of range
    pub fn time_of(&self, slot: u8, subslot: u8) -> Option<Ts> {
        if slot >= SLOTS_PER_FRAME || subslot >= self.subslots_per_slot() {
            return None;
        }

        let k = slot as u64 * self.subslots_per_slot() as u64 + subslot as u64;
        Some(Self::boundary(k, self.subslots_per_frame() as u64))
    }

    /// Slot containing `t`
    pub fn slot_at(&self, t: Ts) -> Slot {
        let frame = t / FRAME_US;
        let base = frame * FRAME_US;
        let n = SLOTS_PER_FRAME as u64;

        let index = (t - base) * n / FRAME_US;

        Slot {
            frame,
            index: index as u8,
            start: base + Self::boundary(index, n),
            end: base + Self::boundary(index + 1, n),
        }
    }

    /// Subslot containing `t`
    pub fn subslot_at(&self, t: Ts) -> Subslot {
        let frame = t / FRAME_US;
        let n = self.subslots_per_frame() as u64;
        let number = (t - frame * FRAME_US) * n / FRAME_US;

        self.subslot(frame, number as u16)
    }

    /// Subslot by frame and frame-relative number, numbers past the end of
    /// the frame continue into following frames
    pub fn subslot(&self, frame: u64, number: u16) -> Subslot {
        let n = self.subslots_per_frame();
        let frame = frame + (number / n) as u64;
        let number = number % n;

        let base = frame * FRAME_US;
        let per_slot = self.subslots_per_slot() as u16;

        Subslot {
            frame,
            slot: (number / per_slot) as u8,
            index: (number % per_slot) as u8,
            number,
            start: base + Self::boundary(number as u64, n as u64),
            end: base + Self::boundary(number as u64 + 1, n as u64),
        }
    }

    /// Subslot following `s`
    pub fn next(&self, s: &Subslot) -> Subslot {
        self.subslot(s.frame, s.number + 1)
    }

    /// Subslot `n` subslots after `s`
    pub fn offset(&self, s: &Subslot, n: u32) -> Subslot {
        let per_frame = self.subslots_per_frame() as u64;
        let k = s.number as u64 + n as u64;
        self.subslot(s.frame + k / per_frame, (k % per_frame) as u16)
    }

    /// First subslot starting at or after `t`
    pub fn subslot_from(&self, t: Ts) -> Subslot {
        let s = self.subslot_at(t);
        match s.start < t {
            true => self.next(&s),
            false => s,
        }
    }
}
