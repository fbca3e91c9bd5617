//! Channels, time model and occupancy
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte

pub mod band;
pub use band::{band_of, center_frequency_hz, dbm_to_mw, mw_to_dbm, BandParameters, NOISE_FLOOR_DBM};

pub mod slot;
pub use slot::{Slot, SlotConfig, SubcarrierScaling, Subslot, FRAME_US, SLOTS_PER_FRAME};

pub mod evaluation;
pub use evaluation::{ChannelEvaluation, ChannelSummary, RssiThresholds, SubslotStatus};

pub mod manager;
pub use manager::{ChannelManager, ManagerConfig, Reservation};
