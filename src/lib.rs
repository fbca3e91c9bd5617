//! DECT-2020 NR MAC layer
//
// Message codec, slot/subslot time model, channel manager and the
// beaconing / association state machine for ETSI TS 103 636-4.

#![no_std]

#[cfg(any(test, feature="std"))]
extern crate std;

pub mod timer;

pub mod error;

pub mod wire;

pub mod channel;

pub mod phy;

pub mod mac;

pub mod prelude;


/// Timestamps are 64-bit in microseconds
pub type Ts = u64;

/// Channel identifier, the nominal DECT channel number `n`
pub type ChannelId = u16;

/// Maximum encoded frame size handled by the MAC
pub const MAX_FRAME_LEN: usize = 256;
