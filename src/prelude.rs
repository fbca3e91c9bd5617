//! DECT-2020 NR MAC crate prelude
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte

pub use crate::{ChannelId, Ts};

pub use crate::error::{ChannelError, CoreError, DecodeError, DecodeErrorKind, EncodeError};
pub use crate::timer::{Timer as MacTimer};
pub use crate::phy::Phy;

pub use crate::channel::{ChannelEvaluation, ChannelManager, ManagerConfig, SlotConfig, SubcarrierScaling, Subslot};

pub use crate::mac::{self, AssocState, Config as MacConfig, Mac, MacStats, Role};

pub use crate::wire::{Ie, MacPdu, PhyControlField, Wire};
