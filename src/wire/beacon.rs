//! Network and cluster beacon messages

use heapless::Vec;
use strum::{EnumIter, FromRepr};

use super::{Reader, Wire, Writer};
use crate::error::{DecodeError, EncodeError};
use crate::Ts;

/// Network beacon period
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, FromRepr)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum NetworkBeaconPeriod {
    Ms50 = 0,
    Ms100 = 1,
    Ms500 = 2,
    Ms1000 = 3,
    Ms1500 = 4,
    Ms2000 = 5,
    Ms4000 = 6,
}

impl NetworkBeaconPeriod {
    pub fn ms(&self) -> u32 {
        match self {
            NetworkBeaconPeriod::Ms50 => 50,
            NetworkBeaconPeriod::Ms100 => 100,
            NetworkBeaconPeriod::Ms500 => 500,
            NetworkBeaconPeriod::Ms1000 => 1000,
            NetworkBeaconPeriod::Ms1500 => 1500,
            NetworkBeaconPeriod::Ms2000 => 2000,
            NetworkBeaconPeriod::Ms4000 => 4000,
        }
    }

    pub fn us(&self) -> Ts {
        self.ms() as Ts * 1000
    }
}

/// Cluster beacon period
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, FromRepr)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ClusterBeaconPeriod {
    Ms10 = 0,
    Ms50 = 1,
    Ms100 = 2,
    Ms500 = 3,
    Ms1000 = 4,
    Ms1500 = 5,
    Ms2000 = 6,
    Ms4000 = 7,
    Ms8000 = 8,
    Ms16000 = 9,
    Ms32000 = 10,
}

impl ClusterBeaconPeriod {
    pub fn ms(&self) -> u32 {
        match self {
            ClusterBeaconPeriod::Ms10 => 10,
            ClusterBeaconPeriod::Ms50 => 50,
            ClusterBeaconPeriod::Ms100 => 100,
            ClusterBeaconPeriod::Ms500 => 500,
            ClusterBeaconPeriod::Ms1000 => 1000,
            ClusterBeaconPeriod::Ms1500 => 1500,
            ClusterBeaconPeriod::Ms2000 => 2000,
            ClusterBeaconPeriod::Ms4000 => 4000,
            ClusterBeaconPeriod::Ms8000 => 8000,
            ClusterBeaconPeriod::Ms16000 => 16000,
            ClusterBeaconPeriod::Ms32000 => 32000,
        }
    }

    pub fn us(&self) -> Ts {
        self.ms() as Ts * 1000
    }
}

/// Maximum transmit power advertised for a cluster, codes 0-3 are reserved
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, FromRepr)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum MaxTxPower {
    DbmMinus12 = 4,
    DbmMinus8 = 5,
    DbmMinus4 = 6,
    Dbm0 = 7,
    Dbm4 = 8,
    Dbm7 = 9,
    Dbm10 = 10,
    Dbm13 = 11,
    Dbm16 = 12,
    Dbm19 = 13,
    Dbm21 = 14,
    Dbm23 = 15,
}

impl MaxTxPower {
    pub fn dbm(&self) -> i8 {
        match self {
            MaxTxPower::DbmMinus12 => -12,
            MaxTxPower::DbmMinus8 => -8,
            MaxTxPower::DbmMinus4 => -4,
            MaxTxPower::Dbm0 => 0,
            MaxTxPower::Dbm4 => 4,
            MaxTxPower::Dbm7 => 7,
            MaxTxPower::Dbm10 => 10,
            MaxTxPower::Dbm13 => 13,
            MaxTxPower::Dbm16 => 16,
            MaxTxPower::Dbm19 => 19,
            MaxTxPower::Dbm21 => 21,
            MaxTxPower::Dbm23 => 23,
        }
    }
}

/// Quality threshold offsets used for mobility decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, FromRepr)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum QualityThreshold {
    Db0 = 0,
    Db3 = 1,
    Db6 = 2,
    Db9 = 3,
}

impl QualityThreshold {
    pub fn db(&self) -> u8 {
        *self as u8 * 3
    }
}

pub const PERIOD_NETWORK_SHIFT: u8 = 4;
pub const NIBBLE_MASK: u8 = 0x0F;

pub(crate) fn read_periods(r: &mut Reader) -> Result<(NetworkBeaconPeriod, ClusterBeaconPeriod), DecodeError> {
    let b = r.u8("periods")?;
    let network = r.code("network_beacon_period", b >> PERIOD_NETWORK_SHIFT, NetworkBeaconPeriod::from_repr)?;
    let cluster = r.code("cluster_beacon_period", b & NIBBLE_MASK, ClusterBeaconPeriod::from_repr)?;
    Ok((network, cluster))
}

pub(crate) fn write_periods(w: &mut Writer, network: NetworkBeaconPeriod, cluster: ClusterBeaconPeriod) -> Result<(), EncodeError> {
    w.u8((network as u8) << PERIOD_NETWORK_SHIFT | cluster as u8)
}

fn read_tx_power(r: &mut Reader, field: &'static str) -> Result<MaxTxPower, DecodeError> {
    let b = r.u8(field)?;
    r.code(field, b & NIBBLE_MASK, MaxTxPower::from_repr)
}

bitflags::bitflags! {
    /// Cluster beacon field presence flags
    pub struct ClusterBeaconFlags: u8 {
        const TX_POWER          = 0b0001_0000;
        const POWER_CONSTRAINTS = 0b0000_1000;
        const FRAME_OFFSET      = 0b0000_0100;
        const NEXT_CHANNEL      = 0b0000_0010;
        const TIME_TO_NEXT      = 0b0000_0001;
    }
}

/// Cluster beacon message
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ClusterBeaconMessage {
    /// System frame number
    pub sfn: u8,
    pub power_constraints: bool,
    pub cluster_max_tx_power: Option<MaxTxPower>,
    pub frame_offset: Option<u8>,
    pub next_cluster_channel: Option<u16>,
    /// Time to the next cluster channel change in microseconds
    pub time_to_next: Option<u32>,
    pub network_beacon_period: NetworkBeaconPeriod,
    pub cluster_beacon_period: ClusterBeaconPeriod,
    /// 4-bit count to trigger code
    pub count_to_trigger: u8,
    pub rel_quality: QualityThreshold,
    pub min_quality: QualityThreshold,
}

impl ClusterBeaconMessage {
    pub const MIN_LEN: usize = 4;

    pub fn new(sfn: u8, network_beacon_period: NetworkBeaconPeriod, cluster_beacon_period: ClusterBeaconPeriod) -> Self {
        Self {
            sfn,
            power_constraints: false,
            cluster_max_tx_power: None,
            frame_offset: None,
            next_cluster_channel: None,
            time_to_next: None,
            network_beacon_period,
            cluster_beacon_period,
            count_to_trigger: 0,
            rel_quality: QualityThreshold::Db0,
            min_quality: QualityThreshold::Db0,
        }
    }

    fn flags(&self) -> ClusterBeaconFlags {
        let mut f = ClusterBeaconFlags::empty();
        f.set(ClusterBeaconFlags::TX_POWER, self.cluster_max_tx_power.is_some());
        f.set(ClusterBeaconFlags::POWER_CONSTRAINTS, self.power_constraints);
        f.set(ClusterBeaconFlags::FRAME_OFFSET, self.frame_offset.is_some());
        f.set(ClusterBeaconFlags::NEXT_CHANNEL, self.next_cluster_channel.is_some());
        f.set(ClusterBeaconFlags::TIME_TO_NEXT, self.time_to_next.is_some());
        f
    }
}

impl Wire for ClusterBeaconMessage {
    const NAME: &'static str = "cluster_beacon";

    fn encoded_len(&self) -> usize {
        Self::MIN_LEN
            + self.cluster_max_tx_power.map_or(0, |_| 1)
            + self.frame_offset.map_or(0, |_| 1)
            + self.next_cluster_channel.map_or(0, |_| 2)
            + self.time_to_next.map_or(0, |_| 4)
    }

    fn encode(&self, buf: &mut [u8]) -> Result<usize, EncodeError> {
        let mut w = Writer::new(buf, self.encoded_len())?;

        w.u8(self.sfn)?;
        w.u8(self.flags().bits())?;
        write_periods(&mut w, self.network_beacon_period, self.cluster_beacon_period)?;
        w.u8((self.count_to_trigger & NIBBLE_MASK) << 4 | (self.rel_quality as u8) << 2 | self.min_quality as u8)?;

        if let Some(p) = self.cluster_max_tx_power {
            w.u8(p as u8)?;
        }
        if let Some(o) = self.frame_offset {
            w.u8(o)?;
        }
        if let Some(c) = self.next_cluster_channel {
            w.channel(c)?;
        }
        if let Some(t) = self.time_to_next {
            w.u32(t)?;
        }

        Ok(w.finish())
    }

    fn decode(buf: &[u8]) -> Result<(Self, usize), DecodeError> {
        let mut r = Reader::new(buf);

        let sfn = r.u8("sfn")?;
        let flags = ClusterBeaconFlags::from_bits_truncate(r.u8("cluster_beacon_flags")?);
        let (network_beacon_period, cluster_beacon_period) = read_periods(&mut r)?;

        let q = r.u8("quality")?;
        let count_to_trigger = q >> 4;
        let rel_quality = r.code("rel_quality", (q >> 2) & 0b11, QualityThreshold::from_repr)?;
        let min_quality = r.code("min_quality", q & 0b11, QualityThreshold::from_repr)?;

        let cluster_max_tx_power = match flags.contains(ClusterBeaconFlags::TX_POWER) {
            true => Some(read_tx_power(&mut r, "cluster_max_tx_power")?),
            false => None,
        };
        let frame_offset = match flags.contains(ClusterBeaconFlags::FRAME_OFFSET) {
            true => Some(r.u8("frame_offset")?),
            false => None,
        };
        let next_cluster_channel = match flags.contains(ClusterBeaconFlags::NEXT_CHANNEL) {
            true => Some(r.channel("next_cluster_channel")?),
            false => None,
        };
        let time_to_next = match flags.contains(ClusterBeaconFlags::TIME_TO_NEXT) {
            true => Some(r.u32("time_to_next")?),
            false => None,
        };

        let m = Self {
            sfn,
            power_constraints: flags.contains(ClusterBeaconFlags::POWER_CONSTRAINTS),
            cluster_max_tx_power,
            frame_offset,
            next_cluster_channel,
            time_to_next,
            network_beacon_period,
            cluster_beacon_period,
            count_to_trigger,
            rel_quality,
            min_quality,
        };

        Ok((m, r.offset()))
    }
}

bitflags::bitflags! {
    /// Network beacon field presence flags
    pub struct NetworkBeaconFlags: u8 {
        const TX_POWER          = 0b0001_0000;
        const POWER_CONSTRAINTS = 0b0000_1000;
        const CURRENT_CHANNEL   = 0b0000_0100;
    }
}

pub const NETWORK_BEACON_CHANNELS_MASK: u8 = 0b0000_0011;

/// Maximum additional network beacon channels
pub const MAX_BEACON_CHANNELS: usize = 3;

/// Network beacon message
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NetworkBeaconMessage {
    pub power_constraints: bool,
    pub clusters_max_tx_power: Option<MaxTxPower>,
    pub current_cluster_channel: Option<u16>,
    /// Other channels network beacons are transmitted on
    pub network_beacon_channels: Vec<u16, MAX_BEACON_CHANNELS>,
    pub network_beacon_period: NetworkBeaconPeriod,
    pub cluster_beacon_period: ClusterBeaconPeriod,
    pub next_cluster_channel: u16,
    /// Time to the next cluster beacon in microseconds
    pub time_to_next: u32,
}

impl NetworkBeaconMessage {
    pub const MIN_LEN: usize = 8;

    pub fn new(network_beacon_period: NetworkBeaconPeriod, cluster_beacon_period: ClusterBeaconPeriod, next_cluster_channel: u16, time_to_next: u32) -> Self {
        Self {
            power_constraints: false,
            clusters_max_tx_power: None,
            current_cluster_channel: None,
            network_beacon_channels: Vec::new(),
            network_beacon_period,
            cluster_beacon_period,
            next_cluster_channel,
            time_to_next,
        }
    }
}

impl Wire for NetworkBeaconMessage {
    const NAME: &'static str = "network_beacon";

    fn encoded_len(&self) -> usize {
        Self::MIN_LEN
            + self.clusters_max_tx_power.map_or(0, |_| 1)
            + self.current_cluster_channel.map_or(0, |_| 2)
            + self.network_beacon_channels.len() * 2
    }

    fn encode(&self, buf: &mut [u8]) -> Result<usize, EncodeError> {
        let mut w = Writer::new(buf, self.encoded_len())?;

        let mut flags = NetworkBeaconFlags::empty();
        flags.set(NetworkBeaconFlags::TX_POWER, self.clusters_max_tx_power.is_some());
        flags.set(NetworkBeaconFlags::POWER_CONSTRAINTS, self.power_constraints);
        flags.set(NetworkBeaconFlags::CURRENT_CHANNEL, self.current_cluster_channel.is_some());

        w.u8(flags.bits() | self.network_beacon_channels.len() as u8)?;
        write_periods(&mut w, self.network_beacon_period, self.cluster_beacon_period)?;
        w.channel(self.next_cluster_channel)?;
        w.u32(self.time_to_next)?;

        if let Some(p) = self.clusters_max_tx_power {
            w.u8(p as u8)?;
        }
        if let Some(c) = self.current_cluster_channel {
            w.channel(c)?;
        }
        for c in &self.network_beacon_channels {
            w.channel(*c)?;
        }

        Ok(w.finish())
    }

    fn decode(buf: &[u8]) -> Result<(Self, usize), DecodeError> {
        let mut r = Reader::new(buf);

        let b0 = r.u8("network_beacon_flags")?;
        let flags = NetworkBeaconFlags::from_bits_truncate(b0);
        let count = (b0 & NETWORK_BEACON_CHANNELS_MASK) as usize;

        let (network_beacon_period, cluster_beacon_period) = read_periods(&mut r)?;
        let next_cluster_channel = r.channel("next_cluster_channel")?;
        let time_to_next = r.u32("time_to_next")?;

        let clusters_max_tx_power = match flags.contains(NetworkBeaconFlags::TX_POWER) {
            true => Some(read_tx_power(&mut r, "clusters_max_tx_power")?),
            false => None,
        };
        let current_cluster_channel = match flags.contains(NetworkBeaconFlags::CURRENT_CHANNEL) {
            true => Some(r.channel("current_cluster_channel")?),
            false => None,
        };

        let mut network_beacon_channels = Vec::new();
        for _ in 0..count {
            let offset = r.offset();
            let channel = r.channel("network_beacon_channel")?;
            network_beacon_channels
                .push(channel)
                .map_err(|_| DecodeError::invalid("network_beacon_channels", offset, count as u32))?;
        }

        let m = Self {
            power_constraints: flags.contains(NetworkBeaconFlags::POWER_CONSTRAINTS),
            clusters_max_tx_power,
            current_cluster_channel,
            network_beacon_channels,
            network_beacon_period,
            cluster_beacon_period,
            next_cluster_channel,
            time_to_next,
        };

        Ok((m, r.offset()))
    }
}
