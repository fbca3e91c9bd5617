
use crate::wire::association::RejectTimer;
use crate::wire::phy_control::PacketLength;
use crate::wire::{ClusterBeaconPeriod, NetworkBeaconPeriod};
use crate::{ChannelId, Ts};

use super::ids::{is_valid_long_rd_id, is_valid_network_id, is_valid_short_rd_id};
use super::peers::MAX_PEERS;

/// Random access resource lengths are 7-bit
const RAR_LENGTH_MAX: u8 = 0x7F;

/// Device role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Role {
    /// Fixed termination, beacons and accepts associations
    Ft,
    /// Portable termination, scans for and associates with an FT
    Pt,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub role: Role,

    /// Network ID, required for an FT. A PT adopts the ID of the FT it
    /// associates with.
    pub network_id: u32,

    /// Long RD ID of this device
    pub long_rd_id: u32,

    /// Short RD ID of this device, carried in PHY control fields
    pub short_rd_id: u16,

    /// Transmit network and cluster beacons (always on for an FT)
    pub beaconing: bool,

    /// Beaconing channel, selected from channel evaluations on start if unset
    pub operating_channel: Option<ChannelId>,

    /// Interval at which a selected operating channel is selected again from
    /// fresh evaluations, `None` to keep the first choice
    pub channel_reselection_us: Option<Ts>,

    pub network_beacon_period: NetworkBeaconPeriod,

    pub cluster_beacon_period: ClusterBeaconPeriod,

    /// Subslots occupied by each transmission, at most `PacketLength::MAX`
    pub tx_subslots: u8,

    /// Random access resource length advertised in cluster beacons, in
    /// subslots. Must hold a whole transmission.
    pub rach_subslots: u8,

    /// Transmit power in dBm
    pub tx_power_dbm: i8,

    /// Data field MCS index
    pub mcs: u8,

    /// Time to wait for an association response in microseconds
    pub association_timeout_us: Ts,

    /// Attempts per FT candidate before it is no longer considered
    pub max_association_attempts: u8,

    /// Interval between keep-alive transmissions from an associated PT
    pub keep_alive_us: Ts,

    /// Association ends when nothing is heard from the peer for this long
    pub keep_alive_timeout_us: Ts,

    /// Minimum beacon RSSI for an FT candidate to be eligible
    pub candidate_rssi_threshold: i16,

    /// Candidates not heard from for this long are forgotten
    pub candidate_expiry_us: Ts,

    /// Frames received below this RSSI are dropped
    pub rssi_floor: i16,

    /// Number of PTs an FT will admit
    pub max_peers: usize,

    /// Reject timer sent when an FT has no capacity
    pub reject_timer: RejectTimer,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            role: Role::Pt,
            network_id: 0,
            long_rd_id: 0x0000_0001,
            short_rd_id: 0x0001,

            beaconing: false,
            operating_channel: None,
            channel_reselection_us: Some(300 * 1000 * 1000),
            network_beacon_period: NetworkBeaconPeriod::Ms1000,
            cluster_beacon_period: ClusterBeaconPeriod::Ms100,

            tx_subslots: 2,
            rach_subslots: 4,
            tx_power_dbm: 10,
            mcs: 2,

            association_timeout_us: 50 * 1000,
            max_association_attempts: 3,
            keep_alive_us: 1000 * 1000,
            keep_alive_timeout_us: 3 * 1000 * 1000,

            candidate_rssi_threshold: -85,
            candidate_expiry_us: 5 * 1000 * 1000,
            rssi_floor: -100,

            max_peers: MAX_PEERS,
            reject_timer: RejectTimer::S10,
        }
    }
}

impl Config {
    /// FT configuration with beaconing enabled
    pub fn ft(network_id: u32, long_rd_id: u32, short_rd_id: u16) -> Self {
        Self { role: Role::Ft, network_id, long_rd_id, short_rd_id, beaconing: true, ..Default::default() }
    }

    /// PT configuration
    pub fn pt(long_rd_id: u32, short_rd_id: u16) -> Self {
        Self { role: Role::Pt, long_rd_id, short_rd_id, ..Default::default() }
    }

    pub fn network_beacon_period_us(&self) -> Ts {
        self.network_beacon_period.us()
    }

    pub fn cluster_beacon_period_us(&self) -> Ts {
        self.cluster_beacon_period.us()
    }

    /// Whether beacons are transmitted in this configuration
    pub fn beacons(&self) -> bool {
        self.role == Role::Ft || self.beaconing
    }

    /// Check identifiers and limits
    pub fn validate(&self) -> bool {
        let ids = is_valid_long_rd_id(self.long_rd_id) && is_valid_short_rd_id(self.short_rd_id);
        let network = self.role == Role::Pt || is_valid_network_id(self.network_id);
        let limits = (1..=PacketLength::MAX).contains(&self.tx_subslots)
            && self.max_peers <= MAX_PEERS
            && self.channel_reselection_us != Some(0);
        let rach = !self.beacons() || (self.tx_subslots..=RAR_LENGTH_MAX).contains(&self.rach_subslots);

        ids && network && limits && rach
    }
}
