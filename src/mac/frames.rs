
use crate::error::EncodeError;
use crate::wire::phy_control::{tx_power_code, PacketLength, PhyControlCommon};
use crate::wire::*;

use super::config::Config;
use super::ids::short_network_id;

fn phy_common(config: &Config, network_id: u32) -> PhyControlCommon {
    PhyControlCommon {
        packet_length: PacketLength::subslots(config.tx_subslots),
        short_network_id: short_network_id(network_id),
        transmitter_identity: config.short_rd_id,
        transmit_power: tx_power_code(config.tx_power_dbm),
        df_mcs: config.mcs,
    }
}

/// Broadcast control field, used for beacons
pub fn broadcast_control(config: &Config, network_id: u32) -> PhyControlField {
    PhyControlField::Type1(PhyControlFieldType1 { common: phy_common(config, network_id) })
}

/// Unicast control field addressed to `receiver` (short RD ID)
pub fn unicast_control(config: &Config, network_id: u32, receiver: u16) -> PhyControlField {
    PhyControlField::Type2(PhyControlFieldType2 {
        common: phy_common(config, network_id),
        receiver_identity: receiver,
        spatial_streams: 0,
        feedback_format: 0,
        feedback_info: 0,
    })
}

pub fn network_beacon(network_id: u32, transmitter: u32, m: NetworkBeaconMessage) -> Result<MacPdu, EncodeError> {
    MacPdu::new(CommonHeader::Beacon(BeaconHeader::new(network_id, transmitter))).with(Ie::NetworkBeacon(m))
}

/// Cluster beacon followed by the random access resources the FT listens on
pub fn cluster_beacon(network_id: u32, transmitter: u32, m: ClusterBeaconMessage, rach: RandomAccessResourceIe) -> Result<MacPdu, EncodeError> {
    MacPdu::new(CommonHeader::Beacon(BeaconHeader::new(network_id, transmitter)))
        .with(Ie::ClusterBeacon(m))?
        .with(Ie::RandomAccessResource(rach))
}

pub fn unicast(seq: u16, receiver: u32, transmitter: u32, ies: &[Ie]) -> Result<MacPdu, EncodeError> {
    let header = UnicastHeader { reset: false, seq, receiver, transmitter };

    let mut pdu = MacPdu::new(CommonHeader::Unicast(header));
    for ie in ies {
        pdu.push(ie.clone())?;
    }
    Ok(pdu)
}
