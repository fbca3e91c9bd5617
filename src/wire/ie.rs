//! MAC information elements

use super::{Reader, Wire, Writer};
use crate::error::{DecodeError, EncodeError};

/// Association control IE, one octet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AssociationControlIe {
    /// Requester will receive cluster beacon messages
    pub cluster_beacon_monitoring: bool,
    /// 3-bit DL data reception code
    pub dl_data_reception: u8,
    /// 4-bit UL period code
    pub ul_period: u8,
}

impl Wire for AssociationControlIe {
    const NAME: &'static str = "association_control_ie";

    fn encoded_len(&self) -> usize {
        1
    }

    fn encode(&self, buf: &mut [u8]) -> Result<usize, EncodeError> {
        let mut w = Writer::new(buf, 1)?;
        let cb = if self.cluster_beacon_monitoring { 0x80 } else { 0 };
        w.u8(cb | (self.dl_data_reception & 0b111) << 4 | self.ul_period & 0x0F)?;
        Ok(w.finish())
    }

    fn decode(buf: &[u8]) -> Result<(Self, usize), DecodeError> {
        let mut r = Reader::new(buf);
        let b = r.u8(Self::NAME)?;
        let ie = Self {
            cluster_beacon_monitoring: b & 0x80 != 0,
            dl_data_reception: (b >> 4) & 0b111,
            ul_period: b & 0x0F,
        };
        Ok((ie, r.offset()))
    }
}

bitflags::bitflags! {
    /// RD capability feature flags (second octet)
    pub struct RdFeatures: u8 {
        const GROUP_ASSIGNMENT = 0b0010_0000;
        const PAGING           = 0b0001_0000;
        const MESH             = 0b0000_0010;
        const SCHEDULED_ACCESS = 0b0000_0001;
    }
}

/// RD capability IE
///
/// Fixed seven-octet form without additional PHY capability sets:
///
/// | octet | bits                                                        |
/// |-------|-------------------------------------------------------------|
/// | 0     | num PHY capabilities (3), release (5)                       |
/// | 1     | rsvd (2), group (1), paging (1), op modes (2), mesh, sched  |
/// | 2     | MAC security (3), DLC service type (3), rsvd (2)            |
/// | 3     | rsvd, RD power class (3), max NSS for RX (2), RX diversity (2) |
/// | 4     | RX gain (4), max MCS (4)                                    |
/// | 5     | soft buffer size (4), HARQ processes (2), rsvd (2)          |
/// | 6     | HARQ feedback delay (4), D delay, half duplex, rsvd (2)     |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RdCapabilityIe {
    pub num_phy_capabilities: u8,
    pub release: u8,
    #[cfg_attr(feature = "defmt", defmt(Debug2Format))]
    pub features: RdFeatures,
    pub operating_modes: u8,
    pub mac_security: u8,
    pub dlc_service_type: u8,
    pub rd_power_class: u8,
    pub max_nss_for_rx: u8,
    pub rx_for_tx_diversity: u8,
    pub rx_gain: u8,
    pub max_mcs: u8,
    pub soft_buffer_size: u8,
    pub harq_processes: u8,
    pub harq_feedback_delay: u8,
    pub d_delay: bool,
    pub half_duplex: bool,
}

impl Default for RdCapabilityIe {
    fn default() -> Self {
        Self {
            num_phy_capabilities: 0,
            release: 1,
            features: RdFeatures::empty(),
            operating_modes: 0,
            mac_security: 0,
            dlc_service_type: 0,
            rd_power_class: 0,
            max_nss_for_rx: 0,
            rx_for_tx_diversity: 0,
            rx_gain: 0,
            max_mcs: 2,
            soft_buffer_size: 0,
            harq_processes: 0,
            harq_feedback_delay: 0,
            d_delay: false,
            half_duplex: true,
        }
    }
}

/// PHY capability sets beyond the base set are not supported
pub const MAX_PHY_CAPABILITIES: u8 = 0;

impl RdCapabilityIe {
    pub const LEN: usize = 7;
}

impl Wire for RdCapabilityIe {
    const NAME: &'static str = "rd_capability_ie";

    fn encoded_len(&self) -> usize {
        Self::LEN
    }

    fn encode(&self, buf: &mut [u8]) -> Result<usize, EncodeError> {
        let mut w = Writer::new(buf, Self::LEN)?;

        w.u8((self.num_phy_capabilities & 0b111) << 5 | self.release & 0b1_1111)?;
        w.u8(self.features.bits() | (self.operating_modes & 0b11) << 2)?;
        w.u8((self.mac_security & 0b111) << 5 | (self.dlc_service_type & 0b111) << 2)?;
        w.u8((self.rd_power_class & 0b111) << 4 | (self.max_nss_for_rx & 0b11) << 2 | self.rx_for_tx_diversity & 0b11)?;
        w.u8((self.rx_gain & 0x0F) << 4 | self.max_mcs & 0x0F)?;
        w.u8((self.soft_buffer_size & 0x0F) << 4 | (self.harq_processes & 0b11) << 2)?;

        let mut b6 = (self.harq_feedback_delay & 0x0F) << 4;
        if self.d_delay {
            b6 |= 0b1000;
        }
        if self.half_duplex {
            b6 |= 0b0100;
        }
        w.u8(b6)?;

        Ok(w.finish())
    }

    fn decode(buf: &[u8]) -> Result<(Self, usize), DecodeError> {
        let mut r = Reader::new(buf);

        let b0 = r.u8("num_phy_capabilities")?;
        let num_phy_capabilities = b0 >> 5;
        if num_phy_capabilities > MAX_PHY_CAPABILITIES {
            return Err(DecodeError::invalid("num_phy_capabilities", 0, num_phy_capabilities as u32));
        }

        let b1 = r.u8("rd_features")?;
        let b2 = r.u8("mac_security")?;
        let b3 = r.u8("rd_power_class")?;
        let b4 = r.u8("rx_gain")?;
        let b5 = r.u8("soft_buffer_size")?;
        let b6 = r.u8("harq_feedback_delay")?;

        let ie = Self {
            num_phy_capabilities,
            release: b0 & 0b1_1111,
            features: RdFeatures::from_bits_truncate(b1),
            operating_modes: (b1 >> 2) & 0b11,
            mac_security: b2 >> 5,
            dlc_service_type: (b2 >> 2) & 0b111,
            rd_power_class: (b3 >> 4) & 0b111,
            max_nss_for_rx: (b3 >> 2) & 0b11,
            rx_for_tx_diversity: b3 & 0b11,
            rx_gain: b4 >> 4,
            max_mcs: b4 & 0x0F,
            soft_buffer_size: b5 >> 4,
            harq_processes: (b5 >> 2) & 0b11,
            harq_feedback_delay: b6 >> 4,
            d_delay: b6 & 0b1000 != 0,
            half_duplex: b6 & 0b0100 != 0,
        };

        Ok((ie, r.offset()))
    }
}

bitflags::bitflags! {
    /// Random access resource IE presence flags (first octet)
    pub struct RarFlags: u8 {
        const SFN              = 0b0000_0100;
        const CHANNEL          = 0b0000_0010;
        const SEPARATE_CHANNEL = 0b0000_0001;
    }
}

pub const RAR_REPEAT_MASK: u8 = 0b0001_1000;
pub const RAR_REPEAT_SHIFT: u8 = 3;
pub const LENGTH_IN_SLOTS: u8 = 0b1000_0000;

/// Resource repeats in following frames
pub const RAR_REPEAT_FRAMES: u8 = 1;
/// Resource repeats in following subslots
pub const RAR_REPEAT_SUBSLOTS: u8 = 2;
/// Validity of an allocation that does not end
pub const RAR_VALIDITY_PERMANENT: u8 = 0xFF;

/// Resource repetition, present when `repeat` is non-zero
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RarRepetition {
    /// 2-bit repeat type (frames or subslots), non-zero
    pub repeat: u8,
    pub repetition: u8,
    pub validity: u8,
}

/// Random access resource IE, advertises the contention resources an FT
/// listens on for association requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RandomAccessResourceIe {
    pub repetition: Option<RarRepetition>,
    pub sfn: Option<u8>,
    pub channel: Option<u16>,
    /// Channel for random access responses, when not the request channel
    pub separate_channel: Option<u16>,
    /// First subslot of the resource within the frame
    pub start_subslot: u8,
    /// Length is counted in slots rather than subslots
    pub length_in_slots: bool,
    /// 7-bit resource length
    pub length: u8,
    pub max_rach_length_in_slots: bool,
    /// 4-bit maximum single transmission length
    pub max_rach_length: u8,
    /// 3-bit minimum contention window code
    pub cw_min_sig: u8,
    pub dect_delay: bool,
    /// 4-bit response window length in subslots
    pub response_window: u8,
    /// 3-bit maximum contention window code
    pub cw_max_sig: u8,
}

impl RandomAccessResourceIe {
    pub const MIN_LEN: usize = 5;

    pub fn new(start_subslot: u8, length: u8) -> Self {
        Self {
            repetition: None,
            sfn: None,
            channel: None,
            separate_channel: None,
            start_subslot,
            length_in_slots: false,
            length,
            max_rach_length_in_slots: false,
            max_rach_length: 1,
            cw_min_sig: 0,
            dect_delay: false,
            response_window: 4,
            cw_max_sig: 7,
        }
    }

    /// Resource length in subslots
    pub fn length_subslots(&self, subslots_per_slot: u8) -> u32 {
        match self.length_in_slots {
            true => self.length as u32 * subslots_per_slot as u32,
            false => self.length as u32,
        }
    }
}

impl Wire for RandomAccessResourceIe {
    const NAME: &'static str = "random_access_resource_ie";

    fn encoded_len(&self) -> usize {
        Self::MIN_LEN
            + self.repetition.map_or(0, |_| 2)
            + self.sfn.map_or(0, |_| 1)
            + self.channel.map_or(0, |_| 2)
            + self.separate_channel.map_or(0, |_| 2)
    }

    fn encode(&self, buf: &mut [u8]) -> Result<usize, EncodeError> {
        let mut w = Writer::new(buf, self.encoded_len())?;

        let mut flags = RarFlags::empty();
        flags.set(RarFlags::SFN, self.sfn.is_some());
        flags.set(RarFlags::CHANNEL, self.channel.is_some());
        flags.set(RarFlags::SEPARATE_CHANNEL, self.separate_channel.is_some());
        let repeat = self.repetition.map_or(0, |r| r.repeat & 0b11);
        w.u8(repeat << RAR_REPEAT_SHIFT | flags.bits())?;

        w.u8(self.start_subslot)?;
        w.u8((if self.length_in_slots { LENGTH_IN_SLOTS } else { 0 }) | self.length & 0x7F)?;
        w.u8((if self.max_rach_length_in_slots { LENGTH_IN_SLOTS } else { 0 })
            | (self.max_rach_length & 0x0F) << 3
            | self.cw_min_sig & 0b111)?;
        w.u8((if self.dect_delay { 0x80 } else { 0 })
            | (self.response_window & 0x0F) << 3
            | self.cw_max_sig & 0b111)?;

        if let Some(r) = self.repetition {
            w.u8(r.repetition)?;
            w.u8(r.validity)?;
        }
        if let Some(s) = self.sfn {
            w.u8(s)?;
        }
        if let Some(c) = self.channel {
            w.channel(c)?;
        }
        if let Some(c) = self.separate_channel {
            w.channel(c)?;
        }

        Ok(w.finish())
    }

    fn decode(buf: &[u8]) -> Result<(Self, usize), DecodeError> {
        let mut r = Reader::new(buf);

        let b0 = r.u8("rar_flags")?;
        let flags = RarFlags::from_bits_truncate(b0);
        let repeat = (b0 & RAR_REPEAT_MASK) >> RAR_REPEAT_SHIFT;

        let start_subslot = r.u8("start_subslot")?;
        let b2 = r.u8("rar_length")?;
        let b3 = r.u8("max_rach_length")?;
        let b4 = r.u8("response_window")?;

        let repetition = match repeat {
            0 => None,
            repeat => Some(RarRepetition {
                repeat,
                repetition: r.u8("repetition")?,
                validity: r.u8("validity")?,
            }),
        };
        let sfn = match flags.contains(RarFlags::SFN) {
            true => Some(r.u8("sfn")?),
            false => None,
        };
        let channel = match flags.contains(RarFlags::CHANNEL) {
            true => Some(r.channel("channel")?),
            false => None,
        };
        let separate_channel = match flags.contains(RarFlags::SEPARATE_CHANNEL) {
            true => Some(r.channel("separate_channel")?),
            false => None,
        };

        let ie = Self {
            repetition,
            sfn,
            channel,
            separate_channel,
            start_subslot,
            length_in_slots: b2 & LENGTH_IN_SLOTS != 0,
            length: b2 & 0x7F,
            max_rach_length_in_slots: b3 & LENGTH_IN_SLOTS != 0,
            max_rach_length: (b3 >> 3) & 0x0F,
            cw_min_sig: b3 & 0b111,
            dect_delay: b4 & 0x80 != 0,
            response_window: (b4 >> 3) & 0x0F,
            cw_max_sig: b4 & 0b111,
        };

        Ok((ie, r.offset()))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::wire::test_util::{assert_truncation_fails, round_trip};

    #[test]
    fn association_control() {
        let ie = AssociationControlIe { cluster_beacon_monitoring: true, dl_data_reception: 5, ul_period: 9 };
        let mut b = [0u8; 1];
        ie.encode(&mut b).unwrap();
        assert_eq!(b[0], 0b1101_1001);

        round_trip(&ie);
        round_trip(&AssociationControlIe::default());
        assert!(AssociationControlIe::decode(&[]).is_err());
    }

    #[test]
    fn rd_capability() {
        let ie = RdCapabilityIe {
            num_phy_capabilities: 0,
            release: 0b1_0101,
            features: RdFeatures::PAGING | RdFeatures::MESH,
            operating_modes: 0b11,
            mac_security: 0b101,
            dlc_service_type: 0b011,
            rd_power_class: 0b110,
            max_nss_for_rx: 0b10,
            rx_for_tx_diversity: 0b01,
            rx_gain: 0xA,
            max_mcs: 0x7,
            soft_buffer_size: 0xC,
            harq_processes: 0b11,
            harq_feedback_delay: 0x9,
            d_delay: true,
            half_duplex: false,
        };

        round_trip(&ie);
        round_trip(&RdCapabilityIe::default());
        assert_truncation_fails(&ie);

        // Additional PHY capability sets are rejected
        let mut b = [0u8; 7];
        ie.encode(&mut b).unwrap();
        b[0] |= 0b0010_0000;
        assert_eq!(RdCapabilityIe::decode(&b).unwrap_err().field, "num_phy_capabilities");
    }

    #[test]
    fn random_access_resource() {
        let base = RandomAccessResourceIe::new(2, 4);
        assert_eq!(base.encoded_len(), 5);
        round_trip(&base);

        let full = RandomAccessResourceIe {
            repetition: Some(RarRepetition { repeat: 0b10, repetition: 4, validity: 0xFF }),
            sfn: Some(9),
            channel: Some(1665),
            separate_channel: Some(1666),
            length_in_slots: true,
            max_rach_length_in_slots: true,
            dect_delay: true,
            max_rach_length: 0xF,
            cw_min_sig: 3,
            cw_max_sig: 6,
            response_window: 0xF,
            ..RandomAccessResourceIe::new(0xFF, 0x7F)
        };
        assert_eq!(full.encoded_len(), 5 + 2 + 1 + 2 + 2);
        round_trip(&full);
        assert_truncation_fails(&full);

        round_trip(&RandomAccessResourceIe { sfn: None, channel: None, ..full });
    }
}
