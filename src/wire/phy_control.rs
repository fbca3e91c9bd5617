//! Physical layer control fields

use super::{Reader, Wire, Writer};
use crate::error::{DecodeError, EncodeError};

pub const FORMAT_MASK: u8 = 0b1110_0000;
pub const FORMAT_SHIFT: u8 = 5;
pub const LENGTH_TYPE_BIT: u8 = 0b0001_0000;
pub const LENGTH_MASK: u8 = 0b0000_1111;

const FORMAT_TYPE_1: u8 = 0b000;
const FORMAT_TYPE_2: u8 = 0b001;

/// Transmit power field code to dBm
const TX_POWER_DBM: [i8; 16] = [-40, -30, -20, -16, -12, -8, -4, 0, 4, 7, 10, 13, 16, 19, 21, 23];

/// Power in dBm for a 4-bit transmit power code
pub fn tx_power_dbm(code: u8) -> i8 {
    TX_POWER_DBM[(code & 0x0F) as usize]
}

/// Largest transmit power code not exceeding `dbm`, saturating at the table ends
pub fn tx_power_code(dbm: i8) -> u8 {
    TX_POWER_DBM.iter().rposition(|p| *p <= dbm).unwrap_or(0) as u8
}

/// Unit of the packet length field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LengthUnit {
    Subslots,
    Slots,
}

/// Packet length, 1 to 16 subslots or slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PacketLength {
    pub unit: LengthUnit,
    pub count: u8,
}

impl PacketLength {
    pub const MAX: u8 = 16;

    pub fn subslots(count: u8) -> Self {
        Self { unit: LengthUnit::Subslots, count: count.clamp(1, Self::MAX) }
    }

    fn to_bits(self) -> u8 {
        let t = match self.unit {
            LengthUnit::Subslots => 0,
            LengthUnit::Slots => LENGTH_TYPE_BIT,
        };
        t | (self.count.clamp(1, Self::MAX) - 1)
    }

    fn from_bits(b: u8) -> Self {
        let unit = match b & LENGTH_TYPE_BIT != 0 {
            true => LengthUnit::Slots,
            false => LengthUnit::Subslots,
        };
        Self { unit, count: (b & LENGTH_MASK) + 1 }
    }
}

/// Fields common to both control field types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PhyControlCommon {
    pub packet_length: PacketLength,
    /// Eight least significant bits of the network ID
    pub short_network_id: u8,
    /// Short RD ID of the transmitter
    pub transmitter_identity: u16,
    /// 4-bit transmit power code
    pub transmit_power: u8,
    /// 4-bit MCS index
    pub df_mcs: u8,
}

impl PhyControlCommon {
    fn write(&self, w: &mut Writer, format: u8) -> Result<(), EncodeError> {
        w.u8(format << FORMAT_SHIFT | self.packet_length.to_bits())?;
        w.u8(self.short_network_id)?;
        w.u16(self.transmitter_identity)?;
        w.u8((self.transmit_power & 0x0F) << 4 | self.df_mcs & 0x0F)
    }

    fn read(r: &mut Reader, format: u8) -> Result<Self, DecodeError> {
        let b0 = r.u8("header_format")?;
        let f = (b0 & FORMAT_MASK) >> FORMAT_SHIFT;
        if f != format {
            return Err(DecodeError::unknown("header_format", 0, f));
        }

        let short_network_id = r.u8("short_network_id")?;
        let transmitter_identity = r.u16("transmitter_identity")?;
        let b4 = r.u8("transmit_power")?;

        Ok(Self {
            packet_length: PacketLength::from_bits(b0),
            short_network_id,
            transmitter_identity,
            transmit_power: b4 >> 4,
            df_mcs: b4 & 0x0F,
        })
    }
}

/// Type 1 control field, broadcast transmissions without feedback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PhyControlFieldType1 {
    pub common: PhyControlCommon,
}

impl PhyControlFieldType1 {
    pub const LEN: usize = 5;
}

impl Wire for PhyControlFieldType1 {
    const NAME: &'static str = "phy_control_field_type_1";

    fn encoded_len(&self) -> usize {
        Self::LEN
    }

    fn encode(&self, buf: &mut [u8]) -> Result<usize, EncodeError> {
        let mut w = Writer::new(buf, Self::LEN)?;
        self.common.write(&mut w, FORMAT_TYPE_1)?;
        Ok(w.finish())
    }

    fn decode(buf: &[u8]) -> Result<(Self, usize), DecodeError> {
        let mut r = Reader::new(buf);
        let common = PhyControlCommon::read(&mut r, FORMAT_TYPE_1)?;
        Ok((Self { common }, r.offset()))
    }
}

/// Type 2 control field, unicast transmissions with HARQ feedback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PhyControlFieldType2 {
    pub common: PhyControlCommon,
    /// Short RD ID of the receiver
    pub receiver_identity: u16,
    /// 2-bit number of spatial streams code
    pub spatial_streams: u8,
    /// 4-bit feedback format
    pub feedback_format: u8,
    /// 12-bit feedback info
    pub feedback_info: u16,
}

impl PhyControlFieldType2 {
    pub const LEN: usize = 10;
}

impl Wire for PhyControlFieldType2 {
    const NAME: &'static str = "phy_control_field_type_2";

    fn encoded_len(&self) -> usize {
        Self::LEN
    }

    fn encode(&self, buf: &mut [u8]) -> Result<usize, EncodeError> {
        let mut w = Writer::new(buf, Self::LEN)?;
        self.common.write(&mut w, FORMAT_TYPE_2)?;
        w.u16(self.receiver_identity)?;
        w.u8((self.spatial_streams & 0b11) << 6)?;
        w.u8((self.feedback_format & 0x0F) << 4 | ((self.feedback_info >> 8) as u8 & 0x0F))?;
        w.u8(self.feedback_info as u8)?;
        Ok(w.finish())
    }

    fn decode(buf: &[u8]) -> Result<(Self, usize), DecodeError> {
        let mut r = Reader::new(buf);
        let common = PhyControlCommon::read(&mut r, FORMAT_TYPE_2)?;
        let receiver_identity = r.u16("receiver_identity")?;
        let spatial_streams = r.u8("spatial_streams")? >> 6;
        let b8 = r.u8("feedback_format")?;
        let b9 = r.u8("feedback_info")?;

        let f = Self {
            common,
            receiver_identity,
            spatial_streams,
            feedback_format: b8 >> 4,
            feedback_info: ((b8 & 0x0F) as u16) << 8 | b9 as u16,
        };
        Ok((f, r.offset()))
    }
}

/// Either control field type, selected by the header format bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PhyControlField {
    Type1(PhyControlFieldType1),
    Type2(PhyControlFieldType2),
}

impl PhyControlField {
    pub fn common(&self) -> &PhyControlCommon {
        match self {
            PhyControlField::Type1(f) => &f.common,
            PhyControlField::Type2(f) => &f.common,
        }
    }
}

impl Wire for PhyControlField {
    const NAME: &'static str = "phy_control_field";

    fn encoded_len(&self) -> usize {
        match self {
            PhyControlField::Type1(f) => f.encoded_len(),
            PhyControlField::Type2(f) => f.encoded_len(),
        }
    }

    fn encode(&self, buf: &mut [u8]) -> Result<usize, EncodeError> {
        match self {
            PhyControlField::Type1(f) => f.encode(buf),
            PhyControlField::Type2(f) => f.encode(buf),
        }
    }

    fn decode(buf: &[u8]) -> Result<(Self, usize), DecodeError> {
        let b0 = Reader::new(buf).u8("header_format")?;
        match (b0 & FORMAT_MASK) >> FORMAT_SHIFT {
            FORMAT_TYPE_1 => PhyControlFieldType1::decode(buf).map(|(f, n)| (PhyControlField::Type1(f), n)),
            FORMAT_TYPE_2 => PhyControlFieldType2::decode(buf).map(|(f, n)| (PhyControlField::Type2(f), n)),
            f => Err(DecodeError::unknown("header_format", 0, f)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::wire::test_util::{assert_truncation_fails, round_trip};

    fn common() -> PhyControlCommon {
        PhyControlCommon {
            packet_length: PacketLength { unit: LengthUnit::Slots, count: 16 },
            short_network_id: 0x40,
            transmitter_identity: 0xBEEF,
            transmit_power: 11,
            df_mcs: 9,
        }
    }

    #[test]
    fn type_1_layout() {
        let f = PhyControlFieldType1 { common: common() };
        let mut b = [0u8; 5];
        f.encode(&mut b).unwrap();
        assert_eq!(b, [0x1F, 0x40, 0xBE, 0xEF, 0xB9]);

        round_trip(&f);
        round_trip(&PhyControlFieldType1 { common: PhyControlCommon { packet_length: PacketLength::subslots(1), ..common() } });
        assert_truncation_fails(&f);
    }

    #[test]
    fn type_2_round_trip() {
        let f = PhyControlFieldType2 {
            common: common(),
            receiver_identity: 0x1234,
            spatial_streams: 0b10,
            feedback_format: 0x5,
            feedback_info: 0xABC,
        };

        let mut b = [0u8; 10];
        f.encode(&mut b).unwrap();
        assert_eq!(b[0] >> 5, 0b001);
        assert_eq!(&b[7..], &[0x80, 0x5A, 0xBC]);

        round_trip(&f);
        assert_truncation_fails(&f);
    }

    #[test]
    fn dispatch_on_header_format() {
        let f1 = PhyControlField::Type1(PhyControlFieldType1 { common: common() });
        assert_eq!(round_trip(&f1).common(), &common());

        let f2 = PhyControlField::Type2(PhyControlFieldType2 {
            common: common(),
            receiver_identity: 1,
            spatial_streams: 0,
            feedback_format: 0,
            feedback_info: 0,
        });
        round_trip(&f2);

        // Reserved header formats
        let mut b = [0u8; 10];
        f1.encode(&mut b).unwrap();
        b[0] |= 0b0100_0000;
        assert_eq!(PhyControlField::decode(&b).unwrap_err().field, "header_format");

        // Type mismatch
        let mut b = [0u8; 10];
        f2.encode(&mut b).unwrap();
        assert!(PhyControlFieldType1::decode(&b).is_err());
    }

    #[test]
    fn tx_power_table() {
        assert_eq!(tx_power_dbm(0), -40);
        assert_eq!(tx_power_dbm(7), 0);
        assert_eq!(tx_power_dbm(15), 23);
        assert_eq!(tx_power_code(0), 7);
        assert_eq!(tx_power_code(5), 8);
        assert_eq!(tx_power_code(-100), 0);
        assert_eq!(tx_power_code(30), 15);
    }
}
