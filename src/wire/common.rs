
use super::{HeaderKind, Reader, Wire, Writer};
use crate::error::{DecodeError, EncodeError};

pub const RESET_MASK: u8 = 0b0001_0000;
pub const SEQ_HIGH_MASK: u8 = 0b0000_1111;

/// Sequence numbers are 12 bits wide
pub const SEQ_MASK: u16 = 0x0FFF;

/// Beacon header, carries the 24 most significant bits of the network ID
/// (the remaining 8 are the short network ID in the PHY control field)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BeaconHeader {
    pub network_id_msb: u32,
    /// Long RD ID of the transmitter
    pub transmitter: u32,
}

impl BeaconHeader {
    pub const LEN: usize = 7;

    /// Build from a full 32-bit network ID
    pub fn new(network_id: u32, transmitter: u32) -> Self {
        Self { network_id_msb: network_id >> 8, transmitter }
    }

    /// Reassemble the full network ID from the PHY short network ID
    pub fn network_id(&self, short_network_id: u8) -> u32 {
        (self.network_id_msb << 8) | short_network_id as u32
    }
}

impl Wire for BeaconHeader {
    const NAME: &'static str = "beacon_header";

    fn encoded_len(&self) -> usize {
        Self::LEN
    }

    fn encode(&self, buf: &mut [u8]) -> Result<usize, EncodeError> {
        let mut w = Writer::new(buf, Self::LEN)?;
        w.u24(self.network_id_msb)?;
        w.u32(self.transmitter)?;
        Ok(w.finish())
    }

    fn decode(buf: &[u8]) -> Result<(Self, usize), DecodeError> {
        let mut r = Reader::new(buf);
        let network_id_msb = r.u24("network_id")?;
        let transmitter = r.u32("transmitter_address")?;
        Ok((Self { network_id_msb, transmitter }, r.offset()))
    }
}

fn write_seq(w: &mut Writer, reset: bool, seq: u16) -> Result<(), EncodeError> {
    let mut b0 = ((seq >> 8) as u8) & SEQ_HIGH_MASK;
    if reset {
        b0 |= RESET_MASK;
    }
    w.u8(b0)?;
    w.u8(seq as u8)
}

fn read_seq(r: &mut Reader) -> Result<(bool, u16), DecodeError> {
    let b0 = r.u8("sequence_number")?;
    let b1 = r.u8("sequence_number")?;
    Ok((b0 & RESET_MASK != 0, ((b0 & SEQ_HIGH_MASK) as u16) << 8 | b1 as u16))
}

/// Unicast header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UnicastHeader {
    pub reset: bool,
    /// 12-bit sequence number
    pub seq: u16,
    /// Long RD ID of the receiver
    pub receiver: u32,
    /// Long RD ID of the transmitter
    pub transmitter: u32,
}

impl UnicastHeader {
    pub const LEN: usize = 10;
}

impl Wire for UnicastHeader {
    const NAME: &'static str = "unicast_header";

    fn encoded_len(&self) -> usize {
        Self::LEN
    }

    fn encode(&self, buf: &mut [u8]) -> Result<usize, EncodeError> {
        let mut w = Writer::new(buf, Self::LEN)?;
        write_seq(&mut w, self.reset, self.seq)?;
        w.u32(self.receiver)?;
        w.u32(self.transmitter)?;
        Ok(w.finish())
    }

    fn decode(buf: &[u8]) -> Result<(Self, usize), DecodeError> {
        let mut r = Reader::new(buf);
        let (reset, seq) = read_seq(&mut r)?;
        let receiver = r.u32("receiver_address")?;
        let transmitter = r.u32("transmitter_address")?;
        Ok((Self { reset, seq, receiver, transmitter }, r.offset()))
    }
}

/// RD broadcast header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RdBroadcastHeader {
    pub reset: bool,
    pub seq: u16,
    pub transmitter: u32,
}

impl RdBroadcastHeader {
    pub const LEN: usize = 6;
}

impl Wire for RdBroadcastHeader {
    const NAME: &'static str = "rd_broadcast_header";

    fn encoded_len(&self) -> usize {
        Self::LEN
    }

    fn encode(&self, buf: &mut [u8]) -> Result<usize, EncodeError> {
        let mut w = Writer::new(buf, Self::LEN)?;
        write_seq(&mut w, self.reset, self.seq)?;
        w.u32(self.transmitter)?;
        Ok(w.finish())
    }

    fn decode(buf: &[u8]) -> Result<(Self, usize), DecodeError> {
        let mut r = Reader::new(buf);
        let (reset, seq) = read_seq(&mut r)?;
        let transmitter = r.u32("transmitter_address")?;
        Ok((Self { reset, seq, transmitter }, r.offset()))
    }
}

/// DATA MAC PDU header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DataPduHeader {
    pub reset: bool,
    pub seq: u16,
}

impl DataPduHeader {
    pub const LEN: usize = 2;
}

impl Wire for DataPduHeader {
    const NAME: &'static str = "data_pdu_header";

    fn encoded_len(&self) -> usize {
        Self::LEN
    }

    fn encode(&self, buf: &mut [u8]) -> Result<usize, EncodeError> {
        let mut w = Writer::new(buf, Self::LEN)?;
        write_seq(&mut w, self.reset, self.seq)?;
        Ok(w.finish())
    }

    fn decode(buf: &[u8]) -> Result<(Self, usize), DecodeError> {
        let mut r = Reader::new(buf);
        let (reset, seq) = read_seq(&mut r)?;
        Ok((Self { reset, seq }, r.offset()))
    }
}

/// Common header, selected by the header type octet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommonHeader {
    Data(DataPduHeader),
    Beacon(BeaconHeader),
    Unicast(UnicastHeader),
    RdBroadcast(RdBroadcastHeader),
}

impl CommonHeader {
    pub fn kind(&self) -> HeaderKind {
        match self {
            CommonHeader::Data(_) => HeaderKind::DataMacPdu,
            CommonHeader::Beacon(_) => HeaderKind::Beacon,
            CommonHeader::Unicast(_) => HeaderKind::Unicast,
            CommonHeader::RdBroadcast(_) => HeaderKind::RdBroadcast,
        }
    }

    /// Long RD ID of the transmitter, where carried
    pub fn transmitter(&self) -> Option<u32> {
        match self {
            CommonHeader::Data(_) => None,
            CommonHeader::Beacon(h) => Some(h.transmitter),
            CommonHeader::Unicast(h) => Some(h.transmitter),
            CommonHeader::RdBroadcast(h) => Some(h.transmitter),
        }
    }

    pub fn encoded_len(&self) -> usize {
        match self {
            CommonHeader::Data(h) => h.encoded_len(),
            CommonHeader::Beacon(h) => h.encoded_len(),
            CommonHeader::Unicast(h) => h.encoded_len(),
            CommonHeader::RdBroadcast(h) => h.encoded_len(),
        }
    }

    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, EncodeError> {
        match self {
            CommonHeader::Data(h) => h.encode(buf),
            CommonHeader::Beacon(h) => h.encode(buf),
            CommonHeader::Unicast(h) => h.encode(buf),
            CommonHeader::RdBroadcast(h) => h.encode(buf),
        }
    }

    /// Decode the common header announced by `kind`
    pub fn decode(kind: HeaderKind, buf: &[u8]) -> Result<(Self, usize), DecodeError> {
        match kind {
            HeaderKind::DataMacPdu => DataPduHeader::decode(buf).map(|(h, n)| (CommonHeader::Data(h), n)),
            HeaderKind::Beacon => BeaconHeader::decode(buf).map(|(h, n)| (CommonHeader::Beacon(h), n)),
            HeaderKind::Unicast => UnicastHeader::decode(buf).map(|(h, n)| (CommonHeader::Unicast(h), n)),
            HeaderKind::RdBroadcast => RdBroadcastHeader::decode(buf).map(|(h, n)| (CommonHeader::RdBroadcast(h), n)),
            HeaderKind::Escape => Err(DecodeError::unknown("header_type", 0, HeaderKind::Escape as u8)),
        }
    }
}
