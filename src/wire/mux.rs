//! MAC multiplexing header
// Octet 0: MAC extension (bits 7-6), length bit (5), IE type (4-0).
// Explicit length forms append an 8 or 16 bit SDU length.

use strum::{EnumIter, FromRepr, IntoStaticStr};

use super::{Reader, Wire, Writer};
use crate::error::{DecodeError, EncodeError};

pub const EXT_MASK: u8 = 0b1100_0000;
pub const EXT_SHIFT: u8 = 6;
pub const LENGTH_BIT: u8 = 0b0010_0000;
pub const IE_TYPE_MASK: u8 = 0b0001_1111;

const EXT_NO_LENGTH: u8 = 0b00;
const EXT_LENGTH_8: u8 = 0b01;
const EXT_LENGTH_16: u8 = 0b10;
const EXT_SHORT: u8 = 0b11;

/// IE type codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, FromRepr, IntoStaticStr)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[strum(serialize_all = "snake_case")]
#[repr(u8)]
pub enum IeType {
    Padding = 0,
    KeepAlive = 2,
    NetworkBeacon = 8,
    ClusterBeacon = 9,
    AssociationRequest = 10,
    AssociationResponse = 11,
    AssociationRelease = 12,
    RandomAccessResource = 19,
    RdCapability = 20,
    AssociationControl = 27,
}

impl IeType {
    /// SDU length implied by the IE type, `None` for variable-length IEs
    /// which then extend to the end of the frame
    pub fn implied_len(&self) -> Option<usize> {
        match self {
            IeType::KeepAlive => Some(0),
            IeType::AssociationRelease | IeType::AssociationControl => Some(1),
            IeType::RdCapability => Some(super::RdCapabilityIe::LEN),
            IeType::Padding
            | IeType::NetworkBeacon
            | IeType::ClusterBeacon
            | IeType::AssociationRequest
            | IeType::AssociationResponse
            | IeType::RandomAccessResource => None,
        }
    }

    /// Field name used in decode errors
    pub fn name(&self) -> &'static str {
        self.into()
    }
}

/// SDU length signalling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MacExt {
    /// No length field, length implied by the IE type or the frame end
    NoLength,
    Length8(u8),
    Length16(u16),
    /// Short form, no payload or a single payload octet
    Short { payload: bool },
}

/// Multiplexing header preceding each SDU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MuxHeader {
    pub ext: MacExt,
    pub ie_type: IeType,
}

impl MuxHeader {
    /// Pick the most compact header for an SDU of `len` octets,
    /// `last` allows a variable length SDU to run to the end of the frame
    pub fn for_sdu(ie_type: IeType, len: usize, last: bool) -> Result<Self, EncodeError> {
        let ext = match (len, ie_type.implied_len()) {
            (0, _) => MacExt::Short { payload: false },
            (1, _) => MacExt::Short { payload: true },
            (n, Some(m)) if n == m => MacExt::NoLength,
            (_, None) if last => MacExt::NoLength,
            (n, _) if n <= u8::MAX as usize => MacExt::Length8(n as u8),
            (n, _) if n <= u16::MAX as usize => MacExt::Length16(n as u16),
            _ => return Err(EncodeError::TooManyElements),
        };
        Ok(Self { ext, ie_type })
    }

    /// Split a mux header and its SDU from the front of `buf`.
    ///
    /// Returns the header, the SDU and the total octets consumed. With no
    /// length field and a variable-length IE type the SDU is the whole
    /// remainder of the frame, so it must be the final SDU. Padding may
    /// have an empty remainder.
    pub fn split(buf: &[u8]) -> Result<(Self, &[u8], usize), DecodeError> {
        let (h, n) = Self::decode(buf)?;
        let rest = &buf[n..];

        let len = match (h.ext, h.ie_type.implied_len()) {
            (MacExt::NoLength, Some(len)) => len,
            (MacExt::NoLength, None) if rest.is_empty() && h.ie_type != IeType::Padding => {
                return Err(DecodeError::truncated(h.ie_type.name(), n, 1, 0));
            },
            (MacExt::NoLength, None) => rest.len(),
            (MacExt::Length8(l), _) => l as usize,
            (MacExt::Length16(l), _) => l as usize,
            (MacExt::Short { payload }, _) => payload as usize,
        };

        if rest.len() < len {
            return Err(DecodeError::truncated(h.ie_type.name(), n, len, rest.len()));
        }

        Ok((h, &rest[..len], n + len))
    }
}

impl Wire for MuxHeader {
    const NAME: &'static str = "mux_header";

    fn encoded_len(&self) -> usize {
        match self.ext {
            MacExt::NoLength | MacExt::Short { .. } => 1,
            MacExt::Length8(_) => 2,
            MacExt::Length16(_) => 3,
        }
    }

    fn encode(&self, buf: &mut [u8]) -> Result<usize, EncodeError> {
        let mut w = Writer::new(buf, self.encoded_len())?;
        let t = self.ie_type as u8;

        match self.ext {
            MacExt::NoLength => w.u8(EXT_NO_LENGTH << EXT_SHIFT | t)?,
            MacExt::Length8(l) => {
                w.u8(EXT_LENGTH_8 << EXT_SHIFT | t)?;
                w.u8(l)?;
            },
            MacExt::Length16(l) => {
                w.u8(EXT_LENGTH_16 << EXT_SHIFT | t)?;
                w.u16(l)?;
            },
            MacExt::Short { payload } => {
                let len = if payload { LENGTH_BIT } else { 0 };
                w.u8(EXT_SHORT << EXT_SHIFT | len | t)?;
            },
        }

        Ok(w.finish())
    }

    fn decode(buf: &[u8]) -> Result<(Self, usize), DecodeError> {
        let mut r = Reader::new(buf);

        let b = r.u8(Self::NAME)?;
        let ie_type = r.code("ie_type", b & IE_TYPE_MASK, IeType::from_repr)?;
        let length_bit = b & LENGTH_BIT != 0;

        let ext = match (b & EXT_MASK) >> EXT_SHIFT {
            EXT_SHORT => MacExt::Short { payload: length_bit },
            _ if length_bit => return Err(DecodeError::invalid("mux_length_bit", 0, 1)),
            EXT_NO_LENGTH => MacExt::NoLength,
            EXT_LENGTH_8 => MacExt::Length8(r.u8("sdu_length")?),
            _ => MacExt::Length16(r.u16("sdu_length")?),
        };

        Ok((Self { ext, ie_type }, r.offset()))
    }
}
