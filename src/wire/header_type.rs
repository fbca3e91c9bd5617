
use strum::{EnumIter, FromRepr};

use super::{Reader, Wire, Writer};
use crate::error::{DecodeError, EncodeError};

pub const VERSION_MASK: u8 = 0b1100_0000;
pub const VERSION_SHIFT: u8 = 6;
pub const SECURITY_MASK: u8 = 0b0011_0000;
pub const SECURITY_SHIFT: u8 = 4;
pub const KIND_MASK: u8 = 0b0000_1111;

/// Only MAC version 0 is defined
pub const MAC_VERSION: u8 = 0;

/// MAC security field
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, FromRepr)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Security {
    NotUsed = 0b00,
    /// MAC security in use, no security IE present
    UsedNoIe = 0b01,
    /// MAC security in use, security IE follows
    UsedWithIe = 0b10,
}

/// Type of the common header following the header type octet
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, FromRepr)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum HeaderKind {
    DataMacPdu = 0b0000,
    Beacon = 0b0001,
    Unicast = 0b0010,
    RdBroadcast = 0b0011,
    /// Escape, no common header defined
    Escape = 0b1111,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MacHeaderType {
    pub security: Security,
    pub kind: HeaderKind,
}

impl MacHeaderType {
    pub fn new(kind: HeaderKind) -> Self {
        Self { security: Security::NotUsed, kind }
    }
}

impl Wire for MacHeaderType {
    const NAME: &'static str = "mac_header_type";

    fn encoded_len(&self) -> usize {
        1
    }

    fn encode(&self, buf: &mut [u8]) -> Result<usize, EncodeError> {
        let mut w = Writer::new(buf, 1)?;
        w.u8((MAC_VERSION << VERSION_SHIFT) | ((self.security as u8) << SECURITY_SHIFT) | self.kind as u8)?;
        Ok(w.finish())
    }

    fn decode(buf: &[u8]) -> Result<(Self, usize), DecodeError> {
        let mut r = Reader::new(buf);
        let b = r.u8(Self::NAME)?;

        let version = (b & VERSION_MASK) >> VERSION_SHIFT;
        if version != MAC_VERSION {
            return Err(DecodeError::invalid("version", 0, version as u32));
        }

        let security = r.code("security", (b & SECURITY_MASK) >> SECURITY_SHIFT, Security::from_repr)?;
        let kind = r.code("header_type", b & KIND_MASK, HeaderKind::from_repr)?;

        Ok((Self { security, kind }, r.offset()))
    }
}

#[cfg(test)]
mod test {
    use strum::IntoEnumIterator;

    use super::*;
    use crate::error::DecodeErrorKind;
    use crate::wire::test_util::round_trip;

    #[test]
    fn header_type_round_trip() {
        for security in Security::iter() {
            for kind in HeaderKind::iter() {
                round_trip(&MacHeaderType { security, kind });
            }
        }
    }

    #[test]
    fn header_type_layout() {
        let h = MacHeaderType { security: Security::UsedWithIe, kind: HeaderKind::Unicast };
        let mut b = [0u8; 1];
        h.encode(&mut b).unwrap();
        assert_eq!(b[0], 0b0010_0010);
    }

    #[test]
    fn unknown_header_type_rejected() {
        for code in [0b0100u8, 0b0111, 0b1110] {
            let e = MacHeaderType::decode(&[code]).unwrap_err();
            assert_eq!(e.field, "header_type");
            assert_eq!(e.kind, DecodeErrorKind::UnknownCode(code));
        }

        // Reserved security code
        let e = MacHeaderType::decode(&[0b0011_0001]).unwrap_err();
        assert_eq!(e.kind, DecodeErrorKind::UnknownCode(0b11));

        // Non-zero version
        let e = MacHeaderType::decode(&[0b0100_0001]).unwrap_err();
        assert_eq!(e.field, "version");
    }

    #[test]
    fn empty_buffer_rejected() {
        assert!(MacHeaderType::decode(&[]).is_err());
    }
}
