
use heapless::Vec;

use super::*;
use crate::error::{DecodeError, DecodeErrorKind, EncodeError};

/// Maximum number of IEs carried in one PDU
pub const MAX_IES: usize = 4;

/// Information element or message carried in a mux SDU
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Ie {
    KeepAlive,
    NetworkBeacon(NetworkBeaconMessage),
    ClusterBeacon(ClusterBeaconMessage),
    AssociationRequest(AssociationRequestMessage),
    AssociationResponse(AssociationResponseMessage),
    AssociationRelease(AssociationReleaseMessage),
    RandomAccessResource(RandomAccessResourceIe),
    RdCapability(RdCapabilityIe),
    AssociationControl(AssociationControlIe),
}

impl Ie {
    pub fn ie_type(&self) -> IeType {
        match self {
            Ie::KeepAlive => IeType::KeepAlive,
            Ie::NetworkBeacon(_) => IeType::NetworkBeacon,
            Ie::ClusterBeacon(_) => IeType::ClusterBeacon,
            Ie::AssociationRequest(_) => IeType::AssociationRequest,
            Ie::AssociationResponse(_) => IeType::AssociationResponse,
            Ie::AssociationRelease(_) => IeType::AssociationRelease,
            Ie::RandomAccessResource(_) => IeType::RandomAccessResource,
            Ie::RdCapability(_) => IeType::RdCapability,
            Ie::AssociationControl(_) => IeType::AssociationControl,
        }
    }

    pub fn encoded_len(&self) -> usize {
        match self {
            Ie::KeepAlive => 0,
            Ie::NetworkBeacon(m) => m.encoded_len(),
            Ie::ClusterBeacon(m) => m.encoded_len(),
            Ie::AssociationRequest(m) => m.encoded_len(),
            Ie::AssociationResponse(m) => m.encoded_len(),
            Ie::AssociationRelease(m) => m.encoded_len(),
            Ie::RandomAccessResource(m) => m.encoded_len(),
            Ie::RdCapability(m) => m.encoded_len(),
            Ie::AssociationControl(m) => m.encoded_len(),
        }
    }

    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, EncodeError> {
        match self {
            Ie::KeepAlive => Ok(0),
            Ie::NetworkBeacon(m) => m.encode(buf),
            Ie::ClusterBeacon(m) => m.encode(buf),
            Ie::AssociationRequest(m) => m.encode(buf),
            Ie::AssociationResponse(m) => m.encode(buf),
            Ie::AssociationRelease(m) => m.encode(buf),
            Ie::RandomAccessResource(m) => m.encode(buf),
            Ie::RdCapability(m) => m.encode(buf),
            Ie::AssociationControl(m) => m.encode(buf),
        }
    }

    /// Decode an SDU of the given type, the SDU must be consumed exactly.
    /// Padding yields `None`.
    pub fn decode(ie_type: IeType, sdu: &[u8]) -> Result<Option<Self>, DecodeError> {
        let ie = match ie_type {
            IeType::Padding => return Ok(None),
            IeType::KeepAlive => match sdu.len() {
                0 => Ie::KeepAlive,
                n => {
                    return Err(DecodeError {
                        field: IeType::KeepAlive.name(),
                        offset: 0,
                        kind: DecodeErrorKind::TrailingBytes(n),
                    })
                },
            },
            IeType::NetworkBeacon => Ie::NetworkBeacon(Wire::decode_exact(sdu)?),
            IeType::ClusterBeacon => Ie::ClusterBeacon(Wire::decode_exact(sdu)?),
            IeType::AssociationRequest => Ie::AssociationRequest(Wire::decode_exact(sdu)?),
            IeType::AssociationResponse => Ie::AssociationResponse(Wire::decode_exact(sdu)?),
            IeType::AssociationRelease => Ie::AssociationRelease(Wire::decode_exact(sdu)?),
            IeType::RandomAccessResource => Ie::RandomAccessResource(Wire::decode_exact(sdu)?),
            IeType::RdCapability => Ie::RdCapability(Wire::decode_exact(sdu)?),
            IeType::AssociationControl => Ie::AssociationControl(Wire::decode_exact(sdu)?),
        };
        Ok(Some(ie))
    }
}

/// MAC PDU: header type, common header and a sequence of mux-framed IEs
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MacPdu {
    pub security: Security,
    pub header: CommonHeader,
    pub ies: Vec<Ie, MAX_IES>,
}

impl MacPdu {
    pub fn new(header: CommonHeader) -> Self {
        Self { security: Security::NotUsed, header, ies: Vec::new() }
    }

    pub fn push(&mut self, ie: Ie) -> Result<(), EncodeError> {
        self.ies.push(ie).map_err(|_| EncodeError::TooManyElements)
    }

    pub fn with(mut self, ie: Ie) -> Result<Self, EncodeError> {
        self.push(ie)?;
        Ok(self)
    }

    pub fn header_type(&self) -> MacHeaderType {
        MacHeaderType { security: self.security, kind: self.header.kind() }
    }

    fn mux_header(&self, i: usize) -> Result<MuxHeader, EncodeError> {
        let ie = &self.ies[i];
        MuxHeader::for_sdu(ie.ie_type(), ie.encoded_len(), i + 1 == self.ies.len())
    }
}

impl Wire for MacPdu {
    const NAME: &'static str = "mac_pdu";

    fn encoded_len(&self) -> usize {
        let ies: usize = (0..self.ies.len())
            .map(|i| {
                let mux = self.mux_header(i).map_or(0, |h| h.encoded_len());
                mux + self.ies[i].encoded_len()
            })
            .sum();

        1 + self.header.encoded_len() + ies
    }

    fn encode(&self, buf: &mut [u8]) -> Result<usize, EncodeError> {
        let mut w = Writer::new(buf, self.encoded_len())?;

        w.nested(&self.header_type())?;
        w.nested_with(|b| self.header.encode(b))?;

        for (i, ie) in self.ies.iter().enumerate() {
            w.nested(&self.mux_header(i)?)?;
            w.nested_with(|b| ie.encode(b))?;
        }

        Ok(w.finish())
    }

    fn decode(buf: &[u8]) -> Result<(Self, usize), DecodeError> {
        let (header_type, mut offset) = MacHeaderType::decode(buf)?;

        let (header, n) = CommonHeader::decode(header_type.kind, &buf[offset..]).map_err(|e| e.at(offset))?;
        offset += n;

        let mut ies = Vec::new();
        while offset < buf.len() {
            let (mux, sdu, n) = MuxHeader::split(&buf[offset..]).map_err(|e| e.at(offset))?;

            // SDU starts after the mux header
            let sdu_offset = offset + n - sdu.len();
            if let Some(ie) = Ie::decode(mux.ie_type, sdu).map_err(|e| e.at(sdu_offset))? {
                ies.push(ie).map_err(|_| DecodeError::invalid("ie_count", offset, MAX_IES as u32 + 1))?;
            }

            offset += n;
        }

        Ok((Self { security: header_type.security, header, ies }, offset))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::wire::association::{RejectCause, RejectTimer, SetupCause};
    use crate::wire::test_util::round_trip;

    fn beacon_header() -> CommonHeader {
        CommonHeader::Beacon(BeaconHeader::new(0x1234_5678, 0xCAFE_0001))
    }

    fn unicast_header() -> CommonHeader {
        CommonHeader::Unicast(UnicastHeader { reset: true, seq: 12, receiver: 0xCAFE_0001, transmitter: 0x0000_0042 })
    }

    #[test]
    fn cluster_beacon_pdu() {
        let pdu = MacPdu::new(beacon_header())
            .with(Ie::ClusterBeacon(ClusterBeaconMessage::new(3, NetworkBeaconPeriod::Ms100, ClusterBeaconPeriod::Ms100))).unwrap()
            .with(Ie::RandomAccessResource(RandomAccessResourceIe::new(4, 2))).unwrap();

        // Type octet, beacon header, length-8 mux, beacon, implied mux, RAR
        assert_eq!(pdu.encoded_len(), 1 + 7 + 2 + 4 + 1 + 5);
        round_trip(&pdu);
    }

    #[test]
    fn association_pdu() {
        let pdu = MacPdu::new(unicast_header())
            .with(Ie::AssociationRequest(AssociationRequestMessage::new(SetupCause::InitialAssociation, 1))).unwrap()
            .with(Ie::RdCapability(RdCapabilityIe::default())).unwrap()
            .with(Ie::AssociationControl(AssociationControlIe::default())).unwrap()
            .with(Ie::KeepAlive).unwrap();
        round_trip(&pdu);

        let full = pdu.clone().with(Ie::KeepAlive);
        assert_eq!(full, Err(EncodeError::TooManyElements));

        let resp = MacPdu::new(unicast_header())
            .with(Ie::AssociationResponse(AssociationResponseMessage::reject(1, RejectCause::NoRadioCapacity, RejectTimer::S5))).unwrap();
        round_trip(&resp);
    }

    #[test]
    fn header_only_pdu() {
        round_trip(&MacPdu::new(CommonHeader::RdBroadcast(RdBroadcastHeader { reset: false, seq: 1, transmitter: 2 })));
    }

    #[test]
    fn trailing_padding_is_skipped() {
        let pdu = MacPdu::new(beacon_header())
            .with(Ie::NetworkBeacon(NetworkBeaconMessage::new(NetworkBeaconPeriod::Ms50, ClusterBeaconPeriod::Ms10, 1657, 0))).unwrap()
            .with(Ie::KeepAlive).unwrap();

        let mut b = [0u8; 64];
        let n = pdu.encode(&mut b).unwrap();

        // Zero octets decode as a padding SDU running to the end of the frame
        for pad in [1, 6] {
            let (d, used) = MacPdu::decode(&b[..n + pad]).unwrap();
            assert_eq!(used, n + pad);
            assert_eq!(d, pdu);
        }
    }

    #[test]
    fn oversized_implied_sdu_rejected() {
        let pdu = MacPdu::new(unicast_header())
            .with(Ie::AssociationResponse(AssociationResponseMessage::accept(1))).unwrap();

        let mut b = [0u8; 32];
        let n = pdu.encode(&mut b).unwrap();

        // Extra octet after a response that runs to the frame end
        b[n] = 0xFF;
        let e = MacPdu::decode(&b[..n + 1]).unwrap_err();
        assert_eq!(e.field, "association_response");
        assert_eq!(e.kind, DecodeErrorKind::TrailingBytes(1));
    }

    #[test]
    fn truncated_pdu_rejected() {
        let pdu = MacPdu::new(beacon_header())
            .with(Ie::ClusterBeacon(ClusterBeaconMessage::new(3, NetworkBeaconPeriod::Ms100, ClusterBeaconPeriod::Ms100))).unwrap()
            .with(Ie::RdCapability(RdCapabilityIe::default())).unwrap();

        let mut b = [0u8; 64];
        let n = pdu.encode(&mut b).unwrap();

        // Type, beacon header, length-8 mux, cluster beacon, implied mux, capability
        assert_eq!(n, 1 + 7 + 2 + 4 + 1 + 7);

        for i in 0..n {
            let r = MacPdu::decode(&b[..i]);
            match i {
                // SDU boundaries decode with fewer IEs
                8 => assert_eq!(r.unwrap().0.ies.len(), 0),
                14 => assert_eq!(r.unwrap().0.ies.len(), 1),
                _ => assert!(r.is_err(), "decoded {} of {} octets", i, n),
            }
        }
    }

    #[test]
    fn nested_error_offsets() {
        let pdu = MacPdu::new(beacon_header())
            .with(Ie::ClusterBeacon(ClusterBeaconMessage::new(3, NetworkBeaconPeriod::Ms100, ClusterBeaconPeriod::Ms100))).unwrap();

        let mut b = [0u8; 32];
        let n = pdu.encode(&mut b).unwrap();

        // Periods octet of the cluster beacon: type + header + mux + sfn + flags
        let at = 1 + 7 + 1 + 2;
        b[at] = 0x1F;
        let e = MacPdu::decode(&b[..n]).unwrap_err();
        assert_eq!(e.field, "cluster_beacon_period");
        assert_eq!(e.offset, at);
    }
}
