
use strum::{EnumIter, FromRepr};

use super::beacon::{read_periods, write_periods, ClusterBeaconPeriod, NetworkBeaconPeriod};
use super::{Reader, Wire, Writer};
use crate::error::{DecodeError, EncodeError};

/// Reason an association is being set up
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, FromRepr)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum SetupCause {
    InitialAssociation = 0,
    NewFlows = 1,
    Mobility = 2,
    ReassociationAfterError = 3,
    OperatingChannelChange = 4,
    OperatingModeChange = 5,
    Other = 6,
}

/// Reason an association request was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, FromRepr)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum RejectCause {
    NoRadioCapacity = 0,
    NoHardwareCapacity = 1,
    ShortIdConflict = 2,
    NonSecuredNotSupported = 3,
    Other = 4,
}

/// Time the rejected RD must wait before retrying the same FT
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, FromRepr)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum RejectTimer {
    S0 = 0,
    S5 = 1,
    S10 = 2,
    S30 = 3,
    S60 = 4,
    S120 = 5,
    S180 = 6,
    S300 = 7,
    S600 = 8,
}

impl RejectTimer {
    pub fn secs(&self) -> u32 {
        match self {
            RejectTimer::S0 => 0,
            RejectTimer::S5 => 5,
            RejectTimer::S10 => 10,
            RejectTimer::S30 => 30,
            RejectTimer::S60 => 60,
            RejectTimer::S120 => 120,
            RejectTimer::S180 => 180,
            RejectTimer::S300 => 300,
            RejectTimer::S600 => 600,
        }
    }
}

/// Reason an association was released
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, FromRepr)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ReleaseCause {
    ConnectionTermination = 0,
    Mobility = 1,
    LongInactivity = 2,
    IncompatibleConfiguration = 3,
    NoHardwareResources = 4,
    NoRadioResources = 5,
    BadRadioQuality = 6,
    SecurityError = 7,
    OtherError = 8,
    OtherReason = 9,
}

/// HARQ process count and maximum retransmission delay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HarqConfig {
    /// 3-bit process count code
    pub processes: u8,
    /// 5-bit maximum delay code
    pub max_delay: u8,
}

impl HarqConfig {
    fn to_octet(self) -> u8 {
        (self.processes & 0b111) << 5 | (self.max_delay & 0b1_1111)
    }

    fn from_octet(b: u8) -> Self {
        Self { processes: b >> 5, max_delay: b & 0b1_1111 }
    }
}

/// Beacon parameters included when the requesting RD also operates as an FT
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FtModeParams {
    pub network_beacon_period: NetworkBeaconPeriod,
    pub cluster_beacon_period: ClusterBeaconPeriod,
    pub next_cluster_channel: u16,
    pub time_to_next: u32,
}

pub const FLOW_ID_MASK: u8 = 0b0011_1111;
pub const FLOWS_MASK: u8 = 0b0001_1100;
pub const FLOWS_SHIFT: u8 = 2;

pub const REQ_POWER_CONSTRAINTS: u8 = 0b0000_0010;
pub const REQ_FT_MODE: u8 = 0b0000_0001;
pub const REQ_CURRENT: u8 = 0b1000_0000;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AssociationRequestMessage {
    pub setup_cause: SetupCause,
    /// Number of flows being set up (3 bits)
    pub number_of_flows: u8,
    pub power_constraints: bool,
    pub harq_tx: HarqConfig,
    pub harq_rx: HarqConfig,
    /// 6-bit flow ID
    pub flow_id: u8,
    pub ft_mode: Option<FtModeParams>,
    pub current_cluster_channel: Option<u16>,
}

impl AssociationRequestMessage {
    pub const MIN_LEN: usize = 5;

    pub fn new(setup_cause: SetupCause, flow_id: u8) -> Self {
        Self {
            setup_cause,
            number_of_flows: 1,
            power_constraints: false,
            harq_tx: HarqConfig::default(),
            harq_rx: HarqConfig::default(),
            flow_id,
            ft_mode: None,
            current_cluster_channel: None,
        }
    }
}

impl Wire for AssociationRequestMessage {
    const NAME: &'static str = "association_request";

    fn encoded_len(&self) -> usize {
        Self::MIN_LEN
            + self.ft_mode.map_or(0, |_| 7)
            + self.current_cluster_channel.map_or(0, |_| 2)
    }

    fn encode(&self, buf: &mut [u8]) -> Result<usize, EncodeError> {
        let mut w = Writer::new(buf, self.encoded_len())?;

        let mut b0 = (self.setup_cause as u8) << 5 | (self.number_of_flows << FLOWS_SHIFT) & FLOWS_MASK;
        if self.power_constraints {
            b0 |= REQ_POWER_CONSTRAINTS;
        }
        if self.ft_mode.is_some() {
            b0 |= REQ_FT_MODE;
        }
        w.u8(b0)?;
        w.u8(if self.current_cluster_channel.is_some() { REQ_CURRENT } else { 0 })?;
        w.u8(self.harq_tx.to_octet())?;
        w.u8(self.harq_rx.to_octet())?;
        w.u8(self.flow_id & FLOW_ID_MASK)?;

        if let Some(ft) = &self.ft_mode {
            write_periods(&mut w, ft.network_beacon_period, ft.cluster_beacon_period)?;
            w.channel(ft.next_cluster_channel)?;
            w.u32(ft.time_to_next)?;
        }
        if let Some(c) = self.current_cluster_channel {
            w.channel(c)?;
        }

        Ok(w.finish())
    }

    fn decode(buf: &[u8]) -> Result<(Self, usize), DecodeError> {
        let mut r = Reader::new(buf);

        let b0 = r.u8("setup_cause")?;
        let setup_cause = r.code("setup_cause", b0 >> 5, SetupCause::from_repr)?;
        let current = r.u8("current_cluster_channel_flag")? & REQ_CURRENT != 0;
        let harq_tx = HarqConfig::from_octet(r.u8("harq_tx")?);
        let harq_rx = HarqConfig::from_octet(r.u8("harq_rx")?);
        let flow_id = r.u8("flow_id")? & FLOW_ID_MASK;

        let ft_mode = match b0 & REQ_FT_MODE != 0 {
            true => {
                let (network_beacon_period, cluster_beacon_period) = read_periods(&mut r)?;
                Some(FtModeParams {
                    network_beacon_period,
                    cluster_beacon_period,
                    next_cluster_channel: r.channel("next_cluster_channel")?,
                    time_to_next: r.u32("time_to_next")?,
                })
            },
            false => None,
        };
        let current_cluster_channel = match current {
            true => Some(r.channel("current_cluster_channel")?),
            false => None,
        };

        let m = Self {
            setup_cause,
            number_of_flows: (b0 & FLOWS_MASK) >> FLOWS_SHIFT,
            power_constraints: b0 & REQ_POWER_CONSTRAINTS != 0,
            harq_tx,
            harq_rx,
            flow_id,
            ft_mode,
            current_cluster_channel,
        };

        Ok((m, r.offset()))
    }
}

/// Outcome carried in an association response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AssociationResult {
    Accepted,
    Rejected { cause: RejectCause, timer: RejectTimer },
}

/// Group assignment included in an accepting response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GroupAssignment {
    /// 7-bit group ID
    pub group_id: u8,
    /// 7-bit resource tag
    pub resource_tag: u8,
}

pub const RESP_ACCEPTED: u8 = 0b1000_0000;
pub const RESP_HARQ_MOD: u8 = 0b0010_0000;
pub const RESP_GROUP: u8 = 0b0000_0010;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AssociationResponseMessage {
    pub result: AssociationResult,
    /// Modified HARQ configuration (RX, TX) when the FT overrides the request
    pub harq: Option<(HarqConfig, HarqConfig)>,
    pub number_of_flows: u8,
    pub flow_id: u8,
    pub group: Option<GroupAssignment>,
}

impl AssociationResponseMessage {
    pub const MIN_LEN: usize = 2;

    pub fn accept(flow_id: u8) -> Self {
        Self {
            result: AssociationResult::Accepted,
            harq: None,
            number_of_flows: 1,
            flow_id,
            group: None,
        }
    }

    pub fn reject(flow_id: u8, cause: RejectCause, timer: RejectTimer) -> Self {
        Self {
            result: AssociationResult::Rejected { cause, timer },
            harq: None,
            number_of_flows: 0,
            flow_id,
            group: None,
        }
    }

    pub fn accepted(&self) -> bool {
        self.result == AssociationResult::Accepted
    }
}

impl Wire for AssociationResponseMessage {
    const NAME: &'static str = "association_response";

    fn encoded_len(&self) -> usize {
        let rejected = match self.result {
            AssociationResult::Accepted => 0,
            AssociationResult::Rejected { .. } => 1,
        };
        Self::MIN_LEN + rejected + self.harq.map_or(0, |_| 2) + self.group.map_or(0, |_| 2)
    }

    fn encode(&self, buf: &mut [u8]) -> Result<usize, EncodeError> {
        let mut w = Writer::new(buf, self.encoded_len())?;

        let mut b0 = (self.number_of_flows << FLOWS_SHIFT) & FLOWS_MASK;
        if self.accepted() {
            b0 |= RESP_ACCEPTED;
        }
        if self.harq.is_some() {
            b0 |= RESP_HARQ_MOD;
        }
        if self.group.is_some() {
            b0 |= RESP_GROUP;
        }
        w.u8(b0)?;

        if let AssociationResult::Rejected { cause, timer } = self.result {
            w.u8((cause as u8) << 4 | timer as u8)?;
        }
        if let Some((rx, tx)) = self.harq {
            w.u8(rx.to_octet())?;
            w.u8(tx.to_octet())?;
        }
        w.u8(self.flow_id & FLOW_ID_MASK)?;
        if let Some(g) = self.group {
            w.u8(g.group_id & 0x7F)?;
            w.u8(g.resource_tag & 0x7F)?;
        }

        Ok(w.finish())
    }

    fn decode(buf: &[u8]) -> Result<(Self, usize), DecodeError> {
        let mut r = Reader::new(buf);

        let b0 = r.u8("association_response_flags")?;

        let result = match b0 & RESP_ACCEPTED != 0 {
            true => AssociationResult::Accepted,
            false => {
                let b = r.u8("reject_cause")?;
                let cause = r.code("reject_cause", b >> 4, RejectCause::from_repr)?;
                let timer = r.code("reject_timer", b & 0x0F, RejectTimer::from_repr)?;
                AssociationResult::Rejected { cause, timer }
            },
        };

        let harq = match b0 & RESP_HARQ_MOD != 0 {
            true => {
                let rx = HarqConfig::from_octet(r.u8("harq_rx")?);
                let tx = HarqConfig::from_octet(r.u8("harq_tx")?);
                Some((rx, tx))
            },
            false => None,
        };

        let flow_id = r.u8("flow_id")? & FLOW_ID_MASK;

        let group = match b0 & RESP_GROUP != 0 {
            true => Some(GroupAssignment {
                group_id: r.u8("group_id")? & 0x7F,
                resource_tag: r.u8("resource_tag")? & 0x7F,
            }),
            false => None,
        };

        let m = Self {
            result,
            harq,
            number_of_flows: (b0 & FLOWS_MASK) >> FLOWS_SHIFT,
            flow_id,
            group,
        };

        Ok((m, r.offset()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AssociationReleaseMessage {
    pub cause: ReleaseCause,
}

impl Wire for AssociationReleaseMessage {
    const NAME: &'static str = "association_release";

    fn encoded_len(&self) -> usize {
        1
    }

    fn encode(&self, buf: &mut [u8]) -> Result<usize, EncodeError> {
        let mut w = Writer::new(buf, 1)?;
        w.u8((self.cause as u8) << 4)?;
        Ok(w.finish())
    }

    fn decode(buf: &[u8]) -> Result<(Self, usize), DecodeError> {
        let mut r = Reader::new(buf);
        let b = r.u8("release_cause")?;
        let cause = r.code("release_cause", b >> 4, ReleaseCause::from_repr)?;
        Ok((Self { cause }, r.offset()))
    }
}

#[cfg(test)]
mod test {
    use strum::IntoEnumIterator;

    use super::*;
    use crate::error::DecodeErrorKind;
    use crate::wire::test_util::{assert_truncation_fails, round_trip};

    fn full_request() -> AssociationRequestMessage {
        AssociationRequestMessage {
            setup_cause: SetupCause::Mobility,
            number_of_flows: 3,
            power_constraints: true,
            harq_tx: HarqConfig { processes: 2, max_delay: 17 },
            harq_rx: HarqConfig { processes: 7, max_delay: 31 },
            flow_id: 0x2A,
            ft_mode: Some(FtModeParams {
                network_beacon_period: NetworkBeaconPeriod::Ms1500,
                cluster_beacon_period: ClusterBeaconPeriod::Ms16000,
                next_cluster_channel: 1677,
                time_to_next: 0xDEAD_BEEF,
            }),
            current_cluster_channel: Some(1660),
        }
    }

    #[test]
    fn request_round_trip() {
        for cause in SetupCause::iter() {
            round_trip(&AssociationRequestMessage::new(cause, 1));
        }

        let m = full_request();
        assert_eq!(m.encoded_len(), 14);
        round_trip(&m);
        round_trip(&AssociationRequestMessage { ft_mode: None, ..m.clone() });
        round_trip(&AssociationRequestMessage { current_cluster_channel: None, ..m.clone() });

        for n in NetworkBeaconPeriod::iter() {
            for c in ClusterBeaconPeriod::iter() {
                let mut r = m.clone();
                r.ft_mode = r.ft_mode.map(|f| FtModeParams { network_beacon_period: n, cluster_beacon_period: c, ..f });
                round_trip(&r);
            }
        }
    }

    #[test]
    fn request_truncated() {
        assert_truncation_fails(&full_request());
    }

    #[test]
    fn request_reserved_setup_cause() {
        let mut b = [0u8; 5];
        AssociationRequestMessage::new(SetupCause::Other, 1).encode(&mut b).unwrap();
        b[0] |= 0b1110_0000;

        let e = AssociationRequestMessage::decode(&b).unwrap_err();
        assert_eq!(e.kind, DecodeErrorKind::UnknownCode(7));
    }

    #[test]
    fn response_round_trip() {
        round_trip(&AssociationResponseMessage::accept(5));

        for cause in RejectCause::iter() {
            for timer in RejectTimer::iter() {
                round_trip(&AssociationResponseMessage::reject(5, cause, timer));
            }
        }

        let m = AssociationResponseMessage {
            result: AssociationResult::Accepted,
            harq: Some((HarqConfig { processes: 1, max_delay: 2 }, HarqConfig { processes: 3, max_delay: 4 })),
            number_of_flows: 2,
            flow_id: 63,
            group: Some(GroupAssignment { group_id: 0x7F, resource_tag: 0x11 }),
        };
        round_trip(&m);
        assert_truncation_fails(&m);
        assert_truncation_fails(&AssociationResponseMessage::reject(1, RejectCause::Other, RejectTimer::S60));
    }

    #[test]
    fn response_unknown_reject_codes() {
        let mut b = [0u8; 3];
        AssociationResponseMessage::reject(1, RejectCause::Other, RejectTimer::S600).encode(&mut b).unwrap();

        let mut c = b;
        c[1] = 0x50;
        assert_eq!(AssociationResponseMessage::decode(&c).unwrap_err().field, "reject_cause");

        let mut c = b;
        c[1] = 0x09;
        assert_eq!(AssociationResponseMessage::decode(&c).unwrap_err().field, "reject_timer");
    }

    #[test]
    fn release_round_trip() {
        for cause in ReleaseCause::iter() {
            round_trip(&AssociationReleaseMessage { cause });
        }
        assert!(AssociationReleaseMessage::decode(&[0xA0]).is_err());
        assert!(AssociationReleaseMessage::decode(&[]).is_err());
    }
}
