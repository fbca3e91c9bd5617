//! DECT-2020 NR MAC state machine
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte

use log::{debug, info, trace, warn};

use crate::channel::{ChannelEvaluation, ChannelManager, Subslot, FRAME_US};
use crate::error::{ChannelError, CoreError, DecodeError};
use crate::phy::Phy;
use crate::timer::Timer;
use crate::wire::association::{AssociationResult, FtModeParams, RejectCause, ReleaseCause, SetupCause};
use crate::wire::common::SEQ_MASK;
use crate::wire::ie::{RarRepetition, RAR_REPEAT_FRAMES, RAR_VALIDITY_PERMANENT};
use crate::wire::{
    AssociationReleaseMessage, AssociationRequestMessage, AssociationResponseMessage, BeaconHeader, ClusterBeaconMessage,
    CommonHeader, Ie, MacPdu, NetworkBeaconMessage, PhyControlField, RandomAccessResourceIe, RdCapabilityIe, UnicastHeader,
    Wire,
};
use crate::{ChannelId, Ts, MAX_FRAME_LEN};

pub mod config;
pub use config::{Config, Role};

pub mod ids;
use ids::{is_valid_network_id, short_network_id};

pub mod state;
pub use state::{AssocState, MacStats};
use state::inc;

pub mod peers;
pub use peers::{AssociatedPtInfo, Candidates, FtCandidateInfo, Peers, RachWindow};

pub mod frames;

/// Flow requested on association
pub const FLOW_ID: u8 = 1;

/// Reception context handed to the frame handlers
struct Received {
    channel: ChannelId,
    control: PhyControlField,
    rssi_dbm: i16,
    at: Ts,
}

pub struct Mac<P, T> {
    config: Config,
    phy: P,
    timer: T,
    channels: ChannelManager,

    network_id: u32,
    operating_channel: Option<ChannelId>,
    next_channel_selection: Option<Ts>,
    state: AssocState,

    next_network_beacon: Option<Ts>,
    next_cluster_beacon: Option<Ts>,
    next_keep_alive: Ts,

    seq: u16,
    sfn: u8,

    candidates: Candidates,
    peers: Peers,
    stats: MacStats,

    buff: [u8; MAX_FRAME_LEN],
}

impl<P, T> Mac<P, T>
where
    P: Phy,
    T: Timer,
{
    pub fn new(config: Config, channels: ChannelManager, phy: P, timer: T) -> Result<Self, CoreError<P::Error>> {
        if !config.validate() {
            warn!("Invalid MAC configuration for RD {:08x}", config.long_rd_id);
            return Err(CoreError::InvalidConfig);
        }

        if channels.channels().next().is_none() {
            warn!("MAC requires at least one channel");
            return Err(CoreError::InvalidConfig);
        }

        if config.tx_subslots as u16 > channels.config().search_horizon {
            warn!("{} subslot transmissions exceed the {} subslot search horizon", config.tx_subslots, channels.config().search_horizon);
            return Err(CoreError::InvalidConfig);
        }

        if let Some(c) = config.operating_channel {
            if !channels.handles(c) {
                return Err(CoreError::InvalidChannelId(c));
            }
        }

        let s = Self {
            network_id: config.network_id,
            operating_channel: config.operating_channel,
            next_channel_selection: None,
            state: AssocState::Idle,

            next_network_beacon: None,
            next_cluster_beacon: None,
            next_keep_alive: 0,

            seq: 0,
            sfn: 0,

            candidates: Candidates::new(),
            peers: Peers::new(),
            stats: MacStats::new(),

            buff: [0u8; MAX_FRAME_LEN],

            config,
            phy,
            timer,
            channels,
        };

        debug!("Setup {:?} MAC with RD ID {:08x} (short {:04x})", s.config.role, s.config.long_rd_id, s.config.short_rd_id);

        Ok(s)
    }

    /// Start operation. A beaconing device selects its operating channel
    /// and schedules beacons from now, a PT starts scanning.
    pub fn start(&mut self) -> Result<(), CoreError<P::Error>> {
        let now = self.timer.ticks_us();

        if self.config.beacons() {
            let channel = match self.operating_channel.or_else(|| self.channels.select_operating_channel()) {
                Some(c) => c,
                None => return Err(CoreError::NoResourceAvailable),
            };

            info!("Beaconing on channel {} from {} us", channel, now);

            // A configured channel is kept
            self.next_channel_selection = match self.config.operating_channel {
                Some(_) => None,
                None => self.config.channel_reselection_us.map(|p| now + p),
            };

            self.operating_channel = Some(channel);
            self.next_cluster_beacon = Some(now);
            self.next_network_beacon = Some(now);
        }

        self.state = match self.config.role {
            Role::Ft => AssocState::Idle,
            Role::Pt => {
                info!("Scanning for FT beacons");
                self.peers.clear();
                AssocState::Scanning
            },
        };

        Ok(())
    }

    /// Run timers: beacons, association attempts and timeouts, keep-alives
    pub fn tick(&mut self) -> Result<(), CoreError<P::Error>> {
        let now = self.timer.ticks_us();

        trace!("Tick at {} us ({:?})", now, self.state);

        self.channels.prune(now);
        self.candidates.expire(now, self.config.candidate_expiry_us, self.state.ft());

        self.tick_channel_selection(now);
        self.tick_beacons(now);

        match self.config.role {
            Role::Ft => self.tick_ft(now),
            Role::Pt => self.tick_pt(now),
        }
    }

    /// Handle a frame delivered by the PHY, `data` holds the PHY control
    /// field followed by the MAC PDU.
    ///
    /// The evaluation is recorded against the channel before the frame is
    /// inspected. Frames that fail to decode are dropped and counted.
    pub fn on_frame_received(&mut self, channel: ChannelId, data: &[u8], evaluation: ChannelEvaluation) -> Result<(), CoreError<P::Error>> {
        self.channels.record_evaluation(channel, evaluation)?;

        if evaluation.rssi_dbm < self.config.rssi_floor {
            debug!("Dropped frame on channel {} at {} dBm", channel, evaluation.rssi_dbm);
            inc(&mut self.stats.frames_below_floor);
            return Ok(());
        }

        let (control, n) = match PhyControlField::decode(data) {
            Ok(v) => v,
            Err(e) => return Err(self.decode_failed(channel, e)),
        };

        let pdu = match MacPdu::decode_exact(&data[n..]) {
            Ok(p) => p,
            Err(e) => return Err(self.decode_failed(channel, e.at(n))),
        };

        let rx = Received { channel, control, rssi_dbm: evaluation.rssi_dbm, at: self.timer.ticks_us() };

        trace!("RX {:?} PDU on channel {} ({} dBm)", pdu.header.kind(), channel, rx.rssi_dbm);

        match &pdu.header {
            CommonHeader::Beacon(h) => self.handle_beacon(&rx, h, &pdu.ies),
            CommonHeader::Unicast(h) => self.handle_unicast(&rx, h, &pdu.ies),
            h => {
                debug!("Ignoring {:?} PDU on channel {}", h.kind(), channel);
                Ok(())
            },
        }
    }

    /// Release the association with the current FT and go idle,
    /// does nothing unless associated
    pub fn deregister(&mut self) -> Result<(), CoreError<P::Error>> {
        let ft = match self.state {
            AssocState::Associated { ft } => ft,
            _ => return Ok(()),
        };

        let now = self.timer.ticks_us();
        self.state = AssocState::Idle;

        let peer = match self.peers.remove(ft) {
            Some(p) => p,
            None => return Ok(()),
        };

        info!("Releasing association with FT {:08x}", ft);

        let s = match self.reserve_before(peer.channel, now, Ts::MAX)? {
            Some(s) => s,
            None => {
                warn!("No subslot for association release to {:08x}", ft);
                return Ok(());
            },
        };

        let release = AssociationReleaseMessage { cause: ReleaseCause::ConnectionTermination };
        let pdu = frames::unicast(self.seq(), ft, self.config.long_rd_id, &[Ie::AssociationRelease(release)])?;
        let control = frames::unicast_control(&self.config, peer.network_id, peer.short_id);

        self.send(peer.channel, &s, &pdu, &control)
    }

    /// Record a channel evaluation made outside frame reception
    pub fn record_evaluation(&mut self, channel: ChannelId, evaluation: ChannelEvaluation) -> Result<(), CoreError<P::Error>> {
        self.channels.record_evaluation(channel, evaluation)?;
        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Fetch association state
    pub fn state(&self) -> AssocState {
        self.state
    }

    /// Fetch MAC layer statistics
    pub fn stats(&self) -> MacStats {
        self.stats.clone()
    }

    pub fn peers(&self) -> &Peers {
        &self.peers
    }

    pub fn candidates(&self) -> &Candidates {
        &self.candidates
    }

    /// Network ID, adopted from the FT once a PT is associated
    pub fn network_id(&self) -> u32 {
        self.network_id
    }

    pub fn operating_channel(&self) -> Option<ChannelId> {
        self.operating_channel
    }

    pub fn channels(&self) -> &ChannelManager {
        &self.channels
    }

    /// Whether beacons are currently being scheduled
    pub fn is_beaconing(&self) -> bool {
        self.next_cluster_beacon.is_some() && is_valid_network_id(self.network_id)
    }

    /// Fetch and increment TX sequence number
    fn seq(&mut self) -> u16 {
        let s = self.seq;
        self.seq = (self.seq + 1) & SEQ_MASK;
        s
    }

    fn decode_failed(&mut self, channel: ChannelId, e: DecodeError) -> CoreError<P::Error> {
        warn!("Dropped frame on channel {}: {:?} in {} at offset {}", channel, e.kind, e.field, e.offset);
        inc(&mut self.stats.decode_errors);
        CoreError::Decode(e)
    }

    /// Reserve a transmission starting before `deadline`, `None` if the
    /// channel has no room
    fn reserve_before(&mut self, channel: ChannelId, now: Ts, deadline: Ts) -> Result<Option<Subslot>, CoreError<P::Error>> {
        match self.channels.reserve_subslot(channel, now, self.config.tx_subslots as u16) {
            Ok(s) if s.start < deadline => Ok(Some(s)),
            Ok(s) => {
                self.channels.release(channel, &s)?;
                Ok(None)
            },
            Err(ChannelError::NoResourceAvailable) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Reserve a transmission lying entirely within a random access window
    fn reserve_in_window(&mut self, channel: ChannelId, now: Ts, w: &RachWindow) -> Result<Option<Subslot>, CoreError<P::Error>> {
        let len = self.config.tx_subslots as u16;

        match self.channels.reserve_subslot(channel, now.max(w.first.start), len) {
            Ok(s) if self.channels.slots().offset(&s, len as u32 - 1).end <= w.end => Ok(Some(s)),
            Ok(s) => {
                self.channels.release(channel, &s)?;
                Ok(None)
            },
            Err(ChannelError::NoResourceAvailable) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Encode and hand a PDU to the PHY, releasing the reservation on failure
    fn send(&mut self, channel: ChannelId, subslot: &Subslot, pdu: &MacPdu, control: &PhyControlField) -> Result<(), CoreError<P::Error>> {
        let n = match pdu.encode(&mut self.buff) {
            Ok(n) => n,
            Err(e) => {
                warn!("Encoding {:?} PDU failed: {:?}", pdu.header.kind(), e);
                inc(&mut self.stats.tx_failures);
                self.channels.release(channel, subslot)?;
                return Err(e.into());
            },
        };

        trace!("TX {} octets on channel {} at {} us", n, channel, subslot.start);

        if let Err(e) = self.phy.transmit(channel, subslot, &self.buff[..n], control) {
            warn!("PHY transmit failed on channel {}: {:?}", channel, e);
            inc(&mut self.stats.tx_failures);
            self.channels.release(channel, subslot)?;
            return Err(CoreError::Phy(e));
        }

        Ok(())
    }

    fn tick_channel_selection(&mut self, now: Ts) {
        let due = match self.next_channel_selection {
            Some(t) if t <= now => t,
            _ => return,
        };

        self.next_channel_selection = self.config.channel_reselection_us.map(|p| next_boundary(due, p, now));

        let channel = match self.channels.select_operating_channel() {
            Some(c) => c,
            None => return,
        };

        if Some(channel) != self.operating_channel {
            info!("Moving operating channel from {:?} to {} at {} us", self.operating_channel, channel, now);
            self.operating_channel = Some(channel);
            inc(&mut self.stats.channel_changes);
        }
    }

    /// Send any beacons that are due. A beacon that cannot be sent is
    /// counted as skipped and the next one is scheduled as usual.
    fn tick_beacons(&mut self, now: Ts) {
        // A PT beacons once it has adopted a network ID
        if !is_valid_network_id(self.network_id) {
            return;
        }

        let channel = match self.operating_channel {
            Some(c) => c,
            None => return,
        };

        if let Some(due) = self.next_cluster_beacon.filter(|t| *t <= now) {
            let period = self.config.cluster_beacon_period_us();
            self.next_cluster_beacon = Some(next_boundary(due, period, now));

            let sent = self.reserve_before(channel, now, due + period).and_then(|s| match s {
                Some(s) => self.send_cluster_beacon(channel, &s).map(|_| true),
                None => Ok(false),
            });

            match sent {
                Ok(true) => inc(&mut self.stats.cluster_beacons_sent),
                Ok(false) => {
                    warn!("Skipped cluster beacon due at {} us, no subslot on channel {}", due, channel);
                    inc(&mut self.stats.cluster_beacons_skipped);
                },
                Err(e) => {
                    warn!("Lost cluster beacon due at {} us on channel {}: {:?}", due, channel, e);
                    inc(&mut self.stats.cluster_beacons_skipped);
                },
            }
        }

        if let Some(due) = self.next_network_beacon.filter(|t| *t <= now) {
            let period = self.config.network_beacon_period_us();
            self.next_network_beacon = Some(next_boundary(due, period, now));

            let sent = self.reserve_before(channel, now, due + period).and_then(|s| match s {
                Some(s) => self.send_network_beacon(channel, &s).map(|_| true),
                None => Ok(false),
            });

            match sent {
                Ok(true) => inc(&mut self.stats.network_beacons_sent),
                Ok(false) => {
                    warn!("Skipped network beacon due at {} us, no subslot on channel {}", due, channel);
                    inc(&mut self.stats.network_beacons_skipped);
                },
                Err(e) => {
                    warn!("Lost network beacon due at {} us on channel {}: {:?}", due, channel, e);
                    inc(&mut self.stats.network_beacons_skipped);
                },
            }
        }
    }

    fn send_cluster_beacon(&mut self, channel: ChannelId, s: &Subslot) -> Result<(), CoreError<P::Error>> {
        let m = ClusterBeaconMessage::new(self.sfn, self.config.network_beacon_period, self.config.cluster_beacon_period);
        self.sfn = self.sfn.wrapping_add(1);

        let rach = self.rach_resource(s);

        debug!("Cluster beacon {} on channel {} subslot {}:{}, random access from {}", m.sfn, channel, s.frame, s.number, rach.start_subslot);

        let pdu = frames::cluster_beacon(self.network_id, self.config.long_rd_id, m, rach)?;
        let control = frames::broadcast_control(&self.config, self.network_id);

        self.send(channel, s, &pdu, &control)
    }

    /// Random access resource opening once the beacon transmission ends,
    /// repeated each frame until the next cluster beacon.
    ///
    /// The start subslot counts from the beacon frame in 8 bits. A start the
    /// field cannot hold moves to the first subslot of the following frame.
    fn rach_resource(&self, beacon: &Subslot) -> RandomAccessResourceIe {
        let per_frame = self.channels.slots().subslots_per_frame() as u32;
        let after = (beacon.number as u32 + self.config.tx_subslots as u32) % per_frame;

        let start = match after {
            n if n <= u8::MAX as u32 => n as u8,
            _ => 0,
        };

        let frames = self.config.cluster_beacon_period_us() / FRAME_US;
        let validity = frames.clamp(1, RAR_VALIDITY_PERMANENT as Ts - 1) as u8;

        let mut rach = RandomAccessResourceIe::new(start, self.config.rach_subslots);
        rach.repetition = Some(RarRepetition { repeat: RAR_REPEAT_FRAMES, repetition: 1, validity });
        rach.max_rach_length = self.config.tx_subslots.min(0x0F);
        rach
    }

    fn send_network_beacon(&mut self, channel: ChannelId, s: &Subslot) -> Result<(), CoreError<P::Error>> {
        let next = self.next_cluster_beacon.unwrap_or(s.start);
        let time_to_next = next.saturating_sub(s.start).min(u32::MAX as Ts) as u32;

        let m = NetworkBeaconMessage::new(self.config.network_beacon_period, self.config.cluster_beacon_period, channel, time_to_next);

        debug!("Network beacon on channel {} subslot {}:{}", channel, s.frame, s.number);

        let pdu = frames::network_beacon(self.network_id, self.config.long_rd_id, m)?;
        let control = frames::broadcast_control(&self.config, self.network_id);

        self.send(channel, s, &pdu, &control)
    }

    fn tick_ft(&mut self, now: Ts) -> Result<(), CoreError<P::Error>> {
        let stats = &mut self.stats;

        self.peers.expire(now, self.config.keep_alive_timeout_us, |p| {
            warn!("PT {:08x} lost, last seen at {} us", p.long_id, p.last_seen);
            inc(&mut stats.associations_lost);
        });

        Ok(())
    }

    fn tick_pt(&mut self, now: Ts) -> Result<(), CoreError<P::Error>> {
        match self.state {
            AssocState::Scanning => {
                let best = self
                    .candidates
                    .best(now, self.config.candidate_rssi_threshold, self.config.max_association_attempts)
                    .cloned();

                if let Some(c) = best {
                    self.request_association(now, &c)?;
                }
            },
            AssocState::Associating { ft, expiry } if now >= expiry => {
                warn!("Association with FT {:08x} timed out at {} us", ft, now);
                inc(&mut self.stats.association_timeouts);
                self.state = AssocState::Scanning;
            },
            AssocState::Associated { ft } => {
                let mut ft_lost = false;
                self.peers.expire(now, self.config.keep_alive_timeout_us, |p| ft_lost |= p.long_id == ft);
                if ft_lost {
                    warn!("FT {:08x} lost at {} us", ft, now);
                    inc(&mut self.stats.associations_lost);
                    self.state = AssocState::Idle;
                    return Ok(());
                }

                if now >= self.next_keep_alive {
                    self.next_keep_alive = now + self.config.keep_alive_us;
                    self.send_keep_alive(now, ft)?;
                }
            },
            _ => (),
        }

        Ok(())
    }

    /// Beacon parameters advertised in requests from a beaconing PT
    fn ft_mode_params(&self, now: Ts) -> Option<FtModeParams> {
        if !self.config.beacons() {
            return None;
        }

        let channel = self.operating_channel?;
        let next = self.next_cluster_beacon.unwrap_or(now);

        Some(FtModeParams {
            network_beacon_period: self.config.network_beacon_period,
            cluster_beacon_period: self.config.cluster_beacon_period,
            next_cluster_channel: channel,
            time_to_next: next.saturating_sub(now).min(u32::MAX as Ts) as u32,
        })
    }

    /// Send an association request inside the candidate's next random
    /// access window, waiting for a later window when it has no room
    fn request_association(&mut self, now: Ts, c: &FtCandidateInfo) -> Result<(), CoreError<P::Error>> {
        let w = match c.rach_window(self.channels.slots(), now) {
            Some(w) => w,
            None => {
                trace!("No random access window from FT {:08x} until its next cluster beacon", c.long_id);
                return Ok(());
            },
        };

        let s = match self.reserve_in_window(c.channel, now, &w)? {
            Some(s) => s,
            None => {
                debug!("Random access window {}:{} on channel {} has no room", w.first.frame, w.first.number, c.channel);
                inc(&mut self.stats.association_requests_deferred);
                return Ok(());
            },
        };

        let mut req = AssociationRequestMessage::new(SetupCause::InitialAssociation, FLOW_ID);
        req.ft_mode = self.ft_mode_params(now);

        let ies = [Ie::AssociationRequest(req), Ie::RdCapability(RdCapabilityIe::default())];
        let pdu = frames::unicast(self.seq(), c.long_id, self.config.long_rd_id, &ies)?;
        let control = frames::unicast_control(&self.config, c.network_id, c.short_id);

        info!("Requesting association with FT {:08x} on channel {} (attempt {})", c.long_id, c.channel, c.attempts + 1);

        self.send(c.channel, &s, &pdu, &control)?;

        if let Some(e) = self.candidates.get_mut(c.long_id) {
            e.attempts = e.attempts.saturating_add(1);
        }

        inc(&mut self.stats.association_requests_sent);
        self.state = AssocState::Associating { ft: c.long_id, expiry: s.end + self.config.association_timeout_us };

        Ok(())
    }

    fn send_keep_alive(&mut self, now: Ts, ft: u32) -> Result<(), CoreError<P::Error>> {
        let (channel, short_id, network_id) = match self.peers.get(ft) {
            Some(p) => (p.channel, p.short_id, p.network_id),
            None => return Ok(()),
        };

        let s = match self.reserve_before(channel, now, Ts::MAX)? {
            Some(s) => s,
            None => {
                debug!("No subslot for keep alive on channel {}", channel);
                return Ok(());
            },
        };

        let pdu = frames::unicast(self.seq(), ft, self.config.long_rd_id, &[Ie::KeepAlive])?;
        let control = frames::unicast_control(&self.config, network_id, short_id);

        trace!("Keep alive to FT {:08x}", ft);

        self.send(channel, &s, &pdu, &control)
    }

    fn handle_beacon(&mut self, rx: &Received, h: &BeaconHeader, ies: &[Ie]) -> Result<(), CoreError<P::Error>> {
        if h.transmitter == self.config.long_rd_id {
            return Ok(());
        }

        let mut cluster = false;
        let mut rach = None;

        for ie in ies {
            match ie {
                Ie::NetworkBeacon(m) => {
                    trace!("Network beacon from {:08x}, next cluster beacon on {} in {} us", h.transmitter, m.next_cluster_channel, m.time_to_next);
                    inc(&mut self.stats.network_beacons_received);
                },
                Ie::ClusterBeacon(m) => {
                    trace!("Cluster beacon {} from {:08x}", m.sfn, h.transmitter);
                    inc(&mut self.stats.cluster_beacons_received);
                    cluster = true;
                },
                Ie::RandomAccessResource(r) => rach = Some(*r),
                _ => (),
            }
        }

        if let Some(p) = self.peers.get_mut(h.transmitter) {
            p.last_seen = rx.at;
        }

        if self.config.role != Role::Pt {
            return Ok(());
        }

        let common = rx.control.common();
        let network_id = h.network_id(common.short_network_id);
        if !is_valid_network_id(network_id) {
            debug!("Ignoring beacon from {:08x} with network ID {:08x}", h.transmitter, network_id);
            return Ok(());
        }

        let frame = self.channels.slots().subslot_at(rx.at).frame;

        let c = FtCandidateInfo::new(h.transmitter, common.transmitter_identity, network_id, rx.channel, rx.rssi_dbm, rx.at);
        if let Some(e) = self.candidates.observe(c) {
            e.cluster_beacon_heard |= cluster;
            if rach.is_some() {
                e.rach = rach;
                e.rach_frame = frame;
            }
        }

        Ok(())
    }

    fn handle_unicast(&mut self, rx: &Received, h: &UnicastHeader, ies: &[Ie]) -> Result<(), CoreError<P::Error>> {
        if h.receiver != self.config.long_rd_id {
            trace!("Ignoring unicast for {:08x}", h.receiver);
            return Ok(());
        }

        if let Some(p) = self.peers.get_mut(h.transmitter) {
            p.last_seen = rx.at;
        }

        for ie in ies {
            match ie {
                Ie::AssociationRequest(m) => self.handle_association_request(rx, h, m)?,
                Ie::AssociationResponse(m) => self.handle_association_response(rx, h, m),
                Ie::AssociationRelease(m) => self.handle_association_release(h, m),
                Ie::KeepAlive => trace!("Keep alive from {:08x}", h.transmitter),
                _ => (),
            }
        }

        Ok(())
    }

    fn handle_association_request(&mut self, rx: &Received, h: &UnicastHeader, m: &AssociationRequestMessage) -> Result<(), CoreError<P::Error>> {
        inc(&mut self.stats.association_requests_received);

        if self.config.role != Role::Ft {
            debug!("Ignoring association request from {:08x}", h.transmitter);
            return Ok(());
        }

        if rx.control.common().short_network_id != short_network_id(self.network_id) {
            debug!("Ignoring association request from {:08x} for another network", h.transmitter);
            return Ok(());
        }

        let known = self.peers.get(h.transmitter).is_some();
        let accept = known || self.peers.len() < self.config.max_peers;

        let response = match accept {
            true => AssociationResponseMessage::accept(m.flow_id),
            false => AssociationResponseMessage::reject(m.flow_id, RejectCause::NoRadioCapacity, self.config.reject_timer),
        };

        let s = match self.reserve_before(rx.channel, rx.at, Ts::MAX)? {
            Some(s) => s,
            None => {
                warn!("No subslot for association response to {:08x}", h.transmitter);
                return Ok(());
            },
        };

        let peer_short = rx.control.common().transmitter_identity;
        let pdu = frames::unicast(self.seq(), h.transmitter, self.config.long_rd_id, &[Ie::AssociationResponse(response)])?;
        let control = frames::unicast_control(&self.config, self.network_id, peer_short);

        self.send(rx.channel, &s, &pdu, &control)?;
        inc(&mut self.stats.association_responses_sent);

        if !accept {
            info!("Rejected association from {:08x}, {} peers associated", h.transmitter, self.peers.len());
            inc(&mut self.stats.associations_rejected);
            return Ok(());
        }

        let associated_at = self.peers.get(h.transmitter).map_or(rx.at, |p| p.associated_at);
        let peer = AssociatedPtInfo {
            long_id: h.transmitter,
            short_id: peer_short,
            network_id: self.network_id,
            channel: rx.channel,
            flow_id: m.flow_id,
            associated_at,
            last_seen: rx.at,
        };

        if self.peers.insert(peer).is_err() {
            return Err(CoreError::BufferFull);
        }

        if !known {
            info!("Associated PT {:08x} (short {:04x}) on channel {}", h.transmitter, peer_short, rx.channel);
            inc(&mut self.stats.associations_succeeded);
        }

        Ok(())
    }

    fn handle_association_response(&mut self, rx: &Received, h: &UnicastHeader, m: &AssociationResponseMessage) {
        inc(&mut self.stats.association_responses_received);

        let pending = match self.state {
            AssocState::Associating { ft, .. } => ft == h.transmitter && m.flow_id == FLOW_ID,
            _ => false,
        };

        if !pending {
            warn!("Stale association response from {:08x} in state {:?}", h.transmitter, self.state);
            inc(&mut self.stats.stale_responses);
            return;
        }

        let ft = h.transmitter;

        match m.result {
            AssociationResult::Accepted => {
                let (network_id, short_id) = match self.candidates.get_mut(ft) {
                    Some(c) => {
                        c.attempts = 0;
                        (c.network_id, c.short_id)
                    },
                    None => (self.network_id, rx.control.common().transmitter_identity),
                };

                self.network_id = network_id;
                self.peers.clear();

                let peer = AssociatedPtInfo {
                    long_id: ft,
                    short_id,
                    network_id,
                    channel: rx.channel,
                    flow_id: m.flow_id,
                    associated_at: rx.at,
                    last_seen: rx.at,
                };
                if self.peers.insert(peer).is_err() {
                    warn!("No room to record FT {:08x}", ft);
                    self.state = AssocState::Scanning;
                    return;
                }

                self.next_keep_alive = rx.at + self.config.keep_alive_us;
                self.state = AssocState::Associated { ft };
                inc(&mut self.stats.associations_succeeded);

                info!("Associated with FT {:08x} on channel {} (network {:08x})", ft, rx.channel, network_id);
            },
            AssociationResult::Rejected { cause, timer } => {
                warn!("Association rejected by FT {:08x} ({:?}), barred for {} s", ft, cause, timer.secs());

                if let Some(c) = self.candidates.get_mut(ft) {
                    c.barred_until = Some(rx.at + timer.secs() as Ts * 1_000_000);
                    c.attempts = 0;
                }

                inc(&mut self.stats.associations_rejected);
                self.state = AssocState::Scanning;
            },
        }
    }

    fn handle_association_release(&mut self, h: &UnicastHeader, m: &AssociationReleaseMessage) {
        if self.peers.remove(h.transmitter).is_some() {
            info!("Association with {:08x} released ({:?})", h.transmitter, m.cause);
        }

        if self.state.ft() == Some(h.transmitter) {
            self.state = AssocState::Idle;
        }
    }
}

/// First `due + k * period` after `now`
fn next_boundary(due: Ts, period: Ts, now: Ts) -> Ts {
    due + (now.saturating_sub(due) / period + 1) * period
}

#[cfg(test)]
mod test {
    use std::vec::Vec;

    use super::*;
    use crate::channel::{ManagerConfig, RssiThresholds, SlotConfig, SubcarrierScaling};
    use crate::phy::mock::MockPhy;
    use crate::timer::mock::MockTimer;

    const NETWORK: u32 = 0x0012_3401;
    const FT_ID: u32 = 0x1000_0001;
    const FT_SHORT: u16 = 0x0101;
    const PT_ID: u32 = 0x2000_0001;
    const PT_SHORT: u16 = 0x0202;
    const CH: ChannelId = 1657;

    type TestMac = Mac<MockPhy, MockTimer>;

    fn channels() -> ChannelManager {
        ChannelManager::new(ManagerConfig::default(), &[CH]).unwrap()
    }

    fn x8_channels() -> ChannelManager {
        let slots = SlotConfig::new(SubcarrierScaling::X8);
        let config = ManagerConfig { slots, search_horizon: slots.subslots_per_frame(), ..ManagerConfig::default() };
        ChannelManager::new(config, &[CH]).unwrap()
    }

    fn eval(timer: &MockTimer, rssi: i16) -> ChannelEvaluation {
        ChannelEvaluation::new(timer.ticks_us(), rssi, &RssiThresholds::default())
    }

    /// Deliver everything `from` transmitted, returning the decoded PDUs
    fn deliver(from: &mut MockPhy, to: &mut TestMac, timer: &MockTimer) -> Vec<MacPdu> {
        let sent = from.take();
        for tx in sent.iter() {
            to.on_frame_received(tx.channel, &tx.frame(), eval(timer, -60)).unwrap();
        }
        sent.iter().map(|tx| tx.pdu().unwrap()).collect()
    }

    fn encode_frame(control: &PhyControlField, pdu: &MacPdu) -> Vec<u8> {
        let mut b = [0u8; MAX_FRAME_LEN];
        let n = control.encode(&mut b).unwrap();
        let m = pdu.encode(&mut b[n..]).unwrap();
        b[..n + m].to_vec()
    }

    struct Net {
        timer: MockTimer,
        ft: TestMac,
        ft_phy: MockPhy,
        pt: TestMac,
        pt_phy: MockPhy,
    }

    impl Net {
        fn new(ft: Config, pt: Config) -> Self {
            Self::with_channels(ft, pt, channels)
        }

        fn with_channels(ft: Config, pt: Config, channels: fn() -> ChannelManager) -> Self {
            let _ = simplelog::SimpleLogger::init(log::LevelFilter::Debug, simplelog::Config::default());

            let timer = MockTimer::new();
            let ft_phy = MockPhy::new();
            let pt_phy = MockPhy::new();

            let mut ft = Mac::new(ft, channels(), ft_phy.clone(), timer.clone()).unwrap();
            let mut pt = Mac::new(pt, channels(), pt_phy.clone(), timer.clone()).unwrap();
            ft.start().unwrap();
            pt.start().unwrap();

            Self { timer, ft, ft_phy, pt, pt_phy }
        }

        fn pair() -> Self {
            Self::new(Config::ft(NETWORK, FT_ID, FT_SHORT), Config::pt(PT_ID, PT_SHORT))
        }

        fn to_pt(&mut self) -> Vec<MacPdu> {
            deliver(&mut self.ft_phy, &mut self.pt, &self.timer)
        }

        fn to_ft(&mut self) -> Vec<MacPdu> {
            deliver(&mut self.pt_phy, &mut self.ft, &self.timer)
        }

        /// Beacon, request, response
        fn associate(&mut self) {
            self.ft.tick().unwrap();
            self.to_pt();
            self.pt.tick().unwrap();
            self.to_ft();
            self.to_pt();
            assert!(self.pt.state().is_associated());
        }
    }

    #[test]
    fn invalid_configuration() {
        let r = TestMac::new(Config::ft(0x0012_3400, FT_ID, FT_SHORT), channels(), MockPhy::new(), MockTimer::new());
        assert!(matches!(r, Err(CoreError::InvalidConfig)));

        let empty = ChannelManager::new(ManagerConfig::default(), &[]).unwrap();
        let r = TestMac::new(Config::pt(PT_ID, PT_SHORT), empty, MockPhy::new(), MockTimer::new());
        assert!(matches!(r, Err(CoreError::InvalidConfig)));

        let c = Config { operating_channel: Some(1658), ..Config::ft(NETWORK, FT_ID, FT_SHORT) };
        let r = TestMac::new(c, channels(), MockPhy::new(), MockTimer::new());
        assert!(matches!(r, Err(CoreError::InvalidChannelId(1658))));

        // Longer than a packet can be
        let c = Config { tx_subslots: 17, rach_subslots: 20, ..Config::ft(NETWORK, FT_ID, FT_SHORT) };
        let r = TestMac::new(c, channels(), MockPhy::new(), MockTimer::new());
        assert!(matches!(r, Err(CoreError::InvalidConfig)));

        // Longer than the manager will search
        let short = ManagerConfig { search_horizon: 10, ..ManagerConfig::default() };
        let c = Config { tx_subslots: 12, rach_subslots: 12, ..Config::ft(NETWORK, FT_ID, FT_SHORT) };
        let r = TestMac::new(c, ChannelManager::new(short.clone(), &[CH]).unwrap(), MockPhy::new(), MockTimer::new());
        assert!(matches!(r, Err(CoreError::InvalidConfig)));

        let c = Config { tx_subslots: 10, rach_subslots: 12, ..Config::ft(NETWORK, FT_ID, FT_SHORT) };
        assert!(TestMac::new(c, ChannelManager::new(short, &[CH]).unwrap(), MockPhy::new(), MockTimer::new()).is_ok());
    }

    #[test]
    fn association_happy_path() {
        let mut n = Net::pair();
        assert!(n.pt.state().is_scanning());
        assert!(n.ft.state().is_idle());
        assert_eq!(n.ft.operating_channel(), Some(CH));

        // FT sends both beacons on start
        n.ft.tick().unwrap();
        let beacons = n.to_pt();
        assert_eq!(beacons.len(), 2);
        assert!(matches!(beacons[0].ies[0], Ie::ClusterBeacon(_)));
        assert!(matches!(beacons[0].ies[1], Ie::RandomAccessResource(_)));
        assert!(matches!(beacons[1].ies[0], Ie::NetworkBeacon(_)));

        let c = n.pt.candidates().get(FT_ID).unwrap();
        assert_eq!((c.short_id, c.network_id, c.channel), (FT_SHORT, NETWORK, CH));
        assert!(c.cluster_beacon_heard && c.rach.is_some());

        // Request carries RD capabilities
        n.pt.tick().unwrap();
        assert!(n.pt.state().is_associating());

        let req = n.to_ft();
        assert_eq!(req.len(), 1);
        assert_eq!(req[0].header.transmitter(), Some(PT_ID));
        match &req[0].ies[..] {
            [Ie::AssociationRequest(r), Ie::RdCapability(_)] => assert_eq!((r.flow_id, r.ft_mode), (FLOW_ID, None)),
            ies => panic!("unexpected request {:?}", ies),
        }

        let p = n.ft.peers().get(PT_ID).unwrap();
        assert_eq!((p.short_id, p.channel, p.flow_id), (PT_SHORT, CH, FLOW_ID));

        let resp = n.to_pt();
        assert!(matches!(&resp[0].ies[0], Ie::AssociationResponse(r) if r.accepted()));

        assert_eq!(n.pt.state(), AssocState::Associated { ft: FT_ID });
        assert_eq!(n.pt.network_id(), NETWORK);
        let f = n.pt.peers().get(FT_ID).unwrap();
        assert_eq!((f.short_id, f.network_id), (FT_SHORT, NETWORK));

        let (fs, ps) = (n.ft.stats(), n.pt.stats());
        assert_eq!((fs.cluster_beacons_sent, fs.network_beacons_sent), (1, 1));
        assert_eq!((fs.association_requests_received, fs.association_responses_sent, fs.associations_succeeded), (1, 1, 1));
        assert_eq!((ps.cluster_beacons_received, ps.network_beacons_received), (1, 1));
        assert_eq!((ps.association_requests_sent, ps.association_responses_received, ps.associations_succeeded), (1, 1, 1));
    }

    #[test]
    fn association_timeout_and_retry_limit() {
        let mut n = Net::pair();

        for attempt in 1..=3 {
            // Each cluster beacon opens a fresh random access window
            n.ft.tick().unwrap();
            n.to_pt();

            n.pt.tick().unwrap();
            assert!(n.pt.state().is_associating());
            assert_eq!(n.pt_phy.take().len(), 1);

            // Not yet expired
            n.timer.advance_ms(10);
            n.pt.tick().unwrap();
            assert!(n.pt.state().is_associating());

            n.timer.advance_ms(100);
            n.pt.tick().unwrap();
            assert!(n.pt.state().is_scanning());

            assert_eq!(n.pt.stats().association_timeouts, attempt);
            assert_eq!(n.pt.candidates().get(FT_ID).unwrap().attempts, attempt as u8);
            assert!(n.pt.peers().is_empty());
        }

        // Candidate exhausted, keep scanning
        n.pt.tick().unwrap();
        assert!(n.pt.state().is_scanning());
        assert_eq!(n.pt_phy.count(), 0);
    }

    #[test]
    fn beacon_skipped_when_channel_busy() {
        let _ = simplelog::SimpleLogger::init(log::LevelFilter::Debug, simplelog::Config::default());

        let mut timer = MockTimer::new();
        let mut phy = MockPhy::new();
        let mut ft = TestMac::new(Config::ft(NETWORK, FT_ID, FT_SHORT), channels(), phy.clone(), timer.clone()).unwrap();

        let t = RssiThresholds::default();
        let slots = *ft.channels().slots();
        for s in 0..slots.subslots_per_frame() {
            ft.record_evaluation(CH, ChannelEvaluation::new(slots.subslot(0, s).start, -30, &t)).unwrap();
        }

        ft.start().unwrap();
        ft.tick().unwrap();
        assert_eq!(phy.count(), 0);

        let s = ft.stats();
        assert_eq!((s.cluster_beacons_skipped, s.network_beacons_skipped), (1, 1));

        // Next cycle is still scheduled and skipped again
        timer.advance_ms(100);
        ft.tick().unwrap();
        assert_eq!(ft.stats().cluster_beacons_skipped, 2);
        assert_eq!(ft.stats().network_beacons_skipped, 1);

        // Channel clears
        for s in 0..slots.subslots_per_frame() {
            ft.record_evaluation(CH, ChannelEvaluation::new(slots.subslot(20, s).start, -95, &t)).unwrap();
        }
        timer.advance_ms(100);
        ft.tick().unwrap();

        let sent = phy.take();
        assert_eq!(sent.len(), 1);
        assert!(matches!(sent[0].pdu().unwrap().ies[0], Ie::ClusterBeacon(_)));
        assert_eq!(ft.stats().cluster_beacons_sent, 1);
        assert_eq!(ft.stats().cluster_beacons_skipped, 2);
    }

    #[test]
    fn beacons_follow_periods() {
        let mut n = Net::pair();

        for _ in 0..25 {
            n.ft.tick().unwrap();
            n.timer.advance_ms(50);
        }

        // 1250 ms of cluster beacons every 100 ms, network beacons every 1000 ms
        let s = n.ft.stats();
        assert_eq!((s.cluster_beacons_sent, s.network_beacons_sent), (13, 2));
        assert_eq!(s.beacons_skipped(), 0);

        // SFN increments per cluster beacon
        let sfns: Vec<u8> = n
            .ft_phy
            .take()
            .iter()
            .filter_map(|tx| match &tx.pdu().unwrap().ies[0] {
                Ie::ClusterBeacon(m) => Some(m.sfn),
                _ => None,
            })
            .collect();
        assert_eq!(sfns, (0..13).collect::<Vec<u8>>());
    }

    #[test]
    fn full_ft_rejects() {
        let ft = Config { max_peers: 0, ..Config::ft(NETWORK, FT_ID, FT_SHORT) };
        let mut n = Net::new(ft, Config::pt(PT_ID, PT_SHORT));

        n.ft.tick().unwrap();
        n.to_pt();
        n.pt.tick().unwrap();
        n.to_ft();
        assert!(n.ft.peers().is_empty());

        let resp = n.to_pt();
        match &resp[0].ies[0] {
            Ie::AssociationResponse(r) => {
                assert_eq!(r.result, AssociationResult::Rejected { cause: RejectCause::NoRadioCapacity, timer: n.ft.config().reject_timer })
            },
            ie => panic!("unexpected {:?}", ie),
        }

        assert!(n.pt.state().is_scanning());
        assert!(n.pt.peers().is_empty());
        assert_eq!(n.pt.stats().associations_rejected, 1);
        assert_eq!(n.ft.stats().associations_rejected, 1);

        // Barred by the reject timer
        let c = n.pt.candidates().get(FT_ID).unwrap();
        assert_eq!(c.barred_until, Some(n.timer.ticks_us() + 10 * 1_000_000));

        n.pt.tick().unwrap();
        assert_eq!(n.pt_phy.count(), 0);
    }

    #[test]
    fn stale_responses_ignored() {
        let mut n = Net::pair();
        let t = n.timer.clone();

        let ft = Config::ft(NETWORK, FT_ID, FT_SHORT);
        let control = frames::unicast_control(&ft, NETWORK, PT_SHORT);
        let ies = [Ie::AssociationResponse(AssociationResponseMessage::accept(FLOW_ID))];
        let frame = encode_frame(&control, &frames::unicast(9, PT_ID, FT_ID, &ies).unwrap());

        // Nothing outstanding
        n.pt.on_frame_received(CH, &frame, eval(&t, -60)).unwrap();
        assert!(n.pt.state().is_scanning());
        assert_eq!(n.pt.stats().stale_responses, 1);

        // Outstanding, but from another FT
        n.ft.tick().unwrap();
        n.to_pt();
        n.pt.tick().unwrap();
        let other = encode_frame(&control, &frames::unicast(9, PT_ID, 0x1000_0002, &ies).unwrap());
        n.pt.on_frame_received(CH, &other, eval(&t, -60)).unwrap();
        assert!(n.pt.state().is_associating());
        assert_eq!(n.pt.stats().stale_responses, 2);

        // Duplicate after association
        n.to_ft();
        n.to_pt();
        assert!(n.pt.state().is_associated());
        n.pt.on_frame_received(CH, &frame, eval(&t, -60)).unwrap();
        assert!(n.pt.state().is_associated());
        assert_eq!(n.pt.stats().stale_responses, 3);
    }

    #[test]
    fn keep_alive_maintains_association() {
        let mut n = Net::pair();
        n.associate();

        for _ in 0..5 {
            n.timer.advance_ms(1000);

            n.pt.tick().unwrap();
            let ka = n.to_ft();
            assert!(ka.iter().any(|p| p.ies.first() == Some(&Ie::KeepAlive)));

            n.ft.tick().unwrap();
            n.to_pt();
        }

        assert!(n.pt.state().is_associated());
        assert_eq!(n.ft.peers().get(PT_ID).map(|p| p.last_seen), Some(n.timer.ticks_us()));
        assert_eq!(n.ft.stats().associations_lost, 0);
    }

    #[test]
    fn silence_ends_association() {
        let mut n = Net::pair();
        n.associate();

        n.timer.advance_ms(4000);
        n.ft.tick().unwrap();
        n.pt.tick().unwrap();

        assert!(n.ft.peers().is_empty());
        assert_eq!(n.ft.stats().associations_lost, 1);

        assert!(n.pt.state().is_idle());
        assert!(n.pt.peers().is_empty());
        assert_eq!(n.pt.stats().associations_lost, 1);
    }

    #[test]
    fn deregistration_releases_peer() {
        let mut n = Net::pair();
        n.associate();

        n.pt.deregister().unwrap();
        assert!(n.pt.state().is_idle());

        let rel = n.to_ft();
        assert!(matches!(&rel[0].ies[0], Ie::AssociationRelease(m) if m.cause == ReleaseCause::ConnectionTermination));
        assert!(n.ft.peers().is_empty());

        // Nothing to release when idle
        n.pt.deregister().unwrap();
        assert_eq!(n.pt_phy.count(), 0);
    }

    #[test]
    fn beaconing_pt_uses_adopted_network() {
        let pt = Config { beaconing: true, ..Config::pt(PT_ID, PT_SHORT) };
        let mut n = Net::new(Config::ft(NETWORK, FT_ID, FT_SHORT), pt);

        // No network ID yet, only the request is sent
        n.ft.tick().unwrap();
        n.to_pt();
        n.pt.tick().unwrap();
        let req = n.to_ft();
        assert_eq!(req.len(), 1);
        match &req[0].ies[0] {
            Ie::AssociationRequest(r) => assert_eq!(r.ft_mode.map(|m| m.next_cluster_channel), Some(CH)),
            ie => panic!("unexpected {:?}", ie),
        }
        n.to_pt();
        assert!(n.pt.is_beaconing());

        n.timer.advance_ms(100);
        n.pt.tick().unwrap();

        let sent = n.pt_phy.take();
        assert_eq!(sent.len(), 2);
        for tx in sent.iter() {
            let pdu = tx.pdu().unwrap();
            match pdu.header {
                CommonHeader::Beacon(h) => {
                    assert_eq!(h.network_id(tx.control.common().short_network_id), NETWORK);
                    assert_eq!(h.transmitter, PT_ID);
                },
                h => panic!("unexpected header {:?}", h),
            }
        }
    }

    #[test]
    fn malformed_frames_counted() {
        let mut n = Net::pair();
        let t = n.timer.clone();

        let r = n.pt.on_frame_received(CH, &[0xFF, 0x00, 0x00], eval(&t, -60));
        assert!(matches!(r, Err(CoreError::Decode(_))));

        // Truncated MAC PDU
        n.ft.tick().unwrap();
        let sent = n.ft_phy.take();
        let frame = sent[0].frame();
        let r = n.pt.on_frame_received(CH, &frame[..frame.len() - 1], eval(&t, -60));
        match r {
            Err(CoreError::Decode(e)) => assert!(e.offset >= sent[0].control.encoded_len()),
            r => panic!("unexpected {:?}", r.map(|_| ())),
        }

        assert_eq!(n.pt.stats().decode_errors, 2);
        assert!(n.pt.candidates().is_empty());
    }

    #[test]
    fn weak_frames_dropped() {
        let mut n = Net::pair();
        let t = n.timer.clone();

        n.ft.tick().unwrap();
        let sent = n.ft_phy.take();

        n.pt.on_frame_received(CH, &sent[0].frame(), eval(&t, -105)).unwrap();
        assert_eq!(n.pt.stats().frames_below_floor, 1);
        assert!(n.pt.candidates().is_empty());

        // Evaluation is still recorded
        assert_eq!(n.pt.channels().history(CH).unwrap().len(), 1);

        // Heard but below the candidate threshold
        n.pt.on_frame_received(CH, &sent[0].frame(), eval(&t, -90)).unwrap();
        assert!(!n.pt.candidates().get(FT_ID).unwrap().is_eligible(t.ticks_us(), -85, 3));
        n.pt.tick().unwrap();
        assert!(n.pt.state().is_scanning());
    }

    #[test]
    fn unknown_channel_rejected() {
        let mut n = Net::pair();
        let t = n.timer.clone();

        let r = n.pt.on_frame_received(1700, &[0x00], eval(&t, -60));
        assert!(matches!(r, Err(CoreError::InvalidChannelId(1700))));
    }

    #[test]
    fn phy_failure_counted_and_tick_continues() {
        let mut n = Net::pair();
        n.associate();
        let before = n.ft.stats();

        // PT has gone quiet and both beacons fail
        n.timer.advance_ms(4000);
        n.ft_phy.set_fail(true);
        n.ft.tick().unwrap();

        assert!(n.ft.channels().reservations(CH).unwrap().is_empty());

        let s = n.ft.stats();
        assert_eq!(s.tx_failures, 2);
        assert_eq!((s.cluster_beacons_sent, s.network_beacons_sent), (before.cluster_beacons_sent, before.network_beacons_sent));
        assert_eq!((s.cluster_beacons_skipped, s.network_beacons_skipped), (1, 1));

        // Peer expiry still ran
        assert_eq!(s.associations_lost, 1);
        assert!(n.ft.peers().is_empty());

        n.ft_phy.set_fail(false);
        n.timer.advance_ms(100);
        n.ft.tick().unwrap();

        let sent = n.ft_phy.take();
        assert_eq!(sent.len(), 1);
        assert!(matches!(sent[0].pdu().unwrap().ies[0], Ie::ClusterBeacon(_)));
        assert_eq!(n.ft.stats().cluster_beacons_sent, before.cluster_beacons_sent + 1);
        assert_eq!(n.ft.stats().tx_failures, 2);
    }

    #[test]
    fn request_sent_in_random_access_window() {
        let mut n = Net::pair();

        n.ft.tick().unwrap();
        let beacons = n.to_pt();
        let rach = match &beacons[0].ies[1] {
            Ie::RandomAccessResource(r) => *r,
            ie => panic!("unexpected {:?}", ie),
        };

        // Opens after the two subslot beacon, repeated each frame until the next one
        assert_eq!((rach.start_subslot, rach.length), (2, 4));
        assert_eq!(rach.repetition.map(|r| (r.repeat, r.repetition, r.validity)), Some((RAR_REPEAT_FRAMES, 1, 10)));
        assert_eq!(n.pt.candidates().get(FT_ID).unwrap().rach_frame, 0);

        // This frame's window has passed, the request waits for the next
        n.timer.advance_ms(5);
        n.pt.tick().unwrap();

        let sent = n.pt_phy.take();
        assert_eq!(sent.len(), 1);

        let s = sent[0].subslot;
        let len = n.pt.config().tx_subslots as u16;
        let window = rach.start_subslot as u16..rach.start_subslot as u16 + rach.length as u16;
        assert_eq!(s.frame, 1);
        assert!(window.contains(&s.number) && window.contains(&(s.number + len - 1)));
        assert!(n.pt.state().is_associating());
    }

    #[test]
    fn request_waits_for_room_in_window() {
        let mut n = Net::pair();

        n.ft.tick().unwrap();
        n.to_pt();

        // Busy subslots leave no two subslot run inside 2..6
        let t = RssiThresholds::default();
        let slots = *n.pt.channels().slots();
        for s in [3, 5] {
            n.pt.record_evaluation(CH, ChannelEvaluation::new(slots.subslot(0, s).start, -30, &t)).unwrap();
        }

        n.pt.tick().unwrap();
        assert!(n.pt.state().is_scanning());
        assert_eq!(n.pt_phy.count(), 0);
        assert!(n.pt.channels().reservations(CH).unwrap().is_empty());

        let s = n.pt.stats();
        assert_eq!((s.association_requests_deferred, s.association_requests_sent), (1, 0));
        assert_eq!(n.pt.candidates().get(FT_ID).unwrap().attempts, 0);

        // Interference clears
        for s in [3, 5] {
            n.pt.record_evaluation(CH, ChannelEvaluation::new(slots.subslot(1, s).start, -95, &t)).unwrap();
        }
        n.timer.advance_ms(10);
        n.pt.tick().unwrap();
        assert!(n.pt.state().is_associating());
        assert_eq!(n.pt.stats().association_requests_sent, 1);
    }

    #[test]
    fn random_access_start_fits_field() {
        let mut n = Net::with_channels(Config::ft(NETWORK, FT_ID, FT_SHORT), Config::pt(PT_ID, PT_SHORT), x8_channels);

        // Beacon lands on subslot 346 of 384
        n.timer.set_ms(9);
        n.ft.tick().unwrap();

        let sent = n.ft_phy.take();
        let beacon = sent[0].subslot;
        assert_eq!((beacon.frame, beacon.number), (0, 346));

        for tx in sent.iter() {
            n.pt.on_frame_received(tx.channel, &tx.frame(), eval(&n.timer, -60)).unwrap();
        }

        let c = n.pt.candidates().get(FT_ID).unwrap();
        assert_eq!(c.rach.map(|r| r.start_subslot), Some(0));

        // Window starts with the following frame, after the beacon
        let w = c.rach_window(n.pt.channels().slots(), n.timer.ticks_us()).unwrap();
        assert_eq!((w.first.frame, w.first.number), (1, 0));
        assert!(w.first.start >= beacon.end);

        n.pt.tick().unwrap();
        let req = n.pt_phy.take();
        assert_eq!(req.len(), 1);
        assert_eq!((req[0].subslot.frame, req[0].subslot.number), (1, 0));
    }

    #[test]
    fn operating_channel_reselected() {
        let _ = simplelog::SimpleLogger::init(log::LevelFilter::Debug, simplelog::Config::default());

        let mut timer = MockTimer::new();
        let mut phy = MockPhy::new();
        let channels = ChannelManager::new(ManagerConfig::default(), &[CH, 1658, 1659]).unwrap();
        let mut ft = TestMac::new(Config::ft(NETWORK, FT_ID, FT_SHORT), channels, phy.clone(), timer.clone()).unwrap();

        ft.start().unwrap();
        assert_eq!(ft.operating_channel(), Some(CH));

        // Interference appears on the operating channel
        let t = RssiThresholds::default();
        let slots = *ft.channels().slots();
        for s in 0..slots.subslots_per_frame() {
            ft.record_evaluation(CH, ChannelEvaluation::new(slots.subslot(0, s).start, -30, &t)).unwrap();
        }

        timer.advance_ms(100);
        ft.tick().unwrap();
        assert_eq!(ft.operating_channel(), Some(CH));
        assert_eq!(phy.count(), 0);

        timer.advance_ms(300 * 1000);
        ft.tick().unwrap();
        assert_eq!(ft.operating_channel(), Some(1658));
        assert_eq!(ft.stats().channel_changes, 1);

        let sent = phy.take();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|tx| tx.channel == 1658));

        // Nothing better, channel is kept
        timer.advance_ms(300 * 1000);
        ft.tick().unwrap();
        assert_eq!(ft.operating_channel(), Some(1658));
        assert_eq!(ft.stats().channel_changes, 1);
    }

    #[test]
    fn configured_channel_not_reselected() {
        let mut timer = MockTimer::new();
        let channels = ChannelManager::new(ManagerConfig::default(), &[CH, 1658]).unwrap();
        let c = Config { operating_channel: Some(CH), ..Config::ft(NETWORK, FT_ID, FT_SHORT) };
        let mut ft = TestMac::new(c, channels, MockPhy::new(), timer.clone()).unwrap();
        ft.start().unwrap();

        let t = RssiThresholds::default();
        let slots = *ft.channels().slots();
        for s in 0..slots.subslots_per_frame() {
            ft.record_evaluation(CH, ChannelEvaluation::new(slots.subslot(0, s).start, -30, &t)).unwrap();
        }

        timer.advance_ms(301 * 1000);
        ft.tick().unwrap();
        assert_eq!(ft.operating_channel(), Some(CH));
        assert_eq!(ft.stats().channel_changes, 0);
    }

    #[test]
    fn sequence_numbers_wrap() {
        let mut n = Net::pair();
        n.pt.seq = SEQ_MASK;
        assert_eq!(n.pt.seq(), SEQ_MASK);
        assert_eq!(n.pt.seq(), 0);

        assert_eq!(next_boundary(0, 100, 0), 100);
        assert_eq!(next_boundary(0, 100, 250), 300);
        assert_eq!(next_boundary(100, 100, 100), 200);
    }
}
