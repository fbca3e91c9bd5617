//! Channel manager

use heapless::{HistoryBuffer, Vec};
use log::{debug, trace, warn};

use super::band::{band_of, dbm_to_mw, mw_to_dbm, NOISE_FLOOR_DBM};
use super::evaluation::{ChannelEvaluation, ChannelSummary, RssiThresholds};
use super::slot::{SlotConfig, Subslot};
use crate::error::ChannelError;
use crate::{ChannelId, Ts};

/// Maximum number of channels handled by one manager
pub const MAX_CHANNELS: usize = 8;

/// Maximum outstanding reservations per channel
pub const MAX_RESERVATIONS: usize = 16;

/// Default evaluation history depth per channel
pub const HISTORY_DEPTH: usize = 64;

/// Channel manager configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ManagerConfig {
    /// Time model shared by all managed channels
    pub slots: SlotConfig,

    /// Number of subslots a reservation may scan forward from its
    /// earliest start time
    pub search_horizon: u16,

    /// RSSI limits used when summarising channels
    pub thresholds: RssiThresholds,

    /// Minimum share of free or possible subslots for a channel to be
    /// considered suitable when no channel is completely free
    pub suitable_ratio: f32,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        let slots = SlotConfig::default();
        Self {
            slots,
            search_horizon: slots.subslots_per_frame(),
            thresholds: RssiThresholds::default(),
            suitable_ratio: 0.75,
        }
    }
}

/// Reserved transmission interval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Reservation {
    pub start: Ts,
    pub end: Ts,
}

struct ChannelState<const H: usize> {
    id: ChannelId,
    history: HistoryBuffer<ChannelEvaluation, H>,
    reservations: Vec<Reservation, MAX_RESERVATIONS>,
}

impl<const H: usize> ChannelState<H> {
    /// Most recent evaluation of a frame-relative subslot number
    fn latest(&self, slots: &SlotConfig, number: u16) -> Option<&ChannelEvaluation> {
        self.history
            .as_slice()
            .iter()
            .filter(|e| slots.subslot_at(e.at).number == number)
            .max_by_key(|e| e.at)
    }

    fn is_busy(&self, slots: &SlotConfig, s: &Subslot) -> bool {
        let measured = self.latest(slots, s.number).map_or(false, |e| e.is_busy());
        let reserved = self.reservations.iter().any(|r| s.overlaps(r.start, r.end));
        measured || reserved
    }

    fn summarise(&self, slots: &SlotConfig, thresholds: &RssiThresholds) -> ChannelSummary {
        let mut summary = ChannelSummary::default();
        let mut power_mw = 0.0;

        let n = slots.subslots_per_frame();
        for number in 0..n {
            // Unmeasured subslots sit at the noise floor
            let rssi = self.latest(slots, number).map_or(NOISE_FLOOR_DBM, |e| e.rssi_dbm);
            summary.count(thresholds.classify(rssi));
            power_mw += dbm_to_mw(rssi as f32);
        }

        summary.mean_rssi_dbm = mw_to_dbm(power_mw / n as f32);
        summary
    }
}

/// Tracks occupancy and allocates subslots on a fixed set of channels,
/// with `H` evaluations of history retained per channel
pub struct ChannelManager<const H: usize = HISTORY_DEPTH> {
    config: ManagerConfig,
    channels: Vec<ChannelState<H>, MAX_CHANNELS>,
}

impl<const H: usize> ChannelManager<H> {
    /// Create a manager for `channels`, each of which must lie in a
    /// supported band
    pub fn new(config: ManagerConfig, channels: &[ChannelId]) -> Result<Self, ChannelError> {
        let mut s = Self { config, channels: Vec::new() };

        for &id in channels {
            if band_of(id).is_none() {
                return Err(ChannelError::InvalidChannelId(id));
            }
            if s.handles(id) {
                continue;
            }

            let state = ChannelState { id, history: HistoryBuffer::new(), reservations: Vec::new() };
            s.channels.push(state).map_err(|_| ChannelError::TableFull)?;
        }

        debug!("Channel manager handling {} channels", s.channels.len());

        Ok(s)
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn slots(&self) -> &SlotConfig {
        &self.config.slots
    }

    /// Managed channel identifiers in configuration order
    pub fn channels(&self) -> impl Iterator<Item = ChannelId> + '_ {
        self.channels.iter().map(|c| c.id)
    }

    pub fn handles(&self, id: ChannelId) -> bool {
        self.channels.iter().any(|c| c.id == id)
    }

    fn channel(&self, id: ChannelId) -> Result<&ChannelState<H>, ChannelError> {
        self.channels.iter().find(|c| c.id == id).ok_or(ChannelError::InvalidChannelId(id))
    }

    fn channel_mut(&mut self, id: ChannelId) -> Result<&mut ChannelState<H>, ChannelError> {
        self.channels.iter_mut().find(|c| c.id == id).ok_or(ChannelError::InvalidChannelId(id))
    }

    /// Append an evaluation to the channel history, evicting the oldest
    /// entry once the history is full
    pub fn record_evaluation(&mut self, channel: ChannelId, evaluation: ChannelEvaluation) -> Result<(), ChannelError> {
        trace!("Channel {} evaluation at {} us: {} dBm ({:?})", channel, evaluation.at, evaluation.rssi_dbm, evaluation.status);

        self.channel_mut(channel)?.history.write(evaluation);
        Ok(())
    }

    /// Retained evaluations for a channel, not in time order
    pub fn history(&self, channel: ChannelId) -> Result<&[ChannelEvaluation], ChannelError> {
        Ok(self.channel(channel)?.history.as_slice())
    }

    /// Most recent evaluation of a frame-relative subslot number
    pub fn latest(&self, channel: ChannelId, number: u16) -> Result<Option<ChannelEvaluation>, ChannelError> {
        Ok(self.channel(channel)?.latest(&self.config.slots, number).copied())
    }

    pub fn reservations(&self, channel: ChannelId) -> Result<&[Reservation], ChannelError> {
        Ok(self.channel(channel)?.reservations.as_slice())
    }

    /// Whether a subslot is neither measured busy nor already reserved
    pub fn is_free(&self, channel: ChannelId, subslot: &Subslot) -> Result<bool, ChannelError> {
        Ok(!self.channel(channel)?.is_busy(&self.config.slots, subslot))
    }

    /// Reserve the earliest run of `len` free subslots starting at or after
    /// `earliest`, returning the first subslot of the run.
    ///
    /// Only runs lying within the search horizon are considered. On failure
    /// no state is modified.
    pub fn reserve_subslot(&mut self, channel: ChannelId, earliest: Ts, len: u16) -> Result<Subslot, ChannelError> {
        let slots = self.config.slots;
        let horizon = self.config.search_horizon;

        if len == 0 || len > horizon {
            return Err(ChannelError::InvalidSubslot);
        }

        let state = self.channel(channel)?;
        let first = slots.subslot_from(earliest);

        let mut found = None;
        'scan: for offset in 0..=(horizon - len) {
            let start = slots.offset(&first, offset as u32);

            let mut s = start;
            for i in 0..len {
                if i > 0 {
                    s = slots.next(&s);
                }
                if state.is_busy(&slots, &s) {
                    continue 'scan;
                }
            }

            found = Some((start, s.end));
            break;
        }

        let (start, end) = match found {
            Some(v) => v,
            None => {
                debug!("No {} subslot run on channel {} within {} subslots of {} us", len, channel, horizon, earliest);
                return Err(ChannelError::NoResourceAvailable);
            },
        };

        let state = self.channel_mut(channel)?;
        if state.reservations.push(Reservation { start: start.start, end }).is_err() {
            warn!("Reservation table full on channel {}", channel);
            return Err(ChannelError::TableFull);
        }

        debug!("Reserved channel {} subslot {}:{} ({}..{} us)", channel, start.frame, start.number, start.start, end);

        Ok(start)
    }

    /// Release a reservation starting at `subslot`, returns whether one existed
    pub fn release(&mut self, channel: ChannelId, subslot: &Subslot) -> Result<bool, ChannelError> {
        let state = self.channel_mut(channel)?;

        match state.reservations.iter().position(|r| r.start == subslot.start) {
            Some(i) => {
                state.reservations.swap_remove(i);
                debug!("Released channel {} subslot {}:{}", channel, subslot.frame, subslot.number);
                Ok(true)
            },
            None => Ok(false),
        }
    }

    /// Drop reservations that ended at or before `now`
    pub fn prune(&mut self, now: Ts) {
        for c in self.channels.iter_mut() {
            let mut i = 0;
            while i < c.reservations.len() {
                if c.reservations[i].end <= now {
                    c.reservations.swap_remove(i);
                } else {
                    i += 1;
                }
            }
        }
    }

    /// Tally the latest state of every subslot in a frame
    pub fn summary(&self, channel: ChannelId) -> Result<ChannelSummary, ChannelError> {
        let state = self.channel(channel)?;
        Ok(state.summarise(&self.config.slots, &self.config.thresholds))
    }

    /// Pick an operating channel: the first completely free channel, else
    /// the first suitable channel, else the one with the fewest busy then
    /// possible subslots
    pub fn select_operating_channel(&self) -> Option<ChannelId> {
        let summaries: Vec<(ChannelId, ChannelSummary), MAX_CHANNELS> = self
            .channels
            .iter()
            .map(|c| (c.id, c.summarise(&self.config.slots, &self.config.thresholds)))
            .collect();

        if let Some((id, _)) = summaries.iter().find(|(_, s)| s.is_free()) {
            debug!("Selected free channel {}", id);
            return Some(*id);
        }

        if let Some((id, s)) = summaries.iter().find(|(_, s)| s.usable_ratio() >= self.config.suitable_ratio) {
            debug!("Selected suitable channel {} ({} busy)", id, s.busy);
            return Some(*id);
        }

        let best = summaries.iter().min_by_key(|(_, s)| (s.busy, s.possible)).map(|(id, _)| *id);
        if let Some(id) = best {
            debug!("Selected least busy channel {}", id);
        }
        best
    }
}
