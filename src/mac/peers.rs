
use heapless::Vec;
use log::debug;

use crate::channel::{SlotConfig, Subslot, FRAME_US};
use crate::wire::ie::{RAR_REPEAT_FRAMES, RAR_REPEAT_SUBSLOTS, RAR_VALIDITY_PERMANENT};
use crate::wire::RandomAccessResourceIe;
use crate::{ChannelId, Ts};

pub const MAX_CANDIDATES: usize = 8;

pub const MAX_PEERS: usize = 8;

/// FT heard through its beacons but not (yet) associated with
#[derive(Debug, Clone, PartialEq)]
pub struct FtCandidateInfo {
    pub long_id: u32,
    pub short_id: u16,
    pub network_id: u32,
    /// Channel the beacon was received on
    pub channel: ChannelId,
    /// RSSI of the most recent beacon
    pub rssi_dbm: i16,
    pub last_seen: Ts,
    /// A cluster beacon has been heard
    pub cluster_beacon_heard: bool,
    /// Most recently advertised random access resource
    pub rach: Option<RandomAccessResourceIe>,
    /// Frame `rach` was received in, its start subslot counts from here
    pub rach_frame: u64,
    /// Association requests sent since the last reject
    pub attempts: u8,
    /// Not to be contacted before this time following a reject
    pub barred_until: Option<Ts>,
}

impl FtCandidateInfo {
    pub fn new(long_id: u32, short_id: u16, network_id: u32, channel: ChannelId, rssi_dbm: i16, now: Ts) -> Self {
        Self {
            long_id,
            short_id,
            network_id,
            channel,
            rssi_dbm,
            last_seen: now,
            cluster_beacon_heard: false,
            rach: None,
            rach_frame: 0,
            attempts: 0,
            barred_until: None,
        }
    }

    /// Whether an association attempt may be made now
    pub fn is_eligible(&self, now: Ts, rssi_threshold: i16, max_attempts: u8) -> bool {
        let barred = self.barred_until.map_or(false, |t| now < t);

        self.cluster_beacon_heard
            && self.rach.is_some()
            && self.rssi_dbm >= rssi_threshold
            && self.attempts < max_attempts
            && !barred
    }

    /// Next occurrence of the advertised random access resource that ends
    /// after `now`, `None` once the allocation has run out
    pub fn rach_window(&self, slots: &SlotConfig, now: Ts) -> Option<RachWindow> {
        let r = self.rach?;

        let len = r.length_subslots(slots.subslots_per_slot());
        if len == 0 {
            return None;
        }

        let per_frame = slots.subslots_per_frame() as u64;
        let base = self.rach_frame * per_frame + r.start_subslot as u64;

        let (period, validity) = match r.repetition {
            Some(p) if p.repetition > 0 && p.repeat == RAR_REPEAT_FRAMES => (p.repetition as u64 * per_frame, p.validity),
            Some(p) if p.repetition > 0 && p.repeat == RAR_REPEAT_SUBSLOTS => (p.repetition as u64, p.validity),
            _ => (0, 0),
        };

        let window = |k: u64| {
            let first = slots.subslot(k / per_frame, (k % per_frame) as u16);
            let end = slots.offset(&first, len - 1).end;
            RachWindow { first, len, end }
        };

        if period == 0 {
            return Some(window(base)).filter(|w| w.end > now);
        }

        let current = slots.subslot_at(now);
        let elapsed = (current.frame * per_frame + current.number as u64).saturating_sub(base);

        let mut w = window(base + elapsed / period * period);
        if w.end <= now {
            w = window(base + (elapsed / period + 1) * period);
        }

        match validity {
            RAR_VALIDITY_PERMANENT => Some(w),
            v if w.first.start < (self.rach_frame + v as u64) * FRAME_US => Some(w),
            _ => None,
        }
    }
}

/// One occurrence of a random access resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RachWindow {
    pub first: Subslot,
    /// Length in subslots
    pub len: u32,
    /// End of the last subslot
    pub end: Ts,
}

/// Bounded FT candidate table keyed by long RD ID
#[derive(Debug, Clone, Default)]
pub struct Candidates<const N: usize = MAX_CANDIDATES> {
    entries: Vec<FtCandidateInfo, N>,
}

impl<const N: usize> Candidates<N> {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Refresh or insert a candidate from a received beacon.
    ///
    /// A full table evicts its weakest entry only for a stronger newcomer.
    /// Returns the stored entry.
    pub fn observe(&mut self, c: FtCandidateInfo) -> Option<&mut FtCandidateInfo> {
        if let Some(i) = self.entries.iter().position(|e| e.long_id == c.long_id) {
            let e = &mut self.entries[i];
            e.short_id = c.short_id;
            e.network_id = c.network_id;
            e.channel = c.channel;
            e.rssi_dbm = c.rssi_dbm;
            e.last_seen = c.last_seen;
            return Some(e);
        }

        if self.entries.len() == self.entries.capacity() {
            let (weakest, rssi) = self.entries.iter().enumerate().min_by_key(|(_, e)| e.rssi_dbm).map(|(i, e)| (i, e.rssi_dbm))?;
            if rssi >= c.rssi_dbm {
                return None;
            }

            debug!("Replacing candidate {:08x} with {:08x}", self.entries[weakest].long_id, c.long_id);
            self.entries.swap_remove(weakest);
        }

        debug!("New FT candidate {:08x} on channel {} ({} dBm)", c.long_id, c.channel, c.rssi_dbm);

        self.entries.push(c).ok()?;
        self.entries.last_mut()
    }

    pub fn get(&self, long_id: u32) -> Option<&FtCandidateInfo> {
        self.entries.iter().find(|e| e.long_id == long_id)
    }

    pub fn get_mut(&mut self, long_id: u32) -> Option<&mut FtCandidateInfo> {
        self.entries.iter_mut().find(|e| e.long_id == long_id)
    }

    pub fn remove(&mut self, long_id: u32) -> Option<FtCandidateInfo> {
        let i = self.entries.iter().position(|e| e.long_id == long_id)?;
        Some(self.entries.swap_remove(i))
    }

    /// Forget candidates not heard from within `expiry`, other than `keep`
    pub fn expire(&mut self, now: Ts, expiry: Ts, keep: Option<u32>) {
        let mut i = 0;
        while i < self.entries.len() {
            let e = &self.entries[i];
            if Some(e.long_id) != keep && now.saturating_sub(e.last_seen) > expiry {
                debug!("FT candidate {:08x} expired", e.long_id);
                self.entries.swap_remove(i);
            } else {
                i += 1;
            }
        }
    }

    /// Strongest eligible candidate, ties go to the earliest entry
    pub fn best(&self, now: Ts, rssi_threshold: i16, max_attempts: u8) -> Option<&FtCandidateInfo> {
        self.entries
            .iter()
            .filter(|e| e.is_eligible(now, rssi_threshold, max_attempts))
            .fold(None, |best: Option<&FtCandidateInfo>, e| match best {
                Some(b) if b.rssi_dbm >= e.rssi_dbm => Some(b),
                _ => Some(e),
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = &FtCandidateInfo> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Association record, held by an FT for each PT and by a PT for its FT
#[derive(Debug, Clone, PartialEq)]
pub struct AssociatedPtInfo {
    pub long_id: u32,
    pub short_id: u16,
    pub network_id: u32,
    pub channel: ChannelId,
    pub flow_id: u8,
    pub associated_at: Ts,
    pub last_seen: Ts,
}

/// Bounded associated peer table keyed by long RD ID
#[derive(Debug, Clone, Default)]
pub struct Peers<const N: usize = MAX_PEERS> {
    entries: Vec<AssociatedPtInfo, N>,
}

impl<const N: usize> Peers<N> {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn get(&self, long_id: u32) -> Option<&AssociatedPtInfo> {
        self.entries.iter().find(|e| e.long_id == long_id)
    }

    pub fn get_mut(&mut self, long_id: u32) -> Option<&mut AssociatedPtInfo> {
        self.entries.iter_mut().find(|e| e.long_id == long_id)
    }

    /// Insert or replace the entry for `p.long_id`, failing when full
    pub fn insert(&mut self, p: AssociatedPtInfo) -> Result<(), AssociatedPtInfo> {
        if let Some(e) = self.get_mut(p.long_id) {
            *e = p;
            return Ok(());
        }
        self.entries.push(p)
    }

    pub fn remove(&mut self, long_id: u32) -> Option<AssociatedPtInfo> {
        let i = self.entries.iter().position(|e| e.long_id == long_id)?;
        Some(self.entries.swap_remove(i))
    }

    /// Remove peers not heard from within `timeout`, handing each to `lost`
    pub fn expire<F: FnMut(&AssociatedPtInfo)>(&mut self, now: Ts, timeout: Ts, mut lost: F) {
        let mut i = 0;
        while i < self.entries.len() {
            if now.saturating_sub(self.entries[i].last_seen) > timeout {
                let p = self.entries.swap_remove(i);
                lost(&p);
            } else {
                i += 1;
            }
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() == self.entries.capacity()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AssociatedPtInfo> {
        self.entries.iter()
    }
}
