//! MAC state and counters

use crate::Ts;

/// Association state, beaconing runs independently of this
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AssocState {
    Idle,
    /// Listening for FT beacons
    Scanning,
    /// Request sent to the FT with this long RD ID, awaiting response until `expiry`
    Associating { ft: u32, expiry: Ts },
    Associated { ft: u32 },
}

impl AssocState {
    pub fn is_idle(&self) -> bool {
        matches!(self, AssocState::Idle)
    }

    pub fn is_scanning(&self) -> bool {
        matches!(self, AssocState::Scanning)
    }

    pub fn is_associating(&self) -> bool {
        matches!(self, AssocState::Associating { .. })
    }

    pub fn is_associated(&self) -> bool {
        matches!(self, AssocState::Associated { .. })
    }

    /// FT this device is associating or associated with
    pub fn ft(&self) -> Option<u32> {
        match self {
            AssocState::Associating { ft, .. } | AssocState::Associated { ft } => Some(*ft),
            _ => None,
        }
    }
}

/// MAC layer counters, all saturating
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MacStats {
    pub network_beacons_sent: u32,
    pub network_beacons_received: u32,
    pub network_beacons_skipped: u32,

    pub cluster_beacons_sent: u32,
    pub cluster_beacons_received: u32,
    pub cluster_beacons_skipped: u32,

    pub association_requests_sent: u32,
    /// Requests held back because the random access window had no room
    pub association_requests_deferred: u32,
    pub association_requests_received: u32,
    pub association_responses_sent: u32,
    pub association_responses_received: u32,

    pub associations_succeeded: u32,
    pub associations_rejected: u32,
    pub association_timeouts: u32,
    /// Associations ended by keep-alive expiry
    pub associations_lost: u32,

    /// Frames that could not be encoded or handed to the PHY
    pub tx_failures: u32,
    /// Operating channel changed on reselection
    pub channel_changes: u32,

    pub decode_errors: u32,
    /// Responses with no matching outstanding request
    pub stale_responses: u32,
    pub frames_below_floor: u32,
}

impl MacStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Beacon cycles that went without a transmission, both kinds
    pub fn beacons_skipped(&self) -> u32 {
        self.network_beacons_skipped.saturating_add(self.cluster_beacons_skipped)
    }
}

/// Bump a counter
pub(crate) fn inc(c: &mut u32) {
    *c = c.saturating_add(1);
}
