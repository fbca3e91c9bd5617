
#[allow(unused_imports)]
use micromath::F32Ext;

use crate::ChannelId;

/// Static radio band configuration, ETSI TS 103 636-2 table 5.4.2-1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BandParameters {
    pub band: u8,
    /// Centre frequency of the first channel in Hz
    pub start_hz: u64,
    /// Centre frequency of the last channel in Hz
    pub stop_hz: u64,
    /// Channel raster in Hz
    pub step_hz: u64,
    /// First nominal channel number
    pub n_start: ChannelId,
    /// Last nominal channel number
    pub n_end: ChannelId,
}

/// Supported bands
pub const BANDS: &[BandParameters] = &[
    BandParameters { band: 1, start_hz: 1_881_792_000, stop_hz: 1_899_072_000, step_hz: 864_000, n_start: 1657, n_end: 1677 },
    BandParameters { band: 2, start_hz: 1_901_664_000, stop_hz: 1_918_994_000, step_hz: 864_000, n_start: 1680, n_end: 1700 },
    BandParameters { band: 20, start_hz: 3_802_388_000, stop_hz: 4_198_100_000, step_hz: 1_728_000, n_start: 3416, n_end: 3645 },
    BandParameters { band: 21, start_hz: 3_700_436_000, stop_hz: 3_798_932_000, step_hz: 1_728_000, n_start: 3357, n_end: 3414 },
];

/// Frequency of nominal channel zero for bands 1 to 12 and 22
const F0_HZ: u64 = 450_144_000;
const RASTER_HZ: u64 = 864_000;

/// Thermal noise floor for a 1.728 MHz channel
pub const NOISE_FLOOR_DBM: i16 = -111;

/// Reported for zero or negative linear power
pub const MIN_POWER_DBM: f32 = -150.0;

impl BandParameters {
    /// Look up a band by number
    pub fn get(band: u8) -> Option<&'static BandParameters> {
        BANDS.iter().find(|b| b.band == band)
    }

    pub fn contains(&self, channel: ChannelId) -> bool {
        channel >= self.n_start && channel <= self.n_end
    }

    pub fn num_channels(&self) -> usize {
        (self.n_end - self.n_start) as usize + 1
    }

    /// Nominal channel numbers in the band
    pub fn channels(&self) -> impl Iterator<Item = ChannelId> {
        self.n_start..=self.n_end
    }

    /// Centre frequency of a channel in this band
    pub fn center_frequency_hz(&self, channel: ChannelId) -> Option<u64> {
        if !self.contains(channel) {
            return None;
        }

        match self.band {
            1..=12 | 22 => Some(F0_HZ + channel as u64 * RASTER_HZ),
            _ => None,
        }
    }
}

/// Find the band a nominal channel number belongs to
pub fn band_of(channel: ChannelId) -> Option<&'static BandParameters> {
    BANDS.iter().find(|b| b.contains(channel))
}

/// Centre frequency for any supported channel, `None` for unknown channels
/// or bands without a raster formula
pub fn center_frequency_hz(channel: ChannelId) -> Option<u64> {
    band_of(channel).and_then(|b| b.center_frequency_hz(channel))
}

/// Convert dBm to linear milliwatts
pub fn dbm_to_mw(dbm: f32) -> f32 {
    10f32.powf(dbm / 10.0)
}

/// Convert linear milliwatts to dBm
pub fn mw_to_dbm(mw: f32) -> f32 {
    if mw <= 0.0 {
        return MIN_POWER_DBM;
    }
    10.0 * mw.log10()
}
