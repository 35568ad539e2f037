//! Clock-domain translation
//!
//! The host and the transceiver each run a free 32-bit microsecond
//! counter. A [`ClockMapping`] ties them together with one reference pair
//! sampled at (nearly) the same instant, and the ratio of their rates.
//! Translation is an affine transform around the reference pair.
//!
//! All deltas are taken as signed 32-bit values, so timestamps within
//! half the counter range (about 35 minutes) of the reference translate
//! correctly across a counter wrap. The resync cadence keeps real deltas
//! far inside that.

use super::{
    fixed::RelativeFrequency,
    sync::ResyncInterval,
};

/// The live affine mapping between host and transceiver time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
pub struct ClockMapping {
    /// Host time at the last sync, microseconds
    pub local_ref: u32,
    /// Transceiver time at the last sync, microseconds
    pub remote_ref: u32,
    /// Host ticks per transceiver tick
    pub rel_freq: RelativeFrequency,
    /// Current step of the resync ladder
    pub interval: ResyncInterval,
    /// The reference pair came from a successful read
    pub plausible: bool,
}

impl ClockMapping {
    /// A mapping with no reference and identity frequency
    pub const fn new() -> Self {
        Self {
            local_ref: 0,
            remote_ref: 0,
            rel_freq: RelativeFrequency::IDENTITY,
            interval: ResyncInterval::Owed,
            plausible: false,
        }
    }

    /// Translate a transceiver timestamp to host time
    pub fn to_local(&self, remote: u32) -> u32 {
        let delay_remote = remote.wrapping_sub(self.remote_ref) as i32;
        let delay_local = self.rel_freq.scale(delay_remote);
        self.local_ref.wrapping_add(delay_local as u32)
    }

    /// Translate a host timestamp to transceiver time
    pub fn to_remote(&self, local: u32) -> u32 {
        let delay_local = local.wrapping_sub(self.local_ref) as i32;
        let delay_remote = self.rel_freq.unscale(delay_local);
        self.remote_ref.wrapping_add(delay_remote as u32)
    }
}

impl Default for ClockMapping {
    fn default() -> Self {
        Self::new()
    }
}

/// Extends a wrapping 32-bit time to a 64-bit one
///
/// Callers must sample at least once per half wrap of the 32-bit counter.
/// A sample less than half a wrap behind the latest one is an earlier
/// instant, not a wrap: translated timestamps move back a little whenever
/// the clock mapping is refreshed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtendedTime {
    latest: Option<u64>,
}

impl ExtendedTime {
    /// No samples yet
    pub const fn new() -> Self {
        Self { latest: None }
    }

    /// Fold `sample` into the 64-bit time line
    pub fn extend(&mut self, sample: u32) -> u64 {
        let Some(latest) = self.latest else {
            self.latest = Some(u64::from(sample));
            return u64::from(sample);
        };

        let step = sample.wrapping_sub(latest as u32) as i32;
        if step < 0 {
            // behind the latest sample, leave the time line where it is
            return latest.saturating_sub(u64::from(step.unsigned_abs()));
        }
        let now = latest + u64::from(step.unsigned_abs());
        self.latest = Some(now);
        now
    }
}
