//! Paired host/transceiver counter sampling

use crate::{
    phy::{PibAttr, PlcPhy},
    time::TimeService,
};

use super::SyncError;

/// Default latency between latching the host counter and the transceiver
/// latching its own, in microseconds
pub const DEFAULT_SAMPLE_LATENCY_US: u32 = 5;

/// One simultaneous sample of both clocks, in microseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
pub struct ClockPair {
    /// Host time, latency corrected
    pub local: u32,
    /// Transceiver time
    pub remote: u32,
}

/// Samples both counters as close together as possible
///
/// The transceiver counter is read over the register interface, which
/// latches the value a roughly constant time after the request goes out.
/// That latency is added to the host sample so both halves of the pair
/// describe the same instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DualClockReader {
    latency_us: u32,
}

impl DualClockReader {
    /// A reader correcting for `latency_us`
    pub const fn new(latency_us: u32) -> Self {
        Self { latency_us }
    }

    /// Sample both clocks.
    ///
    /// Both reads happen inside one critical section, so no interrupt can
    /// land between them. On a driver error nothing is returned.
    pub fn read_pair<P, T>(&self, phy: &mut P, time: &T) -> Result<ClockPair, SyncError<P::Error>>
    where
        P: PlcPhy,
        T: TimeService,
    {
        let mut raw = [0u8; 4];
        let (local_ticks, res) = critical_section::with(|_| {
            let local = time.now_ticks();
            let res = phy.pib_get(PibAttr::TimeRef, &mut raw);
            (local, res)
        });
        res?;

        Ok(ClockPair {
            local: time.ticks_to_us(local_ticks).wrapping_add(self.latency_us),
            remote: u32::from_le_bytes(raw),
        })
    }
}

impl Default for DualClockReader {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_LATENCY_US)
    }
}
