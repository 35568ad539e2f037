//! Session statistics

use crate::phy::ExceptionKind;

/// Counters kept by a [`PalSession`][crate::session::PalSession]
///
/// All counters saturate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PalStats {
    /// Unexpected SPI key exceptions
    pub exc_unexpected_key: u32,
    /// Critical error exceptions
    pub exc_critical: u32,
    /// Debug mode exceptions
    pub exc_debug: u32,
    /// Transceiver reset exceptions
    pub exc_reset: u32,
    /// Clock measurements rejected as implausible
    pub sync_rejections: u32,
    /// Failed time reference reads
    pub sync_read_failures: u32,
    /// Frames delivered upward
    pub rx_frames: u32,
    /// Frames dropped (before the bootstrap finished)
    pub rx_dropped: u32,
    /// Transmissions handed to the driver
    pub tx_requests: u32,
    /// Confirms delivered upward
    pub tx_confirms: u32,
}

impl PalStats {
    /// Count one exception
    pub fn record_exception(&mut self, kind: ExceptionKind) {
        let ctr = match kind {
            ExceptionKind::UnexpectedKey => &mut self.exc_unexpected_key,
            ExceptionKind::CriticalError => &mut self.exc_critical,
            ExceptionKind::Debug => &mut self.exc_debug,
            ExceptionKind::Reset => &mut self.exc_reset,
        };
        bump(ctr);
    }
}

#[inline]
pub(crate) fn bump(ctr: &mut u32) {
    *ctr = ctr.saturating_add(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exceptions_are_counted_per_kind() {
        let mut s = PalStats::default();
        s.record_exception(ExceptionKind::Reset);
        s.record_exception(ExceptionKind::Reset);
        s.record_exception(ExceptionKind::Debug);
        assert_eq!((s.exc_reset, s.exc_debug, s.exc_critical), (2, 1, 0));

        s.exc_unexpected_key = u32::MAX;
        s.record_exception(ExceptionKind::UnexpectedKey);
        assert_eq!(s.exc_unexpected_key, u32::MAX);
    }
}
