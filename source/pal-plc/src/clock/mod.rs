//! Host/transceiver clock synchronization
//!
//! The transceiver stamps everything (received frames, transmission
//! confirms, zero crossings) with its own free-running microsecond
//! counter. Upper layers only know the host counter. This module keeps an
//! estimate of how the two relate and translates in both directions.
//!
//! * [`reader`] samples both counters as one pair
//! * [`fixed`] holds the Q1.24 rate ratio and its arithmetic
//! * [`mapping`] translates timestamps around a reference pair
//! * [`sync`] refines the mapping on a growing resync cadence

pub mod fixed;
pub mod mapping;
pub mod reader;
pub mod sync;

pub use fixed::{FrequencyBounds, RelativeFrequency};
pub use mapping::{ClockMapping, ExtendedTime};
pub use reader::{ClockPair, DualClockReader};
pub use sync::{ClockSync, ResyncInterval, SyncOutcome, SyncState, RESYNC_LADDER};

/// Clock synchronization errors
#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
#[non_exhaustive]
pub enum SyncError<E> {
    /// The transceiver time reference could not be read
    Phy(E),
}

impl<E> From<E> for SyncError<E> {
    fn from(value: E) -> Self {
        SyncError::Phy(value)
    }
}
