//! # PAL PLC
//!
//! This is the Platform Abstraction Layer between a PRIME MAC layer and a
//! power-line communication transceiver. The transceiver is an external
//! chip, reached over a half-duplex register interface (SPI in practice),
//! with its own free-running microsecond counter.
//!
//! The PAL does not drive the chip itself. The integrator supplies the
//! driver, the host counter and the board's coupling data as trait
//! implementations ([`phy::PlcPhy`], [`time::TimeService`],
//! [`coupling::CouplingTable`]), bundled in a [`config::PalCfg`].
//!
//! ## Clock domains
//!
//! Everything the transceiver reports (received frames, transmission
//! confirms, zero crossings, carrier detection) is stamped with its own
//! counter, and every scheduled transmission must be given in it. The MAC
//! layer only knows host time. The two counters run at slightly
//! different, drifting rates.
//!
//! The PAL keeps an affine mapping between them: one reference pair,
//! sampled as close together as possible, and the ratio of the two rates
//! as Q1.24 fixed point. The mapping is refreshed on a one-shot timer:
//!
//! 1. Sample both counters inside a critical section
//! 2. Compute the rate ratio from the elapsed ticks on each side
//! 3. If the ratio is outside the plausibility band (±200 ppm by
//!    default), throw the mapping away and start over from a fresh pair
//! 4. Otherwise adopt it, and wait longer before the next refresh:
//!    50 ms, 250 ms, 1 s, then every 5 s
//!
//! Translation works on signed 32-bit deltas around the reference pair,
//! so both counters may wrap freely. Where the MAC layer needs times
//! beyond the 32-bit range, they are extended to 64 bits.
//!
//! ## Bootstrap
//!
//! After the transceiver comes up, it has to detect the line impedance
//! before it can transmit properly. The PAL sends probe bursts on a
//! dedicated channel, with a random start offset, until one is confirmed.
//! Only then is the default channel configured and reception enabled.
//!
//! ## Modulation suggestions
//!
//! Each received frame comes with quality telemetry (EVM, CINR, soft BER,
//! noise). The PAL checks it against a per-scheme table of conditions and
//! attaches the fastest scheme the link would support to the indication.
//!
//! ## Execution model
//!
//! There is one [`session::PalSession`] per transceiver, driven by a
//! single polling loop. Anything that happens in interrupt context (frame
//! received, transmission done, exception, timer fired) is posted through
//! an [`event::PalNotifier`] into an
//! [embassy-sync](https://docs.rs/embassy-sync) channel, and handled the
//! next time the loop calls [`session::PalSession::poll()`]. Only the
//! loop ever touches the clock mapping or the driver.
//!
//! Received frames travel in slots of an [`rx_pool::RxStorage`], which
//! the driver fills from interrupt context and the MAC layer frees by
//! dropping them.
//!
//! ## Errors
//!
//! The MAC-facing surface only reports [`PalError::InvalidInput`].
//! Driver failures, implausible clock measurements and transceiver
//! exceptions are handled inside and counted in [`stats::PalStats`].
//!
//! ## Logging
//!
//! With the `defmt-logging` feature, the PAL logs through
//! [defmt](https://docs.rs/defmt), and public types implement
//! `defmt::Format`. Without it, logging compiles to nothing.

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![warn(missing_docs)]

#[macro_use]
mod macros;

pub mod attr;
pub mod bootstrap;
pub mod capture;
pub mod clock;
pub mod config;
pub mod coupling;
pub mod duration;
pub mod event;
pub mod modulation;
pub mod phy;
pub mod rx_pool;
pub mod session;
pub mod stats;
pub mod time;

#[cfg(test)]
mod mock;

pub use crate::{
    config::PalCfg,
    event::{PalEvent, PalNotifier},
    session::{PalIndication, PalSession, PalStatus},
};

/// The error type of the MAC-facing interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PalError {
    /// The request was malformed, not possible in the current state, or
    /// the transceiver refused it
    InvalidInput,
}
