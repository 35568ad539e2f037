//! Compile-time configuration

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::Duration;
use rand_core::RngCore;

use crate::{
    clock::{reader::DEFAULT_SAMPLE_LATENCY_US, FrequencyBounds},
    coupling::CouplingTable,
    phy::{Modulation, PlcPhy},
    time::TimeService,
};

/// The default depth of the event queue between the driver and the session
pub const EVENT_QUEUE_SIZE: usize = 8;

/// Metadata trait to contain relevant generics
pub trait PalCfg {
    /// Mutex type used for the event queue
    type Mutex: RawMutex + 'static;

    /// Transceiver driver
    type Phy: PlcPhy;

    /// Host counter and timers
    type Time: TimeService;

    /// Board coupling data
    type Coupling: CouplingTable;

    /// Random number generator, used for probe start jitter
    type Rand: RngCore;

    /// Half width of the accepted clock rate band, in ppm
    const PPM_TOLERANCE: u32 = 200;

    /// Latency between the host sample and the transceiver latching its
    /// counter, in microseconds
    const SAMPLE_LATENCY_US: u32 = DEFAULT_SAMPLE_LATENCY_US;

    /// Attenuation of impedance detection probes, in dB
    const PROBE_ATTENUATION: u8 = 3;

    /// Length of impedance detection probes, in bytes
    const PROBE_LEN: usize = 64;

    /// Minimum delay before a probe goes out
    const PROBE_MIN_DELAY: Duration = Duration::from_millis(10);

    /// Random delay added on top of [`PalCfg::PROBE_MIN_DELAY`]
    const PROBE_JITTER: Duration = Duration::from_millis(40);

    /// Scheme probes are sent with
    const PROBE_SCHEME: Modulation = Modulation::DbpskC;
}

/// The clock rate band for `Cfg`
pub fn frequency_bounds<Cfg: PalCfg>() -> FrequencyBounds {
    FrequencyBounds::from_ppm(Cfg::PPM_TOLERANCE)
}
