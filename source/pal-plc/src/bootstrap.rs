//! Impedance detection bootstrap
//!
//! Once the transceiver is up, it needs to learn the line impedance
//! before it can transmit at the right level. It does that on its own
//! while transmitting, so the bootstrap sends short probe bursts on a
//! dedicated impedance detection channel until one is confirmed, then
//! moves to the default channel and starts accepting frames.
//!
//! ```text
//! Init -> Probing -+-> Succeeded -> DefaultConfigured
//!                  |
//!                  +-> FallbackProbe -+-> Succeeded -> ...
//!                         ^           |
//!                         +-----------+
//! ```
//!
//! If the default channel can't be configured after a successful probe,
//! the bootstrap falls back to probing.
//!
//! There is no retry limit. Without coupling, the node can't do anything
//! useful anyway.

use embassy_time::Duration;
use rand_core::RngCore;

use crate::{
    config::PalCfg,
    coupling::{apply_coupling, CouplingTable},
    phy::{Channel, FrameType, Modulation, PlcPhy, TxRequest, TxResult, TxTime},
};

/// Longest probe burst
pub const MAX_PROBE_LEN: usize = 128;

const PROBE_PATTERN: [u8; 4] = [0x55, 0xAA, 0x33, 0xCC];

/// Bootstrap progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
pub enum BootstrapState {
    /// Not started, or restarted after an exception
    Init,
    /// First probe sent
    Probing,
    /// A probe was confirmed
    Succeeded,
    /// A probe failed, another one is out
    FallbackProbe,
    /// Default channel configured, receiving
    DefaultConfigured,
}

/// What the caller should do after feeding a confirm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
pub enum BootstrapStep {
    /// The confirm wasn't for a probe
    Ignored,
    /// Still probing
    Probing,
    /// Default configuration applied, the PAL is ready
    Ready,
}

/// Bootstrap errors
#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
#[non_exhaustive]
pub enum BootstrapError<E> {
    /// The coupling table has no entry for the channel
    NoCoupling(Channel),
    /// Driver error
    Phy(E),
}

impl<E> From<E> for BootstrapError<E> {
    fn from(value: E) -> Self {
        Self::Phy(value)
    }
}

/// Probe transmission parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeConfig {
    /// Attenuation, dB
    pub attenuation: u8,
    /// Burst length, clamped to `1..=MAX_PROBE_LEN`
    pub len: usize,
    /// Minimum start delay
    pub min_delay: Duration,
    /// Random extra start delay, exclusive upper bound
    pub jitter: Duration,
    /// Scheme
    pub scheme: Modulation,
}

impl ProbeConfig {
    /// The probe parameters of `Cfg`
    pub fn from_cfg<Cfg: PalCfg>() -> Self {
        Self {
            attenuation: Cfg::PROBE_ATTENUATION,
            len: Cfg::PROBE_LEN,
            min_delay: Cfg::PROBE_MIN_DELAY,
            jitter: Cfg::PROBE_JITTER,
            scheme: Cfg::PROBE_SCHEME,
        }
    }
}

/// The bootstrap state machine
pub struct ImpedanceBootstrap {
    state: BootstrapState,
    cfg: ProbeConfig,
    in_flight: bool,
    probes: u32,
}

impl ImpedanceBootstrap {
    /// A bootstrap in [`BootstrapState::Init`]
    pub const fn new(cfg: ProbeConfig) -> Self {
        Self {
            state: BootstrapState::Init,
            cfg,
            in_flight: false,
            probes: 0,
        }
    }

    /// Current state
    #[inline]
    pub fn state(&self) -> BootstrapState {
        self.state
    }

    /// Probes handed to the driver since the last (re)start
    #[inline]
    pub fn probes_sent(&self) -> u32 {
        self.probes
    }

    /// Is the bootstrap waiting to resend a probe the driver refused?
    #[inline]
    pub fn retry_pending(&self) -> bool {
        matches!(
            self.state,
            BootstrapState::Probing | BootstrapState::FallbackProbe
        ) && !self.in_flight
    }

    /// Send the first probe.
    pub fn start<P, C, R>(
        &mut self,
        phy: &mut P,
        coupling: &C,
        rand: &mut R,
    ) -> Result<(), BootstrapError<P::Error>>
    where
        P: PlcPhy,
        C: CouplingTable,
        R: RngCore,
    {
        self.probes = 0;
        self.state = BootstrapState::Probing;
        pal_info!("bootstrap: probing");
        self.probe(phy, coupling, rand)
    }

    /// Resend the probe after the driver refused it
    pub fn retry<P, C, R>(
        &mut self,
        phy: &mut P,
        coupling: &C,
        rand: &mut R,
    ) -> Result<(), BootstrapError<P::Error>>
    where
        P: PlcPhy,
        C: CouplingTable,
        R: RngCore,
    {
        if !self.retry_pending() {
            return Ok(());
        }
        self.probe(phy, coupling, rand)
    }

    /// Feed a transmission confirm
    pub fn on_tx_confirm<P, C, R>(
        &mut self,
        result: TxResult,
        phy: &mut P,
        coupling: &C,
        rand: &mut R,
    ) -> Result<BootstrapStep, BootstrapError<P::Error>>
    where
        P: PlcPhy,
        C: CouplingTable,
        R: RngCore,
    {
        let probing = matches!(
            self.state,
            BootstrapState::Probing | BootstrapState::FallbackProbe
        );
        if !probing || !self.in_flight {
            return Ok(BootstrapStep::Ignored);
        }
        self.in_flight = false;

        if result != TxResult::Success {
            pal_warn!("bootstrap: probe failed, retrying");
            self.state = BootstrapState::FallbackProbe;
            self.probe(phy, coupling, rand)?;
            return Ok(BootstrapStep::Probing);
        }

        self.state = BootstrapState::Succeeded;
        if let Err(e) = Self::configure_default(phy, coupling) {
            // nothing in flight, so the next retry() probes again
            pal_warn!("bootstrap: default channel setup failed, probing again");
            self.state = BootstrapState::FallbackProbe;
            return Err(e);
        }

        self.state = BootstrapState::DefaultConfigured;
        phy.set_rx_indications(true);
        pal_info!("bootstrap: ready after {=u32} probes", self.probes);
        Ok(BootstrapStep::Ready)
    }

    /// Back to [`BootstrapState::Init`], receiving disabled
    pub fn restart<P: PlcPhy>(&mut self, phy: &mut P) {
        phy.set_rx_indications(false);
        self.state = BootstrapState::Init;
        self.in_flight = false;
    }

    fn configure_default<P, C>(phy: &mut P, coupling: &C) -> Result<(), BootstrapError<P::Error>>
    where
        P: PlcPhy,
        C: CouplingTable,
    {
        let channel = coupling.default_channel();
        let params = coupling
            .channel_config(channel)
            .ok_or(BootstrapError::NoCoupling(channel))?;
        apply_coupling(phy, channel, params)?;
        Ok(())
    }

    fn probe<P, C, R>(
        &mut self,
        phy: &mut P,
        coupling: &C,
        rand: &mut R,
    ) -> Result<(), BootstrapError<P::Error>>
    where
        P: PlcPhy,
        C: CouplingTable,
        R: RngCore,
    {
        let channel = coupling.impedance_detection_channel();
        let params = coupling
            .channel_config(channel)
            .ok_or(BootstrapError::NoCoupling(channel))?;
        apply_coupling(phy, channel, params)?;

        let mut buf = [0u8; MAX_PROBE_LEN];
        let len = self.cfg.len.clamp(1, MAX_PROBE_LEN);
        buf.iter_mut()
            .zip(PROBE_PATTERN.iter().cycle())
            .for_each(|(b, p)| *b = *p);

        let jitter = self.cfg.jitter.as_micros();
        let extra = match jitter {
            0 => 0,
            j => u64::from(rand.next_u32()) % j,
        };
        let delay = self.cfg.min_delay.as_micros() + extra;

        phy.tx_request(&TxRequest {
            data: &buf[..len],
            time: TxTime::Relative(u32::try_from(delay).unwrap_or(u32::MAX)),
            attenuation: self.cfg.attenuation,
            scheme: self.cfg.scheme,
            frame_type: FrameType::A,
        })?;
        self.in_flight = true;
        self.probes = self.probes.saturating_add(1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        mock::{test_rng, MockCoupling, MockPhy, TestCfg},
        phy::PibAttr,
    };

    fn rig() -> (MockPhy, MockCoupling, rand_chacha::ChaCha8Rng, ImpedanceBootstrap) {
        (
            MockPhy::new(),
            MockCoupling::new(),
            test_rng(),
            ImpedanceBootstrap::new(ProbeConfig::from_cfg::<TestCfg>()),
        )
    }

    #[test]
    fn busy_channel_three_times_then_success() {
        let (mut phy, coupling, mut rng, mut bs) = rig();
        bs.start(&mut phy, &coupling, &mut rng).unwrap();
        assert_eq!(bs.state(), BootstrapState::Probing);

        for _ in 0..3 {
            let step = bs
                .on_tx_confirm(TxResult::BusyChannel, &mut phy, &coupling, &mut rng)
                .unwrap();
            assert_eq!(step, BootstrapStep::Probing);
            assert_eq!(bs.state(), BootstrapState::FallbackProbe);
            assert!(phy.rx_log().is_empty());
        }
        let step = bs
            .on_tx_confirm(TxResult::Success, &mut phy, &coupling, &mut rng)
            .unwrap();

        assert_eq!(step, BootstrapStep::Ready);
        assert_eq!(bs.state(), BootstrapState::DefaultConfigured);
        assert_eq!(phy.sent().len(), 4);
        assert_eq!(bs.probes_sent(), 4);
        assert_eq!(phy.rx_log(), &[true]);
        // probes on the detection channel, then the default channel
        let channels: Vec<u8> = phy
            .pib_writes()
            .iter()
            .filter(|(a, _)| *a == PibAttr::Channel)
            .map(|(_, v)| v[0])
            .collect();
        assert_eq!(channels, vec![3, 3, 3, 3, 1]);
    }

    #[test]
    fn probes_follow_the_config() {
        let (mut phy, coupling, mut rng, mut bs) = rig();
        bs.start(&mut phy, &coupling, &mut rng).unwrap();
        for _ in 0..20 {
            bs.on_tx_confirm(TxResult::Timeout, &mut phy, &coupling, &mut rng)
                .unwrap();
        }

        for f in phy.sent() {
            assert_eq!(f.data.len(), 64);
            assert_eq!(&f.data[..6], &[0x55, 0xAA, 0x33, 0xCC, 0x55, 0xAA]);
            assert_eq!(f.attenuation, 3);
            assert_eq!(f.scheme, Modulation::DbpskC);
            assert_eq!(f.frame_type, FrameType::A);
            let TxTime::Relative(us) = f.time else {
                panic!("probe time {:?}", f.time);
            };
            assert!((10_000..50_000).contains(&us), "{us}");
        }
        // not every probe starts at the same offset
        let first = phy.sent()[0].time;
        assert!(phy.sent().iter().any(|f| f.time != first));
    }

    #[test]
    fn stray_confirms_are_ignored() {
        let (mut phy, coupling, mut rng, mut bs) = rig();
        let step = bs
            .on_tx_confirm(TxResult::Success, &mut phy, &coupling, &mut rng)
            .unwrap();
        assert_eq!(step, BootstrapStep::Ignored);
        assert_eq!(bs.state(), BootstrapState::Init);
        assert!(phy.sent().is_empty());
    }

    #[test]
    fn refused_probe_is_retried() {
        let (mut phy, coupling, mut rng, mut bs) = rig();
        phy.fail_tx(true);
        assert!(matches!(
            bs.start(&mut phy, &coupling, &mut rng),
            Err(BootstrapError::Phy(_))
        ));
        assert!(bs.retry_pending());

        phy.fail_tx(false);
        bs.retry(&mut phy, &coupling, &mut rng).unwrap();
        assert!(!bs.retry_pending());
        assert_eq!(phy.sent().len(), 1);
    }

    #[test]
    fn failed_default_setup_probes_again() {
        let (mut phy, coupling, mut rng, mut bs) = rig();
        bs.start(&mut phy, &coupling, &mut rng).unwrap();

        phy.fail_pib(true);
        assert!(matches!(
            bs.on_tx_confirm(TxResult::Success, &mut phy, &coupling, &mut rng),
            Err(BootstrapError::Phy(_))
        ));
        assert_eq!(bs.state(), BootstrapState::FallbackProbe);
        assert!(bs.retry_pending());
        assert!(phy.rx_log().is_empty());

        phy.fail_pib(false);
        bs.retry(&mut phy, &coupling, &mut rng).unwrap();
        assert_eq!(phy.sent().len(), 2);
        let step = bs
            .on_tx_confirm(TxResult::Success, &mut phy, &coupling, &mut rng)
            .unwrap();
        assert_eq!(step, BootstrapStep::Ready);
        assert_eq!(bs.state(), BootstrapState::DefaultConfigured);
        assert_eq!(phy.rx_log(), &[true]);
    }

    #[test]
    fn restart_disables_reception() {
        let (mut phy, coupling, mut rng, mut bs) = rig();
        bs.start(&mut phy, &coupling, &mut rng).unwrap();
        bs.on_tx_confirm(TxResult::Success, &mut phy, &coupling, &mut rng)
            .unwrap();
        bs.restart(&mut phy);
        assert_eq!(bs.state(), BootstrapState::Init);
        assert_eq!(phy.rx_log(), &[true, false]);

        bs.start(&mut phy, &coupling, &mut rng).unwrap();
        assert_eq!(bs.probes_sent(), 1);
        assert_eq!(phy.sent().len(), 2);
    }
}
