//! The MAC-facing PAL session
//!
//! A [`PalSession`] owns everything the PAL needs for one transceiver:
//! the driver, the host time service, the coupling data, the clock
//! mapping and the bootstrap sequencer. It is driven from a single
//! polling loop. Interrupt context only ever talks to it through the
//! event queue, see [`PalNotifier`][crate::event::PalNotifier].
//!
//! All timestamps crossing this interface are host time, in
//! microseconds. Translation to and from the transceiver clock happens
//! inside.

use embassy_sync::channel::Receiver;
use embassy_time::Duration;

use crate::{
    attr::{self, AttrValue, PalAttr, Target},
    bootstrap::{BootstrapError, BootstrapStep, ImpedanceBootstrap, ProbeConfig},
    capture::{CaptureWindow, SignalCapture},
    clock::{
        ClockMapping, ClockSync, DualClockReader, ExtendedTime, SyncOutcome, SyncState,
    },
    config::{frequency_bounds, PalCfg, EVENT_QUEUE_SIZE},
    coupling::{apply_coupling, CouplingTable},
    duration::message_duration,
    event::PalEvent,
    modulation::{classify, less_robust, meets_minimum_quality, snr_from_cinr},
    phy::{
        Channel, ExceptionKind, FrameType, Modulation, PibAttr, PlcPhy, RxIndication, TxConfirm,
        TxRequest, TxResult, TxTime, MAX_PSDU_LEN,
    },
    rx_pool::RxFrame,
    stats::{bump, PalStats},
    time::TimeService,
    PalError,
};

/// Highest accepted transmission attenuation, dB
pub const MAX_ATTENUATION: u8 = 31;

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
pub enum PalStatus {
    /// Created, [`PalSession::start()`] not called yet
    Idle,
    /// Impedance detection running
    Bootstrapping,
    /// Default channel configured, frames flow
    Ready,
}

/// When a frame should be sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PalTxTime {
    /// At the given host time, microseconds
    At(u32),
    /// After a delay
    After(Duration),
    /// Cancel the pending transmission
    Cancel,
}

/// A transmission request from the MAC layer
#[derive(Debug)]
pub struct PalDataRequest<'a> {
    /// The PSDU, `1..=MAX_PSDU_LEN` bytes
    pub data: &'a [u8],
    /// Transmission time
    pub time: PalTxTime,
    /// Attenuation, `0..=MAX_ATTENUATION` dB
    pub attenuation: u8,
    /// Modulation scheme
    pub scheme: Modulation,
    /// Frame type
    pub frame_type: FrameType,
}

/// A received frame, as delivered to the MAC layer
pub struct PalRxIndication {
    /// The PSDU
    pub frame: RxFrame,
    /// End of reception, host time
    pub time_us: u32,
    /// Frame duration, microseconds
    pub duration_us: u32,
    /// Scheme the frame was received with
    pub scheme: Modulation,
    /// Frame type
    pub frame_type: FrameType,
    /// Received signal strength, dBuV
    pub rssi: u8,
    /// Link quality on the `0..=7` scale
    pub snr: u8,
    /// Less robust scheme the link could take, if any
    pub suggested: Option<Modulation>,
    /// Bit rate on this channel: of `suggested` when set, otherwise of
    /// `scheme`
    pub bitrate: u32,
}

/// A transmission confirm, as delivered to the MAC layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
pub struct PalTxConfirm {
    /// Outcome
    pub result: TxResult,
    /// Start of transmission, host time
    pub time_us: u32,
    /// Transmission duration, microseconds
    pub duration_us: u32,
}

/// Something for the MAC layer
pub enum PalIndication {
    /// A frame was received
    Data(PalRxIndication),
    /// A transmission finished
    TxConfirm(PalTxConfirm),
}

/// Carrier detect state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
pub struct CarrierDetect {
    /// A carrier is present
    pub detected: bool,
    /// Its strength, dBuV
    pub rssi: u8,
    /// When it was detected, extended host time. Zero if not detected.
    pub time_us: u64,
}

/// The PAL for one transceiver
pub struct PalSession<'a, Cfg, const N: usize = EVENT_QUEUE_SIZE>
where
    Cfg: PalCfg,
{
    phy: Cfg::Phy,
    time: Cfg::Time,
    coupling: Cfg::Coupling,
    rand: Cfg::Rand,
    events: Receiver<'a, Cfg::Mutex, PalEvent, N>,
    status: PalStatus,
    channel: Channel,
    sync: ClockSync,
    bootstrap: ImpedanceBootstrap,
    cd_time: ExtendedTime,
    zc_time: ExtendedTime,
    host_time: ExtendedTime,
    capture: SignalCapture,
    stats: PalStats,
}

impl<'a, Cfg, const N: usize> PalSession<'a, Cfg, N>
where
    Cfg: PalCfg,
{
    /// Create a new [PalSession].
    ///
    /// Nothing is sent to the transceiver until [`PalSession::start()`].
    pub fn new(
        phy: Cfg::Phy,
        time: Cfg::Time,
        coupling: Cfg::Coupling,
        rand: Cfg::Rand,
        events: Receiver<'a, Cfg::Mutex, PalEvent, N>,
    ) -> Self {
        let channel = coupling.default_channel();
        Self {
            phy,
            time,
            coupling,
            rand,
            events,
            status: PalStatus::Idle,
            channel,
            sync: ClockSync::new(
                frequency_bounds::<Cfg>(),
                DualClockReader::new(Cfg::SAMPLE_LATENCY_US),
            ),
            bootstrap: ImpedanceBootstrap::new(ProbeConfig::from_cfg::<Cfg>()),
            cd_time: ExtendedTime::new(),
            zc_time: ExtendedTime::new(),
            host_time: ExtendedTime::new(),
            capture: SignalCapture::new(),
            stats: PalStats::default(),
        }
    }

    /// The transceiver is up: synchronize clocks and start the bootstrap.
    ///
    /// Calling it again restarts from scratch.
    pub fn start(&mut self) -> Result<(), PalError> {
        pal_info!("pal: start");
        if self.status != PalStatus::Idle {
            self.bootstrap.restart(&mut self.phy);
        }
        self.init_clock();
        self.start_bootstrap()
    }

    /// Handle pending events.
    ///
    /// Returns as soon as there is something for the MAC layer, or the
    /// queue is empty. Call it until it returns `None`.
    pub fn poll(&mut self) -> Option<PalIndication> {
        if self.status != PalStatus::Idle && self.sync.resync_owed() {
            self.resync();
        }
        if self.status == PalStatus::Bootstrapping && self.bootstrap.retry_pending() {
            let res = self
                .bootstrap
                .retry(&mut self.phy, &self.coupling, &mut self.rand);
            if res.is_err() {
                pal_error!("pal: probe retry failed");
            }
        }

        while let Ok(ev) = self.events.try_receive() {
            if let Some(ind) = self.handle(ev) {
                return Some(ind);
            }
        }
        None
    }

    fn handle(&mut self, ev: PalEvent) -> Option<PalIndication> {
        match ev {
            PalEvent::TimerExpired(h) => {
                if self.sync.owns(h) {
                    self.resync();
                }
                None
            }
            PalEvent::TxConfirm(cfm) => self.on_tx_confirm(cfm),
            PalEvent::DataIndication(ind) => self.on_data_indication(ind),
            PalEvent::Exception(kind) => {
                self.on_exception(kind);
                None
            }
        }
    }

    fn on_tx_confirm(&mut self, cfm: TxConfirm) -> Option<PalIndication> {
        match self.status {
            PalStatus::Idle => None,
            PalStatus::Bootstrapping => {
                let res = self.bootstrap.on_tx_confirm(
                    cfm.result,
                    &mut self.phy,
                    &self.coupling,
                    &mut self.rand,
                );
                match res {
                    Ok(BootstrapStep::Ready) => {
                        self.channel = self.coupling.default_channel();
                        self.status = PalStatus::Ready;
                        pal_info!("pal: ready on channel {=u8}", self.channel.raw());
                    }
                    Ok(_) => {}
                    Err(_) => pal_error!("pal: bootstrap step failed"),
                }
                None
            }
            PalStatus::Ready => {
                bump(&mut self.stats.tx_confirms);
                Some(PalIndication::TxConfirm(PalTxConfirm {
                    result: cfm.result,
                    time_us: self.sync.mapping().to_local(cfm.tx_time),
                    duration_us: cfm.duration_us,
                }))
            }
        }
    }

    fn on_data_indication(&mut self, ind: RxIndication) -> Option<PalIndication> {
        if self.status != PalStatus::Ready {
            // Dropping the indication returns its frame to the pool
            bump(&mut self.stats.rx_dropped);
            pal_warn!("pal: frame before ready, dropped");
            return None;
        }
        bump(&mut self.stats.rx_frames);

        let class = classify(ind.scheme, &ind.telemetry, self.channel);
        Some(PalIndication::Data(PalRxIndication {
            frame: ind.frame,
            time_us: self.sync.mapping().to_local(ind.rx_time),
            duration_us: ind.duration_us,
            scheme: ind.scheme,
            frame_type: ind.frame_type,
            rssi: ind.rssi,
            snr: snr_from_cinr(ind.telemetry.cinr_avg),
            suggested: class.target,
            bitrate: class.bitrate,
        }))
    }

    fn on_exception(&mut self, kind: ExceptionKind) {
        self.stats.record_exception(kind);
        pal_warn!("pal: transceiver exception {}", kind);
        if kind == ExceptionKind::Debug || self.status == PalStatus::Idle {
            return;
        }

        // The transceiver counter and its coupling state are gone
        self.bootstrap.restart(&mut self.phy);
        self.init_clock();
        if self.start_bootstrap().is_err() {
            pal_error!("pal: bootstrap restart failed");
        }
    }

    fn init_clock(&mut self) {
        if self.sync.initialize(&mut self.phy, &mut self.time).is_err() {
            bump(&mut self.stats.sync_read_failures);
        }
    }

    fn start_bootstrap(&mut self) -> Result<(), PalError> {
        self.status = PalStatus::Bootstrapping;
        match self
            .bootstrap
            .start(&mut self.phy, &self.coupling, &mut self.rand)
        {
            Ok(()) => Ok(()),
            // retried from poll
            Err(BootstrapError::Phy(_)) => {
                pal_warn!("pal: probe refused");
                Ok(())
            }
            Err(_) => {
                pal_error!("pal: no coupling for impedance detection");
                Err(PalError::InvalidInput)
            }
        }
    }

    fn resync(&mut self) {
        match self.sync.on_resync_tick(&mut self.phy, &mut self.time) {
            Ok(SyncOutcome::Rejected) => bump(&mut self.stats.sync_rejections),
            Ok(_) => {}
            Err(_) => bump(&mut self.stats.sync_read_failures),
        }
    }

    /// Current lifecycle state
    #[inline]
    pub fn status(&self) -> PalStatus {
        self.status
    }

    /// Counters
    #[inline]
    pub fn stats(&self) -> &PalStats {
        &self.stats
    }

    /// The live clock mapping
    #[inline]
    pub fn clock_mapping(&self) -> &ClockMapping {
        self.sync.mapping()
    }

    /// Is the clock mapping being kept fresh?
    #[inline]
    pub fn sync_state(&self) -> SyncState {
        self.sync.state()
    }

    /// The driver
    pub fn phy(&self) -> &Cfg::Phy {
        &self.phy
    }

    /// The driver, mutably
    pub fn phy_mut(&mut self) -> &mut Cfg::Phy {
        &mut self.phy
    }

    /// The host time service
    pub fn time(&self) -> &Cfg::Time {
        &self.time
    }

    /// The host time service, mutably
    pub fn time_mut(&mut self) -> &mut Cfg::Time {
        &mut self.time
    }

    /// The operating channel
    pub fn get_channel(&self) -> Channel {
        self.channel
    }

    /// Switch to `channel`.
    ///
    /// Applies the channel's coupling and re-synchronizes the clocks.
    /// Only possible once the bootstrap has finished.
    pub fn set_channel(&mut self, channel: Channel) -> Result<(), PalError> {
        if self.status != PalStatus::Ready {
            return Err(PalError::InvalidInput);
        }
        let params = self
            .coupling
            .channel_config(channel)
            .ok_or(PalError::InvalidInput)?;
        apply_coupling(&mut self.phy, channel, params).map_err(|_| PalError::InvalidInput)?;

        self.channel = channel;
        pal_info!("pal: channel {=u8}", channel.raw());
        self.init_clock();
        Ok(())
    }

    /// Read configuration attribute `id`
    pub fn get_configuration(&mut self, id: u16) -> Result<AttrValue, PalError> {
        let (attr, route) = attr::check(id, None, false)?;
        let mut out = AttrValue::new();
        match route.target {
            Target::Remote(pib) => {
                out.resize(route.len, 0).map_err(|_| PalError::InvalidInput)?;
                self.phy
                    .pib_get(pib, &mut out)
                    .map_err(|_| PalError::InvalidInput)?;
            }
            Target::Local => {
                let m = self.sync.mapping();
                let res = match attr {
                    PalAttr::Channel => out.extend_from_slice(&[self.channel.raw()]),
                    PalAttr::MaxPsduLen => {
                        out.extend_from_slice(&(MAX_PSDU_LEN as u16).to_le_bytes())
                    }
                    PalAttr::ResyncInterval => {
                        out.extend_from_slice(&m.interval.as_us().to_le_bytes())
                    }
                    PalAttr::RelativeFrequency => {
                        out.extend_from_slice(&m.rel_freq.raw().to_le_bytes())
                    }
                    PalAttr::SyncRejections => {
                        out.extend_from_slice(&self.stats.sync_rejections.to_le_bytes())
                    }
                    _ => Err(()),
                };
                res.map_err(|_| PalError::InvalidInput)?;
            }
        }
        Ok(out)
    }

    /// Write configuration attribute `id`.
    ///
    /// Unknown IDs, read-only attributes and wrong lengths are refused
    /// without touching the transceiver.
    pub fn set_configuration(&mut self, id: u16, value: &[u8]) -> Result<(), PalError> {
        let (attr, route) = attr::check(id, Some(value.len()), true)?;
        match (route.target, attr) {
            (Target::Remote(pib), _) => self
                .phy
                .pib_set(pib, value)
                .map_err(|_| PalError::InvalidInput),
            (Target::Local, PalAttr::Channel) => {
                let ch = Channel::new(value[0]).ok_or(PalError::InvalidInput)?;
                self.set_channel(ch)
            }
            (Target::Local, _) => Err(PalError::InvalidInput),
        }
    }

    /// Hand a frame to the transceiver
    pub fn data_request(&mut self, req: &PalDataRequest<'_>) -> Result<(), PalError> {
        if self.status != PalStatus::Ready {
            return Err(PalError::InvalidInput);
        }

        let time = match req.time {
            PalTxTime::At(local) => TxTime::Absolute(self.sync.mapping().to_remote(local)),
            PalTxTime::After(d) => {
                TxTime::Relative(u32::try_from(d.as_micros()).map_err(|_| PalError::InvalidInput)?)
            }
            PalTxTime::Cancel => TxTime::Cancel,
        };
        if time != TxTime::Cancel {
            let len_ok = (1..=MAX_PSDU_LEN).contains(&req.data.len());
            let scheme_ok = !(req.scheme.is_robust() && req.frame_type == FrameType::A);
            if !len_ok || !scheme_ok || req.attenuation > MAX_ATTENUATION {
                return Err(PalError::InvalidInput);
            }
        }

        self.phy
            .tx_request(&TxRequest {
                data: req.data,
                time,
                attenuation: req.attenuation,
                scheme: req.scheme,
                frame_type: req.frame_type,
            })
            .map_err(|_| PalError::InvalidInput)?;
        bump(&mut self.stats.tx_requests);
        Ok(())
    }

    /// Read the carrier detect state.
    ///
    /// The attribute is `[detected, rssi, header, reserved, time]`, with
    /// `time` a little endian transceiver timestamp.
    pub fn get_carrier_detect(&mut self) -> Result<CarrierDetect, PalError> {
        let mut raw = [0u8; 8];
        self.phy
            .pib_get(PibAttr::CarrierDetect, &mut raw)
            .map_err(|_| PalError::InvalidInput)?;

        let detected = raw[0] != 0;
        let time_us = if detected {
            let remote = u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]);
            self.cd_time.extend(self.sync.mapping().to_local(remote))
        } else {
            0
        };
        Ok(CarrierDetect {
            detected,
            rssi: raw[1],
            time_us,
        })
    }

    /// Host time of the last mains zero crossing, extended to 64 bits
    pub fn get_zero_cross_time(&mut self) -> Result<u64, PalError> {
        let mut raw = [0u8; 4];
        self.phy
            .pib_get(PibAttr::ZeroCrossTime, &mut raw)
            .map_err(|_| PalError::InvalidInput)?;
        let local = self.sync.mapping().to_local(u32::from_le_bytes(raw));
        Ok(self.zc_time.extend(local))
    }

    /// Host time, wrapping microseconds
    pub fn get_timer(&self) -> u32 {
        self.time.now_us()
    }

    /// Host time, extended to 64 bits
    pub fn get_timer_extended(&mut self) -> u64 {
        let now = self.time.now_us();
        self.host_time.extend(now)
    }

    /// Time on air of a `len` byte frame
    pub fn get_signal_duration(
        &self,
        len: usize,
        scheme: Modulation,
        frame_type: FrameType,
    ) -> Result<u32, PalError> {
        message_duration(len, scheme, frame_type).ok_or(PalError::InvalidInput)
    }

    /// The less robust of two raw schemes
    pub fn get_less_robust_modulation(&self, a: u8, b: u8) -> Result<Modulation, PalError> {
        let a = Modulation::from_raw(a).ok_or(PalError::InvalidInput)?;
        let b = Modulation::from_raw(b).ok_or(PalError::InvalidInput)?;
        Ok(less_robust(a, b))
    }

    /// Is raw scheme `candidate` usable and no slower than `reference`?
    pub fn check_minimum_quality(&self, reference: u8, candidate: u8) -> bool {
        meets_minimum_quality(reference, candidate)
    }

    /// Arm a signal capture window
    pub fn start_signal_capture(&mut self, window: &CaptureWindow) -> Result<(), PalError> {
        if self.status != PalStatus::Ready {
            return Err(PalError::InvalidInput);
        }
        let now = self.time.now_us();
        self.capture
            .start(&mut self.phy, self.sync.mapping(), now, window)
            .map_err(|_| PalError::InvalidInput)
    }

    /// Read one fragment of the last capture, returns the bytes written
    pub fn read_signal_capture(&mut self, fragment: u8, buf: &mut [u8]) -> Result<usize, PalError> {
        let now = self.time.now_us();
        self.capture
            .read_fragment(&mut self.phy, now, fragment, buf)
            .map_err(|_| PalError::InvalidInput)
    }
}
