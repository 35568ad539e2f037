//! Test doubles for the external collaborators

#![allow(dead_code)]

use std::{
    cell::Cell,
    collections::{HashMap, VecDeque},
    rc::Rc,
    vec::Vec,
};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::Duration;
use rand_chacha::{rand_core::SeedableRng, ChaCha8Rng};

use crate::{
    config::PalCfg,
    coupling::{CouplingParams, CouplingTable},
    phy::{Channel, FrameType, Modulation, PibAttr, PlcPhy, TxRequest, TxTime},
    time::{TimeService, TimerHandle, TimerKind},
};

/// A host counter shared between the mocks, in microseconds
#[derive(Clone)]
pub struct SimClock(Rc<Cell<u64>>);

impl SimClock {
    pub fn new(start_us: u64) -> Self {
        Self(Rc::new(Cell::new(start_us)))
    }

    pub fn now(&self) -> u64 {
        self.0.get()
    }

    pub fn advance(&self, us: u64) {
        self.0.set(self.0.get() + us);
    }
}

/// One microsecond per tick, timers are only recorded
pub struct MockTime {
    clock: SimClock,
    next_handle: u32,
    fail: bool,
    armed: Vec<(TimerHandle, Duration, TimerKind)>,
    cancelled: Vec<TimerHandle>,
}

impl MockTime {
    pub fn new(clock: &SimClock) -> Self {
        Self {
            clock: clock.clone(),
            next_handle: 1,
            fail: false,
            armed: Vec::new(),
            cancelled: Vec::new(),
        }
    }

    pub fn fail_timers(&mut self, fail: bool) {
        self.fail = fail;
    }

    pub fn last_armed(&self) -> Option<(TimerHandle, Duration)> {
        self.armed.last().map(|(h, d, _)| (*h, *d))
    }

    pub fn armed_count(&self) -> usize {
        self.armed.len()
    }

    pub fn cancelled(&self) -> &[TimerHandle] {
        &self.cancelled
    }
}

impl TimeService for MockTime {
    fn now_ticks(&self) -> u64 {
        self.clock.now()
    }

    fn ticks_to_us(&self, ticks: u64) -> u32 {
        ticks as u32
    }

    fn us_to_ticks(&self, us: u32) -> u64 {
        u64::from(us)
    }

    fn register_timer(&mut self, delay: Duration, kind: TimerKind) -> Option<TimerHandle> {
        if self.fail {
            return None;
        }
        let h = TimerHandle(self.next_handle);
        self.next_handle += 1;
        self.armed.push((h, delay, kind));
        Some(h)
    }

    fn cancel_timer(&mut self, handle: TimerHandle) {
        self.cancelled.push(handle);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockPhyError {
    TimeRef,
    Tx,
    Pib,
}

/// An owned copy of a [`TxRequest`]
#[derive(Debug, Clone, PartialEq)]
pub struct SentFrame {
    pub data: Vec<u8>,
    pub time: TxTime,
    pub attenuation: u8,
    pub scheme: Modulation,
    pub frame_type: FrameType,
}

/// A transceiver with a drifting free-running counter
///
/// The remote counter starts at `remote_base` when the mock is created
/// and runs `drift_ppm` faster than the shared [`SimClock`].
pub struct MockPhy {
    clock: SimClock,
    origin: u64,
    remote_base: u32,
    drift_ppm: i32,
    time_ref_script: VecDeque<u32>,
    fail_time_ref: bool,
    fail_tx: bool,
    fail_pib: bool,
    store: HashMap<PibAttr, Vec<u8>>,
    writes: Vec<(PibAttr, Vec<u8>)>,
    sent: Vec<SentFrame>,
    rx_log: Vec<bool>,
    capture_fragment: u8,
}

impl MockPhy {
    pub fn new() -> Self {
        Self::with_clock(&SimClock::new(0), 0, 0)
    }

    pub fn with_clock(clock: &SimClock, remote_base: u32, drift_ppm: i32) -> Self {
        Self {
            clock: clock.clone(),
            origin: clock.now(),
            remote_base,
            drift_ppm,
            time_ref_script: VecDeque::new(),
            fail_time_ref: false,
            fail_tx: false,
            fail_pib: false,
            store: HashMap::new(),
            writes: Vec::new(),
            sent: Vec::new(),
            rx_log: Vec::new(),
            capture_fragment: 0,
        }
    }

    /// The remote counter at the current simulated time
    pub fn remote_now(&self) -> u32 {
        let elapsed = i128::from(self.clock.now() - self.origin);
        let scaled = elapsed * i128::from(1_000_000 + self.drift_ppm) / 1_000_000;
        self.remote_base.wrapping_add(scaled as u32)
    }

    /// The next time reference read returns `value` instead
    pub fn script_time_ref(&mut self, value: u32) {
        self.time_ref_script.push_back(value);
    }

    pub fn fail_time_ref(&mut self, fail: bool) {
        self.fail_time_ref = fail;
    }

    pub fn fail_tx(&mut self, fail: bool) {
        self.fail_tx = fail;
    }

    /// Every other attribute access fails
    pub fn fail_pib(&mut self, fail: bool) {
        self.fail_pib = fail;
    }

    /// Preload a value for reads
    pub fn preload(&mut self, attr: PibAttr, value: &[u8]) {
        self.store.insert(attr, value.to_vec());
    }

    pub fn pib_writes(&self) -> &Vec<(PibAttr, Vec<u8>)> {
        &self.writes
    }

    pub fn clear_writes(&mut self) {
        self.writes.clear();
    }

    pub fn last_write(&self, attr: PibAttr) -> Option<&[u8]> {
        self.writes
            .iter()
            .rev()
            .find(|(a, _)| *a == attr)
            .map(|(_, v)| v.as_slice())
    }

    pub fn sent(&self) -> &[SentFrame] {
        &self.sent
    }

    /// Every call to `set_rx_indications`, in order
    pub fn rx_log(&self) -> &[bool] {
        &self.rx_log
    }

    pub fn rx_enabled(&self) -> bool {
        self.rx_log.last().copied().unwrap_or(false)
    }
}

impl PlcPhy for MockPhy {
    type Error = MockPhyError;

    fn pib_get(&mut self, attr: PibAttr, buf: &mut [u8]) -> Result<(), Self::Error> {
        match attr {
            PibAttr::TimeRef => {
                if self.fail_time_ref {
                    return Err(MockPhyError::TimeRef);
                }
                let v = self
                    .time_ref_script
                    .pop_front()
                    .unwrap_or_else(|| self.remote_now());
                buf.copy_from_slice(&v.to_le_bytes());
            }
            _ if self.fail_pib => return Err(MockPhyError::Pib),
            PibAttr::SignalCaptureData => {
                buf.iter_mut().for_each(|b| *b = self.capture_fragment);
            }
            _ => {
                buf.fill(0);
                if let Some(v) = self.store.get(&attr) {
                    let n = v.len().min(buf.len());
                    buf[..n].copy_from_slice(&v[..n]);
                }
            }
        }
        Ok(())
    }

    fn pib_set(&mut self, attr: PibAttr, data: &[u8]) -> Result<(), Self::Error> {
        if self.fail_pib {
            return Err(MockPhyError::Pib);
        }
        if attr == PibAttr::SignalCaptureFragment {
            self.capture_fragment = data[0];
        }
        self.writes.push((attr, data.to_vec()));
        self.store.insert(attr, data.to_vec());
        Ok(())
    }

    fn tx_request(&mut self, req: &TxRequest<'_>) -> Result<(), Self::Error> {
        if self.fail_tx {
            return Err(MockPhyError::Tx);
        }
        self.sent.push(SentFrame {
            data: req.data.to_vec(),
            time: req.time,
            attenuation: req.attenuation,
            scheme: req.scheme,
            frame_type: req.frame_type,
        });
        Ok(())
    }

    fn set_rx_indications(&mut self, enabled: bool) {
        self.rx_log.push(enabled);
    }
}

/// Distinguishable calibration data for `seed`
pub fn test_coupling(seed: u8) -> CouplingParams {
    let s = u32::from(seed);
    CouplingParams {
        rms_hi: core::array::from_fn(|i| 1_000 * s + i as u32),
        rms_vlo: core::array::from_fn(|i| 2_000 * s + i as u32),
        thresholds: core::array::from_fn(|i| 3_000 * s + i as u32),
        dacc: core::array::from_fn(|i| 0x1000_0000 | (s << 8) | i as u32),
        gain_hi: [u16::from(seed), 100, 200],
        gain_vlo: [u16::from(seed), 300, 400],
        num_tx_levels: 8,
        line_driver: seed,
    }
}

/// Coupling for channels `1..=9`, default channel 1, probes on channel 3
pub struct MockCoupling {
    params: Vec<(Channel, CouplingParams)>,
    default: Channel,
    probe: Channel,
}

impl MockCoupling {
    pub fn new() -> Self {
        let params = (1..=9)
            .filter_map(Channel::new)
            .map(|ch| (ch, test_coupling(ch.raw())))
            .collect();
        Self {
            params,
            default: Channel::new(1).unwrap(),
            probe: Channel::new(3).unwrap(),
        }
    }
}

impl CouplingTable for MockCoupling {
    fn channel_config(&self, channel: Channel) -> Option<&CouplingParams> {
        self.params
            .iter()
            .find(|(ch, _)| *ch == channel)
            .map(|(_, p)| p)
    }

    fn default_channel(&self) -> Channel {
        self.default
    }

    fn impedance_detection_channel(&self) -> Channel {
        self.probe
    }
}

pub fn test_rng() -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(0x5EED)
}

pub struct TestCfg;

impl PalCfg for TestCfg {
    type Mutex = CriticalSectionRawMutex;
    type Phy = MockPhy;
    type Time = MockTime;
    type Coupling = MockCoupling;
    type Rand = ChaCha8Rng;
}
