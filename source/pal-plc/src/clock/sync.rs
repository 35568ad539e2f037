//! Clock synchronization estimator
//!
//! The estimator owns the one live [`ClockMapping`]. It is refreshed by a
//! one-shot timer that is re-armed after every tick, with the delay
//! growing along [`RESYNC_LADDER`] as long as measurements keep landing
//! inside the plausibility band. A measurement outside the band throws
//! the whole mapping away and starts over from a fresh sample pair.

use embassy_time::Duration;

use crate::{
    phy::PlcPhy,
    time::{TimeService, TimerHandle, TimerKind},
};

use super::{
    fixed::{FrequencyBounds, RelativeFrequency},
    mapping::ClockMapping,
    reader::DualClockReader,
    SyncError,
};

/// Delays between consecutive resyncs, the last one is the steady state
pub const RESYNC_LADDER: [Duration; 4] = [
    Duration::from_millis(50),
    Duration::from_millis(250),
    Duration::from_secs(1),
    Duration::from_secs(5),
];

const LAST_RUNG: u8 = (RESYNC_LADDER.len() - 1) as u8;

/// Position on the resync ladder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
pub enum ResyncInterval {
    /// No timer could be armed, a resync is due as soon as possible
    Owed,
    /// Index into [`RESYNC_LADDER`]
    Rung(u8),
}

impl ResyncInterval {
    /// Where a fresh mapping starts
    pub const FIRST: Self = Self::Rung(0);

    /// The delay until the next resync
    pub fn duration(self) -> Duration {
        match self {
            Self::Owed => Duration::from_ticks(0),
            Self::Rung(i) => RESYNC_LADDER[usize::from(i.min(LAST_RUNG))],
        }
    }

    /// The delay until the next resync, in microseconds
    pub fn as_us(self) -> u32 {
        self.duration().as_micros() as u32
    }

    /// The step after a successful resync
    pub fn next(self) -> Self {
        match self {
            Self::Owed => Self::FIRST,
            Self::Rung(i) => Self::Rung((i + 1).min(LAST_RUNG)),
        }
    }
}

/// Synchronization state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
pub enum SyncState {
    /// No timer armed for the mapping, a resync is owed
    Unsynced,
    /// Mapping valid and next resync scheduled
    Synced,
}

/// What a resync tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
pub enum SyncOutcome {
    /// The new ratio was accepted
    Accepted(RelativeFrequency),
    /// The measurement was implausible and the mapping was re-initialized
    Rejected,
    /// There was no usable reference yet, the mapping was initialized
    Initialized,
}

/// Maintains the host/transceiver [`ClockMapping`]
pub struct ClockSync {
    mapping: ClockMapping,
    state: SyncState,
    timer: Option<TimerHandle>,
    needs_init: bool,
    bounds: FrequencyBounds,
    reader: DualClockReader,
}

impl ClockSync {
    /// Create an estimator. Nothing is sampled until [`ClockSync::initialize()`].
    pub const fn new(bounds: FrequencyBounds, reader: DualClockReader) -> Self {
        Self {
            mapping: ClockMapping::new(),
            state: SyncState::Unsynced,
            timer: None,
            needs_init: true,
            bounds,
            reader,
        }
    }

    /// The live mapping
    #[inline]
    pub fn mapping(&self) -> &ClockMapping {
        &self.mapping
    }

    /// Current synchronization state
    #[inline]
    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Is `handle` the resync timer?
    #[inline]
    pub fn owns(&self, handle: TimerHandle) -> bool {
        self.timer == Some(handle)
    }

    /// Must the caller run [`ClockSync::on_resync_tick()`] right away?
    #[inline]
    pub fn resync_owed(&self) -> bool {
        self.timer.is_none() && self.mapping.interval == ResyncInterval::Owed
    }

    /// Start over from a fresh sample pair with identity frequency.
    ///
    /// Any armed resync timer is cancelled first. If the sample can't be
    /// read, the reference and frequency are left untouched and the next
    /// tick will try to initialize again.
    pub fn initialize<P, T>(&mut self, phy: &mut P, time: &mut T) -> Result<(), SyncError<P::Error>>
    where
        P: PlcPhy,
        T: TimeService,
    {
        if let Some(h) = self.timer.take() {
            time.cancel_timer(h);
        }
        self.state = SyncState::Unsynced;
        self.mapping.interval = ResyncInterval::FIRST;

        let pair = match self.reader.read_pair(phy, time) {
            Ok(p) => p,
            Err(e) => {
                pal_error!("clock sync: time reference read failed");
                self.needs_init = true;
                self.arm(time);
                return Err(e);
            }
        };

        self.mapping = ClockMapping {
            local_ref: pair.local,
            remote_ref: pair.remote,
            rel_freq: RelativeFrequency::IDENTITY,
            interval: ResyncInterval::FIRST,
            plausible: true,
        };
        self.needs_init = false;
        if self.arm(time) {
            self.state = SyncState::Synced;
        }
        Ok(())
    }

    /// Refine the mapping from a new sample pair.
    ///
    /// Called when the resync timer fires, or from the polling loop when
    /// [`ClockSync::resync_owed()`] is set.
    pub fn on_resync_tick<P, T>(
        &mut self,
        phy: &mut P,
        time: &mut T,
    ) -> Result<SyncOutcome, SyncError<P::Error>>
    where
        P: PlcPhy,
        T: TimeService,
    {
        // The one-shot has fired (or there was none)
        self.timer = None;

        if self.needs_init {
            self.initialize(phy, time)?;
            return Ok(SyncOutcome::Initialized);
        }

        let pair = match self.reader.read_pair(phy, time) {
            Ok(p) => p,
            Err(e) => {
                pal_error!("clock sync: time reference read failed");
                self.arm(time);
                return Err(e);
            }
        };

        let delta_local = pair.local.wrapping_sub(self.mapping.local_ref);
        let delta_remote = pair.remote.wrapping_sub(self.mapping.remote_ref);
        let candidate = RelativeFrequency::from_deltas(delta_local, delta_remote)
            .filter(|f| self.bounds.contains(*f));

        let Some(freq) = candidate else {
            pal_warn!(
                "clock sync: implausible ratio, dl={=u32} dr={=u32}",
                delta_local,
                delta_remote
            );
            self.mapping.plausible = false;
            self.initialize(phy, time)?;
            return Ok(SyncOutcome::Rejected);
        };

        self.mapping.rel_freq = freq;
        self.mapping.local_ref = pair.local;
        self.mapping.remote_ref = pair.remote;
        self.mapping.plausible = true;
        self.mapping.interval = self.mapping.interval.next();
        pal_debug!(
            "clock sync: ratio {=u32}, next in {=u32}us",
            freq.raw(),
            self.mapping.interval.as_us()
        );

        if self.arm(time) {
            self.state = SyncState::Synced;
        } else {
            self.state = SyncState::Unsynced;
        }
        Ok(SyncOutcome::Accepted(freq))
    }

    /// Arm the one-shot for the current interval. On failure the interval
    /// becomes [`ResyncInterval::Owed`].
    fn arm<T: TimeService>(&mut self, time: &mut T) -> bool {
        match time.register_timer(self.mapping.interval.duration(), TimerKind::OneShot) {
            Some(h) => {
                self.timer = Some(h);
                true
            }
            None => {
                pal_warn!("clock sync: no timer, resync owed");
                self.timer = None;
                self.mapping.interval = ResyncInterval::Owed;
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::fixed::Q24_ONE,
        mock::{MockPhy, MockTime, SimClock},
    };

    fn rig(local: u64, remote: u32, ppm: i32) -> (SimClock, MockTime, MockPhy, ClockSync) {
        let clock = SimClock::new(local);
        let time = MockTime::new(&clock);
        let phy = MockPhy::with_clock(&clock, remote, ppm);
        let sync = ClockSync::new(FrequencyBounds::from_ppm(200), DualClockReader::new(0));
        (clock, time, phy, sync)
    }

    /// Advance simulated time to the armed timer and tick
    fn fire(
        clock: &SimClock,
        time: &mut MockTime,
        phy: &mut MockPhy,
        sync: &mut ClockSync,
    ) -> SyncOutcome {
        let delay = time.last_armed().unwrap().1;
        clock.advance(delay.as_micros());
        sync.on_resync_tick(phy, time).unwrap()
    }

    #[test]
    fn initialize_samples_a_fresh_pair() {
        let (_c, mut time, mut phy, mut sync) = rig(2_000, 9_000, 0);
        sync.initialize(&mut phy, &mut time).unwrap();

        let m = sync.mapping();
        assert_eq!((m.local_ref, m.remote_ref), (2_000, 9_000));
        assert_eq!(m.rel_freq, RelativeFrequency::IDENTITY);
        assert_eq!(m.interval.as_us(), 50_000);
        assert_eq!(sync.state(), SyncState::Synced);
        assert_eq!(time.last_armed().unwrap().1, Duration::from_millis(50));
    }

    #[test]
    fn accepted_resyncs_climb_the_ladder() {
        let (clock, mut time, mut phy, mut sync) = rig(0, 0, 20);
        sync.initialize(&mut phy, &mut time).unwrap();

        let mut seen = heapless::Vec::<u32, 8>::new();
        for _ in 0..6 {
            let out = fire(&clock, &mut time, &mut phy, &mut sync);
            assert!(matches!(out, SyncOutcome::Accepted(_)));
            seen.push(sync.mapping().interval.as_us()).unwrap();
        }
        assert_eq!(
            &seen[..],
            &[250_000, 1_000_000, 5_000_000, 5_000_000, 5_000_000, 5_000_000]
        );
        assert_eq!(time.armed_count(), 7);
    }

    #[test]
    fn ladder_restarts_from_owed() {
        let (clock, mut time, mut phy, mut sync) = rig(0, 0, -35);
        time.fail_timers(true);
        sync.initialize(&mut phy, &mut time).unwrap();
        assert_eq!(sync.state(), SyncState::Unsynced);
        assert!(sync.resync_owed());
        assert_eq!(sync.mapping().interval.as_us(), 0);
        time.fail_timers(false);

        let mut seen = heapless::Vec::<u32, 8>::new();
        clock.advance(20_000);
        sync.on_resync_tick(&mut phy, &mut time).unwrap();
        seen.push(sync.mapping().interval.as_us()).unwrap();
        for _ in 0..4 {
            fire(&clock, &mut time, &mut phy, &mut sync);
            seen.push(sync.mapping().interval.as_us()).unwrap();
        }
        assert_eq!(
            &seen[..],
            &[50_000, 250_000, 1_000_000, 5_000_000, 5_000_000]
        );
        assert_eq!(sync.state(), SyncState::Synced);
    }

    #[test]
    fn ratio_tracks_the_drift() {
        // transceiver runs 100 ppm slow, so the host is fast relative to it
        let (clock, mut time, mut phy, mut sync) = rig(0, 0, -100);
        sync.initialize(&mut phy, &mut time).unwrap();
        for _ in 0..4 {
            fire(&clock, &mut time, &mut phy, &mut sync);
        }
        let ppm = sync.mapping().rel_freq.ppm();
        assert!((99..=101).contains(&ppm), "ppm {ppm}");

        // a remote stamp 3 s ahead lands 3.0003 s ahead locally
        let m = *sync.mapping();
        let local = m.to_local(m.remote_ref.wrapping_add(3_000_000));
        let err = local.wrapping_sub(m.local_ref.wrapping_add(3_000_300)) as i32;
        assert!(err.abs() <= 2, "err {err}");
    }

    #[test]
    fn implausible_ratio_reinitializes() {
        let (clock, mut time, mut phy, mut sync) = rig(1_000, 1_000, 0);
        sync.initialize(&mut phy, &mut time).unwrap();
        fire(&clock, &mut time, &mut phy, &mut sync);
        fire(&clock, &mut time, &mut phy, &mut sync);
        assert_eq!(sync.mapping().interval.as_us(), 1_000_000);

        // one spurious read, 25% off
        clock.advance(1_000_000);
        let before = *sync.mapping();
        phy.script_time_ref(before.remote_ref.wrapping_add(750_000));
        let out = sync.on_resync_tick(&mut phy, &mut time).unwrap();
        assert_eq!(out, SyncOutcome::Rejected);

        // the reference is the next (honest) read, not the spurious one
        let m = sync.mapping();
        assert_eq!(m.rel_freq, RelativeFrequency::IDENTITY);
        assert_eq!(m.local_ref, clock.now() as u32);
        assert_eq!(m.remote_ref, phy.remote_now());
        assert_eq!(m.interval.as_us(), 50_000);
        assert!(time.cancelled().is_empty());

        // and the ladder climbs again from the bottom
        fire(&clock, &mut time, &mut phy, &mut sync);
        assert_eq!(sync.mapping().interval.as_us(), 250_000);
    }

    #[test]
    fn zero_remote_progress_is_rejected() {
        let (clock, mut time, mut phy, mut sync) = rig(0, 500, 0);
        sync.initialize(&mut phy, &mut time).unwrap();
        let stuck = sync.mapping().remote_ref;
        clock.advance(50_000);
        phy.script_time_ref(stuck);
        let out = sync.on_resync_tick(&mut phy, &mut time).unwrap();
        assert_eq!(out, SyncOutcome::Rejected);
        assert_eq!(sync.mapping().rel_freq.raw(), Q24_ONE);
    }

    #[test]
    fn sync_across_counter_wrap() {
        // both counters wrap during the first interval
        let (clock, mut time, mut phy, mut sync) = rig(0xFFFF_FFFF - 20_000, 0xFFFF_FFFF - 10_000, 50);
        sync.initialize(&mut phy, &mut time).unwrap();
        let out = fire(&clock, &mut time, &mut phy, &mut sync);
        assert!(matches!(out, SyncOutcome::Accepted(_)));
        assert!(sync.mapping().local_ref < 50_000);
        assert!(sync.mapping().remote_ref < 50_000);
    }

    #[test]
    fn failed_rearm_keeps_the_new_mapping() {
        let (clock, mut time, mut phy, mut sync) = rig(0, 0, 10);
        sync.initialize(&mut phy, &mut time).unwrap();
        time.fail_timers(true);
        let out = fire(&clock, &mut time, &mut phy, &mut sync);

        let SyncOutcome::Accepted(f) = out else {
            panic!("expected acceptance, got {out:?}");
        };
        assert_eq!(sync.mapping().rel_freq, f);
        assert_eq!(sync.mapping().local_ref, 50_000);
        assert!(sync.resync_owed());
        assert_eq!(sync.state(), SyncState::Unsynced);
    }

    #[test]
    fn read_failure_leaves_mapping_alone() {
        let (clock, mut time, mut phy, mut sync) = rig(0, 0, 0);
        sync.initialize(&mut phy, &mut time).unwrap();
        let before = *sync.mapping();

        clock.advance(50_000);
        phy.fail_time_ref(true);
        assert!(sync.on_resync_tick(&mut phy, &mut time).is_err());
        assert_eq!(*sync.mapping(), before);
        // the timer was re-armed at the same step
        assert_eq!(time.last_armed().unwrap().1, Duration::from_millis(50));
        assert!(!sync.resync_owed());
    }

    #[test]
    fn failed_initial_read_retries_initialization() {
        let (clock, mut time, mut phy, mut sync) = rig(0, 300, 0);
        phy.fail_time_ref(true);
        assert!(sync.initialize(&mut phy, &mut time).is_err());
        assert!(!sync.mapping().plausible);

        phy.fail_time_ref(false);
        clock.advance(50_000);
        let out = sync.on_resync_tick(&mut phy, &mut time).unwrap();
        assert_eq!(out, SyncOutcome::Initialized);
        assert_eq!(sync.mapping().remote_ref, 50_300);
        assert!(sync.mapping().plausible);
    }

    #[test]
    fn reinitialize_cancels_pending_timer() {
        let (_c, mut time, mut phy, mut sync) = rig(0, 0, 0);
        sync.initialize(&mut phy, &mut time).unwrap();
        let (first, _) = time.last_armed().unwrap();
        sync.initialize(&mut phy, &mut time).unwrap();
        assert_eq!(time.cancelled(), &[first]);
        assert!(!sync.owns(first));
        assert!(sync.owns(time.last_armed().unwrap().0));
    }
}
