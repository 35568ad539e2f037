//! Q1.24 relative frequency

/// Number of fractional bits
pub const Q24_SHIFT: u32 = 24;

/// `1.0` in Q1.24
pub const Q24_ONE: u32 = 1 << Q24_SHIFT;

/// Local ticks per remote tick, as unsigned Q1.24 fixed point
///
/// A value of [`Q24_ONE`] means both clocks run at exactly the same rate.
/// Values above it mean the host clock runs fast relative to the
/// transceiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RelativeFrequency(u32);

impl RelativeFrequency {
    /// Both clocks tick at the same rate
    pub const IDENTITY: Self = Self(Q24_ONE);

    /// Wrap a raw Q1.24 value. Zero is not a frequency.
    pub const fn from_raw(raw: u32) -> Option<Self> {
        if raw == 0 {
            None
        } else {
            Some(Self(raw))
        }
    }

    /// The raw Q1.24 value
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Estimate the ratio from elapsed ticks on both clocks.
    ///
    /// Computes `round(delta_local * 2^24 / delta_remote)`. Returns `None`
    /// when `delta_remote` is zero, or when the ratio is zero or does not
    /// fit in 32 bits.
    pub fn from_deltas(delta_local: u32, delta_remote: u32) -> Option<Self> {
        if delta_remote == 0 {
            return None;
        }
        let num = u64::from(delta_local) << Q24_SHIFT;
        let ratio = div_round_u64(num, u64::from(delta_remote));
        u32::try_from(ratio).ok().and_then(Self::from_raw)
    }

    /// Convert a remote tick delta into local ticks
    #[inline]
    pub fn scale(self, delta_remote: i32) -> i64 {
        div_round_i64(i64::from(delta_remote) * i64::from(self.0), i64::from(Q24_ONE))
    }

    /// Convert a local tick delta into remote ticks
    #[inline]
    pub fn unscale(self, delta_local: i32) -> i64 {
        div_round_i64(i64::from(delta_local) << Q24_SHIFT, i64::from(self.0))
    }

    /// Deviation from [`RelativeFrequency::IDENTITY`] in parts per million
    pub fn ppm(self) -> i32 {
        let dev = i64::from(self.0) - i64::from(Q24_ONE);
        div_round_i64(dev * 1_000_000, i64::from(Q24_ONE)) as i32
    }
}

/// Inclusive band of frequencies accepted by the estimator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
pub struct FrequencyBounds {
    min: RelativeFrequency,
    max: RelativeFrequency,
}

impl FrequencyBounds {
    /// A symmetric band of `ppm` parts per million around `1.0`
    pub const fn from_ppm(ppm: u32) -> Self {
        let span = (Q24_ONE as u64 * ppm as u64 + 500_000) / 1_000_000;
        let span = if span >= Q24_ONE as u64 {
            Q24_ONE - 1
        } else {
            span as u32
        };
        Self {
            min: RelativeFrequency(Q24_ONE - span),
            max: RelativeFrequency(Q24_ONE.saturating_add(span)),
        }
    }

    /// Lowest accepted ratio
    #[inline]
    pub const fn min(&self) -> RelativeFrequency {
        self.min
    }

    /// Highest accepted ratio
    #[inline]
    pub const fn max(&self) -> RelativeFrequency {
        self.max
    }

    /// Is `freq` inside the band?
    #[inline]
    pub fn contains(&self, freq: RelativeFrequency) -> bool {
        (self.min..=self.max).contains(&freq)
    }
}

/// Unsigned division, rounding half up
#[inline]
fn div_round_u64(num: u64, den: u64) -> u64 {
    (num + den / 2) / den
}

/// Signed division by a positive divisor, rounding half away from zero
#[inline]
fn div_round_i64(num: i64, den: i64) -> i64 {
    if num >= 0 {
        (num + den / 2) / den
    } else {
        (num - den / 2) / den
    }
}
