//! Robust modulation classifier
//!
//! Every received frame carries reception quality telemetry. From it, the
//! classifier suggests a less robust (faster) scheme the link could move
//! up to. Each scheme has an ordered table of conditions, evaluated top to
//! bottom, and the first row that holds completely gives the target. The
//! tables only list schemes with a higher bandwidth than the one the frame
//! was received with, fastest first, so "first match" is also "fastest
//! safe upgrade".
//!
//! EVM limits are stored inverted, as `EVM_INV_SCALE / limit`, which keeps
//! the rows small and matches how the transceiver firmware tables are
//! usually published.

use crate::phy::{Channel, Modulation, RxTelemetry};

/// Nominal bit rate of each scheme, in bit/s, indexed by raw scheme value.
/// Zero marks a reserved value.
const BANDWIDTH: [u32; 14] = [
    42_857, 85_714, 128_571, 0, 21_428, 42_857, 64_285, 0, 0, 0, 0, 0, 5_357, 10_714,
];

/// Scale of the inverted EVM limits
pub const EVM_INV_SCALE: u32 = 1 << 24;

/// Bit rate of `scheme` on a single channel, zero for reserved values
pub fn bandwidth(raw_scheme: u8) -> u32 {
    BANDWIDTH.get(usize::from(raw_scheme)).copied().unwrap_or(0)
}

/// Inclusive percentage range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PctRange {
    /// Lowest accepted value
    pub min: u8,
    /// Highest accepted value
    pub max: u8,
}

impl PctRange {
    /// `0..=max`
    pub const fn up_to(max: u8) -> Self {
        Self { min: 0, max }
    }

    /// Is `v` in the range?
    #[inline]
    pub fn contains(&self, v: u8) -> bool {
        (self.min..=self.max).contains(&v)
    }
}

/// One row of a condition table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Condition {
    /// Inverted limit for instantaneous EVM (payload and header)
    pub evm_inv: u16,
    /// Inverted limit for accumulated EVM (payload and header)
    pub evm_acc_inv: u16,
    /// Scheme suggested when the row holds
    pub target: Modulation,
    /// Accepted narrow band noise percentage
    pub narrow_band: PctRange,
    /// Accepted impulsive noise percentage
    pub impulsive: PctRange,
    /// Lowest accepted average CINR, quarter dB
    pub cinr_avg_min: i16,
    /// Lowest accepted minimum CINR, quarter dB
    pub cinr_min_min: i16,
    /// Highest accepted average soft BER
    pub ber_soft_avg_max: u8,
    /// Highest accepted maximum soft BER
    pub ber_soft_max_max: u8,
}

impl Condition {
    /// Do all of this row's conditions hold for `t`?
    pub fn matches(&self, t: &RxTelemetry) -> bool {
        let evm = evm_limit(self.evm_inv);
        let evm_acc = evm_limit(self.evm_acc_inv);

        self.narrow_band.contains(t.narrow_band_pct)
            && self.impulsive.contains(t.impulsive_pct)
            && t.evm_payload <= evm
            && t.evm_header <= evm
            && t.evm_payload_acc <= evm_acc
            && t.evm_header_acc <= evm_acc
            && t.cinr_avg >= self.cinr_avg_min
            && t.cinr_min >= self.cinr_min_min
            && t.ber_soft_avg <= self.ber_soft_avg_max
            && t.ber_soft_max <= self.ber_soft_max_max
    }
}

/// A zero inverse means "no limit"
#[inline]
fn evm_limit(inv: u16) -> u32 {
    match inv {
        0 => u32::MAX,
        n => EVM_INV_SCALE / u32::from(n),
    }
}

#[allow(clippy::too_many_arguments)]
const fn row(
    target: Modulation,
    evm_inv: u16,
    evm_acc_inv: u16,
    cinr_avg_min: i16,
    cinr_min_min: i16,
    ber_soft_avg_max: u8,
    ber_soft_max_max: u8,
    noise_max: u8,
) -> Condition {
    Condition {
        evm_inv,
        evm_acc_inv,
        target,
        narrow_band: PctRange::up_to(noise_max),
        impulsive: PctRange::up_to(noise_max),
        cinr_avg_min,
        cinr_min_min,
        ber_soft_avg_max,
        ber_soft_max_max,
    }
}

const TO_D8PSK: Condition = row(Modulation::D8psk, 2133, 2560, 60, 40, 8, 40, 5);
const TO_DQPSK: Condition = row(Modulation::Dqpsk, 1280, 1422, 44, 28, 12, 60, 10);
const TO_D8PSK_C: Condition = row(Modulation::D8pskC, 1024, 1164, 36, 20, 20, 90, 30);
const TO_DBPSK: Condition = row(Modulation::Dbpsk, 731, 853, 28, 12, 24, 100, 10);
const TO_DQPSK_C: Condition = row(Modulation::DqpskC, 640, 731, 24, 8, 32, 120, 40);
const TO_DBPSK_C: Condition = row(Modulation::DbpskC, 427, 512, 12, 0, 48, 160, 60);
const TO_R_DQPSK: Condition = row(Modulation::RDqpsk, 320, 366, 0, -12, 64, 200, 100);

// DBPSK and DQPSK_C have the same bandwidth, the uncoded one comes first
const FROM_R_DBPSK: &[Condition] = &[
    TO_D8PSK, TO_DQPSK, TO_D8PSK_C, TO_DBPSK, TO_DQPSK_C, TO_DBPSK_C, TO_R_DQPSK,
];
const FROM_R_DQPSK: &[Condition] = &[
    TO_D8PSK, TO_DQPSK, TO_D8PSK_C, TO_DBPSK, TO_DQPSK_C, TO_DBPSK_C,
];
const FROM_DBPSK_C: &[Condition] = &[TO_D8PSK, TO_DQPSK, TO_D8PSK_C, TO_DBPSK, TO_DQPSK_C];
const FROM_DBPSK: &[Condition] = &[TO_D8PSK, TO_DQPSK, TO_D8PSK_C];
const FROM_DQPSK_C: &[Condition] = &[TO_D8PSK, TO_DQPSK, TO_D8PSK_C];
const FROM_D8PSK_C: &[Condition] = &[TO_D8PSK, TO_DQPSK];
const FROM_DQPSK: &[Condition] = &[TO_D8PSK];
const FROM_D8PSK: &[Condition] = &[];

/// The condition table for frames received with `scheme`
pub fn table(scheme: Modulation) -> &'static [Condition] {
    match scheme {
        Modulation::Dbpsk => FROM_DBPSK,
        Modulation::Dqpsk => FROM_DQPSK,
        Modulation::D8psk => FROM_D8PSK,
        Modulation::DbpskC => FROM_DBPSK_C,
        Modulation::DqpskC => FROM_DQPSK_C,
        Modulation::D8pskC => FROM_D8PSK_C,
        Modulation::RDbpsk => FROM_R_DBPSK,
        Modulation::RDqpsk => FROM_R_DQPSK,
    }
}

/// First row of `table` that holds for `t`, `None` if no row does
pub fn evaluate(table: &[Condition], t: &RxTelemetry) -> Option<Modulation> {
    table.iter().find(|c| c.matches(t)).map(|c| c.target)
}

/// Result of classifying one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
pub struct Classification {
    /// Suggested less robust scheme. `None` means no information, stay on
    /// the current scheme.
    pub target: Option<Modulation>,
    /// Bit rate in bit/s, doubled on double channels.
    ///
    /// This is the rate of `target` when there is one, otherwise the rate
    /// of the scheme the frame was received with.
    pub bitrate: u32,
}

/// Classify a frame received with `scheme` on `channel`
pub fn classify(scheme: Modulation, t: &RxTelemetry, channel: Channel) -> Classification {
    let target = evaluate(table(scheme), t);
    let base = bandwidth(target.unwrap_or(scheme).raw());
    let bitrate = if channel.is_double() { base * 2 } else { base };
    Classification { target, bitrate }
}

/// Whichever of `a` and `b` has the higher bandwidth. Ties go to `a`.
pub fn less_robust(a: Modulation, b: Modulation) -> Modulation {
    if bandwidth(b.raw()) > bandwidth(a.raw()) {
        b
    } else {
        a
    }
}

/// Is `candidate` usable and at least as fast as `reference`?
///
/// Both are raw scheme values, reserved values have zero bandwidth.
pub fn meets_minimum_quality(reference: u8, candidate: u8) -> bool {
    let cand = bandwidth(candidate);
    cand != 0 && cand >= bandwidth(reference)
}

/// Map an average CINR (quarter dB) to the 0..=7 SNR scale, 3 dB per step
pub fn snr_from_cinr(cinr_avg: i16) -> u8 {
    (cinr_avg / 12).clamp(0, 7) as u8
}
