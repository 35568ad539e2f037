//! On-air message duration

use crate::phy::{FrameType, Modulation, MAX_PSDU_LEN};

/// Length of one OFDM symbol, including the cyclic prefix, in microseconds
pub const SYMBOL_US: u32 = 2240;

/// Type A preamble, in microseconds
pub const PREAMBLE_A_US: u32 = 2048;

/// Type B preamble (four type A preambles), in microseconds
pub const PREAMBLE_B_US: u32 = 4 * PREAMBLE_A_US;

/// Flush bits appended by the convolutional encoder
const CODED_TAIL_BITS: u32 = 8;

fn preamble_and_header(frame_type: FrameType) -> (u32, u32) {
    match frame_type {
        FrameType::A => (PREAMBLE_A_US, 2),
        FrameType::B => (PREAMBLE_B_US, 4),
        FrameType::BC => (PREAMBLE_A_US + PREAMBLE_B_US, 6),
    }
}

/// Time on air of a `len` byte PSDU, in microseconds.
///
/// Returns `None` for an empty or oversized PSDU, and for robust schemes
/// on type A frames, which can't carry them.
pub fn message_duration(len: usize, scheme: Modulation, frame_type: FrameType) -> Option<u32> {
    if len == 0 || len > MAX_PSDU_LEN {
        return None;
    }
    if scheme.is_robust() && frame_type == FrameType::A {
        return None;
    }

    let (preamble, header_symbols) = preamble_and_header(frame_type);
    let mut bits = 8 * len as u32;
    if scheme.is_coded() {
        bits += CODED_TAIL_BITS;
    }
    let payload_symbols = bits.div_ceil(scheme.bits_per_symbol());

    Some(preamble + (header_symbols + payload_symbols) * SYMBOL_US)
}
