//! Channel coupling configuration
//!
//! Coupling parameters are board specific calibration data. The PAL only
//! knows how to push them into the transceiver, the values themselves are
//! supplied by a [`CouplingTable`].

use crate::phy::{Channel, PibAttr, PlcPhy};

/// Coupling and transmission-level calibration for one channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CouplingParams {
    /// Target RMS values per tx level, high impedance
    pub rms_hi: [u32; 8],
    /// Target RMS values per tx level, very low impedance
    pub rms_vlo: [u32; 8],
    /// Impedance detection thresholds
    pub thresholds: [u32; 16],
    /// DACC peripheral configuration
    pub dacc: [u32; 17],
    /// Gain limits (initial, min, max), high impedance
    pub gain_hi: [u16; 3],
    /// Gain limits (initial, min, max), very low impedance
    pub gain_vlo: [u16; 3],
    /// Number of tx levels
    pub num_tx_levels: u8,
    /// Line driver selection
    pub line_driver: u8,
}

/// A trait representing the board's static coupling data
pub trait CouplingTable {
    /// Coupling for `channel`, `None` if the board can't use it
    fn channel_config(&self, channel: Channel) -> Option<&CouplingParams>;

    /// The channel the PAL operates on after bootstrap
    fn default_channel(&self) -> Channel;

    /// The channel used for impedance detection probes.
    ///
    /// Must differ from [`CouplingTable::default_channel`].
    fn impedance_detection_channel(&self) -> Channel;
}

/// Write `params` to the transceiver, then switch it to `channel`
pub fn apply_coupling<P: PlcPhy>(
    phy: &mut P,
    channel: Channel,
    params: &CouplingParams,
) -> Result<(), P::Error> {
    set_u32s(phy, PibAttr::MaxRmsTableHi, &params.rms_hi)?;
    set_u32s(phy, PibAttr::MaxRmsTableVlo, &params.rms_vlo)?;
    set_u32s(phy, PibAttr::ThresholdsTable, &params.thresholds)?;
    set_u32s(phy, PibAttr::DaccTable, &params.dacc)?;
    set_u16s(phy, PibAttr::GainTableHi, &params.gain_hi)?;
    set_u16s(phy, PibAttr::GainTableVlo, &params.gain_vlo)?;
    phy.pib_set(PibAttr::NumTxLevels, &[params.num_tx_levels])?;
    phy.pib_set(PibAttr::LineDriverConfig, &[params.line_driver])?;
    phy.pib_set(PibAttr::Channel, &[channel.raw()])
}

fn set_u32s<P: PlcPhy, const N: usize>(
    phy: &mut P,
    attr: PibAttr,
    vals: &[u32; N],
) -> Result<(), P::Error> {
    // Largest table is the 17 word DACC config
    let mut buf = [0u8; 17 * 4];
    let out = &mut buf[..N * 4];
    out.chunks_exact_mut(4)
        .zip(vals.iter())
        .for_each(|(c, v)| c.copy_from_slice(&v.to_le_bytes()));
    phy.pib_set(attr, out)
}

fn set_u16s<P: PlcPhy, const N: usize>(
    phy: &mut P,
    attr: PibAttr,
    vals: &[u16; N],
) -> Result<(), P::Error> {
    let mut buf = [0u8; 3 * 2];
    let out = &mut buf[..N * 2];
    out.chunks_exact_mut(2)
        .zip(vals.iter())
        .for_each(|(c, v)| c.copy_from_slice(&v.to_le_bytes()));
    phy.pib_set(attr, out)
}
