//! Configuration attribute routing
//!
//! The MAC layer addresses configuration by a 16-bit attribute ID. Most
//! IDs are forwarded to a transceiver PIB, a few are answered from the
//! session's own state. Each attribute has a fixed length and is either
//! read-only or read-write; [`route`] is the single table that says which.

use crate::{phy::PibAttr, PalError};

/// Largest attribute value, in bytes
pub const MAX_ATTR_LEN: usize = 10;

/// An attribute value as returned by
/// [`PalSession::get_configuration()`][crate::session::PalSession::get_configuration]
pub type AttrValue = heapless::Vec<u8, MAX_ATTR_LEN>;

/// PAL configuration attribute
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
pub enum PalAttr {
    /// Transceiver firmware version - `0x0001`
    PhyVersion,
    /// Transceiver product ID - `0x0002`
    ProductId,
    /// Transceiver counter, remote microseconds - `0x0003`
    TimeRef,
    /// Operating channel - `0x0004`
    ///
    /// Writing it has the same effect as
    /// [`PalSession::set_channel()`][crate::session::PalSession::set_channel].
    Channel,
    /// CRC capability flags - `0x0010`
    CrcTxRxCapability,
    /// Sleep mode - `0x0011`
    SleepMode,
    /// Automatic impedance detection - `0x0012`
    AutodetectImpedance,
    /// Forced impedance state - `0x0013`
    Impedance,
    /// Largest accepted PSDU - `0x0020`
    MaxPsduLen,
    /// Current resync interval, microseconds - `0x0021`
    ResyncInterval,
    /// Current Q1.24 clock rate ratio - `0x0022`
    RelativeFrequency,
    /// Rejected clock measurements - `0x0023`
    SyncRejections,
}

impl PalAttr {
    const PHY_VERSION: u16 = 0x0001;
    const PRODUCT_ID: u16 = 0x0002;
    const TIME_REF: u16 = 0x0003;
    const CHANNEL: u16 = 0x0004;
    const CRC_TX_RX_CAPABILITY: u16 = 0x0010;
    const SLEEP_MODE: u16 = 0x0011;
    const AUTODETECT_IMPEDANCE: u16 = 0x0012;
    const IMPEDANCE: u16 = 0x0013;
    const MAX_PSDU_LEN: u16 = 0x0020;
    const RESYNC_INTERVAL: u16 = 0x0021;
    const RELATIVE_FREQUENCY: u16 = 0x0022;
    const SYNC_REJECTIONS: u16 = 0x0023;
}

impl TryFrom<u16> for PalAttr {
    type Error = PalError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            Self::PHY_VERSION => Ok(PalAttr::PhyVersion),
            Self::PRODUCT_ID => Ok(PalAttr::ProductId),
            Self::TIME_REF => Ok(PalAttr::TimeRef),
            Self::CHANNEL => Ok(PalAttr::Channel),
            Self::CRC_TX_RX_CAPABILITY => Ok(PalAttr::CrcTxRxCapability),
            Self::SLEEP_MODE => Ok(PalAttr::SleepMode),
            Self::AUTODETECT_IMPEDANCE => Ok(PalAttr::AutodetectImpedance),
            Self::IMPEDANCE => Ok(PalAttr::Impedance),
            Self::MAX_PSDU_LEN => Ok(PalAttr::MaxPsduLen),
            Self::RESYNC_INTERVAL => Ok(PalAttr::ResyncInterval),
            Self::RELATIVE_FREQUENCY => Ok(PalAttr::RelativeFrequency),
            Self::SYNC_REJECTIONS => Ok(PalAttr::SyncRejections),
            _ => Err(PalError::InvalidInput),
        }
    }
}

impl From<PalAttr> for u16 {
    fn from(val: PalAttr) -> Self {
        match val {
            PalAttr::PhyVersion => PalAttr::PHY_VERSION,
            PalAttr::ProductId => PalAttr::PRODUCT_ID,
            PalAttr::TimeRef => PalAttr::TIME_REF,
            PalAttr::Channel => PalAttr::CHANNEL,
            PalAttr::CrcTxRxCapability => PalAttr::CRC_TX_RX_CAPABILITY,
            PalAttr::SleepMode => PalAttr::SLEEP_MODE,
            PalAttr::AutodetectImpedance => PalAttr::AUTODETECT_IMPEDANCE,
            PalAttr::Impedance => PalAttr::IMPEDANCE,
            PalAttr::MaxPsduLen => PalAttr::MAX_PSDU_LEN,
            PalAttr::ResyncInterval => PalAttr::RESYNC_INTERVAL,
            PalAttr::RelativeFrequency => PalAttr::RELATIVE_FREQUENCY,
            PalAttr::SyncRejections => PalAttr::SYNC_REJECTIONS,
        }
    }
}

/// Where an attribute lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Forwarded to a transceiver PIB
    Remote(PibAttr),
    /// Answered by the session itself
    Local,
}

/// How to reach an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    /// Where the value lives
    pub target: Target,
    /// Exact value length, in bytes
    pub len: usize,
    /// May the MAC layer write it?
    pub writable: bool,
}

const fn remote(pib: PibAttr, len: usize, writable: bool) -> Route {
    Route {
        target: Target::Remote(pib),
        len,
        writable,
    }
}

const fn local(len: usize, writable: bool) -> Route {
    Route {
        target: Target::Local,
        len,
        writable,
    }
}

/// The routing table
pub const fn route(attr: PalAttr) -> Route {
    match attr {
        PalAttr::PhyVersion => remote(PibAttr::VersionNum, 4, false),
        PalAttr::ProductId => remote(PibAttr::ProductId, 10, false),
        PalAttr::TimeRef => remote(PibAttr::TimeRef, 4, false),
        PalAttr::Channel => local(1, true),
        PalAttr::CrcTxRxCapability => remote(PibAttr::CrcTxRxCapability, 1, true),
        PalAttr::SleepMode => remote(PibAttr::SleepMode, 1, true),
        PalAttr::AutodetectImpedance => remote(PibAttr::AutodetectImpedance, 1, true),
        PalAttr::Impedance => remote(PibAttr::Impedance, 1, true),
        PalAttr::MaxPsduLen => local(2, false),
        PalAttr::ResyncInterval => local(4, false),
        PalAttr::RelativeFrequency => local(4, false),
        PalAttr::SyncRejections => local(4, false),
    }
}

/// Look up `id` and check an access of `len` bytes against its route.
///
/// `write` selects the access direction. Reads pass `None` for `len`.
pub fn check(id: u16, len: Option<usize>, write: bool) -> Result<(PalAttr, Route), PalError> {
    let attr = PalAttr::try_from(id)?;
    let r = route(attr);
    if write && !r.writable {
        return Err(PalError::InvalidInput);
    }
    match len {
        Some(n) if n != r.len => Err(PalError::InvalidInput),
        _ => Ok((attr, r)),
    }
}
