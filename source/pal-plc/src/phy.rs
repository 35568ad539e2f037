//! PHY driver interface
//!
//! The PAL never touches transceiver registers itself. Everything goes
//! through the [`PlcPhy`] trait, which the integrator implements on top of
//! whatever SPI/DMA driver owns the chip. Outputs the driver produces from
//! interrupt context (received frames, transmission confirms, exceptions)
//! do not go through this trait, they are posted to the PAL with a
//! [`PalNotifier`][crate::event::PalNotifier].

use crate::rx_pool::RxFrame;

/// Largest PSDU the PAL will accept or deliver, in bytes
pub const MAX_PSDU_LEN: usize = 511;

/// A trait representing the register/attribute interface of the transceiver
///
/// The interface is half-duplex: only one request is ever outstanding. The
/// PAL upholds this by only calling these methods from [`PalSession`]
/// methods, which take `&mut self`.
///
/// [`PalSession`]: crate::session::PalSession
pub trait PlcPhy {
    /// The error type of the underlying driver
    type Error;

    /// Read a remote attribute into `buf`.
    ///
    /// `buf` is always exactly the length of the attribute. Reading
    /// [`PibAttr::TimeRef`] must return the current value of the
    /// transceiver's free-running microsecond counter, little endian.
    fn pib_get(&mut self, attr: PibAttr, buf: &mut [u8]) -> Result<(), Self::Error>;

    /// Write a remote attribute.
    fn pib_set(&mut self, attr: PibAttr, data: &[u8]) -> Result<(), Self::Error>;

    /// Hand a frame to the transceiver for transmission.
    ///
    /// The driver must copy `req.data` before returning. The outcome is
    /// reported later through [`PalNotifier::tx_confirm`].
    ///
    /// [`PalNotifier::tx_confirm`]: crate::event::PalNotifier::tx_confirm
    fn tx_request(&mut self, req: &TxRequest<'_>) -> Result<(), Self::Error>;

    /// Register (`true`) or unregister (`false`) the data-indication path.
    ///
    /// While unregistered, the driver must not post data indications.
    fn set_rx_indications(&mut self, enabled: bool);
}

/// Remote attribute identifiers used by the PAL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
#[non_exhaustive]
pub enum PibAttr {
    /// Firmware version number, `u32`
    VersionNum,
    /// Product identifier, 10 ASCII bytes
    ProductId,
    /// Free-running transceiver counter, `u32` microseconds
    TimeRef,
    /// Operating channel, `u8`
    Channel,
    /// Carrier detect state, see [`CarrierDetect`][crate::session::CarrierDetect]
    CarrierDetect,
    /// Time of the last mains zero crossing, `u32` remote microseconds
    ZeroCrossTime,
    /// CRC capability flags, `u8`
    CrcTxRxCapability,
    /// Sleep mode, `u8`
    SleepMode,
    /// Automatic impedance detection enable, `u8`
    AutodetectImpedance,
    /// Forced impedance state, `u8`
    Impedance,
    /// Max RMS values, high impedance, `[u32; 8]`
    MaxRmsTableHi,
    /// Max RMS values, very low impedance, `[u32; 8]`
    MaxRmsTableVlo,
    /// Impedance thresholds, `[u32; 16]`
    ThresholdsTable,
    /// DACC configuration, `[u32; 17]`
    DaccTable,
    /// Gain limits, high impedance, `[u16; 3]`
    GainTableHi,
    /// Gain limits, very low impedance, `[u16; 3]`
    GainTableVlo,
    /// Number of transmission levels, `u8`
    NumTxLevels,
    /// Line driver selection, `u8`
    LineDriverConfig,
    /// Signal capture start command, see [`capture`][crate::capture]
    SignalCaptureStart,
    /// Signal capture fragment selector, `u8`
    SignalCaptureFragment,
    /// Signal capture data for the selected fragment
    SignalCaptureData,
}

/// PRIME modulation scheme
///
/// The discriminants are the raw scheme values used on the wire. Raw
/// values 3, 7 and 8..=11 are reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Modulation {
    /// Differential BPSK
    Dbpsk = 0,
    /// Differential QPSK
    Dqpsk = 1,
    /// Differential 8-PSK
    D8psk = 2,
    /// Differential BPSK, convolutional code
    DbpskC = 4,
    /// Differential QPSK, convolutional code
    DqpskC = 5,
    /// Differential 8-PSK, convolutional code
    D8pskC = 6,
    /// Robust differential BPSK
    RDbpsk = 12,
    /// Robust differential QPSK
    RDqpsk = 13,
}

impl Modulation {
    /// All schemes, in raw value order
    pub const ALL: [Modulation; 8] = [
        Modulation::Dbpsk,
        Modulation::Dqpsk,
        Modulation::D8psk,
        Modulation::DbpskC,
        Modulation::DqpskC,
        Modulation::D8pskC,
        Modulation::RDbpsk,
        Modulation::RDqpsk,
    ];

    /// Decode a raw scheme value, `None` for reserved values
    pub const fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Dbpsk),
            1 => Some(Self::Dqpsk),
            2 => Some(Self::D8psk),
            4 => Some(Self::DbpskC),
            5 => Some(Self::DqpskC),
            6 => Some(Self::D8pskC),
            12 => Some(Self::RDbpsk),
            13 => Some(Self::RDqpsk),
            _ => None,
        }
    }

    /// The raw scheme value
    #[inline]
    pub const fn raw(self) -> u8 {
        self as u8
    }

    /// Does this scheme use the convolutional encoder?
    ///
    /// Robust schemes are always coded.
    #[inline]
    pub const fn is_coded(self) -> bool {
        !matches!(self, Self::Dbpsk | Self::Dqpsk | Self::D8psk)
    }

    /// Is this one of the robust (repetition coded) schemes?
    #[inline]
    pub const fn is_robust(self) -> bool {
        matches!(self, Self::RDbpsk | Self::RDqpsk)
    }

    /// Payload bits carried by one OFDM symbol
    pub const fn bits_per_symbol(self) -> u32 {
        // 96 data carriers, halved by the encoder, quartered again by
        // the robust repetition
        match self {
            Self::Dbpsk => 96,
            Self::Dqpsk => 192,
            Self::D8psk => 288,
            Self::DbpskC => 48,
            Self::DqpskC => 96,
            Self::D8pskC => 144,
            Self::RDbpsk => 12,
            Self::RDqpsk => 24,
        }
    }
}

/// PRIME frame (header) type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FrameType {
    /// Type A, PRIME 1.3 header
    A,
    /// Type B, robust header
    B,
    /// Backwards compatible, type A header followed by type B header
    BC,
}

/// Operating channel
///
/// Channels `1..=8` are single channels, `9..=15` combine two adjacent
/// channels (`9` is channels 1+2, and so on).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Channel(u8);

impl Channel {
    /// Highest valid channel number
    pub const MAX: u8 = 15;

    /// Validate a raw channel number
    pub const fn new(raw: u8) -> Option<Self> {
        if raw == 0 || raw > Self::MAX {
            None
        } else {
            Some(Self(raw))
        }
    }

    /// The raw channel number
    #[inline]
    pub const fn raw(self) -> u8 {
        self.0
    }

    /// Is this a double (combined) channel?
    #[inline]
    pub const fn is_double(self) -> bool {
        self.0 > 8
    }
}

/// Transmission result reported by the transceiver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TxResult {
    /// Transmission completed
    Success,
    /// Invalid length
    InvalidLength,
    /// Channel busy (carrier sensed)
    BusyChannel,
    /// Transmitter already busy
    BusyTx,
    /// Receiver busy
    BusyRx,
    /// Invalid modulation scheme
    InvalidScheme,
    /// Transmission time missed
    Timeout,
    /// Invalid buffer identifier
    InvalidBuffer,
    /// Invalid modulation type
    InvalidModType,
    /// Invalid transmission mode
    InvalidTxMode,
    /// Cancelled by request
    Cancelled,
    /// Aborted, temperature above 110 °C
    HighTemp110,
    /// Aborted, temperature above 120 °C
    HighTemp120,
    /// Unspecified error
    Error,
}

/// Exception notification kinds raised by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ExceptionKind {
    /// The transceiver answered with an unexpected SPI key
    UnexpectedKey,
    /// Unrecoverable transceiver error
    CriticalError,
    /// Transceiver is in debug mode
    Debug,
    /// The transceiver reset itself
    Reset,
}

/// When a frame should leave the transceiver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
pub enum TxTime {
    /// At the given remote counter value
    Absolute(u32),
    /// After the given number of microseconds
    Relative(u32),
    /// Cancel the pending transmission
    Cancel,
}

/// A transmission request as handed to the driver
#[derive(Debug)]
pub struct TxRequest<'a> {
    /// The PSDU
    pub data: &'a [u8],
    /// Transmission time, in the remote clock domain
    pub time: TxTime,
    /// Attenuation, in dB
    pub attenuation: u8,
    /// Modulation scheme
    pub scheme: Modulation,
    /// Frame type
    pub frame_type: FrameType,
}

/// Per-frame reception quality reported by the transceiver
///
/// EVM values are in the transceiver's linear units (larger is worse),
/// CINR values in quarter dB, soft BER values as `0..=255`, noise values
/// as a percentage of affected symbols.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RxTelemetry {
    /// EVM of the payload
    pub evm_payload: u32,
    /// EVM of the header
    pub evm_header: u32,
    /// Accumulated payload EVM
    pub evm_payload_acc: u32,
    /// Accumulated header EVM
    pub evm_header_acc: u32,
    /// Average CINR
    pub cinr_avg: i16,
    /// Minimum CINR
    pub cinr_min: i16,
    /// Average soft BER
    pub ber_soft_avg: u8,
    /// Maximum soft BER
    pub ber_soft_max: u8,
    /// Percentage of carriers affected by narrow band noise
    pub narrow_band_pct: u8,
    /// Percentage of symbols affected by impulsive noise
    pub impulsive_pct: u8,
}

/// A received frame, as posted by the driver
pub struct RxIndication {
    /// The PSDU
    pub frame: RxFrame,
    /// End of reception, remote clock
    pub rx_time: u32,
    /// Frame duration in microseconds
    pub duration_us: u32,
    /// Modulation scheme the frame was received with
    pub scheme: Modulation,
    /// Frame type
    pub frame_type: FrameType,
    /// Received signal strength, dBuV
    pub rssi: u8,
    /// Reception quality
    pub telemetry: RxTelemetry,
}

/// A transmission confirm, as posted by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
pub struct TxConfirm {
    /// Outcome
    pub result: TxResult,
    /// Start of transmission, remote clock
    pub tx_time: u32,
    /// Transmission duration in microseconds
    pub duration_us: u32,
}
