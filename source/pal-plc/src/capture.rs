//! Signal capture
//!
//! The transceiver can record the raw line signal for a window of time,
//! then hand it back in fixed size fragments. The window is given in host
//! time and translated to the transceiver clock before it is armed.

use crate::{
    clock::ClockMapping,
    phy::{Channel, PibAttr, PlcPhy},
};

/// Number of fragments a capture is read back in
pub const FRAGMENT_COUNT: u8 = 16;

/// Size of one fragment, in bytes
pub const FRAGMENT_LEN: usize = 255;

const FLAG_RELATIVE: u8 = 0x01;

/// When the capture window opens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
pub enum CaptureStart {
    /// At the given host time, microseconds
    At(u32),
    /// After the given number of microseconds
    After(u32),
}

/// A capture request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-logging", derive(defmt::Format))]
pub struct CaptureWindow {
    /// Channel to record
    pub channel: Channel,
    /// Start of the window
    pub start: CaptureStart,
    /// Length of the window, microseconds
    pub duration_us: u32,
}

/// Signal capture errors
#[derive(Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum CaptureError<E> {
    /// No capture has been started
    NotStarted,
    /// The window has not closed yet
    InProgress,
    /// Fragment index out of range
    BadFragment,
    /// The output buffer can't hold a fragment
    BufferTooSmall,
    /// Driver error
    Phy(E),
}

impl<E> From<E> for CaptureError<E> {
    fn from(value: E) -> Self {
        Self::Phy(value)
    }
}

/// Capture bookkeeping, host side
#[derive(Debug, Default)]
pub struct SignalCapture {
    window_end: Option<u32>,
}

impl SignalCapture {
    /// No capture taken yet
    pub const fn new() -> Self {
        Self { window_end: None }
    }

    /// Arm a capture window.
    ///
    /// The command written is `[flags, channel, start, duration]`, with
    /// `start` and `duration` as little endian `u32`s. An absolute start
    /// is translated with `mapping`.
    pub fn start<P: PlcPhy>(
        &mut self,
        phy: &mut P,
        mapping: &ClockMapping,
        now_local: u32,
        window: &CaptureWindow,
    ) -> Result<(), P::Error> {
        let (flags, start, open_local) = match window.start {
            CaptureStart::At(local) => (0, mapping.to_remote(local), local),
            CaptureStart::After(us) => (FLAG_RELATIVE, us, now_local.wrapping_add(us)),
        };

        let mut cmd = [0u8; 10];
        cmd[0] = flags;
        cmd[1] = window.channel.raw();
        cmd[2..6].copy_from_slice(&start.to_le_bytes());
        cmd[6..10].copy_from_slice(&window.duration_us.to_le_bytes());
        phy.pib_set(PibAttr::SignalCaptureStart, &cmd)?;

        self.window_end = Some(open_local.wrapping_add(window.duration_us));
        pal_info!("signal capture armed, {=u32}us", window.duration_us);
        Ok(())
    }

    /// Read fragment `fragment` of the last capture into `buf`.
    ///
    /// Returns the number of bytes written.
    pub fn read_fragment<P: PlcPhy>(
        &self,
        phy: &mut P,
        now_local: u32,
        fragment: u8,
        buf: &mut [u8],
    ) -> Result<usize, CaptureError<P::Error>> {
        let end = self.window_end.ok_or(CaptureError::NotStarted)?;
        if (now_local.wrapping_sub(end) as i32) < 0 {
            return Err(CaptureError::InProgress);
        }
        if fragment >= FRAGMENT_COUNT {
            return Err(CaptureError::BadFragment);
        }
        let out = buf
            .get_mut(..FRAGMENT_LEN)
            .ok_or(CaptureError::BufferTooSmall)?;

        phy.pib_set(PibAttr::SignalCaptureFragment, &[fragment])?;
        phy.pib_get(PibAttr::SignalCaptureData, out)?;
        Ok(FRAGMENT_LEN)
    }
}
