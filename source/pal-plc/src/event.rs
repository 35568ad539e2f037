//! Driver to session events
//!
//! The driver reports received frames, transmission confirms and
//! exceptions from interrupt context, and the integrator reports expired
//! timers from its time service. None of these may touch the session
//! directly. Instead they are posted as [`PalEvent`]s into a
//! [`Channel`][embassy_sync::channel::Channel] that the session drains
//! from [`PalSession::poll()`][crate::session::PalSession::poll].

use embassy_sync::{
    blocking_mutex::raw::RawMutex,
    channel::{Sender, TrySendError},
};

use crate::{
    phy::{ExceptionKind, RxIndication, TxConfirm},
    time::TimerHandle,
};

/// Something happened outside the polling loop
pub enum PalEvent {
    /// A frame was received
    DataIndication(RxIndication),
    /// A transmission finished
    TxConfirm(TxConfirm),
    /// The transceiver raised an exception
    Exception(ExceptionKind),
    /// A timer armed through the [`TimeService`][crate::time::TimeService] fired
    TimerExpired(TimerHandle),
}

/// The posting half of the event queue
///
/// Never blocks. When the queue is full the event is handed back, so the
/// caller can count or log the loss.
pub struct PalNotifier<'a, M: RawMutex, const N: usize> {
    tx: Sender<'a, M, PalEvent, N>,
}

impl<'a, M: RawMutex, const N: usize> Clone for PalNotifier<'a, M, N> {
    fn clone(&self) -> Self {
        Self { tx: self.tx }
    }
}

impl<'a, M: RawMutex, const N: usize> PalNotifier<'a, M, N> {
    /// Wrap the sending half of the session's event channel
    pub fn new(tx: Sender<'a, M, PalEvent, N>) -> Self {
        Self { tx }
    }

    /// Post a received frame
    pub fn data_indication(&self, ind: RxIndication) -> Result<(), PalEvent> {
        self.post(PalEvent::DataIndication(ind))
    }

    /// Post a transmission confirm
    pub fn tx_confirm(&self, cfm: TxConfirm) -> Result<(), PalEvent> {
        self.post(PalEvent::TxConfirm(cfm))
    }

    /// Post a transceiver exception
    pub fn exception(&self, kind: ExceptionKind) -> Result<(), PalEvent> {
        self.post(PalEvent::Exception(kind))
    }

    /// Post a timer expiry
    pub fn timer_expired(&self, handle: TimerHandle) -> Result<(), PalEvent> {
        self.post(PalEvent::TimerExpired(handle))
    }

    fn post(&self, ev: PalEvent) -> Result<(), PalEvent> {
        self.tx.try_send(ev).map_err(|e| match e {
            TrySendError::Full(ev) => {
                pal_warn!("event queue full, dropping");
                ev
            }
        })
    }
}
