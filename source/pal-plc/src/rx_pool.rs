//! Received frame pool
//!
//! Received PSDUs are copied out of the driver's buffers from interrupt
//! context, and handed to the session through the event queue. This pool
//! provides the storage for them:
//!
//! * Every slot holds one PSDU of up to [`MAX_PSDU_LEN`] bytes
//! * Only `load` and `store` atomics are used, so it works on targets
//!   without CAS
//!
//! Allocation needs exclusive access to the [`RxSlots`], which the
//! driver's receive path owns. Frames are released by dropping the
//! [`RxFrame`], from any context, without a mutex.

use core::{
    ops::{Deref, DerefMut},
    ptr::{addr_of, addr_of_mut, NonNull},
    sync::atomic::{AtomicBool, AtomicU16, Ordering},
};
use grounded::{const_init::ConstInit, uninit::GroundedArrayCell};

use crate::phy::MAX_PSDU_LEN;

/// Storage for exactly N received frames
pub struct RxStorage<const N: usize> {
    slots: GroundedArrayCell<RxSlot, N>,
    once: AtomicBool,
}

impl<const N: usize> RxStorage<N> {
    /// Create a new storage buffer
    ///
    /// Intended for static usage.
    pub const fn new() -> Self {
        Self {
            slots: GroundedArrayCell::const_init(),
            once: AtomicBool::new(false),
        }
    }

    /// Attempt to take the storage as [RxSlots]
    ///
    /// The first call will return Some, all later calls will
    /// return None. Uses a [critical section][critical_section::with]
    /// to ensure it only works once, even on targets without atomics
    pub fn take(&'static self) -> Option<RxSlots> {
        critical_section::with(|_| {
            let old = self.once.load(Ordering::Acquire);
            self.once.store(true, Ordering::Release);
            !old
        })
        .then(|| unsafe { RxSlots::from_static(&self.slots) })
    }
}

impl<const N: usize> Default for RxStorage<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// `len` is zero while the slot is free, and the (nonzero) frame length
/// while it is allocated.
///
/// ONLY [RxSlots] makes the zero -> nonzero transition. ONLY [RxFrame]
/// makes the nonzero -> zero transition, which gives up exclusive access
/// to `data`.
#[repr(C)]
pub(crate) struct RxSlot {
    data: [u8; MAX_PSDU_LEN],
    len: AtomicU16,
}

impl RxSlot {
    const FREE: u16 = 0;
}

impl ConstInit for RxSlot {
    #[allow(clippy::declare_interior_mutable_const)]
    const VAL: Self = RxSlot {
        data: [0u8; MAX_PSDU_LEN],
        len: AtomicU16::new(Self::FREE),
    };
}

/// One received PSDU
///
/// Holds `1..=MAX_PSDU_LEN` bytes, accessed through [Deref] and
/// [DerefMut]. The slot returns to the pool on drop.
pub struct RxFrame {
    ptr: NonNull<RxSlot>,
}

unsafe impl Send for RxFrame {}

impl RxFrame {
    fn len_ref(&self) -> &AtomicU16 {
        // SAFETY: the slot outlives us (it is 'static), and `len` is only
        // ever accessed atomically
        unsafe { &*addr_of!((*self.ptr.as_ptr()).len) }
    }

    /// Sets the length of the frame.
    ///
    /// ## Panics
    ///
    /// `len` must be >= 1 and <= [MAX_PSDU_LEN] or this function will panic
    pub fn set_len(&mut self, len: usize) {
        assert!((1..=MAX_PSDU_LEN).contains(&len));
        self.len_ref().store(len as u16, Ordering::Relaxed);
    }
}

impl Deref for RxFrame {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        // Relaxed is enough, we have exclusive access to `data` and
        // exclusive WRITE access to `len` while the RxFrame exists
        let len = self.len_ref().load(Ordering::Relaxed);
        let data: *const u8 = unsafe { addr_of!((*self.ptr.as_ptr()).data).cast() };
        unsafe { core::slice::from_raw_parts(data, usize::from(len)) }
    }
}

impl DerefMut for RxFrame {
    fn deref_mut(&mut self) -> &mut Self::Target {
        let len = self.len_ref().load(Ordering::Relaxed);
        let data: *mut u8 = unsafe { addr_of_mut!((*self.ptr.as_ptr()).data).cast() };
        unsafe { core::slice::from_raw_parts_mut(data, usize::from(len)) }
    }
}

impl Drop for RxFrame {
    fn drop(&mut self) {
        self.len_ref().store(RxSlot::FREE, Ordering::Release);
    }
}

unsafe impl Send for RxSlots {}

/// The allocating side of an [RxStorage]
pub struct RxSlots {
    start: NonNull<RxSlot>,
    len: usize,
    next_idx: usize,
}

impl RxSlots {
    /// ## Safety
    ///
    /// You must only ever call this once per storage
    unsafe fn from_static<const N: usize>(buf: &'static GroundedArrayCell<RxSlot, N>) -> Self {
        Self {
            start: NonNull::new_unchecked(buf.as_mut_ptr()),
            len: N,
            next_idx: 0,
        }
    }

    fn len_at(&self, idx: usize) -> &AtomicU16 {
        // SAFETY: idx < self.len, and `len` is only accessed atomically
        unsafe { &*addr_of!((*self.start.as_ptr().add(idx)).len) }
    }

    /// Count the free slots
    pub fn free_count(&self) -> usize {
        (0..self.len)
            .filter(|i| self.len_at(*i).load(Ordering::Acquire) == RxSlot::FREE)
            .count()
    }

    /// Allocate a full-length frame.
    ///
    /// Linear search starting after the last allocation. Returns [None] if
    /// every slot is in use.
    pub fn alloc(&mut self) -> Option<RxFrame> {
        if self.len == 0 {
            return None;
        }
        if self.next_idx >= self.len {
            self.next_idx = 0;
        }
        let idx = (self.next_idx..self.len)
            .chain(0..self.next_idx)
            .find(|i| self.len_at(*i).load(Ordering::Acquire) == RxSlot::FREE)?;

        self.len_at(idx)
            .store(MAX_PSDU_LEN as u16, Ordering::Release);
        self.next_idx = idx + 1;
        let ptr = unsafe { self.start.as_ptr().add(idx) };
        Some(RxFrame {
            ptr: NonNull::new(ptr)?,
        })
    }

    /// Allocate a frame holding a copy of `data`.
    ///
    /// Returns [None] if `data` is empty or too long, or the pool is
    /// exhausted.
    pub fn alloc_copy(&mut self, data: &[u8]) -> Option<RxFrame> {
        if data.is_empty() || data.len() > MAX_PSDU_LEN {
            return None;
        }
        let mut frame = self.alloc()?;
        frame.set_len(data.len());
        frame.copy_from_slice(data);
        Some(frame)
    }

    /// The backing capacity
    pub fn capacity(&self) -> usize {
        self.len
    }
}
