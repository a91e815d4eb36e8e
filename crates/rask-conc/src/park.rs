// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Parking for blocked channel operations.
//!
//! One `Parker` per blocking call. A plain send/recv registers a single
//! waiter; a select registers one waiter per case, all sharing the same
//! parker. Whoever completes a waiter must first win `try_claim`, so a
//! select is completed by exactly one case.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};

const UNCLAIMED: usize = usize::MAX;

pub(crate) struct Parker {
    /// Index of the case that completed this parker, or `UNCLAIMED`.
    claimed: AtomicUsize,
    woken: Mutex<bool>,
    cvar: Condvar,
}

impl Parker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            claimed: AtomicUsize::new(UNCLAIMED),
            woken: Mutex::new(false),
            cvar: Condvar::new(),
        })
    }

    /// Claim the parker for `case`. Fails if another case already won.
    pub fn try_claim(&self, case: usize) -> bool {
        self.claimed
            .compare_exchange(UNCLAIMED, case, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// The winning case. Only meaningful after `park` returns.
    pub fn claimed(&self) -> usize {
        self.claimed.load(Ordering::Acquire)
    }

    pub fn unpark(&self) {
        let mut woken = self.woken.lock().unwrap_or_else(PoisonError::into_inner);
        *woken = true;
        self.cvar.notify_one();
    }

    /// Block until `unpark`. Returns the winning case index.
    pub fn park(&self) -> usize {
        let mut woken = self.woken.lock().unwrap_or_else(PoisonError::into_inner);
        while !*woken {
            woken = self
                .cvar
                .wait(woken)
                .unwrap_or_else(PoisonError::into_inner);
        }
        self.claimed()
    }
}

/// A blocked operation queued on a channel.
///
/// `slot` carries the payload: for a receiver it starts empty and is
/// filled on delivery; for a sender it starts full and is emptied when a
/// receiver takes the value. Whatever is left after wakeup tells the
/// blocked side whether it was served or woken by close.
pub(crate) struct Waiter<T> {
    pub parker: Arc<Parker>,
    pub case: usize,
    pub slot: Arc<Mutex<Option<T>>>,
}

impl<T> Waiter<T> {
    pub fn new(parker: &Arc<Parker>, case: usize, value: Option<T>) -> Self {
        Self {
            parker: parker.clone(),
            case,
            slot: Arc::new(Mutex::new(value)),
        }
    }

    pub fn belongs_to(&self, parker: &Arc<Parker>) -> bool {
        Arc::ptr_eq(&self.parker, parker)
    }
}

/// Lock a slot, ignoring poison.
pub(crate) fn slot_take<T>(slot: &Mutex<Option<T>>) -> Option<T> {
    slot.lock().unwrap_or_else(PoisonError::into_inner).take()
}

pub(crate) fn slot_put<T>(slot: &Mutex<Option<T>>, value: T) {
    *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(value);
}
