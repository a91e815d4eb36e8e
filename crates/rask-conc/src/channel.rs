// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Channels: bounded FIFO or rendezvous hand-off, closable, iterable.
//!
//! A `Channel<T>` is one shared queue; every clone is a handle to the same
//! channel and may send, receive or close. Capacity 0 is a rendezvous: a
//! send completes only when a receiver takes the value.
//!
//! All state lives behind one internal lock per channel. Blocked senders
//! and receivers sit in FIFO wait queues and are served directly by the
//! operation that makes them ready, so a woken task never races to
//! re-acquire anything.

use std::cell::UnsafeCell;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{ConcError, SendError, TryRecvError, TrySendError};
use crate::park::{slot_put, slot_take, Parker, Waiter};

/// Create a channel buffering up to `n` values. `buffered(0)` is a rendezvous channel.
pub fn buffered<T>(n: usize) -> Channel<T> {
    Channel::new(n)
}

/// Create a rendezvous channel.
pub fn unbuffered<T>() -> Channel<T> {
    Channel::new(0)
}

pub(crate) struct ChanState<T> {
    buf: VecDeque<T>,
    cap: usize,
    closed: bool,
    recvq: VecDeque<Waiter<T>>,
    sendq: VecDeque<Waiter<T>>,
}

impl<T> ChanState<T> {
    fn new(cap: usize) -> Self {
        Self {
            buf: VecDeque::with_capacity(cap),
            cap,
            closed: false,
            recvq: VecDeque::new(),
            sendq: VecDeque::new(),
        }
    }

    pub fn try_send(&mut self, value: T) -> Result<(), TrySendError<T>> {
        if self.closed {
            return Err(TrySendError::Closed(value));
        }
        // A receiver only blocks on an empty buffer, so handing off
        // directly keeps FIFO order.
        if let Some(w) = dequeue_live(&mut self.recvq) {
            slot_put(&w.slot, value);
            w.parker.unpark();
            return Ok(());
        }
        if self.buf.len() < self.cap {
            self.buf.push_back(value);
            return Ok(());
        }
        Err(TrySendError::Full(value))
    }

    pub fn try_recv(&mut self) -> Result<T, TryRecvError> {
        if let Some(value) = self.buf.pop_front() {
            // Slot freed: admit the oldest blocked sender.
            if let Some(next) = self.take_from_sender() {
                self.buf.push_back(next);
            }
            return Ok(value);
        }
        if let Some(value) = self.take_from_sender() {
            return Ok(value);
        }
        if self.closed {
            Err(TryRecvError::Closed)
        } else {
            Err(TryRecvError::Empty)
        }
    }

    fn take_from_sender(&mut self) -> Option<T> {
        let w = dequeue_live(&mut self.sendq)?;
        let value = slot_take(&w.slot);
        w.parker.unpark();
        value
    }

    pub fn close(&mut self) -> Result<(), ConcError> {
        if self.closed {
            return Err(ConcError::DoubleClose);
        }
        self.closed = true;
        // Receivers only wait on an empty buffer, so they see closed-and-empty.
        while let Some(w) = dequeue_live(&mut self.recvq) {
            w.parker.unpark();
        }
        // Senders keep their value in the slot and report Closed.
        while let Some(w) = dequeue_live(&mut self.sendq) {
            w.parker.unpark();
        }
        Ok(())
    }

    pub fn push_receiver(&mut self, waiter: Waiter<T>) {
        self.recvq.push_back(waiter);
    }

    pub fn push_sender(&mut self, waiter: Waiter<T>) {
        self.sendq.push_back(waiter);
    }

    /// Drop every waiter registered by `parker`.
    pub fn forget(&mut self, parker: &Arc<Parker>) {
        self.recvq.retain(|w| !w.belongs_to(parker));
        self.sendq.retain(|w| !w.belongs_to(parker));
    }
}

/// Pop the first waiter whose parker is still unclaimed, discarding stale
/// entries left behind by selects that completed elsewhere.
fn dequeue_live<T>(queue: &mut VecDeque<Waiter<T>>) -> Option<Waiter<T>> {
    while let Some(w) = queue.pop_front() {
        if w.parker.try_claim(w.case) {
            return Some(w);
        }
    }
    None
}

/// Shared channel core.
///
/// The state sits in an `UnsafeCell` next to a type-erased lock so a
/// select can hold the locks of channels with different element types at
/// once.
pub(crate) struct Chan<T> {
    lock: Mutex<()>,
    state: UnsafeCell<ChanState<T>>,
    cap: usize,
}

// Values move between tasks; they are never shared by reference.
unsafe impl<T: Send> Send for Chan<T> {}
unsafe impl<T: Send> Sync for Chan<T> {}

impl<T> Chan<T> {
    pub fn raw_lock(&self) -> &Mutex<()> {
        &self.lock
    }

    pub fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// # Safety
    /// The caller must hold `self.lock` for as long as the returned
    /// reference lives, and must not create a second reference to the
    /// state while it does.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn state(&self) -> &mut ChanState<T> {
        &mut *self.state.get()
    }
}

/// A typed channel handle. Cloning shares the same channel.
pub struct Channel<T> {
    inner: Arc<Chan<T>>,
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Channel<T> {
    /// New channel holding up to `capacity` queued values (0 = rendezvous).
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Chan {
                lock: Mutex::new(()),
                state: UnsafeCell::new(ChanState::new(capacity)),
                cap: capacity,
            }),
        }
    }

    pub(crate) fn chan(&self) -> &Chan<T> {
        &self.inner
    }

    /// Blocking send.
    ///
    /// Returns once the value is queued or, for a rendezvous channel,
    /// taken by a receiver. Fails with the value if the channel is closed
    /// before that happens.
    pub fn send(&self, value: T) -> Result<(), SendError<T>> {
        let chan = self.chan();
        let guard = chan.lock();
        // SAFETY: lock held until `drop(guard)`; `st` is not used after.
        let st = unsafe { chan.state() };
        let value = match st.try_send(value) {
            Ok(()) => return Ok(()),
            Err(TrySendError::Closed(v)) => return Err(SendError::Closed(v)),
            Err(TrySendError::Full(v)) => v,
        };

        let parker = Parker::new();
        let waiter = Waiter::new(&parker, 0, Some(value));
        let slot = waiter.slot.clone();
        st.push_sender(waiter);
        drop(guard);

        parker.park();
        match slot_take(&slot) {
            None => Ok(()),
            Some(v) => Err(SendError::Closed(v)),
        }
    }

    /// Non-blocking send.
    pub fn try_send(&self, value: T) -> Result<(), TrySendError<T>> {
        let chan = self.chan();
        let _guard = chan.lock();
        // SAFETY: lock held for the whole call.
        unsafe { chan.state() }.try_send(value)
    }

    /// Blocking receive.
    ///
    /// `None` means the channel is closed and every queued value has been
    /// received.
    pub fn recv(&self) -> Option<T> {
        let chan = self.chan();
        let guard = chan.lock();
        // SAFETY: lock held until `drop(guard)`; `st` is not used after.
        let st = unsafe { chan.state() };
        match st.try_recv() {
            Ok(v) => return Some(v),
            Err(TryRecvError::Closed) => return None,
            Err(TryRecvError::Empty) => {}
        }

        let parker = Parker::new();
        let waiter = Waiter::new(&parker, 0, None);
        let slot = waiter.slot.clone();
        st.push_receiver(waiter);
        drop(guard);

        parker.park();
        slot_take(&slot)
    }

    /// Receive in comma-ok form: `(value, true)`, or `(T::default(), false)`
    /// once closed and drained.
    pub fn recv_ok(&self) -> (T, bool)
    where
        T: Default,
    {
        match self.recv() {
            Some(v) => (v, true),
            None => (T::default(), false),
        }
    }

    /// Non-blocking receive.
    pub fn try_recv(&self) -> Result<T, TryRecvError> {
        let chan = self.chan();
        let _guard = chan.lock();
        // SAFETY: lock held for the whole call.
        unsafe { chan.state() }.try_recv()
    }

    /// Close the channel.
    ///
    /// Blocked senders fail; blocked receivers wake and see closed. Values
    /// already queued stay receivable. Closing twice is an error.
    pub fn close(&self) -> Result<(), ConcError> {
        let chan = self.chan();
        let _guard = chan.lock();
        // SAFETY: lock held for the whole call.
        unsafe { chan.state() }.close()
    }

    /// Receive until closed and drained.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter { chan: self }
    }

    pub fn capacity(&self) -> usize {
        self.inner.cap
    }

    /// Number of queued values.
    pub fn len(&self) -> usize {
        let chan = self.chan();
        let _guard = chan.lock();
        // SAFETY: lock held for the whole call.
        unsafe { chan.state() }.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        let chan = self.chan();
        let _guard = chan.lock();
        // SAFETY: lock held for the whole call.
        unsafe { chan.state() }.closed
    }
}

impl<T> std::fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Borrowing iterator returned by `Channel::iter`.
pub struct Iter<'a, T> {
    chan: &'a Channel<T>,
}

impl<T> Iterator for Iter<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.chan.recv()
    }
}

/// Owning iterator over a channel handle.
pub struct IntoIter<T> {
    chan: Channel<T>,
}

impl<T> Iterator for IntoIter<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.chan.recv()
    }
}

impl<'a, T> IntoIterator for &'a Channel<T> {
    type Item = T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Iter<'a, T> {
        self.iter()
    }
}

impl<T> IntoIterator for Channel<T> {
    type Item = T;
    type IntoIter = IntoIter<T>;

    fn into_iter(self) -> IntoIter<T> {
        IntoIter { chan: self }
    }
}
