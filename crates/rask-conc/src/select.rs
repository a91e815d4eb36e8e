// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Select: wait on the first ready operation among several channels.
//!
//! Cases may mix send and receive over channels of different element
//! types. Every call locks all involved channels (in address order, so
//! concurrent selects cannot deadlock), polls the cases in a fresh random
//! order and runs the first ready one. A ready case is therefore chosen
//! uniformly among all ready cases, never "first listed wins".
//!
//! If nothing is ready the select queues one waiter per case, all sharing
//! a single parker, and sleeps. The first channel operation that claims
//! the parker completes that case; the remaining waiters are removed on
//! wakeup.
//!
//! Closed channels are always ready: a receive case gets `None`, a send
//! case makes the select fail with `ConcError::ChannelClosed`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rand::seq::SliceRandom;

use crate::channel::Channel;
use crate::error::{ConcError, TryRecvError, TrySendError};
use crate::park::{slot_take, Parker, Waiter};

/// Locks of every channel in one select, held together.
struct LockSet<'a> {
    _guards: Vec<MutexGuard<'a, ()>>,
}

impl<'a> LockSet<'a> {
    fn acquire(locks: impl Iterator<Item = &'a Mutex<()>>) -> Self {
        let mut locks: Vec<&'a Mutex<()>> = locks.collect();
        locks.sort_by_key(|m| *m as *const Mutex<()> as usize);
        locks.dedup_by_key(|m| *m as *const Mutex<()> as usize);
        Self {
            _guards: locks
                .into_iter()
                .map(|m| m.lock().unwrap_or_else(PoisonError::into_inner))
                .collect(),
        }
    }
}

/// One arm of a select. Methods taking `&LockSet` run with the case's
/// channel locked.
trait Case<'a, R> {
    fn lock(&self) -> &'a Mutex<()>;
    /// Complete the operation now if it is ready.
    fn poll(&mut self, locks: &LockSet<'a>) -> bool;
    fn register(&mut self, locks: &LockSet<'a>, parker: &Arc<Parker>, index: usize);
    fn forget(&mut self, locks: &LockSet<'a>, parker: &Arc<Parker>);
    /// Pick up the outcome left by whoever woke the parker for this case.
    fn collect_wakeup(&mut self);
    fn finish(self: Box<Self>) -> Result<R, ConcError>;
}

struct RecvCase<'a, T, F> {
    chan: &'a Channel<T>,
    handler: F,
    slot: Option<Arc<Mutex<Option<T>>>>,
    outcome: Option<Option<T>>,
}

impl<'a, T, F, R> Case<'a, R> for RecvCase<'a, T, F>
where
    F: FnOnce(Option<T>) -> R,
{
    fn lock(&self) -> &'a Mutex<()> {
        let chan: &'a Channel<T> = self.chan;
        chan.chan().raw_lock()
    }

    fn poll(&mut self, _locks: &LockSet<'a>) -> bool {
        // SAFETY: `_locks` holds this channel's lock.
        let st = unsafe { self.chan.chan().state() };
        match st.try_recv() {
            Ok(v) => self.outcome = Some(Some(v)),
            Err(TryRecvError::Closed) => self.outcome = Some(None),
            Err(TryRecvError::Empty) => return false,
        }
        true
    }

    fn register(&mut self, _locks: &LockSet<'a>, parker: &Arc<Parker>, index: usize) {
        let waiter = Waiter::new(parker, index, None);
        self.slot = Some(waiter.slot.clone());
        // SAFETY: `_locks` holds this channel's lock.
        unsafe { self.chan.chan().state() }.push_receiver(waiter);
    }

    fn forget(&mut self, _locks: &LockSet<'a>, parker: &Arc<Parker>) {
        // SAFETY: `_locks` holds this channel's lock.
        unsafe { self.chan.chan().state() }.forget(parker);
    }

    fn collect_wakeup(&mut self) {
        self.outcome = Some(self.slot.as_deref().and_then(slot_take));
    }

    fn finish(self: Box<Self>) -> Result<R, ConcError> {
        let this = *self;
        Ok((this.handler)(this.outcome.flatten()))
    }
}

struct SendCase<'a, T, F> {
    chan: &'a Channel<T>,
    value: Option<T>,
    handler: F,
    slot: Option<Arc<Mutex<Option<T>>>>,
    sent: Option<bool>,
}

impl<'a, T, F, R> Case<'a, R> for SendCase<'a, T, F>
where
    F: FnOnce() -> R,
{
    fn lock(&self) -> &'a Mutex<()> {
        let chan: &'a Channel<T> = self.chan;
        chan.chan().raw_lock()
    }

    fn poll(&mut self, _locks: &LockSet<'a>) -> bool {
        let Some(value) = self.value.take() else {
            return false;
        };
        // SAFETY: `_locks` holds this channel's lock.
        let st = unsafe { self.chan.chan().state() };
        match st.try_send(value) {
            Ok(()) => self.sent = Some(true),
            Err(TrySendError::Closed(v)) => {
                self.value = Some(v);
                self.sent = Some(false);
            }
            Err(TrySendError::Full(v)) => {
                self.value = Some(v);
                return false;
            }
        }
        true
    }

    fn register(&mut self, _locks: &LockSet<'a>, parker: &Arc<Parker>, index: usize) {
        let waiter = Waiter::new(parker, index, self.value.take());
        self.slot = Some(waiter.slot.clone());
        // SAFETY: `_locks` holds this channel's lock.
        unsafe { self.chan.chan().state() }.push_sender(waiter);
    }

    fn forget(&mut self, _locks: &LockSet<'a>, parker: &Arc<Parker>) {
        // SAFETY: `_locks` holds this channel's lock.
        unsafe { self.chan.chan().state() }.forget(parker);
    }

    fn collect_wakeup(&mut self) {
        // A value still in the slot means close woke us, not a receiver.
        let leftover = self.slot.as_deref().and_then(slot_take);
        self.sent = Some(leftover.is_none());
    }

    fn finish(self: Box<Self>) -> Result<R, ConcError> {
        let this = *self;
        if this.sent == Some(true) {
            Ok((this.handler)())
        } else {
            Err(ConcError::ChannelClosed)
        }
    }
}

/// Builder for one select call.
///
/// ```
/// use rask_conc::{channel, Select};
///
/// let nums = channel::buffered::<i32>(1);
/// let words = channel::buffered::<&str>(1);
/// nums.send(7).unwrap();
///
/// let got = Select::new()
///     .recv(&nums, |v| format!("num {:?}", v))
///     .recv(&words, |v| format!("word {:?}", v))
///     .wait()
///     .unwrap();
/// assert_eq!(got, "num Some(7)");
/// ```
pub struct Select<'a, R> {
    cases: Vec<Box<dyn Case<'a, R> + 'a>>,
}

impl<'a, R> Default for Select<'a, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, R> Select<'a, R> {
    pub fn new() -> Self {
        Self { cases: Vec::new() }
    }

    /// Add a receive case. `handler` gets `None` if the channel is closed and drained.
    pub fn recv<T, F>(mut self, chan: &'a Channel<T>, handler: F) -> Self
    where
        T: 'a,
        F: FnOnce(Option<T>) -> R + 'a,
        R: 'a,
    {
        self.cases.push(Box::new(RecvCase {
            chan,
            handler,
            slot: None,
            outcome: None,
        }));
        self
    }

    /// Add a send case. If another case is chosen, `value` is dropped unsent.
    pub fn send<T, F>(mut self, chan: &'a Channel<T>, value: T, handler: F) -> Self
    where
        T: 'a,
        F: FnOnce() -> R + 'a,
        R: 'a,
    {
        self.cases.push(Box::new(SendCase {
            chan,
            value: Some(value),
            handler,
            slot: None,
            sent: None,
        }));
        self
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Block until one case completes and return its handler's result.
    pub fn wait(self) -> Result<R, ConcError> {
        match self.run(true)? {
            Some(r) => Ok(r),
            // Blocking runs always complete a case.
            None => unreachable!("blocking select returned without a case"),
        }
    }

    /// Run a ready case if there is one, else return `Ok(None)` without blocking.
    pub fn try_wait(self) -> Result<Option<R>, ConcError> {
        self.run(false)
    }

    fn run(mut self, block: bool) -> Result<Option<R>, ConcError> {
        if self.cases.is_empty() {
            return Err(ConcError::EmptySelect);
        }

        let mut order: Vec<usize> = (0..self.cases.len()).collect();
        order.shuffle(&mut rand::thread_rng());

        let locks = LockSet::acquire(self.cases.iter().map(|c| c.lock()));
        for &i in &order {
            if self.cases[i].poll(&locks) {
                drop(locks);
                return self.finish(i).map(Some);
            }
        }
        if !block {
            return Ok(None);
        }

        let parker = Parker::new();
        for (i, case) in self.cases.iter_mut().enumerate() {
            case.register(&locks, &parker, i);
        }
        drop(locks);

        let chosen = parker.park();

        let locks = LockSet::acquire(self.cases.iter().map(|c| c.lock()));
        for case in self.cases.iter_mut() {
            case.forget(&locks, &parker);
        }
        drop(locks);

        self.cases[chosen].collect_wakeup();
        self.finish(chosen).map(Some)
    }

    fn finish(mut self, index: usize) -> Result<R, ConcError> {
        self.cases.swap_remove(index).finish()
    }
}

/// Receive from whichever channel is ready first.
///
/// Returns the index of the chosen channel and what it yielded (`None`
/// if it was closed and drained).
pub fn select_recv<T>(chans: &[&Channel<T>]) -> Result<(usize, Option<T>), ConcError> {
    chans
        .iter()
        .enumerate()
        .fold(Select::new(), |sel, (i, ch)| {
            sel.recv(*ch, move |v| (i, v))
        })
        .wait()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn select_single_channel() {
        let ch = channel::buffered(10);
        ch.send(42).unwrap();
        let got = Select::new().recv(&ch, |v| v).wait().unwrap();
        assert_eq!(got, Some(42));
    }

    #[test]
    fn select_picks_the_ready_channel() {
        let a = channel::buffered(10);
        let b = channel::buffered::<i32>(10);
        a.send(99).unwrap();
        assert_eq!(select_recv(&[&a, &b]).unwrap(), (0, Some(99)));
    }

    #[test]
    fn empty_select_fails() {
        let sel: Select<'_, ()> = Select::new();
        assert_eq!(sel.wait(), Err(ConcError::EmptySelect));
        let sel: Select<'_, ()> = Select::new();
        assert_eq!(sel.try_wait(), Err(ConcError::EmptySelect));
    }

    #[test]
    fn try_wait_default_arm() {
        let ch = channel::buffered::<i32>(10);
        let got = Select::new().recv(&ch, |v| v).try_wait().unwrap();
        assert_eq!(got, None);
    }

    #[test]
    fn closed_receive_case_is_ready() {
        let open = channel::unbuffered::<i32>();
        let closed = channel::unbuffered::<i32>();
        closed.close().unwrap();
        let got = Select::new()
            .recv(&open, |_| "open")
            .recv(&closed, |v| {
                assert_eq!(v, None);
                "closed"
            })
            .wait()
            .unwrap();
        assert_eq!(got, "closed");
    }

    #[test]
    fn closed_send_case_errors() {
        let ch = channel::buffered::<i32>(1);
        ch.close().unwrap();
        let res = Select::new().send(&ch, 1, || ()).wait();
        assert_eq!(res, Err(ConcError::ChannelClosed));
    }

    #[test]
    fn send_case_fills_buffer() {
        let ch = channel::buffered(1);
        Select::new().send(&ch, 5, || ()).wait().unwrap();
        assert_eq!(ch.recv(), Some(5));
    }

    #[test]
    fn blocks_until_a_sender_arrives() {
        let a = channel::unbuffered::<i32>();
        let b = channel::unbuffered::<String>();
        let tx = b.clone();
        let t = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            tx.send("hello".to_string()).unwrap();
        });
        let got = Select::new()
            .recv(&a, |v| format!("{:?}", v))
            .recv(&b, |v| v.unwrap_or_default())
            .wait()
            .unwrap();
        assert_eq!(got, "hello");
        t.join().unwrap();
    }

    #[test]
    fn blocked_send_case_meets_receiver() {
        let ch = channel::unbuffered::<i32>();
        let rx = ch.clone();
        let t = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            rx.recv()
        });
        Select::new().send(&ch, 11, || ()).wait().unwrap();
        assert_eq!(t.join().unwrap(), Some(11));
    }

    #[test]
    fn unchosen_waiters_are_removed() {
        let a = channel::unbuffered::<i32>();
        let b = channel::unbuffered::<i32>();
        let tx = a.clone();
        let t = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            tx.send(1).unwrap();
        });
        let got = Select::new()
            .recv(&a, |v| v)
            .send(&b, 2, || None)
            .wait()
            .unwrap();
        assert_eq!(got, Some(1));
        t.join().unwrap();
        // The abandoned send on `b` must not be visible to a receiver.
        assert!(matches!(b.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn close_wakes_blocked_select() {
        let ch = channel::unbuffered::<i32>();
        let closer = ch.clone();
        let t = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            closer.close().unwrap();
        });
        let got = Select::new().recv(&ch, |v| v).wait().unwrap();
        assert_eq!(got, None);
        t.join().unwrap();
    }

    #[test]
    fn same_channel_in_two_cases() {
        let ch = channel::buffered(1);
        ch.send(3).unwrap();
        let got = Select::new()
            .recv(&ch, |v| v)
            .recv(&ch, |v| v)
            .wait()
            .unwrap();
        assert_eq!(got, Some(3));
    }
}
