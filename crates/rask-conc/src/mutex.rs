// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Mutual exclusion.
//!
//! `Mutex` is a bare lock with explicit `lock`/`unlock`, owned by the task
//! that locked it. Not reentrant: locking twice from the same task
//! deadlocks. `Locked<T>` pairs a `Mutex` with the value it protects and
//! only hands it out inside a closure, so no reference escapes.

use std::cell::UnsafeCell;
use std::sync::{Condvar, Mutex as StdMutex, MutexGuard, PoisonError};

use crate::error::ConcError;
use crate::task::{self, TaskId};

/// Binary lock with a holder and an ownerless wait queue.
#[derive(Debug, Default)]
pub struct Mutex {
    holder: StdMutex<Option<TaskId>>,
    released: Condvar,
}

impl Mutex {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, Option<TaskId>> {
        self.holder.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until the lock is free, then take it.
    pub fn lock(&self) {
        let me = task::current();
        let mut holder = self.state();
        while holder.is_some() {
            holder = self
                .released
                .wait(holder)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *holder = Some(me);
    }

    /// Take the lock if it is free. Never blocks.
    pub fn try_lock(&self) -> bool {
        let mut holder = self.state();
        if holder.is_some() {
            return false;
        }
        *holder = Some(task::current());
        true
    }

    /// Release the lock and wake one waiter.
    ///
    /// Fails with `NotOwner` if the calling task does not hold it.
    pub fn unlock(&self) -> Result<(), ConcError> {
        let mut holder = self.state();
        if *holder != Some(task::current()) {
            return Err(ConcError::NotOwner);
        }
        *holder = None;
        drop(holder);
        self.released.notify_one();
        Ok(())
    }

    pub fn is_locked(&self) -> bool {
        self.state().is_some()
    }
}

/// Releases the lock on drop, including during unwinding.
struct Unlock<'a>(&'a Mutex);

impl Drop for Unlock<'_> {
    fn drop(&mut self) {
        // Locked by this task in `Locked::lock`/`try_lock` on this thread.
        let _ = self.0.unlock();
    }
}

/// A value only reachable while its `Mutex` is held.
pub struct Locked<T> {
    mutex: Mutex,
    value: UnsafeCell<T>,
}

// Same bounds as std's Mutex<T>: access is exclusive.
unsafe impl<T: Send> Send for Locked<T> {}
unsafe impl<T: Send> Sync for Locked<T> {}

impl<T> Locked<T> {
    pub fn new(value: T) -> Self {
        Self {
            mutex: Mutex::new(),
            value: UnsafeCell::new(value),
        }
    }

    /// Acquire the lock and run `f` with exclusive access.
    pub fn lock<R, F: FnOnce(&mut T) -> R>(&self, f: F) -> R {
        self.mutex.lock();
        let _unlock = Unlock(&self.mutex);
        // SAFETY: the mutex is held until `_unlock` drops.
        f(unsafe { &mut *self.value.get() })
    }

    /// Run `f` only if the lock is free right now.
    pub fn try_lock<R, F: FnOnce(&mut T) -> R>(&self, f: F) -> Option<R> {
        if !self.mutex.try_lock() {
            return None;
        }
        let _unlock = Unlock(&self.mutex);
        // SAFETY: the mutex is held until `_unlock` drops.
        Some(f(unsafe { &mut *self.value.get() }))
    }

    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

impl<T: Default> Default for Locked<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn lock_unlock() {
        let m = Mutex::new();
        m.lock();
        assert!(m.is_locked());
        m.unlock().unwrap();
        assert!(!m.is_locked());
    }

    #[test]
    fn unlock_unlocked_is_not_owner() {
        let m = Mutex::new();
        assert_eq!(m.unlock(), Err(ConcError::NotOwner));
    }

    #[test]
    fn unlock_from_other_task_is_not_owner() {
        let m = Arc::new(Mutex::new());
        m.lock();
        let m2 = m.clone();
        let res = thread::spawn(move || m2.unlock()).join().unwrap();
        assert_eq!(res, Err(ConcError::NotOwner));
        assert!(m.is_locked());
        m.unlock().unwrap();
    }

    #[test]
    fn try_lock_fails_when_held() {
        let m = Mutex::new();
        assert!(m.try_lock());
        assert!(!m.try_lock());
        m.unlock().unwrap();
    }

    #[test]
    fn lock_blocks_until_released() {
        let m = Arc::new(Mutex::new());
        m.lock();
        let m2 = m.clone();
        let t = thread::spawn(move || {
            m2.lock();
            m2.unlock().unwrap();
        });
        thread::sleep(Duration::from_millis(20));
        assert!(!t.is_finished());
        m.unlock().unwrap();
        t.join().unwrap();
    }

    #[test]
    fn locked_mutate() {
        let m = Locked::new(0);
        m.lock(|v| *v += 1);
        assert_eq!(m.lock(|v| *v), 1);
        assert_eq!(m.try_lock(|v| *v), Some(1));
        assert_eq!(m.into_inner(), 1);
    }

    #[test]
    fn locked_released_after_panic() {
        let m = Arc::new(Locked::new(0));
        let m2 = m.clone();
        let res = thread::spawn(move || m2.lock(|_| panic!("inside"))).join();
        assert!(res.is_err());
        assert_eq!(m.try_lock(|v| *v), Some(0));
    }

    #[test]
    fn concurrent_lock() {
        let m = Arc::new(Locked::new(0));
        let mut handles = vec![];
        for _ in 0..10 {
            let m = m.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    m.lock(|v| *v += 1);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(m.lock(|v| *v), 1000);
    }
}
