// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Completion barrier: wait for a cohort of tasks to finish.
//!
//! Register outstanding work with `add`, signal each unit with `done`,
//! block in `wait` until the count reaches zero. Registrations for a
//! cohort must happen before the matching `wait`; that ordering is the
//! caller's job.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::ConcError;

#[derive(Debug, Default)]
pub struct CompletionBarrier {
    outstanding: Mutex<usize>,
    zero: Condvar,
}

impl CompletionBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    fn count(&self) -> MutexGuard<'_, usize> {
        self.outstanding
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Adjust the outstanding count by `n`.
    ///
    /// Negative `n` corrects an over-registration; the count is left
    /// untouched and `NegativeCounter` returned if it would go below zero.
    pub fn add(&self, n: isize) -> Result<(), ConcError> {
        let mut count = self.count();
        let next = if n >= 0 {
            count.checked_add(n.unsigned_abs())
        } else {
            count.checked_sub(n.unsigned_abs())
        };
        // Overflow is as much a misuse as underflow.
        *count = next.ok_or(ConcError::NegativeCounter)?;
        if *count == 0 {
            self.zero.notify_all();
        }
        Ok(())
    }

    /// Signal one unit of work as complete.
    pub fn done(&self) -> Result<(), ConcError> {
        self.add(-1)
    }

    /// Block until the outstanding count is zero. Returns at once if it already is.
    pub fn wait(&self) {
        let mut count = self.count();
        while *count > 0 {
            count = self
                .zero
                .wait(count)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like `wait`, but gives up after `timeout`. Returns whether the count reached zero.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = self.count();
        while *count > 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            count = self
                .zero
                .wait_timeout(count, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }

    pub fn outstanding(&self) -> usize {
        *self.count()
    }
}
