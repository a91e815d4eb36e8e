// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Shared-counter increments: unprotected read-modify-write loses updates,
//! mutex and atomic increments never do.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rask_conc::{spawn_with, CompletionBarrier, Locked, Mutex};

const TASKS: usize = 10;
const INCREMENTS: usize = 10_000;

/// Run `body(task_index)` on `TASKS` tasks and wait for all of them.
fn run_cohort<F>(body: F)
where
    F: Fn(usize) + Send + Sync + 'static,
{
    let body = Arc::new(body);
    let barrier = Arc::new(CompletionBarrier::new());
    barrier.add(TASKS as isize).unwrap();
    for i in 0..TASKS {
        let body = body.clone();
        let barrier = barrier.clone();
        drop(spawn_with(i, move |i| {
            body(i);
            barrier.done().unwrap();
        }));
    }
    barrier.wait();
}

#[test]
fn racy_counter_never_exceeds_total() {
    let counter = Arc::new(AtomicUsize::new(0));
    let c = counter.clone();
    run_cohort(move |_| {
        for _ in 0..INCREMENTS {
            // Separate read and write-back: interleavings lose updates.
            let v = c.load(Ordering::Relaxed);
            c.store(v + 1, Ordering::Relaxed);
        }
    });
    let total = counter.load(Ordering::Relaxed);
    assert!(total <= TASKS * INCREMENTS, "racy total {} too large", total);
    assert!(total > 0);
}

#[test]
fn mutex_counter_is_exact() {
    for _ in 0..5 {
        let mutex = Arc::new(Mutex::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let (m, c) = (mutex.clone(), counter.clone());
        run_cohort(move |_| {
            for _ in 0..INCREMENTS / 10 {
                m.lock();
                let v = c.load(Ordering::Relaxed);
                c.store(v + 1, Ordering::Relaxed);
                m.unlock().unwrap();
            }
        });
        assert_eq!(counter.load(Ordering::Relaxed), TASKS * INCREMENTS / 10);
    }
}

#[test]
fn locked_counter_is_exact() {
    let counter = Arc::new(Locked::new(0usize));
    let c = counter.clone();
    run_cohort(move |_| {
        for _ in 0..INCREMENTS / 10 {
            c.lock(|v| *v += 1);
        }
    });
    assert_eq!(counter.lock(|v| *v), TASKS * INCREMENTS / 10);
}

#[test]
fn atomic_counter_is_exact() {
    let counter = Arc::new(AtomicUsize::new(0));
    let c = counter.clone();
    run_cohort(move |_| {
        for _ in 0..INCREMENTS {
            c.fetch_add(1, Ordering::Relaxed);
        }
    });
    assert_eq!(counter.load(Ordering::Relaxed), TASKS * INCREMENTS);
}

#[test]
fn per_task_values_are_owned_copies() {
    let seen = Arc::new(Locked::new(Vec::new()));
    let s = seen.clone();
    run_cohort(move |i| s.lock(|v| v.push(i)));
    let mut got = seen.lock(|v| v.clone());
    got.sort();
    assert_eq!(got, (0..TASKS).collect::<Vec<_>>());
}
