// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Task spawn and identity.
//!
//! Thread-per-task: every task runs on its own OS thread, so every
//! suspension point in this crate is a real park. Tasks are never joined
//! implicitly; dropping a `Task` detaches it.

use std::cell::Cell;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use tracing::{debug, trace};

use crate::config::TaskConfig;
use crate::error::JoinError;

/// Identity of a task. Unique for the life of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        TaskId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

thread_local! {
    static CURRENT: Cell<Option<TaskId>> = const { Cell::new(None) };
}

/// Id of the calling task.
///
/// Threads not started through `spawn` (e.g. `main`) get an id on first call.
pub fn current() -> TaskId {
    CURRENT.with(|cell| match cell.get() {
        Some(id) => id,
        None => {
            let id = TaskId::next();
            cell.set(Some(id));
            id
        }
    })
}

/// Handle to a spawned task. Dropping it detaches the task.
#[derive(Debug)]
pub struct Task {
    id: TaskId,
    handle: JoinHandle<Result<(), String>>,
}

impl Task {
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Whether the task body has returned (or panicked).
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Block until the task finishes.
    pub fn join(self) -> Result<(), JoinError> {
        match self.handle.join() {
            Ok(Ok(())) => Ok(()),
            Ok(Err(msg)) => Err(JoinError::Panicked(msg)),
            Err(payload) => Err(JoinError::Panicked(panic_message(payload))),
        }
    }
}

/// Per-task overrides on top of `TaskConfig::global()`.
#[derive(Debug, Default)]
pub struct Builder {
    name: Option<String>,
    stack_size: Option<usize>,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    /// Start `body` concurrently with the caller and return without waiting.
    pub fn spawn<F>(self, body: F) -> io::Result<Task>
    where
        F: FnOnce() + Send + 'static,
    {
        let config = TaskConfig::global();
        let id = TaskId::next();
        let name = self
            .name
            .unwrap_or_else(|| format!("{}-{}", config.name_prefix, id.0));

        let mut builder = thread::Builder::new().name(name);
        if let Some(bytes) = self.stack_size.or(config.stack_size) {
            builder = builder.stack_size(bytes);
        }

        let handle = builder.spawn(move || {
            CURRENT.with(|cell| cell.set(Some(id)));
            trace!(task = id.0, "task started");
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(body))
                .map_err(panic_message);
            match &result {
                Ok(()) => trace!(task = id.0, "task finished"),
                Err(msg) => debug!(task = id.0, panic = %msg, "task panicked"),
            }
            result
        })?;

        trace!(task = id.0, "task spawned");
        Ok(Task { id, handle })
    }
}

/// Spawn a task running `body`.
///
/// Panics if the OS refuses to create a thread, like `std::thread::spawn`.
pub fn spawn<F>(body: F) -> Task
where
    F: FnOnce() + Send + 'static,
{
    Builder::new()
        .spawn(body)
        .expect("failed to spawn task thread")
}

/// Spawn a task that receives `value` as its argument.
///
/// Use this for per-iteration values so each task owns its own copy
/// instead of sharing a binding with the spawner.
pub fn spawn_with<V, F>(value: V, body: F) -> Task
where
    V: Send + 'static,
    F: FnOnce(V) + Send + 'static,
{
    spawn(move || body(value))
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
