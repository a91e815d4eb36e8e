// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Rask concurrency primitives.
//!
//! Tasks run on their own OS threads and coordinate through:
//! - channels — buffered or rendezvous, closable, iterable
//! - select — wait on the first ready of several channel operations
//! - mutex — explicit lock/unlock with ownership checks, plus `Locked<T>`
//! - barrier — wait for a cohort of tasks to finish
//!
//! Misuse (sending on a closed channel, closing twice, unlocking a mutex
//! you don't hold, over-signalling a barrier, empty select) is reported
//! as `ConcError` at the offending call. Deadlock from misuse is not
//! detected.

pub mod barrier;
pub mod channel;
pub mod config;
pub mod error;
pub mod mutex;
mod park;
pub mod select;
pub mod task;
pub mod timer;

pub use barrier::CompletionBarrier;
pub use channel::Channel;
pub use config::TaskConfig;
pub use error::{ConcError, JoinError, SendError, TryRecvError, TrySendError};
pub use mutex::{Locked, Mutex};
pub use select::{select_recv, Select};
pub use task::{spawn, spawn_with, Task, TaskId};
