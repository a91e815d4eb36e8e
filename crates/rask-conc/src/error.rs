// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Misuse errors for the concurrency primitives.
//!
//! Every variant is a contract violation by the caller, never a transient
//! condition. Nothing here is retried.

use thiserror::Error;

/// The kind of misuse reported by a primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConcError {
    /// Send on a channel that has been closed.
    #[error("send on closed channel")]
    ChannelClosed,

    /// Close of a channel that was already closed.
    #[error("close of closed channel")]
    DoubleClose,

    /// Unlock of a mutex the calling task does not hold.
    #[error("unlock of mutex not held by the calling task")]
    NotOwner,

    /// Completion barrier counter would drop below zero.
    #[error("completion barrier counter went negative")]
    NegativeCounter,

    /// Select called with no cases.
    #[error("select with no cases")]
    EmptySelect,
}

/// Error from a blocking send. Hands the unsent value back.
#[derive(PartialEq, Eq)]
pub enum SendError<T> {
    /// Channel was closed before (or while) the value could be delivered.
    Closed(T),
}

impl<T> SendError<T> {
    /// Recover the value that was not sent.
    pub fn into_inner(self) -> T {
        match self {
            SendError::Closed(v) => v,
        }
    }
}

/// Error from a non-blocking send.
#[derive(PartialEq, Eq)]
pub enum TrySendError<T> {
    /// No buffer room and no receiver waiting.
    Full(T),
    /// Channel is closed.
    Closed(T),
}

impl<T> TrySendError<T> {
    pub fn into_inner(self) -> T {
        match self {
            TrySendError::Full(v) | TrySendError::Closed(v) => v,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, TrySendError::Full(_))
    }
}

/// Error from a non-blocking receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TryRecvError {
    /// Nothing queued and no sender waiting.
    #[error("receive on empty channel")]
    Empty,
    /// Closed and drained.
    #[error("receive on closed and drained channel")]
    Closed,
}

/// Error returned by `Task::join()`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinError {
    /// Task body panicked with the given message.
    #[error("task panicked: {0}")]
    Panicked(String),
}

// Hand-written so the payload type needs no `Debug`/`Display` bound.
impl<T> std::fmt::Debug for SendError<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SendError::Closed(_) => write!(f, "Closed(..)"),
        }
    }
}

impl<T> std::fmt::Display for SendError<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", ConcError::ChannelClosed)
    }
}

impl<T> std::error::Error for SendError<T> {}

impl<T> std::fmt::Debug for TrySendError<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrySendError::Full(_) => write!(f, "Full(..)"),
            TrySendError::Closed(_) => write!(f, "Closed(..)"),
        }
    }
}

impl<T> std::fmt::Display for TrySendError<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrySendError::Full(_) => write!(f, "send on full channel"),
            TrySendError::Closed(_) => write!(f, "{}", ConcError::ChannelClosed),
        }
    }
}

impl<T> std::error::Error for TrySendError<T> {}

impl<T> From<SendError<T>> for ConcError {
    fn from(_: SendError<T>) -> Self {
        ConcError::ChannelClosed
    }
}
