// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! One-shot timer channels, for timeout arms in a select.

use std::time::Duration;

use crate::channel::{self, Channel};
use crate::task;

/// Channel that yields one `()` after `duration`, then closes.
///
/// Dropping every handle does not stop the timer task; it finishes on its
/// own once the delay elapses.
pub fn after(duration: Duration) -> Channel<()> {
    let ch = channel::buffered(1);
    let tx = ch.clone();
    drop(task::spawn(move || {
        std::thread::sleep(duration);
        // Only this task ever sends on or closes the timer channel.
        let _ = tx.send(());
        let _ = tx.close();
    }));
    ch
}
