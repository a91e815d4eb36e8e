// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Task spawning configuration.

use std::sync::OnceLock;

/// Env var overriding the stack size of spawned tasks (bytes, `k`/`m` suffix).
pub const STACK_SIZE_ENV: &str = "RASK_TASK_STACK_SIZE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskConfig {
    /// Thread name prefix; the task id is appended.
    pub name_prefix: String,
    /// Stack size in bytes. `None` uses the platform default.
    pub stack_size: Option<usize>,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            name_prefix: "rask-task".to_string(),
            stack_size: None,
        }
    }
}

impl TaskConfig {
    /// Defaults, with the stack size taken from `RASK_TASK_STACK_SIZE` if set.
    ///
    /// Unparseable values are ignored.
    pub fn from_env() -> Self {
        let stack_size = std::env::var(STACK_SIZE_ENV)
            .ok()
            .and_then(|s| parse_size(&s));
        Self {
            stack_size,
            ..Self::default()
        }
    }

    /// Process-wide config used by `task::spawn`. Read from the environment once.
    pub fn global() -> &'static TaskConfig {
        static GLOBAL: OnceLock<TaskConfig> = OnceLock::new();
        GLOBAL.get_or_init(TaskConfig::from_env)
    }
}

/// Parse "65536", "64k", "8m".
fn parse_size(s: &str) -> Option<usize> {
    let s = s.trim().to_ascii_lowercase();
    let (digits, mult) = if let Some(n) = s.strip_suffix('k') {
        (n, 1024)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 1024 * 1024)
    } else {
        (s.as_str(), 1)
    };
    let n: usize = digits.trim().parse().ok()?;
    n.checked_mul(mult).filter(|&bytes| bytes > 0)
}
