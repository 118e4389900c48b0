//! Process-wide stack of scoped command prefixes.
//!
//! While a [`PrefixGuard`] is alive, its tokens are prepended to the argument
//! vector of every command invoked anywhere in the process. Guards must be
//! dropped in reverse order of creation. The stack is shared by all threads
//! with no per-thread isolation: entering scoped prefixes from several threads
//! at once is not supported.

use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

static PREFIX_STACK: Mutex<Vec<Vec<String>>> = Mutex::new(Vec::new());

fn stack() -> MutexGuard<'static, Vec<Vec<String>>> {
    PREFIX_STACK
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Keeps a prefix active; popping happens on drop, including during unwinding.
#[derive(Debug)]
#[must_use = "the prefix is removed as soon as the guard is dropped"]
pub struct PrefixGuard {
    depth: usize,
}

impl PrefixGuard {
    /// Number of prefixes active while this guard is on top, itself included.
    pub fn depth(&self) -> usize {
        self.depth
    }
}

impl Drop for PrefixGuard {
    fn drop(&mut self) {
        let mut stack = stack();
        if stack.len() != self.depth {
            warn!(
                expected = self.depth,
                actual = stack.len(),
                "scoped prefixes released out of order"
            );
        }
        let popped = stack.pop();
        debug!(prefix = ?popped, "leave scoped prefix");
    }
}

pub(crate) fn push(tokens: Vec<String>) -> PrefixGuard {
    let mut stack = stack();
    debug!(prefix = ?tokens, "enter scoped prefix");
    stack.push(tokens);
    PrefixGuard { depth: stack.len() }
}

/// All active prefix tokens, outermost scope first.
pub fn active_prefix() -> Vec<String> {
    stack().iter().flatten().cloned().collect()
}
