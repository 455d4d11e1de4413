//! Handle lifetime helpers.
//!
//! Public objects are shared through `Arc`: cloning retains, dropping
//! releases, and the thread dropping the last clone runs destruction.
//! [`AsyncOps`] adds the one extra rule media items need: an explicit release
//! waits until every asynchronous operation started on the item has
//! delivered its completion.

use common::{MediaError, MediaResult};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

/// Counter of outstanding asynchronous operations.
#[derive(Debug, Default)]
pub struct AsyncOps {
    count: Mutex<u32>,
    idle: Condvar,
}

impl AsyncOps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new operation.
    ///
    /// The returned guard ends the operation when dropped. Fails once the
    /// counter would overflow.
    pub fn begin(self: &Arc<Self>) -> MediaResult<OpGuard> {
        let mut count = self.count.lock();
        if *count == u32::MAX {
            return Err(MediaError::busy("too many outstanding operations"));
        }
        *count += 1;
        Ok(OpGuard { ops: self.clone() })
    }

    /// Current number of outstanding operations.
    pub fn outstanding(&self) -> u32 {
        *self.count.lock()
    }

    /// Block until no operation is outstanding.
    pub fn wait_idle(&self) {
        let mut count = self.count.lock();
        while *count != 0 {
            self.idle.wait(&mut count);
        }
    }

    fn end(&self) {
        let mut count = self.count.lock();
        debug_assert!(*count > 0);
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }
}

/// One outstanding operation on an [`AsyncOps`] counter.
#[derive(Debug)]
#[must_use = "dropping the guard ends the operation"]
pub struct OpGuard {
    ops: Arc<AsyncOps>,
}

impl Drop for OpGuard {
    fn drop(&mut self) {
        self.ops.end();
    }
}
