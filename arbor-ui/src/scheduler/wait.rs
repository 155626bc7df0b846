use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

/// Counts outstanding background work so the engine can wait for it.
#[derive(Clone, Default)]
pub struct WaitGroup {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    count: Mutex<usize>,
    idle: Condvar,
}

impl WaitGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self) {
        *self.inner.count.lock() += 1;
    }

    pub fn done(&self) {
        let mut count = self.inner.count.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.inner.idle.notify_all();
        }
    }

    /// Increments the counter and decrements it again when the guard drops,
    /// including on panic.
    pub fn guard(&self) -> WaitGuard {
        self.add();
        WaitGuard { group: self.clone() }
    }

    pub fn pending(&self) -> usize {
        *self.inner.count.lock()
    }

    /// Blocks until the counter reaches zero.
    pub fn wait(&self) {
        let mut count = self.inner.count.lock();
        while *count > 0 {
            self.inner.idle.wait(&mut count);
        }
    }
}

pub struct WaitGuard {
    group: WaitGroup,
}

impl Drop for WaitGuard {
    fn drop(&mut self) {
        self.group.done();
    }
}
