//! Pending queue: entries allocated on the fast path, not yet committed.

use crate::entry::Entry;
use crate::error::Result;
use crate::flags::DeferredWork;
use crate::ops::NeighOps;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};

/// FIFO behind its own short lock, independent of the table lock.
pub(crate) struct PendingQueue<O: NeighOps> {
    queue: Mutex<VecDeque<Entry<O>>>,
    work: AtomicU32,
}

impl<O: NeighOps> PendingQueue<O> {
    pub(crate) fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            work: AtomicU32::new(DeferredWork::NONE.bits()),
        }
    }

    /// Append at the tail. On allocation failure the entry is handed back
    /// so the caller can tear it down.
    pub(crate) fn push(&self, entry: Entry<O>) -> Result<(), (crate::Error, Entry<O>)> {
        let mut q = self.queue.lock();
        if let Err(e) = q.try_reserve(1) {
            return Err((e.into(), entry));
        }
        q.push_back(entry);
        self.work
            .fetch_or(DeferredWork::PENDING_INSERT.bits(), Ordering::Release);
        Ok(())
    }

    /// Detach the whole queue in one critical section and clear the
    /// pending flag before releasing the lock, so a concurrent `push` either
    /// lands in the detached batch or re-raises the flag afterwards.
    pub(crate) fn take_all(&self) -> VecDeque<Entry<O>> {
        let mut q = self.queue.lock();
        let batch = std::mem::take(&mut *q);
        self.work
            .fetch_and(!DeferredWork::PENDING_INSERT.bits(), Ordering::Release);
        batch
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub(crate) fn work(&self) -> DeferredWork {
        DeferredWork::from_bits(self.work.load(Ordering::Acquire))
    }
}
