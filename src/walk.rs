//! Walker: full-table traversal that may evict the entry it is standing on.
//!
//! Each bucket is walked once around from its head. The successor is read
//! before the current entry is unlinked and destroyed, and the bucket's
//! emptiness is rechecked after every eviction: a sole member leaves an
//! empty bucket whose stale `next` still points at itself.

use crate::entry::{Entry, EntryId, IfIndex};
use crate::flags::NeighFlags;
use crate::ops::NeighOps;
use crate::reentrancy;
use crate::table::Locked;
use tracing::debug;

/// Outcome of one pass.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct WalkStats {
    /// Buckets covered by the pass.
    pub buckets: usize,
    /// Entries handed to the predicate.
    pub examined: usize,
    pub evicted: usize,
    /// Packets dropped from evicted entries.
    pub purged: usize,
}

impl<'a, O: NeighOps> Locked<'a, O> {
    /// Evict every entry `examine` returns true for.
    ///
    /// Only entries with a flag bit outside `filter` are examined, so
    /// including e.g. [`NeighFlags::PERMANENT`] in `filter` protects
    /// permanent entries (and an entry with no flags is never examined).
    /// Covers buckets `0..max_buckets`, or all buckets for `None`.
    pub fn walk<F>(
        &mut self,
        mut examine: F,
        filter: NeighFlags,
        max_buckets: Option<usize>,
    ) -> WalkStats
    where
        F: FnMut(&Entry<O>) -> bool,
    {
        self.sweep(max_buckets, |e| e.flags().escapes(filter) && examine(e))
    }

    /// Evict every entry bound to `dev`, whatever its flags.
    pub fn flush_device(&mut self, dev: IfIndex) -> WalkStats {
        let stats = self.sweep(None, |e| e.dev() == dev);
        debug!(table = %self.table().name(), ?dev, evicted = stats.evicted, "device flushed");
        stats
    }

    /// Evict every committed entry and tear down everything still waiting in
    /// the pending queue.
    pub fn flush(&mut self) -> WalkStats {
        let mut stats = self.sweep(None, |_| true);
        for entry in self.table().pending.take_all() {
            let _g = reentrancy::enter(self.table().id());
            stats.purged += self.table().discard(entry);
            stats.evicted += 1;
        }
        debug!(
            table = %self.table().name(),
            evicted = stats.evicted,
            purged = stats.purged,
            "table flushed"
        );
        stats
    }

    fn sweep<F>(&mut self, max_buckets: Option<usize>, mut evict: F) -> WalkStats
    where
        F: FnMut(&Entry<O>) -> bool,
    {
        let buckets = max_buckets.map_or(self.bucket_count(), |m| m.min(self.bucket_count()));
        let mut stats = WalkStats {
            buckets,
            ..WalkStats::default()
        };

        for bucket in 0..buckets {
            // Fix the member count up front; evictions only shrink the cycle,
            // and each original member is visited exactly once.
            let Some(head) = self.core.buckets[bucket] else { continue };
            let members = self.bucket(bucket).count();

            let mut cur: EntryId = head;
            for _ in 0..members {
                let Some(entry) = self.get(cur) else { break };
                let next = entry.pos.map(|p| p.next);

                let take = {
                    let _g = reentrancy::enter(self.table().id());
                    stats.examined += 1;
                    evict(entry)
                };

                if take {
                    self.core.unlink(cur).expect("walked entry must be linked");
                    stats.purged += self.destroy(cur).expect("unlinked entry must be destroyable");
                    stats.evicted += 1;
                    if self.core.buckets[bucket].is_none() {
                        break;
                    }
                }

                match next {
                    Some(n) => cur = n,
                    None => break,
                }
            }
        }

        self.core.stats.walks += 1;
        if stats.evicted > 0 {
            debug!(
                table = %self.table().name(),
                buckets = stats.buckets,
                examined = stats.examined,
                evicted = stats.evicted,
                purged = stats.purged,
                "walk evicted entries"
            );
        }
        stats
    }
}
