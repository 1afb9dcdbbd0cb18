//! NeighTable: fixed bucket array of circular doubly linked entry lists,
//! an arena holding the entries, and a separately locked pending queue.

use crate::entry::{Entry, EntryId, EntryMut, IfIndex, Position};
use crate::error::{Error, Result};
use crate::flags::DeferredWork;
use crate::ops::NeighOps;
use crate::pending::PendingQueue;
use crate::reentrancy;
use parking_lot::{Mutex, MutexGuard};
use slotmap::{DefaultKey, SlotMap};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, trace};

/// Process-unique identity of a table.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct TableId(u64);

impl TableId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        TableId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Construction parameters. The bucket count is fixed for the table's
/// lifetime; there is no online rehash.
#[derive(Clone, Debug)]
pub struct TableConfig {
    pub name: String,
    pub buckets: usize,
    pub key_len: usize,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            name: "neigh".to_string(),
            buckets: 32,
            key_len: 4,
        }
    }
}

impl TableConfig {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn buckets(mut self, buckets: usize) -> Self {
        self.buckets = buckets;
        self
    }

    pub fn key_len(mut self, key_len: usize) -> Self {
        self.key_len = key_len;
        self
    }
}

/// Counters maintained under the table lock.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TableStats {
    pub inserts: u64,
    pub deferred_commits: u64,
    pub lookups: u64,
    pub hits: u64,
    pub unlinks: u64,
    pub destroys: u64,
    pub purged_packets: u64,
    pub walks: u64,
}

/// State guarded by the table lock.
pub(crate) struct TableCore<O: NeighOps> {
    pub(crate) id: TableId,
    pub(crate) buckets: Box<[Option<EntryId>]>,
    pub(crate) slots: SlotMap<DefaultKey, Entry<O>>,
    pub(crate) entry_count: usize,
    pub(crate) stats: TableStats,
}

impl<O: NeighOps> TableCore<O> {
    /// Resolve a caller-supplied handle. Handles issued by another table
    /// never resolve here.
    pub(crate) fn entry(&self, id: EntryId) -> Option<&Entry<O>> {
        if id.table() != self.id {
            return None;
        }
        self.slots.get(id.raw())
    }

    pub(crate) fn entry_mut(&mut self, id: EntryId) -> Option<&mut Entry<O>> {
        if id.table() != self.id {
            return None;
        }
        self.slots.get_mut(id.raw())
    }

    fn pos(&self, id: EntryId) -> Position {
        self.slots
            .get(id.raw())
            .and_then(|e| e.pos)
            .expect("cycle member must be a linked entry")
    }

    fn pos_mut(&mut self, id: EntryId) -> &mut Position {
        self.slots
            .get_mut(id.raw())
            .and_then(|e| e.pos.as_mut())
            .expect("cycle member must be a linked entry")
    }

    /// Splice `id` in front of the bucket head and make it the new head.
    pub(crate) fn link(&mut self, bucket: usize, id: EntryId) {
        let head = self.buckets[bucket];
        let (next, prev) = match head {
            None => (id, id),
            Some(head) => {
                let tail = self.pos(head).prev;
                self.pos_mut(tail).next = id;
                self.pos_mut(head).prev = id;
                (head, tail)
            }
        };
        let entry = self
            .slots
            .get_mut(id.raw())
            .expect("entry must exist in the arena when linked");
        debug_assert!(entry.pos.is_none());
        entry.pos = Some(Position {
            table: self.id,
            bucket,
            next,
            prev,
        });
        self.buckets[bucket] = Some(id);
        self.entry_count += 1;
    }

    /// Splice `id` out of its cycle. The entry stays in the arena, unlinked.
    pub(crate) fn unlink(&mut self, id: EntryId) -> Result<Position> {
        let pos = self
            .entry(id)
            .ok_or(Error::StaleEntry)?
            .pos
            .ok_or(Error::NotLinked)?;

        if pos.next == id {
            // Sole member.
            self.buckets[pos.bucket] = None;
        } else {
            self.pos_mut(pos.prev).next = pos.next;
            self.pos_mut(pos.next).prev = pos.prev;
            if self.buckets[pos.bucket] == Some(id) {
                self.buckets[pos.bucket] = Some(pos.next);
            }
        }

        if let Some(e) = self.slots.get_mut(id.raw()) {
            e.pos = None;
        }
        self.entry_count -= 1;
        self.stats.unlinks += 1;
        Ok(pos)
    }

    pub(crate) fn bucket(&self, index: usize) -> BucketIter<'_, O> {
        let head = self.buckets.get(index).copied().flatten();
        BucketIter {
            slots: &self.slots,
            head,
            cur: head,
        }
    }
}

/// A neighbour table for one protocol family.
///
/// Fast-path code may call [`queue_insert`](Self::queue_insert) without the
/// table lock; everything touching bucket state goes through [`Locked`].
pub struct NeighTable<O: NeighOps> {
    id: TableId,
    name: String,
    key_len: usize,
    ops: O,
    core: Mutex<TableCore<O>>,
    pub(crate) pending: PendingQueue<O>,
}

impl<O: NeighOps> NeighTable<O> {
    pub fn new(ops: O, config: TableConfig) -> Result<Self> {
        if config.buckets == 0 {
            return Err(Error::NoBuckets);
        }
        let id = TableId::next();
        let mut buckets: Vec<Option<EntryId>> = Vec::new();
        buckets.try_reserve_exact(config.buckets)?;
        buckets.resize(config.buckets, None);

        debug!(
            table = %config.name,
            buckets = config.buckets,
            key_len = config.key_len,
            "neighbour table created"
        );

        Ok(Self {
            id,
            name: config.name,
            key_len: config.key_len,
            ops,
            core: Mutex::new(TableCore {
                id,
                buckets: buckets.into_boxed_slice(),
                slots: SlotMap::with_key(),
                entry_count: 0,
                stats: TableStats::default(),
            }),
            pending: PendingQueue::new(),
        })
    }

    pub fn id(&self) -> TableId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key_len(&self) -> usize {
        self.key_len
    }

    pub fn ops(&self) -> &O {
        &self.ops
    }

    /// Take the table lock. All bucket operations hang off the returned
    /// token.
    pub fn lock(&self) -> Locked<'_, O> {
        reentrancy::assert_outside_hooks(self.id);
        Locked {
            table: self,
            core: self.core.lock(),
        }
    }

    /// Take the table lock only if it is free.
    pub fn try_lock(&self) -> Option<Locked<'_, O>> {
        reentrancy::assert_outside_hooks(self.id);
        self.core.try_lock().map(|core| Locked { table: self, core })
    }

    /// Defer `entry` for a later [`Locked::run_deferred`].
    ///
    /// Takes only the pending-queue lock, never the table lock, so it is safe
    /// from contexts that must not block on table maintenance (including
    /// hooks). No duplicate detection happens here. On error the entry has
    /// already been torn down.
    pub fn queue_insert(&self, entry: Entry<O>) -> Result<()> {
        if entry.is_linked() {
            error!(table = %self.name, "queue of an already linked entry");
            return Err(Error::AlreadyLinked);
        }
        let found = entry.key().len();
        if found != self.key_len {
            self.discard(entry);
            return Err(Error::KeyLength {
                expected: self.key_len,
                found,
            });
        }
        match self.pending.push(entry) {
            Ok(()) => {
                trace!(table = %self.name, "entry queued for deferred insert");
                Ok(())
            }
            Err((e, entry)) => {
                self.discard(entry);
                Err(e)
            }
        }
    }

    /// Entries waiting in the pending queue.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn deferred_work(&self) -> DeferredWork {
        self.pending.work()
    }

    pub fn has_deferred_work(&self) -> bool {
        !self.pending.work().is_empty()
    }

    /// Tear down an entry that was never committed: destructor hook, then
    /// packet purge. Returns the number of packets dropped.
    pub fn discard(&self, entry: Entry<O>) -> usize {
        let purged = self.teardown(entry);
        trace!(table = %self.name, purged, "uncommitted entry discarded");
        purged
    }

    fn teardown(&self, mut entry: Entry<O>) -> usize {
        debug_assert!(entry.pos.is_none(), "teardown of a linked entry");
        self.ops.destroy(&mut entry);
        entry.purge_packets()
    }

    fn bucket_for(&self, key: &[u8], buckets: usize) -> (u32, usize) {
        let _g = reentrancy::enter(self.id);
        let hash = self.ops.hash(key);
        (hash, hash as usize % buckets)
    }
}

impl<O: NeighOps> Drop for NeighTable<O> {
    fn drop(&mut self) {
        let core = self.core.get_mut();
        core.buckets.fill(None);
        core.entry_count = 0;
        let slots = std::mem::take(&mut core.slots);
        let pending = self.pending.take_all();

        let mut entries = 0usize;
        let mut purged = 0usize;
        for (_, mut entry) in slots {
            entry.pos = None;
            purged += self.teardown(entry);
            entries += 1;
        }
        for entry in pending {
            purged += self.teardown(entry);
            entries += 1;
        }
        if entries > 0 {
            debug!(table = %self.name, entries, purged, "neighbour table released");
        }
    }
}

/// Proof that the table lock is held; the only way to reach bucket state.
pub struct Locked<'a, O: NeighOps> {
    table: &'a NeighTable<O>,
    pub(crate) core: MutexGuard<'a, TableCore<O>>,
}

impl<'a, O: NeighOps> Locked<'a, O> {
    pub fn table(&self) -> &'a NeighTable<O> {
        self.table
    }

    /// Committed entries.
    pub fn len(&self) -> usize {
        self.core.entry_count
    }

    pub fn is_empty(&self) -> bool {
        self.core.entry_count == 0
    }

    pub fn bucket_count(&self) -> usize {
        self.core.buckets.len()
    }

    pub fn stats(&self) -> TableStats {
        self.core.stats
    }

    /// Bucket `key` hashes to.
    pub fn bucket_of(&self, key: &[u8]) -> usize {
        self.table.bucket_for(key, self.core.buckets.len()).1
    }

    /// Commit `entry` at the head of its bucket.
    ///
    /// A key of the wrong length is rejected and the entry torn down. An
    /// entry that still claims a bucket is rejected with
    /// [`Error::AlreadyLinked`] and dropped without running the hook.
    pub fn insert(&mut self, entry: Entry<O>) -> Result<EntryId> {
        if entry.is_linked() {
            error!(table = %self.table.name, "insert of an already linked entry");
            return Err(Error::AlreadyLinked);
        }
        let found = entry.key().len();
        if found != self.table.key_len {
            let _g = reentrancy::enter(self.table.id);
            self.table.discard(entry);
            return Err(Error::KeyLength {
                expected: self.table.key_len,
                found,
            });
        }
        Ok(self.commit(entry))
    }

    pub(crate) fn commit(&mut self, mut entry: Entry<O>) -> EntryId {
        let (hash, bucket) = self.table.bucket_for(entry.key(), self.core.buckets.len());
        entry.hash = hash;
        let id = EntryId::new(self.table.id, self.core.slots.insert(entry));
        self.core.link(bucket, id);
        self.core.stats.inserts += 1;
        trace!(table = %self.table.name, bucket, "entry committed");
        id
    }

    /// Re-commit an entry that was unlinked but not destroyed. Uses the hash
    /// computed at first commit.
    pub fn relink(&mut self, id: EntryId) -> Result<()> {
        let entry = self.core.entry(id).ok_or(Error::StaleEntry)?;
        if entry.is_linked() {
            error!(table = %self.table.name, ?id, "relink of an already linked entry");
            return Err(Error::AlreadyLinked);
        }
        let bucket = entry.hash as usize % self.core.buckets.len();
        self.core.link(bucket, id);
        self.core.stats.inserts += 1;
        trace!(table = %self.table.name, bucket, "entry relinked");
        Ok(())
    }

    /// First committed entry with exactly `key` on `dev` (any device when
    /// `dev` is `None`). Scans the bucket at most once around.
    pub fn lookup(&mut self, key: &[u8], dev: Option<IfIndex>) -> Option<EntryId> {
        self.core.stats.lookups += 1;
        if key.len() != self.table.key_len {
            return None;
        }
        let bucket = self.bucket_of(key);
        let found = self
            .core
            .bucket(bucket)
            .find(|(_, e)| e.matches(key, dev))
            .map(|(id, _)| id);
        if found.is_some() {
            self.core.stats.hits += 1;
        }
        found
    }

    pub fn get(&self, id: EntryId) -> Option<&Entry<O>> {
        self.core.entry(id)
    }

    /// Protocol-side access to a stored entry's flags, state and packets.
    pub fn get_mut(&mut self, id: EntryId) -> Option<EntryMut<'_, O>> {
        self.core.entry_mut(id).map(EntryMut::new)
    }

    /// Append a packet to a stored entry. Serialised against purge by the
    /// table lock; a destroyed entry's handle is stale.
    pub fn enqueue_packet(&mut self, id: EntryId, packet: O::Packet) -> Result<()> {
        let entry = self.core.entry_mut(id).ok_or(Error::StaleEntry)?;
        entry.enqueue_packet(packet);
        Ok(())
    }

    /// Remove `id` from its bucket. The entry stays addressable until
    /// [`destroy`](Self::destroy).
    pub fn unlink(&mut self, id: EntryId) -> Result<()> {
        match self.core.unlink(id) {
            Ok(pos) => {
                trace!(table = %self.table.name, bucket = pos.bucket, "entry unlinked");
                Ok(())
            }
            Err(e) => {
                error!(table = %self.table.name, ?id, error = %e, "unlink rejected");
                Err(e)
            }
        }
    }

    /// Tear down an unlinked entry: destructor hook, then purge of its
    /// queued packets. Returns how many packets were dropped.
    ///
    /// Destroying a linked entry is rejected with [`Error::StillLinked`].
    pub fn destroy(&mut self, id: EntryId) -> Result<usize> {
        let entry = self.core.entry(id).ok_or(Error::StaleEntry)?;
        if entry.is_linked() {
            error!(table = %self.table.name, ?id, "destroy of a still linked entry");
            return Err(Error::StillLinked);
        }
        let entry = self.core.slots.remove(id.raw()).ok_or(Error::StaleEntry)?;
        let purged = {
            let _g = reentrancy::enter(self.table.id);
            self.table.teardown(entry)
        };
        self.core.stats.destroys += 1;
        self.core.stats.purged_packets += purged as u64;
        trace!(table = %self.table.name, purged, "entry destroyed");
        Ok(purged)
    }

    /// Unlink then destroy.
    pub fn remove(&mut self, id: EntryId) -> Result<usize> {
        self.unlink(id)?;
        self.destroy(id)
    }

    /// Commit everything in the pending queue, in arrival order.
    ///
    /// The queue is detached in one critical section of its own lock, so a
    /// concurrent `queue_insert` lands either in this batch or in the next.
    pub fn run_deferred(&mut self) -> Vec<EntryId> {
        let batch = self.table.pending.take_all();
        let mut committed = Vec::with_capacity(batch.len());
        for entry in batch {
            committed.push(self.commit(entry));
        }
        if !committed.is_empty() {
            self.core.stats.deferred_commits += committed.len() as u64;
            debug!(
                table = %self.table.name,
                committed = committed.len(),
                "pending queue drained"
            );
        }
        committed
    }

    /// Entries of one bucket, head first, following `next`.
    pub fn bucket(&self, index: usize) -> BucketIter<'_, O> {
        self.core.bucket(index)
    }

    /// Every committed entry, bucket by bucket.
    pub fn iter(&self) -> impl Iterator<Item = (EntryId, &Entry<O>)> + '_ {
        (0..self.core.buckets.len()).flat_map(move |b| self.core.bucket(b))
    }

    /// Check link validity and cycle structure of every bucket, and that
    /// the committed count matches what is reachable.
    pub fn verify(&self) -> Result<()> {
        let core = &*self.core;
        let limit = core.slots.len();
        let mut reachable = 0usize;

        for (bucket, head) in core.buckets.iter().enumerate() {
            let Some(head) = *head else { continue };
            let corrupted = |reason| Error::Corrupted { bucket, reason };
            let mut cur = head;
            let mut members = 0usize;
            loop {
                let entry = core
                    .slots
                    .get(cur.raw())
                    .ok_or_else(|| corrupted("dangling link"))?;
                let pos = entry.pos.ok_or_else(|| corrupted("unlinked entry in bucket"))?;
                if pos.table != self.table.id {
                    return Err(corrupted("entry belongs to another table"));
                }
                if pos.bucket != bucket || entry.hash as usize % core.buckets.len() != bucket {
                    return Err(corrupted("entry in the wrong bucket"));
                }
                let next_prev = core
                    .slots
                    .get(pos.next.raw())
                    .and_then(|n| n.pos)
                    .ok_or_else(|| corrupted("dangling next link"))?
                    .prev;
                if next_prev != cur {
                    return Err(corrupted("prev chain is not the reverse of next"));
                }
                members += 1;
                if members > limit {
                    return Err(corrupted("next chain does not return to head"));
                }
                cur = pos.next;
                if cur == head {
                    break;
                }
            }
            reachable += members;
        }

        let flagged = core.slots.values().filter(|e| e.is_linked()).count();
        if flagged != reachable || core.entry_count != reachable {
            return Err(Error::CountMismatch {
                recorded: core.entry_count,
                counted: reachable,
            });
        }
        Ok(())
    }
}

/// Walks one bucket's cycle exactly once around, starting at the head.
pub struct BucketIter<'a, O: NeighOps> {
    slots: &'a SlotMap<DefaultKey, Entry<O>>,
    head: Option<EntryId>,
    cur: Option<EntryId>,
}

impl<'a, O: NeighOps> Iterator for BucketIter<'a, O> {
    type Item = (EntryId, &'a Entry<O>);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.cur?;
        let entry = self.slots.get(id.raw())?;
        // No null terminator: stop when the successor is the start node.
        self.cur = entry.pos.map(|p| p.next).filter(|&n| Some(n) != self.head);
        Some((id, entry))
    }
}
