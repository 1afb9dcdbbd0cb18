//! Entry: one key-to-binding record with its queue of waiting packets.

use crate::error::Result;
use crate::flags::NeighFlags;
use crate::ops::NeighOps;
use crate::table::TableId;
use core::fmt;
use core::ops::Deref;
use slotmap::DefaultKey;
use std::collections::vec_deque::{self, VecDeque};

/// Stable handle to an entry stored in a table.
///
/// Generational: once the entry is destroyed the handle never resolves
/// again, even if its slot is reused. A handle only resolves in the table
/// that issued it.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct EntryId {
    table: TableId,
    key: DefaultKey,
}

impl EntryId {
    pub(crate) fn new(table: TableId, key: DefaultKey) -> Self {
        EntryId { table, key }
    }

    pub(crate) fn raw(&self) -> DefaultKey {
        self.key
    }

    /// Table that issued this handle.
    pub fn table(&self) -> TableId {
        self.table
    }
}

/// Interface index an entry is scoped to.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct IfIndex(pub u32);

/// Where a linked entry sits. Only present while the entry is committed, so
/// the neighbour links cannot outlive table membership.
#[derive(Copy, Clone, Debug)]
pub(crate) struct Position {
    pub(crate) table: TableId,
    pub(crate) bucket: usize,
    pub(crate) next: EntryId,
    pub(crate) prev: EntryId,
}

pub struct Entry<O: NeighOps> {
    key: Box<[u8]>,
    dev: IfIndex,
    flags: NeighFlags,
    state: O::State,
    packets: VecDeque<O::Packet>,
    // bucket seed computed once at commit; `O::hash` is not called again
    pub(crate) hash: u32,
    pub(crate) pos: Option<Position>,
}

impl<O: NeighOps> Entry<O> {
    /// Allocate an unlinked entry for `key` on `dev`.
    ///
    /// Link state starts at `Default`, flags empty, packet queue empty. Key
    /// storage is reserved fallibly so exhaustion surfaces as
    /// [`Error::Alloc`](crate::Error::Alloc).
    pub fn new(key: &[u8], dev: IfIndex) -> Result<Self> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(key.len())?;
        buf.extend_from_slice(key);
        Ok(Self {
            key: buf.into_boxed_slice(),
            dev,
            flags: NeighFlags::NONE,
            state: O::State::default(),
            packets: VecDeque::new(),
            hash: 0,
            pos: None,
        })
    }

    pub fn with_flags(mut self, flags: NeighFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn dev(&self) -> IfIndex {
        self.dev
    }

    pub fn flags(&self) -> NeighFlags {
        self.flags
    }

    pub fn set_flags(&mut self, flags: NeighFlags) {
        self.flags = flags;
    }

    pub fn state(&self) -> &O::State {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut O::State {
        &mut self.state
    }

    /// Table this entry is committed to, if any.
    pub fn table(&self) -> Option<TableId> {
        self.pos.map(|p| p.table)
    }

    pub fn is_linked(&self) -> bool {
        self.pos.is_some()
    }

    /// Number of packets waiting on resolution.
    pub fn queued(&self) -> usize {
        self.packets.len()
    }

    /// Buffer `packet` until the entry resolves. No depth limit is applied
    /// here; bounding the queue is protocol policy.
    pub fn enqueue_packet(&mut self, packet: O::Packet) {
        self.packets.push_back(packet);
    }

    /// Hand queued packets to the output layer in arrival order.
    pub fn drain_packets(&mut self) -> vec_deque::Drain<'_, O::Packet> {
        self.packets.drain(..)
    }

    /// Drop every queued packet undelivered and return how many there were.
    pub fn purge_packets(&mut self) -> usize {
        let n = self.packets.len();
        self.packets.clear();
        n
    }

    pub(crate) fn matches(&self, key: &[u8], dev: Option<IfIndex>) -> bool {
        *self.key == *key && dev.map_or(true, |d| d == self.dev)
    }
}

/// Mutable view of a stored entry.
///
/// Reaches the protocol-owned parts (flags, state, packet queue) but never
/// the entry itself, so a stored entry cannot be moved out from under its
/// bucket.
pub struct EntryMut<'a, O: NeighOps> {
    entry: &'a mut Entry<O>,
}

impl<'a, O: NeighOps> EntryMut<'a, O> {
    pub(crate) fn new(entry: &'a mut Entry<O>) -> Self {
        Self { entry }
    }

    pub fn set_flags(&mut self, flags: NeighFlags) {
        self.entry.set_flags(flags);
    }

    pub fn state_mut(&mut self) -> &mut O::State {
        self.entry.state_mut()
    }

    pub fn enqueue_packet(&mut self, packet: O::Packet) {
        self.entry.enqueue_packet(packet);
    }

    pub fn drain_packets(&mut self) -> vec_deque::Drain<'_, O::Packet> {
        self.entry.drain_packets()
    }
}

impl<O: NeighOps> Deref for EntryMut<'_, O> {
    type Target = Entry<O>;

    fn deref(&self) -> &Entry<O> {
        self.entry
    }
}

impl<O: NeighOps> fmt::Debug for EntryMut<'_, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.entry, f)
    }
}

impl<O: NeighOps> fmt::Debug for Entry<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("key", &self.key)
            .field("dev", &self.dev)
            .field("flags", &self.flags)
            .field("queued", &self.packets.len())
            .field("pos", &self.pos)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::BasicOps;

    type Ops = BasicOps<u64, &'static str>;

    #[test]
    fn new_entry_is_unlinked_and_empty() {
        let e: Entry<Ops> = Entry::new(&[192, 168, 0, 1], IfIndex(2)).unwrap();
        assert_eq!(e.key(), &[192, 168, 0, 1]);
        assert_eq!(e.dev(), IfIndex(2));
        assert!(e.flags().is_empty());
        assert_eq!(*e.state(), 0);
        assert_eq!(e.queued(), 0);
        assert!(e.table().is_none());
        assert!(!e.is_linked());
    }

    #[test]
    fn purge_reports_dropped_count() {
        let mut e: Entry<Ops> = Entry::new(&[1, 2, 3, 4], IfIndex(1)).unwrap();
        e.enqueue_packet("a");
        e.enqueue_packet("b");
        e.enqueue_packet("c");
        assert_eq!(e.purge_packets(), 3);
        assert_eq!(e.queued(), 0);
        assert_eq!(e.purge_packets(), 0);
    }

    #[test]
    fn drain_preserves_arrival_order() {
        let mut e: Entry<Ops> = Entry::new(&[1, 2, 3, 4], IfIndex(1)).unwrap();
        e.enqueue_packet("first");
        e.enqueue_packet("second");
        let out: Vec<_> = e.drain_packets().collect();
        assert_eq!(out, vec!["first", "second"]);
        assert_eq!(e.queued(), 0);
    }

    #[test]
    fn matches_requires_exact_key_and_optional_dev() {
        let e: Entry<Ops> = Entry::new(&[10, 0, 0, 1], IfIndex(3)).unwrap();
        assert!(e.matches(&[10, 0, 0, 1], None));
        assert!(e.matches(&[10, 0, 0, 1], Some(IfIndex(3))));
        assert!(!e.matches(&[10, 0, 0, 1], Some(IfIndex(4))));
        assert!(!e.matches(&[10, 0, 0], None));
        assert!(!e.matches(&[10, 0, 0, 1, 0], None));
    }
}
