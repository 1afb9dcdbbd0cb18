//! Per-family hooks: how keys hash and how entries are torn down.

use crate::entry::Entry;
use core::hash::BuildHasher;
use core::marker::PhantomData;
use hashbrown::hash_map::DefaultHashBuilder;

/// Operations a protocol family supplies to a table.
///
/// One value is stored per table and shared by all of its entries. Hooks run
/// with the table lock held and must not lock the same table again.
pub trait NeighOps: Sized + Send + Sync + 'static {
    /// Link-layer state carried by each entry. `Default` stands for a zeroed
    /// payload.
    type State: Default + Send;

    /// Outbound packet buffered while the entry resolves.
    type Packet: Send;

    /// Bucket seed for `key`. Must be deterministic; the table reduces it
    /// modulo its bucket count.
    fn hash(&self, key: &[u8]) -> u32;

    /// Called exactly once per entry, after unlink and before its queued
    /// packets are purged.
    fn destroy(&self, _entry: &mut Entry<Self>) {}
}

/// A family that hashes keys with a [`BuildHasher`] and has no destructor.
///
/// Suits protocols whose link state needs no cleanup beyond `Drop`.
pub struct BasicOps<St, P, S = DefaultHashBuilder> {
    hasher: S,
    _pd: PhantomData<fn() -> (St, P)>,
}

impl<St, P> BasicOps<St, P> {
    pub fn new() -> Self {
        Self::with_hasher(DefaultHashBuilder::default())
    }
}

impl<St, P> Default for BasicOps<St, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<St, P, S> BasicOps<St, P, S> {
    pub fn with_hasher(hasher: S) -> Self {
        Self {
            hasher,
            _pd: PhantomData,
        }
    }
}

impl<St, P, S> NeighOps for BasicOps<St, P, S>
where
    St: Default + Send + 'static,
    P: Send + 'static,
    S: BuildHasher + Send + Sync + 'static,
{
    type State = St;
    type Packet = P;

    fn hash(&self, key: &[u8]) -> u32 {
        let h = self.hasher.hash_one(key);
        (h ^ (h >> 32)) as u32
    }
}
