//! neigh-table: a generic neighbour (ARP-style) address-resolution cache.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: one engine shared by every protocol family that maps protocol
//!   addresses to link-layer bindings, with packets parked on an entry while
//!   its resolution is in flight.
//! - Layers:
//!   - `Entry<O>`: key, owning interface, flags, protocol link state and the
//!     queue of packets waiting on resolution.
//!   - `NeighTable<O>`: fixed array of buckets, each a circular doubly
//!     linked list of entries. Entries live in a generational arena and link
//!     to each other by `EntryId`, never by pointer. An `EntryId` also
//!     names the table that issued it and resolves nowhere else.
//!   - Pending queue: entries allocated on the fast path, committed later by
//!     `run_deferred` under the table lock.
//!   - Walker: destructive traversal for garbage collection and flushing.
//!
//! Constraints
//! - Every bucket operation needs a [`Locked`] token from
//!   [`NeighTable::lock`]; the lock precondition is a type, not a comment.
//! - `queue_insert` only takes the short pending-queue lock, so allocation
//!   paths never wait on table maintenance.
//! - Bucket count is fixed at construction; there is no online rehash.
//! - Unlink always precedes destroy; destroy runs the family's hook, then
//!   purges queued packets undelivered.
//!
//! Invariants
//! - I1: an entry's neighbour links exist iff it is committed. Links and
//!   table membership share one `Option<Position>`, so they cannot diverge.
//! - I2: each non-empty bucket is one cycle through `next`, and `prev` is
//!   its exact reverse. A sole member links to itself both ways.
//! - Violations reachable through the API (double insert, destroy of a
//!   linked entry, unlink of an unlinked one) return errors and are logged.
//! - Stored entries are never handed out by `&mut`; `Locked::get_mut`
//!   returns an `EntryMut` view over flags, state and packets only, so an
//!   entry cannot be swapped out from under its bucket.
//!
//! Hooks and reentrancy
//! - `NeighOps::hash`, `NeighOps::destroy` and walker predicates run with
//!   the table lock held. In debug builds a hook that locks its own table
//!   panics with a diagnostic rather than deadlocking. Hooks may call
//!   `queue_insert`.
//! - The hash seed is computed once at commit and stored; relinking and
//!   integrity checks never call back into the family.
//!
//! Packet queues
//! - A committed entry's queue is reachable only through `Locked`, so
//!   appends and purges are serialised by the table lock. After destroy the
//!   handle is stale and further appends fail with `Error::StaleEntry`.
//!
//! Notes and non-goals
//! - No resolution wire format, retransmit timers or queue-depth policy:
//!   those belong to the protocol family driving the table.
//! - The engine does not schedule itself; a maintenance driver calls
//!   `run_deferred` and `walk`.

pub mod entry;
pub mod error;
pub mod flags;
pub mod ops;
mod pending;
mod reentrancy;
pub mod table;
mod table_proptest;
pub mod walk;

// Public surface
pub use entry::{Entry, EntryId, EntryMut, IfIndex};
pub use error::{Error, Result};
pub use flags::{DeferredWork, NeighFlags};
pub use ops::{BasicOps, NeighOps};
pub use table::{BucketIter, Locked, NeighTable, TableConfig, TableId, TableStats};
pub use walk::WalkStats;
