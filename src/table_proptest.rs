#![cfg(test)]

// Property tests for NeighTable kept inside the crate so they can check
// link positions directly.

use crate::entry::{Entry, EntryId, IfIndex};
use crate::error::Error;
use crate::flags::NeighFlags;
use crate::ops::NeighOps;
use crate::table::{NeighTable, TableConfig};
use proptest::prelude::*;

struct TestOps {
    collide: bool,
}

impl NeighOps for TestOps {
    type State = ();
    type Packet = u16;

    fn hash(&self, key: &[u8]) -> u32 {
        if self.collide {
            return 7;
        }
        // FNV-1a
        key.iter()
            .fold(0x811c_9dc5u32, |h, &b| (h ^ b as u32).wrapping_mul(0x0100_0193))
    }
}

// Pool-indexed operations so shrinking moves toward earlier keys.
#[derive(Clone, Debug)]
enum OpI {
    Insert(usize, u32),
    Queue(usize, u32),
    RunDeferred,
    Lookup(usize, Option<u32>),
    Unlink(usize),
    Relink(usize),
    Destroy(usize),
    Enqueue(usize, u16),
    Walk(u8),
}

struct Tracked {
    key: [u8; 4],
    dev: u32,
    // None while waiting in the pending queue
    id: Option<EntryId>,
    linked: bool,
    queued: usize,
}

fn arb_scenario() -> impl Strategy<Value = (Vec<[u8; 4]>, Vec<OpI>)> {
    proptest::collection::vec(any::<[u8; 4]>(), 1..=8).prop_flat_map(|pool| {
        let idx = 0..pool.len();
        let op = prop_oneof![
            (idx.clone(), 1u32..=2).prop_map(|(i, d)| OpI::Insert(i, d)),
            (idx.clone(), 1u32..=2).prop_map(|(i, d)| OpI::Queue(i, d)),
            Just(OpI::RunDeferred),
            (idx.clone(), proptest::option::of(1u32..=2)).prop_map(|(i, d)| OpI::Lookup(i, d)),
            (0usize..16).prop_map(OpI::Unlink),
            (0usize..16).prop_map(OpI::Relink),
            (0usize..16).prop_map(OpI::Destroy),
            (0usize..16, any::<u16>()).prop_map(|(i, p)| OpI::Enqueue(i, p)),
            (0u8..3).prop_map(OpI::Walk),
        ];
        proptest::collection::vec(op, 1..60).prop_map(move |ops| (pool.clone(), ops))
    })
}

fn run_scenario(collide: bool, pool: Vec<[u8; 4]>, ops: Vec<OpI>) -> Result<(), TestCaseError> {
    let table = NeighTable::new(TestOps { collide }, TableConfig::default().buckets(8)).unwrap();
    let mut model: Vec<Tracked> = Vec::new();
    let mut stale: Vec<EntryId> = Vec::new();

    let fresh = |key: [u8; 4], dev: u32| {
        Entry::<TestOps>::new(&key, IfIndex(dev))
            .unwrap()
            .with_flags(NeighFlags::STALE)
    };

    for op in ops {
        let mut l = table.lock();
        match op {
            OpI::Insert(i, dev) => {
                let key = pool[i];
                // Protocol key spaces are unique per device.
                if model.iter().any(|t| t.key == key && t.dev == dev) {
                    continue;
                }
                let id = l.insert(fresh(key, dev)).unwrap();
                let head = l.bucket(l.bucket_of(&key)).next().map(|(h, _)| h);
                prop_assert_eq!(head, Some(id), "new entry must become the bucket head");
                model.push(Tracked { key, dev, id: Some(id), linked: true, queued: 0 });
            }
            OpI::Queue(i, dev) => {
                let key = pool[i];
                if model.iter().any(|t| t.key == key && t.dev == dev) {
                    continue;
                }
                table.queue_insert(fresh(key, dev)).unwrap();
                prop_assert!(table.has_deferred_work());
                prop_assert_eq!(
                    l.lookup(&key, Some(IfIndex(dev))),
                    None,
                    "pending entries are invisible"
                );
                model.push(Tracked { key, dev, id: None, linked: false, queued: 0 });
            }
            OpI::RunDeferred => {
                let ids = l.run_deferred();
                let mut waiting = model.iter_mut().filter(|t| t.id.is_none());
                for id in &ids {
                    let t = waiting.next().expect("committed more entries than were queued");
                    t.id = Some(*id);
                    t.linked = true;
                }
                prop_assert!(waiting.next().is_none(), "pending entry left behind");
                prop_assert!(!table.has_deferred_work());
            }
            OpI::Lookup(i, dev) => {
                let key = pool[i];
                let got = l.lookup(&key, dev.map(IfIndex));
                let candidates: Vec<EntryId> = model
                    .iter()
                    .filter(|t| t.linked && t.key == key && dev.map_or(true, |d| d == t.dev))
                    .filter_map(|t| t.id)
                    .collect();
                match got {
                    Some(id) => prop_assert!(candidates.contains(&id)),
                    None => prop_assert!(candidates.is_empty()),
                }
            }
            OpI::Unlink(i) => {
                let Some(t) = pick(&mut model, i) else { continue };
                let id = t.id.unwrap();
                match l.unlink(id) {
                    Ok(()) => {
                        prop_assert!(t.linked);
                        t.linked = false;
                    }
                    Err(Error::NotLinked) => prop_assert!(!t.linked),
                    Err(e) => prop_assert!(false, "unexpected error {}", e),
                }
            }
            OpI::Relink(i) => {
                let Some(t) = pick(&mut model, i) else { continue };
                let id = t.id.unwrap();
                match l.relink(id) {
                    Ok(()) => {
                        prop_assert!(!t.linked);
                        t.linked = true;
                    }
                    Err(Error::AlreadyLinked) => prop_assert!(t.linked),
                    Err(e) => prop_assert!(false, "unexpected error {}", e),
                }
            }
            OpI::Destroy(i) => {
                let Some(t) = pick(&mut model, i) else { continue };
                let id = t.id.unwrap();
                match l.destroy(id) {
                    Ok(purged) => {
                        prop_assert!(!t.linked);
                        prop_assert_eq!(purged, t.queued);
                        model.retain(|m| m.id != Some(id));
                        stale.push(id);
                    }
                    Err(Error::StillLinked) => prop_assert!(t.linked),
                    Err(e) => prop_assert!(false, "unexpected error {}", e),
                }
            }
            OpI::Enqueue(i, p) => {
                let Some(t) = pick(&mut model, i) else { continue };
                l.enqueue_packet(t.id.unwrap(), p).unwrap();
                t.queued += 1;
            }
            OpI::Walk(m) => {
                let doomed: Vec<EntryId> = model
                    .iter()
                    .filter(|t| t.linked && t.key[0] % 3 == m)
                    .filter_map(|t| t.id)
                    .collect();
                let purged: usize = model
                    .iter()
                    .filter(|t| t.id.is_some_and(|id| doomed.contains(&id)))
                    .map(|t| t.queued)
                    .sum();
                let linked = model.iter().filter(|t| t.linked).count();

                let stats = l.walk(|e| e.key()[0] % 3 == m, NeighFlags::NONE, None);
                prop_assert_eq!(stats.examined, linked);
                prop_assert_eq!(stats.evicted, doomed.len());
                prop_assert_eq!(stats.purged, purged);
                model.retain(|t| !t.id.is_some_and(|id| doomed.contains(&id)));
                stale.extend(doomed);
            }
        }

        // Post-conditions after each op
        l.verify().map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(l.len(), model.iter().filter(|t| t.linked).count());
        for &id in &stale {
            prop_assert!(l.get(id).is_none());
            prop_assert!(l.iter().all(|(seen, _)| seen != id));
        }
        for t in &model {
            if let Some(id) = t.id {
                let e = l.get(id).expect("tracked entry must resolve");
                prop_assert_eq!(e.is_linked(), t.linked);
                prop_assert_eq!(e.queued(), t.queued);
                if t.linked {
                    prop_assert_eq!(l.lookup(&t.key, Some(IfIndex(t.dev))), Some(id));
                }
            }
        }
    }
    Ok(())
}

// Tracked entries that are stored in the table (not pending).
fn pick(model: &mut [Tracked], i: usize) -> Option<&mut Tracked> {
    let stored = model.iter().filter(|t| t.id.is_some()).count();
    if stored == 0 {
        return None;
    }
    model.iter_mut().filter(|t| t.id.is_some()).nth(i % stored)
}

// Property: state-machine equivalence against a model.
// - Cycles stay intact and counts agree after every operation (verify()).
// - Insert puts the entry at the bucket head; pending entries stay invisible
//   until run_deferred, which commits them in FIFO order.
// - Every linked entry is found by (key, dev); lookups never return
//   unlinked or destroyed entries.
// - unlink/relink/destroy accept and reject exactly per link state.
// - walk evicts exactly the matching entries and reports their packets.
// - Destroyed handles never resolve nor reappear in iteration.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine((pool, ops) in arb_scenario()) {
        run_scenario(false, pool, ops)?;
    }
}

// Same invariants with every key forced into one bucket, stressing long
// cycles and head eviction.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine_with_collisions((pool, ops) in arb_scenario()) {
        run_scenario(true, pool, ops)?;
    }
}
