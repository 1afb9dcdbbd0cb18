// Walker property tests.
//
// Property 1: eviction safety within one crowded bucket.
//  - Setup: n entries forced into the same bucket, random packet counts,
//    random flags, random eviction set.
//  - Invariant: survivors keep their relative cyclic order and form a
//    valid cycle; every evicted entry had its hook run exactly once and
//    its packets purged; nothing is skipped next to an evicted neighbour.
//
// Property 2: max_buckets bounds the pass.
//  - Setup: entries spread over all buckets, walk limited to a prefix.
//  - Invariant: only entries in buckets below the limit are examined.
use neigh_table::{Entry, IfIndex, NeighFlags, NeighOps, NeighTable, TableConfig};
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::Mutex;

#[derive(Default)]
struct Recording {
    collide: bool,
    destroyed: Mutex<Vec<u16>>,
}

impl NeighOps for Recording {
    type State = ();
    type Packet = u8;

    fn hash(&self, key: &[u8]) -> u32 {
        if self.collide {
            0
        } else {
            u16::from_be_bytes([key[0], key[1]]) as u32
        }
    }

    fn destroy(&self, entry: &mut Entry<Self>) {
        let k = entry.key();
        self.destroyed
            .lock()
            .unwrap()
            .push(u16::from_be_bytes([k[0], k[1]]));
    }
}

fn tag_of(e: &Entry<Recording>) -> u16 {
    u16::from_be_bytes([e.key()[0], e.key()[1]])
}

const FLAG_CHOICES: [NeighFlags; 4] = [
    NeighFlags::STALE,
    NeighFlags::FAILED,
    NeighFlags::PERMANENT,
    NeighFlags::NONE,
];

proptest! {
    #[test]
    fn prop_walk_eviction_in_one_bucket(
        plan in proptest::collection::vec((any::<bool>(), 0usize..4, 0u8..4), 1..24)
    ) {
        let ops = Recording { collide: true, ..Recording::default() };
        let t = NeighTable::new(ops, TableConfig::default().key_len(2).buckets(4)).unwrap();
        let mut l = t.lock();

        let mut purged_expected = 0usize;
        let mut doomed = BTreeSet::new();
        let mut examined_expected = 0usize;
        for (i, (evict, flag, packets)) in plan.iter().enumerate() {
            let tag = i as u16;
            let flags = FLAG_CHOICES[*flag];
            let e = Entry::new(&tag.to_be_bytes(), IfIndex(1)).unwrap().with_flags(flags);
            let id = l.insert(e).unwrap();
            for p in 0..*packets {
                l.enqueue_packet(id, p).unwrap();
            }
            // PERMANENT is masked and NONE has no bits: neither is examined.
            let visible = flags.escapes(NeighFlags::PERMANENT);
            if visible {
                examined_expected += 1;
            }
            if visible && *evict {
                doomed.insert(tag);
                purged_expected += *packets as usize;
            }
        }
        let before: Vec<u16> = l.bucket(0).map(|(_, e)| tag_of(e)).collect();

        let mut seen = Vec::new();
        let stats = l.walk(
            |e| {
                let tag = tag_of(e);
                seen.push(tag);
                doomed.contains(&tag)
            },
            NeighFlags::PERMANENT,
            None,
        );

        // Each examinable entry seen exactly once, in cycle order.
        let expected_seen: Vec<u16> = before
            .iter()
            .copied()
            .filter(|tag| FLAG_CHOICES[plan[*tag as usize].1].escapes(NeighFlags::PERMANENT))
            .collect();
        prop_assert_eq!(&seen, &expected_seen);
        prop_assert_eq!(stats.examined, examined_expected);
        prop_assert_eq!(stats.evicted, doomed.len());
        prop_assert_eq!(stats.purged, purged_expected);

        let after: Vec<u16> = l.bucket(0).map(|(_, e)| tag_of(e)).collect();
        let survivors: Vec<u16> = before.iter().copied().filter(|t| !doomed.contains(t)).collect();
        prop_assert_eq!(after, survivors);
        prop_assert_eq!(l.len(), plan.len() - doomed.len());
        l.verify().unwrap();

        let mut destroyed = t.ops().destroyed.lock().unwrap().clone();
        destroyed.sort_unstable();
        prop_assert_eq!(destroyed, doomed.iter().copied().collect::<Vec<_>>());
    }

    #[test]
    fn prop_walk_respects_max_buckets(count in 1u16..64, limit in 0usize..20) {
        let ops = Recording::default();
        let t = NeighTable::new(ops, TableConfig::default().key_len(2).buckets(16)).unwrap();
        let mut l = t.lock();
        for tag in 0..count {
            let e = Entry::new(&tag.to_be_bytes(), IfIndex(1)).unwrap();
            l.insert(e.with_flags(NeighFlags::STALE)).unwrap();
        }

        let stats = l.walk(|_| true, NeighFlags::NONE, Some(limit));
        let covered = limit.min(16);
        let expected = (0..count).filter(|tag| (*tag as usize % 16) < covered).count();
        prop_assert_eq!(stats.buckets, covered);
        prop_assert_eq!(stats.evicted, expected);
        prop_assert_eq!(l.len(), count as usize - expected);
        for b in 0..covered {
            prop_assert_eq!(l.bucket(b).count(), 0);
        }
        l.verify().unwrap();
    }
}
