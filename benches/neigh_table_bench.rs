use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use neigh_table::{BasicOps, Entry, EntryId, IfIndex, NeighFlags, NeighTable, TableConfig};
use std::time::Duration;

type Ops = BasicOps<[u8; 6], u64>;

fn lcg(mut s: u64) -> impl Iterator<Item = u64> {
    std::iter::from_fn(move || {
        s = s.wrapping_mul(6364136223846793005).wrapping_add(1);
        Some(s)
    })
}

fn key(n: u64) -> [u8; 4] {
    (n as u32).to_be_bytes()
}

fn entry(n: u64) -> Entry<Ops> {
    Entry::new(&key(n), IfIndex(1))
        .unwrap()
        .with_flags(NeighFlags::STALE)
}

fn table(buckets: usize) -> NeighTable<Ops> {
    NeighTable::new(Ops::new(), TableConfig::default().buckets(buckets)).unwrap()
}

fn filled(buckets: usize, n: usize, seed: u64) -> (NeighTable<Ops>, Vec<u64>) {
    let t = table(buckets);
    let keys: Vec<u64> = lcg(seed).take(n).collect();
    {
        let mut l = t.lock();
        for &k in &keys {
            l.insert(entry(k)).unwrap();
        }
    }
    (t, keys)
}

fn bench_insert_10k(c: &mut Criterion) {
    c.bench_function("neigh::insert_10k_256_buckets", |b| {
        b.iter_batched(
            || table(256),
            |t| {
                {
                    let mut l = t.lock();
                    for x in lcg(1).take(10_000) {
                        black_box(l.insert(entry(x)).unwrap());
                    }
                }
                black_box(t)
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_queue_then_drain_10k(c: &mut Criterion) {
    c.bench_function("neigh::queue_insert_then_run_deferred_10k", |b| {
        b.iter_batched(
            || table(256),
            |t| {
                for x in lcg(2).take(10_000) {
                    t.queue_insert(entry(x)).unwrap();
                }
                let n = t.lock().run_deferred().len();
                black_box((t, n))
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_lookup_hit(c: &mut Criterion) {
    let (t, keys) = filled(256, 10_000, 3);
    let mut it = keys.iter().cycle();
    c.bench_function("neigh::lookup_hit_10k_256_buckets", |b| {
        b.iter(|| {
            let k = key(*it.next().unwrap());
            black_box(t.lock().lookup(&k, Some(IfIndex(1))))
        })
    });
}

fn bench_lookup_miss(c: &mut Criterion) {
    let (t, _) = filled(256, 10_000, 4);
    let mut it = lcg(999);
    c.bench_function("neigh::lookup_miss_10k_256_buckets", |b| {
        b.iter(|| {
            let k = key(it.next().unwrap());
            black_box(t.lock().lookup(&k, Some(IfIndex(2))))
        })
    });
}

fn bench_walk_evict_half(c: &mut Criterion) {
    c.bench_function("neigh::walk_evict_half_10k", |b| {
        b.iter_batched(
            || filled(256, 10_000, 5).0,
            |t| {
                let stats = t
                    .lock()
                    .walk(|e| e.key()[3] & 1 == 0, NeighFlags::PERMANENT, None);
                black_box((t, stats))
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_unlink_relink(c: &mut Criterion) {
    let (t, keys) = filled(64, 4_096, 6);
    let ids: Vec<EntryId> = {
        let mut l = t.lock();
        keys.iter()
            .filter_map(|&k| l.lookup(&key(k), None))
            .collect()
    };
    let mut it = ids.iter().cycle();
    c.bench_function("neigh::unlink_relink_4k_64_buckets", |b| {
        b.iter(|| {
            let id = *it.next().unwrap();
            let mut l = t.lock();
            l.unlink(id).unwrap();
            l.relink(id).unwrap();
        })
    });
}

fn bench_config() -> Criterion {
    Criterion::default()
        .sample_size(20)
        .measurement_time(Duration::from_secs(3))
        .warm_up_time(Duration::from_secs(1))
}

criterion_group! {
    name = benches_insert;
    config = bench_config();
    targets = bench_insert_10k, bench_queue_then_drain_10k
}
criterion_group! {
    name = benches_ops;
    config = bench_config();
    targets = bench_lookup_hit,
              bench_lookup_miss,
              bench_walk_evict_half,
              bench_unlink_relink
}
criterion_main!(benches_insert, benches_ops);
