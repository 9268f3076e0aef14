//! Benchmarks for tree operations.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeMap;
use wbtree::{Lexicographic, NodeId, Tree};

fn generate_sequential_keys(n: usize) -> Vec<Vec<u8>> {
    (0..n).map(|i| format!("key:{:08}", i).into_bytes()).collect()
}

fn generate_shuffled_keys(n: usize) -> Vec<Vec<u8>> {
    let mut keys = generate_sequential_keys(n);
    keys.shuffle(&mut StdRng::seed_from_u64(42));
    keys
}

fn build(keys: &[Vec<u8>]) -> (Tree<Lexicographic>, Vec<NodeId>) {
    let mut tree = Tree::new(Lexicographic);
    let ids = keys
        .iter()
        .enumerate()
        .map(|(i, key)| {
            let id = tree
                .construct_node_from(key, &(i as u64).to_le_bytes())
                .unwrap();
            tree.insert(id).unwrap();
            id
        })
        .collect();
    (tree, ids)
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");

    for size in [1_000, 10_000, 100_000] {
        for (label, keys) in [
            ("sequential", generate_sequential_keys(size)),
            ("shuffled", generate_shuffled_keys(size)),
        ] {
            group.bench_with_input(
                BenchmarkId::new(format!("Tree/{label}"), size),
                &keys,
                |b, keys| b.iter(|| black_box(build(keys))),
            );

            group.bench_with_input(
                BenchmarkId::new(format!("BTreeMap/{label}"), size),
                &keys,
                |b, keys| {
                    b.iter(|| {
                        let mut map: BTreeMap<Vec<u8>, u64> = BTreeMap::new();
                        for (i, key) in keys.iter().enumerate() {
                            map.insert(key.clone(), i as u64);
                        }
                        black_box(map)
                    });
                },
            );
        }
    }

    group.finish();
}

fn bench_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("lookup");

    for size in [1_000, 10_000, 100_000] {
        let keys = generate_shuffled_keys(size);
        let (tree, _) = build(&keys);

        group.bench_with_input(BenchmarkId::new("get_equal", size), &keys, |b, keys| {
            b.iter(|| {
                let mut found = 0usize;
                for key in keys.iter() {
                    if tree.get_equal(key).is_some() {
                        found += 1;
                    }
                }
                black_box(found)
            });
        });

        group.bench_with_input(BenchmarkId::new("iter", size), &tree, |b, tree| {
            b.iter(|| black_box(tree.iter().map(|(_, _, data)| data.len()).sum::<usize>()));
        });
    }

    group.finish();
}

fn bench_delete(c: &mut Criterion) {
    let mut group = c.benchmark_group("delete");

    for size in [1_000, 10_000] {
        let keys = generate_shuffled_keys(size);

        group.bench_with_input(BenchmarkId::new("delete_all", size), &keys, |b, keys| {
            b.iter_batched(
                || build(keys),
                |(mut tree, mut ids)| {
                    ids.shuffle(&mut StdRng::seed_from_u64(7));
                    for id in ids {
                        tree.delete(id).unwrap();
                    }
                    black_box(tree)
                },
                criterion::BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, bench_insert, bench_lookup, bench_delete);
criterion_main!(benches);
