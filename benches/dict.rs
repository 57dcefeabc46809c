#![allow(missing_docs, unreachable_pub)]
mod utils;

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use rand::{SeedableRng, prelude::SliceRandom, rngs::StdRng};
use std::hint::black_box;
use utils::*;

// GET

fn bench_get_implicit(c: &mut Criterion) {
    let n = 100u32;
    let (_dir, dict) = bench_writer(n);
    let keys = shuffled_keys(n);

    c.bench_function("dict::get::implicit", |b| {
        b.iter(|| {
            let mut i = 0usize;
            for key in &keys {
                i += dict.get(key.as_bytes()).unwrap().len();
            }
            black_box(i);
        })
    });
}

fn bench_get_in_txn(c: &mut Criterion) {
    let n = 100u32;
    let (_dir, dict) = bench_writer(n);
    let keys = shuffled_keys(n);

    c.bench_function("dict::get::in_txn", |b| {
        b.iter(|| {
            let txn = dict.begin(false).unwrap();
            let mut i = 0usize;
            for key in &keys {
                i += txn.get_ref(key.as_bytes()).unwrap().map_or(0, <[u8]>::len);
            }
            txn.commit().unwrap();
            black_box(i);
        })
    });
}

// PUT

fn bench_put_scope(c: &mut Criterion) {
    let n = 100u32;
    let (_dir, dict) = bench_writer(0);

    let mut items: Vec<(String, String)> = (0..n).map(|n| (get_key(n), get_data(n))).collect();
    items.shuffle(&mut StdRng::from_seed(Default::default()));

    c.bench_function("dict::put::scope", |b| {
        b.iter_batched(
            || dict.begin(true).unwrap(),
            |mut txn| {
                for (key, data) in &items {
                    txn.put(key.as_bytes(), data.as_bytes()).unwrap();
                }
                txn.abort();
            },
            BatchSize::PerIteration,
        )
    });
}

fn bench_set_implicit(c: &mut Criterion) {
    let (_dir, dict) = bench_writer(0);
    let mut n = 0u32;

    c.bench_function("dict::set::implicit", |b| {
        b.iter(|| {
            n = n.wrapping_add(1);
            dict.set(get_key(n % 1000).as_bytes(), b"value").unwrap();
        })
    });
}

// ITER

fn bench_iter_items(c: &mut Criterion) {
    let n = 1000u32;
    let (_dir, dict) = bench_writer(n);

    c.bench_function("dict::iter::items", |b| {
        b.iter(|| {
            let mut i = 0usize;
            for item in dict.items().unwrap() {
                let (key, value) = item.unwrap();
                i += key.len() + value.len();
            }
            black_box(i);
        })
    });
}

fn bench_len(c: &mut Criterion) {
    let (_dir, dict) = bench_writer(1000);
    c.bench_function("dict::len", |b| b.iter(|| black_box(dict.len().unwrap())));
}

criterion_group! {
    name = benches;
    config = Criterion::default();
    targets = bench_get_implicit, bench_get_in_txn, bench_put_scope, bench_set_implicit,
        bench_iter_items, bench_len
}

criterion_main!(benches);
