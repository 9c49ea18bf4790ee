//! Patch application benchmark

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use bsa_core::{StateData, StateSnapshot};
use bsa_patch::PatchEngine;

fn wide_base(keys: usize) -> StateSnapshot {
    let mut data = StateData::new();
    for i in 0..keys {
        data.insert(format!("key{}", i), serde_json::json!(i));
    }
    StateSnapshot::pending(data)
}

fn batch_patch(directives: usize) -> String {
    (0..directives)
        .map(|i| format!("set key{} = {}", i, i * 2))
        .collect::<Vec<_>>()
        .join("\n")
}

fn bench_apply(c: &mut Criterion) {
    let engine = PatchEngine::new();
    let base = wide_base(1000);
    let patch = batch_patch(100);

    c.bench_function("apply_100_directives_1000_keys", |b| {
        b.iter(|| engine.apply(black_box(&base), black_box(&patch)).unwrap())
    });

    let guarded = "set key1 = 42 if key1 == 1";
    c.bench_function("apply_guarded_set", |b| {
        b.iter(|| engine.apply(black_box(&base), black_box(guarded)).unwrap())
    });
}

criterion_group!(benches, bench_apply);
criterion_main!(benches);
