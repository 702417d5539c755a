//! Benchmarks for the host back-end.
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::Rng;

use debris::config::{Bounds, DebrisConfig, Variant};
use debris::emission::{EmitBuffer, EmitRecord};
use debris::pool::SlotMeta;
use debris::spatial::{GridHash, GridLayout};
use debris::system::{DebrisSystem, SubsteppedDebris};
use debris::terrain::{self, TerrainField};
use debris::Vec2;

const WORLD: f32 = 512.0;

fn random_positions(n: usize) -> Vec<Vec2> {
    let mut rng = rand::thread_rng();
    let half = WORLD * 0.5;
    (0..n)
        .map(|_| Vec2::new(rng.gen_range(-half..half), rng.gen_range(-half..half)))
        .collect()
}

fn bench_hash_rebuild(c: &mut Criterion) {
    let mut group = c.benchmark_group("hash_rebuild");

    for count in [1_000u32, 10_000, 100_000] {
        let layout = GridLayout::new(Bounds::centered(Vec2::splat(WORLD)), 1.128).unwrap();
        let positions = random_positions(count as usize);
        let meta = vec![SlotMeta::spawned(10.0, 0); count as usize];
        let mut hash = GridHash::new(layout, count, 1);

        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| {
                hash.rebuild(black_box(&positions), black_box(&meta));
                black_box(hash.len())
            })
        });
    }

    group.finish();
}

fn bench_substep(c: &mut Criterion) {
    let mut group = c.benchmark_group("substep");
    group.sample_size(20);

    for count in [1_000u32, 10_000, 50_000] {
        let config = DebrisConfig::new(count)
            .with_variant(Variant::Substepped)
            .with_bounds(Bounds::centered(Vec2::splat(WORLD)))
            .with_emit_capacity(count)
            .with_emit_lifetime(1e6);
        let dt = config.timestep;
        let ground = TerrainField::from_fn(512, 512, |_, y| (y < 64).then_some(0xff00_00ff)).unwrap();
        let mut system = SubsteppedDebris::new(config, terrain::shared(ground)).unwrap();

        let mut uploads = EmitBuffer::new(count);
        for p in random_positions(count as usize) {
            uploads.push(EmitRecord::new(Vec2::new(p.x, p.y.abs()), Vec2::ZERO, 0));
        }
        system.emit_indirect(&uploads);

        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| black_box(system.update(dt)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_hash_rebuild, bench_substep);
criterion_main!(benches);
