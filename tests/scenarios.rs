//! End-to-end scenarios on the host back-end.
//!
//! Each test drives a full system through its public trait and checks the
//! pool and terrain afterwards.

use debris::prelude::*;
use debris::SettleRule;

const ROCK: u32 = 0xff30_4050;

fn empty(size: u32) -> SharedTerrain {
    terrain::shared(TerrainField::new(size, size).unwrap())
}

/// Solid below row `surface`, so the surface sits at `surface - size / 2`.
fn ground(size: u32, surface: u32) -> TerrainField {
    TerrainField::from_fn(size, size, |_, y| (y < surface).then_some(ROCK)).unwrap()
}

fn alive_positions(system: &SubsteppedDebris) -> Vec<Vec2> {
    let pool = system.core().pool();
    pool.alive_list()
        .to_vec()
        .into_iter()
        .map(|slot| pool.bodies()[slot as usize].position)
        .collect()
}

#[test]
fn test_single_emit_falls_one_step() {
    let config = DebrisConfig::new(1024).with_variant(Variant::Substepped);
    let dt = config.timestep;
    let gravity = config.gravity.y;
    let damping = config.damping;
    let mut system = SubsteppedDebris::new(config, empty(128)).unwrap();

    assert!(system.emit(Vec2::ZERO, Vec2::ZERO));
    let report = system.update(dt);
    assert_eq!(report.substeps, 1);

    let counts = system.counts();
    assert_eq!(counts.alive, 1);
    assert_eq!(counts.dead, 1023);

    let p = alive_positions(&system)[0];
    let expected = gravity * dt * dt * (1.0 - damping * dt);
    assert!(p.x.abs() < 1e-6);
    assert!((p.y - expected).abs() < 1e-5, "y = {}, expected {}", p.y, expected);
}

#[test]
fn test_emit_queue_saturates() {
    let config = DebrisConfig::new(1024).with_variant(Variant::Substepped);
    let dt = config.timestep;
    let limit = config.emit_capacity;
    let mut system = SubsteppedDebris::new(config, empty(128)).unwrap();

    let accepted = (0..limit + 5)
        .filter(|&i| system.emit(Vec2::new(i as f32 * 2.0 - 200.0, 100.0), Vec2::ZERO))
        .count() as u32;
    assert_eq!(accepted, limit);

    system.update(dt);
    assert_eq!(system.counts().alive, limit);
    assert_eq!(system.counts().dead, 1024 - limit);
}

#[test]
fn test_emit_beyond_dead_pool_is_dropped() {
    let config = DebrisConfig::new(16).with_variant(Variant::Simple);
    let dt = config.timestep;
    let mut system = SimpleDebris::new(config, empty(64)).unwrap();

    let mut uploads = EmitBuffer::new(64);
    for i in 0..40 {
        uploads.push(EmitRecord::new(Vec2::new(i as f32, 0.0), Vec2::ZERO, ROCK));
    }
    system.emit_indirect(&uploads);
    system.update(dt);

    let counts = system.counts();
    assert_eq!(counts.alive, 16);
    assert_eq!(counts.dead, 0);
}

#[test]
fn test_explosion_queue_saturates() {
    let config = DebrisConfig::new(1024);
    let limit = config.explosion_capacity;
    let mut system = CoupledDebris::new(config, terrain::shared(ground(64, 32))).unwrap();

    let rejected = (0..limit + 5)
        .filter(|&i| !system.emit_explosion(Vec2::new(i as f32, -10.0), 3.0))
        .count();
    assert_eq!(rejected, 5);
    assert_eq!(system.pending_explosions().len(), limit as usize);
}

#[test]
fn test_uncoupled_variants_reject_explosions() {
    let config = DebrisConfig::new(64);
    let mut simple = SimpleDebris::new(config.clone(), empty(64)).unwrap();
    let mut substepped = SubsteppedDebris::new(config, empty(64)).unwrap();

    assert!(!simple.emit_explosion(Vec2::ZERO, 4.0));
    assert!(!substepped.emit_explosion(Vec2::ZERO, 4.0));
}

#[test]
fn test_explosion_carves_terrain() {
    let shared = terrain::shared(ground(64, 32));
    let config = DebrisConfig::new(4096).with_emit_capacity(1024);
    let mut system = CoupledDebris::new(config, shared.clone()).unwrap();
    let before = shared.read().unwrap().solid_count();
    assert_eq!(before, 64 * 32);

    assert!(system.emit_explosion(Vec2::new(0.0, -4.0), 5.0));
    system.destroy_terrain();

    let field = shared.read().unwrap();
    let emptied = (before - field.solid_count()) as u32;
    assert!(emptied > 0);
    assert!(field.is_dirty());
    assert_eq!(system.core().emit_args().count(), emptied);
    assert!(system.pending_explosions().is_empty());

    let pool = system.core().pool();
    assert_eq!(pool.in_use(), emptied);
    assert_eq!(system.counts().dead, 4096 - emptied);
    assert!(pool
        .meta()
        .iter()
        .filter(|m| !m.is_unused())
        .all(|m| m.color == ROCK));
}

#[test]
fn test_carved_particles_fly_outward() {
    let config = DebrisConfig::new(4096).with_emit_capacity(1024);
    let dt = config.timestep;
    let center = Vec2::new(0.0, -4.0);
    let shared = terrain::shared(ground(64, 32));
    let mut system = CoupledDebris::new(config, shared.clone()).unwrap();

    system.emit_explosion(center, 5.0);
    system.update(dt);
    assert!(!shared.read().unwrap().is_dirty());

    let pool = system.core().pool();
    let alive = pool.alive_list().to_vec();
    assert!(!alive.is_empty());
    let outward = alive
        .iter()
        .map(|&slot| pool.bodies()[slot as usize])
        .filter(|b| (b.position - center).dot(b.velocity) > 0.0)
        .count();
    assert!(outward * 2 > alive.len(), "{} of {} outward", outward, alive.len());
}

#[test]
fn test_explosion_debris_keeps_carve_speed() {
    let config = DebrisConfig::new(4096).with_emit_capacity(1024);
    let dt = config.timestep;
    let limit = config.carve.speed + config.gravity.length() * dt;
    let mut system = CoupledDebris::new(config, terrain::shared(ground(64, 32))).unwrap();

    assert!(system.emit_explosion(Vec2::new(0.0, -4.0), 5.0));
    system.update(dt);

    let pool = system.core().pool();
    let alive = pool.alive_list().to_vec();
    assert!(!alive.is_empty());
    let fastest = alive
        .iter()
        .map(|&slot| pool.bodies()[slot as usize].velocity.length())
        .fold(0.0f32, f32::max);
    assert!(fastest <= limit, "fastest debris {} exceeds {}", fastest, limit);
}

#[test]
fn test_field_refresh_can_be_left_to_owner() {
    let config = DebrisConfig::new(4096)
        .with_emit_capacity(1024)
        .with_field_refresh(false);
    let dt = config.timestep;
    let shared = terrain::shared(ground(64, 32));
    let mut system = CoupledDebris::new(config, shared.clone()).unwrap();

    system.emit_explosion(Vec2::new(0.0, -4.0), 5.0);
    system.update(dt);
    assert!(shared.read().unwrap().is_dirty());
}

#[test]
fn test_blast_beyond_emit_capacity_saturates() {
    let capacity = 4096;
    let emit_capacity = 32;
    let config = DebrisConfig::new(capacity).with_emit_capacity(emit_capacity);
    let dt = config.timestep;
    let shared = terrain::shared(ground(64, 32));
    let mut system = CoupledDebris::new(config, shared.clone()).unwrap();
    let before = shared.read().unwrap().solid_count() as u32;

    assert!(system.emit_explosion(Vec2::new(0.0, -4.0), 10.0));
    system.update(dt);

    let emptied = before - shared.read().unwrap().solid_count() as u32;
    assert!(emptied > emit_capacity, "only {} cells emptied", emptied);
    assert_eq!(system.core().emit_args().count(), emit_capacity);

    let counts = system.counts();
    assert_eq!(capacity - counts.dead, emit_capacity);
    assert_eq!(counts.alive + system.deposited(), emit_capacity);
    assert_eq!(counts.dead + counts.alive, capacity);
}

#[test]
fn test_resting_particle_deposits_into_terrain() {
    let debris_color = pack_rgba(250, 10, 10, 255);
    let config = DebrisConfig::new(64)
        .with_debris_color(debris_color)
        .with_settle(SettleRule::default());
    let dt = config.timestep;
    let shared = terrain::shared(ground(64, 16));
    let mut system = CoupledDebris::new(config, shared.clone()).unwrap();
    let before = shared.read().unwrap().solid_count();

    // Surface at y = -16.
    assert!(system.emit(Vec2::new(0.0, -15.0), Vec2::ZERO));
    for _ in 0..120 {
        system.update(dt);
    }

    assert_eq!(system.deposited(), 1);
    assert_eq!(system.counts().alive, 0);
    assert_eq!(system.counts().dead, 64);

    let field = shared.read().unwrap();
    assert!(!field.is_dirty());
    assert!(field.solid_count() >= before);
    assert_eq!(
        field.color_values().iter().filter(|&&c| c == debris_color).count(),
        1
    );
}

#[test]
fn test_expired_particles_return_to_dead_pool() {
    let config = DebrisConfig::new(32)
        .with_variant(Variant::Substepped)
        .with_gravity(Vec2::ZERO)
        .with_emit_lifetime(0.1);
    let dt = config.timestep;
    let mut system = SubsteppedDebris::new(config, empty(64)).unwrap();

    for i in 0..8 {
        system.emit(Vec2::new(i as f32 * 4.0, 0.0), Vec2::ZERO);
    }
    system.update(dt);
    assert_eq!(system.counts().alive, 8);

    for _ in 0..10 {
        system.update(dt);
    }
    assert_eq!(system.counts().alive, 0);
    assert_eq!(system.counts().dead, 32);
}

#[test]
fn test_slots_conserved_over_many_frames() {
    let config = DebrisConfig::new(2048)
        .with_bounds(Bounds::centered(Vec2::splat(128.0)))
        .with_emit_lifetime(3.0);
    let dt = config.timestep;
    let shared = terrain::shared(ground(128, 48));
    let mut system = CoupledDebris::new(config, shared.clone()).unwrap();

    for frame in 0..300u32 {
        if frame % 20 == 0 {
            let x = (frame as f32 * 7.0) % 80.0 - 40.0;
            system.emit_explosion(Vec2::new(x, -18.0), 6.0);
        }
        if frame % 3 == 0 {
            system.emit(Vec2::new(0.0, 30.0), Vec2::new(5.0, 0.0));
        }
        system.update(dt);

        let counts = system.counts();
        assert_eq!(counts.dead + counts.alive, 2048, "frame {}", frame);
        assert_eq!(system.core().pool().in_use(), counts.alive, "frame {}", frame);
        assert!(!shared.read().unwrap().is_dirty(), "frame {}", frame);
    }
}

#[test]
fn test_simple_variant_skips_particle_collisions() {
    let config = DebrisConfig::new(8).with_gravity(Vec2::ZERO);
    let dt = config.timestep;
    let mut simple = SimpleDebris::new(config.clone().with_variant(Variant::Simple), empty(64)).unwrap();
    let mut hashed = SubsteppedDebris::new(config.clone(), empty(64)).unwrap();

    for system in [&mut simple as &mut dyn DebrisSystem<Uploads = EmitBuffer>, &mut hashed] {
        system.emit(Vec2::ZERO, Vec2::ZERO);
        system.emit(Vec2::new(0.3, 0.0), Vec2::ZERO);
        system.update(dt);
    }

    let pool = simple.core().pool();
    let slots = pool.alive_list().to_vec();
    let gap = pool.bodies()[slots[0] as usize]
        .position
        .distance(pool.bodies()[slots[1] as usize].position);
    assert!((gap - 0.3).abs() < 1e-4);

    let separated = alive_positions(&hashed);
    let min_separation = hashed.core().params().min_separation();
    assert!(separated[0].distance(separated[1]) >= min_separation - 1e-3);
}

#[test]
fn test_long_frame_clamps_substeps() {
    let config = DebrisConfig::new(16).with_variant(Variant::Substepped);
    let max = config.max_substeps;
    let mut system = SubsteppedDebris::new(config, empty(64)).unwrap();

    assert_eq!(system.update(1.0).substeps, max);
    assert_eq!(system.update(0.5).substeps, max);
}
