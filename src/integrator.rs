//! Predict and finalize passes of the sub-step integrator.
//!
//! A sub-step is `predict → (hash rebuild) → relax × N → finalize`. Predict
//! integrates gravity and damping into a predicted position; finalize derives
//! the velocity from how far relaxation let the particle actually move, ages
//! it, and sorts its slot into the dead pool, the alive list or the settle
//! list.

use glam::Vec2;
use rayon::prelude::*;

use crate::config::{SimParams, FLAG_DEPOSIT_ON_EXPIRE, FLAG_SETTLE};
use crate::dispatch::PARTICLE_GROUP_SIZE;
use crate::pool::{Body, ParticlePool, UNUSED_LIFETIME};

const GROUP: usize = PARTICLE_GROUP_SIZE as usize;

/// Velocity after one step of gravity and linear damping.
#[inline]
pub fn integrate_velocity(velocity: Vec2, params: &SimParams) -> Vec2 {
    let damp = (1.0 - params.damping * params.dt).max(0.0);
    (velocity + params.gravity() * params.dt) * damp
}

/// Write predicted positions for every alive slot, then swap.
pub(crate) fn predict(pool: &mut ParticlePool, params: &SimParams) {
    let bodies = pool.bodies.read();
    let meta = &pool.meta;
    let (_, write) = pool.predicted.split();

    write
        .par_chunks_mut(GROUP)
        .enumerate()
        .for_each(|(group, out)| {
            for (local, p) in out.iter_mut().enumerate() {
                let i = group * GROUP + local;
                let body = bodies[i];
                *p = if meta[i].is_alive() {
                    body.position + integrate_velocity(body.velocity, params) * params.dt
                } else {
                    body.position
                };
            }
        });

    pool.predicted.swap();
}

/// Commit predicted positions, age particles and rebuild the alive list.
///
/// Expired slots go back to the dead pool. With [`FLAG_SETTLE`] set, slots
/// that rested long enough (or expired, with [`FLAG_DEPOSIT_ON_EXPIRE`]) are
/// also appended to the settle list; their color stays in the meta so the
/// deposit pass can read it.
pub(crate) fn finalize(pool: &mut ParticlePool, params: &SimParams) {
    pool.alive.reset();
    pool.settled.reset();

    let predicted = pool.predicted.read();
    let (read, write) = pool.bodies.split();
    let dead = &pool.dead;
    let alive = &pool.alive;
    let settled = &pool.settled;
    let dt = params.dt;
    let settle_enabled = params.has(FLAG_SETTLE);
    let deposit_on_expire = params.has(FLAG_DEPOSIT_ON_EXPIRE);

    write
        .par_chunks_mut(GROUP)
        .zip(pool.meta.par_chunks_mut(GROUP))
        .enumerate()
        .for_each(|(group, (out, metas))| {
            for (local, (body, m)) in out.iter_mut().zip(metas.iter_mut()).enumerate() {
                let i = group * GROUP + local;
                let prev = read[i];
                if m.is_unused() {
                    *body = prev;
                    continue;
                }

                let p = predicted[i];
                let v = (p - prev.position) / dt;
                *body = Body::new(p, v);
                m.elapsed += dt;

                let mut rests = false;
                if settle_enabled {
                    if v.length() < params.rest_speed {
                        m.rest += dt;
                    } else {
                        m.rest = 0.0;
                    }
                    rests = params.rest_time > 0.0 && m.rest >= params.rest_time;
                }

                let expired = !m.is_alive();
                if expired || rests {
                    if rests || (expired && deposit_on_expire) {
                        settled.append(i as u32);
                    }
                    m.elapsed = 0.0;
                    m.total = UNUSED_LIFETIME;
                    m.rest = 0.0;
                    dead.append(i as u32);
                } else {
                    alive.append(i as u32);
                }
            }
        });

    pool.bodies.swap();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DebrisConfig, Variant};
    use crate::emission::EmitRecord;
    use crate::terrain::TerrainField;

    fn params(config: &DebrisConfig) -> SimParams {
        let terrain = TerrainField::new(64, 64).unwrap();
        config.sim_params(&config.grid_layout().unwrap(), &terrain.field_params())
    }

    #[test]
    fn test_predict_applies_gravity() {
        let config = DebrisConfig::new(8).with_damping(0.0);
        let params = params(&config);
        let mut pool = ParticlePool::new(8).unwrap();
        pool.spawn(&[EmitRecord::new(Vec2::ZERO, Vec2::new(10.0, 0.0), 0)], 1.0);

        predict(&mut pool, &params);
        let slot = (0..8).find(|&i| pool.meta[i].is_alive()).unwrap();
        let p = pool.predicted.read()[slot];
        let dt = params.dt;
        assert!((p.x - 10.0 * dt).abs() < 1e-5);
        assert!((p.y - params.gravity[1] * dt * dt).abs() < 1e-6);
    }

    #[test]
    fn test_finalize_conserves_slots() {
        let config = DebrisConfig::new(256).with_emit_lifetime(0.05);
        let params = params(&config);
        let mut pool = ParticlePool::new(256).unwrap();
        let records: Vec<EmitRecord> = (0..100)
            .map(|i| {
                let r = EmitRecord::new(Vec2::new(i as f32, 0.0), Vec2::ZERO, 0);
                if i % 2 == 0 { r.with_lifetime(params.dt * 0.5) } else { r }
            })
            .collect();
        assert_eq!(pool.spawn(&records, config.emit_lifetime), 100);
        assert_eq!(pool.counts().dead, 156);

        predict(&mut pool, &params);
        finalize(&mut pool, &params);
        let counts = pool.counts();
        assert_eq!(counts.alive, 50);
        assert_eq!(counts.dead + counts.alive, 256);
        assert_eq!(counts.settled, 0);
    }

    #[test]
    fn test_expiry_settles_when_coupled() {
        let config = DebrisConfig::new(16).with_variant(Variant::TerrainCoupled);
        let params = params(&config);
        let mut pool = ParticlePool::new(16).unwrap();
        pool.spawn(&[EmitRecord::new(Vec2::ZERO, Vec2::ZERO, 42).with_lifetime(1e-4)], 1.0);

        predict(&mut pool, &params);
        finalize(&mut pool, &params);
        let counts = pool.counts();
        assert_eq!(counts.settled, 1);
        assert_eq!(counts.dead, 16);
        let slot = pool.settled.get(0).unwrap() as usize;
        assert_eq!(pool.meta[slot].color, 42);
        assert!(pool.meta[slot].is_unused());
    }
}
