//! Position-based collision relaxation.
//!
//! One relaxation reads every predicted position from the read buffer and
//! writes a corrected position to the write buffer, then swaps. Overlapping
//! pairs are pushed apart symmetrically: each side applies half of the
//! penetration, so the pair separates fully without either particle seeing
//! the other's update. Terrain contact projects the particle out along the
//! distance field gradient and removes part of its tangential motion.
//!
//! The number of relaxations per sub-step is fixed; there is no convergence
//! test.

use glam::Vec2;
use rayon::prelude::*;

use crate::config::{SimParams, FLAG_COLLIDE_PARTICLES};
use crate::dispatch::PARTICLE_GROUP_SIZE;
use crate::pool::{ParticlePool, SlotMeta};
use crate::spatial::GridHash;
use crate::terrain::DistanceField;

const GROUP: usize = PARTICLE_GROUP_SIZE as usize;

/// Pairs closer than this are treated as coincident.
const COINCIDENT: f32 = 1e-6;

/// Corrected position of particle `i`.
#[allow(clippy::too_many_arguments)]
fn resolve(
    i: u32,
    p: Vec2,
    committed: Vec2,
    predicted: &[Vec2],
    meta: &[SlotMeta],
    hash: Option<&GridHash>,
    field: &DistanceField,
    params: &SimParams,
) -> Vec2 {
    let min_sep = params.min_separation();
    let mut correction = Vec2::ZERO;

    if let Some(hash) = hash.filter(|_| params.has(FLAG_COLLIDE_PARTICLES)) {
        hash.for_each_neighbor(p, |j| {
            if j == i || !meta[j as usize].is_alive() {
                return;
            }
            let d = p - predicted[j as usize];
            let dist2 = d.length_squared();
            if dist2 >= min_sep * min_sep {
                return;
            }
            let dist = dist2.sqrt();
            let n = if dist > COINCIDENT {
                d / dist
            } else if i < j {
                Vec2::NEG_X
            } else {
                Vec2::X
            };
            correction += n * (min_sep - dist) * 0.5 * params.relaxation;
        });
    }

    let mut p = p + correction;

    let d = field.sample(p);
    if d < params.radius {
        let n = field.gradient(p);
        p += n * (params.radius - d);
        let moved = p - committed;
        let tangential = moved - n * moved.dot(n);
        p -= tangential * params.friction;
    }
    p
}

/// Run one relaxation over every alive slot, then swap predicted buffers.
///
/// `hash` is `None` for the simple variant, which only collides with terrain.
pub(crate) fn relax(
    pool: &mut ParticlePool,
    hash: Option<&GridHash>,
    field: &DistanceField,
    params: &SimParams,
) {
    let bodies = pool.bodies.read();
    let meta = &pool.meta;
    let (read, write) = pool.predicted.split();

    write
        .par_chunks_mut(GROUP)
        .enumerate()
        .for_each(|(group, out)| {
            for (local, p) in out.iter_mut().enumerate() {
                let i = group * GROUP + local;
                *p = if meta[i].is_alive() {
                    resolve(
                        i as u32,
                        read[i],
                        bodies[i].position,
                        read,
                        meta,
                        hash,
                        field,
                        params,
                    )
                } else {
                    read[i]
                };
            }
        });

    pool.predicted.swap();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Bounds, DebrisConfig};
    use crate::pool::Body;
    use crate::terrain::TerrainField;

    fn setup(positions: &[Vec2], terrain: &TerrainField) -> (ParticlePool, GridHash, SimParams) {
        let config = DebrisConfig::new(positions.len() as u32)
            .with_bounds(Bounds::centered(Vec2::splat(64.0)))
            .with_gravity(Vec2::ZERO);
        let layout = config.grid_layout().unwrap();
        let params = config.sim_params(&layout, &terrain.field_params());
        let bodies = positions.iter().map(|&p| Body::new(p, Vec2::ZERO)).collect();
        let meta = vec![SlotMeta::spawned(10.0, 0); positions.len()];
        let pool = ParticlePool::from_state(positions.len() as u32, bodies, meta).unwrap();
        let hash = GridHash::new(layout, positions.len() as u32, config.query_radius);
        (pool, hash, params)
    }

    #[test]
    fn test_overlap_resolves_within_four_iterations() {
        let terrain = TerrainField::new(64, 64).unwrap();
        let min_sep = DebrisConfig::default().cell_size();
        let (mut pool, mut hash, params) =
            setup(&[Vec2::ZERO, Vec2::new(min_sep * 0.5, 0.0)], &terrain);

        hash.rebuild(pool.predicted.read(), &pool.meta);
        for _ in 0..4 {
            relax(&mut pool, Some(&hash), terrain.field(), &params);
        }

        let p = pool.predicted.read();
        let gap = p[0].distance(p[1]);
        assert!(gap >= min_sep - 1e-4, "residual penetration {}", min_sep - gap);
        // Symmetric: the midpoint stays put.
        assert!(((p[0] + p[1]) * 0.5 - Vec2::new(min_sep * 0.25, 0.0)).length() < 1e-4);
    }

    #[test]
    fn test_coincident_pair_splits() {
        let terrain = TerrainField::new(64, 64).unwrap();
        let (mut pool, mut hash, params) = setup(&[Vec2::ONE, Vec2::ONE], &terrain);
        hash.rebuild(pool.predicted.read(), &pool.meta);
        relax(&mut pool, Some(&hash), terrain.field(), &params);

        let p = pool.predicted.read();
        assert!(p[0].x < p[1].x);
        assert!((p[0].distance(p[1]) - params.min_separation()).abs() < 1e-4);
    }

    #[test]
    fn test_terrain_pushes_particle_out() {
        // Rows 0..32 solid: surface at world y = 0.
        let terrain = TerrainField::from_fn(64, 64, |_, y| (y < 32).then_some(1)).unwrap();
        let (mut pool, _, params) = setup(&[Vec2::new(0.0, -0.25)], &terrain);

        relax(&mut pool, None, terrain.field(), &params);
        let p = pool.predicted.read()[0];
        let d = terrain.field().sample(p);
        assert!(p.y > -0.25);
        assert!(d >= params.radius - 0.1, "still inside by {}", params.radius - d);
    }

    #[test]
    fn test_dead_slots_are_ignored() {
        let terrain = TerrainField::new(64, 64).unwrap();
        let (mut pool, mut hash, params) = setup(&[Vec2::ZERO, Vec2::new(0.1, 0.0)], &terrain);
        pool.meta[1] = SlotMeta::UNUSED;
        hash.rebuild(pool.predicted.read(), &pool.meta);
        relax(&mut pool, Some(&hash), terrain.field(), &params);
        assert_eq!(pool.predicted.read()[0], Vec2::ZERO);
    }
}
