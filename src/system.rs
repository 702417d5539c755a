//! The debris system interface and its host implementations.
//!
//! [`DebrisSystem`] is the capability contract every back-end fulfils. The
//! host back-end provides one type per [`Variant`], all built on the shared
//! [`DebrisCore`] that owns the particle pool. [`build`] picks the type from
//! the configuration. Dropping a system releases its buffers.

use std::sync::{Arc, PoisonError, RwLockReadGuard, RwLockWriteGuard};

use glam::Vec2;

use crate::config::{DebrisConfig, SimParams, Variant};
use crate::emission::{EmitBuffer, EmitQueue, EmitRecord, Explosion};
use crate::error::ConfigError;
use crate::integrator;
use crate::pool::{CounterArgs, ParticlePool, PoolCounts};
use crate::render::IndirectDraw;
use crate::solver;
use crate::spatial::GridHash;
use crate::terrain::{SharedTerrain, TerrainField};
use crate::time::FixedStep;

/// What one call to [`DebrisSystem::update`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepReport {
    /// Sub-steps simulated this frame.
    pub substeps: u32,
}

/// Capability contract of a debris simulation.
pub trait DebrisSystem {
    /// Emission buffer type accepted by [`emit_indirect`](Self::emit_indirect).
    type Uploads: ?Sized;

    fn variant(&self) -> Variant;

    /// Advance the simulation by `frame_time` seconds of wall-clock time.
    fn update(&mut self, frame_time: f32) -> StepReport;

    /// Queue one particle. Returns `false` if the queue was full.
    fn emit(&mut self, position: Vec2, velocity: Vec2) -> bool;

    /// Spawn one particle per record in `uploads`, reading the record count
    /// from a snapshot of the buffer's own counter.
    fn emit_indirect(&mut self, uploads: &Self::Uploads);

    /// Queue an explosion. Returns `false` if the queue was full or the
    /// variant does not couple to terrain.
    fn emit_explosion(&mut self, position: Vec2, radius: f32) -> bool;

    /// Carve every queued explosion into the terrain now and emit the cells
    /// it empties. Does nothing for variants without terrain coupling.
    fn destroy_terrain(&mut self);

    /// Dead, alive and settled counts at the last synchronization point.
    ///
    /// Free on the host. On the device this is a blocking readback meant for
    /// tests and debugging, not for every frame.
    fn counts(&self) -> PoolCounts;
}

fn read_terrain(terrain: &SharedTerrain) -> RwLockReadGuard<'_, TerrainField> {
    terrain.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_terrain(terrain: &SharedTerrain) -> RwLockWriteGuard<'_, TerrainField> {
    terrain.write().unwrap_or_else(PoisonError::into_inner)
}

/// State shared by every host variant.
#[derive(Debug)]
pub struct DebrisCore {
    config: DebrisConfig,
    params: SimParams,
    pool: ParticlePool,
    hash: Option<GridHash>,
    stepper: FixedStep,
    emit_queue: EmitQueue<EmitRecord>,
    draw: IndirectDraw,
    terrain: SharedTerrain,
    emit_args: CounterArgs,
}

impl DebrisCore {
    pub fn new(config: DebrisConfig, terrain: SharedTerrain) -> Result<Self, ConfigError> {
        config.validate()?;
        let layout = config.grid_layout()?;
        let params = config.sim_params(&layout, &read_terrain(&terrain).field_params());
        let pool = ParticlePool::new(config.capacity)?;
        let hash = config
            .variant
            .uses_hash()
            .then(|| GridHash::new(layout, config.capacity, config.query_radius));

        log::info!(
            "Debris system: {} slots, {} variant, hash grid {}x{}",
            config.capacity,
            config.variant.name(),
            layout.dims().x,
            layout.dims().y
        );

        Ok(Self {
            stepper: FixedStep::new(config.timestep, config.max_substeps),
            emit_queue: EmitQueue::new(config.emit_capacity as usize),
            draw: IndirectDraw::new(),
            emit_args: CounterArgs::default(),
            config,
            params,
            pool,
            hash,
            terrain,
        })
    }

    pub fn config(&self) -> &DebrisConfig {
        &self.config
    }

    pub fn params(&self) -> &SimParams {
        &self.params
    }

    pub fn pool(&self) -> &ParticlePool {
        &self.pool
    }

    pub fn draw(&self) -> &IndirectDraw {
        &self.draw
    }

    pub fn terrain(&self) -> &SharedTerrain {
        &self.terrain
    }

    /// Snapshot used by the most recent indirect emission.
    pub fn emit_args(&self) -> CounterArgs {
        self.emit_args
    }

    pub fn counts(&self) -> PoolCounts {
        self.pool.counts()
    }

    fn queue_emit(&mut self, position: Vec2, velocity: Vec2) -> bool {
        self.emit_queue
            .push(EmitRecord::new(position, velocity, self.config.debris_color))
    }

    fn flush_emits(&mut self) -> u32 {
        if self.emit_queue.is_empty() {
            return 0;
        }
        let records = self.emit_queue.drain();
        self.pool.spawn(&records, self.config.emit_lifetime)
    }

    fn emit_from(&mut self, uploads: &EmitBuffer) -> u32 {
        self.emit_args = uploads.counter_args();
        let count = self.emit_args.count().min(uploads.capacity()) as usize;
        self.pool
            .spawn(&uploads.records()[..count], self.config.emit_lifetime)
    }

    /// One sub-step from predict to finalize.
    fn substep(&mut self, hashed: bool) {
        let terrain = Arc::clone(&self.terrain);
        let terrain = read_terrain(&terrain);
        let field = terrain.field();

        integrator::predict(&mut self.pool, &self.params);
        match self.hash.as_mut().filter(|_| hashed) {
            Some(hash) => {
                hash.rebuild(self.pool.predicted.read(), &self.pool.meta);
                for _ in 0..self.config.relaxation_iterations {
                    solver::relax(&mut self.pool, Some(&*hash), field, &self.params);
                }
            }
            None => solver::relax(&mut self.pool, None, field, &self.params),
        }
        integrator::finalize(&mut self.pool, &self.params);
    }

    /// Write this sub-step's settlers into the terrain.
    fn deposit(&mut self) -> u32 {
        if self.pool.settled.is_empty() {
            return 0;
        }
        let bodies = self.pool.bodies();
        let meta = self.pool.meta();
        let settlers = self
            .pool
            .settle_list()
            .to_vec()
            .into_iter()
            .map(|slot| (bodies[slot as usize].position, meta[slot as usize].color));
        write_terrain(&self.terrain).deposit(settlers)
    }

    /// Regenerate the distance field if an edit left it stale.
    fn refresh_field(&self) {
        if !self.config.refresh_field {
            return;
        }
        let mut terrain = write_terrain(&self.terrain);
        if terrain.is_dirty() {
            terrain.refresh_distance_field();
        }
    }

    fn present(&mut self) {
        self.draw.copy_count(&self.pool.alive);
    }

    /// Flush direct emission, run the frame's sub-steps and present.
    fn run_frame(&mut self, frame_time: f32, hashed: bool) -> StepReport {
        self.flush_emits();
        let substeps = self.stepper.advance(frame_time);
        for _ in 0..substeps {
            self.substep(hashed);
        }
        self.present();
        StepReport { substeps }
    }
}

/// A [`DebrisCore`] plus the frame policy that drives it.
///
/// Every host variant gets its [`DebrisSystem`] implementation from this
/// trait: emission and counts go straight to the core, the variant only
/// decides how a frame runs and whether it touches the terrain.
pub trait HostVariant {
    const VARIANT: Variant;

    fn core(&self) -> &DebrisCore;

    fn core_mut(&mut self) -> &mut DebrisCore;

    /// Run one frame of `frame_time` seconds.
    fn step(&mut self, frame_time: f32) -> StepReport;

    fn queue_explosion(&mut self, _position: Vec2, _radius: f32) -> bool {
        false
    }

    fn carve(&mut self) {}
}

impl<T: HostVariant> DebrisSystem for T {
    type Uploads = EmitBuffer;

    fn variant(&self) -> Variant {
        T::VARIANT
    }

    fn update(&mut self, frame_time: f32) -> StepReport {
        self.step(frame_time)
    }

    fn emit(&mut self, position: Vec2, velocity: Vec2) -> bool {
        self.core_mut().queue_emit(position, velocity)
    }

    fn emit_indirect(&mut self, uploads: &EmitBuffer) {
        self.core_mut().emit_from(uploads);
    }

    fn emit_explosion(&mut self, position: Vec2, radius: f32) -> bool {
        self.queue_explosion(position, radius)
    }

    fn destroy_terrain(&mut self) {
        self.carve();
    }

    fn counts(&self) -> PoolCounts {
        self.core().counts()
    }
}

/// Predict, one terrain relaxation, finalize. No spatial hash.
#[derive(Debug)]
pub struct SimpleDebris {
    core: DebrisCore,
}

impl SimpleDebris {
    pub fn new(config: DebrisConfig, terrain: SharedTerrain) -> Result<Self, ConfigError> {
        let config = config.with_variant(Variant::Simple);
        Ok(Self {
            core: DebrisCore::new(config, terrain)?,
        })
    }
}

impl HostVariant for SimpleDebris {
    const VARIANT: Variant = Variant::Simple;

    fn core(&self) -> &DebrisCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut DebrisCore {
        &mut self.core
    }

    fn step(&mut self, frame_time: f32) -> StepReport {
        self.core.run_frame(frame_time, false)
    }
}

/// Hashed sub-stepping with particle and terrain collisions.
#[derive(Debug)]
pub struct SubsteppedDebris {
    core: DebrisCore,
}

impl SubsteppedDebris {
    pub fn new(config: DebrisConfig, terrain: SharedTerrain) -> Result<Self, ConfigError> {
        let config = config.with_variant(Variant::Substepped);
        Ok(Self {
            core: DebrisCore::new(config, terrain)?,
        })
    }
}

impl HostVariant for SubsteppedDebris {
    const VARIANT: Variant = Variant::Substepped;

    fn core(&self) -> &DebrisCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut DebrisCore {
        &mut self.core
    }

    fn step(&mut self, frame_time: f32) -> StepReport {
        self.core.run_frame(frame_time, true)
    }
}

/// Hashed sub-stepping plus explosions, carving and settling into terrain.
///
/// With `refresh_field` set (the default) the terrain's distance field is
/// regenerated after the frame's carve and after every deposit that changed
/// the terrain, so debris never collides against cells that are gone.
#[derive(Debug)]
pub struct CoupledDebris {
    core: DebrisCore,
    explosions: EmitQueue<Explosion>,
    carved: EmitBuffer,
    deposited: u32,
}

impl CoupledDebris {
    pub fn new(config: DebrisConfig, terrain: SharedTerrain) -> Result<Self, ConfigError> {
        let config = config.with_variant(Variant::TerrainCoupled);
        let explosions = EmitQueue::new(config.explosion_capacity as usize);
        let carved = EmitBuffer::new(config.emit_capacity);
        Ok(Self {
            core: DebrisCore::new(config, terrain)?,
            explosions,
            carved,
            deposited: 0,
        })
    }

    /// Explosions waiting for the next carve.
    pub fn pending_explosions(&self) -> &[Explosion] {
        self.explosions.as_slice()
    }

    /// Particles written back into the terrain since construction.
    pub fn deposited(&self) -> u32 {
        self.deposited
    }
}

impl HostVariant for CoupledDebris {
    const VARIANT: Variant = Variant::TerrainCoupled;

    fn core(&self) -> &DebrisCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut DebrisCore {
        &mut self.core
    }

    fn step(&mut self, frame_time: f32) -> StepReport {
        self.carve();
        self.core.refresh_field();
        self.core.flush_emits();

        let substeps = self.core.stepper.advance(frame_time);
        for _ in 0..substeps {
            self.core.substep(true);
            let written = self.core.deposit();
            if written > 0 {
                self.deposited += written;
                self.core.refresh_field();
            }
        }
        self.core.present();
        StepReport { substeps }
    }

    fn queue_explosion(&mut self, position: Vec2, radius: f32) -> bool {
        self.explosions.push(Explosion::new(position, radius))
    }

    fn carve(&mut self) {
        if self.explosions.is_empty() {
            return;
        }
        let explosions = self.explosions.drain();
        self.carved.clear();
        write_terrain(&self.core.terrain).carve(&explosions, &self.core.config.carve, &mut self.carved);
        self.core.emit_from(&self.carved);
    }
}

/// Build the host system selected by `config.variant`.
pub fn build(
    config: DebrisConfig,
    terrain: SharedTerrain,
) -> Result<Box<dyn DebrisSystem<Uploads = EmitBuffer>>, ConfigError> {
    Ok(match config.variant {
        Variant::Simple => Box::new(SimpleDebris::new(config, terrain)?),
        Variant::Substepped => Box::new(SubsteppedDebris::new(config, terrain)?),
        Variant::TerrainCoupled => Box::new(CoupledDebris::new(config, terrain)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain::{self, TerrainField};

    fn empty_terrain() -> SharedTerrain {
        terrain::shared(TerrainField::new(128, 128).unwrap())
    }

    #[test]
    fn test_build_selects_variant() {
        for variant in [Variant::Simple, Variant::Substepped, Variant::TerrainCoupled] {
            let system = build(DebrisConfig::new(64).with_variant(variant), empty_terrain()).unwrap();
            assert_eq!(system.variant(), variant);
            assert_eq!(system.counts().dead, 64);
        }
    }

    #[test]
    fn test_build_rejects_bad_config() {
        let err = build(DebrisConfig::new(0), empty_terrain()).err();
        assert_eq!(err, Some(ConfigError::ZeroCapacity));
    }

    #[test]
    fn test_non_coupled_variants_ignore_explosions() {
        let mut system = SubsteppedDebris::new(DebrisConfig::new(64), empty_terrain()).unwrap();
        assert!(!system.emit_explosion(Vec2::ZERO, 4.0));
        system.destroy_terrain();
        assert_eq!(system.counts().dead, 64);
    }

    #[test]
    fn test_frame_without_steps_keeps_emission_in_flight() {
        let config = DebrisConfig::new(64);
        let dt = config.timestep;
        let mut system = SimpleDebris::new(config, empty_terrain()).unwrap();
        assert!(system.emit(Vec2::ZERO, Vec2::ZERO));
        let report = system.update(dt * 0.5);
        assert_eq!(report.substeps, 0);

        let counts = system.counts();
        let in_flight = system.core().pool().in_use() - counts.alive;
        assert_eq!(counts.dead + counts.alive + in_flight, 64);
        assert_eq!(in_flight, 1);
    }

    #[test]
    fn test_emit_indirect_uses_counter_snapshot() {
        let mut system = SubsteppedDebris::new(DebrisConfig::new(64), empty_terrain()).unwrap();
        let mut uploads = EmitBuffer::new(8);
        for i in 0..5 {
            uploads.push(EmitRecord::new(Vec2::new(i as f32 * 3.0, 0.0), Vec2::ZERO, 0));
        }
        system.emit_indirect(&uploads);
        assert_eq!(system.core().emit_args(), CounterArgs::new(5));
        assert_eq!(system.counts().dead, 59);
    }
}
