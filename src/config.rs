//! Simulation configuration and the uniform block derived from it.
//!
//! [`DebrisConfig`] is built with chained `with_*` calls and validated once,
//! at construction of a system. [`SimParams`] is the 112-byte uniform both
//! back-ends read every pass.
//!
//! ```ignore
//! use debris::prelude::*;
//!
//! let config = DebrisConfig::new(65_536)
//!     .with_variant(Variant::TerrainCoupled)
//!     .with_timestep(1.0 / 120.0)
//!     .with_max_substeps(8);
//! config.validate()?;
//! ```

use bytemuck::{Pod, Zeroable};
use glam::{UVec2, Vec2, Vec4};

use crate::dispatch::{self, PARTICLE_GROUP_SIZE};
use crate::error::ConfigError;
use crate::render::pack_rgba;
use crate::spatial::{GridLayout, PACKING_CONSTANT};
use crate::terrain::FieldParams;

/// Gravity applied when none is configured, in world units per second squared.
pub const DEFAULT_GRAVITY: Vec2 = Vec2::new(0.0, -98.1);

/// Particles settle into the terrain (rest predicate is evaluated).
pub const FLAG_SETTLE: u32 = 1;
/// Expired particles deposit into the terrain instead of vanishing.
pub const FLAG_DEPOSIT_ON_EXPIRE: u32 = 1 << 1;
/// Relaxation resolves particle-particle overlaps through the spatial hash.
pub const FLAG_COLLIDE_PARTICLES: u32 = 1 << 2;

/// Which pipeline a debris system runs each sub-step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Variant {
    /// Predict, one terrain relaxation, finalize. No spatial hash.
    Simple,
    /// Predict, hash rebuild, repeated particle and terrain relaxation, finalize.
    #[default]
    Substepped,
    /// [`Variant::Substepped`] plus explosions, terrain carving and settling.
    TerrainCoupled,
}

impl Variant {
    /// Whether the spatial hash is rebuilt each sub-step.
    pub fn uses_hash(self) -> bool {
        !matches!(self, Variant::Simple)
    }

    /// Whether explosions carve the terrain and settlers are deposited back.
    pub fn couples_terrain(self) -> bool {
        matches!(self, Variant::TerrainCoupled)
    }

    pub fn name(self) -> &'static str {
        match self {
            Variant::Simple => "simple",
            Variant::Substepped => "substepped",
            Variant::TerrainCoupled => "terrain-coupled",
        }
    }
}

/// Axis-aligned simulation bounds in world units.
///
/// The spatial hash covers exactly this rectangle; particles outside it are
/// clamped into the border cells.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Vec2,
    pub max: Vec2,
}

impl Bounds {
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    /// Bounds of the given size centered on the world origin.
    pub fn centered(size: Vec2) -> Self {
        Self {
            min: -size * 0.5,
            max: size * 0.5,
        }
    }

    pub fn size(&self) -> Vec2 {
        self.max - self.min
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Bounds::centered(Vec2::new(1920.0, 1080.0))
    }
}

/// When a particle stops being debris and becomes terrain again.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SettleRule {
    /// Speed below which a particle counts as resting.
    pub rest_speed: f32,
    /// Seconds a particle must rest before it settles. Zero disables resting.
    pub rest_time: f32,
    /// Deposit particles whose lifetime runs out.
    pub deposit_on_expire: bool,
}

impl Default for SettleRule {
    fn default() -> Self {
        Self {
            rest_speed: 2.0,
            rest_time: 0.5,
            deposit_on_expire: true,
        }
    }
}

/// How an explosion removes terrain and launches the removed cells.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CarveRule {
    /// Occupancy removed at the explosion center. Falls off as `1 - d²/r²`.
    pub strength: f32,
    /// Launch speed of a carved cell at the explosion center.
    pub speed: f32,
}

impl Default for CarveRule {
    fn default() -> Self {
        Self {
            strength: 2.0,
            speed: 60.0,
        }
    }
}

/// Full configuration of a debris system.
#[derive(Debug, Clone, PartialEq)]
pub struct DebrisConfig {
    /// Fixed number of particle slots.
    pub capacity: u32,
    pub variant: Variant,
    /// Seconds simulated per sub-step.
    pub timestep: f32,
    /// Sub-steps allowed per frame before time is carried over.
    pub max_substeps: u32,
    /// Collision relaxations per sub-step for the hashed variants.
    pub relaxation_iterations: u32,
    /// Fraction of each pairwise correction applied per relaxation.
    pub relaxation: f32,
    pub gravity: Vec2,
    /// Linear velocity damping per second.
    pub damping: f32,
    pub bounds: Bounds,
    /// Rest spacing between neighbouring particles.
    pub particle_spacing: f32,
    /// Cells searched around a particle's own cell in each direction.
    pub query_radius: u32,
    /// Direct emission requests accepted per frame.
    pub emit_capacity: u32,
    /// Explosion requests accepted per frame.
    pub explosion_capacity: u32,
    /// Lifetime in seconds given to records that do not carry their own.
    pub emit_lifetime: f32,
    /// Fraction of tangential motion removed on terrain contact.
    pub terrain_friction: f32,
    /// Packed RGBA8 color for directly emitted particles.
    pub debris_color: u32,
    pub settle: SettleRule,
    pub carve: CarveRule,
    /// Regenerate the terrain distance field inside `update` whenever carving
    /// or deposition changed the terrain. Turn off when the terrain owner
    /// builds the field itself.
    pub refresh_field: bool,
}

impl DebrisConfig {
    /// Default configuration with the given capacity.
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity,
            variant: Variant::default(),
            timestep: 1.0 / 60.0,
            max_substeps: 4,
            relaxation_iterations: 4,
            relaxation: 1.0,
            gravity: DEFAULT_GRAVITY,
            damping: 0.1,
            bounds: Bounds::default(),
            particle_spacing: 1.0,
            query_radius: 1,
            emit_capacity: PARTICLE_GROUP_SIZE,
            explosion_capacity: 16,
            emit_lifetime: 10.0,
            terrain_friction: 0.2,
            debris_color: pack_rgba(180, 140, 106, 255),
            settle: SettleRule::default(),
            carve: CarveRule::default(),
            refresh_field: true,
        }
    }

    pub fn with_variant(mut self, variant: Variant) -> Self {
        self.variant = variant;
        self
    }

    pub fn with_timestep(mut self, timestep: f32) -> Self {
        self.timestep = timestep;
        self
    }

    pub fn with_max_substeps(mut self, max_substeps: u32) -> Self {
        self.max_substeps = max_substeps;
        self
    }

    /// Set the number of collision relaxations per sub-step.
    pub fn with_relaxation_iterations(mut self, iterations: u32) -> Self {
        self.relaxation_iterations = iterations;
        self
    }

    pub fn with_relaxation(mut self, relaxation: f32) -> Self {
        self.relaxation = relaxation;
        self
    }

    pub fn with_gravity(mut self, gravity: Vec2) -> Self {
        self.gravity = gravity;
        self
    }

    pub fn with_damping(mut self, damping: f32) -> Self {
        self.damping = damping;
        self
    }

    pub fn with_bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = bounds;
        self
    }

    /// Set the rest spacing. Cell size and particle diameter scale with it.
    pub fn with_particle_spacing(mut self, spacing: f32) -> Self {
        self.particle_spacing = spacing;
        self
    }

    pub fn with_query_radius(mut self, radius: u32) -> Self {
        self.query_radius = radius;
        self
    }

    pub fn with_emit_capacity(mut self, capacity: u32) -> Self {
        self.emit_capacity = capacity;
        self
    }

    pub fn with_explosion_capacity(mut self, capacity: u32) -> Self {
        self.explosion_capacity = capacity;
        self
    }

    pub fn with_emit_lifetime(mut self, seconds: f32) -> Self {
        self.emit_lifetime = seconds;
        self
    }

    pub fn with_terrain_friction(mut self, friction: f32) -> Self {
        self.terrain_friction = friction;
        self
    }

    pub fn with_debris_color(mut self, rgba: u32) -> Self {
        self.debris_color = rgba;
        self
    }

    pub fn with_settle(mut self, settle: SettleRule) -> Self {
        self.settle = settle;
        self
    }

    pub fn with_carve(mut self, carve: CarveRule) -> Self {
        self.carve = carve;
        self
    }

    pub fn with_field_refresh(mut self, refresh: bool) -> Self {
        self.refresh_field = refresh;
        self
    }

    /// Particle diameter, which is also the hash cell size and the minimum
    /// separation enforced by relaxation.
    pub fn cell_size(&self) -> f32 {
        self.particle_spacing * PACKING_CONSTANT
    }

    pub fn particle_radius(&self) -> f32 {
        self.cell_size() * 0.5
    }

    /// Check every parameter a system relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        dispatch::check_dispatch(self.capacity, PARTICLE_GROUP_SIZE)?;
        if !(self.timestep.is_finite() && self.timestep > 0.0) {
            return Err(ConfigError::InvalidTimestep(self.timestep));
        }
        if self.max_substeps == 0 {
            return Err(ConfigError::Invalid("max_substeps must be at least 1"));
        }
        if self.relaxation_iterations == 0 {
            return Err(ConfigError::Invalid(
                "relaxation_iterations must be at least 1",
            ));
        }
        if !(self.particle_spacing.is_finite() && self.particle_spacing > 0.0) {
            return Err(ConfigError::Invalid("particle_spacing must be positive"));
        }
        if self.emit_capacity == 0 || self.explosion_capacity == 0 {
            return Err(ConfigError::Invalid("emission queues need a non-zero capacity"));
        }
        if self.emit_lifetime <= 0.0 {
            return Err(ConfigError::Invalid("emit_lifetime must be positive"));
        }
        self.grid_layout()?;
        Ok(())
    }

    /// Spatial hash layout covering the bounds with diameter-sized cells.
    pub fn grid_layout(&self) -> Result<GridLayout, ConfigError> {
        GridLayout::new(self.bounds, self.cell_size())
    }

    /// Flags word for [`SimParams::flags`].
    pub fn flags(&self) -> u32 {
        let mut flags = 0;
        if self.variant.uses_hash() {
            flags |= FLAG_COLLIDE_PARTICLES;
        }
        if self.variant.couples_terrain() {
            flags |= FLAG_SETTLE;
            if self.settle.deposit_on_expire {
                flags |= FLAG_DEPOSIT_ON_EXPIRE;
            }
        }
        flags
    }

    /// Build the uniform block for a grid layout and terrain field.
    pub fn sim_params(&self, layout: &GridLayout, field: &FieldParams) -> SimParams {
        SimParams {
            gravity: self.gravity.to_array(),
            dt: self.timestep,
            damping: self.damping,
            hash_origin: layout.origin().to_array(),
            hash_inv_cell: layout.inv_cell_size(),
            radius: self.particle_radius(),
            hash_dims: layout.dims().to_array(),
            capacity: self.capacity,
            relaxation: self.relaxation,
            field_scale: field.scale.to_array(),
            field_dims: field.dims.to_array(),
            field_multiplier: field.multiplier,
            friction: self.terrain_friction,
            rest_speed: self.settle.rest_speed,
            rest_time: self.settle.rest_time,
            emit_lifetime: self.emit_lifetime,
            flags: self.flags(),
            query_radius: self.query_radius,
            _pad: [0; 3],
        }
    }
}

impl Default for DebrisConfig {
    fn default() -> Self {
        Self::new(1 << 16)
    }
}

/// Uniform block read by every simulation pass.
///
/// Field order and padding match the `SimParams` struct in the WGSL kernels.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct SimParams {
    pub gravity: [f32; 2],
    pub dt: f32,
    pub damping: f32,
    pub hash_origin: [f32; 2],
    pub hash_inv_cell: f32,
    pub radius: f32,
    pub hash_dims: [u32; 2],
    pub capacity: u32,
    pub relaxation: f32,
    /// `(1/w, 1/h, w, h)` of the terrain grid.
    pub field_scale: [f32; 4],
    pub field_dims: [u32; 2],
    pub field_multiplier: f32,
    pub friction: f32,
    pub rest_speed: f32,
    pub rest_time: f32,
    pub emit_lifetime: f32,
    pub flags: u32,
    pub query_radius: u32,
    pub _pad: [u32; 3],
}

impl SimParams {
    #[inline]
    pub fn has(&self, flag: u32) -> bool {
        self.flags & flag != 0
    }

    #[inline]
    pub fn gravity(&self) -> Vec2 {
        Vec2::from_array(self.gravity)
    }

    #[inline]
    pub fn field_scale(&self) -> Vec4 {
        Vec4::from_array(self.field_scale)
    }

    #[inline]
    pub fn field_dims(&self) -> UVec2 {
        UVec2::from_array(self.field_dims)
    }

    /// Minimum distance between two particle centers.
    #[inline]
    pub fn min_separation(&self) -> f32 {
        self.radius * 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sim_params_size_matches_wgsl() {
        assert_eq!(std::mem::size_of::<SimParams>(), 112);
        assert_eq!(std::mem::size_of::<SimParams>() % 16, 0);
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(DebrisConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_capacity() {
        let err = DebrisConfig::new(0).validate().unwrap_err();
        assert_eq!(err, ConfigError::ZeroCapacity);
    }

    #[test]
    fn test_rejects_bad_timestep() {
        let err = DebrisConfig::new(16).with_timestep(0.0).validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTimestep(_)));
        let err = DebrisConfig::new(16)
            .with_timestep(f32::NAN)
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTimestep(_)));
    }

    #[test]
    fn test_rejects_oversized_grid() {
        let err = DebrisConfig::new(16)
            .with_bounds(Bounds::centered(Vec2::splat(100_000.0)))
            .with_particle_spacing(0.5)
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConfigError::GridTooLarge { .. }));
    }

    #[test]
    fn test_cell_size_uses_packing_constant() {
        let config = DebrisConfig::new(16).with_particle_spacing(2.0);
        assert!((config.cell_size() - 2.0 * PACKING_CONSTANT).abs() < 1e-6);
        assert!((config.particle_radius() - PACKING_CONSTANT).abs() < 1e-6);
    }

    #[test]
    fn test_flags_follow_variant() {
        let simple = DebrisConfig::new(16).with_variant(Variant::Simple);
        assert_eq!(simple.flags(), 0);

        let coupled = DebrisConfig::new(16).with_variant(Variant::TerrainCoupled);
        let flags = coupled.flags();
        assert!(flags & FLAG_COLLIDE_PARTICLES != 0);
        assert!(flags & FLAG_SETTLE != 0);
        assert!(flags & FLAG_DEPOSIT_ON_EXPIRE != 0);
    }

    #[test]
    fn test_bounds_centered() {
        let bounds = Bounds::centered(Vec2::new(10.0, 4.0));
        assert_eq!(bounds.min, Vec2::new(-5.0, -2.0));
        assert_eq!(bounds.size(), Vec2::new(10.0, 4.0));
    }

    #[test]
    fn test_field_refresh_defaults_on() {
        assert!(DebrisConfig::default().refresh_field);
        assert!(!DebrisConfig::new(8).with_field_refresh(false).refresh_field);
    }
}
