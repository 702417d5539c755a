//! # Debris
//!
//! GPU-resident debris particles for destructible 2D terrain.
//!
//! Explosions carve the terrain; every cell they empty becomes a particle
//! that flies, collides with the terrain and with other particles, and
//! eventually settles back into the terrain or expires. The whole lifecycle
//! runs on fixed-capacity buffers: particles are never allocated, they claim
//! slots from a dead pool and give them back.
//!
//! ## Quick Start
//!
//! ```ignore
//! use debris::prelude::*;
//!
//! let terrain = terrain::shared(TerrainField::from_fn(256, 256, |_, y| (y < 96).then_some(0xff3a5a8c))?);
//! let config = DebrisConfig::new(1 << 14).with_variant(Variant::TerrainCoupled);
//! let mut debris = CoupledDebris::new(config, terrain.clone())?;
//!
//! debris.emit_explosion(Vec2::new(0.0, -32.0), 12.0);
//! loop {
//!     // carves, steps, deposits and keeps the terrain's distance field current
//!     debris.update(frame_time);
//!     // redraw from debris.core().draw().draw(debris.core().pool())
//! }
//! ```
//!
//! ## Back-ends
//!
//! | Back-end | Type | Notes |
//! |----------|------|-------|
//! | Host | [`SimpleDebris`], [`SubsteppedDebris`], [`CoupledDebris`] | rayon, deterministic tests |
//! | Device | [`gpu::GpuDebris`] | wgpu compute, indirect dispatch and draw |
//!
//! Both implement [`DebrisSystem`] and share every data layout, so a frame
//! means the same thing on either side.
//!
//! ## Sub-stepping
//!
//! [`FixedStep`] turns frame time into a bounded number of fixed sub-steps.
//! Each one predicts positions, rebuilds the spatial hash, relaxes particle
//! and terrain contacts a fixed number of times, then finalizes velocities
//! and lifecycle.

pub mod config;
pub mod dispatch;
pub mod emission;
pub mod error;
pub mod gpu;
pub mod integrator;
pub mod pool;
pub mod render;
pub mod solver;
pub mod spatial;
pub mod system;
pub mod terrain;
pub mod time;

pub use bytemuck;
pub use glam::{Vec2, Vec4};

pub use config::{Bounds, CarveRule, DebrisConfig, SettleRule, SimParams, Variant};
pub use emission::{EmitBuffer, EmitQueue, EmitRecord, Explosion};
pub use error::{ConfigError, DebrisError, GpuError};
pub use pool::{Body, CounterArgs, ParticlePool, PoolCounts, SlotMeta};
pub use render::{pack_rgba, DrawArgs, IndirectDraw};
pub use spatial::{GridHash, GridLayout};
pub use system::{
    build, CoupledDebris, DebrisCore, DebrisSystem, HostVariant, SimpleDebris, StepReport, SubsteppedDebris,
};
pub use terrain::{DistanceField, SharedTerrain, TerrainField};
pub use time::{FixedStep, FrameClock};

/// Convenient re-exports for common usage.
///
/// ```ignore
/// use debris::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{Bounds, CarveRule, DebrisConfig, SettleRule, Variant};
    pub use crate::emission::{EmitBuffer, EmitRecord, Explosion};
    pub use crate::error::{ConfigError, DebrisError};
    pub use crate::gpu::{DebrisRenderer, GpuContext, GpuDebris, GpuEmitBuffer};
    pub use crate::pool::PoolCounts;
    pub use crate::render::pack_rgba;
    pub use crate::system::{build, CoupledDebris, DebrisSystem, HostVariant, SimpleDebris, SubsteppedDebris};
    pub use crate::terrain::{self, SharedTerrain, TerrainField};
    pub use crate::time::{FixedStep, FrameClock};
    pub use crate::{Vec2, Vec4};
}
