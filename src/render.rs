//! Indirect draw arguments and the host draw call.
//!
//! The renderer never learns the live particle count on the CPU. After the
//! last finalize of a frame the alive counter is copied into the
//! `instance_count` word of a [`DrawArgs`] block and one indexed, instanced,
//! indirect draw of a unit quad covers every alive particle.

use bytemuck::{Pod, Zeroable};
use glam::Vec2;

use crate::pool::{AppendList, ParticlePool};

/// Index list of the unit quad drawn per particle.
pub const QUAD_INDICES: [u16; 6] = [0, 1, 2, 2, 1, 3];

/// Pack 8-bit channels into one RGBA8 word (red in the low byte).
#[inline]
pub const fn pack_rgba(r: u8, g: u8, b: u8, a: u8) -> u32 {
    r as u32 | (g as u32) << 8 | (b as u32) << 16 | (a as u32) << 24
}

/// Five-word indexed indirect draw block.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawArgs {
    pub index_count: u32,
    /// The only word rewritten per frame.
    pub instance_count: u32,
    pub first_index: u32,
    pub base_vertex: i32,
    pub first_instance: u32,
}

impl DrawArgs {
    /// Byte offset of `instance_count`, the destination of the alive count copy.
    pub const INSTANCE_COUNT_OFFSET: u64 = 4;

    pub fn quad() -> Self {
        Self {
            index_count: QUAD_INDICES.len() as u32,
            instance_count: 0,
            first_index: 0,
            base_vertex: 0,
            first_instance: 0,
        }
    }
}

/// Host-side indirect draw state.
#[derive(Debug, Clone)]
pub struct IndirectDraw {
    args: DrawArgs,
}

impl IndirectDraw {
    pub fn new() -> Self {
        Self {
            args: DrawArgs::quad(),
        }
    }

    /// Copy the alive count into the instance count.
    pub fn copy_count(&mut self, alive: &AppendList) {
        self.args.instance_count = alive.len();
    }

    pub fn args(&self) -> DrawArgs {
        self.args
    }

    /// The frame's single draw over the alive list.
    pub fn draw<'a>(&self, pool: &'a ParticlePool) -> DrawCall<'a> {
        DrawCall {
            args: self.args,
            pool,
        }
    }
}

impl Default for IndirectDraw {
    fn default() -> Self {
        Self::new()
    }
}

/// One indexed instanced draw, resolved on the host.
pub struct DrawCall<'a> {
    pub args: DrawArgs,
    pool: &'a ParticlePool,
}

impl DrawCall<'_> {
    /// Position and color of each instance, in alive-list order.
    pub fn instances(&self) -> impl Iterator<Item = (Vec2, u32)> + '_ {
        let bodies = self.pool.bodies();
        let meta = self.pool.meta();
        (0..self.args.instance_count)
            .filter_map(move |instance| self.pool.alive_list().get(instance))
            .map(move |slot| (bodies[slot as usize].position, meta[slot as usize].color))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emission::EmitRecord;

    #[test]
    fn test_draw_args_layout() {
        assert_eq!(std::mem::size_of::<DrawArgs>(), 20);
        let args = DrawArgs::quad();
        let words: &[u32] = bytemuck::cast_slice(std::slice::from_ref(&args));
        assert_eq!(words, &[6, 0, 0, 0, 0]);
    }

    #[test]
    fn test_pack_rgba_byte_order() {
        let packed = pack_rgba(255, 0, 128, 255);
        assert_eq!(packed, 0xff80_00ff);
        assert_eq!(packed.to_le_bytes(), [255, 0, 128, 255]);
    }

    #[test]
    fn test_copy_count_tracks_alive_list() {
        let mut pool = ParticlePool::new(8).unwrap();
        pool.spawn(&[EmitRecord::new(Vec2::ONE, Vec2::ZERO, 5)], 1.0);
        let slot = (0..8u32).find(|&i| !pool.meta()[i as usize].is_unused()).unwrap();
        pool.alive.append(slot);

        let mut draw = IndirectDraw::new();
        draw.copy_count(pool.alive_list());
        assert_eq!(draw.args().instance_count, 1);
        let instances: Vec<_> = draw.draw(&pool).instances().collect();
        assert_eq!(instances, vec![(Vec2::ONE, 5)]);
    }
}
