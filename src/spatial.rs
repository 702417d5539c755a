//! Uniform-grid spatial hash for neighbour queries.
//!
//! The grid covers the simulation bounds with square cells one particle
//! diameter wide. A rebuild runs in two passes: count alive particles per
//! cell, exclusive-scan the counts into offsets, then scatter every particle
//! index into the slice of the index map that starts at its cell's offset.
//! Within a cell the order of indices is unspecified.

use std::sync::atomic::{AtomicU32, Ordering};

use glam::{IVec2, UVec2, Vec2};
use rayon::prelude::*;

use crate::config::Bounds;
use crate::dispatch::{MAX_GROUPS_PER_DIMENSION, PARTICLE_GROUP_SIZE, SCAN_BLOCK};
use crate::error::ConfigError;
use crate::pool::SlotMeta;

/// Ratio of hash cell size to particle spacing, `2/√π`.
///
/// A disc of this diameter has the same area as a square of side one, so a
/// lattice at unit spacing fills each cell with exactly one particle.
pub const PACKING_CONSTANT: f32 = 1.128_379_2;

/// Largest supported number of hash cells: what one scan dispatch can cover.
pub const MAX_GRID_CELLS: u64 = MAX_GROUPS_PER_DIMENSION as u64 * SCAN_BLOCK as u64;

/// Placement of the hash grid in world space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridLayout {
    origin: Vec2,
    cell_size: f32,
    dims: UVec2,
}

impl GridLayout {
    pub fn new(bounds: Bounds, cell_size: f32) -> Result<Self, ConfigError> {
        let size = bounds.size();
        if !(size.x > 0.0 && size.y > 0.0) {
            return Err(ConfigError::EmptyBounds);
        }
        if !(cell_size.is_finite() && cell_size > 0.0) {
            return Err(ConfigError::Invalid("hash cell size must be positive"));
        }

        let cells_x = (size.x / cell_size).ceil().max(1.0) as u64;
        let cells_y = (size.y / cell_size).ceil().max(1.0) as u64;
        let cells = cells_x * cells_y;
        if cells > MAX_GRID_CELLS {
            return Err(ConfigError::GridTooLarge {
                cells,
                max: MAX_GRID_CELLS,
            });
        }

        Ok(Self {
            origin: bounds.min,
            cell_size,
            dims: UVec2::new(cells_x as u32, cells_y as u32),
        })
    }

    #[inline]
    pub fn origin(&self) -> Vec2 {
        self.origin
    }

    #[inline]
    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    #[inline]
    pub fn inv_cell_size(&self) -> f32 {
        1.0 / self.cell_size
    }

    #[inline]
    pub fn dims(&self) -> UVec2 {
        self.dims
    }

    #[inline]
    pub fn cell_count(&self) -> u32 {
        self.dims.x * self.dims.y
    }

    /// Cell containing `p`, clamped to the grid.
    pub fn cell_coords(&self, p: Vec2) -> IVec2 {
        let c = ((p - self.origin) * self.inv_cell_size()).floor();
        // NaN positions land in cell (0, 0)
        let c = IVec2::new(c.x as i32, c.y as i32);
        c.clamp(IVec2::ZERO, self.dims.as_ivec2() - IVec2::ONE)
    }

    #[inline]
    pub fn flatten(&self, c: IVec2) -> u32 {
        c.y as u32 * self.dims.x + c.x as u32
    }

    #[inline]
    pub fn cell_index(&self, p: Vec2) -> u32 {
        self.flatten(self.cell_coords(p))
    }
}

/// Host spatial hash over a fixed particle capacity.
#[derive(Debug)]
pub struct GridHash {
    layout: GridLayout,
    query_radius: i32,
    counts: Vec<AtomicU32>,
    offsets: Vec<u32>,
    cursor: Vec<AtomicU32>,
    index_map: Vec<AtomicU32>,
}

impl GridHash {
    pub fn new(layout: GridLayout, capacity: u32, query_radius: u32) -> Self {
        let cells = layout.cell_count() as usize;
        Self {
            layout,
            query_radius: query_radius as i32,
            counts: (0..cells).map(|_| AtomicU32::new(0)).collect(),
            offsets: vec![0; cells],
            cursor: (0..cells).map(|_| AtomicU32::new(0)).collect(),
            index_map: (0..capacity).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    pub fn layout(&self) -> &GridLayout {
        &self.layout
    }

    /// Rebuild from the given positions, skipping slots that are not alive.
    pub fn rebuild(&mut self, positions: &[Vec2], meta: &[SlotMeta]) {
        let layout = self.layout;
        let group = PARTICLE_GROUP_SIZE as usize;

        self.counts
            .par_iter()
            .for_each(|c| c.store(0, Ordering::Relaxed));

        // Pass 1: count
        let counts = &self.counts;
        positions
            .par_chunks(group)
            .zip(meta.par_chunks(group))
            .for_each(|(ps, ms)| {
                for (p, m) in ps.iter().zip(ms) {
                    if m.is_alive() {
                        counts[layout.cell_index(*p) as usize].fetch_add(1, Ordering::Relaxed);
                    }
                }
            });

        // Exclusive scan
        let mut running = 0u32;
        for (offset, (count, cursor)) in self
            .offsets
            .iter_mut()
            .zip(self.counts.iter().zip(&self.cursor))
        {
            *offset = running;
            cursor.store(running, Ordering::Relaxed);
            running += count.load(Ordering::Relaxed);
        }

        // Pass 2: scatter
        let cursor = &self.cursor;
        let index_map = &self.index_map;
        positions
            .par_chunks(group)
            .zip(meta.par_chunks(group))
            .enumerate()
            .for_each(|(g, (ps, ms))| {
                for (local, (p, m)) in ps.iter().zip(ms).enumerate() {
                    if m.is_alive() {
                        let cell = layout.cell_index(*p) as usize;
                        let dst = cursor[cell].fetch_add(1, Ordering::Relaxed);
                        index_map[dst as usize].store((g * group + local) as u32, Ordering::Relaxed);
                    }
                }
            });
    }

    /// Indices stored in one cell.
    pub fn cell(&self, cell: u32) -> impl Iterator<Item = u32> + '_ {
        let start = self.offsets[cell as usize];
        let count = self.cell_len(cell);
        (start..start + count).map(move |i| self.index_map[i as usize].load(Ordering::Relaxed))
    }

    /// Number of indices stored in one cell.
    pub fn cell_len(&self, cell: u32) -> u32 {
        self.counts[cell as usize].load(Ordering::Relaxed)
    }

    /// Call `f` with every index in the neighbourhood of `p`, including the
    /// particle at `p` itself if it was hashed.
    pub fn for_each_neighbor(&self, p: Vec2, mut f: impl FnMut(u32)) {
        let center = self.layout.cell_coords(p);
        let max = self.layout.dims().as_ivec2() - IVec2::ONE;
        let r = self.query_radius;
        for dy in -r..=r {
            for dx in -r..=r {
                let c = center + IVec2::new(dx, dy);
                if c.x < 0 || c.y < 0 || c.x > max.x || c.y > max.y {
                    continue;
                }
                for j in self.cell(self.layout.flatten(c)) {
                    f(j);
                }
            }
        }
    }

    /// Total number of hashed particles.
    pub fn len(&self) -> u32 {
        self.counts.iter().map(|c| c.load(Ordering::Relaxed)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// WGSL helpers for mapping positions to hash cells.
///
/// Expects a `SimParams` uniform layout (see [`SimParams`](crate::config::SimParams)).
pub const GRID_WGSL: &str = r#"
fn cell_coords(p: vec2<f32>, origin: vec2<f32>, inv_cell: f32, dims: vec2<u32>) -> vec2<i32> {
    let c = vec2<i32>(floor((p - origin) * inv_cell));
    return clamp(c, vec2<i32>(0, 0), vec2<i32>(dims) - vec2<i32>(1, 1));
}

fn flatten_cell(c: vec2<i32>, dims: vec2<u32>) -> u32 {
    return u32(c.y) * dims.x + u32(c.x);
}
"#;
