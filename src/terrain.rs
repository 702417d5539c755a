//! Destructible terrain grid and its signed distance field.
//!
//! The terrain is a `width`×`height` grid of occupancy values with one world
//! unit per cell, centered on the world origin. A cell is solid when its
//! occupancy is at least [`SOLID_THRESHOLD`]. Debris collides against a signed
//! distance field derived from the occupancy: positive outside solid cells,
//! negative inside, zero on the boundary.
//!
//! The terrain is owned elsewhere and shared with the simulation through a
//! [`SharedTerrain`] handle. The simulation only ever calls
//! [`TerrainField::carve`], [`TerrainField::deposit`] and, when
//! `DebrisConfig::refresh_field` is set, [`TerrainField::refresh_distance_field`]
//! on it. Edits mark the field dirty until the next refresh.

use std::sync::{Arc, RwLock};

use glam::{IVec2, UVec2, Vec2, Vec4};
use rayon::prelude::*;

use crate::config::CarveRule;
use crate::emission::{EmitBuffer, EmitRecord, Explosion};
use crate::error::ConfigError;
use crate::pool::AppendList;

/// Occupancy at or above which a cell counts as solid.
pub const SOLID_THRESHOLD: f32 = 0.5;

/// Terrain handle shared between its owner and a debris system.
pub type SharedTerrain = Arc<RwLock<TerrainField>>;

/// Wrap a terrain for sharing.
pub fn shared(terrain: TerrainField) -> SharedTerrain {
    Arc::new(RwLock::new(terrain))
}

/// How the distance field maps onto world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldParams {
    /// `(1/w, 1/h, w, h)` of the terrain grid.
    pub scale: Vec4,
    /// Distance field resolution.
    pub dims: UVec2,
    /// World units per distance field value unit.
    pub multiplier: f32,
}

impl FieldParams {
    pub fn new(terrain_size: UVec2, dims: UVec2) -> Self {
        let w = terrain_size.x as f32;
        let h = terrain_size.y as f32;
        Self {
            scale: Vec4::new(1.0 / w, 1.0 / h, w, h),
            dims,
            multiplier: w / dims.x as f32,
        }
    }
}

/// Signed distance field sampled bilinearly in world space.
#[derive(Debug, Clone)]
pub struct DistanceField {
    values: Vec<f32>,
    params: FieldParams,
}

impl DistanceField {
    /// Wrap values produced by an external generator.
    ///
    /// `values` are in field texels, row-major, bottom row first.
    pub fn from_values(
        values: Vec<f32>,
        dims: UVec2,
        terrain_size: UVec2,
    ) -> Result<Self, ConfigError> {
        let expected = (dims.x * dims.y) as usize;
        if values.len() != expected {
            return Err(ConfigError::BufferSize {
                name: "distance field",
                expected,
                actual: values.len(),
            });
        }
        Ok(Self {
            values,
            params: FieldParams::new(terrain_size, dims),
        })
    }

    /// Two-pass chamfer distance transform of an occupancy grid.
    ///
    /// `downsample` shrinks the field by an integer factor; each field texel
    /// takes the occupancy at the center of the terrain block it covers.
    pub fn from_occupancy(occupancy: &[f32], size: UVec2, downsample: u32) -> Self {
        let d = downsample.max(1);
        let dims = UVec2::new(size.x.div_ceil(d), size.y.div_ceil(d));
        let solid: Vec<bool> = (0..dims.y)
            .flat_map(|y| (0..dims.x).map(move |x| (x, y)))
            .map(|(x, y)| {
                let sx = (x * d + d / 2).min(size.x - 1);
                let sy = (y * d + d / 2).min(size.y - 1);
                occupancy[(sy * size.x + sx) as usize] >= SOLID_THRESHOLD
            })
            .collect();
        let empty: Vec<bool> = solid.iter().map(|s| !s).collect();

        let to_solid = chamfer(&solid, dims);
        let to_empty = chamfer(&empty, dims);
        let values = solid
            .iter()
            .zip(to_solid.iter().zip(&to_empty))
            .map(|(&s, (&ds, &de))| if s { 0.5 - de } else { ds - 0.5 })
            .collect();

        Self {
            values,
            params: FieldParams::new(size, dims),
        }
    }

    pub fn params(&self) -> FieldParams {
        self.params
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn dims(&self) -> UVec2 {
        self.params.dims
    }

    fn texel(&self, c: IVec2) -> f32 {
        let max = self.params.dims.as_ivec2() - IVec2::ONE;
        let c = c.clamp(IVec2::ZERO, max);
        self.values[(c.y * self.params.dims.x as i32 + c.x) as usize]
    }

    /// Bilinear signed distance at `p`, in world units.
    pub fn sample(&self, p: Vec2) -> f32 {
        let scale = self.params.scale;
        let uv = p * Vec2::new(scale.x, scale.y) + Vec2::splat(0.5);
        let t = uv * self.params.dims.as_vec2() - Vec2::splat(0.5);
        let base = t.floor();
        let f = t - base;
        let i = IVec2::new(base.x as i32, base.y as i32);

        let v00 = self.texel(i);
        let v10 = self.texel(i + IVec2::X);
        let v01 = self.texel(i + IVec2::Y);
        let v11 = self.texel(i + IVec2::ONE);
        let bottom = v00 + (v10 - v00) * f.x;
        let top = v01 + (v11 - v01) * f.x;
        (bottom + (top - bottom) * f.y) * self.params.multiplier
    }

    /// Unit direction of increasing distance at `p`. Points up where flat.
    pub fn gradient(&self, p: Vec2) -> Vec2 {
        let h = self.params.multiplier;
        let g = Vec2::new(
            self.sample(p + Vec2::new(h, 0.0)) - self.sample(p - Vec2::new(h, 0.0)),
            self.sample(p + Vec2::new(0.0, h)) - self.sample(p - Vec2::new(0.0, h)),
        );
        if g.length_squared() < 1e-12 {
            Vec2::Y
        } else {
            g.normalize()
        }
    }
}

/// Distance in cells from every cell to the nearest seed cell.
fn chamfer(seed: &[bool], dims: UVec2) -> Vec<f32> {
    const DIAG: f32 = std::f32::consts::SQRT_2;
    let w = dims.x as usize;
    let h = dims.y as usize;
    let far = (w + h) as f32 * 2.0;
    let mut d: Vec<f32> = seed.iter().map(|&s| if s { 0.0 } else { far }).collect();

    for y in 0..h {
        for x in 0..w {
            let mut best = d[y * w + x];
            if x > 0 {
                best = best.min(d[y * w + x - 1] + 1.0);
            }
            if y > 0 {
                best = best.min(d[(y - 1) * w + x] + 1.0);
                if x > 0 {
                    best = best.min(d[(y - 1) * w + x - 1] + DIAG);
                }
                if x + 1 < w {
                    best = best.min(d[(y - 1) * w + x + 1] + DIAG);
                }
            }
            d[y * w + x] = best;
        }
    }
    for y in (0..h).rev() {
        for x in (0..w).rev() {
            let mut best = d[y * w + x];
            if x + 1 < w {
                best = best.min(d[y * w + x + 1] + 1.0);
            }
            if y + 1 < h {
                best = best.min(d[(y + 1) * w + x] + 1.0);
                if x + 1 < w {
                    best = best.min(d[(y + 1) * w + x + 1] + DIAG);
                }
                if x > 0 {
                    best = best.min(d[(y + 1) * w + x - 1] + DIAG);
                }
            }
            d[y * w + x] = best;
        }
    }
    d
}

/// Occupancy removed from and outward push applied to a cell by a set of
/// explosions.
fn blast(center: Vec2, explosions: &[Explosion]) -> (f32, Vec2) {
    let mut falloff_sum = 0.0;
    let mut push = Vec2::ZERO;
    for e in explosions {
        let d = center - e.position;
        let d2 = d.length_squared();
        let r2 = e.radius * e.radius;
        if d2 < r2 {
            let falloff = 1.0 - d2 / r2;
            falloff_sum += falloff;
            push += d.normalize_or_zero() * falloff;
        }
    }
    (falloff_sum, push)
}

/// Occupancy and color grid of the destructible terrain.
#[derive(Debug, Clone)]
pub struct TerrainField {
    size: UVec2,
    occupancy: Vec<f32>,
    colors: Vec<u32>,
    field: DistanceField,
    field_downsample: u32,
    dirty: bool,
}

impl TerrainField {
    /// Empty terrain.
    pub fn new(width: u32, height: u32) -> Result<Self, ConfigError> {
        Self::from_fn(width, height, |_, _| None)
    }

    /// Terrain whose cell `(x, y)` is solid with the returned color, or empty
    /// for `None`. Row 0 is the bottom of the world.
    pub fn from_fn(
        width: u32,
        height: u32,
        cell: impl Fn(u32, u32) -> Option<u32>,
    ) -> Result<Self, ConfigError> {
        if width == 0 || height == 0 {
            return Err(ConfigError::Invalid("terrain dimensions must be non-zero"));
        }
        let size = UVec2::new(width, height);
        let mut occupancy = Vec::with_capacity((width * height) as usize);
        let mut colors = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            for x in 0..width {
                match cell(x, y) {
                    Some(color) => {
                        occupancy.push(1.0);
                        colors.push(color);
                    }
                    None => {
                        occupancy.push(0.0);
                        colors.push(0);
                    }
                }
            }
        }
        let field = DistanceField::from_occupancy(&occupancy, size, 1);
        Ok(Self {
            size,
            occupancy,
            colors,
            field,
            field_downsample: 1,
            dirty: false,
        })
    }

    /// Generate the distance field at `1/factor` of the terrain resolution.
    pub fn with_field_downsample(mut self, factor: u32) -> Self {
        self.field_downsample = factor.max(1);
        self.refresh_distance_field();
        self
    }

    pub fn field_downsample(&self) -> u32 {
        self.field_downsample
    }

    pub fn width(&self) -> u32 {
        self.size.x
    }

    pub fn height(&self) -> u32 {
        self.size.y
    }

    pub fn size(&self) -> UVec2 {
        self.size
    }

    /// World position of the corner of cell `(0, 0)`.
    pub fn origin(&self) -> Vec2 {
        -self.size.as_vec2() * 0.5
    }

    pub fn cell_center(&self, x: u32, y: u32) -> Vec2 {
        self.origin() + Vec2::new(x as f32 + 0.5, y as f32 + 0.5)
    }

    /// Cell containing world position `p`, or `None` outside the grid.
    pub fn world_to_cell(&self, p: Vec2) -> Option<UVec2> {
        let local = (p - self.origin()).floor();
        if local.x < 0.0 || local.y < 0.0 {
            return None;
        }
        let c = UVec2::new(local.x as u32, local.y as u32);
        (c.x < self.size.x && c.y < self.size.y).then_some(c)
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> usize {
        (y * self.size.x + x) as usize
    }

    pub fn occupancy(&self, x: u32, y: u32) -> f32 {
        self.occupancy[self.index(x, y)]
    }

    pub fn is_solid(&self, x: u32, y: u32) -> bool {
        self.occupancy(x, y) >= SOLID_THRESHOLD
    }

    pub fn color(&self, x: u32, y: u32) -> u32 {
        self.colors[self.index(x, y)]
    }

    pub fn occupancy_values(&self) -> &[f32] {
        &self.occupancy
    }

    pub fn color_values(&self) -> &[u32] {
        &self.colors
    }

    pub fn solid_count(&self) -> usize {
        self.occupancy
            .iter()
            .filter(|&&o| o >= SOLID_THRESHOLD)
            .count()
    }

    pub fn set_cell(&mut self, x: u32, y: u32, occupancy: f32, color: u32) {
        let i = self.index(x, y);
        self.occupancy[i] = occupancy;
        self.colors[i] = color;
        self.dirty = true;
    }

    pub fn field(&self) -> &DistanceField {
        &self.field
    }

    pub fn field_params(&self) -> FieldParams {
        self.field.params()
    }

    /// Whether carving or deposition changed occupancy since the last refresh.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Regenerate the distance field from the current occupancy.
    pub fn refresh_distance_field(&mut self) {
        self.field = DistanceField::from_occupancy(&self.occupancy, self.size, self.field_downsample);
        self.dirty = false;
    }

    /// Replace the distance field with one produced elsewhere.
    pub fn set_distance_field(&mut self, field: DistanceField) -> Result<(), ConfigError> {
        let expected = FieldParams::new(self.size, field.dims());
        if field.params() != expected {
            return Err(ConfigError::Invalid(
                "distance field does not match the terrain size",
            ));
        }
        self.field = field;
        self.dirty = false;
        Ok(())
    }

    /// Carve occupancy around each explosion.
    ///
    /// Every cell that goes from solid to empty appends one record to `out`
    /// with the cell center, an outward velocity and the cell color. Cells
    /// carved after `out` is full are still carved but not recorded.
    /// Returns the number of cells that went from solid to empty.
    pub fn carve(&mut self, explosions: &[Explosion], rule: &CarveRule, out: &mut EmitBuffer) -> u32 {
        if explosions.is_empty() {
            return 0;
        }
        let width = self.size.x as usize;
        let origin = self.origin();
        let carved = AppendList::new(out.capacity() - out.len());
        let strength = rule.strength;

        let (touched, emptied) = self
            .occupancy
            .par_chunks_mut(width)
            .enumerate()
            .map(|(y, row)| {
                let mut touched = 0u32;
                let mut emptied = 0u32;
                for (x, occ) in row.iter_mut().enumerate() {
                    let center = origin + Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
                    let (falloff, _) = blast(center, explosions);
                    if falloff <= 0.0 {
                        continue;
                    }
                    let old = *occ;
                    let new = (old - falloff * strength).max(0.0);
                    *occ = new;
                    touched += 1;
                    if old >= SOLID_THRESHOLD && new < SOLID_THRESHOLD {
                        emptied += 1;
                        carved.append((y * width + x) as u32);
                    }
                }
                (touched, emptied)
            })
            .reduce(|| (0, 0), |a, b| (a.0 + b.0, a.1 + b.1));

        let cells = carved.to_vec();
        let colors = &self.colors;
        let speed = rule.speed;
        out.reserve(cells.len() as u32)
            .par_iter_mut()
            .zip(cells.par_iter())
            .for_each(|(record, &cell)| {
                let x = cell as usize % width;
                let y = cell as usize / width;
                let center = origin + Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
                let (_, push) = blast(center, explosions);
                *record = EmitRecord::new(center, push * speed, colors[cell as usize]);
            });

        if touched > 0 {
            self.dirty = true;
        }
        log::debug!(
            "Carved {} explosion(s): {} cells touched, {} emptied, {} recorded",
            explosions.len(),
            touched,
            emptied,
            cells.len()
        );
        emptied
    }

    /// Write settled particles back into the terrain as solid cells.
    ///
    /// Particles outside the grid are dropped. Returns how many were written.
    pub fn deposit(&mut self, settlers: impl IntoIterator<Item = (Vec2, u32)>) -> u32 {
        let mut written = 0;
        for (p, color) in settlers {
            if let Some(c) = self.world_to_cell(p) {
                let i = self.index(c.x, c.y);
                self.occupancy[i] = 1.0;
                self.colors[i] = color;
                written += 1;
            }
        }
        if written > 0 {
            self.dirty = true;
        }
        written
    }
}
