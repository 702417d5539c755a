//! Device copy of the destructible terrain.
//!
//! Holds occupancy, colors and the distance field the solver samples, and
//! runs the two kernels that edit them: carve (one thread per cell, 8×8
//! tiles) and deposit (one thread per settled particle, dispatched
//! indirectly from the settle snapshot).

use bytemuck::{Pod, Zeroable};
use glam::UVec2;

use crate::config::CarveRule;
use crate::dispatch::terrain_tiles;
use crate::emission::Explosion;
use crate::error::{ConfigError, GpuError};
use crate::terrain::{DistanceField, FieldParams, TerrainField};

use super::emission_gpu::GpuEmitBuffer;
use super::{
    bind_buffers, compute_pipeline, dispatch, dispatch_indirect, shaders, storage_buffer,
    storage_buffer_init, uniform_buffer, GpuContext,
};

/// Uniform shared by the carve and deposit kernels.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct TerrainParams {
    pub size: [u32; 2],
    pub explosion_count: u32,
    pub carve_strength: f32,
    pub carve_speed: f32,
    pub record_capacity: u32,
    pub _pad: [u32; 2],
}

impl TerrainParams {
    /// Byte offset of `explosion_count`, rewritten before every carve.
    const EXPLOSION_COUNT_OFFSET: u64 = 8;

    pub fn new(size: UVec2, carve: &CarveRule, record_capacity: u32) -> Self {
        Self {
            size: size.to_array(),
            explosion_count: 0,
            carve_strength: carve.strength,
            carve_speed: carve.speed,
            record_capacity,
            _pad: [0; 2],
        }
    }
}

pub struct TerrainGpu {
    size: UVec2,
    field_params: FieldParams,
    field_downsample: u32,
    explosion_capacity: u32,
    pub occupancy: wgpu::Buffer,
    pub colors: wgpu::Buffer,
    pub field: wgpu::Buffer,
    params: wgpu::Buffer,
    explosions: wgpu::Buffer,
    /// Records of cells emptied by the last carve.
    pub carved: GpuEmitBuffer,
    carve_pipeline: wgpu::ComputePipeline,
    carve_bind_group: wgpu::BindGroup,
    deposit_pipeline: wgpu::ComputePipeline,
}

impl TerrainGpu {
    pub fn new(
        device: &wgpu::Device,
        terrain: &TerrainField,
        carve: &CarveRule,
        explosion_capacity: u32,
        record_capacity: u32,
    ) -> Self {
        let size = terrain.size();
        let none = wgpu::BufferUsages::empty();

        let occupancy = storage_buffer_init(device, "Terrain Occupancy", terrain.occupancy_values(), none);
        let colors = storage_buffer_init(device, "Terrain Colors", terrain.color_values(), none);
        let field = storage_buffer_init(device, "Distance Field", terrain.field().values(), none);
        let params = uniform_buffer(
            device,
            "Terrain Params",
            &TerrainParams::new(size, carve, record_capacity),
        );
        let explosions = storage_buffer(
            device,
            "Explosions",
            explosion_capacity.max(1) as u64 * 16,
            none,
        );
        let carved = GpuEmitBuffer::new(device, "Carved", record_capacity);

        let carve_pipeline = compute_pipeline(device, "Terrain Carve", &shaders::carve_wgsl(), "main");
        let carve_bind_group = bind_buffers(
            device,
            "Terrain Carve Bind Group",
            &carve_pipeline,
            &[&params, &explosions, &occupancy, &colors, &carved.records, &carved.counter],
        );
        let deposit_pipeline =
            compute_pipeline(device, "Terrain Deposit", &shaders::deposit_wgsl(), "main");

        Self {
            size,
            field_params: terrain.field_params(),
            field_downsample: terrain.field_downsample(),
            explosion_capacity,
            occupancy,
            colors,
            field,
            params,
            explosions,
            carved,
            carve_pipeline,
            carve_bind_group,
            deposit_pipeline,
        }
    }

    pub fn size(&self) -> UVec2 {
        self.size
    }

    pub fn field_params(&self) -> FieldParams {
        self.field_params
    }

    /// Replace the device distance field. Its resolution is fixed at creation.
    pub fn upload_field(&self, queue: &wgpu::Queue, field: &DistanceField) -> Result<(), ConfigError> {
        if field.params() != self.field_params {
            return Err(ConfigError::BufferSize {
                name: "distance field",
                expected: (self.field_params.dims.x * self.field_params.dims.y) as usize,
                actual: field.values().len(),
            });
        }
        queue.write_buffer(&self.field, 0, bytemuck::cast_slice(field.values()));
        Ok(())
    }

    /// Read occupancy back, regenerate the distance field on the host and
    /// upload it.
    pub fn refresh_distance_field(&self, ctx: &GpuContext) -> Result<DistanceField, GpuError> {
        let occupancy = self.read_occupancy(ctx)?;
        let field = DistanceField::from_occupancy(&occupancy, self.size, self.field_downsample);
        ctx.queue
            .write_buffer(&self.field, 0, bytemuck::cast_slice(field.values()));
        Ok(field)
    }

    /// Stage `explosions` for the next carve. Extra explosions are dropped.
    pub(crate) fn write_explosions(&self, queue: &wgpu::Queue, explosions: &[Explosion]) -> u32 {
        let n = explosions.len().min(self.explosion_capacity as usize);
        let encoded: Vec<[f32; 4]> = explosions[..n].iter().map(|e| e.to_vec4().to_array()).collect();
        if n > 0 {
            queue.write_buffer(&self.explosions, 0, bytemuck::cast_slice(&encoded));
        }
        queue.write_buffer(
            &self.params,
            TerrainParams::EXPLOSION_COUNT_OFFSET,
            bytemuck::bytes_of(&(n as u32)),
        );
        n as u32
    }

    /// Reset the carved counter and carve every staged explosion.
    pub(crate) fn encode_carve(&self, encoder: &mut wgpu::CommandEncoder) {
        self.carved.encode_reset(encoder);
        dispatch(
            encoder,
            "Terrain Carve",
            &self.carve_pipeline,
            &self.carve_bind_group,
            terrain_tiles(self.size.x, self.size.y),
        );
    }

    pub(crate) fn bind_deposit(
        &self,
        device: &wgpu::Device,
        settle_args: &wgpu::Buffer,
        settle_list: &wgpu::Buffer,
        bodies: &wgpu::Buffer,
        meta: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        bind_buffers(
            device,
            "Terrain Deposit Bind Group",
            &self.deposit_pipeline,
            &[&self.params, settle_args, settle_list, bodies, meta, &self.occupancy, &self.colors],
        )
    }

    pub(crate) fn encode_deposit(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        bind_group: &wgpu::BindGroup,
        dispatch_args: &wgpu::Buffer,
    ) {
        dispatch_indirect(encoder, "Terrain Deposit", &self.deposit_pipeline, bind_group, dispatch_args);
    }

    pub fn read_occupancy(&self, ctx: &GpuContext) -> Result<Vec<f32>, GpuError> {
        ctx.read_buffer(&self.occupancy, (self.size.x * self.size.y) as usize)
    }

    pub fn read_colors(&self, ctx: &GpuContext) -> Result<Vec<u32>, GpuError> {
        ctx.read_buffer(&self.colors, (self.size.x * self.size.y) as usize)
    }
}
