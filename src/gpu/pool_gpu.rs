//! Device-side particle pool.

use std::mem::size_of;

use crate::dispatch::particle_groups;
use crate::error::GpuError;
use crate::pool::{Body, CounterArgs, PoolCounts, SlotMeta};
use crate::render::DrawArgs;

use super::{bind_buffers, compute_pipeline, dispatch, shaders, storage_buffer, storage_buffer_init, GpuContext};

/// Word offsets into the counters buffer.
pub(crate) const DEAD_COUNTER: u64 = 0;
pub(crate) const ALIVE_COUNTER: u64 = 4;
pub(crate) const SETTLED_COUNTER: u64 = 8;

/// Particle state, lifecycle lists and their counters.
///
/// Bodies and predicted positions are double-buffered; the owner tracks which
/// half is current. The counters buffer holds `[dead, alive, settled, 0]` as
/// atomics, and each `*_args` buffer is a [`CounterArgs`] snapshot of one of
/// them.
pub struct PoolGpu {
    capacity: u32,
    pub bodies: [wgpu::Buffer; 2],
    pub predicted: [wgpu::Buffer; 2],
    pub meta: wgpu::Buffer,
    pub dead_list: wgpu::Buffer,
    pub alive_list: wgpu::Buffer,
    pub settle_list: wgpu::Buffer,
    pub counters: wgpu::Buffer,
    pub dead_args: wgpu::Buffer,
    pub settle_args: wgpu::Buffer,
    pub draw_args: wgpu::Buffer,
    init_pipeline: wgpu::ComputePipeline,
    init_bind_group: wgpu::BindGroup,
}

impl PoolGpu {
    pub fn new(device: &wgpu::Device, params_buffer: &wgpu::Buffer, capacity: u32) -> Self {
        let n = capacity as u64;
        let none = wgpu::BufferUsages::empty();

        let body_bytes = n * size_of::<Body>() as u64;
        let bodies = [
            storage_buffer(device, "Bodies A", body_bytes, none),
            storage_buffer(device, "Bodies B", body_bytes, none),
        ];
        let predicted_bytes = n * 8;
        let predicted = [
            storage_buffer(device, "Predicted A", predicted_bytes, none),
            storage_buffer(device, "Predicted B", predicted_bytes, none),
        ];
        let meta = storage_buffer(device, "Slot Meta", n * size_of::<SlotMeta>() as u64, none);
        let dead_list = storage_buffer(device, "Dead Pool", n * 4, none);
        let alive_list = storage_buffer(device, "Alive List", n * 4, none);
        let settle_list = storage_buffer(device, "Settle List", n * 4, none);

        let counters = storage_buffer(device, "Pool Counters", 16, none);
        let dead_args = storage_buffer_init(device, "Dead Args", &[CounterArgs::new(0)], none);
        let settle_args = storage_buffer_init(device, "Settle Args", &[CounterArgs::new(0)], none);
        let draw_args = storage_buffer_init(
            device,
            "Draw Args",
            &[DrawArgs::quad()],
            wgpu::BufferUsages::INDIRECT,
        );

        let init_pipeline = compute_pipeline(device, "Pool Init", &shaders::init_wgsl(), "main");
        let init_bind_group = bind_buffers(
            device,
            "Pool Init Bind Group",
            &init_pipeline,
            &[params_buffer, &meta, &dead_list, &counters],
        );

        Self {
            capacity,
            bodies,
            predicted,
            meta,
            dead_list,
            alive_list,
            settle_list,
            counters,
            dead_args,
            settle_args,
            draw_args,
            init_pipeline,
            init_bind_group,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Mark every slot unused and push every index onto the dead pool.
    pub fn encode_initialize(&self, encoder: &mut wgpu::CommandEncoder) {
        encoder.clear_buffer(&self.counters, 0, None);
        dispatch(
            encoder,
            "Pool Init",
            &self.init_pipeline,
            &self.init_bind_group,
            (particle_groups(self.capacity), 1),
        );
    }

    pub(crate) fn encode_snapshot_dead(&self, encoder: &mut wgpu::CommandEncoder) {
        encoder.copy_buffer_to_buffer(&self.counters, DEAD_COUNTER, &self.dead_args, 0, 4);
    }

    pub(crate) fn encode_snapshot_settled(&self, encoder: &mut wgpu::CommandEncoder) {
        encoder.copy_buffer_to_buffer(&self.counters, SETTLED_COUNTER, &self.settle_args, 0, 4);
    }

    /// Zero the alive and settled counters ahead of a finalize.
    pub(crate) fn encode_reset_lists(&self, encoder: &mut wgpu::CommandEncoder) {
        encoder.clear_buffer(&self.counters, ALIVE_COUNTER, Some(8));
    }

    /// Copy the alive count into the draw's instance count.
    pub(crate) fn encode_present(&self, encoder: &mut wgpu::CommandEncoder) {
        encoder.copy_buffer_to_buffer(
            &self.counters,
            ALIVE_COUNTER,
            &self.draw_args,
            DrawArgs::INSTANCE_COUNT_OFFSET,
            4,
        );
    }

    pub fn read_counts(&self, ctx: &GpuContext) -> Result<PoolCounts, GpuError> {
        let words: Vec<u32> = ctx.read_buffer(&self.counters, 3)?;
        Ok(PoolCounts {
            dead: words[0],
            alive: words[1],
            settled: words[2],
        })
    }

    pub fn read_bodies(&self, ctx: &GpuContext, index: usize) -> Result<Vec<Body>, GpuError> {
        ctx.read_buffer(&self.bodies[index], self.capacity as usize)
    }

    pub fn read_meta(&self, ctx: &GpuContext) -> Result<Vec<SlotMeta>, GpuError> {
        ctx.read_buffer(&self.meta, self.capacity as usize)
    }

    pub fn read_alive_list(&self, ctx: &GpuContext, count: u32) -> Result<Vec<u32>, GpuError> {
        ctx.read_buffer(&self.alive_list, count.min(self.capacity) as usize)
    }

    pub fn read_draw_args(&self, ctx: &GpuContext) -> Result<DrawArgs, GpuError> {
        let args: Vec<DrawArgs> = ctx.read_buffer(&self.draw_args, 1)?;
        Ok(args[0])
    }
}
