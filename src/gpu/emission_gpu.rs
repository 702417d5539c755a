//! Device emission buffers and the indirect emit pass.

use std::mem::size_of;
use std::sync::atomic::{AtomicU64, Ordering};

use bytemuck::{Pod, Zeroable};

use crate::dispatch::PARTICLE_GROUP_SIZE;
use crate::emission::EmitRecord;
use crate::error::GpuError;
use crate::pool::CounterArgs;

use super::pool_gpu::PoolGpu;
use super::{
    bind_buffers, compute_pipeline, dispatch, dispatch_indirect, shaders, storage_buffer,
    storage_buffer_init, uniform_buffer, GpuContext,
};

/// Uniform of the prepare-dispatch kernel.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub(crate) struct PrepareParams {
    pub capacity: u32,
    pub group_size: u32,
    pub _pad: [u32; 2],
}

impl PrepareParams {
    pub fn particles(capacity: u32) -> Self {
        Self {
            capacity,
            group_size: PARTICLE_GROUP_SIZE,
            _pad: [0; 2],
        }
    }
}

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(0);

/// Fixed-capacity [`EmitRecord`] buffer with its own atomic counter.
///
/// Any producer can fill it: the host through [`write`](Self::write), or a
/// kernel that appends records and bumps `counter`. The counter is never read
/// by the consumer directly, only through a snapshot.
pub struct GpuEmitBuffer {
    id: u64,
    capacity: u32,
    pub records: wgpu::Buffer,
    pub counter: wgpu::Buffer,
    /// Clamp applied when turning the counter into a dispatch size.
    limits: wgpu::Buffer,
}

impl GpuEmitBuffer {
    pub fn new(device: &wgpu::Device, label: &str, capacity: u32) -> Self {
        let records = storage_buffer(
            device,
            &format!("{label} Records"),
            capacity.max(1) as u64 * size_of::<EmitRecord>() as u64,
            wgpu::BufferUsages::empty(),
        );
        let counter = storage_buffer_init(
            device,
            &format!("{label} Counter"),
            &[0u32; 4],
            wgpu::BufferUsages::empty(),
        );
        let limits = uniform_buffer(device, &format!("{label} Limits"), &PrepareParams::particles(capacity));
        Self {
            id: NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed),
            capacity,
            records,
            counter,
            limits,
        }
    }

    /// Unique for the lifetime of the process. Keys cached bind groups.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Upload `records` (truncated to capacity) and set the counter to match.
    ///
    /// Takes effect at the start of the next submission.
    pub fn write(&self, queue: &wgpu::Queue, records: &[EmitRecord]) -> u32 {
        let n = records.len().min(self.capacity as usize);
        if n < records.len() {
            log::debug!("Emit buffer full, dropped {} record(s)", records.len() - n);
        }
        if n > 0 {
            queue.write_buffer(&self.records, 0, bytemuck::cast_slice(&records[..n]));
        }
        queue.write_buffer(&self.counter, 0, bytemuck::bytes_of(&(n as u32)));
        n as u32
    }

    pub fn encode_reset(&self, encoder: &mut wgpu::CommandEncoder) {
        encoder.clear_buffer(&self.counter, 0, None);
    }

    pub fn read_count(&self, ctx: &GpuContext) -> Result<u32, GpuError> {
        let words: Vec<u32> = ctx.read_buffer(&self.counter, 1)?;
        Ok(words[0])
    }

    pub fn read_records(&self, ctx: &GpuContext) -> Result<Vec<EmitRecord>, GpuError> {
        let count = self.read_count(ctx)?.min(self.capacity);
        ctx.read_buffer(&self.records, count as usize)
    }
}

/// Bind groups that tie one emission buffer to the pool.
pub(crate) struct EmitBindings {
    prepare: wgpu::BindGroup,
    /// Indexed by the current bodies half.
    emit: [wgpu::BindGroup; 2],
}

/// The prepare-dispatch and emit kernels plus the upload snapshot.
pub(crate) struct Emitter {
    emit_pipeline: wgpu::ComputePipeline,
    prepare_pipeline: wgpu::ComputePipeline,
    upload_args: wgpu::Buffer,
    emit_dispatch: wgpu::Buffer,
}

impl Emitter {
    pub fn new(device: &wgpu::Device) -> Self {
        Self {
            emit_pipeline: compute_pipeline(device, "Emit", &shaders::emit_wgsl(), "main"),
            prepare_pipeline: compute_pipeline(
                device,
                "Prepare Dispatch",
                &shaders::prepare_dispatch_wgsl(),
                "main",
            ),
            upload_args: storage_buffer_init(
                device,
                "Upload Args",
                &[CounterArgs::new(0)],
                wgpu::BufferUsages::empty(),
            ),
            emit_dispatch: storage_buffer_init(
                device,
                "Emit Dispatch",
                &[0u32, 1, 1, 0],
                wgpu::BufferUsages::INDIRECT,
            ),
        }
    }

    pub fn bind(
        &self,
        device: &wgpu::Device,
        params_buffer: &wgpu::Buffer,
        pool: &PoolGpu,
        uploads: &GpuEmitBuffer,
    ) -> EmitBindings {
        let prepare = self.bind_prepare(device, &uploads.limits, &self.upload_args, &self.emit_dispatch);
        let emit = [0, 1].map(|half| {
            bind_buffers(
                device,
                "Emit Bind Group",
                &self.emit_pipeline,
                &[
                    params_buffer,
                    &uploads.records,
                    &self.upload_args,
                    &pool.dead_args,
                    &pool.dead_list,
                    &pool.counters,
                    &pool.bodies[half],
                    &pool.meta,
                ],
            )
        });
        EmitBindings { prepare, emit }
    }

    /// Bind group that turns the count in `args` into three dispatch words in
    /// `dispatch_out`, clamped by `limits`.
    pub fn bind_prepare(
        &self,
        device: &wgpu::Device,
        limits: &wgpu::Buffer,
        args: &wgpu::Buffer,
        dispatch_out: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        bind_buffers(
            device,
            "Prepare Dispatch Bind Group",
            &self.prepare_pipeline,
            &[limits, args, dispatch_out],
        )
    }

    pub fn encode_prepare(&self, encoder: &mut wgpu::CommandEncoder, bind_group: &wgpu::BindGroup) {
        dispatch(encoder, "Prepare Dispatch", &self.prepare_pipeline, bind_group, (1, 1));
    }

    /// Snapshot both counters, size the dispatch on the device, then pop one
    /// dead slot per record.
    pub fn encode(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pool: &PoolGpu,
        uploads: &GpuEmitBuffer,
        bindings: &EmitBindings,
        half: usize,
    ) {
        encoder.copy_buffer_to_buffer(&uploads.counter, 0, &self.upload_args, 0, 4);
        pool.encode_snapshot_dead(encoder);
        self.encode_prepare(encoder, &bindings.prepare);
        dispatch_indirect(
            encoder,
            "Emit",
            &self.emit_pipeline,
            &bindings.emit[half],
            &self.emit_dispatch,
        );
    }

    /// The snapshot used by the most recent emission.
    pub fn read_upload_args(&self, ctx: &GpuContext) -> Result<CounterArgs, GpuError> {
        let args: Vec<CounterArgs> = ctx.read_buffer(&self.upload_args, 1)?;
        Ok(args[0])
    }
}
