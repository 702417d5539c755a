//! The wgpu implementation of [`DebrisSystem`].

use glam::Vec2;

use crate::config::{DebrisConfig, SimParams, Variant};
use crate::dispatch::{check_dispatch, particle_groups, PARTICLE_GROUP_SIZE, TERRAIN_TILE};
use crate::emission::{EmitQueue, EmitRecord, Explosion};
use crate::error::{ConfigError, DebrisError, GpuError};
use crate::pool::{Body, CounterArgs, PoolCounts};
use crate::system::{DebrisSystem, StepReport};
use crate::terrain::TerrainField;
use crate::time::FixedStep;

use super::emission_gpu::{EmitBindings, Emitter, GpuEmitBuffer, PrepareParams};
use super::hash_gpu::HashGpu;
use super::pool_gpu::PoolGpu;
use super::terrain_gpu::TerrainGpu;
use super::{bind_buffers, compute_pipeline, dispatch, shaders, storage_buffer_init, uniform_buffer, GpuContext};

/// Build one value per (bodies half, predicted half) pair.
fn per_half<T>(f: impl Fn(usize, usize) -> T) -> [[T; 2]; 2] {
    [0, 1].map(|b| [0, 1].map(|q| f(b, q)))
}

/// Debris simulation running entirely in device buffers.
///
/// Every variant is supported: the simple variant skips the hash rebuild and
/// relaxes once with particle collisions disabled, the coupled variant adds
/// carving before the frame and a deposit after every finalize.
///
/// With `refresh_field` set, a frame that carved regenerates the distance
/// field before stepping. That refresh reads occupancy back and blocks.
/// Deposited cells are not read back per frame; they join the field at the
/// next carve or at an explicit [`refresh_distance_field`](Self::refresh_distance_field).
pub struct GpuDebris {
    ctx: GpuContext,
    config: DebrisConfig,
    params: SimParams,
    params_buffer: wgpu::Buffer,

    pool: PoolGpu,
    hash: HashGpu,
    terrain: TerrainGpu,
    emitter: Emitter,
    direct: GpuEmitBuffer,
    direct_bindings: EmitBindings,
    carved_bindings: EmitBindings,
    /// Bindings of the last buffer passed to `emit_indirect`, by buffer id.
    indirect_bindings: Option<(u64, EmitBindings)>,

    predict_pipeline: wgpu::ComputePipeline,
    solve_pipeline: wgpu::ComputePipeline,
    finalize_pipeline: wgpu::ComputePipeline,
    predict_groups: [[wgpu::BindGroup; 2]; 2],
    solve_groups: [[wgpu::BindGroup; 2]; 2],
    finalize_groups: [[wgpu::BindGroup; 2]; 2],

    _settle_limits: wgpu::Buffer,
    settle_dispatch: wgpu::Buffer,
    settle_prepare: wgpu::BindGroup,
    deposit_groups: [wgpu::BindGroup; 2],

    stepper: FixedStep,
    emit_queue: EmitQueue<EmitRecord>,
    explosions: EmitQueue<Explosion>,
    body_half: usize,
    predicted_half: usize,
}

impl GpuDebris {
    pub fn new(ctx: &GpuContext, config: DebrisConfig, terrain: &TerrainField) -> Result<Self, ConfigError> {
        config.validate()?;
        check_dispatch(config.capacity, PARTICLE_GROUP_SIZE)?;
        check_dispatch(terrain.width(), TERRAIN_TILE)?;
        check_dispatch(terrain.height(), TERRAIN_TILE)?;

        let device = &ctx.device;
        let layout = config.grid_layout()?;
        let params = config.sim_params(&layout, &terrain.field_params());
        let params_buffer = uniform_buffer(device, "Sim Params", &params);
        let capacity = config.capacity;

        let pool = PoolGpu::new(device, &params_buffer, capacity);
        let hash = HashGpu::new(device, layout, capacity, &params_buffer, &pool.predicted, &pool.meta);
        let terrain_gpu = TerrainGpu::new(
            device,
            terrain,
            &config.carve,
            config.explosion_capacity,
            config.emit_capacity,
        );

        let emitter = Emitter::new(device);
        let direct = GpuEmitBuffer::new(device, "Direct Emit", config.emit_capacity);
        let direct_bindings = emitter.bind(device, &params_buffer, &pool, &direct);
        let carved_bindings = emitter.bind(device, &params_buffer, &pool, &terrain_gpu.carved);

        let predict_pipeline = compute_pipeline(device, "Predict", &shaders::predict_wgsl(), "main");
        let solve_pipeline = compute_pipeline(device, "Solve", &shaders::solve_wgsl(), "main");
        let finalize_pipeline = compute_pipeline(device, "Finalize", &shaders::finalize_wgsl(), "main");

        let predict_groups = per_half(|b, q| {
            bind_buffers(
                device,
                "Predict Bind Group",
                &predict_pipeline,
                &[&params_buffer, &pool.bodies[b], &pool.meta, &pool.predicted[1 - q]],
            )
        });
        let solve_groups = per_half(|b, q| {
            bind_buffers(
                device,
                "Solve Bind Group",
                &solve_pipeline,
                &[
                    &params_buffer,
                    &pool.predicted[q],
                    &pool.predicted[1 - q],
                    &pool.bodies[b],
                    &pool.meta,
                    &hash.cell_counts,
                    &hash.cell_offsets,
                    &hash.index_map,
                    &terrain_gpu.field,
                ],
            )
        });
        let finalize_groups = per_half(|b, q| {
            bind_buffers(
                device,
                "Finalize Bind Group",
                &finalize_pipeline,
                &[
                    &params_buffer,
                    &pool.predicted[q],
                    &pool.bodies[b],
                    &pool.bodies[1 - b],
                    &pool.meta,
                    &pool.dead_list,
                    &pool.alive_list,
                    &pool.settle_list,
                    &pool.counters,
                ],
            )
        });

        let settle_limits = uniform_buffer(device, "Settle Limits", &PrepareParams::particles(capacity));
        let settle_dispatch = storage_buffer_init(
            device,
            "Settle Dispatch",
            &[0u32, 1, 1, 0],
            wgpu::BufferUsages::INDIRECT,
        );
        let settle_prepare = emitter.bind_prepare(device, &settle_limits, &pool.settle_args, &settle_dispatch);
        let deposit_groups = [0, 1].map(|b| {
            terrain_gpu.bind_deposit(
                device,
                &pool.settle_args,
                &pool.settle_list,
                &pool.bodies[b],
                &pool.meta,
            )
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Debris Init"),
        });
        pool.encode_initialize(&mut encoder);
        ctx.queue.submit(Some(encoder.finish()));

        log::info!(
            "GPU debris: {} slots, {} variant, hash grid {}x{}, terrain {}x{}",
            capacity,
            config.variant.name(),
            layout.dims().x,
            layout.dims().y,
            terrain.width(),
            terrain.height()
        );

        Ok(Self {
            ctx: ctx.clone(),
            stepper: FixedStep::new(config.timestep, config.max_substeps),
            emit_queue: EmitQueue::new(config.emit_capacity as usize),
            explosions: EmitQueue::new(config.explosion_capacity as usize),
            config,
            params,
            params_buffer,
            pool,
            hash,
            terrain: terrain_gpu,
            emitter,
            direct,
            direct_bindings,
            carved_bindings,
            indirect_bindings: None,
            predict_pipeline,
            solve_pipeline,
            finalize_pipeline,
            predict_groups,
            solve_groups,
            finalize_groups,
            _settle_limits: settle_limits,
            settle_dispatch,
            settle_prepare,
            deposit_groups,
            body_half: 0,
            predicted_half: 0,
        })
    }

    /// Create a headless device and a system on it.
    pub fn headless(config: DebrisConfig, terrain: &TerrainField) -> Result<Self, DebrisError> {
        let ctx = GpuContext::headless()?;
        Ok(Self::new(&ctx, config, terrain)?)
    }

    pub fn context(&self) -> &GpuContext {
        &self.ctx
    }

    pub fn config(&self) -> &DebrisConfig {
        &self.config
    }

    pub fn params(&self) -> &SimParams {
        &self.params
    }

    pub fn pool(&self) -> &PoolGpu {
        &self.pool
    }

    pub fn hash(&self) -> &HashGpu {
        &self.hash
    }

    pub fn terrain(&self) -> &TerrainGpu {
        &self.terrain
    }

    /// Which half of the double-buffered bodies holds the committed state.
    pub fn body_half(&self) -> usize {
        self.body_half
    }

    pub fn bodies_buffer(&self) -> &wgpu::Buffer {
        &self.pool.bodies[self.body_half]
    }

    pub fn read_counts(&self) -> Result<PoolCounts, GpuError> {
        self.pool.read_counts(&self.ctx)
    }

    pub fn read_bodies(&self) -> Result<Vec<Body>, GpuError> {
        self.pool.read_bodies(&self.ctx, self.body_half)
    }

    /// Snapshot used by the most recent indirect emission.
    pub fn read_emit_args(&self) -> Result<CounterArgs, GpuError> {
        self.emitter.read_upload_args(&self.ctx)
    }

    /// Regenerate the device distance field from the current occupancy.
    pub fn refresh_distance_field(&self) -> Result<(), GpuError> {
        self.terrain.refresh_distance_field(&self.ctx).map(|_| ())
    }

    /// Carve every queued explosion and emit the emptied cells. Returns
    /// whether anything was carved.
    fn carve_queued(&mut self) -> bool {
        if !self.config.variant.couples_terrain() || self.explosions.is_empty() {
            return false;
        }
        let explosions = self.explosions.drain();
        self.terrain.write_explosions(&self.ctx.queue, &explosions);

        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Debris Carve"),
            });
        self.terrain.encode_carve(&mut encoder);
        self.emitter.encode(
            &mut encoder,
            &self.pool,
            &self.terrain.carved,
            &self.carved_bindings,
            self.body_half,
        );
        self.ctx.queue.submit(Some(encoder.finish()));
        true
    }

    fn flush_emits(&mut self, encoder: &mut wgpu::CommandEncoder) {
        if self.emit_queue.is_empty() {
            return;
        }
        let records = self.emit_queue.drain();
        self.direct.write(&self.ctx.queue, &records);
        self.emitter
            .encode(encoder, &self.pool, &self.direct, &self.direct_bindings, self.body_half);
    }

    fn encode_substep(&mut self, encoder: &mut wgpu::CommandEncoder) {
        let groups = (particle_groups(self.config.capacity), 1);
        let b = self.body_half;
        let mut q = self.predicted_half;

        dispatch(encoder, "Predict", &self.predict_pipeline, &self.predict_groups[b][q], groups);
        q = 1 - q;

        let iterations = if self.config.variant.uses_hash() {
            self.hash.encode_rebuild(encoder, q);
            self.config.relaxation_iterations
        } else {
            1
        };
        for _ in 0..iterations {
            dispatch(encoder, "Solve", &self.solve_pipeline, &self.solve_groups[b][q], groups);
            q = 1 - q;
        }

        self.pool.encode_reset_lists(encoder);
        dispatch(encoder, "Finalize", &self.finalize_pipeline, &self.finalize_groups[b][q], groups);
        self.body_half = 1 - b;
        self.predicted_half = q;

        if self.config.variant.couples_terrain() {
            self.pool.encode_snapshot_settled(encoder);
            self.emitter.encode_prepare(encoder, &self.settle_prepare);
            self.terrain.encode_deposit(
                encoder,
                &self.deposit_groups[self.body_half],
                &self.settle_dispatch,
            );
        }
    }
}

impl DebrisSystem for GpuDebris {
    type Uploads = GpuEmitBuffer;

    fn variant(&self) -> Variant {
        self.config.variant
    }

    fn update(&mut self, frame_time: f32) -> StepReport {
        if self.carve_queued() && self.config.refresh_field {
            if let Err(e) = self.refresh_distance_field() {
                log::warn!("Failed to refresh distance field after carve: {}", e);
            }
        }
        let substeps = self.stepper.advance(frame_time);

        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Debris Frame"),
            });
        self.flush_emits(&mut encoder);
        for _ in 0..substeps {
            self.encode_substep(&mut encoder);
        }
        self.pool.encode_present(&mut encoder);
        self.ctx.queue.submit(Some(encoder.finish()));

        StepReport { substeps }
    }

    fn emit(&mut self, position: Vec2, velocity: Vec2) -> bool {
        self.emit_queue
            .push(EmitRecord::new(position, velocity, self.config.debris_color))
    }

    fn emit_indirect(&mut self, uploads: &GpuEmitBuffer) {
        let bindings = match self.indirect_bindings.take() {
            Some((id, bindings)) if id == uploads.id() => bindings,
            _ => self
                .emitter
                .bind(&self.ctx.device, &self.params_buffer, &self.pool, uploads),
        };
        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Debris Emit Indirect"),
            });
        self.emitter
            .encode(&mut encoder, &self.pool, uploads, &bindings, self.body_half);
        self.ctx.queue.submit(Some(encoder.finish()));
        self.indirect_bindings = Some((uploads.id(), bindings));
    }

    fn emit_explosion(&mut self, position: Vec2, radius: f32) -> bool {
        if !self.config.variant.couples_terrain() {
            return false;
        }
        self.explosions.push(Explosion::new(position, radius))
    }

    fn destroy_terrain(&mut self) {
        self.carve_queued();
    }

    /// Synchronous debug readback of the device counters.
    ///
    /// Blocks until the queue is idle. A failed readback is logged and
    /// reported as all-zero counts; use [`GpuDebris::read_counts`] to see the
    /// error.
    fn counts(&self) -> PoolCounts {
        match self.read_counts() {
            Ok(counts) => counts,
            Err(e) => {
                log::warn!("Failed to read pool counters: {}", e);
                PoolCounts::default()
            }
        }
    }
}
