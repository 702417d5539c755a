//! GPU spatial hash.
//!
//! Counting sort by cell: count alive particles per cell, exclusive-scan the
//! counts into offsets, copy the offsets into a cursor buffer and scatter
//! every alive index through it. The scan runs over as many levels of
//! 256-element blocks as the cell count needs.

use bytemuck::{Pod, Zeroable};

use crate::dispatch::{particle_groups, scan_blocks};
use crate::error::GpuError;
use crate::spatial::GridLayout;

use super::{bind_buffers, compute_pipeline, dispatch, shaders, storage_buffer, uniform_buffer, GpuContext};

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct ScanParams {
    count: u32,
    _pad: [u32; 3],
}

/// One level of the hierarchical scan.
struct ScanLevel {
    len: u32,
    scan_bind_group: wgpu::BindGroup,
    add_bind_group: wgpu::BindGroup,
}

/// Device buffers and passes of the spatial hash.
pub struct HashGpu {
    layout: GridLayout,
    capacity: u32,
    pub cell_counts: wgpu::Buffer,
    pub cell_offsets: wgpu::Buffer,
    cell_cursor: wgpu::Buffer,
    pub index_map: wgpu::Buffer,
    // Kept alive for the scan bind groups.
    _block_sums: Vec<wgpu::Buffer>,
    _scan_params: Vec<wgpu::Buffer>,
    levels: Vec<ScanLevel>,
    count_pipeline: wgpu::ComputePipeline,
    scatter_pipeline: wgpu::ComputePipeline,
    scan_pipeline: wgpu::ComputePipeline,
    add_pipeline: wgpu::ComputePipeline,
    /// Indexed by the predicted half being hashed.
    count_bind_groups: [wgpu::BindGroup; 2],
    scatter_bind_groups: [wgpu::BindGroup; 2],
}

impl HashGpu {
    pub fn new(
        device: &wgpu::Device,
        layout: GridLayout,
        capacity: u32,
        params_buffer: &wgpu::Buffer,
        predicted: &[wgpu::Buffer; 2],
        meta: &wgpu::Buffer,
    ) -> Self {
        let cells = layout.cell_count();
        let cell_bytes = cells as u64 * 4;
        let none = wgpu::BufferUsages::empty();

        let cell_counts = storage_buffer(device, "Cell Counts", cell_bytes, none);
        let cell_offsets = storage_buffer(device, "Cell Offsets", cell_bytes, none);
        let cell_cursor = storage_buffer(device, "Cell Cursor", cell_bytes, none);
        let index_map = storage_buffer(device, "Index Map", capacity as u64 * 4, none);

        let count_pipeline = compute_pipeline(device, "Hash Count", &shaders::hash_count_wgsl(), "main");
        let scatter_pipeline =
            compute_pipeline(device, "Hash Scatter", &shaders::hash_scatter_wgsl(), "main");
        let scan_pipeline = compute_pipeline(device, "Scan Blocks", shaders::SCAN_WGSL, "scan_blocks");
        let add_pipeline =
            compute_pipeline(device, "Add Block Offsets", shaders::SCAN_WGSL, "add_block_offsets");

        // Level 0 scans the offsets in place; each further level scans the
        // block totals of the one below until a single block remains.
        let mut lens = Vec::new();
        let mut block_sums = Vec::new();
        let mut len = cells;
        loop {
            let blocks = scan_blocks(len);
            lens.push(len);
            block_sums.push(storage_buffer(device, "Scan Block Sums", blocks as u64 * 4, none));
            if blocks <= 1 {
                break;
            }
            len = blocks;
        }

        let mut scan_params = Vec::with_capacity(lens.len());
        let mut levels = Vec::with_capacity(lens.len());
        for (level, &len) in lens.iter().enumerate() {
            let data = if level == 0 { &cell_offsets } else { &block_sums[level - 1] };
            let params = uniform_buffer(device, "Scan Params", &ScanParams { count: len, _pad: [0; 3] });
            levels.push(ScanLevel {
                len,
                scan_bind_group: bind_buffers(
                    device,
                    "Scan Blocks Bind Group",
                    &scan_pipeline,
                    &[&params, data, &block_sums[level]],
                ),
                add_bind_group: bind_buffers(
                    device,
                    "Add Block Offsets Bind Group",
                    &add_pipeline,
                    &[&params, data, &block_sums[level]],
                ),
            });
            scan_params.push(params);
        }

        let count_bind_groups = [0, 1].map(|half| {
            bind_buffers(
                device,
                "Hash Count Bind Group",
                &count_pipeline,
                &[params_buffer, &predicted[half], meta, &cell_counts],
            )
        });
        let scatter_bind_groups = [0, 1].map(|half| {
            bind_buffers(
                device,
                "Hash Scatter Bind Group",
                &scatter_pipeline,
                &[params_buffer, &predicted[half], meta, &cell_cursor, &index_map],
            )
        });

        log::debug!(
            "GPU hash: {} cells, {} scan level(s)",
            cells,
            levels.len()
        );

        Self {
            layout,
            capacity,
            cell_counts,
            cell_offsets,
            cell_cursor,
            index_map,
            _block_sums: block_sums,
            _scan_params: scan_params,
            levels,
            count_pipeline,
            scatter_pipeline,
            scan_pipeline,
            add_pipeline,
            count_bind_groups,
            scatter_bind_groups,
        }
    }

    pub fn layout(&self) -> &GridLayout {
        &self.layout
    }

    /// Rebuild from the predicted half `half`.
    pub fn encode_rebuild(&self, encoder: &mut wgpu::CommandEncoder, half: usize) {
        let cell_bytes = self.layout.cell_count() as u64 * 4;
        let groups = particle_groups(self.capacity);

        encoder.clear_buffer(&self.cell_counts, 0, None);
        dispatch(
            encoder,
            "Hash Count",
            &self.count_pipeline,
            &self.count_bind_groups[half],
            (groups, 1),
        );

        encoder.copy_buffer_to_buffer(&self.cell_counts, 0, &self.cell_offsets, 0, cell_bytes);
        for level in &self.levels {
            dispatch(
                encoder,
                "Scan Blocks",
                &self.scan_pipeline,
                &level.scan_bind_group,
                (scan_blocks(level.len), 1),
            );
        }
        // The top level is a single block and needs no offsets added.
        for level in self.levels.iter().rev().skip(1) {
            dispatch(
                encoder,
                "Add Block Offsets",
                &self.add_pipeline,
                &level.add_bind_group,
                (scan_blocks(level.len), 1),
            );
        }
        encoder.copy_buffer_to_buffer(&self.cell_offsets, 0, &self.cell_cursor, 0, cell_bytes);

        dispatch(
            encoder,
            "Hash Scatter",
            &self.scatter_pipeline,
            &self.scatter_bind_groups[half],
            (groups, 1),
        );
    }

    pub fn read_counts(&self, ctx: &GpuContext) -> Result<Vec<u32>, GpuError> {
        ctx.read_buffer(&self.cell_counts, self.layout.cell_count() as usize)
    }

    pub fn read_offsets(&self, ctx: &GpuContext) -> Result<Vec<u32>, GpuError> {
        ctx.read_buffer(&self.cell_offsets, self.layout.cell_count() as usize)
    }

    pub fn read_index_map(&self, ctx: &GpuContext, count: u32) -> Result<Vec<u32>, GpuError> {
        ctx.read_buffer(&self.index_map, count.min(self.capacity) as usize)
    }
}
