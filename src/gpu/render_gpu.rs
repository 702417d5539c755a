//! Indirect particle renderer.
//!
//! One `draw_indexed_indirect` per frame. The vertex shader looks up the slot
//! through the alive list by instance index and expands a unit quad around
//! the particle; the instance count comes from the draw args written by the
//! simulation's last pass.

use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use wgpu::util::DeviceExt;

use crate::render::QUAD_INDICES;

use super::debris_gpu::GpuDebris;
use super::{shaders, uniform_buffer, GpuContext};

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct ViewUniform {
    view_proj: [[f32; 4]; 4],
    particle_size: f32,
    _padding: [f32; 3],
}

pub struct DebrisRenderer {
    pipeline: wgpu::RenderPipeline,
    view_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    /// Indexed by the committed bodies half.
    bind_groups: [wgpu::BindGroup; 2],
}

impl DebrisRenderer {
    pub fn new(ctx: &GpuContext, debris: &GpuDebris, format: wgpu::TextureFormat) -> Self {
        let device = &ctx.device;

        let view_buffer = uniform_buffer(
            device,
            "Debris View",
            &ViewUniform {
                view_proj: Mat4::IDENTITY.to_cols_array_2d(),
                particle_size: debris.config().particle_radius() * 2.0,
                _padding: [0.0; 3],
            },
        );

        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Quad Indices"),
            contents: bytemuck::cast_slice(&QUAD_INDICES),
            usage: wgpu::BufferUsages::INDEX,
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Debris Render Shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::render_wgsl().into()),
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Debris Render Pipeline"),
            layout: None,
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let layout = pipeline.get_bind_group_layout(0);
        let pool = debris.pool();
        let bind_groups = [0, 1].map(|half| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Debris Render Bind Group"),
                layout: &layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: view_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: pool.alive_list.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: pool.bodies[half].as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: pool.meta.as_entire_binding(),
                    },
                ],
            })
        });

        Self {
            pipeline,
            view_buffer,
            index_buffer,
            bind_groups,
        }
    }

    pub fn set_view(&self, queue: &wgpu::Queue, view_proj: Mat4, particle_size: f32) {
        let view = ViewUniform {
            view_proj: view_proj.to_cols_array_2d(),
            particle_size,
            _padding: [0.0; 3],
        };
        queue.write_buffer(&self.view_buffer, 0, bytemuck::bytes_of(&view));
    }

    /// Orthographic projection covering `bounds` of the world.
    pub fn set_ortho(&self, queue: &wgpu::Queue, min: glam::Vec2, max: glam::Vec2, particle_size: f32) {
        let proj = Mat4::orthographic_rh(min.x, max.x, min.y, max.y, -1.0, 1.0);
        self.set_view(queue, proj, particle_size);
    }

    /// Record the frame's single indirect draw.
    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>, debris: &GpuDebris) {
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.bind_groups[debris.body_half()], &[]);
        pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
        pass.draw_indexed_indirect(&debris.pool().draw_args, 0);
    }
}
