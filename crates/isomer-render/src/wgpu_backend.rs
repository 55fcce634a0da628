//! The wgpu realization of [`GraphicsBackend`].
//!
//! Pipelines are created lazily per (technique, blend, stencil) combination
//! and cached; scissor is pass-dynamic and never forces a pipeline. Shader
//! globals go through a dynamic-offset uniform ring so every flush in a frame
//! gets its own slot without stalling on the queue.

use std::sync::Arc;

use ahash::AHashMap;
use glam::Vec3;
use wgpu::util::DeviceExt;

use crate::backend::GraphicsBackend;
use crate::context::GraphicsContext;
use crate::effect::{Globals, SPRITE_SHADER, Technique};
use crate::index::{MAX_QUADS, MAX_VERTICES, generate_index_pattern};
use crate::state::{RenderState, StencilMode, Viewport};
use crate::texture::Texture2D;
use crate::vertex::SpriteVertex;

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24PlusStencil8;

/// Ring slot stride; the guaranteed minimum dynamic uniform alignment.
const GLOBALS_STRIDE: u64 = 256;
/// Flushes per frame the globals ring can absorb before it saturates.
const GLOBALS_SLOTS: u32 = 256;

/// Everything that selects a distinct `wgpu::RenderPipeline`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PipelineKey {
    technique: Technique,
    blend: wgpu::BlendState,
    stencil: StencilMode,
}

pub struct WgpuBackend {
    context: Arc<GraphicsContext>,
    surface_format: wgpu::TextureFormat,
    viewport: Viewport,

    shader: wgpu::ShaderModule,
    pipeline_layout: wgpu::PipelineLayout,
    texture_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    pipelines: AHashMap<PipelineKey, wgpu::RenderPipeline>,

    index_buffer: wgpu::Buffer,

    globals_buffer: wgpu::Buffer,
    globals_bind_group: wgpu::BindGroup,
    globals_slot: u32,

    vertex_buffer: wgpu::Buffer,
    /// Capacity in vertices.
    vertex_capacity: u32,
    vertex_cursor: u32,
    /// High-water mark across frames; drives regrowth at frame start.
    peak_vertices: u32,

    texture_bind_groups: AHashMap<u64, wgpu::BindGroup>,

    depth_texture: wgpu::Texture,
    depth_view: wgpu::TextureView,

    pass: Option<wgpu::RenderPass<'static>>,

    light_direction: Vec3,
    light_intensity: f32,
    light_enabled: bool,
    hues_per_texture: f32,
}

impl WgpuBackend {
    pub fn new(
        context: Arc<GraphicsContext>,
        surface_format: wgpu::TextureFormat,
        width: u32,
        height: u32,
        hues_per_texture: f32,
    ) -> Self {
        let device = context.device();

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("sprite_shader"),
            source: wgpu::ShaderSource::Wgsl(SPRITE_SHADER.into()),
        });

        let globals_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("sprite_globals_layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: wgpu::BufferSize::new(Globals::SIZE),
                },
                count: None,
            }],
        });

        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("sprite_texture_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("sprite_pipeline_layout"),
            bind_group_layouts: &[&globals_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        // Pixel-art sampling: no filtering between atlas cells.
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("sprite_sampler"),
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        // The index pattern never changes; upload it once for the lifetime of
        // the backend.
        let indices = generate_index_pattern(MAX_QUADS);
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("sprite_index_buffer"),
            contents: bytemuck::cast_slice(&indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        let globals_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("sprite_globals_buffer"),
            size: GLOBALS_STRIDE * GLOBALS_SLOTS as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let globals_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("sprite_globals_bind_group"),
            layout: &globals_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &globals_buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(Globals::SIZE),
                }),
            }],
        });

        let vertex_capacity = MAX_VERTICES as u32;
        let vertex_buffer = Self::create_vertex_buffer(device, vertex_capacity);

        let (depth_texture, depth_view) = Self::create_depth_texture(device, width, height);

        Self {
            context,
            surface_format,
            viewport: Viewport::new(width, height),
            shader,
            pipeline_layout,
            texture_layout,
            sampler,
            pipelines: AHashMap::new(),
            index_buffer,
            globals_buffer,
            globals_bind_group,
            globals_slot: 0,
            vertex_buffer,
            vertex_capacity,
            vertex_cursor: 0,
            peak_vertices: 0,
            texture_bind_groups: AHashMap::new(),
            depth_texture,
            depth_view,
            pass: None,
            light_direction: Vec3::new(0.0, -1.0, 1.0),
            light_intensity: 1.0,
            light_enabled: false,
            hues_per_texture,
        }
    }

    fn create_vertex_buffer(device: &wgpu::Device, capacity: u32) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("sprite_vertex_buffer"),
            size: capacity as u64 * SpriteVertex::SIZE,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    fn create_depth_texture(
        device: &wgpu::Device,
        width: u32,
        height: u32,
    ) -> (wgpu::Texture, wgpu::TextureView) {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("sprite_depth_texture"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        (texture, view)
    }

    /// Resizes the render target, recreating the depth/stencil attachment.
    pub fn resize(&mut self, width: u32, height: u32) {
        if self.viewport == Viewport::new(width, height) {
            return;
        }
        self.viewport = Viewport::new(width, height);
        let (texture, view) = Self::create_depth_texture(self.context.device(), width, height);
        self.depth_texture = texture;
        self.depth_view = view;
    }

    /// Opens the frame's render pass on `encoder` targeting `view`.
    ///
    /// Grows the vertex buffer here if the previous frame hit its ceiling, so
    /// no buffer is replaced while a pass still references it.
    pub fn begin_frame(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        view: &wgpu::TextureView,
        clear: Option<wgpu::Color>,
    ) {
        if self.peak_vertices > self.vertex_capacity {
            let new_capacity = self.peak_vertices.next_power_of_two();
            tracing::debug!(
                from = self.vertex_capacity,
                to = new_capacity,
                "growing frame vertex buffer"
            );
            self.vertex_buffer = Self::create_vertex_buffer(self.context.device(), new_capacity);
            self.vertex_capacity = new_capacity;
        }
        self.vertex_cursor = 0;
        self.peak_vertices = 0;
        self.globals_slot = 0;

        let load = match clear {
            Some(color) => wgpu::LoadOp::Clear(color),
            None => wgpu::LoadOp::Load,
        };

        let pass = encoder
            .begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("sprite_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(0),
                        store: wgpu::StoreOp::Store,
                    }),
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            })
            .forget_lifetime();

        self.pass = Some(pass);

        let pass = self.pass.as_mut().unwrap();
        pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
        pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        pass.set_stencil_reference(1);
    }

    /// Ends the frame's render pass. The caller submits the encoder.
    pub fn end_frame(&mut self) {
        self.pass = None;
    }

    fn ensure_pipeline(&mut self, key: PipelineKey) {
        if self.pipelines.contains_key(&key) {
            return;
        }

        tracing::debug!(technique = %key.technique, "compiling sprite pipeline");
        let pipeline = self
            .context
            .device()
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("sprite_pipeline"),
                layout: Some(&self.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &self.shader,
                    entry_point: Some("vs_main"),
                    compilation_options: Default::default(),
                    buffers: &[SpriteVertex::layout()],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &self.shader,
                    entry_point: Some(key.technique.fragment_entry()),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: self.surface_format,
                        blend: Some(key.blend),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil: Some(key.stencil.to_depth_stencil_state(DEPTH_FORMAT)),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            });
        self.pipelines.insert(key, pipeline);
    }

    fn ensure_texture_bind_group(&mut self, texture: &Texture2D) {
        if self.texture_bind_groups.contains_key(&texture.id()) {
            return;
        }

        let bind_group = self
            .context
            .device()
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("sprite_texture_bind_group"),
                layout: &self.texture_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(texture.view()),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(&self.sampler),
                    },
                ],
            });
        self.texture_bind_groups.insert(texture.id(), bind_group);
    }

    /// Drops cached bind groups so released textures can be reclaimed.
    pub fn clear_texture_cache(&mut self) {
        self.texture_bind_groups.clear();
    }
}

impl GraphicsBackend for WgpuBackend {
    fn apply_state(&mut self, state: &RenderState, viewport: Viewport, technique: Technique) {
        let slot = if self.globals_slot < GLOBALS_SLOTS {
            let s = self.globals_slot;
            self.globals_slot += 1;
            s
        } else {
            tracing::warn!("globals ring exhausted; reusing last slot");
            GLOBALS_SLOTS - 1
        };

        // XNA-style row vectors premultiply; with glam column vectors the
        // combined matrix is ortho * world.
        let projection = viewport.ortho_projection() * state.transform;
        let globals = Globals {
            projection: projection.to_cols_array_2d(),
            world: state.transform.to_cols_array_2d(),
            viewport: [viewport.width as f32, viewport.height as f32],
            light_intensity: self.light_intensity,
            light_enabled: if self.light_enabled { 1.0 } else { 0.0 },
            light_direction: self.light_direction.to_array(),
            hues_per_texture: self.hues_per_texture,
        };
        self.context.queue().write_buffer(
            &self.globals_buffer,
            slot as u64 * GLOBALS_STRIDE,
            bytemuck::bytes_of(&globals),
        );

        let key = PipelineKey {
            technique,
            blend: state.blend.to_blend_state(),
            stencil: state.stencil,
        };
        self.ensure_pipeline(key);

        let Some(pass) = self.pass.as_mut() else {
            return;
        };
        pass.set_pipeline(&self.pipelines[&key]);
        pass.set_bind_group(
            0,
            &self.globals_bind_group,
            &[slot * GLOBALS_STRIDE as u32],
        );

        if state.scissor {
            if let Some(rect) = state.scissor_rect {
                let x = rect.x.min(viewport.width);
                let y = rect.y.min(viewport.height);
                let width = rect.width.min(viewport.width - x);
                let height = rect.height.min(viewport.height - y);
                pass.set_scissor_rect(x, y, width, height);
            } else {
                pass.set_scissor_rect(0, 0, viewport.width, viewport.height);
            }
        } else {
            pass.set_scissor_rect(0, 0, viewport.width, viewport.height);
        }
    }

    fn upload_vertices(&mut self, vertices: &[SpriteVertex]) -> Option<u32> {
        let count = vertices.len() as u32;
        if self.vertex_cursor + count > self.vertex_capacity {
            // Record the demand so begin_frame grows the buffer next frame.
            self.peak_vertices = self.peak_vertices.max(self.vertex_cursor + count);
            tracing::warn!(
                staged = count,
                capacity = self.vertex_capacity,
                "frame vertex buffer full; dropping batch"
            );
            return None;
        }

        let base = self.vertex_cursor;
        self.context.queue().write_buffer(
            &self.vertex_buffer,
            base as u64 * SpriteVertex::SIZE,
            bytemuck::cast_slice(vertices),
        );
        self.vertex_cursor += count;
        self.peak_vertices = self.peak_vertices.max(self.vertex_cursor);
        Some(base)
    }

    fn draw_quads(&mut self, texture: &Texture2D, base_vertex: u32, quad_count: u32) {
        self.ensure_texture_bind_group(texture);

        let Some(pass) = self.pass.as_mut() else {
            return;
        };
        pass.set_bind_group(1, &self.texture_bind_groups[&texture.id()], &[]);
        pass.draw_indexed(0..quad_count * 6, base_vertex as i32, 0..1);
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn set_light_direction(&mut self, direction: Vec3) {
        self.light_direction = direction;
    }

    fn set_light_intensity(&mut self, intensity: f32) {
        self.light_intensity = intensity;
    }

    fn enable_light(&mut self, enabled: bool) {
        self.light_enabled = enabled;
    }
}
