use std::borrow::Cow;
use std::num::NonZeroU64;

use hashbrown::HashMap;
use tracing::{debug, warn};

use nine_gpu::hal::{
    BufferDesc, BufferId, GpuBackend, PipelineId, PipelineTag, ResourceRegistry, ShaderModuleId,
    ShaderModuleTag, TextureViewId, TextureViewTag,
};
use nine_gpu::{GpuError, WgpuBackend};

use super::{NativeCommand, NativeDevice, PipelineShaders};
use crate::constants::EXTENSION_SLOT;
use crate::input::IndexFormat;
use crate::pipeline::PipelineStateDesc;
use crate::shader::{ShaderStage, TranslatedShader};
use crate::stage::{ScissorRect, Viewport};
use crate::state::tracker::{
    SamplerState, TextureAddress, TextureFilter, MAX_RENDER_TARGETS, MAX_SAMPLERS,
};
use crate::state::{
    translate_address_mode, translate_color_target, translate_cull_and_front_face,
    translate_depth_format, translate_depth_stencil, translate_filter_mode,
    translate_polygon_mode, translate_render_target_format,
};
use crate::vertex::MAX_VERTEX_STREAMS;

const CONSTANT_SLOTS: usize = EXTENSION_SLOT as usize + 1;
const NULL_UNIFORM_SIZE: u64 = 256;
/// Uniform binding sizes are rounded up to a whole register.
const UNIFORM_GRANULARITY: u64 = 16;

struct RegisteredView {
    view: wgpu::TextureView,
    width: u32,
    height: u32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct ConstantBinding {
    buffer: BufferId,
    offset: u64,
    size: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct TargetState {
    colors: [Option<TextureViewId>; MAX_RENDER_TARGETS],
    depth_stencil: Option<TextureViewId>,
    depth_read_only: bool,
}

impl TargetState {
    fn is_empty(&self) -> bool {
        self.colors.iter().all(Option::is_none) && self.depth_stencil.is_none()
    }
}

/// Everything bind groups 0..=2 are built from.
#[derive(Clone, Debug, PartialEq)]
struct BindState {
    constants: [[Option<ConstantBinding>; CONSTANT_SLOTS]; 2],
    samplers: [SamplerState; MAX_SAMPLERS],
    textures: [Option<TextureViewId>; MAX_SAMPLERS],
}

impl Default for BindState {
    fn default() -> Self {
        Self {
            constants: [[None; CONSTANT_SLOTS]; 2],
            samplers: [SamplerState::default(); MAX_SAMPLERS],
            textures: [None; MAX_SAMPLERS],
        }
    }
}

/// One draw with the state it was recorded under.
struct DrawRecord {
    targets: TargetState,
    pipeline: PipelineId,
    vertex_buffers: [Option<(BufferId, u64)>; MAX_VERTEX_STREAMS],
    index_buffer: Option<(BufferId, u64, IndexFormat)>,
    bind_groups: usize,
    viewport: Option<Viewport>,
    scissor: Option<ScissorRect>,
    blend_constant: [f32; 4],
    stencil_reference: u32,
    draw: NativeCommand,
}

/// Binding state as of the last queued command. It carries over from one flush to the next, since
/// callers only resend what changed.
#[derive(Clone, Debug, Default)]
struct ReplayState {
    targets: TargetState,
    pipeline: Option<PipelineId>,
    vertex_buffers: [Option<(BufferId, u64)>; MAX_VERTEX_STREAMS],
    index_buffer: Option<(BufferId, u64, IndexFormat)>,
    binds: BindState,
    viewport: Option<Viewport>,
    scissor: Option<ScissorRect>,
    blend_constant: [f32; 4],
    stencil_reference: u32,
}

/// [`NativeDevice`] on top of `wgpu`.
///
/// Commands are queued by [`NativeDevice::submit_commands`] and encoded into render passes on
/// [`NativeDevice::flush`]. Consecutive draws to the same targets share a pass; targets are
/// loaded, never cleared.
pub struct WgpuNativeDevice {
    backend: WgpuBackend,
    modules: ResourceRegistry<ShaderModuleTag, wgpu::ShaderModule>,
    pipelines: ResourceRegistry<PipelineTag, wgpu::RenderPipeline>,
    views: ResourceRegistry<TextureViewTag, RegisteredView>,
    constants_layout: [wgpu::BindGroupLayout; 2],
    textures_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    samplers: HashMap<SamplerState, wgpu::Sampler>,
    default_view: wgpu::TextureView,
    null_uniform: wgpu::Buffer,
    pending: Vec<NativeCommand>,
    replay: ReplayState,
}

impl WgpuNativeDevice {
    pub fn new(backend: WgpuBackend) -> Self {
        let device = backend.device();

        let constants_layout = [ShaderStage::Vertex, ShaderStage::Pixel].map(|stage| {
            let visibility = match stage {
                ShaderStage::Pixel => wgpu::ShaderStages::FRAGMENT,
                _ => wgpu::ShaderStages::VERTEX,
            };
            let entries: Vec<wgpu::BindGroupLayoutEntry> = (0..CONSTANT_SLOTS as u32)
                .map(|binding| wgpu::BindGroupLayoutEntry {
                    binding,
                    visibility,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                })
                .collect();
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("nine-d3d9 constants bgl"),
                entries: &entries,
            })
        });

        // Sampler `n` at binding 2n, its texture at 2n + 1.
        let mut texture_entries = Vec::with_capacity(MAX_SAMPLERS * 2);
        for slot in 0..MAX_SAMPLERS as u32 {
            texture_entries.push(wgpu::BindGroupLayoutEntry {
                binding: slot * 2,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            });
            texture_entries.push(wgpu::BindGroupLayoutEntry {
                binding: slot * 2 + 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            });
        }
        let textures_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("nine-d3d9 textures bgl"),
            entries: &texture_entries,
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("nine-d3d9 pipeline layout"),
            bind_group_layouts: &[
                &constants_layout[0],
                &constants_layout[1],
                &textures_layout,
            ],
            push_constant_ranges: &[],
        });

        let extent = wgpu::Extent3d {
            width: 1,
            height: 1,
            depth_or_array_layers: 1,
        };
        let default_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("nine-d3d9 default texture"),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        backend.queue().write_texture(
            wgpu::ImageCopyTexture {
                texture: &default_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &[0u8, 0, 0, 0],
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4),
                rows_per_image: Some(1),
            },
            extent,
        );
        let default_view = default_texture.create_view(&wgpu::TextureViewDescriptor::default());

        let null_uniform = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("nine-d3d9 null constants"),
            size: NULL_UNIFORM_SIZE,
            usage: wgpu::BufferUsages::UNIFORM,
            mapped_at_creation: false,
        });

        Self {
            backend,
            modules: ResourceRegistry::new("shader module"),
            pipelines: ResourceRegistry::new("pipeline"),
            views: ResourceRegistry::new("texture view"),
            constants_layout,
            textures_layout,
            pipeline_layout,
            samplers: HashMap::new(),
            default_view,
            null_uniform,
            pending: Vec::new(),
            replay: ReplayState::default(),
        }
    }

    pub fn backend(&self) -> &WgpuBackend {
        &self.backend
    }

    /// Make a view usable as a render target, depth-stencil surface or shader resource.
    pub fn register_texture_view(
        &mut self,
        view: wgpu::TextureView,
        width: u32,
        height: u32,
    ) -> TextureViewId {
        self.views.insert(RegisteredView {
            view,
            width,
            height,
        })
    }

    pub fn unregister_texture_view(&mut self, id: TextureViewId) -> Result<(), GpuError> {
        self.views.remove(id).map(drop)
    }

    pub fn cached_samplers(&self) -> usize {
        self.samplers.len()
    }

    fn vertex_buffer_layouts(
        desc: &PipelineStateDesc,
    ) -> Vec<(u64, wgpu::VertexStepMode, Vec<wgpu::VertexAttribute>)> {
        let mut layouts = Vec::new();
        for stream in 0..MAX_VERTEX_STREAMS {
            let bit = 1u16 << stream;
            if desc.stream_mask & bit == 0 {
                continue;
            }
            let attributes = desc
                .input_layout
                .iter()
                .flat_map(|layout| layout.elements())
                .filter(|e| usize::from(e.element.stream) == stream)
                .map(|e| wgpu::VertexAttribute {
                    format: e.format.format,
                    offset: u64::from(e.element.offset),
                    shader_location: e.location,
                })
                .collect();
            let step_mode = if desc.instance_stream_mask & bit != 0 {
                wgpu::VertexStepMode::Instance
            } else {
                wgpu::VertexStepMode::Vertex
            };
            layouts.push((u64::from(desc.vertex_strides[stream]), step_mode, attributes));
        }
        layouts
    }

    fn primitive_state(&self, desc: &PipelineStateDesc) -> wgpu::PrimitiveState {
        let features = self.backend.device().features();
        let (front_face, cull_mode) = translate_cull_and_front_face(&desc.rasterizer);
        let polygon_mode = match translate_polygon_mode(desc.rasterizer.fill_mode) {
            wgpu::PolygonMode::Line if !features.contains(wgpu::Features::POLYGON_MODE_LINE) => {
                debug!("wireframe fill unsupported, drawing solid");
                wgpu::PolygonMode::Fill
            }
            wgpu::PolygonMode::Point if !features.contains(wgpu::Features::POLYGON_MODE_POINT) => {
                debug!("point fill unsupported, drawing solid");
                wgpu::PolygonMode::Fill
            }
            mode => mode,
        };
        wgpu::PrimitiveState {
            topology: desc.topology,
            strip_index_format: desc.strip_index_format,
            front_face,
            cull_mode,
            unclipped_depth: !desc.rasterizer.depth_clip_enable
                && features.contains(wgpu::Features::DEPTH_CLIP_CONTROL),
            polygon_mode,
            conservative: false,
        }
    }

    fn depth_stencil_state(
        &self,
        desc: &PipelineStateDesc,
    ) -> Result<Option<wgpu::DepthStencilState>, GpuError> {
        if !desc.has_depth_stencil() {
            return Ok(None);
        }
        let format = translate_depth_format(desc.depth_stencil_format).ok_or_else(|| {
            GpuError::InvalidArgument(format!(
                "unsupported depth-stencil format {:?}",
                desc.depth_stencil_format
            ))
        })?;
        let mut state = translate_depth_stencil(&desc.depth_stencil, &desc.rasterizer, format);
        if desc.depth_read_only {
            state.depth_write_enabled = false;
            state.stencil.write_mask = 0;
        }
        // Bias is only valid for triangle topologies.
        if !matches!(
            desc.topology,
            wgpu::PrimitiveTopology::TriangleList | wgpu::PrimitiveTopology::TriangleStrip
        ) {
            state.bias = wgpu::DepthBiasState::default();
        }
        Ok(Some(state))
    }

    fn color_targets(
        desc: &PipelineStateDesc,
    ) -> Result<Vec<Option<wgpu::ColorTargetState>>, GpuError> {
        desc.bound_render_target_formats()
            .iter()
            .enumerate()
            .map(|(rt, &format)| {
                let blend = desc.blend.render_targets[rt];
                let Some(wgpu_format) = translate_render_target_format(format) else {
                    return Err(GpuError::InvalidArgument(format!(
                        "unsupported render target format {format:?}"
                    )));
                };
                Ok(Some(translate_color_target(&blend, wgpu_format, format.ignores_alpha())))
            })
            .collect()
    }

    fn create_sampler(device: &wgpu::Device, state: &SamplerState) -> wgpu::Sampler {
        let address = |mode: TextureAddress| match mode {
            TextureAddress::Border
                if device
                    .features()
                    .contains(wgpu::Features::ADDRESS_MODE_CLAMP_TO_BORDER) =>
            {
                wgpu::AddressMode::ClampToBorder
            }
            other => translate_address_mode(other),
        };
        let lod_max_clamp: f32 = if state.mip_filter == TextureFilter::None {
            0.0
        } else {
            32.0
        };
        let anisotropic = state.min_filter == TextureFilter::Anisotropic
            || state.mag_filter == TextureFilter::Anisotropic;
        let anisotropy_clamp = if anisotropic {
            u16::from(state.max_anisotropy.clamp(1, 16))
        } else {
            1
        };
        // Anisotropy requires linear filtering on every axis.
        let (mag_filter, min_filter, mipmap_filter) = if anisotropy_clamp > 1 {
            (
                wgpu::FilterMode::Linear,
                wgpu::FilterMode::Linear,
                wgpu::FilterMode::Linear,
            )
        } else {
            (
                translate_filter_mode(state.mag_filter),
                translate_filter_mode(state.min_filter),
                translate_filter_mode(state.mip_filter),
            )
        };
        let modes = [state.address_u, state.address_v, state.address_w].map(address);
        // Only the three fixed border colors exist natively.
        let border_color = modes
            .contains(&wgpu::AddressMode::ClampToBorder)
            .then(|| match state.border_color >> 24 {
                0 => wgpu::SamplerBorderColor::TransparentBlack,
                _ if state.border_color & 0x00ff_ffff == 0 => wgpu::SamplerBorderColor::OpaqueBlack,
                _ => wgpu::SamplerBorderColor::OpaqueWhite,
            });
        device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("nine-d3d9 sampler"),
            address_mode_u: modes[0],
            address_mode_v: modes[1],
            address_mode_w: modes[2],
            mag_filter,
            min_filter,
            mipmap_filter,
            lod_min_clamp: state.max_mip_level as f32,
            lod_max_clamp: lod_max_clamp.max(state.max_mip_level as f32),
            anisotropy_clamp,
            border_color,
            ..Default::default()
        })
    }

    /// Replays queued commands on top of `replay` into draw records and the bind states they
    /// reference.
    fn collect_draws(
        replay: &mut ReplayState,
        commands: &[NativeCommand],
    ) -> Result<(Vec<DrawRecord>, Vec<BindState>), GpuError> {
        let mut records = Vec::new();
        let mut bind_states: Vec<BindState> = Vec::new();

        for command in commands {
            match *command {
                NativeCommand::SetPipeline(id) => replay.pipeline = Some(id),
                NativeCommand::SetVertexBuffer {
                    slot,
                    buffer,
                    offset,
                } => {
                    let entry = replay.vertex_buffers.get_mut(slot as usize).ok_or_else(|| {
                        GpuError::InvalidArgument(format!("vertex buffer slot {slot} out of range"))
                    })?;
                    *entry = Some((buffer, offset));
                }
                NativeCommand::SetIndexBuffer {
                    buffer,
                    offset,
                    format,
                } => replay.index_buffer = Some((buffer, offset, format)),
                NativeCommand::SetConstantBuffer {
                    stage,
                    slot,
                    buffer,
                    offset,
                    size,
                } => {
                    let group = match stage {
                        ShaderStage::Vertex => 0,
                        ShaderStage::Pixel => 1,
                        ShaderStage::Geometry => return Err(GpuError::Unsupported("geometry constants")),
                    };
                    let entry = replay.binds.constants[group]
                        .get_mut(slot as usize)
                        .ok_or_else(|| {
                            GpuError::InvalidArgument(format!("constant slot {slot} out of range"))
                        })?;
                    *entry = Some(ConstantBinding {
                        buffer,
                        offset,
                        size,
                    });
                }
                NativeCommand::SetRenderTargets {
                    colors,
                    depth_stencil,
                    depth_read_only,
                } => {
                    replay.targets = TargetState {
                        colors,
                        depth_stencil,
                        depth_read_only,
                    };
                }
                NativeCommand::SetViewport(vp) => replay.viewport = Some(vp),
                NativeCommand::SetScissorRect(rect) => replay.scissor = Some(rect),
                NativeCommand::SetBlendConstant(color) => replay.blend_constant = color,
                NativeCommand::SetStencilReference(value) => replay.stencil_reference = value,
                NativeCommand::SetSampler { slot, state } => {
                    if let Some(entry) = replay.binds.samplers.get_mut(slot as usize) {
                        *entry = state;
                    }
                }
                NativeCommand::SetShaderResource { slot, view } => {
                    if let Some(entry) = replay.binds.textures.get_mut(slot as usize) {
                        *entry = view;
                    }
                }
                NativeCommand::Draw { .. } | NativeCommand::DrawIndexed { .. } => {
                    let Some(pipeline) = replay.pipeline else {
                        return Err(GpuError::InvalidArgument("draw without a pipeline".into()));
                    };
                    if replay.targets.is_empty() {
                        return Err(GpuError::InvalidArgument(
                            "draw without render targets".into(),
                        ));
                    }
                    if bind_states.last() != Some(&replay.binds) {
                        bind_states.push(replay.binds.clone());
                    }
                    records.push(DrawRecord {
                        targets: replay.targets,
                        pipeline,
                        vertex_buffers: replay.vertex_buffers,
                        index_buffer: replay.index_buffer,
                        bind_groups: bind_states.len() - 1,
                        viewport: replay.viewport,
                        scissor: replay.scissor,
                        blend_constant: replay.blend_constant,
                        stencil_reference: replay.stencil_reference,
                        draw: command.clone(),
                    });
                }
            }
        }
        Ok((records, bind_states))
    }

    fn constant_entry(
        &self,
        binding: u32,
        constant: Option<ConstantBinding>,
    ) -> Result<wgpu::BindGroupEntry<'_>, GpuError> {
        let resource = match constant {
            Some(c) => {
                let buffer = self.backend.buffer(c.buffer)?;
                let available = buffer.size().saturating_sub(c.offset);
                let size = c.size.div_ceil(UNIFORM_GRANULARITY) * UNIFORM_GRANULARITY;
                wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer,
                    offset: c.offset,
                    size: NonZeroU64::new(size.min(available)),
                })
            }
            None => self.null_uniform.as_entire_binding(),
        };
        Ok(wgpu::BindGroupEntry { binding, resource })
    }

    fn create_bind_groups(&self, state: &BindState) -> Result<[wgpu::BindGroup; 3], GpuError> {
        let device = self.backend.device();
        let mut constant_groups = Vec::with_capacity(2);
        for (group, layout) in self.constants_layout.iter().enumerate() {
            let entries = state.constants[group]
                .iter()
                .enumerate()
                .map(|(slot, c)| self.constant_entry(slot as u32, *c))
                .collect::<Result<Vec<_>, GpuError>>()?;
            constant_groups.push(device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("nine-d3d9 constants bg"),
                layout,
                entries: &entries,
            }));
        }

        let mut entries = Vec::with_capacity(MAX_SAMPLERS * 2);
        for slot in 0..MAX_SAMPLERS {
            // Populated by `flush` before any bind group is built.
            let sampler = self
                .samplers
                .get(&state.samplers[slot])
                .ok_or_else(|| GpuError::Backend("sampler missing from cache".into()))?;
            let view = match state.textures[slot] {
                Some(id) => &self.views.get(id)?.view,
                None => &self.default_view,
            };
            entries.push(wgpu::BindGroupEntry {
                binding: slot as u32 * 2,
                resource: wgpu::BindingResource::Sampler(sampler),
            });
            entries.push(wgpu::BindGroupEntry {
                binding: slot as u32 * 2 + 1,
                resource: wgpu::BindingResource::TextureView(view),
            });
        }
        let textures = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("nine-d3d9 textures bg"),
            layout: &self.textures_layout,
            entries: &entries,
        });

        let mut groups = constant_groups.into_iter();
        match (groups.next(), groups.next()) {
            (Some(vs), Some(ps)) => Ok([vs, ps, textures]),
            _ => Err(GpuError::Backend("constant bind groups missing".into())),
        }
    }

    fn target_size(&self, targets: &TargetState) -> Result<(u32, u32), GpuError> {
        let first = targets
            .colors
            .iter()
            .flatten()
            .next()
            .or(targets.depth_stencil.as_ref())
            .ok_or_else(|| GpuError::InvalidArgument("draw without render targets".into()))?;
        let view = self.views.get(*first)?;
        Ok((view.width, view.height))
    }

    fn encode(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        records: &[DrawRecord],
        bind_groups: &[[wgpu::BindGroup; 3]],
    ) -> Result<(), GpuError> {
        let mut start = 0;
        while start < records.len() {
            let targets = records[start].targets;
            let end = records[start..]
                .iter()
                .position(|r| r.targets != targets)
                .map_or(records.len(), |n| start + n);
            let (width, height) = self.target_size(&targets)?;

            let mut color_attachments = Vec::with_capacity(MAX_RENDER_TARGETS);
            for color in &targets.colors {
                color_attachments.push(match color {
                    Some(id) => Some(wgpu::RenderPassColorAttachment {
                        view: &self.views.get(*id)?.view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Load,
                            store: wgpu::StoreOp::Store,
                        },
                    }),
                    None => None,
                });
            }
            while color_attachments.last().is_some_and(Option::is_none) {
                color_attachments.pop();
            }
            let depth_stencil_attachment = match targets.depth_stencil {
                Some(id) => {
                    let view = &self.views.get(id)?.view;
                    let writable = !targets.depth_read_only;
                    Some(wgpu::RenderPassDepthStencilAttachment {
                        view,
                        depth_ops: writable.then_some(wgpu::Operations::<f32> {
                            load: wgpu::LoadOp::Load,
                            store: wgpu::StoreOp::Store,
                        }),
                        stencil_ops: writable.then_some(wgpu::Operations::<u32> {
                            load: wgpu::LoadOp::Load,
                            store: wgpu::StoreOp::Store,
                        }),
                    })
                }
                None => None,
            };

            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("nine-d3d9 pass"),
                color_attachments: &color_attachments,
                depth_stencil_attachment,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            let mut current_pipeline = None;
            let mut current_groups = None;
            for record in &records[start..end] {
                if current_pipeline != Some(record.pipeline) {
                    pass.set_pipeline(self.pipelines.get(record.pipeline)?);
                    current_pipeline = Some(record.pipeline);
                }
                if current_groups != Some(record.bind_groups) {
                    for (index, group) in bind_groups[record.bind_groups].iter().enumerate() {
                        pass.set_bind_group(index as u32, group, &[]);
                    }
                    current_groups = Some(record.bind_groups);
                }
                for (slot, binding) in record.vertex_buffers.iter().enumerate() {
                    if let Some((buffer, offset)) = binding {
                        let buffer = self.backend.buffer(*buffer)?;
                        pass.set_vertex_buffer(slot as u32, buffer.slice(*offset..));
                    }
                }
                if let Some((buffer, offset, format)) = record.index_buffer {
                    let buffer = self.backend.buffer(buffer)?;
                    pass.set_index_buffer(buffer.slice(offset..), format.to_wgpu());
                }

                let vp = record.viewport.unwrap_or(Viewport {
                    x: 0.0,
                    y: 0.0,
                    width: width as f32,
                    height: height as f32,
                    min_depth: 0.0,
                    max_depth: 1.0,
                });
                pass.set_viewport(vp.x, vp.y, vp.width, vp.height, vp.min_depth, vp.max_depth);
                let rect = record.scissor.unwrap_or(ScissorRect {
                    x: 0,
                    y: 0,
                    width,
                    height,
                });
                let x = rect.x.min(width);
                let y = rect.y.min(height);
                pass.set_scissor_rect(
                    x,
                    y,
                    rect.width.min(width - x),
                    rect.height.min(height - y),
                );
                let [r, g, b, a] = record.blend_constant.map(f64::from);
                pass.set_blend_constant(wgpu::Color { r, g, b, a });
                pass.set_stencil_reference(record.stencil_reference);

                match record.draw {
                    NativeCommand::Draw {
                        vertex_count,
                        instance_count,
                        first_vertex,
                        first_instance,
                    } => pass.draw(
                        first_vertex..first_vertex + vertex_count,
                        first_instance..first_instance + instance_count,
                    ),
                    NativeCommand::DrawIndexed {
                        index_count,
                        instance_count,
                        first_index,
                        base_vertex,
                        first_instance,
                    } => pass.draw_indexed(
                        first_index..first_index + index_count,
                        base_vertex,
                        first_instance..first_instance + instance_count,
                    ),
                    _ => {}
                }
            }
            drop(pass);
            start = end;
        }
        Ok(())
    }
}

impl std::fmt::Debug for WgpuNativeDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuNativeDevice")
            .field("modules", &self.modules)
            .field("pipelines", &self.pipelines)
            .field("views", &self.views)
            .field("samplers", &self.samplers.len())
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl GpuBackend for WgpuNativeDevice {
    fn create_buffer(&mut self, desc: BufferDesc) -> Result<BufferId, GpuError> {
        self.backend.create_buffer(desc)
    }

    fn destroy_buffer(&mut self, id: BufferId) -> Result<(), GpuError> {
        self.backend.destroy_buffer(id)
    }

    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) -> Result<(), GpuError> {
        self.backend.write_buffer(buffer, offset, data)
    }
}

impl NativeDevice for WgpuNativeDevice {
    fn create_shader_module(
        &mut self,
        shader: &TranslatedShader,
    ) -> Result<ShaderModuleId, GpuError> {
        let module = self
            .backend
            .device()
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("nine-d3d9 shader"),
                source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(&shader.wgsl)),
            });
        Ok(self.modules.insert(module))
    }

    fn destroy_shader_module(&mut self, id: ShaderModuleId) -> Result<(), GpuError> {
        self.modules.remove(id).map(drop)
    }

    fn create_pipeline(
        &mut self,
        desc: &PipelineStateDesc,
        shaders: &PipelineShaders<'_>,
    ) -> Result<PipelineId, GpuError> {
        if shaders.gs.is_some() {
            return Err(GpuError::Unsupported("geometry shaders"));
        }
        let (Some(vs), Some(ps)) = (shaders.vs, shaders.ps) else {
            return Err(GpuError::InvalidArgument(
                "pipeline needs a vertex and a pixel shader".into(),
            ));
        };
        let vs_module = self.modules.get(vs.module)?;
        let ps_module = self.modules.get(ps.module)?;

        let layouts = Self::vertex_buffer_layouts(desc);
        let buffers: Vec<wgpu::VertexBufferLayout<'_>> = layouts
            .iter()
            .map(|(stride, step_mode, attributes)| wgpu::VertexBufferLayout {
                array_stride: *stride,
                step_mode: *step_mode,
                attributes,
            })
            .collect();
        let targets = Self::color_targets(desc)?;
        let depth_stencil = self.depth_stencil_state(desc)?;

        let pipeline = self
            .backend
            .device()
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("nine-d3d9 pipeline"),
                layout: Some(&self.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: vs_module,
                    entry_point: &vs.translated.entry_point,
                    buffers: &buffers,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                primitive: self.primitive_state(desc),
                depth_stencil,
                multisample: wgpu::MultisampleState {
                    count: u32::from(desc.sample_count.max(1)),
                    mask: u64::from(desc.sample_mask),
                    alpha_to_coverage_enabled: desc.blend.alpha_to_coverage,
                },
                fragment: Some(wgpu::FragmentState {
                    module: ps_module,
                    entry_point: &ps.translated.entry_point,
                    targets: &targets,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                multiview: None,
            });
        let id = self.pipelines.insert(pipeline);
        debug!(pipeline = ?id, streams = desc.stream_mask, "created render pipeline");
        Ok(id)
    }

    fn destroy_pipeline(&mut self, id: PipelineId) -> Result<(), GpuError> {
        self.pipelines.remove(id).map(drop)
    }

    fn submit_commands(&mut self, commands: &[NativeCommand]) -> Result<(), GpuError> {
        for command in commands {
            if let NativeCommand::SetPipeline(id) = command {
                if !self.pipelines.contains(*id) {
                    return Err(GpuError::UnknownResource {
                        kind: "pipeline",
                        id: id.raw(),
                    });
                }
            }
        }
        self.pending.extend_from_slice(commands);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), GpuError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let pending = std::mem::take(&mut self.pending);
        let mut replay = self.replay.clone();
        let (records, bind_states) =
            Self::collect_draws(&mut replay, &pending).inspect_err(|err| {
                warn!(commands = pending.len(), %err, "dropping unsubmittable commands");
            })?;
        self.replay = replay;

        for state in &bind_states {
            for sampler in &state.samplers {
                if !self.samplers.contains_key(sampler) {
                    let created = Self::create_sampler(self.backend.device(), sampler);
                    self.samplers.insert(*sampler, created);
                }
            }
        }
        let bind_groups = bind_states
            .iter()
            .map(|state| self.create_bind_groups(state))
            .collect::<Result<Vec<_>, GpuError>>()?;

        let mut encoder =
            self.backend
                .device()
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("nine-d3d9 encoder"),
                });
        self.encode(&mut encoder, &records, &bind_groups)?;
        self.backend.queue().submit(Some(encoder.finish()));
        debug!(draws = records.len(), "flushed command batch");
        Ok(())
    }
}
