//! The DDI surface: argument validation, state setters and the per-draw sequence.
//!
//! A draw runs input assembly, both stage resolves and the pipeline lookup through
//! [`PipelineState::resolve_deferred_state`], then versions shader constants for the pipeline it
//! got, and finally hands one batch of [`NativeCommand`]s to the native device. Either the whole
//! batch is submitted or nothing is, and the consumed dirty flags are put back on failure.

pub mod render_state;

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use hashbrown::{HashMap, HashSet};
use nine_gpu::hal::{BufferId, PipelineId, TextureViewId};
use nine_gpu::{FastUploadAllocator, UploadStats};
use tracing::{debug, trace, warn};

use self::render_state::StateValues;
use crate::config::DeviceConfig;
use crate::constants::ConstantsManager;
use crate::error::DdiError;
use crate::input::{DrawParams, IndexBinding, IndexFormat, InputBuffer, VertexStream};
use crate::native::{vertex_buffer_slot, NativeCommand, NativeDevice};
use crate::pipeline::{PipelineCacheStats, PipelineState, ResolvedDraw};
use crate::shader::{
    validate_blob, FixedFunctionKey, Shader, ShaderBinding, ShaderId, ShaderStage,
    ShaderTranslateError, ShaderTranslator, TranslatedShader,
};
use crate::stage::vertex::MAX_CLIP_PLANES;
use crate::stage::{unpack_d3dcolor, ScissorRect, SurfaceRef, Viewport};
use crate::state::tracker::{MAX_RENDER_TARGETS, MAX_SAMPLERS};
use crate::state::{D3DPrimitiveType, DirtyFlags};
use crate::vertex::{InputLayout, InputLayoutId, VertexDeclaration, EMPTY_LAYOUT_HASH};

/// A resource that can be handed to another API while the device keeps it alive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceHandle {
    Buffer(BufferId),
    TextureView(TextureViewId),
}

/// Resources currently wrapped for use outside the device. Draws that touch one are rejected.
///
/// This is the only device state that may be used from several threads at once.
#[derive(Debug, Default)]
pub struct WrappedResources {
    set: Mutex<HashSet<ResourceHandle>>,
}

impl WrappedResources {
    fn lock(&self) -> MutexGuard<'_, HashSet<ResourceHandle>> {
        self.set.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns false if the resource was already wrapped.
    pub fn wrap(&self, resource: ResourceHandle) -> bool {
        self.lock().insert(resource)
    }

    /// Returns false if the resource was not wrapped.
    pub fn unwrap(&self, resource: ResourceHandle) -> bool {
        self.lock().remove(&resource)
    }

    pub fn is_wrapped(&self, resource: ResourceHandle) -> bool {
        self.lock().contains(&resource)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

pub struct Device<D: NativeDevice> {
    config: DeviceConfig,
    native: D,
    translator: Box<dyn ShaderTranslator>,
    uploads: FastUploadAllocator,
    state: PipelineState,
    constants: ConstantsManager,
    shaders: HashMap<ShaderId, Shader>,
    next_shader_id: u64,
    fixed_function: HashMap<FixedFunctionKey, ShaderId>,
    layouts: HashMap<InputLayoutId, Arc<InputLayout>>,
    next_layout_id: u32,
    render_states: StateValues,
    sampler_states: [StateValues; MAX_SAMPLERS],
    atoc_requested: bool,
    /// Pipeline of the last recorded draw.
    bound_pipeline: Option<PipelineId>,
    wrapped: Arc<WrappedResources>,
}

impl<D: NativeDevice> fmt::Debug for Device<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("shaders", &self.shaders.len())
            .field("layouts", &self.layouts.len())
            .field("uploads", &self.uploads.stats())
            .finish_non_exhaustive()
    }
}

impl<D: NativeDevice> Device<D> {
    pub fn new(
        config: DeviceConfig,
        native: D,
        translator: impl ShaderTranslator + 'static,
    ) -> Result<Self, DdiError> {
        let uploads = FastUploadAllocator::new(config.upload_desc())?;
        let state = PipelineState::new(config.pipeline_cache_capacity);
        debug!(?config, "device created");
        Ok(Self {
            config,
            native,
            translator: Box::new(translator),
            uploads,
            state,
            constants: ConstantsManager::new(),
            shaders: HashMap::new(),
            next_shader_id: 1,
            fixed_function: HashMap::new(),
            layouts: HashMap::new(),
            next_layout_id: 1,
            render_states: StateValues::default(),
            sampler_states: std::array::from_fn(|_| StateValues::default()),
            atoc_requested: false,
            bound_pipeline: None,
            wrapped: Arc::new(WrappedResources::default()),
        })
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn native(&self) -> &D {
        &self.native
    }

    pub fn native_mut(&mut self) -> &mut D {
        &mut self.native
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn cache_stats(&self) -> PipelineCacheStats {
        self.state.cache().stats()
    }

    pub fn upload_stats(&self) -> UploadStats {
        self.uploads.stats()
    }

    pub fn shader(&self, id: ShaderId) -> Option<&Shader> {
        self.shaders.get(&id)
    }

    // Streams and indices.

    /// `SetStreamSource`. `None` unbinds the stream.
    pub fn set_stream_source(
        &mut self,
        stream: u32,
        buffer: Option<InputBuffer>,
        offset: u64,
        stride: u32,
    ) -> Result<(), DdiError> {
        let binding = buffer.map(|buffer| VertexStream {
            buffer,
            offset,
            stride,
        });
        let changed = self
            .state
            .input_mut()
            .set_stream_source(stream as usize, binding)
            .inspect_err(|err| debug!(stream, error = %err, "SetStreamSource rejected"))?;
        if changed {
            self.state.mark(DirtyFlags::VERTEX_BUFFERS);
        }
        Ok(())
    }

    /// `SetStreamSourceFreq`.
    pub fn set_stream_source_freq(&mut self, stream: u32, setting: u32) -> Result<(), DdiError> {
        let changed = self
            .state
            .input_mut()
            .set_stream_frequency(stream as usize, setting)
            .inspect_err(|err| debug!(stream, setting, error = %err, "SetStreamSourceFreq rejected"))?;
        if changed {
            self.state.mark(DirtyFlags::VERTEX_BUFFERS);
        }
        Ok(())
    }

    /// `SetIndices`.
    pub fn set_indices(&mut self, binding: Option<IndexBinding>) {
        if self.state.input_mut().set_index_buffer(binding) {
            self.state.mark(DirtyFlags::INDEX_BUFFER);
        }
    }

    // Vertex declarations.

    pub fn create_vertex_declaration(
        &mut self,
        decl: &VertexDeclaration,
    ) -> Result<InputLayoutId, DdiError> {
        let id = InputLayoutId(self.next_layout_id);
        let layout = InputLayout::new(id, decl)
            .inspect_err(|err| debug!(error = %err, "vertex declaration rejected"))?;
        self.next_layout_id = self
            .next_layout_id
            .checked_add(1)
            .ok_or(DdiError::InvariantViolation("vertex declaration ids exhausted"))?;
        self.layouts.insert(id, Arc::new(layout));
        Ok(id)
    }

    /// Create a declaration from a serialized `D3DVERTEXELEMENT9` array.
    pub fn create_vertex_declaration_from_bytes(
        &mut self,
        bytes: &[u8],
    ) -> Result<InputLayoutId, DdiError> {
        let decl = VertexDeclaration::from_d3d_bytes(bytes)?;
        self.create_vertex_declaration(&decl)
    }

    pub fn set_vertex_declaration(&mut self, id: Option<InputLayoutId>) -> Result<(), DdiError> {
        let layout = id
            .map(|id| {
                self.layouts.get(&id).cloned().ok_or_else(|| {
                    DdiError::invalid(format!("unknown vertex declaration {}", id.0))
                })
            })
            .transpose()?;
        if self.state.input_mut().set_input_layout(layout) {
            self.state.mark(DirtyFlags::INPUT_LAYOUT);
        }
        Ok(())
    }

    pub fn destroy_vertex_declaration(&mut self, id: InputLayoutId) -> Result<(), DdiError> {
        if self.layouts.remove(&id).is_none() {
            return Err(DdiError::invalid(format!(
                "unknown vertex declaration {}",
                id.0
            )));
        }
        if self.state.input_mut().on_layout_destroyed(id) {
            self.state.mark(DirtyFlags::INPUT_LAYOUT);
        }
        Ok(())
    }

    // Shaders.

    /// Translate `bytecode` and create the native module for it.
    pub fn create_shader(
        &mut self,
        stage: ShaderStage,
        bytecode: &[u8],
    ) -> Result<ShaderId, DdiError> {
        if stage == ShaderStage::Geometry {
            return Err(DdiError::NotImplemented("geometry shaders"));
        }
        validate_blob(bytecode)?;
        let translated = self.translator.translate(stage, bytecode)?;
        if translated.stage != stage {
            return Err(ShaderTranslateError::Translation(format!(
                "translator returned a {} shader for {stage} bytecode",
                translated.stage
            ))
            .into());
        }
        let content_hash = blake3::hash(bytecode);
        let id = self.register_shader(translated, content_hash, false)?;
        debug!(shader = id.raw(), %stage, hash = %content_hash.to_hex(), "shader created");
        Ok(id)
    }

    fn register_shader(
        &mut self,
        translated: TranslatedShader,
        content_hash: blake3::Hash,
        fixed_function: bool,
    ) -> Result<ShaderId, DdiError> {
        let id = ShaderId::new(self.next_shader_id)
            .ok_or(DdiError::InvariantViolation("shader ids exhausted"))?;
        let module = self.native.create_shader_module(&translated)?;
        self.next_shader_id += 1;
        self.shaders.insert(
            id,
            Shader {
                binding: ShaderBinding {
                    id,
                    module,
                    translated: Arc::new(translated),
                },
                content_hash,
                fixed_function,
            },
        );
        Ok(id)
    }

    fn app_shader(&self, id: ShaderId, stage: ShaderStage) -> Result<ShaderBinding, DdiError> {
        let shader = self
            .shaders
            .get(&id)
            .filter(|s| !s.fixed_function)
            .ok_or_else(|| DdiError::invalid(format!("unknown shader {}", id.raw())))?;
        if shader.stage() != stage {
            return Err(DdiError::invalid(format!(
                "shader {} is a {} shader, not {stage}",
                id.raw(),
                shader.stage()
            )));
        }
        Ok(shader.binding.clone())
    }

    pub fn set_vertex_shader(&mut self, id: Option<ShaderId>) -> Result<(), DdiError> {
        let binding = id
            .map(|id| self.app_shader(id, ShaderStage::Vertex))
            .transpose()?;
        if self.state.vertex_mut().set_shader(binding) {
            self.state.mark(DirtyFlags::VERTEX_SHADER);
        }
        Ok(())
    }

    pub fn set_pixel_shader(&mut self, id: Option<ShaderId>) -> Result<(), DdiError> {
        let binding = id
            .map(|id| self.app_shader(id, ShaderStage::Pixel))
            .transpose()?;
        if self.state.pixel_mut().set_shader(binding) {
            self.state.mark(DirtyFlags::PIXEL_SHADER);
        }
        Ok(())
    }

    /// Destroy an application shader. It is unbound if bound, and every cached pipeline built
    /// with it leaves the cache. Those pipelines are destroyed at the next flush.
    pub fn destroy_shader(&mut self, id: ShaderId) -> Result<(), DdiError> {
        if !self.shaders.get(&id).is_some_and(|s| !s.fixed_function) {
            return Err(DdiError::invalid(format!("unknown shader {}", id.raw())));
        }
        if self.state.vertex().shader().is_some_and(|s| s.id == id) {
            self.state.vertex_mut().set_shader(None);
            self.state.mark(DirtyFlags::VERTEX_SHADER);
        }
        if self.state.pixel().shader().is_some_and(|s| s.id == id) {
            self.state.pixel_mut().set_shader(None);
            self.state.mark(DirtyFlags::PIXEL_SHADER);
        }
        let removed = self.state.cache_mut().on_shader_destroyed(id);
        if removed > 0 {
            self.state.invalidate_pipeline();
        }
        if let Some(shader) = self.shaders.remove(&id) {
            self.native.destroy_shader_module(shader.binding.module)?;
        }
        debug!(shader = id.raw(), removed, "shader destroyed");
        Ok(())
    }

    /// Fixed-function variant for `key`, generated on first use and owned by the device.
    fn fixed_function_shader(&mut self, key: FixedFunctionKey) -> Result<ShaderBinding, DdiError> {
        if let Some(shader) = self
            .fixed_function
            .get(&key)
            .and_then(|id| self.shaders.get(id))
        {
            return Ok(shader.binding.clone());
        }
        let translated = self.translator.fixed_function(&key)?;
        if translated.stage != key.stage {
            return Err(DdiError::InvariantViolation(
                "fixed-function variant generated for the wrong stage",
            ));
        }
        let content_hash = blake3::hash(translated.wgsl.as_bytes());
        let id = self.register_shader(translated, content_hash, true)?;
        self.fixed_function.insert(key, id);
        debug!(shader = id.raw(), ?key, "fixed-function shader generated");
        self.shaders
            .get(&id)
            .map(|s| s.binding.clone())
            .ok_or(DdiError::InvariantViolation("fixed-function shader missing"))
    }

    /// Bind fixed-function variants on stages without an application shader.
    fn ensure_fixed_function(&mut self) -> Result<(), DdiError> {
        let texture_mask = self.state.pixel().texture_mask();
        let texture_stages = (u16::BITS - texture_mask.leading_zeros()) as u8;

        if self.state.vertex().shader().is_none() {
            let layout = self.state.input().input_layout();
            let key = FixedFunctionKey {
                stage: ShaderStage::Vertex,
                layout_hash: layout.map_or(EMPTY_LAYOUT_HASH, |l| l.hash()),
                pretransformed: layout.is_some_and(|l| l.uses_pretransformed_position()),
                point_size: layout.is_some_and(|l| l.has_point_size()),
                texture_stages,
            };
            let binding = self.fixed_function_shader(key)?;
            if self.state.vertex_mut().set_fixed_function_shader(Some(binding)) {
                self.state.mark(DirtyFlags::VERTEX_SHADER);
            }
        }
        if self.state.pixel().shader().is_none() {
            let key = FixedFunctionKey {
                stage: ShaderStage::Pixel,
                layout_hash: EMPTY_LAYOUT_HASH,
                pretransformed: false,
                point_size: false,
                texture_stages,
            };
            let binding = self.fixed_function_shader(key)?;
            if self.state.pixel_mut().set_fixed_function_shader(Some(binding)) {
                self.state.mark(DirtyFlags::PIXEL_SHADER);
            }
        }
        Ok(())
    }

    // Constants.

    pub fn set_vertex_shader_constant_f(
        &mut self,
        start_register: u32,
        values: &[[f32; 4]],
    ) -> Result<(), DdiError> {
        self.constants
            .set_floats(ShaderStage::Vertex, start_register, values)
    }

    pub fn set_vertex_shader_constant_i(
        &mut self,
        start_register: u32,
        values: &[[i32; 4]],
    ) -> Result<(), DdiError> {
        self.constants
            .set_ints(ShaderStage::Vertex, start_register, values)
    }

    pub fn set_vertex_shader_constant_b(
        &mut self,
        start_register: u32,
        values: &[u32],
    ) -> Result<(), DdiError> {
        self.constants
            .set_bools(ShaderStage::Vertex, start_register, values)
    }

    pub fn set_pixel_shader_constant_f(
        &mut self,
        start_register: u32,
        values: &[[f32; 4]],
    ) -> Result<(), DdiError> {
        self.constants
            .set_floats(ShaderStage::Pixel, start_register, values)
    }

    pub fn set_pixel_shader_constant_i(
        &mut self,
        start_register: u32,
        values: &[[i32; 4]],
    ) -> Result<(), DdiError> {
        self.constants
            .set_ints(ShaderStage::Pixel, start_register, values)
    }

    pub fn set_pixel_shader_constant_b(
        &mut self,
        start_register: u32,
        values: &[u32],
    ) -> Result<(), DdiError> {
        self.constants
            .set_bools(ShaderStage::Pixel, start_register, values)
    }

    /// `SetClipPlane`, in clip space.
    pub fn set_clip_plane(&mut self, index: u32, plane: [f32; 4]) -> Result<(), DdiError> {
        let index = index as usize;
        if index >= MAX_CLIP_PLANES {
            return Err(DdiError::invalid(format!(
                "clip plane {index} out of range (max {MAX_CLIP_PLANES})"
            )));
        }
        if self
            .state
            .vertex_mut()
            .update_extension(|e| e.clip_planes[index] = plane)
        {
            self.state.mark(DirtyFlags::VS_EXTENSION);
        }
        Ok(())
    }

    // Output merger and rasterizer.

    /// `SetRenderTarget`. Binding slot 0 resets the viewport and scissor rect to the new target.
    pub fn set_render_target(
        &mut self,
        index: u32,
        surface: Option<SurfaceRef>,
    ) -> Result<(), DdiError> {
        let changed = self
            .state
            .pixel_mut()
            .set_render_target(index as usize, surface)
            .inspect_err(|err| debug!(index, error = %err, "SetRenderTarget rejected"))?;
        if !changed {
            return Ok(());
        }
        let mut flags = DirtyFlags::RENDER_TARGETS;
        if let (0, Some(surface)) = (index, surface) {
            let full = Viewport {
                width: surface.width as f32,
                height: surface.height as f32,
                ..Viewport::default()
            };
            if self.state.vertex_mut().set_viewport(full) {
                flags |= DirtyFlags::VIEWPORT | DirtyFlags::VS_EXTENSION;
            }
            let rect = ScissorRect {
                x: 0,
                y: 0,
                width: surface.width,
                height: surface.height,
            };
            if self.state.vertex_mut().set_scissor_rect(rect) {
                flags |= DirtyFlags::SCISSOR;
            }
        }
        flags |= self.refresh_alpha_to_coverage();
        self.state.mark(flags);
        Ok(())
    }

    /// `None` for an unbound or out-of-range slot.
    pub fn render_target(&self, index: u32) -> Option<SurfaceRef> {
        self.state.pixel().render_target(index as usize).copied()
    }

    pub fn num_bound_render_targets(&self) -> usize {
        self.state.pixel().num_bound_render_targets()
    }

    pub fn set_depth_stencil_surface(&mut self, surface: Option<SurfaceRef>) -> Result<(), DdiError> {
        let changed = self
            .state
            .pixel_mut()
            .set_depth_stencil_surface(surface)
            .inspect_err(|err| debug!(error = %err, "SetDepthStencilSurface rejected"))?;
        if changed {
            self.state.mark(DirtyFlags::RENDER_TARGETS);
        }
        Ok(())
    }

    pub fn set_viewport(&mut self, viewport: Viewport) -> Result<(), DdiError> {
        let finite = [
            viewport.x,
            viewport.y,
            viewport.width,
            viewport.height,
            viewport.min_depth,
            viewport.max_depth,
        ]
        .iter()
        .all(|v| v.is_finite());
        let depth_ok = (0.0..=1.0).contains(&viewport.min_depth)
            && (0.0..=1.0).contains(&viewport.max_depth);
        if !finite || !depth_ok || viewport.width < 0.0 || viewport.height < 0.0 {
            debug!(?viewport, "SetViewport rejected");
            return Err(DdiError::invalid("malformed viewport"));
        }
        if self.state.vertex_mut().set_viewport(viewport) {
            self.state
                .mark(DirtyFlags::VIEWPORT | DirtyFlags::VS_EXTENSION);
        }
        Ok(())
    }

    /// `SetScissorRect` with a `RECT` in target pixels.
    pub fn set_scissor_rect(&mut self, left: i32, top: i32, right: i32, bottom: i32) {
        let rect = ScissorRect::from_rect(left, top, right, bottom);
        if self.state.vertex_mut().set_scissor_rect(rect) {
            self.state.mark(DirtyFlags::SCISSOR);
        }
    }

    /// `SetTexture` for pixel sampler `slot`.
    pub fn set_texture(&mut self, slot: u32, view: Option<TextureViewId>) -> Result<(), DdiError> {
        let changed = self
            .state
            .pixel_mut()
            .set_texture(slot as usize, view)
            .inspect_err(|err| debug!(slot, error = %err, "SetTexture rejected"))?;
        if changed {
            self.state.mark(DirtyFlags::TEXTURES);
        }
        Ok(())
    }

    // Wrapped resources.

    /// Shared handle to the wrapped-resource set, usable from other threads.
    pub fn wrapped_resources(&self) -> Arc<WrappedResources> {
        Arc::clone(&self.wrapped)
    }

    pub fn wrap_resource(&self, resource: ResourceHandle) -> bool {
        self.wrapped.wrap(resource)
    }

    pub fn unwrap_resource(&self, resource: ResourceHandle) -> bool {
        self.wrapped.unwrap(resource)
    }

    pub fn is_wrapped(&self, resource: ResourceHandle) -> bool {
        self.wrapped.is_wrapped(resource)
    }

    fn check_wrapped(&self) -> Result<(), DdiError> {
        let wrapped = self.wrapped.lock();
        if wrapped.is_empty() {
            return Ok(());
        }
        let input = self.state.input();
        let pixel = self.state.pixel();
        let app_buffer = |buffer: &InputBuffer| match buffer {
            InputBuffer::App { buffer, .. } => Some(ResourceHandle::Buffer(*buffer)),
            _ => None,
        };
        let buffers = (0..crate::vertex::MAX_VERTEX_STREAMS)
            .filter_map(|i| input.stream(i))
            .filter_map(|s| app_buffer(&s.buffer))
            .chain(input.index_buffer().and_then(|ib| app_buffer(&ib.buffer)));
        let views = (0..MAX_RENDER_TARGETS)
            .filter_map(|i| pixel.render_target(i))
            .chain(pixel.depth_stencil_surface())
            .map(|s| s.view)
            .chain((0..MAX_SAMPLERS).filter_map(|i| pixel.texture(i)))
            .map(ResourceHandle::TextureView);
        match buffers.chain(views).find(|r| wrapped.contains(r)) {
            Some(resource) => {
                debug!(?resource, "draw rejected: resource is wrapped");
                Err(DdiError::invalid(format!(
                    "{resource:?} is wrapped and cannot be used for drawing"
                )))
            }
            None => Ok(()),
        }
    }

    /// A render target that is also bound as a texture is a feedback loop the native API
    /// rejects.
    fn check_hazards(&self) -> Result<(), DdiError> {
        let pixel = self.state.pixel();
        for view in (0..MAX_RENDER_TARGETS).filter_map(|i| pixel.render_target(i).map(|s| s.view)) {
            if (0..MAX_SAMPLERS).any(|slot| pixel.texture(slot) == Some(view)) {
                return Err(DdiError::invalid(format!(
                    "render target {view:?} is also bound as a texture"
                )));
            }
        }
        Ok(())
    }

    // Draws.

    /// `DrawPrimitive`.
    pub fn draw_primitive(
        &mut self,
        primitive: D3DPrimitiveType,
        start_vertex: u32,
        primitive_count: u32,
    ) -> Result<(), DdiError> {
        let vertex_count = vertex_count(primitive, primitive_count)?;
        self.draw(
            primitive,
            DrawParams {
                indexed: false,
                vertex_start: start_vertex,
                vertex_count,
                base_vertex: 0,
                index_start: 0,
                index_count: 0,
            },
        )
    }

    /// `DrawIndexedPrimitive`. Indices reference vertices
    /// `base_vertex_index + [min_vertex_index, min_vertex_index + num_vertices)`.
    pub fn draw_indexed_primitive(
        &mut self,
        primitive: D3DPrimitiveType,
        base_vertex_index: i32,
        min_vertex_index: u32,
        num_vertices: u32,
        start_index: u32,
        primitive_count: u32,
    ) -> Result<(), DdiError> {
        let index_count = vertex_count(primitive, primitive_count)?;
        let vertex_start =
            u32::try_from(i64::from(base_vertex_index) + i64::from(min_vertex_index))
                .map_err(|_| DdiError::invalid("base vertex index points before the buffer"))?;
        self.draw(
            primitive,
            DrawParams {
                indexed: true,
                vertex_start,
                vertex_count: num_vertices,
                base_vertex: base_vertex_index,
                index_start: start_index,
                index_count,
            },
        )
    }

    /// `DrawPrimitiveUP`. Stream 0 is unbound afterwards, as the runtime expects.
    pub fn draw_primitive_up(
        &mut self,
        primitive: D3DPrimitiveType,
        primitive_count: u32,
        vertex_data: &[u8],
        stride: u32,
    ) -> Result<(), DdiError> {
        let vertex_count = vertex_count(primitive, primitive_count)?;
        self.set_stream_source(0, Some(InputBuffer::system_memory(vertex_data)), 0, stride)?;
        let result = self.draw(
            primitive,
            DrawParams {
                indexed: false,
                vertex_start: 0,
                vertex_count,
                base_vertex: 0,
                index_start: 0,
                index_count: 0,
            },
        );
        let unbind = self.set_stream_source(0, None, 0, 0);
        result.and(unbind)
    }

    /// `DrawIndexedPrimitiveUP`. Stream 0 and the index buffer are unbound afterwards.
    #[allow(clippy::too_many_arguments)]
    pub fn draw_indexed_primitive_up(
        &mut self,
        primitive: D3DPrimitiveType,
        min_vertex_index: u32,
        num_vertices: u32,
        primitive_count: u32,
        index_data: &[u8],
        index_format: IndexFormat,
        vertex_data: &[u8],
        stride: u32,
    ) -> Result<(), DdiError> {
        let index_count = vertex_count(primitive, primitive_count)?;
        self.set_stream_source(0, Some(InputBuffer::system_memory(vertex_data)), 0, stride)?;
        self.set_indices(Some(IndexBinding {
            buffer: InputBuffer::system_memory(index_data),
            format: index_format,
            offset: 0,
        }));
        let result = self.draw(
            primitive,
            DrawParams {
                indexed: true,
                vertex_start: min_vertex_index,
                vertex_count: num_vertices,
                base_vertex: 0,
                index_start: 0,
                index_count,
            },
        );
        self.set_indices(None);
        let unbind = self.set_stream_source(0, None, 0, 0);
        result.and(unbind)
    }

    fn draw(&mut self, primitive: D3DPrimitiveType, params: DrawParams) -> Result<(), DdiError> {
        let count = if params.indexed {
            params.index_count
        } else {
            params.vertex_count
        };
        if count < primitive.min_vertices() {
            trace!(%primitive, count, "draw without a whole primitive skipped");
            return Ok(());
        }
        if self.state.input_mut().set_primitive_type(primitive) {
            self.state.mark(DirtyFlags::PRIMITIVE_TOPOLOGY);
        }
        self.check_wrapped()?;
        if self.config.validate {
            self.check_hazards()?;
        }
        let (width, height) = self
            .state
            .pixel()
            .target_size()
            .ok_or_else(|| DdiError::invalid("draw without a render target"))?;
        if self.state.vertex().effective_scissor(width, height).is_none() {
            trace!(%primitive, "draw clipped away by an empty scissor rect");
            return Ok(());
        }
        self.ensure_fixed_function()?;

        let resolved =
            self.state
                .resolve_deferred_state(&mut self.native, &mut self.uploads, &params)?;
        let result = self.record_draw(&resolved);
        if resolved.input.pushed_transient {
            self.state.input_mut().pop_transient_index_buffer();
        }
        if let Err(err) = &result {
            self.state.restore_dirty(resolved.dirty);
            self.constants.invalidate();
            warn!(error = %err, "draw could not be recorded");
        }
        result
    }

    /// Emit the binds the draw needs and the draw itself as one submission.
    fn record_draw(&mut self, resolved: &ResolvedDraw) -> Result<(), DdiError> {
        self.state.take_resolve();
        let mut commands = Vec::new();
        let input = &resolved.input;

        if self.bound_pipeline != Some(resolved.pipeline) {
            commands.push(NativeCommand::SetPipeline(resolved.pipeline));
        }

        let stream_mask = self.state.desc().stream_mask;
        for vb in &input.vertex_buffers {
            if input.rebind_streams & (1 << vb.stream) == 0 {
                continue;
            }
            if let Some(slot) = vertex_buffer_slot(stream_mask, vb.stream) {
                commands.push(NativeCommand::SetVertexBuffer {
                    slot,
                    buffer: vb.buffer,
                    offset: vb.offset,
                });
            }
        }
        if let Some(ib) = input.index_buffer.filter(|_| input.rebind_index) {
            commands.push(NativeCommand::SetIndexBuffer {
                buffer: ib.buffer,
                offset: ib.offset,
                format: ib.format,
            });
        }

        let dirty = resolved.dirty;
        let pixel = self.state.pixel();
        if dirty.intersects(DirtyFlags::RENDER_TARGETS | DirtyFlags::DEPTH_STENCIL | DirtyFlags::TEXTURES) {
            commands.push(NativeCommand::SetRenderTargets {
                colors: std::array::from_fn(|i| pixel.render_target(i).map(|s| s.view)),
                depth_stencil: pixel.depth_stencil_surface().map(|s| s.view),
                depth_read_only: self.state.desc().depth_read_only,
            });
        }
        if dirty.intersects(DirtyFlags::VIEWPORT | DirtyFlags::RENDER_TARGETS) {
            commands.push(NativeCommand::SetViewport(resolved.viewport));
        }
        if dirty.intersects(DirtyFlags::SCISSOR | DirtyFlags::RENDER_TARGETS) {
            commands.push(NativeCommand::SetScissorRect(resolved.scissor));
        }
        if dirty.contains(DirtyFlags::DYNAMIC) {
            commands.push(NativeCommand::SetBlendConstant(unpack_d3dcolor(
                pixel.blend_factor(),
            )));
            commands.push(NativeCommand::SetStencilReference(u32::from(
                pixel.depth_stencil().stencil_ref,
            )));
        }
        if dirty.contains(DirtyFlags::SAMPLERS) {
            for slot in 0..MAX_SAMPLERS {
                if let Some(state) = pixel.sampler(slot) {
                    commands.push(NativeCommand::SetSampler {
                        slot: slot as u32,
                        state: *state,
                    });
                }
            }
        }
        if dirty.contains(DirtyFlags::TEXTURES) {
            for slot in 0..MAX_SAMPLERS {
                commands.push(NativeCommand::SetShaderResource {
                    slot: slot as u32,
                    view: pixel.texture(slot),
                });
            }
        }

        // Constants go last: which registers are read depends on the shaders the pipeline uses.
        let vs_usage = self
            .state
            .vertex()
            .active_shader()
            .map(ShaderBinding::constants)
            .unwrap_or_default();
        let ps_usage = self
            .state
            .pixel()
            .active_shader()
            .map(ShaderBinding::constants)
            .unwrap_or_default();
        let vs_extension = *self.state.vertex().extension();
        let ps_extension = *self.state.pixel().extension();
        self.constants.update_app_visible_and_bind_to_pipeline(
            ShaderStage::Vertex,
            vs_usage,
            bytemuck::bytes_of(&vs_extension),
            &mut self.uploads,
            &mut self.native,
            &mut commands,
        )?;
        self.constants.update_app_visible_and_bind_to_pipeline(
            ShaderStage::Pixel,
            ps_usage,
            bytemuck::bytes_of(&ps_extension),
            &mut self.uploads,
            &mut self.native,
            &mut commands,
        )?;

        commands.push(NativeCommand::from(input.draw));
        self.native.submit_commands(&commands)?;
        self.bound_pipeline = Some(resolved.pipeline);
        self.state.input_mut().commit_bindings(input);
        trace!(
            commands = commands.len(),
            pipeline = resolved.pipeline.raw(),
            "draw recorded"
        );
        Ok(())
    }

    // Map, flush and teardown.

    /// Called before the runtime maps a resource. Builds the pipeline for the current state early
    /// when enough of it is present; failures are logged and otherwise ignored.
    pub fn prepare_for_map(&mut self) -> Option<PipelineId> {
        if !self.config.early_pipeline_on_map {
            return None;
        }
        if let Err(err) = self.ensure_fixed_function() {
            debug!(error = %err, "fixed-function shaders unavailable for early pipeline build");
            return None;
        }
        match self.state.prewarm(&mut self.native) {
            Ok(pipeline) => pipeline,
            Err(err) => {
                debug!(error = %err, "early pipeline build failed");
                None
            }
        }
    }

    /// Flush, then destroy pipelines that left the cache since the last flush.
    pub fn flush(&mut self) -> Result<(), DdiError> {
        self.native.flush()?;
        self.state.cache_mut().destroy_retired(&mut self.native)?;
        Ok(())
    }

    /// Flush, then destroy upload buffers retired by ring growth. Returns how many were destroyed.
    pub fn retire_uploads(&mut self) -> Result<usize, DdiError> {
        self.flush()?;
        let retired = self.uploads.clear_deferred(&mut self.native)?;
        if retired > 0 {
            // Constant versions and bound vertex windows may live in the destroyed buffers.
            self.constants.invalidate();
            self.state.input_mut().forget_bindings();
            self.state.mark(DirtyFlags::VERTEX_BUFFERS | DirtyFlags::INDEX_BUFFER);
            debug!(retired, "retired upload buffers destroyed");
        }
        Ok(retired)
    }

    /// Destroy every native object the device owns and hand the native device back.
    pub fn shutdown(mut self) -> Result<D, DdiError> {
        self.flush()?;
        self.state.cache_mut().clear(&mut self.native)?;
        for (_, shader) in self.shaders.drain() {
            self.native.destroy_shader_module(shader.binding.module)?;
        }
        self.fixed_function.clear();
        self.constants.destroy(&mut self.native)?;
        self.uploads.destroy(&mut self.native)?;
        debug!("device shut down");
        Ok(self.native)
    }
}

fn vertex_count(primitive: D3DPrimitiveType, primitive_count: u32) -> Result<u32, DdiError> {
    primitive.vertex_count(primitive_count).ok_or_else(|| {
        DdiError::invalid(format!(
            "{primitive_count} {primitive} primitives overflow the vertex count"
        ))
    })
}
