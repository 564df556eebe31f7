//! The per-draw resolver tying input assembly, both stages and the pipeline cache together.

use nine_gpu::hal::PipelineId;
use nine_gpu::FastUploadAllocator;
use tracing::{trace, warn};

use super::cache::PipelineStateCache;
use super::desc::PipelineStateDesc;
use crate::error::DdiError;
use crate::input::{DrawParams, InputAssembly, ResolvedInput};
use crate::native::{NativeDevice, PipelineShaders};
use crate::stage::{PixelStage, ScissorRect, VertexStage, Viewport};
use crate::state::{DirtyFlags, DirtyTracker};

/// Everything the device needs to record one draw.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedDraw {
    pub input: ResolvedInput,
    pub pipeline: PipelineId,
    pub pipeline_changed: bool,
    /// Groups that changed since the previous successful resolve.
    pub dirty: DirtyFlags,
    pub target_size: (u32, u32),
    pub viewport: Viewport,
    pub scissor: ScissorRect,
}

/// Owns the draw-affecting device state and decides when a new pipeline object is needed.
///
/// Setters go through the stage accessors and report what they changed with [`Self::mark`].
/// Resolution either commits completely or leaves the state as it was.
#[derive(Debug)]
pub struct PipelineState {
    dirty: DirtyTracker,
    input: InputAssembly,
    vertex: VertexStage,
    pixel: PixelStage,
    cache: PipelineStateCache,
    /// Descriptor of the last successful resolve.
    desc: PipelineStateDesc,
    current: Option<PipelineId>,
    resolved_for_draw: bool,
}

impl PipelineState {
    pub fn new(cache_capacity: usize) -> Self {
        Self {
            dirty: DirtyTracker::new(),
            input: InputAssembly::new(),
            vertex: VertexStage::new(),
            pixel: PixelStage::new(),
            cache: PipelineStateCache::new(cache_capacity),
            desc: PipelineStateDesc::default(),
            current: None,
            resolved_for_draw: false,
        }
    }

    pub fn mark(&mut self, flags: DirtyFlags) {
        self.dirty.mark(flags);
    }

    pub fn pending(&self) -> DirtyFlags {
        self.dirty.pending()
    }

    pub fn is_clean(&self) -> bool {
        self.dirty.is_clean() && self.current.is_some()
    }

    pub fn input(&self) -> &InputAssembly {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut InputAssembly {
        &mut self.input
    }

    pub fn vertex(&self) -> &VertexStage {
        &self.vertex
    }

    pub fn vertex_mut(&mut self) -> &mut VertexStage {
        &mut self.vertex
    }

    pub fn pixel(&self) -> &PixelStage {
        &self.pixel
    }

    pub fn pixel_mut(&mut self) -> &mut PixelStage {
        &mut self.pixel
    }

    pub fn cache(&self) -> &PipelineStateCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut PipelineStateCache {
        &mut self.cache
    }

    pub fn desc(&self) -> &PipelineStateDesc {
        &self.desc
    }

    pub fn current_pipeline(&self) -> Option<PipelineId> {
        self.current
    }

    /// Forget the bound pipeline, e.g. after the cache dropped it.
    pub fn invalidate_pipeline(&mut self) {
        self.current = None;
        self.dirty.mark(DirtyFlags::PIPELINE);
    }

    /// Enough state is present for a pipeline built now to have a good chance of being the one
    /// the next draw uses.
    ///
    /// This is a hint for building pipelines early. Nothing may depend on it being accurate.
    pub fn needs_pipeline_state(&self) -> bool {
        self.input.input_layout().is_some()
            && self.vertex.active_shader().is_some()
            && self.pixel.active_shader().is_some()
            && self.pixel.target_size().is_some()
            && self.dirty.is_dirty(DirtyFlags::PIPELINE)
    }

    /// Build (or find) the pipeline for the current stage state without committing anything.
    ///
    /// The input part of the descriptor comes from the previous draw, so the result may not be
    /// the pipeline the next draw ends up with.
    pub fn prewarm<D: NativeDevice + ?Sized>(
        &mut self,
        native: &mut D,
    ) -> Result<Option<PipelineId>, DdiError> {
        if !self.needs_pipeline_state() {
            return Ok(None);
        }
        let Some(target) = self.pixel.target_size() else {
            return Ok(None);
        };
        let pending = self.dirty.pending();
        let mut desc = self.desc.clone();
        if let Some(layout) = self.input.input_layout() {
            desc.input_layout_hash = layout.hash();
            desc.stream_mask = layout.stream_mask();
        }
        let (pretransformed, point_size) = layout_flags(&desc);
        self.vertex
            .resolve_deferred_state(&mut desc, pending, target, pretransformed, point_size);
        self.pixel.resolve_deferred_state(&mut desc, pending)?;
        let shaders = PipelineShaders {
            vs: self.vertex.active_shader(),
            ps: self.pixel.active_shader(),
            gs: None,
        };
        let pipeline = self.cache.get_pipeline_state(native, &desc, &shaders)?;
        trace!(?pipeline, "pipeline built ahead of draw");
        Ok(Some(pipeline))
    }

    /// Resolve input assembly, both stages and the pipeline for one draw.
    ///
    /// On success the descriptor and pipeline are committed and every pending dirty flag is
    /// cleared (and returned in [`ResolvedDraw::dirty`]). On failure nothing is committed and any
    /// transient index buffer pushed for the draw is popped again.
    pub fn resolve_deferred_state<D: NativeDevice + ?Sized>(
        &mut self,
        native: &mut D,
        uploads: &mut FastUploadAllocator,
        params: &DrawParams,
    ) -> Result<ResolvedDraw, DdiError> {
        let pending = self.dirty.pending();
        let target_size = self
            .pixel
            .target_size()
            .ok_or_else(|| DdiError::invalid("draw without a render target"))?;

        let mut desc = self.desc.clone();
        let input = self
            .input
            .resolve_deferred_state(&mut desc, pending, uploads, native, params)?;

        match self.resolve_pipeline(native, &mut desc, pending, target_size, &input) {
            Ok((pipeline, pipeline_changed)) => {
                let viewport = self.vertex.effective_viewport(target_size.0, target_size.1);
                let scissor = self
                    .vertex
                    .effective_scissor(target_size.0, target_size.1)
                    .unwrap_or_default();
                self.desc = desc;
                self.current = Some(pipeline);
                self.dirty.clear(pending);
                self.resolved_for_draw = true;
                Ok(ResolvedDraw {
                    input,
                    pipeline,
                    pipeline_changed,
                    dirty: pending,
                    target_size,
                    viewport,
                    scissor,
                })
            }
            Err(err) => {
                if input.pushed_transient {
                    self.input.pop_transient_index_buffer();
                }
                warn!(error = %err, "pipeline state resolve failed");
                Err(err)
            }
        }
    }

    fn resolve_pipeline<D: NativeDevice + ?Sized>(
        &mut self,
        native: &mut D,
        desc: &mut PipelineStateDesc,
        pending: DirtyFlags,
        target: (u32, u32),
        input: &ResolvedInput,
    ) -> Result<(PipelineId, bool), DdiError> {
        let (pretransformed, point_size) = layout_flags(desc);
        let vs_changed =
            self.vertex
                .resolve_deferred_state(desc, pending, target, pretransformed, point_size);
        let ps_changed = self.pixel.resolve_deferred_state(desc, pending)?;

        let lookup = match self.current {
            None => true,
            Some(_) => {
                vs_changed
                    || ps_changed
                    || input.descriptor_changed
                    || pending.intersects(DirtyFlags::PIPELINE)
            }
        };
        if !lookup {
            if let Some(current) = self.current {
                return Ok((current, false));
            }
        }

        let shaders = PipelineShaders {
            vs: self.vertex.active_shader(),
            ps: self.pixel.active_shader(),
            gs: None,
        };
        let pipeline = self.cache.get_pipeline_state(native, desc, &shaders)?;
        Ok((pipeline, self.current != Some(pipeline)))
    }

    /// Put flags consumed by a resolve back, after the draw that used it could not be recorded.
    pub fn restore_dirty(&mut self, flags: DirtyFlags) {
        self.dirty.mark(flags);
    }

    /// Called by the device when it records a draw. Debug builds stop on a draw that was not
    /// preceded by a successful resolve.
    pub fn take_resolve(&mut self) -> bool {
        let resolved = std::mem::take(&mut self.resolved_for_draw);
        debug_assert!(resolved, "draw recorded without resolving pipeline state");
        resolved
    }
}

fn layout_flags(desc: &PipelineStateDesc) -> (bool, bool) {
    desc.input_layout.as_ref().map_or((false, false), |l| {
        (l.uses_pretransformed_position(), l.has_point_size())
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use nine_gpu::hal::{BufferId, ShaderModuleId, TextureViewId};
    use nine_gpu::UploadAllocatorDesc;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::input::{InputBuffer, VertexStream};
    use crate::native::RecordingDevice;
    use crate::shader::{ShaderBinding, ShaderId, ShaderStage, TranslatedShader};
    use crate::stage::{SurfaceRef, SurfaceUsage};
    use crate::state::tracker::{BlendFactor, CullMode, D3DFormat};
    use crate::vertex::{
        DeclType, DeclUsage, InputLayout, InputLayoutId, VertexDeclaration, VertexElement,
    };

    fn shader(id: u64, stage: ShaderStage) -> ShaderBinding {
        ShaderBinding {
            id: ShaderId::new(id).unwrap(),
            module: ShaderModuleId::from_raw(id),
            translated: Arc::new(TranslatedShader {
                stage,
                wgsl: String::new(),
                entry_point: "main".into(),
                constants: Default::default(),
                inputs: Vec::new(),
                outputs: Vec::new(),
                used_samplers: 0,
            }),
        }
    }

    fn ready_state() -> PipelineState {
        let mut state = PipelineState::new(0);
        let layout = InputLayout::new(
            InputLayoutId(1),
            &VertexDeclaration::new(vec![VertexElement::new(
                0,
                0,
                DeclType::Float3,
                DeclUsage::Position,
                0,
            )]),
        )
        .unwrap();
        state.input_mut().set_input_layout(Some(Arc::new(layout)));
        state
            .input_mut()
            .set_stream_source(
                0,
                Some(VertexStream {
                    buffer: InputBuffer::app(BufferId::from_raw(1), 4096),
                    offset: 0,
                    stride: 12,
                }),
            )
            .unwrap();
        state.vertex_mut().set_shader(Some(shader(1, ShaderStage::Vertex)));
        state.pixel_mut().set_shader(Some(shader(2, ShaderStage::Pixel)));
        state
            .pixel_mut()
            .set_render_target(
                0,
                Some(SurfaceRef {
                    view: TextureViewId::from_raw(1),
                    format: D3DFormat::A8R8G8B8,
                    width: 64,
                    height: 64,
                    sample_count: 1,
                    sample_quality: 0,
                    usage: SurfaceUsage::RENDER_TARGET,
                }),
            )
            .unwrap();
        state
    }

    fn ring() -> FastUploadAllocator {
        FastUploadAllocator::new(UploadAllocatorDesc::default()).unwrap()
    }

    fn draw(vertex_count: u32) -> DrawParams {
        DrawParams {
            vertex_count,
            ..Default::default()
        }
    }

    #[test]
    fn clean_state_reuses_pipeline_without_lookup() {
        let mut native = RecordingDevice::new();
        let mut uploads = ring();
        let mut state = ready_state();

        let first = state
            .resolve_deferred_state(&mut native, &mut uploads, &draw(3))
            .unwrap();
        assert!(first.pipeline_changed);
        assert!(state.take_resolve());
        assert!(state.is_clean());

        let second = state
            .resolve_deferred_state(&mut native, &mut uploads, &draw(6))
            .unwrap();
        assert_eq!(second.pipeline, first.pipeline);
        assert!(!second.pipeline_changed);
        assert!(second.dirty.is_empty());
        let stats = state.cache().stats();
        assert_eq!((stats.hits, stats.misses), (0, 1));
    }

    #[test]
    fn descriptor_depends_only_on_net_state() {
        let mut native = RecordingDevice::new();
        let mut uploads = ring();

        let mut a = ready_state();
        a.vertex_mut().update_rasterizer(|r| r.cull_mode = CullMode::None);
        a.pixel_mut().update_blend(|b| {
            b.alpha_blend_enable = true;
            b.src_blend = BlendFactor::SrcAlpha;
        });
        a.resolve_deferred_state(&mut native, &mut uploads, &draw(3))
            .unwrap();

        let mut b = ready_state();
        for _ in 0..3 {
            b.pixel_mut().update_blend(|bl| bl.src_blend = BlendFactor::SrcAlpha);
            b.vertex_mut().update_rasterizer(|r| r.cull_mode = CullMode::CW);
        }
        b.pixel_mut().update_blend(|bl| bl.alpha_blend_enable = true);
        b.vertex_mut().update_rasterizer(|r| r.cull_mode = CullMode::None);
        b.resolve_deferred_state(&mut native, &mut uploads, &draw(3))
            .unwrap();

        assert_eq!(a.desc(), b.desc());
    }

    #[test]
    fn failed_resolve_commits_nothing() {
        let mut native = RecordingDevice::new();
        let mut uploads = ring();
        let mut state = ready_state();
        native.set_fail_pipeline_creation(true);

        let err = state
            .resolve_deferred_state(&mut native, &mut uploads, &draw(3))
            .unwrap_err();
        assert!(matches!(err, DdiError::Gpu(_)));
        assert!(state.current_pipeline().is_none());
        assert_eq!(state.pending(), DirtyFlags::all());
        assert_eq!(state.desc(), &PipelineStateDesc::default());

        native.set_fail_pipeline_creation(false);
        state
            .resolve_deferred_state(&mut native, &mut uploads, &draw(3))
            .unwrap();
        assert!(state.current_pipeline().is_some());
    }

    #[test]
    fn changing_raster_state_selects_another_pipeline() {
        let mut native = RecordingDevice::new();
        let mut uploads = ring();
        let mut state = ready_state();
        let first = state
            .resolve_deferred_state(&mut native, &mut uploads, &draw(3))
            .unwrap()
            .pipeline;

        if state.vertex_mut().update_rasterizer(|r| r.cull_mode = CullMode::None) {
            state.mark(DirtyFlags::RASTER);
        }
        let second = state
            .resolve_deferred_state(&mut native, &mut uploads, &draw(3))
            .unwrap();
        assert_ne!(second.pipeline, first);
        assert_eq!(second.dirty, DirtyFlags::RASTER);

        if state.vertex_mut().update_rasterizer(|r| r.cull_mode = CullMode::CCW) {
            state.mark(DirtyFlags::RASTER);
        }
        let third = state
            .resolve_deferred_state(&mut native, &mut uploads, &draw(3))
            .unwrap();
        assert_eq!(third.pipeline, first);
        assert_eq!(native.pipelines_created(), 2);
    }

    #[test]
    fn prewarm_requires_enough_state_and_does_not_commit() {
        let mut native = RecordingDevice::new();
        let mut empty = PipelineState::new(0);
        assert!(!empty.needs_pipeline_state());
        assert_eq!(empty.prewarm(&mut native).unwrap(), None);

        let mut state = ready_state();
        assert!(state.needs_pipeline_state());
        let early = state.prewarm(&mut native).unwrap();
        assert!(early.is_some());
        assert!(state.current_pipeline().is_none());
        assert_eq!(state.pending(), DirtyFlags::all());
    }

    #[test]
    fn draw_without_render_target_is_rejected() {
        let mut native = RecordingDevice::new();
        let mut uploads = ring();
        let mut state = ready_state();
        state.pixel_mut().set_render_target(0, None).unwrap();
        assert!(matches!(
            state.resolve_deferred_state(&mut native, &mut uploads, &draw(3)),
            Err(DdiError::InvalidArgument(_))
        ));
    }
}
