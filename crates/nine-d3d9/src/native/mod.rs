//! The seam between the state machine and the GPU API that executes it.

mod recording;
mod wgpu_device;

pub use recording::{RecordedPipeline, RecordingDevice};
pub use wgpu_device::WgpuNativeDevice;

use nine_gpu::hal::{BufferId, GpuBackend, PipelineId, ShaderModuleId, TextureViewId};
use nine_gpu::GpuError;

use crate::input::{DrawCall, IndexFormat};
use crate::pipeline::PipelineStateDesc;
use crate::shader::{ShaderBinding, ShaderId, ShaderStage, TranslatedShader};
use crate::stage::{ScissorRect, Viewport};
use crate::state::tracker::{SamplerState, MAX_RENDER_TARGETS};

/// Shaders a pipeline is built from. Identity decides cache hits; modules are what gets linked.
#[derive(Clone, Copy, Debug, Default)]
pub struct PipelineShaders<'a> {
    pub vs: Option<&'a ShaderBinding>,
    pub ps: Option<&'a ShaderBinding>,
    pub gs: Option<&'a ShaderBinding>,
}

impl PipelineShaders<'_> {
    pub fn ids(&self) -> [Option<ShaderId>; 3] {
        [self.vs, self.ps, self.gs].map(|s| s.map(|s| s.id))
    }
}

/// Command-list level operations recorded per draw.
#[derive(Clone, Debug, PartialEq)]
pub enum NativeCommand {
    SetPipeline(PipelineId),
    /// `slot` indexes the pipeline's vertex buffer layouts, see [`vertex_buffer_slot`].
    SetVertexBuffer {
        slot: u32,
        buffer: BufferId,
        offset: u64,
    },
    SetIndexBuffer {
        buffer: BufferId,
        offset: u64,
        format: IndexFormat,
    },
    SetConstantBuffer {
        stage: ShaderStage,
        slot: u32,
        buffer: BufferId,
        offset: u64,
        size: u64,
    },
    SetRenderTargets {
        colors: [Option<TextureViewId>; MAX_RENDER_TARGETS],
        depth_stencil: Option<TextureViewId>,
        depth_read_only: bool,
    },
    SetViewport(Viewport),
    SetScissorRect(ScissorRect),
    SetBlendConstant([f32; 4]),
    SetStencilReference(u32),
    SetSampler {
        slot: u32,
        state: SamplerState,
    },
    SetShaderResource {
        slot: u32,
        view: Option<TextureViewId>,
    },
    Draw {
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    },
}

impl From<DrawCall> for NativeCommand {
    fn from(draw: DrawCall) -> Self {
        match draw {
            DrawCall::Draw {
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            } => NativeCommand::Draw {
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            },
            DrawCall::DrawIndexed {
                index_count,
                instance_count,
                first_index,
                base_vertex,
                first_instance,
            } => NativeCommand::DrawIndexed {
                index_count,
                instance_count,
                first_index,
                base_vertex,
                first_instance,
            },
        }
    }
}

/// Pipelines declare one vertex buffer layout per used stream, in stream order.
pub fn vertex_buffer_slot(stream_mask: u16, stream: u32) -> Option<u32> {
    let bit = 1u16.checked_shl(stream)?;
    if stream_mask & bit == 0 {
        return None;
    }
    Some((stream_mask & (bit - 1)).count_ones())
}

/// Pipeline, shader and command operations on top of the buffer HAL.
pub trait NativeDevice: GpuBackend {
    fn create_shader_module(&mut self, shader: &TranslatedShader)
        -> Result<ShaderModuleId, GpuError>;

    fn destroy_shader_module(&mut self, id: ShaderModuleId) -> Result<(), GpuError>;

    fn create_pipeline(
        &mut self,
        desc: &PipelineStateDesc,
        shaders: &PipelineShaders<'_>,
    ) -> Result<PipelineId, GpuError>;

    fn destroy_pipeline(&mut self, id: PipelineId) -> Result<(), GpuError>;

    fn submit_commands(&mut self, commands: &[NativeCommand]) -> Result<(), GpuError>;

    /// Hand everything submitted so far to the GPU queue.
    fn flush(&mut self) -> Result<(), GpuError>;
}
