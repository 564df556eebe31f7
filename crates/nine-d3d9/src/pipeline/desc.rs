use std::sync::Arc;

use crate::state::tracker::{
    D3DFormat, DepthStencilState, RasterizerState, RenderTargetBlend, MAX_RENDER_TARGETS,
};
use crate::vertex::{InputLayout, EMPTY_LAYOUT_HASH, MAX_VERTEX_STREAMS};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineBlendDesc {
    pub alpha_to_coverage: bool,
    /// Render targets do not all share `render_targets[0]`.
    pub independent_blend: bool,
    pub render_targets: [RenderTargetBlend; MAX_RENDER_TARGETS],
}

/// Everything a native pipeline object is built from, apart from the shaders.
///
/// Input assembly, the vertex stage and the pixel stage each fill in their part during resolve.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineStateDesc {
    pub topology: wgpu::PrimitiveTopology,
    pub strip_index_format: Option<wgpu::IndexFormat>,
    /// Not part of the cache key; `input_layout_hash` stands in for it.
    pub input_layout: Option<Arc<InputLayout>>,
    pub input_layout_hash: u64,
    pub vertex_strides: [u32; MAX_VERTEX_STREAMS],
    pub stream_mask: u16,
    pub instance_stream_mask: u16,
    pub num_render_targets: u8,
    pub render_target_formats: [D3DFormat; MAX_RENDER_TARGETS],
    pub depth_stencil_format: D3DFormat,
    pub depth_read_only: bool,
    pub sample_count: u8,
    pub sample_quality: u8,
    pub sample_mask: u32,
    pub rasterizer: RasterizerState,
    pub depth_stencil: DepthStencilState,
    pub blend: PipelineBlendDesc,
}

impl Default for PipelineStateDesc {
    fn default() -> Self {
        Self {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            input_layout: None,
            input_layout_hash: EMPTY_LAYOUT_HASH,
            vertex_strides: [0; MAX_VERTEX_STREAMS],
            stream_mask: 0,
            instance_stream_mask: 0,
            num_render_targets: 0,
            render_target_formats: [D3DFormat::Unknown; MAX_RENDER_TARGETS],
            depth_stencil_format: D3DFormat::Unknown,
            depth_read_only: false,
            sample_count: 1,
            sample_quality: 0,
            sample_mask: u32::MAX,
            rasterizer: RasterizerState::default(),
            depth_stencil: DepthStencilState::default(),
            blend: PipelineBlendDesc::default(),
        }
    }
}

impl PipelineStateDesc {
    pub fn has_depth_stencil(&self) -> bool {
        self.depth_stencil_format != D3DFormat::Unknown
    }

    pub fn bound_render_target_formats(&self) -> &[D3DFormat] {
        &self.render_target_formats[..usize::from(self.num_render_targets).min(MAX_RENDER_TARGETS)]
    }
}
