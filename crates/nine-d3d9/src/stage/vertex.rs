//! Vertex stage: shader binding, rasterizer, clipping and the viewport.

use bytemuck::{Pod, Zeroable};

use super::update_slot;
use crate::pipeline::PipelineStateDesc;
use crate::shader::ShaderBinding;
use crate::state::tracker::RasterizerState;
use crate::state::DirtyFlags;

pub const MAX_CLIP_PLANES: usize = 6;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScissorRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl ScissorRect {
    /// From a `RECT`; inverted or negative extents collapse to an empty rectangle.
    pub fn from_rect(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        let x = left.max(0);
        let y = top.max(0);
        Self {
            x: x as u32,
            y: y as u32,
            width: right.saturating_sub(x).max(0) as u32,
            height: bottom.saturating_sub(y).max(0) as u32,
        }
    }
}

/// Clamp to the render target. A degenerate viewport covers the whole target.
pub fn clamp_viewport(mut viewport: Viewport, target_width: u32, target_height: u32) -> Viewport {
    let tw = target_width as f32;
    let th = target_height as f32;

    viewport.min_depth = viewport.min_depth.clamp(0.0, 1.0);
    viewport.max_depth = viewport.max_depth.clamp(viewport.min_depth, 1.0);
    let full = Viewport {
        x: 0.0,
        y: 0.0,
        width: tw,
        height: th,
        ..viewport
    };

    if viewport.width <= 0.0 || viewport.height <= 0.0 || tw == 0.0 || th == 0.0 {
        return full;
    }
    viewport.x = viewport.x.clamp(0.0, tw);
    viewport.y = viewport.y.clamp(0.0, th);
    viewport.width = viewport.width.clamp(0.0, tw - viewport.x);
    viewport.height = viewport.height.clamp(0.0, th - viewport.y);
    if viewport.width <= 0.0 || viewport.height <= 0.0 {
        full
    } else {
        viewport
    }
}

/// Clamp to the render target. `None` means nothing can be drawn.
pub fn clamp_scissor(rect: ScissorRect, target_width: u32, target_height: u32) -> Option<ScissorRect> {
    if rect.width == 0 || rect.height == 0 || rect.x >= target_width || rect.y >= target_height {
        return None;
    }
    Some(ScissorRect {
        x: rect.x,
        y: rect.y,
        width: rect.width.min(target_width - rect.x),
        height: rect.height.min(target_height - rect.y),
    })
}

/// Fixed-function parameters the translated vertex shader reads from the extension slot.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct VsExtension {
    /// Screen space to clip space for pre-transformed vertices: `clip = pos * scale + offset`.
    pub viewport_scale: [f32; 4],
    pub viewport_offset: [f32; 4],
    /// size, min, max, scale enable.
    pub point: [f32; 4],
    /// start, end, density, `D3DFOGMODE`.
    pub fog: [f32; 4],
    /// clip plane enable mask, pretransformed, per-vertex point size, unused.
    pub flags: [u32; 4],
    pub clip_planes: [[f32; 4]; MAX_CLIP_PLANES],
}

impl VsExtension {
    fn set_viewport_transform(&mut self, vp: &Viewport) {
        if vp.width <= 0.0 || vp.height <= 0.0 {
            self.viewport_scale = [0.0; 4];
            self.viewport_offset = [0.0, 0.0, 0.0, 1.0];
            return;
        }
        let sx = 2.0 / vp.width;
        let sy = -2.0 / vp.height;
        let depth_range = vp.max_depth - vp.min_depth;
        let (sz, oz) = if depth_range > 0.0 {
            (1.0 / depth_range, -vp.min_depth / depth_range)
        } else {
            (0.0, 0.0)
        };
        // D3D9 samples pixels at integer coordinates, half a pixel off from wgpu.
        let ox = -1.0 + (0.5 - vp.x) * sx;
        let oy = 1.0 + (0.5 - vp.y) * sy;
        self.viewport_scale = [sx, sy, sz, 1.0];
        self.viewport_offset = [ox, oy, oz, 0.0];
    }
}

#[derive(Debug, Default)]
pub struct VertexStage {
    shader: Option<ShaderBinding>,
    fixed_function: Option<ShaderBinding>,
    rasterizer: RasterizerState,
    clip_plane_enable: u32,
    viewport: Viewport,
    scissor: ScissorRect,
    extension: VsExtension,
}

impl VertexStage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shader(&self) -> Option<&ShaderBinding> {
        self.shader.as_ref()
    }

    /// Application shader when bound, else the fixed-function variant.
    pub fn active_shader(&self) -> Option<&ShaderBinding> {
        self.shader.as_ref().or(self.fixed_function.as_ref())
    }

    pub fn set_shader(&mut self, shader: Option<ShaderBinding>) -> bool {
        update_slot(&mut self.shader, shader)
    }

    pub fn set_fixed_function_shader(&mut self, shader: Option<ShaderBinding>) -> bool {
        update_slot(&mut self.fixed_function, shader)
    }

    pub fn rasterizer(&self) -> &RasterizerState {
        &self.rasterizer
    }

    pub fn update_rasterizer(&mut self, f: impl FnOnce(&mut RasterizerState)) -> bool {
        let before = self.rasterizer;
        f(&mut self.rasterizer);
        before != self.rasterizer
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn set_viewport(&mut self, viewport: Viewport) -> bool {
        update_slot(&mut self.viewport, viewport)
    }

    pub fn scissor_rect(&self) -> ScissorRect {
        self.scissor
    }

    pub fn set_scissor_rect(&mut self, rect: ScissorRect) -> bool {
        update_slot(&mut self.scissor, rect)
    }

    pub fn clip_plane_enable(&self) -> u32 {
        self.clip_plane_enable
    }

    pub fn set_clip_plane_enable(&mut self, mask: u32) -> bool {
        let mask = mask & ((1 << MAX_CLIP_PLANES) - 1);
        let changed = update_slot(&mut self.clip_plane_enable, mask);
        self.extension.flags[0] = mask;
        changed
    }

    pub fn extension(&self) -> &VsExtension {
        &self.extension
    }

    pub fn update_extension(&mut self, f: impl FnOnce(&mut VsExtension)) -> bool {
        let before = self.extension;
        f(&mut self.extension);
        before != self.extension
    }

    /// Viewport used for drawing into a `width` x `height` target.
    pub fn effective_viewport(&self, width: u32, height: u32) -> Viewport {
        clamp_viewport(self.viewport, width, height)
    }

    /// Scissor used for drawing; the whole target when the scissor test is off.
    pub fn effective_scissor(&self, width: u32, height: u32) -> Option<ScissorRect> {
        let rect = if self.rasterizer.scissor_enable {
            self.scissor
        } else {
            ScissorRect {
                x: 0,
                y: 0,
                width,
                height,
            }
        };
        clamp_scissor(rect, width, height)
    }

    /// Write the rasterizer part of `desc` and refresh the extension payload. Returns whether the
    /// pipeline has to be looked up again.
    pub fn resolve_deferred_state(
        &mut self,
        desc: &mut PipelineStateDesc,
        dirty: DirtyFlags,
        target: (u32, u32),
        pretransformed: bool,
        point_size: bool,
    ) -> bool {
        desc.rasterizer = self.rasterizer;
        // Pre-transformed vertices are already clipped by the application.
        if pretransformed {
            desc.rasterizer.depth_clip_enable = false;
        }

        let viewport = self.effective_viewport(target.0, target.1);
        self.extension.set_viewport_transform(&viewport);
        self.extension.flags[1] = u32::from(pretransformed);
        self.extension.flags[2] = u32::from(point_size);

        dirty.intersects(DirtyFlags::RASTER | DirtyFlags::VERTEX_SHADER | DirtyFlags::INPUT_LAYOUT)
    }
}
