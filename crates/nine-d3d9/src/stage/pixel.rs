//! Pixel stage: shader binding, output merger state, samplers and bound surfaces.

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};
use nine_gpu::hal::TextureViewId;

use super::update_slot;
use crate::error::DdiError;
use crate::pipeline::{PipelineBlendDesc, PipelineStateDesc};
use crate::shader::ShaderBinding;
use crate::state::{translate_depth_format, translate_render_target_format};
use crate::state::tracker::{
    BlendState, D3DFormat, DepthStencilState, RenderTargetBlend, SamplerState, MAX_RENDER_TARGETS,
    MAX_SAMPLERS,
};
use crate::state::DirtyFlags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SurfaceUsage: u8 {
        const RENDER_TARGET = 1 << 0;
        const DEPTH_STENCIL = 1 << 1;
        const SAMPLED = 1 << 2;
    }
}

/// A texture view bound as a render target or depth-stencil surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfaceRef {
    pub view: TextureViewId,
    pub format: D3DFormat,
    pub width: u32,
    pub height: u32,
    pub sample_count: u8,
    pub sample_quality: u8,
    pub usage: SurfaceUsage,
}

/// Fixed-function parameters the translated pixel shader reads from the extension slot.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct PsExtension {
    /// reference (0..1), `D3DCMPFUNC`, enable, unused.
    pub alpha_test: [f32; 4],
    pub fog_color: [f32; 4],
    pub texture_factor: [f32; 4],
}

/// `D3DCOLOR` (A8R8G8B8) to normalized RGBA.
pub fn unpack_d3dcolor(color: u32) -> [f32; 4] {
    let channel = |shift: u32| ((color >> shift) & 0xFF) as f32 / 255.0;
    [channel(16), channel(8), channel(0), channel(24)]
}

#[derive(Debug)]
pub struct PixelStage {
    shader: Option<ShaderBinding>,
    fixed_function: Option<ShaderBinding>,
    blend: BlendState,
    blend_factor: u32,
    depth_stencil: DepthStencilState,
    samplers: [SamplerState; MAX_SAMPLERS],
    textures: [Option<TextureViewId>; MAX_SAMPLERS],
    render_targets: [Option<SurfaceRef>; MAX_RENDER_TARGETS],
    depth_stencil_surface: Option<SurfaceRef>,
    alpha_to_coverage: bool,
    sample_mask: u32,
    extension: PsExtension,
}

impl Default for PixelStage {
    fn default() -> Self {
        Self::new()
    }
}

impl PixelStage {
    pub fn new() -> Self {
        Self {
            shader: None,
            fixed_function: None,
            blend: BlendState::default(),
            blend_factor: 0xFFFF_FFFF,
            depth_stencil: DepthStencilState::default(),
            samplers: [SamplerState::default(); MAX_SAMPLERS],
            textures: [None; MAX_SAMPLERS],
            render_targets: [None; MAX_RENDER_TARGETS],
            depth_stencil_surface: None,
            alpha_to_coverage: false,
            sample_mask: u32::MAX,
            extension: PsExtension {
                texture_factor: [1.0; 4],
                ..Default::default()
            },
        }
    }

    pub fn shader(&self) -> Option<&ShaderBinding> {
        self.shader.as_ref()
    }

    pub fn active_shader(&self) -> Option<&ShaderBinding> {
        self.shader.as_ref().or(self.fixed_function.as_ref())
    }

    pub fn set_shader(&mut self, shader: Option<ShaderBinding>) -> bool {
        update_slot(&mut self.shader, shader)
    }

    pub fn set_fixed_function_shader(&mut self, shader: Option<ShaderBinding>) -> bool {
        update_slot(&mut self.fixed_function, shader)
    }

    pub fn blend(&self) -> &BlendState {
        &self.blend
    }

    pub fn update_blend(&mut self, f: impl FnOnce(&mut BlendState)) -> bool {
        let before = self.blend;
        f(&mut self.blend);
        before != self.blend
    }

    /// `D3DRS_BLENDFACTOR`; dynamic state, not part of the pipeline.
    pub fn blend_factor(&self) -> u32 {
        self.blend_factor
    }

    pub fn set_blend_factor(&mut self, factor: u32) -> bool {
        update_slot(&mut self.blend_factor, factor)
    }

    pub fn depth_stencil(&self) -> &DepthStencilState {
        &self.depth_stencil
    }

    pub fn update_depth_stencil(&mut self, f: impl FnOnce(&mut DepthStencilState)) -> bool {
        let before = self.depth_stencil;
        f(&mut self.depth_stencil);
        before != self.depth_stencil
    }

    pub fn set_alpha_to_coverage(&mut self, enable: bool) -> bool {
        update_slot(&mut self.alpha_to_coverage, enable)
    }

    pub fn set_sample_mask(&mut self, mask: u32) -> bool {
        update_slot(&mut self.sample_mask, mask)
    }

    pub fn extension(&self) -> &PsExtension {
        &self.extension
    }

    pub fn update_extension(&mut self, f: impl FnOnce(&mut PsExtension)) -> bool {
        let before = self.extension;
        f(&mut self.extension);
        before != self.extension
    }

    pub fn sampler(&self, slot: usize) -> Option<&SamplerState> {
        self.samplers.get(slot)
    }

    pub fn update_sampler(
        &mut self,
        slot: usize,
        f: impl FnOnce(&mut SamplerState),
    ) -> Result<bool, DdiError> {
        let sampler = self.samplers.get_mut(slot).ok_or_else(|| {
            DdiError::invalid(format!("sampler {slot} out of range (max {MAX_SAMPLERS})"))
        })?;
        let before = *sampler;
        f(sampler);
        Ok(before != *sampler)
    }

    pub fn texture(&self, slot: usize) -> Option<TextureViewId> {
        self.textures.get(slot).copied().flatten()
    }

    pub fn set_texture(&mut self, slot: usize, view: Option<TextureViewId>) -> Result<bool, DdiError> {
        let entry = self.textures.get_mut(slot).ok_or_else(|| {
            DdiError::invalid(format!("texture stage {slot} out of range (max {MAX_SAMPLERS})"))
        })?;
        Ok(update_slot(entry, view))
    }

    /// Bit `n` set when sampler slot `n` has a texture.
    pub fn texture_mask(&self) -> u16 {
        self.textures
            .iter()
            .enumerate()
            .filter(|(_, t)| t.is_some())
            .fold(0, |mask, (i, _)| mask | (1 << i))
    }

    pub fn set_render_target(
        &mut self,
        index: usize,
        surface: Option<SurfaceRef>,
    ) -> Result<bool, DdiError> {
        if index >= MAX_RENDER_TARGETS {
            return Err(DdiError::invalid(format!(
                "render target {index} out of range (max {MAX_RENDER_TARGETS})"
            )));
        }
        if let Some(s) = &surface {
            if !s.usage.contains(SurfaceUsage::RENDER_TARGET) {
                return Err(DdiError::invalid("surface was not created as a render target"));
            }
            if translate_render_target_format(s.format).is_none() {
                return Err(DdiError::invalid(format!(
                    "{:?} is not a render target format",
                    s.format
                )));
            }
        }
        Ok(update_slot(&mut self.render_targets[index], surface))
    }

    /// `None` for an unbound or out-of-range slot.
    pub fn render_target(&self, index: usize) -> Option<&SurfaceRef> {
        self.render_targets.get(index)?.as_ref()
    }

    /// One past the highest bound slot.
    pub fn num_bound_render_targets(&self) -> usize {
        self.render_targets
            .iter()
            .rposition(Option::is_some)
            .map_or(0, |i| i + 1)
    }

    pub fn set_depth_stencil_surface(&mut self, surface: Option<SurfaceRef>) -> Result<bool, DdiError> {
        if let Some(s) = &surface {
            if !s.usage.contains(SurfaceUsage::DEPTH_STENCIL) {
                return Err(DdiError::invalid("surface was not created as a depth-stencil"));
            }
            if translate_depth_format(s.format).is_none() {
                return Err(DdiError::invalid(format!(
                    "{:?} is not a depth-stencil format",
                    s.format
                )));
            }
        }
        Ok(update_slot(&mut self.depth_stencil_surface, surface))
    }

    pub fn depth_stencil_surface(&self) -> Option<&SurfaceRef> {
        self.depth_stencil_surface.as_ref()
    }

    /// Size of the bound targets, from the first color target or else the depth-stencil.
    pub fn target_size(&self) -> Option<(u32, u32)> {
        self.render_targets
            .iter()
            .flatten()
            .next()
            .or(self.depth_stencil_surface.as_ref())
            .map(|s| (s.width, s.height))
    }

    /// The depth-stencil surface is also bound as a texture.
    pub fn depth_stencil_is_sampled(&self) -> bool {
        self.depth_stencil_surface
            .is_some_and(|ds| self.textures.contains(&Some(ds.view)))
    }

    /// Write the output-merger part of `desc`. Returns whether the pipeline has to be looked up
    /// again.
    pub fn resolve_deferred_state(
        &mut self,
        desc: &mut PipelineStateDesc,
        dirty: DirtyFlags,
    ) -> Result<bool, DdiError> {
        let bound = self.num_bound_render_targets();
        let mut sample_count = None;
        let mut size = None;
        let surfaces = self.render_targets[..bound]
            .iter()
            .flatten()
            .chain(self.depth_stencil_surface.as_ref());
        for s in surfaces {
            match sample_count {
                None => sample_count = Some((s.sample_count.max(1), s.sample_quality)),
                Some(expected) if expected != (s.sample_count.max(1), s.sample_quality) => {
                    return Err(DdiError::invalid(
                        "render target and depth-stencil sample counts differ",
                    ));
                }
                Some(_) => {}
            }
            match size {
                None => size = Some((s.width, s.height)),
                // Depth-stencil may be larger than the color targets; never smaller.
                Some((w, h)) if s.width < w || s.height < h => {
                    return Err(DdiError::invalid("depth-stencil is smaller than the render target"));
                }
                Some(_) => {}
            }
        }
        let (sample_count, sample_quality) = sample_count.unwrap_or((1, 0));

        desc.num_render_targets = bound as u8;
        for (i, format) in desc.render_target_formats.iter_mut().enumerate() {
            *format = self
                .render_targets
                .get(i)
                .copied()
                .flatten()
                .filter(|_| i < bound)
                .map_or(D3DFormat::Unknown, |s| s.format);
        }
        desc.sample_count = sample_count;
        desc.sample_quality = sample_quality;
        desc.sample_mask = self.sample_mask;

        let mut ds = self.depth_stencil;
        match self.depth_stencil_surface {
            Some(surface) => {
                if !surface.format.has_stencil() {
                    ds.stencil_enable = false;
                }
                if self.depth_stencil_is_sampled() {
                    // A sampled depth buffer cannot also be written.
                    ds.depth_write_enable = false;
                    ds.stencil_write_mask = 0;
                }
                desc.depth_stencil_format = surface.format;
                desc.depth_read_only = ds.is_read_only();
            }
            None => {
                ds.depth_enable = false;
                ds.stencil_enable = false;
                desc.depth_stencil_format = D3DFormat::Unknown;
                desc.depth_read_only = false;
            }
        }
        desc.depth_stencil = ds;

        let render_targets: [RenderTargetBlend; MAX_RENDER_TARGETS] =
            std::array::from_fn(|i| self.blend.render_target_blend(i));
        let independent_blend = render_targets[..bound.max(1)]
            .iter()
            .any(|rt| *rt != render_targets[0]);
        desc.blend = PipelineBlendDesc {
            alpha_to_coverage: self.alpha_to_coverage && sample_count > 1,
            independent_blend,
            render_targets,
        };

        Ok(dirty.intersects(
            DirtyFlags::BLEND
                | DirtyFlags::DEPTH_STENCIL
                | DirtyFlags::PIXEL_SHADER
                | DirtyFlags::RENDER_TARGETS
                | DirtyFlags::TEXTURES,
        ))
    }
}
