//! Decoding of `D3DRS_*` and `D3DSAMP_*` values into the typed stage state.

use tracing::debug;

use super::Device;
use crate::native::NativeDevice;
use crate::pipeline::PipelineState;
use crate::stage::{unpack_d3dcolor, PsExtension, VsExtension};
use crate::state::tracker::{
    BlendFactor, BlendOp, BlendState, ColorWriteMask, CompareFunc, CullMode, DepthStencilState, FillMode,
    RasterizerState, StencilOp, TextureAddress, TextureFilter, MAX_SAMPLERS,
};
use crate::state::DirtyFlags;

const MAX_REASONABLE_RENDER_STATE_ID: u32 = 4096;
const MAX_REASONABLE_SAMPLER_STATE_ID: u32 = 64;

/// `MAKEFOURCC('A', 'T', 'O', 'C')` written to `D3DRS_ADAPTIVETESS_Y` turns on alpha to coverage.
pub const ATOC_FOURCC: u32 = u32::from_le_bytes(*b"ATOC");

pub mod d3d9 {
    // D3DRENDERSTATETYPE (subset).
    pub const D3DRS_ZENABLE: u32 = 7;
    pub const D3DRS_FILLMODE: u32 = 8;
    pub const D3DRS_ZWRITEENABLE: u32 = 14;
    pub const D3DRS_ALPHATESTENABLE: u32 = 15;
    pub const D3DRS_SRCBLEND: u32 = 19;
    pub const D3DRS_DESTBLEND: u32 = 20;
    pub const D3DRS_CULLMODE: u32 = 22;
    pub const D3DRS_ZFUNC: u32 = 23;
    pub const D3DRS_ALPHAREF: u32 = 24;
    pub const D3DRS_ALPHAFUNC: u32 = 25;
    pub const D3DRS_ALPHABLENDENABLE: u32 = 27;
    pub const D3DRS_FOGENABLE: u32 = 28;
    pub const D3DRS_FOGCOLOR: u32 = 34;
    pub const D3DRS_FOGTABLEMODE: u32 = 35;
    pub const D3DRS_FOGSTART: u32 = 36;
    pub const D3DRS_FOGEND: u32 = 37;
    pub const D3DRS_FOGDENSITY: u32 = 38;
    pub const D3DRS_STENCILENABLE: u32 = 52;
    pub const D3DRS_STENCILFAIL: u32 = 53;
    pub const D3DRS_STENCILZFAIL: u32 = 54;
    pub const D3DRS_STENCILPASS: u32 = 55;
    pub const D3DRS_STENCILFUNC: u32 = 56;
    pub const D3DRS_STENCILREF: u32 = 57;
    pub const D3DRS_STENCILMASK: u32 = 58;
    pub const D3DRS_STENCILWRITEMASK: u32 = 59;
    pub const D3DRS_TEXTUREFACTOR: u32 = 60;
    pub const D3DRS_FOGVERTEXMODE: u32 = 140;
    pub const D3DRS_CLIPPLANEENABLE: u32 = 152;
    pub const D3DRS_POINTSIZE: u32 = 154;
    pub const D3DRS_POINTSIZE_MIN: u32 = 155;
    pub const D3DRS_POINTSCALEENABLE: u32 = 157;
    pub const D3DRS_MULTISAMPLEANTIALIAS: u32 = 161;
    pub const D3DRS_MULTISAMPLEMASK: u32 = 162;
    pub const D3DRS_POINTSIZE_MAX: u32 = 166;
    pub const D3DRS_COLORWRITEENABLE: u32 = 168;
    pub const D3DRS_BLENDOP: u32 = 171;
    pub const D3DRS_SCISSORTESTENABLE: u32 = 174;
    pub const D3DRS_SLOPESCALEDEPTHBIAS: u32 = 175;
    pub const D3DRS_ANTIALIASEDLINEENABLE: u32 = 176;
    pub const D3DRS_ADAPTIVETESS_Y: u32 = 181;
    pub const D3DRS_TWOSIDEDSTENCILMODE: u32 = 185;
    pub const D3DRS_CCW_STENCILFAIL: u32 = 186;
    pub const D3DRS_CCW_STENCILZFAIL: u32 = 187;
    pub const D3DRS_CCW_STENCILPASS: u32 = 188;
    pub const D3DRS_CCW_STENCILFUNC: u32 = 189;
    pub const D3DRS_COLORWRITEENABLE1: u32 = 190;
    pub const D3DRS_COLORWRITEENABLE2: u32 = 191;
    pub const D3DRS_COLORWRITEENABLE3: u32 = 192;
    pub const D3DRS_BLENDFACTOR: u32 = 193;
    pub const D3DRS_DEPTHBIAS: u32 = 195;
    pub const D3DRS_SEPARATEALPHABLENDENABLE: u32 = 206;
    pub const D3DRS_SRCBLENDALPHA: u32 = 207;
    pub const D3DRS_DESTBLENDALPHA: u32 = 208;
    pub const D3DRS_BLENDOPALPHA: u32 = 209;

    // D3DSAMPLERSTATETYPE.
    pub const D3DSAMP_ADDRESSU: u32 = 1;
    pub const D3DSAMP_ADDRESSV: u32 = 2;
    pub const D3DSAMP_ADDRESSW: u32 = 3;
    pub const D3DSAMP_BORDERCOLOR: u32 = 4;
    pub const D3DSAMP_MAGFILTER: u32 = 5;
    pub const D3DSAMP_MINFILTER: u32 = 6;
    pub const D3DSAMP_MIPFILTER: u32 = 7;
    pub const D3DSAMP_MIPMAPLODBIAS: u32 = 8;
    pub const D3DSAMP_MAXMIPLEVEL: u32 = 9;
    pub const D3DSAMP_MAXANISOTROPY: u32 = 10;
    pub const D3DSAMP_SRGBTEXTURE: u32 = 11;

    // D3DFILLMODE.
    pub const D3DFILL_POINT: u32 = 1;
    pub const D3DFILL_WIREFRAME: u32 = 2;
    pub const D3DFILL_SOLID: u32 = 3;

    // D3DCULL.
    pub const D3DCULL_NONE: u32 = 1;
    pub const D3DCULL_CW: u32 = 2;
    pub const D3DCULL_CCW: u32 = 3;

    // D3DTEXTUREADDRESS.
    pub const D3DTADDRESS_WRAP: u32 = 1;
    pub const D3DTADDRESS_MIRROR: u32 = 2;
    pub const D3DTADDRESS_CLAMP: u32 = 3;
    pub const D3DTADDRESS_BORDER: u32 = 4;
    pub const D3DTADDRESS_MIRRORONCE: u32 = 5;

    // D3DTEXTUREFILTERTYPE.
    pub const D3DTEXF_NONE: u32 = 0;
    pub const D3DTEXF_POINT: u32 = 1;
    pub const D3DTEXF_LINEAR: u32 = 2;
    pub const D3DTEXF_ANISOTROPIC: u32 = 3;
    pub const D3DTEXF_PYRAMIDALQUAD: u32 = 6;
    pub const D3DTEXF_GAUSSIANQUAD: u32 = 7;

    // D3DBLEND.
    pub const D3DBLEND_ZERO: u32 = 1;
    pub const D3DBLEND_ONE: u32 = 2;
    pub const D3DBLEND_SRCCOLOR: u32 = 3;
    pub const D3DBLEND_INVSRCCOLOR: u32 = 4;
    pub const D3DBLEND_SRCALPHA: u32 = 5;
    pub const D3DBLEND_INVSRCALPHA: u32 = 6;
    pub const D3DBLEND_DESTALPHA: u32 = 7;
    pub const D3DBLEND_INVDESTALPHA: u32 = 8;
    pub const D3DBLEND_DESTCOLOR: u32 = 9;
    pub const D3DBLEND_INVDESTCOLOR: u32 = 10;
    pub const D3DBLEND_SRCALPHASAT: u32 = 11;
    pub const D3DBLEND_BOTHSRCALPHA: u32 = 12;
    pub const D3DBLEND_BOTHINVSRCALPHA: u32 = 13;
    pub const D3DBLEND_BLENDFACTOR: u32 = 14;
    pub const D3DBLEND_INVBLENDFACTOR: u32 = 15;

    // D3DBLENDOP.
    pub const D3DBLENDOP_ADD: u32 = 1;
    pub const D3DBLENDOP_SUBTRACT: u32 = 2;
    pub const D3DBLENDOP_REVSUBTRACT: u32 = 3;
    pub const D3DBLENDOP_MIN: u32 = 4;
    pub const D3DBLENDOP_MAX: u32 = 5;

    // D3DCMPFUNC.
    pub const D3DCMP_NEVER: u32 = 1;
    pub const D3DCMP_LESS: u32 = 2;
    pub const D3DCMP_EQUAL: u32 = 3;
    pub const D3DCMP_LESSEQUAL: u32 = 4;
    pub const D3DCMP_GREATER: u32 = 5;
    pub const D3DCMP_NOTEQUAL: u32 = 6;
    pub const D3DCMP_GREATEREQUAL: u32 = 7;
    pub const D3DCMP_ALWAYS: u32 = 8;

    // D3DSTENCILOP.
    pub const D3DSTENCILOP_KEEP: u32 = 1;
    pub const D3DSTENCILOP_ZERO: u32 = 2;
    pub const D3DSTENCILOP_REPLACE: u32 = 3;
    pub const D3DSTENCILOP_INCRSAT: u32 = 4;
    pub const D3DSTENCILOP_DECRSAT: u32 = 5;
    pub const D3DSTENCILOP_INVERT: u32 = 6;
    pub const D3DSTENCILOP_INCR: u32 = 7;
    pub const D3DSTENCILOP_DECR: u32 = 8;

    // D3DFOGMODE.
    pub const D3DFOG_LINEAR: u32 = 3;
}

use d3d9::*;

/// Last value written per state id. Only ids that were set at least once have a value, so the
/// first write of any state always goes through.
#[derive(Debug, Default)]
pub(crate) struct StateValues {
    values: Vec<Option<u32>>,
}

impl StateValues {
    pub(crate) fn get(&self, id: u32) -> Option<u32> {
        self.values.get(id as usize).copied().flatten()
    }

    /// Returns false when `value` is already the current value.
    fn remember(&mut self, id: u32, value: u32) -> bool {
        let idx = id as usize;
        if idx >= self.values.len() {
            self.values.resize(idx + 1, None);
        }
        if self.values[idx] == Some(value) {
            return false;
        }
        self.values[idx] = Some(value);
        true
    }
}

fn changed(did_change: bool, flags: DirtyFlags) -> DirtyFlags {
    if did_change {
        flags
    } else {
        DirtyFlags::empty()
    }
}

fn raster(state: &mut PipelineState, f: impl FnOnce(&mut RasterizerState)) -> DirtyFlags {
    changed(state.vertex_mut().update_rasterizer(f), DirtyFlags::RASTER)
}

fn depth_stencil(state: &mut PipelineState, f: impl FnOnce(&mut DepthStencilState)) -> DirtyFlags {
    changed(
        state.pixel_mut().update_depth_stencil(f),
        DirtyFlags::DEPTH_STENCIL,
    )
}

fn blend(state: &mut PipelineState, f: impl FnOnce(&mut BlendState)) -> DirtyFlags {
    changed(state.pixel_mut().update_blend(f), DirtyFlags::BLEND)
}

impl<D: NativeDevice> Device<D> {
    /// `IDirect3DDevice9::SetRenderState`. Unknown states and values are logged and ignored.
    pub fn set_render_state(&mut self, state_id: u32, value: u32) {
        if state_id > MAX_REASONABLE_RENDER_STATE_ID {
            debug!(
                state_id,
                value, "ignoring suspiciously large D3D9 render state id"
            );
            return;
        }
        if !self.render_states.remember(state_id, value) {
            return;
        }
        let flags = self.apply_render_state(state_id, value);
        self.state.mark(flags);
    }

    /// Last value set for `state_id`, if any.
    pub fn render_state(&self, state_id: u32) -> Option<u32> {
        self.render_states.get(state_id)
    }

    fn apply_render_state(&mut self, state_id: u32, value: u32) -> DirtyFlags {
        let state = &mut self.state;
        match state_id {
            D3DRS_ZENABLE => depth_stencil(state, |ds| ds.depth_enable = value != 0),
            D3DRS_ZWRITEENABLE => depth_stencil(state, |ds| ds.depth_write_enable = value != 0),
            D3DRS_ZFUNC => match d3d9_compare_func(value) {
                Some(func) => depth_stencil(state, |ds| ds.depth_func = func),
                None => unknown(state_id, value, "compare func"),
            },
            D3DRS_STENCILENABLE => depth_stencil(state, |ds| ds.stencil_enable = value != 0),
            D3DRS_TWOSIDEDSTENCILMODE => {
                depth_stencil(state, |ds| ds.two_sided_stencil = value != 0)
            }
            D3DRS_STENCILFUNC => match d3d9_compare_func(value) {
                Some(func) => depth_stencil(state, |ds| ds.front.func = func),
                None => unknown(state_id, value, "compare func"),
            },
            D3DRS_STENCILFAIL => match d3d9_stencil_op(value) {
                Some(op) => depth_stencil(state, |ds| ds.front.fail = op),
                None => unknown(state_id, value, "stencil op"),
            },
            D3DRS_STENCILZFAIL => match d3d9_stencil_op(value) {
                Some(op) => depth_stencil(state, |ds| ds.front.depth_fail = op),
                None => unknown(state_id, value, "stencil op"),
            },
            D3DRS_STENCILPASS => match d3d9_stencil_op(value) {
                Some(op) => depth_stencil(state, |ds| ds.front.pass = op),
                None => unknown(state_id, value, "stencil op"),
            },
            D3DRS_CCW_STENCILFUNC => match d3d9_compare_func(value) {
                Some(func) => depth_stencil(state, |ds| ds.back.func = func),
                None => unknown(state_id, value, "compare func"),
            },
            D3DRS_CCW_STENCILFAIL => match d3d9_stencil_op(value) {
                Some(op) => depth_stencil(state, |ds| ds.back.fail = op),
                None => unknown(state_id, value, "stencil op"),
            },
            D3DRS_CCW_STENCILZFAIL => match d3d9_stencil_op(value) {
                Some(op) => depth_stencil(state, |ds| ds.back.depth_fail = op),
                None => unknown(state_id, value, "stencil op"),
            },
            D3DRS_CCW_STENCILPASS => match d3d9_stencil_op(value) {
                Some(op) => depth_stencil(state, |ds| ds.back.pass = op),
                None => unknown(state_id, value, "stencil op"),
            },
            D3DRS_STENCILMASK => {
                depth_stencil(state, |ds| ds.stencil_read_mask = (value & 0xFF) as u8)
            }
            D3DRS_STENCILWRITEMASK => {
                depth_stencil(state, |ds| ds.stencil_write_mask = (value & 0xFF) as u8)
            }
            // The reference is dynamic state, not part of the pipeline.
            D3DRS_STENCILREF => changed(
                state
                    .pixel_mut()
                    .update_depth_stencil(|ds| ds.stencil_ref = (value & 0xFF) as u8),
                DirtyFlags::DYNAMIC,
            ),

            D3DRS_ALPHABLENDENABLE => blend(state, |b| b.alpha_blend_enable = value != 0),
            D3DRS_SRCBLEND => match value {
                D3DBLEND_BOTHSRCALPHA => blend(state, |b| {
                    b.src_blend = BlendFactor::SrcAlpha;
                    b.dst_blend = BlendFactor::InvSrcAlpha;
                }),
                D3DBLEND_BOTHINVSRCALPHA => blend(state, |b| {
                    b.src_blend = BlendFactor::InvSrcAlpha;
                    b.dst_blend = BlendFactor::SrcAlpha;
                }),
                _ => match d3d9_blend_factor(value) {
                    Some(f) => blend(state, |b| b.src_blend = f),
                    None => unknown(state_id, value, "blend factor"),
                },
            },
            D3DRS_DESTBLEND => match d3d9_blend_factor(value) {
                Some(f) => blend(state, |b| b.dst_blend = f),
                None => unknown(state_id, value, "blend factor"),
            },
            D3DRS_BLENDOP => match d3d9_blend_op(value) {
                Some(op) => blend(state, |b| b.blend_op = op),
                None => unknown(state_id, value, "blend op"),
            },
            D3DRS_SEPARATEALPHABLENDENABLE => {
                blend(state, |b| b.separate_alpha_blend_enable = value != 0)
            }
            D3DRS_SRCBLENDALPHA => match d3d9_blend_factor(value) {
                Some(f) => blend(state, |b| b.src_blend_alpha = f),
                None => unknown(state_id, value, "blend factor"),
            },
            D3DRS_DESTBLENDALPHA => match d3d9_blend_factor(value) {
                Some(f) => blend(state, |b| b.dst_blend_alpha = f),
                None => unknown(state_id, value, "blend factor"),
            },
            D3DRS_BLENDOPALPHA => match d3d9_blend_op(value) {
                Some(op) => blend(state, |b| b.blend_op_alpha = op),
                None => unknown(state_id, value, "blend op"),
            },
            D3DRS_COLORWRITEENABLE => color_write(state, 0, value),
            D3DRS_COLORWRITEENABLE1 => color_write(state, 1, value),
            D3DRS_COLORWRITEENABLE2 => color_write(state, 2, value),
            D3DRS_COLORWRITEENABLE3 => color_write(state, 3, value),
            D3DRS_BLENDFACTOR => changed(
                state.pixel_mut().set_blend_factor(value),
                DirtyFlags::DYNAMIC,
            ),
            D3DRS_MULTISAMPLEMASK => {
                changed(state.pixel_mut().set_sample_mask(value), DirtyFlags::BLEND)
            }
            D3DRS_ADAPTIVETESS_Y => {
                self.atoc_requested = value == ATOC_FOURCC;
                self.refresh_alpha_to_coverage()
            }

            D3DRS_FILLMODE => match d3d9_fill_mode(value) {
                Some(mode) => raster(state, |r| r.fill_mode = mode),
                None => unknown(state_id, value, "fill mode"),
            },
            D3DRS_CULLMODE => match d3d9_cull_mode(value) {
                Some(mode) => raster(state, |r| r.cull_mode = mode),
                None => unknown(state_id, value, "cull mode"),
            },
            D3DRS_DEPTHBIAS => raster(state, |r| r.depth_bias = f32::from_bits(value)),
            D3DRS_SLOPESCALEDEPTHBIAS => {
                raster(state, |r| r.slope_scaled_depth_bias = f32::from_bits(value))
            }
            D3DRS_MULTISAMPLEANTIALIAS => raster(state, |r| r.multisample_enable = value != 0),
            D3DRS_ANTIALIASEDLINEENABLE => {
                raster(state, |r| r.antialiased_line_enable = value != 0)
            }
            // Only changes the effective scissor, not the pipeline.
            D3DRS_SCISSORTESTENABLE => changed(
                state
                    .vertex_mut()
                    .update_rasterizer(|r| r.scissor_enable = value != 0),
                DirtyFlags::SCISSOR,
            ),
            D3DRS_CLIPPLANEENABLE => changed(
                state.vertex_mut().set_clip_plane_enable(value),
                DirtyFlags::VS_EXTENSION,
            ),

            D3DRS_ALPHATESTENABLE => ps_extension(state, |e| {
                e.alpha_test[2] = if value != 0 { 1.0 } else { 0.0 }
            }),
            D3DRS_ALPHAREF => ps_extension(state, |e| {
                e.alpha_test[0] = (value & 0xFF) as f32 / 255.0
            }),
            D3DRS_ALPHAFUNC => match d3d9_compare_func(value) {
                Some(_) => ps_extension(state, |e| e.alpha_test[1] = value as f32),
                None => unknown(state_id, value, "compare func"),
            },
            D3DRS_TEXTUREFACTOR => {
                ps_extension(state, |e| e.texture_factor = unpack_d3dcolor(value))
            }
            D3DRS_FOGCOLOR => ps_extension(state, |e| e.fog_color = unpack_d3dcolor(value)),
            D3DRS_FOGSTART => vs_extension(state, |e| e.fog[0] = f32::from_bits(value)),
            D3DRS_FOGEND => vs_extension(state, |e| e.fog[1] = f32::from_bits(value)),
            D3DRS_FOGDENSITY => vs_extension(state, |e| e.fog[2] = f32::from_bits(value)),
            D3DRS_FOGENABLE | D3DRS_FOGTABLEMODE | D3DRS_FOGVERTEXMODE => {
                if state_id != D3DRS_FOGENABLE && value > D3DFOG_LINEAR {
                    return unknown(state_id, value, "fog mode");
                }
                self.refresh_fog_mode()
            }
            D3DRS_POINTSIZE => vs_extension(state, |e| e.point[0] = f32::from_bits(value)),
            D3DRS_POINTSIZE_MIN => vs_extension(state, |e| e.point[1] = f32::from_bits(value)),
            D3DRS_POINTSIZE_MAX => vs_extension(state, |e| e.point[2] = f32::from_bits(value)),
            D3DRS_POINTSCALEENABLE => vs_extension(state, |e| {
                e.point[3] = if value != 0 { 1.0 } else { 0.0 }
            }),
            _ => {
                debug!(state_id, value, "unhandled D3D9 render state");
                DirtyFlags::empty()
            }
        }
    }

    /// Table fog wins over vertex fog; both are off unless `D3DRS_FOGENABLE` is set.
    fn refresh_fog_mode(&mut self) -> DirtyFlags {
        let enabled = self.render_states.get(D3DRS_FOGENABLE).unwrap_or(0) != 0;
        let mode_of = |id| {
            self.render_states
                .get(id)
                .filter(|&m| m <= D3DFOG_LINEAR)
                .unwrap_or(0)
        };
        let table = mode_of(D3DRS_FOGTABLEMODE);
        let vertex = mode_of(D3DRS_FOGVERTEXMODE);
        let mode = match (enabled, table) {
            (false, _) => 0,
            (true, 0) => vertex,
            (true, table) => table,
        };
        vs_extension(&mut self.state, |e| e.fog[3] = mode as f32)
    }

    /// Alpha to coverage needs both the `ATOC` request and a multisampled render target.
    pub(super) fn refresh_alpha_to_coverage(&mut self) -> DirtyFlags {
        let multisampled = self
            .state
            .pixel()
            .render_target(0)
            .is_some_and(|rt| rt.sample_count > 1);
        let enable = self.atoc_requested && multisampled;
        changed(
            self.state.pixel_mut().set_alpha_to_coverage(enable),
            DirtyFlags::BLEND,
        )
    }

    /// `IDirect3DDevice9::SetSamplerState`. Unknown states and values are logged and ignored.
    pub fn set_sampler_state(&mut self, slot: u32, state_id: u32, value: u32) {
        if state_id > MAX_REASONABLE_SAMPLER_STATE_ID {
            debug!(
                slot,
                state_id, value, "ignoring suspiciously large D3D9 sampler state id"
            );
            return;
        }
        let slot_usize = slot as usize;
        if slot_usize >= MAX_SAMPLERS {
            // Includes the vertex texture samplers (D3DVERTEXTEXTURESAMPLER0..3).
            debug!(slot, state_id, value, "ignoring out-of-range sampler slot");
            return;
        }
        if !self.sampler_states[slot_usize].remember(state_id, value) {
            return;
        }

        let Some(mut sampler) = self.state.pixel().sampler(slot_usize).copied() else {
            return;
        };
        let decoded = match state_id {
            D3DSAMP_ADDRESSU => d3d9_texture_address(value).map(|m| sampler.address_u = m),
            D3DSAMP_ADDRESSV => d3d9_texture_address(value).map(|m| sampler.address_v = m),
            D3DSAMP_ADDRESSW => d3d9_texture_address(value).map(|m| sampler.address_w = m),
            D3DSAMP_BORDERCOLOR => {
                sampler.border_color = value;
                Some(())
            }
            D3DSAMP_MAGFILTER => d3d9_texture_filter(value).map(|f| sampler.mag_filter = f),
            D3DSAMP_MINFILTER => d3d9_texture_filter(value).map(|f| sampler.min_filter = f),
            D3DSAMP_MIPFILTER => d3d9_texture_filter(value).map(|f| sampler.mip_filter = f),
            D3DSAMP_MIPMAPLODBIAS => {
                sampler.mip_lod_bias_bits = value;
                Some(())
            }
            D3DSAMP_MAXMIPLEVEL => {
                sampler.max_mip_level = value;
                Some(())
            }
            D3DSAMP_MAXANISOTROPY => {
                sampler.max_anisotropy = value.clamp(1, 16) as u8;
                Some(())
            }
            D3DSAMP_SRGBTEXTURE => {
                sampler.srgb_texture = value != 0;
                Some(())
            }
            _ => {
                debug!(slot, state_id, value, "unhandled D3D9 sampler state");
                return;
            }
        };
        if decoded.is_none() {
            debug!(slot, state_id, value, "unknown D3D9 sampler state value");
            return;
        }
        if matches!(
            self.state
                .pixel_mut()
                .update_sampler(slot_usize, |s| *s = sampler),
            Ok(true)
        ) {
            self.state.mark(DirtyFlags::SAMPLERS);
        }
    }
}

fn unknown(state_id: u32, value: u32, what: &'static str) -> DirtyFlags {
    debug!(state_id, value, what, "unknown D3D9 render state value");
    DirtyFlags::empty()
}

fn color_write(state: &mut PipelineState, rt: usize, value: u32) -> DirtyFlags {
    blend(state, |b| b.write_masks[rt] = ColorWriteMask((value & 0xF) as u8))
}

fn vs_extension(
    state: &mut PipelineState,
    f: impl FnOnce(&mut VsExtension),
) -> DirtyFlags {
    changed(state.vertex_mut().update_extension(f), DirtyFlags::VS_EXTENSION)
}

fn ps_extension(
    state: &mut PipelineState,
    f: impl FnOnce(&mut PsExtension),
) -> DirtyFlags {
    changed(state.pixel_mut().update_extension(f), DirtyFlags::PS_EXTENSION)
}

pub fn d3d9_compare_func(value: u32) -> Option<CompareFunc> {
    Some(match value {
        D3DCMP_NEVER => CompareFunc::Never,
        D3DCMP_LESS => CompareFunc::Less,
        D3DCMP_EQUAL => CompareFunc::Equal,
        D3DCMP_LESSEQUAL => CompareFunc::LessEqual,
        D3DCMP_GREATER => CompareFunc::Greater,
        D3DCMP_NOTEQUAL => CompareFunc::NotEqual,
        D3DCMP_GREATEREQUAL => CompareFunc::GreaterEqual,
        D3DCMP_ALWAYS => CompareFunc::Always,
        _ => return None,
    })
}

pub fn d3d9_stencil_op(value: u32) -> Option<StencilOp> {
    Some(match value {
        D3DSTENCILOP_KEEP => StencilOp::Keep,
        D3DSTENCILOP_ZERO => StencilOp::Zero,
        D3DSTENCILOP_REPLACE => StencilOp::Replace,
        D3DSTENCILOP_INCRSAT => StencilOp::IncrSat,
        D3DSTENCILOP_DECRSAT => StencilOp::DecrSat,
        D3DSTENCILOP_INVERT => StencilOp::Invert,
        D3DSTENCILOP_INCR => StencilOp::Incr,
        D3DSTENCILOP_DECR => StencilOp::Decr,
        _ => return None,
    })
}

pub fn d3d9_blend_factor(value: u32) -> Option<BlendFactor> {
    Some(match value {
        D3DBLEND_ZERO => BlendFactor::Zero,
        D3DBLEND_ONE => BlendFactor::One,
        D3DBLEND_SRCCOLOR => BlendFactor::SrcColor,
        D3DBLEND_INVSRCCOLOR => BlendFactor::InvSrcColor,
        D3DBLEND_SRCALPHA => BlendFactor::SrcAlpha,
        D3DBLEND_INVSRCALPHA => BlendFactor::InvSrcAlpha,
        D3DBLEND_DESTALPHA => BlendFactor::DestAlpha,
        D3DBLEND_INVDESTALPHA => BlendFactor::InvDestAlpha,
        D3DBLEND_DESTCOLOR => BlendFactor::DestColor,
        D3DBLEND_INVDESTCOLOR => BlendFactor::InvDestColor,
        D3DBLEND_SRCALPHASAT => BlendFactor::SrcAlphaSat,
        D3DBLEND_BLENDFACTOR => BlendFactor::BlendFactor,
        D3DBLEND_INVBLENDFACTOR => BlendFactor::InvBlendFactor,
        _ => return None,
    })
}

pub fn d3d9_blend_op(value: u32) -> Option<BlendOp> {
    Some(match value {
        D3DBLENDOP_ADD => BlendOp::Add,
        D3DBLENDOP_SUBTRACT => BlendOp::Subtract,
        D3DBLENDOP_REVSUBTRACT => BlendOp::RevSubtract,
        D3DBLENDOP_MIN => BlendOp::Min,
        D3DBLENDOP_MAX => BlendOp::Max,
        _ => return None,
    })
}

pub fn d3d9_cull_mode(value: u32) -> Option<CullMode> {
    Some(match value {
        D3DCULL_NONE => CullMode::None,
        D3DCULL_CW => CullMode::CW,
        D3DCULL_CCW => CullMode::CCW,
        _ => return None,
    })
}

pub fn d3d9_fill_mode(value: u32) -> Option<FillMode> {
    Some(match value {
        D3DFILL_POINT => FillMode::Point,
        D3DFILL_WIREFRAME => FillMode::Wireframe,
        D3DFILL_SOLID => FillMode::Solid,
        _ => return None,
    })
}

pub fn d3d9_texture_address(value: u32) -> Option<TextureAddress> {
    Some(match value {
        D3DTADDRESS_WRAP => TextureAddress::Wrap,
        D3DTADDRESS_MIRROR => TextureAddress::Mirror,
        D3DTADDRESS_CLAMP => TextureAddress::Clamp,
        D3DTADDRESS_BORDER => TextureAddress::Border,
        D3DTADDRESS_MIRRORONCE => TextureAddress::MirrorOnce,
        _ => return None,
    })
}

pub fn d3d9_texture_filter(value: u32) -> Option<TextureFilter> {
    Some(match value {
        D3DTEXF_NONE => TextureFilter::None,
        D3DTEXF_POINT => TextureFilter::Point,
        D3DTEXF_LINEAR | D3DTEXF_PYRAMIDALQUAD | D3DTEXF_GAUSSIANQUAD => TextureFilter::Linear,
        D3DTEXF_ANISOTROPIC => TextureFilter::Anisotropic,
        _ => return None,
    })
}
