//! Typed D3D9 state blocks.
//!
//! These mirror the render-state values the runtime sets, before any translation to `wgpu`.

pub const MAX_RENDER_TARGETS: usize = 4;
pub const MAX_SAMPLERS: usize = 16;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CompareFunc {
    Never,
    Less,
    Equal,
    #[default]
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum StencilOp {
    #[default]
    Keep,
    Zero,
    Replace,
    IncrSat,
    DecrSat,
    Invert,
    Incr,
    Decr,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    InvSrcColor,
    SrcAlpha,
    InvSrcAlpha,
    DestAlpha,
    InvDestAlpha,
    DestColor,
    InvDestColor,
    SrcAlphaSat,
    BlendFactor,
    InvBlendFactor,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BlendOp {
    #[default]
    Add,
    Subtract,
    RevSubtract,
    Min,
    Max,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CullMode {
    None,
    CW,
    #[default]
    CCW,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FillMode {
    Point,
    Wireframe,
    #[default]
    Solid,
}

/// `D3DCOLORWRITEENABLE_*` bits: red, green, blue, alpha from bit 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ColorWriteMask(pub u8);

impl ColorWriteMask {
    pub const ALL: Self = Self(0xF);
}

impl Default for ColorWriteMask {
    fn default() -> Self {
        Self::ALL
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RasterizerState {
    pub fill_mode: FillMode,
    pub cull_mode: CullMode,
    /// D3D9 treats clockwise triangles as front facing.
    pub front_counter_clockwise: bool,
    pub depth_clip_enable: bool,
    pub multisample_enable: bool,
    pub antialiased_line_enable: bool,
    pub forced_sample_count: u8,
    pub scissor_enable: bool,
    pub depth_bias: f32,
    pub slope_scaled_depth_bias: f32,
    pub depth_bias_clamp: f32,
}

impl Default for RasterizerState {
    fn default() -> Self {
        Self {
            fill_mode: FillMode::Solid,
            cull_mode: CullMode::CCW,
            front_counter_clockwise: false,
            depth_clip_enable: true,
            multisample_enable: true,
            antialiased_line_enable: false,
            forced_sample_count: 0,
            scissor_enable: false,
            depth_bias: 0.0,
            slope_scaled_depth_bias: 0.0,
            depth_bias_clamp: 0.0,
        }
    }
}

/// Device-wide D3D9 blend state. D3D9 applies one blend equation to every render target; only
/// the write masks are per target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlendState {
    pub alpha_blend_enable: bool,
    pub src_blend: BlendFactor,
    pub dst_blend: BlendFactor,
    pub blend_op: BlendOp,
    pub separate_alpha_blend_enable: bool,
    pub src_blend_alpha: BlendFactor,
    pub dst_blend_alpha: BlendFactor,
    pub blend_op_alpha: BlendOp,
    pub write_masks: [ColorWriteMask; MAX_RENDER_TARGETS],
}

impl Default for BlendState {
    fn default() -> Self {
        Self {
            alpha_blend_enable: false,
            src_blend: BlendFactor::One,
            dst_blend: BlendFactor::Zero,
            blend_op: BlendOp::Add,
            separate_alpha_blend_enable: false,
            src_blend_alpha: BlendFactor::One,
            dst_blend_alpha: BlendFactor::Zero,
            blend_op_alpha: BlendOp::Add,
            write_masks: [ColorWriteMask::ALL; MAX_RENDER_TARGETS],
        }
    }
}

/// Blend fields for one render target as baked into a pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RenderTargetBlend {
    pub blend_enable: bool,
    /// D3D9 exposes no logic ops; kept so the pipeline key layout covers them.
    pub logic_op_enable: bool,
    pub src_blend: BlendFactor,
    pub dst_blend: BlendFactor,
    pub blend_op: BlendOp,
    pub src_blend_alpha: BlendFactor,
    pub dst_blend_alpha: BlendFactor,
    pub blend_op_alpha: BlendOp,
    pub logic_op: u8,
    pub write_mask: ColorWriteMask,
}

impl Default for RenderTargetBlend {
    fn default() -> Self {
        BlendState::default().render_target_blend(0)
    }
}

impl BlendState {
    pub fn render_target_blend(&self, rt: usize) -> RenderTargetBlend {
        let (src_blend_alpha, dst_blend_alpha, blend_op_alpha) = if self.separate_alpha_blend_enable
        {
            (self.src_blend_alpha, self.dst_blend_alpha, self.blend_op_alpha)
        } else {
            (self.src_blend, self.dst_blend, self.blend_op)
        };
        RenderTargetBlend {
            blend_enable: self.alpha_blend_enable,
            logic_op_enable: false,
            src_blend: self.src_blend,
            dst_blend: self.dst_blend,
            blend_op: self.blend_op,
            src_blend_alpha,
            dst_blend_alpha,
            blend_op_alpha,
            logic_op: 0,
            write_mask: self
                .write_masks
                .get(rt)
                .copied()
                .unwrap_or(ColorWriteMask::ALL),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct StencilFaceState {
    pub fail: StencilOp,
    pub depth_fail: StencilOp,
    pub pass: StencilOp,
    pub func: CompareFunc,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DepthStencilState {
    pub depth_enable: bool,
    pub depth_write_enable: bool,
    pub depth_func: CompareFunc,
    pub stencil_enable: bool,
    pub two_sided_stencil: bool,
    pub front: StencilFaceState,
    /// Used for counter-clockwise faces when `two_sided_stencil` is set.
    pub back: StencilFaceState,
    pub stencil_ref: u8,
    pub stencil_read_mask: u8,
    pub stencil_write_mask: u8,
}

impl Default for DepthStencilState {
    fn default() -> Self {
        let face = StencilFaceState {
            func: CompareFunc::Always,
            ..Default::default()
        };
        Self {
            depth_enable: true,
            depth_write_enable: true,
            depth_func: CompareFunc::LessEqual,
            stencil_enable: false,
            two_sided_stencil: false,
            front: face,
            back: face,
            stencil_ref: 0,
            stencil_read_mask: 0xFF,
            stencil_write_mask: 0xFF,
        }
    }
}

impl DepthStencilState {
    /// Stencil state applied to back faces once two-sided mode is taken into account.
    pub fn effective_back(&self) -> StencilFaceState {
        if self.two_sided_stencil {
            self.back
        } else {
            self.front
        }
    }

    /// True when neither depth nor stencil writes can happen.
    pub fn is_read_only(&self) -> bool {
        let depth_writes = self.depth_enable && self.depth_write_enable;
        let stencil_writes = self.stencil_enable && self.stencil_write_mask != 0;
        !depth_writes && !stencil_writes
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TextureAddress {
    #[default]
    Wrap,
    Mirror,
    Clamp,
    Border,
    MirrorOnce,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TextureFilter {
    None,
    #[default]
    Point,
    Linear,
    Anisotropic,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SamplerState {
    pub address_u: TextureAddress,
    pub address_v: TextureAddress,
    pub address_w: TextureAddress,
    pub border_color: u32,
    pub mag_filter: TextureFilter,
    pub min_filter: TextureFilter,
    pub mip_filter: TextureFilter,
    /// `f32` bits of `D3DSAMP_MIPMAPLODBIAS`.
    pub mip_lod_bias_bits: u32,
    pub max_mip_level: u32,
    pub max_anisotropy: u8,
    pub srgb_texture: bool,
}

impl Default for SamplerState {
    fn default() -> Self {
        Self {
            address_u: TextureAddress::Wrap,
            address_v: TextureAddress::Wrap,
            address_w: TextureAddress::Wrap,
            border_color: 0,
            mag_filter: TextureFilter::Point,
            min_filter: TextureFilter::Point,
            mip_filter: TextureFilter::None,
            mip_lod_bias_bits: 0,
            max_mip_level: 0,
            max_anisotropy: 1,
            srgb_texture: false,
        }
    }
}

/// `D3DFORMAT` values that can back a render target or depth-stencil surface.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum D3DFormat {
    #[default]
    Unknown,
    A8R8G8B8,
    X8R8G8B8,
    A8B8G8R8,
    X8B8G8R8,
    R5G6B5,
    X1R5G5B5,
    A1R5G5B5,
    A2B10G10R10,
    A2R10G10B10,
    G16R16,
    A16B16G16R16,
    R16F,
    G16R16F,
    A16B16G16R16F,
    R32F,
    G32R32F,
    A32B32G32R32F,
    D16,
    D24S8,
    D24X8,
    D24FS8,
    D32,
    D32FLockable,
}

impl D3DFormat {
    pub fn from_d3d(value: u32) -> Option<Self> {
        Some(match value {
            0 => D3DFormat::Unknown,
            21 => D3DFormat::A8R8G8B8,
            22 => D3DFormat::X8R8G8B8,
            23 => D3DFormat::R5G6B5,
            24 => D3DFormat::X1R5G5B5,
            25 => D3DFormat::A1R5G5B5,
            31 => D3DFormat::A2B10G10R10,
            32 => D3DFormat::A8B8G8R8,
            33 => D3DFormat::X8B8G8R8,
            34 => D3DFormat::G16R16,
            35 => D3DFormat::A2R10G10B10,
            36 => D3DFormat::A16B16G16R16,
            71 => D3DFormat::D32,
            75 => D3DFormat::D24S8,
            77 => D3DFormat::D24X8,
            80 => D3DFormat::D16,
            82 => D3DFormat::D32FLockable,
            83 => D3DFormat::D24FS8,
            111 => D3DFormat::R16F,
            112 => D3DFormat::G16R16F,
            113 => D3DFormat::A16B16G16R16F,
            114 => D3DFormat::R32F,
            115 => D3DFormat::G32R32F,
            116 => D3DFormat::A32B32G32R32F,
            _ => return None,
        })
    }

    pub fn is_depth(self) -> bool {
        matches!(
            self,
            D3DFormat::D16
                | D3DFormat::D24S8
                | D3DFormat::D24X8
                | D3DFormat::D24FS8
                | D3DFormat::D32
                | D3DFormat::D32FLockable
        )
    }

    pub fn has_stencil(self) -> bool {
        matches!(self, D3DFormat::D24S8 | D3DFormat::D24FS8)
    }

    /// Color formats whose alpha channel is undefined and reads back as one.
    pub fn ignores_alpha(self) -> bool {
        matches!(
            self,
            D3DFormat::X8R8G8B8 | D3DFormat::X8B8G8R8 | D3DFormat::X1R5G5B5 | D3DFormat::R5G6B5
        )
    }

    /// Dense 5-bit code used when packing pipeline keys.
    pub fn key_code(self) -> u8 {
        self as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alpha_follows_color_unless_separate() {
        let mut blend = BlendState {
            alpha_blend_enable: true,
            src_blend: BlendFactor::SrcAlpha,
            dst_blend: BlendFactor::InvSrcAlpha,
            src_blend_alpha: BlendFactor::One,
            dst_blend_alpha: BlendFactor::Zero,
            ..Default::default()
        };
        let rt = blend.render_target_blend(0);
        assert_eq!(rt.src_blend_alpha, BlendFactor::SrcAlpha);
        assert_eq!(rt.dst_blend_alpha, BlendFactor::InvSrcAlpha);

        blend.separate_alpha_blend_enable = true;
        blend.write_masks[2] = ColorWriteMask(0b0011);
        let rt = blend.render_target_blend(2);
        assert_eq!(rt.src_blend_alpha, BlendFactor::One);
        assert_eq!(rt.write_mask, ColorWriteMask(0b0011));
    }

    #[test]
    fn one_sided_stencil_mirrors_front_face() {
        let mut ds = DepthStencilState::default();
        ds.front.pass = StencilOp::Incr;
        ds.back.pass = StencilOp::Decr;
        assert_eq!(ds.effective_back().pass, StencilOp::Incr);
        ds.two_sided_stencil = true;
        assert_eq!(ds.effective_back().pass, StencilOp::Decr);
    }

    #[test]
    fn read_only_requires_no_depth_or_stencil_writes() {
        let mut ds = DepthStencilState::default();
        assert!(!ds.is_read_only());
        ds.depth_write_enable = false;
        assert!(ds.is_read_only());
        ds.stencil_enable = true;
        assert!(!ds.is_read_only());
        ds.stencil_write_mask = 0;
        assert!(ds.is_read_only());
    }

    #[test]
    fn format_codes_fit_key_field() {
        for raw in 0..256 {
            if let Some(format) = D3DFormat::from_d3d(raw) {
                assert!(format.key_code() < 32, "{format:?}");
            }
        }
        assert!(D3DFormat::D24S8.has_stencil());
        assert!(!D3DFormat::D24X8.has_stencil());
        assert!(D3DFormat::X8R8G8B8.ignores_alpha());
    }
}
