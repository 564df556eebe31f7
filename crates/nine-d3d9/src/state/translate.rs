//! D3D9 state values to `wgpu` equivalents.

use super::tracker::{
    BlendFactor, BlendOp, ColorWriteMask, CompareFunc, CullMode, D3DFormat, DepthStencilState,
    FillMode, RasterizerState, RenderTargetBlend, StencilFaceState, StencilOp, TextureAddress,
    TextureFilter,
};

pub fn translate_compare_func(func: CompareFunc) -> wgpu::CompareFunction {
    match func {
        CompareFunc::Never => wgpu::CompareFunction::Never,
        CompareFunc::Less => wgpu::CompareFunction::Less,
        CompareFunc::Equal => wgpu::CompareFunction::Equal,
        CompareFunc::LessEqual => wgpu::CompareFunction::LessEqual,
        CompareFunc::Greater => wgpu::CompareFunction::Greater,
        CompareFunc::NotEqual => wgpu::CompareFunction::NotEqual,
        CompareFunc::GreaterEqual => wgpu::CompareFunction::GreaterEqual,
        CompareFunc::Always => wgpu::CompareFunction::Always,
    }
}

pub fn translate_stencil_op(op: StencilOp) -> wgpu::StencilOperation {
    match op {
        StencilOp::Keep => wgpu::StencilOperation::Keep,
        StencilOp::Zero => wgpu::StencilOperation::Zero,
        StencilOp::Replace => wgpu::StencilOperation::Replace,
        StencilOp::IncrSat => wgpu::StencilOperation::IncrementClamp,
        StencilOp::DecrSat => wgpu::StencilOperation::DecrementClamp,
        StencilOp::Invert => wgpu::StencilOperation::Invert,
        StencilOp::Incr => wgpu::StencilOperation::IncrementWrap,
        StencilOp::Decr => wgpu::StencilOperation::DecrementWrap,
    }
}

pub fn translate_blend_factor(factor: BlendFactor) -> wgpu::BlendFactor {
    match factor {
        BlendFactor::Zero => wgpu::BlendFactor::Zero,
        BlendFactor::One => wgpu::BlendFactor::One,
        BlendFactor::SrcColor => wgpu::BlendFactor::Src,
        BlendFactor::InvSrcColor => wgpu::BlendFactor::OneMinusSrc,
        BlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
        BlendFactor::InvSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
        BlendFactor::DestAlpha => wgpu::BlendFactor::DstAlpha,
        BlendFactor::InvDestAlpha => wgpu::BlendFactor::OneMinusDstAlpha,
        BlendFactor::DestColor => wgpu::BlendFactor::Dst,
        BlendFactor::InvDestColor => wgpu::BlendFactor::OneMinusDst,
        BlendFactor::SrcAlphaSat => wgpu::BlendFactor::SrcAlphaSaturated,
        BlendFactor::BlendFactor => wgpu::BlendFactor::Constant,
        BlendFactor::InvBlendFactor => wgpu::BlendFactor::OneMinusConstant,
    }
}

pub fn translate_blend_op(op: BlendOp) -> wgpu::BlendOperation {
    match op {
        BlendOp::Add => wgpu::BlendOperation::Add,
        BlendOp::Subtract => wgpu::BlendOperation::Subtract,
        BlendOp::RevSubtract => wgpu::BlendOperation::ReverseSubtract,
        BlendOp::Min => wgpu::BlendOperation::Min,
        BlendOp::Max => wgpu::BlendOperation::Max,
    }
}

pub fn translate_color_write_mask(mask: ColorWriteMask) -> wgpu::ColorWrites {
    wgpu::ColorWrites::from_bits_truncate(u32::from(mask.0 & 0xF))
}

/// D3D9 culls by winding relative to the declared front face; `wgpu` culls by face.
pub fn translate_cull_and_front_face(
    raster: &RasterizerState,
) -> (wgpu::FrontFace, Option<wgpu::Face>) {
    let front_face = if raster.front_counter_clockwise {
        wgpu::FrontFace::Ccw
    } else {
        wgpu::FrontFace::Cw
    };
    let cull_mode = match raster.cull_mode {
        CullMode::None => None,
        CullMode::CW if raster.front_counter_clockwise => Some(wgpu::Face::Back),
        CullMode::CW => Some(wgpu::Face::Front),
        CullMode::CCW if raster.front_counter_clockwise => Some(wgpu::Face::Front),
        CullMode::CCW => Some(wgpu::Face::Back),
    };
    (front_face, cull_mode)
}

pub fn translate_polygon_mode(fill: FillMode) -> wgpu::PolygonMode {
    match fill {
        FillMode::Point => wgpu::PolygonMode::Point,
        FillMode::Wireframe => wgpu::PolygonMode::Line,
        FillMode::Solid => wgpu::PolygonMode::Fill,
    }
}

/// `wgpu` has no border addressing without an extension; border falls back to clamp.
pub fn translate_address_mode(mode: TextureAddress) -> wgpu::AddressMode {
    match mode {
        TextureAddress::Wrap => wgpu::AddressMode::Repeat,
        TextureAddress::Mirror => wgpu::AddressMode::MirrorRepeat,
        TextureAddress::Clamp | TextureAddress::Border | TextureAddress::MirrorOnce => {
            wgpu::AddressMode::ClampToEdge
        }
    }
}

pub fn translate_filter_mode(filter: TextureFilter) -> wgpu::FilterMode {
    match filter {
        TextureFilter::None | TextureFilter::Point => wgpu::FilterMode::Nearest,
        TextureFilter::Linear | TextureFilter::Anisotropic => wgpu::FilterMode::Linear,
    }
}

pub fn translate_stencil_face(face: StencilFaceState) -> wgpu::StencilFaceState {
    wgpu::StencilFaceState {
        compare: translate_compare_func(face.func),
        fail_op: translate_stencil_op(face.fail),
        depth_fail_op: translate_stencil_op(face.depth_fail),
        pass_op: translate_stencil_op(face.pass),
    }
}

/// Depth-stencil state for a pipeline targeting `format`. Stencil is ignored for formats without
/// a stencil aspect.
pub fn translate_depth_stencil(
    ds: &DepthStencilState,
    raster: &RasterizerState,
    format: wgpu::TextureFormat,
) -> wgpu::DepthStencilState {
    let (depth_write_enabled, depth_compare) = if ds.depth_enable {
        (ds.depth_write_enable, translate_compare_func(ds.depth_func))
    } else {
        (false, wgpu::CompareFunction::Always)
    };

    let stencil = if ds.stencil_enable && format.has_stencil_aspect() {
        // D3D9 front faces are clockwise; the pipeline front face follows the rasterizer.
        let (cw, ccw) = (translate_stencil_face(ds.front), translate_stencil_face(ds.effective_back()));
        let (front, back) = if raster.front_counter_clockwise {
            (ccw, cw)
        } else {
            (cw, ccw)
        };
        wgpu::StencilState {
            front,
            back,
            read_mask: u32::from(ds.stencil_read_mask),
            write_mask: u32::from(ds.stencil_write_mask),
        }
    } else {
        wgpu::StencilState::default()
    };

    wgpu::DepthStencilState {
        format,
        depth_write_enabled,
        depth_compare,
        stencil,
        bias: translate_depth_bias(raster, format),
    }
}

/// D3D9 expresses constant bias in normalized depth units; `wgpu` takes an integer number of
/// minimum resolvable depth steps.
pub fn translate_depth_bias(
    raster: &RasterizerState,
    format: wgpu::TextureFormat,
) -> wgpu::DepthBiasState {
    let steps = match format {
        wgpu::TextureFormat::Depth16Unorm => f32::from(u16::MAX),
        wgpu::TextureFormat::Depth24Plus | wgpu::TextureFormat::Depth24PlusStencil8 => {
            ((1u32 << 24) - 1) as f32
        }
        // Floating point depth: bias is applied in units of 2^-23 at the primitive's exponent.
        _ => (1u32 << 23) as f32,
    };
    let constant = (raster.depth_bias * steps).round();
    wgpu::DepthBiasState {
        constant: constant.clamp(i32::MIN as f32, i32::MAX as f32) as i32,
        slope_scale: raster.slope_scaled_depth_bias,
        clamp: raster.depth_bias_clamp,
    }
}

pub fn translate_blend_component(
    src: BlendFactor,
    dst: BlendFactor,
    op: BlendOp,
) -> wgpu::BlendComponent {
    // Min/Max ignore the factors; wgpu requires them to be One.
    let (src, dst) = match op {
        BlendOp::Min | BlendOp::Max => (wgpu::BlendFactor::One, wgpu::BlendFactor::One),
        _ => (translate_blend_factor(src), translate_blend_factor(dst)),
    };
    wgpu::BlendComponent {
        src_factor: src,
        dst_factor: dst,
        operation: translate_blend_op(op),
    }
}

/// Color target for one render target. For formats without alpha, destination alpha reads as one.
pub fn translate_color_target(
    blend: &RenderTargetBlend,
    format: wgpu::TextureFormat,
    ignores_alpha: bool,
) -> wgpu::ColorTargetState {
    let fix = |factor: BlendFactor| match factor {
        BlendFactor::DestAlpha if ignores_alpha => BlendFactor::One,
        BlendFactor::InvDestAlpha if ignores_alpha => BlendFactor::Zero,
        other => other,
    };
    let blend_state = blend.blend_enable.then(|| wgpu::BlendState {
        color: translate_blend_component(fix(blend.src_blend), fix(blend.dst_blend), blend.blend_op),
        alpha: translate_blend_component(
            fix(blend.src_blend_alpha),
            fix(blend.dst_blend_alpha),
            blend.blend_op_alpha,
        ),
    });
    wgpu::ColorTargetState {
        format,
        blend: blend_state,
        write_mask: translate_color_write_mask(blend.write_mask),
    }
}

pub fn translate_render_target_format(format: D3DFormat) -> Option<wgpu::TextureFormat> {
    use wgpu::TextureFormat as T;
    Some(match format {
        D3DFormat::A8R8G8B8 | D3DFormat::X8R8G8B8 => T::Bgra8Unorm,
        D3DFormat::A8B8G8R8 | D3DFormat::X8B8G8R8 => T::Rgba8Unorm,
        // 16-bit color formats are stored expanded.
        D3DFormat::R5G6B5 | D3DFormat::X1R5G5B5 | D3DFormat::A1R5G5B5 => T::Rgba8Unorm,
        D3DFormat::A2B10G10R10 | D3DFormat::A2R10G10B10 => T::Rgb10a2Unorm,
        D3DFormat::G16R16 => T::Rg16Unorm,
        D3DFormat::A16B16G16R16 => T::Rgba16Unorm,
        D3DFormat::R16F => T::R16Float,
        D3DFormat::G16R16F => T::Rg16Float,
        D3DFormat::A16B16G16R16F => T::Rgba16Float,
        D3DFormat::R32F => T::R32Float,
        D3DFormat::G32R32F => T::Rg32Float,
        D3DFormat::A32B32G32R32F => T::Rgba32Float,
        _ => return None,
    })
}

pub fn translate_depth_format(format: D3DFormat) -> Option<wgpu::TextureFormat> {
    use wgpu::TextureFormat as T;
    Some(match format {
        D3DFormat::D16 => T::Depth16Unorm,
        D3DFormat::D24X8 => T::Depth24Plus,
        D3DFormat::D24S8 | D3DFormat::D24FS8 => T::Depth24PlusStencil8,
        D3DFormat::D32 | D3DFormat::D32FLockable => T::Depth32Float,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stencil_ignored_without_stencil_aspect() {
        let ds = DepthStencilState {
            stencil_enable: true,
            ..Default::default()
        };
        let raster = RasterizerState::default();
        let out = translate_depth_stencil(&ds, &raster, wgpu::TextureFormat::Depth24Plus);
        assert!(!out.stencil.is_enabled());
        let out = translate_depth_stencil(&ds, &raster, wgpu::TextureFormat::Depth24PlusStencil8);
        assert_eq!(out.stencil.read_mask, 0xFF);
    }

    #[test]
    fn disabled_depth_test_passes_everything() {
        let ds = DepthStencilState {
            depth_enable: false,
            ..Default::default()
        };
        let out = translate_depth_stencil(
            &ds,
            &RasterizerState::default(),
            wgpu::TextureFormat::Depth32Float,
        );
        assert!(!out.depth_write_enabled);
        assert_eq!(out.depth_compare, wgpu::CompareFunction::Always);
    }

    #[test]
    fn two_sided_stencil_follows_front_face_winding() {
        let mut ds = DepthStencilState {
            stencil_enable: true,
            two_sided_stencil: true,
            ..Default::default()
        };
        ds.front.pass = StencilOp::Incr;
        ds.back.pass = StencilOp::Decr;
        let mut raster = RasterizerState::default();
        let fmt = wgpu::TextureFormat::Depth24PlusStencil8;

        let out = translate_depth_stencil(&ds, &raster, fmt);
        assert_eq!(out.stencil.front.pass_op, wgpu::StencilOperation::IncrementWrap);
        assert_eq!(out.stencil.back.pass_op, wgpu::StencilOperation::DecrementWrap);

        raster.front_counter_clockwise = true;
        let out = translate_depth_stencil(&ds, &raster, fmt);
        assert_eq!(out.stencil.front.pass_op, wgpu::StencilOperation::DecrementWrap);
    }

    #[test]
    fn dest_alpha_reads_one_on_x8_targets() {
        let blend = RenderTargetBlend {
            blend_enable: true,
            src_blend: BlendFactor::DestAlpha,
            dst_blend: BlendFactor::InvDestAlpha,
            ..Default::default()
        };
        let target = translate_color_target(&blend, wgpu::TextureFormat::Bgra8Unorm, true);
        let color = target.blend.unwrap().color;
        assert_eq!(color.src_factor, wgpu::BlendFactor::One);
        assert_eq!(color.dst_factor, wgpu::BlendFactor::Zero);

        let target = translate_color_target(&blend, wgpu::TextureFormat::Bgra8Unorm, false);
        assert_eq!(target.blend.unwrap().color.src_factor, wgpu::BlendFactor::DstAlpha);
    }

    #[test]
    fn min_max_force_unit_factors() {
        let c = translate_blend_component(BlendFactor::SrcAlpha, BlendFactor::Zero, BlendOp::Max);
        assert_eq!(c.src_factor, wgpu::BlendFactor::One);
        assert_eq!(c.dst_factor, wgpu::BlendFactor::One);
    }

    #[test]
    fn depth_bias_scales_by_format_resolution() {
        let raster = RasterizerState {
            depth_bias: 2.0 / f32::from(u16::MAX),
            ..Default::default()
        };
        let bias = translate_depth_bias(&raster, wgpu::TextureFormat::Depth16Unorm);
        assert_eq!(bias.constant, 2);
    }
}
