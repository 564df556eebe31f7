use nine_d3d9::state::tracker::{
    BlendFactor, BlendOp, ColorWriteMask, CompareFunc, CullMode, D3DFormat, FillMode,
    RasterizerState, RenderTargetBlend, StencilOp, TextureAddress,
};
use nine_d3d9::state::{
    translate_address_mode, translate_blend_component, translate_blend_factor,
    translate_blend_op, translate_color_target, translate_color_write_mask, translate_compare_func,
    translate_cull_and_front_face, translate_depth_bias, translate_depth_format,
    translate_polygon_mode, translate_render_target_format, translate_stencil_op,
};

#[test]
fn cull_mode_respects_front_face() {
    let mut raster = RasterizerState::default();
    raster.cull_mode = CullMode::CW;
    raster.front_counter_clockwise = false; // front is CW
    let (front_face, cull_mode) = translate_cull_and_front_face(&raster);
    assert_eq!(front_face, wgpu::FrontFace::Cw);
    assert_eq!(cull_mode, Some(wgpu::Face::Front));

    raster.front_counter_clockwise = true; // front is CCW
    let (front_face, cull_mode) = translate_cull_and_front_face(&raster);
    assert_eq!(front_face, wgpu::FrontFace::Ccw);
    assert_eq!(cull_mode, Some(wgpu::Face::Back));

    raster.cull_mode = CullMode::None;
    assert_eq!(translate_cull_and_front_face(&raster).1, None);
}

#[test]
fn compare_func_maps_correctly() {
    assert_eq!(
        translate_compare_func(CompareFunc::LessEqual),
        wgpu::CompareFunction::LessEqual
    );
    assert_eq!(
        translate_compare_func(CompareFunc::Always),
        wgpu::CompareFunction::Always
    );
}

#[test]
fn stencil_op_maps_correctly() {
    assert_eq!(
        translate_stencil_op(StencilOp::IncrSat),
        wgpu::StencilOperation::IncrementClamp
    );
    assert_eq!(
        translate_stencil_op(StencilOp::Decr),
        wgpu::StencilOperation::DecrementWrap
    );
}

#[test]
fn blend_factor_maps_correctly() {
    assert_eq!(
        translate_blend_factor(BlendFactor::SrcAlpha),
        wgpu::BlendFactor::SrcAlpha
    );
    assert_eq!(
        translate_blend_factor(BlendFactor::InvDestColor),
        wgpu::BlendFactor::OneMinusDst
    );
    assert_eq!(
        translate_blend_factor(BlendFactor::BlendFactor),
        wgpu::BlendFactor::Constant
    );
}

#[test]
fn blend_op_maps_correctly() {
    assert_eq!(
        translate_blend_op(BlendOp::RevSubtract),
        wgpu::BlendOperation::ReverseSubtract
    );
    assert_eq!(translate_blend_op(BlendOp::Max), wgpu::BlendOperation::Max);
}

#[test]
fn min_max_blend_forces_unit_factors() {
    let component =
        translate_blend_component(BlendFactor::SrcAlpha, BlendFactor::Zero, BlendOp::Min);
    assert_eq!(component.src_factor, wgpu::BlendFactor::One);
    assert_eq!(component.dst_factor, wgpu::BlendFactor::One);
    assert_eq!(component.operation, wgpu::BlendOperation::Min);
}

#[test]
fn color_write_mask_maps_correctly() {
    let mask = ColorWriteMask(0b0101); // R + B
    let translated = translate_color_write_mask(mask);
    assert!(translated.contains(wgpu::ColorWrites::RED));
    assert!(!translated.contains(wgpu::ColorWrites::GREEN));
    assert!(translated.contains(wgpu::ColorWrites::BLUE));
    assert!(!translated.contains(wgpu::ColorWrites::ALPHA));
}

#[test]
fn fill_and_address_modes_map_correctly() {
    assert_eq!(
        translate_polygon_mode(FillMode::Wireframe),
        wgpu::PolygonMode::Line
    );
    assert_eq!(
        translate_address_mode(TextureAddress::Mirror),
        wgpu::AddressMode::MirrorRepeat
    );
    assert_eq!(
        translate_address_mode(TextureAddress::MirrorOnce),
        wgpu::AddressMode::ClampToEdge
    );
}

#[test]
fn surface_formats_map_correctly() {
    assert_eq!(
        translate_render_target_format(D3DFormat::A8R8G8B8),
        Some(wgpu::TextureFormat::Bgra8Unorm)
    );
    assert_eq!(translate_render_target_format(D3DFormat::D24S8), None);
    assert_eq!(
        translate_depth_format(D3DFormat::D24S8),
        Some(wgpu::TextureFormat::Depth24PlusStencil8)
    );
    assert_eq!(translate_depth_format(D3DFormat::A8R8G8B8), None);
}

#[test]
fn depth_bias_scales_to_format_steps() {
    let mut raster = RasterizerState::default();
    raster.depth_bias = 1.0 / f32::from(u16::MAX);
    raster.slope_scaled_depth_bias = 2.0;
    let bias = translate_depth_bias(&raster, wgpu::TextureFormat::Depth16Unorm);
    assert_eq!(bias.constant, 1);
    assert_eq!(bias.slope_scale, 2.0);
}

#[test]
fn dest_alpha_reads_as_one_without_alpha_channel() {
    let blend = RenderTargetBlend {
        blend_enable: true,
        src_blend: BlendFactor::DestAlpha,
        dst_blend: BlendFactor::InvDestAlpha,
        ..Default::default()
    };
    let target = translate_color_target(&blend, wgpu::TextureFormat::Bgra8Unorm, true);
    let state = target.blend.expect("blending enabled");
    assert_eq!(state.color.src_factor, wgpu::BlendFactor::One);
    assert_eq!(state.color.dst_factor, wgpu::BlendFactor::Zero);

    let target = translate_color_target(&blend, wgpu::TextureFormat::Bgra8Unorm, false);
    let state = target.blend.expect("blending enabled");
    assert_eq!(state.color.src_factor, wgpu::BlendFactor::DstAlpha);
    assert_eq!(state.color.dst_factor, wgpu::BlendFactor::OneMinusDstAlpha);
}
