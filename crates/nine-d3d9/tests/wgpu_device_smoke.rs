mod common;

use common::*;
use nine_d3d9::{Device, DeviceConfig, ShaderStage, WgpuNativeDevice};
use nine_gpu::WgpuBackend;

fn require_webgpu() -> bool {
    std::env::var("NINE_REQUIRE_WEBGPU")
        .ok()
        .map(|raw| {
            let v = raw.trim();
            v == "1" || v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("yes")
        })
        .unwrap_or(false)
}

#[test]
fn device_lifecycle_on_a_real_adapter() {
    init_tracing();
    let backend = match pollster::block_on(WgpuBackend::new_headless()) {
        Ok(backend) => backend,
        Err(err) => {
            if require_webgpu() {
                panic!("NINE_REQUIRE_WEBGPU is enabled but no wgpu device is available: {err}");
            }
            eprintln!("skipping wgpu-dependent test: {err}");
            return;
        }
    };

    let mut device =
        Device::new(DeviceConfig::default(), WgpuNativeDevice::new(backend), TestTranslator)
            .unwrap();

    let texture = device
        .native()
        .backend()
        .device()
        .create_texture(&wgpu::TextureDescriptor {
            label: Some("smoke rt"),
            size: wgpu::Extent3d {
                width: 16,
                height: 16,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Bgra8Unorm,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
    let view = device
        .native_mut()
        .register_texture_view(texture.create_view(&Default::default()), 16, 16);
    device
        .set_render_target(0, Some(render_target(view.raw(), 16, 16, 1)))
        .unwrap();

    let vs = device.create_shader(ShaderStage::Vertex, VS_BYTECODE).unwrap();
    device.set_vertex_shader(Some(vs)).unwrap();
    device
        .set_vertex_shader_constant_f(0, &[[0.5, 0.5, 0.5, 1.0]])
        .unwrap();
    device.flush().unwrap();

    device.set_vertex_shader(None).unwrap();
    device.destroy_shader(vs).unwrap();

    let mut native = device.shutdown().unwrap();
    native.unregister_texture_view(view).unwrap();
    assert_eq!(native.cached_samplers(), 0);
}
