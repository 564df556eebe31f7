#[cfg(target_arch = "wasm32")]
fn main() {}

#[cfg(not(target_arch = "wasm32"))]
use std::sync::Arc;

#[cfg(not(target_arch = "wasm32"))]
use criterion::{black_box, criterion_group, criterion_main, Criterion};
#[cfg(not(target_arch = "wasm32"))]
use nine_d3d9::pipeline::{PipelineStateCache, PipelineStateDesc, PipelineStateKey};
#[cfg(not(target_arch = "wasm32"))]
use nine_d3d9::shader::{ConstantUsage, ShaderBinding};
#[cfg(not(target_arch = "wasm32"))]
use nine_d3d9::state::tracker::{BlendFactor, CullMode, D3DFormat};
#[cfg(not(target_arch = "wasm32"))]
use nine_d3d9::{PipelineShaders, RecordingDevice, ShaderId, ShaderStage, TranslatedShader};
#[cfg(not(target_arch = "wasm32"))]
use nine_gpu::hal::ShaderModuleId;

#[cfg(not(target_arch = "wasm32"))]
fn binding(id: u64, stage: ShaderStage) -> ShaderBinding {
    ShaderBinding {
        id: ShaderId::new(id).unwrap(),
        module: ShaderModuleId::from_raw(id),
        translated: Arc::new(TranslatedShader {
            stage,
            wgsl: String::new(),
            entry_point: "main".into(),
            constants: ConstantUsage::default(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            used_samplers: 0,
        }),
    }
}

/// Two bound targets, depth and alpha blending: roughly what a game's main pass looks like.
#[cfg(not(target_arch = "wasm32"))]
fn typical_desc() -> PipelineStateDesc {
    let mut desc = PipelineStateDesc {
        num_render_targets: 2,
        depth_stencil_format: D3DFormat::D24S8,
        ..Default::default()
    };
    desc.render_target_formats[0] = D3DFormat::A8R8G8B8;
    desc.render_target_formats[1] = D3DFormat::A16B16G16R16F;
    desc.vertex_strides[0] = 32;
    desc.stream_mask = 1;
    desc.rasterizer.cull_mode = CullMode::CW;
    desc.depth_stencil.depth_enable = true;
    desc.blend.render_targets[0].blend_enable = true;
    desc.blend.render_targets[0].src_blend = BlendFactor::SrcAlpha;
    desc.blend.render_targets[0].dst_blend = BlendFactor::InvSrcAlpha;
    desc
}

#[cfg(not(target_arch = "wasm32"))]
fn bench_key(c: &mut Criterion) {
    let desc = typical_desc();
    let vs = ShaderId::new(1);
    let ps = ShaderId::new(2);

    let mut group = c.benchmark_group("d3d9_pipeline_key");
    group.bench_function("build", |b| {
        b.iter(|| {
            let key = PipelineStateKey::new(black_box(&desc), vs, ps, None);
            black_box(key.hash_value());
        })
    });

    let a = PipelineStateKey::new(&desc, vs, ps, None);
    let b_key = PipelineStateKey::new(&desc, vs, ps, None);
    group.bench_function("compare_equal", |b| {
        b.iter(|| black_box(black_box(&a) == black_box(&b_key)))
    });
    group.finish();
}

#[cfg(not(target_arch = "wasm32"))]
fn bench_cache(c: &mut Criterion) {
    let desc = typical_desc();
    let vs = binding(1, ShaderStage::Vertex);
    let ps = binding(2, ShaderStage::Pixel);
    let shaders = PipelineShaders {
        vs: Some(&vs),
        ps: Some(&ps),
        gs: None,
    };

    let mut native = RecordingDevice::new();
    let mut cache = PipelineStateCache::new(4096);
    cache
        .get_pipeline_state(&mut native, &desc, &shaders)
        .expect("first lookup should create the pipeline");

    let mut group = c.benchmark_group("d3d9_pipeline_cache");
    group.bench_function("lookup_hit", |b| {
        b.iter(|| {
            let pipeline = cache
                .get_pipeline_state(&mut native, black_box(&desc), &shaders)
                .unwrap();
            black_box(pipeline);
        })
    });
    group.finish();
}

#[cfg(not(target_arch = "wasm32"))]
criterion_group!(benches, bench_key, bench_cache);
#[cfg(not(target_arch = "wasm32"))]
criterion_main!(benches);
