#![allow(dead_code)]

use nine_d3d9::input::InputBuffer;
use nine_d3d9::shader::ConstantUsage;
use nine_d3d9::stage::{SurfaceRef, SurfaceUsage};
use nine_d3d9::state::tracker::D3DFormat;
use nine_d3d9::vertex::{DeclType, DeclUsage, VertexDeclaration, VertexElement};
use nine_d3d9::{
    Device, DeviceConfig, FixedFunctionKey, NativeCommand, RecordingDevice, ShaderStage,
    ShaderTranslateError, ShaderTranslator, TranslatedShader,
};
use nine_gpu::hal::{BufferDesc, BufferId, BufferUsages, GpuBackend, TextureViewId};

/// `vs_3_0` version token.
pub const VS_BYTECODE: &[u8] = &[0x00, 0x03, 0xFE, 0xFF];
/// `ps_3_0` version token.
pub const PS_BYTECODE: &[u8] = &[0x00, 0x03, 0xFF, 0xFF];
/// Rejected by [`TestTranslator`] as an unsupported instruction.
pub const UNSUPPORTED_BYTECODE: &[u8] = &[0xDE, 0xAD, 0xBE, 0xEF];

pub const VERTEX_BUFFER_SIZE: u64 = 4096;

/// Stands in for the bytecode translator. Vertex shaders read four float registers.
pub struct TestTranslator;

fn translated(stage: ShaderStage, wgsl: String) -> TranslatedShader {
    let constants = match stage {
        ShaderStage::Vertex => ConstantUsage {
            float_registers: 4,
            ..Default::default()
        },
        _ => ConstantUsage::default(),
    };
    TranslatedShader {
        stage,
        wgsl,
        entry_point: "main".into(),
        constants,
        inputs: Vec::new(),
        outputs: Vec::new(),
        used_samplers: 0,
    }
}

impl ShaderTranslator for TestTranslator {
    fn translate(
        &self,
        stage: ShaderStage,
        bytecode: &[u8],
    ) -> Result<TranslatedShader, ShaderTranslateError> {
        if bytecode == UNSUPPORTED_BYTECODE {
            return Err(ShaderTranslateError::Unsupported("texldd".into()));
        }
        Ok(translated(stage, format!("// {} bytes of {stage} bytecode", bytecode.len())))
    }

    fn fixed_function(
        &self,
        key: &FixedFunctionKey,
    ) -> Result<TranslatedShader, ShaderTranslateError> {
        Ok(translated(key.stage, format!("// fixed function {key:?}")))
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn device_with(config: DeviceConfig) -> Device<RecordingDevice> {
    init_tracing();
    Device::new(config, RecordingDevice::new(), TestTranslator).unwrap()
}

pub fn device() -> Device<RecordingDevice> {
    device_with(DeviceConfig::default())
}

pub fn render_target(view: u64, width: u32, height: u32, sample_count: u8) -> SurfaceRef {
    SurfaceRef {
        view: TextureViewId::from_raw(view),
        format: D3DFormat::A8R8G8B8,
        width,
        height,
        sample_count,
        sample_quality: 0,
        usage: SurfaceUsage::RENDER_TARGET,
    }
}

pub fn depth_stencil(view: u64, width: u32, height: u32) -> SurfaceRef {
    SurfaceRef {
        view: TextureViewId::from_raw(view),
        format: D3DFormat::D24S8,
        width,
        height,
        sample_count: 1,
        sample_quality: 0,
        usage: SurfaceUsage::DEPTH_STENCIL,
    }
}

pub fn position_declaration() -> VertexDeclaration {
    VertexDeclaration::new(vec![VertexElement::new(
        0,
        0,
        DeclType::Float3,
        DeclUsage::Position,
        0,
    )])
}

pub fn vertex_buffer(device: &mut Device<RecordingDevice>) -> BufferId {
    device
        .native_mut()
        .create_buffer(BufferDesc {
            label: Some("test vertices".into()),
            size: VERTEX_BUFFER_SIZE,
            usage: BufferUsages::VERTEX,
        })
        .unwrap()
}

/// Position-only declaration, an application vertex buffer on stream 0 and a 64x64 target.
pub fn ready_device_with(config: DeviceConfig) -> (Device<RecordingDevice>, BufferId) {
    let mut device = device_with(config);
    let decl = device
        .create_vertex_declaration(&position_declaration())
        .unwrap();
    device.set_vertex_declaration(Some(decl)).unwrap();
    let vb = vertex_buffer(&mut device);
    device
        .set_stream_source(0, Some(InputBuffer::app(vb, VERTEX_BUFFER_SIZE)), 0, 12)
        .unwrap();
    device
        .set_render_target(0, Some(render_target(1, 64, 64, 1)))
        .unwrap();
    (device, vb)
}

pub fn ready_device() -> (Device<RecordingDevice>, BufferId) {
    ready_device_with(DeviceConfig::default())
}

pub fn count_pipeline_binds(commands: &[NativeCommand]) -> usize {
    commands
        .iter()
        .filter(|c| matches!(c, NativeCommand::SetPipeline(_)))
        .count()
}

pub fn last_draw(commands: &[NativeCommand]) -> Option<&NativeCommand> {
    commands
        .iter()
        .rev()
        .find(|c| matches!(c, NativeCommand::Draw { .. } | NativeCommand::DrawIndexed { .. }))
}
