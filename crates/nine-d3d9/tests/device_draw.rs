mod common;

use common::*;
use nine_d3d9::input::{IndexBinding, IndexFormat, InputBuffer};
use nine_d3d9::stage::{ScissorRect, Viewport};
use nine_d3d9::state::D3DPrimitiveType;
use nine_d3d9::{
    d3d9, ddi_status, DdiError, DeviceConfig, NativeCommand, ResourceHandle, ShaderId,
    ShaderStage, D3DERR_INVALIDCALL, E_NOTIMPL, E_OUTOFMEMORY, S_OK,
};
use nine_gpu::hal::{BufferDesc, BufferUsages, GpuBackend, PipelineId, TextureViewId};
use pretty_assertions::assert_eq;

#[test]
fn repeated_draws_share_one_pipeline() {
    let (mut device, _) = ready_device();
    for _ in 0..10 {
        device
            .draw_primitive(D3DPrimitiveType::TriangleList, 0, 1)
            .unwrap();
    }
    assert_eq!(device.cache_stats().entries, 1);
    assert_eq!(device.native().pipelines_created(), 1);
    assert_eq!(count_pipeline_binds(device.native().commands()), 1);
    // Fixed-function variants for both stages.
    assert_eq!(device.native().live_shader_modules(), 2);
}

#[test]
fn returning_to_earlier_state_hits_the_cache() {
    let (mut device, _) = ready_device();
    device
        .draw_primitive(D3DPrimitiveType::TriangleList, 0, 1)
        .unwrap();
    device.set_render_state(d3d9::D3DRS_CULLMODE, d3d9::D3DCULL_NONE);
    device
        .draw_primitive(D3DPrimitiveType::TriangleList, 0, 1)
        .unwrap();
    device.set_render_state(d3d9::D3DRS_CULLMODE, d3d9::D3DCULL_CCW);
    device
        .draw_primitive(D3DPrimitiveType::TriangleList, 0, 1)
        .unwrap();

    assert_eq!(device.native().pipelines_created(), 2);
    assert!(device.cache_stats().hits >= 1);
    assert_eq!(count_pipeline_binds(device.native().commands()), 3);
}

#[test]
fn destroying_a_shader_drops_its_pipelines() {
    let (mut device, _) = ready_device();
    let vs = device
        .create_shader(ShaderStage::Vertex, VS_BYTECODE)
        .unwrap();
    let ps1 = device.create_shader(ShaderStage::Pixel, PS_BYTECODE).unwrap();
    let ps2 = device.create_shader(ShaderStage::Pixel, PS_BYTECODE).unwrap();
    assert_ne!(ps1, ps2);

    device.set_vertex_shader(Some(vs)).unwrap();
    for ps in [ps1, ps2] {
        device.set_pixel_shader(Some(ps)).unwrap();
        device
            .draw_primitive(D3DPrimitiveType::TriangleList, 0, 1)
            .unwrap();
    }
    assert_eq!(device.cache_stats().entries, 2);

    device.destroy_shader(ps1).unwrap();
    assert_eq!(device.cache_stats().entries, 1);
    assert_eq!(device.native().live_pipelines(), 2);
    device.flush().unwrap();
    assert_eq!(device.native().live_pipelines(), 1);

    device.destroy_shader(vs).unwrap();
    assert_eq!(device.cache_stats().entries, 0);
    device.flush().unwrap();
    assert_eq!(device.native().live_pipelines(), 0);
    assert!(device.state().vertex().shader().is_none());
    assert!(device.shader(vs).is_none());

    // The fixed-function variant takes over.
    device
        .draw_primitive(D3DPrimitiveType::TriangleList, 0, 1)
        .unwrap();
    assert_eq!(device.native().live_pipelines(), 1);

    let err = device.set_pixel_shader(Some(ps1)).unwrap_err();
    assert!(matches!(err, DdiError::InvalidArgument(_)), "{err:?}");
    assert!(device.destroy_shader(ps1).is_err());
}

fn queued_pipelines(device: &nine_d3d9::Device<nine_d3d9::RecordingDevice>) -> Vec<PipelineId> {
    device
        .native()
        .unflushed()
        .iter()
        .filter_map(|c| match c {
            NativeCommand::SetPipeline(id) => Some(*id),
            _ => None,
        })
        .collect()
}

#[test]
fn destroyed_shader_pipelines_outlive_queued_draws() {
    let (mut device, _) = ready_device();
    let ps = device.create_shader(ShaderStage::Pixel, PS_BYTECODE).unwrap();
    device.set_pixel_shader(Some(ps)).unwrap();
    device
        .draw_primitive(D3DPrimitiveType::TriangleList, 0, 1)
        .unwrap();

    device.destroy_shader(ps).unwrap();
    assert_eq!(device.cache_stats().entries, 0);
    assert_eq!(device.native().flush_count(), 0);
    let queued = queued_pipelines(&device);
    assert_eq!(queued.len(), 1);
    assert!(device.native().pipeline(queued[0]).is_some());

    device.flush().unwrap();
    assert!(device.native().pipeline(queued[0]).is_none());
}

#[test]
fn evicted_pipelines_outlive_queued_draws() {
    let config = DeviceConfig {
        pipeline_cache_capacity: 1,
        ..DeviceConfig::default()
    };
    let (mut device, _) = ready_device_with(config);
    device
        .draw_primitive(D3DPrimitiveType::TriangleList, 0, 1)
        .unwrap();
    device.set_render_state(d3d9::D3DRS_CULLMODE, d3d9::D3DCULL_NONE);
    device
        .draw_primitive(D3DPrimitiveType::TriangleList, 0, 1)
        .unwrap();

    assert_eq!(device.cache_stats().evictions, 1);
    let queued = queued_pipelines(&device);
    assert_eq!(queued.len(), 2);
    for id in &queued {
        assert!(device.native().pipeline(*id).is_some(), "{id:?}");
    }

    device.flush().unwrap();
    assert_eq!(device.native().live_pipelines(), 1);
    assert!(device.native().pipeline(queued[1]).is_some());
}

#[test]
fn shader_creation_reports_status_codes() {
    let mut device = device();
    assert_eq!(
        ddi_status(&device.create_shader(ShaderStage::Geometry, VS_BYTECODE)),
        E_NOTIMPL
    );
    assert_eq!(
        ddi_status(&device.create_shader(ShaderStage::Vertex, &[])),
        D3DERR_INVALIDCALL
    );
    assert_eq!(
        ddi_status(&device.create_shader(ShaderStage::Vertex, &[0x00, 0x03, 0xFE])),
        D3DERR_INVALIDCALL
    );
    assert_eq!(
        ddi_status(&device.create_shader(ShaderStage::Pixel, UNSUPPORTED_BYTECODE)),
        D3DERR_INVALIDCALL
    );

    let ps = device.create_shader(ShaderStage::Pixel, PS_BYTECODE);
    assert_eq!(ddi_status(&ps), S_OK);
    let ps = ps.unwrap();
    assert_eq!(device.shader(ps).map(|s| s.stage()), Some(ShaderStage::Pixel));
    assert_eq!(
        ddi_status(&device.set_vertex_shader(Some(ps))),
        D3DERR_INVALIDCALL
    );
    assert_eq!(
        ddi_status(&device.set_vertex_shader(ShaderId::new(999))),
        D3DERR_INVALIDCALL
    );
    assert_eq!(device.native().live_shader_modules(), 1);
}

#[test]
fn triangle_fan_is_drawn_from_synthesized_indices() {
    let (mut device, _) = ready_device();
    device
        .draw_primitive(D3DPrimitiveType::TriangleFan, 0, 2)
        .unwrap();

    let commands = device.native().commands();
    let (buffer, offset) = commands
        .iter()
        .find_map(|c| match c {
            NativeCommand::SetIndexBuffer {
                buffer,
                offset,
                format: IndexFormat::U32,
            } => Some((*buffer, *offset)),
            _ => None,
        })
        .expect("fan index buffer bound");
    assert_eq!(
        last_draw(commands),
        Some(&NativeCommand::DrawIndexed {
            index_count: 6,
            instance_count: 1,
            first_index: 0,
            base_vertex: 0,
            first_instance: 0,
        })
    );

    let data = device.native().backend().buffer_data(buffer).unwrap();
    let start = offset as usize;
    let indices: Vec<u32> = data[start..start + 24]
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    assert_eq!(indices, vec![0, 1, 2, 0, 2, 3]);

    // The same list serves a later fan that starts further into the buffer.
    device.native_mut().take_commands();
    device
        .draw_primitive(D3DPrimitiveType::TriangleFan, 5, 2)
        .unwrap();
    let commands = device.native().commands();
    assert!(!commands
        .iter()
        .any(|c| matches!(c, NativeCommand::SetIndexBuffer { .. })));
    assert!(matches!(
        last_draw(commands),
        Some(NativeCommand::DrawIndexed {
            index_count: 6,
            base_vertex: 5,
            ..
        })
    ));
}

#[test]
fn indexed_user_pointer_fan_expands_application_indices() {
    let (mut device, _) = ready_device();
    let indices: Vec<u8> = [3u16, 2, 1, 0]
        .iter()
        .flat_map(|i| i.to_le_bytes())
        .collect();
    let vertices = [0u8; 48];
    device
        .draw_indexed_primitive_up(
            D3DPrimitiveType::TriangleFan,
            0,
            4,
            2,
            &indices,
            IndexFormat::U16,
            &vertices,
            12,
        )
        .unwrap();

    let commands = device.native().commands();
    let (buffer, offset) = commands
        .iter()
        .find_map(|c| match c {
            NativeCommand::SetIndexBuffer {
                buffer,
                offset,
                format: IndexFormat::U16,
            } => Some((*buffer, *offset)),
            _ => None,
        })
        .expect("expanded index buffer bound");
    let data = device.native().backend().buffer_data(buffer).unwrap();
    let start = offset as usize;
    let expanded: Vec<u16> = data[start..start + 12]
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    assert_eq!(expanded, vec![3, 2, 1, 3, 1, 0]);

    assert!(device.state().input().index_buffer().is_none());
    assert!(device.state().input().stream(0).is_none());
}

#[test]
fn user_pointer_draw_unbinds_stream_zero() {
    let (mut device, _) = ready_device();
    device
        .draw_primitive_up(D3DPrimitiveType::TriangleList, 1, &[0u8; 36], 12)
        .unwrap();
    assert!(device.state().input().stream(0).is_none());
    assert_eq!(
        last_draw(device.native().commands()),
        Some(&NativeCommand::Draw {
            vertex_count: 3,
            instance_count: 1,
            first_vertex: 0,
            first_instance: 0,
        })
    );

    // Nothing is bound any more, so a plain draw has no vertex data.
    let err = device
        .draw_primitive(D3DPrimitiveType::TriangleList, 0, 1)
        .unwrap_err();
    assert!(matches!(err, DdiError::InvalidArgument(_)), "{err:?}");
}

#[test]
fn indexed_draw_forwards_base_vertex_and_first_index() {
    let (mut device, _) = ready_device();
    let ib = device
        .native_mut()
        .create_buffer(BufferDesc {
            label: Some("test indices".into()),
            size: 64,
            usage: BufferUsages::INDEX,
        })
        .unwrap();
    device.set_indices(Some(IndexBinding {
        buffer: InputBuffer::app(ib, 64),
        format: IndexFormat::U16,
        offset: 0,
    }));
    device
        .draw_indexed_primitive(D3DPrimitiveType::TriangleList, 2, 0, 4, 3, 1)
        .unwrap();

    let commands = device.native().commands();
    assert!(commands.contains(&NativeCommand::SetIndexBuffer {
        buffer: ib,
        offset: 0,
        format: IndexFormat::U16,
    }));
    assert_eq!(
        last_draw(commands),
        Some(&NativeCommand::DrawIndexed {
            index_count: 3,
            instance_count: 1,
            first_index: 3,
            base_vertex: 2,
            first_instance: 0,
        })
    );

    assert_eq!(
        ddi_status(&device.draw_indexed_primitive(D3DPrimitiveType::TriangleList, -5, 0, 4, 0, 1)),
        D3DERR_INVALIDCALL
    );
}

#[test]
fn empty_scissor_skips_the_draw() {
    let (mut device, _) = ready_device();
    device.set_render_state(d3d9::D3DRS_SCISSORTESTENABLE, 1);
    device.set_scissor_rect(10, 10, 10, 20);
    device
        .draw_primitive(D3DPrimitiveType::TriangleList, 0, 1)
        .unwrap();
    assert!(device.native().commands().is_empty());
    assert_eq!(device.native().pipelines_created(), 0);

    device.set_scissor_rect(0, 0, 32, 32);
    device
        .draw_primitive(D3DPrimitiveType::TriangleList, 0, 1)
        .unwrap();
    assert!(device
        .native()
        .commands()
        .contains(&NativeCommand::SetScissorRect(ScissorRect {
            x: 0,
            y: 0,
            width: 32,
            height: 32,
        })));
}

#[test]
fn zero_primitive_draw_is_a_no_op() {
    let (mut device, _) = ready_device();
    device
        .draw_primitive(D3DPrimitiveType::TriangleStrip, 0, 0)
        .unwrap();
    assert!(device.native().commands().is_empty());
}

#[test]
fn draw_without_render_target_is_rejected() {
    let (mut device, _) = ready_device();
    device.set_render_target(0, None).unwrap();
    assert_eq!(
        ddi_status(&device.draw_primitive(D3DPrimitiveType::TriangleList, 0, 1)),
        D3DERR_INVALIDCALL
    );
    assert!(device.native().commands().is_empty());
}

#[test]
fn render_target_slots_report_gaps() {
    let mut device = device();
    device
        .set_render_target(2, Some(render_target(7, 32, 32, 1)))
        .unwrap();
    assert_eq!(device.num_bound_render_targets(), 3);
    assert!(device.render_target(0).is_none());
    assert_eq!(
        device.render_target(2).map(|s| s.view),
        Some(TextureViewId::from_raw(7))
    );
    assert!(device.render_target(99).is_none());
    assert_eq!(
        ddi_status(&device.set_render_target(4, Some(render_target(8, 32, 32, 1)))),
        D3DERR_INVALIDCALL
    );

    // A depth-stencil surface is not a color target.
    assert_eq!(
        ddi_status(&device.set_render_target(0, Some(depth_stencil(9, 32, 32)))),
        D3DERR_INVALIDCALL
    );
    device
        .set_depth_stencil_surface(Some(depth_stencil(9, 32, 32)))
        .unwrap();
}

#[test]
fn binding_first_render_target_resets_viewport() {
    let mut device = device();
    device
        .set_viewport(Viewport {
            width: 10.0,
            height: 10.0,
            ..Viewport::default()
        })
        .unwrap();
    device
        .set_render_target(0, Some(render_target(1, 128, 32, 1)))
        .unwrap();
    let viewport = device.state().vertex().viewport();
    assert_eq!((viewport.width, viewport.height), (128.0, 32.0));
    let scissor = device.state().vertex().scissor_rect();
    assert_eq!((scissor.width, scissor.height), (128, 32));
}

#[test]
fn malformed_viewport_is_rejected() {
    let mut device = device();
    let bad_depth = Viewport {
        width: 16.0,
        height: 16.0,
        min_depth: 0.5,
        max_depth: 2.0,
        ..Viewport::default()
    };
    assert_eq!(ddi_status(&device.set_viewport(bad_depth)), D3DERR_INVALIDCALL);
    let nan = Viewport {
        width: f32::NAN,
        ..Viewport::default()
    };
    assert_eq!(ddi_status(&device.set_viewport(nan)), D3DERR_INVALIDCALL);
}

#[test]
fn wrapped_resources_cannot_be_drawn_with() {
    let (mut device, vb) = ready_device();
    assert!(device.wrap_resource(ResourceHandle::Buffer(vb)));
    assert!(!device.wrap_resource(ResourceHandle::Buffer(vb)));
    let err = device
        .draw_primitive(D3DPrimitiveType::TriangleList, 0, 1)
        .unwrap_err();
    assert!(matches!(err, DdiError::InvalidArgument(_)), "{err:?}");

    assert!(device.unwrap_resource(ResourceHandle::Buffer(vb)));
    device
        .draw_primitive(D3DPrimitiveType::TriangleList, 0, 1)
        .unwrap();

    // The wrapped set is shared with other threads.
    let wrapped = device.wrapped_resources();
    let target = ResourceHandle::TextureView(TextureViewId::from_raw(1));
    std::thread::spawn(move || wrapped.wrap(target))
        .join()
        .unwrap();
    assert!(device.is_wrapped(target));
    assert_eq!(
        ddi_status(&device.draw_primitive(D3DPrimitiveType::TriangleList, 0, 1)),
        D3DERR_INVALIDCALL
    );
}

#[test]
fn failed_pipeline_creation_leaves_state_pending() {
    let (mut device, _) = ready_device();
    device.native_mut().set_fail_pipeline_creation(true);
    let result = device.draw_primitive(D3DPrimitiveType::TriangleList, 0, 1);
    assert_eq!(ddi_status(&result), E_OUTOFMEMORY);
    assert!(device.native().commands().is_empty());
    assert_eq!(device.cache_stats().entries, 0);
    assert!(!device.state().pending().is_empty());

    device.native_mut().set_fail_pipeline_creation(false);
    device
        .draw_primitive(D3DPrimitiveType::TriangleList, 0, 1)
        .unwrap();
    let commands = device.native().commands();
    assert_eq!(count_pipeline_binds(commands), 1);
    assert!(commands
        .iter()
        .any(|c| matches!(c, NativeCommand::SetRenderTargets { .. })));
    assert!(device.state().pending().is_empty());
}

#[test]
fn render_target_sampled_as_texture_is_a_hazard() {
    let config = DeviceConfig {
        validate: true,
        ..DeviceConfig::default()
    };
    let (mut device, _) = ready_device_with(config);
    device
        .set_texture(0, Some(TextureViewId::from_raw(1)))
        .unwrap();
    assert_eq!(
        ddi_status(&device.draw_primitive(D3DPrimitiveType::TriangleList, 0, 1)),
        D3DERR_INVALIDCALL
    );

    let config = DeviceConfig {
        validate: false,
        ..DeviceConfig::default()
    };
    let (mut device, _) = ready_device_with(config);
    device
        .set_texture(0, Some(TextureViewId::from_raw(1)))
        .unwrap();
    device
        .draw_primitive(D3DPrimitiveType::TriangleList, 0, 1)
        .unwrap();
}

#[test]
fn vertex_constants_are_versioned() {
    let (mut device, _) = ready_device();
    let vs = device
        .create_shader(ShaderStage::Vertex, VS_BYTECODE)
        .unwrap();
    device.set_vertex_shader(Some(vs)).unwrap();
    device
        .set_vertex_shader_constant_f(0, &[[1.0, 2.0, 3.0, 4.0]])
        .unwrap();
    device
        .draw_primitive(D3DPrimitiveType::TriangleList, 0, 1)
        .unwrap();
    device
        .draw_primitive(D3DPrimitiveType::TriangleList, 0, 1)
        .unwrap();

    let float_binds: Vec<_> = device
        .native()
        .commands()
        .iter()
        .filter_map(|c| match c {
            NativeCommand::SetConstantBuffer {
                stage: ShaderStage::Vertex,
                slot: 0,
                buffer,
                offset,
                size,
            } => Some((*buffer, *offset, *size)),
            _ => None,
        })
        .collect();
    assert_eq!(float_binds.len(), 1);
    let (buffer, offset, size) = float_binds[0];
    assert_eq!(size, 64);
    let data = device.native().backend().buffer_data(buffer).unwrap();
    let start = offset as usize;
    let first: Vec<f32> = data[start..start + 16]
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    assert_eq!(first, vec![1.0, 2.0, 3.0, 4.0]);

    assert_eq!(
        ddi_status(&device.set_vertex_shader_constant_f(256, &[[0.0; 4]])),
        D3DERR_INVALIDCALL
    );
}

#[test]
fn constants_are_uploaded_again_after_the_ring_is_replaced() {
    let config = DeviceConfig {
        upload_initial_size: 1024,
        upload_deferred_destroy: false,
        ..DeviceConfig::default()
    };
    let (mut device, _) = ready_device_with(config);
    let vs = device
        .create_shader(ShaderStage::Vertex, VS_BYTECODE)
        .unwrap();
    device.set_vertex_shader(Some(vs)).unwrap();
    device
        .set_vertex_shader_constant_f(0, &[[1.0, 2.0, 3.0, 4.0]])
        .unwrap();
    device
        .draw_primitive(D3DPrimitiveType::TriangleList, 0, 1)
        .unwrap();
    device.native_mut().take_commands();

    // Large enough that the ring has to grow, destroying the buffer the constants were in.
    device
        .draw_primitive_up(D3DPrimitiveType::TriangleList, 150, &[0u8; 5400], 12)
        .unwrap();
    let buffer = device
        .native()
        .commands()
        .iter()
        .rev()
        .find_map(|c| match c {
            NativeCommand::SetConstantBuffer {
                stage: ShaderStage::Vertex,
                slot: 0,
                buffer,
                ..
            } => Some(*buffer),
            _ => None,
        })
        .expect("vertex constants rebound");
    assert!(device.native().backend().buffer_data(buffer).is_some());
}

#[test]
fn unchanged_input_state_is_not_rebound() {
    let (mut device, _) = ready_device();
    let ib = device
        .native_mut()
        .create_buffer(BufferDesc {
            label: Some("test indices".into()),
            size: 64,
            usage: BufferUsages::INDEX,
        })
        .unwrap();
    device.set_indices(Some(IndexBinding {
        buffer: InputBuffer::app(ib, 64),
        format: IndexFormat::U16,
        offset: 0,
    }));
    let is_input_bind = |c: &NativeCommand| {
        matches!(
            c,
            NativeCommand::SetVertexBuffer { .. } | NativeCommand::SetIndexBuffer { .. }
        )
    };

    device
        .draw_indexed_primitive(D3DPrimitiveType::TriangleList, 0, 0, 4, 0, 1)
        .unwrap();
    assert_eq!(
        device.native().commands().iter().filter(|c| is_input_bind(c)).count(),
        2
    );

    device.native_mut().take_commands();
    device
        .draw_indexed_primitive(D3DPrimitiveType::TriangleList, 0, 0, 4, 3, 1)
        .unwrap();
    let commands = device.native().commands();
    assert!(!commands.iter().any(is_input_bind), "{commands:?}");
    assert!(matches!(
        last_draw(commands),
        Some(NativeCommand::DrawIndexed { first_index: 3, .. })
    ));

    // Setting the same index buffer again is not a change either.
    device.native_mut().take_commands();
    device.set_indices(Some(IndexBinding {
        buffer: InputBuffer::app(ib, 64),
        format: IndexFormat::U16,
        offset: 0,
    }));
    device
        .draw_indexed_primitive(D3DPrimitiveType::TriangleList, 0, 0, 4, 0, 1)
        .unwrap();
    assert!(!device.native().commands().iter().any(is_input_bind));
    device.flush().unwrap();
}

#[test]
fn stream_arguments_are_validated() {
    let mut device = device();
    let vb = vertex_buffer(&mut device);
    assert_eq!(
        ddi_status(&device.set_stream_source(16, Some(InputBuffer::app(vb, 64)), 0, 12)),
        D3DERR_INVALIDCALL
    );
    assert_eq!(
        ddi_status(&device.set_stream_source(0, Some(InputBuffer::app(vb, 64)), 0, 4096)),
        D3DERR_INVALIDCALL
    );
    assert_eq!(
        ddi_status(&device.set_stream_source(0, Some(InputBuffer::app(vb, 64)), 128, 12)),
        D3DERR_INVALIDCALL
    );
    assert_eq!(
        ddi_status(&device.set_stream_source(0, Some(InputBuffer::app(vb, 64)), 0, 12)),
        S_OK
    );
}

#[test]
fn prepare_for_map_builds_pipeline_early() {
    let (mut device, _) = ready_device();
    assert!(device.prepare_for_map().is_some());
    assert_eq!(device.native().pipelines_created(), 1);
    assert!(device.native().commands().is_empty());

    let config = DeviceConfig {
        early_pipeline_on_map: false,
        ..DeviceConfig::default()
    };
    let (mut device, _) = ready_device_with(config);
    assert!(device.prepare_for_map().is_none());
    assert_eq!(device.native().pipelines_created(), 0);
}

#[test]
fn retired_upload_buffers_are_destroyed_after_flush() {
    let config = DeviceConfig {
        upload_initial_size: 256,
        upload_alignment: 256,
        ..DeviceConfig::default()
    };
    let (mut device, _) = ready_device_with(config);
    device
        .draw_primitive(D3DPrimitiveType::TriangleList, 0, 1)
        .unwrap();
    let live = device.native().backend().live_buffers();

    let retired = device.retire_uploads().unwrap();
    assert!(retired > 0);
    assert_eq!(device.native().backend().live_buffers(), live - retired);
    assert_eq!(device.native().flush_count(), 1);

    device.native_mut().take_commands();
    device
        .draw_primitive(D3DPrimitiveType::TriangleList, 0, 1)
        .unwrap();
    assert!(device
        .native()
        .commands()
        .iter()
        .any(|c| matches!(c, NativeCommand::SetVertexBuffer { slot: 0, .. })));
}

#[test]
fn shutdown_releases_every_native_object() {
    let (mut device, _) = ready_device();
    let vs = device
        .create_shader(ShaderStage::Vertex, VS_BYTECODE)
        .unwrap();
    device.set_vertex_shader(Some(vs)).unwrap();
    device
        .draw_primitive(D3DPrimitiveType::TriangleFan, 0, 4)
        .unwrap();
    device
        .draw_primitive_up(D3DPrimitiveType::TriangleList, 1, &[0u8; 36], 12)
        .unwrap();

    let native = device.shutdown().unwrap();
    assert_eq!(native.live_pipelines(), 0);
    assert_eq!(native.live_shader_modules(), 0);
    // Only the application's vertex buffer is left.
    assert_eq!(native.backend().live_buffers(), 1);
}
