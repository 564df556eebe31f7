//! Compact, byte-comparable pipeline cache keys.
//!
//! Every field group is serialized by its own function into a fixed byte layout. Bits that do not
//! influence native pipeline creation (depth function with depth testing off, blend factors with
//! blending off, formats of unbound targets) are written as zero so equivalent descriptors share a
//! key.

use std::fmt;
use std::hash::{Hash, Hasher};

use xxhash_rust::xxh3::xxh3_64;

use super::desc::PipelineStateDesc;
use crate::shader::ShaderId;
use crate::state::tracker::{
    BlendFactor, BlendOp, CompareFunc, CullMode, DepthStencilState, FillMode, RasterizerState,
    RenderTargetBlend, StencilFaceState, StencilOp, MAX_RENDER_TARGETS,
};
use crate::vertex::MAX_VERTEX_STREAMS;

pub const KEY_BYTES: usize = 128;

const SHADER_BYTES: usize = 3 * 8;
const TARGET_BYTES: usize = 8;
const RASTER_BYTES: usize = 2;
const DEPTH_STENCIL_BYTES: usize = 4;
const BLEND_BYTES: usize = 1 + 4 * MAX_RENDER_TARGETS;
const INPUT_BYTES: usize = 8 + 2 + 2 + 2 * MAX_VERTEX_STREAMS;
const SCALAR_BYTES: usize = 4 + 3 * 4 + 2;
const PACKED_BYTES: usize = SHADER_BYTES
    + TARGET_BYTES
    + RASTER_BYTES
    + DEPTH_STENCIL_BYTES
    + BLEND_BYTES
    + INPUT_BYTES
    + SCALAR_BYTES;

const _: () = assert!(PACKED_BYTES <= KEY_BYTES);

#[derive(Clone, Copy)]
pub struct PipelineStateKey {
    packed: [u8; KEY_BYTES],
    hash: u64,
}

impl PipelineStateKey {
    pub fn new(
        desc: &PipelineStateDesc,
        vs: Option<ShaderId>,
        ps: Option<ShaderId>,
        gs: Option<ShaderId>,
    ) -> Self {
        let mut w = KeyWriter::default();
        write_shaders(&mut w, [vs, ps, gs]);
        write_targets(&mut w, desc);
        write_raster(&mut w, &desc.rasterizer);
        write_depth_stencil(&mut w, &desc.depth_stencil, desc.has_depth_stencil());
        write_blend(&mut w, desc);
        write_input(&mut w, desc);
        write_scalars(&mut w, desc);
        debug_assert_eq!(w.len, PACKED_BYTES);

        let packed = w.buf;
        Self {
            packed,
            hash: xxh3_64(&packed),
        }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_BYTES] {
        &self.packed
    }

    pub fn hash_value(&self) -> u64 {
        self.hash
    }
}

impl PartialEq for PipelineStateKey {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.packed == other.packed
    }
}

impl Eq for PipelineStateKey {}

impl Hash for PipelineStateKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl fmt::Debug for PipelineStateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PipelineStateKey({:016x})", self.hash)
    }
}

struct KeyWriter {
    buf: [u8; KEY_BYTES],
    len: usize,
}

impl Default for KeyWriter {
    fn default() -> Self {
        Self {
            buf: [0; KEY_BYTES],
            len: 0,
        }
    }
}

impl KeyWriter {
    fn put(&mut self, bytes: &[u8]) {
        self.buf[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
    }

    fn put_u8(&mut self, v: u8) {
        self.put(&[v]);
    }

    fn put_u16(&mut self, v: u16) {
        self.put(&v.to_le_bytes());
    }

    fn put_u32(&mut self, v: u32) {
        self.put(&v.to_le_bytes());
    }

    fn put_u64(&mut self, v: u64) {
        self.put(&v.to_le_bytes());
    }

    /// `-0.0` and `0.0` produce identical pipelines; so does every NaN.
    fn put_f32(&mut self, v: f32) {
        let bits = if v == 0.0 {
            0
        } else if v.is_nan() {
            f32::NAN.to_bits()
        } else {
            v.to_bits()
        };
        self.put_u32(bits);
    }
}

fn topology_code(t: wgpu::PrimitiveTopology) -> u64 {
    match t {
        wgpu::PrimitiveTopology::PointList => 0,
        wgpu::PrimitiveTopology::LineList => 1,
        wgpu::PrimitiveTopology::LineStrip => 2,
        wgpu::PrimitiveTopology::TriangleList => 3,
        wgpu::PrimitiveTopology::TriangleStrip => 4,
    }
}

fn compare_code(f: CompareFunc) -> u32 {
    f as u32
}

fn stencil_op_code(op: StencilOp) -> u32 {
    op as u32
}

fn blend_factor_code(f: BlendFactor) -> u32 {
    f as u32
}

fn blend_op_code(op: BlendOp) -> u32 {
    op as u32
}

fn write_shaders(w: &mut KeyWriter, shaders: [Option<ShaderId>; 3]) {
    for shader in shaders {
        w.put_u64(shader.map_or(0, ShaderId::raw));
    }
}

fn write_targets(w: &mut KeyWriter, desc: &PipelineStateDesc) {
    let strip = match desc.strip_index_format {
        None => 0,
        Some(wgpu::IndexFormat::Uint16) => 1,
        Some(wgpu::IndexFormat::Uint32) => 2,
    };
    let mut bits = topology_code(desc.topology);
    bits |= strip << 3;
    bits |= u64::from(desc.num_render_targets & 0x7) << 5;
    for (i, format) in desc.bound_render_target_formats().iter().enumerate() {
        bits |= u64::from(format.key_code() & 0x1F) << (8 + 5 * i);
    }
    bits |= u64::from(desc.depth_stencil_format.key_code() & 0x1F) << 28;
    bits |= u64::from(desc.depth_read_only) << 33;
    bits |= u64::from(desc.sample_count) << 34;
    bits |= u64::from(desc.sample_quality) << 42;
    w.put_u64(bits);
}

fn write_raster(w: &mut KeyWriter, r: &RasterizerState) {
    let fill = match r.fill_mode {
        FillMode::Point => 0u16,
        FillMode::Wireframe => 1,
        FillMode::Solid => 2,
    };
    let cull = match r.cull_mode {
        CullMode::None => 0u16,
        CullMode::CW => 1,
        CullMode::CCW => 2,
    };
    let mut bits = fill | cull << 2;
    bits |= u16::from(r.front_counter_clockwise) << 4;
    bits |= u16::from(r.depth_clip_enable) << 5;
    bits |= u16::from(r.multisample_enable) << 6;
    bits |= u16::from(r.antialiased_line_enable) << 7;
    bits |= u16::from(r.forced_sample_count) << 8;
    w.put_u16(bits);
}

fn stencil_face_bits(face: StencilFaceState) -> u32 {
    stencil_op_code(face.fail)
        | stencil_op_code(face.depth_fail) << 3
        | stencil_op_code(face.pass) << 6
        | compare_code(face.func) << 9
}

fn write_depth_stencil(w: &mut KeyWriter, ds: &DepthStencilState, bound: bool) {
    let mut bits = 0u32;
    if bound && ds.depth_enable {
        bits |= 1;
        bits |= u32::from(ds.depth_write_enable) << 1;
        bits |= compare_code(ds.depth_func) << 2;
    }
    if bound && ds.stencil_enable {
        bits |= 1 << 5;
        bits |= stencil_face_bits(ds.front) << 6;
        bits |= stencil_face_bits(ds.effective_back()) << 18;
    }
    w.put_u32(bits);
}

fn render_target_blend_bits(rt: &RenderTargetBlend) -> u32 {
    let mut bits = 0u32;
    if rt.blend_enable {
        bits |= 1;
        bits |= blend_factor_code(rt.src_blend) << 2;
        bits |= blend_factor_code(rt.dst_blend) << 6;
        bits |= blend_op_code(rt.blend_op) << 10;
        bits |= blend_factor_code(rt.src_blend_alpha) << 13;
        bits |= blend_factor_code(rt.dst_blend_alpha) << 17;
        bits |= blend_op_code(rt.blend_op_alpha) << 21;
    }
    if rt.logic_op_enable {
        bits |= 1 << 1;
        bits |= u32::from(rt.logic_op & 0xF) << 24;
    }
    bits |= u32::from(rt.write_mask.0 & 0xF) << 28;
    bits
}

fn write_blend(w: &mut KeyWriter, desc: &PipelineStateDesc) {
    let blend = &desc.blend;
    w.put_u8(u8::from(blend.alpha_to_coverage) | u8::from(blend.independent_blend) << 1);
    let bound = usize::from(desc.num_render_targets);
    for (i, rt) in blend.render_targets.iter().enumerate() {
        w.put_u32(if i < bound { render_target_blend_bits(rt) } else { 0 });
    }
}

fn write_input(w: &mut KeyWriter, desc: &PipelineStateDesc) {
    w.put_u64(desc.input_layout_hash);
    w.put_u16(desc.stream_mask);
    w.put_u16(desc.instance_stream_mask & desc.stream_mask);
    for (stream, &stride) in desc.vertex_strides.iter().enumerate() {
        let used = desc.stream_mask & (1 << stream) != 0;
        debug_assert!(stride <= u32::from(u16::MAX));
        w.put_u16(if used { stride as u16 } else { 0 });
    }
}

/// Kept at full precision rather than bit-packed.
fn write_scalars(w: &mut KeyWriter, desc: &PipelineStateDesc) {
    w.put_u32(desc.sample_mask);
    if desc.has_depth_stencil() {
        w.put_f32(desc.rasterizer.depth_bias);
        w.put_f32(desc.rasterizer.slope_scaled_depth_bias);
        w.put_f32(desc.rasterizer.depth_bias_clamp);
    } else {
        w.put_f32(0.0);
        w.put_f32(0.0);
        w.put_f32(0.0);
    }
    let ds = &desc.depth_stencil;
    if desc.has_depth_stencil() && ds.stencil_enable {
        w.put_u8(ds.stencil_read_mask);
        w.put_u8(ds.stencil_write_mask);
    } else {
        w.put_u8(0);
        w.put_u8(0);
    }
}
