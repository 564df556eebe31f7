//! Vertex/index buffer bindings and their per-draw resolution.

use std::sync::Arc;

use nine_gpu::hal::{BufferId, GpuBackend};
use nine_gpu::FastUploadAllocator;
use tracing::trace;

use super::buffer::InputBuffer;
use crate::error::DdiError;
use crate::pipeline::PipelineStateDesc;
use crate::state::DirtyFlags;
use crate::state::topology::{
    expand_triangle_fan, translate_primitive_topology, triangle_fan_indices_u32, D3DPrimitiveType,
};
use crate::vertex::{InputLayout, InputLayoutId, MAX_VERTEX_STREAMS};

pub const D3DSTREAMSOURCE_INDEXEDDATA: u32 = 1 << 30;
pub const D3DSTREAMSOURCE_INSTANCEDATA: u32 = 2 << 30;

/// Matches `wgpu::Limits::default().max_vertex_buffer_array_stride`.
pub const MAX_VERTEX_STRIDE: u32 = 2048;

const D3DFMT_INDEX16: u32 = 101;
const D3DFMT_INDEX32: u32 = 102;

/// `IDirect3DDevice9::SetStreamSourceFreq` setting for one stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StreamFrequency {
    #[default]
    Vertex,
    /// Stream 0 only: the geometry is drawn this many times.
    IndexedData(u32),
    /// Advance once every `n` instances.
    InstanceData(u32),
}

impl StreamFrequency {
    pub fn from_d3d(stream: usize, setting: u32) -> Option<Self> {
        let value = setting & !(D3DSTREAMSOURCE_INDEXEDDATA | D3DSTREAMSOURCE_INSTANCEDATA);
        if setting & D3DSTREAMSOURCE_INDEXEDDATA != 0 {
            (value > 0 && setting & D3DSTREAMSOURCE_INSTANCEDATA == 0)
                .then_some(StreamFrequency::IndexedData(value))
        } else if setting & D3DSTREAMSOURCE_INSTANCEDATA != 0 {
            (stream != 0 && value > 0).then_some(StreamFrequency::InstanceData(value))
        } else {
            (value <= 1).then_some(StreamFrequency::Vertex)
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    U16,
    U32,
}

impl IndexFormat {
    pub fn from_d3d(format: u32) -> Option<Self> {
        match format {
            D3DFMT_INDEX16 => Some(IndexFormat::U16),
            D3DFMT_INDEX32 => Some(IndexFormat::U32),
            _ => None,
        }
    }

    pub fn size(self) -> u64 {
        match self {
            IndexFormat::U16 => 2,
            IndexFormat::U32 => 4,
        }
    }

    pub fn to_wgpu(self) -> wgpu::IndexFormat {
        match self {
            IndexFormat::U16 => wgpu::IndexFormat::Uint16,
            IndexFormat::U32 => wgpu::IndexFormat::Uint32,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct VertexStream {
    pub buffer: InputBuffer,
    pub offset: u64,
    pub stride: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct IndexBinding {
    pub buffer: InputBuffer,
    pub format: IndexFormat,
    pub offset: u64,
}

/// Per-draw ranges handed over by the device.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrawParams {
    pub indexed: bool,
    /// First vertex read. For indexed draws this is `base_vertex + min_vertex_index`.
    pub vertex_start: u32,
    pub vertex_count: u32,
    pub base_vertex: i32,
    pub index_start: u32,
    pub index_count: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VertexBufferBinding {
    pub stream: u32,
    pub buffer: BufferId,
    pub offset: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexBufferBinding {
    pub buffer: BufferId,
    pub offset: u64,
    pub format: IndexFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrawCall {
    Draw {
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    },
}

impl DrawCall {
    pub fn is_empty(&self) -> bool {
        match *self {
            DrawCall::Draw {
                vertex_count,
                instance_count,
                ..
            } => vertex_count == 0 || instance_count == 0,
            DrawCall::DrawIndexed {
                index_count,
                instance_count,
                ..
            } => index_count == 0 || instance_count == 0,
        }
    }
}

/// Native bindings and draw arguments for one draw.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedInput {
    pub vertex_buffers: Vec<VertexBufferBinding>,
    pub index_buffer: Option<IndexBufferBinding>,
    pub draw: DrawCall,
    /// A synthesized triangle-list index buffer was pushed and must be popped after the draw.
    pub pushed_transient: bool,
    /// Topology or strip index format differ from the previous descriptor.
    pub descriptor_changed: bool,
    /// Streams whose vertex buffer must be bound again, one bit per stream.
    pub rebind_streams: u16,
    /// `index_buffer` is not what the last recorded draw left bound.
    pub rebind_index: bool,
}

#[derive(Debug)]
pub struct InputAssembly {
    streams: [Option<VertexStream>; MAX_VERTEX_STREAMS],
    frequencies: [StreamFrequency; MAX_VERTEX_STREAMS],
    index_buffer: Option<IndexBinding>,
    transient_indices: Vec<IndexBinding>,
    primitive: D3DPrimitiveType,
    layout: Option<Arc<InputLayout>>,
    /// Non-indexed fan indices, grown on demand and reused while the ring buffer holding them
    /// is current.
    fan_indices: Option<InputBuffer>,
    /// What the last recorded draw left bound natively.
    bound_streams: [Option<VertexBufferBinding>; MAX_VERTEX_STREAMS],
    bound_index: Option<IndexBufferBinding>,
}

impl Default for InputAssembly {
    fn default() -> Self {
        Self::new()
    }
}

fn check_stream(stream: usize) -> Result<(), DdiError> {
    if stream >= MAX_VERTEX_STREAMS {
        return Err(DdiError::invalid(format!(
            "stream {stream} out of range (max {MAX_VERTEX_STREAMS})"
        )));
    }
    Ok(())
}

/// Bytes read by `count` elements of `stride` bytes where each element spans `extent` bytes.
fn window_len(count: u32, stride: u32, extent: u64) -> u64 {
    if count == 0 {
        return 0;
    }
    u64::from(count - 1) * u64::from(stride) + extent
}

impl InputAssembly {
    pub fn new() -> Self {
        Self {
            streams: std::array::from_fn(|_| None),
            frequencies: [StreamFrequency::Vertex; MAX_VERTEX_STREAMS],
            index_buffer: None,
            transient_indices: Vec::new(),
            primitive: D3DPrimitiveType::TriangleList,
            layout: None,
            fan_indices: None,
            bound_streams: [None; MAX_VERTEX_STREAMS],
            bound_index: None,
        }
    }

    pub fn stream(&self, stream: usize) -> Option<&VertexStream> {
        self.streams.get(stream)?.as_ref()
    }

    pub fn stream_frequency(&self, stream: usize) -> StreamFrequency {
        self.frequencies
            .get(stream)
            .copied()
            .unwrap_or_default()
    }

    pub fn primitive_type(&self) -> D3DPrimitiveType {
        self.primitive
    }

    pub fn input_layout(&self) -> Option<&Arc<InputLayout>> {
        self.layout.as_ref()
    }

    /// The application's index buffer, ignoring transient substitutions.
    pub fn index_buffer(&self) -> Option<&IndexBinding> {
        self.index_buffer.as_ref()
    }

    /// Index buffer the next draw reads: the top of the transient stack, else the application's.
    pub fn current_index_buffer(&self) -> Option<&IndexBinding> {
        self.transient_indices
            .last()
            .or(self.index_buffer.as_ref())
    }

    /// Returns whether the binding changed.
    pub fn set_stream_source(
        &mut self,
        stream: usize,
        binding: Option<VertexStream>,
    ) -> Result<bool, DdiError> {
        check_stream(stream)?;
        if let Some(b) = &binding {
            if b.stride > MAX_VERTEX_STRIDE {
                return Err(DdiError::invalid(format!(
                    "stream {stream} stride {} exceeds {MAX_VERTEX_STRIDE}",
                    b.stride
                )));
            }
            if b.offset > b.buffer.size() {
                return Err(DdiError::invalid(format!(
                    "stream {stream} offset {} past end of {}-byte buffer",
                    b.offset,
                    b.buffer.size()
                )));
            }
        }
        let slot = &mut self.streams[stream];
        if *slot == binding {
            return Ok(false);
        }
        *slot = binding;
        Ok(true)
    }

    pub fn set_stream_frequency(&mut self, stream: usize, setting: u32) -> Result<bool, DdiError> {
        check_stream(stream)?;
        let freq = StreamFrequency::from_d3d(stream, setting).ok_or_else(|| {
            DdiError::invalid(format!("stream {stream} frequency {setting:#x} is invalid"))
        })?;
        let changed = self.frequencies[stream] != freq;
        self.frequencies[stream] = freq;
        Ok(changed)
    }

    pub fn set_index_buffer(&mut self, binding: Option<IndexBinding>) -> bool {
        if self.index_buffer == binding {
            return false;
        }
        self.index_buffer = binding;
        true
    }

    pub fn set_primitive_type(&mut self, primitive: D3DPrimitiveType) -> bool {
        let changed = self.primitive != primitive;
        self.primitive = primitive;
        changed
    }

    pub fn set_input_layout(&mut self, layout: Option<Arc<InputLayout>>) -> bool {
        let old = self.layout.as_ref().map(|l| l.id());
        let new = layout.as_ref().map(|l| l.id());
        self.layout = layout;
        old != new
    }

    /// Drop the reference to a layout that is being destroyed. Returns whether it was bound.
    pub fn on_layout_destroyed(&mut self, id: InputLayoutId) -> bool {
        if self.layout.as_ref().is_some_and(|l| l.id() == id) {
            self.layout = None;
            true
        } else {
            false
        }
    }

    pub fn push_transient_index_buffer(&mut self, binding: IndexBinding) {
        self.transient_indices.push(binding);
    }

    pub fn pop_transient_index_buffer(&mut self) -> Option<IndexBinding> {
        self.transient_indices.pop()
    }

    /// Record that the binds of `input` reached the native device.
    pub fn commit_bindings(&mut self, input: &ResolvedInput) {
        self.bound_streams = [None; MAX_VERTEX_STREAMS];
        for vb in &input.vertex_buffers {
            self.bound_streams[vb.stream as usize] = Some(*vb);
        }
        if input.index_buffer.is_some() {
            self.bound_index = input.index_buffer;
        }
    }

    /// Assume nothing is bound natively, e.g. after the buffers behind the bindings were destroyed.
    pub fn forget_bindings(&mut self) {
        self.bound_streams = [None; MAX_VERTEX_STREAMS];
        self.bound_index = None;
    }

    /// Make every buffer the draw reads GPU visible, synthesize fan indices if needed and fill in
    /// the input part of `desc`. Nothing observable changes unless the whole resolve succeeds.
    ///
    /// Every stream is rebound when `pending` has `INPUT_LAYOUT` or `VERTEX_BUFFERS`, and the
    /// index buffer when it has `INDEX_BUFFER`. Otherwise only bindings that moved since
    /// [`commit_bindings`](Self::commit_bindings) are, which happens for system-memory windows
    /// and synthesized fan indices.
    pub fn resolve_deferred_state<B: GpuBackend + ?Sized>(
        &mut self,
        desc: &mut PipelineStateDesc,
        pending: DirtyFlags,
        uploads: &mut FastUploadAllocator,
        backend: &mut B,
        params: &DrawParams,
    ) -> Result<ResolvedInput, DdiError> {
        let layout = self
            .layout
            .clone()
            .ok_or(DdiError::InvariantViolation("draw without a vertex declaration"))?;
        let used = layout.stream_mask();

        let instance_count = match self.frequencies[0] {
            StreamFrequency::IndexedData(n) if params.indexed => n,
            _ => 1,
        };

        let mut extents = [0u64; MAX_VERTEX_STREAMS];
        for e in layout.elements() {
            let end = u64::from(e.element.offset) + u64::from(e.format.byte_size);
            let slot = &mut extents[usize::from(e.element.stream)];
            *slot = (*slot).max(end);
        }

        let mut per_vertex_sysmem = true;
        for stream in 0..MAX_VERTEX_STREAMS {
            if used & (1 << stream) == 0 {
                continue;
            }
            let Some(binding) = &self.streams[stream] else {
                return Err(DdiError::invalid(format!(
                    "stream {stream} is read by the vertex declaration but not bound"
                )));
            };
            if let StreamFrequency::InstanceData(divisor) = self.frequencies[stream] {
                if divisor != 1 {
                    return Err(DdiError::NotImplemented("instance data step rate above one"));
                }
            } else if !binding.buffer.is_system_memory() {
                per_vertex_sysmem = false;
            }
        }
        // Offsetting every stream is only possible when all of them are copied anyway.
        let rebase = per_vertex_sysmem && params.vertex_count > 0;
        let vertex_offset = if rebase { params.vertex_start } else { 0 };

        let mut vertex_buffers = Vec::with_capacity(used.count_ones() as usize);
        let mut strides = [0u32; MAX_VERTEX_STREAMS];
        let mut instance_mask = 0u16;
        for stream in 0..MAX_VERTEX_STREAMS {
            if used & (1 << stream) == 0 {
                continue;
            }
            let Some(binding) = self.streams[stream].as_mut() else {
                continue;
            };
            let (first, count) = match self.frequencies[stream] {
                StreamFrequency::InstanceData(_) => {
                    instance_mask |= 1 << stream;
                    (0, instance_count)
                }
                _ if rebase => (params.vertex_start, params.vertex_count),
                _ => (
                    0,
                    params
                        .vertex_start
                        .checked_add(params.vertex_count)
                        .ok_or_else(|| DdiError::invalid("vertex range overflows"))?,
                ),
            };
            let start = binding.offset + u64::from(first) * u64::from(binding.stride);
            let len = window_len(count, binding.stride, extents[stream]);
            let (buffer, offset) = if binding.buffer.is_system_memory() {
                binding.buffer.prepare(uploads, backend, start, len)?
            } else {
                let (buffer, _) = binding.buffer.prepare(uploads, backend, start, len)?;
                (buffer, binding.offset)
            };
            strides[stream] = binding.stride;
            vertex_buffers.push(VertexBufferBinding {
                stream: stream as u32,
                buffer,
                offset,
            });
        }

        let rebased_base_vertex = i64::from(params.base_vertex) - i64::from(vertex_offset);
        let base_vertex = i32::try_from(rebased_base_vertex)
            .map_err(|_| DdiError::invalid("base vertex out of range"))?;

        let translation = translate_primitive_topology(self.primitive);
        let mut transient = None;
        let (index_buffer, draw) = if translation.needs_triangle_fan_emulation {
            self.resolve_fan(uploads, backend, params, vertex_offset, base_vertex, instance_count)
                .map(|(binding, index, draw)| {
                    transient = binding;
                    (index, draw)
                })?
        } else if params.indexed {
            let binding = self
                .current_index_buffer()
                .cloned()
                .ok_or_else(|| DdiError::invalid("indexed draw without an index buffer"))?;
            let size = binding.format.size();
            let start = binding.offset + u64::from(params.index_start) * size;
            let len = u64::from(params.index_count) * size;
            let mut buffer = binding.buffer;
            let (id, offset, first_index) = if buffer.is_system_memory() {
                let (id, offset) = buffer.prepare(uploads, backend, start, len)?;
                // Keep the uploaded window for the next draw from the same data.
                if let Some(app) = self.index_buffer.as_mut().filter(|b| b.buffer == buffer) {
                    app.buffer = buffer;
                }
                (id, offset, 0)
            } else {
                let (id, _) = buffer.prepare(uploads, backend, start, len)?;
                (id, binding.offset, params.index_start)
            };
            (
                Some(IndexBufferBinding {
                    buffer: id,
                    offset,
                    format: binding.format,
                }),
                DrawCall::DrawIndexed {
                    index_count: params.index_count,
                    instance_count,
                    first_index,
                    base_vertex,
                    first_instance: 0,
                },
            )
        } else {
            (
                None,
                DrawCall::Draw {
                    vertex_count: params.vertex_count,
                    instance_count,
                    first_vertex: params.vertex_start - vertex_offset,
                    first_instance: 0,
                },
            )
        };

        let strip_index_format = match (&index_buffer, translation.topology) {
            (
                Some(ib),
                wgpu::PrimitiveTopology::TriangleStrip | wgpu::PrimitiveTopology::LineStrip,
            ) => Some(ib.format.to_wgpu()),
            _ => None,
        };
        let descriptor_changed =
            desc.topology != translation.topology || desc.strip_index_format != strip_index_format;

        desc.topology = translation.topology;
        desc.strip_index_format = strip_index_format;
        desc.input_layout_hash = layout.hash();
        desc.input_layout = Some(layout);
        desc.vertex_strides = strides;
        desc.stream_mask = used;
        desc.instance_stream_mask = instance_mask;

        let streams_dirty =
            pending.intersects(DirtyFlags::INPUT_LAYOUT | DirtyFlags::VERTEX_BUFFERS);
        let rebind_streams = vertex_buffers
            .iter()
            .filter(|vb| streams_dirty || self.bound_streams[vb.stream as usize] != Some(**vb))
            .fold(0u16, |mask, vb| mask | 1 << vb.stream);
        let rebind_index = index_buffer.is_some()
            && (pending.contains(DirtyFlags::INDEX_BUFFER) || self.bound_index != index_buffer);

        let pushed_transient = transient.is_some();
        if let Some(binding) = transient {
            self.push_transient_index_buffer(binding);
        }
        trace!(
            streams = vertex_buffers.len(),
            indexed = index_buffer.is_some(),
            pushed_transient,
            rebind_streams,
            rebind_index,
            "input assembly resolved"
        );
        Ok(ResolvedInput {
            vertex_buffers,
            index_buffer,
            draw,
            pushed_transient,
            descriptor_changed,
            rebind_streams,
            rebind_index,
        })
    }

    fn resolve_fan<B: GpuBackend + ?Sized>(
        &mut self,
        uploads: &mut FastUploadAllocator,
        backend: &mut B,
        params: &DrawParams,
        vertex_offset: u32,
        base_vertex: i32,
        instance_count: u32,
    ) -> Result<(Option<IndexBinding>, Option<IndexBufferBinding>, DrawCall), DdiError> {
        let fan_len = if params.indexed {
            params.index_count
        } else {
            params.vertex_count
        };
        if fan_len < 3 {
            return Err(DdiError::invalid(format!(
                "triangle fan of {fan_len} vertices has no triangle"
            )));
        }
        let index_count = (fan_len - 2)
            .checked_mul(3)
            .ok_or_else(|| DdiError::invalid("triangle fan too large"))?;

        let binding = if params.indexed {
            let source = self
                .current_index_buffer()
                .ok_or_else(|| DdiError::invalid("indexed draw without an index buffer"))?;
            let data = source.buffer.cpu_data().ok_or(DdiError::NotImplemented(
                "indexed triangle fan from an index buffer without a CPU copy",
            ))?;
            let size = source.format.size();
            let start = source.offset + u64::from(params.index_start) * size;
            let end = start + u64::from(params.index_count) * size;
            let bytes = usize::try_from(start)
                .ok()
                .zip(usize::try_from(end).ok())
                .and_then(|(s, e)| data.get(s..e))
                .ok_or_else(|| DdiError::invalid("index range exceeds index buffer"))?;
            let format = source.format;
            let allocation = match format {
                IndexFormat::U16 => {
                    let fan: Vec<u16> = bytes
                        .chunks_exact(2)
                        .map(|c| u16::from_le_bytes([c[0], c[1]]))
                        .collect();
                    uploads.allocate_pod(backend, &expand_triangle_fan(&fan))?
                }
                IndexFormat::U32 => {
                    let fan: Vec<u32> = bytes
                        .chunks_exact(4)
                        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                        .collect();
                    uploads.allocate_pod(backend, &expand_triangle_fan(&fan))?
                }
            };
            IndexBinding {
                buffer: InputBuffer::TriangleFan {
                    allocation,
                    index_count,
                    generation: uploads.generation(),
                },
                format,
                offset: 0,
            }
        } else {
            let generation = uploads.generation();
            let reusable = matches!(
                self.fan_indices,
                Some(InputBuffer::TriangleFan { index_count: have, generation: g, .. })
                    if g == generation && have >= index_count
            );
            if !reusable {
                // Grow geometrically so slowly increasing fans do not re-upload every draw.
                let vertices = fan_len.checked_next_power_of_two().unwrap_or(fan_len);
                let indices = triangle_fan_indices_u32(vertices);
                let allocation = uploads.allocate_pod(backend, &indices)?;
                self.fan_indices = Some(InputBuffer::TriangleFan {
                    allocation,
                    index_count: indices.len() as u32,
                    generation: uploads.generation(),
                });
            }
            let Some(buffer) = self.fan_indices.clone() else {
                return Err(DdiError::InvariantViolation("fan index buffer missing"));
            };
            IndexBinding {
                buffer,
                format: IndexFormat::U32,
                offset: 0,
            }
        };

        let InputBuffer::TriangleFan { allocation, .. } = &binding.buffer else {
            return Err(DdiError::InvariantViolation("fan binding is not a fan buffer"));
        };
        let index = IndexBufferBinding {
            buffer: allocation.buffer,
            offset: allocation.offset,
            format: binding.format,
        };
        let base_vertex = if params.indexed {
            base_vertex
        } else {
            i32::try_from(params.vertex_start - vertex_offset)
                .map_err(|_| DdiError::invalid("first vertex out of range"))?
        };
        let draw = DrawCall::DrawIndexed {
            index_count,
            instance_count,
            first_index: 0,
            base_vertex,
            first_instance: 0,
        };
        Ok((Some(binding), Some(index), draw))
    }
}
