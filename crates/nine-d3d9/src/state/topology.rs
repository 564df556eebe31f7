use std::fmt;

/// `D3DPRIMITIVETYPE`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum D3DPrimitiveType {
    PointList,
    LineList,
    LineStrip,
    #[default]
    TriangleList,
    TriangleStrip,
    TriangleFan,
}

impl D3DPrimitiveType {
    pub fn from_d3d(value: u32) -> Option<Self> {
        Some(match value {
            1 => D3DPrimitiveType::PointList,
            2 => D3DPrimitiveType::LineList,
            3 => D3DPrimitiveType::LineStrip,
            4 => D3DPrimitiveType::TriangleList,
            5 => D3DPrimitiveType::TriangleStrip,
            6 => D3DPrimitiveType::TriangleFan,
            _ => return None,
        })
    }

    /// Number of vertices (or indices) consumed by `primitive_count` primitives.
    pub fn vertex_count(self, primitive_count: u32) -> Option<u32> {
        if primitive_count == 0 {
            return Some(0);
        }
        match self {
            D3DPrimitiveType::PointList => Some(primitive_count),
            D3DPrimitiveType::LineList => primitive_count.checked_mul(2),
            D3DPrimitiveType::LineStrip => primitive_count.checked_add(1),
            D3DPrimitiveType::TriangleList => primitive_count.checked_mul(3),
            D3DPrimitiveType::TriangleStrip | D3DPrimitiveType::TriangleFan => {
                primitive_count.checked_add(2)
            }
        }
    }

    /// Fewest vertices (or indices) that form one primitive.
    pub fn min_vertices(self) -> u32 {
        match self {
            D3DPrimitiveType::PointList => 1,
            D3DPrimitiveType::LineList | D3DPrimitiveType::LineStrip => 2,
            D3DPrimitiveType::TriangleList
            | D3DPrimitiveType::TriangleStrip
            | D3DPrimitiveType::TriangleFan => 3,
        }
    }

    pub fn is_strip(self) -> bool {
        matches!(
            self,
            D3DPrimitiveType::LineStrip | D3DPrimitiveType::TriangleStrip
        )
    }
}

impl fmt::Display for D3DPrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            D3DPrimitiveType::PointList => "point_list",
            D3DPrimitiveType::LineList => "line_list",
            D3DPrimitiveType::LineStrip => "line_strip",
            D3DPrimitiveType::TriangleList => "triangle_list",
            D3DPrimitiveType::TriangleStrip => "triangle_strip",
            D3DPrimitiveType::TriangleFan => "triangle_fan",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PrimitiveTopologyTranslation {
    pub topology: wgpu::PrimitiveTopology,
    /// WebGPU has no triangle fans; the draw must go through a synthesized triangle list.
    pub needs_triangle_fan_emulation: bool,
}

pub fn translate_primitive_topology(primitive: D3DPrimitiveType) -> PrimitiveTopologyTranslation {
    let topology = match primitive {
        D3DPrimitiveType::PointList => wgpu::PrimitiveTopology::PointList,
        D3DPrimitiveType::LineList => wgpu::PrimitiveTopology::LineList,
        D3DPrimitiveType::LineStrip => wgpu::PrimitiveTopology::LineStrip,
        D3DPrimitiveType::TriangleList | D3DPrimitiveType::TriangleFan => {
            wgpu::PrimitiveTopology::TriangleList
        }
        D3DPrimitiveType::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
    };
    PrimitiveTopologyTranslation {
        topology,
        needs_triangle_fan_emulation: primitive == D3DPrimitiveType::TriangleFan,
    }
}

/// Rewrite fan indices as a triangle list: triangle `i` is `(f[0], f[i], f[i + 1])`.
pub fn expand_triangle_fan<T: Copy>(fan: &[T]) -> Vec<T> {
    if fan.len() < 3 {
        return Vec::new();
    }
    let mut out = Vec::with_capacity((fan.len() - 2) * 3);
    for pair in fan[1..].windows(2) {
        out.extend_from_slice(&[fan[0], pair[0], pair[1]]);
    }
    out
}

/// Triangle-list indices for a non-indexed fan of `vertex_count` vertices, relative to its first
/// vertex: `(0, 1, 2), (0, 2, 3), ..., (0, n - 2, n - 1)`.
pub fn triangle_fan_indices_u32(vertex_count: u32) -> Vec<u32> {
    if vertex_count < 3 {
        return Vec::new();
    }
    let mut out = Vec::with_capacity((vertex_count as usize - 2) * 3);
    for i in 1..vertex_count - 1 {
        out.extend_from_slice(&[0, i, i + 1]);
    }
    out
}

/// 16-bit variant of [`triangle_fan_indices_u32`]; `None` when a vertex index would not fit.
pub fn triangle_fan_indices_u16(vertex_count: u32) -> Option<Vec<u16>> {
    if vertex_count > u32::from(u16::MAX) + 1 {
        return None;
    }
    Some(
        triangle_fan_indices_u32(vertex_count)
            .into_iter()
            .map(|i| i as u16)
            .collect(),
    )
}
