//! `D3DVERTEXELEMENT9` declarations.

use thiserror::Error;

use super::location_map::LocationMapError;

/// `MAXD3DDECLLENGTH`.
pub const MAX_VERTEX_ELEMENTS: usize = 64;
/// Number of vertex streams a declaration may reference.
pub const MAX_VERTEX_STREAMS: usize = 16;

const ELEMENT_RECORD_BYTES: usize = 8;
const END_MARKER_STREAM: u16 = 0xFF;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeclType {
    Float1,
    Float2,
    Float3,
    Float4,
    D3dColor,
    UByte4,
    Short2,
    Short4,
    UByte4N,
    Short2N,
    Short4N,
    UShort2N,
    UShort4N,
    UDec3,
    Dec3N,
    Float16_2,
    Float16_4,
    Unused,
}

impl DeclType {
    pub fn from_d3d(value: u8) -> Option<Self> {
        Some(match value {
            0 => DeclType::Float1,
            1 => DeclType::Float2,
            2 => DeclType::Float3,
            3 => DeclType::Float4,
            4 => DeclType::D3dColor,
            5 => DeclType::UByte4,
            6 => DeclType::Short2,
            7 => DeclType::Short4,
            8 => DeclType::UByte4N,
            9 => DeclType::Short2N,
            10 => DeclType::Short4N,
            11 => DeclType::UShort2N,
            12 => DeclType::UShort4N,
            13 => DeclType::UDec3,
            14 => DeclType::Dec3N,
            15 => DeclType::Float16_2,
            16 => DeclType::Float16_4,
            17 => DeclType::Unused,
            _ => return None,
        })
    }

    /// Size of the element in the application's vertex buffer.
    pub fn byte_size(self) -> u32 {
        match self {
            DeclType::Float1 => 4,
            DeclType::Float2 => 8,
            DeclType::Float3 => 12,
            DeclType::Float4 => 16,
            DeclType::D3dColor
            | DeclType::UByte4
            | DeclType::UByte4N
            | DeclType::Short2
            | DeclType::Short2N
            | DeclType::UShort2N
            | DeclType::UDec3
            | DeclType::Dec3N
            | DeclType::Float16_2 => 4,
            DeclType::Short4 | DeclType::Short4N | DeclType::UShort4N | DeclType::Float16_4 => 8,
            DeclType::Unused => 0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeclUsage {
    Position,
    BlendWeight,
    BlendIndices,
    Normal,
    PSize,
    TexCoord,
    Tangent,
    Binormal,
    TessFactor,
    PositionT,
    Color,
    Fog,
    Depth,
    Sample,
}

impl DeclUsage {
    pub fn from_d3d(value: u8) -> Option<Self> {
        Some(match value {
            0 => DeclUsage::Position,
            1 => DeclUsage::BlendWeight,
            2 => DeclUsage::BlendIndices,
            3 => DeclUsage::Normal,
            4 => DeclUsage::PSize,
            5 => DeclUsage::TexCoord,
            6 => DeclUsage::Tangent,
            7 => DeclUsage::Binormal,
            8 => DeclUsage::TessFactor,
            9 => DeclUsage::PositionT,
            10 => DeclUsage::Color,
            11 => DeclUsage::Fog,
            12 => DeclUsage::Depth,
            13 => DeclUsage::Sample,
            _ => return None,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VertexElement {
    pub stream: u16,
    pub offset: u16,
    pub ty: DeclType,
    /// `D3DDECLMETHOD`; only the default method is meaningful without tessellation.
    pub method: u8,
    pub usage: DeclUsage,
    pub usage_index: u8,
}

impl VertexElement {
    pub fn new(stream: u16, offset: u16, ty: DeclType, usage: DeclUsage, usage_index: u8) -> Self {
        Self {
            stream,
            offset,
            ty,
            method: 0,
            usage,
            usage_index,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VertexDeclaration {
    pub elements: Vec<VertexElement>,
}

impl VertexDeclaration {
    pub fn new(elements: Vec<VertexElement>) -> Self {
        Self { elements }
    }

    /// Parse a serialized `D3DVERTEXELEMENT9` array terminated by `D3DDECL_END()`.
    pub fn from_d3d_bytes(bytes: &[u8]) -> Result<Self, VertexInputError> {
        let mut elements = Vec::new();
        for record in bytes.chunks(ELEMENT_RECORD_BYTES) {
            if record.len() != ELEMENT_RECORD_BYTES {
                return Err(VertexInputError::Truncated { len: bytes.len() });
            }
            let stream = u16::from_le_bytes([record[0], record[1]]);
            if stream == END_MARKER_STREAM {
                return Ok(Self { elements });
            }
            if elements.len() == MAX_VERTEX_ELEMENTS {
                return Err(VertexInputError::TooManyElements {
                    count: elements.len() + 1,
                    max: MAX_VERTEX_ELEMENTS,
                });
            }
            let offset = u16::from_le_bytes([record[2], record[3]]);
            let ty = DeclType::from_d3d(record[4])
                .ok_or(VertexInputError::UnknownDeclType { raw: record[4] })?;
            let usage = DeclUsage::from_d3d(record[6])
                .ok_or(VertexInputError::UnknownDeclUsage { raw: record[6] })?;
            elements.push(VertexElement {
                stream,
                offset,
                ty,
                method: record[5],
                usage,
                usage_index: record[7],
            });
        }
        Err(VertexInputError::MissingEndMarker)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VertexInputError {
    #[error("vertex declaration of {len} bytes is not a whole number of elements")]
    Truncated { len: usize },
    #[error("vertex declaration is missing D3DDECL_END")]
    MissingEndMarker,
    #[error("vertex declaration has {count} elements (max {max})")]
    TooManyElements { count: usize, max: usize },
    #[error("unknown D3DDECLTYPE {raw}")]
    UnknownDeclType { raw: u8 },
    #[error("unknown D3DDECLUSAGE {raw}")]
    UnknownDeclUsage { raw: u8 },
    #[error("D3DDECLTYPE {ty:?} cannot be used as a vertex input")]
    UnsupportedDeclType { ty: DeclType },
    #[error("vertex element references stream {stream} (max {max})")]
    StreamOutOfRange { stream: u16, max: usize },
    #[error(transparent)]
    Location(#[from] LocationMapError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(stream: u16, offset: u16, ty: u8, usage: u8, index: u8) -> [u8; 8] {
        let s = stream.to_le_bytes();
        let o = offset.to_le_bytes();
        [s[0], s[1], o[0], o[1], ty, 0, usage, index]
    }

    const END: [u8; 8] = [0xFF, 0, 0, 0, 17, 0, 0, 0];

    #[test]
    fn parses_until_end_marker() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&record(0, 0, 2, 0, 0));
        bytes.extend_from_slice(&record(0, 12, 4, 10, 0));
        bytes.extend_from_slice(&record(1, 0, 1, 5, 0));
        bytes.extend_from_slice(&END);
        // Trailing bytes after the end marker are ignored.
        bytes.extend_from_slice(&[0xAA; 8]);

        let decl = VertexDeclaration::from_d3d_bytes(&bytes).unwrap();
        assert_eq!(
            decl.elements,
            vec![
                VertexElement::new(0, 0, DeclType::Float3, DeclUsage::Position, 0),
                VertexElement::new(0, 12, DeclType::D3dColor, DeclUsage::Color, 0),
                VertexElement::new(1, 0, DeclType::Float2, DeclUsage::TexCoord, 0),
            ]
        );
    }

    #[test]
    fn rejects_malformed_declarations() {
        assert_eq!(
            VertexDeclaration::from_d3d_bytes(&record(0, 0, 2, 0, 0)),
            Err(VertexInputError::MissingEndMarker)
        );
        assert_eq!(
            VertexDeclaration::from_d3d_bytes(&[0xFF, 0, 0]),
            Err(VertexInputError::Truncated { len: 3 })
        );
        let mut bad = record(0, 0, 42, 0, 0).to_vec();
        bad.extend_from_slice(&END);
        assert_eq!(
            VertexDeclaration::from_d3d_bytes(&bad),
            Err(VertexInputError::UnknownDeclType { raw: 42 })
        );
    }

    #[test]
    fn element_count_is_bounded() {
        let mut bytes = Vec::new();
        for i in 0..=MAX_VERTEX_ELEMENTS as u16 {
            bytes.extend_from_slice(&record(0, i * 4, 0, 5, 0));
        }
        bytes.extend_from_slice(&END);
        assert!(matches!(
            VertexDeclaration::from_d3d_bytes(&bytes),
            Err(VertexInputError::TooManyElements { .. })
        ));
    }
}
