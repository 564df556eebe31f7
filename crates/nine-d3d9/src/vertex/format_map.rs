use wgpu::VertexFormat;

use super::declaration::{DeclType, VertexInputError};

/// Describes how a D3D vertex element is fetched by the native pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementFormat {
    pub format: VertexFormat,
    pub byte_size: u32,
    pub conversion: ElementConversion,
}

/// Fix-up the translated vertex shader applies after fetching the attribute. Vertex data is never
/// rewritten on the CPU.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ElementConversion {
    #[default]
    None,
    /// Signed integer components read as floats (`SHORT2`, `SHORT4`).
    IntToFloat,
    /// Unsigned integer components read as floats (`UBYTE4`).
    UnsignedIntToFloat,
    /// `D3DCOLOR` is stored BGRA.
    SwizzleBgra,
    /// Packed signed 10-10-10 normalized.
    UnpackDec3N,
    /// Packed unsigned 10-10-10.
    UnpackUDec3,
}

impl ElementConversion {
    /// Stable byte used by the input-layout hash and shader variant keys.
    pub fn code(self) -> u8 {
        match self {
            ElementConversion::None => 0,
            ElementConversion::IntToFloat => 1,
            ElementConversion::UnsignedIntToFloat => 2,
            ElementConversion::SwizzleBgra => 3,
            ElementConversion::UnpackDec3N => 4,
            ElementConversion::UnpackUDec3 => 5,
        }
    }

    pub fn is_needed(self) -> bool {
        self != ElementConversion::None
    }
}

pub fn map_element_format(ty: DeclType) -> Result<ElementFormat, VertexInputError> {
    let (format, conversion) = match ty {
        DeclType::Float1 => (VertexFormat::Float32, ElementConversion::None),
        DeclType::Float2 => (VertexFormat::Float32x2, ElementConversion::None),
        DeclType::Float3 => (VertexFormat::Float32x3, ElementConversion::None),
        DeclType::Float4 => (VertexFormat::Float32x4, ElementConversion::None),
        DeclType::D3dColor => (VertexFormat::Unorm8x4, ElementConversion::SwizzleBgra),
        DeclType::UByte4N => (VertexFormat::Unorm8x4, ElementConversion::None),
        DeclType::UByte4 => (VertexFormat::Uint8x4, ElementConversion::UnsignedIntToFloat),
        DeclType::Short2 => (VertexFormat::Sint16x2, ElementConversion::IntToFloat),
        DeclType::Short4 => (VertexFormat::Sint16x4, ElementConversion::IntToFloat),
        DeclType::Short2N => (VertexFormat::Snorm16x2, ElementConversion::None),
        DeclType::Short4N => (VertexFormat::Snorm16x4, ElementConversion::None),
        DeclType::UShort2N => (VertexFormat::Unorm16x2, ElementConversion::None),
        DeclType::UShort4N => (VertexFormat::Unorm16x4, ElementConversion::None),
        DeclType::Float16_2 => (VertexFormat::Float16x2, ElementConversion::None),
        DeclType::Float16_4 => (VertexFormat::Float16x4, ElementConversion::None),
        DeclType::Dec3N => (VertexFormat::Uint32, ElementConversion::UnpackDec3N),
        DeclType::UDec3 => (VertexFormat::Uint32, ElementConversion::UnpackUDec3),
        DeclType::Unused => return Err(VertexInputError::UnsupportedDeclType { ty }),
    };
    debug_assert_eq!(format.size(), u64::from(ty.byte_size()));
    Ok(ElementFormat {
        format,
        byte_size: ty.byte_size(),
        conversion,
    })
}
