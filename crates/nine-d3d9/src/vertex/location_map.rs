//! Vertex semantic to shader `@location(n)` assignment.

use hashbrown::HashMap;
use thiserror::Error;

use super::declaration::DeclUsage;

/// `maxVertexAttributes` every WebGPU implementation guarantees.
pub const MIN_VERTEX_ATTRIBUTES: u32 = 16;

pub trait VertexLocationMap {
    fn location_for(&self, usage: DeclUsage, usage_index: u8) -> Result<u32, LocationMapError>;
}

/// Fixed assignment for the common semantics, shared by every translated shader so the same
/// semantic always lands on the same location:
///
/// | usage        | index | location |
/// |--------------|-------|----------|
/// | POSITION(T)  | 0     | 0        |
/// | NORMAL       | 0     | 1        |
/// | TANGENT      | 0     | 2        |
/// | BINORMAL     | 0     | 3        |
/// | BLENDWEIGHT  | 0     | 4        |
/// | BLENDINDICES | 0     | 5        |
/// | COLOR        | 0, 1  | 6, 7     |
/// | TEXCOORD     | 0..7  | 8..15    |
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardLocationMap;

fn standard_location(usage: DeclUsage, usage_index: u8) -> Option<u32> {
    let index = u32::from(usage_index);
    match (usage, index) {
        (DeclUsage::Position | DeclUsage::PositionT, 0) => Some(0),
        (DeclUsage::Normal, 0) => Some(1),
        (DeclUsage::Tangent, 0) => Some(2),
        (DeclUsage::Binormal, 0) => Some(3),
        (DeclUsage::BlendWeight, 0) => Some(4),
        (DeclUsage::BlendIndices, 0) => Some(5),
        (DeclUsage::Color, 0..=1) => Some(6 + index),
        (DeclUsage::TexCoord, 0..=7) => Some(8 + index),
        _ => None,
    }
}

impl VertexLocationMap for StandardLocationMap {
    fn location_for(&self, usage: DeclUsage, usage_index: u8) -> Result<u32, LocationMapError> {
        standard_location(usage, usage_index)
            .ok_or(LocationMapError::UnsupportedSemantic { usage, usage_index })
    }
}

/// Standard assignments where they exist; everything else takes the lowest free location in
/// declaration order.
#[derive(Debug, Clone)]
pub struct AdaptiveLocationMap {
    map: HashMap<(DeclUsage, u8), u32>,
}

impl AdaptiveLocationMap {
    pub fn new(
        semantics: impl IntoIterator<Item = (DeclUsage, u8)>,
    ) -> Result<Self, LocationMapError> {
        let mut ordered = Vec::new();
        for semantic in semantics {
            if !ordered.contains(&semantic) {
                ordered.push(semantic);
            }
        }

        let mut map = HashMap::with_capacity(ordered.len());
        let mut used = 0u32;
        for &(usage, usage_index) in &ordered {
            if let Some(loc) = standard_location(usage, usage_index) {
                map.insert((usage, usage_index), loc);
                used |= 1 << loc;
            }
        }
        for (usage, usage_index) in ordered {
            if map.contains_key(&(usage, usage_index)) {
                continue;
            }
            let loc = (!used).trailing_zeros();
            if loc >= MIN_VERTEX_ATTRIBUTES {
                return Err(LocationMapError::OutOfLocations {
                    usage,
                    usage_index,
                    max: MIN_VERTEX_ATTRIBUTES,
                });
            }
            map.insert((usage, usage_index), loc);
            used |= 1 << loc;
        }
        Ok(Self { map })
    }
}

impl VertexLocationMap for AdaptiveLocationMap {
    fn location_for(&self, usage: DeclUsage, usage_index: u8) -> Result<u32, LocationMapError> {
        self.map
            .get(&(usage, usage_index))
            .copied()
            .ok_or(LocationMapError::UnsupportedSemantic { usage, usage_index })
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LocationMapError {
    #[error("unsupported vertex semantic {usage:?}{usage_index}")]
    UnsupportedSemantic { usage: DeclUsage, usage_index: u8 },
    #[error("vertex semantic {usage:?}{usage_index} exceeds {max} vertex attributes")]
    OutOfLocations {
        usage: DeclUsage,
        usage_index: u8,
        max: u32,
    },
}
