//! Immutable input layouts built from vertex declarations.

use std::sync::OnceLock;

use xxhash_rust::xxh3::Xxh3;

use super::declaration::{
    DeclUsage, VertexDeclaration, VertexElement, VertexInputError, MAX_VERTEX_ELEMENTS,
    MAX_VERTEX_STREAMS,
};
use super::format_map::{map_element_format, ElementFormat};
use super::location_map::{AdaptiveLocationMap, VertexLocationMap};

/// Hash of a layout with no elements.
pub const EMPTY_LAYOUT_HASH: u64 = 0x9e37_79b9_7f4a_7c15;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InputLayoutId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayoutElement {
    /// Declaration element with `POSITIONT` already rewritten to `POSITION`.
    pub element: VertexElement,
    pub format: ElementFormat,
    pub location: u32,
}

#[derive(Debug)]
pub struct InputLayout {
    id: InputLayoutId,
    elements: Vec<LayoutElement>,
    pretransformed: bool,
    point_size: bool,
    stream_mask: u16,
    hash: OnceLock<u64>,
    #[cfg(test)]
    hash_computations: std::sync::atomic::AtomicU32,
}

/// Layouts compare by content, not by id.
impl PartialEq for InputLayout {
    fn eq(&self, other: &Self) -> bool {
        self.pretransformed == other.pretransformed
            && self.point_size == other.point_size
            && self.elements == other.elements
    }
}

impl InputLayout {
    pub fn new(id: InputLayoutId, decl: &VertexDeclaration) -> Result<Self, VertexInputError> {
        if decl.elements.len() > MAX_VERTEX_ELEMENTS {
            return Err(VertexInputError::TooManyElements {
                count: decl.elements.len(),
                max: MAX_VERTEX_ELEMENTS,
            });
        }

        let mut pretransformed = false;
        let mut point_size = false;
        let mut stream_mask = 0u16;
        let mut normalized = Vec::with_capacity(decl.elements.len());
        for element in &decl.elements {
            if usize::from(element.stream) >= MAX_VERTEX_STREAMS {
                return Err(VertexInputError::StreamOutOfRange {
                    stream: element.stream,
                    max: MAX_VERTEX_STREAMS,
                });
            }
            let mut element = *element;
            match element.usage {
                DeclUsage::PositionT => {
                    pretransformed = true;
                    element.usage = DeclUsage::Position;
                }
                DeclUsage::PSize => point_size = true,
                _ => {}
            }
            stream_mask |= 1 << element.stream;
            normalized.push(element);
        }

        let locations =
            AdaptiveLocationMap::new(normalized.iter().map(|e| (e.usage, e.usage_index)))?;
        let elements = normalized
            .into_iter()
            .map(|element| {
                Ok(LayoutElement {
                    format: map_element_format(element.ty)?,
                    location: locations.location_for(element.usage, element.usage_index)?,
                    element,
                })
            })
            .collect::<Result<Vec<_>, VertexInputError>>()?;

        Ok(Self {
            id,
            elements,
            pretransformed,
            point_size,
            stream_mask,
            hash: OnceLock::new(),
            #[cfg(test)]
            hash_computations: Default::default(),
        })
    }

    pub fn id(&self) -> InputLayoutId {
        self.id
    }

    pub fn elements(&self) -> &[LayoutElement] {
        &self.elements
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// The declaration used `POSITIONT` (screen-space vertices that skip vertex processing).
    pub fn uses_pretransformed_position(&self) -> bool {
        self.pretransformed
    }

    pub fn has_point_size(&self) -> bool {
        self.point_size
    }

    /// Bit `n` set when stream `n` feeds at least one element.
    pub fn stream_mask(&self) -> u16 {
        self.stream_mask
    }

    /// Content hash over the normalized elements and their conversion annotations. Computed on
    /// first use.
    pub fn hash(&self) -> u64 {
        *self.hash.get_or_init(|| {
            #[cfg(test)]
            self.hash_computations
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            self.compute_hash()
        })
    }

    fn compute_hash(&self) -> u64 {
        if self.elements.is_empty() {
            return EMPTY_LAYOUT_HASH;
        }
        let mut hasher = Xxh3::new();
        hasher.update(&[u8::from(self.pretransformed)]);
        for e in &self.elements {
            let el = &e.element;
            hasher.update(&el.stream.to_le_bytes());
            hasher.update(&el.offset.to_le_bytes());
            hasher.update(&[
                el.ty as u8,
                el.method,
                el.usage as u8,
                el.usage_index,
                e.format.conversion.code(),
            ]);
        }
        hasher.digest()
    }

    #[cfg(test)]
    pub(crate) fn hash_computations(&self) -> u32 {
        self.hash_computations
            .load(std::sync::atomic::Ordering::Relaxed)
    }
}
