mod declaration;
mod format_map;
mod input_layout;
mod location_map;

pub use declaration::{
    DeclType, DeclUsage, VertexDeclaration, VertexElement, VertexInputError, MAX_VERTEX_ELEMENTS,
    MAX_VERTEX_STREAMS,
};
pub use format_map::{map_element_format, ElementConversion, ElementFormat};
pub use input_layout::{InputLayout, InputLayoutId, LayoutElement, EMPTY_LAYOUT_HASH};
pub use location_map::{
    AdaptiveLocationMap, LocationMapError, StandardLocationMap, VertexLocationMap,
    MIN_VERTEX_ATTRIBUTES,
};
