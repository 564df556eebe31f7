//! D3D9 pipeline state: dirty tracking, typed state blocks and their `wgpu` translation.

pub mod dirty;
pub mod topology;
pub mod tracker;

mod translate;

pub use dirty::{DirtyFlags, DirtyTracker};
pub use topology::{translate_primitive_topology, D3DPrimitiveType, PrimitiveTopologyTranslation};
pub use translate::*;
