pub mod pixel;
pub mod vertex;

pub use pixel::{unpack_d3dcolor, PixelStage, PsExtension, SurfaceRef, SurfaceUsage};
pub use vertex::{clamp_scissor, clamp_viewport, ScissorRect, VertexStage, Viewport, VsExtension};

/// Store `value` and report whether it differed from what was there.
pub(crate) fn update_slot<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}
