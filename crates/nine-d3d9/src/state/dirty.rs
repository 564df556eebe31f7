use bitflags::bitflags;

bitflags! {
    /// One flag per logical state group.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct DirtyFlags: u32 {
        const INPUT_LAYOUT = 1 << 0;
        const VERTEX_BUFFERS = 1 << 1;
        const INDEX_BUFFER = 1 << 2;
        const PRIMITIVE_TOPOLOGY = 1 << 3;
        const VIEWPORT = 1 << 4;
        const SCISSOR = 1 << 5;
        const RASTER = 1 << 6;
        const BLEND = 1 << 7;
        const DEPTH_STENCIL = 1 << 8;
        const VERTEX_SHADER = 1 << 9;
        const PIXEL_SHADER = 1 << 10;
        const RENDER_TARGETS = 1 << 11;
        const SAMPLERS = 1 << 12;
        const TEXTURES = 1 << 13;
        /// Fixed-function parameters carried in the stage extension constant blocks.
        const VS_EXTENSION = 1 << 14;
        const PS_EXTENSION = 1 << 15;
        /// Blend constant and stencil reference.
        const DYNAMIC = 1 << 16;

        const INPUT_ASSEMBLY = Self::INPUT_LAYOUT.bits()
            | Self::VERTEX_BUFFERS.bits()
            | Self::INDEX_BUFFER.bits()
            | Self::PRIMITIVE_TOPOLOGY.bits();

        /// Groups whose contents are baked into the native pipeline object.
        const PIPELINE = Self::INPUT_LAYOUT.bits()
            | Self::VERTEX_BUFFERS.bits()
            | Self::PRIMITIVE_TOPOLOGY.bits()
            | Self::RASTER.bits()
            | Self::BLEND.bits()
            | Self::DEPTH_STENCIL.bits()
            | Self::VERTEX_SHADER.bits()
            | Self::PIXEL_SHADER.bits()
            | Self::RENDER_TARGETS.bits();
    }
}

/// Pending dirty state between two successful resolves.
///
/// Flags are only ever cleared by [`DirtyTracker::clear`], which the resolver calls after a
/// resolve completes; a failed resolve leaves everything pending.
#[derive(Debug, Default)]
pub struct DirtyTracker {
    pending: DirtyFlags,
}

impl DirtyTracker {
    pub fn new() -> Self {
        Self {
            // Nothing has been resolved yet, so every group counts as changed.
            pending: DirtyFlags::all(),
        }
    }

    pub fn mark(&mut self, flags: DirtyFlags) {
        self.pending |= flags;
    }

    pub fn pending(&self) -> DirtyFlags {
        self.pending
    }

    pub fn is_dirty(&self, flags: DirtyFlags) -> bool {
        self.pending.intersects(flags)
    }

    pub fn is_clean(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self, consumed: DirtyFlags) {
        self.pending.remove(consumed);
    }
}
