use std::fmt;

/// Round `value` up to the nearest multiple of `alignment`.
///
/// `alignment` must be > 0. Values too close to `u64::MAX` saturate to the largest multiple.
pub fn align_up(value: u64, alignment: u64) -> u64 {
    debug_assert!(alignment > 0);

    match value.checked_add(alignment - 1) {
        Some(v) => v / alignment * alignment,
        None => u64::MAX / alignment * alignment,
    }
}

/// Bump allocator over a byte range. Tracks offsets only; it owns no memory.
#[derive(Clone)]
pub struct BufferArena {
    base: u64,
    capacity: u64,
    cursor: u64,
}

impl BufferArena {
    /// Create an arena that hands out offsets in `[base, base + capacity)`.
    pub fn new(base: u64, capacity: u64) -> Self {
        Self {
            base,
            capacity,
            cursor: base,
        }
    }

    pub fn reset(&mut self) {
        self.cursor = self.base;
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    /// Bytes handed out so far, including alignment padding.
    pub fn consumed(&self) -> u64 {
        self.cursor - self.base
    }

    pub fn remaining(&self) -> u64 {
        self.end().saturating_sub(self.cursor)
    }

    fn end(&self) -> u64 {
        self.base.saturating_add(self.capacity)
    }

    /// Allocate `size` bytes at an `alignment`-aligned offset, or `None` if the range is full.
    pub fn alloc(&mut self, size: u64, alignment: u64) -> Option<u64> {
        let alignment = alignment.max(1);
        let aligned = align_up(self.cursor, alignment);
        let end = aligned.checked_add(size)?;
        if end > self.end() {
            return None;
        }

        self.cursor = end;
        Some(aligned)
    }
}

impl fmt::Debug for BufferArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferArena")
            .field("base", &self.base)
            .field("capacity", &self.capacity)
            .field("cursor", &self.cursor)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_up_rounds_to_multiple() {
        assert_eq!(align_up(0, 256), 0);
        assert_eq!(align_up(1, 256), 256);
        assert_eq!(align_up(257, 256), 512);
        assert_eq!(align_up(12, 4), 12);
        assert_eq!(align_up(u64::MAX, 16), u64::MAX / 16 * 16);
    }

    #[test]
    fn arena_pads_to_alignment_and_stops_at_capacity() {
        let mut arena = BufferArena::new(0, 64);
        assert_eq!(arena.alloc(4, 4), Some(0));
        assert_eq!(arena.alloc(8, 32), Some(32));
        assert_eq!(arena.consumed(), 40);
        assert_eq!(arena.remaining(), 24);
        assert_eq!(arena.alloc(32, 4), None);

        arena.reset();
        assert_eq!(arena.consumed(), 0);
        assert_eq!(arena.alloc(64, 64), Some(0));
    }

    #[test]
    fn arena_offsets_are_absolute() {
        let mut arena = BufferArena::new(1024, 128);
        assert_eq!(arena.alloc(16, 16), Some(1024));
        assert_eq!(arena.alloc(16, 16), Some(1040));
    }
}
