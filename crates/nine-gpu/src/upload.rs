use std::borrow::Cow;

use bytemuck::Pod;
use tracing::debug;

use crate::buffer_arena::{align_up, BufferArena};
use crate::hal::{BufferDesc, BufferId, BufferUsages, GpuBackend, COPY_ALIGNMENT};
use crate::GpuError;

/// A sub-range of the allocator's backing buffer.
///
/// Valid until the allocator reallocates and the retired buffer is cleared, or until
/// [`FastUploadAllocator::destroy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UploadAllocation {
    pub buffer: BufferId,
    pub offset: u64,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadStats {
    pub allocations: u64,
    pub bytes_allocated: u64,
    pub reallocations: u64,
}

#[derive(Debug, Clone)]
pub struct UploadAllocatorDesc {
    pub label: &'static str,
    /// Capacity of the first backing buffer. Growth beyond this is on demand.
    pub initial_size: u64,
    /// Power of two, at least [`COPY_ALIGNMENT`]. Every returned offset is a multiple of it.
    pub alignment: u64,
    pub usage: BufferUsages,
    /// Keep replaced backing buffers alive until [`FastUploadAllocator::clear_deferred`].
    pub deferred_destroy: bool,
}

impl Default for UploadAllocatorDesc {
    fn default() -> Self {
        Self {
            label: "nine upload ring",
            initial_size: 1024 * 1024,
            alignment: 256,
            usage: BufferUsages::VERTEX
                | BufferUsages::INDEX
                | BufferUsages::UNIFORM
                | BufferUsages::COPY_DST,
            deferred_destroy: true,
        }
    }
}

/// Bump allocator over a single growable GPU-visible buffer.
///
/// Allocations are never overwritten while the backing buffer is current: when a request does
/// not fit, a fresh buffer is created instead of waiting for the GPU to drain the old one. The
/// replaced buffer is either destroyed immediately or, in deferred-destroy mode, parked until the
/// caller knows the GPU is done with it.
#[derive(Debug)]
pub struct FastUploadAllocator {
    label: &'static str,
    usage: BufferUsages,
    alignment: u64,
    deferred_destroy: bool,
    buffer: Option<BufferId>,
    arena: BufferArena,
    generation: u64,
    retired: Vec<BufferId>,
    stats: UploadStats,
}

impl FastUploadAllocator {
    pub fn new(desc: UploadAllocatorDesc) -> Result<Self, GpuError> {
        if !desc.alignment.is_power_of_two() || desc.alignment < COPY_ALIGNMENT {
            return Err(GpuError::InvalidArgument(format!(
                "upload alignment must be a power of two >= {COPY_ALIGNMENT} (got {})",
                desc.alignment
            )));
        }
        if desc.initial_size == 0 {
            return Err(GpuError::InvalidArgument(
                "upload initial_size must be > 0".into(),
            ));
        }

        let capacity = align_up(desc.initial_size, desc.alignment);
        Ok(Self {
            label: desc.label,
            usage: desc.usage | BufferUsages::COPY_DST,
            alignment: desc.alignment,
            deferred_destroy: desc.deferred_destroy,
            buffer: None,
            arena: BufferArena::new(0, capacity),
            generation: 0,
            retired: Vec::new(),
            stats: UploadStats::default(),
        })
    }

    pub fn alignment(&self) -> u64 {
        self.alignment
    }

    pub fn capacity(&self) -> u64 {
        self.arena.capacity()
    }

    pub fn consumed(&self) -> u64 {
        self.arena.consumed()
    }

    /// Current backing buffer, if one has been created yet.
    pub fn buffer(&self) -> Option<BufferId> {
        self.buffer
    }

    /// Bumped every time the backing buffer is replaced. `0` means no buffer exists yet.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn retired_count(&self) -> usize {
        self.retired.len()
    }

    pub fn stats(&self) -> UploadStats {
        self.stats
    }

    /// Reserve `size` bytes. The returned offset is a multiple of [`Self::alignment`] and the
    /// reserved size is `size` rounded up to it.
    pub fn allocate<B: GpuBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        size: u64,
    ) -> Result<UploadAllocation, GpuError> {
        let aligned_size = align_up(size.max(1), self.alignment);
        if self.buffer.is_none() || aligned_size > self.arena.remaining() {
            self.reallocate(backend, aligned_size)?;
        }

        let (Some(buffer), Some(offset)) =
            (self.buffer, self.arena.alloc(aligned_size, self.alignment))
        else {
            return Err(GpuError::OutOfMemory {
                requested: aligned_size,
            });
        };
        debug_assert_eq!(offset % self.alignment, 0);

        self.stats.allocations += 1;
        self.stats.bytes_allocated += aligned_size;
        Ok(UploadAllocation {
            buffer,
            offset,
            size: aligned_size,
        })
    }

    /// Allocate and copy `data` into the new region.
    pub fn allocate_and_write<B: GpuBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        data: &[u8],
    ) -> Result<UploadAllocation, GpuError> {
        let allocation = self.allocate(backend, data.len() as u64)?;
        let bytes = padded_to_copy_alignment(data);
        if !bytes.is_empty() {
            backend.write_buffer(allocation.buffer, allocation.offset, &bytes)?;
        }
        Ok(allocation)
    }

    pub fn allocate_pod<B: GpuBackend + ?Sized, T: Pod>(
        &mut self,
        backend: &mut B,
        data: &[T],
    ) -> Result<UploadAllocation, GpuError> {
        self.allocate_and_write(backend, bytemuck::cast_slice(data))
    }

    fn reallocate<B: GpuBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        min_size: u64,
    ) -> Result<(), GpuError> {
        let mut capacity = self.arena.capacity();
        if min_size > capacity {
            capacity = min_size
                .checked_next_power_of_two()
                .ok_or(GpuError::OutOfMemory {
                    requested: min_size,
                })?;
        }

        let buffer = backend.create_buffer(BufferDesc {
            label: Some(self.label.to_owned()),
            size: capacity,
            usage: self.usage,
        })?;

        if let Some(old) = self.buffer.replace(buffer) {
            if self.deferred_destroy {
                self.retired.push(old);
            } else {
                backend.destroy_buffer(old)?;
            }
            self.stats.reallocations += 1;
        }

        self.arena = BufferArena::new(0, capacity);
        self.generation += 1;
        debug!(
            label = self.label,
            capacity,
            generation = self.generation,
            retired = self.retired.len(),
            "upload ring reallocated"
        );
        Ok(())
    }

    /// Destroy backing buffers retired by growth. The caller must know the GPU no longer reads
    /// them. Returns how many were destroyed.
    pub fn clear_deferred<B: GpuBackend + ?Sized>(
        &mut self,
        backend: &mut B,
    ) -> Result<usize, GpuError> {
        let count = self.retired.len();
        for buffer in self.retired.drain(..) {
            backend.destroy_buffer(buffer)?;
        }
        Ok(count)
    }

    /// Release every buffer owned by the allocator. The next allocation starts over.
    pub fn destroy<B: GpuBackend + ?Sized>(&mut self, backend: &mut B) -> Result<(), GpuError> {
        self.clear_deferred(backend)?;
        if let Some(buffer) = self.buffer.take() {
            backend.destroy_buffer(buffer)?;
        }
        self.arena.reset();
        Ok(())
    }
}

fn padded_to_copy_alignment(bytes: &[u8]) -> Cow<'_, [u8]> {
    let padded_len = align_up(bytes.len() as u64, COPY_ALIGNMENT) as usize;
    if padded_len == bytes.len() {
        return Cow::Borrowed(bytes);
    }
    let mut out = vec![0u8; padded_len];
    out[..bytes.len()].copy_from_slice(bytes);
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryBackend;

    fn allocator(initial_size: u64, alignment: u64, deferred_destroy: bool) -> FastUploadAllocator {
        FastUploadAllocator::new(UploadAllocatorDesc {
            initial_size,
            alignment,
            deferred_destroy,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn rejects_bad_alignment() {
        for alignment in [0, 2, 3, 48] {
            let err = FastUploadAllocator::new(UploadAllocatorDesc {
                alignment,
                ..Default::default()
            })
            .unwrap_err();
            assert!(matches!(err, GpuError::InvalidArgument(_)), "{alignment}: {err:?}");
        }
    }

    #[test]
    fn offsets_are_always_aligned() {
        let mut backend = MemoryBackend::new();
        let mut uploads = allocator(1024, 64, true);
        for size in [1u64, 3, 64, 65, 100, 7, 500, 1000, 2000, 13] {
            let a = uploads.allocate(&mut backend, size).unwrap();
            assert_eq!(a.offset % 64, 0, "size {size} gave offset {}", a.offset);
            assert!(a.size >= size);
        }
    }

    #[test]
    fn oversized_request_grows_to_power_of_two_and_resets_consumed() {
        let mut backend = MemoryBackend::new();
        let mut uploads = allocator(256, 16, true);
        uploads.allocate(&mut backend, 100).unwrap();
        assert_eq!(uploads.consumed(), 112);

        let big = uploads.allocate(&mut backend, 1000).unwrap();
        assert_eq!(uploads.capacity(), 1024);
        assert_eq!(big.offset, 0);
        assert_eq!(uploads.consumed(), 1008);
        assert_eq!(uploads.generation(), 2);
    }

    #[test]
    fn overflow_without_oversize_keeps_capacity() {
        let mut backend = MemoryBackend::new();
        let mut uploads = allocator(256, 16, true);
        let first = uploads.allocate(&mut backend, 200).unwrap();
        let second = uploads.allocate(&mut backend, 100).unwrap();

        assert_eq!(uploads.capacity(), 256);
        assert_ne!(first.buffer, second.buffer);
        assert_eq!(second.offset, 0);
    }

    #[test]
    fn deferred_destroy_keeps_old_buffer_until_cleared() {
        let mut backend = MemoryBackend::new();
        let mut uploads = allocator(64, 16, true);
        let old = uploads.allocate(&mut backend, 64).unwrap();
        uploads.allocate(&mut backend, 16).unwrap();

        assert_eq!(uploads.retired_count(), 1);
        assert!(backend.buffer_data(old.buffer).is_some());

        assert_eq!(uploads.clear_deferred(&mut backend).unwrap(), 1);
        assert!(backend.buffer_data(old.buffer).is_none());
        assert_eq!(backend.live_buffers(), 1);
    }

    #[test]
    fn immediate_destroy_frees_old_buffer_on_growth() {
        let mut backend = MemoryBackend::new();
        let mut uploads = allocator(64, 16, false);
        let old = uploads.allocate(&mut backend, 64).unwrap();
        uploads.allocate(&mut backend, 16).unwrap();

        assert_eq!(uploads.retired_count(), 0);
        assert!(backend.buffer_data(old.buffer).is_none());
        assert_eq!(uploads.stats().reallocations, 1);
    }

    #[test]
    fn allocate_and_write_pads_and_copies() {
        let mut backend = MemoryBackend::new();
        let mut uploads = allocator(1024, 256, true);
        uploads.allocate(&mut backend, 4).unwrap();

        let a = uploads.allocate_and_write(&mut backend, &[1, 2, 3, 4, 5]).unwrap();
        assert_eq!(a.offset, 256);
        let data = backend.buffer_data(a.buffer).unwrap();
        assert_eq!(&data[256..264], &[1, 2, 3, 4, 5, 0, 0, 0]);
    }

    #[test]
    fn destroy_releases_everything() {
        let mut backend = MemoryBackend::new();
        let mut uploads = allocator(64, 16, true);
        uploads.allocate(&mut backend, 64).unwrap();
        uploads.allocate(&mut backend, 64).unwrap();
        uploads.destroy(&mut backend).unwrap();

        assert_eq!(backend.live_buffers(), 0);
        assert!(uploads.buffer().is_none());
    }
}
