use std::sync::Arc;

use nine_gpu::hal::{BufferId, GpuBackend};
use nine_gpu::{FastUploadAllocator, GpuError, UploadAllocation};

/// A region of the upload ring holding a copy of system-memory data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UploadedWindow {
    pub allocation: UploadAllocation,
    /// Byte range of the source data the allocation holds.
    pub start: u64,
    pub len: u64,
    pub generation: u64,
}

impl UploadedWindow {
    fn covers(&self, start: u64, len: u64, generation: u64) -> bool {
        self.generation == generation && self.start == start && self.len >= len
    }
}

/// Source of vertex or index data. Exactly one mode is active.
#[derive(Clone, Debug)]
pub enum InputBuffer {
    /// Application-owned GPU buffer. `shadow` is a CPU copy of the contents when the runtime
    /// keeps one; it lets indexed triangle fans be expanded without a readback.
    App {
        buffer: BufferId,
        size: u64,
        shadow: Option<Arc<[u8]>>,
    },
    /// User-pointer data (the `*UP` draws) copied into the upload ring at resolve time.
    SystemMemory {
        data: Arc<[u8]>,
        uploaded: Option<UploadedWindow>,
    },
    /// Synthesized triangle-list indices for a fan, in the upload ring.
    TriangleFan {
        allocation: UploadAllocation,
        index_count: u32,
        generation: u64,
    },
}

impl PartialEq for InputBuffer {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                InputBuffer::App { buffer: a, size: sa, .. },
                InputBuffer::App { buffer: b, size: sb, .. },
            ) => a == b && sa == sb,
            (
                InputBuffer::SystemMemory { data: a, .. },
                InputBuffer::SystemMemory { data: b, .. },
            ) => Arc::ptr_eq(a, b),
            (
                InputBuffer::TriangleFan { allocation: a, .. },
                InputBuffer::TriangleFan { allocation: b, .. },
            ) => a == b,
            _ => false,
        }
    }
}

impl InputBuffer {
    pub fn app(buffer: BufferId, size: u64) -> Self {
        InputBuffer::App {
            buffer,
            size,
            shadow: None,
        }
    }

    pub fn system_memory(data: impl Into<Arc<[u8]>>) -> Self {
        InputBuffer::SystemMemory {
            data: data.into(),
            uploaded: None,
        }
    }

    pub fn is_system_memory(&self) -> bool {
        matches!(self, InputBuffer::SystemMemory { .. })
    }

    /// Size in bytes of the data visible through this buffer.
    pub fn size(&self) -> u64 {
        match self {
            InputBuffer::App { size, .. } => *size,
            InputBuffer::SystemMemory { data, .. } => data.len() as u64,
            InputBuffer::TriangleFan { allocation, .. } => allocation.size,
        }
    }

    /// CPU-visible contents, when available.
    pub fn cpu_data(&self) -> Option<&[u8]> {
        match self {
            InputBuffer::App { shadow, .. } => shadow.as_deref(),
            InputBuffer::SystemMemory { data, .. } => Some(data),
            InputBuffer::TriangleFan { .. } => None,
        }
    }

    /// True when [`Self::prepare`] for this window would copy data.
    pub fn needs_upload(&self, start: u64, len: u64, generation: u64) -> bool {
        match self {
            InputBuffer::SystemMemory { uploaded, .. } => {
                !uploaded.is_some_and(|w| w.covers(start, len, generation))
            }
            _ => false,
        }
    }

    /// Make bytes `[start, start + len)` GPU visible. Returns the buffer and the offset at which
    /// byte `start` can be read. System-memory data is copied into the upload ring unless the
    /// previous copy still covers the window.
    pub fn prepare<B: GpuBackend + ?Sized>(
        &mut self,
        uploads: &mut FastUploadAllocator,
        backend: &mut B,
        start: u64,
        len: u64,
    ) -> Result<(BufferId, u64), GpuError> {
        let end = start
            .checked_add(len)
            .filter(|&end| end <= self.size())
            .ok_or_else(|| {
                GpuError::InvalidArgument(format!(
                    "input window {start}+{len} exceeds buffer of {} bytes",
                    self.size()
                ))
            })?;

        match self {
            InputBuffer::App { buffer, .. } => Ok((*buffer, start)),
            InputBuffer::TriangleFan { allocation, .. } => {
                Ok((allocation.buffer, allocation.offset + start))
            }
            InputBuffer::SystemMemory { data, uploaded } => {
                let generation = uploads.generation();
                if let Some(window) = uploaded.filter(|w| w.covers(start, len, generation)) {
                    return Ok((window.allocation.buffer, window.allocation.offset));
                }
                let allocation =
                    uploads.allocate_and_write(backend, &data[start as usize..end as usize])?;
                // The write may have grown the ring.
                *uploaded = Some(UploadedWindow {
                    allocation,
                    start,
                    len,
                    generation: uploads.generation(),
                });
                Ok((allocation.buffer, allocation.offset))
            }
        }
    }
}
