use tracing::trace;

use crate::hal::{BufferDesc, BufferId, BufferTag, GpuBackend, ResourceRegistry, COPY_ALIGNMENT};
use crate::GpuError;

#[derive(Debug)]
struct MemoryBuffer {
    desc: BufferDesc,
    data: Vec<u8>,
}

/// CPU-only [`GpuBackend`]: buffers are zero-initialized byte vectors.
///
/// Useful for headless replay and for inspecting uploads in tests.
#[derive(Debug)]
pub struct MemoryBackend {
    buffers: ResourceRegistry<BufferTag, MemoryBuffer>,
    buffers_created: u64,
    #[cfg(feature = "test-utils")]
    fail_allocations: u32,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            buffers: ResourceRegistry::new("buffer"),
            buffers_created: 0,
            #[cfg(feature = "test-utils")]
            fail_allocations: 0,
        }
    }

    pub fn buffer_data(&self, id: BufferId) -> Option<&[u8]> {
        self.buffers.get(id).ok().map(|b| b.data.as_slice())
    }

    pub fn buffer_desc(&self, id: BufferId) -> Option<&BufferDesc> {
        self.buffers.get(id).ok().map(|b| &b.desc)
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn buffers_created(&self) -> u64 {
        self.buffers_created
    }

    /// Make the next `count` buffer creations fail with [`GpuError::OutOfMemory`].
    #[cfg(feature = "test-utils")]
    pub fn fail_next_allocations(&mut self, count: u32) {
        self.fail_allocations = count;
    }

    #[cfg(feature = "test-utils")]
    fn take_injected_failure(&mut self) -> bool {
        if self.fail_allocations == 0 {
            return false;
        }
        self.fail_allocations -= 1;
        true
    }

    #[cfg(not(feature = "test-utils"))]
    fn take_injected_failure(&mut self) -> bool {
        false
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuBackend for MemoryBackend {
    fn create_buffer(&mut self, desc: BufferDesc) -> Result<BufferId, GpuError> {
        if self.take_injected_failure() {
            return Err(GpuError::OutOfMemory {
                requested: desc.size,
            });
        }

        let size = usize::try_from(desc.size)
            .map_err(|_| GpuError::OutOfMemory { requested: desc.size })?;
        let data = vec![0u8; size];
        self.buffers_created += 1;
        let id = self.buffers.insert(MemoryBuffer { desc, data });
        trace!(id = id.raw(), size, "memory buffer created");
        Ok(id)
    }

    fn destroy_buffer(&mut self, id: BufferId) -> Result<(), GpuError> {
        self.buffers.remove(id).map(|_| ())
    }

    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) -> Result<(), GpuError> {
        if offset % COPY_ALIGNMENT != 0 || data.len() as u64 % COPY_ALIGNMENT != 0 {
            return Err(GpuError::Backend(format!(
                "write_buffer offset/size must be {COPY_ALIGNMENT}-byte aligned (offset={offset}, size={})",
                data.len()
            )));
        }
        let stored = self.buffers.get_mut(buffer)?;
        let start = usize::try_from(offset)
            .map_err(|_| GpuError::Backend(format!("write_buffer offset {offset} out of range")))?;
        let end = start
            .checked_add(data.len())
            .filter(|&end| end <= stored.data.len())
            .ok_or_else(|| {
                GpuError::Backend(format!(
                    "write_buffer range {start}+{} exceeds buffer size {}",
                    data.len(),
                    stored.data.len()
                ))
            })?;
        stored.data[start..end].copy_from_slice(data);
        Ok(())
    }
}
