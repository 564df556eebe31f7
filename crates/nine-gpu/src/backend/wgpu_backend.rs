use tracing::debug;

use crate::hal::{BufferDesc, BufferId, BufferTag, BufferUsages, GpuBackend, ResourceRegistry};
use crate::GpuError;

/// `wgpu` implementation of the buffer HAL.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    buffers: ResourceRegistry<BufferTag, wgpu::Buffer>,
}

impl WgpuBackend {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self {
            device,
            queue,
            buffers: ResourceRegistry::new("buffer"),
        }
    }

    /// Create a backend on the first adapter that does not need a presentation surface.
    pub async fn new_headless() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY | wgpu::Backends::GL,
            ..Default::default()
        });
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| GpuError::Backend("no suitable wgpu adapter found".into()))?;

        let info = adapter.get_info();
        debug!(name = %info.name, backend = ?info.backend, "nine-gpu adapter selected");

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("nine-gpu device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_defaults(),
                },
                None,
            )
            .await
            .map_err(|err| GpuError::Backend(err.to_string()))?;

        Ok(Self::new(device, queue))
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn buffer(&self, id: BufferId) -> Result<&wgpu::Buffer, GpuError> {
        self.buffers.get(id)
    }

    /// Smallest upload alignment that keeps every ring offset valid as a uniform binding offset.
    pub fn required_upload_alignment(&self) -> u64 {
        let limits = self.device.limits();
        u64::from(limits.min_uniform_buffer_offset_alignment)
            .max(u64::from(limits.min_storage_buffer_offset_alignment))
            .max(wgpu::COPY_BUFFER_ALIGNMENT)
    }

    fn map_buffer_usages(usages: BufferUsages) -> wgpu::BufferUsages {
        USAGE_MAP
            .iter()
            .filter(|(ours, _)| usages.contains(*ours))
            .fold(wgpu::BufferUsages::empty(), |acc, (_, theirs)| acc | *theirs)
    }
}

const USAGE_MAP: [(BufferUsages, wgpu::BufferUsages); 6] = [
    (BufferUsages::MAP_WRITE, wgpu::BufferUsages::MAP_WRITE),
    (BufferUsages::COPY_SRC, wgpu::BufferUsages::COPY_SRC),
    (BufferUsages::COPY_DST, wgpu::BufferUsages::COPY_DST),
    (BufferUsages::INDEX, wgpu::BufferUsages::INDEX),
    (BufferUsages::VERTEX, wgpu::BufferUsages::VERTEX),
    (BufferUsages::UNIFORM, wgpu::BufferUsages::UNIFORM),
];

impl GpuBackend for WgpuBackend {
    fn create_buffer(&mut self, desc: BufferDesc) -> Result<BufferId, GpuError> {
        let max = self.device.limits().max_buffer_size;
        if desc.size > max {
            return Err(GpuError::OutOfMemory {
                requested: desc.size,
            });
        }
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: desc.label.as_deref(),
            size: desc.size,
            usage: Self::map_buffer_usages(desc.usage),
            mapped_at_creation: false,
        });
        Ok(self.buffers.insert(buffer))
    }

    fn destroy_buffer(&mut self, id: BufferId) -> Result<(), GpuError> {
        let buffer = self.buffers.remove(id)?;
        buffer.destroy();
        Ok(())
    }

    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) -> Result<(), GpuError> {
        let buffer = self.buffers.get(buffer)?;
        let len = data.len() as u64;
        if offset % wgpu::COPY_BUFFER_ALIGNMENT != 0 || len % wgpu::COPY_BUFFER_ALIGNMENT != 0 {
            return Err(GpuError::InvalidArgument(format!(
                "unaligned buffer write of {len} bytes at {offset}"
            )));
        }
        self.queue.write_buffer(buffer, offset, data);
        Ok(())
    }
}

impl Drop for WgpuBackend {
    fn drop(&mut self) {
        for (_, buffer) in self.buffers.drain() {
            buffer.destroy();
        }
    }
}
